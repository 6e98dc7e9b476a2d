//! Ground/bridge layer switching driven by the bridge trigger sensors

use rapier2d::prelude::RigidBodyHandle;
use tracing::debug;

use super::constants::{SENSOR_END_BRIDGE, SENSOR_START_BRIDGE};
use super::world::{PhysicsWorld, WorldError};

pub struct BridgeHandler;

impl BridgeHandler {
    /// The new layer when `sensor` flips it, or None when the contact is a repeat
    pub fn transition(on_bridge: bool, sensor: u32) -> Option<bool> {
        match sensor {
            SENSOR_START_BRIDGE if !on_bridge => Some(true),
            SENSOR_END_BRIDGE if on_bridge => Some(false),
            _ => None,
        }
    }

    /// Update a vehicle's layer flag and collision filters. Returns whether it changed.
    pub fn update_bridge_state(
        world: &mut PhysicsWorld,
        body: RigidBodyHandle,
        on_bridge: &mut bool,
        sensor: u32,
    ) -> Result<bool, WorldError> {
        let Some(next) = Self::transition(*on_bridge, sensor) else {
            return Ok(false);
        };
        world.set_on_bridge(body, next)?;
        debug!(?body, on_bridge = next, "Vehicle changed layer");
        *on_bridge = next;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CarPhysics;
    use crate::game::constants::{CAR_BRIDGE, CAR_GROUND};

    #[test]
    fn test_transitions_are_edge_triggered() {
        assert_eq!(BridgeHandler::transition(false, SENSOR_START_BRIDGE), Some(true));
        assert_eq!(BridgeHandler::transition(true, SENSOR_START_BRIDGE), None);
        assert_eq!(BridgeHandler::transition(true, SENSOR_END_BRIDGE), Some(false));
        assert_eq!(BridgeHandler::transition(false, SENSOR_END_BRIDGE), None);
    }

    #[test]
    fn test_update_switches_collider_groups() {
        let mut world = PhysicsWorld::new();
        let body = world.create_car_body(1, 0.0, 0.0, 0.0, &CarPhysics::default());
        let collider = world.body(body).unwrap().colliders()[0];
        let mut on_bridge = false;

        assert!(BridgeHandler::update_bridge_state(&mut world, body, &mut on_bridge, SENSOR_START_BRIDGE).unwrap());
        assert!(on_bridge);
        assert_eq!(world.collider_category(collider), CAR_BRIDGE);

        assert!(!BridgeHandler::update_bridge_state(&mut world, body, &mut on_bridge, SENSOR_START_BRIDGE).unwrap());

        assert!(BridgeHandler::update_bridge_state(&mut world, body, &mut on_bridge, SENSOR_END_BRIDGE).unwrap());
        assert!(!on_bridge);
        assert_eq!(world.collider_category(collider), CAR_GROUND);
    }

    #[test]
    fn test_missing_body_is_an_error() {
        let mut world = PhysicsWorld::new();
        let body = world.create_car_body(1, 0.0, 0.0, 0.0, &CarPhysics::default());
        world.destroy_body(body);
        let mut on_bridge = false;
        assert!(BridgeHandler::update_bridge_state(&mut world, body, &mut on_bridge, SENSOR_START_BRIDGE).is_err());
        assert!(!on_bridge);
    }
}
