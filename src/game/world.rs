//! Rigid-body world wrapper around rapier2d
//!
//! Owns every body of a session. Contact-begin notifications raised during a
//! step are buffered and handed back after the step returns, so no body is
//! ever created or destroyed while the pipeline is running.

use std::collections::HashMap;

use parking_lot::Mutex;
use rapier2d::prelude::*;
use tracing::{debug, warn};

use crate::config::CarPhysics;

use super::constants::{
    CAR_BRIDGE, CAR_BRIDGE_MASK, CAR_GROUND, CAR_GROUND_MASK, CHECKPOINT_RADIUS_PX, FIXED_STEP,
    NPC_HEIGHT_PX, NPC_WIDTH_PX, SCALE, SENSOR_END_BRIDGE, SENSOR_START_BRIDGE,
};
use super::map::{to_metres, MapLayout};
use super::PlayerId;

/// What a body stands for in the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyTag {
    Player(PlayerId),
    Npc(PlayerId),
    Checkpoint(usize),
    Static,
}

#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    #[error("body {0:?} no longer exists")]
    MissingBody(RigidBodyHandle),
}

/// One contact-begin notification, captured mid-step
#[derive(Debug, Clone, Copy)]
pub struct ContactEvent {
    pub collider1: ColliderHandle,
    pub collider2: ColliderHandle,
    pub sensor: bool,
    /// Linear velocities of both parents at the moment of contact (m/s)
    pub linvel1: Vector<Real>,
    pub linvel2: Vector<Real>,
}

/// Buffers collision-start events during `PhysicsPipeline::step`
#[derive(Default)]
struct ContactCollector {
    events: Mutex<Vec<ContactEvent>>,
}

impl ContactCollector {
    fn parent_linvel(bodies: &RigidBodySet, colliders: &ColliderSet, h: ColliderHandle) -> Vector<Real> {
        colliders
            .get(h)
            .and_then(|c| c.parent())
            .and_then(|b| bodies.get(b))
            .map(|b| *b.linvel())
            .unwrap_or_else(Vector::zeros)
    }
}

impl EventHandler for ContactCollector {
    fn handle_collision_event(
        &self,
        bodies: &RigidBodySet,
        colliders: &ColliderSet,
        event: CollisionEvent,
        _contact_pair: Option<&ContactPair>,
    ) {
        if let CollisionEvent::Started(h1, h2, flags) = event {
            self.events.lock().push(ContactEvent {
                collider1: h1,
                collider2: h2,
                sensor: flags.contains(CollisionEventFlags::SENSOR),
                linvel1: Self::parent_linvel(bodies, colliders, h1),
                linvel2: Self::parent_linvel(bodies, colliders, h2),
            });
        }
    }

    fn handle_contact_force_event(
        &self,
        _dt: Real,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        _contact_pair: &ContactPair,
        _total_force_magnitude: Real,
    ) {
    }
}

pub fn groups(category: u32, mask: u32) -> InteractionGroups {
    InteractionGroups::new(
        Group::from_bits_truncate(category),
        Group::from_bits_truncate(mask),
    )
}

fn car_groups(on_bridge: bool) -> InteractionGroups {
    if on_bridge {
        groups(CAR_BRIDGE, CAR_BRIDGE_MASK)
    } else {
        groups(CAR_GROUND, CAR_GROUND_MASK)
    }
}

/// Session-local physics world
pub struct PhysicsWorld {
    gravity: Vector<Real>,
    params: IntegrationParameters,
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: BroadPhase,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd: CCDSolver,
    collector: ContactCollector,
    tags: HashMap<RigidBodyHandle, BodyTag>,
}

impl PhysicsWorld {
    pub fn new() -> Self {
        Self {
            gravity: vector![0.0, 0.0],
            params: IntegrationParameters {
                dt: FIXED_STEP,
                ..Default::default()
            },
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: BroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd: CCDSolver::new(),
            collector: ContactCollector::default(),
            tags: HashMap::new(),
        }
    }

    /// Build the static geometry of a map: walls by layer and bridge sensors
    pub fn load_static_geometry(&mut self, layout: &MapLayout) {
        for shape in &layout.shapes {
            let points: Vec<Point<Real>> = shape
                .points
                .iter()
                .map(|[x, y]| Point::from(to_metres(*x, *y)))
                .collect();
            if points.len() < 2 {
                warn!(map = %layout.name, layer = ?shape.layer, "Skipping degenerate shape");
                continue;
            }

            let category = shape.layer.category();
            let builder = if shape.layer.is_sensor() {
                match ColliderBuilder::convex_hull(&points) {
                    Some(b) => b.sensor(true).active_events(ActiveEvents::COLLISION_EVENTS),
                    None => {
                        warn!(map = %layout.name, layer = ?shape.layer, "Bridge sensor is not a valid polygon");
                        continue;
                    }
                }
            } else {
                let mut closed = points.clone();
                closed.push(points[0]);
                ColliderBuilder::polyline(closed, None)
            };

            let body = self.bodies.insert(RigidBodyBuilder::fixed().build());
            let collider = builder.collision_groups(groups(category, Group::ALL.bits())).build();
            self.colliders
                .insert_with_parent(collider, body, &mut self.bodies);
            self.tags.insert(body, BodyTag::Static);
        }
    }

    /// Create a player car body at a pixel position
    pub fn create_car_body(
        &mut self,
        player_id: PlayerId,
        x_px: f32,
        y_px: f32,
        angle: f32,
        physics: &CarPhysics,
    ) -> RigidBodyHandle {
        let body = RigidBodyBuilder::dynamic()
            .translation(to_metres(x_px, y_px))
            .rotation(angle)
            .linear_damping(physics.linear_damping)
            .angular_damping(physics.angular_damping)
            .ccd_enabled(true)
            .build();
        let handle = self.bodies.insert(body);

        let collider = ColliderBuilder::cuboid(
            physics.width / (2.0 * SCALE),
            physics.height / (2.0 * SCALE),
        )
        .translation(vector![0.0, physics.center_offset_y / SCALE])
        .density(physics.density)
        .friction(physics.friction)
        .restitution(physics.restitution)
        .collision_groups(car_groups(false))
        .active_events(ActiveEvents::COLLISION_EVENTS)
        .build();
        self.colliders
            .insert_with_parent(collider, handle, &mut self.bodies);
        self.tags.insert(handle, BodyTag::Player(player_id));
        handle
    }

    /// Create an NPC body; parked NPCs are fixed, moving ones are velocity driven
    pub fn create_npc_body(
        &mut self,
        npc_id: PlayerId,
        position: Vector<Real>,
        angle: f32,
        parked: bool,
    ) -> RigidBodyHandle {
        let builder = if parked {
            RigidBodyBuilder::fixed()
        } else {
            RigidBodyBuilder::dynamic()
        };
        let handle = self
            .bodies
            .insert(builder.translation(position).rotation(angle).build());

        let collider = ColliderBuilder::cuboid(
            NPC_WIDTH_PX / (2.0 * SCALE),
            NPC_HEIGHT_PX / (2.0 * SCALE),
        )
        .density(1.0)
        .friction(0.3)
        .restitution(0.0)
        .collision_groups(car_groups(false))
        .active_events(ActiveEvents::COLLISION_EVENTS)
        .build();
        self.colliders
            .insert_with_parent(collider, handle, &mut self.bodies);
        self.tags.insert(handle, BodyTag::Npc(npc_id));
        handle
    }

    /// Create one circular checkpoint sensor
    pub fn create_checkpoint(&mut self, index: usize, center: Vector<Real>) -> RigidBodyHandle {
        let handle = self
            .bodies
            .insert(RigidBodyBuilder::fixed().translation(center).build());
        let collider = ColliderBuilder::ball(CHECKPOINT_RADIUS_PX / SCALE)
            .sensor(true)
            .active_events(ActiveEvents::COLLISION_EVENTS)
            .collision_groups(groups(
                super::constants::COLLISION_FLOOR,
                Group::ALL.bits(),
            ))
            .build();
        self.colliders
            .insert_with_parent(collider, handle, &mut self.bodies);
        self.tags.insert(handle, BodyTag::Checkpoint(index));
        handle
    }

    /// Remove a body with its colliders. Unknown handles are ignored.
    pub fn destroy_body(&mut self, handle: RigidBodyHandle) {
        self.tags.remove(&handle);
        if self
            .bodies
            .remove(
                handle,
                &mut self.islands,
                &mut self.colliders,
                &mut self.impulse_joints,
                &mut self.multibody_joints,
                true,
            )
            .is_none()
        {
            debug!(?handle, "destroy_body on a missing handle");
        }
    }

    /// Switch a car between the ground and bridge layers, refreshing every collider
    pub fn set_on_bridge(&mut self, handle: RigidBodyHandle, on_bridge: bool) -> Result<(), WorldError> {
        let body = self
            .bodies
            .get(handle)
            .ok_or(WorldError::MissingBody(handle))?;
        let filter = car_groups(on_bridge);
        for collider in body.colliders().to_vec() {
            if let Some(c) = self.colliders.get_mut(collider) {
                c.set_collision_groups(filter);
            }
        }
        Ok(())
    }

    /// Advance one fixed step and return the contacts that began during it
    pub fn step(&mut self) -> Vec<ContactEvent> {
        self.pipeline.step(
            &self.gravity,
            &self.params,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd,
            None,
            &(),
            &self.collector,
        );
        std::mem::take(&mut *self.collector.events.lock())
    }

    pub fn body(&self, handle: RigidBodyHandle) -> Option<&RigidBody> {
        self.bodies.get(handle)
    }

    pub fn body_mut(&mut self, handle: RigidBodyHandle) -> Option<&mut RigidBody> {
        self.bodies.get_mut(handle)
    }

    pub fn tag_of_collider(&self, collider: ColliderHandle) -> Option<(RigidBodyHandle, BodyTag)> {
        let parent = self.colliders.get(collider)?.parent()?;
        self.tags.get(&parent).map(|tag| (parent, *tag))
    }

    /// Membership bits of a collider, used to recognise bridge sensors
    pub fn collider_category(&self, collider: ColliderHandle) -> u32 {
        self.colliders
            .get(collider)
            .map(|c| c.collision_groups().memberships.bits())
            .unwrap_or(0)
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
impl PhysicsWorld {
    /// Colliders whose membership is exactly `category`
    pub(crate) fn colliders_in(&self, category: u32) -> Vec<ColliderHandle> {
        self.colliders
            .iter()
            .filter(|(_, c)| c.collision_groups().memberships.bits() == category)
            .map(|(handle, _)| handle)
            .collect()
    }
}

/// Whether a membership mask is one of the bridge trigger sensors
pub fn bridge_sensor(category: u32) -> Option<u32> {
    match category {
        SENSOR_START_BRIDGE | SENSOR_END_BRIDGE => Some(category),
        _ => None,
    }
}
