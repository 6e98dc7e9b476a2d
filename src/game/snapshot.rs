//! Position batch building for network transmission

use rapier2d::prelude::{Real, RigidBody, Vector};

use crate::ws::protocol::{CheckpointMarker, PositionUpdate, ServerMsg, UpgradeLevels};

use super::constants::{
    CHECKPOINT_LOOKAHEAD, NPC_CAR_TYPE, NPC_DIRECTION_THRESHOLD, NPC_DISPLAY_HP, SCALE,
};
use super::map::to_pixels;
use super::npc::Npc;
use super::physics::normalize_angle;
use super::player::PlayerData;

/// Builds `UpdatePositions` batches
pub struct SnapshotBuilder;

impl SnapshotBuilder {
    /// Up to `CHECKPOINT_LOOKAHEAD` checkpoints starting at the player's next one
    pub fn lookahead(next: usize, centers: &[Vector<Real>]) -> Vec<CheckpointMarker> {
        centers
            .iter()
            .skip(next)
            .take(CHECKPOINT_LOOKAHEAD)
            .map(|c| CheckpointMarker {
                x: c.x * SCALE,
                y: c.y * SCALE,
            })
            .collect()
    }

    pub fn player_update(player: &PlayerData, checkpoint_centers: &[Vector<Real>]) -> PositionUpdate {
        let next_checkpoints = if player.race_finished {
            Vec::new()
        } else {
            Self::lookahead(player.next_checkpoint, checkpoint_centers)
        };

        PositionUpdate {
            id: player.id,
            x: player.x,
            y: player.y,
            angle: normalize_angle(player.angle),
            direction_x: player.controls.x.as_i8(),
            direction_y: player.controls.y.as_i8(),
            on_bridge: player.on_bridge,
            car_type: player.car.car_type.as_str().to_string(),
            hp: player.car.hp,
            collision: player.collision_this_frame,
            is_stopping: player.is_stopping,
            upgrades: player.upgrades,
            next_checkpoints,
        }
    }

    /// Direction component from a velocity axis, with a dead zone
    fn axis(v: f32) -> i8 {
        if v > NPC_DIRECTION_THRESHOLD {
            1
        } else if v < -NPC_DIRECTION_THRESHOLD {
            -1
        } else {
            0
        }
    }

    pub fn npc_update(npc: &Npc, body: &RigidBody) -> PositionUpdate {
        let (x, y) = to_pixels(body.translation());
        let vel = body.linvel();
        PositionUpdate {
            id: npc.id,
            x,
            y,
            angle: normalize_angle(body.rotation().angle()),
            direction_x: Self::axis(vel.x),
            direction_y: Self::axis(vel.y),
            on_bridge: npc.on_bridge,
            car_type: NPC_CAR_TYPE.to_string(),
            hp: NPC_DISPLAY_HP,
            collision: false,
            is_stopping: false,
            upgrades: UpgradeLevels::default(),
            next_checkpoints: Vec::new(),
        }
    }

    pub fn build(players: Vec<PositionUpdate>, npcs: Vec<PositionUpdate>) -> ServerMsg {
        let mut positions = players;
        positions.extend(npcs);
        ServerMsg::UpdatePositions { positions }
    }
}
