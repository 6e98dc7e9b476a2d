//! Checkpoint sensors and in-order lap progress

use rapier2d::prelude::{Real, RigidBodyHandle, Vector};
use tracing::{debug, info};

use super::map::MapLayout;
use super::player::PlayerData;
use super::world::PhysicsWorld;

#[derive(Debug, Clone, Copy)]
pub struct Checkpoint {
    pub index: usize,
    pub center: Vector<Real>,
    pub body: RigidBodyHandle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointOutcome {
    /// Out of order, repeated or already finished
    Ignored,
    /// Progress advanced; holds the new next index
    Advanced(usize),
    /// Last checkpoint of the round reached
    LapCompleted,
}

/// Sensors of the current round
#[derive(Default)]
pub struct CheckpointHandler {
    checkpoints: Vec<Checkpoint>,
}

impl CheckpointHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the sensors with the layout of `round`
    pub fn load_round(&mut self, world: &mut PhysicsWorld, layout: &MapLayout, round: usize) {
        for checkpoint in self.checkpoints.drain(..) {
            world.destroy_body(checkpoint.body);
        }

        self.checkpoints = layout
            .round_checkpoints(round)
            .into_iter()
            .enumerate()
            .map(|(index, center)| Checkpoint {
                index,
                center,
                body: world.create_checkpoint(index, center),
            })
            .collect();

        info!(round = round + 1, checkpoints = self.checkpoints.len(), "Loaded round checkpoints");
    }

    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }

    pub fn centers(&self) -> Vec<Vector<Real>> {
        self.checkpoints.iter().map(|c| c.center).collect()
    }

    /// Count a checkpoint contact only when it is the player's next one
    pub fn handle_checkpoint_reached(player: &mut PlayerData, index: usize, total: usize) -> CheckpointOutcome {
        if player.race_finished || player.next_checkpoint != index || total == 0 {
            return CheckpointOutcome::Ignored;
        }

        let next = index + 1;
        player.next_checkpoint = next.min(total);
        if next >= total {
            return CheckpointOutcome::LapCompleted;
        }

        debug!(player_id = player.id, checkpoint = index, next, "Checkpoint passed");
        CheckpointOutcome::Advanced(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CarPhysics, CarType};
    use crate::game::map::{tests::test_layout, SpawnPoint};
    use crate::game::player::CarInfo;
    use crate::game::race::RaceManager;
    use std::time::{Duration, Instant};

    fn player() -> PlayerData {
        PlayerData::new(
            1,
            CarInfo::from_profile(CarType::GreenCar, &CarPhysics::default()),
            &SpawnPoint { x: 0.0, y: 0.0, angle: 0.0 },
            Instant::now(),
        )
    }

    #[test]
    fn test_out_of_order_contacts_are_ignored() {
        let mut p = player();
        assert_eq!(CheckpointHandler::handle_checkpoint_reached(&mut p, 2, 6), CheckpointOutcome::Ignored);
        assert_eq!(p.next_checkpoint, 0);

        assert_eq!(CheckpointHandler::handle_checkpoint_reached(&mut p, 0, 6), CheckpointOutcome::Advanced(1));
        // re-triggering a passed checkpoint
        assert_eq!(CheckpointHandler::handle_checkpoint_reached(&mut p, 0, 6), CheckpointOutcome::Ignored);
        assert_eq!(p.next_checkpoint, 1);
    }

    #[test]
    fn test_final_checkpoint_completes_the_round() {
        let start = Instant::now();
        let mut p = player();
        p.lap_start = start;

        for k in 0..5 {
            assert_eq!(
                CheckpointHandler::handle_checkpoint_reached(&mut p, k, 6),
                CheckpointOutcome::Advanced(k + 1)
            );
        }
        assert_eq!(CheckpointHandler::handle_checkpoint_reached(&mut p, 5, 6), CheckpointOutcome::LapCompleted);
        assert!(p.next_checkpoint <= 6);

        RaceManager::complete_player_race(&mut p, start + Duration::from_secs(90));
        assert_eq!(p.rounds_completed, 1);
        assert!(p.race_finished);
        assert!(!p.disqualified);
        assert!(p.god_mode);

        // finished players no longer progress
        assert_eq!(CheckpointHandler::handle_checkpoint_reached(&mut p, 6, 6), CheckpointOutcome::Ignored);
    }

    #[test]
    fn test_reload_replaces_sensors() {
        let layout = test_layout();
        let mut world = PhysicsWorld::new();
        let mut handler = CheckpointHandler::new();

        handler.load_round(&mut world, &layout, 0);
        assert_eq!(handler.len(), 3);
        let bodies = world.body_count();

        handler.load_round(&mut world, &layout, 2);
        assert_eq!(handler.len(), 4);
        assert_eq!(world.body_count(), bodies + 1);
    }
}
