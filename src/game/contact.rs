//! Routing of contact-begin events to checkpoint, bridge and damage handling

use std::time::Instant;

use rapier2d::prelude::{ColliderHandle, Real, RigidBodyHandle, Vector};
use tracing::debug;

use super::bridge::BridgeHandler;
use super::checkpoint::{CheckpointHandler, CheckpointOutcome};
use super::collision::CollisionHandler;
use super::race::RaceManager;
use super::session::{GameSession, SessionError};
use super::state::GameState;
use super::world::{bridge_sensor, BodyTag, ContactEvent};
use super::PlayerId;

impl GameSession {
    /// Handle every contact raised by one physics step
    pub(super) fn process_contacts(&mut self, events: &[ContactEvent], now: Instant) -> Result<(), SessionError> {
        for event in events {
            if event.sensor {
                self.sensor_contact(event.collider1, event.collider2, now)?;
                self.sensor_contact(event.collider2, event.collider1, now)?;
            } else {
                self.solid_contact(event);
            }
        }
        Ok(())
    }

    /// `vehicle` touched the sensor `sensor`; the pair is tried both ways round
    fn sensor_contact(&mut self, vehicle: ColliderHandle, sensor: ColliderHandle, now: Instant) -> Result<(), SessionError> {
        let Some((body, tag)) = self.world.tag_of_collider(vehicle) else {
            return Ok(());
        };
        let sensor_tag = self.world.tag_of_collider(sensor).map(|(_, t)| t);

        if let (BodyTag::Player(id), Some(BodyTag::Checkpoint(index))) = (tag, sensor_tag) {
            self.checkpoint_reached(id, index, now);
            return Ok(());
        }

        let Some(kind) = bridge_sensor(self.world.collider_category(sensor)) else {
            return Ok(());
        };
        match tag {
            BodyTag::Player(id) => {
                if let Some(player) = self.players.get_mut(id) {
                    BridgeHandler::update_bridge_state(&mut self.world, body, &mut player.on_bridge, kind)?;
                }
            }
            BodyTag::Npc(_) => {
                if let Some(npc) = self.npcs.by_body(body) {
                    BridgeHandler::update_bridge_state(&mut self.world, body, &mut npc.on_bridge, kind)?;
                }
            }
            BodyTag::Checkpoint(_) | BodyTag::Static => {}
        }
        Ok(())
    }

    pub(super) fn checkpoint_reached(&mut self, id: PlayerId, index: usize, now: Instant) {
        let total = self.checkpoints.len();
        let Some(player) = self.players.get_mut(id) else {
            return;
        };
        if CheckpointHandler::handle_checkpoint_reached(player, index, total) == CheckpointOutcome::LapCompleted {
            RaceManager::complete_player_race(player, now);
            self.race.check_race_completion(&self.players);
        }
    }

    /// Damage players in a solid contact. Ignored outside a running round.
    fn solid_contact(&mut self, event: &ContactEvent) {
        if self.state.state() != GameState::Playing {
            return;
        }
        let first = self.world.tag_of_collider(event.collider1);
        let second = self.world.tag_of_collider(event.collider2);

        let mut died = false;
        died |= self.hit(first, &event.linvel1, &event.linvel2);
        died |= self.hit(second, &event.linvel2, &event.linvel1);

        if died {
            self.race.check_race_completion(&self.players);
        }
    }

    fn hit(
        &mut self,
        side: Option<(RigidBodyHandle, BodyTag)>,
        vel_self: &Vector<Real>,
        vel_other: &Vector<Real>,
    ) -> bool {
        let Some((_, BodyTag::Player(id))) = side else {
            return false;
        };
        let Some(player) = self.players.get_mut(id) else {
            return false;
        };
        let died = CollisionHandler::process_hit(player, vel_self, vel_other);
        if player.collision_this_frame {
            debug!(player_id = id, hp = player.car.hp, "Collision");
        }
        died
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rapier2d::na as nalgebra;
    use rapier2d::prelude::vector;
    use tokio::sync::mpsc;

    use crate::game::constants::{
        CAR_BRIDGE, CAR_GROUND, FIXED_STEP, SENSOR_END_BRIDGE, SENSOR_START_BRIDGE,
        STARTING_COUNTDOWN_SECS,
    };
    use crate::game::map::tests::test_layout;
    use crate::game::map::{LayerKind, StaticShape};
    use crate::game::session::tests::setup;
    use crate::game::session::GameSession;
    use crate::game::state::GameState;

    use super::*;

    struct Running {
        session: GameSession,
        started: Instant,
        _queues: Vec<mpsc::Receiver<crate::ws::protocol::ServerMsg>>,
    }

    fn playing(players: &[PlayerId]) -> Running {
        let (mut session, _handle) = GameSession::new(setup(1));
        let mut queues = Vec::new();
        for id in players {
            let (tx, rx) = mpsc::channel(1024);
            queues.push(rx);
            session.add_player(*id, tx, Instant::now()).unwrap();
        }
        let now = Instant::now();
        session.start_game(now);
        let started = now + Duration::from_secs(STARTING_COUNTDOWN_SECS);
        session.tick(started, FIXED_STEP).unwrap();
        assert_eq!(session.state.state(), GameState::Playing);
        Running {
            session,
            started,
            _queues: queues,
        }
    }

    fn collider_of(session: &GameSession, id: PlayerId) -> ColliderHandle {
        let body = session.players.get(id).unwrap().body.unwrap();
        session.world.body(body).unwrap().colliders()[0]
    }

    #[test]
    fn test_checkpoint_sequence_finishes_the_round() {
        let Running { mut session, started: t, _queues } = playing(&[1, 2]);
        let total = session.checkpoints.len();
        for index in 0..total {
            session.checkpoint_reached(1, index, t + Duration::from_secs(30));
        }
        let player = session.players.get(1).unwrap();
        assert!(player.race_finished);
        assert_eq!(player.rounds_completed, 1);
        assert_eq!(player.round_times_ms[0], 30_000);
        // player 2 is still racing
        assert!(!session.race.is_reset_pending());
    }

    /// Add one entry and one exit sensor to the session's world
    fn bridge_sensors(session: &mut GameSession) -> (ColliderHandle, ColliderHandle) {
        let mut layout = test_layout();
        layout.shapes = vec![
            StaticShape {
                layer: LayerKind::BridgeStart,
                points: vec![[1000.0, 1000.0], [1100.0, 1000.0], [1100.0, 1100.0], [1000.0, 1100.0]],
            },
            StaticShape {
                layer: LayerKind::BridgeEnd,
                points: vec![[2000.0, 1000.0], [2100.0, 1000.0], [2100.0, 1100.0], [2000.0, 1100.0]],
            },
        ];
        session.world.load_static_geometry(&layout);
        let start = session.world.colliders_in(SENSOR_START_BRIDGE)[0];
        let end = session.world.colliders_in(SENSOR_END_BRIDGE)[0];
        (start, end)
    }

    fn sensor_event(collider1: ColliderHandle, collider2: ColliderHandle) -> ContactEvent {
        ContactEvent {
            collider1,
            collider2,
            sensor: true,
            linvel1: vector![0.0, 0.0],
            linvel2: vector![0.0, 0.0],
        }
    }

    #[test]
    fn test_bridge_sensors_move_players_between_layers() {
        let Running { mut session, started: t, _queues } = playing(&[1]);
        let (start, end) = bridge_sensors(&mut session);
        let car = collider_of(&session, 1);

        session.process_contacts(&[sensor_event(car, start)], t).unwrap();
        assert!(session.players.get(1).unwrap().on_bridge);
        assert_eq!(session.world.collider_category(car), CAR_BRIDGE);

        // repeated entry is a no-op
        session.process_contacts(&[sensor_event(start, car)], t).unwrap();
        assert!(session.players.get(1).unwrap().on_bridge);

        session.process_contacts(&[sensor_event(end, car)], t).unwrap();
        assert!(!session.players.get(1).unwrap().on_bridge);
        assert_eq!(session.world.collider_category(car), CAR_GROUND);
    }

    #[test]
    fn test_bridge_sensors_move_traffic_between_layers() {
        let Running { mut session, started: t, _queues } = playing(&[1]);
        let (start, _end) = bridge_sensors(&mut session);
        let npc = session
            .npcs
            .npcs()
            .iter()
            .find(|n| !n.parked)
            .map(|n| n.body)
            .unwrap();
        let car = session.world.body(npc).unwrap().colliders()[0];

        session.process_contacts(&[sensor_event(start, car)], t).unwrap();
        let on_bridge = session.npcs.npcs().iter().find(|n| n.body == npc).unwrap().on_bridge;
        assert!(on_bridge);
        assert_eq!(session.world.collider_category(car), CAR_BRIDGE);
    }

    #[test]
    fn test_head_on_crash_damages_both_players() {
        let Running { mut session, _queues, .. } = playing(&[1, 2]);
        let event = ContactEvent {
            collider1: collider_of(&session, 1),
            collider2: collider_of(&session, 2),
            sensor: false,
            linvel1: vector![10.0, 0.0],
            linvel2: vector![-10.0, 0.0],
        };
        session.process_contacts(&[event], Instant::now()).unwrap();

        for id in [1, 2] {
            let player = session.players.get(id).unwrap();
            assert!(player.collision_this_frame);
            assert!(player.car.hp < player.car.max_hp);
        }
    }

    #[test]
    fn test_fatal_crash_ends_round_when_everyone_is_out() {
        let Running { mut session, _queues, .. } = playing(&[1]);
        session.players.get_mut(1).unwrap().car.hp = 0.1;

        let event = ContactEvent {
            collider1: collider_of(&session, 1),
            collider2: collider_of(&session, 1),
            sensor: false,
            linvel1: vector![20.0, 0.0],
            linvel2: vector![0.0, 0.0],
        };
        session.process_contacts(&[event], Instant::now()).unwrap();

        let player = session.players.get(1).unwrap();
        assert!(player.is_dead);
        assert!(player.disqualified);
        assert!(session.race.is_reset_pending());
    }

    #[test]
    fn test_crashes_are_ignored_in_the_lobby() {
        let (mut session, _handle) = GameSession::new(setup(1));
        let (tx, _rx) = mpsc::channel(8);
        session.add_player(1, tx, Instant::now()).unwrap();
        let collider = collider_of(&session, 1);
        let event = ContactEvent {
            collider1: collider,
            collider2: collider,
            sensor: false,
            linvel1: vector![50.0, 0.0],
            linvel2: vector![0.0, 0.0],
        };
        session.process_contacts(&[event], Instant::now()).unwrap();
        let player = session.players.get(1).unwrap();
        assert_eq!(player.car.hp, player.car.max_hp);
    }
}
