//! In-session player actions: start, movement, car choice, upgrades and cheats

use std::time::Instant;

use tracing::{debug, info};

use crate::config::CarType;
use crate::ws::protocol::{CheatKind, Movement, ServerMsg, UpgradeStat};

use super::constants::{STARTING_COUNTDOWN_SECS, TOTAL_ROUNDS, UPGRADE_PENALTY_MS};
use super::session::GameSession;
use super::state::GameState;
use super::PlayerId;

/// A client request addressed to the session the player is in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameAction {
    Move(Movement),
    SelectCar(CarType),
    Upgrade(UpgradeStat),
    Cheat(CheatKind),
}

impl GameSession {
    /// Begin the countdown for the current round. Returns false when refused.
    pub(super) fn start_game(&mut self, now: Instant) -> bool {
        if !self.state.can_start(self.players.all_dead()) {
            debug!(session_id = self.id, state = ?self.state.state(), "Start refused");
            return false;
        }

        self.race.clear_pending_reset();
        self.checkpoints
            .load_round(&mut self.world, &self.layout, self.race.current_round());
        self.players.reset_for_race_start(&mut self.world, now);
        self.npcs.reset_velocities(&mut self.world);
        self.state.enter_starting(now);

        info!(
            session_id = self.id,
            round = self.race.current_round() + 1,
            players = self.players.len(),
            "Game starting"
        );
        self.send_all(ServerMsg::StartingCountdown {
            seconds: STARTING_COUNTDOWN_SECS,
        });
        true
    }

    pub(super) fn handle_action(&mut self, player_id: PlayerId, action: GameAction) {
        let state = self.state.state();
        match action {
            GameAction::Move(movement) => {
                if state != GameState::Playing {
                    return;
                }
                if let Some(player) = self.players.get_mut(player_id) {
                    player.controls.apply(movement);
                }
            }
            GameAction::SelectCar(car) => {
                if state != GameState::Lobby {
                    debug!(player_id, "Car change outside the lobby ignored");
                    return;
                }
                self.players.select_car(player_id, car, &mut self.world);
            }
            GameAction::Upgrade(stat) => self.upgrade(player_id, stat, state),
            GameAction::Cheat(kind) => self.cheat(player_id, kind),
        }
    }

    /// Upgrades are bought between rounds and cost race time
    fn upgrade(&mut self, player_id: PlayerId, stat: UpgradeStat, state: GameState) {
        let Some(player) = self.players.get_mut(player_id) else {
            return;
        };
        let between_rounds = player.rounds_completed > 0 && player.rounds_completed < TOTAL_ROUNDS;
        if state != GameState::Starting || !between_rounds {
            debug!(player_id, ?stat, "Upgrade outside the between-rounds window");
            return;
        }
        if !player.apply_upgrade(stat) {
            debug!(player_id, ?stat, "Upgrade already maxed");
            return;
        }
        player.add_round_time(player.rounds_completed, UPGRADE_PENALTY_MS);
        info!(player_id, ?stat, total_ms = player.total_time_ms, "Upgrade bought");
    }

    /// Debug shortcuts; accepted in every state
    fn cheat(&mut self, player_id: PlayerId, kind: CheatKind) {
        let Some(player) = self.players.get_mut(player_id) else {
            return;
        };
        match kind {
            CheatKind::GodMode => player.god_mode = !player.god_mode,
            CheatKind::Die => {
                player.god_mode = false;
                player.pending_disqualification = true;
            }
            CheatKind::SkipRound => player.pending_race_complete = true,
            CheatKind::FullUpgrade => {
                for stat in UpgradeStat::ALL {
                    while player.apply_upgrade(stat) {}
                }
            }
        }
        info!(player_id, ?kind, "Cheat used");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;

    use crate::game::constants::{FIXED_STEP, MAX_UPGRADES_PER_STAT};
    use crate::game::player::DirectionY;
    use crate::game::session::tests::setup;

    use super::*;

    fn lobby(players: &[PlayerId]) -> (GameSession, Vec<mpsc::Receiver<ServerMsg>>) {
        let (mut session, _handle) = GameSession::new(setup(1));
        let mut queues = Vec::new();
        for id in players {
            let (tx, rx) = mpsc::channel(1024);
            queues.push(rx);
            session.add_player(*id, tx, Instant::now()).unwrap();
        }
        (session, queues)
    }

    #[test]
    fn test_movement_only_while_playing() {
        let (mut session, _queues) = lobby(&[1]);
        session.handle_action(1, GameAction::Move(Movement::UpPressed));
        assert_eq!(session.players.get(1).unwrap().controls.y, DirectionY::None);

        let now = Instant::now();
        session.start_game(now);
        session
            .tick(now + Duration::from_secs(STARTING_COUNTDOWN_SECS), FIXED_STEP)
            .unwrap();
        session.handle_action(1, GameAction::Move(Movement::UpPressed));
        assert_eq!(session.players.get(1).unwrap().controls.y, DirectionY::Up);
    }

    #[test]
    fn test_car_select_only_in_lobby() {
        let (mut session, _queues) = lobby(&[1]);
        session.handle_action(1, GameAction::SelectCar(CarType::RedSportsCar));
        assert_eq!(session.players.get(1).unwrap().car.car_type, CarType::RedSportsCar);

        session.start_game(Instant::now());
        session.handle_action(1, GameAction::SelectCar(CarType::PurpleTruck));
        assert_eq!(session.players.get(1).unwrap().car.car_type, CarType::RedSportsCar);
    }

    #[test]
    fn test_upgrade_charges_time_between_rounds() {
        let (mut session, _queues) = lobby(&[1]);

        // not in round 0
        session.start_game(Instant::now());
        session.handle_action(1, GameAction::Upgrade(UpgradeStat::Speed));
        assert_eq!(session.players.get(1).unwrap().upgrades.speed, 0);

        let player = session.players.get_mut(1).unwrap();
        player.rounds_completed = 1;
        player.add_round_time(0, 60_000);

        session.handle_action(1, GameAction::Upgrade(UpgradeStat::Speed));
        let player = session.players.get(1).unwrap();
        assert_eq!(player.upgrades.speed, 1);
        assert_eq!(player.round_times_ms[1], UPGRADE_PENALTY_MS);
        assert_eq!(player.total_time_ms, 60_000 + UPGRADE_PENALTY_MS);
    }

    #[test]
    fn test_cheats() {
        let (mut session, _queues) = lobby(&[1]);

        session.handle_action(1, GameAction::Cheat(CheatKind::GodMode));
        assert!(session.players.get(1).unwrap().god_mode);

        session.handle_action(1, GameAction::Cheat(CheatKind::Die));
        let player = session.players.get(1).unwrap();
        assert!(!player.god_mode);
        assert!(player.pending_disqualification);

        session.handle_action(1, GameAction::Cheat(CheatKind::FullUpgrade));
        let player = session.players.get(1).unwrap();
        assert_eq!(player.upgrades.speed, MAX_UPGRADES_PER_STAT);
        assert_eq!(player.upgrades.durability, MAX_UPGRADES_PER_STAT);
        assert_eq!(player.total_time_ms, 0);
    }

    #[test]
    fn test_restart_after_wipeout() {
        let (mut session, _queues) = lobby(&[1, 2]);
        let now = Instant::now();
        session.start_game(now);
        let t = now + Duration::from_secs(STARTING_COUNTDOWN_SECS);
        session.tick(t, FIXED_STEP).unwrap();

        for id in [1, 2] {
            let player = session.players.get_mut(id).unwrap();
            player.is_dead = true;
        }
        assert!(session.start_game(t));
        assert_eq!(session.state.state(), GameState::Starting);
        assert!(session.players.iter().all(|p| !p.is_dead && p.body.is_some()));
    }
}
