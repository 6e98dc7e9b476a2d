//! Lap, round and championship bookkeeping

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::info;

use crate::ws::protocol::{RaceTime, TotalTime};

use super::constants::{ROUND_TIME_LIMIT_MS, TOTAL_ROUNDS};
use super::player::{PlayerData, PlayerManager};

/// What happens after a round's results are published
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundOutcome {
    /// Another round follows, at this index
    NextRound(usize),
    /// All rounds played; back to round 0
    ChampionshipOver,
}

pub struct RaceManager {
    current_round: usize,
    round_start: Option<Instant>,
    round_timeout_checked: bool,
    /// Set when every player is finished or dead; consumed once per tick
    pending_race_reset: AtomicBool,
}

impl RaceManager {
    pub fn new() -> Self {
        Self {
            current_round: 0,
            round_start: None,
            round_timeout_checked: false,
            pending_race_reset: AtomicBool::new(false),
        }
    }

    pub fn current_round(&self) -> usize {
        self.current_round
    }

    /// Start the round clock
    pub fn start_round(&mut self, now: Instant) {
        self.round_start = Some(now);
        self.round_timeout_checked = false;
    }

    pub fn request_reset(&self) {
        self.pending_race_reset.store(true, Ordering::SeqCst);
    }

    pub fn clear_pending_reset(&self) {
        self.pending_race_reset.store(false, Ordering::SeqCst);
    }

    pub fn is_reset_pending(&self) -> bool {
        self.pending_race_reset.load(Ordering::SeqCst)
    }

    /// Check-and-clear the pending reset
    pub fn take_pending_reset(&self) -> bool {
        self.pending_race_reset.swap(false, Ordering::SeqCst)
    }

    /// Eliminate a player: dead, finished, disqualified, with the round-limit
    /// penalty charged and the body queued for destruction
    pub fn disqualify(player: &mut PlayerData) {
        player.car.hp = 0.0;
        player.is_dead = true;
        player.race_finished = true;
        player.disqualified = true;
        player.god_mode = false;

        player.add_round_time(player.rounds_completed, ROUND_TIME_LIMIT_MS);
        player.rounds_completed = (player.rounds_completed + 1).min(TOTAL_ROUNDS);

        player.mark_body_for_removal = true;
        player.collision_this_frame = true;
    }

    /// Record a finished lap: elapsed lap time on top of any penalties
    /// already charged to the round
    pub fn complete_player_race(player: &mut PlayerData, now: Instant) {
        let elapsed = now.saturating_duration_since(player.lap_start);
        let elapsed_ms = u32::try_from(elapsed.as_millis()).unwrap_or(u32::MAX);

        player.race_finished = true;
        player.disqualified = false;
        player.add_round_time(player.rounds_completed, elapsed_ms);
        player.rounds_completed = (player.rounds_completed + 1).min(TOTAL_ROUNDS);
        player.god_mode = true;

        info!(
            player_id = player.id,
            lap_ms = elapsed_ms,
            rounds_completed = player.rounds_completed,
            "Player finished the round"
        );
    }

    /// Flag a reset once every player is finished or dead
    pub fn check_race_completion(&self, players: &PlayerManager) -> bool {
        let done = !players.is_empty() && players.iter().all(PlayerData::is_done);
        if done {
            self.request_reset();
        }
        done
    }

    /// Force-finish stragglers once the round limit has passed. Fires at most
    /// once per round.
    pub fn check_round_timeout(&mut self, players: &mut PlayerManager, now: Instant) -> bool {
        if self.round_timeout_checked {
            return false;
        }
        let Some(start) = self.round_start else {
            return false;
        };
        if now.saturating_duration_since(start) < Duration::from_millis(ROUND_TIME_LIMIT_MS as u64) {
            return false;
        }

        let mut penalised = 0;
        for player in players.iter_mut() {
            if player.is_done() {
                continue;
            }
            player.add_round_time(player.rounds_completed, ROUND_TIME_LIMIT_MS);
            player.rounds_completed = (player.rounds_completed + 1).min(TOTAL_ROUNDS);
            player.race_finished = true;
            player.god_mode = true;
            penalised += 1;
        }

        info!(round = self.current_round, penalised, "Round timed out");
        self.round_timeout_checked = true;
        self.request_reset();
        true
    }

    /// Times of the round that just ended
    pub fn race_times(&self, players: &PlayerManager) -> Vec<RaceTime> {
        players
            .iter()
            .map(|p| RaceTime {
                player_id: p.id,
                time_ms: p
                    .rounds_completed
                    .checked_sub(1)
                    .and_then(|idx| p.round_times_ms.get(idx).copied())
                    .unwrap_or(ROUND_TIME_LIMIT_MS),
                disqualified: p.disqualified || p.is_dead,
            })
            .collect()
    }

    pub fn total_times(players: &PlayerManager) -> Vec<TotalTime> {
        players
            .iter()
            .map(|p| TotalTime {
                player_id: p.id,
                total_ms: p.total_time_ms,
                round_times_ms: p.round_times_ms,
            })
            .collect()
    }

    /// Move to the next round, wrapping after the last one
    pub fn advance_round(&mut self) -> RoundOutcome {
        self.round_start = None;
        if self.current_round + 1 < TOTAL_ROUNDS {
            self.current_round += 1;
            RoundOutcome::NextRound(self.current_round)
        } else {
            self.current_round = 0;
            RoundOutcome::ChampionshipOver
        }
    }
}

impl Default for RaceManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CarPhysicsConfig;
    use crate::game::map::SpawnPoint;
    use crate::game::world::PhysicsWorld;
    use std::sync::Arc;

    fn roster(n: i32, now: Instant) -> (PhysicsWorld, PlayerManager) {
        let mut world = PhysicsWorld::new();
        let spawns = (0..n)
            .map(|i| SpawnPoint { x: 100.0 * (i + 1) as f32, y: 100.0, angle: 0.0 })
            .collect();
        let mut players = PlayerManager::new(spawns, Arc::new(CarPhysicsConfig::builtin()));
        for id in 1..=n {
            players.add_player(id, &mut world, now).unwrap();
        }
        (world, players)
    }

    #[test]
    fn test_timeout_penalises_unfinished_players_once() {
        let start = Instant::now();
        let (_world, mut players) = roster(3, start);
        let mut race = RaceManager::new();
        race.start_round(start);
        players.get_mut(1).unwrap().race_finished = true;

        let late = start + Duration::from_millis(ROUND_TIME_LIMIT_MS as u64 + 1_000);
        assert!(race.check_round_timeout(&mut players, late));

        for id in [2, 3] {
            let p = players.get(id).unwrap();
            assert!(p.race_finished);
            assert!(p.god_mode);
            assert_eq!(p.round_times_ms[0], ROUND_TIME_LIMIT_MS);
            assert_eq!(p.rounds_completed, 1);
        }
        assert_eq!(players.get(1).unwrap().round_times_ms[0], 0);

        assert!(race.take_pending_reset());
        assert!(!race.check_round_timeout(&mut players, late + Duration::from_secs(5)));
        assert!(!race.take_pending_reset());
    }

    #[test]
    fn test_no_timeout_before_limit() {
        let start = Instant::now();
        let (_world, mut players) = roster(1, start);
        let mut race = RaceManager::new();
        race.start_round(start);
        assert!(!race.check_round_timeout(&mut players, start + Duration::from_secs(599)));
        assert!(!players.get(1).unwrap().race_finished);
    }

    #[test]
    fn test_lap_completion_adds_to_penalties() {
        let start = Instant::now();
        let (_world, mut players) = roster(1, start);
        let p = players.get_mut(1).unwrap();
        p.round_times_ms[0] = 5_000;

        RaceManager::complete_player_race(p, start + Duration::from_millis(42_000));
        assert_eq!(p.round_times_ms[0], 47_000);
        assert_eq!(p.rounds_completed, 1);
        assert!(p.race_finished && p.god_mode && !p.disqualified);
        assert_eq!(p.total_time_ms, 47_000);
    }

    #[test]
    fn test_completion_needs_everyone_done() {
        let now = Instant::now();
        let (_world, mut players) = roster(2, now);
        let race = RaceManager::new();

        players.get_mut(1).unwrap().race_finished = true;
        assert!(!race.check_race_completion(&players));
        assert!(!race.is_reset_pending());

        players.get_mut(2).unwrap().is_dead = true;
        assert!(race.check_race_completion(&players));
        assert!(race.take_pending_reset());
        assert!(!race.take_pending_reset());
    }

    #[test]
    fn test_race_times_report_last_round() {
        let now = Instant::now();
        let (_world, mut players) = roster(2, now);
        let race = RaceManager::new();
        RaceManager::complete_player_race(players.get_mut(1).unwrap(), now + Duration::from_secs(30));

        let times = race.race_times(&players);
        assert_eq!(times[0].time_ms, 30_000);
        assert!(!times[0].disqualified);
        assert_eq!(times[1].time_ms, ROUND_TIME_LIMIT_MS);
    }

    #[test]
    fn test_rounds_wrap_after_championship() {
        let mut race = RaceManager::new();
        assert_eq!(race.advance_round(), RoundOutcome::NextRound(1));
        assert_eq!(race.advance_round(), RoundOutcome::NextRound(2));
        assert_eq!(race.advance_round(), RoundOutcome::ChampionshipOver);
        assert_eq!(race.current_round(), 0);
    }
}
