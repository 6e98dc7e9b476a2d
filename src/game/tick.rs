//! Per-tick work for each session state

use std::time::Instant;

use tracing::{debug, info};

use crate::ws::protocol::ServerMsg;

use super::constants::{FIXED_STEP, STARTING_COUNTDOWN_SECS};
use super::race::{RaceManager, RoundOutcome};
use super::session::{GameSession, SessionError};
use super::snapshot::SnapshotBuilder;
use super::state::GameState;

/// Steps simulated per tick at most; any older backlog is dropped
const MAX_STEPS_PER_TICK: u32 = 8;

impl GameSession {
    /// Advance the session by `dt` seconds of wall-clock time
    pub(super) fn tick(&mut self, now: Instant, dt: f32) -> Result<(), SessionError> {
        match self.state.state() {
            GameState::Lobby => {
                self.players.clear_collision_flags();
            }
            GameState::Starting => {
                self.players.clear_collision_flags();
                self.broadcast_positions();
                if self.state.check_countdown(now) {
                    self.round_started(now);
                }
            }
            GameState::Playing => {
                if self.players.is_empty() {
                    return Ok(());
                }
                self.playing_tick(now, dt)?;
            }
        }
        Ok(())
    }

    fn round_started(&mut self, now: Instant) {
        self.players.stamp_lap_start(now);
        self.race.start_round(now);
        self.send_all(ServerMsg::GameStarted {
            round: self.race.current_round(),
        });
    }

    fn playing_tick(&mut self, now: Instant, dt: f32) -> Result<(), SessionError> {
        if self.state.take_accumulator_reset() {
            self.accumulator = 0.0;
        }

        self.race.check_round_timeout(&mut self.players, now);
        self.players.clear_collision_flags();
        self.npcs.update(&mut self.world);
        self.players.update_body_positions(&mut self.world);

        self.accumulator += dt;
        let mut steps = 0;
        while self.accumulator >= FIXED_STEP {
            self.accumulator -= FIXED_STEP;
            steps += 1;
            if steps > MAX_STEPS_PER_TICK {
                debug!(session_id = self.id, backlog = self.accumulator, "Dropping simulation backlog");
                self.accumulator = 0.0;
                break;
            }
            let events = self.world.step();
            self.process_contacts(&events, now)?;
        }

        self.flush_deferred(now);

        if self.race.take_pending_reset() {
            self.finish_round(now);
            return Ok(());
        }

        self.broadcast_positions();
        Ok(())
    }

    /// Apply eliminations and completions queued outside the step
    fn flush_deferred(&mut self, now: Instant) {
        let mut changed = false;
        for player in self.players.iter_mut() {
            if std::mem::take(&mut player.pending_disqualification) && !player.is_dead {
                RaceManager::disqualify(player);
                changed = true;
            }
            if std::mem::take(&mut player.pending_race_complete) && !player.is_done() {
                RaceManager::complete_player_race(player, now);
                changed = true;
            }
        }
        if changed {
            self.race.check_race_completion(&self.players);
        }
        self.players.flush_removals(&mut self.world);
    }

    /// Publish the round's times, then move to the next round or back to the lobby
    fn finish_round(&mut self, now: Instant) {
        let round = self.race.current_round();
        let times = self.race.race_times(&self.players);
        self.send_all(ServerMsg::RaceTimes { round, times });

        match self.race.advance_round() {
            RoundOutcome::NextRound(next) => {
                info!(session_id = self.id, round = next + 1, "Next round");
                self.checkpoints.load_round(&mut self.world, &self.layout, next);
                self.players.reset_all_players_to_lobby(&mut self.world, now);
                self.npcs.reset_velocities(&mut self.world);
                self.state.enter_starting(now);
                self.send_all(ServerMsg::StartingCountdown {
                    seconds: STARTING_COUNTDOWN_SECS,
                });
            }
            RoundOutcome::ChampionshipOver => {
                let totals = RaceManager::total_times(&self.players);
                info!(session_id = self.id, players = totals.len(), "Championship over");
                self.send_all(ServerMsg::TotalTimes { totals });

                self.checkpoints.load_round(&mut self.world, &self.layout, 0);
                self.players.reset_all_players_to_lobby(&mut self.world, now);
                self.players.reset_championship();
                self.npcs.reset_velocities(&mut self.world);
                self.state.enter_lobby();
            }
        }
    }

    fn broadcast_positions(&mut self) {
        let centers = self.checkpoints.centers();
        let players = self.players.update_player_positions(&self.world, &centers);
        let npcs = self.npcs.snapshot(&self.world);
        self.send_all(SnapshotBuilder::build(players, npcs));
    }
}
