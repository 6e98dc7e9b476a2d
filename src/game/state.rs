//! Lobby → Starting → Playing state machine

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::info;

use super::constants::STARTING_COUNTDOWN_SECS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GameState {
    Lobby,
    Starting,
    Playing,
}

impl GameState {
    pub fn as_u8(&self) -> u8 {
        match self {
            GameState::Lobby => 0,
            GameState::Starting => 1,
            GameState::Playing => 2,
        }
    }

    pub fn from_u8(raw: u8) -> Self {
        match raw {
            1 => GameState::Starting,
            2 => GameState::Playing,
            _ => GameState::Lobby,
        }
    }
}

pub struct GameStateManager {
    state: GameState,
    countdown_deadline: Option<Instant>,
    /// Set on Starting → Playing so time spent before the round is not simulated
    reset_accumulator: bool,
}

impl GameStateManager {
    pub fn new() -> Self {
        Self {
            state: GameState::Lobby,
            countdown_deadline: None,
            reset_accumulator: false,
        }
    }

    pub fn state(&self) -> GameState {
        self.state
    }

    /// Start is allowed from the lobby, or mid-round once every player is dead
    pub fn can_start(&self, all_players_dead: bool) -> bool {
        match self.state {
            GameState::Lobby => true,
            GameState::Playing => all_players_dead,
            GameState::Starting => false,
        }
    }

    pub fn enter_starting(&mut self, now: Instant) {
        self.state = GameState::Starting;
        self.countdown_deadline = Some(now + Duration::from_secs(STARTING_COUNTDOWN_SECS));
        info!(countdown_secs = STARTING_COUNTDOWN_SECS, "Entering starting state");
    }

    pub fn enter_lobby(&mut self) {
        self.state = GameState::Lobby;
        self.countdown_deadline = None;
        info!("Back to lobby");
    }

    /// Fires the Starting → Playing transition once the countdown is over.
    /// Returns true only on the tick that performs it.
    pub fn check_countdown(&mut self, now: Instant) -> bool {
        if self.state != GameState::Starting {
            return false;
        }
        match self.countdown_deadline {
            Some(deadline) if now >= deadline => {
                self.state = GameState::Playing;
                self.countdown_deadline = None;
                self.reset_accumulator = true;
                info!("Round started");
                true
            }
            _ => false,
        }
    }

    pub fn take_accumulator_reset(&mut self) -> bool {
        std::mem::take(&mut self.reset_accumulator)
    }
}

impl Default for GameStateManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_guards() {
        let mut sm = GameStateManager::new();
        assert!(sm.can_start(false));

        sm.enter_starting(Instant::now());
        assert!(!sm.can_start(true));

        sm.check_countdown(Instant::now() + Duration::from_secs(STARTING_COUNTDOWN_SECS));
        assert_eq!(sm.state(), GameState::Playing);
        assert!(!sm.can_start(false));
        assert!(sm.can_start(true));
    }

    #[test]
    fn test_countdown_fires_once() {
        let mut sm = GameStateManager::new();
        let t0 = Instant::now();
        sm.enter_starting(t0);

        assert!(!sm.check_countdown(t0 + Duration::from_secs(3)));
        assert_eq!(sm.state(), GameState::Starting);

        let late = t0 + Duration::from_secs(STARTING_COUNTDOWN_SECS + 1);
        assert!(sm.check_countdown(late));
        assert!(!sm.check_countdown(late));
        assert!(sm.take_accumulator_reset());
        assert!(!sm.take_accumulator_reset());
    }

    #[test]
    fn test_state_atomic_encoding() {
        for state in [GameState::Lobby, GameState::Starting, GameState::Playing] {
            assert_eq!(GameState::from_u8(state.as_u8()), state);
        }
    }
}
