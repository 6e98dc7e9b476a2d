//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};

use crate::config::CarType;

/// Movement key transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Movement {
    UpPressed,
    UpReleased,
    DownPressed,
    DownReleased,
    LeftPressed,
    LeftReleased,
    RightPressed,
    RightReleased,
}

/// Car stats that can be upgraded between rounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpgradeStat {
    Speed,
    Acceleration,
    Handling,
    Durability,
}

impl UpgradeStat {
    pub const ALL: [UpgradeStat; 4] = [
        UpgradeStat::Speed,
        UpgradeStat::Acceleration,
        UpgradeStat::Handling,
        UpgradeStat::Durability,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheatKind {
    GodMode,
    Die,
    SkipRound,
    FullUpgrade,
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Create a session and join it
    CreateGame {
        #[serde(default)]
        name: String,
        #[serde(default)]
        map_id: u8,
    },

    JoinGame {
        game_id: u32,
    },

    /// List sessions still in the lobby
    ListGames,

    /// Start the race; defaults to the caller's own session
    StartGame {
        #[serde(default)]
        game_id: Option<u32>,
    },

    LeaveGame,

    MoveUpPressed,
    MoveUpReleased,
    MoveDownPressed,
    MoveDownReleased,
    MoveLeftPressed,
    MoveLeftReleased,
    MoveRightPressed,
    MoveRightReleased,

    SelectCar {
        car: CarType,
    },

    Upgrade {
        stat: UpgradeStat,
    },

    Cheat {
        kind: CheatKind,
    },
}

impl ClientMsg {
    /// Movement transition carried by this message, if any
    pub fn movement(&self) -> Option<Movement> {
        match self {
            ClientMsg::MoveUpPressed => Some(Movement::UpPressed),
            ClientMsg::MoveUpReleased => Some(Movement::UpReleased),
            ClientMsg::MoveDownPressed => Some(Movement::DownPressed),
            ClientMsg::MoveDownReleased => Some(Movement::DownReleased),
            ClientMsg::MoveLeftPressed => Some(Movement::LeftPressed),
            ClientMsg::MoveLeftReleased => Some(Movement::LeftReleased),
            ClientMsg::MoveRightPressed => Some(Movement::RightPressed),
            ClientMsg::MoveRightReleased => Some(Movement::RightReleased),
            _ => None,
        }
    }
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Result of a create or join request
    GameJoined {
        success: bool,
        game_id: u32,
        player_id: i32,
        map_id: u8,
    },

    GamesList {
        games: Vec<GameInfo>,
    },

    /// Countdown before a round starts
    StartingCountdown {
        seconds: u64,
    },

    GameStarted {
        round: usize,
    },

    /// Per-frame pose batch for players and NPCs
    UpdatePositions {
        positions: Vec<PositionUpdate>,
    },

    /// Times of the round that just ended
    RaceTimes {
        round: usize,
        times: Vec<RaceTime>,
    },

    /// Championship totals after the last round
    TotalTimes {
        totals: Vec<TotalTime>,
    },

    Error {
        message: String,
    },
}

/// Joinable session summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameInfo {
    pub game_id: u32,
    pub name: String,
    pub players: usize,
    pub max_players: usize,
    pub map_id: u8,
}

/// Upgrade levels per stat, 0..=3
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeLevels {
    pub speed: u8,
    pub acceleration: u8,
    pub handling: u8,
    pub durability: u8,
}

/// Checkpoint centre in pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMarker {
    pub x: f32,
    pub y: f32,
}

/// One entity in an `UpdatePositions` batch. NPCs carry negative ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionUpdate {
    pub id: i32,
    pub x: f32,
    pub y: f32,
    /// Radians in [0, 2π)
    pub angle: f32,
    /// -1 left, 0 none, 1 right
    pub direction_x: i8,
    /// -1 up, 0 none, 1 down
    pub direction_y: i8,
    pub on_bridge: bool,
    pub car_type: String,
    pub hp: f32,
    pub collision: bool,
    pub is_stopping: bool,
    pub upgrades: UpgradeLevels,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub next_checkpoints: Vec<CheckpointMarker>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RaceTime {
    pub player_id: i32,
    pub time_ms: u32,
    pub disqualified: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TotalTime {
    pub player_id: i32,
    pub total_ms: u32,
    pub round_times_ms: [u32; 3],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lobby_commands() {
        let msg: ClientMsg = serde_json::from_str(r#"{"type":"create_game","name":"Race","map_id":1}"#).unwrap();
        assert!(matches!(msg, ClientMsg::CreateGame { ref name, map_id: 1 } if name == "Race"));

        let msg: ClientMsg = serde_json::from_str(r#"{"type":"create_game"}"#).unwrap();
        assert!(matches!(msg, ClientMsg::CreateGame { map_id: 0, .. }));

        let msg: ClientMsg = serde_json::from_str(r#"{"type":"start_game"}"#).unwrap();
        assert!(matches!(msg, ClientMsg::StartGame { game_id: None }));
    }

    #[test]
    fn test_parse_game_commands() {
        let msg: ClientMsg = serde_json::from_str(r#"{"type":"move_left_released"}"#).unwrap();
        assert_eq!(msg.movement(), Some(Movement::LeftReleased));

        let msg: ClientMsg = serde_json::from_str(r#"{"type":"select_car","car":"purple_truck"}"#).unwrap();
        assert!(matches!(msg, ClientMsg::SelectCar { car: CarType::PurpleTruck }));

        let msg: ClientMsg = serde_json::from_str(r#"{"type":"cheat","kind":"skip_round"}"#).unwrap();
        assert!(matches!(msg, ClientMsg::Cheat { kind: CheatKind::SkipRound }));
        assert_eq!(msg.movement(), None);
    }

    #[test]
    fn test_unknown_car_is_rejected() {
        assert!(serde_json::from_str::<ClientMsg>(r#"{"type":"select_car","car":"tank"}"#).is_err());
    }

    #[test]
    fn test_server_msg_tagging() {
        let json = serde_json::to_value(ServerMsg::GameStarted { round: 2 }).unwrap();
        assert_eq!(json["type"], "game_started");
        assert_eq!(json["round"], 2);
    }
}
