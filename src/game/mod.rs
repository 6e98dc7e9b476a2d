//! Race simulation modules

pub mod bridge;
pub mod broadcast;
pub mod checkpoint;
pub mod collision;
pub mod constants;
pub mod contact;
pub mod events;
pub mod map;
pub mod npc;
pub mod physics;
pub mod player;
pub mod race;
pub mod session;
pub mod snapshot;
pub mod state;
pub mod tick;
pub mod world;

pub use events::GameAction;
pub use map::MapCatalog;
pub use session::{GameSession, JoinError, SessionHandle, SessionSetup};
pub use state::GameState;

/// Connection-scoped player id. Traffic NPCs use negative ids.
pub type PlayerId = i32;
