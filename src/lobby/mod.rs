//! Lobby-level session management

pub mod registry;

pub use registry::SessionRegistry;
