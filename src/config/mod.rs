//! Configuration module - environment variable parsing

pub mod car_physics;
pub mod npc;

pub use car_physics::{CarPhysics, CarPhysicsConfig, CarType};
pub use npc::NpcConfig;

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use tracing::warn;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Optional JSON overrides for car profiles
    pub car_physics_path: Option<PathBuf>,
    /// Optional JSON overrides for NPC traffic
    pub npc_config_path: Option<PathBuf>,
    /// Map layouts, indexed by map id
    pub map_files: Vec<PathBuf>,

    /// Allowed client origin for CORS (any origin when unset)
    pub client_origin: Option<String>,
    /// Max inbound commands per second per connection
    pub input_rate_limit: u32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let map_files: Vec<PathBuf> = env::var("MAP_FILES")
            .unwrap_or_else(|_| "maps/city.json".to_string())
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .collect();

        if map_files.is_empty() {
            return Err(ConfigError::NoMaps);
        }

        let input_rate_limit = match env::var("INPUT_RATE_LIMIT") {
            Ok(raw) => raw.parse().unwrap_or_else(|_| {
                warn!(value = %raw, "Invalid INPUT_RATE_LIMIT, using 60");
                60
            }),
            Err(_) => 60,
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            car_physics_path: env::var("CAR_PHYSICS_PATH").ok().map(PathBuf::from),
            npc_config_path: env::var("NPC_CONFIG_PATH").ok().map(PathBuf::from),
            map_files,
            client_origin: env::var("CLIENT_ORIGIN").ok(),
            input_rate_limit,
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("MAP_FILES lists no maps")]
    NoMaps,
}
