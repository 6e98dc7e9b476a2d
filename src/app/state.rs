//! Application state shared across routes

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use crate::config::{CarPhysicsConfig, Config, NpcConfig};
use crate::game::{MapCatalog, PlayerId};
use crate::lobby::SessionRegistry;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<SessionRegistry>,
    next_connection_id: Arc<AtomicI32>,
}

impl AppState {
    pub fn new(config: Config, maps: MapCatalog) -> Self {
        let config = Arc::new(config);

        let car_physics = Arc::new(CarPhysicsConfig::load_or_builtin(config.car_physics_path.as_deref()));
        let npc_config = NpcConfig::load_or_default(config.npc_config_path.as_deref());

        let registry = Arc::new(SessionRegistry::new(Arc::new(maps), car_physics, npc_config));

        Self {
            config,
            registry,
            next_connection_id: Arc::new(AtomicI32::new(1)),
        }
    }

    /// Id for a new connection; doubles as the player id
    pub fn next_connection_id(&self) -> PlayerId {
        self.next_connection_id.fetch_add(1, Ordering::SeqCst)
    }
}
