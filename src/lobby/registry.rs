//! Session registry: creates sessions, lists joinable ones and routes joins

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{CarPhysicsConfig, NpcConfig};
use crate::game::broadcast::Outbox;
use crate::game::{
    GameAction, GameSession, GameState, JoinError, MapCatalog, SessionHandle, SessionSetup,
};
use crate::game::player::PlayerError;
use crate::game::PlayerId;
use crate::ws::protocol::{GameInfo, ServerMsg};

/// Owns every session for the lifetime of the server
pub struct SessionRegistry {
    sessions: DashMap<u32, SessionHandle>,
    /// Player → session they are in
    player_sessions: DashMap<PlayerId, u32>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    next_id: AtomicU32,
    maps: Arc<MapCatalog>,
    car_physics: Arc<CarPhysicsConfig>,
    npc_config: NpcConfig,
}

impl SessionRegistry {
    pub fn new(maps: Arc<MapCatalog>, car_physics: Arc<CarPhysicsConfig>, npc_config: NpcConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            player_sessions: DashMap::new(),
            tasks: Mutex::new(Vec::new()),
            next_id: AtomicU32::new(1),
            maps,
            car_physics,
            npc_config,
        }
    }

    pub fn get(&self, game_id: u32) -> Option<SessionHandle> {
        self.sessions.get(&game_id).map(|s| s.value().clone())
    }

    /// The session a player is currently in
    pub fn session_of(&self, player_id: PlayerId) -> Option<SessionHandle> {
        let game_id = *self.player_sessions.get(&player_id)?;
        self.get(game_id)
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    pub fn total_players(&self) -> usize {
        self.sessions.iter().map(|s| s.value().player_count()).sum()
    }

    /// Spawn a new session and put its creator in it
    pub async fn create(&self, player_id: PlayerId, outbox: Outbox, name: &str, map_id: u8) -> ServerMsg {
        self.leave(player_id);

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (map_id, layout) = self.maps.resolve(map_id);
        let name = if name.trim().is_empty() {
            format!("Game {id}")
        } else {
            name.trim().to_string()
        };

        let (session, handle) = GameSession::new(SessionSetup {
            id,
            name,
            map_id,
            layout,
            car_physics: self.car_physics.clone(),
            npc_config: self.npc_config,
            seed: rand::random::<u64>(),
        });
        self.sessions.insert(id, handle.clone());
        self.tasks.lock().push(tokio::spawn(session.run()));

        info!(game_id = id, name = %handle.name, map_id, creator = player_id, "Session created");
        self.join_handle(player_id, &handle, outbox).await
    }

    /// Join an existing session. Refusals come back as `GameJoined{success:false}`.
    pub async fn join(&self, player_id: PlayerId, game_id: u32, outbox: Outbox) -> ServerMsg {
        let Some(handle) = self.get(game_id) else {
            warn!(player_id, game_id, "Join for unknown session");
            return Self::refused(game_id, player_id, &JoinError::NotFound);
        };
        if handle.state() != GameState::Lobby {
            warn!(player_id, game_id, "Join refused, game in progress");
            return Self::refused(game_id, player_id, &JoinError::NotJoinable);
        }
        if handle.player_count() >= handle.max_players {
            warn!(player_id, game_id, capacity = handle.max_players, "Join refused, session full");
            let err = JoinError::Player(PlayerError::Full {
                capacity: handle.max_players,
            });
            return Self::refused(game_id, player_id, &err);
        }

        self.leave(player_id);
        self.join_handle(player_id, &handle, outbox).await
    }

    async fn join_handle(&self, player_id: PlayerId, handle: &SessionHandle, outbox: Outbox) -> ServerMsg {
        match handle.add_player(player_id, outbox).await {
            Ok(()) => {
                self.player_sessions.insert(player_id, handle.id);
                info!(player_id, game_id = handle.id, "Player joined session");
                ServerMsg::GameJoined {
                    success: true,
                    game_id: handle.id,
                    player_id,
                    map_id: handle.map_id,
                }
            }
            Err(e) => {
                warn!(player_id, game_id = handle.id, error = %e, "Join refused");
                Self::refused(handle.id, player_id, &e)
            }
        }
    }

    fn refused(game_id: u32, player_id: PlayerId, reason: &JoinError) -> ServerMsg {
        debug!(player_id, game_id, %reason, "Replying with failed join");
        ServerMsg::GameJoined {
            success: false,
            game_id,
            player_id,
            map_id: 0,
        }
    }

    /// Sessions still in their lobby, by id
    pub fn list(&self) -> Vec<GameInfo> {
        let mut games: Vec<GameInfo> = self
            .sessions
            .iter()
            .filter(|s| s.value().state() == GameState::Lobby && !s.value().is_stopped())
            .map(|s| s.value().info())
            .collect();
        games.sort_by_key(|g| g.game_id);
        games
    }

    /// Forward a start request; guards are applied inside the session
    pub fn start(&self, game_id: u32) -> bool {
        let Some(handle) = self.get(game_id) else {
            warn!(game_id, "Start for unknown session");
            return false;
        };
        match handle.start_game() {
            Ok(()) => true,
            Err(e) => {
                warn!(game_id, error = %e, "Start not delivered");
                false
            }
        }
    }

    /// Take a player out of whatever session they are in. No-op when none.
    pub fn leave(&self, player_id: PlayerId) {
        let Some((_, game_id)) = self.player_sessions.remove(&player_id) else {
            return;
        };
        if let Some(handle) = self.get(game_id) {
            if let Err(e) = handle.remove_player(player_id) {
                debug!(player_id, game_id, error = %e, "Leave not delivered");
            }
        }
        info!(player_id, game_id, "Player left session");
    }

    /// Route an in-game command to the player's session
    pub fn dispatch(&self, player_id: PlayerId, action: GameAction) {
        let Some(handle) = self.session_of(player_id) else {
            debug!(player_id, ?action, "Game command without a session");
            return;
        };
        if let Err(e) = handle.action(player_id, action) {
            debug!(player_id, error = %e, "Game command not delivered");
        }
    }

    /// Stop every session and wait for their tasks to exit
    pub async fn shutdown(&self) {
        for session in self.sessions.iter() {
            session.value().stop();
        }
        let tasks = std::mem::take(&mut *self.tasks.lock());
        let count = tasks.len();
        for result in futures::future::join_all(tasks).await {
            if let Err(e) = result {
                warn!(error = %e, "Session task ended abnormally");
            }
        }
        self.player_sessions.clear();
        info!(sessions = count, "Session registry shut down");
    }
}
