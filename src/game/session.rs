//! One race session: a tokio task that owns the world and runs the tick loop
//!
//! Everything a session mutates lives inside [`GameSession`] and is touched
//! only from its own task. The outside world talks to it through
//! [`SessionHandle`], which queues [`SessionCommand`]s and reads a couple of
//! atomics for the lobby listing.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::{CarPhysicsConfig, NpcConfig};
use crate::ws::protocol::{GameInfo, ServerMsg};

use super::broadcast::{BroadcastManager, Outbox};
use super::checkpoint::CheckpointHandler;
use super::constants::TICK_INTERVAL_MS;
use super::events::GameAction;
use super::map::MapLayout;
use super::npc::NpcManager;
use super::player::{PlayerError, PlayerManager};
use super::race::RaceManager;
use super::state::{GameState, GameStateManager};
use super::world::{PhysicsWorld, WorldError};
use super::PlayerId;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session {0} has stopped")]
    Closed(u32),
    #[error(transparent)]
    World(#[from] WorldError),
}

/// Why a join was refused
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JoinError {
    #[error("no such game")]
    NotFound,
    #[error("game already started")]
    NotJoinable,
    #[error(transparent)]
    Player(#[from] PlayerError),
    #[error("game has stopped")]
    Closed,
}

pub enum SessionCommand {
    AddPlayer {
        player_id: PlayerId,
        outbox: Outbox,
        reply: oneshot::Sender<Result<(), JoinError>>,
    },
    RemovePlayer {
        player_id: PlayerId,
    },
    StartGame,
    Action {
        player_id: PlayerId,
        action: GameAction,
    },
    Stop,
}

/// Values the session publishes for readers outside its task
#[derive(Default)]
struct SessionShared {
    player_count: AtomicUsize,
    state: AtomicU8,
    stopped: AtomicBool,
}

/// Cloneable reference to a running session
#[derive(Clone)]
pub struct SessionHandle {
    pub id: u32,
    pub name: String,
    pub map_id: u8,
    pub max_players: usize,
    commands: mpsc::UnboundedSender<SessionCommand>,
    shared: Arc<SessionShared>,
}

impl SessionHandle {
    pub fn player_count(&self) -> usize {
        self.shared.player_count.load(Ordering::Relaxed)
    }

    pub fn state(&self) -> GameState {
        GameState::from_u8(self.shared.state.load(Ordering::Relaxed))
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::Relaxed)
    }

    pub fn info(&self) -> GameInfo {
        GameInfo {
            game_id: self.id,
            name: self.name.clone(),
            players: self.player_count(),
            max_players: self.max_players,
            map_id: self.map_id,
        }
    }

    fn send(&self, cmd: SessionCommand) -> Result<(), SessionError> {
        self.commands
            .send(cmd)
            .map_err(|_| SessionError::Closed(self.id))
    }

    /// Queue a join and wait for the session to accept or refuse it
    pub async fn add_player(&self, player_id: PlayerId, outbox: Outbox) -> Result<(), JoinError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::AddPlayer {
            player_id,
            outbox,
            reply,
        })
        .map_err(|_| JoinError::Closed)?;
        rx.await.unwrap_or(Err(JoinError::Closed))
    }

    pub fn remove_player(&self, player_id: PlayerId) -> Result<(), SessionError> {
        self.send(SessionCommand::RemovePlayer { player_id })
    }

    pub fn start_game(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::StartGame)
    }

    pub fn action(&self, player_id: PlayerId, action: GameAction) -> Result<(), SessionError> {
        self.send(SessionCommand::Action { player_id, action })
    }

    /// Ask the session loop to exit. Safe to call more than once.
    pub fn stop(&self) {
        if self.shared.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.send(SessionCommand::Stop) {
            debug!(session_id = self.id, error = %e, "Stop not queued");
        }
    }
}

/// Constructor inputs for a session
pub struct SessionSetup {
    pub id: u32,
    pub name: String,
    pub map_id: u8,
    pub layout: Arc<MapLayout>,
    pub car_physics: Arc<CarPhysicsConfig>,
    pub npc_config: NpcConfig,
    pub seed: u64,
}

pub struct GameSession {
    pub(super) id: u32,
    pub(super) layout: Arc<MapLayout>,
    pub(super) world: PhysicsWorld,
    pub(super) players: PlayerManager,
    pub(super) npcs: NpcManager,
    pub(super) checkpoints: CheckpointHandler,
    pub(super) race: RaceManager,
    pub(super) state: GameStateManager,
    pub(super) broadcast: BroadcastManager,
    /// Unsimulated wall-clock time, in seconds
    pub(super) accumulator: f32,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    shared: Arc<SessionShared>,
}

impl GameSession {
    /// Build the world for a map: static geometry, round-0 checkpoints and traffic
    pub fn new(setup: SessionSetup) -> (Self, SessionHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(SessionShared::default());

        let mut world = PhysicsWorld::new();
        world.load_static_geometry(&setup.layout);

        let mut checkpoints = CheckpointHandler::new();
        checkpoints.load_round(&mut world, &setup.layout, 0);

        let mut npcs = NpcManager::new(setup.seed);
        npcs.init(&mut world, &setup.layout, &setup.npc_config);

        let players = PlayerManager::new(setup.layout.spawn_points.clone(), setup.car_physics);

        let handle = SessionHandle {
            id: setup.id,
            name: setup.name,
            map_id: setup.map_id,
            max_players: players.capacity(),
            commands: tx,
            shared: shared.clone(),
        };

        let session = Self {
            id: setup.id,
            layout: setup.layout,
            world,
            players,
            npcs,
            checkpoints,
            race: RaceManager::new(),
            state: GameStateManager::new(),
            broadcast: BroadcastManager::new(),
            accumulator: 0.0,
            commands: rx,
            shared,
        };
        (session, handle)
    }

    /// Run the tick loop until stopped or every handle is dropped
    pub async fn run(mut self) {
        info!(session_id = self.id, map = %self.layout.name, "Session started");

        let mut ticker = interval(Duration::from_millis(TICK_INTERVAL_MS));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last = Instant::now();

        loop {
            ticker.tick().await;
            let now = Instant::now();

            if !self.process_commands(now) {
                break;
            }

            let dt = now.saturating_duration_since(last).as_secs_f32();
            last = now;
            if let Err(e) = self.tick(now, dt) {
                error!(session_id = self.id, error = %e, "Tick failed");
            }
            self.publish();
        }

        self.shared.stopped.store(true, Ordering::SeqCst);
        info!(session_id = self.id, players = self.players.len(), "Session stopped");
    }

    /// Drain queued commands. Returns false once the loop should exit.
    fn process_commands(&mut self, now: Instant) -> bool {
        loop {
            match self.commands.try_recv() {
                Ok(SessionCommand::Stop) => return false,
                Ok(cmd) => self.handle_command(cmd, now),
                Err(mpsc::error::TryRecvError::Empty) => return true,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    warn!(session_id = self.id, "All handles dropped");
                    return false;
                }
            }
        }
    }

    pub(super) fn handle_command(&mut self, cmd: SessionCommand, now: Instant) {
        match cmd {
            SessionCommand::AddPlayer {
                player_id,
                outbox,
                reply,
            } => {
                let result = self.add_player(player_id, outbox, now);
                self.publish();
                let _ = reply.send(result);
            }
            SessionCommand::RemovePlayer { player_id } => self.remove_player(player_id),
            SessionCommand::StartGame => {
                self.start_game(now);
            }
            SessionCommand::Action { player_id, action } => self.handle_action(player_id, action),
            SessionCommand::Stop => {}
        }
        self.publish();
    }

    pub(super) fn add_player(&mut self, player_id: PlayerId, outbox: Outbox, now: Instant) -> Result<(), JoinError> {
        if self.state.state() != GameState::Lobby {
            return Err(JoinError::NotJoinable);
        }
        self.players.add_player(player_id, &mut self.world, now)?;
        self.broadcast.register(player_id, outbox);
        Ok(())
    }

    /// Drop a player from the roster and the fan-out list. Unknown ids are ignored.
    pub(super) fn remove_player(&mut self, player_id: PlayerId) {
        self.broadcast.unregister(player_id);
        if !self.players.remove_player(player_id, self.state.state(), &mut self.world) {
            return;
        }
        if self.state.state() == GameState::Playing {
            self.race.check_race_completion(&self.players);
        }
    }

    /// Broadcast to every member, removing those whose queue has closed
    pub(super) fn send_all(&mut self, msg: ServerMsg) {
        for id in self.broadcast.broadcast(&msg) {
            self.remove_player(id);
        }
    }

    fn publish(&self) {
        self.shared.player_count.store(self.players.len(), Ordering::Relaxed);
        self.shared.state.store(self.state.state().as_u8(), Ordering::Relaxed);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::game::constants::{FIXED_STEP, STARTING_COUNTDOWN_SECS, TOTAL_ROUNDS};
    use crate::game::map::tests::test_layout;
    use crate::ws::protocol::CheatKind;

    pub(crate) fn setup(id: u32) -> SessionSetup {
        SessionSetup {
            id,
            name: format!("Game {id}"),
            map_id: 0,
            layout: Arc::new(test_layout()),
            car_physics: Arc::new(CarPhysicsConfig::builtin()),
            npc_config: NpcConfig::default(),
            seed: 42,
        }
    }

    fn join(session: &mut GameSession, id: PlayerId) -> mpsc::Receiver<ServerMsg> {
        let (tx, rx) = mpsc::channel(1024);
        session.add_player(id, tx, Instant::now()).unwrap();
        rx
    }

    fn drain(rx: &mut mpsc::Receiver<ServerMsg>) -> Vec<ServerMsg> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    /// Start and run past the countdown
    fn begin_round(session: &mut GameSession, now: Instant) -> Instant {
        let t = now + Duration::from_secs(STARTING_COUNTDOWN_SECS);
        session.tick(t, FIXED_STEP).unwrap();
        assert_eq!(session.state.state(), GameState::Playing);
        t
    }

    #[test]
    fn test_start_enters_countdown() {
        let (mut session, _handle) = GameSession::new(setup(1));
        let mut rx = join(&mut session, 1);

        let now = Instant::now();
        assert!(session.start_game(now));
        assert_eq!(session.state.state(), GameState::Starting);
        assert!(drain(&mut rx)
            .iter()
            .any(|m| matches!(m, ServerMsg::StartingCountdown { seconds: 10 })));

        // a second start during the countdown is refused
        assert!(!session.start_game(now));
    }

    #[test]
    fn test_countdown_then_game_started() {
        let (mut session, _handle) = GameSession::new(setup(1));
        let mut rx = join(&mut session, 1);
        let now = Instant::now();
        session.start_game(now);

        session.tick(now + Duration::from_secs(1), FIXED_STEP).unwrap();
        assert_eq!(session.state.state(), GameState::Starting);

        begin_round(&mut session, now);
        let msgs = drain(&mut rx);
        assert!(msgs.iter().any(|m| matches!(m, ServerMsg::GameStarted { round: 0 })));
        assert!(msgs.iter().any(|m| matches!(m, ServerMsg::UpdatePositions { .. })));
    }

    #[test]
    fn test_join_refused_once_started() {
        let (mut session, _handle) = GameSession::new(setup(1));
        let _rx = join(&mut session, 1);
        session.start_game(Instant::now());

        let (tx, _rx2) = mpsc::channel(8);
        assert_eq!(session.add_player(2, tx, Instant::now()), Err(JoinError::NotJoinable));
        assert_eq!(session.players.len(), 1);
    }

    #[test]
    fn test_remove_player_twice() {
        let (mut session, _handle) = GameSession::new(setup(1));
        let _rx = join(&mut session, 1);
        session.remove_player(1);
        session.remove_player(1);
        assert!(session.players.is_empty());
        assert!(session.broadcast.is_empty());
    }

    #[test]
    fn test_skipped_round_publishes_times_and_advances() {
        let (mut session, _handle) = GameSession::new(setup(1));
        let mut rx = join(&mut session, 1);
        let now = Instant::now();
        session.start_game(now);
        let t = begin_round(&mut session, now);
        drain(&mut rx);

        session.handle_action(1, GameAction::Cheat(CheatKind::SkipRound));
        session.tick(t + Duration::from_millis(16), FIXED_STEP).unwrap();

        let msgs = drain(&mut rx);
        assert!(msgs.iter().any(|m| matches!(m, ServerMsg::RaceTimes { round: 0, .. })));
        assert!(msgs.iter().any(|m| matches!(m, ServerMsg::StartingCountdown { .. })));
        assert_eq!(session.state.state(), GameState::Starting);
        assert_eq!(session.race.current_round(), 1);
        assert_eq!(session.checkpoints.len(), 2);

        let player = session.players.get(1).unwrap();
        assert_eq!(player.rounds_completed, 1);
        assert!(!player.race_finished);
    }

    #[test]
    fn test_championship_returns_to_lobby() {
        let (mut session, _handle) = GameSession::new(setup(1));
        let mut rx = join(&mut session, 1);
        let mut now = Instant::now();
        session.start_game(now);

        for _ in 0..TOTAL_ROUNDS {
            now = begin_round(&mut session, now);
            session.handle_action(1, GameAction::Cheat(CheatKind::SkipRound));
            now += Duration::from_millis(16);
            session.tick(now, FIXED_STEP).unwrap();
        }

        let msgs = drain(&mut rx);
        assert!(msgs.iter().any(|m| matches!(m, ServerMsg::TotalTimes { .. })));
        assert_eq!(session.state.state(), GameState::Lobby);
        assert_eq!(session.race.current_round(), 0);

        let player = session.players.get(1).unwrap();
        assert_eq!(player.rounds_completed, 0);
        assert_eq!(player.total_time_ms, 0);
    }

    #[test]
    fn test_closed_outbox_prunes_player() {
        let (mut session, _handle) = GameSession::new(setup(1));
        let rx = join(&mut session, 1);
        let _rx2 = join(&mut session, 2);
        drop(rx);

        session.start_game(Instant::now());
        assert!(!session.players.contains(1));
        assert!(session.players.contains(2));
    }

    #[tokio::test]
    async fn test_handle_round_trip_and_idempotent_stop() {
        let (session, handle) = GameSession::new(setup(7));
        let task = tokio::spawn(session.run());

        let (tx, _rx) = mpsc::channel(64);
        tokio_test::assert_ok!(handle.add_player(1, tx).await);
        assert_eq!(handle.player_count(), 1);
        assert_eq!(handle.state(), GameState::Lobby);
        assert_eq!(handle.info().max_players, 3);

        handle.stop();
        handle.stop();
        task.await.unwrap();
        assert!(handle.is_stopped());
        tokio_test::assert_err!(handle.start_game());

        let (tx, _rx) = mpsc::channel(64);
        assert_eq!(handle.add_player(2, tx).await, Err(JoinError::Closed));
    }
}
