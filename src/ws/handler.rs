//! WebSocket upgrade handler and per-connection command dispatch

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::app::AppState;
use crate::game::broadcast::Outbox;
use crate::game::{GameAction, PlayerId};
use crate::lobby::SessionRegistry;
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Outbound frames buffered per connection before new ones are dropped
pub const OUTBOX_CAPACITY: usize = 100;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let player_id = state.next_connection_id();
    ws.on_upgrade(move |socket| handle_socket(socket, player_id, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, player_id: PlayerId, state: AppState) {
    info!(player_id, "New WebSocket connection");

    let (ws_sink, mut ws_stream) = socket.split();
    let (outbox, outbox_rx) = mpsc::channel(OUTBOX_CAPACITY);
    let writer_handle = tokio::spawn(write_loop(player_id, ws_sink, outbox_rx));

    let dispatcher = ConnectionDispatcher::new(
        player_id,
        state.registry.clone(),
        outbox,
        state.config.input_rate_limit,
    );

    // Reader loop: WebSocket -> registry / session
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => dispatcher.handle_text(&text).await,
            Ok(Message::Binary(_)) => {
                warn!(player_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(player_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(player_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    dispatcher.disconnect();
    writer_handle.abort();
    info!(player_id, "WebSocket connection closed");
}

/// Pop the outbound queue into the socket until the queue closes or a write fails
async fn write_loop(
    player_id: PlayerId,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut outbox_rx: mpsc::Receiver<ServerMsg>,
) {
    while let Some(msg) = outbox_rx.recv().await {
        if let Err(e) = send_msg(&mut ws_sink, &msg).await {
            debug!(player_id, error = %e, "WebSocket send failed");
            break;
        }
    }
    debug!(player_id, "Writer finished");
}

/// Send a message over WebSocket
async fn send_msg(sink: &mut SplitSink<WebSocket, Message>, msg: &ServerMsg) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json)).await.map_err(|e| e.to_string())
}

/// In-session command carried by a client message; None for lobby commands
pub fn game_action(msg: &ClientMsg) -> Option<GameAction> {
    if let Some(movement) = msg.movement() {
        return Some(GameAction::Move(movement));
    }
    match msg {
        ClientMsg::SelectCar { car } => Some(GameAction::SelectCar(*car)),
        ClientMsg::Upgrade { stat } => Some(GameAction::Upgrade(*stat)),
        ClientMsg::Cheat { kind } => Some(GameAction::Cheat(*kind)),
        _ => None,
    }
}

/// Routes one connection's commands to the registry or to its session
pub struct ConnectionDispatcher {
    player_id: PlayerId,
    registry: Arc<SessionRegistry>,
    outbox: Outbox,
    limiter: ConnectionRateLimiter,
}

impl ConnectionDispatcher {
    pub fn new(
        player_id: PlayerId,
        registry: Arc<SessionRegistry>,
        outbox: Outbox,
        commands_per_second: u32,
    ) -> Self {
        Self {
            player_id,
            registry,
            outbox,
            limiter: ConnectionRateLimiter::new(commands_per_second),
        }
    }

    /// Parse and handle one text frame
    pub async fn handle_text(&self, text: &str) {
        if !self.limiter.check() {
            warn!(player_id = self.player_id, "Rate limited client command");
            return;
        }
        match serde_json::from_str::<ClientMsg>(text) {
            Ok(msg) => self.handle(msg).await,
            Err(e) => {
                warn!(player_id = self.player_id, error = %e, "Failed to parse client message");
            }
        }
    }

    pub async fn handle(&self, msg: ClientMsg) {
        if let Some(action) = game_action(&msg) {
            self.registry.dispatch(self.player_id, action);
            return;
        }

        let id = self.player_id;
        match msg {
            ClientMsg::CreateGame { name, map_id } => {
                let reply = self.registry.create(id, self.outbox.clone(), &name, map_id).await;
                self.reply(reply);
            }
            ClientMsg::JoinGame { game_id } => {
                let reply = self.registry.join(id, game_id, self.outbox.clone()).await;
                self.reply(reply);
            }
            ClientMsg::ListGames => {
                self.reply(ServerMsg::GamesList {
                    games: self.registry.list(),
                });
            }
            ClientMsg::StartGame { game_id } => {
                let target = game_id.or_else(|| self.registry.session_of(id).map(|s| s.id));
                let Some(game_id) = target else {
                    self.reply(ServerMsg::Error {
                        message: "not in a game".to_string(),
                    });
                    return;
                };
                if !self.registry.start(game_id) {
                    self.reply(ServerMsg::Error {
                        message: format!("game {game_id} not found"),
                    });
                }
            }
            ClientMsg::LeaveGame => self.registry.leave(id),
            other => debug!(player_id = id, msg = ?other, "Unhandled client message"),
        }
    }

    /// Synthetic leave for a closed connection
    pub fn disconnect(&self) {
        self.registry.leave(self.player_id);
    }

    fn reply(&self, msg: ServerMsg) {
        if let Err(e) = self.outbox.try_send(msg) {
            warn!(player_id = self.player_id, error = %e, "Reply dropped");
        }
    }
}
