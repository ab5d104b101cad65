//! TCP accept loop, the fixed-rate tick driver, and the broadcast fan-out.
//!
//! The game state and the session registry share one mutex ([`Shared`]);
//! every worker gets a reference-counted handle to it. The lock is held only
//! for read-modify-write sections; actual socket writes happen in a
//! per-connection writer task fed by an unbounded channel, so a slow or dead
//! peer can never stall the tick or another session's delivery.

use crate::game::GameState;
use crate::leaderboard::Leaderboard;
use crate::relay;
use crate::session::{OutboundSender, SessionRegistry};
use log::{debug, error, info, warn};
use shared::{Role, ServerMessage};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval, MissedTickBehavior};

/// Everything behind the single shared mutex: the authoritative game state
/// and the live session set. Role assignment, paddle setup, simulation and
/// broadcast snapshots all happen under one acquisition, so no observer can
/// see a half-updated tick.
pub struct Shared {
    pub game: GameState,
    pub sessions: SessionRegistry,
    /// Latch for the one-time match-start notification.
    pub start_sent: bool,
}

pub type SharedHandle = Arc<Mutex<Shared>>;

impl Shared {
    pub fn new() -> Self {
        Shared {
            game: GameState::new(),
            sessions: SessionRegistry::new(),
            start_sent: false,
        }
    }

    /// Queues a record on every live session. Returns the ids whose writer
    /// is already gone so the caller can prune them.
    pub fn queue_to_all(&self, message: &ServerMessage) -> Vec<u32> {
        let payload = message.to_string();
        let mut failed = Vec::new();
        for session in self.sessions.iter() {
            if session.tx.send(payload.clone()).is_err() {
                failed.push(session.id);
            }
        }
        failed
    }

    /// Drops dead sessions and frees their paddles.
    pub fn prune(&mut self, ids: &[u32]) {
        for id in ids {
            if let Some(session) = self.sessions.remove(*id) {
                warn!("session {} unreachable, dropping it", id);
                if session.role.is_player() {
                    self.game.remove_paddle(session.role);
                }
            }
        }
    }

    /// The per-tick record for one role's view of the state.
    fn state_message_for(&self, role: Role) -> ServerMessage {
        let game = &self.game;
        match role {
            Role::Left | Role::Right => ServerMessage::PlayerState {
                // Player roles always have an opponent role.
                opponent_y: game.paddle_y(role.opponent().unwrap_or(Role::Right)),
                ball_x: game.ball.x,
                ball_y: game.ball.y,
                left_score: game.score.left,
                right_score: game.score.right,
                revision: game.revision,
            },
            Role::Spectator => ServerMessage::SpectatorState {
                left_y: game.paddle_y(Role::Left),
                right_y: game.paddle_y(Role::Right),
                ball_x: game.ball.x,
                ball_y: game.ball.y,
                left_score: game.score.left,
                right_score: game.score.right,
                revision: game.revision,
            },
        }
    }

    /// Snapshots one consistent view per session, cloning the channel
    /// handles so delivery can happen after the lock is released. When a
    /// match just ended, each session also gets the `GAME_OVER` record.
    fn build_payloads(&self, winner: Option<Role>) -> Vec<(u32, OutboundSender, String)> {
        let mut payloads = Vec::with_capacity(self.sessions.len() * 2);
        for session in self.sessions.iter() {
            payloads.push((
                session.id,
                session.tx.clone(),
                self.state_message_for(session.role).to_string(),
            ));
            if let Some(winner) = winner {
                payloads.push((
                    session.id,
                    session.tx.clone(),
                    ServerMessage::GameOver { winner }.to_string(),
                ));
            }
        }
        payloads
    }
}

impl Default for Shared {
    fn default() -> Self {
        Self::new()
    }
}

/// Queues each payload on its session's channel. Best-effort: a closed
/// channel marks that session failed and delivery to the rest continues.
fn deliver(payloads: Vec<(u32, OutboundSender, String)>) -> Vec<u32> {
    let mut failed = Vec::new();
    for (id, tx, payload) in payloads {
        if tx.send(payload).is_err() && !failed.contains(&id) {
            failed.push(id);
        }
    }
    failed
}

/// The relay server: accepts connections, drives the simulation at a fixed
/// rate, and fans state out to every session.
pub struct Server {
    listener: TcpListener,
    shared: SharedHandle,
    leaderboard: Arc<Leaderboard>,
    tick_duration: Duration,
}

impl Server {
    /// Binds the listening socket. A bind failure is fatal and propagates.
    pub async fn bind(
        addr: &str,
        tick_duration: Duration,
        leaderboard: Arc<Leaderboard>,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("server listening on {}", listener.local_addr()?);
        Ok(Server {
            listener,
            shared: Arc::new(Mutex::new(Shared::new())),
            leaderboard,
            tick_duration,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Main loop: new connections and simulation ticks, interleaved. Runs
    /// until the task is dropped (shutdown is handled by the caller).
    pub async fn run(self) -> std::io::Result<()> {
        let mut ticker = interval(self.tick_duration);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => self.handle_connection(stream, addr).await,
                        Err(e) => {
                            // Keep serving the sessions we already have.
                            error!("accept failed: {}", e);
                            tokio::time::sleep(Duration::from_millis(100)).await;
                        }
                    }
                }
                _ = ticker.tick() => {
                    self.step().await;
                }
            }
        }
    }

    /// Registers the connection, sends its welcome record, announces the
    /// match start on the edge where both players first became present, and
    /// spawns the reader and writer tasks.
    async fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let (reader, writer) = stream.into_split();
        let (tx, rx) = mpsc::unbounded_channel::<String>();

        let (id, role) = {
            let mut shared = self.shared.lock().await;
            let (id, role) = shared.sessions.register(tx.clone());
            if role.is_player() {
                shared.game.add_paddle(role);
            }
            // Queued before the writer task starts, so the welcome is
            // always the first record on the wire.
            let _ = tx.send(ServerMessage::Welcome { role }.to_string());
            if shared.sessions.both_players_present() && !shared.start_sent {
                shared.start_sent = true;
                info!("both players connected, match starting");
                let failed = shared.queue_to_all(&ServerMessage::Start);
                shared.prune(&failed);
            }
            (id, role)
        };
        info!("client {} connected as {} (session {})", addr, role, id);

        tokio::spawn(write_outbound(writer, rx));
        tokio::spawn(relay::run(Arc::clone(&self.shared), reader, id, role));
    }

    /// One simulation tick plus the broadcast fan-out. Everything that
    /// reads or writes state happens under a single lock acquisition; the
    /// sends themselves happen after it is released.
    async fn step(&self) {
        let (payloads, win) = {
            let mut shared = self.shared.lock().await;
            if !shared.start_sent {
                // The field stays frozen until the first match start.
                return;
            }
            shared.game.tick();
            let win = shared
                .game
                .take_unrecorded_win()
                .map(|winner| (winner, shared.sessions.display_name(winner)));
            let payloads = shared.build_payloads(win.as_ref().map(|(winner, _)| *winner));
            (payloads, win)
        };

        if let Some((winner, name)) = win {
            info!("match over, {} ({}) wins", name, winner);
            self.leaderboard.record_win(&name);
        }

        let failed = deliver(payloads);
        if !failed.is_empty() {
            let mut shared = self.shared.lock().await;
            shared.prune(&failed);
        }
    }
}

/// Drains one session's outbound queue onto its socket. Exits when the
/// session is pruned (channel closed) or the peer stops accepting writes;
/// either way the socket drops here and the read side unblocks.
async fn write_outbound(mut writer: OwnedWriteHalf, mut rx: mpsc::UnboundedReceiver<String>) {
    while let Some(payload) = rx.recv().await {
        if let Err(e) = writer.write_all(payload.as_bytes()).await {
            debug!("write failed, abandoning connection: {}", e);
            break;
        }
    }
}
