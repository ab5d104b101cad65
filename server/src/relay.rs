//! Per-connection input relay.
//!
//! One relay task runs for each accepted connection. It turns raw socket
//! bytes into protocol records, applies them to the shared state under the
//! lock, and unregisters the session on every exit path: end-of-stream,
//! transport error, or idle expiry. Malformed records are logged and
//! skipped; only the transport ends a session.

use crate::network::SharedHandle;
use log::{debug, info};
use shared::{drain_records, ClientMessage, Role, ServerMessage};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::timeout;

/// How long a connection may stay silent before its role is reclaimed.
const READ_DEADLINE: Duration = Duration::from_secs(300);

/// Runs the relay until the connection dies, then cleans up its session.
pub async fn run<R>(shared: SharedHandle, reader: R, session_id: u32, role: Role)
where
    R: AsyncRead + Unpin,
{
    if let Err(e) = read_loop(&shared, reader, session_id, role).await {
        debug!("session {} transport error: {}", session_id, e);
    }

    // Every exit path funnels through here, so a session can never leak
    // its role. The broadcast path may have pruned this session already
    // and handed its role to a newer connection; freeing the paddle only
    // when the removal actually happened keeps that paddle intact.
    let mut guard = shared.lock().await;
    if let Some(session) = guard.sessions.remove(session_id) {
        if session.role.is_player() {
            guard.game.remove_paddle(session.role);
        }
    }
}

async fn read_loop<R>(
    shared: &SharedHandle,
    mut reader: R,
    session_id: u32,
    role: Role,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 1024];
    let mut pending = String::new();

    loop {
        // The blocking read never holds the shared mutex.
        let n = match timeout(READ_DEADLINE, reader.read(&mut buf)).await {
            Ok(result) => result?,
            Err(_) => {
                info!(
                    "session {} silent for {}s, reclaiming its slot",
                    session_id,
                    READ_DEADLINE.as_secs()
                );
                return Ok(());
            }
        };
        if n == 0 {
            debug!("session {} closed by peer", session_id);
            return Ok(());
        }

        pending.push_str(&String::from_utf8_lossy(&buf[..n]));
        for record in drain_records(&mut pending) {
            apply_record(shared, session_id, role, &record).await;
        }
    }
}

/// Parses one record and applies it under the shared lock. Spectators are
/// read-only: whatever they send is ignored.
async fn apply_record(shared: &SharedHandle, session_id: u32, role: Role, record: &str) {
    let message = match ClientMessage::parse(record) {
        Ok(message) => message,
        Err(e) => {
            debug!("session {}: ignoring record: {}", session_id, e);
            return;
        }
    };

    match message {
        ClientMessage::Initials(name) => {
            if !role.is_player() {
                return;
            }
            let mut guard = shared.lock().await;
            guard.sessions.set_initials(session_id, &name);
        }
        ClientMessage::Move(intent) => {
            if !role.is_player() {
                return;
            }
            let mut guard = shared.lock().await;
            guard.game.set_intent(role, intent);
        }
        ClientMessage::PlayAgain => {
            if !role.is_player() {
                return;
            }
            let mut guard = shared.lock().await;
            if guard.game.request_replay(role) {
                // Second vote: the reset already happened, announce it now
                // rather than on the next tick.
                let failed = guard.queue_to_all(&ServerMessage::Start);
                guard.prune(&failed);
            }
        }
    }
}
