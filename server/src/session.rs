//! Session lifecycle and role assignment.
//!
//! The registry owns every live connection's descriptor: its stable id, the
//! role it was assigned on accept, optional display initials, and the
//! channel its writer task drains. At most one Left and one Right session
//! exist at a time; everyone else spectates. The registry itself holds no
//! lock: it lives inside the server's shared mutex next to the game state
//! so role assignment stays atomic with paddle setup.

use log::info;
use shared::Role;
use std::collections::HashMap;
use tokio::sync::mpsc;

/// Handle used to queue outbound records for one connection.
pub type OutboundSender = mpsc::UnboundedSender<String>;

/// A connected client and the role it holds.
#[derive(Debug)]
pub struct Session {
    pub id: u32,
    pub role: Role,
    /// Display name for the leaderboard; `None` until `INITIALS:` arrives.
    pub initials: Option<String>,
    pub tx: OutboundSender,
}

/// All live sessions, keyed by a stable id so concurrent removals never
/// invalidate another session's handle.
pub struct SessionRegistry {
    sessions: HashMap<u32, Session>,
    next_session_id: u32,
}

impl SessionRegistry {
    pub fn new() -> Self {
        SessionRegistry {
            sessions: HashMap::new(),
            next_session_id: 1,
        }
    }

    /// Adds a session, assigning the first free role among Left and Right,
    /// or Spectator when both are taken.
    pub fn register(&mut self, tx: OutboundSender) -> (u32, Role) {
        let role = if !self.role_taken(Role::Left) {
            Role::Left
        } else if !self.role_taken(Role::Right) {
            Role::Right
        } else {
            Role::Spectator
        };

        let id = self.next_session_id;
        self.next_session_id += 1;
        self.sessions.insert(
            id,
            Session {
                id,
                role,
                initials: None,
                tx,
            },
        );
        info!("session {} joined as {}", id, role);
        (id, role)
    }

    /// Drops a session, freeing its role for a future connection. Safe to
    /// call twice; the second call is a no-op.
    pub fn remove(&mut self, id: u32) -> Option<Session> {
        let session = self.sessions.remove(&id);
        if let Some(session) = &session {
            info!("session {} ({}) left", session.id, session.role);
        }
        session
    }

    fn role_taken(&self, role: Role) -> bool {
        self.sessions.values().any(|s| s.role == role)
    }

    /// Level signal behind the edge-triggered match-ready contract: true
    /// while both player roles are occupied. Callers track whether they
    /// already announced the start.
    pub fn both_players_present(&self) -> bool {
        self.role_taken(Role::Left) && self.role_taken(Role::Right)
    }

    /// Records a display name for the session, ignoring blank input.
    pub fn set_initials(&mut self, id: u32, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        if let Some(session) = self.sessions.get_mut(&id) {
            info!("session {} set initials to {}", id, text);
            session.initials = Some(text.to_string());
        }
    }

    /// The name shown for `role` on the leaderboard: its session's initials,
    /// or the role name when none were ever set.
    pub fn display_name(&self, role: Role) -> String {
        self.sessions
            .values()
            .find(|s| s.role == role)
            .and_then(|s| s.initials.clone())
            .unwrap_or_else(|| role.to_string())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
