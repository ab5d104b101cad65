//! # Pong Relay Server Library
//!
//! This library provides the authoritative server implementation for a
//! two-player networked paddle-and-ball game. It manages the canonical game
//! state, processes client intents, and broadcasts updates to keep every
//! connected party synchronized.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! The server runs the definitive version of the game physics and state.
//! Clients report movement intent only; paddle positions, ball kinematics,
//! scores, and match phase are computed here on a fixed tick and pushed out.
//! No client-reported physics is ever trusted or merged.
//!
//! ### Session Management
//! Handles the complete lifecycle of connections:
//! - Role assignment on accept: the first two connections become the Left
//!   and Right players, everyone after that spectates
//! - Display-initials registration for the leaderboard
//! - Disconnect handling that frees a player's role for the next connection
//!
//! ### State Broadcasting
//! Once per tick the server fans a role-specific view of the state out to
//! every session: players see the opponent's paddle, spectators see both.
//! Delivery is best-effort: a dead connection is pruned without disturbing
//! the tick or the remaining sessions.
//!
//! ## Architecture Design
//!
//! ### One Mutex, Many Tasks
//! The game state and the session registry live behind a single mutex.
//! Each connection gets a reader task (the input relay) and a writer task
//! (draining an outbound channel); a periodic task advances the simulation
//! and builds broadcast snapshots. All of them take the same lock for their
//! read-modify-write sections, and the lock is never held across a socket
//! write, so any payload a client receives reflects one internally
//! consistent tick.
//!
//! ### Text Protocol over TCP
//! Each accepted connection is a persistent duplex text stream with
//! `;`/newline-terminated records (see the `shared` crate for the full
//! protocol). Malformed records are ignored without dropping the
//! connection; only transport failure ends a session.
//!
//! ## Module Organization
//!
//! - [`game`]: the shared game state and the fixed-timestep simulation
//!   (paddle integration, wall and paddle collisions, scoring, win
//!   detection, and the replay reset)
//! - [`session`]: the session registry with role assignment, the live
//!   session set, and display initials
//! - [`relay`]: the per-connection input relay worker
//! - [`network`]: the TCP accept loop, tick driver, and broadcast fan-out
//! - [`leaderboard`]: win tallies behind a `record_win`/`snapshot`
//!   interface, with optional JSON persistence and a small web page
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::leaderboard::Leaderboard;
//! use server::network::Server;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let leaderboard = Arc::new(Leaderboard::new());
//!
//!     // 60 Hz simulation on the default port.
//!     let server = Server::bind(
//!         "127.0.0.1:5555",
//!         Duration::from_micros(16_667),
//!         leaderboard,
//!     )
//!     .await?;
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod game;
pub mod leaderboard;
pub mod network;
pub mod relay;
pub mod session;
