//! Wire protocol and game constants shared between the relay server and its
//! clients.
//!
//! The transport is a persistent duplex TCP text stream. Records are UTF-8
//! and terminated by `;` or a newline; [`drain_records`] turns a raw receive
//! buffer into complete records. [`ClientMessage`] and [`ServerMessage`] give
//! both directions a typed form with text parsing and formatting.

use std::fmt;
use thiserror::Error;

pub const SCREEN_WIDTH: i32 = 640;
pub const SCREEN_HEIGHT: i32 = 480;
pub const PADDLE_HEIGHT: i32 = 50;
pub const PADDLE_WIDTH: i32 = 10;
/// Paddle travel per tick while an Up/Down intent is held.
pub const PADDLE_SPEED: i32 = 5;
pub const BALL_SPEED_X: i32 = 5;
pub const BALL_SPEED_Y: i32 = 3;
/// First score to reach this tally wins the match.
pub const WIN_THRESHOLD: u32 = 5;
/// Vertical position of a freshly centered paddle.
pub const PADDLE_START_Y: i32 = (SCREEN_HEIGHT - PADDLE_HEIGHT) / 2;

/// The logical identity a connection is assigned for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Left,
    Right,
    Spectator,
}

impl Role {
    /// Whether this role owns a paddle.
    pub fn is_player(&self) -> bool {
        matches!(self, Role::Left | Role::Right)
    }

    /// The paddle on the other side of the screen, for player roles.
    pub fn opponent(&self) -> Option<Role> {
        match self {
            Role::Left => Some(Role::Right),
            Role::Right => Some(Role::Left),
            Role::Spectator => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Left => "left",
            Role::Right => "right",
            Role::Spectator => "spectator",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Movement intent reported by a player. The server integrates it into a
/// paddle position at a fixed per-tick speed; clients never move paddles
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MoveIntent {
    Up,
    Down,
    #[default]
    Stop,
}

/// Errors produced while parsing a single client record.
///
/// Parse failures never terminate a connection; callers log them and move on.
/// Keeping the kinds distinct from transport errors (`std::io::Error`) lets
/// tests assert on the cause of a rejected message.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty record")]
    EmptyRecord,
    #[error("INITIALS record carries no name")]
    EmptyInitials,
    #[error("unrecognized message: {0:?}")]
    Unrecognized(String),
}

/// A single record sent by a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// Bare `up` | `down` | `stop` token.
    Move(MoveIntent),
    /// `INITIALS:<name>` - display name for the leaderboard.
    Initials(String),
    /// `PLAY_AGAIN` - vote to restart after a finished match.
    PlayAgain,
}

impl ClientMessage {
    /// Parses one record (already stripped of its terminator).
    pub fn parse(record: &str) -> Result<Self, ParseError> {
        let record = record.trim();
        if record.is_empty() {
            return Err(ParseError::EmptyRecord);
        }
        if let Some(name) = record.strip_prefix("INITIALS:") {
            let name = name.trim();
            if name.is_empty() {
                return Err(ParseError::EmptyInitials);
            }
            return Ok(ClientMessage::Initials(name.to_string()));
        }
        match record {
            "up" => Ok(ClientMessage::Move(MoveIntent::Up)),
            "down" => Ok(ClientMessage::Move(MoveIntent::Down)),
            "stop" => Ok(ClientMessage::Move(MoveIntent::Stop)),
            "PLAY_AGAIN" => Ok(ClientMessage::PlayAgain),
            other => Err(ParseError::Unrecognized(other.to_string())),
        }
    }
}

/// A single record sent to a client. `Display` produces the wire form,
/// terminator included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Sent once on connect: screen size and the assigned role.
    Welcome { role: Role },
    /// Sent to everyone when the match begins (or restarts).
    Start,
    /// Per-tick view for a player: the opponent's paddle plus the ball and
    /// scores.
    PlayerState {
        opponent_y: i32,
        ball_x: i32,
        ball_y: i32,
        left_score: u32,
        right_score: u32,
        revision: u64,
    },
    /// Per-tick view for a spectator: both paddles plus the ball and scores.
    SpectatorState {
        left_y: i32,
        right_y: i32,
        ball_x: i32,
        ball_y: i32,
        left_score: u32,
        right_score: u32,
        revision: u64,
    },
    /// Sent once when a score reaches the win threshold.
    GameOver { winner: Role },
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMessage::Welcome { role } => {
                write!(f, "{},{},{};", SCREEN_WIDTH, SCREEN_HEIGHT, role)
            }
            ServerMessage::Start => f.write_str("START;"),
            ServerMessage::PlayerState {
                opponent_y,
                ball_x,
                ball_y,
                left_score,
                right_score,
                revision,
            } => write!(
                f,
                "{},{},{},{},{},{};",
                opponent_y, ball_x, ball_y, left_score, right_score, revision
            ),
            ServerMessage::SpectatorState {
                left_y,
                right_y,
                ball_x,
                ball_y,
                left_score,
                right_score,
                revision,
            } => write!(
                f,
                "{},{},{},{},{},{},{};",
                left_y, right_y, ball_x, ball_y, left_score, right_score, revision
            ),
            ServerMessage::GameOver { winner } => write!(f, "GAME_OVER Winner={};", winner),
        }
    }
}

/// Splits complete records off the front of a receive buffer.
///
/// Records end at `;` or `\n`; whatever follows the last terminator stays in
/// `buf` until more bytes arrive. Terminators and surrounding whitespace are
/// stripped, and empty records (e.g. from `;\n`) are dropped.
pub fn drain_records(buf: &mut String) -> Vec<String> {
    let mut records = Vec::new();
    while let Some(pos) = buf.find(|c| c == ';' || c == '\n') {
        let raw: String = buf.drain(..=pos).collect();
        let record = raw.trim_end_matches([';', '\n']).trim();
        if !record.is_empty() {
            records.push(record.to_string());
        }
    }
    records
}
