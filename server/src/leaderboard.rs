//! Win tallies and the read-only web page that shows them.
//!
//! The relay core only ever touches this module through [`Leaderboard::record_win`]
//! and [`Leaderboard::snapshot`]; everything else (the JSON file on disk,
//! the HTML table) is presentation. The board keeps its own lock, separate
//! from the game mutex.

use axum::extract::State;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// On-disk shape of the board.
#[derive(Debug, Default, Serialize, Deserialize)]
struct SavedBoard {
    wins: HashMap<String, u32>,
}

/// Maps player initials to total wins across matches.
pub struct Leaderboard {
    wins: Mutex<HashMap<String, u32>>,
    path: Option<PathBuf>,
}

impl Leaderboard {
    /// An in-memory board that forgets everything on restart.
    pub fn new() -> Self {
        Self::with_persistence(None)
    }

    /// A board backed by a JSON file. A missing or corrupt file degrades to
    /// an empty board; it never aborts startup.
    pub fn with_persistence(path: Option<PathBuf>) -> Self {
        let wins = match &path {
            Some(path) => load_board(path),
            None => HashMap::new(),
        };
        Leaderboard {
            wins: Mutex::new(wins),
            path,
        }
    }

    /// Bumps the win count for `initials` and persists the board when a
    /// file is configured.
    pub fn record_win(&self, initials: &str) {
        let mut wins = self.wins.lock().unwrap_or_else(|e| e.into_inner());
        let total = wins.entry(initials.to_string()).or_insert(0);
        *total += 1;
        info!("recorded win for {}: {} total", initials, total);

        if let Some(path) = &self.path {
            save_board(path, &wins);
        }
    }

    /// A copy of the current tallies for display.
    pub fn snapshot(&self) -> HashMap<String, u32> {
        self.wins
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Default for Leaderboard {
    fn default() -> Self {
        Self::new()
    }
}

fn load_board(path: &Path) -> HashMap<String, u32> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return HashMap::new(),
        Err(e) => {
            warn!("could not read leaderboard file {}: {}", path.display(), e);
            return HashMap::new();
        }
    };
    match serde_json::from_str::<SavedBoard>(&contents) {
        Ok(board) => board.wins,
        Err(e) => {
            warn!(
                "ignoring corrupt leaderboard file {}: {}",
                path.display(),
                e
            );
            HashMap::new()
        }
    }
}

fn save_board(path: &Path, wins: &HashMap<String, u32>) {
    let board = SavedBoard { wins: wins.clone() };
    let result = serde_json::to_string_pretty(&board)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        .and_then(|json| std::fs::write(path, json));
    if let Err(e) = result {
        warn!("could not persist leaderboard to {}: {}", path.display(), e);
    }
}

/// Routes for the leaderboard page.
pub fn router(leaderboard: Arc<Leaderboard>) -> Router {
    Router::new()
        .route("/", get(page))
        .with_state(leaderboard)
}

/// Serves the page until the process exits.
pub async fn serve(leaderboard: Arc<Leaderboard>, addr: &str) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("leaderboard page at http://{}/", listener.local_addr()?);
    axum::serve(listener, router(leaderboard)).await
}

async fn page(State(leaderboard): State<Arc<Leaderboard>>) -> Html<String> {
    let mut entries: Vec<(String, u32)> = leaderboard.snapshot().into_iter().collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let rows: String = entries
        .iter()
        .map(|(initials, wins)| {
            format!(
                "<tr><td>{}</td><td>{}</td></tr>",
                escape_html(initials),
                wins
            )
        })
        .collect();

    Html(format!(
        "<html>\
         <head><title>Pong Leaderboard</title></head>\
         <body>\
         <h1>Pong Leaderboard</h1>\
         <table border=\"1\" cellpadding=\"6\">\
         <tr><th>Player</th><th>Wins</th></tr>\
         {}\
         </table>\
         </body>\
         </html>",
        rows
    ))
}

/// Initials come straight off the wire, so they get escaped before landing
/// in markup.
fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
