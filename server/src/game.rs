//! Authoritative game state and the fixed-timestep simulation.
//!
//! All fields here are only ever touched under the server's shared mutex;
//! nothing in this module does I/O or locking of its own.

use log::info;
use rand::Rng;
use shared::{
    MoveIntent, Role, BALL_SPEED_X, BALL_SPEED_Y, PADDLE_HEIGHT, PADDLE_SPEED, PADDLE_START_Y,
    PADDLE_WIDTH, SCREEN_HEIGHT, SCREEN_WIDTH, WIN_THRESHOLD,
};
use std::collections::HashMap;

/// One player's paddle: its vertical position and the last reported intent.
#[derive(Debug, Clone, Copy)]
pub struct Paddle {
    pub y: i32,
    pub intent: MoveIntent,
}

impl Paddle {
    fn centered() -> Self {
        Paddle {
            y: PADDLE_START_Y,
            intent: MoveIntent::Stop,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Ball {
    pub x: i32,
    pub y: i32,
    pub vx: i32,
    pub vy: i32,
}

impl Ball {
    fn centered() -> Self {
        Ball {
            x: SCREEN_WIDTH / 2,
            y: SCREEN_HEIGHT / 2,
            vx: BALL_SPEED_X,
            vy: BALL_SPEED_Y,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Score {
    pub left: u32,
    pub right: u32,
}

/// Coarse match state. `AwaitingReplay` is entered once the first replay
/// vote lands after a finished match; both votes return the match to
/// `Playing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPhase {
    Playing,
    GameOver { winner: Role },
    AwaitingReplay { winner: Role },
}

#[derive(Debug, Clone, Copy, Default)]
struct ReplayVotes {
    left: bool,
    right: bool,
}

impl ReplayVotes {
    fn set(&mut self, role: Role) {
        match role {
            Role::Left => self.left = true,
            Role::Right => self.right = true,
            Role::Spectator => {}
        }
    }

    fn both(&self) -> bool {
        self.left && self.right
    }
}

/// The single source of truth for one match.
#[derive(Debug)]
pub struct GameState {
    /// Paddles keyed by the role that owns them; an entry exists only while
    /// that role's session is connected.
    pub paddles: HashMap<Role, Paddle>,
    pub ball: Ball,
    pub score: Score,
    pub phase: MatchPhase,
    replay_votes: ReplayVotes,
    /// Guards the leaderboard write so each match is recorded once; cleared
    /// only by the replay reset.
    win_recorded: bool,
    /// Bumped on every tick and every reset so clients can order updates.
    pub revision: u64,
}

impl GameState {
    pub fn new() -> Self {
        GameState {
            paddles: HashMap::new(),
            ball: Ball::centered(),
            score: Score::default(),
            phase: MatchPhase::Playing,
            replay_votes: ReplayVotes::default(),
            win_recorded: false,
            revision: 0,
        }
    }

    /// Gives `role` a freshly centered paddle.
    pub fn add_paddle(&mut self, role: Role) {
        if !role.is_player() {
            return;
        }
        self.paddles.insert(role, Paddle::centered());
        info!("paddle ready for {}", role);
    }

    /// Frees `role`'s paddle entry when its session goes away.
    pub fn remove_paddle(&mut self, role: Role) {
        if self.paddles.remove(&role).is_some() {
            info!("paddle released for {}", role);
        }
    }

    /// Stores a movement intent. Intents are accepted in every phase but
    /// only move the paddle while the match is playing.
    pub fn set_intent(&mut self, role: Role, intent: MoveIntent) -> bool {
        match self.paddles.get_mut(&role) {
            Some(paddle) => {
                paddle.intent = intent;
                true
            }
            None => false,
        }
    }

    /// The paddle position broadcast for `role`, centered when the role is
    /// currently vacant.
    pub fn paddle_y(&self, role: Role) -> i32 {
        self.paddles.get(&role).map_or(PADDLE_START_Y, |p| p.y)
    }

    /// Advances the simulation by one frame. Does nothing unless the match
    /// is playing.
    pub fn tick(&mut self) {
        if self.phase != MatchPhase::Playing {
            return;
        }

        self.integrate_paddles();

        self.ball.x += self.ball.vx;
        self.ball.y += self.ball.vy;

        if self.ball.y <= 0 || self.ball.y >= SCREEN_HEIGHT {
            self.ball.vy = -self.ball.vy;
        }

        // One scoring decision per tick, directly after integration.
        if self.ball.x < 0 {
            self.score.right += 1;
            self.serve(1);
            self.check_win(Role::Right);
        } else if self.ball.x > SCREEN_WIDTH {
            self.score.left += 1;
            self.serve(-1);
            self.check_win(Role::Left);
        }

        self.bounce_off_paddles();

        self.revision += 1;
    }

    fn integrate_paddles(&mut self) {
        for paddle in self.paddles.values_mut() {
            match paddle.intent {
                MoveIntent::Up => paddle.y -= PADDLE_SPEED,
                MoveIntent::Down => paddle.y += PADDLE_SPEED,
                MoveIntent::Stop => {}
            }
            paddle.y = paddle.y.clamp(0, SCREEN_HEIGHT - PADDLE_HEIGHT);
        }
    }

    /// Centers the ball and serves it toward `direction` (+1 is rightward).
    /// The vertical component keeps its magnitude but the side it favors is
    /// drawn fresh each serve.
    fn serve(&mut self, direction: i32) {
        self.ball.x = SCREEN_WIDTH / 2;
        self.ball.y = SCREEN_HEIGHT / 2;
        self.ball.vx = direction * BALL_SPEED_X;
        self.ball.vy = if rand::thread_rng().gen_bool(0.5) {
            BALL_SPEED_Y
        } else {
            -BALL_SPEED_Y
        };
        info!(
            "{} - {}, serving toward {}",
            self.score.left,
            self.score.right,
            if direction > 0 { "right" } else { "left" }
        );
    }

    fn check_win(&mut self, scorer: Role) {
        let tally = match scorer {
            Role::Left => self.score.left,
            Role::Right => self.score.right,
            Role::Spectator => return,
        };
        if tally >= WIN_THRESHOLD {
            self.phase = MatchPhase::GameOver { winner: scorer };
            info!(
                "{} wins {} - {}",
                scorer, self.score.left, self.score.right
            );
        }
    }

    /// Sign-sets `vx` when the ball is inside a paddle's band. Setting the
    /// sign instead of toggling keeps repeated detection across ticks from
    /// compounding. Vacant roles are skipped.
    fn bounce_off_paddles(&mut self) {
        if let Some(paddle) = self.paddles.get(&Role::Left) {
            if self.ball.x <= PADDLE_WIDTH
                && self.ball.y >= paddle.y
                && self.ball.y <= paddle.y + PADDLE_HEIGHT
            {
                self.ball.vx = self.ball.vx.abs();
            }
        }
        if let Some(paddle) = self.paddles.get(&Role::Right) {
            if self.ball.x >= SCREEN_WIDTH - PADDLE_WIDTH
                && self.ball.y >= paddle.y
                && self.ball.y <= paddle.y + PADDLE_HEIGHT
            {
                self.ball.vx = -self.ball.vx.abs();
            }
        }
    }

    /// Records a replay vote. Returns true when this vote was the second
    /// one and the match was reset; the caller should announce the restart
    /// immediately instead of waiting for the next tick. Votes during a
    /// live match are ignored.
    pub fn request_replay(&mut self, role: Role) -> bool {
        if !role.is_player() {
            return false;
        }
        let winner = match self.phase {
            MatchPhase::GameOver { winner } | MatchPhase::AwaitingReplay { winner } => winner,
            MatchPhase::Playing => return false,
        };
        self.replay_votes.set(role);
        if self.replay_votes.both() {
            self.reset_for_replay();
            true
        } else {
            self.phase = MatchPhase::AwaitingReplay { winner };
            false
        }
    }

    /// Returns the winner to a fresh match: scores zeroed, ball centered
    /// with the default serve, paddles re-centered, votes and the win
    /// record cleared.
    fn reset_for_replay(&mut self) {
        self.score = Score::default();
        self.ball = Ball::centered();
        for paddle in self.paddles.values_mut() {
            *paddle = Paddle::centered();
        }
        self.phase = MatchPhase::Playing;
        self.replay_votes = ReplayVotes::default();
        self.win_recorded = false;
        self.revision += 1;
        info!("both players voted, match restarting");
    }

    /// The winner of a just-finished match, reported exactly once so the
    /// broadcast path can emit `GAME_OVER` and record the win.
    pub fn take_unrecorded_win(&mut self) -> Option<Role> {
        match self.phase {
            MatchPhase::GameOver { winner } if !self.win_recorded => {
                self.win_recorded = true;
                Some(winner)
            }
            _ => None,
        }
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn playing_state() -> GameState {
        let mut state = GameState::new();
        state.add_paddle(Role::Left);
        state.add_paddle(Role::Right);
        state
    }

    /// Parks both paddles away from the ball's row so serves cross the field
    /// without bouncing.
    fn park_paddles(state: &mut GameState) {
        for paddle in state.paddles.values_mut() {
            paddle.y = 0;
        }
        state.ball.y = SCREEN_HEIGHT / 2;
        state.ball.vy = 0;
    }

    fn score_once(state: &mut GameState, scorer: Role) {
        park_paddles(state);
        state.ball.x = SCREEN_WIDTH / 2;
        state.ball.vx = match scorer {
            Role::Left => BALL_SPEED_X,
            _ => -BALL_SPEED_X,
        };
        let before = match scorer {
            Role::Left => state.score.left,
            _ => state.score.right,
        };
        for _ in 0..500 {
            state.tick();
            park_paddles(state);
            let after = match scorer {
                Role::Left => state.score.left,
                _ => state.score.right,
            };
            if after > before {
                return;
            }
        }
        panic!("no score after 500 ticks");
    }

    #[test]
    fn test_paddle_clamp_invariant() {
        let mut state = playing_state();
        state.set_intent(Role::Left, MoveIntent::Up);
        state.set_intent(Role::Right, MoveIntent::Down);

        for _ in 0..200 {
            state.tick();
            for paddle in state.paddles.values() {
                assert!(paddle.y >= 0);
                assert!(paddle.y <= SCREEN_HEIGHT - PADDLE_HEIGHT);
            }
        }
        assert_eq!(state.paddle_y(Role::Left), 0);
        assert_eq!(state.paddle_y(Role::Right), SCREEN_HEIGHT - PADDLE_HEIGHT);
    }

    #[test]
    fn test_up_for_ten_ticks_from_center() {
        let mut state = playing_state();
        assert_eq!(state.paddle_y(Role::Left), 215);

        state.set_intent(Role::Left, MoveIntent::Up);
        for _ in 0..10 {
            state.tick();
        }

        assert_eq!(state.paddle_y(Role::Left), 165);
    }

    #[test]
    fn test_intent_stays_until_replaced() {
        let mut state = playing_state();
        state.set_intent(Role::Left, MoveIntent::Down);
        state.tick();
        state.tick();
        assert_eq!(state.paddle_y(Role::Left), 225);

        state.set_intent(Role::Left, MoveIntent::Stop);
        state.tick();
        assert_eq!(state.paddle_y(Role::Left), 225);
    }

    #[test]
    fn test_wall_bounce_conserves_speed() {
        let mut state = playing_state();
        state.ball.x = SCREEN_WIDTH / 2;
        state.ball.y = 2;
        state.ball.vx = 0;
        state.ball.vy = -BALL_SPEED_Y;

        state.tick();
        // Crossed the top wall: sign flipped, magnitude kept.
        assert_eq!(state.ball.vy, BALL_SPEED_Y);

        let mut state = playing_state();
        state.ball.x = SCREEN_WIDTH / 2;
        state.ball.y = SCREEN_HEIGHT - 1;
        state.ball.vx = 0;
        state.ball.vy = BALL_SPEED_Y;

        state.tick();
        assert_eq!(state.ball.vy, -BALL_SPEED_Y);
    }

    #[test]
    fn test_no_wall_flip_without_crossing() {
        let mut state = playing_state();
        state.ball.x = SCREEN_WIDTH / 2;
        state.ball.y = SCREEN_HEIGHT / 2;
        state.ball.vy = BALL_SPEED_Y;

        state.tick();
        assert_eq!(state.ball.vy, BALL_SPEED_Y);
    }

    #[test]
    fn test_crossing_scores_exactly_once_and_resets() {
        let mut state = playing_state();
        for paddle in state.paddles.values_mut() {
            paddle.y = 0;
        }
        state.ball = Ball {
            x: 638,
            y: 240,
            vx: 5,
            vy: 0,
        };

        state.tick();

        assert_eq!(state.score, Score { left: 1, right: 0 });
        assert_eq!(state.ball.x, 320);
        assert_eq!(state.ball.y, 240);
        assert_eq!(state.ball.vx, -5);
        assert_eq!(state.ball.vy.abs(), BALL_SPEED_Y);
    }

    #[test]
    fn test_score_against_left_serves_rightward() {
        let mut state = playing_state();
        for paddle in state.paddles.values_mut() {
            paddle.y = 300;
        }
        state.ball = Ball {
            x: 3,
            y: 100,
            vx: -5,
            vy: 0,
        };

        state.tick();

        assert_eq!(state.score, Score { left: 0, right: 1 });
        assert_eq!((state.ball.x, state.ball.y), (320, 240));
        assert_eq!(state.ball.vx, 5);
    }

    #[test]
    fn test_left_paddle_bounce_is_idempotent_sign_set() {
        let mut state = playing_state();
        if let Some(paddle) = state.paddles.get_mut(&Role::Left) {
            paddle.y = 200;
        }
        state.ball = Ball {
            x: 12,
            y: 220,
            vx: -5,
            vy: 0,
        };

        state.tick();
        assert_eq!(state.ball.vx, 5);

        // Detected again while still inside the band: the sign is set, not
        // toggled, so the ball keeps moving away from the paddle.
        state.ball.x = 2;
        state.ball.vx = 5;
        state.tick();
        assert_eq!(state.ball.vx, 5);
    }

    #[test]
    fn test_right_paddle_bounce_requires_vertical_overlap() {
        let mut state = playing_state();
        if let Some(paddle) = state.paddles.get_mut(&Role::Right) {
            paddle.y = 0;
        }
        state.ball = Ball {
            x: SCREEN_WIDTH - 12,
            y: 300,
            vx: 5,
            vy: 0,
        };

        state.tick();
        // Ball misses the paddle's vertical span: no bounce.
        assert_eq!(state.ball.vx, 5);
    }

    #[test]
    fn test_missing_roles_are_tolerated() {
        let mut state = GameState::new();
        state.ball = Ball {
            x: 320,
            y: 240,
            vx: 5,
            vy: 3,
        };

        for _ in 0..100 {
            state.tick();
        }
        // No paddles at all: the tick keeps advancing and scores accumulate.
        assert!(state.score.left + state.score.right > 0);
    }

    #[test]
    fn test_win_at_threshold_freezes_physics() {
        let mut state = playing_state();
        for _ in 0..WIN_THRESHOLD {
            score_once(&mut state, Role::Left);
        }

        assert_eq!(state.phase, MatchPhase::GameOver { winner: Role::Left });
        assert_eq!(state.score.left, WIN_THRESHOLD);

        let ball_before = (state.ball.x, state.ball.y);
        let revision_before = state.revision;
        state.set_intent(Role::Right, MoveIntent::Down);
        let paddle_before = state.paddle_y(Role::Right);
        for _ in 0..20 {
            state.tick();
        }
        assert_eq!((state.ball.x, state.ball.y), ball_before);
        assert_eq!(state.paddle_y(Role::Right), paddle_before);
        assert_eq!(state.revision, revision_before);
    }

    #[test]
    fn test_win_reported_exactly_once() {
        let mut state = playing_state();
        for _ in 0..WIN_THRESHOLD {
            score_once(&mut state, Role::Right);
        }

        assert_eq!(state.take_unrecorded_win(), Some(Role::Right));
        assert_eq!(state.take_unrecorded_win(), None);
        state.tick();
        assert_eq!(state.take_unrecorded_win(), None);
    }

    #[test]
    fn test_replay_needs_both_sides() {
        let mut state = playing_state();
        for _ in 0..WIN_THRESHOLD {
            score_once(&mut state, Role::Left);
        }

        assert!(!state.request_replay(Role::Left));
        assert_eq!(
            state.phase,
            MatchPhase::AwaitingReplay { winner: Role::Left }
        );
        // Repeat votes from the same side change nothing.
        assert!(!state.request_replay(Role::Left));
        assert_eq!(state.score.left, WIN_THRESHOLD);

        assert!(state.request_replay(Role::Right));
        assert_eq!(state.phase, MatchPhase::Playing);
        assert_eq!(state.score, Score::default());
        assert_eq!((state.ball.x, state.ball.y), (320, 240));
        assert_eq!((state.ball.vx, state.ball.vy), (BALL_SPEED_X, BALL_SPEED_Y));
        assert_eq!(state.paddle_y(Role::Left), PADDLE_START_Y);
    }

    #[test]
    fn test_replay_reset_rearms_win_record() {
        let mut state = playing_state();
        for _ in 0..WIN_THRESHOLD {
            score_once(&mut state, Role::Left);
        }
        assert_eq!(state.take_unrecorded_win(), Some(Role::Left));

        state.request_replay(Role::Left);
        state.request_replay(Role::Right);

        for _ in 0..WIN_THRESHOLD {
            score_once(&mut state, Role::Right);
        }
        assert_eq!(state.take_unrecorded_win(), Some(Role::Right));
    }

    #[test]
    fn test_replay_vote_ignored_while_playing() {
        let mut state = playing_state();
        assert!(!state.request_replay(Role::Left));
        assert!(!state.request_replay(Role::Right));
        assert_eq!(state.phase, MatchPhase::Playing);
    }

    #[test]
    fn test_spectator_cannot_vote_or_move() {
        let mut state = playing_state();
        assert!(!state.set_intent(Role::Spectator, MoveIntent::Up));
        for _ in 0..WIN_THRESHOLD {
            score_once(&mut state, Role::Left);
        }
        assert!(!state.request_replay(Role::Spectator));
        assert!(matches!(state.phase, MatchPhase::GameOver { .. }));
    }

    #[test]
    fn test_vacant_role_reports_centered_paddle() {
        let mut state = GameState::new();
        state.add_paddle(Role::Left);
        assert_eq!(state.paddle_y(Role::Right), PADDLE_START_Y);

        state.remove_paddle(Role::Left);
        assert_eq!(state.paddle_y(Role::Left), PADDLE_START_Y);
    }
}
