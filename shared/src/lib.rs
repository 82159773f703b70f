//! Types shared between the pong server and its clients: field constants,
//! the paddle/ball entities, the full game state snapshot and the JSON wire
//! protocol.

use serde::{Deserialize, Serialize};

pub mod physics;
pub mod protocol;

pub use physics::{check_goal, check_paddle_collision, handle_paddle_collision, update_ball_position, Goal};
pub use protocol::{ClientMessage, ProtocolError, ServerMessage};

pub const FIELD_WIDTH: f64 = 800.0;
pub const FIELD_HEIGHT: f64 = 600.0;

pub const PADDLE_WIDTH: f64 = 10.0;
pub const PADDLE_HEIGHT: f64 = 100.0;
pub const PADDLE_SPEED: f64 = 5.0;
/// Gap between a side wall and the paddle guarding it.
pub const PADDLE_OFFSET: f64 = 20.0;

pub const BALL_RADIUS: f64 = 8.0;
pub const BALL_SPEED: f64 = 5.0;
/// Paddle hits speed the ball up until it reaches this multiple of its base speed.
pub const MAX_SPEED_FACTOR: f64 = 1.5;
pub const SPEED_UP_FACTOR: f64 = 1.05;

pub const WINNING_SCORE: u32 = 5;
pub const MAX_PLAYERS: usize = 2;

/// One of the two paddles. `Left` is slot 1 (`player1`), `Right` is slot 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    #[serde(rename = "player1")]
    Left,
    #[serde(rename = "player2")]
    Right,
}

impl Side {
    /// Maps a player slot to its paddle; anything but 1 or 2 has none.
    pub fn from_slot(slot: u8) -> Option<Side> {
        match slot {
            1 => Some(Side::Left),
            2 => Some(Side::Right),
            _ => None,
        }
    }

    /// The player slot that drives this paddle
    pub fn slot(self) -> u8 {
        match self {
            Side::Left => 1,
            Side::Right => 2,
        }
    }

}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchPhase {
    Waiting,
    Playing,
    #[serde(rename = "gameover")]
    GameOver,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paddle {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(skip, default = "default_paddle_speed")]
    pub speed: f64,
}

fn default_paddle_speed() -> f64 {
    PADDLE_SPEED
}

impl Paddle {
    /// Creates a paddle at `x`, vertically centred on the field.
    pub fn new(x: f64) -> Self {
        Self {
            x,
            y: FIELD_HEIGHT / 2.0 - PADDLE_HEIGHT / 2.0,
            width: PADDLE_WIDTH,
            height: PADDLE_HEIGHT,
            speed: PADDLE_SPEED,
        }
    }

    /// Moves the paddle by `direction * speed` and clamps it inside the field.
    pub fn move_by(&mut self, direction: f64, field_height: f64) {
        self.y += direction * self.speed;
        self.y = self.y.clamp(0.0, field_height - self.height);
    }

    /// Vertical centre, used to work out where the ball struck
    pub fn center_y(&self) -> f64 {
        self.y + self.height / 2.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ball {
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    pub radius: f64,
    /// Base speed; paddle hits may raise the actual speed up to
    /// `MAX_SPEED_FACTOR` times this value.
    #[serde(skip, default = "default_ball_speed")]
    pub speed: f64,
}

fn default_ball_speed() -> f64 {
    BALL_SPEED
}

impl Ball {
    pub fn new() -> Self {
        Self {
            x: FIELD_WIDTH / 2.0,
            y: FIELD_HEIGHT / 2.0,
            vx: 0.0,
            vy: 0.0,
            radius: BALL_RADIUS,
            speed: BALL_SPEED,
        }
    }

    /// Magnitude of the velocity vector
    pub fn current_speed(&self) -> f64 {
        (self.vx * self.vx + self.vy * self.vy).sqrt()
    }

    /// Speed the ball may never exceed: 1.5x its base speed
    pub fn max_speed(&self) -> f64 {
        self.speed * MAX_SPEED_FACTOR
    }
}

impl Default for Ball {
    fn default() -> Self {
        Self::new()
    }
}

/// Complete state of one match. Doubles as the snapshot sent to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    #[serde(rename = "player1")]
    pub left: Paddle,
    #[serde(rename = "player2")]
    pub right: Paddle,
    pub ball: Ball,
    #[serde(rename = "player1Score")]
    pub left_score: u32,
    #[serde(rename = "player2Score")]
    pub right_score: u32,
    #[serde(rename = "state")]
    pub phase: MatchPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<Side>,
    pub field_width: f64,
    pub field_height: f64,
    #[serde(rename = "playerCount")]
    pub session_count: usize,
}

impl GameState {
    /// Fresh match: paddles centred, zero scores, `waiting`, ball served.
    pub fn new() -> Self {
        let mut state = Self {
            left: Paddle::new(PADDLE_OFFSET),
            right: Paddle::new(FIELD_WIDTH - PADDLE_OFFSET - PADDLE_WIDTH),
            ball: Ball::new(),
            left_score: 0,
            right_score: 0,
            phase: MatchPhase::Waiting,
            winner: None,
            field_width: FIELD_WIDTH,
            field_height: FIELD_HEIGHT,
            session_count: 0,
        };
        state.reset_ball();
        state
    }

    /// Goals scored by both sides, which picks the next serve direction
    pub fn total_goals(&self) -> u32 {
        self.left_score + self.right_score
    }

    /// Score of one side
    pub fn score(&self, side: Side) -> u32 {
        match side {
            Side::Left => self.left_score,
            Side::Right => self.right_score,
        }
    }

    pub fn paddle(&self, side: Side) -> &Paddle {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    /// Serves the ball from the centre of the field.
    ///
    /// The serve alternates with the parity of goals scored so far: an even
    /// total sends the ball up and to the left at 45°, an odd total sends it
    /// down and to the right.
    pub fn reset_ball(&mut self) {
        let even = self.total_goals() % 2 == 0;
        let (angle, direction) = if even {
            (-std::f64::consts::FRAC_PI_4, -1.0)
        } else {
            (std::f64::consts::FRAC_PI_4, 1.0)
        };

        let ball = &mut self.ball;
        ball.x = self.field_width / 2.0;
        ball.y = self.field_height / 2.0;
        ball.vx = angle.cos() * ball.speed * direction;
        ball.vy = angle.sin() * ball.speed;
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}
