//! Authoritative match simulation.
//!
//! [`Simulation`] holds the live match and advances it one fixed tick at a
//! time. [`Game`] wraps it in a lock and drives it from a background tick
//! task that hands a snapshot to its sink every few ticks.

use crate::config::ServerConfig;
use log::{debug, info};
use shared::{
    check_goal, check_paddle_collision, handle_paddle_collision, update_ball_position, GameState,
    Goal, MatchPhase, Side, MAX_PLAYERS, WINNING_SCORE,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Receives every snapshot the tick task emits.
pub type SnapshotSink = Arc<dyn Fn(GameState) + Send + Sync>;

/// Quantises raw input to -1, 0 or 1. Anything within half a unit of zero,
/// including NaN, means "stop".
pub fn quantize_direction(raw: f64) -> f64 {
    if raw < -0.5 {
        -1.0
    } else if raw > 0.5 {
        1.0
    } else {
        0.0
    }
}

/// The live match plus each paddle's current input intent
///
/// Intents persist between ticks: a paddle keeps moving in the last
/// direction its player sent until a new direction arrives or the match
/// is reset.
#[derive(Debug, Clone)]
pub struct Simulation {
    state: GameState,
    /// Direction of the left paddle (slot 1): -1, 0 or 1
    left_intent: f64,
    /// Direction of the right paddle (slot 2): -1, 0 or 1
    right_intent: f64,
}

impl Simulation {
    /// Creates a waiting match with no players and both paddles at rest
    pub fn new() -> Self {
        Self {
            state: GameState::new(),
            left_intent: 0.0,
            right_intent: 0.0,
        }
    }

    /// Read access to the live match state
    pub fn state(&self) -> &GameState {
        &self.state
    }

    /// Mutable access for scenario setup in tests and tools.
    pub fn state_mut(&mut self) -> &mut GameState {
        &mut self.state
    }

    /// Current input direction of the paddle on `side`
    pub fn intent(&self, side: Side) -> f64 {
        match side {
            Side::Left => self.left_intent,
            Side::Right => self.right_intent,
        }
    }

    /// Records the paddle direction for `slot`. Returns false for a slot
    /// that does not map to a paddle.
    pub fn set_intent(&mut self, slot: u8, direction: f64) -> bool {
        let direction = quantize_direction(direction);
        match Side::from_slot(slot) {
            Some(Side::Left) => self.left_intent = direction,
            Some(Side::Right) => self.right_intent = direction,
            None => return false,
        }
        true
    }

    /// Records how many players are connected
    ///
    /// The count is reported to clients in every snapshot and gates
    /// [`Simulation::start_match`].
    pub fn set_session_count(&mut self, count: usize) {
        self.state.session_count = count;
    }

    /// `waiting`/`gameover` -> `playing`, only with both seats taken.
    /// Returns whether the match started.
    pub fn start_match(&mut self) -> bool {
        if self.state.phase == MatchPhase::Playing {
            debug!("Ignoring start: match already in progress");
            return false;
        }
        if self.state.session_count < MAX_PLAYERS {
            info!(
                "Cannot start game: need {} players, have {}",
                MAX_PLAYERS, self.state.session_count
            );
            return false;
        }

        info!("Starting new game");
        self.state.phase = MatchPhase::Playing;
        self.state.left_score = 0;
        self.state.right_score = 0;
        self.state.winner = None;
        self.state.reset_ball();
        true
    }

    /// Rebuilds the match from scratch, keeping only the session count.
    pub fn reset_match(&mut self) {
        info!("Resetting game");
        let session_count = self.state.session_count;
        self.state = GameState::new();
        self.state.session_count = session_count;
        self.left_intent = 0.0;
        self.right_intent = 0.0;
    }

    /// Advances the match by one tick. Does nothing outside `playing`.
    /// Returns the goal scored during this tick, if any.
    pub fn step(&mut self) -> Option<Goal> {
        if self.state.phase != MatchPhase::Playing {
            return None;
        }

        let field_height = self.state.field_height;
        if self.left_intent != 0.0 {
            self.state.left.move_by(self.left_intent, field_height);
        }
        if self.right_intent != 0.0 {
            self.state.right.move_by(self.right_intent, field_height);
        }

        update_ball_position(&mut self.state.ball, field_height);

        for side in [Side::Left, Side::Right] {
            let paddle = self.state.paddle(side).clone();
            if check_paddle_collision(&self.state.ball, &paddle) {
                handle_paddle_collision(&mut self.state.ball, &paddle);
            }
        }

        let goal = check_goal(&self.state.ball, self.state.field_width)?;
        self.score(goal.scorer);
        Some(goal)
    }

    fn score(&mut self, scorer: Side) {
        match scorer {
            Side::Left => self.state.left_score += 1,
            Side::Right => self.state.right_score += 1,
        }
        info!(
            "Player {} scored! Score: {} - {}",
            scorer.slot(),
            self.state.left_score,
            self.state.right_score
        );

        if self.state.score(scorer) >= WINNING_SCORE {
            self.state.phase = MatchPhase::GameOver;
            self.state.winner = Some(scorer);
            info!("Game Over: Player {} wins!", scorer.slot());
        } else {
            self.state.reset_ball();
        }
    }
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new()
    }
}

struct Ticker {
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// The simulation engine: a locked [`Simulation`] plus its tick task.
pub struct Game {
    sim: Arc<RwLock<Simulation>>,
    tick_duration: Duration,
    snapshot_interval: u32,
    ticker: Mutex<Option<Ticker>>,
}

impl Game {
    /// Creates an engine with a fresh match and no tick task
    ///
    /// Tick and snapshot rates are taken from `config`; nothing runs until
    /// [`Game::start`] is called.
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            sim: Arc::new(RwLock::new(Simulation::new())),
            tick_duration: config.tick_duration(),
            snapshot_interval: config.snapshot_interval(),
            ticker: Mutex::new(None),
        }
    }

    /// Spawns the tick task unless one is already running. Returns whether
    /// a new task was started.
    pub async fn start(&self, sink: SnapshotSink) -> bool {
        let mut ticker = self.ticker.lock().await;
        if let Some(running) = ticker.as_ref() {
            if !running.handle.is_finished() {
                return false;
            }
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(run_ticks(
            Arc::clone(&self.sim),
            self.tick_duration,
            self.snapshot_interval,
            sink,
            stop_rx,
        ));
        *ticker = Some(Ticker { stop_tx, handle });
        info!("Game loop started");
        true
    }

    /// Signals the tick task to exit at its next wake-up. Returns whether a
    /// task was running.
    pub async fn stop(&self) -> bool {
        match self.ticker.lock().await.take() {
            Some(ticker) => {
                // The task may already be gone; either way it will not tick again.
                let _ = ticker.stop_tx.send(());
                info!("Game loop stopped");
                true
            }
            None => false,
        }
    }

    /// Whether a tick task is currently alive
    pub async fn is_running(&self) -> bool {
        self.ticker
            .lock()
            .await
            .as_ref()
            .is_some_and(|ticker| !ticker.handle.is_finished())
    }

    /// Sets the paddle direction for the player in `slot`
    ///
    /// The direction is quantised to -1, 0 or 1. Slots other than 1 and 2
    /// are logged and ignored.
    pub async fn apply_input(&self, slot: u8, direction: f64) {
        if !self.sim.write().await.set_intent(slot, direction) {
            debug!("Ignoring input for unknown slot {}", slot);
        }
    }

    /// Starts a match if both seats are taken and none is in progress
    ///
    /// Returns whether the match started. See [`Simulation::start_match`].
    pub async fn start_match(&self) -> bool {
        self.sim.write().await.start_match()
    }

    /// Throws the current match away and returns to `waiting`
    pub async fn reset_match(&self) {
        self.sim.write().await.reset_match();
    }

    /// Updates the player count reported in snapshots
    pub async fn set_session_count(&self, count: usize) {
        self.sim.write().await.set_session_count(count);
    }

    /// Current `(left, right)` paddle directions.
    pub async fn intents(&self) -> (f64, f64) {
        let sim = self.sim.read().await;
        (sim.intent(Side::Left), sim.intent(Side::Right))
    }

    /// Copy of the current state, taken under the read lock.
    pub async fn snapshot(&self) -> GameState {
        self.sim.read().await.state().clone()
    }
}

async fn run_ticks(
    sim: Arc<RwLock<Simulation>>,
    tick_duration: Duration,
    snapshot_interval: u32,
    sink: SnapshotSink,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let mut timer = interval(tick_duration);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // Skip the first tick since it fires immediately
    timer.tick().await;

    let mut ticks_since_snapshot = 0;
    loop {
        tokio::select! {
            _ = &mut stop_rx => break,
            _ = timer.tick() => {
                let snapshot = {
                    let mut sim = sim.write().await;
                    sim.step();
                    ticks_since_snapshot += 1;
                    if ticks_since_snapshot >= snapshot_interval {
                        ticks_since_snapshot = 0;
                        Some(sim.state().clone())
                    } else {
                        None
                    }
                };

                if let Some(snapshot) = snapshot {
                    sink(snapshot);
                }
            }
        }
    }
    debug!("Tick task exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::{BALL_RADIUS, FIELD_HEIGHT, FIELD_WIDTH, PADDLE_HEIGHT};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn playing() -> Simulation {
        let mut sim = Simulation::new();
        sim.set_session_count(2);
        assert!(sim.start_match());
        sim
    }

    #[test]
    fn test_quantize_direction() {
        assert_eq!(quantize_direction(-1.0), -1.0);
        assert_eq!(quantize_direction(-0.6), -1.0);
        assert_eq!(quantize_direction(-0.5), 0.0);
        assert_eq!(quantize_direction(0.3), 0.0);
        assert_eq!(quantize_direction(0.51), 1.0);
        assert_eq!(quantize_direction(42.0), 1.0);
        assert_eq!(quantize_direction(f64::NAN), 0.0);
    }

    #[test]
    fn test_start_requires_two_sessions() {
        let mut sim = Simulation::new();
        sim.set_session_count(1);
        assert!(!sim.start_match());
        assert_eq!(sim.state().phase, MatchPhase::Waiting);

        sim.set_session_count(2);
        assert!(sim.start_match());
        assert_eq!(sim.state().phase, MatchPhase::Playing);
    }

    #[test]
    fn test_start_while_playing_is_ignored() {
        let mut sim = playing();
        sim.state_mut().left_score = 3;
        assert!(!sim.start_match());
        assert_eq!(sim.state().left_score, 3);
    }

    #[test]
    fn test_step_is_noop_unless_playing() {
        let mut sim = Simulation::new();
        sim.set_intent(1, 1.0);
        let before = sim.state().clone();
        assert_eq!(sim.step(), None);
        assert_eq!(sim.state(), &before);
    }

    #[test]
    fn test_input_moves_own_paddle_only() {
        let mut sim = playing();
        let left_y = sim.state().left.y;
        let right_y = sim.state().right.y;

        assert!(sim.set_intent(2, 1.0));
        sim.step();

        assert_eq!(sim.state().left.y, left_y);
        assert_eq!(sim.state().right.y, right_y + 5.0);
    }

    #[test]
    fn test_unknown_slot_is_rejected() {
        let mut sim = playing();
        assert!(!sim.set_intent(0, 1.0));
        assert!(!sim.set_intent(3, 1.0));
        assert_eq!(sim.intent(Side::Left), 0.0);
        assert_eq!(sim.intent(Side::Right), 0.0);
    }

    #[test]
    fn test_goal_scores_and_reserves() {
        let mut sim = playing();
        {
            let ball = &mut sim.state_mut().ball;
            ball.x = BALL_RADIUS + 1.0;
            ball.y = 100.0;
            ball.vx = -5.0;
            ball.vy = 0.0;
        }

        let goal = sim.step();
        assert_eq!(goal, Some(Goal { scorer: Side::Right }));
        assert_eq!(sim.state().right_score, 1);
        assert_eq!(sim.state().left_score, 0);
        assert_eq!(sim.state().phase, MatchPhase::Playing);

        // One goal so far: odd total serves down and to the right.
        assert_eq!(sim.state().ball.x, FIELD_WIDTH / 2.0);
        assert_eq!(sim.state().ball.y, FIELD_HEIGHT / 2.0);
        assert_approx_eq!(sim.state().ball.vx, 3.5355, 0.001);
        assert_approx_eq!(sim.state().ball.vy, 3.5355, 0.001);
    }

    #[test]
    fn test_fifth_goal_ends_match() {
        let mut sim = playing();
        sim.state_mut().left_score = 4;
        {
            let ball = &mut sim.state_mut().ball;
            ball.x = FIELD_WIDTH - BALL_RADIUS - 1.0;
            ball.y = 100.0;
            ball.vx = 5.0;
            ball.vy = 0.0;
        }

        assert_eq!(sim.step(), Some(Goal { scorer: Side::Left }));
        assert_eq!(sim.state().left_score, 5);
        assert_eq!(sim.state().phase, MatchPhase::GameOver);
        assert_eq!(sim.state().winner, Some(Side::Left));

        // Frozen after game over.
        let frozen = sim.state().clone();
        sim.step();
        assert_eq!(sim.state(), &frozen);
    }

    #[test]
    fn test_restart_after_game_over() {
        let mut sim = playing();
        sim.state_mut().phase = MatchPhase::GameOver;
        sim.state_mut().winner = Some(Side::Right);
        sim.state_mut().right_score = 5;

        assert!(sim.start_match());
        assert_eq!(sim.state().winner, None);
        assert_eq!(sim.state().right_score, 0);
    }

    #[test]
    fn test_reset_keeps_session_count() {
        let mut sim = playing();
        sim.set_intent(1, -1.0);
        sim.state_mut().left_score = 2;
        sim.state_mut().right_score = 4;

        sim.reset_match();

        assert_eq!(sim.state().session_count, 2);
        assert_eq!(sim.state().left_score, 0);
        assert_eq!(sim.state().right_score, 0);
        assert_eq!(sim.state().winner, None);
        assert_eq!(sim.state().phase, MatchPhase::Waiting);
        assert_eq!(sim.intent(Side::Left), 0.0);
    }

    #[test]
    fn test_long_rally_keeps_entities_in_bounds() {
        let mut sim = playing();
        sim.set_intent(1, 1.0);
        sim.set_intent(2, -1.0);

        for tick in 0..5_000 {
            if tick % 97 == 0 {
                sim.set_intent(1, -sim.intent(Side::Left));
                sim.set_intent(2, -sim.intent(Side::Right));
            }
            sim.step();

            let state = sim.state();
            for paddle in [&state.left, &state.right] {
                assert!(paddle.y >= 0.0);
                assert!(paddle.y + PADDLE_HEIGHT <= FIELD_HEIGHT);
            }
            assert!(state.ball.y >= state.ball.radius);
            assert!(state.ball.y <= FIELD_HEIGHT - state.ball.radius);
            assert!(state.ball.current_speed() <= state.ball.max_speed() + 1e-9);
            if state.phase == MatchPhase::GameOver {
                sim.reset_match();
                sim.start_match();
            }
        }
    }

    #[tokio::test]
    async fn test_engine_start_is_idempotent() {
        let game = Game::new(&ServerConfig::default());
        let sink: SnapshotSink = Arc::new(|_| {});

        assert!(game.start(Arc::clone(&sink)).await);
        assert!(!game.start(Arc::clone(&sink)).await);
        assert!(game.is_running().await);

        assert!(game.stop().await);
        assert!(!game.stop().await);
        assert!(!game.is_running().await);
    }

    #[tokio::test]
    async fn test_engine_emits_snapshots() {
        let config = ServerConfig {
            tick_rate: 200,
            snapshot_rate: 100,
            ..ServerConfig::default()
        };
        let game = Game::new(&config);
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);

        game.start(Arc::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        }))
        .await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        game.stop().await;

        let emitted = count.load(Ordering::SeqCst);
        assert!(emitted > 0, "expected snapshots, got none");

        // No further snapshots once stopped.
        tokio::time::sleep(Duration::from_millis(30)).await;
        let after_stop = count.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), after_stop);
    }

    #[tokio::test]
    async fn test_engine_operations_go_through_lock() {
        let game = Game::new(&ServerConfig::default());
        game.set_session_count(1).await;
        assert!(!game.start_match().await);

        game.set_session_count(2).await;
        assert!(game.start_match().await);
        game.apply_input(1, 0.9).await;

        let snapshot = game.snapshot().await;
        assert_eq!(snapshot.phase, MatchPhase::Playing);
        assert_eq!(snapshot.session_count, 2);

        game.reset_match().await;
        let snapshot = game.snapshot().await;
        assert_eq!(snapshot.phase, MatchPhase::Waiting);
        assert_eq!(snapshot.session_count, 2);
    }
}
