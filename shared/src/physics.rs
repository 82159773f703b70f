//! Ball and paddle physics. Everything here advances by one fixed tick;
//! velocities are in field units per tick.

use crate::{Ball, Paddle, Side, SPEED_UP_FACTOR};

/// Largest deflection off a paddle edge.
const MAX_BOUNCE_ANGLE: f64 = std::f64::consts::PI / 3.0;

/// Which side a goal was scored for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Goal {
    pub scorer: Side,
}

/// Moves the ball by its velocity and bounces it off the top and bottom walls.
pub fn update_ball_position(ball: &mut Ball, field_height: f64) {
    ball.x += ball.vx;
    ball.y += ball.vy;

    if ball.y - ball.radius <= 0.0 {
        ball.y = ball.radius;
        ball.vy = -ball.vy;
    }
    if ball.y + ball.radius >= field_height {
        ball.y = field_height - ball.radius;
        ball.vy = -ball.vy;
    }
}

/// AABB overlap between the ball's bounding square and the paddle.
pub fn check_paddle_collision(ball: &Ball, paddle: &Paddle) -> bool {
    let ball_left = ball.x - ball.radius;
    let ball_right = ball.x + ball.radius;
    let ball_top = ball.y - ball.radius;
    let ball_bottom = ball.y + ball.radius;

    ball_right > paddle.x
        && ball_left < paddle.x + paddle.width
        && ball_bottom > paddle.y
        && ball_top < paddle.y + paddle.height
}

/// Bounces the ball off a paddle it overlaps.
///
/// The outgoing angle depends on where the ball struck: the paddle centre
/// returns it flat, the edges deflect it by up to 60°. Each hit speeds the
/// ball up by 5% until it reaches its maximum speed. The ball is then placed
/// just outside the paddle so the same hit cannot trigger again next tick.
pub fn handle_paddle_collision(ball: &mut Ball, paddle: &Paddle) {
    ball.vx = -ball.vx;

    let normalized_intersect = (paddle.center_y() - ball.y) / (paddle.height / 2.0);
    let bounce_angle = normalized_intersect * MAX_BOUNCE_ANGLE;

    let speed = ball.current_speed();
    let direction = if ball.vx < 0.0 { -1.0 } else { 1.0 };

    ball.vx = direction * speed * bounce_angle.cos();
    ball.vy = -speed * bounce_angle.sin();

    let max_speed = ball.max_speed();
    if speed > 0.0 && speed < max_speed {
        let factor = SPEED_UP_FACTOR.min(max_speed / speed);
        ball.vx *= factor;
        ball.vy *= factor;
    }

    if direction > 0.0 {
        ball.x = paddle.x + paddle.width + ball.radius;
    } else {
        ball.x = paddle.x - ball.radius;
    }
}

/// Returns the goal scored this tick, if the ball reached a side wall.
/// Reaching the left wall scores for the right side and vice versa.
pub fn check_goal(ball: &Ball, field_width: f64) -> Option<Goal> {
    if ball.x - ball.radius <= 0.0 {
        Some(Goal { scorer: Side::Right })
    } else if ball.x + ball.radius >= field_width {
        Some(Goal { scorer: Side::Left })
    } else {
        None
    }
}
