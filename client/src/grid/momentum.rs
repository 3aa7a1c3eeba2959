//! Spring-damper smooth scrolling
//!
//! Motion toward a target offset is simulated as a damped spring. Time is
//! measured in 60 Hz frames, so the default tuning settles a few hundred
//! pixels of travel in well under a second. Once the remaining distance drops
//! below [`SETTLE_DISTANCE`] the state snaps onto the target and goes idle.

use web_time::Instant;

use super::camera::Position;

/// Remaining distance (in offset units) at which the spring snaps to target
pub const SETTLE_DISTANCE: f64 = 1.0;

const FRAME_MS: f64 = 1000.0 / 60.0;
/// Longest single integration step, in frames. Semi-implicit Euler stays
/// stable for any stiffness and damping in (0, 1) at this step size.
const MAX_SUBSTEP: f64 = 1.0;
/// Most time integrated by one `advance`, in frames
const MAX_FRAMES_PER_UPDATE: f64 = 2.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpringConfig {
    pub stiffness: f64,
    pub damping: f64,
    pub mass: f64,
}

impl Default for SpringConfig {
    fn default() -> Self {
        Self {
            stiffness: 0.1,
            damping: 0.8,
            mass: 1.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MomentumState {
    Idle,
    Animating {
        position: Position,
        target: Position,
        velocity: Position,
        last_frame: Instant,
    },
}

impl MomentumState {
    /// Begin (or retarget) an animation from `current` toward `target`.
    /// Velocity carries over when retargeting mid-flight.
    pub fn start(self, current: Position, target: Position, now: Instant) -> MomentumState {
        if current == target || !current.is_finite() || !target.is_finite() {
            return MomentumState::Idle;
        }
        let velocity = match self {
            MomentumState::Animating { velocity, .. } => velocity,
            MomentumState::Idle => Position::ZERO,
        };
        MomentumState::Animating {
            position: current,
            target,
            velocity,
            last_frame: now,
        }
    }

    /// Integrate up to `now` using the wall-clock time since the last frame,
    /// split into sub-steps of at most one frame
    pub fn advance(self, now: Instant, config: &SpringConfig) -> MomentumState {
        match self {
            MomentumState::Idle => MomentumState::Idle,
            MomentumState::Animating { last_frame, .. } => {
                let elapsed_ms = now.saturating_duration_since(last_frame).as_secs_f64() * 1000.0;
                let mut remaining = (elapsed_ms / FRAME_MS).clamp(0.0, MAX_FRAMES_PER_UPDATE);
                let mut state = self;
                while remaining > 0.0 && state.is_animating() {
                    let dt = remaining.min(MAX_SUBSTEP);
                    remaining -= dt;
                    state = state.step(dt, config);
                }
                match state {
                    MomentumState::Animating {
                        position,
                        target,
                        velocity,
                        ..
                    } => MomentumState::Animating {
                        position,
                        target,
                        velocity,
                        last_frame: now,
                    },
                    MomentumState::Idle => MomentumState::Idle,
                }
            }
        }
    }

    /// Integrate one step of `frames` (60 Hz frame units, at most one frame)
    pub fn step(self, frames: f64, config: &SpringConfig) -> MomentumState {
        let MomentumState::Animating {
            position,
            target,
            velocity,
            last_frame,
        } = self
        else {
            return MomentumState::Idle;
        };

        let dt = if frames.is_finite() {
            frames.clamp(0.0, MAX_SUBSTEP)
        } else {
            0.0
        };
        let mass = if config.mass > f64::EPSILON { config.mass } else { 1.0 };

        let spring = (target - position) * config.stiffness;
        let damping = velocity * -config.damping;
        let acceleration = (spring + damping) * (1.0 / mass);

        let velocity = velocity + acceleration * dt;
        let position = position + velocity * dt;

        if !position.is_finite() || position.distance(&target) < SETTLE_DISTANCE {
            return MomentumState::Idle;
        }

        MomentumState::Animating {
            position,
            target,
            velocity,
            last_frame,
        }
    }

    pub fn is_animating(&self) -> bool {
        matches!(self, MomentumState::Animating { .. })
    }

    pub fn position(&self) -> Option<Position> {
        match self {
            MomentumState::Animating { position, .. } => Some(*position),
            MomentumState::Idle => None,
        }
    }

    pub fn target(&self) -> Option<Position> {
        match self {
            MomentumState::Animating { target, .. } => Some(*target),
            MomentumState::Idle => None,
        }
    }
}

/// Drives a [`MomentumState`] frame by frame
#[derive(Debug)]
pub struct MomentumController {
    state: MomentumState,
    config: SpringConfig,
}

impl MomentumController {
    pub fn new(config: SpringConfig) -> Self {
        Self {
            state: MomentumState::Idle,
            config,
        }
    }

    pub fn scroll_to(&mut self, current: Position, target: Position, now: Instant) {
        self.state = self.state.start(current, target, now);
    }

    /// Advance one frame. Returns the new offset while moving, and the exact
    /// target on the frame the spring settles.
    pub fn update(&mut self, now: Instant) -> Option<Position> {
        let target = self.state.target()?;
        self.state = self.state.advance(now, &self.config);
        Some(self.state.position().unwrap_or(target))
    }

    /// Cancel the animation and drop all velocity
    pub fn stop(&mut self) {
        self.state = MomentumState::Idle;
    }

    pub fn is_animating(&self) -> bool {
        self.state.is_animating()
    }

    pub fn state(&self) -> MomentumState {
        self.state
    }

    pub fn target(&self) -> Option<Position> {
        self.state.target()
    }

    pub fn config(&self) -> &SpringConfig {
        &self.config
    }
}

impl Default for MomentumController {
    fn default() -> Self {
        Self::new(SpringConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use web_time::Duration;

    /// Runs whole frames until idle; returns the frame count or None on timeout
    fn frames_to_settle(mut state: MomentumState, config: &SpringConfig, limit: usize) -> Option<usize> {
        for frame in 0..limit {
            state = state.step(1.0, config);
            if !state.is_animating() {
                return Some(frame + 1);
            }
        }
        None
    }

    #[test]
    fn test_start_from_target_stays_idle() {
        let now = Instant::now();
        let p = Position::new(10.0, 10.0);
        assert_eq!(MomentumState::Idle.start(p, p, now), MomentumState::Idle);
    }

    #[test]
    fn test_default_spring_settles_quickly() {
        let now = Instant::now();
        let state = MomentumState::Idle.start(Position::ZERO, Position::new(500.0, -300.0), now);
        let frames = frames_to_settle(state, &SpringConfig::default(), 1_000).unwrap();
        assert!(frames < 120, "took {frames} frames");
    }

    #[test]
    fn test_controller_snaps_exactly_to_target() {
        let t0 = Instant::now();
        let target = Position::new(123.4, -56.7);
        let mut controller = MomentumController::default();
        controller.scroll_to(Position::ZERO, target, t0);

        let mut last = None;
        let mut now = t0;
        for _ in 0..1_000 {
            now += Duration::from_millis(16);
            last = controller.update(now);
            if !controller.is_animating() {
                break;
            }
        }
        assert!(!controller.is_animating());
        assert_eq!(last, Some(target));
        assert_eq!(controller.update(now + Duration::from_millis(16)), None);
    }

    #[test]
    fn test_first_frames_move_toward_target() {
        let t0 = Instant::now();
        let mut controller = MomentumController::default();
        controller.scroll_to(Position::ZERO, Position::new(100.0, 0.0), t0);

        let p1 = controller.update(t0 + Duration::from_millis(17)).unwrap();
        let p2 = controller.update(t0 + Duration::from_millis(33)).unwrap();
        assert!(p1.x > 0.0 && p1.x < 100.0);
        assert!(p2.x > p1.x);
    }

    #[test]
    fn test_stop_cancels_animation() {
        let t0 = Instant::now();
        let mut controller = MomentumController::default();
        controller.scroll_to(Position::ZERO, Position::new(100.0, 0.0), t0);
        controller.stop();
        assert!(!controller.is_animating());
        assert_eq!(controller.update(t0 + Duration::from_millis(16)), None);
    }

    #[test]
    fn test_long_stall_is_clamped() {
        let t0 = Instant::now();
        let mut controller = MomentumController::default();
        controller.scroll_to(Position::ZERO, Position::new(1000.0, 0.0), t0);
        // Five seconds without frames integrates only two frames
        let p = controller.update(t0 + Duration::from_secs(5)).unwrap();
        assert!(p.x > 0.0 && p.x < 1000.0);
    }

    #[test]
    fn test_retarget_keeps_velocity() {
        let t0 = Instant::now();
        let state = MomentumState::Idle
            .start(Position::ZERO, Position::new(200.0, 0.0), t0)
            .step(1.0, &SpringConfig::default());
        let MomentumState::Animating { position, velocity, .. } = state else {
            panic!("still moving");
        };
        let retargeted = state.start(position, Position::new(400.0, 0.0), t0);
        let MomentumState::Animating { velocity: kept, .. } = retargeted else {
            panic!("retarget keeps animating");
        };
        assert_eq!(kept, velocity);
    }

    /// Drives the controller with the given frame gaps (cycled) until idle.
    /// Returns the update count, or None on timeout, and the furthest any
    /// coordinate strayed outside the start..target span.
    fn drive(
        controller: &mut MomentumController,
        start: Position,
        target: Position,
        gaps_ms: &[u64],
        limit: usize,
    ) -> (Option<usize>, f64) {
        let t0 = Instant::now();
        controller.scroll_to(start, target, t0);
        let outside = |v: f64, a: f64, b: f64| (a.min(b) - v).max(v - a.max(b)).max(0.0);

        let mut now = t0;
        let mut stray: f64 = 0.0;
        for frame in 0..limit {
            now += Duration::from_millis(gaps_ms[frame % gaps_ms.len()]);
            if let Some(p) = controller.update(now) {
                stray = stray
                    .max(outside(p.x, start.x, target.x))
                    .max(outside(p.y, start.y, target.y));
            }
            if !controller.is_animating() {
                return (Some(frame + 1), stray);
            }
        }
        (None, stray)
    }

    #[test]
    fn test_stiff_spring_settles_at_30hz() {
        let config = SpringConfig {
            stiffness: 0.5,
            damping: 0.6,
            mass: 1.0,
        };
        let mut controller = MomentumController::new(config);
        let target = Position::new(100.0, 0.0);
        let (frames, stray) = drive(&mut controller, Position::ZERO, target, &[33], 200);
        assert!(frames.is_some(), "still animating after 200 frames");
        assert!(stray < 100.0, "strayed {stray}");
    }

    #[test]
    fn test_default_spring_advances_every_frame_at_30hz() {
        let t0 = Instant::now();
        let mut controller = MomentumController::default();
        controller.scroll_to(Position::ZERO, Position::new(100.0, 0.0), t0);

        let mut now = t0;
        let mut previous = 0.0;
        for _ in 0..4 {
            now += Duration::from_millis(33);
            let p = controller.update(now).unwrap();
            assert!(p.x > previous, "{} after {}", p.x, previous);
            previous = p.x;
        }
    }

    proptest! {
        #[test]
        fn controller_settles_at_any_frame_rate(
            stiffness in 0.05f64..0.95,
            damping in 0.05f64..0.95,
            sx in -2000.0f64..2000.0,
            tx in -2000.0f64..2000.0,
            ty in -2000.0f64..2000.0,
            gaps_ms in prop::collection::vec(16u64..=50, 1..32),
        ) {
            let config = SpringConfig { stiffness, damping, mass: 1.0 };
            let mut controller = MomentumController::new(config);
            let start = Position::new(sx, 0.0);
            let target = Position::new(tx, ty);
            let travel = start.distance(&target);

            let (frames, stray) = drive(&mut controller, start, target, &gaps_ms, 2_000);
            prop_assert!(frames.is_some());
            // A lightly damped spring may overshoot by about the travel distance
            prop_assert!(stray <= 1.5 * travel + SETTLE_DISTANCE, "strayed {} over {}", stray, travel);
        }

        #[test]
        fn spring_always_settles(
            stiffness in 0.05f64..0.95,
            damping in 0.05f64..0.95,
            sx in -2000.0f64..2000.0,
            sy in -2000.0f64..2000.0,
            tx in -2000.0f64..2000.0,
            ty in -2000.0f64..2000.0,
        ) {
            let config = SpringConfig { stiffness, damping, mass: 1.0 };
            let state = MomentumState::Idle.start(Position::new(sx, sy), Position::new(tx, ty), Instant::now());
            prop_assert!(frames_to_settle(state, &config, 20_000).is_some());
        }
    }
}
