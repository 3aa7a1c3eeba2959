//! Grid camera for viewport management, panning, zooming and eased transitions

use std::ops::{Add, Mul, Sub};

use web_time::{Duration, Instant};

/// Smallest allowed zoom factor
pub const MIN_SCALE: f64 = 0.1;
/// Largest allowed zoom factor
pub const MAX_SCALE: f64 = 5.0;

/// Default length of an animated camera transition
pub const DEFAULT_TWEEN_DURATION: Duration = Duration::from_millis(300);

/// A 2D point. Whether it is in world or pixel space depends on the caller.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub const ZERO: Position = Position { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Position) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for Position {
    type Output = Position;

    fn add(self, rhs: Position) -> Position {
        Position::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Position {
    type Output = Position;

    fn sub(self, rhs: Position) -> Position {
        Position::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Position {
    type Output = Position;

    fn mul(self, rhs: f64) -> Position {
        Position::new(self.x * rhs, self.y * rhs)
    }
}

/// Camera transform: pixel offset of the world origin plus zoom factor
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraTransform {
    pub x: f64,
    pub y: f64,
    pub scale: f64,
}

impl CameraTransform {
    pub fn new(x: f64, y: f64, scale: f64) -> Self {
        Self {
            x,
            y,
            scale: clamp_scale(scale),
        }
    }

    pub fn offset(&self) -> Position {
        Position::new(self.x, self.y)
    }

    fn lerp(&self, to: &CameraTransform, t: f64) -> CameraTransform {
        CameraTransform::new(
            self.x + (to.x - self.x) * t,
            self.y + (to.y - self.y) * t,
            self.scale + (to.scale - self.scale) * t,
        )
    }
}

impl Default for CameraTransform {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0)
    }
}

/// World-space rectangle visible through the viewport
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewportBounds {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

/// Clamp a zoom factor into `[MIN_SCALE, MAX_SCALE]`; NaN maps to 1
pub fn clamp_scale(scale: f64) -> f64 {
    if scale.is_nan() {
        return 1.0;
    }
    scale.clamp(MIN_SCALE, MAX_SCALE)
}

/// Cubic ease-out: fast start, gentle landing
pub fn ease_out_cubic(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    1.0 - (1.0 - t).powi(3)
}

#[derive(Clone, Copy, Debug)]
struct CameraTween {
    from: CameraTransform,
    to: CameraTransform,
    /// Set by the first frame that samples the tween
    started: Option<Instant>,
    duration: Duration,
}

impl CameraTween {
    /// Returns the eased transform at `now` and whether the tween is finished
    fn sample(&mut self, now: Instant) -> (CameraTransform, bool) {
        let started = *self.started.get_or_insert(now);
        let total = self.duration.as_secs_f64();
        let t = if total <= 0.0 {
            1.0
        } else {
            now.saturating_duration_since(started).as_secs_f64() / total
        };

        if t >= 1.0 {
            (self.to, true)
        } else {
            (self.from.lerp(&self.to, ease_out_cubic(t)), false)
        }
    }
}

/// Grid camera state
pub struct Camera {
    transform: CameraTransform,
    defaults: CameraTransform,

    /// Viewport size in pixels
    pub viewport_width: f64,
    pub viewport_height: f64,

    tween: Option<CameraTween>,
    tween_duration: Duration,
}

impl Camera {
    pub fn new(width: f64, height: f64) -> Self {
        Self::with_transform(CameraTransform::default(), width, height)
    }

    pub fn with_transform(transform: CameraTransform, width: f64, height: f64) -> Self {
        Self {
            transform,
            defaults: transform,
            viewport_width: width,
            viewport_height: height,
            tween: None,
            tween_duration: DEFAULT_TWEEN_DURATION,
        }
    }

    pub fn set_tween_duration(&mut self, duration: Duration) {
        self.tween_duration = duration;
    }

    /// Update viewport size
    pub fn set_viewport(&mut self, width: f64, height: f64) {
        self.viewport_width = width.max(0.0);
        self.viewport_height = height.max(0.0);
    }

    pub fn transform(&self) -> CameraTransform {
        self.transform
    }

    pub fn position(&self) -> Position {
        self.transform.offset()
    }

    pub fn scale(&self) -> f64 {
        self.transform.scale
    }

    pub fn is_animating(&self) -> bool {
        self.tween.is_some()
    }

    /// Move the camera offset by a pixel delta
    pub fn pan(&mut self, dx: f64, dy: f64, animate: bool) {
        let to = CameraTransform::new(
            self.transform.x + dx,
            self.transform.y + dy,
            self.transform.scale,
        );
        self.apply(to, animate);
    }

    /// Zoom about the world origin. The target is clamped before use.
    pub fn zoom(&mut self, target_scale: f64, animate: bool) {
        let to = CameraTransform::new(self.transform.x, self.transform.y, target_scale);
        self.apply(to, animate);
    }

    /// Zoom keeping the world point under `anchor` (pixels) stationary
    pub fn zoom_at(&mut self, target_scale: f64, anchor: Position, animate: bool) {
        let scale = clamp_scale(target_scale);
        let world = self.screen_to_world(anchor);
        let to = CameraTransform::new(anchor.x - world.x * scale, anchor.y - world.y * scale, scale);
        self.apply(to, animate);
    }

    /// Animate back to the construction-time transform
    pub fn reset(&mut self) {
        self.apply(self.defaults, true);
    }

    /// Synchronous write used by dragging, wheel and momentum.
    /// Cancels any running tween.
    pub fn set_position(&mut self, x: f64, y: f64) {
        self.tween = None;
        self.transform = CameraTransform::new(x, y, self.transform.scale);
    }

    /// Stop a running tween where it is
    pub fn cancel_animation(&mut self) {
        self.tween = None;
    }

    fn apply(&mut self, to: CameraTransform, animate: bool) {
        if animate && to != self.transform {
            // A new tween replaces the previous one and starts from the live transform
            self.tween = Some(CameraTween {
                from: self.transform,
                to,
                started: None,
                duration: self.tween_duration,
            });
        } else {
            self.tween = None;
            self.transform = to;
        }
    }

    /// Advance the active tween. Returns true if the transform changed.
    pub fn update(&mut self, now: Instant) -> bool {
        let Some(tween) = self.tween.as_mut() else {
            return false;
        };
        let (transform, done) = tween.sample(now);
        if done {
            self.tween = None;
        }
        let changed = transform != self.transform;
        self.transform = transform;
        changed
    }

    /// World-space rectangle currently visible
    pub fn viewport_bounds(&self) -> ViewportBounds {
        let CameraTransform { x, y, scale } = self.transform;
        ViewportBounds {
            left: -x / scale,
            top: -y / scale,
            right: (-x + self.viewport_width) / scale,
            bottom: (-y + self.viewport_height) / scale,
        }
    }

    /// Convert a pixel position to world coordinates
    pub fn screen_to_world(&self, screen: Position) -> Position {
        let CameraTransform { x, y, scale } = self.transform;
        Position::new((screen.x - x) / scale, (screen.y - y) / scale)
    }

    /// Convert world coordinates to a pixel position
    pub fn world_to_screen(&self, world: Position) -> Position {
        let CameraTransform { x, y, scale } = self.transform;
        Position::new(world.x * scale + x, world.y * scale + y)
    }

    /// Camera offset that puts `world` at the centre of the viewport
    pub fn offset_centering(&self, world: Position) -> Position {
        let scale = self.transform.scale;
        Position::new(
            self.viewport_width / 2.0 - world.x * scale,
            self.viewport_height / 2.0 - world.y * scale,
        )
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(800.0, 600.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_scale_is_clamped() {
        let mut camera = Camera::default();
        camera.zoom(-5.0, false);
        assert_eq!(camera.scale(), MIN_SCALE);
        camera.zoom(999.0, false);
        assert_eq!(camera.scale(), MAX_SCALE);
        camera.zoom(f64::NAN, false);
        assert_eq!(camera.scale(), 1.0);
    }

    #[test]
    fn test_viewport_bounds() {
        let mut camera = Camera::new(1000.0, 800.0);
        camera.set_position(-500.0, -500.0);
        assert_eq!(
            camera.viewport_bounds(),
            ViewportBounds {
                left: 500.0,
                top: 500.0,
                right: 1500.0,
                bottom: 1300.0
            }
        );

        camera.zoom(2.0, false);
        let b = camera.viewport_bounds();
        assert!(approx(b.left, 250.0));
        assert!(approx(b.right, 750.0));
    }

    #[test]
    fn test_ease_out_cubic() {
        assert_eq!(ease_out_cubic(0.0), 0.0);
        assert_eq!(ease_out_cubic(1.0), 1.0);
        assert!(approx(ease_out_cubic(0.5), 0.875));
        assert_eq!(ease_out_cubic(3.0), 1.0);
    }

    #[test]
    fn test_animated_pan_follows_curve() {
        let t0 = Instant::now();
        let mut camera = Camera::default();
        camera.pan(100.0, -40.0, true);
        assert!(camera.is_animating());
        assert_eq!(camera.position(), Position::ZERO);

        // First frame pins the tween clock
        camera.update(t0);
        assert_eq!(camera.position(), Position::ZERO);

        camera.update(t0 + Duration::from_millis(150));
        assert!(approx(camera.position().x, 87.5));
        assert!(approx(camera.position().y, -35.0));

        camera.update(t0 + Duration::from_millis(300));
        assert_eq!(camera.position(), Position::new(100.0, -40.0));
        assert!(!camera.is_animating());
        assert!(!camera.update(t0 + Duration::from_millis(400)));
    }

    #[test]
    fn test_new_tween_replaces_running_one() {
        let t0 = Instant::now();
        let mut camera = Camera::default();
        camera.pan(100.0, 0.0, true);
        camera.update(t0);
        camera.update(t0 + Duration::from_millis(150));
        let mid = camera.position().x;

        camera.pan(0.0, 50.0, true);
        camera.update(t0 + Duration::from_millis(160));
        camera.update(t0 + Duration::from_millis(460));
        assert_eq!(camera.position(), Position::new(mid, 50.0));
    }

    #[test]
    fn test_reset_returns_to_defaults() {
        let t0 = Instant::now();
        let mut camera = Camera::default();
        camera.pan(30.0, 30.0, false);
        camera.zoom(3.0, false);
        camera.reset();
        camera.update(t0);
        camera.update(t0 + Duration::from_secs(1));
        assert_eq!(camera.transform(), CameraTransform::default());
    }

    #[test]
    fn test_zoom_at_keeps_anchor_fixed() {
        let mut camera = Camera::new(1000.0, 800.0);
        camera.set_position(-120.0, 40.0);
        let anchor = Position::new(300.0, 200.0);
        let before = camera.screen_to_world(anchor);

        camera.zoom_at(2.5, anchor, false);
        let after = camera.screen_to_world(anchor);
        assert!(approx(before.x, after.x));
        assert!(approx(before.y, after.y));
    }

    #[test]
    fn test_set_position_cancels_tween() {
        let mut camera = Camera::default();
        camera.pan(100.0, 100.0, true);
        camera.set_position(5.0, 5.0);
        assert!(!camera.is_animating());
        assert_eq!(camera.position(), Position::new(5.0, 5.0));
    }
}
