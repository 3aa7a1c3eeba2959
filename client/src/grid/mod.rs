//! Infinite pannable/zoomable tile grid with viewport-driven fetching

pub mod api;
pub mod camera;
pub mod loader;
pub mod momentum;
pub mod range;
pub mod scheduler;
pub mod store;
pub mod thumbnails;

use web_time::Instant;

use crate::config::GridConfig;
use camera::{Camera, CameraTransform, Position};
use momentum::MomentumController;
use range::{AxisRange, IndexRange};
use scheduler::{FetchScheduler, RangeFetcher};

/// Row/column of one tile
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct GridIndex {
    pub row: i32,
    pub col: i32,
}

impl GridIndex {
    pub fn new(row: i32, col: i32) -> Self {
        Self { row, col }
    }
}

/// Everything the render callback gets for one tile
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridItem {
    pub index: GridIndex,
    /// Top-left corner in pixels, relative to the grid viewport
    pub position: Position,
    /// Edge length in pixels at the current scale
    pub size: f64,
    /// True while the user drags or the view is gliding/tweening
    pub is_moving: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CursorStyle {
    Grab,
    Grabbing,
}

/// Pointer interaction state
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InputState {
    Idle,
    Dragging {
        drag_start: Position,
        initial_offset: Position,
    },
}

impl InputState {
    pub fn press(self, pointer: Position, offset: Position) -> InputState {
        InputState::Dragging {
            drag_start: pointer,
            initial_offset: offset,
        }
    }

    pub fn release(self) -> InputState {
        InputState::Idle
    }

    /// Camera offset the drag asks for with the pointer at `pointer`
    pub fn drag_offset(&self, pointer: Position) -> Option<Position> {
        match self {
            InputState::Dragging {
                drag_start,
                initial_offset,
            } => Some(*initial_offset + (pointer - *drag_start)),
            InputState::Idle => None,
        }
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self, InputState::Dragging { .. })
    }
}

/// Grid orchestrator: input → camera → visible range → fetch scheduler → render
pub struct TileGrid {
    camera: Camera,
    momentum: MomentumController,
    scheduler: FetchScheduler,
    input: InputState,
    config: GridConfig,

    /// Camera state and viewport size the last fetch candidate was built from
    last_requested: Option<(CameraTransform, f64, f64)>,
}

impl TileGrid {
    pub fn new(config: GridConfig, viewport_width: f64, viewport_height: f64) -> Self {
        let config = config.sanitized();
        let mut camera = Camera::new(viewport_width, viewport_height);
        camera.set_tween_duration(config.tween_duration);

        Self {
            camera,
            momentum: MomentumController::new(config.spring),
            scheduler: FetchScheduler::new(config.debounce, config.loading_timeout, config.load_gap),
            input: InputState::Idle,
            config,
            last_requested: None,
        }
    }

    /// Advance animations and fetching (call each frame).
    /// Returns the payloads of fetches that completed successfully.
    pub fn update<F: RangeFetcher>(&mut self, now: Instant, fetcher: &mut F) -> Vec<F::Output> {
        // 1. Camera tween and opt-in momentum
        self.camera.update(now);
        if let Some(offset) = self.momentum.update(now) {
            self.camera.set_position(offset.x, offset.y);
        }

        // 2. Offer the margin-expanded range whenever the view changed
        let view = (
            self.camera.transform(),
            self.camera.viewport_width,
            self.camera.viewport_height,
        );
        if self.last_requested != Some(view) {
            self.last_requested = Some(view);
            if let Some(range) = self.render_range() {
                self.scheduler
                    .request(range.rows.to_vec(), range.cols.to_vec(), now);
            }
        }

        // 3. Dispatch the debounced candidate and collect completions
        self.scheduler.update(now, fetcher)
    }

    /// Tile rectangle covered by the viewport, before the margin is added
    pub fn visible_range(&self) -> Option<IndexRange> {
        if self.camera.viewport_width <= 0.0 || self.camera.viewport_height <= 0.0 {
            return None;
        }
        let bounds = self.camera.viewport_bounds();
        let tile = self.config.tile_size;
        Some(IndexRange::new(
            AxisRange::new(
                (bounds.top / tile).floor() as i32,
                (bounds.bottom / tile).ceil() as i32,
            ),
            AxisRange::new(
                (bounds.left / tile).floor() as i32,
                (bounds.right / tile).ceil() as i32,
            ),
        ))
    }

    /// Visible rectangle plus the pre-render/pre-fetch margin
    pub fn render_range(&self) -> Option<IndexRange> {
        self.visible_range()
            .map(|range| range.expand(self.config.viewport_margin))
    }

    /// Call `render_item` once for every tile in the render range
    pub fn render_items<R: FnMut(GridItem)>(&self, mut render_item: R) {
        let Some(range) = self.render_range() else {
            return;
        };
        let tile = self.config.tile_size;
        let size = tile * self.camera.scale();
        let is_moving = self.is_moving();

        for row in range.rows.indices() {
            for col in range.cols.indices() {
                let world = Position::new(col as f64 * tile, row as f64 * tile);
                render_item(GridItem {
                    index: GridIndex::new(row, col),
                    position: self.camera.world_to_screen(world),
                    size,
                    is_moving,
                });
            }
        }
    }

    /// Handle viewport resize
    pub fn set_viewport(&mut self, width: f64, height: f64) {
        self.camera.set_viewport(width, height);
    }

    pub fn pointer_down(&mut self, pointer: Position) {
        self.momentum.stop();
        self.camera.cancel_animation();
        self.input = self.input.press(pointer, self.camera.position());
    }

    /// Apply a drag move. Returns true if the camera moved.
    pub fn pointer_move(&mut self, pointer: Position) -> bool {
        match self.input.drag_offset(pointer) {
            Some(offset) => {
                self.camera.set_position(offset.x, offset.y);
                true
            }
            None => false,
        }
    }

    pub fn pointer_up(&mut self) {
        self.input = self.input.release();
    }

    pub fn pointer_leave(&mut self) {
        self.input = self.input.release();
    }

    /// Scroll the grid by a wheel delta (pixels). Only consumes the event
    /// when the pointer is over the grid so page scrolling elsewhere is kept.
    pub fn wheel(&mut self, delta: Position, pointer_over: bool) -> bool {
        if !pointer_over {
            return false;
        }
        self.momentum.stop();
        self.camera.pan(-delta.x, -delta.y, false);
        true
    }

    /// Zoom by a factor around a pixel anchor (ctrl+wheel, pinch)
    pub fn zoom_by(&mut self, factor: f64, anchor: Position) {
        self.momentum.stop();
        self.camera
            .zoom_at(self.camera.scale() * factor, anchor, false);
    }

    /// Glide the camera offset to `target` using the spring controller
    pub fn glide_to(&mut self, target: Position, now: Instant) {
        self.camera.cancel_animation();
        self.momentum
            .scroll_to(self.camera.position(), target, now);
    }

    /// Glide relative to where the current glide is heading
    pub fn glide_by(&mut self, dx: f64, dy: f64, now: Instant) {
        let base = self
            .momentum
            .target()
            .unwrap_or_else(|| self.camera.position());
        self.glide_to(base + Position::new(dx, dy), now);
    }

    /// Pan so the world point `world` lands at the viewport centre
    pub fn center_on_position(&mut self, world: Position, animate: bool) {
        self.momentum.stop();
        let delta = self.camera.offset_centering(world) - self.camera.position();
        self.camera.pan(delta.x, delta.y, animate);
    }

    /// Animate back to scale 1, keeping the viewport centre in place
    pub fn reset_zoom(&mut self) {
        self.momentum.stop();
        let center = Position::new(
            self.camera.viewport_width / 2.0,
            self.camera.viewport_height / 2.0,
        );
        self.camera.zoom_at(1.0, center, true);
    }

    pub fn zoom(&mut self, scale: f64, animate: bool) {
        self.momentum.stop();
        self.camera.zoom(scale, animate);
    }

    pub fn pan(&mut self, dx: f64, dy: f64, animate: bool) {
        self.momentum.stop();
        self.camera.pan(dx, dy, animate);
    }

    /// Return to the initial camera
    pub fn reset_camera(&mut self) {
        self.momentum.stop();
        self.camera.reset();
    }

    /// Current camera offset (pixel position of the world origin)
    pub fn current_position(&self) -> Position {
        self.camera.position()
    }

    /// World point currently at the viewport centre
    pub fn center_position(&self) -> Position {
        self.camera.screen_to_world(Position::new(
            self.camera.viewport_width / 2.0,
            self.camera.viewport_height / 2.0,
        ))
    }

    pub fn scale(&self) -> f64 {
        self.camera.scale()
    }

    pub fn is_moving(&self) -> bool {
        self.input.is_dragging() || self.momentum.is_animating() || self.camera.is_animating()
    }

    pub fn is_dragging(&self) -> bool {
        self.input.is_dragging()
    }

    pub fn cursor(&self) -> CursorStyle {
        if self.input.is_dragging() {
            CursorStyle::Grabbing
        } else {
            CursorStyle::Grab
        }
    }

    pub fn is_fetching(&self) -> bool {
        self.scheduler.is_fetching()
    }

    pub fn loaded_range(&self) -> Option<IndexRange> {
        self.scheduler.loaded_grid()
    }

    pub fn scheduler(&self) -> &FetchScheduler {
        &self.scheduler
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }
}
