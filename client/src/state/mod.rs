use std::sync::Arc;
use egui::{
    Align2, CentralPanel, Color32, Context, CursorIcon, FontId, Frame, FullOutput, Key, Rect,
    Sense, TopBottomPanel, Ui, Vec2, pos2, vec2,
};
use egui_wgpu::{Renderer, RendererOptions, ScreenDescriptor};
use log::warn;
use web_time::Instant;
use wgpu::{Backends, ExperimentalFeatures, Features, Instance, InstanceDescriptor, MemoryHints, SurfaceError, Trace};
use winit::window::Window;

use crate::config::ClientConfig;
use crate::grid::api::GridApiFetcher;
use crate::grid::camera::Position;
use crate::grid::store::ItemStore;
use crate::grid::thumbnails::ThumbnailLoader;
use crate::grid::{CursorStyle, GridItem, TileGrid};

use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;

/// Zoom step for the +/- keys
const KEY_ZOOM_FACTOR: f64 = 1.25;
/// Gap between neighbouring tiles, in world units
const TILE_GAP: f32 = 4.0;
/// Tiles smaller than this (in points) skip their caption
const MIN_CAPTION_SIZE: f32 = 48.0;

const TILE_FILL: Color32 = Color32::from_rgb(236, 236, 240);
const EMPTY_FILL: Color32 = Color32::from_rgb(246, 246, 248);
const CAPTION_COLOR: Color32 = Color32::from_rgb(70, 70, 80);

pub struct State {
    pub window: Arc<Window>,
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pub is_surface_configured: bool,
    resize_request: Option<PhysicalSize<u32>>,
    ui_renderer: Renderer,
    egui_ctx: Context,
    egui_state: egui_winit::State,
    egui_output: Option<FullOutput>,

    grid: TileGrid,
    fetcher: GridApiFetcher,
    store: ItemStore,
    thumbnails: ThumbnailLoader,
}

impl State {
    pub async fn new(window: Arc<Window>, client: ClientConfig) -> anyhow::Result<Self> {
        let instance = Instance::new(&InstanceDescriptor {
            backends: Backends::all(),
            ..Default::default()
        });

        let surface: wgpu::Surface<'_> = instance.create_surface(window.clone())?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Main Device"),
                required_features: Features::empty(),
                required_limits: if cfg!(target_arch = "wasm32") {
                    wgpu::Limits::downlevel_webgl2_defaults()
                } else {
                    wgpu::Limits::default()
                },
                experimental_features: ExperimentalFeatures::disabled(),
                memory_hints: MemoryHints::Performance,
                trace: Trace::Off,
            })
            .await?;

        let cap: wgpu::SurfaceCapabilities = surface.get_capabilities(&adapter);

        let texture_format = cap
            .formats
            .iter()
            .find(|format| format.is_srgb())
            .or_else(|| cap.formats.first())
            .copied()
            .ok_or_else(|| anyhow::anyhow!("surface reports no texture formats"))?;

        let present_mode = cap
            .present_modes
            .first()
            .copied()
            .ok_or_else(|| anyhow::anyhow!("surface reports no present modes"))?;
        let alpha_mode = cap
            .alpha_modes
            .first()
            .copied()
            .ok_or_else(|| anyhow::anyhow!("surface reports no alpha modes"))?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: texture_format,
            width: window.inner_size().width,
            height: window.inner_size().height,
            present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        let ui_renderer = Renderer::new(&device, texture_format, RendererOptions {
            msaa_samples: 0,
            depth_stencil_format: None,
            dithering: false,
            predictable_texture_filtering: false,
        });
        let egui_ctx = Context::default();

        let egui_state = egui_winit::State::new(
            egui_ctx.clone(),
            egui_ctx.viewport_id(),
            window.as_ref(),
            egui_ctx.native_pixels_per_point(),
            window.theme(),
            None,
        );

        // The real viewport comes from the central panel on the first frame
        let logical = window.inner_size().to_logical::<f64>(window.scale_factor());
        let grid = TileGrid::new(client.grid.clone(), logical.width, logical.height);
        let fetcher = GridApiFetcher::new(&client.api_base, &client.user_agent);
        let thumbnails =
            ThumbnailLoader::new(&client.proxy_base, &client.user_agent, client.thumbnail_budget);

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            is_surface_configured: false,
            resize_request: None,
            ui_renderer,
            egui_ctx,
            egui_state,
            egui_output: None,
            grid,
            fetcher,
            store: ItemStore::new(),
            thumbnails,
        })
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            if !self.is_surface_configured {
                self.apply_size(width, height);
                self.is_surface_configured = true;
            } else {
                self.resize_request = Some(PhysicalSize::new(width, height));
            }
        }
    }

    fn apply_size(&mut self, width: u32, height: u32) {
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
    }

    pub fn handle_input(&mut self, event: &WindowEvent) -> bool {
        let response = self.egui_state.on_window_event(self.window.as_ref(), event);
        response.consumed
    }

    pub fn update(&mut self) {
        let now = Instant::now();
        let input = self.egui_state.take_egui_input(self.window.as_ref());
        let ctx = self.egui_ctx.clone();
        let output = ctx.run(input, |ctx| self.draw_ui(ctx, now));
        self.egui_output = Some(output);
    }

    fn draw_ui(&mut self, ctx: &Context, now: Instant) {
        TopBottomPanel::top("overlay").show(ctx, |ui| {
            ui.horizontal(|ui| self.draw_overlay(ui));
        });

        CentralPanel::default()
            .frame(Frame::NONE)
            .show(ctx, |ui| self.draw_grid(ui, now));
    }

    fn draw_overlay(&mut self, ui: &mut Ui) {
        let center = self.grid.center_position();
        ui.label(format!("x {:.0}  y {:.0}", center.x, center.y));
        ui.separator();
        ui.label(format!("{:.0}%", self.grid.scale() * 100.0));
        ui.separator();

        if let Some(range) = self.grid.loaded_range() {
            ui.label(format!(
                "loaded rows {}..{} cols {}..{}",
                range.rows.min, range.rows.max, range.cols.min, range.cols.max
            ));
        } else {
            ui.label("nothing loaded");
        }
        if self.grid.is_fetching() {
            ui.spinner();
        }
        ui.separator();

        let items = self.store.stats();
        let thumbs = self.thumbnails.stats();
        ui.label(format!(
            "{} items, {} thumbnails ({:.0}% of budget)",
            items.item_count,
            thumbs.thumb_count,
            thumbs.memory_usage_percent()
        ));
        ui.separator();

        if ui.button("Reset zoom").clicked() {
            self.grid.reset_zoom();
        }
        if ui.button("Center").clicked() {
            self.grid.center_on_position(Position::ZERO, true);
        }
    }

    fn draw_grid(&mut self, ui: &mut Ui, now: Instant) {
        let (response, painter) = ui.allocate_painter(ui.available_size(), Sense::click_and_drag());
        let origin = response.rect.min;
        let to_local = |p: egui::Pos2| Position::new((p.x - origin.x) as f64, (p.y - origin.y) as f64);

        self.grid
            .set_viewport(response.rect.width() as f64, response.rect.height() as f64);

        // Pointer
        let hover = ui.input(|i| i.pointer.hover_pos());
        let pointer_inside = hover.is_some_and(|p| response.rect.contains(p));

        if response.drag_started() {
            if let Some(p) = response.interact_pointer_pos() {
                self.grid.pointer_down(to_local(p));
            }
        }
        if response.dragged() {
            if let Some(p) = response.interact_pointer_pos() {
                self.grid.pointer_move(to_local(p));
            }
        }
        if response.drag_stopped() {
            self.grid.pointer_up();
        } else if self.grid.is_dragging() && !pointer_inside {
            self.grid.pointer_leave();
        }

        // Wheel and pinch
        let (scroll, zoom) = ui.input(|i| (i.raw_scroll_delta, i.zoom_delta()));
        if zoom != 1.0 {
            if let Some(p) = hover.filter(|_| pointer_inside) {
                self.grid.zoom_by(zoom as f64, to_local(p));
            }
        } else if scroll != Vec2::ZERO {
            // egui reports content motion; the grid takes wheel deltas
            self.grid
                .wheel(Position::new(-scroll.x as f64, -scroll.y as f64), pointer_inside);
        }

        if !ui.ctx().wants_keyboard_input() {
            self.handle_keys(ui, now);
        }

        if pointer_inside || self.grid.is_dragging() {
            ui.ctx().set_cursor_icon(match self.grid.cursor() {
                CursorStyle::Grab => CursorIcon::Grab,
                CursorStyle::Grabbing => CursorIcon::Grabbing,
            });
        }

        // Fetching
        for items in self.grid.update(now, &mut self.fetcher) {
            self.store.insert_all(items);
        }
        self.thumbnails.update(ui.ctx());

        // Tiles
        let scale = self.grid.scale() as f32;
        let store = &self.store;
        let thumbnails = &mut self.thumbnails;
        self.grid.render_items(|item: GridItem| {
            let rect = Rect::from_min_size(
                origin + vec2(item.position.x as f32, item.position.y as f32),
                Vec2::splat(item.size as f32),
            )
            .shrink(TILE_GAP * scale / 2.0);
            let corner = 6.0 * scale;

            let Some(content) = store.get(&item.index) else {
                painter.rect_filled(rect, corner, EMPTY_FILL);
                return;
            };

            if !item.is_moving {
                thumbnails.request(content);
            }
            match thumbnails.texture(&content.id) {
                Some(texture) => {
                    let uv = Rect::from_min_max(pos2(0.0, 0.0), pos2(1.0, 1.0));
                    painter.image(texture, rect, uv, Color32::WHITE);
                }
                None => {
                    painter.rect_filled(rect, corner, TILE_FILL);
                    if !item.is_moving && rect.width() >= MIN_CAPTION_SIZE {
                        painter.text(
                            rect.center(),
                            Align2::CENTER_CENTER,
                            &content.title,
                            FontId::proportional(12.0 * scale.min(1.5)),
                            CAPTION_COLOR,
                        );
                    }
                }
            }
        });
    }

    fn handle_keys(&mut self, ui: &Ui, now: Instant) {
        let step = self.grid.config().tile_size * self.grid.scale();
        let pressed = |key: Key| ui.input(|i| i.key_pressed(key));

        if pressed(Key::ArrowLeft) {
            self.grid.glide_by(step, 0.0, now);
        }
        if pressed(Key::ArrowRight) {
            self.grid.glide_by(-step, 0.0, now);
        }
        if pressed(Key::ArrowUp) {
            self.grid.glide_by(0.0, step, now);
        }
        if pressed(Key::ArrowDown) {
            self.grid.glide_by(0.0, -step, now);
        }
        if pressed(Key::Plus) || pressed(Key::Equals) {
            self.grid.zoom(self.grid.scale() * KEY_ZOOM_FACTOR, true);
        }
        if pressed(Key::Minus) {
            self.grid.zoom(self.grid.scale() / KEY_ZOOM_FACTOR, true);
        }
        if pressed(Key::Num0) {
            self.grid.reset_camera();
        }
    }

    pub fn render(&mut self) -> Result<(), SurfaceError> {
        self.window.request_redraw();

        if !self.is_surface_configured {
            return Ok(());
        }

        if let Some(PhysicalSize { width, height }) = self.resize_request.take() {
            self.apply_size(width, height)
        }

        let frame = match self.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(_) => {
                self.surface.configure(&self.device, &self.config);
                self.surface.get_current_texture()?
            }
        };

        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });

        {
            let render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: 0.98,
                            g: 0.98,
                            b: 0.99,
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            if let Some(output) = self.egui_output.take() {
                let FullOutput {
                    platform_output,
                    textures_delta,
                    shapes,
                    pixels_per_point,
                    viewport_output
                } = output;

                for _ in viewport_output {
                    warn!("Viewport change is not handled!")
                }

                self.egui_state.handle_platform_output(self.window.as_ref(), platform_output);

                for (id, delta) in textures_delta.set {
                    self.ui_renderer.update_texture(&self.device, &self.queue, id, &delta);
                }
                let descriptor = ScreenDescriptor {
                    size_in_pixels: [self.config.width, self.config.height],
                    pixels_per_point,
                };
                let primitives = self.egui_ctx.tessellate(shapes, pixels_per_point);
                let mut render_pass = render_pass.forget_lifetime();

                self.ui_renderer.update_buffers(&self.device, &self.queue, &mut encoder, &primitives, &descriptor);
                self.ui_renderer.render(&mut render_pass, &primitives, &descriptor);

                for id in textures_delta.free {
                    self.ui_renderer.free_texture(&id)
                }
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        frame.present();

        Ok(())
    }
}
