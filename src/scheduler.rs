//! The per-frame driver.
//!
//! [`Simulation`] owns a backend together with everything that changes
//! between frames: pointer records, the effective configuration, the color
//! cycle and the current grid sizes. [`Effect`] is the host-facing wrapper
//! that stays inert when no backend could be created.

use crate::FluidBackend;
use crate::analysis::FieldSnapshot;
use crate::caps::Capabilities;
use crate::color::{Rgb, generate_color, wrap};
use crate::config::SimConfig;
use crate::error::FluidError;
use crate::pointer::{InputEvent, InputTranslator, PointerTable};
use crate::render::Frame;
use crate::solver::{DisplayParams, MAX_DT, Splat, StepParams};
use crate::target::GridSize;
use glam::Vec2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Instant;

/// Canvas size in client (logical) pixels, as the host lays it out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanvasSize {
    pub client_width: f32,
    pub client_height: f32,
}

impl CanvasSize {
    pub fn new(client_width: f32, client_height: f32) -> Self {
        Self {
            client_width,
            client_height,
        }
    }
}

pub struct Simulation<B: FluidBackend> {
    backend: B,
    config: SimConfig,
    pending: Option<SimConfig>,
    pointers: PointerTable,
    translator: InputTranslator,
    color_timer: f32,
    last_frame: Option<Instant>,
    rng: StdRng,
    sim_size: GridSize,
    dye_size: GridSize,
    frames: usize,
}

impl<B: FluidBackend> Simulation<B> {
    pub fn new(backend: B, config: SimConfig, canvas: CanvasSize) -> Self {
        Self::with_rng(backend, config, canvas, StdRng::from_entropy())
    }

    /// Same as [`Simulation::new`] with reproducible colors and click impulses.
    pub fn with_seed(backend: B, config: SimConfig, canvas: CanvasSize, seed: u64) -> Self {
        Self::with_rng(backend, config, canvas, StdRng::seed_from_u64(seed))
    }

    fn with_rng(backend: B, config: SimConfig, canvas: CanvasSize, rng: StdRng) -> Self {
        let config = effective_config(config, backend.capabilities());
        let mut translator = InputTranslator::default();
        translator.backing_width = translator.scale_by_pixel_ratio(canvas.client_width).max(1);
        translator.backing_height = translator.scale_by_pixel_ratio(canvas.client_height).max(1);

        let mut sim = Self {
            backend,
            config,
            pending: None,
            pointers: PointerTable::default(),
            translator,
            color_timer: 0.0,
            last_frame: None,
            rng,
            sim_size: GridSize::new(1, 1),
            dye_size: GridSize::new(1, 1),
            frames: 0,
        };
        sim.backend.set_display_keywords(&sim.config.display_keywords());
        sim.init_targets();
        sim
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// The configuration in effect for the current frame.
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Queues `config`; it replaces the current one at the next frame boundary.
    pub fn set_config(&mut self, config: SimConfig) {
        self.pending = Some(config);
    }

    pub fn pointers(&self) -> &PointerTable {
        &self.pointers
    }

    pub fn sim_size(&self) -> GridSize {
        self.sim_size
    }

    pub fn dye_size(&self) -> GridSize {
        self.dye_size
    }

    /// Drawing-buffer size in physical pixels.
    pub fn backing_size(&self) -> GridSize {
        GridSize::new(self.translator.backing_width, self.translator.backing_height)
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.translator.aspect_ratio()
    }

    pub fn pixel_ratio(&self) -> f32 {
        self.translator.pixel_ratio
    }

    pub fn color_timer(&self) -> f32 {
        self.color_timer
    }

    pub fn frame_count(&self) -> usize {
        self.frames
    }

    /// A drawing surface matching the current backing size.
    pub fn create_surface(&mut self) -> B::Surface {
        let size = self.backing_size();
        self.backend.create_surface(size)
    }

    pub fn handle_event(&mut self, event: InputEvent) {
        match event {
            InputEvent::PointerDown { id, x, y } => {
                let texcoord = self.translator.texcoord(x, y);
                self.pointers.down(id, texcoord, &mut self.rng);
                self.click_splat(texcoord);
            }
            InputEvent::PointerMove { id, x, y } => {
                let texcoord = self.translator.texcoord(x, y);
                self.pointers
                    .moved(id, texcoord, &self.translator, &mut self.rng);
            }
            InputEvent::PointerUp { id } => self.pointers.up(id),
            InputEvent::PixelRatioChanged(ratio) => {
                if ratio.is_finite() && ratio > 0.0 {
                    self.translator.pixel_ratio = ratio;
                }
            }
        }
    }

    /// One display refresh at wall-clock time `now`.
    pub fn frame(&mut self, now: Instant, canvas: CanvasSize, surface: &mut B::Surface) {
        let dt = self
            .last_frame
            .map(|last| now.saturating_duration_since(last).as_secs_f32())
            .unwrap_or(0.0);
        self.last_frame = Some(now);
        self.frame_with_dt(dt, canvas, surface);
    }

    /// One display refresh with an explicit timestep, clamped to [`MAX_DT`].
    pub fn frame_with_dt(&mut self, dt: f32, canvas: CanvasSize, surface: &mut B::Surface) {
        let dt = if dt.is_finite() { dt.clamp(0.0, MAX_DT) } else { 0.0 };

        self.apply_pending_config();
        if self.resize_canvas(canvas) {
            self.init_targets();
            *surface = self.create_surface();
        }
        self.update_colors(dt);
        self.apply_inputs();
        self.backend.step(dt, &StepParams::from(&self.config));
        self.backend
            .render(surface, &DisplayParams::from(&self.config));
        self.frames += 1;
    }

    /// Renders the current dye at the capture resolution.
    pub fn capture(&mut self) -> Result<Frame, FluidError> {
        let backing = self.backing_size();
        let size =
            GridSize::for_resolution(self.config.capture_resolution, backing.width, backing.height);
        let mut surface = self.backend.create_surface(size);
        self.backend
            .render(&mut surface, &DisplayParams::from(&self.config));
        self.backend.read_surface(&surface)
    }

    pub fn snapshot(&mut self) -> Result<FieldSnapshot, FluidError> {
        self.backend.snapshot()
    }

    /// Injects one impulse at `point` (texture coordinates).
    pub fn splat(&mut self, point: Vec2, velocity: Vec2, color: Rgb) {
        let splat = make_splat(&self.translator, &self.config, point, velocity, color);
        self.backend.splat(&splat);
    }

    fn click_splat(&mut self, point: Vec2) {
        let color = generate_color(&mut self.rng).scaled(10.0);
        let velocity = Vec2::new(
            10.0 * (self.rng.r#gen::<f32>() - 0.5),
            30.0 * (self.rng.r#gen::<f32>() - 0.5),
        );
        self.splat(point, velocity, color);
    }

    fn apply_pending_config(&mut self) {
        let Some(config) = self.pending.take() else {
            return;
        };
        let config = effective_config(config, self.backend.capabilities());
        let regrid = config.sim_resolution != self.config.sim_resolution
            || config.dye_resolution != self.config.dye_resolution;
        let rekey = config.shading != self.config.shading;
        self.config = config;

        if rekey {
            self.backend
                .set_display_keywords(&self.config.display_keywords());
        }
        if regrid {
            self.init_targets();
        }
    }

    /// Tracks the drawing-buffer size; true when it changed.
    fn resize_canvas(&mut self, canvas: CanvasSize) -> bool {
        let width = self.translator.scale_by_pixel_ratio(canvas.client_width).max(1);
        let height = self.translator.scale_by_pixel_ratio(canvas.client_height).max(1);
        if width == self.translator.backing_width && height == self.translator.backing_height {
            return false;
        }
        log::debug!(
            "drawing buffer resized: {}x{} -> {width}x{height}",
            self.translator.backing_width,
            self.translator.backing_height
        );
        self.translator.backing_width = width;
        self.translator.backing_height = height;
        true
    }

    fn init_targets(&mut self) {
        let backing = self.backing_size();
        self.sim_size =
            GridSize::for_resolution(self.config.sim_resolution, backing.width, backing.height);
        self.dye_size =
            GridSize::for_resolution(self.config.dye_resolution, backing.width, backing.height);
        self.backend
            .set_display_keywords(&self.config.display_keywords());
        self.backend.resize(self.sim_size, self.dye_size);
    }

    fn update_colors(&mut self, dt: f32) {
        self.color_timer += dt * self.config.color_update_speed;
        if self.color_timer >= 1.0 {
            self.color_timer = wrap(self.color_timer, 0.0, 1.0);
            self.pointers.recolor(&mut self.rng);
        }
    }

    fn apply_inputs(&mut self) {
        for pointer in self.pointers.iter_mut() {
            if !pointer.moved {
                continue;
            }
            pointer.moved = false;
            let splat = make_splat(
                &self.translator,
                &self.config,
                pointer.texcoord,
                pointer.delta * self.config.splat_force,
                pointer.color,
            );
            self.backend.splat(&splat);
        }
    }
}

fn effective_config(config: SimConfig, caps: Capabilities) -> SimConfig {
    let config = config.sanitized();
    if caps.linear_filtering {
        config
    } else {
        config.degraded_for_nearest_filtering()
    }
}

fn make_splat(
    translator: &InputTranslator,
    config: &SimConfig,
    point: Vec2,
    velocity: Vec2,
    color: Rgb,
) -> Splat {
    Splat {
        point,
        velocity,
        color,
        radius: translator.correct_radius(config.splat_radius / 100.0),
        aspect_ratio: translator.aspect_ratio(),
    }
}

/// A mounted effect. Inert when the backend could not be created or after
/// [`Effect::unmount`]: events and frames are then ignored.
pub struct Effect<B: FluidBackend> {
    simulation: Option<Simulation<B>>,
    surface: Option<B::Surface>,
}

impl<B: FluidBackend> Effect<B> {
    pub fn mount(backend: Result<B, FluidError>, config: SimConfig, canvas: CanvasSize) -> Self {
        match backend {
            Ok(backend) => {
                let mut simulation = Simulation::new(backend, config, canvas);
                let surface = simulation.create_surface();
                Self {
                    simulation: Some(simulation),
                    surface: Some(surface),
                }
            }
            Err(err) => {
                log::error!("fluid effect disabled: {err}");
                Self::inert()
            }
        }
    }

    pub fn inert() -> Self {
        Self {
            simulation: None,
            surface: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.simulation.is_some()
    }

    pub fn simulation(&self) -> Option<&Simulation<B>> {
        self.simulation.as_ref()
    }

    pub fn simulation_mut(&mut self) -> Option<&mut Simulation<B>> {
        self.simulation.as_mut()
    }

    pub fn handle_event(&mut self, event: InputEvent) {
        if let Some(simulation) = self.simulation.as_mut() {
            simulation.handle_event(event);
        }
    }

    pub fn set_config(&mut self, config: SimConfig) {
        if let Some(simulation) = self.simulation.as_mut() {
            simulation.set_config(config);
        }
    }

    /// Runs one frame and returns the surface it was composited into.
    pub fn frame(&mut self, now: Instant, canvas: CanvasSize) -> Option<&B::Surface> {
        let simulation = self.simulation.as_mut()?;
        let surface = self.surface.as_mut()?;
        simulation.frame(now, canvas, surface);
        self.surface.as_ref()
    }

    /// Reads the last composited surface back into memory.
    pub fn read_frame(&mut self) -> Option<Frame> {
        let simulation = self.simulation.as_mut()?;
        let surface = self.surface.as_ref()?;
        match simulation.backend_mut().read_surface(surface) {
            Ok(frame) => Some(frame),
            Err(err) => {
                log::error!("frame readback failed: {err}");
                None
            }
        }
    }

    /// Releases the simulation and its targets.
    pub fn unmount(&mut self) {
        if self.simulation.is_some() {
            log::debug!("unmounting fluid effect");
        }
        self.surface = None;
        self.simulation = None;
    }
}
