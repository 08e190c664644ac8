//! Stable-fluids cursor effect: pointer input splats velocity and dye into a
//! grid that is advected, projected and composited every display frame.

pub mod analysis;
pub mod caps;
pub mod color;
pub mod config;
#[cfg(feature = "cpu")]
pub mod cpu_fluid;
pub mod desktop;
pub mod error;
pub mod export;
pub mod field;
pub mod pointer;
pub mod render;
pub mod scheduler;
pub mod shader;
pub mod solver;
pub mod target;

#[cfg(feature = "gpu")]
pub mod gpu_targets;

#[cfg(feature = "gpu")]
pub mod gpu_programs;

#[cfg(feature = "gpu")]
pub mod gpu_fluid;

use analysis::FieldSnapshot;
use caps::Capabilities;
use error::FluidError;
use render::Frame;
use solver::{DisplayParams, Splat, StepParams};
use target::GridSize;

/// Everything the scheduler needs from a solver implementation.
///
/// A backend owns its render targets and programs. All calls are issued from
/// the frame loop or from input handling between frames, never concurrently.
pub trait FluidBackend {
    /// Drawing surface the display pass composites into.
    type Surface;

    fn capabilities(&self) -> Capabilities;

    /// (Re)allocates the field targets. Velocity and dye keep their contents,
    /// resampled; pressure, divergence and curl start from zero.
    fn resize(&mut self, sim: GridSize, dye: GridSize);

    fn set_display_keywords(&mut self, keywords: &[&'static str]);

    fn splat(&mut self, splat: &Splat);

    fn step(&mut self, dt: f32, params: &StepParams);

    fn create_surface(&mut self, size: GridSize) -> Self::Surface;

    fn render(&mut self, surface: &mut Self::Surface, display: &DisplayParams);

    fn read_surface(&mut self, surface: &Self::Surface) -> Result<Frame, FluidError>;

    fn snapshot(&mut self) -> Result<FieldSnapshot, FluidError>;
}

#[cfg(feature = "cpu")]
pub type DefaultBackend = cpu_fluid::CpuFluid;

#[cfg(all(feature = "gpu", not(feature = "cpu")))]
pub type DefaultBackend = gpu_fluid::GpuFluid;

pub use analysis::{AnalysisRecorder, FluidMetrics};
pub use color::Rgb;
pub use config::SimConfig;
#[cfg(feature = "cpu")]
pub use cpu_fluid::CpuFluid;
pub use desktop::SplashApp;
pub use export::ImageExporter;
pub use pointer::{InputEvent, MOUSE_POINTER_ID};
pub use scheduler::{CanvasSize, Effect, Simulation};

#[cfg(feature = "gpu")]
pub use gpu_fluid::GpuFluid;
