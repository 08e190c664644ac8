use crate::FluidBackend;
use crate::error::FluidError;
use crate::render::render_velocity_field;
use crate::scheduler::{CanvasSize, Simulation};
use std::path::{Path, PathBuf};

/// Writes captures and field visualizations of a running simulation as PNG.
pub struct ImageExporter {
    output_dir: PathBuf,
    /// Velocity magnitude that saturates a channel in velocity images.
    pub velocity_scale: f32,
}

impl ImageExporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            velocity_scale: 1.0,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Captures the display at the configured capture resolution.
    pub fn export_capture_png<B: FluidBackend>(
        &self,
        simulation: &mut Simulation<B>,
        name: &str,
    ) -> Result<PathBuf, FluidError> {
        let frame = simulation.capture()?;
        let path = self.output_dir.join(name);
        frame.to_rgba_image().save(&path)?;
        Ok(path)
    }

    pub fn export_velocity_png<B: FluidBackend>(
        &self,
        simulation: &mut Simulation<B>,
        name: &str,
    ) -> Result<PathBuf, FluidError> {
        let snapshot = simulation.snapshot()?;
        let path = self.output_dir.join(name);
        render_velocity_field(&snapshot.velocity, self.velocity_scale).save(&path)?;
        Ok(path)
    }

    /// Runs `frames` frames at a fixed `dt`, capturing each one as
    /// `{prefix}_frame_NNNN.png`.
    pub fn export_frame_sequence<B: FluidBackend>(
        &self,
        simulation: &mut Simulation<B>,
        surface: &mut B::Surface,
        canvas: CanvasSize,
        frames: usize,
        dt: f32,
        prefix: &str,
    ) -> Result<Vec<PathBuf>, FluidError> {
        std::fs::create_dir_all(&self.output_dir)?;
        let mut paths = Vec::with_capacity(frames);
        for i in 0..frames {
            simulation.frame_with_dt(dt, canvas, surface);
            paths.push(self.export_capture_png(simulation, &format!("{prefix}_frame_{i:04}.png"))?);
        }
        Ok(paths)
    }
}
