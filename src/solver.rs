//! Per-frame inputs shared by both backends.

use crate::color::Rgb;
use crate::config::SimConfig;
use glam::Vec2;

/// Upper bound on a frame's timestep. A tab resuming after a stall must not
/// push one huge step through advection and the Jacobi solve.
pub const MAX_DT: f32 = 0.016666;

/// Scalars consumed by one solver step, snapshotted from the configuration
/// at the frame boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepParams {
    pub curl: f32,
    pub pressure: f32,
    pub pressure_iterations: u32,
    pub velocity_dissipation: f32,
    pub density_dissipation: f32,
}

impl From<&SimConfig> for StepParams {
    fn from(config: &SimConfig) -> Self {
        Self {
            curl: config.curl,
            pressure: config.pressure,
            pressure_iterations: config.pressure_iterations,
            velocity_dissipation: config.velocity_dissipation,
            density_dissipation: config.density_dissipation,
        }
    }
}

/// One Gaussian impulse: `velocity` is added to the velocity field and
/// `color` to the dye field, both weighted by `exp(-|p|^2 / radius)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Splat {
    pub point: Vec2,
    pub velocity: Vec2,
    pub color: Rgb,
    pub radius: f32,
    pub aspect_ratio: f32,
}

impl Splat {
    pub fn weight(&self, uv: Vec2) -> f32 {
        let mut p = uv - self.point;
        p.x *= self.aspect_ratio;
        (-p.dot(p) / self.radius).exp()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayParams {
    pub transparent: bool,
    pub back_color: Rgb,
}

impl DisplayParams {
    /// Color the surface is cleared to before the dye is composited.
    pub fn clear_color(&self) -> [f32; 4] {
        if self.transparent {
            [0.0; 4]
        } else {
            let c = self.back_color;
            [c.r, c.g, c.b, 1.0]
        }
    }
}

impl From<&SimConfig> for DisplayParams {
    fn from(config: &SimConfig) -> Self {
        Self {
            transparent: config.transparent,
            back_color: config.back_color,
        }
    }
}
