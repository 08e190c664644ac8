//! Tunable parameters of the effect.
//!
//! Keys use the upper-case names hosts already pass around
//! (`SIM_RESOLUTION`, `SPLAT_FORCE`, ...), so a host can hand over a partial JSON
//! object and the remaining fields fall back to their defaults.

use crate::color::Rgb;
use crate::error::FluidError;
use crate::target::MAX_TEXTURE_DIMENSION;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Smallest `SPLAT_RADIUS`; the Gaussian divides by the radius.
pub const MIN_SPLAT_RADIUS: f32 = 1e-4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SimConfig {
    pub sim_resolution: u32,
    pub dye_resolution: u32,
    /// Short-side resolution of exported captures.
    pub capture_resolution: u32,
    pub density_dissipation: f32,
    pub velocity_dissipation: f32,
    /// Warm-start factor applied to last frame's pressure.
    pub pressure: f32,
    pub pressure_iterations: u32,
    pub curl: f32,
    pub splat_radius: f32,
    pub splat_force: f32,
    pub shading: bool,
    pub color_update_speed: f32,
    pub back_color: Rgb,
    pub transparent: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            sim_resolution: 128,
            dye_resolution: 1024,
            capture_resolution: 512,
            density_dissipation: 3.5,
            velocity_dissipation: 2.0,
            pressure: 0.1,
            pressure_iterations: 15,
            curl: 3.0,
            splat_radius: 0.2,
            splat_force: 6000.0,
            shading: true,
            color_update_speed: 10.0,
            back_color: Rgb::new(0.5, 0.0, 0.0),
            transparent: true,
        }
    }
}

impl SimConfig {
    pub fn from_json(json: &str) -> Result<Self, FluidError> {
        let config: SimConfig = serde_json::from_str(json)?;
        Ok(config.sanitized())
    }

    pub fn load(path: &Path) -> Result<Self, FluidError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String, FluidError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Clamps values the solver cannot run with.
    pub fn sanitized(mut self) -> Self {
        self.sim_resolution = self.sim_resolution.clamp(1, MAX_TEXTURE_DIMENSION);
        self.dye_resolution = self.dye_resolution.clamp(1, MAX_TEXTURE_DIMENSION);
        self.capture_resolution = self.capture_resolution.clamp(1, MAX_TEXTURE_DIMENSION);
        self.density_dissipation = non_negative(self.density_dissipation);
        self.velocity_dissipation = non_negative(self.velocity_dissipation);
        self.pressure = non_negative(self.pressure);
        self.splat_radius = non_negative(self.splat_radius).max(MIN_SPLAT_RADIUS);
        self.color_update_speed = non_negative(self.color_update_speed);
        if !self.curl.is_finite() {
            self.curl = 0.0;
        }
        if !self.splat_force.is_finite() {
            self.splat_force = 0.0;
        }
        self
    }

    /// Settings that still look right without hardware linear filtering.
    pub fn degraded_for_nearest_filtering(mut self) -> Self {
        self.dye_resolution = 256;
        self.shading = false;
        self
    }

    pub fn display_keywords(&self) -> Vec<&'static str> {
        if self.shading {
            vec![crate::shader::SHADING]
        } else {
            Vec::new()
        }
    }
}

fn non_negative(value: f32) -> f32 {
    if value.is_finite() { value.max(0.0) } else { 0.0 }
}
