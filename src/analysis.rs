use crate::field::Field;
use crate::target::Texels;
use glam::Vec2;

/// Fields read back from a backend after a frame.
#[derive(Debug, Clone)]
pub struct FieldSnapshot {
    pub velocity: Field,
    pub dye: Field,
    pub pressure: Field,
}

#[derive(Debug, Clone)]
pub struct FluidMetrics {
    pub peak_dye: f32,
    pub total_dye: f32,
    pub peak_speed: f32,
    pub kinetic_energy: f32,
    /// Sum of the wall-mirrored divergence over the grid; zero for a closed box.
    pub net_divergence: f32,
    pub mean_abs_divergence: f32,
    /// Dye-weighted center in uv space, `None` when there is no dye.
    pub dye_centroid: Option<Vec2>,
    pub frame: usize,
}

impl FluidMetrics {
    pub fn analyze(snapshot: &FieldSnapshot, frame: usize) -> Self {
        let dye = &snapshot.dye;
        let dye_size = dye.size();
        let texel = dye_size.texel_size();

        let mut peak_dye: f32 = 0.0;
        let mut total_dye = 0.0;
        let mut weighted = Vec2::ZERO;
        for y in 0..dye_size.height {
            for x in 0..dye_size.width {
                let c = dye.texel(x, y);
                let brightness = c.x.max(0.0) + c.y.max(0.0) + c.z.max(0.0);
                peak_dye = peak_dye.max(c.x.max(c.y).max(c.z));
                total_dye += brightness;
                weighted += (Vec2::new(x as f32, y as f32) + 0.5) * texel * brightness;
            }
        }
        let dye_centroid = (total_dye > 0.0).then(|| weighted / total_dye);

        let velocity = &snapshot.velocity;
        let mut peak_speed: f32 = 0.0;
        let mut kinetic_energy = 0.0;
        for v in velocity.texels() {
            let speed = v.truncate().truncate().length();
            peak_speed = peak_speed.max(speed);
            kinetic_energy += 0.5 * speed * speed;
        }

        let (net_divergence, abs_divergence) = mirrored_divergence(velocity);
        let cells = velocity.texels().len().max(1) as f32;

        Self {
            peak_dye,
            total_dye,
            peak_speed,
            kinetic_energy,
            net_divergence,
            mean_abs_divergence: abs_divergence / cells,
            dye_centroid,
            frame,
        }
    }

    pub fn print_summary(&self) {
        println!("Frame {} Metrics:", self.frame);
        println!("  Peak Dye: {:.6}", self.peak_dye);
        println!("  Total Dye: {:.6}", self.total_dye);
        println!("  Peak Speed: {:.6}", self.peak_speed);
        println!("  Kinetic Energy: {:.6}", self.kinetic_energy);
        println!("  Net Divergence: {:.6}", self.net_divergence);
        println!("  Mean |Divergence|: {:.6}", self.mean_abs_divergence);
        match self.dye_centroid {
            Some(c) => println!("  Dye Centroid: ({:.4}, {:.4})", c.x, c.y),
            None => println!("  Dye Centroid: none"),
        }
        println!();
    }
}

/// Central-difference divergence with reflecting walls, summed and
/// absolute-summed over the grid.
fn mirrored_divergence(velocity: &Field) -> (f32, f32) {
    let size = velocity.size();
    let (w, h) = (size.width as i64, size.height as i64);
    let mut net = 0.0;
    let mut abs = 0.0;

    for y in 0..h {
        for x in 0..w {
            let c = velocity.fetch(x, y);
            let l = if x == 0 { -c.x } else { velocity.fetch(x - 1, y).x };
            let r = if x == w - 1 { -c.x } else { velocity.fetch(x + 1, y).x };
            let b = if y == 0 { -c.y } else { velocity.fetch(x, y - 1).y };
            let t = if y == h - 1 { -c.y } else { velocity.fetch(x, y + 1).y };
            let div = 0.5 * (r - l + t - b);
            net += div;
            abs += div.abs();
        }
    }

    (net, abs)
}

pub struct AnalysisRecorder {
    pub metrics_history: Vec<FluidMetrics>,
}

impl Default for AnalysisRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisRecorder {
    pub fn new() -> Self {
        Self {
            metrics_history: Vec::new(),
        }
    }

    pub fn record_frame(&mut self, snapshot: &FieldSnapshot, frame: usize) {
        self.metrics_history.push(FluidMetrics::analyze(snapshot, frame));
    }

    /// True when peak dye fell on every recorded frame.
    pub fn peak_dye_strictly_decreasing(&self) -> bool {
        self.metrics_history
            .windows(2)
            .all(|w| w[1].peak_dye < w[0].peak_dye)
    }

    pub fn print_trends(&self) {
        if self.metrics_history.len() < 2 {
            return;
        }

        let first = &self.metrics_history[0];
        let last = &self.metrics_history[self.metrics_history.len() - 1];

        println!("=== TREND ANALYSIS ===");
        println!(
            "Peak dye: {:.6} -> {:.6} ({:+.3}%)",
            first.peak_dye,
            last.peak_dye,
            (last.peak_dye - first.peak_dye) / first.peak_dye.max(0.001) * 100.0
        );
        println!(
            "Kinetic energy: {:.6} -> {:.6} ({:+.3}%)",
            first.kinetic_energy,
            last.kinetic_energy,
            (last.kinetic_energy - first.kinetic_energy) / first.kinetic_energy.max(0.001)
                * 100.0
        );
        println!(
            "Mean |divergence|: {:.6} -> {:.6}",
            first.mean_abs_divergence, last.mean_abs_divergence
        );
        println!(
            "Peak dye strictly decreasing: {}",
            self.peak_dye_strictly_decreasing()
        );
    }
}
