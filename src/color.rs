//! Dye colors: HSV conversion, random pointer colors and the cycle timer wrap.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Brightness applied to freshly generated pointer colors.
const POINTER_COLOR_SCALE: f32 = 0.15;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0.0, 0.0, 0.0);

    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    pub fn scaled(self, factor: f32) -> Self {
        Self::new(self.r * factor, self.g * factor, self.b * factor)
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.r, self.g, self.b]
    }

    pub fn max_channel(self) -> f32 {
        self.r.max(self.g).max(self.b)
    }
}

pub fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb {
    let i = (h * 6.0).floor();
    let f = h * 6.0 - i;
    let p = v * (1.0 - s);
    let q = v * (1.0 - f * s);
    let t = v * (1.0 - (1.0 - f) * s);

    match (i as i32).rem_euclid(6) {
        0 => Rgb::new(v, t, p),
        1 => Rgb::new(q, v, p),
        2 => Rgb::new(p, v, t),
        3 => Rgb::new(p, q, v),
        4 => Rgb::new(t, p, v),
        _ => Rgb::new(v, p, q),
    }
}

/// A fully saturated random hue, dimmed so repeated splats do not blow out.
pub fn generate_color(rng: &mut impl Rng) -> Rgb {
    hsv_to_rgb(rng.r#gen::<f32>(), 1.0, 1.0).scaled(POINTER_COLOR_SCALE)
}

pub fn wrap(value: f32, min: f32, max: f32) -> f32 {
    let range = max - min;
    if range == 0.0 {
        return min;
    }
    (value - min) % range + min
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn primary_hues() {
        assert_eq!(hsv_to_rgb(0.0, 1.0, 1.0), Rgb::new(1.0, 0.0, 0.0));
        let green = hsv_to_rgb(1.0 / 3.0, 1.0, 1.0);
        assert!((green.g - 1.0).abs() < 1e-5 && green.r < 1e-5 && green.b < 1e-5);
    }

    #[test]
    fn generated_colors_are_dim() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let c = generate_color(&mut rng);
            assert!(c.max_channel() <= POINTER_COLOR_SCALE + 1e-6);
            assert!(c.max_channel() > 0.0);
        }
    }

    #[test]
    fn wrap_keeps_fraction() {
        assert!((wrap(1.25, 0.0, 1.0) - 0.25).abs() < 1e-6);
        assert_eq!(wrap(3.0, 2.0, 2.0), 2.0);
    }
}
