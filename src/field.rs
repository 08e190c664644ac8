//! CPU render targets.
//!
//! A [`Field`] behaves like a float texture bound with clamp-to-edge
//! addressing: `uv` coordinates address texel centers at `(i + 0.5) / width`,
//! nearest sampling picks the containing texel and linear sampling blends the
//! four surrounding centers. Passes are evaluated texel by texel with the same
//! varyings the shared vertex stage produces on the GPU.

use crate::caps::Channels;
use crate::target::{Filter, GridSize, Texels};
use glam::{Vec2, Vec4};
use rayon::prelude::*;

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    size: GridSize,
    channels: Channels,
    filter: Filter,
    texels: Vec<Vec4>,
}

impl Texels for Field {
    fn size(&self) -> GridSize {
        self.size
    }
}

/// Per-texel inputs of a fragment program.
#[derive(Debug, Clone, Copy)]
pub struct Varyings {
    pub uv: Vec2,
    pub l: Vec2,
    pub r: Vec2,
    pub t: Vec2,
    pub b: Vec2,
}

impl Varyings {
    pub fn new(uv: Vec2, texel_size: Vec2) -> Self {
        Self {
            uv,
            l: uv - Vec2::new(texel_size.x, 0.0),
            r: uv + Vec2::new(texel_size.x, 0.0),
            t: uv + Vec2::new(0.0, texel_size.y),
            b: uv - Vec2::new(0.0, texel_size.y),
        }
    }
}

impl Field {
    /// A zero-cleared target.
    pub fn allocate(size: GridSize, channels: Channels, filter: Filter) -> Self {
        Self {
            size,
            channels,
            filter,
            texels: vec![Vec4::ZERO; size.area()],
        }
    }

    pub fn from_texels(
        size: GridSize,
        channels: Channels,
        filter: Filter,
        texels: Vec<Vec4>,
    ) -> Self {
        assert_eq!(texels.len(), size.area());
        let mut field = Self {
            size,
            channels,
            filter,
            texels,
        };
        let channels = field.channels;
        field.texels.iter_mut().for_each(|t| *t = mask(*t, channels));
        field
    }

    pub fn channels(&self) -> Channels {
        self.channels
    }

    pub fn filter(&self) -> Filter {
        self.filter
    }

    pub fn texels(&self) -> &[Vec4] {
        &self.texels
    }

    pub fn texel(&self, x: u32, y: u32) -> Vec4 {
        self.texels[self.size.index(x, y)]
    }

    /// Texel lookup with clamp-to-edge addressing.
    pub fn fetch(&self, x: i64, y: i64) -> Vec4 {
        let x = x.clamp(0, self.size.width as i64 - 1);
        let y = y.clamp(0, self.size.height as i64 - 1);
        self.texel(x as u32, y as u32)
    }

    pub fn sample(&self, uv: Vec2) -> Vec4 {
        match self.filter {
            Filter::Nearest => self.sample_nearest(uv),
            Filter::Linear => self.sample_linear(uv),
        }
    }

    pub fn sample_nearest(&self, uv: Vec2) -> Vec4 {
        let st = uv * Vec2::new(self.size.width as f32, self.size.height as f32);
        self.fetch(st.x.floor() as i64, st.y.floor() as i64)
    }

    pub fn sample_linear(&self, uv: Vec2) -> Vec4 {
        let st = uv * Vec2::new(self.size.width as f32, self.size.height as f32) - 0.5;
        let i = st.floor();
        let f = st - i;
        let (x, y) = (i.x as i64, i.y as i64);

        let a = self.fetch(x, y);
        let b = self.fetch(x + 1, y);
        let c = self.fetch(x, y + 1);
        let d = self.fetch(x + 1, y + 1);
        a.lerp(b, f.x).lerp(c.lerp(d, f.x), f.y)
    }

    /// Runs a fragment program over every texel of this target.
    ///
    /// `shade` must not read `self`; the borrow checker enforces that a target
    /// is never sampled by the pass writing it.
    pub fn draw(&mut self, texel_size: Vec2, shade: impl Fn(&Varyings) -> Vec4 + Sync) {
        let channels = self.channels;
        draw_rows(self.size, &mut self.texels, texel_size, |varyings, _| {
            mask(shade(varyings), channels)
        });
    }

    /// New target of `size` holding this target's contents resampled by the
    /// copy program.
    pub fn resized(&self, size: GridSize) -> Field {
        let mut target = Field::allocate(size, self.channels, self.filter);
        target.draw(size.texel_size(), |v| self.sample(v.uv));
        target
    }

    pub fn max_component(&self, component: usize) -> f32 {
        self.texels
            .iter()
            .map(|t| t[component].abs())
            .fold(0.0, f32::max)
    }
}

/// Evaluates `shade` for every texel of a `size` grid in row-major `texels`,
/// rows in parallel. `shade` also receives the texel's previous value for
/// blending.
pub fn draw_rows(
    size: GridSize,
    texels: &mut [Vec4],
    texel_size: Vec2,
    shade: impl Fn(&Varyings, Vec4) -> Vec4 + Sync,
) {
    let width = size.width as usize;
    let inv = Vec2::new(1.0 / size.width as f32, 1.0 / size.height as f32);

    texels
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, texel) in row.iter_mut().enumerate() {
                let uv = (Vec2::new(x as f32, y as f32) + 0.5) * inv;
                *texel = shade(&Varyings::new(uv, texel_size), *texel);
            }
        });
}

/// Drops the components a narrower format cannot store.
fn mask(value: Vec4, channels: Channels) -> Vec4 {
    match channels {
        Channels::Four => value,
        Channels::Two => Vec4::new(value.x, value.y, 0.0, 1.0),
        Channels::One => Vec4::new(value.x, 0.0, 0.0, 1.0),
    }
}
