//! Pointer and touch input, translated into simulation space.

use crate::color::{Rgb, generate_color};
use glam::Vec2;
use rand::Rng;
use std::collections::HashMap;

/// Identifier the host uses for the mouse; touches use their own ids.
pub const MOUSE_POINTER_ID: i64 = -1;

/// Input pushed by the host between frames. Positions are client (logical)
/// pixels relative to the canvas' top-left corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    PointerDown { id: i64, x: f32, y: f32 },
    PointerMove { id: i64, x: f32, y: f32 },
    PointerUp { id: i64 },
    PixelRatioChanged(f32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pointer {
    pub id: i64,
    pub texcoord: Vec2,
    pub prev_texcoord: Vec2,
    /// Aspect-corrected motion since the previous event.
    pub delta: Vec2,
    pub down: bool,
    pub moved: bool,
    pub color: Rgb,
}

impl Pointer {
    fn new(id: i64) -> Self {
        Self {
            id,
            texcoord: Vec2::ZERO,
            prev_texcoord: Vec2::ZERO,
            delta: Vec2::ZERO,
            down: false,
            moved: false,
            color: Rgb::new(0.15, 0.0, 0.3),
        }
    }
}

/// Maps client pixels to normalized texture coordinates of the drawing
/// buffer (origin bottom-left) and corrects deltas and radii for aspect.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputTranslator {
    pub pixel_ratio: f32,
    /// Drawing-buffer size in physical pixels.
    pub backing_width: u32,
    pub backing_height: u32,
}

impl Default for InputTranslator {
    fn default() -> Self {
        Self {
            pixel_ratio: 1.0,
            backing_width: 1,
            backing_height: 1,
        }
    }
}

impl InputTranslator {
    pub fn scale_by_pixel_ratio(&self, value: f32) -> u32 {
        (value * self.pixel_ratio).floor().max(0.0) as u32
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.backing_width.max(1) as f32 / self.backing_height.max(1) as f32
    }

    pub fn texcoord(&self, x: f32, y: f32) -> Vec2 {
        let px = (x * self.pixel_ratio).floor();
        let py = (y * self.pixel_ratio).floor();
        Vec2::new(
            px / self.backing_width.max(1) as f32,
            1.0 - py / self.backing_height.max(1) as f32,
        )
    }

    pub fn correct_delta_x(&self, delta: f32) -> f32 {
        let aspect = self.aspect_ratio();
        if aspect < 1.0 { delta * aspect } else { delta }
    }

    pub fn correct_delta_y(&self, delta: f32) -> f32 {
        let aspect = self.aspect_ratio();
        if aspect > 1.0 { delta / aspect } else { delta }
    }

    pub fn correct_radius(&self, radius: f32) -> f32 {
        let aspect = self.aspect_ratio();
        if aspect > 1.0 { radius * aspect } else { radius }
    }
}

/// Pointer records by id. Records outlive their gestures.
#[derive(Debug, Default)]
pub struct PointerTable {
    pointers: HashMap<i64, Pointer>,
}

impl PointerTable {
    pub fn get(&self, id: i64) -> Option<&Pointer> {
        self.pointers.get(&id)
    }

    pub fn len(&self) -> usize {
        self.pointers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pointers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pointer> {
        self.pointers.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Pointer> {
        self.pointers.values_mut()
    }

    pub fn down(
        &mut self,
        id: i64,
        texcoord: Vec2,
        rng: &mut impl Rng,
    ) -> &Pointer {
        let pointer = self.pointers.entry(id).or_insert_with(|| Pointer::new(id));
        pointer.down = true;
        pointer.moved = false;
        pointer.texcoord = texcoord;
        pointer.prev_texcoord = texcoord;
        pointer.delta = Vec2::ZERO;
        pointer.color = generate_color(rng);
        pointer
    }

    /// Moves a pointer, creating its record on first sight so hover motion
    /// splats without a prior press.
    pub fn moved(
        &mut self,
        id: i64,
        texcoord: Vec2,
        translator: &InputTranslator,
        rng: &mut impl Rng,
    ) {
        let pointer = self.pointers.entry(id).or_insert_with(|| {
            let mut p = Pointer::new(id);
            p.texcoord = texcoord;
            p.color = generate_color(rng);
            p
        });
        pointer.prev_texcoord = pointer.texcoord;
        pointer.texcoord = texcoord;
        let raw = pointer.texcoord - pointer.prev_texcoord;
        pointer.delta = Vec2::new(
            translator.correct_delta_x(raw.x),
            translator.correct_delta_y(raw.y),
        );
        pointer.moved = pointer.delta.x.abs() > 0.0 || pointer.delta.y.abs() > 0.0;
    }

    pub fn up(&mut self, id: i64) {
        if let Some(pointer) = self.pointers.get_mut(&id) {
            pointer.down = false;
        }
    }

    /// Gives every pointer a fresh color.
    pub fn recolor(&mut self, rng: &mut impl Rng) {
        for pointer in self.pointers.values_mut() {
            pointer.color = generate_color(rng);
        }
    }
}
