use crate::field::Field;
use crate::target::{GridSize, Texels};
use glam::Vec4;
use image::{ImageBuffer, Rgb, RgbImage, Rgba, RgbaImage};

/// A composited surface in memory: row 0 is the top of the picture and
/// colors are premultiplied by alpha, as the display blend leaves them.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub size: GridSize,
    pub pixels: Vec<Vec4>,
}

impl Frame {
    pub fn new(size: GridSize) -> Self {
        Self {
            size,
            pixels: vec![Vec4::ZERO; size.area()],
        }
    }

    pub fn clear(&mut self, color: [f32; 4]) {
        self.pixels.fill(Vec4::from_array(color));
    }

    pub fn pixel(&self, x: u32, y: u32) -> Vec4 {
        self.pixels[self.size.index(x, y)]
    }

    /// Straight-alpha 8-bit image, ready for PNG encoding.
    pub fn to_rgba_image(&self) -> RgbaImage {
        ImageBuffer::from_fn(self.size.width, self.size.height, |x, y| {
            let p = self.pixel(x, y);
            let a = p.w.clamp(0.0, 1.0);
            let unpremultiply = |c: f32| if a > 0.0 { c / a } else { 0.0 };
            Rgba([
                to_byte(unpremultiply(p.x)),
                to_byte(unpremultiply(p.y)),
                to_byte(unpremultiply(p.z)),
                to_byte(a),
            ])
        })
    }

    /// Premultiplied 8-bit RGBA bytes, row-major.
    pub fn to_premultiplied_bytes(&self) -> Vec<u8> {
        self.pixels
            .iter()
            .flat_map(|p| p.to_array().map(to_byte))
            .collect()
    }
}

impl Texels for Frame {
    fn size(&self) -> GridSize {
        self.size
    }
}

/// Maps velocity to color (red for |x|, green for |y|), scaled so `scale`
/// saturates. Rows are flipped so up in the field is up in the image.
pub fn render_velocity_field(velocity: &Field, scale: f32) -> RgbImage {
    let size = velocity.size();
    ImageBuffer::from_fn(size.width, size.height, |x, y| {
        let v = velocity.texel(x, size.height - 1 - y);
        Rgb([
            to_byte(v.x.abs() / scale),
            to_byte(v.y.abs() / scale),
            128,
        ])
    })
}

fn to_byte(c: f32) -> u8 {
    (c.clamp(0.0, 1.0) * 255.0).round() as u8
}
