//! Backend-independent pieces of the render target pool: grid sizing, texel
//! sizes and the read/write double buffer.

use glam::Vec2;

/// Largest texture side any target is created with; WebGPU's default
/// `max_texture_dimension_2d`.
pub const MAX_TEXTURE_DIMENSION: u32 = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridSize {
    pub width: u32,
    pub height: u32,
}

impl GridSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }

    pub fn texel_size(&self) -> Vec2 {
        Vec2::new(1.0 / self.width as f32, 1.0 / self.height as f32)
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    /// Both sides limited to `max`.
    pub fn clamped(self, max: u32) -> Self {
        Self::new(self.width.min(max), self.height.min(max))
    }

    /// Grid for `resolution` texels on the short side of a `width x height`
    /// drawing buffer, keeping the buffer's aspect ratio. Neither side exceeds
    /// [`MAX_TEXTURE_DIMENSION`].
    pub fn for_resolution(resolution: u32, width: u32, height: u32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let ratio = width as f32 / height as f32;
        let aspect = if ratio < 1.0 { 1.0 / ratio } else { ratio };
        let min = resolution as f32;
        let max = (resolution as f32 * aspect).round();

        let size = if width > height {
            Self::new(max as u32, min as u32)
        } else {
            Self::new(min as u32, max as u32)
        };
        size.clamped(MAX_TEXTURE_DIMENSION)
    }

    /// Texel count, computed without `u32` overflow.
    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Row-major index of texel `(x, y)`.
    pub fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Filter {
    Nearest,
    Linear,
}

/// Anything with a pixel grid: GPU render targets and CPU fields alike.
pub trait Texels {
    fn size(&self) -> GridSize;

    fn width(&self) -> u32 {
        self.size().width
    }

    fn height(&self) -> u32 {
        self.size().height
    }

    fn texel_size(&self) -> Vec2 {
        self.size().texel_size()
    }
}

/// Two equally sized targets so a pass can read the previous state while
/// writing the next one. `read` and `write` are separately owned values and
/// can never alias.
#[derive(Debug, Clone)]
pub struct DoubleBuffer<T> {
    read: T,
    write: T,
}

impl<T> DoubleBuffer<T> {
    pub fn new(read: T, write: T) -> Self {
        Self { read, write }
    }

    pub fn read(&self) -> &T {
        &self.read
    }

    pub fn write(&self) -> &T {
        &self.write
    }

    pub fn write_mut(&mut self) -> &mut T {
        &mut self.write
    }

    pub fn read_mut(&mut self) -> &mut T {
        &mut self.read
    }

    /// Borrow the source and destination of one pass at the same time.
    pub fn split(&mut self) -> (&T, &mut T) {
        (&self.read, &mut self.write)
    }

    pub fn swap(&mut self) {
        std::mem::swap(&mut self.read, &mut self.write);
    }

    /// Replaces both halves, returning the old pair for release.
    pub fn replace(&mut self, read: T, write: T) -> (T, T) {
        let old_read = std::mem::replace(&mut self.read, read);
        let old_write = std::mem::replace(&mut self.write, write);
        (old_read, old_write)
    }

    pub fn into_inner(self) -> (T, T) {
        (self.read, self.write)
    }
}

impl<T: Texels> DoubleBuffer<T> {
    pub fn size(&self) -> GridSize {
        self.read.size()
    }

    pub fn texel_size(&self) -> Vec2 {
        self.read.texel_size()
    }
}
