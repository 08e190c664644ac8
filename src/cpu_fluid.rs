//! Texel-exact CPU rendition of the fragment pipeline.
//!
//! Each pass below evaluates the same per-texel function as the matching
//! program in `src/shaders/`, over the same render targets, in the same order.
//! Rows are shaded in parallel with rayon; a pass only ever reads targets it
//! does not write, so results do not depend on scheduling.

use crate::FluidBackend;
use crate::analysis::FieldSnapshot;
use crate::caps::{Capabilities, Channels};
use crate::error::FluidError;
use crate::field::{Field, draw_rows};
use crate::render::Frame;
use crate::shader::{KeywordSet, MANUAL_FILTERING, Material, ProgramKind, SHADING};
use crate::solver::{DisplayParams, Splat, StepParams};
use crate::target::{DoubleBuffer, Filter, GridSize, Texels};
use glam::{Vec2, Vec3, Vec4};

/// The display program's compiled form: which keyword branches it took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayProgram {
    pub shading: bool,
}

impl DisplayProgram {
    fn compile(_kind: ProgramKind, keywords: &KeywordSet) -> Option<Self> {
        Some(Self {
            shading: keywords.contains(SHADING),
        })
    }
}

#[derive(Debug, Clone)]
pub struct CpuFields {
    pub dye: DoubleBuffer<Field>,
    pub velocity: DoubleBuffer<Field>,
    pub divergence: Field,
    pub curl: Field,
    pub pressure: DoubleBuffer<Field>,
}

#[derive(Clone)]
pub struct CpuFluid {
    caps: Capabilities,
    manual_filtering: bool,
    fields: Option<CpuFields>,
    display: Material<DisplayProgram>,
}

impl Default for CpuFluid {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuFluid {
    pub fn new() -> Self {
        Self::with_capabilities(Capabilities::full())
    }

    /// A backend that behaves like hardware with the given capabilities, e.g.
    /// without linear filtering.
    pub fn with_capabilities(caps: Capabilities) -> Self {
        let advection = if caps.linear_filtering {
            KeywordSet::default()
        } else {
            KeywordSet::new(&[MANUAL_FILTERING])
        };
        Self {
            caps,
            manual_filtering: advection.contains(MANUAL_FILTERING),
            fields: None,
            display: Material::new(ProgramKind::Display),
        }
    }

    pub fn fields(&self) -> Option<&CpuFields> {
        self.fields.as_ref()
    }

    pub fn fields_mut(&mut self) -> Option<&mut CpuFields> {
        self.fields.as_mut()
    }

    fn field_filter(&self) -> Filter {
        if self.caps.linear_filtering {
            Filter::Linear
        } else {
            Filter::Nearest
        }
    }

    fn double(size: GridSize, channels: Channels, filter: Filter) -> DoubleBuffer<Field> {
        DoubleBuffer::new(
            Field::allocate(size, channels, filter),
            Field::allocate(size, channels, filter),
        )
    }

    /// Keeps `read`'s contents at the new size; `write` is scratch and starts
    /// cleared. Same-size resizes leave the buffer untouched.
    fn resize_double(buffer: &mut DoubleBuffer<Field>, size: GridSize) {
        if buffer.size() == size {
            return;
        }
        let read = buffer.read().resized(size);
        let write = Field::allocate(size, read.channels(), read.filter());
        buffer.replace(read, write);
    }

    pub fn curl_pass(&mut self) {
        let Some(f) = self.fields.as_mut() else { return };
        let velocity = f.velocity.read();
        let texel = velocity.texel_size();
        f.curl.draw(texel, |v| {
            let l = velocity.sample(v.l).y;
            let r = velocity.sample(v.r).y;
            let t = velocity.sample(v.t).x;
            let b = velocity.sample(v.b).x;
            Vec4::new(0.5 * (r - l - t + b), 0.0, 0.0, 1.0)
        });
    }

    pub fn vorticity_pass(&mut self, curl_strength: f32, dt: f32) {
        let Some(f) = self.fields.as_mut() else { return };
        let texel = f.velocity.texel_size();
        let curl = &f.curl;
        let (velocity, out) = f.velocity.split();
        out.draw(texel, |v| {
            let l = curl.sample(v.l).x;
            let r = curl.sample(v.r).x;
            let t = curl.sample(v.t).x;
            let b = curl.sample(v.b).x;
            let c = curl.sample(v.uv).x;

            let mut force = 0.5 * Vec2::new(t.abs() - b.abs(), r.abs() - l.abs());
            force /= force.length() + 0.0001;
            force *= curl_strength * c;
            force.y = -force.y;

            let vel = velocity.sample(v.uv).truncate().truncate() + force * dt;
            let vel = vel.clamp(Vec2::splat(-1000.0), Vec2::splat(1000.0));
            Vec4::new(vel.x, vel.y, 0.0, 1.0)
        });
        f.velocity.swap();
    }

    pub fn divergence_pass(&mut self) {
        let Some(f) = self.fields.as_mut() else { return };
        let velocity = f.velocity.read();
        let texel = velocity.texel_size();
        f.divergence.draw(texel, |v| {
            let mut l = velocity.sample(v.l).x;
            let mut r = velocity.sample(v.r).x;
            let mut t = velocity.sample(v.t).y;
            let mut b = velocity.sample(v.b).y;
            let c = velocity.sample(v.uv);

            if v.l.x < 0.0 {
                l = -c.x;
            }
            if v.r.x > 1.0 {
                r = -c.x;
            }
            if v.t.y > 1.0 {
                t = -c.y;
            }
            if v.b.y < 0.0 {
                b = -c.y;
            }
            Vec4::new(0.5 * (r - l + t - b), 0.0, 0.0, 1.0)
        });
    }

    /// Scales last frame's pressure instead of zeroing it.
    pub fn clear_pressure(&mut self, value: f32) {
        let Some(f) = self.fields.as_mut() else { return };
        let texel = f.pressure.texel_size();
        let (pressure, out) = f.pressure.split();
        out.draw(texel, |v| value * pressure.sample(v.uv));
        f.pressure.swap();
    }

    pub fn pressure_solve(&mut self, iterations: u32) {
        let Some(f) = self.fields.as_mut() else { return };
        let texel = f.velocity.texel_size();
        let divergence = &f.divergence;
        for _ in 0..iterations {
            let (pressure, out) = f.pressure.split();
            out.draw(texel, |v| {
                let l = pressure.sample(v.l).x;
                let r = pressure.sample(v.r).x;
                let t = pressure.sample(v.t).x;
                let b = pressure.sample(v.b).x;
                let div = divergence.sample(v.uv).x;
                Vec4::new((l + r + b + t - div) * 0.25, 0.0, 0.0, 1.0)
            });
            f.pressure.swap();
        }
    }

    pub fn gradient_subtract(&mut self) {
        let Some(f) = self.fields.as_mut() else { return };
        let texel = f.velocity.texel_size();
        let pressure = f.pressure.read();
        let (velocity, out) = f.velocity.split();
        out.draw(texel, |v| {
            let l = pressure.sample(v.l).x;
            let r = pressure.sample(v.r).x;
            let t = pressure.sample(v.t).x;
            let b = pressure.sample(v.b).x;
            let vel = velocity.sample(v.uv).truncate().truncate() - Vec2::new(r - l, t - b);
            Vec4::new(vel.x, vel.y, 0.0, 1.0)
        });
        f.velocity.swap();
    }

    pub fn advect_velocity(&mut self, dt: f32, dissipation: f32) {
        let manual = self.manual_filtering;
        let Some(f) = self.fields.as_mut() else { return };
        let texel = f.velocity.texel_size();
        let (velocity, out) = f.velocity.split();
        out.draw(texel, |v| {
            advect(velocity, velocity, v.uv, texel, texel, dt, dissipation, manual)
        });
        f.velocity.swap();
    }

    pub fn advect_dye(&mut self, dt: f32, dissipation: f32) {
        let manual = self.manual_filtering;
        let Some(f) = self.fields.as_mut() else { return };
        let texel = f.velocity.texel_size();
        let dye_texel = f.dye.texel_size();
        let velocity = f.velocity.read();
        let (dye, out) = f.dye.split();
        out.draw(texel, |v| {
            advect(velocity, dye, v.uv, texel, dye_texel, dt, dissipation, manual)
        });
        f.dye.swap();
    }
}

/// Semi-Lagrangian backward trace of `source` along `velocity`.
#[allow(clippy::too_many_arguments)]
fn advect(
    velocity: &Field,
    source: &Field,
    uv: Vec2,
    texel: Vec2,
    source_texel: Vec2,
    dt: f32,
    dissipation: f32,
    manual_filtering: bool,
) -> Vec4 {
    let result = if manual_filtering {
        let vel = bilerp(velocity, uv, texel).truncate().truncate();
        let coord = uv - dt * vel * texel;
        bilerp(source, coord, source_texel)
    } else {
        let vel = velocity.sample(uv).truncate().truncate();
        let coord = uv - dt * vel * texel;
        source.sample(coord)
    };
    result / (1.0 + dissipation * dt)
}

/// Four nearest taps blended in the shader, for targets without hardware
/// linear filtering.
fn bilerp(field: &Field, uv: Vec2, tsize: Vec2) -> Vec4 {
    let st = uv / tsize - 0.5;
    let iuv = st.floor();
    let fuv = st - iuv;
    let a = field.sample((iuv + Vec2::new(0.5, 0.5)) * tsize);
    let b = field.sample((iuv + Vec2::new(1.5, 0.5)) * tsize);
    let c = field.sample((iuv + Vec2::new(0.5, 1.5)) * tsize);
    let d = field.sample((iuv + Vec2::new(1.5, 1.5)) * tsize);
    a.lerp(b, fuv.x).lerp(c.lerp(d, fuv.x), fuv.y)
}

fn splat_into(buffer: &mut DoubleBuffer<Field>, splat: &Splat, value: Vec3) {
    let texel = buffer.texel_size();
    let (target, out) = buffer.split();
    out.draw(texel, |v| {
        let base = target.sample(v.uv).truncate();
        (base + splat.weight(v.uv) * value).extend(1.0)
    });
    buffer.swap();
}

impl FluidBackend for CpuFluid {
    type Surface = Frame;

    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    fn resize(&mut self, sim: GridSize, dye: GridSize) {
        let filter = self.field_filter();
        let caps = self.caps;
        log::debug!(
            "allocating cpu fields: sim {}x{}, dye {}x{}",
            sim.width,
            sim.height,
            dye.width,
            dye.height
        );

        match self.fields.as_mut() {
            Some(f) => {
                Self::resize_double(&mut f.dye, dye);
                Self::resize_double(&mut f.velocity, sim);
                f.divergence = Field::allocate(sim, caps.r.channels, Filter::Nearest);
                f.curl = Field::allocate(sim, caps.r.channels, Filter::Nearest);
                f.pressure = Self::double(sim, caps.r.channels, Filter::Nearest);
            }
            None => {
                self.fields = Some(CpuFields {
                    dye: Self::double(dye, caps.rgba.channels, filter),
                    velocity: Self::double(sim, caps.rg.channels, filter),
                    divergence: Field::allocate(sim, caps.r.channels, Filter::Nearest),
                    curl: Field::allocate(sim, caps.r.channels, Filter::Nearest),
                    pressure: Self::double(sim, caps.r.channels, Filter::Nearest),
                });
            }
        }
    }

    fn set_display_keywords(&mut self, keywords: &[&'static str]) {
        self.display.set_keywords(keywords, DisplayProgram::compile);
    }

    fn splat(&mut self, splat: &Splat) {
        let Some(f) = self.fields.as_mut() else { return };
        splat_into(
            &mut f.velocity,
            splat,
            Vec3::new(splat.velocity.x, splat.velocity.y, 0.0),
        );
        splat_into(&mut f.dye, splat, Vec3::from_array(splat.color.to_array()));
    }

    fn step(&mut self, dt: f32, params: &StepParams) {
        self.curl_pass();
        self.vorticity_pass(params.curl, dt);
        self.divergence_pass();
        self.clear_pressure(params.pressure);
        self.pressure_solve(params.pressure_iterations);
        self.gradient_subtract();
        self.advect_velocity(dt, params.velocity_dissipation);
        self.advect_dye(dt, params.density_dissipation);
    }

    fn create_surface(&mut self, size: GridSize) -> Frame {
        Frame::new(size)
    }

    fn render(&mut self, surface: &mut Frame, display: &DisplayParams) {
        surface.clear(display.clear_color());
        let (Some(f), Some(program)) = (self.fields.as_ref(), self.display.active()) else {
            return;
        };
        let dye = f.dye.read();
        let shading = program.shading;
        let texel = surface.size.texel_size();

        draw_rows(surface.size, &mut surface.pixels, texel, |v, dst| {
            let uv = Vec2::new(v.uv.x, 1.0 - v.uv.y);
            let mut c = dye.sample(uv).truncate();

            if shading {
                let lc = dye.sample(uv - Vec2::new(texel.x, 0.0)).truncate();
                let rc = dye.sample(uv + Vec2::new(texel.x, 0.0)).truncate();
                let tc = dye.sample(uv + Vec2::new(0.0, texel.y)).truncate();
                let bc = dye.sample(uv - Vec2::new(0.0, texel.y)).truncate();

                let dx = rc.length() - lc.length();
                let dy = tc.length() - bc.length();
                let n = Vec3::new(dx, dy, texel.length()).normalize();
                let diffuse = (n.dot(Vec3::Z) + 0.7).clamp(0.7, 1.0);
                c *= diffuse;
            }

            let a = c.max_element();
            // ONE, ONE_MINUS_SRC_ALPHA
            c.extend(a) + dst * (1.0 - a)
        });
    }

    fn read_surface(&mut self, surface: &Frame) -> Result<Frame, FluidError> {
        Ok(surface.clone())
    }

    fn snapshot(&mut self) -> Result<FieldSnapshot, FluidError> {
        let f = self
            .fields
            .as_ref()
            .ok_or_else(|| FluidError::Readback("fields not allocated".into()))?;
        Ok(FieldSnapshot {
            velocity: f.velocity.read().clone(),
            dye: f.dye.read().clone(),
            pressure: f.pressure.read().clone(),
        })
    }
}
