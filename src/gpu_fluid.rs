//! wgpu backend: every solver pass is a full-screen fragment draw into a
//! float render target.

use crate::FluidBackend;
use crate::analysis::FieldSnapshot;
use crate::caps::{Capabilities, Channels, negotiate};
use crate::error::FluidError;
use crate::field::Field;
use crate::gpu_programs::{
    DISPLAY_BLEND, Program, Programs, QUAD_INDICES, QUAD_VERTICES, Uniforms,
};
use crate::gpu_targets::{RenderTarget, probe_format, texture_format};
use crate::render::Frame;
use crate::shader::{KeywordSet, MANUAL_FILTERING, Material, ProgramKind};
use crate::solver::{DisplayParams, Splat, StepParams};
use crate::target::{DoubleBuffer, Filter, GridSize, Texels};
use bytemuck::Pod;
use glam::Vec4;
use tokio::sync::oneshot;
use wgpu::util::DeviceExt;
use wgpu::{Buffer, Device, Queue, Sampler, Texture, TextureFormat};

/// Format of drawing surfaces handed to the host.
pub const SURFACE_FORMAT: TextureFormat = TextureFormat::Rgba8Unorm;

/// Intermediate format for reading fields back at full precision.
const READBACK_FORMAT: TextureFormat = TextureFormat::Rgba32Float;

pub struct GpuSurface {
    pub target: RenderTarget,
}

impl Texels for GpuSurface {
    fn size(&self) -> GridSize {
        self.target.size
    }
}

struct GpuFields {
    dye: DoubleBuffer<RenderTarget>,
    velocity: DoubleBuffer<RenderTarget>,
    divergence: RenderTarget,
    curl: RenderTarget,
    pressure: DoubleBuffer<RenderTarget>,
}

pub struct GpuFluid {
    device: Device,
    queue: Queue,
    caps: Capabilities,
    dye_format: TextureFormat,
    velocity_format: TextureFormat,
    scalar_format: TextureFormat,
    uniform_buffer: Buffer,
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    linear_sampler: Sampler,
    nearest_sampler: Sampler,
    programs: Programs,
    display: Material<Program>,
    fields: Option<GpuFields>,
}

impl GpuFluid {
    /// Requests a device, negotiates render-target formats and compiles the
    /// solver programs.
    pub async fn new() -> Result<Self, FluidError> {
        let instance = wgpu::Instance::default();

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| FluidError::Unsupported("no GPU adapter found".into()))?;

        let required_features =
            adapter.features() & wgpu::Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Splash Fluid GPU"),
                    required_features,
                    required_limits: wgpu::Limits::downlevel_defaults()
                        .using_resolution(adapter.limits()),
                },
                None,
            )
            .await
            .map_err(|err| FluidError::DeviceRequest(err.to_string()))?;

        device.on_uncaptured_error(Box::new(|error| {
            log::error!("uncaptured GPU error: {error}");
        }));

        let caps = negotiate(|format| probe_format(&adapter, &device, &queue, format))?;
        log::info!("GPU adapter: {}", adapter.get_info().name);
        Ok(Self::with_device(device, queue, caps))
    }

    fn with_device(device: Device, queue: Queue, caps: Capabilities) -> Self {
        let dye_format = texture_format(caps.rgba);
        let velocity_format = texture_format(caps.rg);
        let scalar_format = texture_format(caps.r);

        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Fluid Uniforms"),
            contents: bytemuck::bytes_of(&Uniforms::default()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Quad Vertices"),
            contents: bytemuck::cast_slice(&QUAD_VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Quad Indices"),
            contents: bytemuck::cast_slice(&QUAD_INDICES),
            usage: wgpu::BufferUsages::INDEX,
        });

        let sampler = |filter: wgpu::FilterMode, label: &str| {
            device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some(label),
                address_mode_u: wgpu::AddressMode::ClampToEdge,
                address_mode_v: wgpu::AddressMode::ClampToEdge,
                address_mode_w: wgpu::AddressMode::ClampToEdge,
                mag_filter: filter,
                min_filter: filter,
                mipmap_filter: wgpu::FilterMode::Nearest,
                ..Default::default()
            })
        };
        let linear_sampler = sampler(wgpu::FilterMode::Linear, "Linear Sampler");
        let nearest_sampler = sampler(wgpu::FilterMode::Nearest, "Nearest Sampler");

        let advection_keywords = if caps.linear_filtering {
            KeywordSet::default()
        } else {
            KeywordSet::new(&[MANUAL_FILTERING])
        };
        let programs = Programs::compile(
            &device,
            &[dye_format, velocity_format, scalar_format, READBACK_FORMAT],
            &advection_keywords,
            caps.linear_filtering,
        );

        Self {
            device,
            queue,
            caps,
            dye_format,
            velocity_format,
            scalar_format,
            uniform_buffer,
            vertex_buffer,
            index_buffer,
            linear_sampler,
            nearest_sampler,
            programs,
            display: Material::new(ProgramKind::Display),
            fields: None,
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    fn field_filter(&self) -> Filter {
        if self.caps.linear_filtering {
            Filter::Linear
        } else {
            Filter::Nearest
        }
    }

    fn sampler_for(&self, target: &RenderTarget) -> &Sampler {
        match target.filter {
            Filter::Linear => &self.linear_sampler,
            Filter::Nearest => &self.nearest_sampler,
        }
    }

    /// `size` limited to the device's largest 2D texture.
    fn fit(&self, size: GridSize) -> GridSize {
        let max = self.device.limits().max_texture_dimension_2d;
        let fitted = size.clamped(max);
        if fitted != size {
            log::warn!(
                "{}x{} exceeds the device texture limit {max}, using {}x{}",
                size.width,
                size.height,
                fitted.width,
                fitted.height
            );
        }
        fitted
    }

    fn allocate(&self, size: GridSize, format: TextureFormat, filter: Filter, label: &str) -> RenderTarget {
        RenderTarget::allocate(&self.device, &self.queue, size, format, filter, label)
    }

    fn allocate_double(
        &self,
        size: GridSize,
        format: TextureFormat,
        filter: Filter,
        label: &str,
    ) -> DoubleBuffer<RenderTarget> {
        DoubleBuffer::new(
            self.allocate(size, format, filter, label),
            self.allocate(size, format, filter, label),
        )
    }

    /// Draws one full-screen pass of `program` into `target`. A missing
    /// program or pipeline makes the pass a no-op.
    fn run_pass(
        &self,
        program: Option<&Program>,
        target: &RenderTarget,
        uniforms: Uniforms,
        inputs: &[(&str, &RenderTarget)],
    ) {
        let Some(program) = program else { return };
        let Some(pipeline) = program.pipeline(target.format) else {
            log::debug!("{} has no pipeline for {:?}", program.kind.name(), target.format);
            return;
        };
        let inputs: Vec<_> = inputs
            .iter()
            .map(|(name, input)| (*name, *input, self.sampler_for(input)))
            .collect();
        let Some(bind_group) = program.bind(&self.device, &self.uniform_buffer, &inputs) else {
            log::error!("{} program is missing an input binding", program.kind.name());
            return;
        };

        self.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Fluid Pass Encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(program.kind.name()),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
            pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
            pass.draw_indexed(0..QUAD_INDICES.len() as u32, 0, 0..1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    /// A new target of `size` holding `source` resampled by the copy program.
    fn resized(&self, source: &RenderTarget, size: GridSize, format: TextureFormat, label: &str) -> RenderTarget {
        let target = self.allocate(size, format, source.filter, label);
        self.run_pass(
            self.programs.copy.as_ref(),
            &target,
            Uniforms {
                texel_size: size.texel_size().to_array(),
                ..Default::default()
            },
            &[("u_texture", source)],
        );
        target
    }

    fn resize_double(&self, buffer: &mut DoubleBuffer<RenderTarget>, size: GridSize, label: &str) {
        if buffer.size() == size {
            return;
        }
        let format = buffer.read().format;
        let filter = buffer.read().filter;
        let read = self.resized(buffer.read(), size, format, label);
        let write = self.allocate(size, format, filter, label);
        let (old_read, old_write) = buffer.replace(read, write);
        old_read.release();
        old_write.release();
    }

    fn splat_into(&self, buffer: &mut DoubleBuffer<RenderTarget>, splat: &Splat, color: [f32; 4]) {
        self.run_pass(
            self.programs.splat.as_ref(),
            buffer.write(),
            Uniforms {
                texel_size: buffer.texel_size().to_array(),
                point: splat.point.to_array(),
                aspect_ratio: splat.aspect_ratio,
                radius: splat.radius,
                color,
                ..Default::default()
            },
            &[("u_target", buffer.read())],
        );
        buffer.swap();
    }

    fn step_fields(&self, f: &mut GpuFields, dt: f32, params: &StepParams) {
        let sim_texel = f.velocity.texel_size().to_array();
        let base = Uniforms {
            texel_size: sim_texel,
            dye_texel_size: sim_texel,
            dt,
            ..Default::default()
        };

        self.run_pass(
            self.programs.curl.as_ref(),
            &f.curl,
            base,
            &[("u_velocity", f.velocity.read())],
        );

        self.run_pass(
            self.programs.vorticity.as_ref(),
            f.velocity.write(),
            Uniforms {
                curl: params.curl,
                ..base
            },
            &[("u_velocity", f.velocity.read()), ("u_curl", &f.curl)],
        );
        f.velocity.swap();

        self.run_pass(
            self.programs.divergence.as_ref(),
            &f.divergence,
            base,
            &[("u_velocity", f.velocity.read())],
        );

        self.run_pass(
            self.programs.clear.as_ref(),
            f.pressure.write(),
            Uniforms {
                value: params.pressure,
                ..base
            },
            &[("u_texture", f.pressure.read())],
        );
        f.pressure.swap();

        for _ in 0..params.pressure_iterations {
            self.run_pass(
                self.programs.pressure.as_ref(),
                f.pressure.write(),
                base,
                &[
                    ("u_pressure", f.pressure.read()),
                    ("u_divergence", &f.divergence),
                ],
            );
            f.pressure.swap();
        }

        self.run_pass(
            self.programs.gradient_subtract.as_ref(),
            f.velocity.write(),
            base,
            &[
                ("u_pressure", f.pressure.read()),
                ("u_velocity", f.velocity.read()),
            ],
        );
        f.velocity.swap();

        self.run_pass(
            self.programs.advection.as_ref(),
            f.velocity.write(),
            Uniforms {
                dissipation: params.velocity_dissipation,
                ..base
            },
            &[
                ("u_velocity", f.velocity.read()),
                ("u_source", f.velocity.read()),
            ],
        );
        f.velocity.swap();

        self.run_pass(
            self.programs.advection.as_ref(),
            f.dye.write(),
            Uniforms {
                dye_texel_size: f.dye.texel_size().to_array(),
                dissipation: params.density_dissipation,
                ..base
            },
            &[("u_velocity", f.velocity.read()), ("u_source", f.dye.read())],
        );
        f.dye.swap();
    }

    /// Copies `texture` into host memory, dropping the row padding the copy
    /// requires.
    fn read_texture<T: Pod>(
        &self,
        texture: &Texture,
        size: GridSize,
        bytes_per_pixel: u32,
    ) -> Result<Vec<T>, FluidError> {
        let unpadded = size.width * bytes_per_pixel;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded = unpadded.div_ceil(align) * align;

        let read_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Buffer"),
            size: padded as u64 * size.height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &read_buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(size.height),
                },
            },
            wgpu::Extent3d {
                width: size.width,
                height: size.height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let buffer_slice = read_buffer.slice(..);
        let (sender, receiver) = oneshot::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });

        self.device.poll(wgpu::Maintain::Wait);

        pollster::block_on(receiver)
            .map_err(|err| FluidError::Readback(err.to_string()))?
            .map_err(|err| FluidError::Readback(err.to_string()))?;

        let mut out = Vec::with_capacity(size.area());
        {
            let data = buffer_slice.get_mapped_range();
            for row in data.chunks_exact(padded as usize) {
                out.extend_from_slice(bytemuck::cast_slice(&row[..unpadded as usize]));
            }
        }
        read_buffer.unmap();
        Ok(out)
    }

    fn read_field(&self, target: &RenderTarget, channels: Channels) -> Result<Field, FluidError> {
        let temp = self.allocate(target.size, READBACK_FORMAT, Filter::Nearest, "Readback Target");
        self.run_pass(
            self.programs.copy.as_ref(),
            &temp,
            Uniforms {
                texel_size: target.texel_size().to_array(),
                ..Default::default()
            },
            &[("u_texture", target)],
        );
        let texels: Vec<[f32; 4]> = self.read_texture(&temp.texture, temp.size, 16)?;
        temp.release();

        Ok(Field::from_texels(
            target.size,
            channels,
            target.filter,
            texels.into_iter().map(Vec4::from_array).collect(),
        ))
    }
}

impl FluidBackend for GpuFluid {
    type Surface = GpuSurface;

    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    fn resize(&mut self, sim: GridSize, dye: GridSize) {
        let sim = self.fit(sim);
        let dye = self.fit(dye);
        log::debug!(
            "allocating gpu targets: sim {}x{}, dye {}x{}",
            sim.width,
            sim.height,
            dye.width,
            dye.height
        );
        let filter = self.field_filter();

        let fields = match self.fields.take() {
            Some(mut f) => {
                self.resize_double(&mut f.dye, dye, "Dye");
                self.resize_double(&mut f.velocity, sim, "Velocity");
                let divergence =
                    self.allocate(sim, self.scalar_format, Filter::Nearest, "Divergence");
                let curl = self.allocate(sim, self.scalar_format, Filter::Nearest, "Curl");
                let pressure =
                    self.allocate_double(sim, self.scalar_format, Filter::Nearest, "Pressure");
                std::mem::replace(&mut f.divergence, divergence).release();
                std::mem::replace(&mut f.curl, curl).release();
                let (old_read, old_write) = std::mem::replace(&mut f.pressure, pressure).into_inner();
                old_read.release();
                old_write.release();
                f
            }
            None => GpuFields {
                dye: self.allocate_double(dye, self.dye_format, filter, "Dye"),
                velocity: self.allocate_double(sim, self.velocity_format, filter, "Velocity"),
                divergence: self.allocate(sim, self.scalar_format, Filter::Nearest, "Divergence"),
                curl: self.allocate(sim, self.scalar_format, Filter::Nearest, "Curl"),
                pressure: self.allocate_double(sim, self.scalar_format, Filter::Nearest, "Pressure"),
            },
        };
        self.fields = Some(fields);
    }

    fn set_display_keywords(&mut self, keywords: &[&'static str]) {
        let device = &self.device;
        let filterable = self.caps.linear_filtering;
        self.display.set_keywords(keywords, |kind, keys| {
            Program::compile(
                device,
                kind,
                keys,
                &[SURFACE_FORMAT],
                Some(DISPLAY_BLEND),
                filterable,
            )
        });
    }

    fn splat(&mut self, splat: &Splat) {
        let Some(mut f) = self.fields.take() else { return };
        self.splat_into(
            &mut f.velocity,
            splat,
            [splat.velocity.x, splat.velocity.y, 0.0, 1.0],
        );
        let [r, g, b] = splat.color.to_array();
        self.splat_into(&mut f.dye, splat, [r, g, b, 1.0]);
        self.fields = Some(f);
    }

    fn step(&mut self, dt: f32, params: &StepParams) {
        let Some(mut f) = self.fields.take() else { return };
        self.step_fields(&mut f, dt, params);
        self.fields = Some(f);
    }

    fn create_surface(&mut self, size: GridSize) -> GpuSurface {
        let size = self.fit(size);
        GpuSurface {
            target: self.allocate(size, SURFACE_FORMAT, Filter::Linear, "Drawing Surface"),
        }
    }

    fn render(&mut self, surface: &mut GpuSurface, display: &DisplayParams) {
        let [r, g, b, a] = display.clear_color().map(f64::from);
        surface
            .target
            .clear(&self.device, &self.queue, wgpu::Color { r, g, b, a });

        let Some(f) = self.fields.as_ref() else { return };
        self.run_pass(
            self.display.active(),
            &surface.target,
            Uniforms {
                texel_size: surface.texel_size().to_array(),
                ..Default::default()
            },
            &[("u_texture", f.dye.read())],
        );
    }

    fn read_surface(&mut self, surface: &GpuSurface) -> Result<Frame, FluidError> {
        let size = surface.target.size;
        let bytes: Vec<[u8; 4]> = self.read_texture(&surface.target.texture, size, 4)?;
        Ok(Frame {
            size,
            pixels: bytes
                .into_iter()
                .map(|p| Vec4::from_array(p.map(|c| c as f32 / 255.0)))
                .collect(),
        })
    }

    fn snapshot(&mut self) -> Result<FieldSnapshot, FluidError> {
        let f = self
            .fields
            .as_ref()
            .ok_or_else(|| FluidError::Readback("targets not allocated".into()))?;
        Ok(FieldSnapshot {
            velocity: self.read_field(f.velocity.read(), self.caps.rg.channels)?,
            dye: self.read_field(f.dye.read(), self.caps.rgba.channels)?,
            pressure: self.read_field(f.pressure.read(), self.caps.r.channels)?,
        })
    }
}
