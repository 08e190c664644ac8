//! Render pipelines for the fragment programs in `src/shaders/`.

use crate::gpu_targets::RenderTarget;
use crate::shader::{KeywordSet, ProgramKind};
use bytemuck::{Pod, Zeroable};
use std::borrow::Cow;
use std::collections::HashMap;
use wgpu::{
    BindGroup, BindGroupLayout, Buffer, Device, RenderPipeline, Sampler, TextureFormat,
};

/// Uniform block shared by every program (`Uniforms` in `base.wgsl`).
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Uniforms {
    pub texel_size: [f32; 2],
    pub dye_texel_size: [f32; 2],
    pub point: [f32; 2],
    pub aspect_ratio: f32,
    pub radius: f32,
    pub color: [f32; 4],
    pub dt: f32,
    pub dissipation: f32,
    pub curl: f32,
    pub value: f32,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 2],
}

pub const QUAD_VERTICES: [QuadVertex; 4] = [
    QuadVertex { position: [-1.0, -1.0] },
    QuadVertex { position: [-1.0, 1.0] },
    QuadVertex { position: [1.0, 1.0] },
    QuadVertex { position: [1.0, -1.0] },
];

pub const QUAD_INDICES: [u16; 6] = [0, 1, 2, 0, 2, 3];

/// Premultiplied-over blend used by the display pass.
pub const DISPLAY_BLEND: wgpu::BlendState = wgpu::BlendState {
    color: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
        operation: wgpu::BlendOperation::Add,
    },
    alpha: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
        operation: wgpu::BlendOperation::Add,
    },
};

/// One compiled program variant: a pipeline per target format it draws into
/// and the binding of each named texture input.
pub struct Program {
    pub kind: ProgramKind,
    layout: BindGroupLayout,
    pipelines: HashMap<TextureFormat, RenderPipeline>,
    bindings: HashMap<&'static str, u32>,
}

impl Program {
    /// Compiles `kind` specialized by `keywords` for every format in
    /// `formats`. Validation errors are logged and yield `None`.
    pub fn compile(
        device: &Device,
        kind: ProgramKind,
        keywords: &KeywordSet,
        formats: &[TextureFormat],
        blend: Option<wgpu::BlendState>,
        filterable: bool,
    ) -> Option<Self> {
        let bindings: HashMap<&'static str, u32> = kind
            .inputs()
            .iter()
            .enumerate()
            .map(|(i, name)| (*name, 1 + 2 * i as u32))
            .collect();

        let mut entries = vec![wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }];
        for i in 0..kind.inputs().len() as u32 {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: 1 + 2 * i,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            });
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: 2 + 2 * i,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(if filterable {
                    wgpu::SamplerBindingType::Filtering
                } else {
                    wgpu::SamplerBindingType::NonFiltering
                }),
                count: None,
            });
        }

        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let label = format!("{} Program", kind.name());
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&label),
            source: wgpu::ShaderSource::Wgsl(Cow::Owned(kind.source(keywords))),
        });
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(&label),
            entries: &entries,
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&label),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let mut pipelines = HashMap::new();
        for &format in formats {
            if pipelines.contains_key(&format) {
                continue;
            }
            let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(&label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &module,
                    entry_point: "vs_main",
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &wgpu::vertex_attr_array![0 => Float32x2],
                    }],
                },
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &module,
                    entry_point: "fs_main",
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                multiview: None,
            });
            pipelines.insert(format, pipeline);
        }

        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            log::error!(
                "failed to compile {} program {:?}: {error}",
                kind.name(),
                keywords
            );
            return None;
        }

        Some(Self {
            kind,
            layout,
            pipelines,
            bindings,
        })
    }

    pub fn pipeline(&self, format: TextureFormat) -> Option<&RenderPipeline> {
        self.pipelines.get(&format)
    }

    pub fn binding(&self, name: &str) -> Option<u32> {
        self.bindings.get(name).copied()
    }

    /// Binds `uniforms` and each named input with its sampler. Returns `None`
    /// if an input name is unknown to this program.
    pub fn bind(
        &self,
        device: &Device,
        uniforms: &Buffer,
        inputs: &[(&str, &RenderTarget, &Sampler)],
    ) -> Option<BindGroup> {
        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: uniforms.as_entire_binding(),
        }];
        for (name, target, sampler) in inputs {
            let binding = self.binding(name)?;
            entries.push(wgpu::BindGroupEntry {
                binding,
                resource: wgpu::BindingResource::TextureView(&target.view),
            });
            entries.push(wgpu::BindGroupEntry {
                binding: binding + 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            });
        }
        Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(self.kind.name()),
            layout: &self.layout,
            entries: &entries,
        }))
    }
}

/// Every solver program, compiled once. The display program lives in its own
/// keyword-keyed material.
pub struct Programs {
    pub copy: Option<Program>,
    pub clear: Option<Program>,
    pub splat: Option<Program>,
    pub advection: Option<Program>,
    pub divergence: Option<Program>,
    pub curl: Option<Program>,
    pub vorticity: Option<Program>,
    pub pressure: Option<Program>,
    pub gradient_subtract: Option<Program>,
}

impl Programs {
    pub fn compile(
        device: &Device,
        formats: &[TextureFormat],
        advection_keywords: &KeywordSet,
        filterable: bool,
    ) -> Self {
        let plain = KeywordSet::default();
        let build = |kind, keywords: &KeywordSet| {
            Program::compile(device, kind, keywords, formats, None, filterable)
        };
        Self {
            copy: build(ProgramKind::Copy, &plain),
            clear: build(ProgramKind::Clear, &plain),
            splat: build(ProgramKind::Splat, &plain),
            advection: build(ProgramKind::Advection, advection_keywords),
            divergence: build(ProgramKind::Divergence, &plain),
            curl: build(ProgramKind::Curl, &plain),
            vorticity: build(ProgramKind::Vorticity, &plain),
            pressure: build(ProgramKind::Pressure, &plain),
            gradient_subtract: build(ProgramKind::GradientSubtract, &plain),
        }
    }
}
