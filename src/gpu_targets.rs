//! GPU render targets and format probing.

use crate::caps::{Channels, Format, FormatSupport, Precision};
use crate::target::{Filter, GridSize, Texels};
use wgpu::{Adapter, Device, Queue, Texture, TextureFormat, TextureView};

pub const TARGET_USAGE: wgpu::TextureUsages = wgpu::TextureUsages::RENDER_ATTACHMENT
    .union(wgpu::TextureUsages::TEXTURE_BINDING)
    .union(wgpu::TextureUsages::COPY_SRC)
    .union(wgpu::TextureUsages::COPY_DST);

pub fn texture_format(format: Format) -> TextureFormat {
    match (format.channels, format.precision) {
        (Channels::One, Precision::Half) => TextureFormat::R16Float,
        (Channels::Two, Precision::Half) => TextureFormat::Rg16Float,
        (Channels::Four, Precision::Half) => TextureFormat::Rgba16Float,
        (Channels::One, Precision::Full) => TextureFormat::R32Float,
        (Channels::Two, Precision::Full) => TextureFormat::Rg32Float,
        (Channels::Four, Precision::Full) => TextureFormat::Rgba32Float,
    }
}

/// Feature flags first, then a 4x4 target must clear without a validation
/// error on the actual device.
pub fn probe_format(adapter: &Adapter, device: &Device, queue: &Queue, format: Format) -> FormatSupport {
    let texture_format = texture_format(format);
    let features = if device
        .features()
        .contains(wgpu::Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES)
    {
        adapter.get_texture_format_features(texture_format)
    } else {
        texture_format.guaranteed_format_features(device.features())
    };

    let needed = wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING;
    if !features.allowed_usages.contains(needed) {
        return FormatSupport {
            renderable: false,
            filterable: false,
        };
    }

    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let probe = RenderTarget::allocate(
        device,
        queue,
        GridSize::new(4, 4),
        texture_format,
        Filter::Nearest,
        "Format Probe",
    );
    let error = pollster::block_on(device.pop_error_scope());
    probe.release();

    if let Some(error) = error {
        log::debug!("{texture_format:?} failed the render probe: {error}");
        return FormatSupport {
            renderable: false,
            filterable: false,
        };
    }

    FormatSupport {
        renderable: true,
        filterable: features
            .flags
            .contains(wgpu::TextureFormatFeatureFlags::FILTERABLE),
    }
}

pub struct RenderTarget {
    pub texture: Texture,
    pub view: TextureView,
    pub size: GridSize,
    pub format: TextureFormat,
    pub filter: Filter,
}

impl Texels for RenderTarget {
    fn size(&self) -> GridSize {
        self.size
    }
}

impl RenderTarget {
    /// Creates a target and clears it to zero.
    pub fn allocate(
        device: &Device,
        queue: &Queue,
        size: GridSize,
        format: TextureFormat,
        filter: Filter,
        label: &str,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size.width,
                height: size.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: TARGET_USAGE,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let target = Self {
            texture,
            view,
            size,
            format,
            filter,
        };
        target.clear(device, queue, wgpu::Color::TRANSPARENT);
        target
    }

    pub fn clear(&self, device: &Device, queue: &Queue, color: wgpu::Color) {
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Clear Target Encoder"),
        });
        {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Clear Target Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }
        queue.submit(std::iter::once(encoder.finish()));
    }

    /// Frees the texture memory now instead of when the last reference drops.
    pub fn release(self) {
        self.texture.destroy();
    }
}
