use bevy::{
    log::debug,
    math::UVec2,
};

use crate::{
    error::{
        SplatError,
        SplatResult,
    },
    utils::capture_validation,
};


pub const DEFAULT_TARGET_SIZE: UVec2 = UVec2::new(128, 128);

const DEFAULT_USAGE: wgpu::TextureUsages = wgpu::TextureUsages::TEXTURE_BINDING
    .union(wgpu::TextureUsages::COPY_SRC)
    .union(wgpu::TextureUsages::COPY_DST)
    .union(wgpu::TextureUsages::RENDER_ATTACHMENT);


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttachmentDescriptor {
    pub format: wgpu::TextureFormat,
    pub usage: wgpu::TextureUsages,
}

impl AttachmentDescriptor {
    pub const fn color() -> Self {
        Self {
            format: wgpu::TextureFormat::R32Uint,
            usage: DEFAULT_USAGE,
        }
    }

    pub const fn depth() -> Self {
        Self {
            format: wgpu::TextureFormat::Depth32Float,
            usage: DEFAULT_USAGE,
        }
    }
}


#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderTargetConfig {
    pub size: UVec2,
    pub color: Vec<AttachmentDescriptor>,
    pub depth: Option<AttachmentDescriptor>,
}

impl Default for RenderTargetConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_TARGET_SIZE,
            color: vec![AttachmentDescriptor::color()],
            depth: Some(AttachmentDescriptor::depth()),
        }
    }
}


#[derive(Debug)]
pub struct Attachment {
    pub descriptor: AttachmentDescriptor,
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

impl Attachment {
    fn new(
        device: &wgpu::Device,
        label: &str,
        size: UVec2,
        descriptor: AttachmentDescriptor,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size.x,
                height: size.y,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: descriptor.format,
            usage: descriptor.usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            descriptor,
            texture,
            view,
        }
    }
}


/// color and depth attachments that always share one size.
///
/// `version` increases by one on every resize that actually recreated the
/// textures; views handed out before that are stale.
#[derive(Debug)]
pub struct RenderTarget {
    label: String,
    size: UVec2,
    version: u64,
    color: Vec<Attachment>,
    depth: Option<Attachment>,
}

impl RenderTarget {
    pub fn new(
        device: &wgpu::Device,
        label: impl Into<String>,
        config: RenderTargetConfig,
    ) -> SplatResult<Self> {
        let label = label.into();

        for descriptor in &config.color {
            if descriptor.format.is_depth_stencil_format() {
                return Err(SplatError::InvalidTarget(format!(
                    "{label}: color attachment uses depth format {:?}",
                    descriptor.format,
                )));
            }
        }

        if let Some(depth) = &config.depth {
            if !depth.format.is_depth_stencil_format() {
                return Err(SplatError::InvalidTarget(format!(
                    "{label}: depth attachment uses color format {:?}",
                    depth.format,
                )));
            }
        }

        Self::validate_size(device, &label, config.size)?;

        let (color, depth) = Self::allocate(
            device,
            &label,
            config.size,
            config.color.iter().copied(),
            config.depth,
        )?;

        Ok(Self {
            label,
            size: config.size,
            version: 0,
            color,
            depth,
        })
    }

    /// returns whether the attachments were recreated
    pub fn resize(
        &mut self,
        device: &wgpu::Device,
        size: UVec2,
    ) -> SplatResult<bool> {
        if size == self.size {
            return Ok(false);
        }

        Self::validate_size(device, &self.label, size)?;

        let (color, depth) = Self::allocate(
            device,
            &self.label,
            size,
            self.color.iter().map(|attachment| attachment.descriptor),
            self.depth.as_ref().map(|attachment| attachment.descriptor),
        )?;

        // dropping the old attachments releases their textures once in-flight work retires
        self.color = color;
        self.depth = depth;
        self.size = size;
        self.version += 1;

        debug!(
            target_label = %self.label,
            width = size.x,
            height = size.y,
            version = self.version,
            "resized render target",
        );

        Ok(true)
    }

    fn validate_size(
        device: &wgpu::Device,
        label: &str,
        size: UVec2,
    ) -> SplatResult<()> {
        let max = device.limits().max_texture_dimension_2d;

        if size.x == 0 || size.y == 0 || size.x > max || size.y > max {
            return Err(SplatError::InvalidTarget(format!(
                "{label}: size {}x{} outside 1..={max}",
                size.x,
                size.y,
            )));
        }

        Ok(())
    }

    fn allocate(
        device: &wgpu::Device,
        label: &str,
        size: UVec2,
        color: impl Iterator<Item = AttachmentDescriptor>,
        depth: Option<AttachmentDescriptor>,
    ) -> SplatResult<(Vec<Attachment>, Option<Attachment>)> {
        capture_validation(device, "render target creation", || {
            let color = color
                .enumerate()
                .map(|(idx, descriptor)| {
                    Attachment::new(device, &format!("{label}_color_{idx}"), size, descriptor)
                })
                .collect::<Vec<_>>();

            let depth = depth.map(|descriptor| {
                Attachment::new(device, &format!("{label}_depth"), size, descriptor)
            });

            (color, depth)
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn size(&self) -> UVec2 {
        self.size
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn color_attachments(&self) -> &[Attachment] {
        &self.color
    }

    pub fn color(&self, index: usize) -> Option<&Attachment> {
        self.color.get(index)
    }

    pub fn depth(&self) -> Option<&Attachment> {
        self.depth.as_ref()
    }
}
