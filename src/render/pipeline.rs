use bevy::{
    log::debug,
    math::{
        Mat4,
        UVec2,
    },
};
use bytemuck::{
    Pod,
    Zeroable,
};
use static_assertions::const_assert_eq;

use crate::{
    error::{
        SplatError,
        SplatResult,
    },
    render::{
        compose::Compositor,
        device::GpuContext,
        shader::{
            compile_shader,
            CompilationDiagnostic,
            SplatShaderSources,
        },
        target::{
            AttachmentDescriptor,
            RenderTarget,
            RenderTargetConfig,
        },
    },
    sort::radix::RadixSortPipeline,
};


pub const SPLAT_COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Bgra8Unorm;
pub const SPLAT_DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
pub const UNIFORM_BUFFER_SIZE: u64 = 512;
pub const DEPTH_KEY_WORKGROUP_SIZE: u32 = 256;


/// uniform block shared by the splat program and the depth-key program
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Pod,
    Zeroable,
)]
#[repr(C)]
pub struct SplatUniforms {
    pub world_view: [f32; 16],
    pub world: [f32; 16],
    pub view: [f32; 16],
    pub proj: [f32; 16],
    pub screen_width: f32,
    pub screen_height: f32,
    pub size: f32,
    pub elements_rendered: u32,
    /// -1 when nothing is hovered or the index is not representable
    pub hovered_index: i32,
    pub num_splats: u32,
    pub depth_order: u32,
    pub _pad: u32,
    pub _padding: [u32; 56],
}
const_assert_eq!(std::mem::size_of::<SplatUniforms>() as u64, UNIFORM_BUFFER_SIZE);

impl SplatUniforms {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        world: Mat4,
        view: Mat4,
        proj: Mat4,
        viewport: UVec2,
        size: f32,
        elements_rendered: u32,
        hovered: Option<u32>,
        num_splats: u32,
        depth_order: u32,
    ) -> Self {
        Self {
            world_view: (view * world).to_cols_array(),
            world: world.to_cols_array(),
            view: view.to_cols_array(),
            proj: proj.to_cols_array(),
            screen_width: viewport.x as f32,
            screen_height: viewport.y as f32,
            size,
            elements_rendered,
            hovered_index: hovered
                .and_then(|index| i32::try_from(index).ok())
                .unwrap_or(-1),
            num_splats,
            depth_order,
            _pad: 0,
            _padding: [0; 56],
        }
    }
}


/// viewport the off-screen target tracks and the format of the screen it is
/// composited onto
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SplatViewport {
    pub size: UVec2,
    pub screen_format: wgpu::TextureFormat,
}


/// every gpu object shared between splat nodes
pub struct SplatPipelines {
    pub uniform_buffer: wgpu::Buffer,
    pub target: RenderTarget,
    pub layout: wgpu::BindGroupLayout,
    pub render_pipeline: wgpu::RenderPipeline,
    pub depth_key_pipeline: wgpu::ComputePipeline,
    pub depth_key_layout: wgpu::BindGroupLayout,
    pub radix: RadixSortPipeline,
    pub compositor: Compositor,
}

impl SplatPipelines {
    pub async fn new(
        gpu: &GpuContext,
        viewport: SplatViewport,
        sources: &SplatShaderSources,
    ) -> SplatResult<(Self, Vec<CompilationDiagnostic>)> {
        let device = &gpu.device;
        let mut diagnostics = Vec::new();

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("splat_uniform_buffer"),
            size: UNIFORM_BUFFER_SIZE,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let attachment_usage = wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC;

        let target = RenderTarget::new(
            device,
            "splat_blending",
            RenderTargetConfig {
                size: viewport.size,
                color: vec![AttachmentDescriptor {
                    format: SPLAT_COLOR_FORMAT,
                    usage: attachment_usage,
                }],
                depth: Some(AttachmentDescriptor {
                    format: SPLAT_DEPTH_FORMAT,
                    usage: attachment_usage,
                }),
            },
        )?;

        let storage_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::VERTEX,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: true },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("gaussian_splats_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(UNIFORM_BUFFER_SIZE),
                    },
                    count: None,
                },
                storage_entry(1),
                storage_entry(2),
                storage_entry(3),
                storage_entry(4),
                storage_entry(5),
            ],
        });

        let splat_source = sources.splat.load("gaussian_splats")?;
        let splat_shader = compile_shader(device, "gaussian_splats", &splat_source).await?;
        diagnostics.extend(splat_shader.diagnostics);

        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("gaussian_splats_pipeline_layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let render_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("gaussian_splats_pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &splat_shader.module,
                entry_point: Some("main_vertex"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &splat_shader.module,
                entry_point: Some("main_fragment"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: SPLAT_COLOR_FORMAT,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: SPLAT_DEPTH_FORMAT,
                depth_write_enabled: false,
                depth_compare: wgpu::CompareFunction::Always,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        if let Some(err) = device.pop_error_scope().await {
            return Err(SplatError::Validation {
                stage: "gaussian splat pipeline creation",
                message: err.to_string(),
            });
        }

        let depth_key_source = sources.depth_key.load("depth_key")?;
        let depth_key_shader = compile_shader(device, "depth_key", &depth_key_source).await?;
        diagnostics.extend(depth_key_shader.diagnostics);

        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let depth_key_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("depth_key_pipeline"),
            layout: None,
            module: &depth_key_shader.module,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });
        let depth_key_layout = depth_key_pipeline.get_bind_group_layout(0);

        if let Some(err) = device.pop_error_scope().await {
            return Err(SplatError::Validation {
                stage: "depth key pipeline creation",
                message: err.to_string(),
            });
        }

        let radix = RadixSortPipeline::new(device).await?;
        let compositor = Compositor::new(device, viewport.screen_format).await?;

        debug!(
            width = viewport.size.x,
            height = viewport.size.y,
            warnings = diagnostics.len(),
            "created splat pipelines",
        );

        Ok((
            Self {
                uniform_buffer,
                target,
                layout,
                render_pipeline,
                depth_key_pipeline,
                depth_key_layout,
                radix,
                compositor,
            },
            diagnostics,
        ))
    }
}
