use bytemuck::{
    Pod,
    Zeroable,
};

use crate::{
    error::{
        SplatError,
        SplatResult,
    },
    render::{
        device::GpuContext,
        shader::{
            compile_shader,
            COMPOSE_SHADER,
        },
        target::RenderTarget,
    },
};


#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Pod,
    Zeroable,
)]
#[repr(C)]
struct ComposeUniforms {
    source_size: [f32; 2],
    _pad: [f32; 2],
}


/// blends the off-screen splat color attachment over a screen target
pub struct Compositor {
    format: wgpu::TextureFormat,
    layout: wgpu::BindGroupLayout,
    pipeline: wgpu::RenderPipeline,
    sampler: wgpu::Sampler,
    uniform_buffer: wgpu::Buffer,
    bind_group: Option<(u64, wgpu::BindGroup)>,
}

impl Compositor {
    pub async fn new(
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
    ) -> SplatResult<Self> {
        let shader = compile_shader(device, "compose", COMPOSE_SHADER).await?;

        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("compose_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<ComposeUniforms>() as u64),
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("compose_pipeline_layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("compose_pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader.module,
                entry_point: Some("main_vertex"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader.module,
                entry_point: Some("main_fragment"),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("compose_sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("compose_uniform_buffer"),
            size: std::mem::size_of::<ComposeUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        if let Some(err) = device.pop_error_scope().await {
            return Err(SplatError::Validation {
                stage: "compose pipeline creation",
                message: err.to_string(),
            });
        }

        Ok(Self {
            format,
            layout,
            pipeline,
            sampler,
            uniform_buffer,
            bind_group: None,
        })
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    /// alpha-over of `source`'s first color attachment onto `screen`, keeping
    /// what the screen already holds
    pub fn compose(
        &mut self,
        gpu: &GpuContext,
        source: &RenderTarget,
        screen: &wgpu::TextureView,
    ) -> SplatResult<()> {
        let color = source.color(0).ok_or_else(|| {
            SplatError::InvalidTarget(format!("{} has no color attachment", source.label()))
        })?;

        let stale = self.bind_group
            .as_ref()
            .is_none_or(|(version, _)| *version != source.version());

        if stale {
            let size = source.size();
            gpu.queue.write_buffer(
                &self.uniform_buffer,
                0,
                bytemuck::bytes_of(&ComposeUniforms {
                    source_size: [size.x as f32, size.y as f32],
                    _pad: [0.0; 2],
                }),
            );

            let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("compose_bind_group"),
                layout: &self.layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: self.uniform_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&color.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::Sampler(&self.sampler),
                    },
                ],
            });

            self.bind_group = Some((source.version(), bind_group));
        }

        let Some((_, bind_group)) = self.bind_group.as_ref() else {
            return Ok(());
        };

        let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("compose_encoder"),
        });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("compose_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: screen,
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

            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, bind_group, &[]);
            pass.draw(0..3, 0..1);
        }

        gpu.queue.submit(Some(encoder.finish()));

        Ok(())
    }
}
