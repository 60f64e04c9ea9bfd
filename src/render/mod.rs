use std::collections::HashMap;

use bevy::{
    log::{
        debug,
        error,
        warn,
    },
    prelude::*,
};

use crate::{
    camera::SplatCamera,
    error::SplatResult,
    gaussian::settings::SplatSettings,
    render::{
        context::{
            InitState,
            SplatContext,
            SplatNodeId,
        },
        device::GpuContext,
        node::{
            GaussianSplats,
            SplatFrame,
        },
        pipeline::SplatViewport,
        shader::SplatShaderSources,
        target::{
            AttachmentDescriptor,
            RenderTarget,
            RenderTargetConfig,
        },
    },
};


pub mod compose;
pub mod context;
pub mod device;
pub mod draw;
pub mod node;
pub mod pipeline;
pub mod progressive;
pub mod shader;
pub mod target;
pub mod timer;
pub mod upload;


pub const SCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;


/// gpu, splat context and the screen target splats are composited onto
#[derive(Resource)]
pub struct SplatRenderer {
    pub gpu: GpuContext,
    pub context: SplatContext,
    pub screen: RenderTarget,
    pub shaders: SplatShaderSources,
    pub clear_color: wgpu::Color,
    pub frame: u64,
}

impl SplatRenderer {
    pub fn new(
        gpu: GpuContext,
        size: UVec2,
        settings: SplatSettings,
    ) -> SplatResult<Self> {
        let screen = RenderTarget::new(
            &gpu.device,
            "splat_screen",
            RenderTargetConfig {
                size,
                color: vec![AttachmentDescriptor {
                    format: SCREEN_FORMAT,
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                        | wgpu::TextureUsages::TEXTURE_BINDING
                        | wgpu::TextureUsages::COPY_SRC,
                }],
                depth: None,
            },
        )?;

        Ok(Self {
            gpu,
            context: SplatContext::new(settings),
            screen,
            shaders: SplatShaderSources::default(),
            clear_color: wgpu::Color::BLACK,
            frame: 0,
        })
    }

    pub fn viewport(&self) -> SplatViewport {
        SplatViewport {
            size: self.screen.size(),
            screen_format: SCREEN_FORMAT,
        }
    }

    pub fn resize(&mut self, size: UVec2) -> SplatResult<bool> {
        self.screen.resize(&self.gpu.device, size)
    }

    /// clears the screen target, the first step of every frame
    pub fn clear_screen(&self) {
        let Some(color) = self.screen.color(0) else {
            return;
        };

        let mut encoder = self.gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("splat_screen_clear_encoder"),
        });

        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("splat_screen_clear_pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &color.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(self.clear_color),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        self.gpu.queue.submit(Some(encoder.finish()));
    }
}


#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum SplatRenderSet {
    Initialize,
    Render,
    Cleanup,
}


/// entity -> node id of every node that has rendered, for releasing sort
/// buffers after despawn
#[derive(Resource, Default)]
pub struct SplatNodeIndex(pub HashMap<Entity, SplatNodeId>);


#[derive(Default)]
pub struct SplatRenderPlugin;

impl Plugin for SplatRenderPlugin {
    fn build(&self, app: &mut App) {
        app.register_type::<SplatSettings>();
        app.init_resource::<SplatSettings>();
        app.init_resource::<SplatNodeIndex>();

        app.configure_sets(
            Update,
            (
                SplatRenderSet::Initialize,
                SplatRenderSet::Render,
                SplatRenderSet::Cleanup,
            ).chain(),
        );

        app.add_systems(
            Update,
            (
                (
                    sync_settings,
                    initialize_context,
                ).chain().in_set(SplatRenderSet::Initialize),
                render_splats.in_set(SplatRenderSet::Render),
                release_despawned.in_set(SplatRenderSet::Cleanup),
            )
            .run_if(resource_exists::<SplatRenderer>),
        );
    }
}


fn sync_settings(
    settings: Res<SplatSettings>,
    mut renderer: ResMut<SplatRenderer>,
) {
    if settings.is_changed() {
        renderer.context.set_settings(settings.clone());
    }
}

fn initialize_context(
    mut renderer: ResMut<SplatRenderer>,
) {
    if renderer.context.state() != InitState::Uninitialized {
        return;
    }

    let renderer = renderer.as_mut();
    let viewport = renderer.viewport();

    // failures are logged by the context and leave it `Failed`; no retry here
    if let Err(err) = renderer.context.initialize_blocking(&renderer.gpu, viewport, &renderer.shaders) {
        warn!("splat rendering disabled: {err}");
    }
}

fn render_splats(
    mut renderer: ResMut<SplatRenderer>,
    camera: Option<Res<SplatCamera>>,
    mut index: ResMut<SplatNodeIndex>,
    mut nodes: Query<(Entity, &mut GaussianSplats)>,
) {
    let renderer = renderer.as_mut();
    renderer.frame += 1;
    renderer.clear_screen();

    if !renderer.context.is_ready() {
        return;
    }

    let default_camera = SplatCamera::default();
    let camera = camera.as_deref().unwrap_or(&default_camera);

    let Some(screen) = renderer.screen.color(0) else {
        return;
    };

    let mut elements_rendered = 0;

    let mut ordered = nodes.iter_mut().collect::<Vec<_>>();
    ordered.sort_by_key(|(entity, _)| *entity);

    for (entity, mut node) in ordered {
        index.0.insert(entity, node.id());

        let frame = SplatFrame {
            camera,
            viewport: renderer.screen.size(),
            screen: &screen.view,
            screen_format: SCREEN_FORMAT,
            elements_rendered,
        };

        match node.render(&mut renderer.context, &renderer.gpu, &frame) {
            Ok(report) => {
                elements_rendered += report.drawn_splats;
                debug!(
                    frame = renderer.frame,
                    ?entity,
                    uploaded = report.uploaded,
                    resident = report.resident,
                    drawn = report.drawn_splats,
                    sorted = report.sorted,
                    skipped = ?report.skipped,
                    splat_pass_ns = ?report.splat_pass_ns,
                    "splat frame",
                );
            },
            Err(err) => {
                error!(?entity, "splat frame aborted: {err}");
            },
        }
    }
}

fn release_despawned(
    mut removed: RemovedComponents<GaussianSplats>,
    mut index: ResMut<SplatNodeIndex>,
    mut renderer: ResMut<SplatRenderer>,
) {
    for entity in removed.read() {
        if let Some(node) = index.0.remove(&entity) {
            renderer.context.release(node);
            debug!(?entity, ?node, "released splat sort buffers");
        }
    }
}
