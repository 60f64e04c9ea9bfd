use std::{
    future::Future,
    pin::Pin,
    sync::Mutex,
    task::{
        Context,
        Poll,
        Waker,
    },
};

use bevy::{
    log::{
        debug,
        error,
    },
    math::{
        Mat4,
        UVec2,
    },
    prelude::Component,
};

use crate::{
    camera::SplatCamera,
    error::{
        SplatError,
        SplatResult,
    },
    gaussian::{
        data::SplatData,
        settings::SplatSettings,
    },
    render::{
        context::{
            SortBufferPool,
            SplatContext,
            SplatNodeId,
        },
        device::GpuContext,
        draw::draw_chunks,
        pipeline::{
            SplatPipelines,
            SplatUniforms,
            DEPTH_KEY_WORKGROUP_SIZE,
        },
        progressive::ProgressiveBudget,
        timer::SplatPassTimer,
        upload::{
            GpuSplatBuffers,
            SplatUploader,
        },
    },
    sort::{
        radix::{
            RadixSortDescriptor,
            RadixSortKernel,
        },
        SortBuffers,
        SortMode,
        SortScheduler,
    },
    utils::square_grid,
};


/// per-frame inputs shared by every node
pub struct SplatFrame<'a> {
    pub camera: &'a SplatCamera,
    pub viewport: UVec2,
    pub screen: &'a wgpu::TextureView,
    pub screen_format: wgpu::TextureFormat,
    /// splats already drawn this frame by earlier nodes
    pub elements_rendered: u32,
}


#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    Hash,
    PartialEq,
)]
pub enum SkipReason {
    NotInitialized,
    NoSplats,
    NoData,
    /// work was submitted but nothing drawn, no ordering exists yet
    NoOrdering,
}


#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameReport {
    pub skipped: Option<SkipReason>,
    pub uploaded: u32,
    pub resident: u32,
    pub seeded: bool,
    pub sorted: bool,
    pub budget: u32,
    pub drawn_splats: u32,
    pub draw_calls: u32,
    /// validation errors raised by this node's gpu work. scopes resolve
    /// asynchronously, so an error may be reported a frame or more after the
    /// frame that caused it.
    pub validation_error: Option<String>,
    /// gpu time of the most recently measured splat pass, see
    /// [`SplatSettings::gpu_timestamps`]
    pub splat_pass_ns: Option<u64>,
}

impl FrameReport {
    fn skip(reason: SkipReason) -> Self {
        Self {
            skipped: Some(reason),
            ..Default::default()
        }
    }

    pub fn drawn_vertices(&self) -> u32 {
        self.drawn_splats * crate::render::draw::VERTICES_PER_SPLAT
    }
}


type ScopeFuture = Pin<Box<dyn Future<Output = Option<wgpu::Error>> + Send>>;


struct RadixState {
    generation: u64,
    kernel: RadixSortKernel,
}


/// a splat dataset rendered progressively through a [`SplatContext`].
///
/// owns its gpu attribute buffers, upload watermark, draw budget and sort
/// schedule; the key/value buffers live in the context under this node's id.
#[derive(Component)]
pub struct GaussianSplats {
    id: SplatNodeId,
    data: Option<SplatData>,
    pub world: Mat4,
    hovered: Option<u32>,
    uploader: SplatUploader,
    budget: ProgressiveBudget,
    scheduler: SortScheduler,
    radix: Option<RadixState>,
    sort_generation: Option<u64>,
    seeded: u32,
    pending_scopes: Vec<Mutex<ScopeFuture>>,
    timer: Option<SplatPassTimer>,
    last_report: FrameReport,
}

impl GaussianSplats {
    pub fn new(data: SplatData) -> Self {
        Self {
            data: Some(data),
            ..Self::empty()
        }
    }

    /// a node whose data has not arrived yet
    pub fn empty() -> Self {
        Self {
            id: SplatNodeId::next(),
            data: None,
            world: Mat4::IDENTITY,
            hovered: None,
            uploader: SplatUploader::default(),
            budget: ProgressiveBudget::default(),
            scheduler: SortScheduler::default(),
            radix: None,
            sort_generation: None,
            seeded: 0,
            pending_scopes: Vec::new(),
            timer: None,
            last_report: FrameReport::default(),
        }
    }

    pub fn with_world(mut self, world: Mat4) -> Self {
        self.world = world;
        self
    }

    pub fn id(&self) -> SplatNodeId {
        self.id
    }

    pub fn data(&self) -> Option<&SplatData> {
        self.data.as_ref()
    }

    /// mutable host data for streaming appends, created on first access
    pub fn data_mut(&mut self, total: usize) -> &mut SplatData {
        self.data.get_or_insert_with(|| SplatData::with_total(total))
    }

    /// replaces the host dataset. everything resident on the gpu is treated
    /// as stale and re-uploaded, use [`Self::data_mut`] to stream appends.
    pub fn set_data(&mut self, data: SplatData) {
        self.data = Some(data);

        self.uploader.rewind();
        self.seeded = 0;
        self.scheduler.reset();
        self.budget.reset();
    }

    pub fn hovered(&self) -> Option<u32> {
        self.hovered
    }

    pub fn set_hovered(&mut self, hovered: Option<u32>) {
        self.hovered = hovered;
    }

    pub fn uploaded(&self) -> u32 {
        self.uploader.uploaded()
    }

    pub fn gpu_buffers(&self) -> Option<&GpuSplatBuffers> {
        self.uploader.buffers()
    }

    pub fn budget(&self) -> &ProgressiveBudget {
        &self.budget
    }

    pub fn scheduler(&self) -> &SortScheduler {
        &self.scheduler
    }

    pub fn last_report(&self) -> &FrameReport {
        &self.last_report
    }

    /// uploads, sorts, draws and composites this node for one frame.
    ///
    /// validation errors raised by the frame's gpu work, compositing included,
    /// are captured in a report, other failures (upload, allocation) abort the
    /// frame.
    pub fn render(
        &mut self,
        context: &mut SplatContext,
        gpu: &GpuContext,
        frame: &SplatFrame,
    ) -> SplatResult<FrameReport> {
        let report = self.render_inner(context, gpu, frame)?;
        self.last_report = report.clone();
        Ok(report)
    }

    fn render_inner(
        &mut self,
        context: &mut SplatContext,
        gpu: &GpuContext,
        frame: &SplatFrame,
    ) -> SplatResult<FrameReport> {
        let Some((settings, pipelines, sort_buffers)) = context.frame_parts() else {
            return Ok(FrameReport::skip(SkipReason::NotInitialized));
        };

        if pipelines.compositor.format() != frame.screen_format {
            return Err(SplatError::InvalidTarget(format!(
                "screen format {:?} differs from compositor format {:?}",
                frame.screen_format,
                pipelines.compositor.format(),
            )));
        }

        pipelines.target.resize(&gpu.device, frame.viewport)?;

        let Some(data) = self.data.as_ref() else {
            return Ok(FrameReport::skip(SkipReason::NoData));
        };

        if data.total() == 0 {
            return Ok(FrameReport::skip(SkipReason::NoSplats));
        }

        self.sync_settings(settings);

        gpu.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let encoded = self
            .encode_frame(settings, pipelines, sort_buffers, gpu, frame)
            .and_then(|report| {
                if report.skipped.is_none() {
                    pipelines.compositor.compose(gpu, &pipelines.target, frame.screen)?;
                }
                Ok(report)
            });
        let scope: ScopeFuture = Box::pin(gpu.device.pop_error_scope());
        self.pending_scopes.push(Mutex::new(scope));

        let mut report = encoded?;
        report.validation_error = self.drain_validation();

        Ok(report)
    }

    /// collects the errors of every resolved validation scope without waiting
    /// on the ones still pending
    fn drain_validation(&mut self) -> Option<String> {
        let mut context = Context::from_waker(Waker::noop());
        let mut messages = Vec::new();

        self.pending_scopes.retain_mut(|scope| {
            let Ok(scope) = scope.get_mut() else {
                return false;
            };

            match scope.as_mut().poll(&mut context) {
                Poll::Ready(Some(err)) => {
                    messages.push(err.to_string());
                    false
                },
                Poll::Ready(None) => false,
                Poll::Pending => true,
            }
        });

        for message in &messages {
            error!(node = ?self.id, "gpu validation error in splat frame: {message}");
        }

        (!messages.is_empty()).then(|| messages.join("\n"))
    }

    fn sync_settings(&mut self, settings: &SplatSettings) {
        let configured = ProgressiveBudget::from_settings(settings);
        if !self.budget.same_config(&configured) {
            self.budget = configured;
        }

        self.scheduler.set_sort_every_n(settings.sort_every_n_frames);
    }

    fn encode_frame(
        &mut self,
        settings: &SplatSettings,
        pipelines: &SplatPipelines,
        sort_buffers: &mut SortBufferPool,
        gpu: &GpuContext,
        frame: &SplatFrame,
    ) -> SplatResult<FrameReport> {
        if !settings.gpu_timestamps {
            self.timer = None;
        } else if self.timer.is_none() {
            self.timer = SplatPassTimer::new(gpu);
        }
        let splat_pass_ns = self.timer.as_mut().and_then(|timer| timer.poll(gpu));

        let Some(data) = self.data.as_ref() else {
            return Ok(FrameReport::skip(SkipReason::NoData));
        };

        let upload = self.uploader.upload(gpu, data, settings.upload_batch_size)?;
        if upload.uploaded_any() {
            self.budget.reset();
            self.scheduler.invalidate();
        }

        let resident = self.uploader.uploaded();
        let Some(splat_buffers) = self.uploader.buffers() else {
            return Ok(FrameReport::skip(SkipReason::NoData));
        };

        if resident == 0 {
            return Ok(FrameReport::skip(SkipReason::NoData));
        }

        let mut report = FrameReport {
            uploaded: upload.splats,
            resident,
            splat_pass_ns,
            ..Default::default()
        };

        let sort = sort_buffers.ensure(
            &gpu.device,
            self.id,
            resident,
            settings.initial_sort_capacity,
        )?;

        if self.sort_generation != Some(sort.generation()) {
            self.sort_generation = Some(sort.generation());
            self.radix = None;
            self.seeded = 0;
            self.scheduler.reset();
        }

        gpu.queue.write_buffer(
            &pipelines.uniform_buffer,
            0,
            bytemuck::bytes_of(&SplatUniforms::new(
                self.world,
                frame.camera.view,
                frame.camera.proj,
                frame.viewport,
                settings.point_size,
                frame.elements_rendered,
                self.hovered,
                resident,
                settings.sort_order.as_uniform(),
            )),
        );

        if !self.scheduler.ever_sorted() && self.seeded < resident {
            let identity: Vec<u32> = (self.seeded..resident).collect();
            gpu.queue.write_buffer(
                &sort.values,
                self.seeded as u64 * std::mem::size_of::<u32>() as u64,
                bytemuck::cast_slice(&identity),
            );

            debug!(node = ?self.id, from = self.seeded, to = resident, "seeded identity ordering");
            self.seeded = resident;
            report.seeded = true;
        }

        let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("gaussian_splats_encoder"),
        });

        match settings.sort_mode {
            SortMode::None => {},
            SortMode::Radix => {
                if self.scheduler.should_sort() {
                    let kernel = radix_kernel(&mut self.radix, gpu, pipelines, sort, resident, settings.sort_bit_count)?;
                    let depth_bind_group = depth_key_bind_group(gpu, pipelines, splat_buffers, sort);

                    let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                        label: Some("splat_sort_pass"),
                        timestamp_writes: None,
                    });

                    let groups = square_grid(resident, DEPTH_KEY_WORKGROUP_SIZE);
                    pass.set_pipeline(&pipelines.depth_key_pipeline);
                    pass.set_bind_group(0, &depth_bind_group, &[]);
                    pass.dispatch_workgroups(groups, groups, 1);

                    kernel.dispatch(&mut pass);
                    drop(pass);

                    self.scheduler.mark_sorted();
                    report.sorted = true;
                }
            },
            #[cfg(feature = "sort_rayon")]
            SortMode::Rayon => {
                if self.scheduler.should_sort() {
                    let positions = data.positions();
                    let Some(resident_positions) = positions.get(..resident as usize) else {
                        return Err(SplatError::HostDataTruncated {
                            attribute: "position",
                            available: positions.len(),
                            required: resident as usize,
                        });
                    };

                    let order = crate::sort::rayon::rayon_sort(
                        resident_positions,
                        frame.camera.view * self.world,
                        settings.sort_order,
                    );
                    gpu.queue.write_buffer(&sort.values, 0, bytemuck::cast_slice(&order));

                    self.scheduler.mark_sorted();
                    report.sorted = true;
                }
            },
        }

        let ordering_available = self.scheduler.ever_sorted() || self.seeded >= resident;
        if !ordering_available {
            gpu.queue.submit(Some(encoder.finish()));
            report.skipped = Some(SkipReason::NoOrdering);
            return Ok(report);
        }

        let visible = self.budget.visible(resident);
        report.budget = self.budget.budget();

        let bind_group = splat_bind_group(gpu, pipelines, splat_buffers, sort);
        let timed = self.timer.as_ref().is_some_and(SplatPassTimer::is_idle);

        {
            let Some(color) = pipelines.target.color(0) else {
                return Err(SplatError::InvalidTarget("splat target has no color attachment".into()));
            };

            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("gaussian_splats_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &color.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: pipelines.target.depth().map(|depth| {
                    wgpu::RenderPassDepthStencilAttachment {
                        view: &depth.view,
                        depth_ops: Some(wgpu::Operations {
                            load: wgpu::LoadOp::Clear(1.0),
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops: None,
                    }
                }),
                timestamp_writes: self.timer.as_ref().and_then(SplatPassTimer::pass_writes),
                occlusion_query_set: None,
            });

            pass.set_pipeline(&pipelines.render_pipeline);
            pass.set_bind_group(0, &bind_group, &[]);

            for vertices in draw_chunks(visible, settings.max_vertices_per_draw) {
                pass.draw(vertices, 0..1);
                report.draw_calls += 1;
            }
        }

        if let Some(timer) = self.timer.as_mut().filter(|_| timed) {
            timer.resolve(&mut encoder);
        }

        report.drawn_splats = visible;
        self.budget.advance();

        gpu.queue.submit(Some(encoder.finish()));

        debug!(
            node = ?self.id,
            resident,
            drawn = visible,
            draw_calls = report.draw_calls,
            sorted = report.sorted,
            "rendered splats",
        );

        Ok(report)
    }
}

impl Default for GaussianSplats {
    fn default() -> Self {
        Self::empty()
    }
}


fn radix_kernel<'a>(
    radix: &'a mut Option<RadixState>,
    gpu: &GpuContext,
    pipelines: &SplatPipelines,
    sort: &SortBuffers,
    count: u32,
    bit_count: u32,
) -> SplatResult<&'a RadixSortKernel> {
    let stale = radix
        .as_ref()
        .is_none_or(|state| state.generation != sort.generation() || state.kernel.bit_count() != bit_count);

    if stale {
        let kernel = RadixSortKernel::new(
            &gpu.device,
            &pipelines.radix,
            RadixSortDescriptor {
                keys: &sort.keys,
                values: &sort.values,
                count,
                bit_count,
            },
        )?;

        *radix = Some(RadixState {
            generation: sort.generation(),
            kernel,
        });
    }

    let Some(state) = radix.as_mut() else {
        return Err(SplatError::NotInitialized);
    };
    state.kernel.set_count(&gpu.queue, count)?;

    Ok(&state.kernel)
}

fn depth_key_bind_group(
    gpu: &GpuContext,
    pipelines: &SplatPipelines,
    splat_buffers: &GpuSplatBuffers,
    sort: &SortBuffers,
) -> wgpu::BindGroup {
    gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("depth_key_bind_group"),
        layout: &pipelines.depth_key_layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: pipelines.uniform_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: splat_buffers.position.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: sort.keys.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: sort.values.as_entire_binding(),
            },
        ],
    })
}

fn splat_bind_group(
    gpu: &GpuContext,
    pipelines: &SplatPipelines,
    splat_buffers: &GpuSplatBuffers,
    sort: &SortBuffers,
) -> wgpu::BindGroup {
    gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("gaussian_splats_bind_group"),
        layout: &pipelines.layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: pipelines.uniform_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: sort.values.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: splat_buffers.position.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: splat_buffers.color.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 4,
                resource: splat_buffers.rotation.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 5,
                resource: splat_buffers.scale.as_entire_binding(),
            },
        ],
    })
}
