use std::{
    collections::HashMap,
    sync::atomic::{
        AtomicU64,
        Ordering,
    },
};

use bevy::log::{
    debug,
    error,
    info,
};

use crate::{
    error::{
        SplatError,
        SplatResult,
    },
    gaussian::settings::SplatSettings,
    render::{
        device::GpuContext,
        pipeline::{
            SplatPipelines,
            SplatViewport,
        },
        shader::{
            CompilationDiagnostic,
            SplatShaderSources,
        },
    },
    sort::{
        grown_capacity,
        SortBuffers,
    },
};


#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
)]
pub struct SplatNodeId(u64);

impl SplatNodeId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}


#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Eq,
    Hash,
    PartialEq,
)]
pub enum InitState {
    #[default]
    Uninitialized,
    Initializing,
    Ready,
    Failed,
}


/// proof that the holder owns the single in-flight initialization attempt
#[derive(Debug)]
#[must_use]
pub struct InitTicket {
    _private: (),
}


#[derive(Debug)]
pub enum InitOutcome {
    Ready {
        diagnostics: Vec<CompilationDiagnostic>,
    },
    AlreadyReady,
    AlreadyInProgress,
}


/// key/value buffers for every live node, grown on demand
#[derive(Debug, Default)]
pub struct SortBufferPool {
    buffers: HashMap<SplatNodeId, SortBuffers>,
    next_generation: u64,
}

impl SortBufferPool {
    /// buffers for `node` holding at least `required` entries.
    ///
    /// the first allocation uses `initial_capacity`; later ones grow
    /// geometrically, bounded by the device's storage binding limit.
    pub fn ensure(
        &mut self,
        device: &wgpu::Device,
        node: SplatNodeId,
        required: u32,
        initial_capacity: u32,
    ) -> SplatResult<&SortBuffers> {
        let current = self.buffers.get(&node).map(SortBuffers::capacity);

        if current.is_none_or(|capacity| capacity < required) {
            let max_entries = device.limits().max_storage_buffer_binding_size / std::mem::size_of::<u32>() as u32;
            if required > max_entries {
                return Err(SplatError::SortCapacity {
                    count: required,
                    capacity: max_entries,
                });
            }

            let capacity = match current {
                Some(current) => grown_capacity(current, required),
                None => required.max(initial_capacity),
            }
            .min(max_entries);

            let generation = self.next_generation;
            self.next_generation += 1;

            debug!(
                ?node,
                capacity,
                required,
                generation,
                "allocating sort buffers",
            );

            self.buffers.insert(node, SortBuffers::new(device, capacity, generation)?);
        }

        self.buffers.get(&node).ok_or(SplatError::SortCapacity {
            count: required,
            capacity: 0,
        })
    }

    pub fn get(&self, node: SplatNodeId) -> Option<&SortBuffers> {
        self.buffers.get(&node)
    }

    pub fn release(&mut self, node: SplatNodeId) -> bool {
        self.buffers.remove(&node).is_some()
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}


/// shared state every splat node renders through.
///
/// initialization is explicit: nothing here initializes lazily, and a
/// `Failed` context stays failed until the host calls
/// [`SplatContext::initialize`] again.
pub struct SplatContext {
    state: InitState,
    settings: SplatSettings,
    pipelines: Option<SplatPipelines>,
    sort_buffers: SortBufferPool,
    last_error: Option<String>,
}

impl SplatContext {
    pub fn new(settings: SplatSettings) -> Self {
        Self {
            state: InitState::Uninitialized,
            settings,
            pipelines: None,
            sort_buffers: SortBufferPool::default(),
            last_error: None,
        }
    }

    pub fn state(&self) -> InitState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == InitState::Ready
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn settings(&self) -> &SplatSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: SplatSettings) {
        self.settings = settings;
    }

    pub fn pipelines(&self) -> Option<&SplatPipelines> {
        self.pipelines.as_ref()
    }

    pub fn sort_buffers(&self) -> &SortBufferPool {
        &self.sort_buffers
    }

    /// frees the sort buffers owned by a node that will not render again
    pub fn release(&mut self, node: SplatNodeId) -> bool {
        self.sort_buffers.release(node)
    }

    pub(crate) fn frame_parts(&mut self) -> Option<(&SplatSettings, &mut SplatPipelines, &mut SortBufferPool)> {
        let pipelines = self.pipelines.as_mut()?;
        Some((&self.settings, pipelines, &mut self.sort_buffers))
    }

    /// claims the initialization attempt; `None` while another attempt is in
    /// flight or once the context is ready
    pub fn begin_initialize(&mut self) -> Option<InitTicket> {
        match self.state {
            InitState::Uninitialized | InitState::Failed => {
                self.state = InitState::Initializing;
                Some(InitTicket { _private: () })
            },
            InitState::Initializing | InitState::Ready => None,
        }
    }

    pub fn complete_initialize(
        &mut self,
        _ticket: InitTicket,
        result: SplatResult<(SplatPipelines, Vec<CompilationDiagnostic>)>,
    ) -> SplatResult<Vec<CompilationDiagnostic>> {
        match result {
            Ok((pipelines, diagnostics)) => {
                self.pipelines = Some(pipelines);
                self.state = InitState::Ready;
                self.last_error = None;

                info!(warnings = diagnostics.len(), "splat pipeline ready");
                Ok(diagnostics)
            },
            Err(err) => {
                self.pipelines = None;
                self.state = InitState::Failed;
                self.last_error = Some(err.to_string());

                error!("splat pipeline initialization failed: {err}");
                Err(err)
            },
        }
    }

    pub async fn initialize(
        &mut self,
        gpu: &GpuContext,
        viewport: SplatViewport,
        sources: &SplatShaderSources,
    ) -> SplatResult<InitOutcome> {
        let Some(ticket) = self.begin_initialize() else {
            return Ok(match self.state {
                InitState::Ready => InitOutcome::AlreadyReady,
                _ => InitOutcome::AlreadyInProgress,
            });
        };

        let result = SplatPipelines::new(gpu, viewport, sources).await;
        let diagnostics = self.complete_initialize(ticket, result)?;

        Ok(InitOutcome::Ready { diagnostics })
    }

    pub fn initialize_blocking(
        &mut self,
        gpu: &GpuContext,
        viewport: SplatViewport,
        sources: &SplatShaderSources,
    ) -> SplatResult<InitOutcome> {
        pollster::block_on(self.initialize(gpu, viewport, sources))
    }
}

impl Default for SplatContext {
    fn default() -> Self {
        Self::new(SplatSettings::default())
    }
}
