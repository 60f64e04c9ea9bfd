use std::sync::{
    Arc,
    Mutex,
};

use crate::render::device::GpuContext;


const TIMESTAMP_COUNT: u32 = 2;
const TIMESTAMP_BYTES: u64 = TIMESTAMP_COUNT as u64 * std::mem::size_of::<u64>() as u64;


type MapResult = Arc<Mutex<Option<Result<(), wgpu::BufferAsyncError>>>>;

enum TimerState {
    Idle,
    Submitted,
    Mapping(MapResult),
}


/// gpu duration of the splat render pass, measured with a begin/end timestamp
/// pair and read back a frame or more later.
///
/// only one measurement is in flight at a time; frames rendered while the
/// previous readback is pending are not timed.
pub struct SplatPassTimer {
    query_set: wgpu::QuerySet,
    resolve_buffer: wgpu::Buffer,
    readback_buffer: wgpu::Buffer,
    period_ns: f64,
    state: TimerState,
    latest_ns: Option<u64>,
}

impl SplatPassTimer {
    /// `None` when the device was created without timestamp queries
    pub fn new(gpu: &GpuContext) -> Option<Self> {
        if !gpu.device.features().contains(wgpu::Features::TIMESTAMP_QUERY) {
            return None;
        }

        let query_set = gpu.device.create_query_set(&wgpu::QuerySetDescriptor {
            label: Some("splat_pass_timestamps"),
            ty: wgpu::QueryType::Timestamp,
            count: TIMESTAMP_COUNT,
        });

        let resolve_buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("splat_pass_timestamp_resolve"),
            size: TIMESTAMP_BYTES,
            usage: wgpu::BufferUsages::QUERY_RESOLVE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        let readback_buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("splat_pass_timestamp_readback"),
            size: TIMESTAMP_BYTES,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Some(Self {
            query_set,
            resolve_buffer,
            readback_buffer,
            period_ns: gpu.queue.get_timestamp_period() as f64,
            state: TimerState::Idle,
            latest_ns: None,
        })
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, TimerState::Idle)
    }

    /// timestamp writes for the splat pass, `None` while a readback is pending
    pub fn pass_writes(&self) -> Option<wgpu::RenderPassTimestampWrites<'_>> {
        self.is_idle().then_some(wgpu::RenderPassTimestampWrites {
            query_set: &self.query_set,
            beginning_of_pass_write_index: Some(0),
            end_of_pass_write_index: Some(1),
        })
    }

    /// records the query resolve after a pass that used [`Self::pass_writes`]
    pub fn resolve(&mut self, encoder: &mut wgpu::CommandEncoder) {
        if !self.is_idle() {
            return;
        }

        encoder.resolve_query_set(&self.query_set, 0..TIMESTAMP_COUNT, &self.resolve_buffer, 0);
        encoder.copy_buffer_to_buffer(&self.resolve_buffer, 0, &self.readback_buffer, 0, TIMESTAMP_BYTES);

        self.state = TimerState::Submitted;
    }

    /// advances the readback without blocking; call after the resolving
    /// submission. returns the most recent measurement.
    pub fn poll(&mut self, gpu: &GpuContext) -> Option<u64> {
        self.state = match std::mem::replace(&mut self.state, TimerState::Idle) {
            TimerState::Idle => TimerState::Idle,
            TimerState::Submitted => {
                let result: MapResult = Arc::default();
                let sender = result.clone();

                self.readback_buffer
                    .slice(..)
                    .map_async(wgpu::MapMode::Read, move |mapped| {
                        if let Ok(mut slot) = sender.lock() {
                            *slot = Some(mapped);
                        }
                    });

                TimerState::Mapping(result)
            },
            TimerState::Mapping(result) => {
                let _ = gpu.device.poll(wgpu::Maintain::Poll);

                let mapped = result.lock().ok().and_then(|mut slot| slot.take());
                match mapped {
                    Some(Ok(())) => {
                        self.latest_ns = Some(self.read_duration());
                        self.readback_buffer.unmap();
                        TimerState::Idle
                    },
                    Some(Err(_)) => TimerState::Idle,
                    None => TimerState::Mapping(result),
                }
            },
        };

        self.latest_ns
    }

    pub fn latest_ns(&self) -> Option<u64> {
        self.latest_ns
    }

    fn read_duration(&self) -> u64 {
        let mapped = self.readback_buffer.slice(..).get_mapped_range();
        let timestamps: &[u64] = bytemuck::cast_slice(&mapped);

        match timestamps {
            [start, end, ..] => (end.saturating_sub(*start) as f64 * self.period_ns).round() as u64,
            _ => 0,
        }
    }
}
