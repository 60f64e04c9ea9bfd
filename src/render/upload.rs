use std::ops::Range;

use bevy::log::{
    debug,
    warn,
};

use crate::{
    error::{
        SplatError,
        SplatResult,
    },
    gaussian::data::SplatData,
    render::device::GpuContext,
};


#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    Hash,
    PartialEq,
)]
pub enum SplatAttribute {
    Position,
    Color,
    Rotation,
    Scale,
}

impl SplatAttribute {
    pub const ALL: [Self; 4] = [
        Self::Position,
        Self::Color,
        Self::Rotation,
        Self::Scale,
    ];

    pub fn components(self) -> u64 {
        match self {
            Self::Position | Self::Scale => 3,
            Self::Color | Self::Rotation => 4,
        }
    }

    /// bytes per splat
    pub fn stride(self) -> u64 {
        self.components() * std::mem::size_of::<f32>() as u64
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Position => "position",
            Self::Color => "color",
            Self::Rotation => "rotation",
            Self::Scale => "scale",
        }
    }

    fn host_bytes(self, data: &SplatData) -> &[u8] {
        match self {
            Self::Position => bytemuck::cast_slice(data.positions()),
            Self::Color => bytemuck::cast_slice(data.colors()),
            Self::Rotation => bytemuck::cast_slice(data.rotations()),
            Self::Scale => bytemuck::cast_slice(data.scales()),
        }
    }

    fn host_len(self, data: &SplatData) -> usize {
        match self {
            Self::Position => data.positions().len(),
            Self::Color => data.colors().len(),
            Self::Rotation => data.rotations().len(),
            Self::Scale => data.scales().len(),
        }
    }
}


/// a contiguous run of splats written in one set of queue writes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UploadBatch {
    pub start: u32,
    pub count: u32,
}

impl UploadBatch {
    pub fn end(&self) -> u32 {
        self.start + self.count
    }

    pub fn byte_range(&self, attribute: SplatAttribute) -> Range<u64> {
        let stride = attribute.stride();
        self.start as u64 * stride..self.end() as u64 * stride
    }
}


/// splat count as addressed by gpu buffers, sort kernels and draw calls
pub fn gpu_splat_count(count: usize) -> SplatResult<u32> {
    u32::try_from(count).map_err(|_| SplatError::DatasetOverflow {
        loaded: count,
        total: u32::MAX as usize,
    })
}


/// batches covering `uploaded..loaded`, each at most `batch_size` splats
pub fn upload_batches(
    uploaded: u32,
    loaded: u32,
    batch_size: u32,
) -> impl Iterator<Item = UploadBatch> {
    let batch_size = batch_size.max(1);

    (uploaded..loaded)
        .step_by(batch_size as usize)
        .map(move |start| UploadBatch {
            start,
            count: batch_size.min(loaded - start),
        })
}


/// one storage buffer per attribute, sized for the dataset's declared total
#[derive(Debug)]
pub struct GpuSplatBuffers {
    pub position: wgpu::Buffer,
    pub color: wgpu::Buffer,
    pub rotation: wgpu::Buffer,
    pub scale: wgpu::Buffer,
    capacity: u32,
}

impl GpuSplatBuffers {
    pub fn new(
        device: &wgpu::Device,
        capacity: u32,
    ) -> SplatResult<Self> {
        let capacity = capacity.max(1);
        let limits = device.limits();
        let max_size = limits.max_buffer_size.min(limits.max_storage_buffer_binding_size as u64);

        let create = |attribute: SplatAttribute| -> SplatResult<wgpu::Buffer> {
            let size = capacity as u64 * attribute.stride();
            if size > max_size {
                return Err(SplatError::UploadOutOfBounds {
                    attribute: attribute.name(),
                    start: 0,
                    end: size,
                    size: max_size,
                });
            }

            Ok(device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(&format!("planar_f32_{}_buffer", attribute.name())),
                size,
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_DST
                    | wgpu::BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            }))
        };

        Ok(Self {
            position: create(SplatAttribute::Position)?,
            color: create(SplatAttribute::Color)?,
            rotation: create(SplatAttribute::Rotation)?,
            scale: create(SplatAttribute::Scale)?,
            capacity,
        })
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn buffer(&self, attribute: SplatAttribute) -> &wgpu::Buffer {
        match attribute {
            SplatAttribute::Position => &self.position,
            SplatAttribute::Color => &self.color,
            SplatAttribute::Rotation => &self.rotation,
            SplatAttribute::Scale => &self.scale,
        }
    }
}


#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UploadOutcome {
    pub splats: u32,
    pub batches: u32,
    pub reallocated: bool,
}

impl UploadOutcome {
    pub fn uploaded_any(&self) -> bool {
        self.splats > 0
    }
}


/// gpu residency of one node's splats.
///
/// `uploaded` is the watermark of splats already written to the gpu; it never
/// exceeds the host's loaded count.
#[derive(Debug, Default)]
pub struct SplatUploader {
    buffers: Option<GpuSplatBuffers>,
    uploaded: u32,
}

impl SplatUploader {
    pub fn uploaded(&self) -> u32 {
        self.uploaded
    }

    pub fn buffers(&self) -> Option<&GpuSplatBuffers> {
        self.buffers.as_ref()
    }

    /// forgets what was uploaded, keeping the buffers; the next upload starts
    /// again from the first splat
    pub fn rewind(&mut self) {
        self.uploaded = 0;
    }

    /// transfers every loaded but not yet uploaded splat.
    ///
    /// buffers are created on the first call with data, sized for the declared
    /// total. a total larger than the current buffers reallocates them and
    /// restarts the upload from the first splat.
    pub fn upload(
        &mut self,
        gpu: &GpuContext,
        data: &SplatData,
        batch_size: u32,
    ) -> SplatResult<UploadOutcome> {
        let total = data.total();
        let loaded = data.loaded();
        if loaded > total {
            return Err(SplatError::DatasetOverflow {
                loaded,
                total,
            });
        }

        if total == 0 {
            return Ok(UploadOutcome::default());
        }

        let total = gpu_splat_count(total)?;
        let loaded = gpu_splat_count(loaded)?;
        let mut outcome = UploadOutcome::default();

        if loaded < self.uploaded {
            warn!(
                uploaded = self.uploaded,
                loaded,
                "host splats fell below the upload watermark, re-uploading",
            );
            self.uploaded = 0;
        }

        let needs_allocation = self.buffers
            .as_ref()
            .is_none_or(|buffers| buffers.capacity() < total);

        if needs_allocation {
            if let Some(previous) = &self.buffers {
                warn!(
                    previous = previous.capacity(),
                    total,
                    "declared splat total grew past gpu capacity, re-uploading",
                );
                outcome.reallocated = true;
            }

            self.buffers = Some(GpuSplatBuffers::new(&gpu.device, total)?);
            self.uploaded = 0;
        }

        let Some(buffers) = self.buffers.as_ref() else {
            return Ok(outcome);
        };

        if loaded <= self.uploaded {
            return Ok(outcome);
        }

        for attribute in SplatAttribute::ALL {
            let available = attribute.host_len(data);
            if available < loaded as usize {
                return Err(SplatError::HostDataTruncated {
                    attribute: attribute.name(),
                    available,
                    required: loaded as usize,
                });
            }
        }

        for batch in upload_batches(self.uploaded, loaded, batch_size) {
            for attribute in SplatAttribute::ALL {
                let buffer = buffers.buffer(attribute);
                let range = batch.byte_range(attribute);

                if range.end > buffer.size() {
                    return Err(SplatError::UploadOutOfBounds {
                        attribute: attribute.name(),
                        start: range.start,
                        end: range.end,
                        size: buffer.size(),
                    });
                }

                let bytes = &attribute.host_bytes(data)[range.start as usize..range.end as usize];
                gpu.queue.write_buffer(buffer, range.start, bytes);
            }

            outcome.batches += 1;
        }

        outcome.splats = loaded - self.uploaded;
        self.uploaded = loaded;

        debug!(
            splats = outcome.splats,
            batches = outcome.batches,
            uploaded = self.uploaded,
            total,
            "uploaded splats",
        );

        Ok(outcome)
    }
}
