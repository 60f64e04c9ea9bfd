use bevy::prelude::*;
use bytemuck::{
    Pod,
    Zeroable,
};
use serde::{
    Deserialize,
    Serialize,
};

use crate::error::{
    SplatError,
    SplatResult,
};


pub mod radix;

#[cfg(feature = "sort_rayon")]
pub mod rayon;


#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    Hash,
    PartialEq,
    Reflect,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
pub enum SortMode {
    /// draw in identity order, never sort
    None,
    Radix,

    #[cfg(feature = "sort_rayon")]
    Rayon,
}

impl Default for SortMode {
    fn default() -> Self {
        Self::Radix
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
    Reflect,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
pub enum SortOrder {
    #[default]
    BackToFront,
    FrontToBack,
}

impl SortOrder {
    pub fn as_uniform(self) -> u32 {
        match self {
            Self::BackToFront => 0,
            Self::FrontToBack => 1,
        }
    }
}


#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Reflect,
    Pod,
    Zeroable,
)]
#[repr(C)]
pub struct SortEntry {
    pub key: u32,
    pub index: u32,
}


/// maps a view-space depth to a `u32` whose unsigned order matches the
/// float order of `view_z`.
///
/// the camera looks down -Z, so the most distant splat has the most negative
/// `view_z` and therefore the smallest key: sorting ascending yields
/// back-to-front order. `FrontToBack` inverts the key.
pub fn depth_key(view_z: f32, order: SortOrder) -> u32 {
    let bits = view_z.to_bits();
    let key = if bits & 0x8000_0000 != 0 {
        !bits
    } else {
        bits | 0x8000_0000
    };

    match order {
        SortOrder::BackToFront => key,
        SortOrder::FrontToBack => !key,
    }
}


/// decides on which frames a node re-sorts its splats.
///
/// the first frame after construction or after [`SortScheduler::invalidate`]
/// always sorts, afterwards every `sort_every_n`-th frame does.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortScheduler {
    frame_index: u64,
    sort_every_n: u32,
    sorted_once: bool,
    ever_sorted: bool,
}

impl SortScheduler {
    pub fn new(sort_every_n: u32) -> Self {
        Self {
            frame_index: 0,
            sort_every_n: sort_every_n.max(1),
            sorted_once: false,
            ever_sorted: false,
        }
    }

    /// advances the frame counter unless a sort is already pending.
    pub fn should_sort(&mut self) -> bool {
        if !self.sorted_once {
            return true;
        }

        self.frame_index += 1;
        self.frame_index % self.sort_every_n as u64 == 0
    }

    pub fn mark_sorted(&mut self) {
        self.sorted_once = true;
        self.ever_sorted = true;
    }

    /// new splats were uploaded, the current ordering no longer covers them
    pub fn invalidate(&mut self) {
        self.sorted_once = false;
    }

    /// the sort buffers were reallocated, any previous ordering is gone
    pub fn reset(&mut self) {
        self.sorted_once = false;
        self.ever_sorted = false;
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn sort_every_n(&self) -> u32 {
        self.sort_every_n
    }

    pub fn set_sort_every_n(&mut self, sort_every_n: u32) {
        self.sort_every_n = sort_every_n.max(1);
    }

    pub fn has_sorted_once(&self) -> bool {
        self.sorted_once
    }

    pub fn ever_sorted(&self) -> bool {
        self.ever_sorted
    }
}

impl Default for SortScheduler {
    fn default() -> Self {
        Self::new(crate::gaussian::settings::DEFAULT_SORT_EVERY_N_FRAMES)
    }
}


/// per-node key/value buffers consumed by the depth-key stage and the sort.
///
/// both buffers hold `capacity` u32 entries. they only ever grow; growth
/// replaces the buffers and bumps `generation` so dependents (bind groups,
/// radix kernels) know to rebuild.
#[derive(Debug)]
pub struct SortBuffers {
    pub keys: wgpu::Buffer,
    pub values: wgpu::Buffer,
    capacity: u32,
    generation: u64,
}

impl SortBuffers {
    pub fn new(
        device: &wgpu::Device,
        capacity: u32,
        generation: u64,
    ) -> SplatResult<Self> {
        let capacity = capacity.max(1);
        let size = capacity as u64 * std::mem::size_of::<u32>() as u64;

        let max_size = device.limits().max_storage_buffer_binding_size as u64;
        if size > max_size {
            return Err(SplatError::SortCapacity {
                count: capacity,
                capacity: (max_size / std::mem::size_of::<u32>() as u64) as u32,
            });
        }

        let usage = wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::COPY_DST
            | wgpu::BufferUsages::COPY_SRC;

        let keys = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("splat_sort_keys"),
            size,
            usage,
            mapped_at_creation: false,
        });

        let values = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("splat_sort_values"),
            size,
            usage,
            mapped_at_creation: false,
        });

        Ok(Self {
            keys,
            values,
            capacity,
            generation,
        })
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn fits(&self, count: u32) -> bool {
        count <= self.capacity
    }
}


/// capacity to allocate when `required` entries no longer fit `current`
pub fn grown_capacity(current: u32, required: u32) -> u32 {
    required.max(current.saturating_mul(2))
}
