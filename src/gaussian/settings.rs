use bevy::prelude::*;
use serde::{
    Deserialize,
    Serialize,
};

use crate::sort::{
    SortMode,
    SortOrder,
};


pub const DEFAULT_BUDGET_INITIAL: u32 = 10_000;
pub const DEFAULT_BUDGET_INCREMENT: u32 = 5_000;
pub const DEFAULT_BUDGET_MAX: u32 = 500_000;
pub const DEFAULT_SORT_EVERY_N_FRAMES: u32 = 4;
pub const DEFAULT_MAX_VERTICES_PER_DRAW: u32 = 120_000;
pub const DEFAULT_UPLOAD_BATCH_SIZE: u32 = 10_000;
pub const DEFAULT_SORT_CAPACITY: u32 = 1 << 20;


/// typed configuration shared by every splat node rendered through one
/// [`crate::render::context::SplatContext`].
#[derive(
    Resource,
    Reflect,
    Clone,
    Debug,
    PartialEq,
    Serialize,
    Deserialize,
)]
#[reflect(Resource)]
#[serde(default)]
pub struct SplatSettings {
    /// ramp the number of drawn splats over frames instead of drawing all
    /// resident splats immediately
    pub progressive: bool,
    pub budget_initial: u32,
    pub budget_increment: u32,
    pub budget_max: u32,

    pub sort_mode: SortMode,
    pub sort_order: SortOrder,
    pub sort_every_n_frames: u32,
    /// key bits consumed by the radix sort, multiple of 8
    pub sort_bit_count: u32,
    /// entries allocated for each node's key/value buffers before any growth
    pub initial_sort_capacity: u32,

    /// 0 issues a single draw
    pub max_vertices_per_draw: u32,
    pub upload_batch_size: u32,

    /// screen-space footprint in pixels for splats with a degenerate covariance
    pub point_size: f32,

    /// time the splat pass with gpu timestamp queries when the device supports them
    pub gpu_timestamps: bool,
}

impl Default for SplatSettings {
    fn default() -> Self {
        Self {
            progressive: true,
            budget_initial: DEFAULT_BUDGET_INITIAL,
            budget_increment: DEFAULT_BUDGET_INCREMENT,
            budget_max: DEFAULT_BUDGET_MAX,
            sort_mode: SortMode::default(),
            sort_order: SortOrder::default(),
            sort_every_n_frames: DEFAULT_SORT_EVERY_N_FRAMES,
            sort_bit_count: 32,
            initial_sort_capacity: DEFAULT_SORT_CAPACITY,
            max_vertices_per_draw: DEFAULT_MAX_VERTICES_PER_DRAW,
            upload_batch_size: DEFAULT_UPLOAD_BATCH_SIZE,
            point_size: 10.0,
            gpu_timestamps: false,
        }
    }
}
