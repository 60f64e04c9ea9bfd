use bevy::prelude::*;

pub use camera::SplatCamera;
pub use error::{
    SplatError,
    SplatResult,
};
pub use gaussian::{
    data::{
        Splat,
        SplatData,
    },
    rand::{
        random_splats,
        random_splats_seeded,
    },
    settings::SplatSettings,
};
pub use render::{
    context::{
        InitOutcome,
        InitState,
        SplatContext,
    },
    device::GpuContext,
    node::{
        FrameReport,
        GaussianSplats,
        SkipReason,
        SplatFrame,
    },
    SplatRenderer,
};
pub use sort::{
    SortMode,
    SortOrder,
};

use render::SplatRenderPlugin;

pub mod camera;
pub mod error;
pub mod gaussian;
pub mod render;
pub mod sort;
pub mod utils;


pub struct ProgressiveSplattingPlugin;

impl Plugin for ProgressiveSplattingPlugin {
    fn build(&self, app: &mut App) {
        app.register_type::<SortMode>();
        app.register_type::<SortOrder>();

        app.add_plugins((
            SplatRenderPlugin,
        ));
    }
}
