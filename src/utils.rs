use bevy::prelude::*;
use bevy_args::{
    Deserialize,
    Parser,
    Serialize,
};

use crate::{
    error::{
        SplatError,
        SplatResult,
    },
    gaussian::settings::SplatSettings,
    sort::{
        SortMode,
        SortOrder,
    },
};


#[derive(
    Debug,
    Clone,
    Resource,
    Serialize,
    Deserialize,
    Parser,
)]
#[command(about = "progressive gaussian splat viewer", version, long_about = None)]
pub struct SplatViewerConfig {
    #[arg(long, default_value = "1280")]
    pub width: u32,

    #[arg(long, default_value = "720")]
    pub height: u32,

    /// declared size of the streamed dataset
    #[arg(long, default_value = "200000")]
    pub splat_count: usize,

    /// splats that arrive from the stream per frame
    #[arg(long, default_value = "25000")]
    pub stream_chunk: usize,

    /// exit after this many frames, 0 runs forever
    #[arg(long, default_value = "240")]
    pub frames: u32,

    #[arg(long, default_value = "0")]
    pub seed: u64,

    #[arg(long, default_value = "12.0")]
    pub orbit_radius: f32,

    /// radians per frame
    #[arg(long, default_value = "0.01")]
    pub orbit_speed: f32,

    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub progressive: bool,

    #[arg(long, value_enum, default_value_t = SortMode::default())]
    pub sort_mode: SortMode,

    #[arg(long, value_enum, default_value_t = SortOrder::default())]
    pub sort_order: SortOrder,

    /// json file overriding the splat settings
    #[arg(long, default_value = "")]
    pub settings_file: String,
}

impl Default for SplatViewerConfig {
    fn default() -> SplatViewerConfig {
        SplatViewerConfig {
            width: 1280,
            height: 720,
            splat_count: 200_000,
            stream_chunk: 25_000,
            frames: 240,
            seed: 0,
            orbit_radius: 12.0,
            orbit_speed: 0.01,
            progressive: true,
            sort_mode: SortMode::default(),
            sort_order: SortOrder::default(),
            settings_file: "".to_string(),
        }
    }
}

impl SplatViewerConfig {
    /// settings from `settings_file` (or defaults) with the cli overrides applied
    pub fn splat_settings(&self) -> Result<SplatSettings, String> {
        let mut settings = if self.settings_file.is_empty() {
            SplatSettings::default()
        } else {
            let contents = std::fs::read_to_string(&self.settings_file)
                .map_err(|err| format!("failed to read {}: {err}", self.settings_file))?;

            serde_json::from_str(&contents)
                .map_err(|err| format!("failed to parse {}: {err}", self.settings_file))?
        };

        settings.progressive = self.progressive;
        settings.sort_mode = self.sort_mode;
        settings.sort_order = self.sort_order;

        Ok(settings)
    }
}


/// 2d dispatch grid covering `groups` workgroups without exceeding the
/// per-dimension limit
pub fn workgroup_grid(groups: u32) -> [u32; 2] {
    if groups == 0 {
        return [0, 0];
    }

    let side = ceil_sqrt(groups);
    [side, groups.div_ceil(side)]
}

/// square grid of `ceil(sqrt(count / workgroup_size))` per side
pub fn square_grid(count: u32, workgroup_size: u32) -> u32 {
    ceil_sqrt(count.div_ceil(workgroup_size))
}

fn ceil_sqrt(n: u32) -> u32 {
    let mut root = (n as f64).sqrt() as u32;
    while (root as u64) * (root as u64) < n as u64 {
        root += 1;
    }
    while root > 0 && ((root - 1) as u64) * ((root - 1) as u64) >= n as u64 {
        root -= 1;
    }
    root
}


/// runs `f` inside a validation error scope, turning a captured error into
/// [`SplatError::Validation`]
pub fn capture_validation<T>(
    device: &wgpu::Device,
    stage: &'static str,
    f: impl FnOnce() -> T,
) -> SplatResult<T> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = f();

    match pollster::block_on(device.pop_error_scope()) {
        Some(err) => Err(SplatError::Validation {
            stage,
            message: err.to_string(),
        }),
        None => Ok(value),
    }
}
