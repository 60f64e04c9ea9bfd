use std::time::Duration;

use bevy::{
    app::{
        AppExit,
        ScheduleRunnerPlugin,
    },
    log::LogPlugin,
    prelude::*,
};
use bevy_args::parse_args;

use bevy_progressive_splatting::{
    GaussianSplats,
    GpuContext,
    ProgressiveSplattingPlugin,
    SplatCamera,
    SplatData,
    SplatRenderer,
    random_splats_seeded,
    render::SplatRenderSet,
    utils::SplatViewerConfig,
};


/// host-side dataset revealed a chunk per frame, standing in for streaming io
#[derive(Resource)]
struct SplatStream {
    source: SplatData,
    cursor: usize,
}


fn setup_splat_stream(
    mut commands: Commands,
    config: Res<SplatViewerConfig>,
) {
    let source = if config.seed == 0 {
        bevy_progressive_splatting::random_splats(config.splat_count)
    } else {
        random_splats_seeded(config.splat_count, config.seed)
    };

    info!(
        splats = config.splat_count,
        chunk = config.stream_chunk,
        "streaming random splats",
    );

    commands.insert_resource(SplatStream {
        source,
        cursor: 0,
    });

    commands.spawn((
        GaussianSplats::empty(),
        Name::new("gaussian_splats"),
    ));
}

fn stream_splats(
    config: Res<SplatViewerConfig>,
    mut stream: ResMut<SplatStream>,
    mut nodes: Query<&mut GaussianSplats>,
) {
    let total = stream.source.total();
    if stream.cursor >= total {
        return;
    }

    let end = (stream.cursor + config.stream_chunk.max(1)).min(total);

    for mut node in nodes.iter_mut() {
        let data = node.data_mut(total);
        let chunk = (stream.cursor..end).filter_map(|idx| stream.source.get(idx));

        if let Err(err) = data.extend(chunk) {
            error!("failed to append streamed splats: {err}");
        }
    }

    stream.cursor = end;
}

fn orbit_camera(
    config: Res<SplatViewerConfig>,
    renderer: Res<SplatRenderer>,
    mut camera: ResMut<SplatCamera>,
) {
    let angle = renderer.frame as f32 * config.orbit_speed;
    let aspect = config.width as f32 / config.height.max(1) as f32;

    *camera = SplatCamera::orbit(
        Vec3::ZERO,
        config.orbit_radius,
        angle,
        config.orbit_radius * 0.25,
        aspect,
    );
}

fn report_frames(
    renderer: Res<SplatRenderer>,
    nodes: Query<(&Name, &GaussianSplats)>,
) {
    if renderer.frame % 30 != 0 {
        return;
    }

    for (name, node) in nodes.iter() {
        let report = node.last_report();
        info!(
            frame = renderer.frame,
            node = %name,
            resident = report.resident,
            budget = report.budget,
            drawn = report.drawn_splats,
            draw_calls = report.draw_calls,
            sorted = report.sorted,
            "splat frame report",
        );
    }
}

fn exit_after_frames(
    config: Res<SplatViewerConfig>,
    renderer: Res<SplatRenderer>,
    mut exit: EventWriter<AppExit>,
) {
    if config.frames > 0 && renderer.frame >= config.frames as u64 {
        info!(frames = renderer.frame, "viewer finished");
        exit.write(AppExit::Success);
    }
}


fn viewer_app() -> AppExit {
    let config = parse_args::<SplatViewerConfig>();

    let settings = match config.splat_settings() {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("{err}");
            return AppExit::error();
        },
    };

    let renderer = GpuContext::new_blocking()
        .and_then(|gpu| SplatRenderer::new(
            gpu,
            UVec2::new(config.width, config.height),
            settings.clone(),
        ));

    let renderer = match renderer {
        Ok(renderer) => renderer,
        Err(err) => {
            eprintln!("failed to create splat renderer: {err}");
            return AppExit::error();
        },
    };

    let mut app = App::new();

    app.add_plugins((
        MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(Duration::from_secs_f64(1.0 / 60.0))),
        LogPlugin::default(),
    ));

    app.insert_resource(settings);
    app.insert_resource(renderer);
    app.insert_resource(SplatCamera::default());
    app.insert_resource(config);

    app.add_plugins(ProgressiveSplattingPlugin);

    app.add_systems(Startup, setup_splat_stream);
    app.add_systems(
        Update,
        (
            (
                stream_splats,
                orbit_camera,
            ).before(SplatRenderSet::Render),
            (
                report_frames,
                exit_after_frames,
            ).after(SplatRenderSet::Render),
        ),
    );

    app.run()
}


pub fn main() -> AppExit {
    viewer_app()
}
