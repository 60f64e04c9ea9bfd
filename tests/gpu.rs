use bevy::math::{
    Mat4,
    UVec2,
    Vec3,
};
use rand::{
    Rng,
    SeedableRng,
    rngs::StdRng,
};

use bevy_progressive_splatting::{
    GaussianSplats,
    InitState,
    SkipReason,
    SortMode,
    SortOrder,
    SplatCamera,
    SplatData,
    SplatError,
    SplatFrame,
    SplatRenderer,
    SplatSettings,
    random_splats_seeded,
    render::{
        SCREEN_FORMAT,
        shader::ShaderSource,
        target::{
            RenderTarget,
            RenderTargetConfig,
        },
    },
    sort::radix::{
        RadixSortDescriptor,
        RadixSortKernel,
        RadixSortPipeline,
    },
};

use _harness::{
    read_buffer_u32,
    read_texture_rgba8,
    test_gpu,
    write_buffer_u32,
};

mod _harness;


const SCREEN_SIZE: UVec2 = UVec2::new(128, 128);

// gpu and host view transforms may round differently
const DEPTH_EPSILON: f32 = 1e-4;


fn test_renderer(settings: SplatSettings) -> Option<SplatRenderer> {
    let gpu = test_gpu()?;
    let mut renderer = SplatRenderer::new(gpu, SCREEN_SIZE, settings).unwrap();

    let viewport = renderer.viewport();
    renderer.context
        .initialize_blocking(&renderer.gpu, viewport, &renderer.shaders)
        .unwrap();
    assert_eq!(renderer.context.state(), InitState::Ready);

    Some(renderer)
}

fn render_frame(
    renderer: &mut SplatRenderer,
    node: &mut GaussianSplats,
) -> bevy_progressive_splatting::FrameReport {
    let camera = SplatCamera::default();
    let screen = renderer.screen.color(0).unwrap();

    let frame = SplatFrame {
        camera: &camera,
        viewport: renderer.screen.size(),
        screen: &screen.view,
        screen_format: SCREEN_FORMAT,
        elements_rendered: 0,
    };

    node.render(&mut renderer.context, &renderer.gpu, &frame).unwrap()
}

fn streamed(source: &SplatData, total: usize, loaded: usize) -> SplatData {
    let mut data = SplatData::with_total(total);
    data.extend((0..loaded).filter_map(|idx| source.get(idx))).unwrap();
    data
}


#[test]
fn test_render_target_resize_is_idempotent() {
    let Some(gpu) = test_gpu() else {
        return;
    };

    let mut target = RenderTarget::new(&gpu.device, "test_target", RenderTargetConfig::default()).unwrap();
    assert_eq!(target.version(), 0);

    let size = target.size();
    assert!(!target.resize(&gpu.device, size).unwrap());
    assert_eq!(target.version(), 0);

    assert!(target.resize(&gpu.device, UVec2::new(64, 32)).unwrap());
    assert_eq!(target.version(), 1);
    assert_eq!(target.size(), UVec2::new(64, 32));

    let color = target.color(0).unwrap();
    assert_eq!(color.texture.width(), 64);
    assert_eq!(color.texture.height(), 32);
    assert_eq!(target.depth().unwrap().texture.height(), 32);
}

#[test]
fn test_render_target_rejects_zero_size() {
    let Some(gpu) = test_gpu() else {
        return;
    };

    let config = RenderTargetConfig {
        size: UVec2::new(0, 16),
        ..Default::default()
    };
    assert!(matches!(
        RenderTarget::new(&gpu.device, "test_target", config),
        Err(SplatError::InvalidTarget(_)),
    ));
}


#[test]
fn test_radix_sort_kernel() {
    let Some(gpu) = test_gpu() else {
        return;
    };

    let pipeline = pollster::block_on(RadixSortPipeline::new(&gpu.device)).unwrap();

    // deliberately not a multiple of the workgroup size
    let count = 5_003;
    let mut rng = StdRng::seed_from_u64(3);
    let keys_in = (0..count).map(|_| rng.r#gen::<u32>()).collect::<Vec<_>>();
    let values_in = (0..count).collect::<Vec<u32>>();

    let buffer = |label| gpu.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: count as u64 * 4,
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
        mapped_at_creation: false,
    });
    let keys = buffer("test_keys");
    let values = buffer("test_values");
    write_buffer_u32(&gpu, &keys, &keys_in);
    write_buffer_u32(&gpu, &values, &values_in);

    let kernel = RadixSortKernel::new(
        &gpu.device,
        &pipeline,
        RadixSortDescriptor {
            keys: &keys,
            values: &values,
            count,
            bit_count: 32,
        },
    ).unwrap();

    let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("test_radix_encoder"),
    });
    {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("test_radix_pass"),
            timestamp_writes: None,
        });
        kernel.dispatch(&mut pass);
    }
    gpu.queue.submit(Some(encoder.finish()));

    let keys_out = read_buffer_u32(&gpu, &keys, count);
    let values_out = read_buffer_u32(&gpu, &values, count);

    let mut expected = keys_in.clone();
    expected.sort();
    assert_eq!(keys_out, expected);

    for (key, value) in keys_out.iter().zip(&values_out) {
        assert_eq!(*key, keys_in[*value as usize]);
    }
}

#[test]
fn test_radix_sort_rejects_overflowing_count() {
    let Some(gpu) = test_gpu() else {
        return;
    };

    let pipeline = pollster::block_on(RadixSortPipeline::new(&gpu.device)).unwrap();
    let buffer = |label| gpu.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: 64 * 4,
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let keys = buffer("test_keys");
    let values = buffer("test_values");

    let mut kernel = RadixSortKernel::new(
        &gpu.device,
        &pipeline,
        RadixSortDescriptor {
            keys: &keys,
            values: &values,
            count: 64,
            bit_count: 32,
        },
    ).unwrap();

    assert!(kernel.set_count(&gpu.queue, 32).is_ok());
    assert!(matches!(
        kernel.set_count(&gpu.queue, 65),
        Err(SplatError::SortCapacity { count: 65, .. }),
    ));
}


#[test]
fn test_progressive_frame_sequence() {
    let Some(mut renderer) = test_renderer(SplatSettings::default()) else {
        return;
    };

    let source = random_splats_seeded(20_000, 11);
    let mut node = GaussianSplats::new(streamed(&source, 100_000, 10_000));

    let first = render_frame(&mut renderer, &mut node);
    assert_eq!(first.skipped, None);
    assert_eq!(first.validation_error, None);
    assert_eq!(first.uploaded, 10_000);
    assert_eq!(first.resident, 10_000);
    assert_eq!(first.budget, 10_000);
    assert_eq!(first.drawn_splats, 10_000);
    assert!(first.sorted);
    assert!(first.seeded);

    let second = render_frame(&mut renderer, &mut node);
    assert_eq!(second.uploaded, 0);
    assert!(!second.sorted);
    assert!(!second.seeded);
    assert_eq!(second.budget, 15_000);
    assert_eq!(second.drawn_splats, 10_000);

    node.data_mut(100_000)
        .extend((10_000..20_000).filter_map(|idx| source.get(idx)))
        .unwrap();
    let third = render_frame(&mut renderer, &mut node);
    assert_eq!(third.uploaded, 10_000);
    assert_eq!(third.resident, 20_000);
    assert_eq!(third.budget, 10_000, "new uploads restart the ramp");
    assert!(third.sorted, "new uploads force a sort");
    assert_eq!(node.uploaded(), 20_000);
}

fn assert_radix_depth_order(sort_order: SortOrder) {
    let settings = SplatSettings {
        sort_mode: SortMode::Radix,
        sort_order,
        ..Default::default()
    };
    let Some(mut renderer) = test_renderer(settings) else {
        return;
    };

    let count = 3_001;
    let data = random_splats_seeded(count, 21);
    let world = Mat4::from_rotation_y(0.7) * Mat4::from_translation(Vec3::new(0.5, -1.0, 2.0));
    let mut node = GaussianSplats::new(random_splats_seeded(count, 21)).with_world(world);

    let report = render_frame(&mut renderer, &mut node);
    assert!(report.sorted);
    assert_eq!(report.validation_error, None);

    let sort = renderer.context.sort_buffers().get(node.id()).unwrap();
    let values = read_buffer_u32(&renderer.gpu, &sort.values, count as u32);

    let mut indices = values.clone();
    indices.sort_unstable();
    assert!(
        indices.iter().enumerate().all(|(idx, value)| *value == idx as u32),
        "sorted values are not a permutation of the splat indices",
    );

    let view_world = SplatCamera::default().view * world;
    let depths = values.iter()
        .map(|idx| view_world.transform_point3(Vec3::from_array(data.positions()[*idx as usize])).z)
        .collect::<Vec<_>>();

    for (position, pair) in depths.windows(2).enumerate() {
        let ordered = match sort_order {
            SortOrder::BackToFront => pair[0] <= pair[1] + DEPTH_EPSILON,
            SortOrder::FrontToBack => pair[0] + DEPTH_EPSILON >= pair[1],
        };
        assert!(ordered, "{sort_order:?} broken at {position}: {} then {}", pair[0], pair[1]);
    }
}

#[test]
fn test_radix_frame_orders_back_to_front() {
    assert_radix_depth_order(SortOrder::BackToFront);
}

#[test]
fn test_radix_frame_orders_front_to_back() {
    assert_radix_depth_order(SortOrder::FrontToBack);
}


fn assert_replacement_stays_within_loaded(sort_mode: SortMode) {
    let settings = SplatSettings {
        sort_mode,
        ..Default::default()
    };
    let Some(mut renderer) = test_renderer(settings) else {
        return;
    };

    let source = random_splats_seeded(2_000, 13);
    let mut node = GaussianSplats::new(streamed(&source, 2_000, 2_000));
    assert_eq!(render_frame(&mut renderer, &mut node).uploaded, 2_000);

    node.set_data(streamed(&source, 2_000, 500));
    assert_eq!(node.uploaded(), 0);

    let mut expected_resident = 500;
    for frame in 0..6 {
        if frame == 3 {
            node.data_mut(2_000)
                .extend((500..800).filter_map(|idx| source.get(idx)))
                .unwrap();
            expected_resident = 800;
        }

        let report = render_frame(&mut renderer, &mut node);
        let data = node.data().unwrap();

        assert!(node.uploaded() as usize <= data.loaded(), "frame {frame}");
        assert!(data.loaded() <= data.total(), "frame {frame}");
        assert_eq!(report.resident, expected_resident, "frame {frame}");
        assert_eq!(report.drawn_splats, expected_resident.min(report.budget), "frame {frame}");
        assert_eq!(report.validation_error, None, "frame {frame}");
    }

    // same length, different splats
    let replacement = random_splats_seeded(800, 17);
    node.set_data(streamed(&replacement, 2_000, 800));

    let report = render_frame(&mut renderer, &mut node);
    assert_eq!(report.uploaded, 800);
    assert_eq!(report.resident, 800);
    assert!(report.seeded);
    assert_eq!(report.sorted, sort_mode != SortMode::None);
}

#[test]
fn test_set_data_with_fewer_splats_radix() {
    assert_replacement_stays_within_loaded(SortMode::Radix);
}

#[test]
fn test_set_data_with_fewer_splats_unsorted() {
    assert_replacement_stays_within_loaded(SortMode::None);
}

#[cfg(feature = "sort_rayon")]
#[test]
fn test_set_data_with_fewer_splats_rayon() {
    assert_replacement_stays_within_loaded(SortMode::Rayon);
}


#[test]
fn test_gpu_timestamps_time_the_splat_pass() {
    let settings = SplatSettings {
        gpu_timestamps: true,
        ..Default::default()
    };
    let Some(mut renderer) = test_renderer(settings) else {
        return;
    };

    let supported = renderer.gpu.device.features().contains(wgpu::Features::TIMESTAMP_QUERY);
    let mut node = GaussianSplats::new(random_splats_seeded(1_000, 9));

    let mut measured = None;
    for _ in 0..8 {
        let report = render_frame(&mut renderer, &mut node);
        assert_eq!(report.validation_error, None);

        renderer.gpu.device.poll(wgpu::Maintain::Wait);
        measured = measured.or(report.splat_pass_ns);
    }

    assert_eq!(measured.is_some(), supported);
}

#[test]
fn test_gpu_timestamps_off_by_default() {
    let Some(mut renderer) = test_renderer(SplatSettings::default()) else {
        return;
    };

    let mut node = GaussianSplats::new(random_splats_seeded(100, 9));
    for _ in 0..3 {
        assert_eq!(render_frame(&mut renderer, &mut node).splat_pass_ns, None);
        renderer.gpu.device.poll(wgpu::Maintain::Wait);
    }
}


#[cfg(feature = "bevy_render")]
#[test]
fn test_context_shares_bevy_render_device() {
    use std::sync::Arc;

    use bevy::render::renderer::{
        RenderDevice,
        RenderQueue,
        WgpuWrapper,
    };
    use bevy_progressive_splatting::GpuContext;

    let Some(gpu) = test_gpu() else {
        return;
    };

    let render_device = RenderDevice::from(gpu.device.clone());
    let render_queue = RenderQueue(Arc::new(WgpuWrapper::new(gpu.queue.clone())));

    let shared = GpuContext::from_render_device(&render_device, &render_queue);
    assert_eq!(shared.device, gpu.device);

    let mut renderer = SplatRenderer::new(shared, SCREEN_SIZE, SplatSettings::default()).unwrap();
    let viewport = renderer.viewport();
    renderer.context
        .initialize_blocking(&renderer.gpu, viewport, &renderer.shaders)
        .unwrap();

    let mut node = GaussianSplats::new(random_splats_seeded(100, 3));
    let report = render_frame(&mut renderer, &mut node);
    assert_eq!(report.skipped, None);
    assert_eq!(report.drawn_splats, 100);
}


#[test]
fn test_identity_ordering_without_sort() {
    let settings = SplatSettings {
        sort_mode: SortMode::None,
        ..Default::default()
    };
    let Some(mut renderer) = test_renderer(settings) else {
        return;
    };

    let mut node = GaussianSplats::new(random_splats_seeded(1_000, 5));

    renderer.clear_screen();
    let report = render_frame(&mut renderer, &mut node);
    assert!(report.seeded);
    assert!(!report.sorted);
    assert_eq!(report.drawn_splats, 1_000);

    let sort = renderer.context.sort_buffers().get(node.id()).unwrap();
    let values = read_buffer_u32(&renderer.gpu, &sort.values, 1_000);
    assert!(values.iter().enumerate().all(|(idx, value)| *value == idx as u32));

    let screen = renderer.screen.color(0).unwrap();
    let pixels = read_texture_rgba8(&renderer.gpu, &screen.texture, SCREEN_SIZE);
    assert!(
        pixels.chunks(4).any(|pixel| pixel[..3].iter().any(|channel| *channel > 0)),
        "composited splats left the screen black",
    );
}

#[test]
fn test_zero_splats_draw_nothing() {
    let Some(mut renderer) = test_renderer(SplatSettings::default()) else {
        return;
    };

    let mut node = GaussianSplats::new(SplatData::with_total(0));
    let report = render_frame(&mut renderer, &mut node);

    assert_eq!(report.skipped, Some(SkipReason::NoSplats));
    assert_eq!(report.draw_calls, 0);
    assert!(node.gpu_buffers().is_none());
    assert!(renderer.context.sort_buffers().is_empty());

    let mut pending = GaussianSplats::empty();
    assert_eq!(render_frame(&mut renderer, &mut pending).skipped, Some(SkipReason::NoData));
}

#[test]
fn test_uninitialized_context_skips() {
    let Some(gpu) = test_gpu() else {
        return;
    };

    let mut renderer = SplatRenderer::new(gpu, SCREEN_SIZE, SplatSettings::default()).unwrap();
    let mut node = GaussianSplats::new(random_splats_seeded(10, 1));

    let report = render_frame(&mut renderer, &mut node);
    assert_eq!(report.skipped, Some(SkipReason::NotInitialized));
    assert_eq!(node.uploaded(), 0);
}

#[test]
fn test_screen_format_mismatch_is_an_error() {
    let Some(mut renderer) = test_renderer(SplatSettings::default()) else {
        return;
    };

    let mut node = GaussianSplats::new(random_splats_seeded(10, 1));
    let camera = SplatCamera::default();
    let screen = renderer.screen.color(0).unwrap();

    let frame = SplatFrame {
        camera: &camera,
        viewport: SCREEN_SIZE,
        screen: &screen.view,
        screen_format: wgpu::TextureFormat::Bgra8Unorm,
        elements_rendered: 0,
    };

    assert!(matches!(
        node.render(&mut renderer.context, &renderer.gpu, &frame),
        Err(SplatError::InvalidTarget(_)),
    ));
}

#[test]
fn test_shader_compile_failure_marks_context_failed() {
    let Some(gpu) = test_gpu() else {
        return;
    };

    let mut renderer = SplatRenderer::new(gpu, SCREEN_SIZE, SplatSettings::default()).unwrap();
    renderer.shaders.splat = ShaderSource::Embedded("fn main( {");

    let viewport = renderer.viewport();
    let result = renderer.context.initialize_blocking(&renderer.gpu, viewport, &renderer.shaders);

    assert!(matches!(result, Err(SplatError::ShaderCompilation { .. })));
    assert_eq!(renderer.context.state(), InitState::Failed);
    assert!(renderer.context.last_error().is_some());
}
