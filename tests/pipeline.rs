use bevy::math::{
    Mat4,
    UVec2,
};

use bevy_progressive_splatting::{
    InitState,
    SortOrder,
    SplatContext,
    SplatData,
    SplatError,
    SplatSettings,
    gaussian::data::Splat,
    random_splats_seeded,
    render::{
        draw::{
            VERTICES_PER_SPLAT,
            draw_chunks,
        },
        pipeline::{
            SplatUniforms,
            UNIFORM_BUFFER_SIZE,
        },
        progressive::ProgressiveBudget,
        upload::{
            SplatAttribute,
            UploadBatch,
            gpu_splat_count,
            upload_batches,
        },
    },
    sort::{
        SortScheduler,
        depth_key,
        grown_capacity,
        radix::pass_count,
    },
    utils::{
        SplatViewerConfig,
        square_grid,
        workgroup_grid,
    },
};


#[test]
fn test_budget_reaches_max_after_98_frames() {
    let mut budget = ProgressiveBudget::new(10_000, 5_000, 500_000);
    assert_eq!(budget.budget(), 10_000);

    for _ in 0..97 {
        budget.advance();
    }
    assert_eq!(budget.budget(), 495_000);

    budget.advance();
    assert_eq!(budget.budget(), 500_000);

    budget.advance();
    assert_eq!(budget.budget(), 500_000);
}

#[test]
fn test_budget_visible_is_bounded_by_resident() {
    let mut budget = ProgressiveBudget::new(10_000, 5_000, 500_000);

    assert_eq!(budget.visible(3_000), 3_000);
    assert_eq!(budget.visible(100_000), 10_000);

    budget.advance();
    budget.advance();
    assert_eq!(budget.visible(100_000), 20_000);

    budget.reset();
    assert_eq!(budget.visible(100_000), 10_000);
}

#[test]
fn test_budget_disabled_draws_everything() {
    let settings = SplatSettings {
        progressive: false,
        ..Default::default()
    };

    let mut budget = ProgressiveBudget::from_settings(&settings);
    assert!(!budget.is_enabled());
    assert_eq!(budget.visible(1_234_567), 1_234_567);

    budget.advance();
    assert_eq!(budget.visible(7), 7);
}

#[test]
fn test_budget_initial_above_max_is_clamped() {
    let budget = ProgressiveBudget::new(1_000, 10, 500);
    assert_eq!(budget.budget(), 500);
}


#[test]
fn test_draw_chunks_cover_vertices_contiguously() {
    let chunks = draw_chunks(100_001, 120_000).collect::<Vec<_>>();

    let vertices = 100_001 * VERTICES_PER_SPLAT;
    assert_eq!(chunks.len() as u32, vertices.div_ceil(120_000));
    assert_eq!(chunks.first().map(|range| range.start), Some(0));
    assert_eq!(chunks.last().map(|range| range.end), Some(vertices));

    for window in chunks.windows(2) {
        assert_eq!(window[0].end, window[1].start);
    }
    assert!(chunks.iter().all(|range| range.len() <= 120_000));
}

#[test]
fn test_draw_chunks_edge_cases() {
    assert_eq!(draw_chunks(0, 120_000).count(), 0);
    assert_eq!(draw_chunks(20_000, 120_000).len(), 1);
    assert_eq!(draw_chunks(20_001, 120_000).len(), 2);

    let single = draw_chunks(500_000, 0).collect::<Vec<_>>();
    assert_eq!(single, vec![0..500_000 * VERTICES_PER_SPLAT]);
}


#[test]
fn test_scheduler_sorts_first_frame_then_every_n() {
    let mut scheduler = SortScheduler::new(4);

    assert!(scheduler.should_sort());
    assert!(scheduler.should_sort(), "stays pending until marked sorted");
    scheduler.mark_sorted();

    let sorted = (0..8).map(|_| scheduler.should_sort()).collect::<Vec<_>>();
    assert_eq!(sorted, vec![false, false, false, true, false, false, false, true]);
}

#[test]
fn test_scheduler_invalidate_forces_sort() {
    let mut scheduler = SortScheduler::new(4);
    assert!(scheduler.should_sort());
    scheduler.mark_sorted();
    assert!(!scheduler.should_sort());

    scheduler.invalidate();
    assert!(scheduler.should_sort());
    assert!(scheduler.ever_sorted());

    scheduler.reset();
    assert!(!scheduler.ever_sorted());
}

#[test]
fn test_scheduler_zero_interval_is_clamped() {
    let mut scheduler = SortScheduler::new(0);
    assert_eq!(scheduler.sort_every_n(), 1);

    scheduler.mark_sorted();
    assert!(scheduler.should_sort());
    assert!(scheduler.should_sort());
}


#[test]
fn test_upload_batches_split_the_pending_range() {
    let batches = upload_batches(0, 25_000, 10_000).collect::<Vec<_>>();
    assert_eq!(
        batches,
        vec![
            UploadBatch { start: 0, count: 10_000 },
            UploadBatch { start: 10_000, count: 10_000 },
            UploadBatch { start: 20_000, count: 5_000 },
        ],
    );

    assert_eq!(upload_batches(10_000, 10_000, 10_000).count(), 0);
    assert_eq!(upload_batches(5, 8, 0).count(), 3);
}

#[test]
fn test_upload_batch_byte_ranges() {
    let batch = UploadBatch { start: 10_000, count: 10_000 };

    assert_eq!(batch.byte_range(SplatAttribute::Position), 120_000..240_000);
    assert_eq!(batch.byte_range(SplatAttribute::Color), 160_000..320_000);
    assert_eq!(batch.byte_range(SplatAttribute::Rotation), 160_000..320_000);
    assert_eq!(batch.byte_range(SplatAttribute::Scale), 120_000..240_000);
}

#[test]
fn test_gpu_splat_count_rejects_counts_past_u32() {
    assert_eq!(gpu_splat_count(5).unwrap(), 5);
    assert_eq!(gpu_splat_count(u32::MAX as usize).unwrap(), u32::MAX);

    let too_many = u32::MAX as usize + 1;
    assert!(matches!(
        gpu_splat_count(too_many),
        Err(SplatError::DatasetOverflow { loaded, .. }) if loaded == too_many,
    ));
}


#[test]
fn test_splat_data_respects_declared_total() {
    let mut data = SplatData::with_total(3);
    assert!(data.is_empty());

    let splat = Splat::default();
    data.push(splat).unwrap();
    data.push(splat).unwrap();
    assert_eq!(data.loaded(), 2);
    assert!(!data.is_complete());

    assert!(matches!(data.set_total(1), Err(SplatError::DatasetOverflow { .. })));

    data.push(splat).unwrap();
    assert!(data.is_complete());
    assert!(matches!(data.push(splat), Err(SplatError::DatasetOverflow { loaded: 4, total: 3 })));
}

#[test]
fn test_splat_data_extend_stops_at_total() {
    let source = random_splats_seeded(10, 7);

    let mut data = SplatData::with_total(6);
    let appended = data.extend((0..4).filter_map(|idx| source.get(idx))).unwrap();
    assert_eq!(appended, 4);
    assert_eq!(data.get(3), source.get(3));

    assert!(data.extend((4..10).filter_map(|idx| source.get(idx))).is_err());
    assert_eq!(data.loaded(), 6);
}

#[test]
fn test_seeded_splats_are_deterministic() {
    let a = random_splats_seeded(64, 42);
    let b = random_splats_seeded(64, 42);

    assert_eq!(a, b);
    assert_eq!(a.total(), 64);
    assert!(a.is_complete());
}


#[test]
fn test_depth_key_orders_back_to_front() {
    let depths = [-1000.0, -10.0, -1.5, -0.0, 0.0, 0.25, 42.0];

    let keys = depths.iter()
        .map(|z| depth_key(*z, SortOrder::BackToFront))
        .collect::<Vec<_>>();
    assert!(keys.windows(2).all(|pair| pair[0] < pair[1]), "{keys:?}");

    let inverted = depths.iter()
        .map(|z| depth_key(*z, SortOrder::FrontToBack))
        .collect::<Vec<_>>();
    assert!(inverted.windows(2).all(|pair| pair[0] > pair[1]), "{inverted:?}");
}

#[cfg(feature = "sort_rayon")]
#[test]
fn test_rayon_sort_draws_farthest_first() {
    use bevy_progressive_splatting::sort::rayon::rayon_sort;

    let positions = [
        [0.0, 0.0, -1.0],
        [0.0, 0.0, -10.0],
        [0.0, 0.0, -5.0],
    ];

    assert_eq!(rayon_sort(&positions, Mat4::IDENTITY, SortOrder::BackToFront), vec![1, 2, 0]);
    assert_eq!(rayon_sort(&positions, Mat4::IDENTITY, SortOrder::FrontToBack), vec![0, 2, 1]);
}


#[test]
fn test_context_single_initialization_attempt() {
    let mut context = SplatContext::default();
    assert_eq!(context.state(), InitState::Uninitialized);

    let ticket = context.begin_initialize().expect("first attempt");
    assert_eq!(context.state(), InitState::Initializing);
    assert!(context.begin_initialize().is_none());

    let result = context.complete_initialize(ticket, Err(SplatError::NoAdapter));
    assert!(result.is_err());
    assert_eq!(context.state(), InitState::Failed);
    assert!(!context.is_ready());
    assert!(context.last_error().is_some());
    assert!(context.pipelines().is_none());

    let retry = context.begin_initialize();
    assert!(retry.is_some());
    assert_eq!(context.state(), InitState::Initializing);
}


#[test]
fn test_radix_pass_count() {
    assert_eq!(pass_count(32).unwrap(), 8);
    assert_eq!(pass_count(16).unwrap(), 4);

    for bad in [0, 4, 12, 40] {
        assert!(matches!(pass_count(bad), Err(SplatError::InvalidBitCount(_))));
    }
}

#[test]
fn test_sort_capacity_growth() {
    assert_eq!(grown_capacity(1 << 20, 1_500_000), 1 << 21);
    assert_eq!(grown_capacity(1_000, 5_000), 5_000);
}

#[test]
fn test_workgroup_grids() {
    assert_eq!(workgroup_grid(0), [0, 0]);
    assert_eq!(workgroup_grid(1), [1, 1]);
    assert_eq!(workgroup_grid(65_536), [256, 256]);

    for groups in [2, 7, 391, 65_535, 70_001, 1_000_000] {
        let [x, y] = workgroup_grid(groups);
        assert!(x * y >= groups);
        assert!(x <= 65_535 && y <= 65_535);
    }

    // 100_000 splats need 391 workgroups of 256
    assert_eq!(square_grid(100_000, 256), 20);
    assert_eq!(square_grid(256, 256), 1);
    assert_eq!(square_grid(0, 256), 0);
}

#[test]
fn test_uniforms_fill_the_uniform_buffer() {
    assert_eq!(std::mem::size_of::<SplatUniforms>() as u64, UNIFORM_BUFFER_SIZE);
}

#[test]
fn test_uniforms_hovered_index_never_wraps() {
    let hovered_index = |hovered| SplatUniforms::new(
        Mat4::IDENTITY,
        Mat4::IDENTITY,
        Mat4::IDENTITY,
        UVec2::new(16, 16),
        1.0,
        0,
        hovered,
        10,
        0,
    ).hovered_index;

    assert_eq!(hovered_index(None), -1);
    assert_eq!(hovered_index(Some(7)), 7);
    assert_eq!(hovered_index(Some(i32::MAX as u32)), i32::MAX);
    assert_eq!(hovered_index(Some(i32::MAX as u32 + 1)), -1);
    assert_eq!(hovered_index(Some(u32::MAX)), -1);
}


#[test]
fn test_settings_defaults() {
    let settings = SplatSettings::default();

    assert!(settings.progressive);
    assert_eq!(settings.budget_initial, 10_000);
    assert_eq!(settings.budget_increment, 5_000);
    assert_eq!(settings.budget_max, 500_000);
    assert_eq!(settings.sort_every_n_frames, 4);
    assert_eq!(settings.max_vertices_per_draw, 120_000);
    assert_eq!(settings.upload_batch_size, 10_000);
    assert_eq!(settings.sort_bit_count, 32);
    assert_eq!(settings.sort_order, SortOrder::BackToFront);
    assert!(!settings.gpu_timestamps);
}

#[test]
fn test_settings_partial_json_keeps_defaults() {
    let settings: SplatSettings = serde_json::from_str(r#"{ "budget_max": 1000, "sort_order": "FrontToBack" }"#).unwrap();

    assert_eq!(settings.budget_max, 1_000);
    assert_eq!(settings.sort_order, SortOrder::FrontToBack);
    assert_eq!(settings.budget_initial, 10_000);

    let json = serde_json::to_string(&settings).unwrap();
    assert_eq!(serde_json::from_str::<SplatSettings>(&json).unwrap(), settings);
}

#[test]
fn test_viewer_config_overrides_settings() {
    let config = SplatViewerConfig {
        progressive: false,
        sort_order: SortOrder::FrontToBack,
        ..Default::default()
    };

    let settings = config.splat_settings().unwrap();
    assert!(!settings.progressive);
    assert_eq!(settings.sort_order, SortOrder::FrontToBack);
    assert_eq!(settings.budget_max, 500_000);

    let missing = SplatViewerConfig {
        settings_file: "does/not/exist.json".to_string(),
        ..Default::default()
    };
    assert!(missing.splat_settings().is_err());
}
