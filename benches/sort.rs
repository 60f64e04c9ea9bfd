use criterion::{
    BenchmarkId,
    criterion_group,
    criterion_main,
    Criterion,
    Throughput,
};

use bevy_progressive_splatting::{
    SortOrder,
    sort::depth_key,
};


const SPLAT_COUNTS: [usize; 4] = [
    1000,
    10_000,
    100_000,
    500_000,
];

fn depth_key_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("depth keys");
    for count in SPLAT_COUNTS.iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(
            BenchmarkId::new("depth_key", count),
            &count,
            |b, &count| {
                let depths = (0..*count)
                    .map(|idx| idx as f32 * 0.01 - 500.0)
                    .collect::<Vec<_>>();

                b.iter(|| {
                    depths.iter()
                        .map(|z| depth_key(*z, SortOrder::BackToFront))
                        .fold(0u32, u32::wrapping_add)
                });
            },
        );
    }
}

#[cfg(feature = "sort_rayon")]
fn rayon_sort_benchmark(c: &mut Criterion) {
    use bevy::math::Mat4;
    use bevy_progressive_splatting::{
        SplatCamera,
        random_splats_seeded,
        sort::rayon::rayon_sort,
    };

    let camera = SplatCamera::default();

    let mut group = c.benchmark_group("sort splats");
    for count in SPLAT_COUNTS.iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(
            BenchmarkId::new("rayon", count),
            &count,
            |b, &count| {
                let splats = random_splats_seeded(*count, 1);

                b.iter(|| rayon_sort(splats.positions(), camera.view * Mat4::IDENTITY, SortOrder::BackToFront));
            },
        );
    }
}

#[cfg(feature = "sort_rayon")]
criterion_group!{
    name = sort_benches;
    config = Criterion::default().sample_size(10);
    targets = depth_key_benchmark, rayon_sort_benchmark
}

#[cfg(not(feature = "sort_rayon"))]
criterion_group!{
    name = sort_benches;
    config = Criterion::default().sample_size(10);
    targets = depth_key_benchmark
}
criterion_main!(sort_benches);
