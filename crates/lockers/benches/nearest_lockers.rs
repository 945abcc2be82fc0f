use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use chrono::Utc;
use shopfront_lockers::{haversine_km, nearest, GeoPoint, Locker};

/// Deterministic grid of lockers over the greater Cape Town / Gauteng area.
fn directory(n: usize) -> Vec<Locker> {
    let now = Utc::now();
    (0..n)
        .map(|i| {
            let row = (i / 100) as f64;
            let col = (i % 100) as f64;
            Locker {
                code: format!("L{i:05}"),
                name: format!("Locker {i}"),
                address: String::new(),
                city: None,
                province: None,
                postal_code: None,
                latitude: -34.2 + row * 0.08,
                longitude: 18.2 + col * 0.1,
                opening_hours: None,
                active: i % 17 != 0,
                updated_at: now,
            }
        })
        .collect()
}

fn bench_haversine(c: &mut Criterion) {
    let a = GeoPoint { latitude: -33.9249, longitude: 18.4241 };
    let b = GeoPoint { latitude: -26.2041, longitude: 28.0473 };
    c.bench_function("haversine_km", |bench| {
        bench.iter(|| haversine_km(black_box(a), black_box(b)))
    });
}

fn bench_nearest(c: &mut Criterion) {
    let origin = GeoPoint { latitude: -33.9249, longitude: 18.4241 };
    let mut group = c.benchmark_group("nearest_lockers");
    for size in [100usize, 1_000, 10_000] {
        let lockers = directory(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &lockers, |bench, lockers| {
            bench.iter(|| nearest(black_box(lockers), origin, 10, 25.0))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_haversine, bench_nearest);
criterion_main!(benches);
