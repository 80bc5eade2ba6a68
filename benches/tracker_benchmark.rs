//! Benchmarks for the threshold engine and response decoding
//!
//! Run with: cargo bench

use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use usage_watch::models::{ClaudeUsageResponse, SessionIdentity, UsageSample};
use usage_watch::tracker::{AlertConfig, FramingMode, SessionTracker, TrackerRegistry};

/// Percentages climbing to 100 and falling back, with a window reset every 500 samples
fn generate_samples(count: usize) -> Vec<UsageSample> {
    let base = Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap();
    (0..count)
        .map(|i| {
            let window = (i / 500) as i64;
            let percentage = (i % 500) as f64 / 5.0;
            UsageSample::new(percentage, Some(base + Duration::hours(5 * window)))
        })
        .collect()
}

fn benchmark_observe(c: &mut Criterion) {
    let mut group = c.benchmark_group("tracker_observe");
    let config = AlertConfig::new(vec![50, 75, 90, 95], FramingMode::Usage, true);

    for size in [100, 1_000, 10_000].iter() {
        let samples = generate_samples(*size);

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let mut tracker = SessionTracker::new(SessionIdentity::ClaudeFiveHour);
                for sample in &samples {
                    black_box(tracker.observe(black_box(sample), &config));
                }
            });
        });
    }

    group.finish();
}

fn benchmark_registry(c: &mut Criterion) {
    let samples = generate_samples(1_000);
    let config = AlertConfig::default();

    c.bench_function("registry_observe_all_identities", |b| {
        b.iter(|| {
            let registry = TrackerRegistry::new();
            for sample in &samples {
                for identity in SessionIdentity::ALL {
                    black_box(registry.observe(identity, sample, &config));
                }
            }
        });
    });
}

fn benchmark_decode(c: &mut Criterion) {
    let body = r#"{
        "five_hour": {"utilization": "42.5", "resets_at": "2025-01-01T10:00:00.123456+00:00"},
        "seven_day": {"utilization": 12, "resets_at": "2025-01-07T00:00:00Z"},
        "seven_day_opus": {"utilization": 3.25, "resets_at": null}
    }"#;

    c.bench_function("decode_claude_usage", |b| {
        b.iter(|| {
            let response: ClaudeUsageResponse = serde_json::from_str(black_box(body)).unwrap();
            black_box(response.into_report())
        });
    });
}

criterion_group!(benches, benchmark_observe, benchmark_registry, benchmark_decode);
criterion_main!(benches);
