//! Benchmarks for thumbnail generation, hashing and the work queue.
//!
//! Run with: cargo bench -p glimpse-core

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use glimpse_core::pipeline::{Hasher, LanczosScaler, SimdScaler, ThumbnailEngine};
use glimpse_core::types::{ThumbConfig, ThumbTarget};
use glimpse_core::UniqueWorkQueue;
use image::{DynamicImage, Rgb, RgbImage};

fn synthetic(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x ^ y) % 256) as u8])
    }))
}

fn benchmark_thumbnail_fold(c: &mut Criterion) {
    let dir = tempfile::tempdir().expect("tempdir");
    let source = dir.path().join("source.png");
    synthetic(3000, 2000).save(&source).expect("write source");

    let targets: Vec<ThumbTarget> = ThumbConfig::defaults()
        .into_iter()
        .map(|config| ThumbTarget::new(config, dir.path().join(format!("{}.jpg", config.size))))
        .collect();
    let clear = || {
        for t in &targets {
            let _ = std::fs::remove_file(&t.destination);
        }
    };

    c.bench_function("thumbnails_all_sizes_simd", |b| {
        let mut engine = ThumbnailEngine::new(SimdScaler::new(), 85);
        b.iter(|| {
            clear();
            let _ = engine.generate(black_box(&source), black_box(&targets));
        })
    });

    c.bench_function("thumbnails_all_sizes_lanczos", |b| {
        let mut engine = ThumbnailEngine::new(LanczosScaler, 85);
        b.iter(|| {
            clear();
            let _ = engine.generate(black_box(&source), black_box(&targets));
        })
    });
}

fn benchmark_hashes(c: &mut Criterion) {
    let img = synthetic(1024, 768);
    let hasher = Hasher::new();

    c.bench_function("content_hash_blake3", |b| {
        b.iter(|| Hasher::content_hash(black_box(&img)))
    });
    c.bench_function("perceptual_hash", |b| {
        b.iter(|| hasher.perceptual_hash(black_box(&img)))
    });
}

fn benchmark_queue(c: &mut Criterion) {
    c.bench_function("queue_enqueue_dequeue_10k", |b| {
        b.iter(|| {
            let queue = UniqueWorkQueue::new();
            for i in 0..10_000i64 {
                queue.try_enqueue(i, i, (i % 7) as i32);
            }
            while let Some(item) = queue.try_dequeue() {
                black_box(item);
            }
        })
    });
}

criterion_group!(benches, benchmark_thumbnail_fold, benchmark_hashes, benchmark_queue);
criterion_main!(benches);
