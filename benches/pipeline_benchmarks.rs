use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use imgly_inpaint::{
    pipeline::size_ops::{pad_to_modulo, resize_to_limit},
    HdStrategy, InpaintConfig, InpaintProcessor, Interpolation, MaskRegionExtractor, MockBackend,
    SharedBackend,
};

const SIZES: [(u32, u32); 3] = [(640, 480), (1920, 1080), (3840, 2160)];

fn test_image(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x ^ y) % 256) as u8])
    })
}

/// A few scattered blobs, roughly what a user brushes over unwanted objects
fn test_mask(width: u32, height: u32) -> GrayImage {
    let blobs = [(0.2, 0.3, 0.05), (0.6, 0.5, 0.08), (0.85, 0.2, 0.03)];
    GrayImage::from_fn(width, height, |x, y| {
        let (fx, fy) = (f64::from(x) / f64::from(width), f64::from(y) / f64::from(height));
        let inside = blobs
            .iter()
            .any(|&(cx, cy, r)| (fx - cx).powi(2) + (fy - cy).powi(2) < r * r);
        Luma([if inside { 255 } else { 0 }])
    })
}

fn processor(strategy: HdStrategy) -> InpaintProcessor {
    let config = InpaintConfig::builder()
        .hd_strategy(strategy)
        .resize_limit(1024)
        .build()
        .unwrap();
    InpaintProcessor::new(config, SharedBackend::new(MockBackend::solid_color([127, 127, 127])))
        .unwrap()
}

fn benchmark_strategies(c: &mut Criterion) {
    let mut group = c.benchmark_group("hd_strategies");
    group.sample_size(10);

    for (width, height) in SIZES {
        let image = DynamicImage::ImageRgb8(test_image(width, height));
        let mask = DynamicImage::ImageLuma8(test_mask(width, height));

        for strategy in [HdStrategy::Direct, HdStrategy::Crop, HdStrategy::Resize] {
            let processor = processor(strategy);
            group.bench_with_input(
                BenchmarkId::new(strategy.to_string(), format!("{width}x{height}")),
                &(&image, &mask),
                |b, (image, mask)| b.iter(|| black_box(processor.process(image, mask).unwrap())),
            );
        }
    }

    group.finish();
}

fn benchmark_region_extraction(c: &mut Criterion) {
    let mut group = c.benchmark_group("region_extraction");

    for (width, height) in SIZES {
        let mask = test_mask(width, height);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{width}x{height}")),
            &mask,
            |b, mask| b.iter(|| black_box(MaskRegionExtractor::boxes_from_mask(mask))),
        );
    }

    group.finish();
}

fn benchmark_size_ops(c: &mut Criterion) {
    let mut group = c.benchmark_group("size_ops");
    let image = test_image(1921, 1081);

    group.bench_function("pad_to_modulo_8", |b| {
        b.iter(|| black_box(pad_to_modulo(&image, 8, false, None).unwrap()));
    });

    for interpolation in [Interpolation::Linear, Interpolation::Cubic, Interpolation::Lanczos] {
        group.bench_with_input(
            BenchmarkId::new("resize_to_limit_1024", format!("{interpolation:?}").to_lowercase()),
            &interpolation,
            |b, &interpolation| b.iter(|| black_box(resize_to_limit(&image, 1024, interpolation))),
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_strategies,
    benchmark_region_extraction,
    benchmark_size_ops
);
criterion_main!(benches);
