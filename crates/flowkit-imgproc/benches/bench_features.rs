use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;

use flowkit_image::Image;
use flowkit_imgproc::features::{min_eigen_response, CornerDetector};

fn textured_image(width: usize, height: usize) -> Image<f32, 1> {
    let data = (0..height)
        .flat_map(|y| {
            (0..width).map(move |x| {
                let (xf, yf) = (x as f32, y as f32);
                128.0 + 60.0 * (0.11 * xf + 0.05 * yf).sin() + 50.0 * (0.07 * xf - 0.13 * yf).cos()
            })
        })
        .collect();
    Image::new([width, height].into(), data).unwrap()
}

fn bench_features(c: &mut Criterion) {
    let mut group = c.benchmark_group("Features");

    for (width, height) in [(320, 240), (640, 480), (1280, 720)].iter() {
        group.throughput(criterion::Throughput::Elements((*width * *height) as u64));

        let parameter_string = format!("{}x{}", width, height);
        let image = textured_image(*width, *height);
        let response = Image::<f32, 1>::from_size_val(image.size(), 0.0).unwrap();

        group.bench_with_input(
            BenchmarkId::new("min_eigen_response", &parameter_string),
            &(&image, &response),
            |b, i| {
                let (src, mut dst) = (i.0, i.1.clone());
                b.iter(|| {
                    black_box(min_eigen_response(src, &mut dst, 3)).unwrap();
                })
            },
        );

        let detector = CornerDetector::new(100, 0.01, 10.0);
        group.bench_with_input(
            BenchmarkId::new("corner_detector", &parameter_string),
            &image,
            |b, src| {
                b.iter(|| {
                    black_box(detector.detect(src)).unwrap();
                })
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_features);
criterion_main!(benches);
