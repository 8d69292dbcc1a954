//! IGEMM microkernel and driver benchmarks.
//!
//! # Usage:
//! ```bash
//! # Single-tile throughput of the preferred kernel vs scalar
//! cargo bench --bench igemm -- tile
//!
//! # Whole 3x3 convolution, sequential vs rayon
//! cargo bench --bench igemm -- conv3x3
//! ```

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::prelude::*;

use igemm::driver::IgemmTiledProblem;
use igemm::simd::microkernel;
use igemm::{
    best_microkernel, IgemmCall, IgemmKernel, IgemmMicrokernel, IndirectionBuffer,
    IndirectionSlot, PackingConfig,
};

fn random_vec(len: usize, rng: &mut StdRng) -> Vec<f32> {
    (0..len).map(|_| rng.random_range(-1.0..1.0)).collect()
}

fn selected_kernels() -> Vec<&'static IgemmMicrokernel> {
    let mut kernels = vec![best_microkernel()];
    for name in [
        "f32_igemm_minmax_ukernel_4x4__scalar",
        "f32_igemm_minmax_ukernel_4x2c4__scalar",
    ] {
        if let Some(kernel) = microkernel(name) {
            if kernel.name != kernels[0].name {
                kernels.push(kernel);
            }
        }
    }
    kernels
}

/// One full tile (`m = mr`, `n = 4 * nr`) with 9 indirection slots.
fn bench_tile(c: &mut Criterion) {
    let ks = 9;
    for k in [16, 64, 256] {
        let mut group = c.benchmark_group(format!("tile_k{k}_ks{ks}"));

        for kernel in selected_kernels() {
            let (mr, n) = (kernel.mr, 4 * kernel.nr);
            group.throughput(Throughput::Elements((2 * mr * n * k * ks) as u64));

            let mut rng = StdRng::seed_from_u64(42);
            let input = random_vec(mr * ks * k, &mut rng);
            let weights = random_vec(ks * k * n, &mut rng);
            let bias = random_vec(n, &mut rng);
            let zero = vec![0.0f32; k];

            let packed = kernel
                .packing()
                .and_then(|config| config.pack_igemm_weights(n, k, ks, &weights, Some(&bias)))
                .unwrap();
            let table = IndirectionBuffer::builder(mr, ks)
                .a_stride(k)
                .build_shuffled(&mut rng)
                .unwrap();
            let resolved = table.resolve(&input, &zero, k, 0).unwrap();
            let mut output = vec![0.0f32; mr * n];

            group.bench_function(BenchmarkId::new(kernel.name, k), |b| {
                b.iter(|| {
                    kernel
                        .compute(IgemmCall {
                            m: mr,
                            n,
                            indirection: &resolved,
                            weights: &packed,
                            output: black_box(&mut output),
                            cm_stride: n,
                            cn_stride: kernel.nr,
                            min: -1.0,
                            max: 1.0,
                        })
                        .unwrap()
                })
            });
        }
        group.finish();
    }
}

/// 3x3 same-padded convolution of an `hw × hw × channels` image lowered to
/// IGEMM through the tiled driver.
fn bench_conv3x3(c: &mut Criterion) {
    let kernel = best_microkernel();
    let (channels, filters) = (32, 64);

    for hw in [14, 28, 56] {
        let mut group = c.benchmark_group(format!("conv3x3_{hw}x{hw}x{channels}"));
        group.sample_size(20);

        let m = hw * hw;
        let ks = 9;
        let mut rng = StdRng::seed_from_u64(42);
        let input = random_vec(m * channels, &mut rng);
        let weights = random_vec(ks * channels * filters, &mut rng);
        let zero = vec![0.0f32; channels];
        let packed = kernel
            .packing()
            .and_then(|config| config.pack_igemm_weights(filters, channels, ks, &weights, None))
            .unwrap();

        let mut row_slots = Vec::with_capacity(m * ks);
        for y in 0..hw as isize {
            for x in 0..hw as isize {
                for dy in -1..=1 {
                    for dx in -1..=1 {
                        let (iy, ix) = (y + dy, x + dx);
                        let inside = (0..hw as isize).contains(&iy) && (0..hw as isize).contains(&ix);
                        row_slots.push(if inside {
                            IndirectionSlot::Row((iy as usize * hw + ix as usize) * channels)
                        } else {
                            IndirectionSlot::Zero
                        });
                    }
                }
            }
        }

        let problem = IgemmTiledProblem::new(kernel, m, row_slots, &packed, &input, &zero)
            .unwrap()
            .clamp(0.0, 6.0);
        let mut output = vec![0.0f32; m * filters];
        group.throughput(Throughput::Elements((2 * m * filters * channels * ks) as u64));

        group.bench_function(BenchmarkId::new("run", kernel.name), |b| {
            b.iter(|| problem.run(black_box(&mut output), filters).unwrap())
        });
        group.bench_function(BenchmarkId::new("par_run", kernel.name), |b| {
            b.iter(|| problem.par_run(black_box(&mut output), filters).unwrap())
        });
        group.finish();
    }
}

criterion_group!(benches, bench_tile, bench_conv3x3);
criterion_main!(benches);
