//! Every registered kernel variant through every edge-case category.
//!
//! One `#[test]` per (kernel, category). Kernels the running CPU cannot
//! execute, or that were not compiled for this target, return early.

use igemm::conformance::EdgeCase;
use igemm::simd::microkernel;
use igemm::IgemmKernel;

fn run_case(name: &str, case: EdgeCase) {
    let _ = env_logger::builder().is_test(true).try_init();

    let Some(kernel) = microkernel(name) else {
        println!("skipping {name}: not compiled for this target");
        return;
    };
    if !kernel.is_supported() {
        println!("skipping {name}: {} not supported", kernel.isa);
        return;
    }
    if let Err(error) = case.run(kernel) {
        panic!("{name} {case}: {error}");
    }
}

macro_rules! igemm_tests {
    ($module:ident, $kernel:literal) => {
        mod $module {
            use super::run_case;
            use igemm::conformance::EdgeCase;

            igemm_tests!(@cases $kernel;
                k_eq_kblock => KEqKblock,
                strided_cn => StridedCn,
                k_eq_kblock_subtile => KEqKblockSubtile,
                k_eq_kblock_subtile_m => SubtileM,
                k_eq_kblock_subtile_n => SubtileN,
                k_lt_kblock => KLtKblock,
                k_lt_kblock_subtile => KLtKblockSubtile,
                k_gt_kblock => KGtKblock,
                k_gt_kblock_subtile => KGtKblockSubtile,
                k_div_kblock => KDivKblock,
                k_div_kblock_subtile => KDivKblockSubtile,
                n_gt_nr => NGtNr,
                n_gt_nr_strided_cn => NGtNrStridedCn,
                n_gt_nr_subtile => NGtNrSubtile,
                n_div_nr => NDivNr,
                n_div_nr_strided_cn => NDivNrStridedCn,
                n_div_nr_subtile => NDivNrSubtile,
                small_kernel => SmallKernel,
                small_kernel_subtile => SmallKernelSubtile,
                n_gt_nr_small_kernel => NGtNrSmallKernel,
                n_div_nr_small_kernel => NDivNrSmallKernel,
                strided_cm_subtile => StridedCmSubtile,
                a_offset => AOffset,
                zero => Zero,
                qmin => Qmin,
                qmax => Qmax,
                strided_cm => StridedCm,
            );
        }
    };
    (@cases $kernel:literal; $($test:ident => $case:ident),* $(,)?) => {
        $(
            #[test]
            fn $test() {
                run_case($kernel, EdgeCase::$case);
            }
        )*
    };
}

igemm_tests!(f32_igemm_minmax_1x4_scalar, "f32_igemm_minmax_ukernel_1x4__scalar");
igemm_tests!(f32_igemm_minmax_2x4_scalar, "f32_igemm_minmax_ukernel_2x4__scalar");
igemm_tests!(f32_igemm_minmax_4x2_scalar, "f32_igemm_minmax_ukernel_4x2__scalar");
igemm_tests!(f32_igemm_minmax_4x4_scalar, "f32_igemm_minmax_ukernel_4x4__scalar");
igemm_tests!(f32_igemm_minmax_4x2c4_scalar, "f32_igemm_minmax_ukernel_4x2c4__scalar");
igemm_tests!(f32_igemm_minmax_4x4s4_scalar, "f32_igemm_minmax_ukernel_4x4s4__scalar");

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
mod x86 {
    use super::run_case;

    igemm_tests!(f32_igemm_minmax_1x8_sse_load1, "f32_igemm_minmax_ukernel_1x8__sse_load1");
    igemm_tests!(f32_igemm_minmax_4x8_sse_load1, "f32_igemm_minmax_ukernel_4x8__sse_load1");
    igemm_tests!(f32_igemm_minmax_1x8s4_sse, "f32_igemm_minmax_ukernel_1x8s4__sse");
    igemm_tests!(f32_igemm_minmax_4x8s4_sse, "f32_igemm_minmax_ukernel_4x8s4__sse");

    igemm_tests!(f32_igemm_minmax_1x8_avx_broadcast, "f32_igemm_minmax_ukernel_1x8__avx_broadcast");
    igemm_tests!(f32_igemm_minmax_4x8_avx_broadcast, "f32_igemm_minmax_ukernel_4x8__avx_broadcast");
    igemm_tests!(f32_igemm_minmax_1x16_avx_broadcast, "f32_igemm_minmax_ukernel_1x16__avx_broadcast");
    igemm_tests!(f32_igemm_minmax_3x16_avx_broadcast, "f32_igemm_minmax_ukernel_3x16__avx_broadcast");

    igemm_tests!(f32_igemm_minmax_1x8_fma3_broadcast, "f32_igemm_minmax_ukernel_1x8__fma3_broadcast");
    igemm_tests!(f32_igemm_minmax_5x8_fma3_broadcast, "f32_igemm_minmax_ukernel_5x8__fma3_broadcast");
    igemm_tests!(f32_igemm_minmax_1x16_fma3_broadcast, "f32_igemm_minmax_ukernel_1x16__fma3_broadcast");
    igemm_tests!(f32_igemm_minmax_4x16_fma3_broadcast, "f32_igemm_minmax_ukernel_4x16__fma3_broadcast");

    igemm_tests!(f32_igemm_minmax_1x16_avx512f_broadcast, "f32_igemm_minmax_ukernel_1x16__avx512f_broadcast");
    igemm_tests!(f32_igemm_minmax_4x16_avx512f_broadcast, "f32_igemm_minmax_ukernel_4x16__avx512f_broadcast");
    igemm_tests!(f32_igemm_minmax_7x16_avx512f_broadcast, "f32_igemm_minmax_ukernel_7x16__avx512f_broadcast");
}

#[cfg(target_arch = "aarch64")]
mod aarch64 {
    use super::run_case;

    igemm_tests!(f32_igemm_minmax_1x8_neon_lane_ld64, "f32_igemm_minmax_ukernel_1x8__neon_lane_ld64");
    igemm_tests!(f32_igemm_minmax_4x8_neon_lane_ld64, "f32_igemm_minmax_ukernel_4x8__neon_lane_ld64");
    igemm_tests!(f32_igemm_minmax_1x8_neonfma_lane_ld64, "f32_igemm_minmax_ukernel_1x8__neonfma_lane_ld64");
    igemm_tests!(f32_igemm_minmax_4x8_neonfma_lane_ld64, "f32_igemm_minmax_ukernel_4x8__neonfma_lane_ld64");
    igemm_tests!(f32_igemm_minmax_6x8_neonfma_lane_ld64, "f32_igemm_minmax_ukernel_6x8__neonfma_lane_ld64");
}

#[cfg(all(target_arch = "wasm32", target_feature = "simd128"))]
mod wasmsimd {
    use super::run_case;

    igemm_tests!(f32_igemm_minmax_1x8_wasmsimd_arm_splat, "f32_igemm_minmax_ukernel_1x8__wasmsimd_arm_splat");
    igemm_tests!(f32_igemm_minmax_4x8_wasmsimd_arm_splat, "f32_igemm_minmax_ukernel_4x8__wasmsimd_arm_splat");
    igemm_tests!(f32_igemm_minmax_1x8_wasmsimd_x86_splat, "f32_igemm_minmax_ukernel_1x8__wasmsimd_x86_splat");
    igemm_tests!(f32_igemm_minmax_4x8_wasmsimd_x86_splat, "f32_igemm_minmax_ukernel_4x8__wasmsimd_x86_splat");
    igemm_tests!(f32_igemm_minmax_4x8s4_wasmsimd_arm, "f32_igemm_minmax_ukernel_4x8s4__wasmsimd_arm");
}
