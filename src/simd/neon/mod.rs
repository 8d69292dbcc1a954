//! AArch64 NEON kernels for 128-bit vectors.
//!
//! Two families share one body:
//!
//! - **NEON**: `vmlaq_lane_f32`, a separate multiply and add
//! - **NEON-FMA**: `vfmaq_lane_f32`, fused multiply-add
//!
//! Both are `lane_ld64` kernels: the main loop loads two `A` elements per row
//! as a 64-bit `float32x2_t` and multiplies by lane, the odd tail uses a
//! duplicating load. NEON is part of the AArch64 baseline, so the module is
//! compiled for every `aarch64` target.
//!
//! NEON kernels read a single clamp lane and use [`init_scalar_params`].

pub mod igemm;

use crate::isa::Isa;
use crate::simd::params::init_scalar_params;
use crate::simd::IgemmMicrokernel;

use igemm::{igemm_neon_lane_ld64, igemm_neonfma_lane_ld64};

macro_rules! lane_microkernel {
    ($name:literal, $isa:expr, $kernel:ident, $mr:literal) => {
        IgemmMicrokernel {
            name: $name,
            isa: $isa,
            mr: $mr,
            nr: 8,
            kr: 1,
            sr: 1,
            ukernel: $kernel::<$mr>,
            init_params: init_scalar_params,
        }
    };
}

pub const MICROKERNELS: &[IgemmMicrokernel] = &[
    lane_microkernel!("f32_igemm_minmax_ukernel_1x8__neon_lane_ld64", Isa::Neon, igemm_neon_lane_ld64, 1),
    lane_microkernel!("f32_igemm_minmax_ukernel_4x8__neon_lane_ld64", Isa::Neon, igemm_neon_lane_ld64, 4),
    lane_microkernel!("f32_igemm_minmax_ukernel_1x8__neonfma_lane_ld64", Isa::NeonFma, igemm_neonfma_lane_ld64, 1),
    lane_microkernel!("f32_igemm_minmax_ukernel_4x8__neonfma_lane_ld64", Isa::NeonFma, igemm_neonfma_lane_ld64, 4),
    lane_microkernel!("f32_igemm_minmax_ukernel_6x8__neonfma_lane_ld64", Isa::NeonFma, igemm_neonfma_lane_ld64, 6),
];
