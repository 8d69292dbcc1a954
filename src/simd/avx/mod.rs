//! AVX and FMA3 kernels (8-lane `__m256`).

pub mod igemm;

use crate::isa::Isa;
use crate::simd::params::init_avx_params;
use crate::simd::IgemmMicrokernel;

use igemm::{igemm_avx_broadcast, igemm_fma3_broadcast};

macro_rules! broadcast_microkernel {
    ($name:literal, $isa:expr, $kernel:ident, $mr:literal, $nv:literal) => {
        IgemmMicrokernel {
            name: $name,
            isa: $isa,
            mr: $mr,
            nr: 8 * $nv,
            kr: 1,
            sr: 1,
            ukernel: $kernel::<$mr, $nv>,
            init_params: init_avx_params,
        }
    };
}

pub const MICROKERNELS: &[IgemmMicrokernel] = &[
    broadcast_microkernel!("f32_igemm_minmax_ukernel_1x8__avx_broadcast", Isa::Avx, igemm_avx_broadcast, 1, 1),
    broadcast_microkernel!("f32_igemm_minmax_ukernel_4x8__avx_broadcast", Isa::Avx, igemm_avx_broadcast, 4, 1),
    broadcast_microkernel!("f32_igemm_minmax_ukernel_1x16__avx_broadcast", Isa::Avx, igemm_avx_broadcast, 1, 2),
    broadcast_microkernel!("f32_igemm_minmax_ukernel_3x16__avx_broadcast", Isa::Avx, igemm_avx_broadcast, 3, 2),
    broadcast_microkernel!("f32_igemm_minmax_ukernel_1x8__fma3_broadcast", Isa::Fma3, igemm_fma3_broadcast, 1, 1),
    broadcast_microkernel!("f32_igemm_minmax_ukernel_5x8__fma3_broadcast", Isa::Fma3, igemm_fma3_broadcast, 5, 1),
    broadcast_microkernel!("f32_igemm_minmax_ukernel_1x16__fma3_broadcast", Isa::Fma3, igemm_fma3_broadcast, 1, 2),
    broadcast_microkernel!("f32_igemm_minmax_ukernel_4x16__fma3_broadcast", Isa::Fma3, igemm_fma3_broadcast, 4, 2),
];
