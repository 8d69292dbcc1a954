//! AVX-512F kernels. Compiled only when the toolchain exposes the AVX-512
//! intrinsics (see `build.rs`).

pub mod igemm;

use crate::isa::Isa;
use crate::simd::params::init_avx512_params;
use crate::simd::IgemmMicrokernel;

use igemm::igemm_avx512f_broadcast;

macro_rules! avx512_microkernel {
    ($name:literal, $mr:literal) => {
        IgemmMicrokernel {
            name: $name,
            isa: Isa::Avx512f,
            mr: $mr,
            nr: 16,
            kr: 1,
            sr: 1,
            ukernel: igemm_avx512f_broadcast::<$mr>,
            init_params: init_avx512_params,
        }
    };
}

pub const MICROKERNELS: &[IgemmMicrokernel] = &[
    avx512_microkernel!("f32_igemm_minmax_ukernel_1x16__avx512f_broadcast", 1),
    avx512_microkernel!("f32_igemm_minmax_ukernel_4x16__avx512f_broadcast", 4),
    avx512_microkernel!("f32_igemm_minmax_ukernel_7x16__avx512f_broadcast", 7),
];
