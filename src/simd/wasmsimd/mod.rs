//! WebAssembly SIMD128 kernels. Compiled only for `wasm32` with the
//! `simd128` target feature enabled, where support is a compile-time fact.

pub mod igemm;

use crate::isa::Isa;
use crate::simd::params::init_wasmsimd_params;
use crate::simd::IgemmMicrokernel;

use igemm::{igemm_wasmsimd_arm_s4, igemm_wasmsimd_arm_splat, igemm_wasmsimd_x86_splat};

macro_rules! wasmsimd_microkernel {
    ($name:literal, $kernel:ident, $mr:literal, $sr:literal) => {
        IgemmMicrokernel {
            name: $name,
            isa: Isa::WasmSimd,
            mr: $mr,
            nr: 8,
            kr: 1,
            sr: $sr,
            ukernel: $kernel::<$mr>,
            init_params: init_wasmsimd_params,
        }
    };
}

pub const MICROKERNELS: &[IgemmMicrokernel] = &[
    wasmsimd_microkernel!("f32_igemm_minmax_ukernel_1x8__wasmsimd_arm_splat", igemm_wasmsimd_arm_splat, 1, 1),
    wasmsimd_microkernel!("f32_igemm_minmax_ukernel_4x8__wasmsimd_arm_splat", igemm_wasmsimd_arm_splat, 4, 1),
    wasmsimd_microkernel!("f32_igemm_minmax_ukernel_1x8__wasmsimd_x86_splat", igemm_wasmsimd_x86_splat, 1, 1),
    wasmsimd_microkernel!("f32_igemm_minmax_ukernel_4x8__wasmsimd_x86_splat", igemm_wasmsimd_x86_splat, 4, 1),
    wasmsimd_microkernel!("f32_igemm_minmax_ukernel_4x8s4__wasmsimd_arm", igemm_wasmsimd_arm_s4, 4, 4),
];
