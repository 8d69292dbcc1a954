//! SSE2 kernels (4-lane `__m128`).

pub mod igemm;

use crate::isa::Isa;
use crate::simd::params::init_sse_params;
use crate::simd::IgemmMicrokernel;

use igemm::{igemm_sse_load1, igemm_sse_s4};

pub const MICROKERNELS: &[IgemmMicrokernel] = &[
    IgemmMicrokernel {
        name: "f32_igemm_minmax_ukernel_1x8__sse_load1",
        isa: Isa::Sse,
        mr: 1,
        nr: 8,
        kr: 1,
        sr: 1,
        ukernel: igemm_sse_load1::<1>,
        init_params: init_sse_params,
    },
    IgemmMicrokernel {
        name: "f32_igemm_minmax_ukernel_4x8__sse_load1",
        isa: Isa::Sse,
        mr: 4,
        nr: 8,
        kr: 1,
        sr: 1,
        ukernel: igemm_sse_load1::<4>,
        init_params: init_sse_params,
    },
    IgemmMicrokernel {
        name: "f32_igemm_minmax_ukernel_1x8s4__sse",
        isa: Isa::Sse,
        mr: 1,
        nr: 8,
        kr: 1,
        sr: 4,
        ukernel: igemm_sse_s4::<1>,
        init_params: init_sse_params,
    },
    IgemmMicrokernel {
        name: "f32_igemm_minmax_ukernel_4x8s4__sse",
        isa: Isa::Sse,
        mr: 4,
        nr: 8,
        kr: 1,
        sr: 4,
        ukernel: igemm_sse_s4::<4>,
        init_params: init_sse_params,
    },
];
