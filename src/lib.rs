#![cfg_attr(
    all(
        any(target_arch = "x86", target_arch = "x86_64"),
        rustc_channel = "nightly",
        not(avx512_stable)
    ),
    feature(avx512_target_feature, stdarch_x86_avx512)
)]

//! f32 indirect GEMM (IGEMM) minmax microkernels and their conformance tester.
//!
//! An IGEMM microkernel computes one `mr`-row tile of
//! `C = clamp(bias + A·B, min, max)` where the rows of `A` are gathered through
//! an indirection array of row pointers instead of a materialized im2col
//! matrix. The crate is organized leaves first:
//!
//! - [`reference`]: naive `f64` ground truth
//! - [`indirection`]: slot table of real rows and zero rows
//! - [`packing`]: the `{nr, kr, sr}` blocked weight layout
//! - [`simd`]: the kernel ABI, the per-ISA kernels and the registry
//! - [`tester`]: [`GemmMicrokernelTester`], the fluent conformance harness
//! - [`conformance`]: the edge-case categories every variant is swept through
//! - [`driver`]: full-problem tiling over many `mr` row blocks (rayon)

pub mod conformance;
pub mod driver;
pub mod error;
pub mod indirection;
pub mod isa;
pub mod packing;
pub mod reference;
pub mod simd;
pub mod tester;
pub mod utils;

pub use error::{IgemmError, Result};
pub use indirection::{IndirectionBuffer, IndirectionSlot};
pub use isa::{capabilities, Capabilities, Isa};
pub use packing::{PackedWeights, PackingConfig};
pub use simd::params::MinMaxParams;
pub use simd::{
    best_microkernel, igemm_minmax_microkernels, IgemmCall, IgemmKernel, IgemmMicrokernel,
    IgemmMinmaxUkernelFn, MinMaxParamsInitFn,
};
pub use tester::{GemmMicrokernelTester, TestOutcome, TestReport};
