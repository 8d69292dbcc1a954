//! Clamp parameters in the per-ISA layouts kernels load directly.

/// Output clamp bounds, pre-splatted across as many lanes as the kernel's
/// vector width needs.
///
/// The struct is 64-byte aligned and `min` sits at offset 0, `max` at offset
/// 64, so every vector kernel can use aligned loads on either field.
#[repr(C, align(64))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinMaxParams {
    pub min: [f32; 16],
    pub max: [f32; 16],
}

impl MinMaxParams {
    fn splat(min: f32, max: f32, lanes: usize) -> MinMaxParams {
        debug_assert!(lanes <= 16);
        let mut params = MinMaxParams {
            min: [0.0; 16],
            max: [0.0; 16],
        };
        params.min[..lanes].fill(min);
        params.max[..lanes].fill(max);
        params
    }

    /// Lower bound as seen by lane 0.
    pub fn min(&self) -> f32 {
        self.min[0]
    }

    /// Upper bound as seen by lane 0.
    pub fn max(&self) -> f32 {
        self.max[0]
    }
}

/// Scalar and NEON kernels: one lane.
pub fn init_scalar_params(min: f32, max: f32) -> MinMaxParams {
    MinMaxParams::splat(min, max, 1)
}

pub fn init_sse_params(min: f32, max: f32) -> MinMaxParams {
    MinMaxParams::splat(min, max, 4)
}

/// AVX and FMA3 kernels.
pub fn init_avx_params(min: f32, max: f32) -> MinMaxParams {
    MinMaxParams::splat(min, max, 8)
}

pub fn init_avx512_params(min: f32, max: f32) -> MinMaxParams {
    MinMaxParams::splat(min, max, 16)
}

pub fn init_wasmsimd_params(min: f32, max: f32) -> MinMaxParams {
    MinMaxParams::splat(min, max, 4)
}
