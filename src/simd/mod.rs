//! The IGEMM microkernel ABI, the per-ISA kernels and the kernel registry.
//!
//! Every kernel, whatever its instruction set, has the same raw signature
//! ([`IgemmMinmaxUkernelFn`]). A kernel is described by an
//! [`IgemmMicrokernel`]: its tile shape, its packing, the ISA it needs and the
//! function that lays out its clamp parameters. The descriptor's
//! [`compute`](IgemmKernel::compute) validates a call before handing raw
//! pointers to the kernel.

use std::sync::OnceLock;

use crate::error::{ensure_len, packing_error, shape_error, IgemmError, Result};
use crate::indirection::ResolvedIndirection;
use crate::isa::{capabilities, Isa};
use crate::packing::{PackedWeights, PackingConfig};

pub mod params;
pub mod scalar;
pub(crate) mod tile;

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub mod avx;
#[cfg(all(avx512, any(target_arch = "x86", target_arch = "x86_64")))]
pub mod avx512;
#[cfg(target_arch = "aarch64")]
pub mod neon;
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub mod sse;
#[cfg(all(target_arch = "wasm32", target_feature = "simd128"))]
pub mod wasmsimd;

use params::MinMaxParams;
use tile::PTR_SIZE;

/// Raw IGEMM minmax microkernel.
///
/// Computes `min(mr, MR)` output rows and `nc` output columns of
/// `clamp(bias + Σ_s A_s · B_s, min, max)`.
///
/// Arguments, in order:
///
/// * `mr`: valid rows, `1..=MR`
/// * `nc`: output columns, processed `NR` at a time
/// * `kc`: reduction length per slot, in **bytes**
/// * `ks`: indirection entries per column block, in **bytes**
///   (`ks_slots * MR * size_of::<*const f32>()`)
/// * `a`: indirection table, `MR` pointers per slot
/// * `w`: packed weights
/// * `c`: output tile
/// * `cm_stride`, `cn_stride`: output row and column-block strides in bytes
/// * `a_offset`: byte offset added to every entry that is not `zero`
/// * `zero`: the shared zero row
/// * `params`: clamp bounds
///
/// There is no error path: any call outside this domain is undefined
/// behavior. Use [`IgemmKernel::compute`] for a checked call.
pub type IgemmMinmaxUkernelFn = unsafe fn(
    mr: usize,
    nc: usize,
    kc: usize,
    ks: usize,
    a: *const *const f32,
    w: *const f32,
    c: *mut f32,
    cm_stride: usize,
    cn_stride: usize,
    a_offset: usize,
    zero: *const f32,
    params: &MinMaxParams,
);

/// Lays out clamp bounds the way one kernel family loads them.
pub type MinMaxParamsInitFn = fn(min: f32, max: f32) -> MinMaxParams;

/// One compiled kernel variant.
#[derive(Debug, Clone, Copy)]
pub struct IgemmMicrokernel {
    pub name: &'static str,
    pub isa: Isa,
    pub mr: usize,
    pub nr: usize,
    pub kr: usize,
    pub sr: usize,
    pub ukernel: IgemmMinmaxUkernelFn,
    pub init_params: MinMaxParamsInitFn,
}

/// A checked kernel call over one tile.
///
/// Strides are in elements. `a_offset` and `k` are taken from the resolved
/// indirection, which was bounds-checked against them.
#[derive(Debug)]
pub struct IgemmCall<'a> {
    pub m: usize,
    pub n: usize,
    pub indirection: &'a ResolvedIndirection<'a>,
    pub weights: &'a PackedWeights,
    pub output: &'a mut [f32],
    pub cm_stride: usize,
    pub cn_stride: usize,
    pub min: f32,
    pub max: f32,
}

/// Number of output elements, from the tile origin, an `m × n` store with
/// these strides can touch.
pub fn output_extent(m: usize, n: usize, nr: usize, cm_stride: usize, cn_stride: usize) -> usize {
    if m == 0 || n == 0 {
        return 0;
    }
    let last_block = (n - 1) / nr;
    let last_extent = last_block * cn_stride + (n - last_block * nr);
    let full_extent = if last_block > 0 {
        (last_block - 1) * cn_stride + nr
    } else {
        0
    };
    (m - 1) * cm_stride + last_extent.max(full_extent)
}

/// Anything with a tile shape that can be invoked through the raw ABI.
pub trait IgemmKernel {
    fn name(&self) -> &str;
    fn isa(&self) -> Isa;
    fn mr(&self) -> usize;
    fn nr(&self) -> usize;
    fn kr(&self) -> usize;
    fn sr(&self) -> usize;
    fn ukernel(&self) -> IgemmMinmaxUkernelFn;
    fn init_params(&self) -> MinMaxParamsInitFn;

    /// Whether the running CPU can execute this kernel.
    fn is_supported(&self) -> bool {
        capabilities().supports(self.isa())
    }

    /// Weight layout this kernel consumes.
    fn packing(&self) -> Result<PackingConfig> {
        PackingConfig::new(self.nr(), self.kr(), self.sr())
    }

    /// Validates `call` against the kernel's shape and invokes it.
    ///
    /// # Errors
    ///
    /// [`IgemmError::UnsupportedIsa`] on a CPU without the kernel's ISA,
    /// [`IgemmError::InvalidShape`] / [`IgemmError::InvalidPacking`] when the
    /// pieces of the call disagree, [`IgemmError::BufferTooSmall`] when the
    /// output cannot hold the strided tile.
    fn compute(&self, call: IgemmCall<'_>) -> Result<()> {
        if !self.is_supported() {
            return Err(IgemmError::UnsupportedIsa {
                kernel: self.name().to_string(),
                isa: self.isa(),
            });
        }

        let (mr, nr) = (self.mr(), self.nr());
        let IgemmCall {
            m,
            n,
            indirection,
            weights,
            output,
            cm_stride,
            cn_stride,
            min,
            max,
        } = call;
        let k = indirection.k();
        let ks = indirection.ks();

        if m == 0 || m > mr {
            return Err(shape_error(format!("m must be in 1..={mr}, got {m}")));
        }
        if n == 0 || k == 0 {
            return Err(shape_error(format!(
                "n and k must be positive (n={n}, k={k})"
            )));
        }
        if min.is_nan() || max.is_nan() || min > max {
            return Err(shape_error(format!("invalid clamp range [{min}, {max}]")));
        }
        if indirection.mr() != mr || indirection.len() != mr * ks {
            return Err(shape_error(format!(
                "indirection built for mr={} with {} entries, kernel needs mr={mr}",
                indirection.mr(),
                indirection.len()
            )));
        }

        let packing = self.packing()?;
        if weights.config() != packing {
            return Err(packing_error(format!(
                "weights packed as {:?}, kernel {} expects {:?}",
                weights.config(),
                self.name(),
                packing
            )));
        }
        if weights.k() != k || weights.ks() != ks || weights.n() < n {
            return Err(packing_error(format!(
                "weights packed for n={} k={} ks={}, call needs n={n} k={k} ks={ks}",
                weights.n(),
                weights.k(),
                weights.ks()
            )));
        }

        ensure_len(
            "output",
            output_extent(m, n, nr, cm_stride, cn_stride),
            output.len(),
        )?;

        let params = (self.init_params())(min, max);
        let f32_size = std::mem::size_of::<f32>();

        // SAFETY: shapes, packing, indirection bounds and output extent were
        // all checked above; the ISA is supported by the running CPU.
        unsafe {
            (self.ukernel())(
                m,
                n,
                k * f32_size,
                ks * mr * PTR_SIZE,
                indirection.as_ptr(),
                weights.as_ptr(),
                output.as_mut_ptr(),
                cm_stride * f32_size,
                cn_stride * f32_size,
                indirection.a_offset() * f32_size,
                indirection.zero(),
                &params,
            );
        }
        Ok(())
    }
}

impl IgemmKernel for IgemmMicrokernel {
    fn name(&self) -> &str {
        self.name
    }

    fn isa(&self) -> Isa {
        self.isa
    }

    fn mr(&self) -> usize {
        self.mr
    }

    fn nr(&self) -> usize {
        self.nr
    }

    fn kr(&self) -> usize {
        self.kr
    }

    fn sr(&self) -> usize {
        self.sr
    }

    fn ukernel(&self) -> IgemmMinmaxUkernelFn {
        self.ukernel
    }

    fn init_params(&self) -> MinMaxParamsInitFn {
        self.init_params
    }
}

impl<T: IgemmKernel + ?Sized> IgemmKernel for &T {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn isa(&self) -> Isa {
        (**self).isa()
    }

    fn mr(&self) -> usize {
        (**self).mr()
    }

    fn nr(&self) -> usize {
        (**self).nr()
    }

    fn kr(&self) -> usize {
        (**self).kr()
    }

    fn sr(&self) -> usize {
        (**self).sr()
    }

    fn ukernel(&self) -> IgemmMinmaxUkernelFn {
        (**self).ukernel()
    }

    fn init_params(&self) -> MinMaxParamsInitFn {
        (**self).init_params()
    }
}

static MICROKERNELS: OnceLock<Vec<IgemmMicrokernel>> = OnceLock::new();

/// Every kernel variant compiled for this target, supported or not.
pub fn igemm_minmax_microkernels() -> &'static [IgemmMicrokernel] {
    MICROKERNELS.get_or_init(|| {
        let mut kernels = Vec::new();
        kernels.extend_from_slice(scalar::MICROKERNELS);
        #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
        {
            kernels.extend_from_slice(sse::MICROKERNELS);
            kernels.extend_from_slice(avx::MICROKERNELS);
        }
        #[cfg(all(avx512, any(target_arch = "x86", target_arch = "x86_64")))]
        kernels.extend_from_slice(avx512::MICROKERNELS);
        #[cfg(target_arch = "aarch64")]
        kernels.extend_from_slice(neon::MICROKERNELS);
        #[cfg(all(target_arch = "wasm32", target_feature = "simd128"))]
        kernels.extend_from_slice(wasmsimd::MICROKERNELS);

        log::debug!("registered {} igemm minmax microkernels", kernels.len());
        kernels
    })
}

/// Looks a kernel up by its exact name.
pub fn microkernel(name: &str) -> Option<&'static IgemmMicrokernel> {
    igemm_minmax_microkernels()
        .iter()
        .find(|kernel| kernel.name == name)
}

/// The preferred kernel for the running CPU: the most capable supported
/// ISA, then the largest tile.
pub fn best_microkernel() -> &'static IgemmMicrokernel {
    igemm_minmax_microkernels()
        .iter()
        .filter(|kernel| kernel.is_supported())
        .max_by_key(|kernel| (kernel.isa, kernel.mr * kernel.nr))
        .unwrap_or(&scalar::MICROKERNELS[0])
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_registry_names_are_unique() {
        let kernels = igemm_minmax_microkernels();
        let names: HashSet<_> = kernels.iter().map(|kernel| kernel.name).collect();
        assert_eq!(names.len(), kernels.len());
    }

    #[test]
    fn test_registry_shapes_are_packable() {
        for kernel in igemm_minmax_microkernels() {
            assert!(kernel.packing().is_ok(), "{}", kernel.name);
            assert!(kernel.mr >= 1 && kernel.nr >= 1, "{}", kernel.name);
            assert!(kernel.name.contains(kernel.isa.name()), "{}", kernel.name);
        }
    }

    #[test]
    fn test_best_microkernel_is_supported() {
        let best = best_microkernel();
        assert!(best.is_supported());
        assert!(igemm_minmax_microkernels()
            .iter()
            .filter(|kernel| kernel.is_supported())
            .all(|kernel| kernel.isa <= best.isa));
    }

    #[test]
    fn test_microkernel_lookup() {
        let first = &igemm_minmax_microkernels()[0];
        assert_eq!(microkernel(first.name).map(|k| k.name), Some(first.name));
        assert!(microkernel("no_such_kernel").is_none());
    }

    #[test]
    fn test_output_extent() {
        // 2 rows, 8 columns in blocks of 4 laid out contiguously
        assert_eq!(output_extent(2, 8, 4, 8, 4), 16);
        // single partial block
        assert_eq!(output_extent(1, 3, 4, 3, 4), 3);
        // padded column blocks: last block starts at 12 and holds 1 column
        assert_eq!(output_extent(1, 9, 4, 13, 6), 13);
        // column blocks that overlap: the first full block is the furthest
        assert_eq!(output_extent(1, 5, 4, 5, 0), 4);
    }
}
