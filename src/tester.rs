//! `GemmMicrokernelTester`: the fluent conformance harness for IGEMM kernels.
//!
//! A tester holds one shape configuration. Each call to
//! [`try_test_kernel`](GemmMicrokernelTester::try_test_kernel) runs
//! `iterations` rounds of:
//!
//! 1. random `A` rows, weights and bias, uniform in `[-1, 1)`
//! 2. packing for the kernel's `{nr, kr, sr}`
//! 3. a shuffled indirection table with the requested zero slot
//! 4. the `f64` reference and clamp bounds from `qmin`/`qmax`
//! 5. the kernel call into a NaN-filled output, with a zero row followed
//!    by `a_offset` NaN cells
//! 6. value, clamp and out-of-region checks
//!
//! The first failing check is returned as an [`IgemmError`].

use std::fmt;

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{shape_error, IgemmError, Result};
use crate::indirection::IndirectionBuffer;
use crate::isa::Isa;
use crate::packing::PackingConfig;
use crate::reference::{clamp_reference, IgemmReference};
use crate::simd::{
    output_extent, IgemmCall, IgemmKernel, IgemmMicrokernel, IgemmMinmaxUkernelFn,
    MinMaxParamsInitFn,
};
use crate::utils::{AlignedVec, KERNEL_ALIGNMENT};

/// Seed used when none is set, so failures reproduce run to run.
pub const DEFAULT_SEED: u64 = 0x1639_5eed;

/// What a test run concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestOutcome {
    Passed,
    /// The running CPU lacks the kernel's ISA; nothing was executed.
    Skipped { isa: Isa },
}

/// Summary of a passing or skipped run.
#[derive(Debug, Clone, PartialEq)]
pub struct TestReport {
    pub kernel: String,
    pub outcome: TestOutcome,
    pub iterations: usize,
    /// Output elements compared against the reference, over all iterations.
    pub checked: usize,
    /// Largest absolute difference to the clamped reference.
    pub max_abs_error: f64,
}

impl TestReport {
    pub fn passed(&self) -> bool {
        self.outcome == TestOutcome::Passed
    }

    pub fn skipped(&self) -> bool {
        matches!(self.outcome, TestOutcome::Skipped { .. })
    }
}

/// Fluent configuration of an IGEMM conformance test.
///
/// Strides are in elements. Unset strides default to the densest valid
/// layout: `a_stride = k`, `cn_stride = nr`, and `cm_stride` the extent of
/// one output row (`n` when `cn_stride = nr`).
#[derive(Debug, Clone, PartialEq)]
pub struct GemmMicrokernelTester {
    isa: Isa,
    mr: usize,
    nr: usize,
    kr: usize,
    sr: usize,
    m: usize,
    n: usize,
    k: usize,
    ks: usize,
    a_stride: Option<usize>,
    cm_stride: Option<usize>,
    cn_stride: Option<usize>,
    a_offset: usize,
    zero_index: Option<usize>,
    qmin: u8,
    qmax: u8,
    iterations: usize,
    seed: u64,
}

impl Default for GemmMicrokernelTester {
    fn default() -> Self {
        GemmMicrokernelTester {
            isa: Isa::Scalar,
            mr: 1,
            nr: 1,
            kr: 1,
            sr: 1,
            m: 1,
            n: 1,
            k: 1,
            ks: 1,
            a_stride: None,
            cm_stride: None,
            cn_stride: None,
            a_offset: 0,
            zero_index: None,
            qmin: 0,
            qmax: u8::MAX,
            iterations: 3,
            seed: DEFAULT_SEED,
        }
    }
}

impl GemmMicrokernelTester {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tester preset to `kernel`'s tile: `mr/nr/kr/sr`, with `m = mr` and
    /// `n = nr`.
    pub fn for_kernel<K: IgemmKernel + ?Sized>(kernel: &K) -> Self {
        Self::default()
            .isa(kernel.isa())
            .mr(kernel.mr())
            .nr(kernel.nr())
            .kr(kernel.kr())
            .sr(kernel.sr())
            .m(kernel.mr())
            .n(kernel.nr())
    }

    /// ISA a raw kernel passed to [`try_test`](Self::try_test) needs.
    /// Defaults to scalar.
    pub fn isa(mut self, isa: Isa) -> Self {
        self.isa = isa;
        self
    }

    pub fn mr(mut self, mr: usize) -> Self {
        self.mr = mr;
        self
    }

    pub fn nr(mut self, nr: usize) -> Self {
        self.nr = nr;
        self
    }

    pub fn kr(mut self, kr: usize) -> Self {
        self.kr = kr;
        self
    }

    pub fn sr(mut self, sr: usize) -> Self {
        self.sr = sr;
        self
    }

    pub fn m(mut self, m: usize) -> Self {
        self.m = m;
        self
    }

    pub fn n(mut self, n: usize) -> Self {
        self.n = n;
        self
    }

    pub fn k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn ks(mut self, ks: usize) -> Self {
        self.ks = ks;
        self
    }

    pub fn a_stride(mut self, a_stride: usize) -> Self {
        self.a_stride = Some(a_stride);
        self
    }

    pub fn cm_stride(mut self, cm_stride: usize) -> Self {
        self.cm_stride = Some(cm_stride);
        self
    }

    pub fn cn_stride(mut self, cn_stride: usize) -> Self {
        self.cn_stride = Some(cn_stride);
        self
    }

    /// Element offset every real indirection entry is shifted by.
    pub fn a_offset(mut self, a_offset: usize) -> Self {
        self.a_offset = a_offset;
        self
    }

    /// Slot that reads the zero row for every output row.
    pub fn zero_index(mut self, zero_index: usize) -> Self {
        self.zero_index = Some(zero_index);
        self
    }

    /// Lower clamp quantile over the reference output range; 0 disables it.
    pub fn qmin(mut self, qmin: u8) -> Self {
        self.qmin = qmin;
        self
    }

    /// Upper clamp quantile over the reference output range; 255 disables it.
    pub fn qmax(mut self, qmax: u8) -> Self {
        self.qmax = qmax;
        self
    }

    pub fn iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn effective_a_stride(&self) -> usize {
        self.a_stride.unwrap_or(self.k)
    }

    fn effective_cn_stride(&self) -> usize {
        self.cn_stride.unwrap_or(self.nr)
    }

    fn effective_cm_stride(&self) -> usize {
        self.cm_stride
            .unwrap_or_else(|| output_extent(1, self.n, self.nr, 0, self.effective_cn_stride()))
    }

    /// Runs the test with a raw kernel and this tester's `isa/mr/nr/kr/sr`.
    ///
    /// Returns a skipped report when the running CPU lacks `isa`.
    pub fn try_test(
        &self,
        ukernel: IgemmMinmaxUkernelFn,
        init_params: MinMaxParamsInitFn,
    ) -> Result<TestReport> {
        let kernel = IgemmMicrokernel {
            name: "custom",
            isa: self.isa,
            mr: self.mr,
            nr: self.nr,
            kr: self.kr,
            sr: self.sr,
            ukernel,
            init_params,
        };
        self.try_test_kernel(&kernel)
    }

    /// Runs the test against `kernel`. The tile shape (`mr/nr/kr/sr`) is
    /// taken from the kernel.
    ///
    /// Returns a skipped report when the running CPU lacks the kernel's ISA.
    pub fn try_test_kernel<K: IgemmKernel + ?Sized>(&self, kernel: &K) -> Result<TestReport> {
        if !kernel.is_supported() {
            log::warn!(
                "skipping {}: {} is not supported on this CPU",
                kernel.name(),
                kernel.isa()
            );
            return Ok(TestReport {
                kernel: kernel.name().to_string(),
                outcome: TestOutcome::Skipped { isa: kernel.isa() },
                iterations: 0,
                checked: 0,
                max_abs_error: 0.0,
            });
        }

        self.clone()
            .isa(kernel.isa())
            .mr(kernel.mr())
            .nr(kernel.nr())
            .kr(kernel.kr())
            .sr(kernel.sr())
            .run(kernel)
    }

    /// Like [`try_test`](Self::try_test) but panics with the diagnostic.
    pub fn test(&self, ukernel: IgemmMinmaxUkernelFn, init_params: MinMaxParamsInitFn) -> TestReport {
        match self.try_test(ukernel, init_params) {
            Ok(report) => report,
            Err(error) => panic!("{error}"),
        }
    }

    /// Like [`try_test_kernel`](Self::try_test_kernel) but panics with the
    /// diagnostic.
    pub fn test_kernel<K: IgemmKernel + ?Sized>(&self, kernel: &K) -> TestReport {
        match self.try_test_kernel(kernel) {
            Ok(report) => report,
            Err(error) => panic!("{}: {error}", kernel.name()),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.m == 0 || self.m > self.mr {
            return Err(shape_error(format!(
                "m must be in 1..={}, got {}",
                self.mr, self.m
            )));
        }
        if self.n == 0 || self.k == 0 || self.ks == 0 {
            return Err(shape_error(format!(
                "n, k and ks must be positive (n={}, k={}, ks={})",
                self.n, self.k, self.ks
            )));
        }
        if self.iterations == 0 {
            return Err(shape_error("iterations must be positive"));
        }
        if self.effective_a_stride() < self.k {
            return Err(shape_error(format!(
                "a_stride {} is shorter than k={}",
                self.effective_a_stride(),
                self.k
            )));
        }
        if self.effective_cn_stride() < self.nr {
            return Err(shape_error(format!(
                "cn_stride {} is narrower than nr={}",
                self.effective_cn_stride(),
                self.nr
            )));
        }
        let row_extent = output_extent(1, self.n, self.nr, 0, self.effective_cn_stride());
        if self.effective_cm_stride() < row_extent {
            return Err(shape_error(format!(
                "cm_stride {} overlaps rows that span {row_extent} elements",
                self.effective_cm_stride()
            )));
        }
        if let Some(zero_index) = self.zero_index {
            if zero_index >= self.ks {
                return Err(shape_error(format!(
                    "zero_index {zero_index} is not a slot of ks={}",
                    self.ks
                )));
            }
        }
        if self.qmin >= self.qmax {
            return Err(shape_error(format!(
                "qmin {} must be below qmax {}",
                self.qmin, self.qmax
            )));
        }
        Ok(())
    }

    /// Clamp bounds from the quantiles over the unclamped reference range.
    fn clamp_bounds(&self, acc: &Array2<f64>) -> (f32, f32) {
        let lo = acc.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = acc.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let step = (hi - lo) / 255.0;

        let min = if self.qmin == 0 {
            f32::NEG_INFINITY
        } else {
            (lo + step * self.qmin as f64) as f32
        };
        let max = if self.qmax == u8::MAX {
            f32::INFINITY
        } else {
            (hi - step * (u8::MAX - self.qmax) as f64) as f32
        };
        (min, max.max(min))
    }

    fn context(&self, kernel: &str, iteration: usize) -> String {
        format!("{kernel}: {self} iteration={iteration}")
    }

    fn run<K: IgemmKernel + ?Sized>(&self, kernel: &K) -> Result<TestReport> {
        self.validate()?;

        let GemmMicrokernelTester {
            mr,
            nr,
            m,
            n,
            k,
            ks,
            a_offset,
            zero_index,
            ..
        } = *self;
        let a_stride = self.effective_a_stride();
        let cm_stride = self.effective_cm_stride();
        let cn_stride = self.effective_cn_stride();
        let packing = PackingConfig::new(nr, self.kr, self.sr)?;

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut report = TestReport {
            kernel: kernel.name().to_string(),
            outcome: TestOutcome::Passed,
            iterations: self.iterations,
            checked: 0,
            max_abs_error: 0.0,
        };

        let input_len = a_offset + (ks * mr - 1) * a_stride + k;
        let extent = output_extent(m, n, nr, cm_stride, cn_stride);
        // trailing guard cells catch full-width stores of partial blocks
        let output_len = extent + nr;

        for iteration in 0..self.iterations {
            log::trace!("{}", self.context(kernel.name(), iteration));

            let input: Vec<f32> = (0..input_len).map(|_| rng.random_range(-1.0..1.0)).collect();
            let weights: Vec<f32> = (0..ks * k * n).map(|_| rng.random_range(-1.0..1.0)).collect();
            let bias: Vec<f32> = (0..n).map(|_| rng.random_range(-1.0..1.0)).collect();
            // reads of the zero row shifted by a_offset land on NaN
            let zero: Vec<f32> = (0..k + a_offset)
                .map(|l| if l < k { 0.0 } else { f32::NAN })
                .collect();

            let indirection = IndirectionBuffer::builder(mr, ks)
                .m(m)
                .a_stride(a_stride)
                .zero_index(zero_index)
                .build_shuffled(&mut rng)?;
            let packed = packing.pack_igemm_weights(n, k, ks, &weights, Some(&bias))?;

            let acc = IgemmReference {
                m,
                n,
                k,
                indirection: &indirection,
                input: &input,
                a_offset,
                weights: &weights,
                bias: &bias,
            }
            .accumulate()?;
            let (min, max) = self.clamp_bounds(&acc);
            let mut expected = acc.clone();
            clamp_reference(&mut expected, min, max);

            let resolved = indirection.resolve(&input, &zero, k, a_offset)?;
            let mut output = AlignedVec::from_elem(f32::NAN, output_len, KERNEL_ALIGNMENT)?;
            kernel.compute(IgemmCall {
                m,
                n,
                indirection: &resolved,
                weights: &packed,
                output: &mut output,
                cm_stride,
                cn_stride,
                min,
                max,
            })?;

            let context = || self.context(kernel.name(), iteration);
            let tolerance_base = f64::max(1e-5, (k * ks) as f64 * f32::EPSILON as f64);
            let mut addressed = vec![false; output_len];

            for i in 0..m {
                for j in 0..n {
                    let index = i * cm_stride + (j / nr) * cn_stride + j % nr;
                    addressed[index] = true;

                    let actual = output[index];
                    let want = expected[[i, j]];
                    let tolerance = tolerance_base * want.abs().max(1.0);
                    let error = (actual as f64 - want).abs();

                    let mismatch = || IgemmError::Mismatch {
                        row: i,
                        col: j,
                        actual,
                        expected: want,
                        tolerance,
                        context: context(),
                    };
                    let clamp_violation = || IgemmError::ClampViolation {
                        row: i,
                        col: j,
                        actual,
                        min,
                        max,
                        context: context(),
                    };

                    if actual.is_nan() {
                        return Err(mismatch());
                    }
                    if actual < min || actual > max {
                        return Err(clamp_violation());
                    }
                    if error > tolerance {
                        return Err(mismatch());
                    }
                    let unclamped = acc[[i, j]];
                    let misses_max = unclamped > max as f64 + tolerance && actual != max;
                    let misses_min = unclamped < min as f64 - tolerance && actual != min;
                    if misses_max || misses_min {
                        return Err(clamp_violation());
                    }
                    report.max_abs_error = report.max_abs_error.max(error);
                }
            }
            report.checked += m * n;

            if let Some(index) = output
                .iter()
                .zip(addressed.iter())
                .position(|(value, &addressed)| !addressed && !value.is_nan())
            {
                return Err(IgemmError::OutOfRegionWrite {
                    index,
                    value: output[index],
                    context: context(),
                });
            }
        }

        Ok(report)
    }
}

impl fmt::Display for GemmMicrokernelTester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "isa={} mr={} nr={} kr={} sr={} m={} n={} k={} ks={} a_stride={} cm_stride={} cn_stride={} a_offset={} zero_index={:?} qmin={} qmax={} seed={:#x}",
            self.isa,
            self.mr,
            self.nr,
            self.kr,
            self.sr,
            self.m,
            self.n,
            self.k,
            self.ks,
            self.effective_a_stride(),
            self.effective_cm_stride(),
            self.effective_cn_stride(),
            self.a_offset,
            self.zero_index,
            self.qmin,
            self.qmax,
            self.seed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simd::params::init_scalar_params;
    use crate::simd::scalar::igemm_scalar;

    #[test]
    fn test_defaults() {
        let tester = GemmMicrokernelTester::new().k(5).nr(4).n(6);
        assert_eq!(tester.effective_a_stride(), 5);
        assert_eq!(tester.effective_cn_stride(), 4);
        assert_eq!(tester.effective_cm_stride(), 6);
        assert_eq!(tester.iterations, 3);
        assert_eq!((tester.qmin, tester.qmax), (0, 255));
        assert_eq!(tester.isa, Isa::Scalar);
    }

    #[test]
    fn test_padded_cn_stride_widens_default_cm_stride() {
        let tester = GemmMicrokernelTester::new().nr(4).n(6).cn_stride(7);
        // second block starts at 7 and holds 2 columns
        assert_eq!(tester.effective_cm_stride(), 9);
    }

    #[test]
    fn test_validation() {
        let base = GemmMicrokernelTester::new().mr(2).nr(4).m(2).n(4).k(3);
        assert!(base.validate().is_ok());
        assert!(base.clone().m(3).validate().is_err());
        assert!(base.clone().k(0).validate().is_err());
        assert!(base.clone().a_stride(2).validate().is_err());
        assert!(base.clone().cn_stride(3).validate().is_err());
        assert!(base.clone().cm_stride(3).validate().is_err());
        assert!(base.clone().ks(2).zero_index(2).validate().is_err());
        assert!(base.clone().qmin(200).qmax(100).validate().is_err());
        assert!(base.iterations(0).validate().is_err());
    }

    #[test]
    fn test_clamp_bounds_from_quantiles() {
        let acc = Array2::from_shape_vec((1, 2), vec![0.0, 255.0]).unwrap();
        let full = GemmMicrokernelTester::new();
        assert_eq!(full.clamp_bounds(&acc), (f32::NEG_INFINITY, f32::INFINITY));

        let (min, max) = GemmMicrokernelTester::new().qmin(128).clamp_bounds(&acc);
        assert_eq!((min, max), (128.0, f32::INFINITY));
        let (min, max) = GemmMicrokernelTester::new().qmax(128).clamp_bounds(&acc);
        assert_eq!((min, max), (f32::NEG_INFINITY, 128.0));
    }

    #[test]
    fn test_scalar_kernel_passes() {
        let report = GemmMicrokernelTester::new()
            .mr(2)
            .nr(4)
            .m(2)
            .n(7)
            .k(5)
            .ks(3)
            .zero_index(1)
            .a_offset(11)
            .test(igemm_scalar::<2, 4, 1, 1>, init_scalar_params);
        assert!(report.passed());
        assert_eq!(report.checked, 3 * 2 * 7);
    }

    #[test]
    fn test_context_names_configuration() {
        let tester = GemmMicrokernelTester::new().k(9).ks(2).zero_index(1);
        let context = tester.context("kernel", 2);
        assert!(context.contains("k=9"));
        assert!(context.contains("ks=2"));
        assert!(context.contains("zero_index=Some(1)"));
        assert!(context.contains("iteration=2"));
    }
}
