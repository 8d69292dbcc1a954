//! Edge-case categories every kernel variant is swept through.
//!
//! Each [`EdgeCase`] expands, for a given kernel, into a list of concrete
//! [`GemmMicrokernelTester`] configurations. The reduction block is
//! `kblock = kr * sr`: the number of `k` elements one packed step covers.

use std::fmt;

use crate::error::Result;
use crate::simd::IgemmKernel;
use crate::tester::{GemmMicrokernelTester, TestOutcome};

/// Smallest prime `>= n`.
pub fn next_prime(n: usize) -> usize {
    fn is_prime(p: usize) -> bool {
        p >= 2 && (2..).take_while(|d| d * d <= p).all(|d| p % d != 0)
    }
    (n.max(2)..)
        .find(|&p| is_prime(p))
        .unwrap_or(n)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeCase {
    KEqKblock,
    StridedCn,
    KEqKblockSubtile,
    SubtileM,
    SubtileN,
    KLtKblock,
    KLtKblockSubtile,
    KGtKblock,
    KGtKblockSubtile,
    KDivKblock,
    KDivKblockSubtile,
    NGtNr,
    NGtNrStridedCn,
    NGtNrSubtile,
    NDivNr,
    NDivNrStridedCn,
    NDivNrSubtile,
    SmallKernel,
    SmallKernelSubtile,
    NGtNrSmallKernel,
    NDivNrSmallKernel,
    StridedCmSubtile,
    AOffset,
    Zero,
    Qmin,
    Qmax,
    StridedCm,
}

/// Slots per output row in the `small_kernel`, `a_offset` and `zero` cases.
const SMALL_KS: usize = 3;

impl EdgeCase {
    pub const ALL: [EdgeCase; 27] = [
        EdgeCase::KEqKblock,
        EdgeCase::StridedCn,
        EdgeCase::KEqKblockSubtile,
        EdgeCase::SubtileM,
        EdgeCase::SubtileN,
        EdgeCase::KLtKblock,
        EdgeCase::KLtKblockSubtile,
        EdgeCase::KGtKblock,
        EdgeCase::KGtKblockSubtile,
        EdgeCase::KDivKblock,
        EdgeCase::KDivKblockSubtile,
        EdgeCase::NGtNr,
        EdgeCase::NGtNrStridedCn,
        EdgeCase::NGtNrSubtile,
        EdgeCase::NDivNr,
        EdgeCase::NDivNrStridedCn,
        EdgeCase::NDivNrSubtile,
        EdgeCase::SmallKernel,
        EdgeCase::SmallKernelSubtile,
        EdgeCase::NGtNrSmallKernel,
        EdgeCase::NDivNrSmallKernel,
        EdgeCase::StridedCmSubtile,
        EdgeCase::AOffset,
        EdgeCase::Zero,
        EdgeCase::Qmin,
        EdgeCase::Qmax,
        EdgeCase::StridedCm,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EdgeCase::KEqKblock => "k_eq_kblock",
            EdgeCase::StridedCn => "strided_cn",
            EdgeCase::KEqKblockSubtile => "k_eq_kblock_subtile",
            EdgeCase::SubtileM => "k_eq_kblock_subtile_m",
            EdgeCase::SubtileN => "k_eq_kblock_subtile_n",
            EdgeCase::KLtKblock => "k_lt_kblock",
            EdgeCase::KLtKblockSubtile => "k_lt_kblock_subtile",
            EdgeCase::KGtKblock => "k_gt_kblock",
            EdgeCase::KGtKblockSubtile => "k_gt_kblock_subtile",
            EdgeCase::KDivKblock => "k_div_kblock",
            EdgeCase::KDivKblockSubtile => "k_div_kblock_subtile",
            EdgeCase::NGtNr => "n_gt_nr",
            EdgeCase::NGtNrStridedCn => "n_gt_nr_strided_cn",
            EdgeCase::NGtNrSubtile => "n_gt_nr_subtile",
            EdgeCase::NDivNr => "n_div_nr",
            EdgeCase::NDivNrStridedCn => "n_div_nr_strided_cn",
            EdgeCase::NDivNrSubtile => "n_div_nr_subtile",
            EdgeCase::SmallKernel => "small_kernel",
            EdgeCase::SmallKernelSubtile => "small_kernel_subtile",
            EdgeCase::NGtNrSmallKernel => "n_gt_nr_small_kernel",
            EdgeCase::NDivNrSmallKernel => "n_div_nr_small_kernel",
            EdgeCase::StridedCmSubtile => "strided_cm_subtile",
            EdgeCase::AOffset => "a_offset",
            EdgeCase::Zero => "zero",
            EdgeCase::Qmin => "qmin",
            EdgeCase::Qmax => "qmax",
            EdgeCase::StridedCm => "strided_cm",
        }
    }

    /// Concrete tester configurations this case expands to for `kernel`.
    ///
    /// May be empty: `k_lt_kblock` has nothing to test when `kblock == 1`.
    pub fn configurations<K: IgemmKernel + ?Sized>(self, kernel: &K) -> Vec<GemmMicrokernelTester> {
        let (mr, nr) = (kernel.mr(), kernel.nr());
        let kblock = kernel.kr() * kernel.sr();
        let base = GemmMicrokernelTester::for_kernel(kernel);
        let padded_stride = next_prime(nr + 1);

        // k values that straddle several blocks
        let k_sweep: Vec<usize> = (1..=kblock * 5).step_by(kblock + 1).collect();
        let k_gt: Vec<usize> = if kblock == 1 {
            (2..10).collect()
        } else {
            (kblock + 1..2 * kblock).collect()
        };
        let k_div: Vec<usize> = (2 * kblock..=10 * kblock).step_by(kblock).collect();
        let n_gt: Vec<usize> = (nr + 1..2 * nr).collect();
        let n_div: Vec<usize> = (2 * nr..=3 * nr).step_by(nr).collect();

        let subtiles = |tester: GemmMicrokernelTester| -> Vec<GemmMicrokernelTester> {
            (1..=mr)
                .flat_map(|m| (1..=nr).map(move |n| (m, n)))
                .map(|(m, n)| tester.clone().m(m).n(n).iterations(1))
                .collect()
        };
        let rows = |tester: GemmMicrokernelTester| -> Vec<GemmMicrokernelTester> {
            (1..=mr)
                .map(|m| tester.clone().m(m).iterations(1))
                .collect()
        };

        match self {
            EdgeCase::KEqKblock => vec![base.k(kblock)],
            EdgeCase::StridedCn => vec![base.k(kblock).cn_stride(padded_stride)],
            EdgeCase::KEqKblockSubtile => subtiles(base.k(kblock)),
            EdgeCase::SubtileM => rows(base.k(kblock)),
            EdgeCase::SubtileN => (1..=nr)
                .map(|n| base.clone().k(kblock).n(n).iterations(1))
                .collect(),
            EdgeCase::KLtKblock => (1..kblock).map(|k| base.clone().k(k)).collect(),
            EdgeCase::KLtKblockSubtile => (1..kblock)
                .flat_map(|k| subtiles(base.clone().k(k)))
                .collect(),
            EdgeCase::KGtKblock => k_gt.iter().map(|&k| base.clone().k(k)).collect(),
            EdgeCase::KGtKblockSubtile => k_gt
                .iter()
                .flat_map(|&k| subtiles(base.clone().k(k)))
                .collect(),
            EdgeCase::KDivKblock => k_div.iter().map(|&k| base.clone().k(k)).collect(),
            EdgeCase::KDivKblockSubtile => k_div
                .iter()
                .flat_map(|&k| rows(base.clone().k(k)))
                .collect(),
            EdgeCase::NGtNr => cross(&n_gt, &k_sweep, |n, k| base.clone().n(n).k(k)),
            EdgeCase::NGtNrStridedCn => cross(&n_gt, &k_sweep, |n, k| {
                base.clone().n(n).k(k).cn_stride(padded_stride)
            }),
            EdgeCase::NGtNrSubtile => cross(&n_gt, &k_sweep, |n, k| base.clone().n(n).k(k))
                .into_iter()
                .flat_map(rows)
                .collect(),
            EdgeCase::NDivNr => cross(&n_div, &k_sweep, |n, k| base.clone().n(n).k(k)),
            EdgeCase::NDivNrStridedCn => cross(&n_div, &k_sweep, |n, k| {
                base.clone().n(n).k(k).cn_stride(padded_stride)
            }),
            EdgeCase::NDivNrSubtile => cross(&n_div, &k_sweep, |n, k| base.clone().n(n).k(k))
                .into_iter()
                .flat_map(rows)
                .collect(),
            EdgeCase::SmallKernel => k_sweep
                .iter()
                .map(|&k| base.clone().k(k).ks(SMALL_KS))
                .collect(),
            EdgeCase::SmallKernelSubtile => k_sweep
                .iter()
                .flat_map(|&k| subtiles(base.clone().k(k).ks(SMALL_KS)))
                .collect(),
            EdgeCase::NGtNrSmallKernel => cross(&n_gt, &k_sweep, |n, k| {
                base.clone().n(n).k(k).ks(SMALL_KS)
            }),
            EdgeCase::NDivNrSmallKernel => cross(&n_div, &k_sweep, |n, k| {
                base.clone().n(n).k(k).ks(SMALL_KS)
            }),
            EdgeCase::StridedCmSubtile => k_sweep
                .iter()
                .flat_map(|&k| subtiles(base.clone().k(k).cm_stride(padded_stride)))
                .collect(),
            EdgeCase::AOffset => k_sweep
                .iter()
                .map(|&k| {
                    base.clone()
                        .k(k)
                        .ks(SMALL_KS)
                        .a_offset(next_prime(mr * k * SMALL_KS + 1))
                })
                .collect(),
            EdgeCase::Zero => (0..SMALL_KS)
                .flat_map(|zero_index| {
                    k_sweep.iter().map(move |&k| (zero_index, k))
                })
                .map(|(zero_index, k)| {
                    base.clone()
                        .k(k)
                        .ks(SMALL_KS)
                        .a_offset(next_prime(mr * k * SMALL_KS + 1))
                        .zero_index(zero_index)
                })
                .collect(),
            EdgeCase::Qmin => vec![base.k(kblock).qmin(128)],
            EdgeCase::Qmax => vec![base.k(kblock).qmax(128)],
            EdgeCase::StridedCm => vec![base.k(kblock).cm_stride(padded_stride)],
        }
    }

    /// Runs every configuration of this case against `kernel`, stopping at
    /// the first failure. Unsupported kernels are skipped, not failed.
    pub fn run<K: IgemmKernel + ?Sized>(self, kernel: &K) -> Result<TestOutcome> {
        self.run_with(kernel, |tester| tester)
    }

    /// Like [`run`](Self::run), with `adjust` applied to every configuration
    /// (to override the seed or iteration count, for instance).
    pub fn run_with<K, F>(self, kernel: &K, adjust: F) -> Result<TestOutcome>
    where
        K: IgemmKernel + ?Sized,
        F: Fn(GemmMicrokernelTester) -> GemmMicrokernelTester,
    {
        if !kernel.is_supported() {
            log::warn!(
                "skipping {} for {}: {} is not supported on this CPU",
                self,
                kernel.name(),
                kernel.isa()
            );
            return Ok(TestOutcome::Skipped { isa: kernel.isa() });
        }

        let configurations = self.configurations(kernel);
        log::debug!(
            "{} {}: {} configurations",
            kernel.name(),
            self,
            configurations.len()
        );
        for tester in configurations {
            adjust(tester).try_test_kernel(kernel)?;
        }
        Ok(TestOutcome::Passed)
    }
}

fn cross<F>(ns: &[usize], ks: &[usize], make: F) -> Vec<GemmMicrokernelTester>
where
    F: Fn(usize, usize) -> GemmMicrokernelTester,
{
    ns.iter()
        .flat_map(|&n| ks.iter().map(move |&k| (n, k)))
        .map(|(n, k)| make(n, k))
        .collect()
}

impl fmt::Display for EdgeCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
