//! Full-problem IGEMM over many `mr`-row tiles.
//!
//! A convolution lowered to IGEMM has `M` output pixels, each reading `ks`
//! input rows (one per kernel tap). The driver splits the `M` rows into tiles
//! of the kernel's `mr`, builds each tile's indirection table and calls the
//! kernel once per tile over all `n` columns.
//!
//! Parallelism strategy for [`IgemmTiledProblem::par_run`]:
//! - The output is split into disjoint blocks of `mr` rows with
//!   `par_chunks_mut`, one rayon task per block.
//! - Each task owns its block exclusively and shares only read-only inputs.

use rayon::{
    iter::{IndexedParallelIterator, IntoParallelRefIterator, ParallelIterator},
    slice::ParallelSliceMut,
};

use crate::error::{ensure_len, shape_error, Result};
use crate::indirection::{IndirectionBuffer, IndirectionSlot};
use crate::packing::PackedWeights;
use crate::simd::{IgemmCall, IgemmKernel};

/// One IGEMM problem: `m` rows, `ks` slots per row, packed weights for
/// `n` columns.
///
/// `row_slots[row * ks + s]` is the input row tap `s` of output `row` reads.
#[derive(Debug)]
pub struct IgemmTiledProblem<'a, K: IgemmKernel + ?Sized> {
    kernel: &'a K,
    m: usize,
    row_slots: Vec<IndirectionSlot>,
    weights: &'a PackedWeights,
    input: &'a [f32],
    zero: &'a [f32],
    a_offset: usize,
    min: f32,
    max: f32,
}

impl<'a, K: IgemmKernel + ?Sized> IgemmTiledProblem<'a, K> {
    /// Creates an unclamped problem with `a_offset = 0`.
    pub fn new(
        kernel: &'a K,
        m: usize,
        row_slots: Vec<IndirectionSlot>,
        weights: &'a PackedWeights,
        input: &'a [f32],
        zero: &'a [f32],
    ) -> Result<Self> {
        if m == 0 {
            return Err(shape_error("problem needs at least one row"));
        }
        if row_slots.len() != m * weights.ks() {
            return Err(shape_error(format!(
                "{} row slots for m={m} rows of ks={} taps",
                row_slots.len(),
                weights.ks()
            )));
        }
        Ok(IgemmTiledProblem {
            kernel,
            m,
            row_slots,
            weights,
            input,
            zero,
            a_offset: 0,
            min: f32::NEG_INFINITY,
            max: f32::INFINITY,
        })
    }

    pub fn a_offset(mut self, a_offset: usize) -> Self {
        self.a_offset = a_offset;
        self
    }

    pub fn clamp(mut self, min: f32, max: f32) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn m(&self) -> usize {
        self.m
    }

    pub fn n(&self) -> usize {
        self.weights.n()
    }

    /// Number of `mr`-row tiles.
    pub fn tile_count(&self) -> usize {
        self.m.div_ceil(self.kernel.mr())
    }

    /// Indirection tables, one per tile, padded with zero rows past `m`.
    pub fn tiles(&self) -> Result<Vec<IndirectionBuffer>> {
        let mr = self.kernel.mr();
        let ks = self.weights.ks();
        (0..self.tile_count())
            .map(|tile| {
                let mut slots = Vec::with_capacity(mr * ks);
                for s in 0..ks {
                    for i in 0..mr {
                        let row = tile * mr + i;
                        slots.push(if row < self.m {
                            self.row_slots[row * ks + s]
                        } else {
                            IndirectionSlot::Zero
                        });
                    }
                }
                IndirectionBuffer::from_slots(mr, ks, slots)
            })
            .collect()
    }

    fn check_output(&self, output: &[f32], cm_stride: usize) -> Result<()> {
        let n = self.n();
        if cm_stride < n {
            return Err(shape_error(format!(
                "cm_stride {cm_stride} is narrower than n={n}"
            )));
        }
        ensure_len("output", (self.m - 1) * cm_stride + n, output.len())
    }

    fn run_tile(&self, tile: usize, table: &IndirectionBuffer, chunk: &mut [f32], cm_stride: usize) -> Result<()> {
        let mr = self.kernel.mr();
        let rows = (self.m - tile * mr).min(mr);
        let resolved = table.resolve(self.input, self.zero, self.weights.k(), self.a_offset)?;
        self.kernel.compute(IgemmCall {
            m: rows,
            n: self.n(),
            indirection: &resolved,
            weights: self.weights,
            output: chunk,
            cm_stride,
            cn_stride: self.kernel.nr(),
            min: self.min,
            max: self.max,
        })
    }

    /// Computes every tile on the calling thread. `output` is row-major with
    /// `cm_stride` elements per row.
    pub fn run(&self, output: &mut [f32], cm_stride: usize) -> Result<()> {
        self.check_output(output, cm_stride)?;
        let tiles = self.tiles()?;
        let block = self.kernel.mr() * cm_stride;

        for (tile, (chunk, table)) in output.chunks_mut(block).zip(tiles.iter()).enumerate() {
            self.run_tile(tile, table, chunk, cm_stride)?;
        }
        Ok(())
    }
}

impl<K: IgemmKernel + Sync + ?Sized> IgemmTiledProblem<'_, K> {
    /// Computes the tiles in parallel, one rayon task per `mr`-row block.
    pub fn par_run(&self, output: &mut [f32], cm_stride: usize) -> Result<()> {
        self.check_output(output, cm_stride)?;
        let tiles = self.tiles()?;
        let block = self.kernel.mr() * cm_stride;
        log::debug!(
            "{}: {} tiles of {} rows in parallel",
            self.kernel.name(),
            tiles.len(),
            self.kernel.mr()
        );

        output
            .par_chunks_mut(block)
            .zip(tiles.par_iter())
            .enumerate()
            .try_for_each(|(tile, (chunk, table))| self.run_tile(tile, table, chunk, cm_stride))
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::packing::PackingConfig;
    use crate::reference::IgemmReference;
    use crate::simd::scalar;

    // m rows, each tap s of row r reads input row (r * ks + s)
    fn problem_inputs(m: usize, n: usize, k: usize, ks: usize) -> (Vec<f32>, Vec<f32>, Vec<f32>) {
        let mut rng = StdRng::seed_from_u64(42);
        let input = (0..m * ks * k).map(|_| rng.random_range(-1.0..1.0)).collect();
        let weights = (0..ks * k * n).map(|_| rng.random_range(-1.0..1.0)).collect();
        let bias = (0..n).map(|_| rng.random_range(-1.0..1.0)).collect();
        (input, weights, bias)
    }

    fn expected(
        m: usize,
        n: usize,
        k: usize,
        ks: usize,
        input: &[f32],
        weights: &[f32],
        bias: &[f32],
    ) -> Vec<f64> {
        let mut out = Vec::with_capacity(m * n);
        for row in 0..m {
            let slots = (0..ks)
                .map(|s| IndirectionSlot::Row((row * ks + s) * k))
                .collect();
            let table = IndirectionBuffer::from_slots(1, ks, slots).unwrap();
            let acc = IgemmReference {
                m: 1,
                n,
                k,
                indirection: &table,
                input,
                a_offset: 0,
                weights,
                bias,
            }
            .accumulate()
            .unwrap();
            out.extend(acc.iter().copied());
        }
        out
    }

    #[test]
    fn test_run_and_par_run_match_reference() {
        let (m, n, k, ks) = (11, 6, 5, 2);
        let kernel = &scalar::MICROKERNELS[3]; // 4x4
        let (input, weights, bias) = problem_inputs(m, n, k, ks);
        let zero = vec![0.0f32; k];
        let packed = PackingConfig::new(kernel.nr, kernel.kr, kernel.sr)
            .unwrap()
            .pack_igemm_weights(n, k, ks, &weights, Some(&bias))
            .unwrap();
        let row_slots: Vec<IndirectionSlot> = (0..m * ks)
            .map(|r| IndirectionSlot::Row(r * k))
            .collect();

        let problem = IgemmTiledProblem::new(kernel, m, row_slots, &packed, &input, &zero).unwrap();
        assert_eq!(problem.tile_count(), 3);

        let want = expected(m, n, k, ks, &input, &weights, &bias);
        let cm_stride = n + 1;

        let mut sequential = vec![f32::NAN; (m - 1) * cm_stride + n];
        problem.run(&mut sequential, cm_stride).unwrap();
        let mut parallel = vec![f32::NAN; (m - 1) * cm_stride + n];
        problem.par_run(&mut parallel, cm_stride).unwrap();

        for row in 0..m {
            for col in 0..n {
                let got = sequential[row * cm_stride + col];
                let reference = want[row * n + col];
                assert!(
                    (got as f64 - reference).abs() < 1e-5 * reference.abs().max(1.0),
                    "({row}, {col}): {got} vs {reference}"
                );
            }
        }
        assert_eq!(
            sequential.iter().map(|x| x.to_bits()).collect::<Vec<_>>(),
            parallel.iter().map(|x| x.to_bits()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_tiles_pad_last_block() {
        let kernel = &scalar::MICROKERNELS[3];
        let packed = PackingConfig::new(4, 1, 1)
            .unwrap()
            .pack_igemm_weights(4, 1, 1, &[0.0; 4], None)
            .unwrap();
        let input = [0.0f32; 5];
        let zero = [0.0f32; 1];
        let row_slots = (0..5).map(IndirectionSlot::Row).collect();
        let problem = IgemmTiledProblem::new(kernel, 5, row_slots, &packed, &input, &zero).unwrap();

        let tiles = problem.tiles().unwrap();
        assert_eq!(tiles.len(), 2);
        assert_eq!(tiles[1].slot(0, 0), IndirectionSlot::Row(4));
        assert_eq!(tiles[1].slot(1, 0), IndirectionSlot::Zero);
    }

    #[test]
    fn test_rejects_bad_shapes() {
        let kernel = &scalar::MICROKERNELS[3];
        let packed = PackingConfig::new(4, 1, 1)
            .unwrap()
            .pack_igemm_weights(4, 1, 1, &[0.0; 4], None)
            .unwrap();
        let input = [0.0f32; 4];
        let zero = [0.0f32; 1];

        assert!(IgemmTiledProblem::new(kernel, 4, vec![IndirectionSlot::Zero; 3], &packed, &input, &zero).is_err());

        let problem = IgemmTiledProblem::new(kernel, 4, vec![IndirectionSlot::Zero; 4], &packed, &input, &zero).unwrap();
        let mut short = vec![0.0f32; 10];
        assert!(problem.run(&mut short, 4).is_err());
        assert!(problem.run(&mut vec![0.0f32; 16], 3).is_err());
    }
}
