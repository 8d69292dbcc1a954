//! Packed-weight layout for IGEMM microkernels.
//!
//! A kernel streams its weights strictly sequentially, so the packer lays
//! them out in exactly the order the inner loop consumes them:
//!
//! ```text
//! for each block of nr output columns:
//!     nr bias values                        (zero past n)
//!     for each indirection slot s in 0..ks:
//!         for each kr step kb in 0..packed_k:
//!             for each column j in 0..nr:
//!                 kr weights B[s*k + kc_idx(kb, t, j)][col]   for t in 0..kr
//! ```
//!
//! With `skr = kr * sr`, the reduction index of lane `t` of column `j` is
//!
//! ```text
//! kc_idx = round_down(kb, skr) + ((kb + t + j * kr) mod skr)
//! ```
//!
//! For `sr = 1` this is the plain `kb + t`. For `sr > 1` consecutive columns
//! see the reduction indices of a `skr` group rotated by one `kr` step, which
//! lets kernels rotate their `A` register instead of broadcasting. Indices
//! `>= k` are left zero.
//!
//! The layout is data (`PackingConfig`), not a per-kernel function: every
//! variant packs through [`PackingConfig::pack_igemm_weights`] with its own
//! `{nr, kr, sr}`, so a test and a kernel cannot silently disagree.

use crate::error::{ensure_len, packing_error, Result};
use crate::utils::{round_down_po2, round_up, AlignedVec, KERNEL_ALIGNMENT};

/// Tile-shape descriptor that fully determines the packed weight layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PackingConfig {
    nr: usize,
    kr: usize,
    sr: usize,
}

impl PackingConfig {
    /// Validates and creates a packing descriptor.
    ///
    /// # Errors
    ///
    /// `nr` and `kr` must be positive and `sr` must be a power of two.
    pub fn new(nr: usize, kr: usize, sr: usize) -> Result<Self> {
        if nr == 0 {
            return Err(packing_error("nr must be positive"));
        }
        if kr == 0 {
            return Err(packing_error("kr must be positive"));
        }
        if !sr.is_power_of_two() {
            return Err(packing_error(format!("sr must be a power of two, got {sr}")));
        }
        if !(kr * sr).is_power_of_two() {
            return Err(packing_error(format!(
                "kr * sr must be a power of two, got {kr} * {sr}"
            )));
        }
        Ok(PackingConfig { nr, kr, sr })
    }

    pub fn nr(&self) -> usize {
        self.nr
    }

    pub fn kr(&self) -> usize {
        self.kr
    }

    pub fn sr(&self) -> usize {
        self.sr
    }

    /// Reduction length after padding to a whole `kr * sr` group.
    pub fn packed_k(&self, k: usize) -> usize {
        round_up(k, self.kr * self.sr)
    }

    /// Column count after padding to a whole `nr` block.
    pub fn packed_n(&self, n: usize) -> usize {
        round_up(n, self.nr)
    }

    /// Elements in one `nr` column block: bias plus `ks` reduction panels.
    pub fn block_len(&self, k: usize, ks: usize) -> usize {
        self.nr * (1 + ks * self.packed_k(k))
    }

    /// Total elements of the packed buffer.
    pub fn packed_len(&self, n: usize, k: usize, ks: usize) -> usize {
        self.packed_n(n) * (1 + ks * self.packed_k(k))
    }

    /// Packs logical weights and bias into the kernel layout.
    ///
    /// # Arguments
    ///
    /// * `n` - Output channels (columns of B)
    /// * `k` - Reduction length per indirection slot
    /// * `ks` - Indirection slots per output row
    /// * `weights` - Row-major `(ks * k) × n` matrix: element `(s * k + l, j)`
    ///   at `weights[(s * k + l) * n + j]`
    /// * `bias` - Per-column bias of length `n`, or `None` for zeros
    ///
    /// # Errors
    ///
    /// Returns an error if a dimension is zero or a slice is too short.
    pub fn pack_igemm_weights(
        &self,
        n: usize,
        k: usize,
        ks: usize,
        weights: &[f32],
        bias: Option<&[f32]>,
    ) -> Result<PackedWeights> {
        if n == 0 || k == 0 || ks == 0 {
            return Err(packing_error(format!(
                "n, k and ks must be positive (n={n}, k={k}, ks={ks})"
            )));
        }
        ensure_len("weights", ks * k * n, weights.len())?;
        if let Some(bias) = bias {
            ensure_len("bias", n, bias.len())?;
        }

        let mut data = AlignedVec::<f32>::new_zeroed(self.packed_len(n, k, ks), KERNEL_ALIGNMENT)?;
        self.pack_into(n, k, ks, weights, bias, &mut data);

        Ok(PackedWeights {
            data,
            config: *self,
            n,
            k,
            ks,
        })
    }

    // `packed` must be zeroed and exactly packed_len(n, k, ks) long.
    fn pack_into(
        &self,
        n: usize,
        k: usize,
        ks: usize,
        weights: &[f32],
        bias: Option<&[f32]>,
        packed: &mut [f32],
    ) {
        let (nr, kr) = (self.nr, self.kr);
        let skr = self.kr * self.sr;
        let packed_k = self.packed_k(k);
        let mut pos = 0;

        for nr_block_start in (0..n).step_by(nr) {
            let nr_block_size = nr.min(n - nr_block_start);

            if let Some(bias) = bias {
                packed[pos..pos + nr_block_size]
                    .copy_from_slice(&bias[nr_block_start..nr_block_start + nr_block_size]);
            }
            pos += nr;

            for s in 0..ks {
                for kr_block_start in (0..packed_k).step_by(kr) {
                    for j in 0..nr_block_size {
                        let col = nr_block_start + j;
                        for t in 0..kr {
                            let kc_idx = round_down_po2(kr_block_start, skr)
                                + ((kr_block_start + t + j * kr) & (skr - 1));
                            if kc_idx < k {
                                packed[pos + t] = weights[(s * k + kc_idx) * n + col];
                            }
                        }
                        pos += kr;
                    }
                    // padding columns of a partial block stay zero
                    pos += (nr - nr_block_size) * kr;
                }
            }
        }
        debug_assert_eq!(pos, packed.len());
    }
}

/// Weights and bias in a kernel's blocked layout.
#[derive(Debug)]
pub struct PackedWeights {
    data: AlignedVec<f32>,
    config: PackingConfig,
    n: usize,
    k: usize,
    ks: usize,
}

impl PackedWeights {
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_ptr(&self) -> *const f32 {
        self.data.as_ptr()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn config(&self) -> PackingConfig {
        self.config
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn ks(&self) -> usize {
        self.ks
    }

    /// The packed sub-buffer starting at the column block holding `col`.
    ///
    /// `col` must be a multiple of `nr`.
    pub fn column_block(&self, col: usize) -> &[f32] {
        debug_assert_eq!(col % self.config.nr, 0);
        let block = col / self.config.nr;
        &self.data[block * self.config.block_len(self.k, self.ks)..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        assert!(PackingConfig::new(0, 1, 1).is_err());
        assert!(PackingConfig::new(8, 0, 1).is_err());
        assert!(PackingConfig::new(8, 1, 3).is_err());
        assert!(PackingConfig::new(8, 3, 1).is_err());
        assert!(PackingConfig::new(8, 1, 4).is_ok());
        assert!(PackingConfig::new(2, 4, 1).is_ok());
    }

    #[test]
    fn test_packed_sizes() {
        let config = PackingConfig::new(8, 1, 4).unwrap();
        assert_eq!(config.packed_k(5), 8);
        assert_eq!(config.packed_n(9), 16);
        assert_eq!(config.packed_len(9, 5, 2), 16 * (1 + 2 * 8));
        assert_eq!(config.block_len(5, 2), 8 * (1 + 2 * 8));
    }

    #[test]
    fn test_pack_plain_layout() {
        // n=3, k=2, ks=1, nr=4, kr=1, sr=1
        // B (2x3) = [[1, 2, 3], [4, 5, 6]]
        let config = PackingConfig::new(4, 1, 1).unwrap();
        let weights = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let bias = [10.0, 20.0, 30.0];
        let packed = config
            .pack_igemm_weights(3, 2, 1, &weights, Some(&bias))
            .unwrap();

        let expected = [
            10.0, 20.0, 30.0, 0.0, // bias
            1.0, 2.0, 3.0, 0.0, // k = 0
            4.0, 5.0, 6.0, 0.0, // k = 1
        ];
        assert_eq!(packed.as_slice(), &expected);
    }

    #[test]
    fn test_pack_kr_groups_reduction() {
        // n=2, k=3, kr=2: each column gets pairs of k values, k padded to 4
        let config = PackingConfig::new(2, 2, 1).unwrap();
        // B (3x2) row-major: rows l=0..3
        let weights = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let packed = config.pack_igemm_weights(2, 3, 1, &weights, None).unwrap();

        let expected = [
            0.0, 0.0, // bias
            1.0, 3.0, 2.0, 4.0, // kb=0: col0 (k0,k1), col1 (k0,k1)
            5.0, 0.0, 6.0, 0.0, // kb=2: col0 (k2,pad), col1 (k2,pad)
        ];
        assert_eq!(packed.as_slice(), &expected);
    }

    #[test]
    fn test_pack_sr_rotates_columns() {
        // nr=4, kr=1, sr=4, k=4, n=4. Column j at step kb sees k index (kb + j) mod 4.
        let config = PackingConfig::new(4, 1, 4).unwrap();
        // weights[l * 4 + j] = 10 * l + j
        let weights: Vec<f32> = (0..4)
            .flat_map(|l| (0..4).map(move |j| (10 * l + j) as f32))
            .collect();
        let packed = config.pack_igemm_weights(4, 4, 1, &weights, None).unwrap();

        for kb in 0..4 {
            for j in 0..4 {
                let l = (kb + j) % 4;
                assert_eq!(packed.as_slice()[4 + kb * 4 + j], (10 * l + j) as f32);
            }
        }
    }

    #[test]
    fn test_pack_sr_tail_is_zero() {
        // k=5 with sr=4: the second group has one real index
        let config = PackingConfig::new(4, 1, 4).unwrap();
        let weights = vec![1.0f32; 5 * 4];
        let packed = config.pack_igemm_weights(4, 5, 1, &weights, None).unwrap();
        let second_group = &packed.as_slice()[4 + 16..4 + 32];
        // exactly one entry per column has kc_idx == 4
        assert_eq!(second_group.iter().filter(|&&x| x == 1.0).count(), 4);
        assert_eq!(second_group.iter().filter(|&&x| x == 0.0).count(), 12);
    }

    #[test]
    fn test_pack_ks_slots_follow_each_other() {
        // ks=2, k=1, n=1, nr=1: bias, slot0, slot1
        let config = PackingConfig::new(1, 1, 1).unwrap();
        let weights = [7.0, 9.0];
        let packed = config
            .pack_igemm_weights(1, 1, 2, &weights, Some(&[3.0]))
            .unwrap();
        assert_eq!(packed.as_slice(), &[3.0, 7.0, 9.0]);
    }

    #[test]
    fn test_column_block_offsets() {
        let config = PackingConfig::new(2, 1, 1).unwrap();
        let weights: Vec<f32> = (0..6).map(|x| x as f32).collect();
        let bias = [100.0, 101.0, 102.0];
        let packed = config
            .pack_igemm_weights(3, 2, 1, &weights, Some(&bias))
            .unwrap();
        assert_eq!(packed.column_block(2)[0], 102.0);
        assert_eq!(packed.column_block(2)[1], 0.0);
    }

    #[test]
    fn test_pack_rejects_short_inputs() {
        let config = PackingConfig::new(4, 1, 1).unwrap();
        assert!(config.pack_igemm_weights(4, 2, 1, &[0.0; 7], None).is_err());
        assert!(config
            .pack_igemm_weights(4, 2, 1, &[0.0; 8], Some(&[0.0; 3]))
            .is_err());
        assert!(config.pack_igemm_weights(0, 2, 1, &[], None).is_err());
    }

    #[test]
    fn test_packed_buffer_alignment() {
        let config = PackingConfig::new(16, 1, 1).unwrap();
        let packed = config
            .pack_igemm_weights(16, 3, 1, &[1.0; 48], None)
            .unwrap();
        assert_eq!(packed.as_ptr() as usize % KERNEL_ALIGNMENT, 0);
    }
}
