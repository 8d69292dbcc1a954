//! Naive IGEMM ground truth.
//!
//! Accumulates in `f64` so that the only rounding error left in a comparison
//! is the kernel's own.

use ndarray::Array2;

use crate::error::{ensure_len, shape_error, IgemmError, Result};
use crate::indirection::{IndirectionBuffer, IndirectionSlot};

/// Inputs of one reference computation over an `m`-row tile.
///
/// `weights` is the logical `(ks * k) × n` row-major matrix: the weight
/// multiplying element `l` of the row in slot `s` for column `j` is
/// `weights[(s * k + l) * n + j]`.
#[derive(Debug, Clone, Copy)]
pub struct IgemmReference<'a> {
    pub m: usize,
    pub n: usize,
    pub k: usize,
    pub indirection: &'a IndirectionBuffer,
    pub input: &'a [f32],
    pub a_offset: usize,
    pub weights: &'a [f32],
    pub bias: &'a [f32],
}

impl IgemmReference<'_> {
    /// Unclamped `bias + Σ_s Σ_l A[i][s][l] · B[s·k + l][j]` as an `m × n` array.
    ///
    /// Zero slots contribute nothing.
    pub fn accumulate(&self) -> Result<Array2<f64>> {
        let IgemmReference {
            m,
            n,
            k,
            indirection,
            input,
            a_offset,
            weights,
            bias,
        } = *self;
        let ks = indirection.ks();

        if k == 0 || n == 0 {
            return Err(shape_error(format!(
                "reference needs k > 0 and n > 0 (k={k}, n={n})"
            )));
        }
        if m == 0 || m > indirection.mr() {
            return Err(shape_error(format!(
                "m must be in 1..={}, got {m}",
                indirection.mr()
            )));
        }
        ensure_len("weights", ks * k * n, weights.len())?;
        ensure_len("bias", n, bias.len())?;

        let mut acc = Array2::<f64>::zeros((m, n));
        for i in 0..m {
            for j in 0..n {
                acc[[i, j]] = bias[j] as f64;
            }
            for s in 0..ks {
                let row = match indirection.slot(i, s) {
                    IndirectionSlot::Zero => continue,
                    IndirectionSlot::Row(offset) => {
                        let start = offset + a_offset;
                        input
                            .get(start..start + k)
                            .ok_or(IgemmError::IndirectionOutOfBounds {
                                slot: s * indirection.mr() + i,
                                offset,
                                required: start + k,
                                len: input.len(),
                            })?
                    }
                };
                for (l, &a) in row.iter().enumerate() {
                    let b_row = &weights[(s * k + l) * n..(s * k + l + 1) * n];
                    for (j, &b) in b_row.iter().enumerate() {
                        acc[[i, j]] += a as f64 * b as f64;
                    }
                }
            }
        }
        Ok(acc)
    }
}

/// Clamps every element of `acc` to `[min, max]`.
pub fn clamp_reference(acc: &mut Array2<f64>, min: f32, max: f32) {
    let (min, max) = (min as f64, max as f64);
    acc.mapv_inplace(|x| num::clamp(x, min, max));
}

/// Clamped reference in one call.
pub fn igemm_reference(reference: &IgemmReference<'_>, min: f32, max: f32) -> Result<Array2<f64>> {
    let mut acc = reference.accumulate()?;
    clamp_reference(&mut acc, min, max);
    Ok(acc)
}
