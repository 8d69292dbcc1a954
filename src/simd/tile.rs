//! Pointer bookkeeping shared by every kernel.
//!
//! These are plain functions with no target features so that each ISA
//! kernel can inline them into its own `#[target_feature]` body.

use std::mem;

/// Byte size of one indirection entry.
pub(crate) const PTR_SIZE: usize = mem::size_of::<*const f32>();

/// Output row pointers for an `MR`-row tile.
///
/// Rows at or past `mr` alias the row before them; kernels store rows
/// last-first so the valid row is written last.
///
/// # Safety
///
/// `c` and every `c + i * cm_stride` for `i < mr` must stay within the
/// output allocation.
#[inline(always)]
pub(crate) unsafe fn output_rows<const MR: usize>(
    c: *mut f32,
    mr: usize,
    cm_stride: usize,
) -> [*mut f32; MR] {
    let mut rows = [c; MR];
    for i in 1..MR {
        rows[i] = if i < mr {
            rows[i - 1].byte_add(cm_stride)
        } else {
            rows[i - 1]
        };
    }
    rows
}

/// Reads the next `MR` indirection entries, applying `a_offset` to every
/// entry that is not the zero row.
///
/// # Safety
///
/// `a` must point at `MR` readable pointers, and every non-zero entry plus
/// `a_offset` must stay within its input allocation.
#[inline(always)]
pub(crate) unsafe fn input_rows<const MR: usize>(
    a: *const *const f32,
    zero: *const f32,
    a_offset: usize,
) -> [*const f32; MR] {
    let mut rows = [zero; MR];
    for (i, row) in rows.iter_mut().enumerate() {
        let ptr = *a.add(i);
        *row = if ptr != zero {
            ptr.byte_add(a_offset)
        } else {
            zero
        };
    }
    rows
}

/// Advances every output row by one column block.
#[inline(always)]
pub(crate) unsafe fn advance_rows<const MR: usize>(rows: &mut [*mut f32; MR], cn_stride: usize) {
    for row in rows.iter_mut() {
        *row = row.byte_add(cn_stride);
    }
}

/// Copies the `k < 4` trailing elements of a row into a zeroed quad so
/// that shuffle kernels never read past the end of the row.
#[inline(always)]
pub(crate) unsafe fn tail_quad(row: *const f32, k: usize) -> [f32; 4] {
    debug_assert!(k < 4);
    let mut quad = [0.0f32; 4];
    std::ptr::copy_nonoverlapping(row, quad.as_mut_ptr(), k);
    quad
}
