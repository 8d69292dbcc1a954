use std::alloc::{alloc_zeroed, dealloc, handle_alloc_error, Layout};
use std::mem;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

use crate::error::{IgemmError, Result};

/// Alignment used for every buffer a kernel streams through.
///
/// 64 bytes covers a full AVX-512 register and a cache line, so any
/// vector width in this crate can use aligned loads at block boundaries.
pub const KERNEL_ALIGNMENT: usize = 64;

/// A heap buffer with a caller-chosen alignment.
///
/// `Vec<T>` cannot be built from an over-aligned allocation without lying to
/// the global allocator about the layout on drop, so aligned storage lives in
/// its own RAII type that remembers the exact [`Layout`] it was allocated with.
/// It dereferences to `[T]` for safe element access.
pub struct AlignedVec<T: Copy> {
    ptr: NonNull<T>,
    len: usize,
    layout: Layout,
}

// SAFETY: AlignedVec owns its allocation exclusively, like Vec<T>.
unsafe impl<T: Copy + Send> Send for AlignedVec<T> {}
unsafe impl<T: Copy + Sync> Sync for AlignedVec<T> {}

impl<T: Copy> AlignedVec<T> {
    /// Creates a new `AlignedVec<T>` with zero-initialized memory.
    ///
    /// # Arguments
    ///
    /// * `len` - Number of elements to allocate
    /// * `align` - Required memory alignment in bytes (must be power of 2)
    ///
    /// # Errors
    ///
    /// Returns [`IgemmError::InvalidShape`] if `align` is not a power of two,
    /// is smaller than the natural alignment of `T`, or the total size
    /// overflows.
    ///
    /// # Panics
    ///
    /// Triggers the global allocation error handler if allocation fails.
    pub fn new_zeroed(len: usize, align: usize) -> Result<Self> {
        if !align.is_power_of_two() || align < mem::align_of::<T>() {
            return Err(IgemmError::InvalidShape {
                message: format!("alignment {align} is not a usable power of two"),
            });
        }

        let size = len
            .checked_mul(mem::size_of::<T>())
            .ok_or_else(|| IgemmError::InvalidShape {
                message: format!("allocation of {len} elements overflows"),
            })?;

        let layout = Layout::from_size_align(size, align).map_err(|e| IgemmError::InvalidShape {
            message: format!("invalid layout (size {size}, alignment {align}): {e}"),
        })?;

        if size == 0 {
            return Ok(AlignedVec {
                ptr: NonNull::dangling(),
                len,
                layout,
            });
        }

        // SAFETY: the layout has a non-zero size.
        let raw = unsafe { alloc_zeroed(layout) };
        let ptr = match NonNull::new(raw.cast::<T>()) {
            Some(p) => p,
            None => handle_alloc_error(layout),
        };

        Ok(AlignedVec { ptr, len, layout })
    }

    /// Creates a new buffer with every element set to `value`.
    pub fn from_elem(value: T, len: usize, align: usize) -> Result<Self> {
        let mut buffer = Self::new_zeroed(len, align)?;
        buffer.fill(value);
        Ok(buffer)
    }
}

impl<T: Copy> Drop for AlignedVec<T> {
    fn drop(&mut self) {
        if self.layout.size() > 0 {
            // SAFETY: ptr was allocated by alloc_zeroed with exactly this layout.
            unsafe {
                dealloc(self.ptr.as_ptr().cast::<u8>(), self.layout);
            }
        }
    }
}

impl<T: Copy> Deref for AlignedVec<T> {
    type Target = [T];
    fn deref(&self) -> &Self::Target {
        // SAFETY: ptr is valid for len initialized elements (or dangling with len 0).
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl<T: Copy> DerefMut for AlignedVec<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        // SAFETY: as in deref, and &mut self guarantees exclusive access.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl<T: Copy + std::fmt::Debug> std::fmt::Debug for AlignedVec<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignedVec")
            .field("len", &self.len)
            .field("align", &self.layout.align())
            .field("data", &self.deref())
            .finish()
    }
}

/// Rounds `n` up to the next multiple of `q` (`q > 0`).
#[inline(always)]
pub fn round_up(n: usize, q: usize) -> usize {
    n.div_ceil(q) * q
}

/// Rounds `n` down to a multiple of the power of two `q`.
#[inline(always)]
pub fn round_down_po2(n: usize, q: usize) -> usize {
    debug_assert!(q.is_power_of_two());
    n & !(q - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aligned_vec_is_zeroed_and_aligned() {
        let buffer = AlignedVec::<f32>::new_zeroed(37, KERNEL_ALIGNMENT).unwrap();
        assert_eq!(buffer.len(), 37);
        assert_eq!(buffer.as_ptr() as usize % KERNEL_ALIGNMENT, 0);
        assert!(buffer.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_aligned_vec_empty() {
        let buffer = AlignedVec::<f32>::new_zeroed(0, KERNEL_ALIGNMENT).unwrap();
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_aligned_vec_rejects_bad_alignment() {
        assert!(AlignedVec::<f32>::new_zeroed(8, 48).is_err());
        assert!(AlignedVec::<f32>::new_zeroed(8, 2).is_err());
    }

    #[test]
    fn test_aligned_vec_from_elem() {
        let filled = AlignedVec::from_elem(f32::NAN, 5, 32).unwrap();
        assert_eq!(filled.len(), 5);
        assert!(filled.iter().all(|x| x.is_nan()));
        assert_eq!(filled.as_ptr() as usize % 32, 0);
    }

    #[test]
    fn test_rounding_helpers() {
        assert_eq!(round_up(0, 4), 0);
        assert_eq!(round_up(5, 4), 8);
        assert_eq!(round_up(8, 4), 8);
        assert_eq!(round_up(7, 3), 9);
        assert_eq!(round_down_po2(7, 4), 4);
        assert_eq!(round_down_po2(8, 8), 8);
        assert_eq!(round_down_po2(3, 1), 3);
    }
}
