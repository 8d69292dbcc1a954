//! Indirection table: which input row each `(row, slot)` pair of a tile reads.
//!
//! An im2col-free convolution never materializes its input patches. Instead
//! every output row owns `ks` pointers, one per receptive-field tap, each
//! pointing at a `k`-element input row or at a shared all-zero row for
//! padding. This module keeps that table as [`IndirectionSlot`] values and
//! only turns it into raw pointers, bounds-checked, at the kernel boundary.
//!
//! The table is laid out the way kernels consume it: for each slot `s`, the
//! `mr` row entries are contiguous (`slots[s * mr + i]`).

use std::marker::PhantomData;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::{shape_error, IgemmError, Result};

/// Source of one `k`-element reduction row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndirectionSlot {
    /// Real input row at this element offset (before `a_offset` is applied).
    Row(usize),
    /// The shared zero row.
    Zero,
}

/// Indirection table for one `mr`-row tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndirectionBuffer {
    mr: usize,
    ks: usize,
    slots: Vec<IndirectionSlot>,
}

impl IndirectionBuffer {
    /// Starts building a table for a tile of `mr` rows and `ks` slots.
    pub fn builder(mr: usize, ks: usize) -> IndirectionBuilder {
        IndirectionBuilder {
            mr,
            ks,
            m: mr,
            a_stride: 1,
            zero_index: None,
        }
    }

    /// Wraps an explicit slot table (`slots[s * mr + i]`).
    pub fn from_slots(mr: usize, ks: usize, slots: Vec<IndirectionSlot>) -> Result<Self> {
        if mr == 0 || ks == 0 {
            return Err(shape_error(format!(
                "indirection tile needs mr > 0 and ks > 0 (mr={mr}, ks={ks})"
            )));
        }
        if slots.len() != mr * ks {
            return Err(shape_error(format!(
                "indirection table has {} slots, expected mr * ks = {}",
                slots.len(),
                mr * ks
            )));
        }
        Ok(IndirectionBuffer { mr, ks, slots })
    }

    pub fn mr(&self) -> usize {
        self.mr
    }

    pub fn ks(&self) -> usize {
        self.ks
    }

    pub fn slots(&self) -> &[IndirectionSlot] {
        &self.slots
    }

    /// Slot feeding output row `i` at tap `s`.
    pub fn slot(&self, i: usize, s: usize) -> IndirectionSlot {
        self.slots[s * self.mr + i]
    }

    /// Logical `k`-element row for `(i, s)`, or `None` for the zero row.
    ///
    /// # Panics
    ///
    /// Panics if the row lies outside `input`; call [`resolve`](Self::resolve)
    /// first to get a proper error.
    pub fn row<'a>(
        &self,
        i: usize,
        s: usize,
        input: &'a [f32],
        a_offset: usize,
        k: usize,
    ) -> Option<&'a [f32]> {
        match self.slot(i, s) {
            IndirectionSlot::Row(offset) => Some(&input[offset + a_offset..offset + a_offset + k]),
            IndirectionSlot::Zero => None,
        }
    }

    /// Turns the table into the raw pointer array the kernel ABI consumes.
    ///
    /// Every real row must satisfy `offset + a_offset + k <= input.len()`, and
    /// the zero row must hold at least `k` elements, so that no kernel that
    /// reads at most `k` elements per row can leave its buffers.
    ///
    /// # Errors
    ///
    /// [`IgemmError::IndirectionOutOfBounds`] or
    /// [`IgemmError::ZeroBufferTooShort`] when a read would overrun.
    pub fn resolve<'a>(
        &self,
        input: &'a [f32],
        zero: &'a [f32],
        k: usize,
        a_offset: usize,
    ) -> Result<ResolvedIndirection<'a>> {
        if zero.len() < k {
            return Err(IgemmError::ZeroBufferTooShort {
                required: k,
                actual: zero.len(),
            });
        }

        let pointers = self
            .slots
            .iter()
            .enumerate()
            .map(|(slot, entry)| match *entry {
                IndirectionSlot::Row(offset) => {
                    let required = offset + a_offset + k;
                    if required > input.len() {
                        return Err(IgemmError::IndirectionOutOfBounds {
                            slot,
                            offset,
                            required,
                            len: input.len(),
                        });
                    }
                    // in bounds: offset < required <= input.len()
                    Ok(input[offset..].as_ptr())
                }
                IndirectionSlot::Zero => Ok(zero.as_ptr()),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ResolvedIndirection {
            pointers,
            zero: zero.as_ptr(),
            mr: self.mr,
            ks: self.ks,
            k,
            a_offset,
            _borrow: PhantomData,
        })
    }
}

/// Fluent construction of an [`IndirectionBuffer`].
#[derive(Debug, Clone)]
pub struct IndirectionBuilder {
    mr: usize,
    ks: usize,
    m: usize,
    a_stride: usize,
    zero_index: Option<usize>,
}

impl IndirectionBuilder {
    /// Rows that carry real data; rows `m..mr` get the zero row.
    pub fn m(mut self, m: usize) -> Self {
        self.m = m;
        self
    }

    /// Element distance between consecutive input rows.
    pub fn a_stride(mut self, a_stride: usize) -> Self {
        self.a_stride = a_stride;
        self
    }

    /// Slot that reads the zero row for every output row.
    pub fn zero_index(mut self, zero_index: Option<usize>) -> Self {
        self.zero_index = zero_index;
        self
    }

    /// Builds the table with rows in their natural order: slot `(i, s)`
    /// reads input row `s * mr + i`.
    pub fn build(self) -> Result<IndirectionBuffer> {
        self.build_with(None::<&mut rand::rngs::StdRng>)
    }

    /// Builds the table, then permutes which input row feeds each slot.
    ///
    /// The permutation happens before the zero slot and the padding rows are
    /// applied, so those stay where they were asked for.
    pub fn build_shuffled<R: Rng + ?Sized>(self, rng: &mut R) -> Result<IndirectionBuffer> {
        self.build_with(Some(rng))
    }

    fn build_with<R: Rng + ?Sized>(self, rng: Option<&mut R>) -> Result<IndirectionBuffer> {
        let IndirectionBuilder {
            mr,
            ks,
            m,
            a_stride,
            zero_index,
        } = self;

        if m == 0 || m > mr {
            return Err(shape_error(format!("m must be in 1..={mr}, got {m}")));
        }
        if let Some(zero_index) = zero_index {
            if zero_index >= ks {
                return Err(shape_error(format!(
                    "zero_index {zero_index} is not a slot of ks={ks}"
                )));
            }
        }

        let mut slots: Vec<IndirectionSlot> = (0..ks * mr)
            .map(|row| IndirectionSlot::Row(row * a_stride))
            .collect();

        if let Some(rng) = rng {
            slots.shuffle(rng);
        }

        for s in 0..ks {
            for i in 0..mr {
                if Some(s) == zero_index || i >= m {
                    slots[s * mr + i] = IndirectionSlot::Zero;
                }
            }
        }

        IndirectionBuffer::from_slots(mr, ks, slots)
    }
}

/// Raw pointer form of an [`IndirectionBuffer`], borrowed from its buffers.
///
/// The pointers point at `offset`, not `offset + a_offset`: kernels add
/// `a_offset` to every entry that is not the zero pointer.
#[derive(Debug)]
pub struct ResolvedIndirection<'a> {
    pointers: Vec<*const f32>,
    zero: *const f32,
    mr: usize,
    ks: usize,
    k: usize,
    a_offset: usize,
    _borrow: PhantomData<&'a [f32]>,
}

// SAFETY: the pointers only reference slices borrowed immutably for 'a.
unsafe impl Send for ResolvedIndirection<'_> {}
unsafe impl Sync for ResolvedIndirection<'_> {}

impl ResolvedIndirection<'_> {
    pub fn as_ptr(&self) -> *const *const f32 {
        self.pointers.as_ptr()
    }

    pub fn len(&self) -> usize {
        self.pointers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pointers.is_empty()
    }

    pub fn zero(&self) -> *const f32 {
        self.zero
    }

    pub fn mr(&self) -> usize {
        self.mr
    }

    pub fn ks(&self) -> usize {
        self.ks
    }

    /// Row length the bounds were checked for.
    pub fn k(&self) -> usize {
        self.k
    }

    /// `a_offset` the bounds were checked for, in elements.
    pub fn a_offset(&self) -> usize {
        self.a_offset
    }
}
