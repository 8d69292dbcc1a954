//! Error types for IGEMM packing, indirection and conformance testing.
//!
//! The raw microkernel ABI has no error path: a kernel called outside its
//! domain has undefined behavior. Every layer that *builds* a kernel call
//! (the packer, the indirection resolver, the safe adapter and the tester)
//! validates its inputs and reports problems through [`IgemmError`].

use thiserror::Error;

use crate::isa::Isa;

/// Errors that can occur while preparing, invoking or verifying an IGEMM call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IgemmError {
    /// A tile or problem dimension is outside the kernel's domain.
    #[error("Invalid shape: {message}")]
    InvalidShape {
        /// Human-readable error message.
        message: String,
    },
    /// A packing descriptor or packing input is inconsistent.
    #[error("Invalid packing: {message}")]
    InvalidPacking {
        /// Human-readable error message.
        message: String,
    },
    /// A caller-supplied buffer cannot hold what the call would touch.
    #[error("Buffer too small: {what} needs {required} elements, got {actual}")]
    BufferTooSmall {
        /// Which buffer was too small.
        what: &'static str,
        /// Number of elements the call requires.
        required: usize,
        /// Number of elements provided.
        actual: usize,
    },
    /// An indirection slot would make the kernel read past the input buffer.
    #[error(
        "Indirection slot {slot} (offset {offset}) reads up to element {required} of an input of {len} elements"
    )]
    IndirectionOutOfBounds {
        /// Index of the slot in the indirection table.
        slot: usize,
        /// Element offset stored in the slot.
        offset: usize,
        /// One past the last element the kernel would read.
        required: usize,
        /// Length of the input buffer.
        len: usize,
    },
    /// The shared zero row is shorter than one reduction step.
    #[error("Zero buffer too short: needs {required} elements, got {actual}")]
    ZeroBufferTooShort {
        /// Number of elements the kernel reads from the zero row.
        required: usize,
        /// Length of the zero buffer.
        actual: usize,
    },
    /// The host CPU lacks the instruction set a kernel needs.
    #[error("Kernel {kernel} requires {isa}, which this CPU does not support")]
    UnsupportedIsa {
        /// Kernel name.
        kernel: String,
        /// Required instruction set.
        isa: Isa,
    },
    /// A kernel output differs from the reference by more than the tolerance.
    #[error(
        "Mismatch at row {row}, column {col}: got {actual}, expected {expected} (tolerance {tolerance:e}); {context}"
    )]
    Mismatch {
        /// Output row.
        row: usize,
        /// Output column.
        col: usize,
        /// Value written by the kernel.
        actual: f32,
        /// Reference value.
        expected: f64,
        /// Allowed absolute error.
        tolerance: f64,
        /// Tester configuration that produced the mismatch.
        context: String,
    },
    /// A kernel output lies outside the clamp range, or misses an exact bound.
    #[error("Clamp violation at row {row}, column {col}: got {actual}, range [{min}, {max}]; {context}")]
    ClampViolation {
        /// Output row.
        row: usize,
        /// Output column.
        col: usize,
        /// Value written by the kernel.
        actual: f32,
        /// Lower clamp bound.
        min: f32,
        /// Upper clamp bound.
        max: f32,
        /// Tester configuration that produced the violation.
        context: String,
    },
    /// A kernel wrote an element outside the addressed `m × n` region.
    #[error("Write outside the output region at element {index} (value {value}); {context}")]
    OutOfRegionWrite {
        /// Element index in the output allocation.
        index: usize,
        /// Value found there.
        value: f32,
        /// Tester configuration that produced the write.
        context: String,
    },
}

/// Result type alias for IGEMM operations.
pub type Result<T> = std::result::Result<T, IgemmError>;

/// Creates a shape error.
pub fn shape_error(message: impl Into<String>) -> IgemmError {
    IgemmError::InvalidShape {
        message: message.into(),
    }
}

/// Creates a packing error.
pub fn packing_error(message: impl Into<String>) -> IgemmError {
    IgemmError::InvalidPacking {
        message: message.into(),
    }
}

/// Returns [`IgemmError::BufferTooSmall`] unless `actual >= required`.
pub fn ensure_len(what: &'static str, required: usize, actual: usize) -> Result<()> {
    if actual < required {
        return Err(IgemmError::BufferTooSmall {
            what,
            required,
            actual,
        });
    }
    Ok(())
}
