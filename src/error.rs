//! attnmerge error types

use numr::dtype::DType;

/// attnmerge result type
pub type Result<T> = std::result::Result<T, Error>;

/// attnmerge errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Error from numr operations
    #[error("numr error: {0}")]
    Numr(#[from] numr::error::Error),

    /// Storage format of the attention output vectors is not F32, F16 or BF16
    #[error("unsupported storage dtype for attention states: {dtype}")]
    UnsupportedDType {
        /// The offending dtype
        dtype: DType,
    },

    /// head_size cannot be split into whole packs for this storage format
    #[error(
        "head_size {head_size} is not a multiple of the {dtype} pack width {pack_width}"
    )]
    HeadSizeNotPackAligned {
        /// Per-head vector length
        head_size: usize,
        /// Elements per 128-bit pack for `dtype`
        pack_width: usize,
        /// Storage format
        dtype: DType,
    },

    /// DType mismatch between buffers that must agree
    #[error("dtype mismatch: expected {expected}, got {got}")]
    DTypeMismatch {
        /// Expected dtype
        expected: DType,
        /// Actual dtype
        got: DType,
    },

    /// Buffer or tensor shape does not match the merge layout
    #[error("shape mismatch for '{arg}': expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        /// Argument name
        arg: &'static str,
        /// Expected shape (or flat length)
        expected: Vec<usize>,
        /// Actual shape (or flat length)
        got: Vec<usize>,
    },

    /// Invalid argument to an operation
    #[error("invalid argument '{arg}': {reason}")]
    InvalidArgument {
        /// Argument name
        arg: &'static str,
        /// Why it's invalid
        reason: String,
    },
}

impl Error {
    /// Precondition failures on the storage format or head size.
    ///
    /// These are raised before any output is written and are never worth
    /// retrying with the same inputs.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::UnsupportedDType { .. } | Error::HeadSizeNotPackAligned { .. }
        )
    }
}
