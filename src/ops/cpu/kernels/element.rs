//! Storage formats for attention output vectors
//!
//! Every format promotes to f32 for the merge arithmetic and demotes back on
//! store. Packs are sized to one 128-bit transfer: 4 x f32, 8 x f16/bf16.

use half::{bf16, f16};
use numr::dtype::DType;

use crate::error::{Error, Result};

/// Bits moved per pack, independent of the element type.
const PACK_BITS: usize = 128;

/// Element type of an attention output vector.
pub trait MergeElement: Copy + Send + Sync + 'static {
    /// numr dtype tag for this element type
    const DTYPE: DType;

    /// Elements per 128-bit pack
    const PACK_WIDTH: usize = PACK_BITS / (8 * std::mem::size_of::<Self>());

    fn to_f32(self) -> f32;
    fn from_f32(v: f32) -> Self;
}

impl MergeElement for f32 {
    const DTYPE: DType = DType::F32;

    #[inline(always)]
    fn to_f32(self) -> f32 {
        self
    }

    #[inline(always)]
    fn from_f32(v: f32) -> Self {
        v
    }
}

impl MergeElement for f16 {
    const DTYPE: DType = DType::F16;

    #[inline(always)]
    fn to_f32(self) -> f32 {
        f16::to_f32(self)
    }

    #[inline(always)]
    fn from_f32(v: f32) -> Self {
        f16::from_f32(v)
    }
}

impl MergeElement for bf16 {
    const DTYPE: DType = DType::BF16;

    #[inline(always)]
    fn to_f32(self) -> f32 {
        bf16::to_f32(self)
    }

    #[inline(always)]
    fn from_f32(v: f32) -> Self {
        bf16::from_f32(v)
    }
}

/// Closed set of storage formats the merge engine accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageFormat {
    F32,
    F16,
    BF16,
}

impl StorageFormat {
    /// Map a numr dtype onto a supported storage format.
    pub fn from_dtype(dtype: DType) -> Result<Self> {
        match dtype {
            DType::F32 => Ok(Self::F32),
            DType::F16 => Ok(Self::F16),
            DType::BF16 => Ok(Self::BF16),
            other => Err(Error::UnsupportedDType { dtype: other }),
        }
    }

    pub fn dtype(self) -> DType {
        match self {
            Self::F32 => f32::DTYPE,
            Self::F16 => f16::DTYPE,
            Self::BF16 => bf16::DTYPE,
        }
    }

    pub fn pack_width(self) -> usize {
        match self {
            Self::F32 => f32::PACK_WIDTH,
            Self::F16 => f16::PACK_WIDTH,
            Self::BF16 => bf16::PACK_WIDTH,
        }
    }

    /// Check that `head_size` splits into whole packs.
    pub fn check_head_size(self, head_size: usize) -> Result<()> {
        let pack_width = self.pack_width();
        if head_size % pack_width != 0 {
            return Err(Error::HeadSizeNotPackAligned {
                head_size,
                pack_width,
                dtype: self.dtype(),
            });
        }
        Ok(())
    }
}
