//! Slice-level entry point for merging attention states into caller buffers
//!
//! The storage format is a closed set of tagged variants, dispatched once at
//! this boundary onto the generic kernel. Everything is validated before the
//! first write; on error no buffer is touched.

use half::{bf16, f16};

use super::kernels::{StorageFormat, WorkLayout, merge_attn_states_kernel};
use crate::config::MergeConfig;
use crate::error::{Error, Result};

/// Read-only attention output vectors `[num_tokens, num_heads, head_size]`.
#[derive(Debug, Clone, Copy)]
pub enum AttnStates<'a> {
    F32(&'a [f32]),
    F16(&'a [f16]),
    BF16(&'a [bf16]),
}

/// Writable attention output vectors `[num_tokens, num_heads, head_size]`.
#[derive(Debug)]
pub enum AttnStatesMut<'a> {
    F32(&'a mut [f32]),
    F16(&'a mut [f16]),
    BF16(&'a mut [bf16]),
}

impl AttnStates<'_> {
    pub fn format(&self) -> StorageFormat {
        match self {
            Self::F32(_) => StorageFormat::F32,
            Self::F16(_) => StorageFormat::F16,
            Self::BF16(_) => StorageFormat::BF16,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::F32(v) => v.len(),
            Self::F16(v) => v.len(),
            Self::BF16(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AttnStatesMut<'_> {
    pub fn format(&self) -> StorageFormat {
        match self {
            Self::F32(_) => StorageFormat::F32,
            Self::F16(_) => StorageFormat::F16,
            Self::BF16(_) => StorageFormat::BF16,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::F32(v) => v.len(),
            Self::F16(v) => v.len(),
            Self::BF16(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

macro_rules! impl_states_from {
    ($ty:ty, $variant:ident) => {
        impl<'a> From<&'a [$ty]> for AttnStates<'a> {
            fn from(v: &'a [$ty]) -> Self {
                Self::$variant(v)
            }
        }

        impl<'a> From<&'a mut [$ty]> for AttnStatesMut<'a> {
            fn from(v: &'a mut [$ty]) -> Self {
                Self::$variant(v)
            }
        }
    };
}

impl_states_from!(f32, F32);
impl_states_from!(f16, F16);
impl_states_from!(bf16, BF16);

/// Dimensions shared by every buffer of one merge call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeShape {
    pub num_tokens: usize,
    pub num_heads: usize,
    pub head_size: usize,
}

impl MergeShape {
    pub fn new(num_tokens: usize, num_heads: usize, head_size: usize) -> Self {
        Self {
            num_tokens,
            num_heads,
            head_size,
        }
    }

    pub fn vector_len(&self) -> usize {
        self.num_tokens * self.num_heads * self.head_size
    }

    pub fn lse_len(&self) -> usize {
        self.num_heads * self.num_tokens
    }

    /// Validated `(vector_len, lse_len)`.
    ///
    /// A zero `head_size` would leave no pack to carry the LSE write, so it is
    /// rejected along with dimensions whose element counts overflow `usize`.
    pub fn checked_lens(&self) -> Result<(usize, usize)> {
        if self.head_size == 0 {
            return Err(Error::InvalidArgument {
                arg: "head_size",
                reason: "must be > 0".into(),
            });
        }
        let overflow = || Error::InvalidArgument {
            arg: "shape",
            reason: format!(
                "[{}, {}, {}] overflows usize",
                self.num_tokens, self.num_heads, self.head_size
            ),
        };
        let lse_len = self
            .num_heads
            .checked_mul(self.num_tokens)
            .ok_or_else(overflow)?;
        let vector_len = lse_len.checked_mul(self.head_size).ok_or_else(overflow)?;
        Ok((vector_len, lse_len))
    }
}

fn check_len(arg: &'static str, expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(Error::ShapeMismatch {
            arg,
            expected: vec![expected],
            got: vec![got],
        });
    }
    Ok(())
}

fn check_format(expected: StorageFormat, got: StorageFormat) -> Result<()> {
    if expected != got {
        return Err(Error::DTypeMismatch {
            expected: expected.dtype(),
            got: got.dtype(),
        });
    }
    Ok(())
}

/// Merge prefix and suffix attention states into caller-provided buffers.
///
/// # Layout contract
///
/// - `output`, `prefix_output`, `suffix_output`: `[num_tokens, num_heads, head_size]`,
///   all in the same storage format
/// - `output_lse`, `prefix_lse`, `suffix_lse`: `[num_heads, num_tokens]`, f32
///
/// `output` is fully overwritten, and `output_lse` too when given. Neither is
/// read. Fails before any write if `head_size` is zero or not a multiple of
/// the format's pack width, or if any buffer disagrees with `shape`.
#[allow(clippy::too_many_arguments)]
pub fn merge_attn_states(
    output: AttnStatesMut<'_>,
    output_lse: Option<&mut [f32]>,
    prefix_output: AttnStates<'_>,
    prefix_lse: &[f32],
    suffix_output: AttnStates<'_>,
    suffix_lse: &[f32],
    shape: MergeShape,
    config: &MergeConfig,
) -> Result<()> {
    config.validate()?;

    let format = output.format();
    format.check_head_size(shape.head_size)?;
    check_format(format, prefix_output.format())?;
    check_format(format, suffix_output.format())?;

    let (vector_len, lse_len) = shape.checked_lens()?;
    check_len("output", vector_len, output.len())?;
    check_len("prefix_output", vector_len, prefix_output.len())?;
    check_len("suffix_output", vector_len, suffix_output.len())?;
    check_len("prefix_lse", lse_len, prefix_lse.len())?;
    check_len("suffix_lse", lse_len, suffix_lse.len())?;
    if let Some(lse) = output_lse.as_deref() {
        check_len("output_lse", lse_len, lse.len())?;
    }

    let layout = WorkLayout::new(
        shape.num_tokens,
        shape.num_heads,
        shape.head_size,
        format.pack_width(),
    );
    log::debug!(
        "merge_attn_states: dtype={} tokens={} heads={} head_size={} units={} units_per_task={}",
        format.dtype(),
        shape.num_tokens,
        shape.num_heads,
        shape.head_size,
        layout.num_units(),
        config.units_per_task(layout.num_units()),
    );

    let empty_pairs = match (output, prefix_output, suffix_output) {
        (AttnStatesMut::F32(o), AttnStates::F32(p), AttnStates::F32(s)) => {
            merge_attn_states_kernel(o, output_lse, p, prefix_lse, s, suffix_lse, layout, config)
        }
        (AttnStatesMut::F16(o), AttnStates::F16(p), AttnStates::F16(s)) => {
            merge_attn_states_kernel(o, output_lse, p, prefix_lse, s, suffix_lse, layout, config)
        }
        (AttnStatesMut::BF16(o), AttnStates::BF16(p), AttnStates::BF16(s)) => {
            merge_attn_states_kernel(o, output_lse, p, prefix_lse, s, suffix_lse, layout, config)
        }
        (o, p, _) => {
            return Err(Error::DTypeMismatch {
                expected: o.format().dtype(),
                got: p.format().dtype(),
            });
        }
    };

    if empty_pairs > 0 {
        log::debug!(
            "merge_attn_states: {empty_pairs} (token, head) pairs had no contribution from either segment ({:?})",
            config.empty_segment_policy
        );
    }
    Ok(())
}
