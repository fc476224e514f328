//! CPU merge kernel for split-KV attention states
//!
//! Combines two partial attention results computed over disjoint KV ranges:
//!
//! ```text
//! m      = max(lse_p, lse_s)            (infinite lse treated as -inf)
//! w_p    = exp(lse_p - m),  w_s = exp(lse_s - m)
//! out    = (o_p * w_p + o_s * w_s) / (w_p + w_s)
//! lse    = ln(w_p + w_s) + m
//! ```
//!
//! Layouts: vectors `[num_tokens, num_heads, head_size]`, LSE `[num_heads, num_tokens]` (f32).
//!
//! Optimizations:
//! - Rayon parallelism over contiguous ranges of the flattened (token, head, pack) space
//! - Each range maps to one contiguous slice of `output`, so vector writes need no sync
//! - Merge arithmetic always in f32, regardless of storage format

use rayon::prelude::*;

use super::element::MergeElement;
use super::indexing::WorkLayout;
use crate::config::{EmptySegmentPolicy, MergeConfig};

/// Per-(token, head) recombination weights.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergeWeights {
    pub prefix_scale: f32,
    pub suffix_scale: f32,
    /// Merged log-sum-exp
    pub lse: f32,
    /// Neither segment contributed (both LSEs infinite)
    pub both_empty: bool,
}

/// Recombine two log-sum-exp statistics.
///
/// An infinite LSE of either sign marks a segment with no mass and is read as
/// `-inf`, so a stray `+inf` sentinel cannot win the max.
#[inline]
pub fn merge_lse_pair(prefix_lse: f32, suffix_lse: f32, policy: EmptySegmentPolicy) -> MergeWeights {
    let p = if prefix_lse.is_infinite() {
        f32::NEG_INFINITY
    } else {
        prefix_lse
    };
    let s = if suffix_lse.is_infinite() {
        f32::NEG_INFINITY
    } else {
        suffix_lse
    };

    // f32::max drops NaN, so emptiness is decided on both inputs.
    let both_empty = p == f32::NEG_INFINITY && s == f32::NEG_INFINITY;
    let max_lse = p.max(s);
    if both_empty && policy == EmptySegmentPolicy::Zero {
        return MergeWeights {
            prefix_scale: 0.0,
            suffix_scale: 0.0,
            lse: f32::NEG_INFINITY,
            both_empty,
        };
    }

    let p_se = (p - max_lse).exp();
    let s_se = (s - max_lse).exp();
    let out_se = p_se + s_se;

    MergeWeights {
        prefix_scale: p_se / out_se,
        suffix_scale: s_se / out_se,
        lse: out_se.ln() + max_lse,
        both_empty,
    }
}

/// Merge one pack: `out[i] = prefix[i] * w_p + suffix[i] * w_s` in f32.
#[inline(always)]
fn merge_pack<T: MergeElement>(out: &mut [T], prefix: &[T], suffix: &[T], w: &MergeWeights) {
    for ((o, &p), &s) in out.iter_mut().zip(prefix).zip(suffix) {
        *o = T::from_f32(p.to_f32() * w.prefix_scale + s.to_f32() * w.suffix_scale);
    }
}

/// Merge prefix and suffix attention states into `output` (and `output_lse`).
///
/// Buffers must match `layout` exactly; callers validate before invoking.
/// Every element of `output` and of `output_lse` (when given) is overwritten.
///
/// Returns the number of (token, head) pairs where both segments were empty.
#[allow(clippy::too_many_arguments)]
pub fn merge_attn_states_kernel<T: MergeElement>(
    output: &mut [T],
    output_lse: Option<&mut [f32]>,
    prefix_output: &[T],
    prefix_lse: &[f32],
    suffix_output: &[T],
    suffix_lse: &[f32],
    layout: WorkLayout,
    config: &MergeConfig,
) -> usize {
    debug_assert_eq!(layout.pack_width, T::PACK_WIDTH);
    debug_assert_eq!(output.len(), layout.vector_len());
    debug_assert_eq!(prefix_output.len(), layout.vector_len());
    debug_assert_eq!(suffix_output.len(), layout.vector_len());
    debug_assert_eq!(prefix_lse.len(), layout.lse_len());
    debug_assert_eq!(suffix_lse.len(), layout.lse_len());

    let num_units = layout.num_units();
    if num_units == 0 {
        return 0;
    }

    let pack_width = layout.pack_width;
    let units_per_task = config.units_per_task(num_units);
    let policy = config.empty_segment_policy;

    // LSE is head-major, so one task's pack-0 units scatter across the buffer.
    // Each (head, token) slot is owned by exactly one pack-0 unit; writes go
    // through a raw pointer to disjoint slots.
    let lse_ptr = output_lse.map(|lse| {
        debug_assert_eq!(lse.len(), layout.lse_len());
        lse.as_mut_ptr() as usize // usize is Send+Sync
    });

    output
        .par_chunks_mut(units_per_task * pack_width)
        .enumerate()
        .map(|(task, out_chunk)| {
            let first_unit = task * units_per_task;
            let mut empty_pairs = 0usize;

            for (local, out_pack) in out_chunk.chunks_exact_mut(pack_width).enumerate() {
                let item = layout.decompose(first_unit + local);
                let lse_off = layout.lse_offset(item);
                let w = merge_lse_pair(prefix_lse[lse_off], suffix_lse[lse_off], policy);

                let off = layout.vector_offset(item);
                merge_pack(
                    out_pack,
                    &prefix_output[off..off + pack_width],
                    &suffix_output[off..off + pack_width],
                    &w,
                );

                if item.pack == 0 {
                    if w.both_empty {
                        empty_pairs += 1;
                    }
                    if let Some(ptr) = lse_ptr {
                        unsafe {
                            *(ptr as *mut f32).add(lse_off) = w.lse;
                        }
                    }
                }
            }
            empty_pairs
        })
        .sum()
}
