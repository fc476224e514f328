//! Attention state merge operations trait
//!
//! Recombines two partial attention results computed over disjoint KV ranges
//! (split-KV / chunked prefill / cascade attention) into the result of a
//! single pass over the union, using their log-sum-exp statistics.

use crate::config::MergeConfig;
use crate::error::Result;
use numr::runtime::Runtime;
use numr::tensor::Tensor;

/// Merge of prefix and suffix attention states
///
/// # Layout contract
///
/// - `prefix_output`, `suffix_output`: `[num_tokens, num_heads, head_size]` (F32, F16, BF16)
/// - `prefix_lse`, `suffix_lse`: `[num_heads, num_tokens]` (F32)
/// - Output: `[num_tokens, num_heads, head_size]`, same dtype as the inputs
/// - Output LSE: `[num_heads, num_tokens]` (F32)
///
/// `head_size` must be a multiple of the dtype's 128-bit pack width
/// (4 for F32, 8 for F16/BF16).
///
/// An infinite LSE (either sign) marks a segment that saw no keys; it gets
/// zero weight in the merge.
pub trait MergeAttnStatesOps<R: Runtime> {
    /// Merge with the default [`MergeConfig`]
    fn merge_attn_states(
        &self,
        prefix_output: &Tensor<R>,
        prefix_lse: &Tensor<R>,
        suffix_output: &Tensor<R>,
        suffix_lse: &Tensor<R>,
    ) -> Result<(Tensor<R>, Tensor<R>)> {
        self.merge_attn_states_with_config(
            prefix_output,
            prefix_lse,
            suffix_output,
            suffix_lse,
            &MergeConfig::default(),
        )
    }

    /// Merge with an explicit partitioning / empty-segment configuration
    fn merge_attn_states_with_config(
        &self,
        prefix_output: &Tensor<R>,
        prefix_lse: &Tensor<R>,
        suffix_output: &Tensor<R>,
        suffix_lse: &Tensor<R>,
        config: &MergeConfig,
    ) -> Result<(Tensor<R>, Tensor<R>)>;
}
