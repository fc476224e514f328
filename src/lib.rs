//! # attnmerge
//!
//! **Split-KV attention state merging built on numr.**
//!
//! When attention over a long KV sequence is computed in disjoint ranges
//! (chunked prefill, cascade/shared-prefix attention, context parallelism),
//! each range yields a partial output and its log-sum-exp (LSE). attnmerge
//! recombines a prefix and a suffix partial result into exactly what one pass
//! over the union would have produced:
//!
//! ```text
//! out = (o_p * exp(lse_p - m) + o_s * exp(lse_s - m)) / (exp(lse_p - m) + exp(lse_s - m))
//! lse = ln(exp(lse_p - m) + exp(lse_s - m)) + m,   m = max(lse_p, lse_s)
//! ```
//!
//! ## Design
//!
//! - **Slice API**: [`merge_attn_states`] writes into caller-owned buffers,
//!   dispatching once on the storage format (F32 / F16 / BF16)
//! - **Extension trait**: [`MergeAttnStatesOps`] implemented on numr's `CpuClient`
//! - **Kernel**: rayon map over a flattened (token, head, pack) index space,
//!   128-bit packs, f32 arithmetic for every storage format

pub mod config;
pub mod error;
pub mod ops;

pub use config::{EmptySegmentPolicy, MergeConfig};
pub use error::{Error, Result};
pub use ops::cpu::kernels::{
    MergeElement, MergeWeights, StorageFormat, WorkItem, WorkLayout, merge_lse_pair,
};
pub use ops::{AttnStates, AttnStatesMut, MergeAttnStatesOps, MergeShape, merge_attn_states};

// Re-export numr types that users will commonly need
pub use numr::dtype::DType;
pub use numr::error::{Error as NumrError, Result as NumrResult};
pub use numr::runtime::{Runtime, RuntimeClient};
pub use numr::tensor::Tensor;

#[cfg(test)]
pub(crate) mod test_utils {
    use numr::runtime::cpu::{CpuClient, CpuDevice};

    /// Create a CPU client and device for use in unit tests.
    pub(crate) fn cpu_setup() -> (CpuClient, CpuDevice) {
        let device = CpuDevice::new();
        let client = CpuClient::new(device.clone());
        (client, device)
    }
}
