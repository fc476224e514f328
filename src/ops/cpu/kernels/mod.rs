pub mod element;
pub mod indexing;
pub mod merge_attn_states;

pub use element::{MergeElement, StorageFormat};
pub use indexing::{WorkItem, WorkLayout};
pub use merge_attn_states::{MergeWeights, merge_attn_states_kernel, merge_lse_pair};
