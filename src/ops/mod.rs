pub mod cpu;
pub mod traits;

pub use cpu::{AttnStates, AttnStatesMut, MergeShape, merge_attn_states};
pub use traits::MergeAttnStatesOps;
