pub mod attention;
pub mod kernels;
pub mod states;

pub use states::{AttnStates, AttnStatesMut, MergeShape, merge_attn_states};
