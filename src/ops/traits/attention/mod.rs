pub mod merge_attn_states;

pub use merge_attn_states::MergeAttnStatesOps;
