pub mod merge_attn_states;
