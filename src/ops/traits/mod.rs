pub mod attention;

pub use attention::MergeAttnStatesOps;
