//! Merge configuration.
//!
//! None of these knobs change the merged values for well-formed inputs; they
//! control how the work is partitioned across rayon tasks and how the
//! "both segments empty" case is resolved.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// What to write when both partial results carry an infinite LSE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptySegmentPolicy {
    /// Zero output vector and `-inf` merged LSE.
    #[default]
    Zero,
    /// Let the arithmetic run: NaN scales, NaN output and NaN LSE.
    Propagate,
}

/// Merge engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Minimum number of (token, head, pack) units handed to one rayon task
    #[serde(default = "default_min_units_per_task")]
    pub min_units_per_task: usize,

    /// Upper bound on rayon tasks per call (None = 4 per worker thread)
    #[serde(default)]
    pub max_tasks: Option<usize>,

    /// Handling of (token, head) pairs where neither segment contributed
    #[serde(default)]
    pub empty_segment_policy: EmptySegmentPolicy,
}

fn default_min_units_per_task() -> usize {
    256
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            min_units_per_task: default_min_units_per_task(),
            max_tasks: None,
            empty_segment_policy: EmptySegmentPolicy::default(),
        }
    }
}

impl MergeConfig {
    /// Reject partitioning knobs that would leave the pass with no tasks.
    pub fn validate(&self) -> Result<()> {
        if self.min_units_per_task == 0 {
            return Err(Error::InvalidArgument {
                arg: "min_units_per_task",
                reason: "must be > 0".into(),
            });
        }
        if self.max_tasks == Some(0) {
            return Err(Error::InvalidArgument {
                arg: "max_tasks",
                reason: "must be > 0 when set".into(),
            });
        }
        Ok(())
    }

    /// Number of units each task processes for a pass of `num_units` units.
    ///
    /// Clamped to `[1, num_units]` so the flattened index space is covered
    /// with no gap.
    pub fn units_per_task(&self, num_units: usize) -> usize {
        let max_tasks = self
            .max_tasks
            .unwrap_or_else(|| rayon::current_num_threads() * 4)
            .max(1);
        num_units
            .div_ceil(max_tasks)
            .max(self.min_units_per_task)
            .min(num_units)
            .max(1)
    }
}
