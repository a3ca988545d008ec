//! Linear structural-equation-model simulation and synthetic datasets.
//!
//! Data generated here is used both for unit-level validation of the graph
//! utilities and as training/evaluation input for the archetype-pool model.

pub mod sem;
pub mod synthetic;

pub use sem::{simulate, NoiseKind, NoiseScale, SampleCount};
pub use synthetic::{context_cubic_family, split_by_context, ContextSplit, SyntheticDataset};
