//! Graph and linear-algebra primitives for context-dependent DAG learning.
//!
//! Weighted adjacency matrices are `ndarray` f64 matrices where entry
//! `W[i, j]` is the linear coefficient of variable i's contribution to
//! variable j; any nonzero entry counts as a directed edge.

pub mod graph;
pub mod linalg;

pub use graph::{is_dag, project_to_dag, topological_order};
