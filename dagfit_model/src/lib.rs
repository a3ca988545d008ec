//! Context-dependent DAG learning: archetype pooling, acyclicity penalties,
//! and the structure-learning objective.
//!
//! A small set of learned base DAGs ("archetypes") is combined per context
//! by a learned encoder into one predicted weighted adjacency matrix per
//! observation. Training minimizes SEM reconstruction error plus an
//! augmented-Lagrangian acyclicity penalty; the penalty coefficients are
//! updated once per epoch by [`schedule::PenaltyState`].

pub mod objective;
pub mod penalty;
pub mod pool;
pub mod predictor;
pub mod schedule;
pub mod trainer;

pub use objective::{loss, loss_and_grads, LossBreakdown, StructureLoss};
pub use penalty::DagPenalty;
pub use pool::{ArchetypePool, ArchetypePoolConfig, WeightActivation};
pub use predictor::{dag_pred, graph_mse, recon_mse};
pub use schedule::PenaltyState;
pub use trainer::{TrainConfig, TrainReport, Trainer};
