//! End-to-end scenarios for the dagfit workspace.
//!
//! The crate body is intentionally empty; everything lives in `tests/`.
