//! Smooth acyclicity penalties: zero iff the matrix is a DAG, strictly
//! positive otherwise, differentiable so gradients can push weights toward
//! acyclicity.

use dagfit_core::linalg::{expm, inverse, logdet_pos, spectral_radius, trace_expm};
use dagfit_error::DagFitError;
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

/// Interchangeable acyclicity penalty `h(W)`.
///
/// - `Notears`: `h(W) = tr(exp(W∘W)) - d` (matrix exponential).
/// - `Dagma { s }`: `h(W) = -logdet(sI - W∘W) + d·ln(s)`; `s` must exceed
///   the spectral radius of `W∘W` or the log-det argument stops being
///   positive definite and the evaluation fails with
///   `NonPositiveDefinite` (the caller may retry once with a larger `s`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DagPenalty {
    Notears,
    Dagma { s: f64 },
}

impl DagPenalty {
    /// Scalar distance-from-acyclic of `w`.
    pub fn h(&self, w: &ArrayView2<f64>) -> Result<f64, DagFitError> {
        let d = w.nrows() as f64;
        let ww = w.mapv(|v| v * v);
        let h = match *self {
            DagPenalty::Notears => trace_expm(&ww.view()) - d,
            DagPenalty::Dagma { s } => {
                let m = dagma_argument(s, &ww)?;
                -logdet_pos(&m.view(), s)? + d * s.ln()
            }
        };
        if !h.is_finite() {
            return Err(DagFitError::non_finite("acyclicity penalty"));
        }
        Ok(h)
    }

    /// Penalty value together with its gradient in `w`.
    pub fn h_and_grad(&self, w: &ArrayView2<f64>) -> Result<(f64, Array2<f64>), DagFitError> {
        let d = w.nrows() as f64;
        let ww = w.mapv(|v| v * v);
        let (h, grad) = match *self {
            DagPenalty::Notears => {
                let e = expm(&ww.view());
                let h = e.diag().sum() - d;
                // ∇h = exp(W∘W)ᵀ ∘ 2W
                let grad = &e.t() * &w.mapv(|v| 2.0 * v);
                (h, grad)
            }
            DagPenalty::Dagma { s } => {
                let m = dagma_argument(s, &ww)?;
                let h = -logdet_pos(&m.view(), s)? + d * s.ln();
                let minv = inverse(&m.view())?;
                // ∇h = 2W ∘ (sI - W∘W)⁻ᵀ
                let grad = &minv.t() * &w.mapv(|v| 2.0 * v);
                (h, grad)
            }
        };
        if !h.is_finite() || grad.iter().any(|g| !g.is_finite()) {
            return Err(DagFitError::non_finite("acyclicity penalty gradient"));
        }
        Ok((h, grad))
    }
}

/// Validates the DAGMA shift and builds `sI - W∘W`. A positive
/// determinant alone does not certify the log-det domain (an even count of
/// negative eigenvalues also makes it positive), so the shift must exceed
/// the spectral radius of `W∘W`.
fn dagma_argument(s: f64, ww: &Array2<f64>) -> Result<Array2<f64>, DagFitError> {
    if s <= 0.0 {
        return Err(DagFitError::config("DAGMA shift s must be positive"));
    }
    if s <= spectral_radius(&ww.view()) {
        return Err(DagFitError::NonPositiveDefinite { s });
    }
    Ok(s * Array2::<f64>::eye(ww.nrows()) - ww)
}
