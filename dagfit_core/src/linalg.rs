//! Dense linear-algebra kernels backed by nalgebra.
//!
//! Public surfaces stay on `ndarray`; conversion happens at this boundary
//! only. All kernels are O(d^3) in the matrix side and dominate the cost of
//! acyclicity-penalty evaluation.

use dagfit_error::DagFitError;
use nalgebra::DMatrix;
use ndarray::{Array2, ArrayView2};

fn to_na(a: &ArrayView2<f64>) -> DMatrix<f64> {
    DMatrix::from_row_iterator(a.nrows(), a.ncols(), a.iter().cloned())
}

fn from_na(m: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| m[(i, j)])
}

/// Matrix exponential via nalgebra's scaling-and-squaring.
pub fn expm(a: &ArrayView2<f64>) -> Array2<f64> {
    from_na(&to_na(a).exp())
}

/// `trace(exp(A))` without materializing the result on the ndarray side.
pub fn trace_expm(a: &ArrayView2<f64>) -> f64 {
    to_na(a).exp().trace()
}

/// Spectral radius of `a`: the largest eigenvalue modulus, computed from
/// the full complex eigenvalue set. Zero for nilpotent matrices (any
/// DAG-supported `W∘W`).
pub fn spectral_radius(a: &ArrayView2<f64>) -> f64 {
    to_na(a)
        .complex_eigenvalues()
        .iter()
        .map(|z| z.norm())
        .fold(0.0, f64::max)
}

/// Log-determinant of `a`, which must have a strictly positive determinant
/// (the DAGMA domain `sI - W∘W` is a nonsingular M-matrix with det > 0 when
/// the shift `s` exceeds the spectral radius of `W∘W`). A nonpositive or
/// non-finite determinant fails with `NonPositiveDefinite`, reporting the
/// shift `s` so the caller can retry with a larger one.
pub fn logdet_pos(a: &ArrayView2<f64>, s: f64) -> Result<f64, DagFitError> {
    let det = to_na(a).lu().determinant();
    if !det.is_finite() || det <= 0.0 {
        return Err(DagFitError::NonPositiveDefinite { s });
    }
    Ok(det.ln())
}

/// General matrix inverse. A singular argument is a fatal numeric condition
/// at the call sites in this workspace (e.g. `(I - W)^-1` for an acyclic W
/// always exists), so it surfaces as `NonFinite` rather than being clamped.
pub fn inverse(a: &ArrayView2<f64>) -> Result<Array2<f64>, DagFitError> {
    to_na(a)
        .try_inverse()
        .map(|m| from_na(&m))
        .ok_or_else(|| DagFitError::non_finite("matrix inverse"))
}
