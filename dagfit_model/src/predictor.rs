//! SEM reconstruction and the two downstream evaluation metrics:
//! structural recovery (predicted vs. true graphs) and fit (reconstructed
//! vs. observed X).

use dagfit_error::DagFitError;
use ndarray::{Array2, ArrayView2, ArrayView3, Axis};

/// Reconstructs each observation under its predicted graph:
/// `x_hat[b] = x[b] · W[b]` (every variable as the weighted sum of its
/// predicted parents).
pub fn dag_pred(
    observations: &ArrayView2<f64>,
    graphs: &ArrayView3<f64>,
) -> Result<Array2<f64>, DagFitError> {
    let n = observations.nrows();
    let d = observations.ncols();
    if graphs.shape() != [n, d, d] {
        return Err(DagFitError::dimension_mismatch(
            "graph batch entries",
            n * d * d,
            graphs.len(),
        ));
    }
    let mut x_hat = Array2::<f64>::zeros((n, d));
    for b in 0..n {
        let reconstructed = observations.row(b).dot(&graphs.index_axis(Axis(0), b));
        x_hat.row_mut(b).assign(&reconstructed);
    }
    Ok(x_hat)
}

/// Mean squared error between two batches of graphs (the structural L2
/// recovery metric).
pub fn graph_mse(
    predicted: &ArrayView3<f64>,
    truth: &ArrayView3<f64>,
) -> Result<f64, DagFitError> {
    if predicted.shape() != truth.shape() {
        return Err(DagFitError::dimension_mismatch(
            "graph batch entries",
            truth.len(),
            predicted.len(),
        ));
    }
    let mut acc = 0.0;
    for (a, b) in predicted.iter().zip(truth.iter()) {
        acc += (a - b) * (a - b);
    }
    Ok(acc / predicted.len() as f64)
}

/// Mean squared error between reconstructed and observed X.
pub fn recon_mse(
    reconstructed: &ArrayView2<f64>,
    observed: &ArrayView2<f64>,
) -> Result<f64, DagFitError> {
    if reconstructed.shape() != observed.shape() {
        return Err(DagFitError::dimension_mismatch(
            "observation entries",
            observed.len(),
            reconstructed.len(),
        ));
    }
    let mut acc = 0.0;
    for (a, b) in reconstructed.iter().zip(observed.iter()) {
        acc += (a - b) * (a - b);
    }
    Ok(acc / reconstructed.len() as f64)
}
