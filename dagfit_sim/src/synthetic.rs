//! Synthetic context-parameterized DAG families and context-range splits.

use crate::sem::{simulate, NoiseKind, NoiseScale, SampleCount};
use dagfit_error::DagFitError;
use ndarray::{Array2, Array3, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::debug;

/// A dataset of (context, observation) pairs with the ground-truth graph
/// that generated each observation.
#[derive(Debug, Clone)]
pub struct SyntheticDataset {
    /// n x context_dim
    pub contexts: Array2<f64>,
    /// n x d
    pub observations: Array2<f64>,
    /// n x d x d
    pub graphs: Array3<f64>,
}

/// Train/validation/test index sets partitioned by context value ranges
/// rather than at random, so evaluation measures interpolation across the
/// context domain.
#[derive(Debug, Clone)]
pub struct ContextSplit {
    pub train: Vec<usize>,
    pub val: Vec<usize>,
    pub test: Vec<usize>,
}

/// Generates the 4-variable family whose edge weights are polynomial in a
/// scalar context C swept over [1, 2]:
/// 0->1 = C - 2, 2->1 = C^2, 3->1 = C^3, 3->2 = C.
/// One uniform-noise sample is drawn per context.
pub fn context_cubic_family(
    n: usize,
    noise_scale: f64,
    seed: u64,
) -> Result<SyntheticDataset, DagFitError> {
    if n < 2 {
        return Err(DagFitError::config("need at least two contexts"));
    }
    let d = 4;
    let mut rng = StdRng::seed_from_u64(seed);
    let mut contexts = Array2::<f64>::zeros((n, 1));
    let mut observations = Array2::<f64>::zeros((n, d));
    let mut graphs = Array3::<f64>::zeros((n, d, d));
    let scale = NoiseScale::Scalar(noise_scale);
    for k in 0..n {
        let c = 1.0 + k as f64 / (n - 1) as f64;
        contexts[[k, 0]] = c;
        let mut w = Array2::<f64>::zeros((d, d));
        w[[0, 1]] = c - 2.0;
        w[[2, 1]] = c * c;
        w[[3, 1]] = c * c * c;
        w[[3, 2]] = c;
        let x = simulate(
            &w.view(),
            SampleCount::Finite(1),
            NoiseKind::Uniform,
            &scale,
            &mut rng,
        )?;
        observations.row_mut(k).assign(&x.row(0));
        graphs.index_axis_mut(Axis(0), k).assign(&w);
    }
    debug!(n, d, "generated context-cubic dataset");
    Ok(SyntheticDataset {
        contexts,
        observations,
        graphs,
    })
}

/// Partitions sample indices by the first context coordinate. `val_range`
/// and `test_range` are half-open `[lo, hi)`; everything else is training.
/// Training indices are shuffled (seeded) for minibatch iteration; the
/// held-out sets keep their context order.
pub fn split_by_context(
    contexts: &ArrayView2<f64>,
    val_range: (f64, f64),
    test_range: (f64, f64),
    seed: u64,
) -> ContextSplit {
    let mut split = ContextSplit {
        train: Vec::new(),
        val: Vec::new(),
        test: Vec::new(),
    };
    for (k, row) in contexts.outer_iter().enumerate() {
        let c = row[0];
        if c >= val_range.0 && c < val_range.1 {
            split.val.push(k);
        } else if c >= test_range.0 && c < test_range.1 {
            split.test.push(k);
        } else {
            split.train.push(k);
        }
    }
    let mut rng = StdRng::seed_from_u64(seed);
    split.train.shuffle(&mut rng);
    split
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagfit_core::is_dag;

    #[test]
    fn family_matches_declared_weights() {
        let data = context_cubic_family(11, 0.1, 0).unwrap();
        assert_eq!(data.contexts.shape(), &[11, 1]);
        assert_eq!(data.observations.shape(), &[11, 4]);
        assert_eq!(data.graphs.shape(), &[11, 4, 4]);
        // First context is exactly 1, last exactly 2.
        assert!((data.contexts[[0, 0]] - 1.0).abs() < 1e-12);
        assert!((data.contexts[[10, 0]] - 2.0).abs() < 1e-12);
        let w_last = data.graphs.index_axis(Axis(0), 10);
        assert!((w_last[[0, 1]] - 0.0).abs() < 1e-12);
        assert!((w_last[[2, 1]] - 4.0).abs() < 1e-12);
        assert!((w_last[[3, 1]] - 8.0).abs() < 1e-12);
        assert!((w_last[[3, 2]] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn all_generated_graphs_are_dags() {
        let data = context_cubic_family(50, 0.1, 1).unwrap();
        for w in data.graphs.outer_iter() {
            assert!(is_dag(&w));
        }
    }

    #[test]
    fn split_partitions_disjointly_by_range() {
        let data = context_cubic_family(500, 0.1, 2).unwrap();
        let split = split_by_context(&data.contexts.view(), (1.7, 1.8), (1.8, 1.9), 0);
        assert_eq!(split.train.len() + split.val.len() + split.test.len(), 500);
        for &k in &split.val {
            let c = data.contexts[[k, 0]];
            assert!((1.7..1.8).contains(&c));
        }
        for &k in &split.test {
            let c = data.contexts[[k, 0]];
            assert!((1.8..1.9).contains(&c));
        }
        for &k in &split.train {
            let c = data.contexts[[k, 0]];
            assert!(c < 1.7 || c >= 1.9);
        }
        assert!(!split.train.is_empty());
        assert!(!split.val.is_empty());
        assert!(!split.test.is_empty());
    }

    #[test]
    fn split_is_deterministic_per_seed() {
        let data = context_cubic_family(100, 0.1, 3).unwrap();
        let a = split_by_context(&data.contexts.view(), (1.7, 1.8), (1.8, 1.9), 7);
        let b = split_by_context(&data.contexts.view(), (1.7, 1.8), (1.8, 1.9), 7);
        assert_eq!(a.train, b.train);
        assert_eq!(a.val, b.val);
        assert_eq!(a.test, b.test);
    }

    #[test]
    fn tiny_dataset_is_rejected() {
        assert_eq!(
            context_cubic_family(1, 0.1, 0).unwrap_err().code(),
            "CONFIG_ERROR"
        );
    }
}
