//! Archetype pool and context encoder.
//!
//! The pool owns k base DAG matrices stored as one contiguous k x d x d
//! array (no per-archetype heap objects) plus a small learned encoder that
//! maps each context vector to a length-k mixing-weight vector. A predicted
//! graph is the weighted combination of archetypes with the diagonal masked
//! to zero, whatever the learned parameters are.

use dagfit_core::project_to_dag;
use dagfit_error::DagFitError;
use ndarray::{Array1, Array2, Array3, ArrayView2, ArrayView3, ArrayViewMutD, Axis};
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

/// Constraint applied to the mixing weights. `Softmax` yields a convex
/// combination of archetypes; `Linear` leaves the coefficients
/// unconstrained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeightActivation {
    Softmax,
    Linear,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchetypePoolConfig {
    pub num_archetypes: usize,
    /// Number of observed variables d (graphs are d x d).
    pub dim: usize,
    pub context_dim: usize,
    /// 0 disables the factored encoder; otherwise the context is mapped
    /// through a `num_factors`-dimensional space before producing archetype
    /// weights. A capacity/parameter trade-off, useful when
    /// `num_factors < num_archetypes`.
    pub num_factors: usize,
    pub init_scale: f64,
    pub activation: WeightActivation,
}

impl Default for ArchetypePoolConfig {
    fn default() -> Self {
        Self {
            num_archetypes: 4,
            dim: 4,
            context_dim: 1,
            num_factors: 0,
            init_scale: 0.1,
            activation: WeightActivation::Softmax,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Encoder {
    Direct {
        w: Array2<f64>,
        b: Array1<f64>,
    },
    Factored {
        /// context_dim x num_factors
        p: Array2<f64>,
        /// num_factors x num_archetypes
        q: Array2<f64>,
        b: Array1<f64>,
    },
}

/// Everything the backward pass needs from one forward evaluation.
pub(crate) struct Forward {
    /// n x num_factors, present only for the factored encoder.
    pub factors: Option<Array2<f64>>,
    /// n x k mixing weights (post-activation).
    pub weights: Array2<f64>,
    /// n x d x d predicted graphs, diagonal already masked.
    pub w_hat: Array3<f64>,
}

#[derive(Debug)]
pub struct ArchetypePool {
    pub(crate) cfg: ArchetypePoolConfig,
    pub(crate) archetypes: Array3<f64>,
    pub(crate) encoder: Encoder,
}

impl ArchetypePool {
    /// Creates a pool with archetypes initialized to small random
    /// off-diagonal weights and a small random encoder.
    pub fn new(cfg: ArchetypePoolConfig, rng: &mut StdRng) -> Result<Self, DagFitError> {
        if cfg.num_archetypes == 0 {
            return Err(DagFitError::config("num_archetypes must be at least 1"));
        }
        if cfg.dim < 2 {
            return Err(DagFitError::config("graphs need at least 2 variables"));
        }
        if cfg.context_dim == 0 {
            return Err(DagFitError::config("context_dim must be at least 1"));
        }
        if !(cfg.init_scale > 0.0) {
            return Err(DagFitError::config("init_scale must be positive"));
        }
        let (k, d, c_dim, f) = (cfg.num_archetypes, cfg.dim, cfg.context_dim, cfg.num_factors);
        let dist = Uniform::new(-cfg.init_scale, cfg.init_scale);
        let mut archetypes = Array3::from_shape_fn((k, d, d), |_| dist.sample(rng));
        for a in 0..k {
            for i in 0..d {
                archetypes[[a, i, i]] = 0.0;
            }
        }
        let encoder = if f == 0 {
            Encoder::Direct {
                w: Array2::from_shape_fn((c_dim, k), |_| dist.sample(rng)),
                b: Array1::from_shape_fn(k, |_| dist.sample(rng)),
            }
        } else {
            Encoder::Factored {
                p: Array2::from_shape_fn((c_dim, f), |_| dist.sample(rng)),
                q: Array2::from_shape_fn((f, k), |_| dist.sample(rng)),
                b: Array1::from_shape_fn(k, |_| dist.sample(rng)),
            }
        };
        Ok(Self {
            cfg,
            archetypes,
            encoder,
        })
    }

    pub fn config(&self) -> &ArchetypePoolConfig {
        &self.cfg
    }

    pub fn archetypes(&self) -> ArrayView3<f64> {
        self.archetypes.view()
    }

    /// Replaces the archetype matrices (e.g. with an externally chosen
    /// initialization). Shape-checked; diagonals are not rewritten here
    /// because the combination step masks them regardless.
    pub fn set_archetypes(&mut self, archetypes: Array3<f64>) -> Result<(), DagFitError> {
        let expected = [self.cfg.num_archetypes, self.cfg.dim, self.cfg.dim];
        if archetypes.shape() != expected {
            return Err(DagFitError::dimension_mismatch(
                "archetype tensor entries",
                expected.iter().product(),
                archetypes.len(),
            ));
        }
        self.archetypes = archetypes;
        Ok(())
    }

    pub(crate) fn forward(&self, contexts: &ArrayView2<f64>) -> Result<Forward, DagFitError> {
        let n = contexts.nrows();
        let (k, d) = (self.cfg.num_archetypes, self.cfg.dim);
        if contexts.ncols() != self.cfg.context_dim {
            return Err(DagFitError::dimension_mismatch(
                "context width",
                self.cfg.context_dim,
                contexts.ncols(),
            ));
        }
        let (logits, factors) = match &self.encoder {
            Encoder::Direct { w, b } => (contexts.dot(w) + b, None),
            Encoder::Factored { p, q, b } => {
                let f = contexts.dot(p);
                (f.dot(q) + b, Some(f))
            }
        };
        let weights = match self.cfg.activation {
            WeightActivation::Softmax => softmax_rows(&logits),
            WeightActivation::Linear => logits,
        };
        let arch_flat = self
            .archetypes
            .view()
            .into_shape((k, d * d))
            .expect("archetype storage is contiguous");
        let mut w_hat = weights
            .dot(&arch_flat)
            .into_shape((n, d, d))
            .expect("combination output is contiguous");
        // Structural guarantee: no self-loops, independent of learned values.
        for b in 0..n {
            for i in 0..d {
                w_hat[[b, i, i]] = 0.0;
            }
        }
        Ok(Forward {
            factors,
            weights,
            w_hat,
        })
    }

    /// Predicts one weighted adjacency matrix per context row. Pure in the
    /// current parameters; any batch size is accepted.
    pub fn predict(&self, contexts: &ArrayView2<f64>) -> Result<Array3<f64>, DagFitError> {
        Ok(self.forward(contexts)?.w_hat)
    }

    /// `predict` followed by projection of every sample onto the set of
    /// acyclic matrices; the inference-time path.
    pub fn predict_projected(&self, contexts: &ArrayView2<f64>) -> Result<Array3<f64>, DagFitError> {
        let mut w_hat = self.predict(contexts)?;
        for mut w in w_hat.axis_iter_mut(Axis(0)) {
            let projected = project_to_dag(&w.view());
            w.assign(&projected);
        }
        Ok(w_hat)
    }

    /// The per-context mixing weights (n x k).
    pub fn mixing_weights(&self, contexts: &ArrayView2<f64>) -> Result<Array2<f64>, DagFitError> {
        Ok(self.forward(contexts)?.weights)
    }

    /// Parameter tensors in a stable order, paired with
    /// `PoolGradients::as_views` by the trainer.
    pub(crate) fn params_mut(&mut self) -> Vec<ArrayViewMutD<f64>> {
        let mut params = vec![self.archetypes.view_mut().into_dyn()];
        match &mut self.encoder {
            Encoder::Direct { w, b } => {
                params.push(w.view_mut().into_dyn());
                params.push(b.view_mut().into_dyn());
            }
            Encoder::Factored { p, q, b } => {
                params.push(p.view_mut().into_dyn());
                params.push(q.view_mut().into_dyn());
                params.push(b.view_mut().into_dyn());
            }
        }
        params
    }
}

fn softmax_rows(z: &Array2<f64>) -> Array2<f64> {
    let mut out = z.clone();
    for mut row in out.rows_mut() {
        let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|v| v / sum);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn pool(num_factors: usize) -> ArchetypePool {
        let mut rng = StdRng::seed_from_u64(0);
        ArchetypePool::new(
            ArchetypePoolConfig {
                num_archetypes: 3,
                dim: 4,
                context_dim: 2,
                num_factors,
                ..Default::default()
            },
            &mut rng,
        )
        .unwrap()
    }

    fn contexts(n: usize) -> Array2<f64> {
        Array2::from_shape_fn((n, 2), |(i, j)| 0.3 * i as f64 - 0.7 * j as f64)
    }

    #[test]
    fn predict_shape_is_batched_square() {
        for nf in [0, 2] {
            let w = pool(nf).predict(&contexts(5).view()).unwrap();
            assert_eq!(w.shape(), &[5, 4, 4]);
        }
    }

    #[test]
    fn diagonal_is_zero_even_for_adversarial_archetypes() {
        let mut p = pool(0);
        // Deliberately poison every diagonal with large values.
        let poisoned = Array3::from_elem((3, 4, 4), 7.5);
        p.set_archetypes(poisoned).unwrap();
        let w = p.predict(&contexts(6).view()).unwrap();
        for b in 0..6 {
            for i in 0..4 {
                assert_eq!(w[[b, i, i]], 0.0);
            }
            // Off-diagonal entries survive the mask.
            assert!(w[[b, 0, 1]] != 0.0);
        }
    }

    #[test]
    fn softmax_weights_are_convex_coefficients() {
        let weights = pool(0).mixing_weights(&contexts(8).view()).unwrap();
        assert_eq!(weights.shape(), &[8, 3]);
        for row in weights.rows() {
            assert!(row.iter().all(|&v| v > 0.0));
            assert!((row.sum() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn context_width_is_checked() {
        let bad = Array2::<f64>::zeros((4, 3));
        let err = pool(0).predict(&bad.view()).unwrap_err();
        assert_eq!(err.code(), "DIMENSION_MISMATCH");
    }

    #[test]
    fn factored_and_direct_have_identical_output_shape() {
        let c = contexts(7);
        let direct = pool(0).predict(&c.view()).unwrap();
        let factored = pool(2).predict(&c.view()).unwrap();
        assert_eq!(direct.shape(), factored.shape());
    }

    #[test]
    fn projection_path_yields_dags() {
        let mut p = pool(0);
        // Force strongly cyclic predictions.
        let mut cyclic = Array3::zeros((3, 4, 4));
        for a in 0..3 {
            cyclic[[a, 0, 1]] = 1.0;
            cyclic[[a, 1, 0]] = 0.9;
            cyclic[[a, 2, 3]] = 0.5;
        }
        p.set_archetypes(cyclic).unwrap();
        let w = p.predict_projected(&contexts(4).view()).unwrap();
        for b in 0..4 {
            assert!(dagfit_core::is_dag(&w.index_axis(Axis(0), b)));
        }
    }

    #[test]
    fn predict_is_pure() {
        let p = pool(0);
        let c = contexts(5);
        let a = p.predict(&c.view()).unwrap();
        let b = p.predict(&c.view()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn invalid_configs_are_rejected() {
        let mut rng = StdRng::seed_from_u64(1);
        let bad = ArchetypePoolConfig {
            num_archetypes: 0,
            ..Default::default()
        };
        assert_eq!(
            ArchetypePool::new(bad, &mut rng).unwrap_err().code(),
            "CONFIG_ERROR"
        );
    }
}
