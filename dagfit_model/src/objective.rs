//! Structure-learning objective: SEM reconstruction + acyclicity penalty +
//! L1 sparsity, with closed-form gradients for the pool parameters.
//!
//! Ground-truth graphs are never a training target; gradients flow only to
//! the archetypes and the encoder.

use crate::penalty::DagPenalty;
use crate::pool::{ArchetypePool, Encoder};
use crate::schedule::PenaltyState;
use dagfit_error::DagFitError;
use ndarray::{Array1, Array2, Array3, ArrayView2, ArrayViewD, Axis};
use serde::{Deserialize, Serialize};

/// Loss configuration: penalty flavor plus independently scaled L1 terms on
/// the mixing weights and on the archetype matrices (either may be zero).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructureLoss {
    pub penalty: DagPenalty,
    pub l1_weights: f64,
    pub l1_archetypes: f64,
}

impl Default for StructureLoss {
    fn default() -> Self {
        Self {
            penalty: DagPenalty::Notears,
            l1_weights: 0.0,
            l1_archetypes: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LossBreakdown {
    pub sem: f64,
    pub dag: f64,
    pub l1: f64,
    pub total: f64,
    /// Batch-mean raw acyclicity loss, the input to the epoch schedule.
    pub h_mean: f64,
}

#[derive(Debug, Clone)]
pub(crate) enum EncoderGradients {
    Direct {
        w: Array2<f64>,
        b: Array1<f64>,
    },
    Factored {
        p: Array2<f64>,
        q: Array2<f64>,
        b: Array1<f64>,
    },
}

/// Gradients of the objective in every pool parameter, in the same tensor
/// order as `ArchetypePool::params_mut`.
#[derive(Debug, Clone)]
pub struct PoolGradients {
    pub(crate) archetypes: Array3<f64>,
    pub(crate) encoder: EncoderGradients,
}

impl PoolGradients {
    pub(crate) fn as_views(&self) -> Vec<ArrayViewD<f64>> {
        let mut views = vec![self.archetypes.view().into_dyn()];
        match &self.encoder {
            EncoderGradients::Direct { w, b } => {
                views.push(w.view().into_dyn());
                views.push(b.view().into_dyn());
            }
            EncoderGradients::Factored { p, q, b } => {
                views.push(p.view().into_dyn());
                views.push(q.view().into_dyn());
                views.push(b.view().into_dyn());
            }
        }
        views
    }
}

fn subgrad_sign(v: f64) -> f64 {
    if v == 0.0 {
        0.0
    } else {
        v.signum()
    }
}

fn check_shapes(
    pool: &ArchetypePool,
    contexts: &ArrayView2<f64>,
    observations: &ArrayView2<f64>,
) -> Result<(), DagFitError> {
    if observations.ncols() != pool.cfg.dim {
        return Err(DagFitError::dimension_mismatch(
            "observation width",
            pool.cfg.dim,
            observations.ncols(),
        ));
    }
    if observations.nrows() != contexts.nrows() {
        return Err(DagFitError::dimension_mismatch(
            "observation rows",
            contexts.nrows(),
            observations.nrows(),
        ));
    }
    Ok(())
}

/// Evaluates the objective without gradients (validation/reporting path).
pub fn loss(
    pool: &ArchetypePool,
    contexts: &ArrayView2<f64>,
    observations: &ArrayView2<f64>,
    cfg: &StructureLoss,
    state: &PenaltyState,
) -> Result<LossBreakdown, DagFitError> {
    check_shapes(pool, contexts, observations)?;
    let fwd = pool.forward(contexts)?;
    let n = contexts.nrows();
    let inv_n = 1.0 / n as f64;

    let mut sem = 0.0;
    let mut dag = 0.0;
    let mut h_sum = 0.0;
    for b in 0..n {
        let wb = fwd.w_hat.index_axis(Axis(0), b);
        let xb = observations.row(b);
        let residual = &xb.to_owned() - &xb.dot(&wb);
        sem += 0.5 * inv_n * residual.dot(&residual);
        let h = cfg.penalty.h(&wb)?;
        dag += inv_n * (state.alpha * h + 0.5 * state.rho * h * h);
        h_sum += h;
    }
    let l1 = cfg.l1_weights * fwd.weights.mapv(f64::abs).sum()
        + cfg.l1_archetypes * pool.archetypes.mapv(f64::abs).sum();
    finish(sem, dag, l1, h_sum * inv_n)
}

/// Evaluates the objective and its gradients in the pool parameters.
pub fn loss_and_grads(
    pool: &ArchetypePool,
    contexts: &ArrayView2<f64>,
    observations: &ArrayView2<f64>,
    cfg: &StructureLoss,
    state: &PenaltyState,
) -> Result<(LossBreakdown, PoolGradients), DagFitError> {
    check_shapes(pool, contexts, observations)?;
    let fwd = pool.forward(contexts)?;
    let n = contexts.nrows();
    let (k, d) = (pool.cfg.num_archetypes, pool.cfg.dim);
    let inv_n = 1.0 / n as f64;

    // dL/dW_b for every sample, diagonal masked (it is structurally zero).
    let mut g = Array3::<f64>::zeros((n, d, d));
    let mut sem = 0.0;
    let mut dag = 0.0;
    let mut h_sum = 0.0;
    for b in 0..n {
        let wb = fwd.w_hat.index_axis(Axis(0), b);
        let xb = observations.row(b);
        let residual = &xb.to_owned() - &xb.dot(&wb);
        sem += 0.5 * inv_n * residual.dot(&residual);
        let (h, grad_h) = cfg.penalty.h_and_grad(&wb)?;
        dag += inv_n * (state.alpha * h + 0.5 * state.rho * h * h);
        h_sum += h;
        let dag_coeff = inv_n * (state.alpha + state.rho * h);
        let mut gb = g.index_axis_mut(Axis(0), b);
        for i in 0..d {
            for j in 0..d {
                gb[[i, j]] = -inv_n * xb[i] * residual[j] + dag_coeff * grad_h[[i, j]];
            }
        }
        for i in 0..d {
            gb[[i, i]] = 0.0;
        }
    }

    let g_flat = g
        .view()
        .into_shape((n, d * d))
        .expect("gradient storage is contiguous");
    let arch_flat = pool
        .archetypes
        .view()
        .into_shape((k, d * d))
        .expect("archetype storage is contiguous");

    // dL/dA_i = sum_b s_bi * G_b  (+ L1 subgradient), diagonal masked.
    let mut d_arch = fwd
        .weights
        .t()
        .dot(&g_flat)
        .into_shape((k, d, d))
        .expect("archetype gradient is contiguous");
    if cfg.l1_archetypes != 0.0 {
        d_arch.zip_mut_with(&pool.archetypes, |gv, &a| {
            *gv += cfg.l1_archetypes * subgrad_sign(a)
        });
    }
    for a in 0..k {
        for i in 0..d {
            d_arch[[a, i, i]] = 0.0;
        }
    }

    // dL/ds_bi = <G_b, A_i>  (+ L1 subgradient on the weights).
    let mut d_s = g_flat.dot(&arch_flat.t());
    if cfg.l1_weights != 0.0 {
        d_s.zip_mut_with(&fwd.weights, |gv, &s| *gv += cfg.l1_weights * subgrad_sign(s));
    }

    // Activation backward.
    let d_logits = match pool.cfg.activation {
        crate::pool::WeightActivation::Softmax => {
            let mut d_logits = Array2::<f64>::zeros((n, k));
            for b in 0..n {
                let s = fwd.weights.row(b);
                let ds = d_s.row(b);
                let dot = s.dot(&ds);
                for i in 0..k {
                    d_logits[[b, i]] = s[i] * (ds[i] - dot);
                }
            }
            d_logits
        }
        crate::pool::WeightActivation::Linear => d_s,
    };

    let encoder = match (&pool.encoder, &fwd.factors) {
        (Encoder::Direct { .. }, _) => EncoderGradients::Direct {
            w: contexts.t().dot(&d_logits),
            b: d_logits.sum_axis(Axis(0)),
        },
        (Encoder::Factored { q, .. }, Some(factors)) => {
            let d_q = factors.t().dot(&d_logits);
            let d_factors = d_logits.dot(&q.t());
            EncoderGradients::Factored {
                p: contexts.t().dot(&d_factors),
                q: d_q,
                b: d_logits.sum_axis(Axis(0)),
            }
        }
        (Encoder::Factored { .. }, None) => {
            return Err(DagFitError::config("factored encoder produced no factors"))
        }
    };

    let l1 = cfg.l1_weights * fwd.weights.mapv(f64::abs).sum()
        + cfg.l1_archetypes * pool.archetypes.mapv(f64::abs).sum();
    let breakdown = finish(sem, dag, l1, h_sum * inv_n)?;
    Ok((
        breakdown,
        PoolGradients {
            archetypes: d_arch,
            encoder,
        },
    ))
}

fn finish(sem: f64, dag: f64, l1: f64, h_mean: f64) -> Result<LossBreakdown, DagFitError> {
    let total = sem + dag + l1;
    if !total.is_finite() {
        return Err(DagFitError::non_finite("structure loss"));
    }
    Ok(LossBreakdown {
        sem,
        dag,
        l1,
        total,
        h_mean,
    })
}
