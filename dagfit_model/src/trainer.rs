//! Minibatch Adam training loop for the archetype pool.
//!
//! The trainer owns optimizer state only; the penalty schedule is the
//! caller's record and is advanced exactly once per epoch boundary with the
//! epoch-mean acyclicity loss, after all of that epoch's batch evaluations.

use crate::objective::{loss_and_grads, LossBreakdown, PoolGradients, StructureLoss};
use crate::penalty::DagPenalty;
use crate::pool::ArchetypePool;
use crate::schedule::PenaltyState;
use dagfit_error::DagFitError;
use ndarray::{Array2, ArrayD, ArrayView2, Axis, Zip};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub shuffle_seed: u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epochs: 10,
            batch_size: 1,
            learning_rate: 1e-2,
            shuffle_seed: 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TrainReport {
    /// Sample-weighted mean loss terms per epoch.
    pub epoch_losses: Vec<LossBreakdown>,
}

struct AdamSlot {
    m: ArrayD<f64>,
    v: ArrayD<f64>,
}

pub struct Trainer {
    cfg: TrainConfig,
    step: u64,
    slots: Option<Vec<AdamSlot>>,
}

const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;
const EPS: f64 = 1e-8;

impl Trainer {
    pub fn new(cfg: TrainConfig) -> Self {
        Self {
            cfg,
            step: 0,
            slots: None,
        }
    }

    /// Fits the pool on (contexts, observations). A DAGMA penalty whose
    /// shift turns out too small is retried once with a 10x larger shift;
    /// a second failure propagates to the caller.
    pub fn fit(
        &mut self,
        pool: &mut ArchetypePool,
        contexts: &ArrayView2<f64>,
        observations: &ArrayView2<f64>,
        loss_cfg: &mut StructureLoss,
        schedule: &mut PenaltyState,
    ) -> Result<TrainReport, DagFitError> {
        let n = contexts.nrows();
        if n == 0 {
            return Err(DagFitError::config("empty training set"));
        }
        if self.cfg.batch_size == 0 {
            return Err(DagFitError::config("batch_size must be at least 1"));
        }
        let mut report = TrainReport::default();
        let mut indices: Vec<usize> = (0..n).collect();
        let mut dagma_retried = false;
        for epoch in 0..self.cfg.epochs {
            let mut rng = StdRng::seed_from_u64(self.cfg.shuffle_seed.wrapping_add(epoch as u64));
            indices.shuffle(&mut rng);
            let mut sums = LossBreakdown::default();
            for batch in indices.chunks(self.cfg.batch_size) {
                let cb = contexts.select(Axis(0), batch);
                let xb = observations.select(Axis(0), batch);
                let (breakdown, grads) =
                    self.batch_grads(pool, &cb, &xb, loss_cfg, schedule, &mut dagma_retried)?;
                let weight = batch.len() as f64;
                sums.sem += breakdown.sem * weight;
                sums.dag += breakdown.dag * weight;
                sums.l1 += breakdown.l1 * weight;
                sums.total += breakdown.total * weight;
                sums.h_mean += breakdown.h_mean * weight;
                self.apply(pool, &grads);
            }
            let inv_n = 1.0 / n as f64;
            let epoch_loss = LossBreakdown {
                sem: sums.sem * inv_n,
                dag: sums.dag * inv_n,
                l1: sums.l1 * inv_n,
                total: sums.total * inv_n,
                h_mean: sums.h_mean * inv_n,
            };
            schedule.update(epoch_loss.h_mean);
            debug!(
                epoch,
                total = epoch_loss.total,
                sem = epoch_loss.sem,
                h = epoch_loss.h_mean,
                rho = schedule.rho,
                "epoch finished"
            );
            report.epoch_losses.push(epoch_loss);
        }
        Ok(report)
    }

    fn batch_grads(
        &self,
        pool: &ArchetypePool,
        cb: &Array2<f64>,
        xb: &Array2<f64>,
        loss_cfg: &mut StructureLoss,
        schedule: &PenaltyState,
        dagma_retried: &mut bool,
    ) -> Result<(LossBreakdown, PoolGradients), DagFitError> {
        match loss_and_grads(pool, &cb.view(), &xb.view(), loss_cfg, schedule) {
            Ok(out) => Ok(out),
            Err(err @ DagFitError::NonPositiveDefinite { .. }) if !*dagma_retried => {
                if let DagPenalty::Dagma { s } = &mut loss_cfg.penalty {
                    *s *= 10.0;
                    *dagma_retried = true;
                    warn!(s = *s, "DAGMA log-det argument left the positive-definite cone; retrying with enlarged shift");
                    loss_and_grads(pool, &cb.view(), &xb.view(), loss_cfg, schedule)
                } else {
                    Err(err)
                }
            }
            Err(err) => Err(err),
        }
    }

    fn apply(&mut self, pool: &mut ArchetypePool, grads: &PoolGradients) {
        let grad_views = grads.as_views();
        let mut params = pool.params_mut();
        let slots = self.slots.get_or_insert_with(|| {
            grad_views
                .iter()
                .map(|g| AdamSlot {
                    m: ArrayD::zeros(g.raw_dim()),
                    v: ArrayD::zeros(g.raw_dim()),
                })
                .collect()
        });
        self.step += 1;
        let bias1 = 1.0 - BETA1.powi(self.step as i32);
        let bias2 = 1.0 - BETA2.powi(self.step as i32);
        let lr = self.cfg.learning_rate;
        for ((param, grad), slot) in params.iter_mut().zip(&grad_views).zip(slots.iter_mut()) {
            Zip::from(param.view_mut())
                .and(grad)
                .and(&mut slot.m)
                .and(&mut slot.v)
                .for_each(|p, &g, m, v| {
                    *m = BETA1 * *m + (1.0 - BETA1) * g;
                    *v = BETA2 * *v + (1.0 - BETA2) * g * g;
                    let m_hat = *m / bias1;
                    let v_hat = *v / bias2;
                    *p -= lr * m_hat / (v_hat.sqrt() + EPS);
                });
        }
    }
}
