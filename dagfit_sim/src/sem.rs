//! Sampling from a linear SEM over a weighted DAG.

use dagfit_core::linalg::inverse;
use dagfit_core::{is_dag, topological_order};
use dagfit_error::DagFitError;
use ndarray::{Array1, Array2, ArrayView2};
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Distribution, Exp, Gumbel, Normal, Uniform};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Noise family of a linear SEM. Additive families draw
/// `x_j = parents · w + z_j`; the link-function families transform the
/// weighted parent sum instead (Bernoulli-of-sigmoid, Poisson-of-exp).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoiseKind {
    Gauss,
    Exp,
    Gumbel,
    Uniform,
    Logistic,
    Poisson,
}

impl NoiseKind {
    /// Additive families support the closed-form population limit.
    pub fn is_additive(self) -> bool {
        matches!(
            self,
            NoiseKind::Gauss | NoiseKind::Exp | NoiseKind::Gumbel | NoiseKind::Uniform
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            NoiseKind::Gauss => "gauss",
            NoiseKind::Exp => "exp",
            NoiseKind::Gumbel => "gumbel",
            NoiseKind::Uniform => "uniform",
            NoiseKind::Logistic => "logistic",
            NoiseKind::Poisson => "poisson",
        }
    }

    pub fn parse(name: &str) -> Result<Self, DagFitError> {
        match name {
            "gauss" => Ok(NoiseKind::Gauss),
            "exp" => Ok(NoiseKind::Exp),
            "gumbel" => Ok(NoiseKind::Gumbel),
            "uniform" => Ok(NoiseKind::Uniform),
            "logistic" => Ok(NoiseKind::Logistic),
            "poisson" => Ok(NoiseKind::Poisson),
            other => Err(DagFitError::unsupported_noise(other)),
        }
    }
}

/// Noise scale: one positive value shared by all variables, or one per
/// variable. Defaults to all ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NoiseScale {
    Scalar(f64),
    Vector(Vec<f64>),
}

impl Default for NoiseScale {
    fn default() -> Self {
        NoiseScale::Scalar(1.0)
    }
}

impl NoiseScale {
    fn to_vector(&self, d: usize) -> Result<Array1<f64>, DagFitError> {
        let vec = match self {
            NoiseScale::Scalar(s) => Array1::from_elem(d, *s),
            NoiseScale::Vector(v) => {
                if v.len() != d {
                    return Err(DagFitError::dimension_mismatch("noise scale", d, v.len()));
                }
                Array1::from_vec(v.clone())
            }
        };
        if vec.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(DagFitError::config("noise scale must be positive and finite"));
        }
        Ok(vec)
    }
}

/// Number of SEM realizations to draw. `Population` is the analytic
/// infinite-sample limit, available for gaussian noise only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleCount {
    Finite(usize),
    Population,
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Simulates samples from the linear SEM encoded by the weighted adjacency
/// matrix `w` (entry `w[i, j]` is i's coefficient in j's equation).
///
/// Returns an `n x d` matrix for `SampleCount::Finite(n)`, or the `d x d`
/// population covariance square-root `sqrt(d) * diag(scale) * (I - W)^-1`
/// for `SampleCount::Population` with gaussian noise. Fails with
/// `InvalidGraph` when `w` is cyclic and `PopulationRiskUnavailable` when
/// population mode is requested for a non-gaussian family.
pub fn simulate(
    w: &ArrayView2<f64>,
    n_samples: SampleCount,
    noise: NoiseKind,
    scale: &NoiseScale,
    rng: &mut StdRng,
) -> Result<Array2<f64>, DagFitError> {
    let d = w.nrows();
    if w.ncols() != d {
        return Err(DagFitError::dimension_mismatch(
            "adjacency matrix columns",
            d,
            w.ncols(),
        ));
    }
    let scale_vec = scale.to_vector(d)?;
    if !is_dag(w) {
        return Err(DagFitError::invalid_graph(
            "simulation requires an acyclic weight matrix",
        ));
    }

    let n = match n_samples {
        SampleCount::Population => {
            if noise != NoiseKind::Gauss {
                return Err(DagFitError::PopulationRiskUnavailable {
                    noise: noise.name().to_string(),
                });
            }
            let eye: Array2<f64> = Array2::eye(d);
            let mut x = inverse(&(&eye - w).view())?;
            for i in 0..d {
                let factor = (d as f64).sqrt() * scale_vec[i];
                x.row_mut(i).mapv_inplace(|v| v * factor);
            }
            return Ok(x);
        }
        SampleCount::Finite(n) => n,
    };

    debug!(n, d, noise = noise.name(), "simulating linear SEM");
    // The ordering is recomputed per matrix: every context yields its own W.
    let order = topological_order(w)?;
    let mut x = Array2::<f64>::zeros((n, d));
    for j in order {
        let parents: Vec<usize> = (0..d).filter(|&i| w[[i, j]] != 0.0).collect();
        let mut mean = Array1::<f64>::zeros(n);
        for &p in &parents {
            let wpj = w[[p, j]];
            mean.zip_mut_with(&x.column(p), |m, &xp| *m += wpj * xp);
        }
        let s = scale_vec[j];
        let column = match noise {
            NoiseKind::Gauss => {
                let dist = Normal::new(0.0, s)
                    .map_err(|_| DagFitError::config("invalid gaussian scale"))?;
                mean.mapv(|m| m + dist.sample(rng))
            }
            NoiseKind::Exp => {
                let dist = Exp::new(1.0 / s)
                    .map_err(|_| DagFitError::config("invalid exponential scale"))?;
                mean.mapv(|m| m + dist.sample(rng))
            }
            NoiseKind::Gumbel => {
                let dist = Gumbel::new(0.0, s)
                    .map_err(|_| DagFitError::config("invalid gumbel scale"))?;
                mean.mapv(|m| m + dist.sample(rng))
            }
            NoiseKind::Uniform => {
                let dist = Uniform::new(-s, s);
                mean.mapv(|m| m + dist.sample(rng))
            }
            NoiseKind::Logistic => mean.mapv(|m| {
                if rng.gen_bool(sigmoid(m)) {
                    1.0
                } else {
                    0.0
                }
            }),
            NoiseKind::Poisson => {
                let mut column = Array1::<f64>::zeros(n);
                for (slot, m) in column.iter_mut().zip(mean.iter()) {
                    let rate = m.exp();
                    // exp underflows to 0 for very negative parent sums; a
                    // zero rate is a degenerate Poisson with a zero count.
                    if rate == 0.0 {
                        continue;
                    }
                    let dist = rand_distr::Poisson::new(rate)
                        .map_err(|_| DagFitError::non_finite("poisson rate"))?;
                    *slot = dist.sample(rng);
                }
                column
            }
        };
        x.column_mut(j).assign(&column);
    }
    Ok(x)
}
