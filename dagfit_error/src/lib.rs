use thiserror::Error;

/// Unified error type for the dagfit workspace.
#[derive(Error, Debug)]
pub enum DagFitError {
    // === Graph preconditions ===
    #[error("Invalid graph: {message}")]
    InvalidGraph { message: String },

    // === Simulation ===
    #[error("Unsupported noise family '{name}'")]
    UnsupportedNoise { name: String },

    #[error("Population risk unavailable for noise family '{noise}' (gaussian only)")]
    PopulationRiskUnavailable { noise: String },

    // === Numerics ===
    #[error("Matrix sI - W*W not positive definite (s = {s}); choose s above the spectral radius of W*W")]
    NonPositiveDefinite { s: f64 },

    #[error("Non-finite value encountered in {context}")]
    NonFinite { context: String },

    // === Shape / configuration ===
    #[error("Dimension mismatch for {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        what: String,
        expected: usize,
        actual: usize,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl DagFitError {
    pub fn invalid_graph<S: Into<String>>(message: S) -> Self {
        Self::InvalidGraph {
            message: message.into(),
        }
    }

    pub fn unsupported_noise<S: Into<String>>(name: S) -> Self {
        Self::UnsupportedNoise { name: name.into() }
    }

    pub fn non_finite<S: Into<String>>(context: S) -> Self {
        Self::NonFinite {
            context: context.into(),
        }
    }

    pub fn dimension_mismatch<S: Into<String>>(what: S, expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch {
            what: what.into(),
            expected,
            actual,
        }
    }

    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidGraph { .. } => "INVALID_GRAPH",
            Self::UnsupportedNoise { .. } => "UNSUPPORTED_NOISE",
            Self::PopulationRiskUnavailable { .. } => "POPULATION_RISK_UNAVAILABLE",
            Self::NonPositiveDefinite { .. } => "NON_POSITIVE_DEFINITE",
            Self::NonFinite { .. } => "NON_FINITE",
            Self::DimensionMismatch { .. } => "DIMENSION_MISMATCH",
            Self::Config { .. } => "CONFIG_ERROR",
        }
    }

    /// Whether the caller can reasonably retry after adjusting an input.
    /// A too-small DAGMA `s` is the canonical case: retry once with a
    /// larger value.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::NonPositiveDefinite { .. })
    }
}
