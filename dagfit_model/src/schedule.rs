//! Augmented-Lagrangian penalty scheduling.
//!
//! The (alpha, rho) pair is caller-owned state, mutated once per epoch
//! boundary and never inside a forward/backward pass. This keeps the
//! objective a pure function of (parameters, data, penalty state) and makes
//! the schedule independently testable.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Dynamic penalty state for the acyclicity constraint.
///
/// `alpha` is the Lagrange-multiplier estimate, `rho` the quadratic penalty
/// coefficient, `h_old` the previous epoch's acyclicity loss. With
/// `dynamic` off, both coefficients stay frozen at their initial values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PenaltyState {
    pub alpha: f64,
    pub rho: f64,
    pub h_old: f64,
    /// Required fractional progress: rho grows when `h > tol * h_old`.
    pub tol: f64,
    pub dynamic: bool,
    pub growth: f64,
    pub rho_max: f64,
}

impl Default for PenaltyState {
    fn default() -> Self {
        Self {
            alpha: 1e-1,
            rho: 1e-2,
            h_old: 0.0,
            tol: 0.25,
            dynamic: true,
            growth: 10.0,
            rho_max: 1e16,
        }
    }
}

impl PenaltyState {
    pub fn fixed(alpha: f64, rho: f64) -> Self {
        Self {
            alpha,
            rho,
            dynamic: false,
            ..Self::default()
        }
    }

    /// Epoch-boundary update with the epoch-aggregated acyclicity loss.
    /// Insufficient cycle reduction grows rho (capped, never decreased);
    /// alpha always takes a multiplier-ascent step.
    pub fn update(&mut self, h_current: f64) {
        if !self.dynamic {
            return;
        }
        if h_current > self.tol * self.h_old {
            self.rho = (self.rho * self.growth).min(self.rho_max);
        }
        self.alpha += self.rho * h_current;
        self.h_old = h_current;
        debug!(
            alpha = self.alpha,
            rho = self.rho,
            h = h_current,
            "penalty schedule updated"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rho_grows_on_insufficient_progress() {
        let mut state = PenaltyState::default();
        state.h_old = 1.0;
        state.update(0.5); // 0.5 > 0.25 * 1.0
        assert!((state.rho - 1e-1).abs() < 1e-12);
        assert_eq!(state.h_old, 0.5);
    }

    #[test]
    fn rho_held_on_sufficient_progress() {
        let mut state = PenaltyState::default();
        state.h_old = 1.0;
        state.update(0.1); // 0.1 <= 0.25 * 1.0
        assert!((state.rho - 1e-2).abs() < 1e-12);
    }

    #[test]
    fn alpha_takes_multiplier_ascent_step() {
        let mut state = PenaltyState::default();
        state.h_old = 1.0;
        let rho_before = state.rho;
        state.update(0.1);
        assert!((state.alpha - (1e-1 + rho_before * 0.1)).abs() < 1e-12);
    }

    #[test]
    fn first_update_grows_rho_from_zero_h_old() {
        let mut state = PenaltyState::default();
        state.update(0.3); // anything positive beats tol * 0
        assert!((state.rho - 1e-1).abs() < 1e-12);
    }

    #[test]
    fn rho_is_capped() {
        let mut state = PenaltyState {
            rho: 1e16,
            h_old: 1.0,
            ..Default::default()
        };
        state.update(1.0);
        assert_eq!(state.rho, 1e16);
    }

    #[test]
    fn rho_never_decreases() {
        let mut state = PenaltyState::default();
        let mut last_rho = state.rho;
        for h in [1.0, 0.9, 0.01, 0.5, 0.0] {
            state.update(h);
            assert!(state.rho >= last_rho);
            last_rho = state.rho;
        }
    }

    #[test]
    fn disabled_schedule_is_frozen() {
        let mut state = PenaltyState::fixed(1.0, 2.0);
        state.update(5.0);
        state.update(10.0);
        assert_eq!(state.alpha, 1.0);
        assert_eq!(state.rho, 2.0);
        assert_eq!(state.h_old, 0.0);
    }
}
