//! Trust-score math via Beta distribution posteriors.
//!
//! Prior: Beta(1, 1) — uniform, no prior bias.
//! Each recorded success increments `alpha`, each failure increments `beta`.
//! The score is always the posterior mean `alpha / (alpha + beta)`.

use serde::{Deserialize, Serialize};
use statrs::distribution::{Beta, ContinuousCDF};

/// A [0,1] reliability estimate with its Beta-distribution parameters.
///
/// Invariant: `score == alpha / (alpha + beta)`, recomputed on every
/// update, never stored stale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrustScore {
    pub score: f64,
    pub alpha: f64,
    pub beta: f64,
}

impl Default for TrustScore {
    fn default() -> Self {
        Self::uniform()
    }
}

impl TrustScore {
    /// The uniform prior Beta(1, 1): score 0.5.
    pub fn uniform() -> Self {
        Self {
            score: 0.5,
            alpha: 1.0,
            beta: 1.0,
        }
    }

    /// Rebuild from stored parameters, recomputing the score.
    pub fn from_params(alpha: f64, beta: f64) -> Self {
        Self {
            score: posterior_mean(alpha, beta),
            alpha,
            beta,
        }
    }

    /// Build the posterior from observation counts.
    ///
    /// `successes`: k. `total`: n. Posterior: Beta(1 + k, 1 + n - k).
    pub fn from_counts(successes: u64, total: u64) -> Self {
        let k = successes as f64;
        let n = total as f64;
        Self::from_params(1.0 + k, 1.0 + (n - k).max(0.0))
    }

    /// Fold in one observed outcome and recompute the score.
    pub fn record(&mut self, success: bool) {
        if success {
            self.alpha += 1.0;
        } else {
            self.beta += 1.0;
        }
        self.score = posterior_mean(self.alpha, self.beta);
    }

    /// Posterior variance: alpha*beta / ((alpha+beta)^2 * (alpha+beta+1)).
    pub fn variance(&self) -> f64 {
        let sum = self.alpha + self.beta;
        if sum <= 0.0 || !sum.is_finite() {
            return 0.25; // Maximum variance for uniform
        }
        let denom = sum * sum * (sum + 1.0);
        if denom <= 0.0 || !denom.is_finite() {
            return 0.25;
        }
        let var = (self.alpha * self.beta) / denom;
        if !var.is_finite() {
            0.25
        } else {
            var.max(0.0)
        }
    }

    /// Credible interval containing `level` probability mass.
    pub fn credible_interval(&self, level: f64) -> (f64, f64) {
        credible_interval(self.alpha, self.beta, level)
    }

    /// Whether the stored score matches the parameters within tolerance.
    pub fn is_consistent(&self) -> bool {
        (self.score - posterior_mean(self.alpha, self.beta)).abs() < 1e-9
    }
}

/// Compute the posterior mean: alpha / (alpha + beta).
///
/// Guards against division by zero.
pub fn posterior_mean(alpha: f64, beta: f64) -> f64 {
    let sum = alpha + beta;
    if sum <= 0.0 || !sum.is_finite() {
        return 0.5; // Fallback to uniform
    }
    let mean = alpha / sum;
    if !mean.is_finite() {
        0.5
    } else {
        mean.clamp(0.0, 1.0)
    }
}

/// Compute the credible interval for a Beta distribution.
///
/// Uses the inverse CDF (quantile function) to find the interval
/// that contains `level` probability mass (e.g., 0.95 for 95% CI).
///
/// Returns (low, high). Guards against invalid parameters.
pub fn credible_interval(alpha: f64, beta_param: f64, level: f64) -> (f64, f64) {
    if alpha <= 0.0 || beta_param <= 0.0 || !alpha.is_finite() || !beta_param.is_finite() {
        return (0.0, 1.0);
    }

    // Extreme parameters cause numerical issues in the inverse CDF.
    if alpha > 1e6 || beta_param > 1e6 {
        let mean = alpha / (alpha + beta_param);
        let epsilon = 1e-6;
        return ((mean - epsilon).max(0.0), (mean + epsilon).min(1.0));
    }

    let tail = (1.0 - level) / 2.0;

    match Beta::new(alpha, beta_param) {
        Ok(dist) => {
            let low = dist.inverse_cdf(tail);
            let high = dist.inverse_cdf(1.0 - tail);

            let low = if low.is_finite() { low.clamp(0.0, 1.0) } else { 0.0 };
            let high = if high.is_finite() { high.clamp(0.0, 1.0) } else { 1.0 };

            (low, high)
        }
        Err(_) => (0.0, 1.0),
    }
}
