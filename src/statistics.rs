//! Output analysis: per-replication mean estimation and across-replication
//! confidence intervals.

/// Running sample mean and variance (Welford's recurrence).
#[derive(Debug, Clone, Default)]
pub struct MeanEstimator {
    count: u64,
    mean: f64,
    m2: f64,
}

impl MeanEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collect(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count > 0 {
            self.mean
        } else {
            f64::NAN
        }
    }

    /// Unbiased sample variance.
    pub fn variance(&self) -> f64 {
        if self.count > 1 {
            self.m2 / (self.count - 1) as f64
        } else {
            f64::NAN
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Confidence interval on a mean estimated from independent replications.
///
/// One observation is collected per replication; the half width uses the
/// Student-t quantile at the configured confidence level, and the estimator
/// is `done` once the half width falls within the requested precision
/// relative to the point estimate.
#[derive(Debug, Clone)]
pub struct CiMeanEstimator {
    name: String,
    level: f64,
    rel_precision: f64,
    stats: MeanEstimator,
}

impl CiMeanEstimator {
    pub fn new(name: impl Into<String>, level: f64, rel_precision: f64) -> Self {
        Self {
            name: name.into(),
            level,
            rel_precision,
            stats: MeanEstimator::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn collect(&mut self, x: f64) {
        self.stats.collect(x);
    }

    pub fn count(&self) -> u64 {
        self.stats.count()
    }

    pub fn estimate(&self) -> f64 {
        self.stats.mean()
    }

    /// Half width of the confidence interval; NaN below two observations.
    pub fn half_width(&self) -> f64 {
        let n = self.stats.count();
        if n < 2 {
            return f64::NAN;
        }
        let t = student_t_quantile(1.0 - (1.0 - self.level) / 2.0, (n - 1) as f64);
        t * (self.stats.variance() / n as f64).sqrt()
    }

    /// Whether the target relative precision has been reached.
    pub fn done(&self) -> bool {
        if self.stats.count() < 2 {
            return false;
        }
        let estimate = self.estimate();
        let hw = self.half_width();
        if !estimate.is_finite() || !hw.is_finite() {
            return false;
        }
        hw <= self.rel_precision * estimate.abs()
    }

    /// Whether the target precision is out of reach: non-finite
    /// observations make the interval meaningless for good.
    pub fn unstable(&self) -> bool {
        self.stats.count() > 0 && !self.estimate().is_finite()
    }
}

/// Quantile of the standard normal distribution (Acklam's rational
/// approximation, relative error below 1.15e-9).
fn normal_quantile(p: f64) -> f64 {
    debug_assert!(p > 0.0 && p < 1.0);

    const A: [f64; 6] = [
        -3.969683028665376e+01,
        2.209460984245205e+02,
        -2.759285104469687e+02,
        1.383577518672690e+02,
        -3.066479806614716e+01,
        2.506628277459239e+00,
    ];
    const B: [f64; 5] = [
        -5.447609879822406e+01,
        1.615858368580409e+02,
        -1.556989798598866e+02,
        6.680131188771972e+01,
        -1.328068155288572e+01,
    ];
    const C: [f64; 6] = [
        -7.784894002430293e-03,
        -3.223964580411365e-01,
        -2.400758277161838e+00,
        -2.549732539343734e+00,
        4.374664141464968e+00,
        2.938163982698783e+00,
    ];
    const D: [f64; 4] = [
        7.784695709041462e-03,
        3.224671290700398e-01,
        2.445134137142996e+00,
        3.754408661907416e+00,
    ];
    const P_LOW: f64 = 0.02425;

    if p < P_LOW {
        let q = (-2.0 * p.ln()).sqrt();
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        let q = (-2.0 * (1.0 - p).ln()).sqrt();
        -(((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    }
}

/// Quantile of the Student-t distribution with `nu` degrees of freedom:
/// closed forms for the heaviest tails (nu 1 and 2, where the expansion is
/// off by several percent), the Cornish-Fisher expansion around the normal
/// quantile from nu 3 up.
fn student_t_quantile(p: f64, nu: f64) -> f64 {
    if nu <= 1.0 {
        return (std::f64::consts::PI * (p - 0.5)).tan();
    }
    if nu <= 2.0 {
        let q = 2.0 * p - 1.0;
        return q * (2.0 / (1.0 - q * q)).sqrt();
    }
    let z = normal_quantile(p);
    let z2 = z * z;
    let z3 = z2 * z;
    let z5 = z3 * z2;
    let z7 = z5 * z2;
    let z9 = z7 * z2;
    z + (z3 + z) / (4.0 * nu)
        + (5.0 * z5 + 16.0 * z3 + 3.0 * z) / (96.0 * nu * nu)
        + (3.0 * z7 + 19.0 * z5 + 17.0 * z3 - 15.0 * z) / (384.0 * nu * nu * nu)
        + (79.0 * z9 + 776.0 * z7 + 1482.0 * z5 - 1920.0 * z3 - 945.0 * z)
            / (92160.0 * nu * nu * nu * nu)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn welford_mean_and_variance() {
        let mut est = MeanEstimator::new();
        for x in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            est.collect(x);
        }
        assert_eq!(est.count(), 8);
        assert!((est.mean() - 5.0).abs() < 1e-12);
        assert!((est.variance() - 32.0 / 7.0).abs() < 1e-12);
        est.reset();
        assert_eq!(est.count(), 0);
        assert!(est.mean().is_nan());
    }

    #[test]
    fn normal_quantile_known_values() {
        assert!(normal_quantile(0.5).abs() < 1e-9);
        assert!((normal_quantile(0.975) - 1.959964).abs() < 1e-5);
        assert!((normal_quantile(0.025) + 1.959964).abs() < 1e-5);
    }

    #[test]
    fn student_t_quantile_known_values() {
        // Two-sided 95% level: t_{0.975, 10} = 2.2281, t_{0.975, 30} = 2.0423.
        assert!((student_t_quantile(0.975, 10.0) - 2.2281).abs() < 2e-3);
        assert!((student_t_quantile(0.975, 30.0) - 2.0423).abs() < 1e-3);
        // Converges to the normal quantile for large nu.
        assert!((student_t_quantile(0.975, 1e6) - 1.959964).abs() < 1e-4);
    }

    #[test]
    fn student_t_quantile_heavy_tails_are_exact() {
        // t_{0.975, 1} = 12.7062 and t_{0.975, 2} = 4.3027: the closed
        // forms, not the expansion, must carry these.
        assert!((student_t_quantile(0.975, 1.0) - 12.7062).abs() < 1e-3);
        assert!((student_t_quantile(0.975, 2.0) - 4.3027).abs() < 1e-3);
        assert!((student_t_quantile(0.95, 1.0) - 6.3138).abs() < 1e-3);
        // The first expansion case stays close to the table value.
        assert!((student_t_quantile(0.975, 3.0) - 3.1824).abs() < 5e-3);
    }

    #[test]
    fn ci_estimator_converges_on_constant_data() {
        let mut est = CiMeanEstimator::new("CoalitionProfit_0", 0.95, 0.04);
        est.collect(10.0);
        assert!(!est.done());
        est.collect(10.0);
        assert!(est.done());
        assert!((est.estimate() - 10.0).abs() < 1e-12);
    }

    #[test]
    fn ci_estimator_tracks_precision() {
        let mut est = CiMeanEstimator::new("AloneProfit_0", 0.95, 0.04);
        // High spread first: far from 4% relative precision.
        est.collect(100.0);
        est.collect(140.0);
        assert!(!est.done());
        // Many concordant observations shrink the half width.
        for _ in 0..200 {
            est.collect(120.0);
        }
        assert!(est.done());
    }

    #[test]
    fn ci_estimator_flags_non_finite_estimates() {
        let mut est = CiMeanEstimator::new("CoalitionProfit_1", 0.95, 0.04);
        est.collect(f64::INFINITY);
        assert!(est.unstable());
        assert!(!est.done());
    }
}
