//! Probability-controlled corruption of otherwise valid generated values.
//!
//! Two policies are applied to every generated field, in a fixed order:
//!
//! 1. `with_outliers_*`: with probability `outlier_ratio`, replace the clean
//!    value with a draw from one of two out-of-range bands just outside the
//!    field's documented normal range `[low, high]` (coin flip between the
//!    bands). The result is out of range by construction.
//! 2. `maybe_null`: with probability `null_ratio`, drop the value entirely.
//!
//! The injector is not null-safe: callers always pass a concrete candidate
//! value and wrap the result in `Option` themselves via `maybe_null`. All
//! entropy comes from the run's general stream, so injection is reproducible
//! under a fixed seed.

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Width of the out-of-range bands on each side of the normal range.
const OUTLIER_BAND: f64 = 25.0;

/// Configured corruption probabilities for one generation run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DefectInjector {
    pub null_ratio: f64,
    pub outlier_ratio: f64,
}

impl DefectInjector {
    pub fn new(null_ratio: f64, outlier_ratio: f64) -> Self {
        Self {
            null_ratio,
            outlier_ratio,
        }
    }

    /// Drop `value` with probability `null_ratio`.
    pub fn maybe_null<T>(&self, rng: &mut ChaCha8Rng, value: T) -> Option<T> {
        if rng.gen::<f64>() < self.null_ratio {
            None
        } else {
            Some(value)
        }
    }

    /// One roll of the outlier gate.
    pub fn roll_outlier(&self, rng: &mut ChaCha8Rng) -> bool {
        rng.gen::<f64>() < self.outlier_ratio
    }

    /// Draw from one of the two out-of-range bands around `[low, high]`.
    ///
    /// The low band is `[low - 25, low)`, the high band `(high, high + 25]`;
    /// both exclude the range bounds themselves.
    pub fn outlier_band_f64(&self, rng: &mut ChaCha8Rng, low: f64, high: f64) -> f64 {
        if rng.gen::<f64>() < 0.5 {
            rng.gen_range(low - OUTLIER_BAND..low)
        } else {
            high + (OUTLIER_BAND - rng.gen_range(0.0..OUTLIER_BAND))
        }
    }

    /// Integer variant of the band draw; both bands exclude the range bounds
    /// so the result stays out of range after truncation to an integer.
    pub fn outlier_band_i64(&self, rng: &mut ChaCha8Rng, low: i64, high: i64) -> i64 {
        let band = OUTLIER_BAND as i64;
        if rng.gen::<f64>() < 0.5 {
            rng.gen_range(low - band..low)
        } else {
            rng.gen_range(high + 1..=high + band)
        }
    }

    /// Keep `value` with probability `1 - outlier_ratio`, else shift it out of
    /// the normal range `[low, high]`.
    pub fn with_outliers_f64(&self, rng: &mut ChaCha8Rng, value: f64, low: f64, high: f64) -> f64 {
        if self.roll_outlier(rng) {
            self.outlier_band_f64(rng, low, high)
        } else {
            value
        }
    }

    /// Integer counterpart of [`with_outliers_f64`](Self::with_outliers_f64).
    pub fn with_outliers_i64(&self, rng: &mut ChaCha8Rng, value: i64, low: i64, high: i64) -> i64 {
        if self.roll_outlier(rng) {
            self.outlier_band_i64(rng, low, high)
        } else {
            value
        }
    }
}

// =============================================================================
// RECOVERED-VALUE TRACKING
// =============================================================================

/// Why a field derivation fell back to a substitute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FallbackReason {
    /// The upstream timestamp did not parse in any known format.
    UnparseableTimestamp,
    /// An upstream input needed by the derivation had been nulled.
    MissingInput,
    /// The paired weather visibility was a textual sentinel, not meters.
    NonNumericVisibility,
}

/// Result of a fallback-capable field derivation.
///
/// `Recovered` carries the substitute value plus the reason, letting callers
/// distinguish clean from recovered cells for data-quality auditing. The
/// default extraction policy (`value()`) preserves silent-fallback behavior:
/// recovered values flow into the dataset exactly like clean ones.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Derived<T> {
    Clean(T),
    Recovered(T, FallbackReason),
}

impl<T> Derived<T> {
    pub fn value(self) -> T {
        match self {
            Derived::Clean(v) | Derived::Recovered(v, _) => v,
        }
    }

    pub fn is_recovered(&self) -> bool {
        matches!(self, Derived::Recovered(..))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::rng::RunRng;

    #[test]
    fn maybe_null_extremes() {
        let mut rng = RunRng::new(7, 7);
        let never = DefectInjector::new(0.0, 0.0);
        let always = DefectInjector::new(1.0, 0.0);
        for _ in 0..100 {
            assert_eq!(never.maybe_null(rng.general(), 1), Some(1));
            assert_eq!(always.maybe_null(rng.general(), 1), None);
        }
    }

    #[test]
    fn forced_outliers_leave_the_normal_range() {
        let mut rng = RunRng::new(11, 11);
        let inj = DefectInjector::new(0.0, 1.0);
        for _ in 0..500 {
            let v = inj.with_outliers_f64(rng.general(), 20.0, -10.0, 150.0);
            assert!(v < -10.0 || v > 150.0, "in-range outlier: {v}");
            let w = inj.with_outliers_i64(rng.general(), 20, -10, 150);
            assert!(w < -10 || w > 150, "in-range outlier: {w}");
        }
    }

    #[test]
    fn outliers_stay_within_the_bands() {
        let mut rng = RunRng::new(13, 13);
        let inj = DefectInjector::new(0.0, 1.0);
        for _ in 0..500 {
            let v = inj.with_outliers_f64(rng.general(), 0.0, 100.0, 200.0);
            assert!((75.0..100.0).contains(&v) || (200.0..=225.1).contains(&v));
        }
    }

    #[test]
    fn zero_ratio_passes_values_through() {
        let mut rng = RunRng::new(17, 17);
        let inj = DefectInjector::new(0.0, 0.0);
        for i in 0..100 {
            assert_eq!(inj.with_outliers_i64(rng.general(), i, 0, 1000), i);
        }
    }

    #[test]
    fn null_ratio_converges_empirically() {
        let mut rng = RunRng::new(19, 19);
        let inj = DefectInjector::new(0.1, 0.0);
        let n = 20_000;
        let nulls = (0..n)
            .filter(|_| inj.maybe_null(rng.general(), ()).is_none())
            .count();
        let frac = nulls as f64 / n as f64;
        assert!((frac - 0.1).abs() < 0.01, "null fraction {frac}");
    }

    #[test]
    fn derived_extraction() {
        let d = Derived::Recovered(5, FallbackReason::MissingInput);
        assert!(d.is_recovered());
        assert_eq!(d.value(), 5);
        assert!(!Derived::Clean(5).is_recovered());
    }
}
