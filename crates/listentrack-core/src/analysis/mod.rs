//! Calibration and prediction.
//!
//! Turns raw samples plus sparse ground truth into stream estimates.
//! Nothing here writes to the store.

mod calibration;
mod prediction;

pub use calibration::{CalibrationEngine, DEFAULT_FACTOR, CalibrationPoint, CalibrationSummary};
pub use prediction::{Estimate, Prediction, PredictionEngine, Trend, TrendDirection, Unavailable};

/// Round to `decimals` places, half away from zero.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::round_to;

    #[test]
    fn rounding() {
        assert_eq!(round_to(123.456, 1), 123.5);
        assert_eq!(round_to(1.2, 3), 1.2);
        assert_eq!(round_to(479.996, 2), 480.0);
    }
}
