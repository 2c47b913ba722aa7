//! Diagnostic surface for the estimator.
//!
//! The core has no fallible operations on its happy path — `predict()` and
//! `correct()` always return a state, never a `Result`. What they can do
//! instead is silently recover from a handful of named anomalies (a
//! degenerate quaternion, a covariance gone non-finite, a non-finite scalar
//! measurement). This module gives those anomalies a name and a counter so a
//! caller can notice without the estimator itself ever failing.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EstimatorAnomaly {
    #[error("quaternion degenerated to near-zero norm; reset to identity")]
    DegenerateQuaternion,
    #[error("covariance matrix contained a non-finite entry after predict")]
    NonFiniteCovariance,
    #[error("measurement channel {channel} produced a non-finite innovation and was skipped")]
    NonFiniteMeasurement { channel: usize },
}

/// Running counts of each anomaly kind, exposed read-only via
/// `Ekf14::anomaly_counts()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnomalyCounts {
    pub degenerate_quaternion: u64,
    pub non_finite_covariance: u64,
    pub non_finite_measurement: u64,
}

impl AnomalyCounts {
    pub fn record(&mut self, anomaly: EstimatorAnomaly) {
        match anomaly {
            EstimatorAnomaly::DegenerateQuaternion => self.degenerate_quaternion += 1,
            EstimatorAnomaly::NonFiniteCovariance => self.non_finite_covariance += 1,
            EstimatorAnomaly::NonFiniteMeasurement { .. } => self.non_finite_measurement += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.degenerate_quaternion + self.non_finite_covariance + self.non_finite_measurement
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_accumulate_per_kind() {
        let mut counts = AnomalyCounts::default();
        counts.record(EstimatorAnomaly::DegenerateQuaternion);
        counts.record(EstimatorAnomaly::NonFiniteMeasurement { channel: 3 });
        counts.record(EstimatorAnomaly::NonFiniteMeasurement { channel: 7 });
        assert_eq!(counts.degenerate_quaternion, 1);
        assert_eq!(counts.non_finite_measurement, 2);
        assert_eq!(counts.total(), 3);
    }

    #[test]
    fn display_messages_are_human_readable() {
        let msg = EstimatorAnomaly::NonFiniteMeasurement { channel: 2 }.to_string();
        assert!(msg.contains("channel 2"));
    }
}
