//! 14-state INS/GPS fusion EKF core for a small airborne vehicle.
//!
//! Fuses rate gyroscope and accelerometer inputs with GPS position/velocity,
//! a three-axis magnetometer, and a barometric altimeter into a continuous
//! estimate of position, velocity, attitude, gyro bias, and vertical
//! accelerometer bias in a local NED frame. See [`Ekf14`] for the entry
//! point.

pub mod covariance;
pub mod dynamics;
pub mod error;
pub mod filter;
pub mod integrator;
pub mod jacobian;
pub mod measurement;
pub mod state;

pub use error::{AnomalyCounts, EstimatorAnomaly};
pub use filter::Ekf14;
pub use state::{MeasurementNoiseConfig, ProcessNoiseConfig, StateSnapshot};
