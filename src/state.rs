//! State vector, covariance, and the small numeric invariants the filter
//! must re-establish after every predict and every correct.
//!
//! Index layout is contractual: external code addresses `X`,
//! `Q`, `R`, `Z`, `U` by position, not by name.

use nalgebra::{SMatrix, SVector};
use serde::{Deserialize, Serialize};

/// Number of filter states.
pub const NUMX: usize = 14;
/// Number of plant (process) disturbance-noise channels.
pub const NUMW: usize = 10;
/// Number of measurement channels.
pub const NUMV: usize = 10;
/// Number of deterministic inputs (gyro + accel).
pub const NUMU: usize = 6;

/// Gyro bias magnitude limit, `|b_g_i| <= DEG2RAD(10)`.
pub const GYRO_BIAS_LIMIT: f64 = 10.0 * std::f64::consts::PI / 180.0;
/// Z-axis accel bias magnitude limit.
pub const ACCEL_BIAS_LIMIT: f64 = 0.1;
/// Standard gravity, matching the constant the source uses.
pub const GRAVITY: f64 = 9.80665;

/// `X` indices.
pub mod idx {
    pub const POS: std::ops::Range<usize> = 0..3;
    pub const VEL: std::ops::Range<usize> = 3..6;
    pub const QUAT: std::ops::Range<usize> = 6..10;
    pub const GYRO_BIAS: std::ops::Range<usize> = 10..13;
    pub const ACCEL_BIAS_Z: usize = 13;
}

pub type StateVec = SVector<f64, NUMX>;
pub type CovMat = SMatrix<f64, NUMX, NUMX>;
pub type FMat = SMatrix<f64, NUMX, NUMX>;
pub type GMat = SMatrix<f64, NUMX, NUMW>;
pub type QVec = SVector<f64, NUMW>;
pub type RVec = SVector<f64, NUMV>;
pub type ZVec = SVector<f64, NUMV>;
pub type YVec = SVector<f64, NUMV>;
pub type HMat = SMatrix<f64, NUMV, NUMX>;
pub type UVec = SVector<f64, NUMU>;

/// A decoded snapshot of the state vector, handed back from `get_state`.
///
/// `accel_bias` reserves x/y for API symmetry with `gyro_bias`, but the
/// filter only ever estimates the z-axis component — x and y are always
/// zero here, by contract, not by omission.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub pos: [f64; 3],
    pub vel: [f64; 3],
    pub quat: [f64; 4],
    pub gyro_bias: [f64; 3],
    pub accel_bias: [f64; 3],
}

/// Normalize the quaternion block of `X` in place.
///
/// Returns `true` if the quaternion was degenerate (`‖q‖ < EPS`) and was
/// clamped to the identity rotation instead of normalized — the caller
/// logs a warning and bumps the anomaly counter in that case.
pub fn renormalize_quaternion(x: &mut StateVec) -> bool {
    const EPS: f64 = 1e-9;
    let q = x.fixed_rows::<4>(6);
    let norm = (q[0] * q[0] + q[1] * q[1] + q[2] * q[2] + q[3] * q[3]).sqrt();
    if norm < EPS {
        x[6] = 1.0;
        x[7] = 0.0;
        x[8] = 0.0;
        x[9] = 0.0;
        return true;
    }
    x[6] /= norm;
    x[7] /= norm;
    x[8] /= norm;
    x[9] /= norm;
    false
}

/// Clamp gyro bias and z-accel bias to their configured limits.
/// Saturation here is the designed behaviour, not an error.
pub fn limit_bias(x: &mut StateVec) {
    for i in 10..13 {
        x[i] = x[i].clamp(-GYRO_BIAS_LIMIT, GYRO_BIAS_LIMIT);
    }
    x[idx::ACCEL_BIAS_Z] = x[idx::ACCEL_BIAS_Z].clamp(-ACCEL_BIAS_LIMIT, ACCEL_BIAS_LIMIT);
}

/// Mirror the upper triangle of `p` onto the lower triangle so `P` stays
/// exactly symmetric (floating point round-off can otherwise break this by
/// a few ULPs across independently-computed upper/lower entries).
pub fn symmetrize(p: &mut CovMat) {
    for i in 0..NUMX {
        for j in (i + 1)..NUMX {
            let avg = 0.5 * (p[(i, j)] + p[(j, i)]);
            p[(i, j)] = avg;
            p[(j, i)] = avg;
        }
    }
}

/// `true` if every entry of `p` is finite.
pub fn is_finite(p: &CovMat) -> bool {
    p.iter().all(|v| v.is_finite())
}

pub fn snapshot_from_state(x: &StateVec) -> StateSnapshot {
    StateSnapshot {
        pos: [x[0], x[1], x[2]],
        vel: [x[3], x[4], x[5]],
        quat: [x[6], x[7], x[8], x[9]],
        gyro_bias: [x[10], x[11], x[12]],
        accel_bias: [0.0, 0.0, x[idx::ACCEL_BIAS_Z]],
    }
}

pub fn state_from_snapshot(s: &StateSnapshot) -> StateVec {
    StateVec::from_row_slice(&[
        s.pos[0],
        s.pos[1],
        s.pos[2],
        s.vel[0],
        s.vel[1],
        s.vel[2],
        s.quat[0],
        s.quat[1],
        s.quat[2],
        s.quat[3],
        s.gyro_bias[0],
        s.gyro_bias[1],
        s.gyro_bias[2],
        s.accel_bias[2],
    ])
}

/// Process-noise diagonal `Q`, with the filter's default values.
///
/// Layout: gyro noise [0..3), accel noise [3..6), gyro-bias random walk
/// [6..9), accel-bias random walk [9].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProcessNoiseConfig {
    pub gyro: [f64; 3],
    pub accel: [f64; 3],
    pub gyro_bias_walk: [f64; 3],
    pub accel_bias_walk: f64,
}

impl Default for ProcessNoiseConfig {
    fn default() -> Self {
        Self {
            gyro: [1e-5, 1e-5, 1e-5],
            accel: [1e-5, 1e-5, 1e-5],
            gyro_bias_walk: [1e-6, 1e-6, 1e-6],
            accel_bias_walk: 5e-4,
        }
    }
}

impl ProcessNoiseConfig {
    pub fn to_vec(self) -> QVec {
        QVec::from_row_slice(&[
            self.gyro[0],
            self.gyro[1],
            self.gyro[2],
            self.accel[0],
            self.accel[1],
            self.accel[2],
            self.gyro_bias_walk[0],
            self.gyro_bias_walk[1],
            self.gyro_bias_walk[2],
            self.accel_bias_walk,
        ])
    }
}

/// Measurement-noise diagonal `R`, with the filter's default values.
///
/// Layout: pos [0..3), vel [3..6), mag [6..9), baro [9].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeasurementNoiseConfig {
    pub pos: [f64; 3],
    pub vel: [f64; 3],
    pub mag: [f64; 3],
    pub baro: f64,
}

impl Default for MeasurementNoiseConfig {
    fn default() -> Self {
        Self {
            pos: [0.004, 0.004, 0.036],
            vel: [0.004, 0.004, 0.004],
            mag: [0.005, 0.005, 0.005],
            baro: 0.05,
        }
    }
}

impl MeasurementNoiseConfig {
    pub fn to_vec(self) -> RVec {
        RVec::from_row_slice(&[
            self.pos[0],
            self.pos[1],
            self.pos[2],
            self.vel[0],
            self.vel[1],
            self.vel[2],
            self.mag[0],
            self.mag[1],
            self.mag[2],
            self.baro,
        ])
    }
}

/// Default diagonal of `P` at `init()`.
pub fn default_p_diag() -> [f64; NUMX] {
    [
        25.0, 25.0, 25.0, // position variance (m^2)
        5.0, 5.0, 5.0, // velocity variance (m/s)^2
        1e-5, 1e-5, 1e-5, 1e-5, // quaternion variance
        1e-6, 1e-6, 1e-6, // gyro bias variance (rad/s)^2
        1e-5, // accel bias variance (m/s^2)^2
    ]
}
