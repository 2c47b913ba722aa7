//! `Ekf14`: the single public entry point tying `state`/`dynamics`/
//! `jacobian`/`integrator`/`covariance`/`measurement` together into the
//! operation table.

use log::warn;

use crate::covariance::predict_sparse;
use crate::error::{AnomalyCounts, EstimatorAnomaly};
use crate::integrator::rk4;
use crate::jacobian::linearize_fg;
use crate::measurement::{h, linearize_h, rotate_mag_roll_pitch, serial_update};
use crate::state::{
    default_p_diag, is_finite, limit_bias, renormalize_quaternion, snapshot_from_state,
    state_from_snapshot, symmetrize, CovMat, FMat, GMat, MeasurementNoiseConfig,
    ProcessNoiseConfig, StateSnapshot, StateVec, UVec, YVec, ZVec, NUMX,
};

/// A 14-state INS/GPS fusion Extended Kalman Filter.
///
/// Single-threaded-owned: all operations are synchronous and non-blocking,
/// and the struct holds no lock of its own. A caller sharing
/// `P`/`X` with another task is expected to serialise access itself.
pub struct Ekf14 {
    x: StateVec,
    p: CovMat,
    /// Jacobians linearized at the state `predict()` last saw *before*
    /// integrating it, under that call's real `(gyro, accel)` input.
    /// `predict_covariance()` consumes these rather than relinearizing,
    /// since the covariance predictor and the state integrator must see
    /// the same `F`/`G`.
    f: FMat,
    g: GMat,
    q: ProcessNoiseConfig,
    r: MeasurementNoiseConfig,
    be: [f64; 3],
    anomalies: AnomalyCounts,
}

impl Default for Ekf14 {
    fn default() -> Self {
        Self::init()
    }
}

impl Ekf14 {
    /// Reset all state to defaults.
    pub fn init() -> Self {
        let mut x = StateVec::zeros();
        x[6] = 1.0; // identity quaternion
        let mut p = CovMat::zeros();
        for (i, v) in default_p_diag().iter().enumerate() {
            p[(i, i)] = *v;
        }
        Self {
            x,
            p,
            f: FMat::zeros(),
            g: GMat::zeros(),
            q: ProcessNoiseConfig::default(),
            r: MeasurementNoiseConfig::default(),
            be: [1.0, 0.0, 0.0],
            anomalies: AnomalyCounts::default(),
        }
    }

    pub fn num_states(&self) -> usize {
        NUMX
    }

    pub fn anomaly_counts(&self) -> AnomalyCounts {
        self.anomalies
    }

    pub fn get_state(&self) -> StateSnapshot {
        snapshot_from_state(&self.x)
    }

    pub fn get_variance(&self) -> [f64; NUMX] {
        let mut diag = [0.0; NUMX];
        for (i, slot) in diag.iter_mut().enumerate() {
            *slot = self.p[(i, i)];
        }
        diag
    }

    /// All 14 rows of `P`, for a telemetry consumer that wants the full
    /// covariance rather than just the diagonal.
    pub fn get_p_rows(&self) -> Vec<[f64; NUMX]> {
        (0..NUMX)
            .map(|i| {
                let mut row = [0.0; NUMX];
                for (j, slot) in row.iter_mut().enumerate() {
                    *slot = self.p[(i, j)];
                }
                row
            })
            .collect()
    }

    /// For each nonzero `diag[i]`, zero row/col `i` of `P` and set
    /// `P[i][i] = diag[i]`.
    pub fn reset_p(&mut self, diag: &[f64; NUMX]) {
        for i in 0..NUMX {
            if diag[i] != 0.0 {
                for j in 0..NUMX {
                    self.p[(i, j)] = 0.0;
                    self.p[(j, i)] = 0.0;
                }
                self.p[(i, i)] = diag[i];
            }
        }
    }

    pub fn set_state(&mut self, s: &StateSnapshot) {
        self.x = state_from_snapshot(s);
    }

    /// Zero the first six rows/cols of `P`, restore default pos/vel
    /// variance on the diagonal, overwrite `X[0..6)`.
    pub fn pos_vel_reset(&mut self, pos: [f64; 3], vel: [f64; 3]) {
        let defaults = default_p_diag();
        for i in 0..6 {
            for j in 0..NUMX {
                self.p[(i, j)] = 0.0;
                self.p[(j, i)] = 0.0;
            }
            self.p[(i, i)] = defaults[i];
        }
        self.x[0] = pos[0];
        self.x[1] = pos[1];
        self.x[2] = pos[2];
        self.x[3] = vel[0];
        self.x[4] = vel[1];
        self.x[5] = vel[2];
    }

    pub fn set_pos_vel_var(&mut self, pos: [f64; 3], vel: [f64; 3]) {
        self.r.pos = pos;
        self.r.vel = vel;
    }

    pub fn set_gyro_var(&mut self, gyro: [f64; 3]) {
        self.q.gyro = gyro;
    }

    pub fn set_accel_var(&mut self, accel: [f64; 3]) {
        self.q.accel = accel;
    }

    pub fn set_gyro_bias_var(&mut self, gyro_bias_walk: [f64; 3]) {
        self.q.gyro_bias_walk = gyro_bias_walk;
    }

    pub fn set_mag_var(&mut self, mag: [f64; 3]) {
        self.r.mag = mag;
    }

    pub fn set_baro_var(&mut self, baro: f64) {
        self.r.baro = baro;
    }

    pub fn set_mag_north(&mut self, be: [f64; 3]) {
        self.be = be;
    }

    pub fn set_gyro_bias(&mut self, bias: [f64; 3]) {
        self.x[10] = bias[0];
        self.x[11] = bias[1];
        self.x[12] = bias[2];
    }

    /// Only the z component is stored
    /// — x and y are accepted for API symmetry and discarded.
    pub fn set_accel_bias(&mut self, bias: [f64; 3]) {
        self.x[13] = bias[2];
    }

    /// Advance the state by `dT` seconds under `(gyro, accel)`.
    /// A non-positive `dT` is a no-op.
    ///
    /// Linearizes `F`/`G` at the pre-step state under this call's actual
    /// input first and caches them, then integrates — `predict_covariance()`
    /// later propagates `P` using these same cached Jacobians rather than
    /// relinearizing at the post-integration state.
    pub fn predict(&mut self, gyro: [f64; 3], accel: [f64; 3], dt: f64) {
        if dt <= 0.0 {
            return;
        }
        let u = UVec::from_row_slice(&[
            gyro[0], gyro[1], gyro[2], accel[0], accel[1], accel[2],
        ]);
        let (f, g) = linearize_fg(&self.x, &u);
        self.f = f;
        self.g = g;
        self.x = rk4(&self.x, &u, dt);
        self.renormalize();
        limit_bias(&mut self.x);
    }

    /// Propagate `P` by `dT` seconds using the sparse specialized
    /// realization — the form an embedded target would
    /// actually run; [`crate::covariance::predict_general`] exists as the
    /// reference form the tests check it against.
    ///
    /// Uses the `F`/`G` the last `predict()` call cached, linearized at the
    /// pre-integration state under the real `(gyro, accel)` input, rather
    /// than relinearizing here.
    pub fn predict_covariance(&mut self, dt: f64) {
        if dt <= 0.0 {
            return;
        }
        let q = self.q.to_vec();
        self.p = predict_sparse(&self.p, &self.f, &self.g, &q, dt);
        symmetrize(&mut self.p);
        if !is_finite(&self.p) {
            warn!("{}", EstimatorAnomaly::NonFiniteCovariance);
            self.anomalies.record(EstimatorAnomaly::NonFiniteCovariance);
            self.reset_p(&default_p_diag());
        }
    }

    /// Apply a correction tick. `mask` bits: 0..2 pos,
    /// 3..5 vel, 6..8 mag, 9 baro.
    pub fn correct(
        &mut self,
        mag: [f64; 3],
        pos: [f64; 3],
        vel: [f64; 3],
        baro_alt: f64,
        mask: u16,
    ) {
        let mut z = ZVec::zeros();
        z[0] = pos[0];
        z[1] = pos[1];
        z[2] = pos[2];
        z[3] = vel[0];
        z[4] = vel[1];
        z[5] = vel[2];

        if mask & 0b1_1100_0000 != 0 {
            let rotated = rotate_mag_roll_pitch(&self.x, &mag);
            z[6] = rotated[0];
            z[7] = rotated[1];
            z[8] = rotated[2];
        }
        z[9] = baro_alt;

        let h_mat = linearize_h(&self.x, &self.be);
        let y: YVec = h(&self.x, &self.be);
        let r = self.r.to_vec();

        let skipped = serial_update(&h_mat, &r, &z, &y, &mut self.p, &mut self.x, mask);
        for channel in skipped {
            let anomaly = EstimatorAnomaly::NonFiniteMeasurement { channel };
            warn!("{}", anomaly);
            self.anomalies.record(anomaly);
        }

        symmetrize(&mut self.p);
        self.renormalize();
        limit_bias(&mut self.x);
    }

    fn renormalize(&mut self) {
        if renormalize_quaternion(&mut self.x) {
            warn!("{}", EstimatorAnomaly::DegenerateQuaternion);
            self.anomalies.record(EstimatorAnomaly::DegenerateQuaternion);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::PI;

    const GRAVITY: f64 = 9.80665;

    #[test]
    fn scenario_a_static_on_ground() {
        let mut ekf = Ekf14::init();
        for _ in 0..1000 {
            ekf.predict([0.0, 0.0, 0.0], [0.0, 0.0, -GRAVITY], 0.002);
        }
        let s = ekf.get_state();
        let pos_norm = (s.pos[0].powi(2) + s.pos[1].powi(2) + s.pos[2].powi(2)).sqrt();
        let vel_norm = (s.vel[0].powi(2) + s.vel[1].powi(2) + s.vel[2].powi(2)).sqrt();
        assert!(pos_norm < 1e-3, "pos_norm = {pos_norm}");
        assert!(vel_norm < 1e-3, "vel_norm = {vel_norm}");
        assert_abs_diff_eq!(s.quat[0], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn scenario_c_yaw_rotation() {
        let mut ekf = Ekf14::init();
        for _ in 0..100 {
            ekf.predict([0.0, 0.0, PI / 2.0], [0.0, 0.0, -GRAVITY], 0.01);
        }
        let s = ekf.get_state();
        let vel_norm = (s.vel[0].powi(2) + s.vel[1].powi(2) + s.vel[2].powi(2)).sqrt();
        assert!(vel_norm < 1e-2, "vel_norm = {vel_norm}");
        // yaw of pi/2 => q ~ (cos(pi/4), 0, 0, sin(pi/4))
        assert_abs_diff_eq!(s.quat[0], (PI / 4.0).cos(), epsilon = 1e-2);
        assert_abs_diff_eq!(s.quat[3], (PI / 4.0).sin(), epsilon = 1e-2);
    }

    #[test]
    fn scenario_d_gps_only_update() {
        let mut ekf = Ekf14::init();
        ekf.correct([1.0, 0.0, 0.0], [10.0, 0.0, 0.0], [0.0, 0.0, 0.0], 0.0, 0b0000_0111);
        let s = ekf.get_state();
        let expected_x = 10.0 * 25.0 / (25.0 + 0.004);
        assert_abs_diff_eq!(s.pos[0], expected_x, epsilon = 1e-6);
        assert_abs_diff_eq!(s.pos[1], 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(s.pos[2], 0.0, epsilon = 1e-9);
    }

    #[test]
    fn scenario_e_mask_zero_is_exact_identity() {
        let mut a = Ekf14::init();
        let mut b = Ekf14::init();
        a.correct([1.0, 0.0, 0.0], [5.0, 5.0, 5.0], [1.0, 1.0, 1.0], 2.0, 0);
        let sa = a.get_state();
        let sb = b.get_state();
        assert_eq!(sa, sb);
        assert_eq!(a.get_variance(), b.get_variance());
    }

    #[test]
    fn scenario_f_reset_p_sets_requested_diagonal() {
        let mut ekf = Ekf14::init();
        ekf.predict([0.01, 0.0, 0.0], [0.0, 0.0, -GRAVITY], 0.01);
        let diag = [1.0; NUMX];
        ekf.reset_p(&diag);
        assert_eq!(ekf.get_variance(), diag);
    }

    #[test]
    fn invariant_round_trip_set_get_state() {
        let mut ekf = Ekf14::init();
        let s = StateSnapshot {
            pos: [1.0, -2.0, 3.0],
            vel: [0.1, 0.2, -0.3],
            quat: [0.9, 0.1, 0.2, 0.3],
            gyro_bias: [0.001, -0.001, 0.002],
            accel_bias: [0.0, 0.0, 0.01],
        };
        ekf.set_state(&s);
        assert_eq!(ekf.get_state(), s);
    }

    #[test]
    fn invariant_quaternion_stays_unit_after_predict() {
        let mut ekf = Ekf14::init();
        ekf.predict([0.3, -0.2, 0.1], [0.2, -0.1, -GRAVITY + 0.3], 0.02);
        let s = ekf.get_state();
        let norm = (s.quat[0].powi(2) + s.quat[1].powi(2) + s.quat[2].powi(2) + s.quat[3].powi(2))
            .sqrt();
        assert_abs_diff_eq!(norm, 1.0, epsilon = 1e-4);
    }

    #[test]
    fn invariant_bias_limits_respected_after_correct() {
        let mut ekf = Ekf14::init();
        ekf.set_gyro_bias([1.0, 1.0, 1.0]);
        ekf.set_accel_bias([0.0, 0.0, 5.0]);
        ekf.correct([1.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], 0.0, 0b11_1111_1111);
        let s = ekf.get_state();
        for b in s.gyro_bias {
            assert!(b.abs() <= crate::state::GYRO_BIAS_LIMIT + 1e-9);
        }
        assert!(s.accel_bias[2].abs() <= crate::state::ACCEL_BIAS_LIMIT + 1e-9);
    }

    #[test]
    fn invariant_bias_limits_respected_after_predict() {
        let mut ekf = Ekf14::init();
        ekf.set_gyro_bias([1.0, 1.0, 1.0]);
        ekf.set_accel_bias([0.0, 0.0, 5.0]);
        ekf.predict([0.0, 0.0, 0.0], [0.0, 0.0, -GRAVITY], 0.01);
        let s = ekf.get_state();
        for b in s.gyro_bias {
            assert!(b.abs() <= crate::state::GYRO_BIAS_LIMIT + 1e-9);
        }
        assert!(s.accel_bias[2].abs() <= crate::state::ACCEL_BIAS_LIMIT + 1e-9);
    }

    #[test]
    fn predict_covariance_uses_the_jacobian_cached_by_predict() {
        // With a real rotation rate and specific force, predict() must cache
        // F/G evaluated at those nonzero inputs; predict_covariance() then
        // grows the attitude/velocity cross-covariance from that coupling.
        // A stale U=0 linearization would zero those terms out and P[3][6]
        // would stay exactly 0.
        let mut ekf = Ekf14::init();
        ekf.predict([0.1, 0.0, 0.0], [0.2, 0.3, -GRAVITY], 0.01);
        ekf.predict_covariance(0.01);
        assert_ne!(ekf.p[(3, 6)], 0.0);
    }

    #[test]
    fn invariant_covariance_stays_symmetric() {
        let mut ekf = Ekf14::init();
        ekf.predict([0.05, 0.0, 0.0], [0.0, 0.0, -GRAVITY], 0.01);
        ekf.predict_covariance(0.01);
        ekf.correct([1.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 0.0], 0.0, 0b11_1111_1111);
        for i in 0..NUMX {
            for j in 0..NUMX {
                assert_eq!(ekf.p[(i, j)], ekf.p[(j, i)]);
            }
        }
    }

    #[test]
    fn non_positive_dt_is_a_noop() {
        let mut ekf = Ekf14::init();
        let before = ekf.get_state();
        ekf.predict([1.0, 1.0, 1.0], [1.0, 1.0, 1.0], 0.0);
        ekf.predict([1.0, 1.0, 1.0], [1.0, 1.0, 1.0], -1.0);
        assert_eq!(ekf.get_state(), before);
    }

    #[test]
    fn accel_bias_x_y_are_always_zero() {
        let mut ekf = Ekf14::init();
        ekf.set_accel_bias([7.0, 8.0, 0.03]);
        let s = ekf.get_state();
        assert_eq!(s.accel_bias[0], 0.0);
        assert_eq!(s.accel_bias[1], 0.0);
        assert_abs_diff_eq!(s.accel_bias[2], 0.03, epsilon = 1e-12);
    }
}
