//! Measurement model `h(X, Be)`, its linearization `H`, the magnetometer
//! body-frame prerotation, and the serial scalar measurement update.

use crate::state::{limit_bias, CovMat, HMat, StateVec, YVec, ZVec, NUMV, NUMX};

/// Evaluate `Y = h(X, Be)`: position, velocity, yaw-rotated horizontal
/// magnetic field, and negative altitude.
pub fn h(x: &StateVec, be: &[f64; 3]) -> YVec {
    let q0 = x[6];
    let q1 = x[7];
    let q2 = x[8];
    let q3 = x[9];

    let mut y = YVec::zeros();
    y[0] = x[0];
    y[1] = x[1];
    y[2] = x[2];
    y[3] = x[3];
    y[4] = x[4];
    y[5] = x[5];

    let a1 = 2.0 * q0 * q3 + 2.0 * q1 * q2;
    let a2 = q0 * q0 + q1 * q1 - q2 * q2 - q3 * q3;
    let r = (a1 * a1 + a2 * a2).sqrt();
    let c_psi = a2 / r;
    let s_psi = a1 / r;
    y[6] = be[0] * c_psi + be[1] * s_psi;
    y[7] = -be[0] * s_psi + be[1] * c_psi;
    y[8] = 0.0;

    y[9] = -x[2];

    y
}

/// Evaluate `H = dh/dX` at the current state.
pub fn linearize_h(x: &StateVec, be: &[f64; 3]) -> HMat {
    let q0 = x[6];
    let q1 = x[7];
    let q2 = x[8];
    let q3 = x[9];

    let mut h = HMat::zeros();
    h[(0, 0)] = 1.0;
    h[(1, 1)] = 1.0;
    h[(2, 2)] = 1.0;
    h[(3, 3)] = 1.0;
    h[(4, 4)] = 1.0;
    h[(5, 5)] = 1.0;

    let be0 = be[0];
    let be1 = be[1];
    let a1 = 2.0 * q0 * q3 + 2.0 * q1 * q2;
    let a1s = a1 * a1;
    let a2 = q0 * q0 + q1 * q1 - q2 * q2 - q3 * q3;
    let a2s = a2 * a2;
    let a3 = 1.0 / (a1s + a2s).powf(1.5) * 0.5;

    let k1 = 1.0 / (a1s + a2s).sqrt();
    let k3 = a3 * a2;
    let k4 = a2 * 4.0;
    let k5 = a1 * 4.0;
    let k6 = a3 * a1;

    h[(6, 6)] = be0 * q0 * k1 * 2.0 + be1 * q3 * k1 * 2.0
        - be0 * (q0 * k4 + q3 * k5) * k3
        - be1 * (q0 * k4 + q3 * k5) * k6;
    h[(6, 7)] = be0 * q1 * k1 * 2.0 + be1 * q2 * k1 * 2.0
        - be0 * (q1 * k4 + q2 * k5) * k3
        - be1 * (q1 * k4 + q2 * k5) * k6;
    h[(6, 8)] = be0 * q2 * k1 * -2.0 + be1 * q1 * k1 * 2.0
        + be0 * (q2 * k4 - q1 * k5) * k3
        + be1 * (q2 * k4 - q1 * k5) * k6;
    h[(6, 9)] = be1 * q0 * k1 * 2.0 - be0 * q3 * k1 * 2.0
        + be0 * (q3 * k4 - q0 * k5) * k3
        + be1 * (q3 * k4 - q0 * k5) * k6;
    h[(7, 6)] = be1 * q0 * k1 * 2.0 - be0 * q3 * k1 * 2.0
        - be1 * (q0 * k4 + q3 * k5) * k3
        + be0 * (q0 * k4 + q3 * k5) * k6;
    h[(7, 7)] = be0 * q2 * k1 * -2.0 + be1 * q1 * k1 * 2.0
        - be1 * (q1 * k4 + q2 * k5) * k3
        + be0 * (q1 * k4 + q2 * k5) * k6;
    h[(7, 8)] = be0 * q1 * k1 * -2.0 - be1 * q2 * k1 * 2.0
        + be1 * (q2 * k4 - q1 * k5) * k3
        - be0 * (q2 * k4 - q1 * k5) * k6;
    h[(7, 9)] = be0 * q0 * k1 * -2.0 - be1 * q3 * k1 * 2.0
        + be1 * (q3 * k4 - q0 * k5) * k3
        - be0 * (q3 * k4 - q0 * k5) * k6;

    h[(9, 2)] = -1.0;

    h
}

/// Rotate a raw body-frame magnetometer reading into the measurement frame
/// using only the roll/pitch of the current attitude estimate — the
/// yaw-dependence lives entirely in [`h`]'s `c_psi`/`s_psi`, so this
/// prerotation deliberately leaves yaw out to avoid feeding the filter
/// circular information about the very heading it is trying to estimate.
pub fn rotate_mag_roll_pitch(x: &StateVec, mag_body: &[f64; 3]) -> [f64; 3] {
    let q0 = x[6];
    let q1 = x[7];
    let q2 = x[8];
    let q3 = x[9];

    let k1 = 1.0
        / ((q0 * q1 * 2.0 + q2 * q3 * 2.0).powi(2)
            + (q0 * q0 - q1 * q1 - q2 * q2 + q3 * q3).powi(2))
        .sqrt();
    let k2 = (-(q0 * q2 * 2.0 - q1 * q3 * 2.0).powi(2) + 1.0).sqrt();

    let r00 = k2;
    let r01 = 0.0;
    let r02 = -2.0 * q0 * q2 + 2.0 * q1 * q3;
    let r10 = k1 * (q0 * q1 * 2.0 + q2 * q3 * 2.0) * (q0 * q2 * 2.0 - q1 * q3 * 2.0);
    let r11 = k1 * (q0 * q0 - q1 * q1 - q2 * q2 + q3 * q3);
    let r12 = k1 * k2 * (q0 * q1 * 2.0 + q2 * q3 * 2.0);
    let r20 = k1 * (q0 * q2 * 2.0 - q1 * q3 * 2.0) * (q0 * q0 - q1 * q1 - q2 * q2 + q3 * q3);
    let r21 = -k1 * (q0 * q1 * 2.0 + q2 * q3 * 2.0);
    let r22 = k1 * k2 * (q0 * q0 - q1 * q1 - q2 * q2 + q3 * q3);

    [
        r00 * mag_body[0] + r10 * mag_body[1] + r20 * mag_body[2],
        r01 * mag_body[0] + r11 * mag_body[1] + r21 * mag_body[2],
        r02 * mag_body[0] + r12 * mag_body[1] + r22 * mag_body[2],
    ]
}

/// Serial scalar Kalman update over the channels named in `mask` (bit `m`
/// set selects channel `m`). Each selected channel's innovation is checked
/// for finiteness before it's applied; a non-finite channel is skipped (the
/// caller logs the anomaly) rather than corrupting `P`/`X`.
pub fn serial_update(
    h_mat: &HMat,
    r: &YVec,
    z: &ZVec,
    y: &YVec,
    p: &mut CovMat,
    x: &mut StateVec,
    mask: u16,
) -> Vec<usize> {
    let mut skipped = Vec::new();

    for m in 0..NUMV {
        if mask & (1 << m) == 0 {
            continue;
        }
        let error = z[m] - y[m];
        if !error.is_finite() {
            skipped.push(m);
            continue;
        }

        let mut hp = [0.0; NUMX];
        for j in 0..NUMX {
            let mut acc = 0.0;
            for k in 0..NUMX {
                acc += h_mat[(m, k)] * p[(k, j)];
            }
            hp[j] = acc;
        }

        let mut hphr = r[m];
        for k in 0..NUMX {
            hphr += hp[k] * h_mat[(m, k)];
        }

        let mut k_col = [0.0; NUMX];
        for k in 0..NUMX {
            k_col[k] = hp[k] / hphr;
        }

        for i in 0..NUMX {
            for j in i..NUMX {
                let updated = p[(i, j)] - k_col[i] * hp[j];
                p[(i, j)] = updated;
                p[(j, i)] = updated;
            }
        }

        for i in 0..NUMX {
            x[i] += k_col[i] * error;
        }
    }

    limit_bias(x);
    skipped
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn identity_state() -> StateVec {
        let mut x = StateVec::zeros();
        x[6] = 1.0;
        x
    }

    #[test]
    fn measurement_eq_passes_pos_vel_through() {
        let mut x = identity_state();
        x[0] = 1.0;
        x[4] = -2.0;
        let be = [1.0, 0.0, 0.0];
        let y = h(&x, &be);
        assert_eq!(y[0], 1.0);
        assert_eq!(y[4], -2.0);
    }

    #[test]
    fn measurement_eq_north_heading_at_identity_quaternion() {
        let x = identity_state();
        let be = [1.0, 0.0, 0.0];
        let y = h(&x, &be);
        assert_abs_diff_eq!(y[6], 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(y[7], 0.0, epsilon = 1e-9);
    }

    #[test]
    fn altitude_is_negative_down_position() {
        let mut x = identity_state();
        x[2] = 50.0;
        let be = [1.0, 0.0, 0.0];
        let y = h(&x, &be);
        assert_abs_diff_eq!(y[9], -50.0, epsilon = 1e-9);
    }

    #[test]
    fn linearize_h_pos_vel_block_is_identity() {
        let x = identity_state();
        let be = [1.0, 0.0, 0.0];
        let hm = linearize_h(&x, &be);
        for i in 0..6 {
            assert_eq!(hm[(i, i)], 1.0);
        }
        assert_eq!(hm[(9, 2)], -1.0);
    }

    #[test]
    fn mask_zero_update_is_identity() {
        let mut x = identity_state();
        x[0] = 12.0;
        let mut p = CovMat::identity();
        let h_mat = linearize_h(&x, &[1.0, 0.0, 0.0]);
        let r = YVec::repeat(0.01);
        let z = ZVec::zeros();
        let y = h(&x, &[1.0, 0.0, 0.0]);
        let before_x = x;
        let before_p = p;
        let skipped = serial_update(&h_mat, &r, &z, &y, &mut p, &mut x, 0);
        assert!(skipped.is_empty());
        assert_eq!(x, before_x);
        assert_eq!(p, before_p);
    }

    #[test]
    fn position_only_update_moves_position_toward_measurement() {
        let mut x = identity_state();
        x[0] = 10.0;
        let mut p = CovMat::identity();
        let h_mat = linearize_h(&x, &[1.0, 0.0, 0.0]);
        let r = YVec::repeat(0.01);
        let mut z = ZVec::zeros();
        z[0] = 0.0; // measured position is 0, prior believes 10
        let y = h(&x, &[1.0, 0.0, 0.0]);
        serial_update(&h_mat, &r, &z, &y, &mut p, &mut x, 0b1);
        assert!(x[0] < 10.0);
        assert!(x[0] > 0.0);
    }

    #[test]
    fn non_finite_error_channel_is_skipped() {
        let mut x = identity_state();
        let mut p = CovMat::identity();
        let h_mat = linearize_h(&x, &[1.0, 0.0, 0.0]);
        let r = YVec::repeat(0.01);
        let mut z = ZVec::zeros();
        z[0] = f64::NAN;
        let y = h(&x, &[1.0, 0.0, 0.0]);
        let before_x = x;
        let skipped = serial_update(&h_mat, &r, &z, &y, &mut p, &mut x, 0b1);
        assert_eq!(skipped, vec![0]);
        assert_eq!(x, before_x);
    }

    #[test]
    fn roll_pitch_prerotation_is_identity_when_level() {
        let x = identity_state();
        let mag = [0.3, 0.1, 0.9];
        let rotated = rotate_mag_roll_pitch(&x, &mag);
        assert_abs_diff_eq!(rotated[0], mag[0], epsilon = 1e-9);
        assert_abs_diff_eq!(rotated[1], mag[1], epsilon = 1e-9);
        assert_abs_diff_eq!(rotated[2], mag[2], epsilon = 1e-9);
    }
}
