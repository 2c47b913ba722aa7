//! Continuous-time nonlinear state equation `f(X, U)`.

use crate::state::{StateVec, UVec, GRAVITY};

/// Evaluate `Xdot = f(X, U)`.
///
/// `U[0..3]` is the raw gyro reading, `U[3..6]` the raw accel reading; both
/// are bias-corrected internally against `X[10..13]`/`X[13]`.
pub fn state_eq(x: &StateVec, u: &UVec) -> StateVec {
    let wx = u[0] - x[10];
    let wy = u[1] - x[11];
    let wz = u[2] - x[12];
    let ax = u[3];
    let ay = u[4];
    let az = u[5] - x[13];

    let q0 = x[6];
    let q1 = x[7];
    let q2 = x[8];
    let q3 = x[9];

    let mut xdot = StateVec::zeros();

    // pdot = v
    xdot[0] = x[3];
    xdot[1] = x[4];
    xdot[2] = x[5];

    // vdot = Reb(q) * a_body + (0, 0, g)
    xdot[3] = (q0 * q0 + q1 * q1 - q2 * q2 - q3 * q3) * ax
        + 2.0 * (q1 * q2 - q0 * q3) * ay
        + 2.0 * (q1 * q3 + q0 * q2) * az;
    xdot[4] = 2.0 * (q1 * q2 + q0 * q3) * ax
        + (q0 * q0 - q1 * q1 + q2 * q2 - q3 * q3) * ay
        + 2.0 * (q2 * q3 - q0 * q1) * az;
    xdot[5] = 2.0 * (q1 * q3 - q0 * q2) * ax
        + 2.0 * (q2 * q3 + q0 * q1) * ay
        + (q0 * q0 - q1 * q1 - q2 * q2 + q3 * q3) * az
        + GRAVITY;

    // qdot = 1/2 * Omega(w) * q
    xdot[6] = (-q1 * wx - q2 * wy - q3 * wz) / 2.0;
    xdot[7] = (q0 * wx - q3 * wy + q2 * wz) / 2.0;
    xdot[8] = (q3 * wx + q0 * wy - q1 * wz) / 2.0;
    xdot[9] = (-q2 * wx + q1 * wy + q0 * wz) / 2.0;

    // biases modeled as constant; their drift lives entirely in Q's random walk terms
    xdot[10] = 0.0;
    xdot[11] = 0.0;
    xdot[12] = 0.0;
    xdot[13] = 0.0;

    xdot
}
