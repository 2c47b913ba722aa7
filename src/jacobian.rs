//! Linearization of the continuous state equation: `F = df/dX`, `G = df/dw`.
//!
//! Every element not assigned here is left at zero — the covariance
//! predictor (both realizations) relies on that.

use crate::state::{FMat, GMat, StateVec, UVec};

pub fn linearize_fg(x: &StateVec, u: &UVec) -> (FMat, GMat) {
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

    let mut f = FMat::zeros();
    let mut g = GMat::zeros();

    // dpdot/dv = I
    f[(0, 3)] = 1.0;
    f[(1, 4)] = 1.0;
    f[(2, 5)] = 1.0;

    // dvdot/dq
    f[(3, 6)] = 2.0 * (q0 * ax - q3 * ay + q2 * az);
    f[(3, 7)] = 2.0 * (q1 * ax + q2 * ay + q3 * az);
    f[(3, 8)] = 2.0 * (-q2 * ax + q1 * ay + q0 * az);
    f[(3, 9)] = 2.0 * (-q3 * ax - q0 * ay + q1 * az);
    f[(4, 6)] = 2.0 * (q3 * ax + q0 * ay - q1 * az);
    f[(4, 7)] = 2.0 * (q2 * ax - q1 * ay - q0 * az);
    f[(4, 8)] = 2.0 * (q1 * ax + q2 * ay + q3 * az);
    f[(4, 9)] = 2.0 * (q0 * ax - q3 * ay + q2 * az);
    f[(5, 6)] = 2.0 * (-q2 * ax + q1 * ay + q0 * az);
    f[(5, 7)] = 2.0 * (q3 * ax + q0 * ay - q1 * az);
    f[(5, 8)] = 2.0 * (-q0 * ax + q3 * ay - q2 * az);
    f[(5, 9)] = 2.0 * (q1 * ax + q2 * ay + q3 * az);

    // dvdot/d(b_az) and dvdot/d(accel noise, z channel) share the same
    // coefficients — both are "how does a perturbation along the body z
    // accel axis move through Reb into velocity".
    f[(3, 13)] = -2.0 * (q1 * q3 + q0 * q2);
    f[(4, 13)] = 2.0 * (-q2 * q3 + q0 * q1);
    f[(5, 13)] = -q0 * q0 + q1 * q1 + q2 * q2 - q3 * q3;
    g[(3, 5)] = f[(3, 13)];
    g[(4, 5)] = f[(4, 13)];
    g[(5, 5)] = f[(5, 13)];

    // dqdot/dq
    f[(6, 7)] = -wx / 2.0;
    f[(6, 8)] = -wy / 2.0;
    f[(6, 9)] = -wz / 2.0;
    f[(7, 6)] = wx / 2.0;
    f[(7, 8)] = wz / 2.0;
    f[(7, 9)] = -wy / 2.0;
    f[(8, 6)] = wy / 2.0;
    f[(8, 7)] = -wz / 2.0;
    f[(8, 9)] = wx / 2.0;
    f[(9, 6)] = wz / 2.0;
    f[(9, 7)] = wy / 2.0;
    f[(9, 8)] = -wx / 2.0;

    // dqdot/d(gyro bias)
    f[(6, 10)] = q1 / 2.0;
    f[(6, 11)] = q2 / 2.0;
    f[(6, 12)] = q3 / 2.0;
    f[(7, 10)] = -q0 / 2.0;
    f[(7, 11)] = q3 / 2.0;
    f[(7, 12)] = -q2 / 2.0;
    f[(8, 10)] = -q3 / 2.0;
    f[(8, 11)] = -q0 / 2.0;
    f[(8, 12)] = q1 / 2.0;
    f[(9, 10)] = q2 / 2.0;
    f[(9, 11)] = -q1 / 2.0;
    f[(9, 12)] = -q0 / 2.0;

    // dvdot/d(accel noise), x and y channels
    g[(3, 3)] = -q0 * q0 - q1 * q1 + q2 * q2 + q3 * q3;
    g[(3, 4)] = 2.0 * (-q1 * q2 + q0 * q3);
    g[(4, 3)] = -2.0 * (q1 * q2 + q0 * q3);
    g[(4, 4)] = -q0 * q0 + q1 * q1 - q2 * q2 + q3 * q3;
    g[(5, 3)] = 2.0 * (-q1 * q3 + q0 * q2);
    g[(5, 4)] = -2.0 * (q2 * q3 + q0 * q1);

    // dqdot/d(gyro noise) -- identical structure to dqdot/d(gyro bias)
    g[(6, 0)] = q1 / 2.0;
    g[(6, 1)] = q2 / 2.0;
    g[(6, 2)] = q3 / 2.0;
    g[(7, 0)] = -q0 / 2.0;
    g[(7, 1)] = q3 / 2.0;
    g[(7, 2)] = -q2 / 2.0;
    g[(8, 0)] = -q3 / 2.0;
    g[(8, 1)] = -q0 / 2.0;
    g[(8, 2)] = q1 / 2.0;
    g[(9, 0)] = q2 / 2.0;
    g[(9, 1)] = -q1 / 2.0;
    g[(9, 2)] = -q0 / 2.0;

    // d(gyro bias)dot/d(gyro bias random walk) = I
    g[(10, 6)] = 1.0;
    g[(11, 7)] = 1.0;
    g[(12, 8)] = 1.0;

    // d(accel-z-bias)dot/d(accel-bias random walk) = 1
    g[(13, 9)] = 1.0;

    (f, g)
}
