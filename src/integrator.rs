//! Classical 4th-order Runge-Kutta integration of `f(X, U)`.

use crate::dynamics::state_eq;
use crate::state::{StateVec, UVec};

/// Advance `x` by `dt` seconds under constant input `u` over the step.
pub fn rk4(x: &StateVec, u: &UVec, dt: f64) -> StateVec {
    let k1 = state_eq(x, u);
    let k2 = state_eq(&(x + k1 * (dt / 2.0)), u);
    let k3 = state_eq(&(x + k2 * (dt / 2.0)), u);
    let k4 = state_eq(&(x + k3 * dt), u);
    x + (k1 + k2 * 2.0 + k3 * 2.0 + k4) * (dt / 6.0)
}
