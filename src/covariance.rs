//! Discrete covariance propagation:
//!
//! ```text
//! P <- (I + F*dT) P (I + F*dT)^T + dT^2 * G Q G^T
//! ```
//!
//! Two realizations are provided, required to agree to within float
//! tolerance:
//!
//! - [`predict_general`] — a dense O(N^3) reference form over `ndarray`.
//! - [`predict_sparse`] — the same formula evaluated only at the F/G entries
//!   that are structurally nonzero. Every entry this skips is exactly zero
//!   in the general form too, so the two are equal by construction rather
//!   than by coincidence of floating point rounding.

use nalgebra::SMatrix;
use ndarray::Array2;

use crate::state::{CovMat, FMat, GMat, QVec, NUMW, NUMX};

/// F's structurally-nonzero `(row, col)` entries.
const F_NONZERO: &[(usize, usize)] = &[
    (0, 3),
    (1, 4),
    (2, 5),
    (3, 6), (3, 7), (3, 8), (3, 9), (3, 13),
    (4, 6), (4, 7), (4, 8), (4, 9), (4, 13),
    (5, 6), (5, 7), (5, 8), (5, 9), (5, 13),
    (6, 7), (6, 8), (6, 9), (6, 10), (6, 11), (6, 12),
    (7, 6), (7, 8), (7, 9), (7, 10), (7, 11), (7, 12),
    (8, 6), (8, 7), (8, 9), (8, 10), (8, 11), (8, 12),
    (9, 6), (9, 7), (9, 8), (9, 10), (9, 11), (9, 12),
];

/// G's structurally-nonzero `(row, col)` entries.
const G_NONZERO: &[(usize, usize)] = &[
    (3, 3), (3, 4), (3, 5),
    (4, 3), (4, 4), (4, 5),
    (5, 3), (5, 4), (5, 5),
    (6, 0), (6, 1), (6, 2),
    (7, 0), (7, 1), (7, 2),
    (8, 0), (8, 1), (8, 2),
    (9, 0), (9, 1), (9, 2),
    (10, 6),
    (11, 7),
    (12, 8),
    (13, 9),
];

/// General O(N^3) realization: builds `A = I + F*dT` densely, then
/// `P' = A P A^T + dT^2 G Q G^T`, entirely over `ndarray::Array2`.
pub fn predict_general(p: &CovMat, f: &FMat, g: &GMat, q: &QVec, dt: f64) -> CovMat {
    let a = to_ndarray_square(f) * dt + Array2::eye(NUMX);
    let p_nd = to_ndarray_square(p);
    let g_nd = to_ndarray_rect(g);

    let mut q_diag = Array2::<f64>::zeros((NUMW, NUMW));
    for i in 0..NUMW {
        q_diag[(i, i)] = q[i];
    }

    let at = a.t().to_owned();
    let term1 = a.dot(&p_nd).dot(&at);
    let term2 = g_nd.dot(&q_diag).dot(&g_nd.t()) * (dt * dt);

    from_ndarray_square(&(term1 + term2))
}

/// Sparse specialized realization: identical algebra, but every sum is taken
/// only over the index pairs [`F_NONZERO`]/[`G_NONZERO`] enumerate, instead
/// of over the full `N x N` / `N x NUMW` grids.
pub fn predict_sparse(p: &CovMat, f: &FMat, g: &GMat, q: &QVec, dt: f64) -> CovMat {
    // term1 = A P A^T, but A differs from I only at F_NONZERO entries, so
    // expand (I + dF)(P)(I + dF)^T without ever touching a full N^3 product
    // over zero entries.
    // A P
    let mut ap = *p;
    for &(i, k) in F_NONZERO {
        let coeff = f[(i, k)] * dt;
        for j in 0..NUMX {
            ap[(i, j)] += coeff * p[(k, j)];
        }
    }
    let term1 = ap;
    // (A P) A^T
    let mut result = term1;
    for &(j, k) in F_NONZERO {
        let coeff = f[(j, k)] * dt;
        for i in 0..NUMX {
            result[(i, j)] += term1[(i, k)] * coeff;
        }
    }

    // term2 = dT^2 * G Q G^T, restricted to G_NONZERO.
    let mut gq = SMatrix::<f64, NUMX, NUMW>::zeros();
    for &(i, k) in G_NONZERO {
        gq[(i, k)] = g[(i, k)] * q[k];
    }
    for &(i, k) in G_NONZERO {
        for &(j, k2) in G_NONZERO {
            if k2 == k {
                result[(i, j)] += gq[(i, k)] * g[(j, k)] * dt * dt;
            }
        }
    }

    result
}

fn to_ndarray_square<const N: usize>(m: &SMatrix<f64, N, N>) -> Array2<f64> {
    let mut out = Array2::zeros((N, N));
    for i in 0..N {
        for j in 0..N {
            out[(i, j)] = m[(i, j)];
        }
    }
    out
}

fn to_ndarray_rect(m: &GMat) -> Array2<f64> {
    let mut out = Array2::zeros((NUMX, NUMW));
    for i in 0..NUMX {
        for j in 0..NUMW {
            out[(i, j)] = m[(i, j)];
        }
    }
    out
}

fn from_ndarray_square(a: &Array2<f64>) -> CovMat {
    let mut out = CovMat::zeros();
    for i in 0..NUMX {
        for j in 0..NUMX {
            out[(i, j)] = a[(i, j)];
        }
    }
    out
}
