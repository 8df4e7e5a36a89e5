//! Free functions for locating points in hexahedra.
//!
//! The trilinear functions are thin conveniences over [`LinearHex`]
//! for callers that only have a corner list at hand.
//! [`hex_findpt`] is an independent point location routine
//! for tensor product hexahedra of any order given as per-axis node coordinate arrays,
//! which searches only inside the reference cube and never fails,
//! instead reporting how far the closest point it found is from the query.

use nalgebra as na;

use crate::{
    element::LinearHex,
    error::{ArgError, EvaluationError, EvaluationFailure, MapError},
    gll::{SpectralBasis, TensorWeights},
    map::{check_field_len, check_vertex_count},
    Map, Mat3, NewtonParams, Vec3,
};

/// Position of each [`LinearHex`] corner in the lexicographic
/// (x fastest, then y, then z) node order of an order-2 tensor product element.
const LEXICOGRAPHIC_CORNERS: [usize; 8] = [0, 1, 3, 2, 4, 5, 7, 6];

/// Natural coordinates of `x` in the trilinear hexahedron with the given corners
/// (in [`LinearHex::CORNERS`] order), via Newton iteration to tolerance `tol`.
///
/// Points outside the hexahedron get coordinates outside the reference cube.
pub fn nat_coords_trilinear_hex(corners: &[Vec3], x: &Vec3, tol: f64) -> Result<Vec3, MapError> {
    LinearHex::new(corners)?.ievaluate(x, &NewtonParams::new(tol))
}

/// Check whether `x` is in the trilinear hexahedron with the given corners,
/// allowing natural coordinates up to `etol` outside the reference cube.
pub fn point_in_trilinear_hex(corners: &[Vec3], x: &Vec3, etol: f64) -> bool {
    let Ok(hex) = LinearHex::new(corners) else {
        return false;
    };
    hex.ievaluate(x, &NewtonParams::new(etol))
        .is_ok_and(|xi| hex.inside_nat_space(&xi, etol))
}

/// Same as [`point_in_trilinear_hex`], but rejecting points outside
/// a precomputed bounding box first.
pub fn point_in_trilinear_hex_in_box(
    corners: &[Vec3],
    x: &Vec3,
    box_min: &Vec3,
    box_max: &Vec3,
    etol: f64,
) -> bool {
    if (0..3).any(|i| x[i] < box_min[i] || x[i] > box_max[i]) {
        return false;
    }
    point_in_trilinear_hex(corners, x, etol)
}

/// Natural coordinates of `x` in the trilinear hexahedron with the given corners,
/// computed with [`hex_findpt`] instead of plain Newton iteration.
///
/// Since the search is confined to the reference cube,
/// points outside the hexahedron (by more than `tol`) fail to converge.
pub fn nat_coords_trilinear_hex2(corners: &[Vec3], x: &Vec3, tol: f64) -> Result<Vec3, MapError> {
    check_vertex_count(8, corners.len())?;
    let basis = SpectralBasis::new(2)?;
    let xm: [Vec<f64>; 3] = std::array::from_fn(|d| {
        LEXICOGRAPHIC_CORNERS
            .iter()
            .map(|&c| corners[c][d])
            .collect()
    });
    let params = NewtonParams::new(tol);
    let (xi, dist) = constrained_newton(&basis, [&xm[0], &xm[1], &xm[2]], x, &params);
    if dist > tol {
        return Err(EvaluationError::new(
            *x,
            corners,
            EvaluationFailure::NotConverged {
                iterations: params.max_iterations,
                residual: dist,
            },
        )
        .into());
    }
    Ok(xi)
}

/// Find the natural coordinates in the reference cube `[-1, 1]^3`
/// whose image is closest to `x` in a tensor product hexahedron.
///
/// `xm` holds the x, y and z coordinates of the element's nodes,
/// each in lexicographic order (node `i + n j + n^2 k` is at GLL coordinates `(i, j, k)`).
/// Returns the natural coordinates and the physical distance of their image from `x`,
/// which is below `params.tolerance` if the point is in the element.
///
/// Each iteration takes a Newton step and, if the step leaves the cube,
/// pins the offending coordinates to the boundary and redoes the step
/// as a least squares problem in the remaining ones.
pub fn hex_findpt(
    basis: &SpectralBasis,
    xm: [&[f64]; 3],
    x: &Vec3,
    params: &NewtonParams,
) -> Result<(Vec3, f64), ArgError> {
    let count = basis.node_count(3);
    for coords in xm {
        check_vertex_count(count, coords.len())?;
    }
    Ok(constrained_newton(basis, xm, x, params))
}

/// Interpolate a field given at the nodes of a tensor product hexahedron
/// (in the same order as in [`hex_findpt`]) to natural coordinates `rst`.
pub fn hex_eval(basis: &SpectralBasis, field: &[f64], rst: &Vec3) -> Result<f64, ArgError> {
    check_field_len(basis.node_count(3), field.len())?;
    Ok(TensorWeights::new(basis, [rst[0], rst[1], rst[2]]).value(field))
}

/// Integrate a trilinear field over a trilinear hexahedron
/// with an `num_pts`-point Gauss-Legendre rule per axis.
pub fn integrate_trilinear_hex(
    corners: &[Vec3],
    field: &[f64],
    num_pts: usize,
) -> Result<f64, ArgError> {
    LinearHex::new(corners)?
        .with_quadrature_order(num_pts)?
        .integrate_scalar_field(field)
}

/// Evaluate a tensor product hexahedron's map and its jacobian at `rst`.
pub(crate) fn hex_map_and_jacobian(
    basis: &SpectralBasis,
    xm: [&[f64]; 3],
    rst: &Vec3,
) -> (Vec3, Mat3) {
    let weights = TensorWeights::new(basis, [rst[0], rst[1], rst[2]]);
    let mut pos = Vec3::zeros();
    let mut jac = Mat3::zeros();
    for (d, coords) in xm.iter().enumerate() {
        let (val, grad) = weights.value_and_gradient(coords);
        pos[d] = val;
        for (c, g) in grad.iter().enumerate() {
            jac[(d, c)] = *g;
        }
    }
    (pos, jac)
}

/// The search behind [`hex_findpt`], without argument checks.
pub(crate) fn constrained_newton(
    basis: &SpectralBasis,
    xm: [&[f64]; 3],
    x: &Vec3,
    params: &NewtonParams,
) -> (Vec3, f64) {
    let mut rst = params
        .initial_guess
        .unwrap_or_else(Vec3::zeros)
        .map(|c| c.clamp(-1., 1.));
    let mut best = (rst, f64::INFINITY);

    for iter in 0..=params.max_iterations {
        let (pos, jac) = hex_map_and_jacobian(basis, xm, &rst);
        let residual = x - pos;
        let dist = residual.norm();
        if dist < best.1 {
            best = (rst, dist);
        }
        if dist <= params.tolerance || iter == params.max_iterations {
            break;
        }

        let Some(next) = constrained_step(&jac, &residual, &rst) else {
            log::trace!("findpt: singular jacobian at {:?}", rst.as_slice());
            break;
        };
        // stuck against the boundary
        if (next - rst).norm() <= f64::EPSILON {
            break;
        }
        rst = next;
        log::trace!("findpt iteration {iter}: distance {dist:e}");
    }

    best
}

/// One Newton step from `rst` towards reducing `residual`,
/// with coordinates that would leave the reference cube pinned to its boundary.
fn constrained_step(jac: &Mat3, residual: &Vec3, rst: &Vec3) -> Option<Vec3> {
    let mut target = *rst;
    let mut pinned = [false; 3];
    loop {
        let free: Vec<usize> = (0..3).filter(|&i| !pinned[i]).collect();
        if free.is_empty() {
            return Some(target);
        }
        // part of the residual left after moving the pinned coordinates
        let rhs = residual - jac * (target - rst);
        let jac_free = na::DMatrix::from_fn(3, free.len(), |r, c| jac[(r, free[c])]);
        let rhs = na::DVector::from_column_slice(rhs.as_slice());
        let delta = jac_free
            .tr_mul(&jac_free)
            .cholesky()?
            .solve(&jac_free.tr_mul(&rhs));

        let mut trial = target;
        for (c, &i) in free.iter().enumerate() {
            trial[i] = rst[i] + delta[c];
        }
        if !trial.iter().all(|c| c.is_finite()) {
            return None;
        }

        let leaving: Vec<usize> = free
            .into_iter()
            .filter(|&i| trial[i].abs() > 1.)
            .collect();
        if leaving.is_empty() {
            return Some(trial);
        }
        for i in leaving {
            pinned[i] = true;
            target[i] = trial[i].clamp(-1., 1.);
        }
    }
}
