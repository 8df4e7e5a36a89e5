//! The common interface of all element maps.
//!
//! A [`Map`] parameterizes an element by the positions of its vertices (or nodes),
//! taking natural coordinates `xi` on the canonical element to physical coordinates `x`.
//! Every family implements the forward map, its jacobian and the natural-space inside test;
//! the inverse map, the bounding box prefilter and the jacobian inverses
//! have default implementations here that families override when they can do better.

use crate::{
    bounds::BoundingBox,
    error::{ArgError, EvaluationError, EvaluationFailure, MapError},
    Mat3, Vec3,
};

/// Ratio of `|det J|` to the product of the column norms of `J`
/// below which a jacobian is considered singular.
pub const DEGENERACY_TOL: f64 = 1e-12;

/// Parameters controlling the Newton iteration in [`Map::ievaluate`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NewtonParams {
    /// Physical-space distance between `evaluate(xi)` and the query point
    /// below which the iteration is considered converged.
    /// Default: `1e-6`.
    pub tolerance: f64,
    /// Maximum number of Newton steps before giving up.
    /// Default: 10.
    pub max_iterations: usize,
    /// Natural coordinates to start the iteration from.
    /// Default: `None`, which starts from the natural-space origin.
    pub initial_guess: Option<Vec3>,
    /// Iterates with an intrinsic natural coordinate larger than this in magnitude
    /// are considered diverged. Default: `1e3`.
    pub divergence_bound: f64,
}

impl Default for NewtonParams {
    fn default() -> Self {
        Self {
            tolerance: 1e-6,
            max_iterations: 10,
            initial_guess: None,
            divergence_bound: 1e3,
        }
    }
}

impl NewtonParams {
    /// Default parameters with the given convergence tolerance.
    pub fn new(tolerance: f64) -> Self {
        Self {
            tolerance,
            ..Default::default()
        }
    }

    /// Start the iteration from `x0` instead of the natural-space origin.
    pub fn with_initial_guess(mut self, x0: Vec3) -> Self {
        self.initial_guess = Some(x0);
        self
    }

    /// Change the iteration cap.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }
}

/// A map from the canonical ("natural") coordinates of an element to physical 3D space,
/// defined by a fixed number of vertices.
///
/// Shape functions on the element are obtained by pushing forward
/// the shape functions of the canonical element through this map.
/// Elements of lower intrinsic dimension (edges, triangles, quadrilaterals)
/// are extended to full 3D maps by using the remaining natural coordinates
/// as signed distances off the element, so the same 3x3 machinery works for all families.
pub trait Map {
    /// The vertices (or nodes) defining the map.
    fn vertices(&self) -> &[Vec3];

    /// Number of vertices.
    #[inline]
    fn size(&self) -> usize {
        self.vertices().len()
    }

    /// Intrinsic dimension of the element:
    /// 1 for edges, 2 for surface elements, 3 for solids.
    /// Only this many natural coordinates are checked by [`inside_nat_space`][Self::inside_nat_space].
    fn natural_dim(&self) -> usize;

    /// Replace the vertices, recomputing anything cached from them.
    ///
    /// Fails if the number of vertices doesn't match the family
    /// or if the new element is degenerate.
    fn set_vertices(&mut self, vertices: &[Vec3]) -> Result<(), ArgError>;

    /// Evaluate the map at natural coordinates `xi`, giving physical coordinates.
    fn evaluate(&self, xi: &Vec3) -> Vec3;

    /// Evaluate the inverse map, finding natural coordinates `xi`
    /// such that `evaluate(xi)` is within `params.tolerance` of `x`.
    ///
    /// The default implementation is a Newton-Raphson iteration
    /// (see [`newton_inverse`]).
    fn ievaluate(&self, x: &Vec3, params: &NewtonParams) -> Result<Vec3, MapError> {
        newton_inverse(self, x, params)
    }

    /// Cheap test whether `x` is within the bounding box of the vertices
    /// grown by `tol`. Used to skip Newton solves that can't succeed.
    fn inside_box(&self, x: &Vec3, tol: f64) -> bool {
        BoundingBox::from_points(self.vertices()).is_some_and(|b| b.contains(x, tol))
    }

    /// Test whether natural coordinates lie in the canonical element, up to `tol`.
    fn inside_nat_space(&self, xi: &Vec3, tol: f64) -> bool;

    /// Evaluate the jacobian matrix of the map at `xi`.
    /// Column `i` is the derivative of the map with respect to `xi[i]`.
    fn jacobian(&self, xi: &Vec3) -> Mat3;

    /// Evaluate the inverse of the jacobian matrix at `xi`.
    fn ijacobian(&self, xi: &Vec3) -> Result<Mat3, ArgError> {
        invert_jacobian(&self.jacobian(xi))
    }

    /// Determinant of the jacobian at `xi`,
    /// i.e. the local volume (or area, or length) scaling from natural to physical space.
    fn det_jacobian(&self, xi: &Vec3) -> f64 {
        self.jacobian(xi).determinant()
    }

    /// Determinant of the inverse jacobian at `xi`.
    fn det_ijacobian(&self, xi: &Vec3) -> Result<f64, ArgError> {
        let j = self.jacobian(xi);
        if is_singular(&j) {
            return Err(ArgError::Degenerate {
                det: j.determinant(),
            });
        }
        Ok(1. / j.determinant())
    }

    /// Interpolate a scalar field given by its values at the vertices
    /// to the point with natural coordinates `xi`.
    fn evaluate_scalar_field(&self, xi: &Vec3, vertex_values: &[f64]) -> Result<f64, ArgError>;

    /// Integrate a scalar field given by its values at the vertices over the element.
    fn integrate_scalar_field(&self, vertex_values: &[f64]) -> Result<f64, ArgError>;

    /// Find the natural coordinates of `x` if it lies in the element.
    ///
    /// Runs the whole query pipeline: the bounding box check (grown by `tol`),
    /// the inverse map, and the natural-space check with `tol`.
    /// Any failure along the way means the point isn't in this element and gives `None`.
    fn locate(&self, x: &Vec3, tol: f64, params: &NewtonParams) -> Option<Vec3> {
        if !self.inside_box(x, tol) {
            return None;
        }
        let xi = self.ievaluate(x, params).ok()?;
        self.inside_nat_space(&xi, tol).then_some(xi)
    }
}

/// The generic Newton-Raphson inverse map.
///
/// Starting from `params.initial_guess` (or the origin),
/// repeats `xi <- xi - J(xi)^-1 (F(xi) - x)`
/// until `|F(xi) - x| < params.tolerance`.
/// Fails if the iteration cap is hit, the jacobian becomes singular,
/// or an iterate leaves `params.divergence_bound`.
pub fn newton_inverse<M: Map + ?Sized>(
    map: &M,
    x: &Vec3,
    params: &NewtonParams,
) -> Result<Vec3, MapError> {
    let tol_sq = params.tolerance * params.tolerance;
    let mut xi = params.initial_guess.unwrap_or_else(Vec3::zeros);
    let mut delta = map.evaluate(&xi) - x;

    let mut iters = 0;
    while delta.norm_squared() > tol_sq {
        if iters >= params.max_iterations {
            return Err(EvaluationError::new(
                *x,
                map.vertices(),
                EvaluationFailure::NotConverged {
                    iterations: iters,
                    residual: delta.norm(),
                },
            )
            .into());
        }
        iters += 1;

        let j = map.jacobian(&xi);
        let Some(j_inv) = (!is_singular(&j)).then(|| j.try_inverse()).flatten() else {
            return Err(EvaluationError::new(
                *x,
                map.vertices(),
                EvaluationFailure::SingularJacobian {
                    det: j.determinant(),
                },
            )
            .into());
        };
        xi -= j_inv * delta;

        if diverged(&xi, map.natural_dim(), params.divergence_bound) {
            return Err(
                EvaluationError::new(*x, map.vertices(), EvaluationFailure::Diverged).into(),
            );
        }
        delta = map.evaluate(&xi) - x;
        log::trace!("newton iteration {iters}: residual {:e}", delta.norm());
    }

    Ok(xi)
}

/// Check whether a jacobian is (numerically) singular.
///
/// The determinant is compared against the product of the column norms,
/// which bounds it from above (Hadamard's inequality),
/// making the test independent of the element's size.
pub fn is_singular(j: &Mat3) -> bool {
    let scale: f64 = j.column_iter().map(|c| c.norm()).product();
    let det = j.determinant();
    // negated comparison so that NaNs count as singular
    !(det.abs() > DEGENERACY_TOL * scale)
}

/// Invert a jacobian, failing with [`ArgError::Degenerate`] if it's singular.
pub fn invert_jacobian(j: &Mat3) -> Result<Mat3, ArgError> {
    let degenerate = || ArgError::Degenerate {
        det: j.determinant(),
    };
    if is_singular(j) {
        return Err(degenerate());
    }
    j.try_inverse().ok_or_else(degenerate)
}

fn diverged(xi: &Vec3, natural_dim: usize, bound: f64) -> bool {
    !xi.iter().all(|c| c.is_finite()) || xi.iter().take(natural_dim).any(|c| c.abs() > bound)
}

/// Fail with [`ArgError::VertexCount`] unless `actual == expected`.
#[inline]
pub(crate) fn check_vertex_count(expected: usize, actual: usize) -> Result<(), ArgError> {
    if expected != actual {
        return Err(ArgError::VertexCount { expected, actual });
    }
    Ok(())
}

/// Fail with [`ArgError::FieldLength`] unless `actual == expected`.
#[inline]
pub(crate) fn check_field_len(expected: usize, actual: usize) -> Result<(), ArgError> {
    if expected != actual {
        return Err(ArgError::FieldLength { expected, actual });
    }
    Ok(())
}
