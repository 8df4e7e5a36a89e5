//! Error types produced by element maps.
//!
//! Failures come in two kinds.
//! [`ArgError`] means the caller handed over something structurally wrong
//! (a vertex list of the wrong length, a degenerate element, an uninitialized spectral order).
//! [`EvaluationError`] means a numerical query failed,
//! most commonly a Newton solve that didn't converge.
//! Both are expected outcomes when probing candidate elements for a point,
//! so callers usually treat them as "the point is not in this element"
//! and move on to the next candidate.

use crate::Vec3;

/// Structurally invalid input to a map operation.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ArgError {
    /// The vertex list doesn't match the arity of the element family.
    #[error("expected {expected} vertices, got {actual}")]
    VertexCount {
        /// Number of vertices the element requires.
        expected: usize,
        /// Number of vertices given.
        actual: usize,
    },
    /// The field value list doesn't have one value per vertex.
    #[error("expected {expected} field values, got {actual}")]
    FieldLength {
        /// Number of vertices (or nodes) of the element.
        expected: usize,
        /// Number of values given.
        actual: usize,
    },
    /// The element has zero (or numerically zero) volume,
    /// so its jacobian can't be inverted.
    #[error("degenerate element (jacobian determinant {det})")]
    Degenerate {
        /// The offending determinant.
        det: f64,
    },
    /// A point can't be projected onto the tangent plane of a spherical element
    /// because it lies on or behind the plane through the sphere's center.
    #[error("point {0:?} is not in the hemisphere of the tangent point")]
    Projection(Vec3),
    /// Spectral elements need at least two nodes per axis.
    #[error("invalid spectral order {0} (at least 2 nodes per axis are required)")]
    InvalidOrder(usize),
    /// No basis for this order has been built in the [`SpectralCache`][crate::gll::SpectralCache].
    #[error("spectral basis of order {0} has not been initialized")]
    MissingBasis(usize),
    /// A quadrature rule with this number of points isn't available.
    #[error("invalid number of quadrature points: {0}")]
    InvalidQuadrature(usize),
}

/// Why an [`EvaluationError`] happened.
#[derive(thiserror::Error, Clone, Copy, Debug, PartialEq)]
pub enum EvaluationFailure {
    /// The iteration cap was reached with the residual still above tolerance.
    #[error("no convergence after {iterations} iterations (residual {residual:e})")]
    NotConverged {
        /// Iterations performed.
        iterations: usize,
        /// Physical-space distance between the last iterate's image and the query point.
        residual: f64,
    },
    /// The jacobian became singular (or inverted) at an iterate.
    #[error("singular jacobian (determinant {det:e})")]
    SingularJacobian {
        /// Determinant at the failing iterate.
        det: f64,
    },
    /// The iterate left any plausible natural-space bracket
    /// or became non-finite.
    #[error("iteration diverged")]
    Diverged,
}

/// A numerical query on an element failed.
///
/// Carries the query point and a snapshot of the element's vertices
/// so the failure can be diagnosed after the fact.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("evaluation failed at {point:?}: {reason}")]
pub struct EvaluationError {
    /// The physical point that was being located.
    pub point: Vec3,
    /// The vertices of the element at the time of the failure.
    pub vertices: Vec<Vec3>,
    /// What went wrong.
    pub reason: EvaluationFailure,
}

impl EvaluationError {
    pub(crate) fn new(point: Vec3, vertices: &[Vec3], reason: EvaluationFailure) -> Self {
        log::debug!(
            "evaluation failed at p = {:?} ({reason}), element has {} vertices",
            point.as_slice(),
            vertices.len(),
        );
        for v in vertices {
            log::trace!("  vertex {:?}", v.as_slice());
        }
        Self {
            point,
            vertices: vertices.to_vec(),
            reason,
        }
    }
}

/// Either kind of failure, returned by operations that can fail both ways.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum MapError {
    /// See [`ArgError`].
    #[error(transparent)]
    Arg(#[from] ArgError),
    /// See [`EvaluationError`].
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
}
