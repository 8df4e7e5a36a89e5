//! The element families implementing [`Map`],
//! and an [`Element`] enum for handling any of them through one type.

mod affine;
#[doc(inline)]
pub use affine::{LinearTet, LinearTri};

mod polynomial;
#[doc(inline)]
pub use polynomial::{LinearEdge, LinearHex, LinearQuad, QuadraticHex};

mod spherical;
#[doc(inline)]
pub use spherical::{GnomonicProjection, SphericalQuad, SphericalTri};

mod spectral;
#[doc(inline)]
pub use spectral::{SpectralHex, SpectralQuad};

use std::sync::Arc;

use crate::{
    error::{ArgError, MapError},
    gll::{SpectralBasis, SpectralCache},
    Map, Mat3, NewtonParams, Vec3,
};

/// Tag identifying an element family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ElementKind {
    /// [`LinearTet`]
    LinearTet,
    /// [`LinearTri`]
    LinearTri,
    /// [`LinearHex`]
    LinearHex,
    /// [`QuadraticHex`]
    QuadraticHex,
    /// [`LinearQuad`]
    LinearQuad,
    /// [`LinearEdge`]
    LinearEdge,
    /// [`SphericalQuad`]
    SphericalQuad,
    /// [`SphericalTri`]
    SphericalTri,
    /// [`SpectralHex`]
    SpectralHex,
    /// [`SpectralQuad`]
    SpectralQuad,
}

impl ElementKind {
    /// Number of vertices an element of this kind has,
    /// or None for spectral kinds where it depends on the order.
    pub fn vertex_count(self) -> Option<usize> {
        match self {
            Self::LinearEdge => Some(2),
            Self::LinearTri | Self::SphericalTri => Some(3),
            Self::LinearTet | Self::LinearQuad | Self::SphericalQuad => Some(4),
            Self::LinearHex => Some(8),
            Self::QuadraticHex => Some(27),
            Self::SpectralHex | Self::SpectralQuad => None,
        }
    }

    /// Intrinsic dimension of elements of this kind.
    pub fn natural_dim(self) -> usize {
        match self {
            Self::LinearEdge => 1,
            Self::LinearTri
            | Self::SphericalTri
            | Self::LinearQuad
            | Self::SphericalQuad
            | Self::SpectralQuad => 2,
            Self::LinearTet | Self::LinearHex | Self::QuadraticHex | Self::SpectralHex => 3,
        }
    }

    /// Whether elements of this kind need a spectral basis.
    #[inline]
    pub fn is_spectral(self) -> bool {
        matches!(self, Self::SpectralHex | Self::SpectralQuad)
    }
}

/// An element of any family.
#[derive(Clone, Debug, PartialEq)]
#[allow(missing_docs)]
pub enum Element {
    LinearTet(LinearTet),
    LinearTri(LinearTri),
    LinearHex(LinearHex),
    QuadraticHex(QuadraticHex),
    LinearQuad(LinearQuad),
    LinearEdge(LinearEdge),
    SphericalQuad(SphericalQuad),
    SphericalTri(SphericalTri),
    SpectralHex(SpectralHex),
    SpectralQuad(SpectralQuad),
}

/// Call the same expression on whichever element is inside.
macro_rules! dispatch {
    ($self:expr, $el:ident => $body:expr) => {
        match $self {
            Element::LinearTet($el) => $body,
            Element::LinearTri($el) => $body,
            Element::LinearHex($el) => $body,
            Element::QuadraticHex($el) => $body,
            Element::LinearQuad($el) => $body,
            Element::LinearEdge($el) => $body,
            Element::SphericalQuad($el) => $body,
            Element::SphericalTri($el) => $body,
            Element::SpectralHex($el) => $body,
            Element::SpectralQuad($el) => $body,
        }
    };
}

impl Element {
    /// Create an element of the given kind from its vertices.
    ///
    /// Spectral kinds infer their order from the number of vertices
    /// and build a basis of their own;
    /// use [`new_cached`][Self::new_cached] to share bases between elements.
    pub fn new(kind: ElementKind, vertices: &[Vec3]) -> Result<Self, ArgError> {
        Ok(match kind {
            ElementKind::LinearTet => Self::LinearTet(LinearTet::new(vertices)?),
            ElementKind::LinearTri => Self::LinearTri(LinearTri::new(vertices)?),
            ElementKind::LinearHex => Self::LinearHex(LinearHex::new(vertices)?),
            ElementKind::QuadraticHex => Self::QuadraticHex(QuadraticHex::new(vertices)?),
            ElementKind::LinearQuad => Self::LinearQuad(LinearQuad::new(vertices)?),
            ElementKind::LinearEdge => Self::LinearEdge(LinearEdge::new(vertices)?),
            ElementKind::SphericalQuad => Self::SphericalQuad(SphericalQuad::new(vertices)?),
            ElementKind::SphericalTri => Self::SphericalTri(SphericalTri::new(vertices)?),
            ElementKind::SpectralHex | ElementKind::SpectralQuad => {
                let order = spectral_order(kind, vertices.len())?;
                Self::new_spectral(kind, Arc::new(SpectralBasis::new(order)?), vertices)?
            }
        })
    }

    /// Like [`new`][Self::new], but spectral kinds take their basis from `cache`,
    /// initializing it if necessary.
    pub fn new_cached(
        kind: ElementKind,
        vertices: &[Vec3],
        cache: &mut SpectralCache,
    ) -> Result<Self, ArgError> {
        if !kind.is_spectral() {
            return Self::new(kind, vertices);
        }
        let order = spectral_order(kind, vertices.len())?;
        Self::new_spectral(kind, cache.init(order)?, vertices)
    }

    fn new_spectral(
        kind: ElementKind,
        basis: Arc<SpectralBasis>,
        vertices: &[Vec3],
    ) -> Result<Self, ArgError> {
        let mut el = if kind == ElementKind::SpectralHex {
            Self::SpectralHex(SpectralHex::new(basis))
        } else {
            Self::SpectralQuad(SpectralQuad::new(basis))
        };
        el.set_vertices(vertices)?;
        Ok(el)
    }

    /// The kind of this element.
    pub fn kind(&self) -> ElementKind {
        match self {
            Self::LinearTet(_) => ElementKind::LinearTet,
            Self::LinearTri(_) => ElementKind::LinearTri,
            Self::LinearHex(_) => ElementKind::LinearHex,
            Self::QuadraticHex(_) => ElementKind::QuadraticHex,
            Self::LinearQuad(_) => ElementKind::LinearQuad,
            Self::LinearEdge(_) => ElementKind::LinearEdge,
            Self::SphericalQuad(_) => ElementKind::SphericalQuad,
            Self::SphericalTri(_) => ElementKind::SphericalTri,
            Self::SpectralHex(_) => ElementKind::SpectralHex,
            Self::SpectralQuad(_) => ElementKind::SpectralQuad,
        }
    }
}

/// Order of a spectral element with `count` nodes.
fn spectral_order(kind: ElementKind, count: usize) -> Result<usize, ArgError> {
    let dim = kind.natural_dim() as u32;
    let order = (count as f64).powf(1. / dim as f64).round() as usize;
    if order.pow(dim) != count {
        return Err(ArgError::VertexCount {
            expected: order.max(2).pow(dim),
            actual: count,
        });
    }
    Ok(order)
}

impl Map for Element {
    fn vertices(&self) -> &[Vec3] {
        dispatch!(self, el => el.vertices())
    }

    fn natural_dim(&self) -> usize {
        dispatch!(self, el => el.natural_dim())
    }

    fn set_vertices(&mut self, vertices: &[Vec3]) -> Result<(), ArgError> {
        dispatch!(self, el => el.set_vertices(vertices))
    }

    fn evaluate(&self, xi: &Vec3) -> Vec3 {
        dispatch!(self, el => el.evaluate(xi))
    }

    fn ievaluate(&self, x: &Vec3, params: &NewtonParams) -> Result<Vec3, MapError> {
        dispatch!(self, el => el.ievaluate(x, params))
    }

    fn inside_box(&self, x: &Vec3, tol: f64) -> bool {
        dispatch!(self, el => el.inside_box(x, tol))
    }

    fn inside_nat_space(&self, xi: &Vec3, tol: f64) -> bool {
        dispatch!(self, el => el.inside_nat_space(xi, tol))
    }

    fn jacobian(&self, xi: &Vec3) -> Mat3 {
        dispatch!(self, el => el.jacobian(xi))
    }

    fn ijacobian(&self, xi: &Vec3) -> Result<Mat3, ArgError> {
        dispatch!(self, el => el.ijacobian(xi))
    }

    fn det_jacobian(&self, xi: &Vec3) -> f64 {
        dispatch!(self, el => el.det_jacobian(xi))
    }

    fn det_ijacobian(&self, xi: &Vec3) -> Result<f64, ArgError> {
        dispatch!(self, el => el.det_ijacobian(xi))
    }

    fn evaluate_scalar_field(&self, xi: &Vec3, vertex_values: &[f64]) -> Result<f64, ArgError> {
        dispatch!(self, el => el.evaluate_scalar_field(xi, vertex_values))
    }

    fn integrate_scalar_field(&self, vertex_values: &[f64]) -> Result<f64, ArgError> {
        dispatch!(self, el => el.integrate_scalar_field(vertex_values))
    }
}
