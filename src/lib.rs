//! Maps between the natural coordinates of finite elements and physical space,
//! for locating points in elements and interpolating and integrating fields on them.
//!
//! Every element family implements the [`Map`] trait:
//! a forward map from natural coordinates on a canonical element
//! (the reference cube `[-1, 1]^3`, the unit simplex, etc.) to physical coordinates,
//! its jacobian, and an inverse map solved by Newton iteration
//! (or directly, for affine elements).
//! The families are
//! - affine: [`LinearTet`], [`LinearTri`]
//! - polynomial: [`LinearHex`], [`QuadraticHex`], [`LinearQuad`], [`LinearEdge`]
//! - curved surfaces on a sphere: [`SphericalQuad`], [`SphericalTri`]
//! - high-order spectral: [`SpectralHex`], [`SpectralQuad`],
//!   which share per-order basis data through a [`SpectralCache`]
//!
//! and [`Element`] wraps any of them in one type.
//!
//! # Locating a point
//!
//! The usual query against a candidate element goes through a cheap bounding box check,
//! then the inverse map, then a check that the natural coordinates are in the element.
//! [`Map::locate`] does all three:
//!
//! ```
//! use elem_map::{LinearHex, Map, NewtonParams, Vec3};
//!
//! let corners: Vec<Vec3> = LinearHex::CORNERS
//!     .iter()
//!     .map(|c| Vec3::new(c[0] + 1., c[1] + 1., 0.5 * c[2]))
//!     .collect();
//! let hex = LinearHex::new(&corners).unwrap();
//!
//! let params = NewtonParams::new(1e-10);
//! let xi = hex.locate(&Vec3::new(1.5, 0.5, 0.), 1e-6, &params).unwrap();
//! assert!((xi - Vec3::new(0.5, -0.5, 0.)).norm() < 1e-8);
//!
//! // with the natural coordinates, fields given at the vertices can be interpolated
//! let temperature = [0., 1., 1., 0., 0., 1., 1., 0.];
//! let t = hex.evaluate_scalar_field(&xi, &temperature).unwrap();
//! assert!((t - 0.75).abs() < 1e-8);
//!
//! assert_eq!(hex.locate(&Vec3::new(3., 0.5, 0.), 1e-6, &params), None);
//! ```
//!
//! Failures are reported as [`ArgError`] for malformed input
//! and [`EvaluationError`] for numerical failures such as a Newton solve not converging.
//! Diagnostics are emitted through the `log` facade.

#![warn(missing_docs)]

pub mod error;
#[doc(inline)]
pub use error::{ArgError, EvaluationError, EvaluationFailure, MapError};

pub mod map;
#[doc(inline)]
pub use map::{Map, NewtonParams};

pub mod element;
#[doc(inline)]
pub use element::{
    Element, ElementKind, LinearEdge, LinearHex, LinearQuad, LinearTet, LinearTri, QuadraticHex,
    SpectralHex, SpectralQuad, SphericalQuad, SphericalTri,
};

pub mod gll;
#[doc(inline)]
pub use gll::{SpectralBasis, SpectralCache};

pub mod bounds;

pub mod quadrature;

pub mod findpt;

// nalgebra re-exports of common types for convenience

pub use nalgebra as na;
/// Type alias for a 3D `nalgebra` vector.
pub type Vec3 = na::Vector3<f64>;
/// Type alias for a 3x3 `nalgebra` matrix.
pub type Mat3 = na::Matrix3<f64>;
