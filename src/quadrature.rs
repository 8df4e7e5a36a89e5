//! Gauss-Legendre quadrature for integrating functions
//! over the reference line, square, cube and triangle.
//!
//! Element families pick a fixed rule sized for the polynomial degree of their shape functions
//! (see [`Map::integrate_scalar_field`][crate::Map::integrate_scalar_field]),
//! but the rules are usable on their own as well.
//! An `n`-point rule is exact for polynomials of degree `2n - 1` or less
//! in each coordinate direction.
//!
//! # Examples
//!
//! ```
//! # use elem_map::quadrature::GaussLegendre;
//! let rule = GaussLegendre::new(3).unwrap();
//! // integral of x^2 y^4 over [-1, 1]^2
//! let val = rule.integrate_square(|x, y| x.powi(2) * y.powi(4));
//! assert!((val - 4. / 15.).abs() < 1e-13);
//! ```

use itertools::iproduct;
use nalgebra as na;

use crate::error::ArgError;

/// Largest number of points per axis we're willing to generate.
pub const MAX_POINTS: usize = 64;

/// A single quadrature point on the reference line `[-1, 1]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GLPoint {
    /// Weight of the point.
    pub weight: f64,
    /// Position of the point on `[-1, 1]`.
    pub abscissa: f64,
}

// low orders are the ones the element families use all the time,
// so these are hardcoded instead of solved for.
// source for the weights:
// https://pomax.github.io/bezierinfo/legendre-gauss.html

const WEIGHTS_GL_1: [GLPoint; 1] = [GLPoint {
    weight: 2.0,
    abscissa: 0.0,
}];

const WEIGHTS_GL_2: [GLPoint; 2] = [
    GLPoint {
        weight: 1.0,
        abscissa: -0.5773502691896257,
    },
    GLPoint {
        weight: 1.0,
        abscissa: 0.5773502691896257,
    },
];

const WEIGHTS_GL_3: [GLPoint; 3] = [
    GLPoint {
        weight: 0.5555555555555556,
        abscissa: -0.7745966692414834,
    },
    GLPoint {
        weight: 0.8888888888888888,
        abscissa: 0.0000000000000000,
    },
    GLPoint {
        weight: 0.5555555555555556,
        abscissa: 0.7745966692414834,
    },
];

const WEIGHTS_GL_4: [GLPoint; 4] = [
    GLPoint {
        weight: 0.3478548451374538,
        abscissa: -0.8611363115940526,
    },
    GLPoint {
        weight: 0.6521451548625461,
        abscissa: -0.3399810435848563,
    },
    GLPoint {
        weight: 0.6521451548625461,
        abscissa: 0.3399810435848563,
    },
    GLPoint {
        weight: 0.3478548451374538,
        abscissa: 0.8611363115940526,
    },
];

/// An `n`-point Gauss-Legendre rule on `[-1, 1]`,
/// with tensor-product extensions to higher dimensions.
#[derive(Clone, Debug, PartialEq)]
pub struct GaussLegendre {
    points: Vec<GLPoint>,
}

impl GaussLegendre {
    /// Build a rule with `n` points.
    ///
    /// Rules up to 4 points come from a table,
    /// higher ones are computed as eigenvalues of the Jacobi matrix
    /// of the Legendre recurrence (Golub-Welsch).
    pub fn new(n: usize) -> Result<Self, ArgError> {
        let points = match n {
            1 => WEIGHTS_GL_1.to_vec(),
            2 => WEIGHTS_GL_2.to_vec(),
            3 => WEIGHTS_GL_3.to_vec(),
            4 => WEIGHTS_GL_4.to_vec(),
            5..=MAX_POINTS => golub_welsch(n),
            _ => return Err(ArgError::InvalidQuadrature(n)),
        };
        Ok(Self { points })
    }

    /// Number of points in the rule.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Always false, rules have at least one point.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The points of the rule in ascending order.
    #[inline]
    pub fn points(&self) -> &[GLPoint] {
        &self.points
    }

    /// Integrate a function over `[-1, 1]`.
    pub fn integrate_line(&self, f: impl Fn(f64) -> f64) -> f64 {
        self.points.iter().map(|p| p.weight * f(p.abscissa)).sum()
    }

    /// Integrate a function over `[-1, 1]^2`.
    pub fn integrate_square(&self, f: impl Fn(f64, f64) -> f64) -> f64 {
        iproduct!(&self.points, &self.points)
            .map(|(p, q)| p.weight * q.weight * f(p.abscissa, q.abscissa))
            .sum()
    }

    /// Integrate a function over `[-1, 1]^3`.
    pub fn integrate_cube(&self, f: impl Fn(f64, f64, f64) -> f64) -> f64 {
        iproduct!(&self.points, &self.points, &self.points)
            .map(|(p, q, r)| {
                p.weight * q.weight * r.weight * f(p.abscissa, q.abscissa, r.abscissa)
            })
            .sum()
    }

    /// Integrate a function over the reference triangle `(0,0), (1,0), (0,1)`.
    ///
    /// The square `[-1, 1]^2` is collapsed onto the triangle (Duffy transform),
    /// which costs one degree of exactness in the second direction
    /// but keeps every point strictly inside the triangle.
    pub fn integrate_triangle(&self, f: impl Fn(f64, f64) -> f64) -> f64 {
        self.integrate_square(|u, v| {
            let s = 0.5 * (1. + u);
            let t = 0.5 * (1. - s) * (1. + v);
            0.25 * (1. - s) * f(s, t)
        })
    }
}

/// Solve for the nodes and weights of an `n`-point rule.
fn golub_welsch(n: usize) -> Vec<GLPoint> {
    let betas: Vec<f64> = (1..n)
        .map(|i| 0.5 / (1.0 - (2.0 * i as f64).powi(-2)).sqrt())
        .collect();

    let jacobi = na::DMatrix::from_fn(n, n, |r, c| {
        if r == c + 1 {
            betas[c]
        } else if c == r + 1 {
            betas[r]
        } else {
            0.0
        }
    });
    let eigen = na::SymmetricEigen::new(jacobi);

    let mut points: Vec<GLPoint> = eigen
        .eigenvalues
        .iter()
        .zip(eigen.eigenvectors.row(0).iter())
        .map(|(&abscissa, v)| GLPoint {
            weight: 2.0 * v.powi(2),
            abscissa,
        })
        .collect();
    points.sort_by(|a, b| a.abscissa.total_cmp(&b.abscissa));
    points
}
