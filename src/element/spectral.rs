//! High-order spectral elements: hexahedra and quadrilaterals
//! interpolating their node positions with tensor products of Lagrange polynomials
//! on Gauss-Lobatto-Legendre nodes.
//!
//! The 1D operators come from a shared [`SpectralBasis`],
//! usually obtained from a [`SpectralCache`].
//! Nodes are numbered lexicographically with the first natural coordinate varying fastest:
//! node `i + n j + n^2 k` sits at GLL coordinates `(nodes[i], nodes[j], nodes[k])`.
//! Each element also keeps the node coordinates as separate x, y and z arrays
//! ([`get_gl_points`][SpectralHex::get_gl_points]) for the tensor contractions.

use std::sync::Arc;

use itertools::iproduct;
use nalgebra as na;

use crate::{
    error::{ArgError, EvaluationError, EvaluationFailure, MapError},
    findpt::{constrained_newton, hex_map_and_jacobian},
    gll::{SpectralBasis, SpectralCache, TensorWeights},
    map::{check_field_len, check_vertex_count, newton_inverse, DEGENERACY_TOL},
    Map, Mat3, NewtonParams, Vec3,
};

use super::{polynomial::inside_reference_cube, LinearHex, LinearQuad};

/// Split node positions into per-axis coordinate arrays.
fn split_coords(nodes: &[Vec3]) -> [Vec<f64>; 3] {
    std::array::from_fn(|d| nodes.iter().map(|p| p[d]).collect())
}

/// Check that per-axis coordinate arrays all have `count` entries
/// and zip them into node positions.
fn join_coords(count: usize, x: &[f64], y: &[f64], z: &[f64]) -> Result<Vec<Vec3>, ArgError> {
    for coords in [x, y, z] {
        check_vertex_count(count, coords.len())?;
    }
    Ok(itertools::izip!(x, y, z)
        .map(|(x, y, z)| Vec3::new(*x, *y, *z))
        .collect())
}

//
// hex
//

/// A spectral hexahedron with `order^3` nodes.
#[derive(Clone, Debug, PartialEq)]
pub struct SpectralHex {
    basis: Arc<SpectralBasis>,
    nodes: Vec<Vec3>,
    coords: [Vec<f64>; 3],
}

impl SpectralHex {
    /// Create an element using the given basis,
    /// initially with its nodes at their reference positions (the identity map).
    pub fn new(basis: Arc<SpectralBasis>) -> Self {
        let n = basis.order();
        let gll = basis.nodes();
        let nodes: Vec<Vec3> = iproduct!(0..n, 0..n, 0..n)
            .map(|(k, j, i)| Vec3::new(gll[i], gll[j], gll[k]))
            .collect();
        let coords = split_coords(&nodes);
        Self {
            basis,
            nodes,
            coords,
        }
    }

    /// Create an element with the basis of the given order from a cache,
    /// failing with [`ArgError::MissingBasis`] if it hasn't been initialized.
    pub fn from_cache(cache: &SpectralCache, order: usize) -> Result<Self, ArgError> {
        Ok(Self::new(cache.get(order)?))
    }

    /// Number of nodes per axis.
    #[inline]
    pub fn order(&self) -> usize {
        self.basis.order()
    }

    /// The basis this element interpolates with.
    #[inline]
    pub fn basis(&self) -> &Arc<SpectralBasis> {
        &self.basis
    }

    /// Set the node positions from per-axis coordinate arrays of `order^3` entries each.
    pub fn set_gl_points(&mut self, x: &[f64], y: &[f64], z: &[f64]) -> Result<(), ArgError> {
        self.nodes = join_coords(self.basis.node_count(3), x, y, z)?;
        self.coords = [x.to_vec(), y.to_vec(), z.to_vec()];
        Ok(())
    }

    /// The node positions as per-axis coordinate arrays.
    pub fn get_gl_points(&self) -> [&[f64]; 3] {
        [&self.coords[0], &self.coords[1], &self.coords[2]]
    }

    /// Place the nodes by trilinear interpolation of 8 corners
    /// given in [`LinearHex::CORNERS`] order.
    pub fn compute_gl_positions(&mut self, corners: &[Vec3]) -> Result<(), ArgError> {
        check_vertex_count(8, corners.len())?;
        let n = self.order();
        let gll = self.basis.nodes();
        let nodes: Vec<Vec3> = iproduct!(0..n, 0..n, 0..n)
            .map(|(k, j, i)| {
                let xi = Vec3::new(gll[i], gll[j], gll[k]);
                LinearHex::shape_functions(&xi)
                    .iter()
                    .zip(corners)
                    .fold(Vec3::zeros(), |acc, (w, c)| acc + *w * c)
            })
            .collect();
        self.coords = split_coords(&nodes);
        self.nodes = nodes;
        Ok(())
    }

    /// Find the natural coordinates inside the reference cube
    /// whose image is closest to `x`, along with the distance between the two.
    ///
    /// Unlike [`ievaluate`][Map::ievaluate] this never fails;
    /// for points outside the element the result is on the boundary of the cube.
    /// See [`hex_findpt`][crate::findpt::hex_findpt].
    pub fn find_point(&self, x: &Vec3, params: &NewtonParams) -> (Vec3, f64) {
        constrained_newton(&self.basis, self.get_gl_points(), x, params)
    }

    fn weights(&self, xi: &Vec3) -> TensorWeights<3> {
        TensorWeights::new(&self.basis, [xi[0], xi[1], xi[2]])
    }
}

impl Map for SpectralHex {
    #[inline]
    fn vertices(&self) -> &[Vec3] {
        &self.nodes
    }

    fn natural_dim(&self) -> usize {
        3
    }

    fn set_vertices(&mut self, vertices: &[Vec3]) -> Result<(), ArgError> {
        check_vertex_count(self.basis.node_count(3), vertices.len())?;
        self.nodes = vertices.to_vec();
        self.coords = split_coords(vertices);
        Ok(())
    }

    fn evaluate(&self, xi: &Vec3) -> Vec3 {
        let w = self.weights(xi);
        Vec3::from_fn(|d, _| w.value(&self.coords[d]))
    }

    /// Points inside the element are found with the same constrained search as
    /// [`find_point`][SpectralHex::find_point].
    /// If that doesn't reach the point, it's outside the element,
    /// and an unconstrained Newton iteration gives its extrapolated coordinates.
    fn ievaluate(&self, x: &Vec3, params: &NewtonParams) -> Result<Vec3, MapError> {
        let (xi, dist) = self.find_point(x, params);
        if dist <= params.tolerance {
            return Ok(xi);
        }
        newton_inverse(self, x, params)
    }

    fn inside_nat_space(&self, xi: &Vec3, tol: f64) -> bool {
        inside_reference_cube(xi, 3, tol)
    }

    fn jacobian(&self, xi: &Vec3) -> Mat3 {
        hex_map_and_jacobian(&self.basis, self.get_gl_points(), xi).1
    }

    fn evaluate_scalar_field(&self, xi: &Vec3, vertex_values: &[f64]) -> Result<f64, ArgError> {
        check_field_len(self.nodes.len(), vertex_values.len())?;
        Ok(self.weights(xi).value(vertex_values))
    }

    /// Integrates with the GLL quadrature rule on the nodes themselves,
    /// exact for polynomials of degree `2 order - 3` per axis.
    fn integrate_scalar_field(&self, vertex_values: &[f64]) -> Result<f64, ArgError> {
        check_field_len(self.nodes.len(), vertex_values.len())?;
        Ok(vertex_values
            .iter()
            .enumerate()
            .map(|(idx, f)| {
                let rows = self
                    .coords
                    .each_ref()
                    .map(|c| na::RowVector3::from(self.basis.gradient_at_node::<3>(c, idx)));
                let jac = Mat3::from_rows(&rows);
                self.basis.tensor_weight::<3>(idx) * f * jac.determinant().abs()
            })
            .sum())
    }
}

//
// quad
//

/// A spectral quadrilateral surface element with `order^2` nodes.
///
/// As with [`LinearQuad`], the third natural coordinate is the signed distance
/// along the unit normal of the surface, here evaluated at the foot point
/// `(xi[0], xi[1])` since the surface is curved in general.
#[derive(Clone, Debug, PartialEq)]
pub struct SpectralQuad {
    basis: Arc<SpectralBasis>,
    nodes: Vec<Vec3>,
    coords: [Vec<f64>; 3],
}

impl SpectralQuad {
    /// Create an element using the given basis,
    /// initially with its nodes at their reference positions in the plane `z = 0`.
    pub fn new(basis: Arc<SpectralBasis>) -> Self {
        let n = basis.order();
        let gll = basis.nodes();
        let nodes: Vec<Vec3> = iproduct!(0..n, 0..n)
            .map(|(j, i)| Vec3::new(gll[i], gll[j], 0.))
            .collect();
        let coords = split_coords(&nodes);
        Self {
            basis,
            nodes,
            coords,
        }
    }

    /// Create an element with the basis of the given order from a cache,
    /// failing with [`ArgError::MissingBasis`] if it hasn't been initialized.
    pub fn from_cache(cache: &SpectralCache, order: usize) -> Result<Self, ArgError> {
        Ok(Self::new(cache.get(order)?))
    }

    /// Number of nodes per axis.
    #[inline]
    pub fn order(&self) -> usize {
        self.basis.order()
    }

    /// The basis this element interpolates with.
    #[inline]
    pub fn basis(&self) -> &Arc<SpectralBasis> {
        &self.basis
    }

    /// Set the node positions from per-axis coordinate arrays of `order^2` entries each.
    pub fn set_gl_points(&mut self, x: &[f64], y: &[f64], z: &[f64]) -> Result<(), ArgError> {
        self.nodes = join_coords(self.basis.node_count(2), x, y, z)?;
        self.coords = [x.to_vec(), y.to_vec(), z.to_vec()];
        Ok(())
    }

    /// The node positions as per-axis coordinate arrays.
    pub fn get_gl_points(&self) -> [&[f64]; 3] {
        [&self.coords[0], &self.coords[1], &self.coords[2]]
    }

    /// Place the nodes by bilinear interpolation of 4 corners
    /// given in [`LinearQuad::CORNERS`] order.
    pub fn compute_gl_positions(&mut self, corners: &[Vec3]) -> Result<(), ArgError> {
        check_vertex_count(4, corners.len())?;
        let n = self.order();
        let gll = self.basis.nodes();
        let nodes: Vec<Vec3> = iproduct!(0..n, 0..n)
            .map(|(j, i)| {
                LinearQuad::shape_functions(gll[i], gll[j])
                    .iter()
                    .zip(corners)
                    .fold(Vec3::zeros(), |acc, (w, c)| acc + *w * c)
            })
            .collect();
        self.coords = split_coords(&nodes);
        self.nodes = nodes;
        Ok(())
    }

    /// Like [`compute_gl_positions`][Self::compute_gl_positions],
    /// but then moves each node radially onto the sphere centered at the origin
    /// that passes through the first corner.
    pub fn compute_gl_positions_on_sphere(&mut self, corners: &[Vec3]) -> Result<(), ArgError> {
        self.compute_gl_positions(corners)?;
        let radius = corners[0].norm();
        let nodes = self
            .nodes
            .iter()
            .map(|p| {
                let len = p.norm();
                if !(len > 0.) {
                    return Err(ArgError::Projection(*p));
                }
                Ok(p * (radius / len))
            })
            .collect::<Result<Vec<Vec3>, ArgError>>()?;
        self.coords = split_coords(&nodes);
        self.nodes = nodes;
        Ok(())
    }

    /// Surface position and its derivatives with respect to the first two natural coordinates.
    fn surface(&self, r: f64, s: f64) -> (Vec3, [Vec3; 2]) {
        let w = TensorWeights::new(&self.basis, [r, s]);
        let mut pos = Vec3::zeros();
        let mut tangents = [Vec3::zeros(); 2];
        for (d, coords) in self.coords.iter().enumerate() {
            let (val, grad) = w.value_and_gradient(coords);
            pos[d] = val;
            tangents[0][d] = grad[0];
            tangents[1][d] = grad[1];
        }
        (pos, tangents)
    }
}

impl Map for SpectralQuad {
    #[inline]
    fn vertices(&self) -> &[Vec3] {
        &self.nodes
    }

    fn natural_dim(&self) -> usize {
        2
    }

    fn set_vertices(&mut self, vertices: &[Vec3]) -> Result<(), ArgError> {
        check_vertex_count(self.basis.node_count(2), vertices.len())?;
        self.nodes = vertices.to_vec();
        self.coords = split_coords(vertices);
        Ok(())
    }

    fn evaluate(&self, xi: &Vec3) -> Vec3 {
        let (pos, [d_r, d_s]) = self.surface(xi[0], xi[1]);
        let normal = d_r.cross(&d_s).try_normalize(0.).unwrap_or_else(Vec3::zeros);
        pos + xi[2] * normal
    }

    /// Gauss-Newton iteration for the foot point on the surface,
    /// converged once the residual is normal to the surface to within `params.tolerance`.
    /// The third natural coordinate is then the signed distance along the normal.
    fn ievaluate(&self, x: &Vec3, params: &NewtonParams) -> Result<Vec3, MapError> {
        let guess = params.initial_guess.unwrap_or_else(Vec3::zeros);
        let mut rs = na::Vector2::new(guess[0], guess[1]);

        let mut iters = 0;
        loop {
            let (pos, [d_r, d_s]) = self.surface(rs[0], rs[1]);
            let residual = x - pos;
            let cross = d_r.cross(&d_s);
            let area = cross.norm();
            if !(area > DEGENERACY_TOL * d_r.norm() * d_s.norm()) {
                return Err(EvaluationError::new(
                    *x,
                    &self.nodes,
                    EvaluationFailure::SingularJacobian { det: area },
                )
                .into());
            }
            let normal = cross / area;
            let height = residual.dot(&normal);
            let in_plane = residual - height * normal;
            log::trace!(
                "surface newton iteration {iters}: tangential residual {:e}",
                in_plane.norm()
            );
            if in_plane.norm() <= params.tolerance {
                return Ok(Vec3::new(rs[0], rs[1], height));
            }
            if iters >= params.max_iterations {
                return Err(EvaluationError::new(
                    *x,
                    &self.nodes,
                    EvaluationFailure::NotConverged {
                        iterations: iters,
                        residual: in_plane.norm(),
                    },
                )
                .into());
            }
            iters += 1;

            let tangents = na::Matrix3x2::from_columns(&[d_r, d_s]);
            let Some(normal_inv) = tangents.tr_mul(&tangents).try_inverse() else {
                return Err(EvaluationError::new(
                    *x,
                    &self.nodes,
                    EvaluationFailure::SingularJacobian { det: area },
                )
                .into());
            };
            rs += normal_inv * tangents.tr_mul(&residual);

            if !rs.iter().all(|c| c.is_finite() && c.abs() <= params.divergence_bound) {
                return Err(
                    EvaluationError::new(*x, &self.nodes, EvaluationFailure::Diverged).into(),
                );
            }
        }
    }

    fn inside_nat_space(&self, xi: &Vec3, tol: f64) -> bool {
        inside_reference_cube(xi, 2, tol)
    }

    /// Columns are the derivatives of `pos + xi[2] n` along each natural coordinate.
    /// Off the surface the first two include the turning of the normal,
    /// computed from second derivatives of the surface.
    fn jacobian(&self, xi: &Vec3) -> Mat3 {
        let w = TensorWeights::with_second_derivatives(&self.basis, [xi[0], xi[1]]);
        let mut tangents = [Vec3::zeros(); 2];
        // second derivatives rr, rs, ss
        let mut curv = [Vec3::zeros(); 3];
        for (d, coords) in self.coords.iter().enumerate() {
            let (_, grad) = w.value_and_gradient(coords);
            let hess = w.hessian(coords);
            tangents[0][d] = grad[0];
            tangents[1][d] = grad[1];
            curv[0][d] = hess[0][0];
            curv[1][d] = hess[0][1];
            curv[2][d] = hess[1][1];
        }
        let [d_r, d_s] = tangents;
        let cross = d_r.cross(&d_s);
        let area = cross.norm();
        if !(area > 0.) {
            return Mat3::from_columns(&[d_r, d_s, Vec3::zeros()]);
        }
        let normal = cross / area;
        // derivative of the unit normal from the derivative of the unnormalized one
        let normal_deriv = |d_cross: Vec3| (d_cross - normal * normal.dot(&d_cross)) / area;
        let dn_r = normal_deriv(curv[0].cross(&d_s) + d_r.cross(&curv[1]));
        let dn_s = normal_deriv(curv[1].cross(&d_s) + d_r.cross(&curv[2]));
        Mat3::from_columns(&[d_r + xi[2] * dn_r, d_s + xi[2] * dn_s, normal])
    }

    fn evaluate_scalar_field(&self, xi: &Vec3, vertex_values: &[f64]) -> Result<f64, ArgError> {
        check_field_len(self.nodes.len(), vertex_values.len())?;
        Ok(TensorWeights::new(&self.basis, [xi[0], xi[1]]).value(vertex_values))
    }

    /// Integrates over the surface with the GLL quadrature rule on the nodes.
    fn integrate_scalar_field(&self, vertex_values: &[f64]) -> Result<f64, ArgError> {
        check_field_len(self.nodes.len(), vertex_values.len())?;
        Ok(vertex_values
            .iter()
            .enumerate()
            .map(|(idx, f)| {
                let grads = self
                    .coords
                    .each_ref()
                    .map(|c| self.basis.gradient_at_node::<2>(c, idx));
                let d_r = Vec3::new(grads[0][0], grads[1][0], grads[2][0]);
                let d_s = Vec3::new(grads[0][1], grads[1][1], grads[2][1]);
                self.basis.tensor_weight::<2>(idx) * f * d_r.cross(&d_s).norm()
            })
            .sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::SphericalQuad;
    use approx::relative_eq;

    /// A curved map that quadratic and higher order elements reproduce exactly.
    fn curved(xi: &Vec3) -> Vec3 {
        Vec3::new(
            2. * xi[0] + 0.1 * xi[1] * xi[1],
            xi[1] + 0.15 * xi[0] * xi[0] - 0.05 * xi[2],
            1.5 * xi[2] + 0.1 * xi[0] * xi[1],
        )
    }

    fn curved_hex(cache: &mut SpectralCache, order: usize) -> SpectralHex {
        cache.init(order).unwrap();
        let mut hex = SpectralHex::from_cache(cache, order).unwrap();
        let nodes: Vec<Vec3> = hex.vertices().iter().map(curved).collect();
        hex.set_vertices(&nodes).unwrap();
        hex
    }

    #[test]
    fn reference_hex_is_identity() {
        let mut cache = SpectralCache::new();
        assert_eq!(
            SpectralHex::from_cache(&cache, 4),
            Err(ArgError::MissingBasis(4))
        );
        cache.init(4).unwrap();
        let hex = SpectralHex::from_cache(&cache, 4).unwrap();
        assert_eq!(hex.size(), 64);

        let xi = Vec3::new(0.3, -0.4, 0.8);
        assert!(relative_eq!(hex.evaluate(&xi), xi, epsilon = 1e-14));
        assert!(relative_eq!(hex.jacobian(&xi), Mat3::identity(), epsilon = 1e-13));
        assert!(relative_eq!(
            hex.integrate_scalar_field(&[1.; 64]).unwrap(),
            8.,
            epsilon = 1e-12
        ));
    }

    #[test]
    fn curved_hex_map() {
        let mut cache = SpectralCache::new();
        let hex = curved_hex(&mut cache, 4);

        let xi0 = Vec3::new(0.4, -0.6, 0.2);
        assert!(relative_eq!(hex.evaluate(&xi0), curved(&xi0), epsilon = 1e-13));

        let h = 1e-6;
        let j = hex.jacobian(&xi0);
        for k in 0..3 {
            let dxi = Vec3::ith(k, h);
            let fd = (hex.evaluate(&(xi0 + dxi)) - hex.evaluate(&(xi0 - dxi))) / (2. * h);
            assert!(relative_eq!(j.column(k).into_owned(), fd, epsilon = 1e-8));
        }

        let params = NewtonParams::new(1e-12);
        let xi = hex.ievaluate(&curved(&xi0), &params).unwrap();
        assert!(relative_eq!(xi, xi0, epsilon = 1e-10));

        // outside points get extrapolated coordinates through plain Newton
        let out0 = Vec3::new(1.2, 0.1, -0.3);
        let xi = hex.ievaluate(&curved(&out0), &params).unwrap();
        assert!(relative_eq!(xi, out0, epsilon = 1e-9));
        assert!(!hex.inside_nat_space(&xi, 1e-6));

        // while find_point stops at the boundary
        let (xi, dist) = hex.find_point(&curved(&out0), &params);
        assert!(relative_eq!(xi[0], 1., epsilon = 1e-12));
        assert!(dist > 0.1);
    }

    #[test]
    fn hex_integration() {
        let mut cache = SpectralCache::new();
        cache.init(3).unwrap();
        let mut hex = SpectralHex::from_cache(&cache, 3).unwrap();
        // box [0, 2] x [0, 1] x [0, 3]
        let corners: Vec<Vec3> = LinearHex::CORNERS
            .iter()
            .map(|c| Vec3::new(c[0] + 1., 0.5 * (c[1] + 1.), 1.5 * (c[2] + 1.)))
            .collect();
        hex.compute_gl_positions(&corners).unwrap();
        assert!(relative_eq!(
            hex.integrate_scalar_field(&[2.; 27]).unwrap(),
            12.,
            epsilon = 1e-12
        ));

        // x^2 over the box: 8/3 * 1 * 3
        let [xs, _, _] = hex.get_gl_points();
        let vals: Vec<f64> = xs.iter().map(|x| x * x).collect();
        assert!(relative_eq!(
            hex.integrate_scalar_field(&vals).unwrap(),
            8.,
            epsilon = 1e-12
        ));
        let centroid = hex.evaluate(&Vec3::zeros());
        assert!(relative_eq!(centroid, Vec3::new(1., 0.5, 1.5), epsilon = 1e-14));
        assert!(relative_eq!(
            hex.evaluate_scalar_field(&Vec3::new(0.5, 0., 0.), &vals).unwrap(),
            1.5 * 1.5,
            epsilon = 1e-13
        ));
    }

    #[test]
    fn reinit_gives_identical_results() {
        let mut cache = SpectralCache::new();
        let once = curved_hex(&mut cache, 5);
        cache.init(5).unwrap();
        let twice = curved_hex(&mut cache, 5);
        let xi = Vec3::new(-0.3, 0.1, 0.7);
        assert_eq!(once.evaluate(&xi), twice.evaluate(&xi));
        assert_eq!(once.jacobian(&xi), twice.jacobian(&xi));

        // releasing the basis doesn't break live elements
        cache.release(5);
        assert_eq!(once.evaluate(&xi), twice.evaluate(&xi));
    }

    #[test]
    fn gl_point_arrays() {
        let mut cache = SpectralCache::new();
        let hex = curved_hex(&mut cache, 3);
        let [x, y, z] = hex.get_gl_points();
        let mut copy = SpectralHex::from_cache(&cache, 3).unwrap();
        copy.set_gl_points(x, y, z).unwrap();
        assert_eq!(copy, hex);

        assert_eq!(
            copy.set_gl_points(x, &y[1..], z),
            Err(ArgError::VertexCount {
                expected: 27,
                actual: 26
            })
        );
        assert!(copy.set_vertices(&hex.vertices()[1..]).is_err());
    }

    #[test]
    fn planar_quad() {
        let mut cache = SpectralCache::new();
        cache.init(4).unwrap();
        let mut quad = SpectralQuad::from_cache(&cache, 4).unwrap();
        quad.compute_gl_positions(&[
            Vec3::new(0., 0., 1.),
            Vec3::new(2., 0., 1.),
            Vec3::new(2., 1., 1.),
            Vec3::new(0., 1., 1.),
        ])
        .unwrap();
        assert_eq!(quad.size(), 16);

        assert!(relative_eq!(
            quad.evaluate(&Vec3::zeros()),
            Vec3::new(1., 0.5, 1.),
            epsilon = 1e-14
        ));
        assert!(relative_eq!(
            quad.integrate_scalar_field(&[1.; 16]).unwrap(),
            2.,
            epsilon = 1e-13
        ));

        let params = NewtonParams::new(1e-12);
        let xi = quad.ievaluate(&Vec3::new(1.5, 0.25, 1.3), &params).unwrap();
        assert!(relative_eq!(xi, Vec3::new(0.5, -0.5, 0.3), epsilon = 1e-12));
        assert!(quad.inside_nat_space(&xi, 0.));
        assert!(relative_eq!(
            quad.det_jacobian(&xi),
            0.5,
            epsilon = 1e-13
        ));
    }

    #[test]
    fn curved_quad_round_trip() {
        let mut cache = SpectralCache::new();
        cache.init(5).unwrap();
        let mut quad = SpectralQuad::from_cache(&cache, 5).unwrap();
        let nodes: Vec<Vec3> = quad
            .vertices()
            .iter()
            .map(|p| Vec3::new(p.x, p.y, 0.2 * p.x * p.x - 0.1 * p.x * p.y))
            .collect();
        quad.set_vertices(&nodes).unwrap();

        let params = NewtonParams::new(1e-12);
        for xi0 in [Vec3::new(0.3, -0.2, 0.05), Vec3::new(-0.7, 0.6, -0.1)] {
            let x = quad.evaluate(&xi0);
            let xi = quad.ievaluate(&x, &params).unwrap();
            assert!(relative_eq!(xi, xi0, epsilon = 1e-9));
        }
    }

    #[test]
    fn curved_quad_jacobian_off_surface() {
        let mut cache = SpectralCache::new();
        cache.init(5).unwrap();
        let mut quad = SpectralQuad::from_cache(&cache, 5).unwrap();
        let nodes: Vec<Vec3> = quad
            .vertices()
            .iter()
            .map(|p| Vec3::new(p.x, p.y, 0.5 * p.x * p.x))
            .collect();
        quad.set_vertices(&nodes).unwrap();

        let h = 1e-6;
        for xi in [Vec3::new(0.3, -0.2, 0.5), Vec3::new(-0.6, 0.4, -0.3)] {
            let jac = quad.jacobian(&xi);
            for axis in 0..3 {
                let step = Vec3::ith(axis, h);
                let fd = (quad.evaluate(&(xi + step)) - quad.evaluate(&(xi - step))) / (2. * h);
                assert!(relative_eq!(jac.column(axis).into_owned(), fd, epsilon = 1e-7));
            }
        }

        let xi = Vec3::new(0.3, -0.2, 0.5);
        let fd_jac = Mat3::from_fn(|row, col| {
            let step = Vec3::ith(col, h);
            (quad.evaluate(&(xi + step))[row] - quad.evaluate(&(xi - step))[row]) / (2. * h)
        });
        assert!(relative_eq!(
            quad.det_jacobian(&xi),
            fd_jac.determinant(),
            epsilon = 1e-6
        ));
        let prod = quad.jacobian(&xi) * quad.ijacobian(&xi).unwrap();
        assert!(relative_eq!(prod, Mat3::identity(), epsilon = 1e-12));
    }

    #[test]
    fn quad_on_sphere() {
        let radius = 2.;
        let corners: Vec<Vec3> = [[-0.3, -0.3], [0.3, -0.3], [0.3, 0.3], [-0.3, 0.3]]
            .iter()
            .map(|[x, y]| Vec3::new(*x, *y, 1.).normalize() * radius)
            .collect();

        let mut cache = SpectralCache::new();
        cache.init(8).unwrap();
        let mut quad = SpectralQuad::from_cache(&cache, 8).unwrap();
        quad.compute_gl_positions_on_sphere(&corners).unwrap();
        for p in quad.vertices() {
            assert!(relative_eq!(p.norm(), radius, epsilon = 1e-14));
        }

        let area = quad.integrate_scalar_field(&[1.; 64]).unwrap();
        let expected = SphericalQuad::new(&corners)
            .unwrap()
            .with_quadrature_order(12)
            .unwrap()
            .integrate_scalar_field(&[1.; 4])
            .unwrap();
        assert!(relative_eq!(area, expected, max_relative = 1e-6));

        // the nodes bulge out of their bounding box between them,
        // so the box check needs some slack on curved surfaces
        let centroid = corners.iter().sum::<Vec3>().normalize() * radius;
        assert!(!quad.inside_box(&centroid, 0.));
        assert!(quad.inside_box(&centroid, 0.05));
        let xi = quad.ievaluate(&centroid, &NewtonParams::new(1e-10)).unwrap();
        assert!(xi[0].abs() < 1e-8 && xi[1].abs() < 1e-8);
        // the interpolated surface sags slightly below the sphere between nodes
        let sag = radius - quad.evaluate(&Vec3::zeros()).norm();
        assert!(sag > 0. && sag < 1e-5);
        assert!(relative_eq!(xi[2], sag, epsilon = 1e-10));
        assert!(quad.inside_nat_space(&xi, 0.));
    }
}
