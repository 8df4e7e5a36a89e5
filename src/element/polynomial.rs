//! Elements whose map is a fixed polynomial in natural coordinates:
//! trilinear and triquadratic hexahedra, bilinear quadrilaterals and linear edges.
//!
//! These have no closed-form inverse, so they use the Newton solver
//! from [`Map::ievaluate`]'s default implementation.

use itertools::izip;

use crate::{
    error::ArgError,
    map::{check_field_len, check_vertex_count, DEGENERACY_TOL},
    quadrature::GaussLegendre,
    Map, Mat3, Vec3,
};

/// Check that the first `dim` natural coordinates are within `[-1 - tol, 1 + tol]`.
#[inline]
pub(crate) fn inside_reference_cube(xi: &Vec3, dim: usize, tol: f64) -> bool {
    xi.iter().take(dim).all(|c| c.abs() <= 1. + tol)
}

/// Weighted sum of vertex positions.
#[inline]
fn combine(weights: impl IntoIterator<Item = f64>, vertices: &[Vec3]) -> Vec3 {
    izip!(weights, vertices).fold(Vec3::zeros(), |acc, (w, v)| acc + w * v)
}

//
// trilinear hex
//

/// Shape function space of a trilinear hexahedron,
/// the pushforward of the canonical trilinear functions on `[-1, 1]^3`.
#[derive(Clone, Debug, PartialEq)]
pub struct LinearHex {
    vertices: [Vec3; 8],
    quadrature: GaussLegendre,
}

impl LinearHex {
    /// Natural coordinates of the vertices.
    /// The bottom face `z = -1` is traversed counterclockwise, then the top face.
    #[rustfmt::skip]
    pub const CORNERS: [[f64; 3]; 8] = [
        [-1., -1., -1.], [1., -1., -1.], [1., 1., -1.], [-1., 1., -1.],
        [-1., -1.,  1.], [1., -1.,  1.], [1., 1.,  1.], [-1., 1.,  1.],
    ];

    /// Points per axis in the default quadrature rule,
    /// exact for trilinear fields on affine hexahedra.
    pub const DEFAULT_QUADRATURE: usize = 2;

    /// Create a hexahedron from 8 vertices in [`CORNERS`][Self::CORNERS] order.
    pub fn new(vertices: &[Vec3]) -> Result<Self, ArgError> {
        check_vertex_count(8, vertices.len())?;
        let mut verts = [Vec3::zeros(); 8];
        verts.copy_from_slice(vertices);
        Ok(Self {
            vertices: verts,
            quadrature: GaussLegendre::new(Self::DEFAULT_QUADRATURE)?,
        })
    }

    /// Use an `n`-point Gauss-Legendre rule per axis for integration.
    pub fn with_quadrature_order(mut self, n: usize) -> Result<Self, ArgError> {
        self.quadrature = GaussLegendre::new(n)?;
        Ok(self)
    }

    /// Values of the 8 shape functions at `xi`.
    pub fn shape_functions(xi: &Vec3) -> [f64; 8] {
        Self::CORNERS.map(|c| {
            (1. + xi[0] * c[0]) * (1. + xi[1] * c[1]) * (1. + xi[2] * c[2]) * 0.125
        })
    }

    /// Gradients of the 8 shape functions with respect to `xi`.
    pub fn shape_gradients(xi: &Vec3) -> [Vec3; 8] {
        Self::CORNERS.map(|c| {
            let xi_p = 1. + xi[0] * c[0];
            let eta_p = 1. + xi[1] * c[1];
            let zeta_p = 1. + xi[2] * c[2];
            Vec3::new(
                c[0] * eta_p * zeta_p,
                c[1] * xi_p * zeta_p,
                c[2] * xi_p * eta_p,
            ) * 0.125
        })
    }
}

impl Map for LinearHex {
    #[inline]
    fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    fn natural_dim(&self) -> usize {
        3
    }

    fn set_vertices(&mut self, vertices: &[Vec3]) -> Result<(), ArgError> {
        check_vertex_count(8, vertices.len())?;
        self.vertices.copy_from_slice(vertices);
        Ok(())
    }

    fn evaluate(&self, xi: &Vec3) -> Vec3 {
        combine(Self::shape_functions(xi), &self.vertices)
    }

    fn inside_nat_space(&self, xi: &Vec3, tol: f64) -> bool {
        inside_reference_cube(xi, 3, tol)
    }

    fn jacobian(&self, xi: &Vec3) -> Mat3 {
        let grads = Self::shape_gradients(xi);
        let mut j = Mat3::zeros();
        for (g, v) in izip!(&grads, &self.vertices) {
            j += v * g.transpose();
        }
        j
    }

    fn evaluate_scalar_field(&self, xi: &Vec3, vertex_values: &[f64]) -> Result<f64, ArgError> {
        check_field_len(8, vertex_values.len())?;
        Ok(izip!(Self::shape_functions(xi), vertex_values)
            .map(|(n, f)| n * f)
            .sum())
    }

    fn integrate_scalar_field(&self, vertex_values: &[f64]) -> Result<f64, ArgError> {
        check_field_len(8, vertex_values.len())?;
        Ok(self.quadrature.integrate_cube(|a, b, c| {
            let xi = Vec3::new(a, b, c);
            let f: f64 = izip!(Self::shape_functions(&xi), vertex_values)
                .map(|(n, f)| n * f)
                .sum();
            f * self.det_jacobian(&xi).abs()
        }))
    }
}

//
// triquadratic hex
//

/// 1D quadratic Lagrange polynomial on nodes `-1, 0, 1`,
/// selecting the one that is 1 at `node`.
#[inline]
fn quadratic_1d(node: i8, x: f64) -> f64 {
    match node {
        -1 => 0.5 * x * (x - 1.),
        0 => 1. - x * x,
        _ => 0.5 * x * (x + 1.),
    }
}

#[inline]
fn quadratic_1d_derivative(node: i8, x: f64) -> f64 {
    match node {
        -1 => x - 0.5,
        0 => -2. * x,
        _ => x + 0.5,
    }
}

/// Shape function space of a triquadratic (27-node) hexahedron.
#[derive(Clone, Debug, PartialEq)]
pub struct QuadraticHex {
    vertices: [Vec3; 27],
    quadrature: GaussLegendre,
}

impl QuadraticHex {
    /// Natural coordinates of the nodes:
    /// 8 corners in [`LinearHex::CORNERS`] order,
    /// 12 edge midpoints (bottom face edges, vertical edges, top face edges),
    /// 6 face centers (the four sides, then bottom and top), and the center.
    #[rustfmt::skip]
    pub const CORNERS: [[i8; 3]; 27] = [
        [-1, -1, -1], [ 1, -1, -1], [ 1,  1, -1], [-1,  1, -1],
        [-1, -1,  1], [ 1, -1,  1], [ 1,  1,  1], [-1,  1,  1],
        [ 0, -1, -1], [ 1,  0, -1], [ 0,  1, -1], [-1,  0, -1],
        [-1, -1,  0], [ 1, -1,  0], [ 1,  1,  0], [-1,  1,  0],
        [ 0, -1,  1], [ 1,  0,  1], [ 0,  1,  1], [-1,  0,  1],
        [ 0, -1,  0], [ 1,  0,  0], [ 0,  1,  0], [-1,  0,  0],
        [ 0,  0, -1], [ 0,  0,  1],
        [ 0,  0,  0],
    ];

    /// Points per axis in the default quadrature rule.
    pub const DEFAULT_QUADRATURE: usize = 3;

    /// Create a hexahedron from 27 nodes in [`CORNERS`][Self::CORNERS] order.
    pub fn new(vertices: &[Vec3]) -> Result<Self, ArgError> {
        check_vertex_count(27, vertices.len())?;
        let mut verts = [Vec3::zeros(); 27];
        verts.copy_from_slice(vertices);
        Ok(Self {
            vertices: verts,
            quadrature: GaussLegendre::new(Self::DEFAULT_QUADRATURE)?,
        })
    }

    /// Use an `n`-point Gauss-Legendre rule per axis for integration.
    pub fn with_quadrature_order(mut self, n: usize) -> Result<Self, ArgError> {
        self.quadrature = GaussLegendre::new(n)?;
        Ok(self)
    }

    /// Values of the 27 shape functions at `xi`.
    pub fn shape_functions(xi: &Vec3) -> [f64; 27] {
        Self::CORNERS.map(|c| {
            quadratic_1d(c[0], xi[0]) * quadratic_1d(c[1], xi[1]) * quadratic_1d(c[2], xi[2])
        })
    }

    /// Gradients of the 27 shape functions with respect to `xi`.
    pub fn shape_gradients(xi: &Vec3) -> [Vec3; 27] {
        Self::CORNERS.map(|c| {
            let n = [
                quadratic_1d(c[0], xi[0]),
                quadratic_1d(c[1], xi[1]),
                quadratic_1d(c[2], xi[2]),
            ];
            let dn = [
                quadratic_1d_derivative(c[0], xi[0]),
                quadratic_1d_derivative(c[1], xi[1]),
                quadratic_1d_derivative(c[2], xi[2]),
            ];
            Vec3::new(dn[0] * n[1] * n[2], n[0] * dn[1] * n[2], n[0] * n[1] * dn[2])
        })
    }
}

impl Map for QuadraticHex {
    #[inline]
    fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    fn natural_dim(&self) -> usize {
        3
    }

    fn set_vertices(&mut self, vertices: &[Vec3]) -> Result<(), ArgError> {
        check_vertex_count(27, vertices.len())?;
        self.vertices.copy_from_slice(vertices);
        Ok(())
    }

    fn evaluate(&self, xi: &Vec3) -> Vec3 {
        combine(Self::shape_functions(xi), &self.vertices)
    }

    fn inside_nat_space(&self, xi: &Vec3, tol: f64) -> bool {
        inside_reference_cube(xi, 3, tol)
    }

    fn jacobian(&self, xi: &Vec3) -> Mat3 {
        let grads = Self::shape_gradients(xi);
        let mut j = Mat3::zeros();
        for (g, v) in izip!(&grads, &self.vertices) {
            j += v * g.transpose();
        }
        j
    }

    fn evaluate_scalar_field(&self, xi: &Vec3, vertex_values: &[f64]) -> Result<f64, ArgError> {
        check_field_len(27, vertex_values.len())?;
        Ok(izip!(Self::shape_functions(xi), vertex_values)
            .map(|(n, f)| n * f)
            .sum())
    }

    fn integrate_scalar_field(&self, vertex_values: &[f64]) -> Result<f64, ArgError> {
        check_field_len(27, vertex_values.len())?;
        Ok(self.quadrature.integrate_cube(|a, b, c| {
            let xi = Vec3::new(a, b, c);
            let f: f64 = izip!(Self::shape_functions(&xi), vertex_values)
                .map(|(n, f)| n * f)
                .sum();
            f * self.det_jacobian(&xi).abs()
        }))
    }
}

//
// bilinear quad
//

/// Shape function space of a bilinear quadrilateral.
///
/// The third natural coordinate is the signed distance along a fixed unit normal,
/// taken at the center of the quad when the vertices are set.
/// For planar quads this makes the 3D map exactly invertible;
/// for slightly warped ones the inverse finds the point along the normal direction.
#[derive(Clone, Debug, PartialEq)]
pub struct LinearQuad {
    vertices: [Vec3; 4],
    normal: Vec3,
    quadrature: GaussLegendre,
}

impl LinearQuad {
    /// Natural coordinates of the vertices, counterclockwise.
    pub const CORNERS: [[f64; 3]; 4] = [[-1., -1., 0.], [1., -1., 0.], [1., 1., 0.], [-1., 1., 0.]];

    /// Points per axis in the default quadrature rule.
    pub const DEFAULT_QUADRATURE: usize = 2;

    /// Create a quadrilateral from 4 vertices in [`CORNERS`][Self::CORNERS] order.
    ///
    /// Fails if the quad has no area at its center.
    pub fn new(vertices: &[Vec3]) -> Result<Self, ArgError> {
        check_vertex_count(4, vertices.len())?;
        let verts = [vertices[0], vertices[1], vertices[2], vertices[3]];
        Ok(Self {
            normal: Self::center_normal(&verts)?,
            vertices: verts,
            quadrature: GaussLegendre::new(Self::DEFAULT_QUADRATURE)?,
        })
    }

    /// Use an `n`-point Gauss-Legendre rule per axis for integration.
    pub fn with_quadrature_order(mut self, n: usize) -> Result<Self, ArgError> {
        self.quadrature = GaussLegendre::new(n)?;
        Ok(self)
    }

    fn center_normal(vertices: &[Vec3; 4]) -> Result<Vec3, ArgError> {
        let [d_xi, d_eta] = Self::tangents(vertices, 0., 0.);
        let n = d_xi.cross(&d_eta);
        let len = n.norm();
        if !(len > DEGENERACY_TOL * d_xi.norm() * d_eta.norm()) {
            return Err(ArgError::Degenerate { det: len });
        }
        Ok(n / len)
    }

    /// Values of the 4 shape functions at `(xi, eta)`.
    pub fn shape_functions(xi: f64, eta: f64) -> [f64; 4] {
        Self::CORNERS.map(|c| (1. + xi * c[0]) * (1. + eta * c[1]) * 0.25)
    }

    /// Derivatives of the bilinear surface with respect to both natural coordinates.
    fn tangents(vertices: &[Vec3; 4], xi: f64, eta: f64) -> [Vec3; 2] {
        let d_xi = Self::CORNERS.map(|c| c[0] * (1. + eta * c[1]) * 0.25);
        let d_eta = Self::CORNERS.map(|c| c[1] * (1. + xi * c[0]) * 0.25);
        [combine(d_xi, vertices), combine(d_eta, vertices)]
    }

    /// The unit normal used for the third natural coordinate.
    #[inline]
    pub fn normal(&self) -> Vec3 {
        self.normal
    }

    /// Area scaling from natural to physical coordinates at `(xi, eta)`.
    pub fn area_element(&self, xi: f64, eta: f64) -> f64 {
        let [d_xi, d_eta] = Self::tangents(&self.vertices, xi, eta);
        d_xi.cross(&d_eta).norm()
    }
}

impl Map for LinearQuad {
    #[inline]
    fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    fn natural_dim(&self) -> usize {
        2
    }

    fn set_vertices(&mut self, vertices: &[Vec3]) -> Result<(), ArgError> {
        check_vertex_count(4, vertices.len())?;
        let verts = [vertices[0], vertices[1], vertices[2], vertices[3]];
        self.normal = Self::center_normal(&verts)?;
        self.vertices = verts;
        Ok(())
    }

    fn evaluate(&self, xi: &Vec3) -> Vec3 {
        combine(Self::shape_functions(xi[0], xi[1]), &self.vertices) + xi[2] * self.normal
    }

    fn inside_nat_space(&self, xi: &Vec3, tol: f64) -> bool {
        inside_reference_cube(xi, 2, tol)
    }

    fn jacobian(&self, xi: &Vec3) -> Mat3 {
        let [d_xi, d_eta] = Self::tangents(&self.vertices, xi[0], xi[1]);
        Mat3::from_columns(&[d_xi, d_eta, self.normal])
    }

    fn evaluate_scalar_field(&self, xi: &Vec3, vertex_values: &[f64]) -> Result<f64, ArgError> {
        check_field_len(4, vertex_values.len())?;
        Ok(izip!(Self::shape_functions(xi[0], xi[1]), vertex_values)
            .map(|(n, f)| n * f)
            .sum())
    }

    fn integrate_scalar_field(&self, vertex_values: &[f64]) -> Result<f64, ArgError> {
        check_field_len(4, vertex_values.len())?;
        Ok(self.quadrature.integrate_square(|a, b| {
            let f: f64 = izip!(Self::shape_functions(a, b), vertex_values)
                .map(|(n, f)| n * f)
                .sum();
            f * self.area_element(a, b)
        }))
    }
}

//
// linear edge
//

/// Shape function space of a linear edge (line segment) with natural coordinate in `[-1, 1]`.
///
/// The second and third natural coordinates are signed distances
/// along two unit vectors perpendicular to the edge.
#[derive(Clone, Debug, PartialEq)]
pub struct LinearEdge {
    vertices: [Vec3; 2],
    normals: [Vec3; 2],
    quadrature: GaussLegendre,
}

impl LinearEdge {
    /// Natural coordinates of the vertices.
    pub const CORNERS: [[f64; 3]; 2] = [[-1., 0., 0.], [1., 0., 0.]];

    /// Points per axis in the default quadrature rule.
    pub const DEFAULT_QUADRATURE: usize = 2;

    /// Create an edge from its 2 end points.
    ///
    /// Fails if the end points coincide.
    pub fn new(vertices: &[Vec3]) -> Result<Self, ArgError> {
        check_vertex_count(2, vertices.len())?;
        let verts = [vertices[0], vertices[1]];
        Ok(Self {
            normals: Self::perpendicular_frame(&verts)?,
            vertices: verts,
            quadrature: GaussLegendre::new(Self::DEFAULT_QUADRATURE)?,
        })
    }

    /// Use an `n`-point Gauss-Legendre rule for integration.
    pub fn with_quadrature_order(mut self, n: usize) -> Result<Self, ArgError> {
        self.quadrature = GaussLegendre::new(n)?;
        Ok(self)
    }

    /// Two unit vectors completing the edge direction to a right-handed orthonormal frame.
    fn perpendicular_frame(vertices: &[Vec3; 2]) -> Result<[Vec3; 2], ArgError> {
        let t = vertices[1] - vertices[0];
        let len = t.norm();
        // any nonzero length gives a well-shaped segment
        if !(len > 0.) {
            return Err(ArgError::Degenerate { det: len / 2. });
        }
        let t = t / len;
        // cross with the coordinate axis least aligned with the edge
        let axis = Vec3::ith(t.iamin(), 1.);
        let n1 = t.cross(&axis).normalize();
        let n2 = t.cross(&n1);
        Ok([n1, n2])
    }

    /// Half the length of the edge, i.e. its jacobian determinant.
    #[inline]
    fn half_length(&self) -> f64 {
        (self.vertices[1] - self.vertices[0]).norm() * 0.5
    }
}

impl Map for LinearEdge {
    #[inline]
    fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    fn natural_dim(&self) -> usize {
        1
    }

    fn set_vertices(&mut self, vertices: &[Vec3]) -> Result<(), ArgError> {
        check_vertex_count(2, vertices.len())?;
        let verts = [vertices[0], vertices[1]];
        self.normals = Self::perpendicular_frame(&verts)?;
        self.vertices = verts;
        Ok(())
    }

    fn evaluate(&self, xi: &Vec3) -> Vec3 {
        let [v0, v1] = self.vertices;
        (v0 * (1. - xi[0]) + v1 * (1. + xi[0])) * 0.5
            + xi[1] * self.normals[0]
            + xi[2] * self.normals[1]
    }

    fn inside_nat_space(&self, xi: &Vec3, tol: f64) -> bool {
        inside_reference_cube(xi, 1, tol)
    }

    fn jacobian(&self, _xi: &Vec3) -> Mat3 {
        let t = (self.vertices[1] - self.vertices[0]) * 0.5;
        Mat3::from_columns(&[t, self.normals[0], self.normals[1]])
    }

    fn evaluate_scalar_field(&self, xi: &Vec3, vertex_values: &[f64]) -> Result<f64, ArgError> {
        check_field_len(2, vertex_values.len())?;
        Ok((vertex_values[0] * (1. - xi[0]) + vertex_values[1] * (1. + xi[0])) * 0.5)
    }

    fn integrate_scalar_field(&self, vertex_values: &[f64]) -> Result<f64, ArgError> {
        check_field_len(2, vertex_values.len())?;
        let (f0, f1) = (vertex_values[0], vertex_values[1]);
        Ok(self
            .quadrature
            .integrate_line(|x| (f0 * (1. - x) + f1 * (1. + x)) * 0.5)
            * self.half_length())
    }
}
