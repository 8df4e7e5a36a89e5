//! Elements whose map is affine: the linear tetrahedron and triangle.
//!
//! The map is `x = v0 + T xi` for a matrix `T` computed from the edge vectors
//! when the vertices are set, so the inverse is a single matrix product
//! and the jacobian is constant.

use crate::{
    error::{ArgError, MapError},
    map::{check_field_len, check_vertex_count, invert_jacobian, DEGENERACY_TOL},
    Map, Mat3, NewtonParams, Vec3,
};

/// The affine transform of a simplex and everything derived from it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct AffineTransform {
    pub t: Mat3,
    pub t_inverse: Mat3,
    pub det_t: f64,
    pub det_t_inverse: f64,
}

impl AffineTransform {
    fn new(t: Mat3) -> Result<Self, ArgError> {
        let t_inverse = invert_jacobian(&t)?;
        let det_t = t.determinant();
        Ok(Self {
            t,
            t_inverse,
            det_t,
            det_t_inverse: 1. / det_t,
        })
    }
}

/// Shape function space of a linear tetrahedron,
/// the pushforward of the barycentric coordinates of the canonical simplex.
///
/// Canonical corners are `(0,0,0), (1,0,0), (0,1,0), (0,0,1)`.
#[derive(Clone, Debug, PartialEq)]
pub struct LinearTet {
    vertices: [Vec3; 4],
    transform: AffineTransform,
}

impl LinearTet {
    /// Natural coordinates of the vertices.
    pub const CORNERS: [[f64; 3]; 4] = [[0., 0., 0.], [1., 0., 0.], [0., 1., 0.], [0., 0., 1.]];

    /// Create a tetrahedron from 4 vertices.
    ///
    /// Fails if the vertices are coplanar.
    pub fn new(vertices: &[Vec3]) -> Result<Self, ArgError> {
        check_vertex_count(4, vertices.len())?;
        let vertices = [vertices[0], vertices[1], vertices[2], vertices[3]];
        let transform = Self::compute_transform(&vertices)?;
        Ok(Self {
            vertices,
            transform,
        })
    }

    fn compute_transform(v: &[Vec3; 4]) -> Result<AffineTransform, ArgError> {
        AffineTransform::new(Mat3::from_columns(&[
            v[1] - v[0],
            v[2] - v[0],
            v[3] - v[0],
        ]))
    }

    /// Volume of the tetrahedron.
    pub fn volume(&self) -> f64 {
        self.transform.det_t.abs() / 6.
    }
}

impl Map for LinearTet {
    #[inline]
    fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    fn natural_dim(&self) -> usize {
        3
    }

    fn set_vertices(&mut self, vertices: &[Vec3]) -> Result<(), ArgError> {
        *self = Self::new(vertices)?;
        Ok(())
    }

    #[inline]
    fn evaluate(&self, xi: &Vec3) -> Vec3 {
        self.vertices[0] + self.transform.t * xi
    }

    fn ievaluate(&self, x: &Vec3, _params: &NewtonParams) -> Result<Vec3, MapError> {
        Ok(self.transform.t_inverse * (x - self.vertices[0]))
    }

    fn inside_nat_space(&self, xi: &Vec3, tol: f64) -> bool {
        simplex_contains(&[1. - xi.sum(), xi[0], xi[1], xi[2]], tol)
    }

    #[inline]
    fn jacobian(&self, _xi: &Vec3) -> Mat3 {
        self.transform.t
    }

    #[inline]
    fn ijacobian(&self, _xi: &Vec3) -> Result<Mat3, ArgError> {
        Ok(self.transform.t_inverse)
    }

    #[inline]
    fn det_jacobian(&self, _xi: &Vec3) -> f64 {
        self.transform.det_t
    }

    #[inline]
    fn det_ijacobian(&self, _xi: &Vec3) -> Result<f64, ArgError> {
        Ok(self.transform.det_t_inverse)
    }

    fn evaluate_scalar_field(&self, xi: &Vec3, vertex_values: &[f64]) -> Result<f64, ArgError> {
        check_field_len(4, vertex_values.len())?;
        let f0 = vertex_values[0];
        Ok(f0
            + (vertex_values[1] - f0) * xi[0]
            + (vertex_values[2] - f0) * xi[1]
            + (vertex_values[3] - f0) * xi[2])
    }

    fn integrate_scalar_field(&self, vertex_values: &[f64]) -> Result<f64, ArgError> {
        check_field_len(4, vertex_values.len())?;
        // a linear field's integral is its mean times the volume
        Ok(vertex_values.iter().sum::<f64>() / 4. * self.volume())
    }
}

/// Shape function space of a linear triangle, analogous to [`LinearTet`].
///
/// Canonical corners are `(0,0,0), (1,0,0), (0,1,0)`.
/// The third natural coordinate is the signed distance along the unit normal
/// `(v1 - v0) x (v2 - v0)`, which makes the map invertible for triangles in any orientation.
#[derive(Clone, Debug, PartialEq)]
pub struct LinearTri {
    vertices: [Vec3; 3],
    transform: AffineTransform,
}

impl LinearTri {
    /// Natural coordinates of the vertices.
    pub const CORNERS: [[f64; 3]; 3] = [[0., 0., 0.], [1., 0., 0.], [0., 1., 0.]];

    /// Create a triangle from 3 vertices.
    ///
    /// Fails if the vertices are collinear.
    pub fn new(vertices: &[Vec3]) -> Result<Self, ArgError> {
        check_vertex_count(3, vertices.len())?;
        let vertices = [vertices[0], vertices[1], vertices[2]];
        let transform = Self::compute_transform(&vertices)?;
        Ok(Self {
            vertices,
            transform,
        })
    }

    fn compute_transform(v: &[Vec3; 3]) -> Result<AffineTransform, ArgError> {
        let e1 = v[1] - v[0];
        let e2 = v[2] - v[0];
        let normal = e1.cross(&e2);
        let area_2 = normal.norm();
        if !(area_2 > DEGENERACY_TOL * e1.norm() * e2.norm()) {
            return Err(ArgError::Degenerate { det: area_2 });
        }
        let t = Mat3::from_columns(&[e1, e2, normal / area_2]);
        AffineTransform::new(t)
    }

    /// Unit normal of the triangle's plane.
    #[inline]
    pub fn normal(&self) -> Vec3 {
        self.transform.t.column(2).into_owned()
    }

    /// Area of the triangle.
    pub fn area(&self) -> f64 {
        self.transform.det_t.abs() / 2.
    }
}

impl Map for LinearTri {
    #[inline]
    fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    fn natural_dim(&self) -> usize {
        2
    }

    fn set_vertices(&mut self, vertices: &[Vec3]) -> Result<(), ArgError> {
        *self = Self::new(vertices)?;
        Ok(())
    }

    #[inline]
    fn evaluate(&self, xi: &Vec3) -> Vec3 {
        self.vertices[0] + self.transform.t * xi
    }

    fn ievaluate(&self, x: &Vec3, _params: &NewtonParams) -> Result<Vec3, MapError> {
        Ok(self.transform.t_inverse * (x - self.vertices[0]))
    }

    fn inside_nat_space(&self, xi: &Vec3, tol: f64) -> bool {
        simplex_contains(&[1. - xi[0] - xi[1], xi[0], xi[1]], tol)
    }

    #[inline]
    fn jacobian(&self, _xi: &Vec3) -> Mat3 {
        self.transform.t
    }

    #[inline]
    fn ijacobian(&self, _xi: &Vec3) -> Result<Mat3, ArgError> {
        Ok(self.transform.t_inverse)
    }

    #[inline]
    fn det_jacobian(&self, _xi: &Vec3) -> f64 {
        self.transform.det_t
    }

    #[inline]
    fn det_ijacobian(&self, _xi: &Vec3) -> Result<f64, ArgError> {
        Ok(self.transform.det_t_inverse)
    }

    fn evaluate_scalar_field(&self, xi: &Vec3, vertex_values: &[f64]) -> Result<f64, ArgError> {
        check_field_len(3, vertex_values.len())?;
        let f0 = vertex_values[0];
        Ok(f0 + (vertex_values[1] - f0) * xi[0] + (vertex_values[2] - f0) * xi[1])
    }

    fn integrate_scalar_field(&self, vertex_values: &[f64]) -> Result<f64, ArgError> {
        check_field_len(3, vertex_values.len())?;
        Ok(vertex_values.iter().sum::<f64>() / 3. * self.area())
    }
}

/// Check that barycentric coordinates are all within `[-tol, 1 + tol]`.
fn simplex_contains(barycentric: &[f64], tol: f64) -> bool {
    barycentric.iter().all(|&l| l >= -tol && l <= 1. + tol)
}
