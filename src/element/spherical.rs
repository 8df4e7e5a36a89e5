//! Surface elements on a sphere centered at the origin.
//!
//! Points are carried to the plane tangent to the sphere at the element's first vertex
//! by gnomonic projection (straight lines through the center of the sphere),
//! where a planar [`LinearQuad`] or [`LinearTri`] does the actual work.
//! Great-circle arcs project to straight lines,
//! so the element's edges are exactly the arcs between its vertices.
//!
//! The physical map lifts the planar point back along its ray from the center:
//! `x = (R + xi[2]) P / |P|`, where `R` is the distance of the first vertex from the center
//! and `P` the point on the tangent plane.
//! The third natural coordinate is thus the radial distance off the sphere.

use crate::{
    bounds::BoundingBox,
    error::{ArgError, MapError},
    map::{check_field_len, check_vertex_count, DEGENERACY_TOL},
    quadrature::GaussLegendre,
    Map, Mat3, NewtonParams, Vec3,
};

use super::{LinearQuad, LinearTri};

/// Gnomonic projection onto the plane tangent to a sphere at a given point,
/// expressed in a local orthonormal frame on that plane.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GnomonicProjection {
    origin: Vec3,
    radius: f64,
    /// Rows are the local frame axes; the last one is the outward normal at `origin`.
    rotation: Mat3,
}

impl GnomonicProjection {
    /// Build the projection tangent at `origin`,
    /// with the local x axis pointing towards the projection of `towards`.
    pub fn new(origin: &Vec3, towards: &Vec3) -> Result<Self, ArgError> {
        let origin = *origin;
        let radius = origin.norm();
        if !(radius > 0.) {
            return Err(ArgError::Degenerate { det: radius });
        }
        let normal = origin / radius;

        let towards = *towards;
        let s = towards.dot(&origin);
        if !(s > 0.) {
            return Err(ArgError::Projection(towards));
        }
        let offset = towards * (radius * radius / s) - origin;
        let offset_len = offset.norm();
        if !(offset_len > DEGENERACY_TOL * radius) {
            return Err(ArgError::Degenerate { det: offset_len });
        }
        let e1 = offset / offset_len;
        let e2 = normal.cross(&e1);

        Ok(Self {
            origin,
            radius,
            rotation: Mat3::from_rows(&[e1.transpose(), e2.transpose(), normal.transpose()]),
        })
    }

    /// Radius of the sphere.
    #[inline]
    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Project a point onto the tangent plane, giving its local coordinates
    /// (with the third coordinate zero).
    ///
    /// Returns None for points on or behind the plane through the center
    /// parallel to the tangent plane, which have no projection.
    pub fn to_plane(&self, x: &Vec3) -> Option<Vec3> {
        let s = x.dot(&self.origin);
        if !(s > 0.) {
            return None;
        }
        let p = x * (self.radius * self.radius / s) - self.origin;
        let local = self.rotation * p;
        Some(Vec3::new(local.x, local.y, 0.))
    }

    /// The world-space position of a point given in local tangent plane coordinates.
    #[inline]
    pub fn from_plane(&self, p: &Vec3) -> Vec3 {
        self.origin + self.rotation.transpose() * Vec3::new(p.x, p.y, 0.)
    }

    /// Lift a tangent plane point to the sphere of radius `R + height`.
    fn lift(&self, p: &Vec3, height: f64) -> Vec3 {
        let world = self.from_plane(p);
        world * ((self.radius + height) / world.norm())
    }

    /// Jacobian of [`lift`][Self::lift] composed with a planar map
    /// whose in-plane derivatives at `p` are `tangents`.
    fn lift_jacobian(&self, p: &Vec3, tangents: [Vec3; 2], height: f64) -> Mat3 {
        let world = self.from_plane(p);
        let len = world.norm();
        let u = world / len;
        // derivative of the normalization, P -> P / |P|, scaled to the radius
        let radial = (Mat3::identity() - u * u.transpose()) * ((self.radius + height) / len);
        let to_world = self.rotation.transpose();
        Mat3::from_columns(&[
            radial * (to_world * tangents[0]),
            radial * (to_world * tangents[1]),
            u,
        ])
    }

    /// Project all vertices, failing on any that can't be projected.
    fn project_all<const N: usize>(&self, vertices: &[Vec3; N]) -> Result<[Vec3; N], ArgError> {
        let mut local = [Vec3::zeros(); N];
        for (l, v) in local.iter_mut().zip(vertices) {
            *l = self.to_plane(v).ok_or(ArgError::Projection(*v))?;
        }
        Ok(local)
    }

    fn contains_projected(&self, planar_vertices: &[Vec3], x: &Vec3, tol: f64) -> bool {
        let Some(p) = self.to_plane(x) else {
            return false;
        };
        BoundingBox::from_points(planar_vertices).is_some_and(|b| b.contains(&p, tol))
    }
}

/// The first two columns of a planar jacobian.
#[inline]
fn in_plane_tangents(j: &Mat3) -> [Vec3; 2] {
    [j.column(0).into_owned(), j.column(1).into_owned()]
}

/// Area scaling of a surface map given its jacobian.
#[inline]
fn area_element(j: &Mat3) -> f64 {
    j.column(0).cross(&j.column(1)).norm()
}

//
// quad
//

/// A spherical quadrilateral bounded by great-circle arcs.
///
/// Vertex order and natural coordinates follow [`LinearQuad`].
#[derive(Clone, Debug, PartialEq)]
pub struct SphericalQuad {
    vertices: [Vec3; 4],
    projection: GnomonicProjection,
    planar: LinearQuad,
    quadrature: GaussLegendre,
}

impl SphericalQuad {
    /// Points per axis in the default quadrature rule.
    pub const DEFAULT_QUADRATURE: usize = 4;

    /// Create a spherical quad from 4 vertices.
    ///
    /// The vertices are expected to lie on a sphere centered at the origin;
    /// the sphere's radius is taken from the first one.
    pub fn new(vertices: &[Vec3]) -> Result<Self, ArgError> {
        check_vertex_count(4, vertices.len())?;
        let vertices = [vertices[0], vertices[1], vertices[2], vertices[3]];
        let projection = GnomonicProjection::new(&vertices[0], &vertices[1])?;
        let planar = LinearQuad::new(&projection.project_all(&vertices)?)?;
        Ok(Self {
            vertices,
            projection,
            planar,
            quadrature: GaussLegendre::new(Self::DEFAULT_QUADRATURE)?,
        })
    }

    /// Use an `n`-point Gauss-Legendre rule per axis for integration.
    pub fn with_quadrature_order(mut self, n: usize) -> Result<Self, ArgError> {
        self.quadrature = GaussLegendre::new(n)?;
        Ok(self)
    }

    /// The projection used to flatten the element.
    #[inline]
    pub fn projection(&self) -> &GnomonicProjection {
        &self.projection
    }

    #[inline]
    fn planar_point(&self, xi: &Vec3) -> Vec3 {
        self.planar.evaluate(&Vec3::new(xi[0], xi[1], 0.))
    }
}

impl Map for SphericalQuad {
    #[inline]
    fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    fn natural_dim(&self) -> usize {
        2
    }

    fn set_vertices(&mut self, vertices: &[Vec3]) -> Result<(), ArgError> {
        let quadrature = self.quadrature.clone();
        *self = Self {
            quadrature,
            ..Self::new(vertices)?
        };
        Ok(())
    }

    fn evaluate(&self, xi: &Vec3) -> Vec3 {
        self.projection.lift(&self.planar_point(xi), xi[2])
    }

    fn ievaluate(&self, x: &Vec3, params: &NewtonParams) -> Result<Vec3, MapError> {
        let p = self
            .projection
            .to_plane(x)
            .ok_or(ArgError::Projection(*x))?;
        let xi = self.planar.ievaluate(&p, params)?;
        Ok(Vec3::new(xi[0], xi[1], x.norm() - self.projection.radius))
    }

    fn inside_box(&self, x: &Vec3, tol: f64) -> bool {
        self.projection
            .contains_projected(self.planar.vertices(), x, tol)
    }

    fn inside_nat_space(&self, xi: &Vec3, tol: f64) -> bool {
        self.planar.inside_nat_space(xi, tol)
    }

    fn jacobian(&self, xi: &Vec3) -> Mat3 {
        let planar_xi = Vec3::new(xi[0], xi[1], 0.);
        let tangents = in_plane_tangents(&self.planar.jacobian(&planar_xi));
        self.projection
            .lift_jacobian(&self.planar.evaluate(&planar_xi), tangents, xi[2])
    }

    fn evaluate_scalar_field(&self, xi: &Vec3, vertex_values: &[f64]) -> Result<f64, ArgError> {
        self.planar.evaluate_scalar_field(xi, vertex_values)
    }

    fn integrate_scalar_field(&self, vertex_values: &[f64]) -> Result<f64, ArgError> {
        check_field_len(4, vertex_values.len())?;
        let shape = LinearQuad::shape_functions;
        Ok(self.quadrature.integrate_square(|a, b| {
            let f: f64 = shape(a, b)
                .iter()
                .zip(vertex_values)
                .map(|(n, f)| n * f)
                .sum();
            f * area_element(&self.jacobian(&Vec3::new(a, b, 0.)))
        }))
    }
}

//
// triangle
//

/// A spherical triangle bounded by great-circle arcs.
///
/// Vertex order and natural coordinates follow [`LinearTri`].
#[derive(Clone, Debug, PartialEq)]
pub struct SphericalTri {
    vertices: [Vec3; 3],
    projection: GnomonicProjection,
    planar: LinearTri,
    quadrature: GaussLegendre,
}

impl SphericalTri {
    /// Points per axis in the default (collapsed square) quadrature rule.
    pub const DEFAULT_QUADRATURE: usize = 4;

    /// Create a spherical triangle from 3 vertices.
    ///
    /// The vertices are expected to lie on a sphere centered at the origin;
    /// the sphere's radius is taken from the first one.
    pub fn new(vertices: &[Vec3]) -> Result<Self, ArgError> {
        check_vertex_count(3, vertices.len())?;
        let vertices = [vertices[0], vertices[1], vertices[2]];
        let projection = GnomonicProjection::new(&vertices[0], &vertices[1])?;
        let planar = LinearTri::new(&projection.project_all(&vertices)?)?;
        Ok(Self {
            vertices,
            projection,
            planar,
            quadrature: GaussLegendre::new(Self::DEFAULT_QUADRATURE)?,
        })
    }

    /// Use an `n`-point Gauss-Legendre rule per axis
    /// (collapsed onto the triangle) for integration.
    pub fn with_quadrature_order(mut self, n: usize) -> Result<Self, ArgError> {
        self.quadrature = GaussLegendre::new(n)?;
        Ok(self)
    }

    /// The projection used to flatten the element.
    #[inline]
    pub fn projection(&self) -> &GnomonicProjection {
        &self.projection
    }
}

impl Map for SphericalTri {
    #[inline]
    fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    fn natural_dim(&self) -> usize {
        2
    }

    fn set_vertices(&mut self, vertices: &[Vec3]) -> Result<(), ArgError> {
        let quadrature = self.quadrature.clone();
        *self = Self {
            quadrature,
            ..Self::new(vertices)?
        };
        Ok(())
    }

    fn evaluate(&self, xi: &Vec3) -> Vec3 {
        let p = self.planar.evaluate(&Vec3::new(xi[0], xi[1], 0.));
        self.projection.lift(&p, xi[2])
    }

    fn ievaluate(&self, x: &Vec3, params: &NewtonParams) -> Result<Vec3, MapError> {
        let p = self
            .projection
            .to_plane(x)
            .ok_or(ArgError::Projection(*x))?;
        let xi = self.planar.ievaluate(&p, params)?;
        Ok(Vec3::new(xi[0], xi[1], x.norm() - self.projection.radius))
    }

    fn inside_box(&self, x: &Vec3, tol: f64) -> bool {
        self.projection
            .contains_projected(self.planar.vertices(), x, tol)
    }

    fn inside_nat_space(&self, xi: &Vec3, tol: f64) -> bool {
        self.planar.inside_nat_space(xi, tol)
    }

    fn jacobian(&self, xi: &Vec3) -> Mat3 {
        let planar_xi = Vec3::new(xi[0], xi[1], 0.);
        let tangents = in_plane_tangents(&self.planar.jacobian(&planar_xi));
        self.projection
            .lift_jacobian(&self.planar.evaluate(&planar_xi), tangents, xi[2])
    }

    fn evaluate_scalar_field(&self, xi: &Vec3, vertex_values: &[f64]) -> Result<f64, ArgError> {
        self.planar.evaluate_scalar_field(xi, vertex_values)
    }

    fn integrate_scalar_field(&self, vertex_values: &[f64]) -> Result<f64, ArgError> {
        check_field_len(3, vertex_values.len())?;
        let [f0, f1, f2] = [vertex_values[0], vertex_values[1], vertex_values[2]];
        Ok(self.quadrature.integrate_triangle(|s, t| {
            let f = f0 * (1. - s - t) + f1 * s + f2 * t;
            f * area_element(&self.jacobian(&Vec3::new(s, t, 0.)))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::relative_eq;

    const RADIUS: f64 = 2.;

    fn on_sphere(x: f64, y: f64, z: f64) -> Vec3 {
        Vec3::new(x, y, z).normalize() * RADIUS
    }

    fn patch() -> SphericalQuad {
        SphericalQuad::new(&[
            on_sphere(-0.3, -0.3, 1.),
            on_sphere(0.3, -0.3, 1.),
            on_sphere(0.35, 0.3, 1.),
            on_sphere(-0.3, 0.25, 1.),
        ])
        .unwrap()
    }

    /// Area of a spherical polygon with great-arc edges from its interior angles.
    fn spherical_polygon_area(vertices: &[Vec3]) -> f64 {
        let n = vertices.len();
        let angle_sum: f64 = (0..n)
            .map(|i| {
                let v = vertices[i].normalize();
                let tangent_to = |w: &Vec3| {
                    let w = w.normalize();
                    (w - v * w.dot(&v)).normalize()
                };
                let prev = tangent_to(&vertices[(i + n - 1) % n]);
                let next = tangent_to(&vertices[(i + 1) % n]);
                prev.dot(&next).clamp(-1., 1.).acos()
            })
            .sum();
        RADIUS * RADIUS * (angle_sum - (n as f64 - 2.) * std::f64::consts::PI)
    }

    #[test]
    fn projection_frame() {
        let quad = patch();
        let proj = quad.projection();
        assert!(relative_eq!(proj.radius(), RADIUS));
        // the first vertex projects to the origin of the plane
        assert!(relative_eq!(
            proj.to_plane(&quad.vertices()[0]).unwrap(),
            Vec3::zeros(),
            epsilon = 1e-14
        ));
        // scaling a point along its ray doesn't change the projection
        let x = on_sphere(0.1, 0.2, 1.);
        assert!(relative_eq!(
            proj.to_plane(&x).unwrap(),
            proj.to_plane(&(x * 3.)).unwrap(),
            epsilon = 1e-13
        ));
        let p = proj.to_plane(&x).unwrap();
        assert!(relative_eq!(
            proj.from_plane(&p).normalize() * RADIUS,
            x,
            epsilon = 1e-13
        ));
        assert_eq!(proj.to_plane(&-x), None);

        let built = GnomonicProjection::new(&quad.vertices()[0], &quad.vertices()[1]).unwrap();
        assert_eq!(&built, proj);
        assert!(matches!(
            GnomonicProjection::new(&Vec3::zeros(), &x),
            Err(ArgError::Degenerate { .. })
        ));
        assert!(matches!(
            GnomonicProjection::new(&x, &-x),
            Err(ArgError::Projection(_))
        ));
    }

    #[test]
    fn quad_corners_lie_on_vertices() {
        let quad = patch();
        for (corner, vert) in LinearQuad::CORNERS.iter().zip(quad.vertices()) {
            assert!(relative_eq!(
                quad.evaluate(&Vec3::from(*corner)),
                *vert,
                epsilon = 1e-13
            ));
        }
        // everything at zero height is on the sphere
        let x = quad.evaluate(&Vec3::new(0.3, -0.6, 0.));
        assert!(relative_eq!(x.norm(), RADIUS, epsilon = 1e-13));
        let x = quad.evaluate(&Vec3::new(0.3, -0.6, 0.5));
        assert!(relative_eq!(x.norm(), RADIUS + 0.5, epsilon = 1e-13));
    }

    #[test]
    fn quad_centroid_is_found() {
        let quad = patch();
        let centroid = quad.vertices().iter().sum::<Vec3>() / 4.;
        let on_surface = centroid.normalize() * RADIUS;
        assert!(quad.inside_box(&on_surface, 1e-9));
        let params = NewtonParams::new(1e-12);
        let xi = quad.locate(&on_surface, 1e-9, &params).unwrap();
        assert!(relative_eq!(xi[2], 0., epsilon = 1e-12));

        // points behind the tangent plane are never inside
        assert!(!quad.inside_box(&-on_surface, 10.));
        assert!(matches!(
            quad.ievaluate(&-on_surface, &params),
            Err(MapError::Arg(ArgError::Projection(_)))
        ));
    }

    #[test]
    fn quad_round_trip() {
        let quad = patch();
        let params = NewtonParams::new(1e-12);
        for xi0 in [
            Vec3::new(0.3, -0.2, 0.1),
            Vec3::new(-0.9, 0.8, -0.05),
            Vec3::new(0.99, 0.99, 0.),
        ] {
            let x = quad.evaluate(&xi0);
            let xi = quad.ievaluate(&x, &params).unwrap();
            assert!(relative_eq!(xi, xi0, epsilon = 1e-9));
        }
        let outside = quad.evaluate(&Vec3::new(1.3, 0., 0.));
        assert_eq!(quad.locate(&outside, 1e-6, &params), None);
    }

    #[test]
    fn quad_jacobian_matches_finite_differences() {
        let quad = patch();
        let xi = Vec3::new(0.2, -0.4, 0.3);
        let j = quad.jacobian(&xi);
        let h = 1e-6;
        for k in 0..3 {
            let dxi = Vec3::ith(k, h);
            let fd = (quad.evaluate(&(xi + dxi)) - quad.evaluate(&(xi - dxi))) / (2. * h);
            assert!(relative_eq!(j.column(k).into_owned(), fd, epsilon = 1e-8));
        }
    }

    #[test]
    fn quad_area() {
        let quad = patch().with_quadrature_order(10).unwrap();
        let expected = spherical_polygon_area(quad.vertices());
        let area = quad.integrate_scalar_field(&[1.; 4]).unwrap();
        assert!(relative_eq!(area, expected, max_relative = 1e-8));

        // the default rule is already close
        let area = patch().integrate_scalar_field(&[1.; 4]).unwrap();
        assert!(relative_eq!(area, expected, max_relative = 1e-4));

        let vals = [1., 2., 3., 4.];
        assert!(relative_eq!(
            quad.evaluate_scalar_field(&Vec3::new(1., 1., 0.), &vals).unwrap(),
            3.
        ));
    }

    #[test]
    fn tri_area_and_round_trip() {
        let tri = SphericalTri::new(&[
            on_sphere(0., 0., 1.),
            on_sphere(0.5, 0., 1.),
            on_sphere(0.1, 0.4, 1.),
        ])
        .unwrap()
        .with_quadrature_order(12)
        .unwrap();
        for (corner, vert) in LinearTri::CORNERS.iter().zip(tri.vertices()) {
            assert!(relative_eq!(
                tri.evaluate(&Vec3::from(*corner)),
                *vert,
                epsilon = 1e-13
            ));
        }

        let expected = spherical_polygon_area(tri.vertices());
        let area = tri.integrate_scalar_field(&[1.; 3]).unwrap();
        assert!(relative_eq!(area, expected, max_relative = 1e-8));

        let params = NewtonParams::new(1e-12);
        let xi0 = Vec3::new(0.2, 0.5, -0.1);
        let xi = tri.ievaluate(&tri.evaluate(&xi0), &params).unwrap();
        assert!(relative_eq!(xi, xi0, epsilon = 1e-10));
        assert!(tri.inside_nat_space(&xi, 0.));
        assert!(!tri.inside_nat_space(&Vec3::new(0.6, 0.6, 0.), 1e-6));
    }

    #[test]
    fn vertices_behind_the_plane_are_rejected() {
        let res = SphericalTri::new(&[
            on_sphere(0., 0., 1.),
            on_sphere(1., 0., 0.1),
            on_sphere(0., 1., -0.5),
        ]);
        assert!(matches!(res, Err(ArgError::Projection(_))));
    }
}
