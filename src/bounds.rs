//! Axis-aligned bounding boxes used to cheaply reject points
//! before any inverse mapping is attempted.

use crate::Vec3;

/// An axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    /// The minimum corner of the box.
    pub min: Vec3,
    /// The maximum corner of the box.
    pub max: Vec3,
}

impl BoundingBox {
    /// Compute the smallest box enclosing all given points.
    ///
    /// Returns None if there are no points.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Vec3>) -> Option<Self> {
        let mut points = points.into_iter();
        let first = *points.next()?;
        Some(points.fold(
            Self {
                min: first,
                max: first,
            },
            |b, p| Self {
                min: b.min.inf(p),
                max: b.max.sup(p),
            },
        ))
    }

    /// Check whether a point lies in the box grown by `tol` in every direction.
    #[inline]
    pub fn contains(&self, p: &Vec3, tol: f64) -> bool {
        (0..3).all(|i| p[i] >= self.min[i] - tol && p[i] <= self.max[i] + tol)
    }

    /// Return a copy of the box grown by `tol` in every direction.
    pub fn expanded(&self, tol: f64) -> Self {
        let t = Vec3::repeat(tol);
        Self {
            min: self.min - t,
            max: self.max + t,
        }
    }

    /// Length of the box diagonal,
    /// used as a characteristic length of the enclosed element.
    #[inline]
    pub fn diagonal(&self) -> f64 {
        (self.max - self.min).norm()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_encloses_points() {
        let pts = [
            Vec3::new(0., 1., -1.),
            Vec3::new(2., -3., 0.5),
            Vec3::new(1., 0., 4.),
        ];
        let b = BoundingBox::from_points(&pts).unwrap();
        assert_eq!(b.min, Vec3::new(0., -3., -1.));
        assert_eq!(b.max, Vec3::new(2., 1., 4.));
        for p in &pts {
            assert!(b.contains(p, 0.));
        }

        let outside = Vec3::new(2.05, 0., 0.);
        assert!(!b.contains(&outside, 0.));
        assert!(!b.contains(&outside, 0.01));
        assert!(b.contains(&outside, 0.1));
        assert!(b.expanded(0.1).contains(&outside, 0.));
    }

    #[test]
    fn empty_point_set_has_no_box() {
        assert!(BoundingBox::from_points(&[] as &[Vec3]).is_none());
    }
}
