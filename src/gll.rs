//! Gauss-Lobatto-Legendre (GLL) nodes and the 1D Lagrange operators on them,
//! the building blocks of spectral elements.
//!
//! Building a basis involves a few nonlinear solves,
//! so bases are built once per order into a [`SpectralCache`]
//! and shared between all spectral elements of that order.
//!
//! # Examples
//!
//! ```
//! # use elem_map::gll::SpectralCache;
//! let mut cache = SpectralCache::new();
//! let basis = cache.init(4).unwrap();
//! assert_eq!(basis.nodes().len(), 4);
//! // the first and last nodes are always the end points
//! assert_eq!(basis.nodes()[0], -1.);
//! assert_eq!(basis.nodes()[3], 1.);
//! ```

use std::{collections::HashMap, sync::Arc};

use nalgebra as na;

use crate::error::ArgError;

/// Largest number of nodes per axis a basis can be built with.
pub const MAX_ORDER: usize = 64;

/// GLL nodes, quadrature weights and Lagrange interpolation operators
/// for a given number of nodes per axis (the "order").
#[derive(Clone, Debug, PartialEq)]
pub struct SpectralBasis {
    nodes: Vec<f64>,
    weights: Vec<f64>,
    /// Barycentric weights `1 / prod_{k != j} (x_j - x_k)`.
    bary: Vec<f64>,
    /// `diff[(i, j)]` is the derivative of the `j`th Lagrange polynomial at node `i`.
    diff: na::DMatrix<f64>,
}

impl SpectralBasis {
    /// Build the basis with `order` nodes per axis.
    pub fn new(order: usize) -> Result<Self, ArgError> {
        if !(2..=MAX_ORDER).contains(&order) {
            return Err(ArgError::InvalidOrder(order));
        }
        let (nodes, weights) = gll_nodes_and_weights(order);

        let bary: Vec<f64> = (0..order)
            .map(|j| {
                let prod: f64 = (0..order)
                    .filter(|&k| k != j)
                    .map(|k| nodes[j] - nodes[k])
                    .product();
                1. / prod
            })
            .collect();

        let mut diff = na::DMatrix::from_fn(order, order, |i, j| {
            if i == j {
                0.
            } else {
                bary[j] / bary[i] / (nodes[i] - nodes[j])
            }
        });
        // rows sum to zero since the derivative of a constant vanishes
        for i in 0..order {
            let row_sum: f64 = diff.row(i).sum();
            diff[(i, i)] = -row_sum;
        }

        Ok(Self {
            nodes,
            weights,
            bary,
            diff,
        })
    }

    /// Number of nodes per axis.
    #[inline]
    pub fn order(&self) -> usize {
        self.nodes.len()
    }

    /// Number of nodes in a `dim`-dimensional tensor product element.
    #[inline]
    pub fn node_count(&self, dim: u32) -> usize {
        self.order().pow(dim)
    }

    /// The GLL nodes on `[-1, 1]` in ascending order.
    #[inline]
    pub fn nodes(&self) -> &[f64] {
        &self.nodes
    }

    /// GLL quadrature weights matching [`nodes`][Self::nodes].
    #[inline]
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// The differentiation matrix:
    /// multiplying a vector of node values by it gives the derivative
    /// of their interpolating polynomial at the nodes.
    #[inline]
    pub fn differentiation_matrix(&self) -> &na::DMatrix<f64> {
        &self.diff
    }

    /// Values of all Lagrange polynomials at `x`.
    pub fn lagrange(&self, x: f64) -> Vec<f64> {
        (0..self.order())
            .map(|j| {
                let prod: f64 = self
                    .nodes
                    .iter()
                    .enumerate()
                    .filter(|&(k, _)| k != j)
                    .map(|(_, xk)| x - xk)
                    .product();
                self.bary[j] * prod
            })
            .collect()
    }

    /// Values and first derivatives of all Lagrange polynomials at `x`.
    pub fn lagrange_with_derivatives(&self, x: f64) -> (Vec<f64>, Vec<f64>) {
        (0..self.order())
            .map(|j| {
                // product rule accumulated factor by factor
                let (p, dp) = self
                    .nodes
                    .iter()
                    .enumerate()
                    .filter(|&(k, _)| k != j)
                    .fold((1., 0.), |(p, dp), (_, xk)| {
                        let a = x - xk;
                        (p * a, dp * a + p)
                    });
                (self.bary[j] * p, self.bary[j] * dp)
            })
            .unzip()
    }

    /// Second derivatives of all Lagrange polynomials at `x`.
    ///
    /// The derivative of each polynomial is interpolated exactly by its values at the nodes,
    /// so differentiating that interpolant once more gives the second derivative.
    pub fn lagrange_second_derivatives(&self, x: f64) -> Vec<f64> {
        let (_, dl) = self.lagrange_with_derivatives(x);
        (0..self.order())
            .map(|m| (0..self.order()).map(|i| self.diff[(i, m)] * dl[i]).sum())
            .collect()
    }

    /// Product of the 1D quadrature weights at the tensor product node `idx`
    /// of a `D`-dimensional element.
    pub fn tensor_weight<const D: usize>(&self, idx: usize) -> f64 {
        let n = self.order();
        (0..D)
            .map(|d| self.weights[(idx / n.pow(d as u32)) % n])
            .product()
    }

    /// Gradient of the interpolant of `node_values` at the tensor product node `idx`
    /// of a `D`-dimensional element, using the differentiation matrix along each axis.
    ///
    /// Node `idx` is at `(nodes[i], nodes[j], nodes[k])` with `idx = i + n j + n^2 k`.
    pub(crate) fn gradient_at_node<const D: usize>(
        &self,
        node_values: &[f64],
        idx: usize,
    ) -> [f64; D] {
        let n = self.order();
        std::array::from_fn(|d| {
            let stride = n.pow(d as u32);
            let i = (idx / stride) % n;
            let base = idx - i * stride;
            (0..n)
                .map(|m| self.diff[(i, m)] * node_values[base + m * stride])
                .sum()
        })
    }
}

/// Lagrange values and derivatives along each axis at one point,
/// used to contract tensor product node data.
#[derive(Clone, Debug)]
pub(crate) struct TensorWeights<const D: usize> {
    values: [Vec<f64>; D],
    derivatives: [Vec<f64>; D],
    // empty unless built with `with_second_derivatives`
    second: [Vec<f64>; D],
}

impl<const D: usize> TensorWeights<D> {
    pub fn new(basis: &SpectralBasis, point: [f64; D]) -> Self {
        let per_axis = point.map(|p| basis.lagrange_with_derivatives(p));
        let mut values: [Vec<f64>; D] = std::array::from_fn(|_| Vec::new());
        let mut derivatives: [Vec<f64>; D] = std::array::from_fn(|_| Vec::new());
        for (d, (l, dl)) in per_axis.into_iter().enumerate() {
            values[d] = l;
            derivatives[d] = dl;
        }
        Self {
            values,
            derivatives,
            second: std::array::from_fn(|_| Vec::new()),
        }
    }

    /// Like [`new`][Self::new], but also evaluates second derivatives
    /// so that [`hessian`][Self::hessian] can be used.
    pub fn with_second_derivatives(basis: &SpectralBasis, point: [f64; D]) -> Self {
        let mut w = Self::new(basis, point);
        w.second = point.map(|p| basis.lagrange_second_derivatives(p));
        w
    }

    /// Per-axis indices of a flat node index.
    #[inline]
    fn digits(&self, idx: usize) -> [usize; D] {
        let n = self.values[0].len();
        std::array::from_fn(|d| (idx / n.pow(d as u32)) % n)
    }

    /// Interpolate node values at the point.
    pub fn value(&self, node_values: &[f64]) -> f64 {
        node_values
            .iter()
            .enumerate()
            .map(|(idx, f)| {
                let digits = self.digits(idx);
                let w: f64 = (0..D).map(|d| self.values[d][digits[d]]).product();
                w * f
            })
            .sum()
    }

    /// Interpolate node values and their gradient at the point.
    pub fn value_and_gradient(&self, node_values: &[f64]) -> (f64, [f64; D]) {
        let mut val = 0.;
        let mut grad = [0.; D];
        for (idx, f) in node_values.iter().enumerate() {
            let digits = self.digits(idx);
            val += f * (0..D).map(|d| self.values[d][digits[d]]).product::<f64>();
            for (axis, g) in grad.iter_mut().enumerate() {
                let w: f64 = (0..D)
                    .map(|d| {
                        if d == axis {
                            self.derivatives[d][digits[d]]
                        } else {
                            self.values[d][digits[d]]
                        }
                    })
                    .product();
                *g += w * f;
            }
        }
        (val, grad)
    }

    /// Second derivatives of the interpolant of node values at the point.
    /// Zero unless built with [`with_second_derivatives`][Self::with_second_derivatives].
    pub fn hessian(&self, node_values: &[f64]) -> [[f64; D]; D] {
        let mut hess = [[0.; D]; D];
        if self.second.iter().any(|s| s.is_empty()) {
            return hess;
        }
        for (idx, f) in node_values.iter().enumerate() {
            let digits = self.digits(idx);
            for a in 0..D {
                for b in a..D {
                    let w: f64 = (0..D)
                        .map(|d| {
                            if a == b && d == a {
                                self.second[d][digits[d]]
                            } else if d == a || d == b {
                                self.derivatives[d][digits[d]]
                            } else {
                                self.values[d][digits[d]]
                            }
                        })
                        .product();
                    hess[a][b] += w * f;
                }
            }
        }
        for a in 0..D {
            for b in 0..a {
                hess[a][b] = hess[b][a];
            }
        }
        hess
    }
}

/// Compute GLL nodes as the end points plus the roots of `P'_{n-1}`,
/// with Newton iteration started from the Chebyshev-Gauss-Lobatto nodes.
fn gll_nodes_and_weights(n: usize) -> (Vec<f64>, Vec<f64>) {
    let deg = n - 1;
    let mut nodes = Vec::with_capacity(n);
    let mut weights = Vec::with_capacity(n);

    for i in 0..n {
        let mut x = -(std::f64::consts::PI * i as f64 / deg as f64).cos();
        let mut p = legendre_pair(deg, x);
        if i != 0 && i != deg {
            for _ in 0..100 {
                let dx = (x * p.0 - p.1) / (n as f64 * p.0);
                x -= dx;
                p = legendre_pair(deg, x);
                if dx.abs() <= 4. * f64::EPSILON {
                    break;
                }
            }
        }
        nodes.push(x);
        weights.push(2. / (deg as f64 * n as f64 * p.0 * p.0));
    }

    // enforce exact symmetry
    for i in 0..n / 2 {
        let x = 0.5 * (nodes[n - 1 - i] - nodes[i]);
        nodes[i] = -x;
        nodes[n - 1 - i] = x;
        let w = 0.5 * (weights[i] + weights[n - 1 - i]);
        weights[i] = w;
        weights[n - 1 - i] = w;
    }
    if n % 2 == 1 {
        nodes[n / 2] = 0.;
    }

    (nodes, weights)
}

/// Legendre polynomials `(P_deg(x), P_{deg-1}(x))` from the three-term recurrence.
fn legendre_pair(deg: usize, x: f64) -> (f64, f64) {
    let (mut p_prev, mut p) = (1., x);
    for k in 2..=deg {
        let k = k as f64;
        let next = ((2. * k - 1.) * x * p - (k - 1.) * p_prev) / k;
        p_prev = p;
        p = next;
    }
    (p, p_prev)
}

/// Spectral bases keyed by order, built on demand and shared between elements.
///
/// Elements hold an `Arc` to their basis,
/// so releasing an order from the cache doesn't affect elements already built with it.
#[derive(Clone, Debug, Default)]
pub struct SpectralCache {
    bases: HashMap<usize, Arc<SpectralBasis>>,
}

impl SpectralCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the basis of the given order if it isn't built yet, and return it.
    ///
    /// Calling this again with the same order returns the existing basis.
    pub fn init(&mut self, order: usize) -> Result<Arc<SpectralBasis>, ArgError> {
        if let Some(basis) = self.bases.get(&order) {
            return Ok(Arc::clone(basis));
        }
        let basis = Arc::new(SpectralBasis::new(order)?);
        log::debug!("built spectral basis of order {order}");
        self.bases.insert(order, Arc::clone(&basis));
        Ok(basis)
    }

    /// Get the basis of the given order,
    /// failing with [`ArgError::MissingBasis`] if it hasn't been initialized.
    pub fn get(&self, order: usize) -> Result<Arc<SpectralBasis>, ArgError> {
        self.bases
            .get(&order)
            .cloned()
            .ok_or(ArgError::MissingBasis(order))
    }

    /// Check whether a basis of the given order has been initialized.
    #[inline]
    pub fn contains(&self, order: usize) -> bool {
        self.bases.contains_key(&order)
    }

    /// Drop the cached basis of the given order.
    /// Returns whether there was one.
    pub fn release(&mut self, order: usize) -> bool {
        let released = self.bases.remove(&order).is_some();
        if released {
            log::debug!("released spectral basis of order {order}");
        }
        released
    }

    /// Drop all cached bases.
    pub fn clear(&mut self) {
        log::debug!("releasing {} spectral bases", self.bases.len());
        self.bases.clear();
    }

    /// The initialized orders in ascending order.
    pub fn orders(&self) -> Vec<usize> {
        let mut orders: Vec<usize> = self.bases.keys().copied().collect();
        orders.sort_unstable();
        orders
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::relative_eq;

    #[test]
    fn known_nodes_and_weights() {
        let b = SpectralBasis::new(2).unwrap();
        assert_eq!(b.nodes(), &[-1., 1.]);
        assert!(relative_eq!(b.weights()[0], 1., epsilon = 1e-15));

        let b = SpectralBasis::new(3).unwrap();
        assert_eq!(b.nodes(), &[-1., 0., 1.]);
        let expected = [1. / 3., 4. / 3., 1. / 3.];
        for (w, e) in b.weights().iter().zip(&expected) {
            assert!(relative_eq!(w, e, epsilon = 1e-14));
        }

        let b = SpectralBasis::new(4).unwrap();
        let x = 1. / 5f64.sqrt();
        let expected = [-1., -x, x, 1.];
        for (n, e) in b.nodes().iter().zip(&expected) {
            assert!(relative_eq!(n, e, epsilon = 1e-14));
        }
        let expected = [1. / 6., 5. / 6., 5. / 6., 1. / 6.];
        for (w, e) in b.weights().iter().zip(&expected) {
            assert!(relative_eq!(w, e, epsilon = 1e-14));
        }

        let b = SpectralBasis::new(5).unwrap();
        let x = (3f64 / 7.).sqrt();
        let expected = [-1., -x, 0., x, 1.];
        for (n, e) in b.nodes().iter().zip(&expected) {
            assert!(relative_eq!(n, e, epsilon = 1e-14));
        }
        let expected = [0.1, 49. / 90., 32. / 45., 49. / 90., 0.1];
        for (w, e) in b.weights().iter().zip(&expected) {
            assert!(relative_eq!(w, e, epsilon = 1e-14));
        }
    }

    #[test]
    fn quadrature_exactness() {
        // n GLL points integrate polynomials up to degree 2n - 3 exactly
        for n in 2..=12 {
            let b = SpectralBasis::new(n).unwrap();
            for k in 0..=(2 * n - 3) {
                let num: f64 = b
                    .nodes()
                    .iter()
                    .zip(b.weights())
                    .map(|(x, w)| w * x.powi(k as i32))
                    .sum();
                let exact = if k % 2 == 0 { 2. / (k + 1) as f64 } else { 0. };
                assert!(
                    (num - exact).abs() < 1e-12,
                    "order {n} failed on x^{k}: got {num}, expected {exact}"
                );
            }
        }
    }

    #[test]
    fn lagrange_polynomials() {
        let b = SpectralBasis::new(6).unwrap();
        // cardinal property at the nodes
        for (i, &x) in b.nodes().iter().enumerate() {
            for (j, l) in b.lagrange(x).iter().enumerate() {
                let expected = if i == j { 1. } else { 0. };
                assert!(relative_eq!(*l, expected, epsilon = 1e-12));
            }
        }

        // exact interpolation of a degree 5 polynomial and its derivative
        let f = |x: f64| 1. - 2. * x + x.powi(3) - 0.5 * x.powi(5);
        let df = |x: f64| -2. + 3. * x.powi(2) - 2.5 * x.powi(4);
        let vals: Vec<f64> = b.nodes().iter().map(|&x| f(x)).collect();
        for x in [-0.83, -0.2, 0.1, 0.77] {
            let (l, dl) = b.lagrange_with_derivatives(x);
            let interp: f64 = l.iter().zip(&vals).map(|(l, v)| l * v).sum();
            let d_interp: f64 = dl.iter().zip(&vals).map(|(l, v)| l * v).sum();
            assert!(relative_eq!(interp, f(x), epsilon = 1e-12));
            assert!(relative_eq!(d_interp, df(x), epsilon = 1e-11));
            assert!(relative_eq!(l.iter().sum::<f64>(), 1., epsilon = 1e-12));
            assert!(relative_eq!(dl.iter().sum::<f64>(), 0., epsilon = 1e-11));
        }

        // the differentiation matrix agrees at the nodes
        let d_vals = b.differentiation_matrix() * na::DVector::from_vec(vals);
        for (x, d) in b.nodes().iter().zip(d_vals.iter()) {
            assert!(relative_eq!(*d, df(*x), epsilon = 1e-10));
        }
    }

    #[test]
    fn tensor_product_interpolation() {
        let b = SpectralBasis::new(4).unwrap();
        let n = b.order();
        let f = |r: f64, s: f64, t: f64| r * s * s * t - 2. * t.powi(3) + 0.5;
        let mut vals = Vec::with_capacity(b.node_count(3));
        for k in 0..n {
            for j in 0..n {
                for i in 0..n {
                    vals.push(f(b.nodes()[i], b.nodes()[j], b.nodes()[k]));
                }
            }
        }

        let p = [0.3, -0.6, 0.45];
        let w = TensorWeights::new(&b, p);
        let (val, grad) = w.value_and_gradient(&vals);
        assert!(relative_eq!(val, f(p[0], p[1], p[2]), epsilon = 1e-12));
        assert!(relative_eq!(w.value(&vals), val, epsilon = 1e-14));
        let expected_grad = [
            p[1] * p[1] * p[2],
            2. * p[0] * p[1] * p[2],
            p[0] * p[1] * p[1] - 6. * p[2] * p[2],
        ];
        for (g, e) in grad.iter().zip(&expected_grad) {
            assert!(relative_eq!(g, e, epsilon = 1e-11));
        }

        // node (1, 2, 3)
        let idx = 1 + n * 2 + n * n * 3;
        let (r, s, t) = (b.nodes()[1], b.nodes()[2], b.nodes()[3]);
        let grad = b.gradient_at_node::<3>(&vals, idx);
        let expected_grad = [s * s * t, 2. * r * s * t, r * s * s - 6. * t * t];
        for (g, e) in grad.iter().zip(&expected_grad) {
            assert!(relative_eq!(g, e, epsilon = 1e-11));
        }
        assert!(relative_eq!(
            b.tensor_weight::<3>(idx),
            b.weights()[1] * b.weights()[2] * b.weights()[3]
        ));
    }

    #[test]
    fn second_derivatives() {
        let b = SpectralBasis::new(5).unwrap();
        let n = b.order();
        let f = |r: f64, s: f64| r.powi(3) * s - 0.5 * s * s + 2. * r * s.powi(2);
        let mut vals = Vec::with_capacity(b.node_count(2));
        for j in 0..n {
            for i in 0..n {
                vals.push(f(b.nodes()[i], b.nodes()[j]));
            }
        }

        let (r, s) = (0.35, -0.7);
        let hess = TensorWeights::with_second_derivatives(&b, [r, s]).hessian(&vals);
        let expected = [
            [6. * r * s, 3. * r * r + 4. * s],
            [3. * r * r + 4. * s, -1. + 4. * r],
        ];
        for (row, e_row) in hess.iter().zip(&expected) {
            for (h, e) in row.iter().zip(e_row) {
                assert!(relative_eq!(h, e, epsilon = 1e-10));
            }
        }

        // not requested, so not computed
        assert_eq!(TensorWeights::new(&b, [r, s]).hessian(&vals), [[0.; 2]; 2]);

        // a cubic's second derivative is linear
        let d2 = b.lagrange_second_derivatives(0.2);
        let cubic: f64 = b.nodes().iter().zip(&d2).map(|(x, d)| x.powi(3) * d).sum();
        assert!(relative_eq!(cubic, 6. * 0.2, epsilon = 1e-11));
    }

    #[test]
    fn invalid_orders() {
        assert_eq!(SpectralBasis::new(1), Err(ArgError::InvalidOrder(1)));
        assert_eq!(SpectralBasis::new(0), Err(ArgError::InvalidOrder(0)));
        assert!(SpectralBasis::new(MAX_ORDER + 1).is_err());
    }

    #[test]
    fn cache_lifecycle() {
        let mut cache = SpectralCache::new();
        assert_eq!(cache.get(4), Err(ArgError::MissingBasis(4)));

        let first = cache.init(4).unwrap();
        let second = cache.init(4).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&first, &cache.get(4).unwrap()));

        cache.init(7).unwrap();
        cache.init(3).unwrap();
        assert_eq!(cache.orders(), vec![3, 4, 7]);
        assert!(cache.init(1).is_err());
        assert_eq!(cache.orders(), vec![3, 4, 7]);

        assert!(cache.release(4));
        assert!(!cache.release(4));
        assert!(!cache.contains(4));
        // handles obtained earlier stay valid
        assert_eq!(first.order(), 4);

        // rebuilding gives identical data
        let rebuilt = cache.init(4).unwrap();
        assert_eq!(*rebuilt, *first);

        cache.clear();
        assert!(cache.orders().is_empty());
    }
}
