//! Central-difference operators on (possibly stretched) node grids and the
//! point kernels the solvers are assembled from.

use wide::f64x4;

use crate::domain::Grid2D;
use crate::error::{CfdError, CfdResult};
use crate::numerical::exec::{load_lanes, PointKernel, LANES};

/// Per-line difference coefficients of a grid.
///
/// For interior `i`: `cx = 1 / (x[i+1] - x[i-1])`,
/// `ax_e = 2 / ((x[i+1] - x[i-1]) (x[i+1] - x[i]))`,
/// `ax_w = 2 / ((x[i+1] - x[i-1]) (x[i] - x[i-1]))`, and likewise along `y`.
/// On a uniform grid these reduce to `1 / 2h` and `1 / h^2`.
#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    nx: usize,
    ny: usize,
    cx: Vec<f64>,
    ax_e: Vec<f64>,
    ax_w: Vec<f64>,
    cy: Vec<f64>,
    ay_n: Vec<f64>,
    ay_s: Vec<f64>,
}

impl Metrics {
    pub fn new(grid: &Grid2D) -> CfdResult<Self> {
        if !grid.is_initialized() {
            return Err(CfdError::InvalidArgument(
                "grid coordinates have not been initialized".to_string(),
            ));
        }
        let (cx, ax_e, ax_w) = line_coefficients(grid.x.as_slice());
        let (cy, ay_n, ay_s) = line_coefficients(grid.y.as_slice());
        Ok(Self {
            nx: grid.nx(),
            ny: grid.ny(),
            cx,
            ax_e,
            ax_w,
            cy,
            ay_n,
            ay_s,
        })
    }

    pub fn nx(&self) -> usize {
        self.nx
    }

    pub fn ny(&self) -> usize {
        self.ny
    }

    #[inline]
    pub fn ddx(&self, f: &[f64], i: usize, j: usize) -> f64 {
        let k = j * self.nx + i;
        (f[k + 1] - f[k - 1]) * self.cx[i]
    }

    #[inline]
    pub fn ddy(&self, f: &[f64], i: usize, j: usize) -> f64 {
        let k = j * self.nx + i;
        (f[k + self.nx] - f[k - self.nx]) * self.cy[j]
    }

    #[inline]
    pub fn laplacian(&self, f: &[f64], i: usize, j: usize) -> f64 {
        let k = j * self.nx + i;
        let c = f[k];
        self.ax_e[i] * (f[k + 1] - c) - self.ax_w[i] * (c - f[k - 1]) + self.ay_n[j] * (f[k + self.nx] - c)
            - self.ay_s[j] * (c - f[k - self.nx])
    }

    /// Neighbour weights `(east, west, north, south)` of the Laplacian at `(i, j)`.
    #[inline]
    pub fn weights(&self, i: usize, j: usize) -> (f64, f64, f64, f64) {
        (self.ax_e[i], self.ax_w[i], self.ay_n[j], self.ay_s[j])
    }

    pub fn divergence(&self, u: &[f64], v: &[f64], i: usize, j: usize) -> f64 {
        self.ddx(u, i, j) + self.ddy(v, i, j)
    }

    // Vector forms of the operators above over points `i..i + LANES` of row `j`.

    #[inline]
    fn ddx_lanes(&self, f: &[f64], i: usize, j: usize) -> f64x4 {
        let k = j * self.nx + i;
        (load_lanes(f, k + 1) - load_lanes(f, k - 1)) * load_lanes(&self.cx, i)
    }

    #[inline]
    fn ddy_lanes(&self, f: &[f64], i: usize, j: usize) -> f64x4 {
        let k = j * self.nx + i;
        (load_lanes(f, k + self.nx) - load_lanes(f, k - self.nx)) * f64x4::splat(self.cy[j])
    }

    #[inline]
    fn laplacian_lanes(&self, f: &[f64], i: usize, j: usize) -> f64x4 {
        let k = j * self.nx + i;
        let c = load_lanes(f, k);
        load_lanes(&self.ax_e, i) * (load_lanes(f, k + 1) - c) - load_lanes(&self.ax_w, i) * (c - load_lanes(f, k - 1))
            + f64x4::splat(self.ay_n[j]) * (load_lanes(f, k + self.nx) - c)
            - f64x4::splat(self.ay_s[j]) * (c - load_lanes(f, k - self.nx))
    }

    #[inline]
    fn divergence_lanes(&self, u: &[f64], v: &[f64], i: usize, j: usize) -> f64x4 {
        self.ddx_lanes(u, i, j) + self.ddy_lanes(v, i, j)
    }

    /// Weighted Jacobi value `(1 - omega) p + omega * (sum of weighted neighbours - rhs) / diagonal`.
    #[inline]
    fn relax(&self, p: &[f64], rhs: &[f64], omega: f64, i: usize, j: usize) -> f64 {
        let nx = self.nx;
        let k = j * nx + i;
        let (e, w, n, s) = self.weights(i, j);
        let jacobi = (e * p[k + 1] + w * p[k - 1] + n * p[k + nx] + s * p[k - nx] - rhs[k]) / (e + w + n + s);
        (1.0 - omega) * p[k] + omega * jacobi
    }

    #[inline]
    fn relax_lanes(&self, p: &[f64], rhs: &[f64], omega: f64, i: usize, j: usize) -> f64x4 {
        let nx = self.nx;
        let k = j * nx + i;
        let (e, w) = (load_lanes(&self.ax_e, i), load_lanes(&self.ax_w, i));
        let (n, s) = (f64x4::splat(self.ay_n[j]), f64x4::splat(self.ay_s[j]));
        let jacobi = (e * load_lanes(p, k + 1) + w * load_lanes(p, k - 1) + n * load_lanes(p, k + nx)
            + s * load_lanes(p, k - nx)
            - load_lanes(rhs, k))
            / (e + w + n + s);
        f64x4::splat(1.0 - omega) * load_lanes(p, k) + f64x4::splat(omega) * jacobi
    }
}

fn line_coefficients(x: &[f64]) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let n = x.len();
    let mut c = vec![0.0; n];
    let mut east = vec![0.0; n];
    let mut west = vec![0.0; n];
    for i in 1..n.saturating_sub(1) {
        let span = x[i + 1] - x[i - 1];
        c[i] = 1.0 / span;
        east[i] = 2.0 / (span * (x[i + 1] - x[i]));
        west[i] = 2.0 / (span * (x[i] - x[i - 1]));
    }
    (c, east, west)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    U,
    V,
}

/// One explicit momentum update of a velocity component:
/// `c + dt * (-(u dc/dx + v dc/dy) - grad p + mu lap c)`.
/// Without a pressure this is the projection predictor.
pub struct Momentum<'a> {
    pub metrics: &'a Metrics,
    pub u: &'a [f64],
    pub v: &'a [f64],
    pub p: Option<&'a [f64]>,
    pub component: Component,
    pub dt: f64,
    pub mu: f64,
}

impl PointKernel for Momentum<'_> {
    fn point(&self, i: usize, j: usize) -> f64 {
        let m = self.metrics;
        let k = j * m.nx + i;
        let c = match self.component {
            Component::U => self.u,
            Component::V => self.v,
        };
        let advection = self.u[k] * m.ddx(c, i, j) + self.v[k] * m.ddy(c, i, j);
        let pressure = match (self.p, self.component) {
            (Some(p), Component::U) => m.ddx(p, i, j),
            (Some(p), Component::V) => m.ddy(p, i, j),
            (None, _) => 0.0,
        };
        c[k] + self.dt * (self.mu * m.laplacian(c, i, j) - advection - pressure)
    }

    fn lanes(&self, i: usize, j: usize) -> f64x4 {
        let m = self.metrics;
        let k = j * m.nx + i;
        let c = match self.component {
            Component::U => self.u,
            Component::V => self.v,
        };
        let advection = load_lanes(self.u, k) * m.ddx_lanes(c, i, j) + load_lanes(self.v, k) * m.ddy_lanes(c, i, j);
        let pressure = match (self.p, self.component) {
            (Some(p), Component::U) => m.ddx_lanes(p, i, j),
            (Some(p), Component::V) => m.ddy_lanes(p, i, j),
            (None, _) => f64x4::splat(0.0),
        };
        load_lanes(c, k)
            + f64x4::splat(self.dt) * (f64x4::splat(self.mu) * m.laplacian_lanes(c, i, j) - advection - pressure)
    }
}

/// Artificial-compressibility pressure update `p - dt * div(u, v)`.
pub struct PseudoCompressibility<'a> {
    pub metrics: &'a Metrics,
    pub u: &'a [f64],
    pub v: &'a [f64],
    pub p: &'a [f64],
    pub dt: f64,
}

impl PointKernel for PseudoCompressibility<'_> {
    fn point(&self, i: usize, j: usize) -> f64 {
        let k = j * self.metrics.nx + i;
        self.p[k] - self.dt * self.metrics.divergence(self.u, self.v, i, j)
    }

    fn lanes(&self, i: usize, j: usize) -> f64x4 {
        let k = j * self.metrics.nx + i;
        load_lanes(self.p, k) - f64x4::splat(self.dt) * self.metrics.divergence_lanes(self.u, self.v, i, j)
    }
}

/// Poisson right-hand side `div(u, v) / dt`.
pub struct Divergence<'a> {
    pub metrics: &'a Metrics,
    pub u: &'a [f64],
    pub v: &'a [f64],
    pub dt: f64,
}

impl PointKernel for Divergence<'_> {
    fn point(&self, i: usize, j: usize) -> f64 {
        self.metrics.divergence(self.u, self.v, i, j) / self.dt
    }

    fn lanes(&self, i: usize, j: usize) -> f64x4 {
        self.metrics.divergence_lanes(self.u, self.v, i, j) / f64x4::splat(self.dt)
    }
}

/// Weighted Jacobi sweep for `lap p = rhs`.
pub struct JacobiSweep<'a> {
    pub metrics: &'a Metrics,
    pub p: &'a [f64],
    pub rhs: &'a [f64],
    pub omega: f64,
}

impl PointKernel for JacobiSweep<'_> {
    fn point(&self, i: usize, j: usize) -> f64 {
        self.metrics.relax(self.p, self.rhs, self.omega, i, j)
    }

    fn lanes(&self, i: usize, j: usize) -> f64x4 {
        self.metrics.relax_lanes(self.p, self.rhs, self.omega, i, j)
    }
}

/// One colour of a red-black SOR sweep: points with `(i + j) % 2 == colour`
/// are over-relaxed from `p`, the others are copied. Running colour 0 and then
/// colour 1 on the result is one Gauss-Seidel ordered SOR sweep.
pub struct RedBlackSweep<'a> {
    pub metrics: &'a Metrics,
    pub p: &'a [f64],
    pub rhs: &'a [f64],
    pub omega: f64,
    pub colour: usize,
}

impl PointKernel for RedBlackSweep<'_> {
    fn point(&self, i: usize, j: usize) -> f64 {
        if (i + j) % 2 == self.colour {
            self.metrics.relax(self.p, self.rhs, self.omega, i, j)
        } else {
            self.p[j * self.metrics.nx + i]
        }
    }

    fn lanes(&self, i: usize, j: usize) -> f64x4 {
        let relaxed = self.metrics.relax_lanes(self.p, self.rhs, self.omega, i, j).to_array();
        let k = j * self.metrics.nx + i;
        f64x4::from(std::array::from_fn::<f64, LANES, _>(|l| {
            if (i + l + j) % 2 == self.colour {
                relaxed[l]
            } else {
                self.p[k + l]
            }
        }))
    }
}

/// Projection corrector `c - dt * grad p`.
pub struct Correction<'a> {
    pub metrics: &'a Metrics,
    pub c: &'a [f64],
    pub p: &'a [f64],
    pub component: Component,
    pub dt: f64,
}

impl PointKernel for Correction<'_> {
    fn point(&self, i: usize, j: usize) -> f64 {
        let k = j * self.metrics.nx + i;
        let gradient = match self.component {
            Component::U => self.metrics.ddx(self.p, i, j),
            Component::V => self.metrics.ddy(self.p, i, j),
        };
        self.c[k] - self.dt * gradient
    }

    fn lanes(&self, i: usize, j: usize) -> f64x4 {
        let k = j * self.metrics.nx + i;
        let gradient = match self.component {
            Component::U => self.metrics.ddx_lanes(self.p, i, j),
            Component::V => self.metrics.ddy_lanes(self.p, i, j),
        };
        load_lanes(self.c, k) - f64x4::splat(self.dt) * gradient
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DomainBounds2D, GridDimensions2D};
    use approx::assert_relative_eq;

    fn sampled(grid: &Grid2D, f: impl Fn(f64, f64) -> f64) -> Vec<f64> {
        let mut out = Vec::with_capacity(grid.cell_count());
        for j in 0..grid.ny() {
            for i in 0..grid.nx() {
                out.push(f(grid.x[i], grid.y[j]));
            }
        }
        out
    }

    #[test]
    fn test_uniform_metrics() {
        let grid = Grid2D::uniform(5, 3, DomainBounds2D::new(0.0, 2.0, 0.0, 1.0)).unwrap();
        let m = Metrics::new(&grid).unwrap();
        let (e, w, n, s) = m.weights(2, 1);
        assert_relative_eq!(e, 4.0, epsilon = 1e-12);
        assert_relative_eq!(w, 4.0, epsilon = 1e-12);
        assert_relative_eq!(n, 4.0, epsilon = 1e-12);
        assert_relative_eq!(s, 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_quadratics_are_exact_on_stretched_grids() {
        let mut grid = Grid2D::new(GridDimensions2D(9, 7), DomainBounds2D::new(-1.0, 2.0, 0.0, 1.0)).unwrap();
        grid.initialize_stretched(1.5).unwrap();
        let m = Metrics::new(&grid).unwrap();
        let f = sampled(&grid, |x, y| 3.0 * x * x - x * y + 2.0 * y * y + 1.0);
        for j in 1..6 {
            for i in 1..8 {
                let (x, y) = (grid.x[i], grid.y[j]);
                assert_relative_eq!(m.laplacian(&f, i, j), 10.0, epsilon = 1e-8);
                // central differences of a quadratic are exact only on uniform spacing
                let dfdx = m.ddx(&f, i, j);
                let h_plus = grid.x[i + 1] - x;
                let h_minus = x - grid.x[i - 1];
                assert_relative_eq!(dfdx, 6.0 * x - y + 3.0 * (h_plus - h_minus), epsilon = 1e-8);
            }
        }
    }

    #[test]
    fn test_uninitialized_grid_is_rejected() {
        let grid = Grid2D::new(GridDimensions2D(4, 4), DomainBounds2D::unit()).unwrap();
        assert!(matches!(Metrics::new(&grid), Err(CfdError::InvalidArgument(_))));
    }

    #[test]
    fn test_divergence_free_field() {
        let grid = Grid2D::uniform(6, 6, DomainBounds2D::unit()).unwrap();
        let m = Metrics::new(&grid).unwrap();
        // u = x, v = -y
        let u = sampled(&grid, |x, _| x);
        let v = sampled(&grid, |_, y| -y);
        let rhs = Divergence { metrics: &m, u: &u, v: &v, dt: 0.1 };
        for j in 1..5 {
            for i in 1..5 {
                assert_relative_eq!(rhs.point(i, j), 0.0, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_momentum_at_rest_stays_at_rest() {
        let grid = Grid2D::uniform(5, 5, DomainBounds2D::unit()).unwrap();
        let m = Metrics::new(&grid).unwrap();
        let zeros = vec![0.0; 25];
        let p = vec![2.0; 25];
        let kernel = Momentum {
            metrics: &m,
            u: &zeros,
            v: &zeros,
            p: Some(&p),
            component: Component::V,
            dt: 0.01,
            mu: 0.1,
        };
        assert_eq!(kernel.point(2, 2), 0.0);
    }

    #[test]
    fn test_vector_lanes_match_scalar_points() {
        let mut grid = Grid2D::new(GridDimensions2D(11, 6), DomainBounds2D::new(0.0, 2.0, -1.0, 1.0)).unwrap();
        grid.initialize_stretched(1.2).unwrap();
        let m = Metrics::new(&grid).unwrap();
        let u = sampled(&grid, |x, y| (2.0 * x).sin() * y.cos());
        let v = sampled(&grid, |x, y| x * y - 0.3 * y * y);
        let p = sampled(&grid, |x, y| (x - y).exp() * 0.1);
        let kernels: Vec<Box<dyn PointKernel + '_>> = vec![
            Box::new(Momentum { metrics: &m, u: &u, v: &v, p: Some(&p), component: Component::U, dt: 0.01, mu: 0.05 }),
            Box::new(Momentum { metrics: &m, u: &u, v: &v, p: None, component: Component::V, dt: 0.01, mu: 0.05 }),
            Box::new(PseudoCompressibility { metrics: &m, u: &u, v: &v, p: &p, dt: 0.01 }),
            Box::new(Divergence { metrics: &m, u: &u, v: &v, dt: 0.003 }),
            Box::new(JacobiSweep { metrics: &m, p: &p, rhs: &u, omega: 0.8 }),
            Box::new(RedBlackSweep { metrics: &m, p: &p, rhs: &u, omega: 1.7, colour: 0 }),
            Box::new(RedBlackSweep { metrics: &m, p: &p, rhs: &u, omega: 1.7, colour: 1 }),
            Box::new(Correction { metrics: &m, c: &u, p: &p, component: Component::V, dt: 0.01 }),
        ];
        for kernel in &kernels {
            for j in 1..5 {
                for i in 1..=6 {
                    let block = kernel.lanes(i, j).to_array();
                    for (l, value) in block.iter().enumerate() {
                        assert_eq!(value.to_bits(), kernel.point(i + l, j).to_bits(), "point ({}, {})", i + l, j);
                    }
                }
            }
        }
    }

    #[test]
    fn test_red_black_sweep_touches_one_colour() {
        let grid = Grid2D::uniform(6, 6, DomainBounds2D::unit()).unwrap();
        let m = Metrics::new(&grid).unwrap();
        let p = sampled(&grid, |x, y| x + 2.0 * y);
        let rhs = vec![1.0; 36];
        let red = RedBlackSweep { metrics: &m, p: &p, rhs: &rhs, omega: 1.5, colour: 0 };
        assert_eq!(red.point(2, 3), p[3 * 6 + 2]);
        assert_ne!(red.point(2, 2), p[2 * 6 + 2]);
        let plain = JacobiSweep { metrics: &m, p: &p, rhs: &rhs, omega: 1.5 };
        assert_eq!(red.point(3, 1), plain.point(3, 1));
    }
}
