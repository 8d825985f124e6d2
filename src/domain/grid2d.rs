use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::error::{CfdError, CfdResult};
use crate::numerical::try_zeroed;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GridDimensions2D(pub usize, pub usize); // nx, ny (points, edges included)

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DomainBounds2D {
    pub xmin: f64,
    pub xmax: f64,
    pub ymin: f64,
    pub ymax: f64,
}

impl DomainBounds2D {
    pub fn new(xmin: f64, xmax: f64, ymin: f64, ymax: f64) -> Self {
        Self { xmin, xmax, ymin, ymax }
    }

    pub fn unit() -> Self {
        Self::new(0.0, 1.0, 0.0, 1.0)
    }
}

/// How the coordinates were filled in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GridSpacing {
    Uninitialized,
    Uniform,
    Stretched { beta: f64 },
}

/// Structured node grid. Point `(i, j)` sits at `(x[i], y[j])` and maps to the
/// flat index `j * nx + i`.
///
/// ```text
///  y[ny-1] +----+----+----+   top edge    (j = ny-1)
///          |    |    |    |
///          +----+----+----+
///          |    |    |    |
///  y[0]    +----+----+----+   bottom edge (j = 0)
///        x[0]           x[nx-1]
///        left            right
/// ```
#[derive(Debug, Clone)]
pub struct Grid2D {
    pub dimensions: GridDimensions2D,
    pub bounds: DomainBounds2D,
    pub x: DVector<f64>,
    pub y: DVector<f64>,
    spacing: GridSpacing,
}

impl Grid2D {
    /// Validates the layout and allocates zeroed coordinates. Allocation
    /// failure is `OutOfMemory`.
    pub fn new(dimensions: GridDimensions2D, bounds: DomainBounds2D) -> CfdResult<Self> {
        let GridDimensions2D(nx, ny) = dimensions;
        if nx < 2 || ny < 2 {
            return Err(CfdError::InvalidArgument(format!(
                "grid needs at least 2x2 points, got {}x{}",
                nx, ny
            )));
        }
        let DomainBounds2D { xmin, xmax, ymin, ymax } = bounds;
        if ![xmin, xmax, ymin, ymax].iter().all(|b| b.is_finite()) {
            return Err(CfdError::InvalidArgument("domain bounds must be finite".to_string()));
        }
        if xmax <= xmin {
            return Err(CfdError::InvalidArgument(format!(
                "xmax ({}) must be greater than xmin ({})",
                xmax, xmin
            )));
        }
        if ymax <= ymin {
            return Err(CfdError::InvalidArgument(format!(
                "ymax ({}) must be greater than ymin ({})",
                ymax, ymin
            )));
        }
        Ok(Self {
            dimensions,
            bounds,
            x: DVector::from_vec(try_zeroed(nx)?),
            y: DVector::from_vec(try_zeroed(ny)?),
            spacing: GridSpacing::Uninitialized,
        })
    }

    /// Shorthand for `new` followed by `initialize_uniform`.
    pub fn uniform(nx: usize, ny: usize, bounds: DomainBounds2D) -> CfdResult<Self> {
        let mut grid = Self::new(GridDimensions2D(nx, ny), bounds)?;
        grid.initialize_uniform();
        Ok(grid)
    }

    pub fn initialize_uniform(&mut self) {
        let DomainBounds2D { xmin, xmax, ymin, ymax } = self.bounds;
        fill_uniform(&mut self.x, xmin, xmax);
        fill_uniform(&mut self.y, ymin, ymax);
        self.spacing = GridSpacing::Uniform;
    }

    /// Hyperbolic-tangent clustering toward both ends of each axis:
    /// `x = xmin + (xmax - xmin) * (1 + tanh(beta * (2 xi - 1)) / tanh(beta)) / 2`.
    pub fn initialize_stretched(&mut self, beta: f64) -> CfdResult<()> {
        if !(beta.is_finite() && beta > 0.0) {
            return Err(CfdError::InvalidArgument(format!(
                "stretching factor beta must be positive, got {}",
                beta
            )));
        }
        let DomainBounds2D { xmin, xmax, ymin, ymax } = self.bounds;
        fill_stretched(&mut self.x, xmin, xmax, beta);
        fill_stretched(&mut self.y, ymin, ymax, beta);
        self.spacing = GridSpacing::Stretched { beta };
        Ok(())
    }

    pub fn nx(&self) -> usize {
        self.dimensions.0
    }

    pub fn ny(&self) -> usize {
        self.dimensions.1
    }

    pub fn cell_count(&self) -> usize {
        self.nx() * self.ny()
    }

    pub fn index(&self, i: usize, j: usize) -> usize {
        debug_assert!(i < self.nx() && j < self.ny());
        j * self.nx() + i
    }

    pub fn spacing(&self) -> GridSpacing {
        self.spacing
    }

    pub fn is_initialized(&self) -> bool {
        self.spacing != GridSpacing::Uninitialized
    }

    pub fn dx_min(&self) -> f64 {
        min_gap(&self.x)
    }

    pub fn dy_min(&self) -> f64 {
        min_gap(&self.y)
    }
}

fn fill_uniform(coords: &mut DVector<f64>, lo: f64, hi: f64) {
    let n = coords.len();
    let h = (hi - lo) / (n - 1) as f64;
    for i in 0..n {
        coords[i] = lo + i as f64 * h;
    }
    coords[n - 1] = hi;
}

fn fill_stretched(coords: &mut DVector<f64>, lo: f64, hi: f64, beta: f64) {
    let n = coords.len();
    let tanh_beta = beta.tanh();
    for i in 0..n {
        let xi = i as f64 / (n - 1) as f64;
        let s = 0.5 * (1.0 + (beta * (2.0 * xi - 1.0)).tanh() / tanh_beta);
        coords[i] = lo + (hi - lo) * s;
    }
    coords[0] = lo;
    coords[n - 1] = hi;
}

fn min_gap(coords: &DVector<f64>) -> f64 {
    coords
        .as_slice()
        .windows(2)
        .map(|w| w[1] - w[0])
        .fold(f64::INFINITY, f64::min)
}
