use nalgebra::DMatrix;

use crate::domain::grid2d::Grid2D;
use crate::error::{CfdError, CfdResult};
use crate::numerical::try_scratch;

/// Velocity and pressure samples on the grid points.
///
/// Each component is an `nx x ny` matrix. nalgebra stores matrices column-major,
/// so `u[(i, j)]` lives at flat offset `j * nx + i`: the slices returned by
/// [`FlowField::u_slice`] and friends are row-major over the grid.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowField {
    pub u: DMatrix<f64>,
    pub v: DMatrix<f64>,
    pub p: DMatrix<f64>,
}

impl FlowField {
    pub fn new(grid: &Grid2D) -> CfdResult<Self> {
        Self::zeros(grid.nx(), grid.ny())
    }

    /// A field at rest. Allocation failure is `OutOfMemory`.
    pub fn zeros(nx: usize, ny: usize) -> CfdResult<Self> {
        Ok(Self {
            u: try_scratch(nx, ny)?,
            v: try_scratch(nx, ny)?,
            p: try_scratch(nx, ny)?,
        })
    }

    /// Builds a field from flat row-major sequences of length `nx * ny`.
    pub fn from_vecs(nx: usize, ny: usize, u: Vec<f64>, v: Vec<f64>, p: Vec<f64>) -> CfdResult<Self> {
        let size = nx * ny;
        for (name, len) in [("u", u.len()), ("v", v.len()), ("p", p.len())] {
            if len != size {
                return Err(CfdError::InvalidArgument(format!(
                    "{} has {} values, expected nx*ny = {}",
                    name, len, size
                )));
            }
        }
        Ok(Self {
            u: DMatrix::from_vec(nx, ny, u),
            v: DMatrix::from_vec(nx, ny, v),
            p: DMatrix::from_vec(nx, ny, p),
        })
    }

    pub fn fill_uniform(&mut self, u: f64, v: f64, p: f64) {
        self.u.fill(u);
        self.v.fill(v);
        self.p.fill(p);
    }

    pub fn nx(&self) -> usize {
        self.u.nrows()
    }

    pub fn ny(&self) -> usize {
        self.u.ncols()
    }

    pub fn len(&self) -> usize {
        self.u.len()
    }

    pub fn is_empty(&self) -> bool {
        self.u.is_empty()
    }

    pub fn matches(&self, grid: &Grid2D) -> bool {
        self.nx() == grid.nx() && self.ny() == grid.ny()
    }

    pub fn u_slice(&self) -> &[f64] {
        self.u.as_slice()
    }

    pub fn v_slice(&self) -> &[f64] {
        self.v.as_slice()
    }

    pub fn p_slice(&self) -> &[f64] {
        self.p.as_slice()
    }

    /// Mutable views of both velocity components at once.
    pub fn velocity_mut(&mut self) -> (&mut [f64], &mut [f64]) {
        (self.u.as_mut_slice(), self.v.as_mut_slice())
    }

    pub fn is_finite(&self) -> bool {
        self.u.iter().chain(self.v.iter()).chain(self.p.iter()).all(|x| x.is_finite())
    }

    pub fn max_velocity(&self) -> f64 {
        self.u
            .iter()
            .zip(self.v.iter())
            .map(|(u, v)| (u * u + v * v).sqrt())
            .fold(0.0, f64::max)
    }

    pub fn max_pressure(&self) -> f64 {
        self.p.iter().map(|p| p.abs()).fold(0.0, f64::max)
    }
}
