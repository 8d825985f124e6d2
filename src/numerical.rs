pub mod exec;
pub mod stencil;

pub use exec::{Executor, PointKernel};
pub use stencil::{Component, Metrics};

use nalgebra::DMatrix;

use crate::domain::{FlowField, Grid2D};
use crate::error::{CfdError, CfdResult};

/// Advective Courant number `dt * (max|u| / dx_min + max|v| / dy_min)`.
pub fn courant_number(field: &FlowField, grid: &Grid2D, dt: f64) -> f64 {
    let u_max = field.u.iter().fold(0.0_f64, |m, x| m.max(x.abs()));
    let v_max = field.v.iter().fold(0.0_f64, |m, x| m.max(x.abs()));
    dt * (u_max / grid.dx_min() + v_max / grid.dy_min())
}

/// `len` zeros; allocation failure is reported instead of aborting.
pub fn try_zeroed(len: usize) -> CfdResult<Vec<f64>> {
    let mut data: Vec<f64> = Vec::new();
    data.try_reserve_exact(len)
        .map_err(|e| CfdError::OutOfMemory(format!("buffer of {} values: {}", len, e)))?;
    data.resize(len, 0.0);
    Ok(data)
}

/// Zeroed `nx x ny` matrix, allocated through [`try_zeroed`].
pub fn try_scratch(nx: usize, ny: usize) -> CfdResult<DMatrix<f64>> {
    let len = nx
        .checked_mul(ny)
        .ok_or_else(|| CfdError::OutOfMemory(format!("{}x{} values overflow usize", nx, ny)))?;
    Ok(DMatrix::from_vec(nx, ny, try_zeroed(len)?))
}

/// Mean over all entries.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}
