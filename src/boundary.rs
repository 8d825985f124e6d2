//! Boundary conditions on flat row-major field arrays.
//!
//! The free functions run on the scalar backend. Use a [`BoundaryEngine`] (or
//! the `*_with_backend` helpers) to pick another one.

pub mod bc2d;
pub mod engine;
pub mod kernels;

pub use bc2d::{
    BcType, BoundaryCondition, BoundarySetup, DirichletValues, Edge, InletConfig, InletProfile, PressureBoundary,
};
pub use engine::BoundaryEngine;

use crate::backend::{Backend, BackendChoice, HostProbe};
use crate::error::CfdResult;

pub fn apply_scalar(field: &mut [f64], nx: usize, ny: usize, kind: BcType) -> CfdResult<()> {
    BoundaryEngine::scalar().apply_scalar(field, nx, ny, kind)
}

pub fn apply_velocity(u: &mut [f64], v: &mut [f64], nx: usize, ny: usize, kind: BcType) -> CfdResult<()> {
    BoundaryEngine::scalar().apply_velocity(u, v, nx, ny, kind)
}

pub fn apply_dirichlet_scalar(field: &mut [f64], nx: usize, ny: usize, values: &DirichletValues) -> CfdResult<()> {
    BoundaryEngine::scalar().apply_dirichlet_scalar(field, nx, ny, values)
}

pub fn apply_noslip(u: &mut [f64], v: &mut [f64], nx: usize, ny: usize) -> CfdResult<()> {
    BoundaryEngine::scalar().apply_noslip(u, v, nx, ny)
}

pub fn apply_inlet(u: &mut [f64], v: &mut [f64], nx: usize, ny: usize, inlet: &InletConfig) -> CfdResult<()> {
    BoundaryEngine::scalar().apply_inlet(u, v, nx, ny, inlet)
}

pub fn apply_outlet_scalar(field: &mut [f64], nx: usize, ny: usize, edge: Edge) -> CfdResult<()> {
    BoundaryEngine::scalar().apply_outlet_scalar(field, nx, ny, edge)
}

pub fn apply_outlet_velocity(u: &mut [f64], v: &mut [f64], nx: usize, ny: usize, edge: Edge) -> CfdResult<()> {
    BoundaryEngine::scalar().apply_outlet_velocity(u, v, nx, ny, edge)
}

/// Applies `kind` on the backend `choice` resolves to on this host, and reports that backend.
pub fn apply_scalar_with_backend(
    field: &mut [f64],
    nx: usize,
    ny: usize,
    kind: BcType,
    choice: BackendChoice,
) -> CfdResult<Backend> {
    let engine = BoundaryEngine::new(choice, &HostProbe)?;
    engine.apply_scalar(field, nx, ny, kind)?;
    Ok(engine.backend())
}

pub fn apply_velocity_with_backend(
    u: &mut [f64],
    v: &mut [f64],
    nx: usize,
    ny: usize,
    kind: BcType,
    choice: BackendChoice,
) -> CfdResult<Backend> {
    let engine = BoundaryEngine::new(choice, &HostProbe)?;
    engine.apply_velocity(u, v, nx, ny, kind)?;
    Ok(engine.backend())
}
