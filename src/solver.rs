//! The stepping contract shared by every solver variant.

pub mod explicit_euler;
pub mod projection;
pub mod registry;

pub use registry::{Listing, SolverFactory, SolverRegistry};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::backend::Backend;
use crate::boundary::{BoundaryEngine, BoundarySetup};
use crate::domain::{FlowField, Grid2D};
use crate::error::{CfdError, CfdResult};
use crate::numerical::{courant_number, try_scratch, Metrics};
pub use crate::poisson::PressureSolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Incompressible,
    Compressible,
    SteadyState,
    Transient,
    Simd,
    Parallel,
    Gpu,
}

impl Capability {
    pub const ALL: [Capability; 7] = [
        Capability::Incompressible,
        Capability::Compressible,
        Capability::SteadyState,
        Capability::Transient,
        Capability::Simd,
        Capability::Parallel,
        Capability::Gpu,
    ];

    fn bit(self) -> u8 {
        1 << (self as u8)
    }

    pub fn name(self) -> &'static str {
        match self {
            Capability::Incompressible => "incompressible",
            Capability::Compressible => "compressible",
            Capability::SteadyState => "steady_state",
            Capability::Transient => "transient",
            Capability::Simd => "simd",
            Capability::Parallel => "parallel",
            Capability::Gpu => "gpu",
        }
    }
}

/// A set of [`Capability`] flags.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Capabilities(u8);

impl Capabilities {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn of(caps: &[Capability]) -> Self {
        Self(caps.iter().fold(0, |bits, c| bits | c.bit()))
    }

    pub fn with(self, cap: Capability) -> Self {
        Self(self.0 | cap.bit())
    }

    pub fn contains(self, cap: Capability) -> bool {
        self.0 & cap.bit() != 0
    }

    pub fn iter(self) -> impl Iterator<Item = Capability> {
        Capability::ALL.into_iter().filter(move |c| self.contains(*c))
    }

    pub fn names(self) -> Vec<&'static str> {
        self.iter().map(Capability::name).collect()
    }

    /// The execution backend these capabilities imply.
    pub fn backend(self) -> Backend {
        if self.contains(Capability::Gpu) {
            Backend::Cuda
        } else if self.contains(Capability::Parallel) {
            Backend::Omp
        } else if self.contains(Capability::Simd) {
            Backend::Simd
        } else {
            Backend::Scalar
        }
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter().map(Capability::name)).finish()
    }
}

impl Serialize for Capabilities {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SolverDescriptor {
    pub name: String,
    pub description: String,
    pub version: String,
    pub capabilities: Capabilities,
}

impl SolverDescriptor {
    pub fn new(name: &str, description: &str, capabilities: Capabilities) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            capabilities,
        }
    }

    pub fn backend(&self) -> Backend {
        self.capabilities.backend()
    }
}

/// Numerical parameters of a step. Missing fields take their defaults when deserialized.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverParams {
    pub dt: f64,
    /// Largest advective Courant number a step may produce.
    pub cfl: f64,
    pub gamma: f64,
    /// Dynamic viscosity (unit density).
    pub mu: f64,
    /// Thermal conductivity.
    pub k: f64,
    pub max_iter: usize,
    pub tolerance: f64,
    pub pressure_solver: PressureSolver,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            dt: 0.001,
            cfl: 0.2,
            gamma: 1.4,
            mu: 0.01,
            k: 0.0242,
            max_iter: 1000,
            tolerance: 1e-6,
            pressure_solver: PressureSolver::default(),
        }
    }
}

impl SolverParams {
    pub fn validate(&self) -> CfdResult<()> {
        let finite = [self.dt, self.cfl, self.gamma, self.mu, self.k, self.tolerance]
            .iter()
            .all(|x| x.is_finite());
        if !finite {
            return Err(CfdError::InvalidArgument("solver parameters must be finite".to_string()));
        }
        let checks = [
            (self.dt > 0.0, "dt must be positive"),
            (self.cfl > 0.0 && self.cfl <= 1.0, "cfl must be in (0, 1]"),
            (self.gamma > 0.0, "gamma must be positive"),
            (self.mu >= 0.0, "mu must be non-negative"),
            (self.k >= 0.0, "k must be non-negative"),
            (self.max_iter >= 1, "max_iter must be at least 1"),
            (self.tolerance > 0.0, "tolerance must be positive"),
        ];
        match checks.iter().find(|(ok, _)| !ok) {
            Some((_, msg)) => Err(CfdError::InvalidArgument(msg.to_string())),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct SolverStats {
    /// 1 for explicit updates; pressure sweeps for projection variants.
    pub iterations: usize,
    pub max_velocity: f64,
    pub max_pressure: f64,
    pub elapsed_time_ms: f64,
    /// Final pressure-solve update norm (0 when there is none).
    pub residual: f64,
    pub courant: f64,
}

pub trait Solver: Send {
    fn descriptor(&self) -> &SolverDescriptor;

    fn backend(&self) -> Backend;

    /// Backend of the boundary engine the steps apply conditions with, once initialized.
    fn boundary_backend(&self) -> Option<Backend>;

    /// Validates the setup and allocates scratch buffers for one simulation.
    /// Every step applies `boundaries` through `engine`.
    fn init(
        &mut self,
        grid: &Grid2D,
        params: &SolverParams,
        boundaries: &BoundarySetup,
        engine: BoundaryEngine,
    ) -> CfdResult<()>;

    /// Advances `field` by one time step: interior update, boundary conditions, stats.
    fn step(&mut self, field: &mut FlowField, grid: &Grid2D, params: &SolverParams) -> CfdResult<SolverStats>;

    /// Drops scratch buffers.
    fn release(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverState {
    Uninitialized,
    Initialized,
    Stepping,
    /// A step diverged or its pressure solve ran out of iterations.
    Failed,
    Finalized,
}

/// A solver created from a registry, tracking its lifecycle. While it is alive
/// the registry refuses new registrations.
pub struct SolverInstance {
    solver: Box<dyn Solver>,
    state: SolverState,
    steps: usize,
    _lease: Arc<()>,
}

impl fmt::Debug for SolverInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SolverInstance")
            .field("name", &self.solver.descriptor().name)
            .field("backend", &self.solver.backend())
            .field("state", &self.state)
            .field("steps", &self.steps)
            .finish()
    }
}

impl SolverInstance {
    pub(crate) fn new(solver: Box<dyn Solver>, lease: Arc<()>) -> Self {
        Self {
            solver,
            state: SolverState::Uninitialized,
            steps: 0,
            _lease: lease,
        }
    }

    pub fn descriptor(&self) -> &SolverDescriptor {
        self.solver.descriptor()
    }

    pub fn name(&self) -> &str {
        &self.solver.descriptor().name
    }

    pub fn backend(&self) -> Backend {
        self.solver.backend()
    }

    pub fn state(&self) -> SolverState {
        self.state
    }

    pub fn steps_taken(&self) -> usize {
        self.steps
    }

    pub fn boundary_backend(&self) -> Option<Backend> {
        self.solver.boundary_backend()
    }

    pub fn init(
        &mut self,
        grid: &Grid2D,
        params: &SolverParams,
        boundaries: &BoundarySetup,
        engine: BoundaryEngine,
    ) -> CfdResult<()> {
        if self.state != SolverState::Uninitialized {
            return Err(CfdError::InvalidArgument(format!(
                "solver '{}' cannot be initialized from state {:?}",
                self.name(),
                self.state
            )));
        }
        self.solver.init(grid, params, boundaries, engine)?;
        self.state = SolverState::Initialized;
        debug!(
            solver = self.name(),
            backend = %self.backend(),
            bc_backend = %engine.backend(),
            "solver initialized"
        );
        Ok(())
    }

    pub fn step(&mut self, field: &mut FlowField, grid: &Grid2D, params: &SolverParams) -> CfdResult<SolverStats> {
        if !matches!(self.state, SolverState::Initialized | SolverState::Stepping) {
            return Err(CfdError::InvalidArgument(format!(
                "solver '{}' cannot step from state {:?}",
                self.name(),
                self.state
            )));
        }
        let start = Instant::now();
        let mut stats = match self.solver.step(field, grid, params) {
            Ok(stats) => stats,
            Err(err) => {
                // the field holds the failed step's values, so the run cannot continue
                if matches!(err, CfdError::Diverged(_) | CfdError::MaxIterationsExceeded { .. }) {
                    self.state = SolverState::Failed;
                }
                return Err(err);
            }
        };
        stats.elapsed_time_ms = start.elapsed().as_secs_f64() * 1000.0;
        self.state = SolverState::Stepping;
        self.steps += 1;
        Ok(stats)
    }

    pub fn finalize(&mut self) {
        if self.state != SolverState::Finalized {
            self.solver.release();
            self.state = SolverState::Finalized;
        }
    }
}

/// Scratch state shared by the CPU solver families.
pub(crate) struct Workspace {
    pub metrics: Metrics,
    pub boundaries: BoundarySetup,
    pub engine: BoundaryEngine,
    pub u: nalgebra::DMatrix<f64>,
    pub v: nalgebra::DMatrix<f64>,
    pub p: nalgebra::DMatrix<f64>,
}

impl Workspace {
    pub fn new(
        grid: &Grid2D,
        params: &SolverParams,
        boundaries: &BoundarySetup,
        engine: BoundaryEngine,
    ) -> CfdResult<Self> {
        params.validate()?;
        boundaries.validate()?;
        let metrics = Metrics::new(grid)?;
        let (nx, ny) = (grid.nx(), grid.ny());
        Ok(Self {
            metrics,
            boundaries: boundaries.clone(),
            engine,
            u: try_scratch(nx, ny)?,
            v: try_scratch(nx, ny)?,
            p: try_scratch(nx, ny)?,
        })
    }

    /// Checks that the call matches the grid this workspace was built for.
    pub fn check(&self, field: &FlowField, grid: &Grid2D, params: &SolverParams) -> CfdResult<()> {
        params.validate()?;
        let shape = (self.metrics.nx(), self.metrics.ny());
        if (grid.nx(), grid.ny()) != shape {
            return Err(CfdError::InvalidArgument(format!(
                "grid is {}x{} but the solver was initialized for {}x{}",
                grid.nx(),
                grid.ny(),
                shape.0,
                shape.1
            )));
        }
        if !field.matches(grid) {
            return Err(CfdError::InvalidArgument(format!(
                "field is {}x{} but the grid is {}x{}",
                field.nx(),
                field.ny(),
                grid.nx(),
                grid.ny()
            )));
        }
        Ok(())
    }
}

pub(crate) fn not_initialized(name: &str) -> CfdError {
    CfdError::InvalidArgument(format!("solver '{}' has not been initialized", name))
}

/// Post-step checks and stats: non-finite values or an excessive Courant number are divergence.
pub(crate) fn finish_step(
    field: &FlowField,
    grid: &Grid2D,
    params: &SolverParams,
    iterations: usize,
    residual: f64,
) -> CfdResult<SolverStats> {
    if !field.is_finite() {
        return Err(CfdError::Diverged("flow field contains non-finite values".to_string()));
    }
    let courant = courant_number(field, grid, params.dt);
    if courant > params.cfl {
        return Err(CfdError::Diverged(format!(
            "Courant number {:.3} exceeds the limit {:.3}",
            courant, params.cfl
        )));
    }
    Ok(SolverStats {
        iterations,
        max_velocity: field.max_velocity(),
        max_pressure: field.max_pressure(),
        elapsed_time_ms: 0.0,
        residual,
        courant,
    })
}
