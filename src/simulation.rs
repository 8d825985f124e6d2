//! Simulation context and driver.
//!
//! A [`SimulationContext`] owns the solver registry, the backend probe and the
//! last-error slot. A [`Simulation`] ties one grid, one flow field and one
//! solver instance together and steps them.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tracing::{debug, info, info_span, warn};

use crate::backend::{BackendChoice, BackendProbe, HostProbe};
use crate::boundary::{BoundaryEngine, BoundarySetup};
use crate::config::{RunConfig, RunSummary};
use crate::derived::{compute_flow_statistics, FlowStatistics};
use crate::domain::{DomainBounds2D, FlowField, Grid2D, GridDimensions2D};
use crate::error::{CfdError, CfdResult, ErrorRecord, StatusCode};
use crate::solver::{SolverInstance, SolverParams, SolverRegistry, SolverStats};

pub struct SimulationContext {
    registry: SolverRegistry,
    probe: Arc<dyn BackendProbe>,
    last_error: Mutex<Option<ErrorRecord>>,
}

impl Default for SimulationContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulationContext {
    /// Built-in solvers, probing the host CPU.
    pub fn new() -> Self {
        Self::with_probe(Arc::new(HostProbe))
    }

    pub fn with_probe(probe: Arc<dyn BackendProbe>) -> Self {
        Self {
            registry: SolverRegistry::with_builtins(),
            probe,
            last_error: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &SolverRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut SolverRegistry {
        &mut self.registry
    }

    pub fn probe(&self) -> &dyn BackendProbe {
        &*self.probe
    }

    fn slot(&self) -> MutexGuard<'_, Option<ErrorRecord>> {
        self.last_error.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Records a failure in the last-error slot and passes the result through.
    pub fn check<T>(&self, result: CfdResult<T>) -> CfdResult<T> {
        if let Err(err) = &result {
            debug!(status = ?err.status(), "{}", err);
            *self.slot() = Some(ErrorRecord::from(err));
        }
        result
    }

    pub fn last_status(&self) -> StatusCode {
        self.slot().as_ref().map_or(StatusCode::Success, |record| record.status)
    }

    pub fn last_error(&self) -> Option<ErrorRecord> {
        self.slot().clone()
    }

    pub fn clear_error(&self) {
        *self.slot() = None;
    }

    pub fn create_grid(&self, nx: usize, ny: usize, bounds: DomainBounds2D) -> CfdResult<Grid2D> {
        self.check(Grid2D::uniform(nx, ny, bounds))
    }

    pub fn create_stretched_grid(&self, nx: usize, ny: usize, bounds: DomainBounds2D, beta: f64) -> CfdResult<Grid2D> {
        self.check(Grid2D::new(GridDimensions2D(nx, ny), bounds).and_then(|mut grid| {
            grid.initialize_stretched(beta)?;
            Ok(grid)
        }))
    }

    pub fn create_solver(&self, name: &str) -> CfdResult<SolverInstance> {
        self.check(self.registry.create(name, self.probe()))
    }

    pub fn boundary_engine(&self, choice: BackendChoice) -> CfdResult<BoundaryEngine> {
        self.check(BoundaryEngine::new(choice, self.probe()))
    }

    pub fn create_simulation(
        &self,
        grid: Grid2D,
        solver: &str,
        params: SolverParams,
        boundaries: BoundarySetup,
    ) -> CfdResult<Simulation> {
        let solver = self.create_solver(solver)?;
        let engine = self.boundary_engine(BackendChoice::Auto)?;
        self.check(Simulation::new(grid, solver, params, boundaries, engine))
    }

    /// Builds everything a [`RunConfig`] describes and steps it to completion.
    pub fn run(&self, config: &RunConfig) -> CfdResult<RunSummary> {
        self.check(config.validate())?;
        let grid = match config.stretching {
            Some(beta) => self.create_stretched_grid(config.nx, config.ny, config.bounds, beta)?,
            None => self.create_grid(config.nx, config.ny, config.bounds)?,
        };
        let solver = self.create_solver(&config.solver)?;
        let engine = self.boundary_engine(config.bc_backend)?;
        let mut sim = self.check(Simulation::new(
            grid,
            solver,
            config.params,
            config.boundaries.setup(),
            engine,
        ))?;
        let init = config.initial;
        self.check(sim.fill_uniform(init.u, init.v, init.p))?;

        let start = Instant::now();
        let last_stats = self.check(sim.run(config.steps))?;
        let statistics = self.check(sim.statistics())?;
        Ok(RunSummary {
            solver: sim.solver().name().to_string(),
            backend: sim.solver().backend(),
            bc_backend: sim.solver().boundary_backend().unwrap_or(sim.engine().backend()),
            nx: sim.grid().nx(),
            ny: sim.grid().ny(),
            steps_completed: sim.steps_completed(),
            time: sim.time(),
            elapsed_ms: start.elapsed().as_secs_f64() * 1000.0,
            last_stats,
            statistics,
        })
    }
}

/// One grid, its flow field and the solver stepping it.
#[derive(Debug)]
pub struct Simulation {
    grid: Grid2D,
    field: FlowField,
    params: SolverParams,
    boundaries: BoundarySetup,
    solver: SolverInstance,
    engine: BoundaryEngine,
    time: f64,
    steps: usize,
    last_stats: Option<SolverStats>,
}

impl Simulation {
    /// Initializes `solver` and creates a field at rest with the boundary conditions applied.
    pub fn new(
        grid: Grid2D,
        mut solver: SolverInstance,
        params: SolverParams,
        boundaries: BoundarySetup,
        engine: BoundaryEngine,
    ) -> CfdResult<Self> {
        if !grid.is_initialized() {
            return Err(CfdError::InvalidArgument("grid coordinates have not been initialized".to_string()));
        }
        solver.init(&grid, &params, &boundaries, engine)?;
        let mut field = FlowField::new(&grid)?;
        engine.apply_setup(&mut field, &boundaries)?;
        Ok(Self {
            grid,
            field,
            params,
            boundaries,
            solver,
            engine,
            time: 0.0,
            steps: 0,
            last_stats: None,
        })
    }

    pub fn grid(&self) -> &Grid2D {
        &self.grid
    }

    pub fn field(&self) -> &FlowField {
        &self.field
    }

    /// Direct access for custom initial conditions. Boundary values are
    /// re-imposed on the next step.
    pub fn field_mut(&mut self) -> &mut FlowField {
        &mut self.field
    }

    pub fn params(&self) -> &SolverParams {
        &self.params
    }

    pub fn set_params(&mut self, params: SolverParams) -> CfdResult<()> {
        params.validate()?;
        self.params = params;
        Ok(())
    }

    pub fn solver(&self) -> &SolverInstance {
        &self.solver
    }

    pub fn engine(&self) -> &BoundaryEngine {
        &self.engine
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn steps_completed(&self) -> usize {
        self.steps
    }

    pub fn last_stats(&self) -> Option<SolverStats> {
        self.last_stats
    }

    pub fn fill_uniform(&mut self, u: f64, v: f64, p: f64) -> CfdResult<()> {
        self.field.fill_uniform(u, v, p);
        self.engine.apply_setup(&mut self.field, &self.boundaries)
    }

    pub fn statistics(&self) -> CfdResult<FlowStatistics> {
        compute_flow_statistics(&self.field)
    }

    pub fn step(&mut self) -> CfdResult<SolverStats> {
        let stats = self.solver.step(&mut self.field, &self.grid, &self.params)?;
        self.time += self.params.dt;
        self.steps += 1;
        self.last_stats = Some(stats);
        Ok(stats)
    }

    /// Runs `num_steps` steps, stopping at the first failure. Returns the stats of the last step.
    pub fn run(&mut self, num_steps: usize) -> CfdResult<Option<SolverStats>> {
        let _run_span = info_span!("simulation_run", solver = self.solver.name(), num_steps).entered();
        info!("Starting simulation with {} steps", num_steps);
        let start = Instant::now();

        for i in 0..num_steps {
            let _step_span = info_span!("time_step", step = self.steps + 1).entered();
            match self.step() {
                Ok(stats) => {
                    info!(
                        "Step {}: time={:.4}, |u|max={:.4}, |p|max={:.4}, iters={}, elapsed={:.2}ms",
                        i + 1,
                        self.time,
                        stats.max_velocity,
                        stats.max_pressure,
                        stats.iterations,
                        stats.elapsed_time_ms
                    );
                }
                Err(err) => {
                    warn!(error = %err, "Simulation step failed");
                    return Err(err);
                }
            }
        }

        info!("Simulation finished in {:.2}s", start.elapsed().as_secs_f64());
        Ok(self.last_stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Backend, FixedProbe};
    use crate::boundary::BoundaryCondition;
    use crate::config::BoundaryPreset;
    use crate::logging::init_test_logging;
    use crate::solver::{Capabilities, Capability, SolverDescriptor, SolverFactory};

    fn scalar_context() -> SimulationContext {
        SimulationContext::with_probe(Arc::new(FixedProbe::scalar_only()))
    }

    #[test]
    fn test_explicit_euler_zero_field_run() {
        init_test_logging();
        let ctx = scalar_context();
        let grid = ctx.create_grid(4, 4, DomainBounds2D::unit()).unwrap();
        let mut sim = ctx
            .create_simulation(grid, "explicit_euler", SolverParams::default(), BoundarySetup::walls())
            .unwrap();
        let stats = sim.step().unwrap();
        assert_eq!(stats.max_velocity, 0.0);
        assert_eq!(stats.iterations, 1);

        let last = sim.run(4).unwrap().unwrap();
        assert_eq!(last.max_velocity, 0.0);
        assert_eq!(sim.steps_completed(), 5);
        assert!((sim.time() - 0.005).abs() < 1e-15);
        assert_eq!(ctx.last_status(), StatusCode::Success);
    }

    #[test]
    fn test_last_error_channel() {
        let ctx = scalar_context();
        assert!(ctx.last_error().is_none());

        assert!(ctx.create_solver("nope").is_err());
        assert_eq!(ctx.last_status(), StatusCode::UnknownSolver);
        assert_eq!(ctx.last_status().code(), -8);
        assert!(ctx.last_error().unwrap().message.contains("nope"));

        assert!(ctx.create_grid(1, 4, DomainBounds2D::unit()).is_err());
        assert_eq!(ctx.last_status(), StatusCode::Invalid);

        assert!(matches!(
            ctx.create_grid(1 << 47, 2, DomainBounds2D::unit()),
            Err(CfdError::OutOfMemory(_))
        ));
        assert_eq!(ctx.last_status(), StatusCode::OutOfMemory);

        assert!(ctx.create_solver("projection_optimized").is_err());
        assert_eq!(ctx.last_status(), StatusCode::Unsupported);
        assert!(ctx.boundary_engine(BackendChoice::Cuda).is_err());

        let _ = ctx.check::<()>(Err(CfdError::Diverged("blew up".to_string())));
        assert_eq!(ctx.last_status(), StatusCode::Diverged);

        ctx.clear_error();
        assert_eq!(ctx.last_status(), StatusCode::Success);
        assert!(ctx.check(Ok(3)).is_ok());
        assert!(ctx.last_error().is_none());
    }

    #[test]
    fn test_stretched_grid_creation() {
        let ctx = scalar_context();
        let grid = ctx.create_stretched_grid(9, 9, DomainBounds2D::unit(), 1.5).unwrap();
        assert!(grid.is_initialized());
        assert!(ctx.create_stretched_grid(9, 9, DomainBounds2D::unit(), 0.0).is_err());
        assert_eq!(ctx.last_status(), StatusCode::Invalid);
    }

    #[test]
    fn test_uninitialized_grid_rejected() {
        let ctx = scalar_context();
        let grid = Grid2D::new(GridDimensions2D(4, 4), DomainBounds2D::unit()).unwrap();
        let result = ctx.create_simulation(grid, "explicit_euler", SolverParams::default(), BoundarySetup::walls());
        assert!(result.is_err());
        assert_eq!(ctx.last_status(), StatusCode::Invalid);
    }

    #[test]
    fn test_registration_waits_for_simulations() {
        let mut ctx = scalar_context();
        let grid = ctx.create_grid(4, 4, DomainBounds2D::unit()).unwrap();
        let sim = ctx
            .create_simulation(grid, "projection", SolverParams::default(), BoundarySetup::walls())
            .unwrap();
        assert_eq!(ctx.registry().live_instances(), 1);
        drop(sim);

        let factory: SolverFactory = Arc::new(
            |_: &SolverDescriptor, _: &dyn BackendProbe| -> CfdResult<Box<dyn crate::solver::Solver>> {
                Err(CfdError::UnsupportedBackend("stub".to_string()))
            },
        );
        let descriptor = SolverDescriptor::new("stub", "stub", Capabilities::of(&[Capability::SteadyState]));
        ctx.registry_mut().register(descriptor, factory).unwrap();
        assert!(ctx.registry().has("stub"));
    }

    #[test]
    fn test_run_lid_driven_projection() {
        init_test_logging();
        let ctx = scalar_context();
        let config = RunConfig {
            nx: 8,
            ny: 8,
            steps: 3,
            ..Default::default()
        };
        let summary = ctx.run(&config).unwrap();
        assert_eq!(summary.solver, "projection");
        assert_eq!(summary.backend, Backend::Scalar);
        assert_eq!(summary.bc_backend, Backend::Omp);
        assert_eq!(summary.steps_completed, 3);
        let iterations = summary.last_stats.unwrap().iterations;
        assert!(iterations > 1 && iterations < config.params.max_iter);
        let magnitude = summary.statistics.velocity_magnitude.unwrap();
        assert_eq!(magnitude.max, 1.0);
        assert!(summary.statistics.u.max >= 1.0);
    }

    #[test]
    fn test_run_channel_on_stretched_grid() {
        let ctx = SimulationContext::with_probe(Arc::new(FixedProbe::with_simd()));
        let config = RunConfig {
            nx: 16,
            ny: 9,
            bounds: DomainBounds2D::new(0.0, 2.0, 0.0, 1.0),
            stretching: Some(1.0),
            solver: "explicit_euler_optimized".to_string(),
            steps: 5,
            boundaries: BoundaryPreset::Channel {
                inlet: crate::boundary::InletProfile::Parabolic { max_velocity: 1.0 },
            },
            bc_backend: BackendChoice::Simd,
            ..Default::default()
        };
        let summary = ctx.run(&config).unwrap();
        assert_eq!(summary.backend, Backend::Simd);
        assert_eq!(summary.bc_backend, Backend::Simd);
        assert!(summary.statistics.u.max > 0.9);
    }

    #[test]
    fn test_run_failures_are_recorded() {
        let ctx = scalar_context();
        let unknown = RunConfig {
            solver: "vortex_particles".to_string(),
            ..Default::default()
        };
        assert!(matches!(ctx.run(&unknown), Err(CfdError::UnknownSolver(_))));
        assert_eq!(ctx.last_status(), StatusCode::UnknownSolver);

        let blow_up = RunConfig {
            nx: 6,
            ny: 6,
            solver: "explicit_euler".to_string(),
            steps: 2,
            boundaries: BoundaryPreset::Custom {
                setup: BoundarySetup {
                    velocity: vec![BoundaryCondition::Neumann],
                    pressure: Default::default(),
                },
            },
            initial: crate::config::InitialState { u: 500.0, v: 0.0, p: 0.0 },
            ..Default::default()
        };
        assert!(matches!(ctx.run(&blow_up), Err(CfdError::Diverged(_))));
        assert_eq!(ctx.last_status(), StatusCode::Diverged);
        assert_eq!(ctx.registry().live_instances(), 0);
    }

    #[test]
    fn test_default_projection_converges_on_cavity() {
        let ctx = scalar_context();
        let config = RunConfig {
            nx: 32,
            ny: 32,
            steps: 5,
            ..Default::default()
        };
        let summary = ctx.run(&config).unwrap();
        assert_eq!(summary.steps_completed, 5);
        let stats = summary.last_stats.unwrap();
        assert!(stats.iterations < config.params.max_iter);
        assert!(stats.residual < config.params.tolerance);
        assert_eq!(ctx.last_status(), StatusCode::Success);
    }

    #[test]
    fn test_steps_apply_conditions_with_the_requested_engine() {
        let ctx = SimulationContext::with_probe(Arc::new(FixedProbe::with_simd()));
        let grid = ctx.create_grid(6, 6, DomainBounds2D::unit()).unwrap();
        let solver = ctx.create_solver("explicit_euler").unwrap();
        let engine = ctx.boundary_engine(BackendChoice::Simd).unwrap();
        let mut sim = Simulation::new(
            grid,
            solver,
            SolverParams::default(),
            BoundarySetup::lid_driven(1.0),
            engine,
        )
        .unwrap();
        sim.run(2).unwrap();
        assert_eq!(sim.solver().backend(), Backend::Scalar);
        assert_eq!(sim.solver().boundary_backend(), Some(Backend::Simd));
        assert_eq!(sim.field().u[(3, 5)], 1.0);
    }
}
