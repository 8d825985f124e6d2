use nalgebra::DMatrix;

use crate::backend::Backend;
use crate::boundary::{BoundaryEngine, BoundarySetup};
use crate::domain::{FlowField, Grid2D};
use crate::error::CfdResult;
use crate::numerical::stencil::{Component, Correction, Divergence, Momentum};
use crate::numerical::{try_scratch, Executor};
use crate::poisson::{PoissonScratch, PressureSolve};
use crate::solver::{finish_step, not_initialized, Solver, SolverDescriptor, SolverParams, SolverStats, Workspace};

/// Chorin projection: predictor without pressure, velocity boundary
/// conditions, pressure Poisson solve, then the corrector `u = u* - dt grad p`.
pub struct Projection {
    descriptor: SolverDescriptor,
    executor: Executor,
    workspace: Option<(Workspace, DMatrix<f64>, PoissonScratch)>,
}

impl Projection {
    pub(crate) fn new(descriptor: SolverDescriptor, executor: Executor) -> Self {
        Self {
            descriptor,
            executor,
            workspace: None,
        }
    }
}

impl Solver for Projection {
    fn descriptor(&self) -> &SolverDescriptor {
        &self.descriptor
    }

    fn backend(&self) -> Backend {
        self.executor.backend()
    }

    fn boundary_backend(&self) -> Option<Backend> {
        self.workspace.as_ref().map(|(ws, _, _)| ws.engine.backend())
    }

    fn init(
        &mut self,
        grid: &Grid2D,
        params: &SolverParams,
        boundaries: &BoundarySetup,
        engine: BoundaryEngine,
    ) -> CfdResult<()> {
        let workspace = Workspace::new(grid, params, boundaries, engine)?;
        let rhs = try_scratch(grid.nx(), grid.ny())?;
        let pressure = PoissonScratch::new(grid.nx(), grid.ny())?;
        self.workspace = Some((workspace, rhs, pressure));
        Ok(())
    }

    fn step(&mut self, field: &mut FlowField, grid: &Grid2D, params: &SolverParams) -> CfdResult<SolverStats> {
        let (ws, rhs, scratch) = self
            .workspace
            .as_mut()
            .ok_or_else(|| not_initialized(&self.descriptor.name))?;
        ws.check(field, grid, params)?;
        let (executor, engine) = (self.executor, ws.engine);
        let (nx, ny) = (grid.nx(), grid.ny());

        // predictor
        ws.u.copy_from(&field.u);
        ws.v.copy_from(&field.v);
        {
            let (u, v) = (field.u.as_slice(), field.v.as_slice());
            let predictor = |component| Momentum {
                metrics: &ws.metrics,
                u,
                v,
                p: None,
                component,
                dt: params.dt,
                mu: params.mu,
            };
            executor.apply(&predictor(Component::U), ws.u.as_mut_slice(), nx, ny);
            executor.apply(&predictor(Component::V), ws.v.as_mut_slice(), nx, ny);
        }
        engine.apply_velocity_conditions(
            ws.u.as_mut_slice(),
            ws.v.as_mut_slice(),
            nx,
            ny,
            &ws.boundaries.velocity,
        )?;

        // pressure
        let divergence = Divergence {
            metrics: &ws.metrics,
            u: ws.u.as_slice(),
            v: ws.v.as_slice(),
            dt: params.dt,
        };
        executor.apply(&divergence, rhs.as_mut_slice(), nx, ny);
        let pressure = PressureSolve {
            metrics: &ws.metrics,
            boundary: ws.boundaries.pressure,
            engine,
            executor,
        };
        let outcome = pressure.solve(
            params.pressure_solver,
            &mut field.p,
            rhs.as_mut_slice(),
            scratch,
            params.max_iter,
            params.tolerance,
        )?;

        // corrector
        field.u.copy_from(&ws.u);
        field.v.copy_from(&ws.v);
        {
            let p = field.p.as_slice();
            let corrector = |c, component| Correction {
                metrics: &ws.metrics,
                c,
                p,
                component,
                dt: params.dt,
            };
            executor.apply(&corrector(ws.u.as_slice(), Component::U), field.u.as_mut_slice(), nx, ny);
            executor.apply(&corrector(ws.v.as_slice(), Component::V), field.v.as_mut_slice(), nx, ny);
        }

        engine.apply_setup(field, &ws.boundaries)?;
        finish_step(field, grid, params, outcome.iterations, outcome.residual)
    }

    fn release(&mut self) {
        self.workspace = None;
    }
}
