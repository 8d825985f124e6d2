use crate::backend::Backend;
use crate::boundary::{BoundaryEngine, BoundarySetup};
use crate::domain::{FlowField, Grid2D};
use crate::error::CfdResult;
use crate::numerical::stencil::{Component, Momentum, PseudoCompressibility};
use crate::numerical::Executor;
use crate::solver::{finish_step, not_initialized, Solver, SolverDescriptor, SolverParams, SolverStats, Workspace};

/// Forward-Euler central differences of the momentum equations, with an
/// artificial-compressibility pressure update `p -= dt * div u`.
pub struct ExplicitEuler {
    descriptor: SolverDescriptor,
    executor: Executor,
    workspace: Option<Workspace>,
}

impl ExplicitEuler {
    pub(crate) fn new(descriptor: SolverDescriptor, executor: Executor) -> Self {
        Self {
            descriptor,
            executor,
            workspace: None,
        }
    }
}

impl Solver for ExplicitEuler {
    fn descriptor(&self) -> &SolverDescriptor {
        &self.descriptor
    }

    fn backend(&self) -> Backend {
        self.executor.backend()
    }

    fn boundary_backend(&self) -> Option<Backend> {
        self.workspace.as_ref().map(|ws| ws.engine.backend())
    }

    fn init(
        &mut self,
        grid: &Grid2D,
        params: &SolverParams,
        boundaries: &BoundarySetup,
        engine: BoundaryEngine,
    ) -> CfdResult<()> {
        self.workspace = Some(Workspace::new(grid, params, boundaries, engine)?);
        Ok(())
    }

    fn step(&mut self, field: &mut FlowField, grid: &Grid2D, params: &SolverParams) -> CfdResult<SolverStats> {
        let ws = self
            .workspace
            .as_mut()
            .ok_or_else(|| not_initialized(&self.descriptor.name))?;
        ws.check(field, grid, params)?;
        let executor = self.executor;
        let (nx, ny) = (grid.nx(), grid.ny());

        ws.u.copy_from(&field.u);
        ws.v.copy_from(&field.v);
        ws.p.copy_from(&field.p);
        {
            let (u, v, p) = (field.u.as_slice(), field.v.as_slice(), field.p.as_slice());
            let momentum = |component| Momentum {
                metrics: &ws.metrics,
                u,
                v,
                p: Some(p),
                component,
                dt: params.dt,
                mu: params.mu,
            };
            executor.apply(&momentum(Component::U), ws.u.as_mut_slice(), nx, ny);
            executor.apply(&momentum(Component::V), ws.v.as_mut_slice(), nx, ny);
            let continuity = PseudoCompressibility {
                metrics: &ws.metrics,
                u,
                v,
                p,
                dt: params.dt,
            };
            executor.apply(&continuity, ws.p.as_mut_slice(), nx, ny);
        }
        std::mem::swap(&mut field.u, &mut ws.u);
        std::mem::swap(&mut field.v, &mut ws.v);
        std::mem::swap(&mut field.p, &mut ws.p);

        ws.engine.apply_setup(field, &ws.boundaries)?;
        finish_step(field, grid, params, 1, 0.0)
    }

    fn release(&mut self) {
        self.workspace = None;
    }
}
