use tracing::debug;

use crate::backend::{Backend, BackendChoice, BackendProbe};
use crate::boundary::bc2d::{
    BcType, BoundaryCondition, BoundarySetup, DirichletValues, Edge, InletConfig, InletProfile, PressureBoundary,
};
use crate::boundary::kernels::{EdgeOps, ParallelEdges, ScalarEdges, SimdEdges};
use crate::domain::FlowField;
use crate::error::{CfdError, CfdResult};

/// Applies boundary rules in place on flat `nx * ny` row-major arrays.
///
/// The engine holds nothing but the resolved backend; every call validates
/// sizes before writing anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundaryEngine {
    backend: Backend,
}

impl Default for BoundaryEngine {
    fn default() -> Self {
        Self::scalar()
    }
}

impl BoundaryEngine {
    /// Resolves `choice` against the probe. There is no device implementation of
    /// the edge primitives, so `cuda` is never selected.
    pub fn new(choice: BackendChoice, probe: &dyn BackendProbe) -> CfdResult<Self> {
        let backend = choice.resolve_for(probe, |b| b != Backend::Cuda)?;
        debug!(backend = %backend, "boundary engine ready");
        Ok(Self { backend })
    }

    pub fn scalar() -> Self {
        Self { backend: Backend::Scalar }
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    fn ops(&self) -> &'static dyn EdgeOps {
        match self.backend {
            Backend::Simd => &SimdEdges,
            Backend::Omp => &ParallelEdges,
            // cuda never resolves here
            Backend::Scalar | Backend::Cuda => &ScalarEdges,
        }
    }

    pub fn apply_scalar(&self, f: &mut [f64], nx: usize, ny: usize, kind: BcType) -> CfdResult<()> {
        check_size("field", f.len(), nx, ny)?;
        match kind {
            BcType::Periodic => self.periodic(f, nx, ny),
            BcType::Neumann => self.neumann(f, nx, ny),
            other => return Err(needs_payload(other)),
        }
        Ok(())
    }

    pub fn apply_velocity(&self, u: &mut [f64], v: &mut [f64], nx: usize, ny: usize, kind: BcType) -> CfdResult<()> {
        check_size("u", u.len(), nx, ny)?;
        check_size("v", v.len(), nx, ny)?;
        match kind {
            BcType::Periodic => {
                self.periodic(u, nx, ny);
                self.periodic(v, nx, ny);
            }
            BcType::Neumann => {
                self.neumann(u, nx, ny);
                self.neumann(v, nx, ny);
            }
            BcType::NoSlip => {
                self.dirichlet(u, nx, ny, &DirichletValues::uniform(0.0));
                self.dirichlet(v, nx, ny, &DirichletValues::uniform(0.0));
            }
            other => return Err(needs_payload(other)),
        }
        Ok(())
    }

    pub fn apply_dirichlet_scalar(&self, f: &mut [f64], nx: usize, ny: usize, values: &DirichletValues) -> CfdResult<()> {
        check_size("field", f.len(), nx, ny)?;
        self.dirichlet(f, nx, ny, values);
        Ok(())
    }

    pub fn apply_dirichlet_velocity(
        &self,
        u: &mut [f64],
        v: &mut [f64],
        nx: usize,
        ny: usize,
        u_values: &DirichletValues,
        v_values: &DirichletValues,
    ) -> CfdResult<()> {
        check_size("u", u.len(), nx, ny)?;
        check_size("v", v.len(), nx, ny)?;
        self.dirichlet(u, nx, ny, u_values);
        self.dirichlet(v, nx, ny, v_values);
        Ok(())
    }

    pub fn apply_noslip(&self, u: &mut [f64], v: &mut [f64], nx: usize, ny: usize) -> CfdResult<()> {
        self.apply_velocity(u, v, nx, ny, BcType::NoSlip)
    }

    pub fn apply_inlet(&self, u: &mut [f64], v: &mut [f64], nx: usize, ny: usize, inlet: &InletConfig) -> CfdResult<()> {
        check_size("u", u.len(), nx, ny)?;
        check_size("v", v.len(), nx, ny)?;
        let ops = self.ops();
        let line = edge_line(inlet.edge, nx, ny);
        let n = match line {
            Line::Column(_) => ny,
            Line::Row(_) => nx,
        };
        match inlet.profile {
            InletProfile::Uniform { u: ui, v: vi } => {
                line.fill(ops, u, nx, ui);
                line.fill(ops, v, nx, vi);
            }
            InletProfile::Parabolic { .. } => {
                let last = (n - 1) as f64;
                let (us, vs): (Vec<f64>, Vec<f64>) = (0..n).map(|k| inlet.velocity_at(k as f64 / last)).unzip();
                line.write(ops, u, nx, &us);
                line.write(ops, v, nx, &vs);
            }
        }
        Ok(())
    }

    pub fn apply_outlet_scalar(&self, f: &mut [f64], nx: usize, ny: usize, edge: Edge) -> CfdResult<()> {
        check_size("field", f.len(), nx, ny)?;
        self.outlet(f, nx, ny, edge);
        Ok(())
    }

    pub fn apply_outlet_velocity(&self, u: &mut [f64], v: &mut [f64], nx: usize, ny: usize, edge: Edge) -> CfdResult<()> {
        check_size("u", u.len(), nx, ny)?;
        check_size("v", v.len(), nx, ny)?;
        self.outlet(u, nx, ny, edge);
        self.outlet(v, nx, ny, edge);
        Ok(())
    }

    /// Applies one velocity rule, payload included.
    pub fn apply_condition(
        &self,
        u: &mut [f64],
        v: &mut [f64],
        nx: usize,
        ny: usize,
        condition: &BoundaryCondition,
    ) -> CfdResult<()> {
        match condition {
            BoundaryCondition::Periodic | BoundaryCondition::Neumann | BoundaryCondition::NoSlip => {
                self.apply_velocity(u, v, nx, ny, condition.kind())
            }
            BoundaryCondition::Dirichlet { u: du, v: dv } => self.apply_dirichlet_velocity(u, v, nx, ny, du, dv),
            BoundaryCondition::Inlet(inlet) => self.apply_inlet(u, v, nx, ny, inlet),
            BoundaryCondition::Outlet { edge } => self.apply_outlet_velocity(u, v, nx, ny, *edge),
        }
    }

    /// Velocity rules of a setup, in order.
    pub fn apply_velocity_conditions(
        &self,
        u: &mut [f64],
        v: &mut [f64],
        nx: usize,
        ny: usize,
        conditions: &[BoundaryCondition],
    ) -> CfdResult<()> {
        check_size("u", u.len(), nx, ny)?;
        check_size("v", v.len(), nx, ny)?;
        for condition in conditions {
            self.apply_condition(u, v, nx, ny, condition)?;
        }
        Ok(())
    }

    pub fn apply_pressure(&self, p: &mut [f64], nx: usize, ny: usize, boundary: &PressureBoundary) -> CfdResult<()> {
        check_size("p", p.len(), nx, ny)?;
        match boundary {
            PressureBoundary::Neumann => self.neumann(p, nx, ny),
            PressureBoundary::Periodic => self.periodic(p, nx, ny),
            PressureBoundary::Dirichlet(values) => self.dirichlet(p, nx, ny, values),
            PressureBoundary::Outlet { edge } => {
                self.neumann(p, nx, ny);
                edge_line(*edge, nx, ny).fill(self.ops(), p, nx, 0.0);
            }
        }
        Ok(())
    }

    /// Velocity rules, then the pressure rule, on a whole field.
    pub fn apply_setup(&self, field: &mut FlowField, setup: &BoundarySetup) -> CfdResult<()> {
        setup.validate()?;
        let (nx, ny) = (field.nx(), field.ny());
        let (u, v) = field.velocity_mut();
        self.apply_velocity_conditions(u, v, nx, ny, &setup.velocity)?;
        self.apply_pressure(field.p.as_mut_slice(), nx, ny, &setup.pressure)
    }

    fn neumann(&self, f: &mut [f64], nx: usize, ny: usize) {
        let ops = self.ops();
        ops.copy_column(f, nx, 0, 1);
        ops.copy_column(f, nx, nx - 1, nx - 2);
        ops.copy_row(f, nx, 0, 1);
        ops.copy_row(f, nx, ny - 1, ny - 2);
    }

    fn periodic(&self, f: &mut [f64], nx: usize, ny: usize) {
        let ops = self.ops();
        ops.copy_column(f, nx, 0, nx - 2);
        ops.copy_column(f, nx, nx - 1, 1);
        ops.copy_row(f, nx, 0, ny - 2);
        ops.copy_row(f, nx, ny - 1, 1);
    }

    fn dirichlet(&self, f: &mut [f64], nx: usize, ny: usize, values: &DirichletValues) {
        let ops = self.ops();
        ops.fill_column(f, nx, 0, values.left);
        ops.fill_column(f, nx, nx - 1, values.right);
        ops.fill_row(f, nx, 0, values.bottom);
        ops.fill_row(f, nx, ny - 1, values.top);
    }

    fn outlet(&self, f: &mut [f64], nx: usize, ny: usize, edge: Edge) {
        let ops = self.ops();
        match edge {
            Edge::Left => ops.copy_column(f, nx, 0, 1),
            Edge::Right => ops.copy_column(f, nx, nx - 1, nx - 2),
            Edge::Bottom => ops.copy_row(f, nx, 0, 1),
            Edge::Top => ops.copy_row(f, nx, ny - 1, ny - 2),
        }
    }
}

#[derive(Clone, Copy)]
enum Line {
    Column(usize),
    Row(usize),
}

impl Line {
    fn fill(self, ops: &dyn EdgeOps, f: &mut [f64], nx: usize, value: f64) {
        match self {
            Line::Column(i) => ops.fill_column(f, nx, i, value),
            Line::Row(j) => ops.fill_row(f, nx, j, value),
        }
    }

    fn write(self, ops: &dyn EdgeOps, f: &mut [f64], nx: usize, values: &[f64]) {
        match self {
            Line::Column(i) => ops.write_column(f, nx, i, values),
            Line::Row(j) => ops.write_row(f, nx, j, values),
        }
    }
}

fn edge_line(edge: Edge, nx: usize, ny: usize) -> Line {
    match edge {
        Edge::Left => Line::Column(0),
        Edge::Right => Line::Column(nx - 1),
        Edge::Bottom => Line::Row(0),
        Edge::Top => Line::Row(ny - 1),
    }
}

fn check_size(name: &str, len: usize, nx: usize, ny: usize) -> CfdResult<()> {
    if nx < 2 || ny < 2 {
        return Err(CfdError::InvalidArgument(format!(
            "boundary arrays need at least 2x2 points, got {}x{}",
            nx, ny
        )));
    }
    if len != nx * ny {
        return Err(CfdError::InvalidArgument(format!(
            "{} has {} values, expected {}x{} = {}",
            name,
            len,
            nx,
            ny,
            nx * ny
        )));
    }
    Ok(())
}

fn needs_payload(kind: BcType) -> CfdError {
    CfdError::InvalidArgument(format!(
        "'{}' boundaries carry values and cannot be applied by kind alone",
        kind.name()
    ))
}
