//! Pressure Poisson solves `lap p = rhs` on the interior of a node grid.

use nalgebra::DMatrix;
use rsparse::data::{Sprs, Trpl};
use rsparse::lusol;
use serde::{Deserialize, Serialize};

use crate::boundary::{BoundaryEngine, Edge, PressureBoundary};
use crate::error::{CfdError, CfdResult};
use crate::numerical::stencil::{JacobiSweep, Metrics, RedBlackSweep};
use crate::numerical::{mean, try_scratch, Executor};

/// Relaxation weight of the Jacobi sweeps.
pub const JACOBI_OMEGA: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PressureSolver {
    /// Red-black successive over-relaxation with the optimal uniform-grid weight.
    #[default]
    RedBlackSor,
    Jacobi,
    /// Direct sparse LU solve; exact up to round-off, for small grids and reference runs.
    SparseLu,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoissonOutcome {
    pub iterations: usize,
    /// Largest interior update of the last sweep relative to the largest
    /// interior pressure (0 for the direct solve).
    pub residual: f64,
}

/// Work matrices of the iterative pressure solves.
#[derive(Debug, Clone)]
pub struct PoissonScratch {
    next: DMatrix<f64>,
    previous: DMatrix<f64>,
}

impl PoissonScratch {
    pub fn new(nx: usize, ny: usize) -> CfdResult<Self> {
        Ok(Self {
            next: try_scratch(nx, ny)?,
            previous: try_scratch(nx, ny)?,
        })
    }
}

/// `2 / (1 + sin(pi / (n - 1)))` for the longer grid side.
pub fn sor_omega(nx: usize, ny: usize) -> f64 {
    let n = nx.max(ny).max(3);
    2.0 / (1.0 + (std::f64::consts::PI / (n - 1) as f64).sin())
}

#[derive(Clone, Copy)]
enum Sweep {
    Jacobi,
    RedBlack(f64),
}

/// Everything a pressure solve needs besides the arrays it works on.
pub struct PressureSolve<'a> {
    pub metrics: &'a Metrics,
    pub boundary: PressureBoundary,
    pub engine: BoundaryEngine,
    pub executor: Executor,
}

impl PressureSolve<'_> {
    /// Solves into `p`. `rhs` may be modified (mean removal for singular boundaries).
    pub fn solve(
        &self,
        method: PressureSolver,
        p: &mut DMatrix<f64>,
        rhs: &mut [f64],
        scratch: &mut PoissonScratch,
        max_iter: usize,
        tolerance: f64,
    ) -> CfdResult<PoissonOutcome> {
        match method {
            PressureSolver::RedBlackSor => self.red_black_sor(p, rhs, scratch, max_iter, tolerance),
            PressureSolver::Jacobi => self.jacobi(p, rhs, scratch, max_iter, tolerance),
            PressureSolver::SparseLu => self.sparse_lu(p, rhs),
        }
    }

    /// Red-black SOR, warm-started from the current `p`.
    pub fn red_black_sor(
        &self,
        p: &mut DMatrix<f64>,
        rhs: &mut [f64],
        scratch: &mut PoissonScratch,
        max_iter: usize,
        tolerance: f64,
    ) -> CfdResult<PoissonOutcome> {
        let omega = sor_omega(self.metrics.nx(), self.metrics.ny());
        self.iterate(Sweep::RedBlack(omega), p, rhs, scratch, max_iter, tolerance)
    }

    /// Weighted Jacobi, warm-started from the current `p`.
    pub fn jacobi(
        &self,
        p: &mut DMatrix<f64>,
        rhs: &mut [f64],
        scratch: &mut PoissonScratch,
        max_iter: usize,
        tolerance: f64,
    ) -> CfdResult<PoissonOutcome> {
        self.iterate(Sweep::Jacobi, p, rhs, scratch, max_iter, tolerance)
    }

    /// Sweeps until the largest interior update, divided by the largest
    /// interior `|p|`, falls below `tolerance`. A zero pressure leaves the
    /// update unscaled.
    fn iterate(
        &self,
        sweep_kind: Sweep,
        p: &mut DMatrix<f64>,
        rhs: &mut [f64],
        scratch: &mut PoissonScratch,
        max_iter: usize,
        tolerance: f64,
    ) -> CfdResult<PoissonOutcome> {
        let (nx, ny) = (self.metrics.nx(), self.metrics.ny());
        self.check_shapes(p, rhs, Some(&*scratch))?;
        if self.boundary.is_singular() {
            remove_interior_mean(rhs, nx, ny);
        }
        self.finish(p)?;
        if nx < 3 || ny < 3 {
            return Ok(PoissonOutcome { iterations: 0, residual: 0.0 });
        }

        let PoissonScratch { next, previous } = scratch;
        let mut residual = f64::INFINITY;
        for sweep in 1..=max_iter {
            previous.copy_from(&*p);
            match sweep_kind {
                Sweep::Jacobi => {
                    let kernel = JacobiSweep {
                        metrics: self.metrics,
                        p: p.as_slice(),
                        rhs: &*rhs,
                        omega: JACOBI_OMEGA,
                    };
                    self.executor.apply(&kernel, next.as_mut_slice(), nx, ny);
                    std::mem::swap(p, next);
                }
                Sweep::RedBlack(omega) => {
                    next.copy_from(&*p);
                    let red = RedBlackSweep {
                        metrics: self.metrics,
                        p: p.as_slice(),
                        rhs: &*rhs,
                        omega,
                        colour: 0,
                    };
                    self.executor.apply(&red, next.as_mut_slice(), nx, ny);
                    // black points read red ghosts across periodic edges
                    self.engine.apply_pressure(next.as_mut_slice(), nx, ny, &self.boundary)?;
                    let black = RedBlackSweep {
                        metrics: self.metrics,
                        p: next.as_slice(),
                        rhs: &*rhs,
                        omega,
                        colour: 1,
                    };
                    self.executor.apply(&black, p.as_mut_slice(), nx, ny);
                }
            }
            self.finish(p)?;

            let update = self.executor.max_abs_diff(p.as_slice(), previous.as_slice(), nx, ny);
            if !update.is_finite() {
                return Err(CfdError::Diverged(format!(
                    "pressure solve produced non-finite values after {} sweeps",
                    sweep
                )));
            }
            let scale = self.executor.max_abs(p.as_slice(), nx, ny);
            residual = if scale > 0.0 { update / scale } else { update };
            if residual < tolerance {
                return Ok(PoissonOutcome { iterations: sweep, residual });
            }
        }
        Err(CfdError::MaxIterationsExceeded { iterations: max_iter, residual })
    }

    /// Direct solve over the interior unknowns with rsparse's LU.
    pub fn sparse_lu(&self, p: &mut DMatrix<f64>, rhs: &mut [f64]) -> CfdResult<PoissonOutcome> {
        let (nx, ny) = (self.metrics.nx(), self.metrics.ny());
        self.check_shapes(p, rhs, None)?;
        if nx < 3 || ny < 3 {
            self.finish(p)?;
            return Ok(PoissonOutcome { iterations: 0, residual: 0.0 });
        }
        let singular = self.boundary.is_singular();
        if singular {
            remove_interior_mean(rhs, nx, ny);
        }

        let (a, mut b) = self.assemble(rhs)?;
        lusol(&a, &mut b, 1, 1e-10)
            .map_err(|e| CfdError::Diverged(format!("sparse LU solve failed: {}", e)))?;
        if b.iter().any(|x| !x.is_finite()) {
            return Err(CfdError::Diverged("sparse LU solve produced non-finite values".to_string()));
        }

        let m = nx - 2;
        for j in 1..ny - 1 {
            for i in 1..nx - 1 {
                p[(i, j)] = b[(j - 1) * m + (i - 1)];
            }
        }
        self.finish(p)?;
        Ok(PoissonOutcome { iterations: 1, residual: 0.0 })
    }

    /// Boundary values, then the zero-mean normalization singular problems need.
    fn finish(&self, p: &mut DMatrix<f64>) -> CfdResult<()> {
        let (nx, ny) = (self.metrics.nx(), self.metrics.ny());
        self.engine.apply_pressure(p.as_mut_slice(), nx, ny, &self.boundary)?;
        if self.boundary.is_singular() {
            let shift = mean(p.as_slice());
            p.add_scalar_mut(-shift);
        }
        Ok(())
    }

    fn check_shapes(&self, p: &DMatrix<f64>, rhs: &[f64], scratch: Option<&PoissonScratch>) -> CfdResult<()> {
        let shape = (self.metrics.nx(), self.metrics.ny());
        let scratch_ok = scratch.map_or(true, |s| s.next.shape() == shape && s.previous.shape() == shape);
        if p.shape() != shape || rhs.len() != shape.0 * shape.1 || !scratch_ok {
            return Err(CfdError::InvalidArgument(format!(
                "pressure arrays do not match the {}x{} grid",
                shape.0, shape.1
            )));
        }
        Ok(())
    }

    /// Interior Laplacian as a sparse matrix plus its right-hand side. Boundary
    /// neighbours are folded in according to the pressure boundary.
    fn assemble(&self, rhs: &[f64]) -> CfdResult<(Sprs<f64>, Vec<f64>)> {
        let (nx, ny) = (self.metrics.nx(), self.metrics.ny());
        let (m, n) = (nx - 2, ny - 2);
        let count = m * n;
        let unknown = |i: usize, j: usize| (j - 1) * m + (i - 1);
        let wrap = |k: usize, len: usize| {
            if k == 0 {
                len - 2
            } else if k == len - 1 {
                1
            } else {
                k
            }
        };

        let mut triplets = Trpl::<f64> {
            m: count,
            n: count,
            p: Vec::with_capacity(5 * count),
            i: Vec::with_capacity(5 * count),
            x: Vec::with_capacity(5 * count),
        };
        let mut b = vec![0.0; count];
        let pin_first = self.boundary.is_singular();

        for j in 1..ny - 1 {
            for i in 1..nx - 1 {
                let k = unknown(i, j);
                if pin_first && k == 0 {
                    triplets.i.push(0);
                    triplets.p.push(0);
                    triplets.x.push(1.0);
                    continue;
                }
                let (e, w, nn, s) = self.metrics.weights(i, j);
                let mut row: Vec<(usize, f64)> = vec![(k, -(e + w + nn + s))];
                let mut value = rhs[j * nx + i];
                let neighbours = [
                    (e, i + 1, j, Edge::Right),
                    (w, i - 1, j, Edge::Left),
                    (nn, i, j + 1, Edge::Top),
                    (s, i, j - 1, Edge::Bottom),
                ];
                for (coef, ni, nj, edge) in neighbours {
                    let inside = (1..nx - 1).contains(&ni) && (1..ny - 1).contains(&nj);
                    if inside {
                        row.push((unknown(ni, nj), coef));
                        continue;
                    }
                    match edge_rule(&self.boundary, edge) {
                        EdgeRule::ZeroGradient => row.push((k, coef)),
                        EdgeRule::Fixed(g) => value -= coef * g,
                        EdgeRule::Wrap => row.push((unknown(wrap(ni, nx), wrap(nj, ny)), coef)),
                    }
                }
                row.sort_by_key(|&(col, _)| col);
                row.dedup_by(|next, kept| {
                    if next.0 == kept.0 {
                        kept.1 += next.1;
                        true
                    } else {
                        false
                    }
                });
                for (col, coef) in row {
                    triplets.i.push(k);
                    triplets.p.push(col as isize);
                    triplets.x.push(coef);
                }
                b[k] = value;
            }
        }

        let mut a = Sprs::<f64>::new();
        a.from_trpl(&triplets);
        if a.m != count || a.n != count {
            return Err(CfdError::InvalidArgument(format!(
                "pressure matrix has shape {}x{}, expected {}x{}",
                a.m, a.n, count, count
            )));
        }
        Ok((a, b))
    }
}

enum EdgeRule {
    ZeroGradient,
    Fixed(f64),
    Wrap,
}

fn edge_rule(boundary: &PressureBoundary, edge: Edge) -> EdgeRule {
    match boundary {
        PressureBoundary::Neumann => EdgeRule::ZeroGradient,
        PressureBoundary::Periodic => EdgeRule::Wrap,
        PressureBoundary::Dirichlet(values) => EdgeRule::Fixed(values.on(edge)),
        PressureBoundary::Outlet { edge: outlet } if *outlet == edge => EdgeRule::Fixed(0.0),
        PressureBoundary::Outlet { .. } => EdgeRule::ZeroGradient,
    }
}

/// Makes a pure-Neumann/periodic right-hand side compatible by removing its interior mean.
pub fn remove_interior_mean(rhs: &mut [f64], nx: usize, ny: usize) {
    if nx < 3 || ny < 3 {
        return;
    }
    let mut sum = 0.0;
    for j in 1..ny - 1 {
        sum += rhs[j * nx + 1..j * nx + nx - 1].iter().sum::<f64>();
    }
    let avg = sum / ((nx - 2) * (ny - 2)) as f64;
    for j in 1..ny - 1 {
        for x in &mut rhs[j * nx + 1..j * nx + nx - 1] {
            *x -= avg;
        }
    }
}
