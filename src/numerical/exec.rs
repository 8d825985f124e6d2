use rayon::prelude::*;
use wide::f64x4;

use crate::backend::Backend;
use crate::error::{CfdError, CfdResult};

/// Width of the `simd` backend's vector blocks.
pub const LANES: usize = 4;

/// Loads `f[k..k + LANES]` into a vector.
#[inline]
pub fn load_lanes(f: &[f64], k: usize) -> f64x4 {
    let mut block = [0.0; LANES];
    block.copy_from_slice(&f[k..k + LANES]);
    f64x4::from(block)
}

/// A pointwise update over interior grid points. Implementations read from
/// their own inputs and never from the buffer being written.
pub trait PointKernel: Sync {
    fn point(&self, i: usize, j: usize) -> f64;

    /// Points `i..i + LANES` of row `j` as one vector. Overrides must evaluate
    /// the same operations in the same order as [`PointKernel::point`], so the
    /// lanes match it bit for bit.
    #[inline]
    fn lanes(&self, i: usize, j: usize) -> f64x4 {
        f64x4::from(std::array::from_fn::<f64, LANES, _>(|l| self.point(i + l, j)))
    }
}

/// Runs point kernels over the interior `1..nx-1 x 1..ny-1` of a flat field.
///
/// Every strategy evaluates the same IEEE operations per point, so their
/// results are bitwise identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Executor {
    Scalar,
    /// `f64x4` vector blocks along each row, scalar remainder.
    Lanes,
    /// rayon parallel-for over rows.
    Parallel,
}

impl Executor {
    pub fn for_backend(backend: Backend) -> CfdResult<Self> {
        match backend {
            Backend::Scalar => Ok(Executor::Scalar),
            Backend::Simd => Ok(Executor::Lanes),
            Backend::Omp => Ok(Executor::Parallel),
            Backend::Cuda => Err(CfdError::UnsupportedBackend(
                "cuda kernels are not part of this build".to_string(),
            )),
        }
    }

    pub fn backend(self) -> Backend {
        match self {
            Executor::Scalar => Backend::Scalar,
            Executor::Lanes => Backend::Simd,
            Executor::Parallel => Backend::Omp,
        }
    }

    /// Writes `kernel.point(i, j)` into every interior entry of `out`. Edge entries are left as they are.
    pub fn apply<K: PointKernel + ?Sized>(self, kernel: &K, out: &mut [f64], nx: usize, ny: usize) {
        if nx < 3 || ny < 3 {
            return;
        }
        match self {
            Executor::Scalar => {
                for (j, row) in out.chunks_exact_mut(nx).enumerate().skip(1).take(ny - 2) {
                    scalar_row(kernel, j, row, nx);
                }
            }
            Executor::Lanes => {
                for (j, row) in out.chunks_exact_mut(nx).enumerate().skip(1).take(ny - 2) {
                    lane_row(kernel, j, row, nx);
                }
            }
            Executor::Parallel => {
                out.par_chunks_mut(nx)
                    .enumerate()
                    .skip(1)
                    .take(ny - 2)
                    .for_each(|(j, row)| scalar_row(kernel, j, row, nx));
            }
        }
    }

    /// `max |a|` over interior points. NaN propagates.
    pub fn max_abs(self, a: &[f64], nx: usize, ny: usize) -> f64 {
        if nx < 3 || ny < 3 {
            return 0.0;
        }
        let row_max = |j: usize| {
            let start = j * nx;
            a[start + 1..start + nx - 1].iter().map(|x| x.abs()).fold(0.0, max_or_nan)
        };
        match self {
            Executor::Scalar | Executor::Lanes => (1..ny - 1).map(row_max).fold(0.0, max_or_nan),
            Executor::Parallel => (1..ny - 1).into_par_iter().map(row_max).reduce(|| 0.0, max_or_nan),
        }
    }

    /// `max |a - b|` over interior points. NaN propagates.
    pub fn max_abs_diff(self, a: &[f64], b: &[f64], nx: usize, ny: usize) -> f64 {
        if nx < 3 || ny < 3 {
            return 0.0;
        }
        let row_max = |j: usize| {
            let start = j * nx;
            a[start + 1..start + nx - 1]
                .iter()
                .zip(&b[start + 1..start + nx - 1])
                .map(|(x, y)| (x - y).abs())
                .fold(0.0, max_or_nan)
        };
        match self {
            Executor::Scalar | Executor::Lanes => (1..ny - 1).map(row_max).fold(0.0, max_or_nan),
            Executor::Parallel => (1..ny - 1).into_par_iter().map(row_max).reduce(|| 0.0, max_or_nan),
        }
    }
}

fn max_or_nan(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else {
        a.max(b)
    }
}

fn scalar_row<K: PointKernel + ?Sized>(kernel: &K, j: usize, row: &mut [f64], nx: usize) {
    for i in 1..nx - 1 {
        row[i] = kernel.point(i, j);
    }
}

fn lane_row<K: PointKernel + ?Sized>(kernel: &K, j: usize, row: &mut [f64], nx: usize) {
    let end = nx - 1;
    let mut i = 1;
    while i + LANES <= end {
        row[i..i + LANES].copy_from_slice(&kernel.lanes(i, j).to_array());
        i += LANES;
    }
    while i < end {
        row[i] = kernel.point(i, j);
        i += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Wave;

    impl PointKernel for Wave {
        fn point(&self, i: usize, j: usize) -> f64 {
            (i as f64 * 0.3).sin() + (j as f64).sqrt()
        }
    }

    #[test]
    fn test_apply_touches_only_interior() {
        let (nx, ny) = (5, 4);
        let mut out = vec![-1.0; nx * ny];
        Executor::Scalar.apply(&Wave, &mut out, nx, ny);
        for j in 0..ny {
            for i in 0..nx {
                let edge = i == 0 || j == 0 || i == nx - 1 || j == ny - 1;
                if edge {
                    assert_eq!(out[j * nx + i], -1.0);
                } else {
                    assert_eq!(out[j * nx + i], Wave.point(i, j));
                }
            }
        }
    }

    #[test]
    fn test_strategies_are_bitwise_identical() {
        for (nx, ny) in [(3, 3), (6, 5), (7, 9), (13, 4)] {
            let run = |exec: Executor| {
                let mut out = vec![0.0; nx * ny];
                exec.apply(&Wave, &mut out, nx, ny);
                out
            };
            let scalar = run(Executor::Scalar);
            assert_eq!(scalar, run(Executor::Lanes));
            assert_eq!(scalar, run(Executor::Parallel));
        }
    }

    #[test]
    fn test_max_abs_diff_ignores_edges() {
        let (nx, ny) = (4, 4);
        let a = vec![0.0; 16];
        let mut b = vec![0.0; 16];
        b[0] = 100.0;
        b[nx + 2] = -0.5;
        for exec in [Executor::Scalar, Executor::Lanes, Executor::Parallel] {
            assert_eq!(exec.max_abs_diff(&a, &b, nx, ny), 0.5);
        }
    }

    #[test]
    fn test_default_lanes_match_points() {
        let block = Wave.lanes(2, 3).to_array();
        for (l, value) in block.iter().enumerate() {
            assert_eq!(*value, Wave.point(2 + l, 3));
        }
        assert_eq!(load_lanes(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0], 1).to_array(), [1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_max_abs_interior() {
        let (nx, ny) = (4, 3);
        let mut a = vec![0.0; 12];
        a[0] = -50.0;
        a[5] = -2.5;
        a[6] = 1.0;
        for exec in [Executor::Scalar, Executor::Lanes, Executor::Parallel] {
            assert_eq!(exec.max_abs(&a, nx, ny), 2.5);
        }
    }

    #[test]
    fn test_max_abs_diff_reports_nan() {
        let a = vec![0.0; 9];
        let mut b = vec![0.0; 9];
        b[4] = f64::NAN;
        for exec in [Executor::Scalar, Executor::Parallel] {
            assert!(exec.max_abs_diff(&a, &b, 3, 3).is_nan());
        }
    }

    #[test]
    fn test_cuda_has_no_executor() {
        assert!(matches!(
            Executor::for_backend(Backend::Cuda),
            Err(CfdError::UnsupportedBackend(_))
        ));
        assert_eq!(Executor::for_backend(Backend::Omp).unwrap().backend(), Backend::Omp);
    }
}
