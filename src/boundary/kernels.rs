//! Edge primitives each backend implements. All of them only move or write
//! values, so every backend produces bitwise identical results.

use rayon::prelude::*;
use wide::f64x4;

use crate::numerical::exec::{load_lanes, LANES};

pub trait EdgeOps: Sync {
    /// `f[j*nx + dst] = f[j*nx + src]` for every row `j`.
    fn copy_column(&self, f: &mut [f64], nx: usize, dst: usize, src: usize);
    /// `f[dst*nx + i] = f[src*nx + i]` for every column `i`.
    fn copy_row(&self, f: &mut [f64], nx: usize, dst: usize, src: usize);
    fn fill_column(&self, f: &mut [f64], nx: usize, i: usize, value: f64);
    fn fill_row(&self, f: &mut [f64], nx: usize, j: usize, value: f64);
    /// Writes `values[j]` into column `i`; `values.len()` is the row count.
    fn write_column(&self, f: &mut [f64], nx: usize, i: usize, values: &[f64]);
    /// Writes `values` (length `nx`) into row `j`.
    fn write_row(&self, f: &mut [f64], nx: usize, j: usize, values: &[f64]);
}

/// Splits row `dst` (mutable) from row `src` (shared). Rows must differ.
fn row_pair(f: &mut [f64], nx: usize, dst: usize, src: usize) -> (&mut [f64], &[f64]) {
    if dst < src {
        let (head, tail) = f.split_at_mut(src * nx);
        (&mut head[dst * nx..(dst + 1) * nx], &tail[..nx])
    } else {
        let (head, tail) = f.split_at_mut(dst * nx);
        (&mut tail[..nx], &head[src * nx..(src + 1) * nx])
    }
}

pub struct ScalarEdges;

impl EdgeOps for ScalarEdges {
    fn copy_column(&self, f: &mut [f64], nx: usize, dst: usize, src: usize) {
        for row in f.chunks_exact_mut(nx) {
            row[dst] = row[src];
        }
    }

    fn copy_row(&self, f: &mut [f64], nx: usize, dst: usize, src: usize) {
        if dst == src {
            return;
        }
        let (d, s) = row_pair(f, nx, dst, src);
        d.copy_from_slice(s);
    }

    fn fill_column(&self, f: &mut [f64], nx: usize, i: usize, value: f64) {
        for row in f.chunks_exact_mut(nx) {
            row[i] = value;
        }
    }

    fn fill_row(&self, f: &mut [f64], nx: usize, j: usize, value: f64) {
        for x in &mut f[j * nx..(j + 1) * nx] {
            *x = value;
        }
    }

    fn write_column(&self, f: &mut [f64], nx: usize, i: usize, values: &[f64]) {
        for (row, &value) in f.chunks_exact_mut(nx).zip(values) {
            row[i] = value;
        }
    }

    fn write_row(&self, f: &mut [f64], nx: usize, j: usize, values: &[f64]) {
        for (x, &value) in f[j * nx..(j + 1) * nx].iter_mut().zip(values) {
            *x = value;
        }
    }
}

/// Rows move through `f64x4` registers, with a scalar remainder. Columns are
/// strided and stay scalar.
pub struct SimdEdges;

impl SimdEdges {
    fn copy_lanes(dst: &mut [f64], src: &[f64]) {
        let blocks = dst.len().min(src.len()) / LANES * LANES;
        for k in (0..blocks).step_by(LANES) {
            dst[k..k + LANES].copy_from_slice(&load_lanes(src, k).to_array());
        }
        for (x, &y) in dst[blocks..].iter_mut().zip(&src[blocks..]) {
            *x = y;
        }
    }

    fn fill_lanes(dst: &mut [f64], value: f64) {
        let block = f64x4::splat(value).to_array();
        let mut d = dst.chunks_exact_mut(LANES);
        for db in &mut d {
            db.copy_from_slice(&block);
        }
        for x in d.into_remainder() {
            *x = value;
        }
    }
}

impl EdgeOps for SimdEdges {
    fn copy_column(&self, f: &mut [f64], nx: usize, dst: usize, src: usize) {
        ScalarEdges.copy_column(f, nx, dst, src);
    }

    fn copy_row(&self, f: &mut [f64], nx: usize, dst: usize, src: usize) {
        if dst == src {
            return;
        }
        let (d, s) = row_pair(f, nx, dst, src);
        Self::copy_lanes(d, s);
    }

    fn fill_column(&self, f: &mut [f64], nx: usize, i: usize, value: f64) {
        ScalarEdges.fill_column(f, nx, i, value);
    }

    fn fill_row(&self, f: &mut [f64], nx: usize, j: usize, value: f64) {
        Self::fill_lanes(&mut f[j * nx..(j + 1) * nx], value);
    }

    fn write_column(&self, f: &mut [f64], nx: usize, i: usize, values: &[f64]) {
        ScalarEdges.write_column(f, nx, i, values);
    }

    fn write_row(&self, f: &mut [f64], nx: usize, j: usize, values: &[f64]) {
        Self::copy_lanes(&mut f[j * nx..(j + 1) * nx], &values[..nx]);
    }
}

/// rayon parallel-for: columns split the field by rows, rows split by element.
pub struct ParallelEdges;

impl EdgeOps for ParallelEdges {
    fn copy_column(&self, f: &mut [f64], nx: usize, dst: usize, src: usize) {
        f.par_chunks_mut(nx).for_each(|row| row[dst] = row[src]);
    }

    fn copy_row(&self, f: &mut [f64], nx: usize, dst: usize, src: usize) {
        if dst == src {
            return;
        }
        let (d, s) = row_pair(f, nx, dst, src);
        d.par_iter_mut().zip(s.par_iter()).for_each(|(x, &y)| *x = y);
    }

    fn fill_column(&self, f: &mut [f64], nx: usize, i: usize, value: f64) {
        f.par_chunks_mut(nx).for_each(|row| row[i] = value);
    }

    fn fill_row(&self, f: &mut [f64], nx: usize, j: usize, value: f64) {
        f[j * nx..(j + 1) * nx].par_iter_mut().for_each(|x| *x = value);
    }

    fn write_column(&self, f: &mut [f64], nx: usize, i: usize, values: &[f64]) {
        f.par_chunks_mut(nx)
            .zip(values.par_iter())
            .for_each(|(row, &value)| row[i] = value);
    }

    fn write_row(&self, f: &mut [f64], nx: usize, j: usize, values: &[f64]) {
        f[j * nx..(j + 1) * nx]
            .par_iter_mut()
            .zip(values.par_iter())
            .for_each(|(x, &value)| *x = value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(nx: usize, ny: usize) -> Vec<f64> {
        (0..nx * ny).map(|k| k as f64 * 0.5 - 3.0).collect()
    }

    fn exercise(ops: &dyn EdgeOps, nx: usize, ny: usize) -> Vec<f64> {
        let mut f = ramp(nx, ny);
        ops.copy_column(&mut f, nx, 0, nx - 2);
        ops.copy_row(&mut f, nx, ny - 1, 1);
        ops.copy_row(&mut f, nx, 0, ny - 2);
        ops.fill_column(&mut f, nx, nx - 1, 7.25);
        let column: Vec<f64> = (0..ny).map(|j| j as f64 * 1.5).collect();
        ops.write_column(&mut f, nx, 1, &column);
        let row: Vec<f64> = (0..nx).map(|i| -(i as f64)).collect();
        ops.write_row(&mut f, nx, 1, &row);
        ops.fill_row(&mut f, nx, ny - 2, 0.125);
        f
    }

    #[test]
    fn test_row_pair_both_orders() {
        let mut f = ramp(3, 3);
        let (d, s) = row_pair(&mut f, 3, 0, 2);
        assert_eq!(s, &[0.0, 0.5, 1.0]);
        d[0] = 99.0;
        let (d, s) = row_pair(&mut f, 3, 2, 0);
        assert_eq!(s[0], 99.0);
        assert_eq!(d.len(), 3);
    }

    #[test]
    fn test_scalar_copy_column_and_row() {
        let nx = 3;
        let mut f = ramp(nx, 3);
        ScalarEdges.copy_column(&mut f, nx, 2, 1);
        for j in 0..3 {
            assert_eq!(f[j * nx + 2], f[j * nx + 1]);
        }
        ScalarEdges.copy_row(&mut f, nx, 0, 1);
        let expected = f[3..6].to_vec();
        assert_eq!(&f[0..3], &expected[..]);
    }

    #[test]
    fn test_backends_agree_bitwise() {
        // widths around the lane count exercise the remainder paths
        for (nx, ny) in [(2, 2), (3, 4), (4, 4), (5, 3), (9, 6), (17, 5)] {
            let scalar = exercise(&ScalarEdges, nx, ny);
            let simd = exercise(&SimdEdges, nx, ny);
            let parallel = exercise(&ParallelEdges, nx, ny);
            assert_eq!(scalar, simd, "simd differs at {}x{}", nx, ny);
            assert_eq!(scalar, parallel, "parallel differs at {}x{}", nx, ny);
        }
    }
}
