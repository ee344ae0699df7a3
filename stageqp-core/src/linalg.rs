//! Slice-backed dense linear algebra for the solver kernels.
//!
//! Kernels operate on flat buffers carved from caller arenas, so the
//! helpers here work on raw column-major (square/symmetric matrices)
//! and row-major (constraint rows) slices without allocating.

/// Infinity norm.
#[inline]
pub fn inf_norm(v: &[f64]) -> f64 {
    v.iter().fold(0.0, |acc, &x| acc.max(x.abs()))
}

/// Dot product.
#[inline]
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(ai, bi)| ai * bi).sum()
}

/// `y += a * x`.
#[inline]
pub fn axpy(a: f64, x: &[f64], y: &mut [f64]) {
    debug_assert_eq!(x.len(), y.len());
    for (yi, xi) in y.iter_mut().zip(x.iter()) {
        *yi += a * xi;
    }
}

/// `y = alpha * A x + beta * y` with `A` column-major `m x n`.
pub fn gemv_cm(y: &mut [f64], alpha: f64, a: &[f64], m: usize, n: usize, x: &[f64], beta: f64) {
    debug_assert_eq!(a.len(), m * n);
    debug_assert_eq!(x.len(), n);
    debug_assert_eq!(y.len(), m);
    for yi in y.iter_mut() {
        *yi *= beta;
    }
    for j in 0..n {
        let xj = alpha * x[j];
        if xj != 0.0 {
            let col = &a[j * m..(j + 1) * m];
            for i in 0..m {
                y[i] += col[i] * xj;
            }
        }
    }
}

/// Row `i` of a row-major `rows x n` matrix.
#[inline]
pub fn row(a: &[f64], n: usize, i: usize) -> &[f64] {
    &a[i * n..(i + 1) * n]
}

/// `y = alpha * A x + beta * y` with `A` row-major `m x n`.
pub fn gemv_rm(y: &mut [f64], alpha: f64, a: &[f64], m: usize, n: usize, x: &[f64], beta: f64) {
    debug_assert_eq!(a.len(), m * n);
    for i in 0..m {
        y[i] = beta * y[i] + alpha * dot(row(a, n, i), x);
    }
}

/// `y = alpha * A' x + beta * y` with `A` row-major `m x n`.
pub fn gemv_rm_t(y: &mut [f64], alpha: f64, a: &[f64], m: usize, n: usize, x: &[f64], beta: f64) {
    debug_assert_eq!(a.len(), m * n);
    for yi in y.iter_mut() {
        *yi *= beta;
    }
    for i in 0..m {
        let s = alpha * x[i];
        if s != 0.0 {
            axpy(s, row(a, n, i), y);
        }
    }
}

/// `K += C' diag(w) C` with `C` row-major `m x n`, `K` column-major.
pub fn syrk_rows(k: &mut [f64], n: usize, c: &[f64], m: usize, w: &[f64]) {
    debug_assert_eq!(k.len(), n * n);
    debug_assert_eq!(w.len(), m);
    for i in 0..m {
        let wi = w[i];
        if wi == 0.0 {
            continue;
        }
        let ci = row(c, n, i);
        for jj in 0..n {
            let s = wi * ci[jj];
            if s != 0.0 {
                let col = &mut k[jj * n..(jj + 1) * n];
                for ii in 0..n {
                    col[ii] += s * ci[ii];
                }
            }
        }
    }
}

/// `delta` added to the diagonal of a column-major `n x n` matrix.
pub fn add_diag(a: &mut [f64], n: usize, delta: f64) {
    for i in 0..n {
        a[i * n + i] += delta;
    }
}

/// In-place lower Cholesky of a column-major symmetric matrix.
///
/// On success the lower triangle holds `L` with `A = L L'`; the strict
/// upper triangle is left untouched. Returns the failing pivot column
/// when the matrix is not (numerically) positive definite.
pub fn cholesky_in_place(a: &mut [f64], n: usize) -> Result<(), usize> {
    debug_assert_eq!(a.len(), n * n);
    for j in 0..n {
        let mut diag = a[j * n + j];
        for k in 0..j {
            let l = a[k * n + j];
            diag -= l * l;
        }
        if diag <= 0.0 || !diag.is_finite() {
            return Err(j);
        }
        let diag = diag.sqrt();
        a[j * n + j] = diag;
        for i in (j + 1)..n {
            let mut v = a[j * n + i];
            for k in 0..j {
                v -= a[k * n + i] * a[k * n + j];
            }
            a[j * n + i] = v / diag;
        }
    }
    Ok(())
}

/// Solve `L L' x = b` in place given the factor from
/// [`cholesky_in_place`].
pub fn chol_solve(l: &[f64], n: usize, x: &mut [f64]) {
    debug_assert_eq!(x.len(), n);
    // Forward: L y = b
    for i in 0..n {
        let mut v = x[i];
        for k in 0..i {
            v -= l[k * n + i] * x[k];
        }
        x[i] = v / l[i * n + i];
    }
    // Backward: L' x = y
    for i in (0..n).rev() {
        let mut v = x[i];
        for k in (i + 1)..n {
            v -= l[i * n + k] * x[k];
        }
        x[i] = v / l[i * n + i];
    }
}

/// Solve `L L' X = B` column by column; `b` is column-major `n x ncols`.
pub fn chol_solve_multi(l: &[f64], n: usize, b: &mut [f64], ncols: usize) {
    debug_assert_eq!(b.len(), n * ncols);
    for j in 0..ncols {
        chol_solve(l, n, &mut b[j * n..(j + 1) * n]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cholesky_solve() {
        // A = [[4, 2], [2, 3]] column-major
        let mut a = vec![4.0, 2.0, 2.0, 3.0];
        cholesky_in_place(&mut a, 2).unwrap();
        let mut x = vec![8.0, 7.0]; // A [1.25, 1.5]' = [8, 7]'
        chol_solve(&a, 2, &mut x);
        assert!((x[0] - 1.25).abs() < 1e-12);
        assert!((x[1] - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_cholesky_rejects_indefinite() {
        let mut a = vec![1.0, 2.0, 2.0, 1.0];
        assert_eq!(cholesky_in_place(&mut a, 2), Err(1));
    }

    #[test]
    fn test_gemv_row_major_and_transpose() {
        // A = [[1, 2, 3], [4, 5, 6]] row-major (2 x 3)
        let a = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let x = vec![1.0, 1.0, 1.0];
        let mut y = vec![0.0; 2];
        gemv_rm(&mut y, 1.0, &a, 2, 3, &x, 0.0);
        assert_eq!(y, vec![6.0, 15.0]);

        let mut yt = vec![0.0; 3];
        gemv_rm_t(&mut yt, 1.0, &a, 2, 3, &y, 0.0);
        assert_eq!(yt, vec![66.0, 87.0, 108.0]);
    }

    #[test]
    fn test_syrk_rows() {
        // C = [[1, 0], [1, 1]] row-major, w = [2, 3]
        let c = vec![1.0, 0.0, 1.0, 1.0];
        let w = vec![2.0, 3.0];
        let mut k = vec![0.0; 4];
        syrk_rows(&mut k, 2, &c, 2, &w);
        // C' diag(w) C = [[5, 3], [3, 3]]
        assert_eq!(k, vec![5.0, 3.0, 3.0, 3.0]);
    }

    #[test]
    fn test_gemv_cm() {
        // A = [[1, 3], [2, 4]] column-major (2 x 2)
        let a = vec![1.0, 2.0, 3.0, 4.0];
        let x = vec![1.0, 2.0];
        let mut y = vec![1.0, 1.0];
        gemv_cm(&mut y, 1.0, &a, 2, 2, &x, -1.0);
        assert_eq!(y, vec![6.0, 9.0]);
    }
}
