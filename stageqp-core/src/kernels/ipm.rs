//! Primal-dual interior-point kernel for flat dense QPs.
//!
//! Mehrotra predictor-corrector on
//!
//! ```text
//! minimize    1/2 z'H z + g'z
//! subject to  E z = e,   C z + s = d,   s >= 0
//! ```
//!
//! Each Newton system is reduced to the positive definite matrix
//! `K = H + C' diag(lam/s) C + delta I` (Cholesky) and the equality
//! block is handled through the Schur complement `E K^-1 E'`. All
//! scratch lives in the caller-provided workspace; the iterate is kept
//! in the memory handle so repeated solves can warm start.

use crate::arena::Arena;
use crate::error::CoreResult;
use crate::linalg::{
    add_diag, axpy, chol_solve, chol_solve_multi, cholesky_in_place, dot, gemv_cm, gemv_rm,
    gemv_rm_t, inf_norm, row, syrk_rows,
};
use crate::options::IpmOptions;
use crate::problem::{DenseQpDims, DenseQpView};
use crate::solution::QpStatus;

/// Persistent interior-point state: the current iterate, which doubles
/// as the solution output and the warm-start cache.
#[derive(Debug)]
pub struct IpmMemory<'a> {
    /// Primal variables.
    pub z: &'a mut [f64],
    /// Inequality slacks.
    pub s: &'a mut [f64],
    /// Inequality multipliers.
    pub lam: &'a mut [f64],
    /// Equality multipliers.
    pub y: &'a mut [f64],
    /// True once an iterate worth warm starting from is cached.
    pub(crate) warm: bool,
}

/// Arena words for the persistent state.
pub fn memory_words(d: &DenseQpDims) -> usize {
    d.nz + d.ne + 2 * d.nc
}

/// Arena words for the per-solve scratch.
pub fn workspace_words(d: &DenseQpDims) -> usize {
    d.nz * d.nz + d.nz * d.ne + d.ne * d.ne + 4 * d.nz + 3 * d.ne + 8 * d.nc
}

/// Carve the persistent state out of the arena.
pub fn assign_memory<'a>(d: &DenseQpDims, arena: &mut Arena<'a>) -> CoreResult<IpmMemory<'a>> {
    Ok(IpmMemory {
        z: arena.take(d.nz)?,
        s: arena.take(d.nc)?,
        lam: arena.take(d.nc)?,
        y: arena.take(d.ne)?,
        warm: false,
    })
}

struct Scratch<'a> {
    kmat: &'a mut [f64],
    kinv_et: &'a mut [f64],
    ymat: &'a mut [f64],
    rd: &'a mut [f64],
    r1: &'a mut [f64],
    dz: &'a mut [f64],
    tz: &'a mut [f64],
    rp: &'a mut [f64],
    dy: &'a mut [f64],
    te: &'a mut [f64],
    rc: &'a mut [f64],
    w: &'a mut [f64],
    u: &'a mut [f64],
    ds: &'a mut [f64],
    dlam: &'a mut [f64],
    ds_aff: &'a mut [f64],
    dlam_aff: &'a mut [f64],
    rsl: &'a mut [f64],
}

impl<'a> Scratch<'a> {
    fn carve(d: &DenseQpDims, work: &'a mut [f64]) -> CoreResult<Self> {
        let mut arena = Arena::new(work);
        Ok(Self {
            kmat: arena.take(d.nz * d.nz)?,
            kinv_et: arena.take(d.nz * d.ne)?,
            ymat: arena.take(d.ne * d.ne)?,
            rd: arena.take(d.nz)?,
            r1: arena.take(d.nz)?,
            dz: arena.take(d.nz)?,
            tz: arena.take(d.nz)?,
            rp: arena.take(d.ne)?,
            dy: arena.take(d.ne)?,
            te: arena.take(d.ne)?,
            rc: arena.take(d.nc)?,
            w: arena.take(d.nc)?,
            u: arena.take(d.nc)?,
            ds: arena.take(d.nc)?,
            dlam: arena.take(d.nc)?,
            ds_aff: arena.take(d.nc)?,
            dlam_aff: arena.take(d.nc)?,
            rsl: arena.take(d.nc)?,
        })
    }
}

/// Largest step `alpha <= 1` keeping `v + alpha dv >= 0`.
fn max_step(v: &[f64], dv: &[f64]) -> f64 {
    let mut alpha: f64 = 1.0;
    for (vi, dvi) in v.iter().zip(dv.iter()) {
        if *dvi < 0.0 {
            alpha = alpha.min(-vi / dvi);
        }
    }
    alpha
}

/// Solve the reduced Newton system for one right-hand side.
///
/// Inputs: factored `kmat` (Cholesky of `K`), `kinv_et = K^-1 E'`,
/// factored `ymat`, residuals `rd`, `rp`, `rc`, complementarity target
/// `rsl`, and the diagonal `w = lam / s`. Outputs `dz`, `dy`, `ds`,
/// `dlam`.
fn direction(qp: &DenseQpView<'_>, sc: &mut Scratch<'_>, s: &[f64], lam: &[f64]) {
    let d = qp.dims;
    // u_i = (lam_i rc_i - rsl_i) / s_i
    for i in 0..d.nc {
        sc.u[i] = (lam[i] * sc.rc[i] - sc.rsl[i]) / s[i];
    }
    // r1 = -rd - C'u
    for i in 0..d.nz {
        sc.r1[i] = -sc.rd[i];
    }
    gemv_rm_t(sc.r1, -1.0, qp.c, d.nc, d.nz, sc.u, 1.0);

    // tz = K^-1 r1
    sc.tz.copy_from_slice(sc.r1);
    chol_solve(sc.kmat, d.nz, sc.tz);

    if d.ne > 0 {
        // dy = Y^-1 (E tz + rp)
        for i in 0..d.ne {
            sc.te[i] = dot(row(qp.e, d.nz, i), sc.tz) + sc.rp[i];
        }
        sc.dy.copy_from_slice(sc.te);
        chol_solve(sc.ymat, d.ne, sc.dy);
        // dz = tz - (K^-1 E') dy
        sc.dz.copy_from_slice(sc.tz);
        gemv_cm(sc.dz, -1.0, sc.kinv_et, d.nz, d.ne, sc.dy, 1.0);
    } else {
        sc.dz.copy_from_slice(sc.tz);
    }

    // ds = -rc - C dz ; dlam = u + w .* (C dz)
    gemv_rm(sc.ds, 1.0, qp.c, d.nc, d.nz, sc.dz, 0.0);
    for i in 0..d.nc {
        let cdz = sc.ds[i];
        sc.dlam[i] = sc.u[i] + sc.w[i] * cdz;
        sc.ds[i] = -sc.rc[i] - cdz;
    }
}

/// Run the interior-point iteration. Returns the status and the number
/// of iterations taken; the solution is left in `mem`.
pub fn solve(
    qp: &DenseQpView<'_>,
    opts: &IpmOptions,
    mem: &mut IpmMemory<'_>,
    work: &mut [f64],
) -> CoreResult<(QpStatus, usize)> {
    let d = qp.dims;
    let mut sc = Scratch::carve(&d, work)?;

    let z = &mut mem.z[..d.nz];
    let s = &mut mem.s[..d.nc];
    let lam = &mut mem.lam[..d.nc];
    let y = &mut mem.y[..d.ne];

    if !(opts.warm_start && mem.warm) {
        z.fill(0.0);
        y.fill(0.0);
        s.fill(1.0);
        lam.fill(1.0);
    }

    let tol_stat = opts.tol * (1.0 + inf_norm(qp.g));
    let tol_feas = opts.tol * (1.0 + inf_norm(qp.e_rhs).max(inf_norm(qp.d)));
    let mut delta = opts.static_reg.max(f64::MIN_POSITIVE);

    for iter in 0..opts.max_iter {
        // Residuals at the current iterate.
        sc.rd.copy_from_slice(qp.g);
        gemv_cm(sc.rd, 1.0, qp.h, d.nz, d.nz, z, 1.0);
        gemv_rm_t(sc.rd, 1.0, qp.e, d.ne, d.nz, y, 1.0);
        gemv_rm_t(sc.rd, 1.0, qp.c, d.nc, d.nz, lam, 1.0);
        for i in 0..d.ne {
            sc.rp[i] = dot(row(qp.e, d.nz, i), z) - qp.e_rhs[i];
        }
        for i in 0..d.nc {
            sc.rc[i] = dot(row(qp.c, d.nz, i), z) + s[i] - qp.d[i];
        }
        let mu = if d.nc > 0 { dot(s, lam) / d.nc as f64 } else { 0.0 };

        if !mu.is_finite() || !inf_norm(sc.rd).is_finite() {
            return Ok((QpStatus::NumericalFailure, iter));
        }
        if inf_norm(sc.rd) <= tol_stat
            && inf_norm(sc.rp) <= tol_feas
            && inf_norm(sc.rc) <= tol_feas
            && mu <= opts.tol
        {
            mem.warm = true;
            return Ok((QpStatus::Success, iter));
        }

        // K = H + C' diag(lam/s) C + delta I, factored in place.
        for i in 0..d.nc {
            sc.w[i] = lam[i] / s[i];
        }
        let mut factored = false;
        for _attempt in 0..4 {
            sc.kmat.copy_from_slice(qp.h);
            syrk_rows(sc.kmat, d.nz, qp.c, d.nc, sc.w);
            add_diag(sc.kmat, d.nz, delta);
            if cholesky_in_place(sc.kmat, d.nz).is_ok() {
                factored = true;
                break;
            }
            delta *= 100.0;
        }
        if !factored {
            return Ok((QpStatus::NumericalFailure, iter));
        }

        if d.ne > 0 {
            // kinv_et column j = K^-1 (row j of E); Y = E K^-1 E'.
            for j in 0..d.ne {
                sc.kinv_et[j * d.nz..(j + 1) * d.nz].copy_from_slice(row(qp.e, d.nz, j));
            }
            chol_solve_multi(sc.kmat, d.nz, sc.kinv_et, d.ne);
            for j in 0..d.ne {
                let colj = &sc.kinv_et[j * d.nz..(j + 1) * d.nz];
                for i in 0..d.ne {
                    sc.ymat[j * d.ne + i] = dot(row(qp.e, d.nz, i), colj);
                }
            }
            add_diag(sc.ymat, d.ne, delta);
            if cholesky_in_place(sc.ymat, d.ne).is_err() {
                return Ok((QpStatus::NumericalFailure, iter));
            }
        }

        // Predictor (affine scaling) direction: target sigma = 0.
        for i in 0..d.nc {
            sc.rsl[i] = s[i] * lam[i];
        }
        direction(qp, &mut sc, s, lam);
        sc.ds_aff.copy_from_slice(sc.ds);
        sc.dlam_aff.copy_from_slice(sc.dlam);

        let sigma = if d.nc > 0 && mu > 0.0 {
            let alpha_aff = max_step(s, sc.ds_aff).min(max_step(lam, sc.dlam_aff));
            let mut mu_aff = 0.0;
            for i in 0..d.nc {
                mu_aff +=
                    (s[i] + alpha_aff * sc.ds_aff[i]) * (lam[i] + alpha_aff * sc.dlam_aff[i]);
            }
            mu_aff /= d.nc as f64;
            (mu_aff / mu).powi(3).clamp(0.0, 1.0)
        } else {
            0.0
        };

        // Corrector direction with centering and Mehrotra correction.
        for i in 0..d.nc {
            sc.rsl[i] = s[i] * lam[i] - sigma * mu + sc.ds_aff[i] * sc.dlam_aff[i];
        }
        direction(qp, &mut sc, s, lam);

        // Nothing to stay interior to without inequality rows; take the
        // exact Newton step.
        let ftb = if d.nc > 0 { 0.995 } else { 1.0 };
        let alpha_p = (ftb * max_step(s, sc.ds)).min(1.0);
        let alpha_d = (ftb * max_step(lam, sc.dlam)).min(1.0);
        if d.nc > 0 && alpha_p < 1e-10 && alpha_d < 1e-10 {
            return Ok((QpStatus::NumericalFailure, iter));
        }

        axpy(alpha_p, sc.dz, z);
        axpy(alpha_p, sc.ds, s);
        axpy(alpha_d, sc.dy, y);
        axpy(alpha_d, sc.dlam, lam);

        log::trace!(
            "ipm iter {}: mu={:.3e} rd={:.3e} rp={:.3e} alpha=({:.2},{:.2})",
            iter,
            mu,
            inf_norm(sc.rd),
            inf_norm(sc.rp),
            alpha_p,
            alpha_d
        );
    }

    // The iterate is interior even without convergence; still usable as
    // a warm start.
    mem.warm = true;
    Ok((QpStatus::MaxIter, opts.max_iter))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::DenseQpStorage;

    fn solve_qp(
        dims: DenseQpDims,
        fill: impl FnOnce(&mut DenseQpStorage<'_>),
    ) -> (QpStatus, usize, Vec<f64>, Vec<f64>) {
        let mut buf = vec![0.0; dims.words() + memory_words(&dims)];
        let mut arena = Arena::new(&mut buf);
        let mut st = DenseQpStorage::assign(dims, &mut arena).unwrap();
        let mut mem = assign_memory(&dims, &mut arena).unwrap();
        fill(&mut st);
        let mut work = vec![0.0; workspace_words(&dims)];
        let (status, iters) =
            solve(&st.view(dims.nc), &IpmOptions::default(), &mut mem, &mut work).unwrap();
        (status, iters, mem.z.to_vec(), mem.lam.to_vec())
    }

    #[test]
    fn test_bound_constrained_scalar() {
        // min 1/2 z^2 subject to -z <= -1, i.e. z >= 1. Optimum z = 1,
        // multiplier lam = 1.
        let dims = DenseQpDims { nz: 1, ne: 0, nc: 1 };
        let (status, _, z, lam) = solve_qp(dims, |st| {
            st.h[0] = 1.0;
            st.c[0] = -1.0;
            st.d[0] = -1.0;
        });
        assert_eq!(status, QpStatus::Success);
        assert!((z[0] - 1.0).abs() < 1e-7, "z = {}", z[0]);
        assert!((lam[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_equality_constrained() {
        // min 1/2 (z0^2 + z1^2) s.t. z0 + z1 = 2 -> z = (1, 1).
        let dims = DenseQpDims { nz: 2, ne: 1, nc: 0 };
        let (status, iters, z, _) = solve_qp(dims, |st| {
            st.h[0] = 1.0;
            st.h[3] = 1.0;
            st.e[0] = 1.0;
            st.e[1] = 1.0;
            st.e_rhs[0] = 2.0;
        });
        assert_eq!(status, QpStatus::Success);
        assert!(iters <= 3);
        assert!((z[0] - 1.0).abs() < 1e-8);
        assert!((z[1] - 1.0).abs() < 1e-8);
    }

    #[test]
    fn test_mixed_constraints() {
        // min 1/2 ||z||^2 - z0 s.t. z0 + z1 = 1, z0 <= 0.25.
        // With z0 capped: z0 = 0.25, z1 = 0.75.
        let dims = DenseQpDims { nz: 2, ne: 1, nc: 1 };
        let (status, _, z, _) = solve_qp(dims, |st| {
            st.h[0] = 1.0;
            st.h[3] = 1.0;
            st.g[0] = -1.0;
            st.e[0] = 1.0;
            st.e[1] = 1.0;
            st.e_rhs[0] = 1.0;
            st.c[0] = 1.0;
            st.c[1] = 0.0;
            st.d[0] = 0.25;
        });
        assert_eq!(status, QpStatus::Success);
        assert!((z[0] - 0.25).abs() < 1e-7);
        assert!((z[1] - 0.75).abs() < 1e-7);
    }

    #[test]
    fn test_deterministic_repeat() {
        let dims = DenseQpDims { nz: 1, ne: 0, nc: 1 };
        let mut buf = vec![0.0; dims.words() + memory_words(&dims)];
        let mut arena = Arena::new(&mut buf);
        let mut st = DenseQpStorage::assign(dims, &mut arena).unwrap();
        let mut mem = assign_memory(&dims, &mut arena).unwrap();
        st.h[0] = 2.0;
        st.c[0] = -1.0;
        st.d[0] = -3.0;
        let mut work = vec![0.0; workspace_words(&dims)];
        let opts = IpmOptions::default();
        let (_, it1) = solve(&st.view(1), &opts, &mut mem, &mut work).unwrap();
        let z1 = mem.z[0];
        let (_, it2) = solve(&st.view(1), &opts, &mut mem, &mut work).unwrap();
        assert_eq!(it1, it2);
        assert_eq!(z1.to_bits(), mem.z[0].to_bits());
    }
}
