//! Dual active-set kernel for flat dense QPs.
//!
//! Goldfarb-Idnani scheme on the same problem form as the
//! interior-point kernel: start from the equality-constrained optimum
//! (dual feasible by construction), then add the most violated
//! inequality per outer step, dropping blocking constraints along the
//! way. The step count is exactly the number of working-set changes,
//! so a cold-started repeat of the same problem takes the same number
//! of iterations.
//!
//! The working-set factorization is rebuilt from scratch on every
//! change; the Hessian factor is computed once per solve.

use crate::arena::Arena;
use crate::error::CoreResult;
use crate::linalg::{
    chol_solve, chol_solve_multi, cholesky_in_place, dot, gemv_cm, inf_norm, row,
};
use crate::options::ActiveSetOptions;
use crate::problem::{DenseQpDims, DenseQpView};
use crate::solution::QpStatus;

/// Persistent active-set state. The kernel always cold starts, so this
/// only holds the solution of the most recent solve.
#[derive(Debug)]
pub struct ActiveSetMemory<'a> {
    /// Primal variables.
    pub z: &'a mut [f64],
    /// Inequality multipliers.
    pub lam: &'a mut [f64],
    /// Equality multipliers.
    pub y: &'a mut [f64],
    /// Working set indices, capacity reserved once at assign time.
    active: Vec<usize>,
}

/// Arena words for the persistent state.
pub fn memory_words(d: &DenseQpDims) -> usize {
    d.nz + d.nc + d.ne
}

/// Arena words for the per-solve scratch.
pub fn workspace_words(d: &DenseQpDims) -> usize {
    4 * d.nz * d.nz + 8 * d.nz
}

/// Carve the persistent state out of the arena.
pub fn assign_memory<'a>(d: &DenseQpDims, arena: &mut Arena<'a>) -> CoreResult<ActiveSetMemory<'a>> {
    Ok(ActiveSetMemory {
        z: arena.take(d.nz)?,
        lam: arena.take(d.nc)?,
        y: arena.take(d.ne)?,
        active: Vec::with_capacity(d.nc.min(d.nz)),
    })
}

struct Scratch<'a> {
    kmat: &'a mut [f64],
    nmat: &'a mut [f64],
    kinv_nt: &'a mut [f64],
    mmat: &'a mut [f64],
    b_act: &'a mut [f64],
    w: &'a mut [f64],
    r: &'a mut [f64],
    d_vec: &'a mut [f64],
    zstep: &'a mut [f64],
    t0: &'a mut [f64],
    rhs: &'a mut [f64],
    zloc: &'a mut [f64],
}

impl<'a> Scratch<'a> {
    fn carve(d: &DenseQpDims, work: &'a mut [f64]) -> CoreResult<Self> {
        let nz = d.nz;
        let mut arena = Arena::new(work);
        Ok(Self {
            kmat: arena.take(nz * nz)?,
            nmat: arena.take(nz * nz)?,
            kinv_nt: arena.take(nz * nz)?,
            mmat: arena.take(nz * nz)?,
            b_act: arena.take(nz)?,
            w: arena.take(nz)?,
            r: arena.take(nz)?,
            d_vec: arena.take(nz)?,
            zstep: arena.take(nz)?,
            t0: arena.take(nz)?,
            rhs: arena.take(nz)?,
            zloc: arena.take(nz)?,
        })
    }
}

/// Rebuild and factor the working-set matrices for the current active
/// set: `nmat` holds the equality rows followed by the active
/// inequality rows, `kinv_nt` its `K^-1 N'` image, `mmat` the Cholesky
/// factor of `N K^-1 N'`. Fails when the working set has become
/// linearly dependent.
fn factor_working_set(
    qp: &DenseQpView<'_>,
    active: &[usize],
    sc: &mut Scratch<'_>,
) -> Result<usize, ()> {
    let d = qp.dims;
    let nz = d.nz;
    let na = d.ne + active.len();
    if na > nz {
        // More rows than variables cannot be linearly independent.
        return Err(());
    }
    for i in 0..d.ne {
        sc.nmat[i * nz..(i + 1) * nz].copy_from_slice(row(qp.e, nz, i));
        sc.b_act[i] = qp.e_rhs[i];
    }
    for (j, &p) in active.iter().enumerate() {
        let i = d.ne + j;
        sc.nmat[i * nz..(i + 1) * nz].copy_from_slice(row(qp.c, nz, p));
        sc.b_act[i] = qp.d[p];
    }
    // kinv_nt column i = K^-1 (row i of N).
    for i in 0..na {
        sc.kinv_nt[i * nz..(i + 1) * nz].copy_from_slice(row(sc.nmat, nz, i));
    }
    chol_solve_multi(sc.kmat, nz, &mut sc.kinv_nt[..nz * na], na);
    for j in 0..na {
        let colj = &sc.kinv_nt[j * nz..(j + 1) * nz];
        for i in 0..na {
            sc.mmat[j * na + i] = dot(row(sc.nmat, nz, i), colj);
        }
    }
    if na > 0 && cholesky_in_place(&mut sc.mmat[..na * na], na).is_err() {
        return Err(());
    }
    Ok(na)
}

/// Solve the working-set equality QP: `K z + N' w = -g`, `N z = b_act`.
/// Writes `zloc` and the first `na` entries of `w`.
fn solve_working_set(qp: &DenseQpView<'_>, na: usize, sc: &mut Scratch<'_>) {
    let nz = qp.dims.nz;
    for i in 0..nz {
        sc.t0[i] = -qp.g[i];
    }
    chol_solve(sc.kmat, nz, sc.t0);
    if na > 0 {
        for i in 0..na {
            sc.rhs[i] = dot(row(sc.nmat, nz, i), sc.t0) - sc.b_act[i];
        }
        sc.w[..na].copy_from_slice(&sc.rhs[..na]);
        chol_solve(sc.mmat, na, &mut sc.w[..na]);
        sc.zloc.copy_from_slice(sc.t0);
        gemv_cm(sc.zloc, -1.0, &sc.kinv_nt[..nz * na], nz, na, &sc.w[..na], 1.0);
    } else {
        sc.zloc.copy_from_slice(sc.t0);
    }
}

/// Run the dual active-set iteration. Returns the status and the number
/// of working-set changes; the solution is left in `mem`.
pub fn solve(
    qp: &DenseQpView<'_>,
    opts: &ActiveSetOptions,
    mem: &mut ActiveSetMemory<'_>,
    work: &mut [f64],
) -> CoreResult<(QpStatus, usize)> {
    let d = qp.dims;
    let nz = d.nz;
    let mut sc = Scratch::carve(&d, work)?;
    let tol = opts.tol * (1.0 + inf_norm(qp.d));

    // Factor K = H + reg I once; bump the regularization when the
    // Hessian is not numerically positive definite.
    let mut reg = opts.hessian_reg;
    let mut factored = false;
    for _attempt in 0..4 {
        sc.kmat.copy_from_slice(qp.h);
        crate::linalg::add_diag(sc.kmat, nz, reg);
        if cholesky_in_place(sc.kmat, nz).is_ok() {
            factored = true;
            break;
        }
        reg = (reg * 100.0).max(1e-10);
    }
    if !factored {
        return Ok((QpStatus::NumericalFailure, 0));
    }

    mem.active.clear();
    let Ok(mut na) = factor_working_set(qp, &mem.active, &mut sc) else {
        return Ok((QpStatus::NumericalFailure, 0));
    };
    solve_working_set(qp, na, &mut sc);

    let mut iters = 0usize;
    loop {
        // Most violated inequality outside the working set.
        let mut worst = tol;
        let mut cand = None;
        for p in 0..d.nc {
            if mem.active.contains(&p) {
                continue;
            }
            let v = dot(row(qp.c, nz, p), sc.zloc) - qp.d[p];
            if v > worst {
                worst = v;
                cand = Some(p);
            }
        }
        let Some(p) = cand else {
            break;
        };

        // Grow the multiplier of constraint p until it enters the
        // working set, dropping blocking constraints on the way.
        let mut t_acc = 0.0;
        loop {
            if iters >= opts.max_iter {
                return Ok((QpStatus::MaxIter, iters));
            }

            let cp = row(qp.c, nz, p);
            sc.d_vec.copy_from_slice(cp);
            chol_solve(sc.kmat, nz, sc.d_vec);
            if na > 0 {
                for i in 0..na {
                    sc.r[i] = dot(row(sc.nmat, nz, i), sc.d_vec);
                }
                chol_solve(sc.mmat, na, &mut sc.r[..na]);
                sc.zstep.copy_from_slice(sc.d_vec);
                gemv_cm(sc.zstep, -1.0, &sc.kinv_nt[..nz * na], nz, na, &sc.r[..na], 1.0);
            } else {
                sc.zstep.copy_from_slice(sc.d_vec);
            }
            let q = dot(cp, sc.zstep);

            // Dual step length: first active inequality multiplier to
            // hit zero. Equality multipliers are unrestricted.
            let mut t1 = f64::INFINITY;
            let mut drop_j = None;
            for j in d.ne..na {
                if sc.r[j] > tol && sc.w[j] / sc.r[j] < t1 {
                    t1 = sc.w[j] / sc.r[j];
                    drop_j = Some(j);
                }
            }
            // Primal step length: violation of p reaches zero.
            let viol = dot(cp, sc.zloc) - qp.d[p];
            let t2 = if q > tol { viol / q } else { f64::INFINITY };

            let t = t1.min(t2);
            if !t.is_finite() {
                // No curvature along the constraint and nothing to
                // drop: the dual is unbounded.
                return Ok((QpStatus::Infeasible, iters));
            }

            for i in 0..nz {
                sc.zloc[i] -= t * sc.zstep[i];
            }
            for j in 0..na {
                sc.w[j] -= t * sc.r[j];
            }
            t_acc += t;
            iters += 1;

            if t2 <= t1 {
                mem.active.push(p);
                let Ok(na_new) = factor_working_set(qp, &mem.active, &mut sc) else {
                    return Ok((QpStatus::NumericalFailure, iters));
                };
                // Multipliers carry over; p enters at its accumulated
                // value.
                sc.w[na_new - 1] = t_acc;
                na = na_new;
                break;
            }

            let j = drop_j.unwrap_or(na - 1);
            mem.active.remove(j - d.ne);
            sc.w.copy_within(j + 1..na, j);
            let Ok(na_new) = factor_working_set(qp, &mem.active, &mut sc) else {
                return Ok((QpStatus::NumericalFailure, iters));
            };
            na = na_new;
        }
    }

    mem.z.copy_from_slice(sc.zloc);
    mem.y.copy_from_slice(&sc.w[..d.ne]);
    mem.lam.fill(0.0);
    for (j, &pidx) in mem.active.iter().enumerate() {
        mem.lam[pidx] = sc.w[d.ne + j].max(0.0);
    }
    Ok((QpStatus::Success, iters))
}
