//! Backend-agnostic KKT residuals of a staged QP solution.
//!
//! Works on the staged problem and solution containers only, never on
//! backend internals, so the same evaluator checks every backend. The
//! caller provides a scratch buffer sized by [`workspace_words`].

use crate::dims::OcpQpDims;
use crate::error::{CoreError, CoreResult};
use crate::problem::OcpQp;
use crate::solution::OcpQpSolution;

/// Infinity norms of the four KKT residual groups.
#[derive(Debug, Clone, Copy, Default)]
pub struct KktResiduals {
    /// Stationarity of the Lagrangian in `x` and `u`.
    pub stat: f64,
    /// Dynamics equality violation.
    pub eq: f64,
    /// Bound and general constraint violation.
    pub ineq: f64,
    /// Complementarity between multipliers and slacks.
    pub comp: f64,
}

impl KktResiduals {
    /// Largest of the four norms.
    pub fn max(&self) -> f64 {
        self.stat.max(self.eq).max(self.ineq).max(self.comp)
    }
}

/// Scratch words needed by [`compute`].
pub fn workspace_words(dims: &OcpQpDims) -> usize {
    dims.max_nx() + dims.max_nu() + dims.ng.iter().copied().max().unwrap_or(0)
}

/// Evaluate the KKT residuals of `sol` for `qp`.
///
/// Multiplier layout follows [`OcpQpSolution`]: per stage, stacked
/// `[state bounds; control bounds; general]`, one nonnegative vector
/// per side. Infinite bound sides are skipped; their multipliers are
/// expected to be zero.
pub fn compute(qp: &OcpQp, sol: &OcpQpSolution, work: &mut [f64]) -> CoreResult<KktResiduals> {
    let dims = qp.dims();
    let need = workspace_words(dims);
    if work.len() < need {
        return Err(CoreError::DimensionMismatch(format!(
            "residual workspace has {} words, need {}",
            work.len(),
            need
        )));
    }
    let (wx, rest) = work.split_at_mut(dims.max_nx());
    let (wu, wg) = rest.split_at_mut(dims.max_nu());

    let mut res = KktResiduals::default();
    for k in 0..=dims.n {
        let stage = &qp.stages[k];
        let (nx, nu, ng) = (dims.nx[k], dims.nu[k], dims.ng[k]);
        let (nbx, nbu) = (dims.nbx[k], dims.nbu[k]);
        let x = &sol.x[k];
        let u = &sol.u[k];
        let lam_lo = &sol.lam_lo[k];
        let lam_up = &sol.lam_up[k];

        // Stationarity in x: Q x + S'u + q - pi_{k-1} + A'pi_k
        // + Jbx'(lam_up - lam_lo) + Cx'(lam_up - lam_lo).
        for i in 0..nx {
            let mut v = stage.q[i];
            for j in 0..nx {
                v += stage.Q[(i, j)] * x[j];
            }
            for j in 0..nu {
                v += stage.S[(j, i)] * u[j];
            }
            if k > 0 {
                v -= sol.pi[k - 1][i];
            }
            if k < dims.n {
                for j in 0..dims.nx[k + 1] {
                    v += stage.A[(j, i)] * sol.pi[k][j];
                }
            }
            for j in 0..ng {
                v += stage.Cx[(j, i)] * (lam_up[nbx + nbu + j] - lam_lo[nbx + nbu + j]);
            }
            wx[i] = v;
        }
        for (j, &i) in stage.idxbx.iter().enumerate() {
            wx[i] += lam_up[j] - lam_lo[j];
        }

        // Stationarity in u: R u + S x + r + B'pi_k
        // + Jbu'(lam_up - lam_lo) + Cu'(lam_up - lam_lo).
        for i in 0..nu {
            let mut v = stage.r[i];
            for j in 0..nu {
                v += stage.R[(i, j)] * u[j];
            }
            for j in 0..nx {
                v += stage.S[(i, j)] * x[j];
            }
            if k < dims.n {
                for j in 0..dims.nx[k + 1] {
                    v += stage.B[(j, i)] * sol.pi[k][j];
                }
            }
            for j in 0..ng {
                v += stage.Cu[(j, i)] * (lam_up[nbx + nbu + j] - lam_lo[nbx + nbu + j]);
            }
            wu[i] = v;
        }
        for (j, &i) in stage.idxbu.iter().enumerate() {
            wu[i] += lam_up[nbx + j] - lam_lo[nbx + j];
        }

        for i in 0..nx {
            res.stat = res.stat.max(wx[i].abs());
        }
        for i in 0..nu {
            res.stat = res.stat.max(wu[i].abs());
        }

        // Dynamics: x_{k+1} - A x - B u - b.
        if k < dims.n {
            for i in 0..dims.nx[k + 1] {
                let mut v = sol.x[k + 1][i] - stage.b[i];
                for j in 0..nx {
                    v -= stage.A[(i, j)] * x[j];
                }
                for j in 0..nu {
                    v -= stage.B[(i, j)] * u[j];
                }
                res.eq = res.eq.max(v.abs());
            }
        }

        // Bounds and general rows: violation and complementarity over
        // finite sides.
        let mut side = |val: f64, lo: f64, up: f64, llo: f64, lup: f64, res: &mut KktResiduals| {
            if lo.is_finite() {
                res.ineq = res.ineq.max(lo - val);
                res.comp = res.comp.max((llo * (val - lo)).abs());
            }
            if up.is_finite() {
                res.ineq = res.ineq.max(val - up);
                res.comp = res.comp.max((lup * (up - val)).abs());
            }
        };
        for (j, &i) in stage.idxbx.iter().enumerate() {
            side(x[i], stage.lbx[j], stage.ubx[j], lam_lo[j], lam_up[j], &mut res);
        }
        for (j, &i) in stage.idxbu.iter().enumerate() {
            side(
                u[i],
                stage.lbu[j],
                stage.ubu[j],
                lam_lo[nbx + j],
                lam_up[nbx + j],
                &mut res,
            );
        }
        for j in 0..ng {
            let mut t = 0.0;
            for jj in 0..nx {
                t += stage.Cx[(j, jj)] * x[jj];
            }
            for jj in 0..nu {
                t += stage.Cu[(j, jj)] * u[jj];
            }
            wg[j] = t;
        }
        for j in 0..ng {
            side(
                wg[j],
                stage.lg[j],
                stage.ug[j],
                lam_lo[nbx + nbu + j],
                lam_up[nbx + nbu + j],
                &mut res,
            );
        }
    }
    Ok(res)
}
