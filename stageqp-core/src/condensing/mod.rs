//! Condensing: eliminating intermediate states from a staged QP.
//!
//! Partial condensing groups consecutive stages into blocks and keeps
//! one state variable per block; full condensing eliminates every
//! state and yields a single flat dense QP. Both are built on the same
//! block sensitivity maps
//!
//! ```text
//! x_{s+j} = Gx_j x_s + Gu_j [u_s; ...; u_{s+len-1}] + gv_j
//! ```
//!
//! computed by forward recursion over the block's dynamics. The maps
//! are allocated once, from the dims, and rewritten in place on every
//! condense; nothing is allocated per solve.

use nalgebra::{DMatrix, DVector};

use crate::dims::OcpQpDims;
use crate::problem::OcpQp;
use crate::solution::OcpQpSolution;

pub mod full;
pub mod partial;

pub use full::FullCondensingMap;
pub use partial::PartialCondensingMap;

/// Split a horizon of `n` dynamics stages into `n2` contiguous blocks,
/// longer blocks first. Returns `(start, len)` per block.
pub fn split_horizon(n: usize, n2: usize) -> Vec<(usize, usize)> {
    debug_assert!(n2 >= 1 && n2 <= n);
    let base = n / n2;
    let rem = n % n2;
    let mut blocks = Vec::with_capacity(n2);
    let mut start = 0;
    for b in 0..n2 {
        let len = base + usize::from(b < rem);
        blocks.push((start, len));
        start += len;
    }
    debug_assert_eq!(start, n);
    blocks
}

/// Sensitivity maps of one block of `len` stages starting at `start`.
#[derive(Debug)]
pub(crate) struct BlockGamma {
    pub start: usize,
    pub len: usize,
    /// State count at the block head.
    pub nx0: usize,
    /// Stacked control count of the block.
    pub nw: usize,
    /// Offset of stage `start + j`'s controls within the stack.
    pub uoff: Vec<usize>,
    /// `Gx_j`, `nx[start + j] x nx0`, for `j = 0..=len`. `Gx_0 = I`.
    pub gx: Vec<DMatrix<f64>>,
    /// `Gu_j`, `nx[start + j] x nw`.
    pub gu: Vec<DMatrix<f64>>,
    /// `gv_j`, affine part.
    pub gv: Vec<DVector<f64>>,
}

impl BlockGamma {
    pub fn new(dims: &OcpQpDims, start: usize, len: usize) -> Self {
        let nx0 = dims.nx[start];
        let mut uoff = Vec::with_capacity(len);
        let mut nw = 0;
        for j in 0..len {
            uoff.push(nw);
            nw += dims.nu[start + j];
        }
        let gx = (0..=len)
            .map(|j| {
                if j == 0 {
                    DMatrix::identity(nx0, nx0)
                } else {
                    DMatrix::zeros(dims.nx[start + j], nx0)
                }
            })
            .collect();
        let gu = (0..=len)
            .map(|j| DMatrix::zeros(dims.nx[start + j], nw))
            .collect();
        let gv = (0..=len)
            .map(|j| DVector::zeros(dims.nx[start + j]))
            .collect();
        Self {
            start,
            len,
            nx0,
            nw,
            uoff,
            gx,
            gu,
            gv,
        }
    }

    /// Recompute the maps from the current problem data. `gx[0]`,
    /// `gu[0]` and `gv[0]` are constant and never touched.
    pub fn update(&mut self, qp: &OcpQp) {
        let dims = qp.dims();
        for j in 0..self.len {
            let stage = &qp.stages[self.start + j];
            let nx = dims.nx[self.start + j];
            let nx_next = dims.nx[self.start + j + 1];
            let nu = dims.nu[self.start + j];
            let (head, tail) = self.gx.split_at_mut(j + 1);
            let (prev, next) = (&head[j], &mut tail[0]);
            for c in 0..self.nx0 {
                for i in 0..nx_next {
                    let mut v = 0.0;
                    for m in 0..nx {
                        v += stage.A[(i, m)] * prev[(m, c)];
                    }
                    next[(i, c)] = v;
                }
            }
            let (head, tail) = self.gu.split_at_mut(j + 1);
            let (prev, next) = (&head[j], &mut tail[0]);
            for c in 0..self.nw {
                for i in 0..nx_next {
                    let mut v = 0.0;
                    for m in 0..nx {
                        v += stage.A[(i, m)] * prev[(m, c)];
                    }
                    next[(i, c)] = v;
                }
            }
            for c in 0..nu {
                for i in 0..nx_next {
                    next[(i, self.uoff[j] + c)] += stage.B[(i, c)];
                }
            }
            let (head, tail) = self.gv.split_at_mut(j + 1);
            let (prev, next) = (&head[j], &mut tail[0]);
            for i in 0..nx_next {
                let mut v = stage.b[i];
                for m in 0..nx {
                    v += stage.A[(i, m)] * prev[m];
                }
                next[i] = v;
            }
        }
    }
}

/// Recover eliminated dynamics multipliers by backward stationarity.
///
/// For stages `k = hi down to lo` writes
///
/// ```text
/// pi_{k-1} = Q_k x_k + S_k'u_k + q_k + A_k'pi_k
///          + Jbx_k'(lam_up - lam_lo) + Cx_k'(lam_up - lam_lo)
/// ```
///
/// using the already-expanded primal trajectory and inequality
/// multipliers in `sol`. `sol.pi[hi]` must be valid beforehand when
/// `hi < n`; at `hi == n` the terminal stage has no dynamics term.
pub(crate) fn backfill_pi(qp: &OcpQp, sol: &mut OcpQpSolution, hi: usize, lo: usize) {
    let dims = qp.dims();
    for k in (lo..=hi).rev() {
        let stage = &qp.stages[k];
        let (nx, nu, ng) = (dims.nx[k], dims.nu[k], dims.ng[k]);
        let (nbx, nbu) = (dims.nbx[k], dims.nbu[k]);
        for i in 0..nx {
            let mut v = stage.q[i];
            for j in 0..nx {
                v += stage.Q[(i, j)] * sol.x[k][j];
            }
            for j in 0..nu {
                v += stage.S[(j, i)] * sol.u[k][j];
            }
            if k < dims.n {
                for j in 0..dims.nx[k + 1] {
                    v += stage.A[(j, i)] * sol.pi[k][j];
                }
            }
            for j in 0..ng {
                v += stage.Cx[(j, i)]
                    * (sol.lam_up[k][nbx + nbu + j] - sol.lam_lo[k][nbx + nbu + j]);
            }
            sol.pi[k - 1][i] = v;
        }
        for (j, &i) in stage.idxbx.iter().enumerate() {
            sol.pi[k - 1][i] += sol.lam_up[k][j] - sol.lam_lo[k][j];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_horizon() {
        assert_eq!(split_horizon(15, 3), vec![(0, 5), (5, 5), (10, 5)]);
        assert_eq!(split_horizon(15, 15), (0..15).map(|k| (k, 1)).collect::<Vec<_>>());
        assert_eq!(split_horizon(15, 1), vec![(0, 15)]);
        assert_eq!(split_horizon(7, 3), vec![(0, 3), (3, 2), (5, 2)]);
    }

    #[test]
    fn test_block_gamma_matches_forward_simulation() {
        // Two-stage block: x2 = A1 (A0 x0 + B0 u0 + b0) + B1 u1 + b1.
        let dims = OcpQpDims::unconstrained(vec![1, 1, 1], vec![1, 1, 0]);
        let mut qp = OcpQp::zeros(&dims).unwrap();
        for k in 0..2 {
            qp.stages[k].A[(0, 0)] = 2.0;
            qp.stages[k].B[(0, 0)] = 1.0;
            qp.stages[k].b[0] = 0.5;
        }
        let mut g = BlockGamma::new(&dims, 0, 2);
        g.update(&qp);
        assert_eq!(g.gx[2][(0, 0)], 4.0);
        assert_eq!(g.gu[2][(0, 0)], 2.0);
        assert_eq!(g.gu[2][(0, 1)], 1.0);
        assert_eq!(g.gv[2][0], 1.5);
    }
}
