//! Partial condensing: block-wise state elimination.
//!
//! The horizon is split into `n2` blocks; each block keeps its head
//! state and stacks its controls, and every other block state is
//! substituted through the block sensitivity maps. The result is a
//! smaller staged QP of horizon `n2` with the same solution set:
//!
//! * the block head's state bounds stay state bounds,
//! * every control bound stays a control bound on the stacked vector,
//! * interior state bounds and all general rows become general rows
//!   with bounds shifted by the affine part of the maps.
//!
//! Expansion maps the reduced solution back, recovering interior
//! states by forward simulation and interior dynamics multipliers by
//! backward stationarity.

use nalgebra::DVector;

use crate::condensing::{backfill_pi, split_horizon, BlockGamma};
use crate::dims::OcpQpDims;
use crate::error::{CoreError, CoreResult};
use crate::problem::OcpQp;
use crate::solution::OcpQpSolution;

/// Origin of one reduced general row.
#[derive(Debug, Clone, Copy)]
enum GenOrigin {
    /// General row `row` of stage `stage`.
    General { stage: usize, row: usize },
    /// `idxbx` entry `entry` of interior stage `stage`.
    StateBound { stage: usize, entry: usize },
}

/// Precomputed partial condensing maps for a fixed dims and block
/// count. Construction is dims-only; [`PartialCondensingMap::condense`]
/// rewrites the reduced problem in place from the current data.
#[derive(Debug)]
pub struct PartialCondensingMap {
    blocks: Vec<BlockGamma>,
    reduced_dims: OcpQpDims,
    /// General-row origins per block, in reduced row order.
    origins: Vec<Vec<GenOrigin>>,
    /// Scratch for `Q_j gv_j + q_j` and `S_j gv_j + r_j`.
    tqv: DVector<f64>,
    tsv: DVector<f64>,
}

impl PartialCondensingMap {
    pub fn new(dims: &OcpQpDims, n2: usize) -> CoreResult<Self> {
        if dims.n == 0 || n2 == 0 || n2 > dims.n {
            return Err(CoreError::InvalidConfig(format!(
                "block count {} invalid for horizon {}",
                n2, dims.n
            )));
        }
        let blocks: Vec<BlockGamma> = split_horizon(dims.n, n2)
            .into_iter()
            .map(|(start, len)| BlockGamma::new(dims, start, len))
            .collect();

        let mut nx = Vec::with_capacity(n2 + 1);
        let mut nu = Vec::with_capacity(n2 + 1);
        let mut nbx = Vec::with_capacity(n2 + 1);
        let mut nbu = Vec::with_capacity(n2 + 1);
        let mut ng = Vec::with_capacity(n2 + 1);
        let mut origins = Vec::with_capacity(n2);
        for blk in &blocks {
            let (s, len) = (blk.start, blk.len);
            nx.push(dims.nx[s]);
            nu.push(blk.nw);
            nbx.push(dims.nbx[s]);
            nbu.push((0..len).map(|j| dims.nbu[s + j]).sum());
            let mut rows = Vec::new();
            for j in 0..len {
                for row in 0..dims.ng[s + j] {
                    rows.push(GenOrigin::General { stage: s + j, row });
                }
            }
            for j in 1..len {
                for entry in 0..dims.nbx[s + j] {
                    rows.push(GenOrigin::StateBound { stage: s + j, entry });
                }
            }
            ng.push(rows.len());
            origins.push(rows);
        }
        nx.push(dims.nx[dims.n]);
        nu.push(0);
        nbx.push(dims.nbx[dims.n]);
        nbu.push(0);
        ng.push(dims.ng[dims.n]);

        let reduced_dims = OcpQpDims {
            n: n2,
            nx,
            nu,
            nbx,
            nbu,
            ng,
        };
        reduced_dims.validate()?;
        Ok(Self {
            blocks,
            reduced_dims,
            origins,
            tqv: DVector::zeros(dims.max_nx()),
            tsv: DVector::zeros(dims.max_nu()),
        })
    }

    /// Dims of the reduced problem.
    pub fn reduced_dims(&self) -> &OcpQpDims {
        &self.reduced_dims
    }

    /// Rewrite `red` (allocated from [`Self::reduced_dims`]) from the
    /// current data of `qp`.
    pub fn condense(&mut self, qp: &OcpQp, red: &mut OcpQp) {
        let dims = qp.dims();
        debug_assert_eq!(red.dims(), &self.reduced_dims);
        for (b, blk) in self.blocks.iter_mut().enumerate() {
            blk.update(qp);
            let (s, len, nxb, nw) = (blk.start, blk.len, blk.nx0, blk.nw);
            let sr = &mut red.stages[b];

            // Reduced dynamics to the next block head.
            sr.A.copy_from(&blk.gx[len]);
            sr.B.copy_from(&blk.gu[len]);
            sr.b.copy_from(&blk.gv[len]);

            // Reduced cost, accumulated stage by stage.
            sr.Q.fill(0.0);
            sr.S.fill(0.0);
            sr.R.fill(0.0);
            sr.q.fill(0.0);
            sr.r.fill(0.0);
            for j in 0..len {
                let sj = &qp.stages[s + j];
                let (gx, gu, gv) = (&blk.gx[j], &blk.gu[j], &blk.gv[j]);
                let (nxj, nuj) = (dims.nx[s + j], dims.nu[s + j]);
                let uo = blk.uoff[j];

                // tqv = Q_j gv_j + q_j; tsv = S_j gv_j + r_j.
                for i in 0..nxj {
                    let mut v = sj.q[i];
                    for m in 0..nxj {
                        v += sj.Q[(i, m)] * gv[m];
                    }
                    self.tqv[i] = v;
                }
                for i in 0..nuj {
                    let mut v = sj.r[i];
                    for m in 0..nxj {
                        v += sj.S[(i, m)] * gv[m];
                    }
                    self.tsv[i] = v;
                }

                // Q += gx'Q gx, S += gu'Q gx, R += gu'Q gu; column of
                // Q gx / Q gu computed on the fly.
                for c in 0..nxb {
                    for i in 0..nxj {
                        let mut qg = 0.0;
                        for m in 0..nxj {
                            qg += sj.Q[(i, m)] * gx[(m, c)];
                        }
                        for rr in 0..nxb {
                            sr.Q[(rr, c)] += gx[(i, rr)] * qg;
                        }
                        for rr in 0..nw {
                            sr.S[(rr, c)] += gu[(i, rr)] * qg;
                        }
                    }
                }
                for c in 0..nw {
                    for i in 0..nxj {
                        let mut qg = 0.0;
                        for m in 0..nxj {
                            qg += sj.Q[(i, m)] * gu[(m, c)];
                        }
                        for rr in 0..nw {
                            sr.R[(rr, c)] += gu[(i, rr)] * qg;
                        }
                    }
                }

                // Cross and control terms through the control selector.
                for i in 0..nuj {
                    for c in 0..nxb {
                        let mut v = 0.0;
                        for m in 0..nxj {
                            v += sj.S[(i, m)] * gx[(m, c)];
                        }
                        sr.S[(uo + i, c)] += v;
                    }
                    for c in 0..nw {
                        let mut v = 0.0;
                        for m in 0..nxj {
                            v += sj.S[(i, m)] * gu[(m, c)];
                        }
                        sr.R[(uo + i, c)] += v;
                        sr.R[(c, uo + i)] += v;
                    }
                    for c in 0..nuj {
                        sr.R[(uo + i, uo + c)] += sj.R[(i, c)];
                    }
                }

                for rr in 0..nxb {
                    let mut v = 0.0;
                    for i in 0..nxj {
                        v += gx[(i, rr)] * self.tqv[i];
                    }
                    sr.q[rr] += v;
                }
                for rr in 0..nw {
                    let mut v = 0.0;
                    for i in 0..nxj {
                        v += gu[(i, rr)] * self.tqv[i];
                    }
                    sr.r[rr] += v;
                }
                for i in 0..nuj {
                    sr.r[uo + i] += self.tsv[i];
                }
            }

            // Head state bounds survive unchanged.
            let s0 = &qp.stages[s];
            sr.idxbx.copy_from_slice(&s0.idxbx);
            sr.lbx.copy_from(&s0.lbx);
            sr.ubx.copy_from(&s0.ubx);

            // Control bounds move to the stacked control vector.
            let mut bu = 0;
            for j in 0..len {
                let sj = &qp.stages[s + j];
                for (e, &i) in sj.idxbu.iter().enumerate() {
                    sr.idxbu[bu] = blk.uoff[j] + i;
                    sr.lbu[bu] = sj.lbu[e];
                    sr.ubu[bu] = sj.ubu[e];
                    bu += 1;
                }
            }

            // General rows in origin order.
            for (rr, origin) in self.origins[b].iter().enumerate() {
                match *origin {
                    GenOrigin::General { stage, row } => {
                        let sj = &qp.stages[stage];
                        let j = stage - s;
                        let (gx, gu, gv) = (&blk.gx[j], &blk.gu[j], &blk.gv[j]);
                        let nxj = dims.nx[stage];
                        let mut shift = 0.0;
                        for m in 0..nxj {
                            shift += sj.Cx[(row, m)] * gv[m];
                        }
                        for c in 0..nxb {
                            let mut v = 0.0;
                            for m in 0..nxj {
                                v += sj.Cx[(row, m)] * gx[(m, c)];
                            }
                            sr.Cx[(rr, c)] = v;
                        }
                        for c in 0..nw {
                            let mut v = 0.0;
                            for m in 0..nxj {
                                v += sj.Cx[(row, m)] * gu[(m, c)];
                            }
                            sr.Cu[(rr, c)] = v;
                        }
                        for (c, cu) in (0..dims.nu[stage]).map(|c| (c, sj.Cu[(row, c)])) {
                            sr.Cu[(rr, blk.uoff[j] + c)] += cu;
                        }
                        sr.lg[rr] = sj.lg[row] - shift;
                        sr.ug[rr] = sj.ug[row] - shift;
                    }
                    GenOrigin::StateBound { stage, entry } => {
                        let sj = &qp.stages[stage];
                        let j = stage - s;
                        let (gx, gu, gv) = (&blk.gx[j], &blk.gu[j], &blk.gv[j]);
                        let i = sj.idxbx[entry];
                        for c in 0..nxb {
                            sr.Cx[(rr, c)] = gx[(i, c)];
                        }
                        for c in 0..nw {
                            sr.Cu[(rr, c)] = gu[(i, c)];
                        }
                        sr.lg[rr] = sj.lbx[entry] - gv[i];
                        sr.ug[rr] = sj.ubx[entry] - gv[i];
                    }
                }
            }
        }

        // Terminal stage is carried over verbatim.
        let n2 = self.reduced_dims.n;
        let st = &qp.stages[dims.n];
        let sr = &mut red.stages[n2];
        sr.Q.copy_from(&st.Q);
        sr.q.copy_from(&st.q);
        sr.idxbx.copy_from_slice(&st.idxbx);
        sr.lbx.copy_from(&st.lbx);
        sr.ubx.copy_from(&st.ubx);
        sr.Cx.copy_from(&st.Cx);
        sr.lg.copy_from(&st.lg);
        sr.ug.copy_from(&st.ug);
    }

    /// Map a reduced solution back to the original horizon.
    pub fn expand(&self, qp: &OcpQp, red_sol: &OcpQpSolution, sol: &mut OcpQpSolution) {
        let dims = qp.dims();
        let rdims = &self.reduced_dims;

        for (b, blk) in self.blocks.iter().enumerate() {
            let (s, len) = (blk.start, blk.len);
            sol.x[s].copy_from(&red_sol.x[b]);
            for j in 0..len {
                let nuj = dims.nu[s + j];
                for i in 0..nuj {
                    sol.u[s + j][i] = red_sol.u[b][blk.uoff[j] + i];
                }
            }
            // Interior states by forward simulation.
            for j in 0..len.saturating_sub(1) {
                let sj = &qp.stages[s + j];
                for i in 0..dims.nx[s + j + 1] {
                    let mut v = sj.b[i];
                    for m in 0..dims.nx[s + j] {
                        v += sj.A[(i, m)] * sol.x[s + j][m];
                    }
                    for m in 0..dims.nu[s + j] {
                        v += sj.B[(i, m)] * sol.u[s + j][m];
                    }
                    sol.x[s + j + 1][i] = v;
                }
            }

            // Inequality multipliers back to their origin slots.
            for j in 0..len {
                sol.lam_lo[s + j].fill(0.0);
                sol.lam_up[s + j].fill(0.0);
            }
            for e in 0..dims.nbx[s] {
                sol.lam_lo[s][e] = red_sol.lam_lo[b][e];
                sol.lam_up[s][e] = red_sol.lam_up[b][e];
            }
            let mut bu = rdims.nbx[b];
            for j in 0..len {
                let nbx_j = dims.nbx[s + j];
                for e in 0..dims.nbu[s + j] {
                    sol.lam_lo[s + j][nbx_j + e] = red_sol.lam_lo[b][bu];
                    sol.lam_up[s + j][nbx_j + e] = red_sol.lam_up[b][bu];
                    bu += 1;
                }
            }
            let goff = rdims.nbx[b] + rdims.nbu[b];
            for (rr, origin) in self.origins[b].iter().enumerate() {
                let (stage, slot) = match *origin {
                    GenOrigin::General { stage, row } => {
                        (stage, dims.nbx[stage] + dims.nbu[stage] + row)
                    }
                    GenOrigin::StateBound { stage, entry } => (stage, entry),
                };
                sol.lam_lo[stage][slot] = red_sol.lam_lo[b][goff + rr];
                sol.lam_up[stage][slot] = red_sol.lam_up[b][goff + rr];
            }
        }

        // Terminal stage.
        sol.x[dims.n].copy_from(&red_sol.x[rdims.n]);
        sol.lam_lo[dims.n].copy_from(&red_sol.lam_lo[rdims.n]);
        sol.lam_up[dims.n].copy_from(&red_sol.lam_up[rdims.n]);

        // Dynamics multipliers: block boundaries come from the reduced
        // solution, interior ones by backward stationarity.
        for (b, blk) in self.blocks.iter().enumerate() {
            let (s, len) = (blk.start, blk.len);
            sol.pi[s + len - 1].copy_from(&red_sol.pi[b]);
            if len > 1 {
                backfill_pi(qp, sol, s + len - 1, s + 1);
            }
        }
        sol.info = red_sol.info;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain_qp(n: usize) -> OcpQp {
        let dims = OcpQpDims {
            n,
            nx: vec![1; n + 1],
            nu: {
                let mut v = vec![1; n + 1];
                v[n] = 0;
                v
            },
            nbx: {
                let mut v = vec![1; n + 1];
                v[0] = 0;
                v
            },
            nbu: {
                let mut v = vec![1; n + 1];
                v[n] = 0;
                v
            },
            ng: vec![0; n + 1],
        };
        let mut qp = OcpQp::zeros(&dims).unwrap();
        for k in 0..=n {
            let st = &mut qp.stages[k];
            if k < n {
                st.A[(0, 0)] = 0.9;
                st.B[(0, 0)] = 0.5;
                st.b[0] = 0.1;
                st.R[(0, 0)] = 2.0;
                st.r[0] = 0.2;
                st.idxbu[0] = 0;
                st.lbu[0] = -1.0;
                st.ubu[0] = 1.0;
            }
            st.Q[(0, 0)] = 1.0;
            st.q[0] = 0.1;
            if k > 0 {
                st.idxbx[0] = 0;
                st.lbx[0] = -4.0;
                st.ubx[0] = 4.0;
            }
        }
        qp
    }

    #[test]
    fn test_reduced_dims() {
        let qp = chain_qp(4);
        let map = PartialCondensingMap::new(qp.dims(), 2).unwrap();
        let rd = map.reduced_dims();
        assert_eq!(rd.n, 2);
        assert_eq!(rd.nu, vec![2, 2, 0]);
        assert_eq!(rd.nbu, vec![2, 2, 0]);
        // Interior state bounds of stages 1 and 3 become general rows.
        assert_eq!(rd.ng, vec![1, 1, 0]);
        assert_eq!(rd.nbx, vec![0, 1, 1]);
    }

    #[test]
    fn test_rejects_bad_block_count() {
        let qp = chain_qp(4);
        assert!(PartialCondensingMap::new(qp.dims(), 0).is_err());
        assert!(PartialCondensingMap::new(qp.dims(), 5).is_err());
    }

    #[test]
    fn test_identity_when_n2_equals_n() {
        // One stage per block: the reduced problem is the original one
        // with state bounds intact and no relocation.
        let qp = chain_qp(3);
        let mut map = PartialCondensingMap::new(qp.dims(), 3).unwrap();
        let mut red = OcpQp::zeros(map.reduced_dims()).unwrap();
        map.condense(&qp, &mut red);
        for k in 0..3 {
            assert_eq!(red.stages[k].A[(0, 0)], qp.stages[k].A[(0, 0)]);
            assert_eq!(red.stages[k].R[(0, 0)], qp.stages[k].R[(0, 0)]);
            assert_eq!(red.stages[k].b[0], qp.stages[k].b[0]);
        }
        assert_eq!(red.dims().ng, &[0, 0, 0, 0]);
    }

    #[test]
    fn test_condensed_cost_matches_substitution() {
        // Single block over two stages with unconstrained interior:
        // evaluate both costs at a fixed (x0, u0, u1) and compare.
        let qp = chain_qp(2);
        let mut map = PartialCondensingMap::new(qp.dims(), 1).unwrap();
        let mut red = OcpQp::zeros(map.reduced_dims()).unwrap();
        map.condense(&qp, &mut red);

        let (x0, u0, u1) = (1.5, -0.3, 0.7);
        let x1 = 0.9 * x0 + 0.5 * u0 + 0.1;
        let orig_cost = 0.5 * x0 * x0
            + 0.1 * x0
            + 2.0 * 0.5 * u0 * u0
            + 0.2 * u0
            + 0.5 * x1 * x1
            + 0.1 * x1
            + 2.0 * 0.5 * u1 * u1
            + 0.2 * u1;

        let s0 = &red.stages[0];
        let xv = nalgebra::DVector::from_vec(vec![x0]);
        let uv = nalgebra::DVector::from_vec(vec![u0, u1]);
        let red_cost = 0.5 * (xv.transpose() * &s0.Q * &xv)[(0, 0)]
            + (uv.transpose() * &s0.S * &xv)[(0, 0)]
            + 0.5 * (uv.transpose() * &s0.R * &uv)[(0, 0)]
            + s0.q.dot(&xv)
            + s0.r.dot(&uv);

        // Constant terms are dropped during condensing; compare the
        // difference against a second evaluation point instead.
        let (x0b, u0b, u1b) = (0.4, 0.9, -0.2);
        let x1b = 0.9 * x0b + 0.5 * u0b + 0.1;
        let orig_cost_b = 0.5 * x0b * x0b
            + 0.1 * x0b
            + 2.0 * 0.5 * u0b * u0b
            + 0.2 * u0b
            + 0.5 * x1b * x1b
            + 0.1 * x1b
            + 2.0 * 0.5 * u1b * u1b
            + 0.2 * u1b;
        let xvb = nalgebra::DVector::from_vec(vec![x0b]);
        let uvb = nalgebra::DVector::from_vec(vec![u0b, u1b]);
        let red_cost_b = 0.5 * (xvb.transpose() * &s0.Q * &xvb)[(0, 0)]
            + (uvb.transpose() * &s0.S * &xvb)[(0, 0)]
            + 0.5 * (uvb.transpose() * &s0.R * &uvb)[(0, 0)]
            + s0.q.dot(&xvb)
            + s0.r.dot(&uvb);

        assert!(
            ((orig_cost - orig_cost_b) - (red_cost - red_cost_b)).abs() < 1e-12,
            "cost difference mismatch"
        );
    }

    #[test]
    fn test_relocated_state_bound_row() {
        // In a single block over two stages, the stage-1 state bound
        // becomes the general row Gx_1 x0 + Gu_1 u in [lb - gv, ub - gv].
        let qp = chain_qp(2);
        let mut map = PartialCondensingMap::new(qp.dims(), 1).unwrap();
        let mut red = OcpQp::zeros(map.reduced_dims()).unwrap();
        map.condense(&qp, &mut red);
        let s0 = &red.stages[0];
        assert_eq!(s0.Cx[(0, 0)], 0.9);
        assert_eq!(s0.Cu[(0, 0)], 0.5);
        assert_eq!(s0.Cu[(0, 1)], 0.0);
        assert_eq!(s0.lg[0], -4.1);
        assert_eq!(s0.ug[0], 3.9);
    }
}
