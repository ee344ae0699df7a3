//! Full condensing: eliminating every state variable.
//!
//! One block spans the whole horizon and the terminal stage is folded
//! into the cost, leaving a flat dense QP over `z = [x_0; u_0; ...;
//! u_{N-1}]` (the `x_0` part is absent when the initial state has been
//! eliminated upstream). There are no equality rows; every bound and
//! general constraint becomes a one-sided inequality row, with rows on
//! eliminated states expressed through the sensitivity maps. Infinite
//! bound sides are skipped, as in the stage unrolling.

use crate::condensing::{backfill_pi, BlockGamma};
use crate::dims::OcpQpDims;
use crate::error::{CoreError, CoreResult};
use crate::problem::{DenseQpDims, DenseQpStorage, OcpQp};
use crate::solution::OcpQpSolution;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Lower,
    Upper,
}

#[derive(Debug, Clone, Copy)]
enum RowKind {
    StateBound(usize),
    ControlBound(usize),
    General(usize),
}

#[derive(Debug, Clone, Copy)]
struct CondRow {
    stage: usize,
    side: Side,
    kind: RowKind,
}

/// Precomputed full condensing map. Construction is dims-only;
/// [`FullCondensingMap::build`] rewrites the dense problem in place.
#[derive(Debug)]
pub struct FullCondensingMap {
    block: BlockGamma,
    dense: DenseQpDims,
    rows: Vec<CondRow>,
    /// Scratch row over `z`, and `Q_j gv_j + q_j` per stage.
    zrow: Vec<f64>,
    tqv: Vec<f64>,
}

impl FullCondensingMap {
    pub fn new(dims: &OcpQpDims) -> CoreResult<Self> {
        if dims.n == 0 {
            return Err(CoreError::InvalidConfig(
                "cannot condense a horizon of zero stages".into(),
            ));
        }
        let block = BlockGamma::new(dims, 0, dims.n);
        let nz = block.nx0 + block.nw;
        let nc_cap = 2 * dims.total_ineq();
        Ok(Self {
            block,
            dense: DenseQpDims { nz, ne: 0, nc: nc_cap },
            rows: Vec::with_capacity(nc_cap),
            zrow: vec![0.0; nz],
            tqv: vec![0.0; dims.max_nx()],
        })
    }

    /// Capacity dimensions of the dense problem.
    pub fn dense_dims(&self) -> DenseQpDims {
        self.dense
    }

    /// Write the condensed problem into flat storage. Returns the
    /// number of inequality rows built.
    pub fn build(&mut self, qp: &OcpQp, st: &mut DenseQpStorage<'_>) -> usize {
        let dims = qp.dims();
        let blk = &mut self.block;
        blk.update(qp);
        let nz = self.dense.nz;
        let nx0 = blk.nx0;
        st.clear();
        self.rows.clear();

        // Cost: every stage's Q block through its sensitivity map,
        // terminal stage included; R and S blocks through the control
        // selector.
        for k in 0..=dims.n {
            let sk = &qp.stages[k];
            let (gx, gu, gv) = (&blk.gx[k], &blk.gu[k], &blk.gv[k]);
            let (nxk, nuk) = (dims.nx[k], dims.nu[k]);

            for i in 0..nxk {
                let mut v = sk.q[i];
                for m in 0..nxk {
                    v += sk.Q[(i, m)] * gv[m];
                }
                self.tqv[i] = v;
            }

            // [gx gu]' Q [gx gu], accumulated column by column.
            for c in 0..nz {
                for i in 0..nxk {
                    let mut qg = 0.0;
                    for m in 0..nxk {
                        let zc = if c < nx0 { gx[(m, c)] } else { gu[(m, c - nx0)] };
                        qg += sk.Q[(i, m)] * zc;
                    }
                    if qg == 0.0 {
                        continue;
                    }
                    for rr in 0..nx0 {
                        st.h[c * nz + rr] += gx[(i, rr)] * qg;
                    }
                    for rr in 0..blk.nw {
                        st.h[c * nz + nx0 + rr] += gu[(i, rr)] * qg;
                    }
                }
            }
            for rr in 0..nx0 {
                for i in 0..nxk {
                    st.g[rr] += gx[(i, rr)] * self.tqv[i];
                }
            }
            for rr in 0..blk.nw {
                for i in 0..nxk {
                    st.g[nx0 + rr] += gu[(i, rr)] * self.tqv[i];
                }
            }

            if k < dims.n {
                let uo = nx0 + blk.uoff[k];
                for i in 0..nuk {
                    // S x_k terms: rows at u_k, columns over z.
                    for c in 0..nz {
                        let mut v = 0.0;
                        for m in 0..nxk {
                            let zc = if c < nx0 { gx[(m, c)] } else { gu[(m, c - nx0)] };
                            v += sk.S[(i, m)] * zc;
                        }
                        st.h[c * nz + uo + i] += v;
                        st.h[(uo + i) * nz + c] += v;
                    }
                    for c in 0..nuk {
                        st.h[(uo + c) * nz + uo + i] += sk.R[(i, c)];
                    }
                    let mut v = sk.r[i];
                    for m in 0..nxk {
                        v += sk.S[(i, m)] * gv[m];
                    }
                    st.g[uo + i] += v;
                }
            }
        }

        // Inequality rows over finite bound sides.
        for k in 0..=dims.n {
            let sk = &qp.stages[k];
            let (gx, gu, gv) = (&blk.gx[k], &blk.gu[k], &blk.gv[k]);
            let (nxk, nuk) = (dims.nx[k], dims.nu[k]);

            for (e, &i) in sk.idxbx.iter().enumerate() {
                self.zrow.fill(0.0);
                for c in 0..nx0 {
                    self.zrow[c] = gx[(i, c)];
                }
                for c in 0..blk.nw {
                    self.zrow[nx0 + c] = gu[(i, c)];
                }
                let shift = gv[i];
                push_sides(
                    st,
                    &mut self.rows,
                    &self.zrow,
                    nz,
                    k,
                    RowKind::StateBound(e),
                    sk.lbx[e] - shift,
                    sk.ubx[e] - shift,
                );
            }
            for (e, &i) in sk.idxbu.iter().enumerate() {
                self.zrow.fill(0.0);
                self.zrow[nx0 + blk.uoff[k] + i] = 1.0;
                push_sides(
                    st,
                    &mut self.rows,
                    &self.zrow,
                    nz,
                    k,
                    RowKind::ControlBound(e),
                    sk.lbu[e],
                    sk.ubu[e],
                );
            }
            for row in 0..dims.ng[k] {
                self.zrow.fill(0.0);
                let mut shift = 0.0;
                for m in 0..nxk {
                    let cxm = sk.Cx[(row, m)];
                    shift += cxm * gv[m];
                    for c in 0..nx0 {
                        self.zrow[c] += cxm * gx[(m, c)];
                    }
                    for c in 0..blk.nw {
                        self.zrow[nx0 + c] += cxm * gu[(m, c)];
                    }
                }
                for c in 0..nuk {
                    self.zrow[nx0 + blk.uoff[k] + c] += sk.Cu[(row, c)];
                }
                push_sides(
                    st,
                    &mut self.rows,
                    &self.zrow,
                    nz,
                    k,
                    RowKind::General(row),
                    sk.lg[row] - shift,
                    sk.ug[row] - shift,
                );
            }
        }

        self.rows.len()
    }

    /// Map a flat solution back to the original horizon. `lam` covers
    /// the rows built by the most recent [`FullCondensingMap::build`].
    pub fn extract(&self, qp: &OcpQp, z: &[f64], lam: &[f64], sol: &mut OcpQpSolution) {
        let dims = qp.dims();
        let nx0 = self.block.nx0;

        for i in 0..nx0 {
            sol.x[0][i] = z[i];
        }
        for k in 0..dims.n {
            for i in 0..dims.nu[k] {
                sol.u[k][i] = z[nx0 + self.block.uoff[k] + i];
            }
        }
        for k in 0..dims.n {
            let sk = &qp.stages[k];
            for i in 0..dims.nx[k + 1] {
                let mut v = sk.b[i];
                for m in 0..dims.nx[k] {
                    v += sk.A[(i, m)] * sol.x[k][m];
                }
                for m in 0..dims.nu[k] {
                    v += sk.B[(i, m)] * sol.u[k][m];
                }
                sol.x[k + 1][i] = v;
            }
        }

        for k in 0..=dims.n {
            sol.lam_lo[k].fill(0.0);
            sol.lam_up[k].fill(0.0);
        }
        for (r, info) in self.rows.iter().enumerate() {
            let k = info.stage;
            let slot = match info.kind {
                RowKind::StateBound(e) => e,
                RowKind::ControlBound(e) => dims.nbx[k] + e,
                RowKind::General(row) => dims.nbx[k] + dims.nbu[k] + row,
            };
            match info.side {
                Side::Lower => sol.lam_lo[k][slot] = lam[r],
                Side::Upper => sol.lam_up[k][slot] = lam[r],
            }
        }

        // All dynamics multipliers are recovered backwards from the
        // terminal stationarity condition.
        backfill_pi(qp, sol, dims.n, 1);
    }
}

/// Append the finite sides of a two-sided row as one-sided rows.
#[allow(clippy::too_many_arguments)]
fn push_sides(
    st: &mut DenseQpStorage<'_>,
    rows: &mut Vec<CondRow>,
    zrow: &[f64],
    nz: usize,
    stage: usize,
    kind: RowKind,
    lo: f64,
    up: f64,
) {
    if up.is_finite() {
        let r = rows.len();
        rows.push(CondRow {
            stage,
            side: Side::Upper,
            kind,
        });
        st.c[r * nz..(r + 1) * nz].copy_from_slice(zrow);
        st.d[r] = up;
    }
    if lo.is_finite() {
        let r = rows.len();
        rows.push(CondRow {
            stage,
            side: Side::Lower,
            kind,
        });
        for (dst, src) in st.c[r * nz..(r + 1) * nz].iter_mut().zip(zrow.iter()) {
            *dst = -src;
        }
        st.d[r] = -lo;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;

    /// Double integrator over two stages with control bounds and a
    /// terminal state bound.
    fn qp_fixture() -> OcpQp {
        let dims = OcpQpDims {
            n: 2,
            nx: vec![1, 1, 1],
            nu: vec![1, 1, 0],
            nbx: vec![0, 0, 1],
            nbu: vec![1, 1, 0],
            ng: vec![0, 0, 0],
        };
        let mut qp = OcpQp::zeros(&dims).unwrap();
        for k in 0..2 {
            let stk = &mut qp.stages[k];
            stk.A[(0, 0)] = 1.0;
            stk.B[(0, 0)] = 1.0;
            stk.R[(0, 0)] = 1.0;
            stk.idxbu[0] = 0;
            stk.lbu[0] = -1.0;
            stk.ubu[0] = 1.0;
        }
        qp.stages[2].Q[(0, 0)] = 1.0;
        qp.stages[2].idxbx[0] = 0;
        qp.stages[2].lbx[0] = f64::NEG_INFINITY;
        qp.stages[2].ubx[0] = 2.0;
        qp
    }

    #[test]
    fn test_dense_dims_and_rows() {
        let qp = qp_fixture();
        let mut map = FullCondensingMap::new(qp.dims()).unwrap();
        let dd = map.dense_dims();
        assert_eq!(dd.nz, 3); // x0 + two controls
        assert_eq!(dd.ne, 0);
        let mut buf = vec![0.0; dd.words()];
        let mut arena = Arena::new(&mut buf);
        let mut st = DenseQpStorage::assign(dd, &mut arena).unwrap();
        let nc_used = map.build(&qp, &mut st);
        // Four control bound rows plus one finite terminal bound side.
        assert_eq!(nc_used, 5);
    }

    #[test]
    fn test_condensed_hessian() {
        // x2 = x0 + u0 + u1, cost 1/2 u0^2 + 1/2 u1^2 + 1/2 x2^2. The
        // terminal Q spreads over all of z.
        let qp = qp_fixture();
        let mut map = FullCondensingMap::new(qp.dims()).unwrap();
        let dd = map.dense_dims();
        let mut buf = vec![0.0; dd.words()];
        let mut arena = Arena::new(&mut buf);
        let mut st = DenseQpStorage::assign(dd, &mut arena).unwrap();
        map.build(&qp, &mut st);
        let nz = 3;
        // Column-major H: ones everywhere from x2'x2, plus R on u diag.
        let expect = [
            1.0, 1.0, 1.0, //
            1.0, 2.0, 1.0, //
            1.0, 1.0, 2.0,
        ];
        for (i, &e) in expect.iter().enumerate() {
            assert!((st.h[i] - e).abs() < 1e-14, "h[{}] = {}", i, st.h[i]);
        }
        assert_eq!(st.h.len(), nz * nz);
    }

    #[test]
    fn test_terminal_bound_row_uses_sensitivity() {
        let qp = qp_fixture();
        let mut map = FullCondensingMap::new(qp.dims()).unwrap();
        let dd = map.dense_dims();
        let mut buf = vec![0.0; dd.words()];
        let mut arena = Arena::new(&mut buf);
        let mut st = DenseQpStorage::assign(dd, &mut arena).unwrap();
        let nc_used = map.build(&qp, &mut st);
        // Last row: x0 + u0 + u1 <= 2.
        let r = nc_used - 1;
        assert_eq!(&st.c[r * 3..(r + 1) * 3], &[1.0, 1.0, 1.0]);
        assert_eq!(st.d[r], 2.0);
    }

    #[test]
    fn test_extract_recovers_trajectory() {
        let qp = qp_fixture();
        let mut map = FullCondensingMap::new(qp.dims()).unwrap();
        let dd = map.dense_dims();
        let mut buf = vec![0.0; dd.words()];
        let mut arena = Arena::new(&mut buf);
        let mut st = DenseQpStorage::assign(dd, &mut arena).unwrap();
        let nc_used = map.build(&qp, &mut st);

        let z = [1.0, -0.25, 0.5];
        let lam = vec![0.0; nc_used];
        let mut sol = OcpQpSolution::new(qp.dims());
        map.extract(&qp, &z, &lam, &mut sol);
        assert_eq!(sol.x[0][0], 1.0);
        assert_eq!(sol.x[1][0], 0.75);
        assert_eq!(sol.x[2][0], 1.25);
        // pi_1 = Q_2 x_2, pi_0 = A_1'pi_1.
        assert!((sol.pi[1][0] - 1.25).abs() < 1e-14);
        assert!((sol.pi[0][0] - 1.25).abs() < 1e-14);
    }
}
