//! Stage unrolling: maps a multi-stage QP onto the flat dense form the
//! kernels consume, and maps the flat solution back.
//!
//! Variable order is `z = [x_0; u_0; x_1; u_1; ...; x_N]`. Dynamics
//! become equality rows `x_{k+1} - A_k x_k - B_k u_k = b_k`, so the
//! stage multiplier is `pi_k = -y_k`. Two-sided bounds and general
//! constraints become one-sided rows `C z <= d`; rows whose bound is
//! infinite are skipped, so the number of rows actually built can be
//! smaller than the sizing capacity.

use crate::problem::{DenseQpDims, DenseQpStorage, OcpQp};
use crate::dims::OcpQpDims;
use crate::solution::OcpQpSolution;

/// Which side of a two-sided constraint a flat row encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Lower,
    Upper,
}

/// Which stage constraint a flat row encodes.
#[derive(Debug, Clone, Copy)]
enum RowKind {
    /// `idxbx` entry `j`.
    StateBound(usize),
    /// `idxbu` entry `j`.
    ControlBound(usize),
    /// General constraint row `j`.
    General(usize),
}

#[derive(Debug, Clone, Copy)]
struct IneqRow {
    stage: usize,
    side: Side,
    kind: RowKind,
}

/// Index map between the staged problem and its flat unrolling.
///
/// Offsets are fixed by the dims; the inequality row list is rebuilt on
/// every [`UnrollMap::build`] because bound finiteness is data. The row
/// list is reserved to capacity up front, so rebuilding does not
/// allocate.
#[derive(Debug)]
pub struct UnrollMap {
    zoff_x: Vec<usize>,
    zoff_u: Vec<usize>,
    eq_off: Vec<usize>,
    rows: Vec<IneqRow>,
    dense: DenseQpDims,
}

impl UnrollMap {
    pub fn new(dims: &OcpQpDims) -> Self {
        let stages = dims.n + 1;
        let mut zoff_x = Vec::with_capacity(stages);
        let mut zoff_u = Vec::with_capacity(stages);
        let mut off = 0;
        for k in 0..stages {
            zoff_x.push(off);
            off += dims.nx[k];
            zoff_u.push(off);
            off += dims.nu[k];
        }
        let mut eq_off = Vec::with_capacity(dims.n);
        let mut eoff = 0;
        for k in 0..dims.n {
            eq_off.push(eoff);
            eoff += dims.nx[k + 1];
        }
        let nc_cap = 2 * dims.total_ineq();
        Self {
            zoff_x,
            zoff_u,
            eq_off,
            rows: Vec::with_capacity(nc_cap),
            dense: DenseQpDims {
                nz: off,
                ne: eoff,
                nc: nc_cap,
            },
        }
    }

    /// Capacity dimensions of the flat problem. Sizing functions use
    /// these; a build may use fewer inequality rows.
    pub fn dense_dims(&self) -> DenseQpDims {
        self.dense
    }

    /// Write the staged problem into flat storage. Returns the number
    /// of inequality rows built.
    pub fn build(&mut self, qp: &OcpQp, st: &mut DenseQpStorage<'_>) -> usize {
        let dims = qp.dims();
        let nz = self.dense.nz;
        st.clear();
        self.rows.clear();

        for k in 0..=dims.n {
            let stage = &qp.stages[k];
            let zx = self.zoff_x[k];
            let zu = self.zoff_u[k];
            let (nx, nu) = (dims.nx[k], dims.nu[k]);

            // Cost blocks, column-major.
            for j in 0..nx {
                for i in 0..nx {
                    st.h[(zx + j) * nz + (zx + i)] = stage.Q[(i, j)];
                }
                for i in 0..nu {
                    st.h[(zx + j) * nz + (zu + i)] = stage.S[(i, j)];
                    st.h[(zu + i) * nz + (zx + j)] = stage.S[(i, j)];
                }
                st.g[zx + j] = stage.q[j];
            }
            for j in 0..nu {
                for i in 0..nu {
                    st.h[(zu + j) * nz + (zu + i)] = stage.R[(i, j)];
                }
                st.g[zu + j] = stage.r[j];
            }

            // Dynamics rows: x_{k+1} - A x_k - B u_k = b_k.
            if k < dims.n {
                let zx_next = self.zoff_x[k + 1];
                for i in 0..dims.nx[k + 1] {
                    let r = (self.eq_off[k] + i) * nz;
                    st.e[r + zx_next + i] = 1.0;
                    for j in 0..nx {
                        st.e[r + zx + j] = -stage.A[(i, j)];
                    }
                    for j in 0..nu {
                        st.e[r + zu + j] = -stage.B[(i, j)];
                    }
                    st.e_rhs[self.eq_off[k] + i] = stage.b[i];
                }
            }

            // One-sided inequality rows over finite bounds.
            for (j, &i) in stage.idxbx.iter().enumerate() {
                if stage.ubx[j].is_finite() {
                    let r = self.push_row(k, Side::Upper, RowKind::StateBound(j));
                    st.c[r * nz + zx + i] = 1.0;
                    st.d[r] = stage.ubx[j];
                }
                if stage.lbx[j].is_finite() {
                    let r = self.push_row(k, Side::Lower, RowKind::StateBound(j));
                    st.c[r * nz + zx + i] = -1.0;
                    st.d[r] = -stage.lbx[j];
                }
            }
            for (j, &i) in stage.idxbu.iter().enumerate() {
                if stage.ubu[j].is_finite() {
                    let r = self.push_row(k, Side::Upper, RowKind::ControlBound(j));
                    st.c[r * nz + zu + i] = 1.0;
                    st.d[r] = stage.ubu[j];
                }
                if stage.lbu[j].is_finite() {
                    let r = self.push_row(k, Side::Lower, RowKind::ControlBound(j));
                    st.c[r * nz + zu + i] = -1.0;
                    st.d[r] = -stage.lbu[j];
                }
            }
            for j in 0..dims.ng[k] {
                if stage.ug[j].is_finite() {
                    let r = self.push_row(k, Side::Upper, RowKind::General(j));
                    for jj in 0..nx {
                        st.c[r * nz + zx + jj] = stage.Cx[(j, jj)];
                    }
                    for jj in 0..nu {
                        st.c[r * nz + zu + jj] = stage.Cu[(j, jj)];
                    }
                    st.d[r] = stage.ug[j];
                }
                if stage.lg[j].is_finite() {
                    let r = self.push_row(k, Side::Lower, RowKind::General(j));
                    for jj in 0..nx {
                        st.c[r * nz + zx + jj] = -stage.Cx[(j, jj)];
                    }
                    for jj in 0..nu {
                        st.c[r * nz + zu + jj] = -stage.Cu[(j, jj)];
                    }
                    st.d[r] = -stage.lg[j];
                }
            }
        }

        self.rows.len()
    }

    fn push_row(&mut self, stage: usize, side: Side, kind: RowKind) -> usize {
        let r = self.rows.len();
        self.rows.push(IneqRow { stage, side, kind });
        r
    }

    /// Scatter a flat solution back into the staged container.
    ///
    /// `lam` is the flat multiplier vector over the rows built by the
    /// most recent [`UnrollMap::build`]; `y` the equality multipliers.
    pub fn extract(
        &self,
        dims: &OcpQpDims,
        z: &[f64],
        y: &[f64],
        lam: &[f64],
        sol: &mut OcpQpSolution,
    ) {
        for k in 0..=dims.n {
            for i in 0..dims.nx[k] {
                sol.x[k][i] = z[self.zoff_x[k] + i];
            }
            for i in 0..dims.nu[k] {
                sol.u[k][i] = z[self.zoff_u[k] + i];
            }
            sol.lam_lo[k].fill(0.0);
            sol.lam_up[k].fill(0.0);
        }
        for k in 0..dims.n {
            for i in 0..dims.nx[k + 1] {
                sol.pi[k][i] = -y[self.eq_off[k] + i];
            }
        }
        for (r, info) in self.rows.iter().enumerate() {
            let k = info.stage;
            let slot = match info.kind {
                RowKind::StateBound(j) => j,
                RowKind::ControlBound(j) => dims.nbx[k] + j,
                RowKind::General(j) => dims.nbx[k] + dims.nbu[k] + j,
            };
            match info.side {
                Side::Lower => sol.lam_lo[k][slot] = lam[r],
                Side::Upper => sol.lam_up[k][slot] = lam[r],
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;

    fn two_stage_qp() -> OcpQp {
        let dims = OcpQpDims {
            n: 1,
            nx: vec![2, 2],
            nu: vec![1, 0],
            nbx: vec![0, 1],
            nbu: vec![1, 0],
            ng: vec![0, 0],
        };
        let mut qp = OcpQp::zeros(&dims).unwrap();
        {
            let s0 = &mut qp.stages[0];
            s0.A[(0, 0)] = 1.0;
            s0.A[(1, 1)] = 1.0;
            s0.B[(0, 0)] = 0.5;
            s0.B[(1, 0)] = 1.0;
            s0.b[0] = 0.1;
            s0.R[(0, 0)] = 1.0;
            s0.idxbu[0] = 0;
            s0.lbu[0] = -1.0;
            s0.ubu[0] = f64::INFINITY;
        }
        {
            let s1 = &mut qp.stages[1];
            s1.Q[(0, 0)] = 1.0;
            s1.Q[(1, 1)] = 1.0;
            s1.idxbx[0] = 1;
            s1.lbx[0] = -3.0;
            s1.ubx[0] = 3.0;
        }
        qp
    }

    #[test]
    fn test_offsets_and_capacity() {
        let dims = OcpQpDims {
            n: 2,
            nx: vec![0, 3, 3],
            nu: vec![2, 2, 0],
            nbx: vec![0, 3, 3],
            nbu: vec![2, 2, 0],
            ng: vec![0, 0, 1],
        };
        let map = UnrollMap::new(&dims);
        let d = map.dense_dims();
        assert_eq!(d.nz, 10);
        assert_eq!(d.ne, 6);
        assert_eq!(d.nc, 2 * dims.total_ineq());
    }

    #[test]
    fn test_build_skips_infinite_bounds() {
        let qp = two_stage_qp();
        let mut map = UnrollMap::new(qp.dims());
        let dd = map.dense_dims();
        let mut buf = vec![0.0; dd.words()];
        let mut arena = Arena::new(&mut buf);
        let mut st = DenseQpStorage::assign(dd, &mut arena).unwrap();
        let nc_used = map.build(&qp, &mut st);
        // ubu infinite: one control row; state bound two-sided: two rows.
        assert_eq!(nc_used, 3);
        assert!(nc_used < dd.nc);
        // First row is the finite lower control bound -u <= 1.
        assert_eq!(st.c[2], -1.0);
        assert_eq!(st.d[0], 1.0);
    }

    #[test]
    fn test_dynamics_rows() {
        let qp = two_stage_qp();
        let mut map = UnrollMap::new(qp.dims());
        let dd = map.dense_dims();
        let mut buf = vec![0.0; dd.words()];
        let mut arena = Arena::new(&mut buf);
        let mut st = DenseQpStorage::assign(dd, &mut arena).unwrap();
        map.build(&qp, &mut st);
        // Row 0: x1[0] - x0[0] - 0.5 u0 = 0.1 over z = [x0(2); u0; x1(2)].
        assert_eq!(&st.e[..dd.nz], &[-1.0, 0.0, -0.5, 1.0, 0.0]);
        assert_eq!(st.e_rhs[0], 0.1);
    }

    #[test]
    fn test_extract_roundtrip() {
        let qp = two_stage_qp();
        let dims = qp.dims().clone();
        let mut map = UnrollMap::new(&dims);
        let dd = map.dense_dims();
        let mut buf = vec![0.0; dd.words()];
        let mut arena = Arena::new(&mut buf);
        let mut st = DenseQpStorage::assign(dd, &mut arena).unwrap();
        let nc_used = map.build(&qp, &mut st);

        let z = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let y = vec![0.5, -0.5];
        let lam = vec![0.1, 0.2, 0.3];
        let mut sol = OcpQpSolution::new(&dims);
        map.extract(&dims, &z, &y, &lam[..nc_used], &mut sol);

        assert_eq!(sol.x[0][1], 2.0);
        assert_eq!(sol.u[0][0], 3.0);
        assert_eq!(sol.x[1][0], 4.0);
        assert_eq!(sol.pi[0][0], -0.5);
        assert_eq!(sol.pi[0][1], 0.5);
        // Row order: lower bu, upper bx, lower bx.
        assert_eq!(sol.lam_lo[0][0], 0.1);
        assert_eq!(sol.lam_up[1][0], 0.2);
        assert_eq!(sol.lam_lo[1][0], 0.3);
    }
}
