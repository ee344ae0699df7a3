//! Problem containers: the staged OCP QP and the flat dense QP.

use nalgebra::{DMatrix, DVector};

use crate::arena::Arena;
use crate::dims::OcpQpDims;
use crate::error::{CoreError, CoreResult};

/// One stage of a multi-stage QP.
///
/// Stage `k` carries the cost
///
/// ```text
/// 1/2 x'Q x + 1/2 u'R u + u'S x + q'x + r'u
/// ```
///
/// the dynamics `x_next = A x + B u + b` (absent at the terminal
/// stage, where `A`, `B` and `b` are empty), box bounds on the state
/// and control components listed in `idxbx`/`idxbu`, and general
/// two-sided constraints `lg <= Cx x + Cu u <= ug`. Bounds may be
/// infinite on either side.
#[derive(Debug, Clone)]
#[allow(non_snake_case)] // matrices keep their mathematical names
pub struct OcpStage {
    /// State transition matrix (`nx_next x nx`).
    pub A: DMatrix<f64>,
    /// Control input matrix (`nx_next x nu`).
    pub B: DMatrix<f64>,
    /// Affine dynamics term (`nx_next`).
    pub b: DVector<f64>,
    /// State cost Hessian (`nx x nx`, symmetric PSD).
    pub Q: DMatrix<f64>,
    /// Cross cost term (`nu x nx`).
    pub S: DMatrix<f64>,
    /// Control cost Hessian (`nu x nu`, symmetric PD).
    pub R: DMatrix<f64>,
    /// State cost gradient (`nx`).
    pub q: DVector<f64>,
    /// Control cost gradient (`nu`).
    pub r: DVector<f64>,
    /// Indices of box-constrained state components.
    pub idxbx: Vec<usize>,
    /// State bound values (`nbx` each).
    pub lbx: DVector<f64>,
    /// Upper state bounds.
    pub ubx: DVector<f64>,
    /// Indices of box-constrained control components.
    pub idxbu: Vec<usize>,
    /// Lower control bounds.
    pub lbu: DVector<f64>,
    /// Upper control bounds.
    pub ubu: DVector<f64>,
    /// General constraint state Jacobian (`ng x nx`).
    pub Cx: DMatrix<f64>,
    /// General constraint control Jacobian (`ng x nu`).
    pub Cu: DMatrix<f64>,
    /// Lower general bounds (`ng`).
    pub lg: DVector<f64>,
    /// Upper general bounds.
    pub ug: DVector<f64>,
}

impl OcpStage {
    /// All-zero stage with the given dimensions (`nx_next == 0` for the
    /// terminal stage).
    pub fn zeros(nx: usize, nu: usize, nx_next: usize, nbx: usize, nbu: usize, ng: usize) -> Self {
        Self {
            A: DMatrix::zeros(nx_next, nx),
            B: DMatrix::zeros(nx_next, nu),
            b: DVector::zeros(nx_next),
            Q: DMatrix::zeros(nx, nx),
            S: DMatrix::zeros(nu, nx),
            R: DMatrix::zeros(nu, nu),
            q: DVector::zeros(nx),
            r: DVector::zeros(nu),
            idxbx: vec![0; nbx],
            lbx: DVector::zeros(nbx),
            ubx: DVector::zeros(nbx),
            idxbu: vec![0; nbu],
            lbu: DVector::zeros(nbu),
            ubu: DVector::zeros(nbu),
            Cx: DMatrix::zeros(ng, nx),
            Cu: DMatrix::zeros(ng, nu),
            lg: DVector::zeros(ng),
            ug: DVector::zeros(ng),
        }
    }
}

/// Multi-stage QP problem data. Built once, read-only afterwards.
#[derive(Debug, Clone)]
pub struct OcpQp {
    dims: OcpQpDims,
    /// Per-stage data (`dims.n + 1` entries).
    pub stages: Vec<OcpStage>,
}

impl OcpQp {
    /// All-zero problem matching the dims.
    pub fn zeros(dims: &OcpQpDims) -> CoreResult<Self> {
        dims.validate()?;
        let stages = (0..=dims.n)
            .map(|k| {
                let nx_next = if k < dims.n { dims.nx[k + 1] } else { 0 };
                OcpStage::zeros(
                    dims.nx[k],
                    dims.nu[k],
                    nx_next,
                    dims.nbx[k],
                    dims.nbu[k],
                    dims.ng[k],
                )
            })
            .collect();
        Ok(Self {
            dims: dims.clone(),
            stages,
        })
    }

    /// Dimension summary of this problem.
    pub fn dims(&self) -> &OcpQpDims {
        &self.dims
    }

    /// Validate the per-stage data against the dimension summary.
    pub fn validate(&self) -> CoreResult<()> {
        self.dims.validate()?;
        if self.stages.len() != self.dims.n + 1 {
            return Err(CoreError::InvalidProblem(format!(
                "{} stages, expected {}",
                self.stages.len(),
                self.dims.n + 1
            )));
        }
        for (k, st) in self.stages.iter().enumerate() {
            let nx = self.dims.nx[k];
            let nu = self.dims.nu[k];
            let nx_next = if k < self.dims.n { self.dims.nx[k + 1] } else { 0 };
            let ng = self.dims.ng[k];
            let checks = [
                ("A", st.A.nrows(), nx_next, st.A.ncols(), nx),
                ("B", st.B.nrows(), nx_next, st.B.ncols(), nu),
                ("Q", st.Q.nrows(), nx, st.Q.ncols(), nx),
                ("S", st.S.nrows(), nu, st.S.ncols(), nx),
                ("R", st.R.nrows(), nu, st.R.ncols(), nu),
                ("Cx", st.Cx.nrows(), ng, st.Cx.ncols(), nx),
                ("Cu", st.Cu.nrows(), ng, st.Cu.ncols(), nu),
            ];
            for (name, got_r, want_r, got_c, want_c) in checks {
                if got_r != want_r || got_c != want_c {
                    return Err(CoreError::InvalidProblem(format!(
                        "stage {}: {} is {}x{}, expected {}x{}",
                        k, name, got_r, got_c, want_r, want_c
                    )));
                }
            }
            if st.q.len() != nx || st.r.len() != nu || st.b.len() != nx_next {
                return Err(CoreError::InvalidProblem(format!(
                    "stage {}: gradient/affine vector lengths do not match dims",
                    k
                )));
            }
            if st.idxbx.len() != self.dims.nbx[k] || st.idxbu.len() != self.dims.nbu[k] {
                return Err(CoreError::InvalidProblem(format!(
                    "stage {}: bound index set lengths do not match dims",
                    k
                )));
            }
            for &i in &st.idxbx {
                if i >= nx {
                    return Err(CoreError::InvalidProblem(format!(
                        "stage {}: state bound index {} out of range (nx={})",
                        k, i, nx
                    )));
                }
            }
            for &i in &st.idxbu {
                if i >= nu {
                    return Err(CoreError::InvalidProblem(format!(
                        "stage {}: control bound index {} out of range (nu={})",
                        k, i, nu
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Dimensions of a flat dense QP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DenseQpDims {
    /// Number of primal variables.
    pub nz: usize,
    /// Number of equality constraint rows.
    pub ne: usize,
    /// Number of one-sided inequality rows (capacity; a build may use
    /// fewer when bounds are infinite).
    pub nc: usize,
}

impl DenseQpDims {
    /// Arena words needed to store the problem data.
    pub fn words(&self) -> usize {
        self.nz * self.nz
            + self.nz
            + self.ne * self.nz
            + self.ne
            + self.nc * self.nz
            + self.nc
    }
}

/// Flat dense QP storage carved from a caller arena:
///
/// ```text
/// minimize    1/2 z'H z + g'z
/// subject to  E z  = e
///             C z <= d
/// ```
///
/// `h` is column-major `nz x nz`; `e` and `c` are row-major so that
/// individual constraint rows are contiguous.
#[derive(Debug)]
pub struct DenseQpStorage<'a> {
    dims: DenseQpDims,
    /// Hessian, column-major.
    pub h: &'a mut [f64],
    /// Gradient.
    pub g: &'a mut [f64],
    /// Equality rows, row-major.
    pub e: &'a mut [f64],
    /// Equality right-hand side.
    pub e_rhs: &'a mut [f64],
    /// Inequality rows, row-major.
    pub c: &'a mut [f64],
    /// Inequality right-hand side.
    pub d: &'a mut [f64],
}

impl<'a> DenseQpStorage<'a> {
    /// Carve storage for `dims` out of the arena.
    pub fn assign(dims: DenseQpDims, arena: &mut Arena<'a>) -> CoreResult<Self> {
        Ok(Self {
            dims,
            h: arena.take(dims.nz * dims.nz)?,
            g: arena.take(dims.nz)?,
            e: arena.take(dims.ne * dims.nz)?,
            e_rhs: arena.take(dims.ne)?,
            c: arena.take(dims.nc * dims.nz)?,
            d: arena.take(dims.nc)?,
        })
    }

    /// Capacity dimensions this storage was carved for.
    pub fn dims(&self) -> DenseQpDims {
        self.dims
    }

    /// Zero all stored data.
    pub fn clear(&mut self) {
        self.h.fill(0.0);
        self.g.fill(0.0);
        self.e.fill(0.0);
        self.e_rhs.fill(0.0);
        self.c.fill(0.0);
        self.d.fill(0.0);
    }

    /// Read-only view using the first `nc_used` inequality rows.
    pub fn view(&self, nc_used: usize) -> DenseQpView<'_> {
        debug_assert!(nc_used <= self.dims.nc);
        DenseQpView {
            dims: DenseQpDims {
                nz: self.dims.nz,
                ne: self.dims.ne,
                nc: nc_used,
            },
            h: self.h,
            g: self.g,
            e: self.e,
            e_rhs: self.e_rhs,
            c: &self.c[..nc_used * self.dims.nz],
            d: &self.d[..nc_used],
        }
    }
}

/// Read-only view of a flat dense QP (layout as [`DenseQpStorage`]).
#[derive(Debug, Clone, Copy)]
pub struct DenseQpView<'a> {
    /// Dimensions actually in use.
    pub dims: DenseQpDims,
    /// Hessian, column-major.
    pub h: &'a [f64],
    /// Gradient.
    pub g: &'a [f64],
    /// Equality rows, row-major.
    pub e: &'a [f64],
    /// Equality right-hand side.
    pub e_rhs: &'a [f64],
    /// Inequality rows, row-major.
    pub c: &'a [f64],
    /// Inequality right-hand side.
    pub d: &'a [f64],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeros_matches_dims() {
        let dims = OcpQpDims {
            n: 2,
            nx: vec![2, 2, 2],
            nu: vec![1, 1, 0],
            nbx: vec![0, 2, 0],
            nbu: vec![1, 1, 0],
            ng: vec![0, 0, 1],
        };
        let qp = OcpQp::zeros(&dims).unwrap();
        assert!(qp.validate().is_ok());
        assert_eq!(qp.stages.len(), 3);
        assert_eq!(qp.stages[0].A.nrows(), 2);
        assert_eq!(qp.stages[2].A.nrows(), 0);
        assert_eq!(qp.stages[2].Cx.nrows(), 1);
    }

    #[test]
    fn test_validate_rejects_bad_index() {
        let dims = OcpQpDims {
            n: 1,
            nx: vec![2, 2],
            nu: vec![1, 0],
            nbx: vec![1, 0],
            nbu: vec![0, 0],
            ng: vec![0, 0],
        };
        let mut qp = OcpQp::zeros(&dims).unwrap();
        qp.stages[0].idxbx[0] = 5;
        assert!(qp.validate().is_err());
    }

    #[test]
    fn test_dense_storage_view() {
        let dims = DenseQpDims { nz: 3, ne: 1, nc: 4 };
        let mut buf = vec![0.0; dims.words()];
        let mut arena = Arena::new(&mut buf);
        let mut st = DenseQpStorage::assign(dims, &mut arena).unwrap();
        assert_eq!(arena.remaining(), 0);
        st.c[0] = 1.0;
        let v = st.view(2);
        assert_eq!(v.dims.nc, 2);
        assert_eq!(v.c.len(), 6);
    }
}
