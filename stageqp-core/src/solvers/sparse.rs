//! Sparse backends: the staged QP is unrolled into one flat problem
//! whose equality block keeps the stage structure, and handed to a
//! kernel. No states are eliminated.

use std::time::{Duration, Instant};

use crate::arena::Arena;
use crate::backend::{BackendId, OcpQpBackend, SolverMemory};
use crate::dims::OcpQpDims;
use crate::error::{CoreError, CoreResult};
use crate::kernels::active_set::{self, ActiveSetMemory};
use crate::kernels::ipm::{self, IpmMemory};
use crate::options::{ActiveSetOptions, IpmOptions, SolverOptions};
use crate::problem::{DenseQpStorage, OcpQp};
use crate::solution::{OcpQpSolution, QpInfo, QpStatus};
use crate::unroll::UnrollMap;

fn check_dims(expected: &OcpQpDims, got: &OcpQpDims) -> CoreResult<()> {
    if expected != got {
        return Err(CoreError::DimensionMismatch(
            "problem dims differ from the dims this memory was assigned for".into(),
        ));
    }
    Ok(())
}

/// Persistent state of the sparse interior-point backend.
#[derive(Debug)]
pub struct SparseIpmMemory<'a> {
    dims: OcpQpDims,
    map: UnrollMap,
    st: DenseQpStorage<'a>,
    kern: IpmMemory<'a>,
}

/// Stage-unrolled interior-point backend.
#[derive(Debug, Clone, Copy)]
pub struct SparseIpmBackend;

impl OcpQpBackend for SparseIpmBackend {
    fn id(&self) -> BackendId {
        BackendId::SparseIpm
    }

    fn default_options(&self, _dims: &OcpQpDims) -> SolverOptions {
        SolverOptions::Ipm(IpmOptions::default())
    }

    fn validate_config(&self, dims: &OcpQpDims, opts: &SolverOptions) -> CoreResult<()> {
        dims.validate()?;
        opts.as_ipm()?;
        Ok(())
    }

    fn memory_words(&self, dims: &OcpQpDims, opts: &SolverOptions) -> CoreResult<usize> {
        self.validate_config(dims, opts)?;
        let dd = UnrollMap::new(dims).dense_dims();
        Ok(dd.words() + ipm::memory_words(&dd))
    }

    fn workspace_words(&self, dims: &OcpQpDims, opts: &SolverOptions) -> CoreResult<usize> {
        self.validate_config(dims, opts)?;
        Ok(ipm::workspace_words(&UnrollMap::new(dims).dense_dims()))
    }

    fn assign_memory<'a>(
        &self,
        dims: &OcpQpDims,
        opts: &SolverOptions,
        arena: &mut Arena<'a>,
    ) -> CoreResult<SolverMemory<'a>> {
        self.validate_config(dims, opts)?;
        let map = UnrollMap::new(dims);
        let dd = map.dense_dims();
        Ok(SolverMemory::SparseIpm(SparseIpmMemory {
            dims: dims.clone(),
            map,
            st: DenseQpStorage::assign(dd, arena)?,
            kern: ipm::assign_memory(&dd, arena)?,
        }))
    }

    fn evaluate(
        &self,
        qp: &OcpQp,
        opts: &SolverOptions,
        mem: &mut SolverMemory<'_>,
        work: &mut [f64],
        sol: &mut OcpQpSolution,
    ) -> CoreResult<QpStatus> {
        let o = opts.as_ipm()?;
        let SolverMemory::SparseIpm(m) = mem else {
            return Err(CoreError::MemoryMismatch {
                expected: BackendId::SparseIpm.as_str(),
                got: mem.tag(),
            });
        };
        check_dims(&m.dims, qp.dims())?;

        let start = Instant::now();
        let nc_used = m.map.build(qp, &mut m.st);
        let built = Instant::now();
        let (status, num_iter) = ipm::solve(&m.st.view(nc_used), o, &mut m.kern, work)?;
        let solved = Instant::now();
        m.map
            .extract(&m.dims, m.kern.z, m.kern.y, &m.kern.lam[..nc_used], sol);
        let done = Instant::now();

        sol.info = QpInfo {
            num_iter,
            total_time: done - start,
            condensing_time: Duration::ZERO,
            solve_time: solved - built,
            interface_time: (built - start) + (done - solved),
        };
        Ok(status)
    }
}

/// Persistent state of the sparse active-set backend.
#[derive(Debug)]
pub struct SparseActiveSetMemory<'a> {
    dims: OcpQpDims,
    map: UnrollMap,
    st: DenseQpStorage<'a>,
    kern: ActiveSetMemory<'a>,
}

/// Stage-unrolled dual active-set backend.
///
/// Requires an explicit initial state: problems with `nx[0] == 0` are
/// rejected at configuration time, whether used directly or as the
/// inner backend of partial condensing.
#[derive(Debug, Clone, Copy)]
pub struct SparseActiveSetBackend;

impl OcpQpBackend for SparseActiveSetBackend {
    fn id(&self) -> BackendId {
        BackendId::SparseActiveSet
    }

    fn default_options(&self, _dims: &OcpQpDims) -> SolverOptions {
        SolverOptions::ActiveSet(ActiveSetOptions::default())
    }

    fn validate_config(&self, dims: &OcpQpDims, opts: &SolverOptions) -> CoreResult<()> {
        dims.validate()?;
        opts.as_active_set()?;
        if dims.nx[0] == 0 {
            return Err(CoreError::InvalidConfig(
                "sparse active-set backend requires an explicit initial state (nx[0] > 0)"
                    .into(),
            ));
        }
        Ok(())
    }

    fn memory_words(&self, dims: &OcpQpDims, opts: &SolverOptions) -> CoreResult<usize> {
        self.validate_config(dims, opts)?;
        let dd = UnrollMap::new(dims).dense_dims();
        Ok(dd.words() + active_set::memory_words(&dd))
    }

    fn workspace_words(&self, dims: &OcpQpDims, opts: &SolverOptions) -> CoreResult<usize> {
        self.validate_config(dims, opts)?;
        Ok(active_set::workspace_words(&UnrollMap::new(dims).dense_dims()))
    }

    fn assign_memory<'a>(
        &self,
        dims: &OcpQpDims,
        opts: &SolverOptions,
        arena: &mut Arena<'a>,
    ) -> CoreResult<SolverMemory<'a>> {
        self.validate_config(dims, opts)?;
        let map = UnrollMap::new(dims);
        let dd = map.dense_dims();
        Ok(SolverMemory::SparseActiveSet(SparseActiveSetMemory {
            dims: dims.clone(),
            map,
            st: DenseQpStorage::assign(dd, arena)?,
            kern: active_set::assign_memory(&dd, arena)?,
        }))
    }

    fn evaluate(
        &self,
        qp: &OcpQp,
        opts: &SolverOptions,
        mem: &mut SolverMemory<'_>,
        work: &mut [f64],
        sol: &mut OcpQpSolution,
    ) -> CoreResult<QpStatus> {
        let o = opts.as_active_set()?;
        let SolverMemory::SparseActiveSet(m) = mem else {
            return Err(CoreError::MemoryMismatch {
                expected: BackendId::SparseActiveSet.as_str(),
                got: mem.tag(),
            });
        };
        check_dims(&m.dims, qp.dims())?;

        let start = Instant::now();
        let nc_used = m.map.build(qp, &mut m.st);
        let built = Instant::now();
        let (status, num_iter) = active_set::solve(&m.st.view(nc_used), o, &mut m.kern, work)?;
        let solved = Instant::now();
        m.map
            .extract(&m.dims, m.kern.z, m.kern.y, &m.kern.lam[..nc_used], sol);
        let done = Instant::now();

        sol.info = QpInfo {
            num_iter,
            total_time: done - start,
            condensing_time: Duration::ZERO,
            solve_time: solved - built,
            interface_time: (built - start) + (done - solved),
        };
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (OcpQpDims, OcpQp) {
        let dims = OcpQpDims {
            n: 2,
            nx: vec![1, 1, 1],
            nu: vec![1, 1, 0],
            nbx: vec![1, 0, 0],
            nbu: vec![1, 1, 0],
            ng: vec![0, 0, 0],
        };
        let mut qp = OcpQp::zeros(&dims).unwrap();
        for k in 0..2 {
            let st = &mut qp.stages[k];
            st.A[(0, 0)] = 1.0;
            st.B[(0, 0)] = 1.0;
            st.R[(0, 0)] = 1.0;
            st.idxbu[0] = 0;
            st.lbu[0] = -0.2;
            st.ubu[0] = 0.2;
        }
        qp.stages[0].idxbx[0] = 0;
        qp.stages[0].lbx[0] = 1.0;
        qp.stages[0].ubx[0] = 1.0;
        qp.stages[2].Q[(0, 0)] = 1.0;
        (dims, qp)
    }

    #[test]
    fn test_sparse_ipm_solves_fixture() {
        let (dims, qp) = fixture();
        let backend = SparseIpmBackend;
        let opts = backend.default_options(&dims);
        let mut buf = vec![0.0; backend.memory_words(&dims, &opts).unwrap()];
        let mut arena = Arena::new(&mut buf);
        let mut mem = backend.assign_memory(&dims, &opts, &mut arena).unwrap();
        let mut work = vec![0.0; backend.workspace_words(&dims, &opts).unwrap()];
        let mut sol = OcpQpSolution::new(&dims);
        let status = backend
            .evaluate(&qp, &opts, &mut mem, &mut work, &mut sol)
            .unwrap();
        assert_eq!(status, QpStatus::Success);
        // x0 pinned at 1, controls saturate at -0.2.
        assert!((sol.x[0][0] - 1.0).abs() < 1e-6);
        assert!((sol.u[0][0] + 0.2).abs() < 1e-6);
        assert!((sol.u[1][0] + 0.2).abs() < 1e-6);
        assert!((sol.x[2][0] - 0.6).abs() < 1e-6);
        assert!(sol.info.num_iter > 0);
    }

    #[test]
    fn test_active_set_rejects_eliminated_x0() {
        let (mut dims, _) = fixture();
        dims.nx[0] = 0;
        dims.nbx[0] = 0;
        let backend = SparseActiveSetBackend;
        let opts = backend.default_options(&dims);
        assert!(matches!(
            backend.memory_words(&dims, &opts),
            Err(CoreError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_undersized_arena() {
        let (dims, _) = fixture();
        let backend = SparseIpmBackend;
        let opts = backend.default_options(&dims);
        let need = backend.memory_words(&dims, &opts).unwrap();
        let mut buf = vec![0.0; need - 1];
        let mut arena = Arena::new(&mut buf);
        assert!(matches!(
            backend.assign_memory(&dims, &opts, &mut arena),
            Err(CoreError::ArenaExhausted { .. })
        ));
    }

    #[test]
    fn test_repeat_evaluate_is_deterministic() {
        let (dims, qp) = fixture();
        let backend = SparseIpmBackend;
        let opts = backend.default_options(&dims);
        let mut buf = vec![0.0; backend.memory_words(&dims, &opts).unwrap()];
        let mut arena = Arena::new(&mut buf);
        let mut mem = backend.assign_memory(&dims, &opts, &mut arena).unwrap();
        let mut work = vec![0.0; backend.workspace_words(&dims, &opts).unwrap()];
        let mut sol = OcpQpSolution::new(&dims);
        backend.evaluate(&qp, &opts, &mut mem, &mut work, &mut sol).unwrap();
        let first_iters = sol.info.num_iter;
        let first_u = sol.u[0][0];
        for _ in 0..5 {
            backend.evaluate(&qp, &opts, &mut mem, &mut work, &mut sol).unwrap();
            assert_eq!(sol.info.num_iter, first_iters);
            assert_eq!(sol.u[0][0].to_bits(), first_u.to_bits());
        }
    }
}
