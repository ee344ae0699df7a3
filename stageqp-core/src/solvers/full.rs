//! Full condensing backend: eliminates every state and hands the
//! resulting flat dense QP to an inner dense backend.

use std::time::{Duration, Instant};

use crate::arena::Arena;
use crate::backend::{BackendId, DenseMemory, DenseQpBackend, OcpQpBackend, SolverMemory};
use crate::condensing::FullCondensingMap;
use crate::dims::OcpQpDims;
use crate::error::{CoreError, CoreResult};
use crate::options::{FullCondensingOptions, IpmOptions, SolverOptions};
use crate::problem::{DenseQpStorage, OcpQp};
use crate::solution::{OcpQpSolution, QpInfo, QpStatus};
use crate::solvers::dense::{DenseActiveSetBackend, DenseIpmBackend};

/// Persistent state: the condensing map, the dense problem storage,
/// and the inner kernel's memory.
#[derive(Debug)]
pub struct FullCondensingMemory<'a> {
    dims: OcpQpDims,
    map: FullCondensingMap,
    st: DenseQpStorage<'a>,
    inner: DenseMemory<'a>,
}

/// Full condensing wrapper around a dense backend.
#[derive(Debug, Clone, Copy)]
pub struct FullCondensingBackend;

fn inner_backend(opts: &FullCondensingOptions) -> CoreResult<Box<dyn DenseQpBackend>> {
    match &*opts.inner {
        SolverOptions::Ipm(_) => Ok(Box::new(DenseIpmBackend)),
        SolverOptions::ActiveSet(_) => Ok(Box::new(DenseActiveSetBackend)),
        other => Err(CoreError::InvalidConfig(format!(
            "full condensing cannot wrap '{}' options",
            other.tag()
        ))),
    }
}

impl OcpQpBackend for FullCondensingBackend {
    fn id(&self) -> BackendId {
        BackendId::FullCondensing
    }

    fn default_options(&self, _dims: &OcpQpDims) -> SolverOptions {
        SolverOptions::FullCondensing(FullCondensingOptions {
            inner: Box::new(SolverOptions::Ipm(IpmOptions::default())),
        })
    }

    fn validate_config(&self, dims: &OcpQpDims, opts: &SolverOptions) -> CoreResult<()> {
        dims.validate()?;
        let fc = opts.as_full_condensing()?;
        inner_backend(fc)?;
        FullCondensingMap::new(dims)?;
        Ok(())
    }

    fn memory_words(&self, dims: &OcpQpDims, opts: &SolverOptions) -> CoreResult<usize> {
        let fc = opts.as_full_condensing()?;
        let inner = inner_backend(fc)?;
        let dd = FullCondensingMap::new(dims)?.dense_dims();
        Ok(dd.words() + inner.memory_words(&dd, &fc.inner)?)
    }

    fn workspace_words(&self, dims: &OcpQpDims, opts: &SolverOptions) -> CoreResult<usize> {
        let fc = opts.as_full_condensing()?;
        let inner = inner_backend(fc)?;
        let dd = FullCondensingMap::new(dims)?.dense_dims();
        inner.workspace_words(&dd, &fc.inner)
    }

    fn assign_memory<'a>(
        &self,
        dims: &OcpQpDims,
        opts: &SolverOptions,
        arena: &mut Arena<'a>,
    ) -> CoreResult<SolverMemory<'a>> {
        self.validate_config(dims, opts)?;
        let fc = opts.as_full_condensing()?;
        let inner = inner_backend(fc)?;
        let map = FullCondensingMap::new(dims)?;
        let dd = map.dense_dims();
        Ok(SolverMemory::FullCondensing(FullCondensingMemory {
            dims: dims.clone(),
            map,
            st: DenseQpStorage::assign(dd, arena)?,
            inner: inner.assign_memory(&dd, &fc.inner, arena)?,
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
        let fc = opts.as_full_condensing()?;
        let inner = inner_backend(fc)?;
        let SolverMemory::FullCondensing(m) = mem else {
            return Err(CoreError::MemoryMismatch {
                expected: BackendId::FullCondensing.as_str(),
                got: mem.tag(),
            });
        };
        if &m.dims != qp.dims() {
            return Err(CoreError::DimensionMismatch(
                "problem dims differ from the dims this memory was assigned for".into(),
            ));
        }

        let start = Instant::now();
        let nc_used = m.map.build(qp, &mut m.st);
        let condensed = Instant::now();
        let (status, num_iter) =
            inner.evaluate(&m.st.view(nc_used), &fc.inner, &mut m.inner, work)?;
        let solved = Instant::now();
        let (z, lam) = match &m.inner {
            DenseMemory::Ipm(k) => (&*k.z, &*k.lam),
            DenseMemory::ActiveSet(k) => (&*k.z, &*k.lam),
        };
        m.map.extract(qp, z, &lam[..nc_used], sol);
        let done = Instant::now();

        sol.info = QpInfo {
            num_iter,
            total_time: done - start,
            condensing_time: (condensed - start) + (done - solved),
            solve_time: solved - condensed,
            interface_time: Duration::ZERO,
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
            nx: vec![0, 1, 1],
            nu: vec![1, 1, 0],
            nbx: vec![0, 0, 0],
            nbu: vec![1, 1, 0],
            ng: vec![0, 0, 0],
        };
        let mut qp = OcpQp::zeros(&dims).unwrap();
        for k in 0..2 {
            let st = &mut qp.stages[k];
            if k > 0 {
                st.A[(0, 0)] = 1.0;
            }
            st.B[(0, 0)] = 1.0;
            st.R[(0, 0)] = 1.0;
            st.idxbu[0] = 0;
            st.lbu[0] = -0.2;
            st.ubu[0] = 0.2;
        }
        // Initial state eliminated: x1 = u0 + 1 enters through b.
        qp.stages[0].b[0] = 1.0;
        qp.stages[2].Q[(0, 0)] = 1.0;
        (dims, qp)
    }

    #[test]
    fn test_full_condensing_with_eliminated_x0() {
        let (dims, qp) = fixture();
        let backend = FullCondensingBackend;
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
        // Same optimum as the pinned-state fixture: both controls
        // saturate at -0.2, x2 = 0.6.
        assert!((sol.u[0][0] + 0.2).abs() < 1e-6);
        assert!((sol.u[1][0] + 0.2).abs() < 1e-6);
        assert!((sol.x[2][0] - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_rejects_wrapper_inner() {
        let (dims, _) = fixture();
        let backend = FullCondensingBackend;
        let opts = SolverOptions::FullCondensing(FullCondensingOptions {
            inner: Box::new(backend.default_options(&dims)),
        });
        assert!(matches!(
            backend.validate_config(&dims, &opts),
            Err(CoreError::InvalidConfig(_))
        ));
    }
}
