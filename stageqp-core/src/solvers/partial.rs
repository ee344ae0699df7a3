//! Partial condensing backend: block-condenses the horizon and hands
//! the reduced staged problem to an inner sparse backend. One wrapping
//! level only; wrapper options inside wrapper options are rejected.

use std::time::Instant;

use crate::arena::Arena;
use crate::backend::{BackendId, OcpQpBackend, SolverMemory};
use crate::condensing::PartialCondensingMap;
use crate::dims::OcpQpDims;
use crate::error::{CoreError, CoreResult};
use crate::options::{IpmOptions, PartialCondensingOptions, SolverOptions};
use crate::problem::OcpQp;
use crate::solution::{OcpQpSolution, QpInfo, QpStatus};
use crate::solvers::sparse::{SparseActiveSetBackend, SparseIpmBackend};

/// Persistent state: the condensing maps, the reduced problem and
/// solution containers (rewritten in place per evaluate), and the
/// inner backend's memory.
#[derive(Debug)]
pub struct PartialCondensingMemory<'a> {
    dims: OcpQpDims,
    map: PartialCondensingMap,
    red: OcpQp,
    red_sol: OcpQpSolution,
    inner: Box<SolverMemory<'a>>,
}

/// Block condensing wrapper around a sparse backend.
#[derive(Debug, Clone, Copy)]
pub struct PartialCondensingBackend;

/// Resolve the inner sparse backend from the nested options tag.
fn inner_backend(opts: &PartialCondensingOptions) -> CoreResult<Box<dyn OcpQpBackend>> {
    match &*opts.inner {
        SolverOptions::Ipm(_) => Ok(Box::new(SparseIpmBackend)),
        SolverOptions::ActiveSet(_) => Ok(Box::new(SparseActiveSetBackend)),
        other => Err(CoreError::InvalidConfig(format!(
            "partial condensing cannot wrap '{}' options",
            other.tag()
        ))),
    }
}

impl OcpQpBackend for PartialCondensingBackend {
    fn id(&self) -> BackendId {
        BackendId::PartialCondensing
    }

    fn default_options(&self, dims: &OcpQpDims) -> SolverOptions {
        SolverOptions::PartialCondensing(PartialCondensingOptions {
            n2: dims.n.max(1),
            inner: Box::new(SolverOptions::Ipm(IpmOptions::default())),
        })
    }

    fn validate_config(&self, dims: &OcpQpDims, opts: &SolverOptions) -> CoreResult<()> {
        dims.validate()?;
        let pc = opts.as_partial_condensing()?;
        let inner = inner_backend(pc)?;
        let map = PartialCondensingMap::new(dims, pc.n2)?;
        inner.validate_config(map.reduced_dims(), &pc.inner)
    }

    fn memory_words(&self, dims: &OcpQpDims, opts: &SolverOptions) -> CoreResult<usize> {
        let pc = opts.as_partial_condensing()?;
        let inner = inner_backend(pc)?;
        let map = PartialCondensingMap::new(dims, pc.n2)?;
        inner.memory_words(map.reduced_dims(), &pc.inner)
    }

    fn workspace_words(&self, dims: &OcpQpDims, opts: &SolverOptions) -> CoreResult<usize> {
        let pc = opts.as_partial_condensing()?;
        let inner = inner_backend(pc)?;
        let map = PartialCondensingMap::new(dims, pc.n2)?;
        inner.workspace_words(map.reduced_dims(), &pc.inner)
    }

    fn assign_memory<'a>(
        &self,
        dims: &OcpQpDims,
        opts: &SolverOptions,
        arena: &mut Arena<'a>,
    ) -> CoreResult<SolverMemory<'a>> {
        self.validate_config(dims, opts)?;
        let pc = opts.as_partial_condensing()?;
        let inner = inner_backend(pc)?;
        let map = PartialCondensingMap::new(dims, pc.n2)?;
        let red = OcpQp::zeros(map.reduced_dims())?;
        let red_sol = OcpQpSolution::new(map.reduced_dims());
        let inner_mem = inner.assign_memory(map.reduced_dims(), &pc.inner, arena)?;
        Ok(SolverMemory::PartialCondensing(PartialCondensingMemory {
            dims: dims.clone(),
            map,
            red,
            red_sol,
            inner: Box::new(inner_mem),
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
        let pc = opts.as_partial_condensing()?;
        let inner = inner_backend(pc)?;
        let SolverMemory::PartialCondensing(m) = mem else {
            return Err(CoreError::MemoryMismatch {
                expected: BackendId::PartialCondensing.as_str(),
                got: mem.tag(),
            });
        };
        if &m.dims != qp.dims() {
            return Err(CoreError::DimensionMismatch(
                "problem dims differ from the dims this memory was assigned for".into(),
            ));
        }

        let start = Instant::now();
        m.map.condense(qp, &mut m.red);
        let condensed = Instant::now();
        let status = inner.evaluate(&m.red, &pc.inner, &mut m.inner, work, &mut m.red_sol)?;
        let solved = Instant::now();
        m.map.expand(qp, &m.red_sol, sol);
        let done = Instant::now();

        sol.info = QpInfo {
            num_iter: m.red_sol.info.num_iter,
            total_time: done - start,
            condensing_time: (condensed - start) + (done - solved),
            solve_time: m.red_sol.info.solve_time,
            interface_time: m.red_sol.info.interface_time,
        };
        Ok(status)
    }
}
