//! Dense QP backends: thin protocol adapters over the two kernels.

use crate::arena::Arena;
use crate::backend::{BackendId, DenseMemory, DenseQpBackend};
use crate::error::{CoreError, CoreResult};
use crate::kernels::{active_set, ipm};
use crate::options::{ActiveSetOptions, IpmOptions, SolverOptions};
use crate::problem::{DenseQpDims, DenseQpView};
use crate::solution::QpStatus;

/// Interior-point backend over a flat dense QP.
#[derive(Debug, Clone, Copy)]
pub struct DenseIpmBackend;

impl DenseQpBackend for DenseIpmBackend {
    fn id(&self) -> BackendId {
        BackendId::DenseIpm
    }

    fn default_options(&self) -> SolverOptions {
        SolverOptions::Ipm(IpmOptions::default())
    }

    fn memory_words(&self, dims: &DenseQpDims, opts: &SolverOptions) -> CoreResult<usize> {
        opts.as_ipm()?;
        Ok(ipm::memory_words(dims))
    }

    fn workspace_words(&self, dims: &DenseQpDims, opts: &SolverOptions) -> CoreResult<usize> {
        opts.as_ipm()?;
        Ok(ipm::workspace_words(dims))
    }

    fn assign_memory<'a>(
        &self,
        dims: &DenseQpDims,
        opts: &SolverOptions,
        arena: &mut Arena<'a>,
    ) -> CoreResult<DenseMemory<'a>> {
        opts.as_ipm()?;
        Ok(DenseMemory::Ipm(ipm::assign_memory(dims, arena)?))
    }

    fn evaluate(
        &self,
        qp: &DenseQpView<'_>,
        opts: &SolverOptions,
        mem: &mut DenseMemory<'_>,
        work: &mut [f64],
    ) -> CoreResult<(QpStatus, usize)> {
        let o = opts.as_ipm()?;
        let DenseMemory::Ipm(m) = mem else {
            return Err(CoreError::MemoryMismatch {
                expected: BackendId::DenseIpm.as_str(),
                got: mem.tag(),
            });
        };
        ipm::solve(qp, o, m, work)
    }
}

/// Dual active-set backend over a flat dense QP.
#[derive(Debug, Clone, Copy)]
pub struct DenseActiveSetBackend;

impl DenseQpBackend for DenseActiveSetBackend {
    fn id(&self) -> BackendId {
        BackendId::DenseActiveSet
    }

    fn default_options(&self) -> SolverOptions {
        SolverOptions::ActiveSet(ActiveSetOptions::default())
    }

    fn memory_words(&self, dims: &DenseQpDims, opts: &SolverOptions) -> CoreResult<usize> {
        opts.as_active_set()?;
        Ok(active_set::memory_words(dims))
    }

    fn workspace_words(&self, dims: &DenseQpDims, opts: &SolverOptions) -> CoreResult<usize> {
        opts.as_active_set()?;
        Ok(active_set::workspace_words(dims))
    }

    fn assign_memory<'a>(
        &self,
        dims: &DenseQpDims,
        opts: &SolverOptions,
        arena: &mut Arena<'a>,
    ) -> CoreResult<DenseMemory<'a>> {
        opts.as_active_set()?;
        Ok(DenseMemory::ActiveSet(active_set::assign_memory(
            dims, arena,
        )?))
    }

    fn evaluate(
        &self,
        qp: &DenseQpView<'_>,
        opts: &SolverOptions,
        mem: &mut DenseMemory<'_>,
        work: &mut [f64],
    ) -> CoreResult<(QpStatus, usize)> {
        let o = opts.as_active_set()?;
        let DenseMemory::ActiveSet(m) = mem else {
            return Err(CoreError::MemoryMismatch {
                expected: BackendId::DenseActiveSet.as_str(),
                got: mem.tag(),
            });
        };
        active_set::solve(qp, o, m, work)
    }
}
