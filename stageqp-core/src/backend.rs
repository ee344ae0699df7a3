//! The backend protocol: a uniform five-operation lifecycle over a
//! closed set of QP solver backends.
//!
//! The lifecycle is strictly ordered: `default_options` (override
//! fields as needed, then treat as immutable), `memory_words` /
//! `assign_memory` (persistent state, carved once from a caller
//! arena), `workspace_words` (flat per-solve scratch), `evaluate`
//! (repeatable, allocation-free). Sizing depends only on dims and
//! options, never on the numerical data.
//!
//! Tag mismatches between a backend and the options or memory it is
//! handed are configuration errors, reported before any numerical
//! work. Numerical outcomes are [`QpStatus`] values.

use std::fmt;
use std::str::FromStr;

use crate::arena::Arena;
use crate::dims::OcpQpDims;
use crate::error::{CoreError, CoreResult};
use crate::kernels::active_set::ActiveSetMemory;
use crate::kernels::ipm::IpmMemory;
use crate::options::SolverOptions;
use crate::problem::{DenseQpDims, DenseQpView, OcpQp};
use crate::solution::{OcpQpSolution, QpStatus};
use crate::solvers::dense::{DenseActiveSetBackend, DenseIpmBackend};
use crate::solvers::full::{FullCondensingBackend, FullCondensingMemory};
use crate::solvers::partial::{PartialCondensingBackend, PartialCondensingMemory};
use crate::solvers::sparse::{
    SparseActiveSetBackend, SparseActiveSetMemory, SparseIpmBackend, SparseIpmMemory,
};

/// Identifier of one backend in the closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendId {
    /// Stage-unrolled interior point.
    SparseIpm,
    /// Stage-unrolled dual active set.
    SparseActiveSet,
    /// Single dense QP, interior point.
    DenseIpm,
    /// Single dense QP, dual active set.
    DenseActiveSet,
    /// Block condensing wrapper around a sparse backend.
    PartialCondensing,
    /// Full condensing wrapper around a dense backend.
    FullCondensing,
}

impl BackendId {
    /// Every backend, in registry order.
    pub const ALL: [BackendId; 6] = [
        BackendId::SparseIpm,
        BackendId::SparseActiveSet,
        BackendId::DenseIpm,
        BackendId::DenseActiveSet,
        BackendId::PartialCondensing,
        BackendId::FullCondensing,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BackendId::SparseIpm => "sparse-ipm",
            BackendId::SparseActiveSet => "sparse-active-set",
            BackendId::DenseIpm => "dense-ipm",
            BackendId::DenseActiveSet => "dense-active-set",
            BackendId::PartialCondensing => "partial-condensing",
            BackendId::FullCondensing => "full-condensing",
        }
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BackendId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| CoreError::InvalidConfig(format!("unknown backend '{}'", s)))
    }
}

/// Persistent state of a multi-stage backend, one variant per backend.
#[derive(Debug)]
pub enum SolverMemory<'a> {
    SparseIpm(SparseIpmMemory<'a>),
    SparseActiveSet(SparseActiveSetMemory<'a>),
    PartialCondensing(PartialCondensingMemory<'a>),
    FullCondensing(FullCondensingMemory<'a>),
}

impl SolverMemory<'_> {
    /// Name of the carried variant.
    pub fn tag(&self) -> &'static str {
        match self {
            SolverMemory::SparseIpm(_) => BackendId::SparseIpm.as_str(),
            SolverMemory::SparseActiveSet(_) => BackendId::SparseActiveSet.as_str(),
            SolverMemory::PartialCondensing(_) => BackendId::PartialCondensing.as_str(),
            SolverMemory::FullCondensing(_) => BackendId::FullCondensing.as_str(),
        }
    }
}

/// Persistent state of a dense backend.
#[derive(Debug)]
pub enum DenseMemory<'a> {
    Ipm(IpmMemory<'a>),
    ActiveSet(ActiveSetMemory<'a>),
}

impl DenseMemory<'_> {
    pub fn tag(&self) -> &'static str {
        match self {
            DenseMemory::Ipm(_) => BackendId::DenseIpm.as_str(),
            DenseMemory::ActiveSet(_) => BackendId::DenseActiveSet.as_str(),
        }
    }
}

/// A multi-stage QP backend behind the five-operation protocol.
pub trait OcpQpBackend {
    fn id(&self) -> BackendId;

    /// Deterministic default options for this backend.
    fn default_options(&self, dims: &OcpQpDims) -> SolverOptions;

    /// Reject unsupported (dims, options) combinations. Called by the
    /// sizing and assignment operations, and available to callers that
    /// want to fail early.
    fn validate_config(&self, dims: &OcpQpDims, opts: &SolverOptions) -> CoreResult<()>;

    /// Arena words of persistent state.
    fn memory_words(&self, dims: &OcpQpDims, opts: &SolverOptions) -> CoreResult<usize>;

    /// Flat scratch words per evaluate.
    fn workspace_words(&self, dims: &OcpQpDims, opts: &SolverOptions) -> CoreResult<usize>;

    /// Carve the persistent state out of the arena.
    fn assign_memory<'a>(
        &self,
        dims: &OcpQpDims,
        opts: &SolverOptions,
        arena: &mut Arena<'a>,
    ) -> CoreResult<SolverMemory<'a>>;

    /// Solve, filling the solution and its diagnostics. Never
    /// allocates; repeatable with the same memory and workspace.
    fn evaluate(
        &self,
        qp: &OcpQp,
        opts: &SolverOptions,
        mem: &mut SolverMemory<'_>,
        work: &mut [f64],
        sol: &mut OcpQpSolution,
    ) -> CoreResult<QpStatus>;
}

/// A flat dense QP backend; the inner solver of full condensing.
pub trait DenseQpBackend {
    fn id(&self) -> BackendId;

    fn default_options(&self) -> SolverOptions;

    fn memory_words(&self, dims: &DenseQpDims, opts: &SolverOptions) -> CoreResult<usize>;

    fn workspace_words(&self, dims: &DenseQpDims, opts: &SolverOptions) -> CoreResult<usize>;

    fn assign_memory<'a>(
        &self,
        dims: &DenseQpDims,
        opts: &SolverOptions,
        arena: &mut Arena<'a>,
    ) -> CoreResult<DenseMemory<'a>>;

    /// Solve the dense QP. Returns the status and iteration count; the
    /// solution is read out of the memory handle.
    fn evaluate(
        &self,
        qp: &DenseQpView<'_>,
        opts: &SolverOptions,
        mem: &mut DenseMemory<'_>,
        work: &mut [f64],
    ) -> CoreResult<(QpStatus, usize)>;
}

type OcpCtor = fn() -> Box<dyn OcpQpBackend>;
type DenseCtor = fn() -> Box<dyn DenseQpBackend>;

/// Runtime map from backend identifier to constructor.
///
/// The default registry carries the whole closed set; asking for an
/// identifier registered under the other protocol (or not at all) is
/// an [`CoreError::UnknownBackend`].
pub struct BackendRegistry {
    ocp: Vec<(BackendId, OcpCtor)>,
    dense: Vec<(BackendId, DenseCtor)>,
}

impl BackendRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            ocp: Vec::new(),
            dense: Vec::new(),
        }
    }

    /// Registry with every built-in backend.
    pub fn with_defaults() -> Self {
        let mut reg = Self::new();
        reg.register_ocp(BackendId::SparseIpm, || Box::new(SparseIpmBackend));
        reg.register_ocp(BackendId::SparseActiveSet, || {
            Box::new(SparseActiveSetBackend)
        });
        reg.register_ocp(BackendId::PartialCondensing, || {
            Box::new(PartialCondensingBackend)
        });
        reg.register_ocp(BackendId::FullCondensing, || {
            Box::new(FullCondensingBackend)
        });
        reg.register_dense(BackendId::DenseIpm, || Box::new(DenseIpmBackend));
        reg.register_dense(BackendId::DenseActiveSet, || Box::new(DenseActiveSetBackend));
        reg
    }

    pub fn register_ocp(&mut self, id: BackendId, ctor: OcpCtor) {
        self.ocp.retain(|(other, _)| *other != id);
        self.ocp.push((id, ctor));
    }

    pub fn register_dense(&mut self, id: BackendId, ctor: DenseCtor) {
        self.dense.retain(|(other, _)| *other != id);
        self.dense.push((id, ctor));
    }

    /// Instantiate a multi-stage backend.
    pub fn ocp(&self, id: BackendId) -> CoreResult<Box<dyn OcpQpBackend>> {
        self.ocp
            .iter()
            .find(|(other, _)| *other == id)
            .map(|(_, ctor)| ctor())
            .ok_or(CoreError::UnknownBackend(id))
    }

    /// Instantiate a dense backend.
    pub fn dense(&self, id: BackendId) -> CoreResult<Box<dyn DenseQpBackend>> {
        self.dense
            .iter()
            .find(|(other, _)| *other == id)
            .map(|(_, ctor)| ctor())
            .ok_or(CoreError::UnknownBackend(id))
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_round_trip() {
        for id in BackendId::ALL {
            assert_eq!(id.as_str().parse::<BackendId>().unwrap(), id);
        }
        assert!("hpipm".parse::<BackendId>().is_err());
    }

    #[test]
    fn test_registry_lookup() {
        let reg = BackendRegistry::with_defaults();
        assert_eq!(reg.ocp(BackendId::SparseIpm).unwrap().id(), BackendId::SparseIpm);
        assert_eq!(reg.dense(BackendId::DenseIpm).unwrap().id(), BackendId::DenseIpm);
        // Dense backends are not multi-stage backends and vice versa.
        assert!(matches!(
            reg.ocp(BackendId::DenseIpm),
            Err(CoreError::UnknownBackend(BackendId::DenseIpm))
        ));
        assert!(matches!(
            reg.dense(BackendId::SparseIpm),
            Err(CoreError::UnknownBackend(BackendId::SparseIpm))
        ));
    }

    #[test]
    fn test_registry_override() {
        let mut reg = BackendRegistry::with_defaults();
        reg.register_ocp(BackendId::SparseIpm, || Box::new(SparseIpmBackend));
        assert_eq!(reg.ocp.iter().filter(|(id, _)| *id == BackendId::SparseIpm).count(), 1);
    }
}
