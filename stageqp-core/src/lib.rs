//! Multi-stage (OCP-structured) QP solving behind a uniform backend
//! protocol.
//!
//! A backend is configured, sized and instantiated in a strict order:
//! take its [`SolverOptions`] defaults, override fields, size and
//! carve persistent memory out of a caller-provided arena, size a flat
//! workspace, then call `evaluate` as often as wanted — each call
//! rewrites the same buffers and allocates nothing. Backends differ in
//! how they attack the stage structure (unrolling, block condensing,
//! full condensing) and in the kernel underneath (interior point or
//! dual active set), but are interchangeable behind
//! [`backend::OcpQpBackend`] and checked against one
//! backend-independent KKT residual evaluator.

pub mod arena;
pub mod backend;
pub mod condensing;
pub mod dims;
pub mod error;
pub mod kernels;
pub mod linalg;
pub mod options;
pub mod problem;
pub mod residuals;
pub mod solution;
pub mod solvers;
pub mod unroll;

pub use arena::Arena;
pub use backend::{
    BackendId, BackendRegistry, DenseMemory, DenseQpBackend, OcpQpBackend, SolverMemory,
};
pub use dims::OcpQpDims;
pub use error::{CoreError, CoreResult};
pub use options::{
    ActiveSetOptions, FullCondensingOptions, IpmOptions, PartialCondensingOptions, SolverOptions,
};
pub use problem::{DenseQpDims, DenseQpStorage, DenseQpView, OcpQp, OcpStage};
pub use residuals::KktResiduals;
pub use solution::{OcpQpSolution, QpInfo, QpStatus};
