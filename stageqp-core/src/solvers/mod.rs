//! Backend implementations behind the five-operation protocol.
//!
//! Sparse backends unroll the staged problem and hand it to a kernel;
//! the condensing backends reduce it first (block-wise or fully) and
//! wrap an inner backend. Dense backends expose the kernels over flat
//! problems, for standalone use and as full condensing inners.

pub mod dense;
pub mod full;
pub mod partial;
pub mod sparse;
