//! Flat dense QP kernels shared by the sparse (stage-unrolled) and
//! dense (condensed) backends.
//!
//! Both kernels solve
//!
//! ```text
//! minimize    1/2 z'H z + g'z
//! subject to  E z = e,   C z <= d
//! ```
//!
//! over slice-backed storage, expose `memory_words` / `workspace_words`
//! sizing that depends only on dimensions, and never allocate inside
//! `solve`.

pub mod active_set;
pub mod ipm;
