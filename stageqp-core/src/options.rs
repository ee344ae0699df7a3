//! Backend options as a tagged sum type.
//!
//! Options are created by a backend's `default_options`, selectively
//! overridden by the caller, and then treated as immutable: the sizing
//! functions and `assign_memory` depend on them. Accessors are
//! tag-checked; reading a variant through the wrong accessor is a
//! configuration error, never a reinterpretation.

use crate::error::{CoreError, CoreResult};

/// Interior-point kernel options.
#[derive(Debug, Clone)]
pub struct IpmOptions {
    /// Maximum interior-point iterations.
    pub max_iter: usize,
    /// Convergence tolerance on residuals and the barrier parameter.
    pub tol: f64,
    /// Static diagonal regularization added to the condensed Hessian.
    pub static_reg: f64,
    /// Start from the iterate cached in the memory handle instead of a
    /// cold start. Off by default so repeated solves are identical.
    pub warm_start: bool,
}

impl Default for IpmOptions {
    fn default() -> Self {
        Self {
            max_iter: 100,
            tol: 1e-10,
            static_reg: 1e-10,
            warm_start: false,
        }
    }
}

/// Active-set kernel options.
#[derive(Debug, Clone)]
pub struct ActiveSetOptions {
    /// Maximum working-set changes.
    pub max_iter: usize,
    /// Diagonal regularization added to the Hessian before factorizing.
    pub hessian_reg: f64,
    /// Constraint violation tolerance.
    pub tol: f64,
}

impl Default for ActiveSetOptions {
    fn default() -> Self {
        Self {
            max_iter: 1000,
            hessian_reg: 0.0,
            tol: 1e-10,
        }
    }
}

/// Partial condensing wrapper options.
#[derive(Debug, Clone)]
pub struct PartialCondensingOptions {
    /// Reduced horizon length N2 (`1 <= n2 <= N`).
    pub n2: usize,
    /// Options forwarded to the inner sparse backend.
    pub inner: Box<SolverOptions>,
}

/// Full condensing wrapper options.
#[derive(Debug, Clone)]
pub struct FullCondensingOptions {
    /// Options forwarded to the inner dense backend.
    pub inner: Box<SolverOptions>,
}

/// Tagged options value, one variant per backend family.
#[derive(Debug, Clone)]
pub enum SolverOptions {
    /// Interior-point backends (sparse or dense).
    Ipm(IpmOptions),
    /// Active-set backends (sparse or dense).
    ActiveSet(ActiveSetOptions),
    /// Partial condensing wrapper.
    PartialCondensing(PartialCondensingOptions),
    /// Full condensing wrapper.
    FullCondensing(FullCondensingOptions),
}

macro_rules! accessor {
    ($get:ident, $get_mut:ident, $variant:ident, $ty:ty, $name:literal) => {
        /// Tag-checked access to the variant named in the method.
        pub fn $get(&self) -> CoreResult<&$ty> {
            match self {
                SolverOptions::$variant(o) => Ok(o),
                other => Err(CoreError::OptionsMismatch {
                    expected: $name,
                    got: other.tag(),
                }),
            }
        }

        /// Mutable tag-checked access.
        pub fn $get_mut(&mut self) -> CoreResult<&mut $ty> {
            match self {
                SolverOptions::$variant(o) => Ok(o),
                other => Err(CoreError::OptionsMismatch {
                    expected: $name,
                    got: other.tag(),
                }),
            }
        }
    };
}

impl SolverOptions {
    /// Name of the carried variant.
    pub fn tag(&self) -> &'static str {
        match self {
            SolverOptions::Ipm(_) => "ipm",
            SolverOptions::ActiveSet(_) => "active-set",
            SolverOptions::PartialCondensing(_) => "partial-condensing",
            SolverOptions::FullCondensing(_) => "full-condensing",
        }
    }

    accessor!(as_ipm, as_ipm_mut, Ipm, IpmOptions, "ipm");
    accessor!(
        as_active_set,
        as_active_set_mut,
        ActiveSet,
        ActiveSetOptions,
        "active-set"
    );
    accessor!(
        as_partial_condensing,
        as_partial_condensing_mut,
        PartialCondensing,
        PartialCondensingOptions,
        "partial-condensing"
    );
    accessor!(
        as_full_condensing,
        as_full_condensing_mut,
        FullCondensing,
        FullCondensingOptions,
        "full-condensing"
    );

    /// Innermost kernel iteration limit, wherever it is nested.
    pub fn set_kernel_max_iter(&mut self, max_iter: usize) {
        match self {
            SolverOptions::Ipm(o) => o.max_iter = max_iter,
            SolverOptions::ActiveSet(o) => o.max_iter = max_iter,
            SolverOptions::PartialCondensing(o) => o.inner.set_kernel_max_iter(max_iter),
            SolverOptions::FullCondensing(o) => o.inner.set_kernel_max_iter(max_iter),
        }
    }

    /// Enable or disable warm starting on the innermost kernel, where
    /// the kernel supports it.
    pub fn set_warm_start(&mut self, warm: bool) {
        match self {
            SolverOptions::Ipm(o) => o.warm_start = warm,
            SolverOptions::ActiveSet(_) => {}
            SolverOptions::PartialCondensing(o) => o.inner.set_warm_start(warm),
            SolverOptions::FullCondensing(o) => o.inner.set_warm_start(warm),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_checked_access() {
        let opts = SolverOptions::Ipm(IpmOptions::default());
        assert!(opts.as_ipm().is_ok());
        let err = opts.as_active_set().unwrap_err();
        match err {
            CoreError::OptionsMismatch { expected, got } => {
                assert_eq!(expected, "active-set");
                assert_eq!(got, "ipm");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_nested_kernel_override() {
        let mut opts = SolverOptions::PartialCondensing(PartialCondensingOptions {
            n2: 3,
            inner: Box::new(SolverOptions::Ipm(IpmOptions::default())),
        });
        opts.set_kernel_max_iter(30);
        opts.set_warm_start(true);
        let inner = opts.as_partial_condensing().unwrap().inner.as_ipm().unwrap();
        assert_eq!(inner.max_iter, 30);
        assert!(inner.warm_start);
    }
}
