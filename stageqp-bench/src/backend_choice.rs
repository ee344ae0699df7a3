//! CLI-level backend selection.
//!
//! Maps command-line names onto registry lookups plus an options value.
//! The dense kernels have no staged protocol of their own, so
//! `dense-ipm` and `dense-active-set` run behind the full condensing
//! wrapper with the matching inner kernel pinned.

use clap::ValueEnum;

use stageqp_core::{
    ActiveSetOptions, BackendId, BackendRegistry, CoreResult, IpmOptions, OcpQpBackend, OcpQpDims,
    SolverOptions,
};

/// Inner kernel for the condensing wrappers.
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum KernelChoice {
    Ipm,
    ActiveSet,
}

impl KernelChoice {
    pub fn options(self) -> SolverOptions {
        match self {
            KernelChoice::Ipm => SolverOptions::Ipm(IpmOptions::default()),
            KernelChoice::ActiveSet => SolverOptions::ActiveSet(ActiveSetOptions::default()),
        }
    }
}

/// One benchmark row.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendChoice {
    SparseIpm,
    SparseActiveSet,
    PartialCondensing,
    FullCondensing,
    DenseIpm,
    DenseActiveSet,
}

impl BackendChoice {
    pub fn all() -> Vec<BackendChoice> {
        vec![
            BackendChoice::SparseIpm,
            BackendChoice::SparseActiveSet,
            BackendChoice::PartialCondensing,
            BackendChoice::FullCondensing,
            BackendChoice::DenseIpm,
            BackendChoice::DenseActiveSet,
        ]
    }

    pub fn label(self) -> &'static str {
        match self {
            BackendChoice::SparseIpm => "sparse-ipm",
            BackendChoice::SparseActiveSet => "sparse-active-set",
            BackendChoice::PartialCondensing => "partial-condensing",
            BackendChoice::FullCondensing => "full-condensing",
            BackendChoice::DenseIpm => "dense-ipm",
            BackendChoice::DenseActiveSet => "dense-active-set",
        }
    }

    /// True for the rows that sweep over the `--n2` list.
    pub fn sweeps_n2(self) -> bool {
        matches!(self, BackendChoice::PartialCondensing)
    }

    /// Look the backend up in the registry and build its options.
    ///
    /// `n2` is only read by the partial condensing row; `kernel` only
    /// by the rows that leave the inner kernel open.
    pub fn resolve(
        self,
        registry: &BackendRegistry,
        dims: &OcpQpDims,
        kernel: KernelChoice,
        n2: usize,
    ) -> CoreResult<(Box<dyn OcpQpBackend>, SolverOptions)> {
        let (id, inner) = match self {
            BackendChoice::SparseIpm => (BackendId::SparseIpm, None),
            BackendChoice::SparseActiveSet => (BackendId::SparseActiveSet, None),
            BackendChoice::PartialCondensing => (BackendId::PartialCondensing, Some(kernel)),
            BackendChoice::FullCondensing => (BackendId::FullCondensing, Some(kernel)),
            BackendChoice::DenseIpm => (BackendId::FullCondensing, Some(KernelChoice::Ipm)),
            BackendChoice::DenseActiveSet => {
                (BackendId::FullCondensing, Some(KernelChoice::ActiveSet))
            }
        };
        let backend = registry.ocp(id)?;
        let mut opts = backend.default_options(dims);
        match &mut opts {
            SolverOptions::PartialCondensing(pc) => {
                pc.n2 = n2;
                if let Some(kernel) = inner {
                    pc.inner = Box::new(kernel.options());
                }
            }
            SolverOptions::FullCondensing(fc) => {
                if let Some(kernel) = inner {
                    fc.inner = Box::new(kernel.options());
                }
            }
            _ => {}
        }
        Ok((backend, opts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims() -> OcpQpDims {
        OcpQpDims {
            n: 5,
            nx: vec![2; 6],
            nu: vec![1, 1, 1, 1, 1, 0],
            nbx: vec![2, 0, 0, 0, 0, 0],
            nbu: vec![1, 1, 1, 1, 1, 0],
            ng: vec![0; 6],
        }
    }

    #[test]
    fn test_dense_rows_pin_the_inner_kernel() {
        let registry = BackendRegistry::with_defaults();
        let (backend, opts) = BackendChoice::DenseActiveSet
            .resolve(&registry, &dims(), KernelChoice::Ipm, 0)
            .unwrap();
        assert_eq!(backend.id(), BackendId::FullCondensing);
        let fc = opts.as_full_condensing().unwrap();
        assert!(fc.inner.as_active_set().is_ok());
    }

    #[test]
    fn test_partial_row_takes_n2_and_kernel() {
        let registry = BackendRegistry::with_defaults();
        let (_, opts) = BackendChoice::PartialCondensing
            .resolve(&registry, &dims(), KernelChoice::ActiveSet, 3)
            .unwrap();
        let pc = opts.as_partial_condensing().unwrap();
        assert_eq!(pc.n2, 3);
        assert!(pc.inner.as_active_set().is_ok());
    }
}
