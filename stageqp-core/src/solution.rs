//! Solution container and solve diagnostics.

use std::fmt;
use std::time::Duration;

use nalgebra::DVector;

use crate::dims::OcpQpDims;

/// Outcome of one `evaluate` call.
///
/// These are numerical outcomes, returned as values and propagated
/// unchanged through condensing wrappers. Configuration and
/// precondition problems are [`crate::error::CoreError`]s instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QpStatus {
    /// Converged to the requested tolerance.
    Success,
    /// Iteration limit reached without convergence.
    MaxIter,
    /// Infeasibility detected.
    Infeasible,
    /// Numerical breakdown (stalled step, failed factorization).
    NumericalFailure,
}

impl QpStatus {
    /// True for [`QpStatus::Success`].
    pub fn is_success(self) -> bool {
        matches!(self, QpStatus::Success)
    }
}

impl fmt::Display for QpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QpStatus::Success => write!(f, "success"),
            QpStatus::MaxIter => write!(f, "max iterations"),
            QpStatus::Infeasible => write!(f, "infeasible"),
            QpStatus::NumericalFailure => write!(f, "numerical failure"),
        }
    }
}

/// Per-solve diagnostics, written by every `evaluate` call.
#[derive(Debug, Clone, Copy, Default)]
pub struct QpInfo {
    /// Iterations taken by the innermost kernel.
    pub num_iter: usize,
    /// Wall time of the whole evaluate call.
    pub total_time: Duration,
    /// Time spent condensing and expanding (zero for leaf backends).
    pub condensing_time: Duration,
    /// Time spent inside the QP kernel.
    pub solve_time: Duration,
    /// Time spent converting between problem layouts.
    pub interface_time: Duration,
}

impl QpInfo {
    /// Keep the componentwise minimum of the timing fields; used by the
    /// benchmark driver across repeated solves.
    pub fn track_min(&mut self, other: &QpInfo) {
        self.total_time = self.total_time.min(other.total_time);
        self.condensing_time = self.condensing_time.min(other.condensing_time);
        self.solve_time = self.solve_time.min(other.solve_time);
        self.interface_time = self.interface_time.min(other.interface_time);
    }
}

/// Mutable output buffer for a multi-stage QP solve.
///
/// Sized once from the dimension summary and mutated in place by every
/// `evaluate` call; never resized afterwards.
#[derive(Debug, Clone)]
pub struct OcpQpSolution {
    /// State trajectory (`n + 1` entries).
    pub x: Vec<DVector<f64>>,
    /// Control trajectory (`n + 1` entries, terminal entry empty).
    pub u: Vec<DVector<f64>>,
    /// Dynamics multipliers (`n` entries, `pi[k]` has `nx[k + 1]` rows).
    pub pi: Vec<DVector<f64>>,
    /// Lower inequality multipliers over the stacked
    /// `[state bounds; control bounds; general]` rows per stage.
    pub lam_lo: Vec<DVector<f64>>,
    /// Upper inequality multipliers, same layout.
    pub lam_up: Vec<DVector<f64>>,
    /// Diagnostics of the most recent evaluate.
    pub info: QpInfo,
}

impl OcpQpSolution {
    /// Zeroed solution container matching the dims.
    pub fn new(dims: &OcpQpDims) -> Self {
        let x = (0..=dims.n).map(|k| DVector::zeros(dims.nx[k])).collect();
        let u = (0..=dims.n).map(|k| DVector::zeros(dims.nu[k])).collect();
        let pi = (0..dims.n)
            .map(|k| DVector::zeros(dims.nx[k + 1]))
            .collect();
        let lam_lo = (0..=dims.n).map(|k| DVector::zeros(dims.nc(k))).collect();
        let lam_up = (0..=dims.n).map(|k| DVector::zeros(dims.nc(k))).collect();
        Self {
            x,
            u,
            pi,
            lam_lo,
            lam_up,
            info: QpInfo::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solution_shapes() {
        let dims = OcpQpDims {
            n: 2,
            nx: vec![0, 3, 3],
            nu: vec![2, 2, 0],
            nbx: vec![0, 3, 0],
            nbu: vec![2, 2, 0],
            ng: vec![1, 0, 3],
        };
        let sol = OcpQpSolution::new(&dims);
        assert_eq!(sol.x[0].len(), 0);
        assert_eq!(sol.x[2].len(), 3);
        assert_eq!(sol.pi.len(), 2);
        assert_eq!(sol.pi[0].len(), 3);
        assert_eq!(sol.lam_lo[0].len(), 3);
        assert_eq!(sol.lam_up[2].len(), 3);
    }

    #[test]
    fn test_track_min() {
        let mut a = QpInfo {
            num_iter: 7,
            total_time: Duration::from_micros(10),
            condensing_time: Duration::from_micros(4),
            solve_time: Duration::from_micros(5),
            interface_time: Duration::from_micros(1),
        };
        let b = QpInfo {
            num_iter: 7,
            total_time: Duration::from_micros(8),
            condensing_time: Duration::from_micros(6),
            solve_time: Duration::from_micros(2),
            interface_time: Duration::from_micros(3),
        };
        a.track_min(&b);
        assert_eq!(a.total_time, Duration::from_micros(8));
        assert_eq!(a.condensing_time, Duration::from_micros(4));
        assert_eq!(a.solve_time, Duration::from_micros(2));
        assert_eq!(a.interface_time, Duration::from_micros(1));
    }
}
