//! Per-stage dimension summary of a multi-stage QP.

use crate::error::{CoreError, CoreResult};

/// Dimension summary of an OCP-structured QP over stages `0..=n`.
///
/// Derived once from the problem data and immutable afterwards. All
/// sizing functions of the backend protocol are pure functions of this
/// summary (and of finalized options), never of the numerical data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcpQpDims {
    /// Horizon length N. Stages run `0..=n`; dynamics run `0..n`.
    pub n: usize,
    /// States per stage (`n + 1` entries). `nx[0]` may be zero when the
    /// initial state has been eliminated from the problem.
    pub nx: Vec<usize>,
    /// Controls per stage (`n + 1` entries, `nu[n] == 0`).
    pub nu: Vec<usize>,
    /// Box-constrained state components per stage.
    pub nbx: Vec<usize>,
    /// Box-constrained control components per stage.
    pub nbu: Vec<usize>,
    /// General (two-sided) constraint rows per stage.
    pub ng: Vec<usize>,
}

impl OcpQpDims {
    /// Unconstrained dims with the given per-stage state/control counts.
    pub fn unconstrained(nx: Vec<usize>, nu: Vec<usize>) -> Self {
        let stages = nx.len();
        Self {
            n: stages.saturating_sub(1),
            nx,
            nu,
            nbx: vec![0; stages],
            nbu: vec![0; stages],
            ng: vec![0; stages],
        }
    }

    /// Number of inequality constraints at stage `k` (bounds + general).
    pub fn nc(&self, k: usize) -> usize {
        self.nbx[k] + self.nbu[k] + self.ng[k]
    }

    /// Total number of primal variables across the horizon.
    pub fn total_vars(&self) -> usize {
        self.nx.iter().sum::<usize>() + self.nu.iter().sum::<usize>()
    }

    /// Total number of dynamics (equality) constraint rows.
    pub fn total_eq(&self) -> usize {
        self.nx[1..].iter().sum()
    }

    /// Total number of two-sided inequality constraints.
    pub fn total_ineq(&self) -> usize {
        (0..=self.n).map(|k| self.nc(k)).sum()
    }

    /// Largest per-stage state count.
    pub fn max_nx(&self) -> usize {
        self.nx.iter().copied().max().unwrap_or(0)
    }

    /// Largest per-stage control count.
    pub fn max_nu(&self) -> usize {
        self.nu.iter().copied().max().unwrap_or(0)
    }

    /// Largest per-stage inequality count.
    pub fn max_nc(&self) -> usize {
        (0..=self.n).map(|k| self.nc(k)).max().unwrap_or(0)
    }

    /// Validate internal consistency.
    pub fn validate(&self) -> CoreResult<()> {
        let stages = self.n + 1;
        for (name, v) in [
            ("nx", &self.nx),
            ("nu", &self.nu),
            ("nbx", &self.nbx),
            ("nbu", &self.nbu),
            ("ng", &self.ng),
        ] {
            if v.len() != stages {
                return Err(CoreError::InvalidProblem(format!(
                    "{} has {} entries, expected {}",
                    name,
                    v.len(),
                    stages
                )));
            }
        }
        if self.nu[self.n] != 0 {
            return Err(CoreError::InvalidProblem(format!(
                "terminal stage has {} controls, expected 0",
                self.nu[self.n]
            )));
        }
        for k in 0..=self.n {
            if self.nbx[k] > self.nx[k] {
                return Err(CoreError::InvalidProblem(format!(
                    "stage {}: nbx {} exceeds nx {}",
                    k, self.nbx[k], self.nx[k]
                )));
            }
            if self.nbu[k] > self.nu[k] {
                return Err(CoreError::InvalidProblem(format!(
                    "stage {}: nbu {} exceeds nu {}",
                    k, self.nbu[k], self.nu[k]
                )));
            }
        }
        // A zero-dimensional interior state would disconnect the horizon.
        for k in 1..=self.n {
            if self.nx[k] == 0 {
                return Err(CoreError::InvalidProblem(format!(
                    "stage {}: nx must be positive past the initial stage",
                    k
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims() -> OcpQpDims {
        OcpQpDims {
            n: 2,
            nx: vec![2, 2, 2],
            nu: vec![1, 1, 0],
            nbx: vec![2, 2, 0],
            nbu: vec![1, 1, 0],
            ng: vec![0, 0, 2],
        }
    }

    #[test]
    fn test_counts() {
        let d = dims();
        assert!(d.validate().is_ok());
        assert_eq!(d.total_vars(), 8);
        assert_eq!(d.total_eq(), 4);
        assert_eq!(d.total_ineq(), 8);
        assert_eq!(d.nc(0), 3);
        assert_eq!(d.nc(2), 2);
        assert_eq!(d.max_nc(), 3);
    }

    #[test]
    fn test_rejects_terminal_controls() {
        let mut d = dims();
        d.nu[2] = 1;
        assert!(d.validate().is_err());
    }

    #[test]
    fn test_rejects_oversized_bounds() {
        let mut d = dims();
        d.nbx[0] = 3;
        assert!(d.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_interior_state() {
        let mut d = dims();
        d.nx[1] = 0;
        d.nbx[1] = 0;
        assert!(d.validate().is_err());
    }

    #[test]
    fn test_allows_eliminated_initial_state() {
        let mut d = dims();
        d.nx[0] = 0;
        d.nbx[0] = 0;
        assert!(d.validate().is_ok());
    }
}
