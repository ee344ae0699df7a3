//! Mass-spring benchmark problem.
//!
//! A chain of point masses connected by unit springs, with force
//! actuators on the first few masses. The state stacks positions and
//! velocities (`nx = 2 * masses`); the continuous-time dynamics are
//! discretized exactly by matrix exponential (zero-order hold). The
//! resulting OCP QP carries control bounds on every stage, state
//! bounds on the interior stages and a general identity constraint on
//! the terminal state.

use nalgebra::DMatrix;

use stageqp_core::{CoreError, CoreResult, OcpQp, OcpQpDims};

/// Problem family parameters.
#[derive(Debug, Clone)]
pub struct MassSpringConfig {
    /// Number of masses in the chain (`nx = 2 * masses`).
    pub masses: usize,
    /// Number of actuated masses (`nu`).
    pub controls: usize,
    /// Horizon length N.
    pub horizon: usize,
    /// Sampling time.
    pub ts: f64,
    /// Substitute the known initial state into the stage-0 dynamics,
    /// leaving `nx[0] == 0`, instead of pinning it with equal bounds.
    pub eliminate_x0: bool,
}

impl Default for MassSpringConfig {
    fn default() -> Self {
        Self {
            masses: 4,
            controls: 3,
            horizon: 15,
            ts: 0.5,
            eliminate_x0: true,
        }
    }
}

/// Exact zero-order-hold discretization of the spring chain.
fn discretize(masses: usize, controls: usize, ts: f64) -> (DMatrix<f64>, DMatrix<f64>) {
    let nx = 2 * masses;
    // Continuous time: d(pos)/dt = vel, d(vel)/dt = T pos + B_c u with
    // T the tridiagonal spring coupling.
    let mut ac = DMatrix::zeros(nx, nx);
    for i in 0..masses {
        ac[(i, masses + i)] = 1.0;
        ac[(masses + i, i)] = -2.0;
        if i > 0 {
            ac[(masses + i, i - 1)] = 1.0;
        }
        if i + 1 < masses {
            ac[(masses + i, i + 1)] = 1.0;
        }
    }
    let mut bc = DMatrix::zeros(nx, controls);
    for i in 0..controls {
        bc[(masses + i, i)] = 1.0;
    }
    // exp([Ac Bc; 0 0] ts) = [A B; 0 I].
    let mut aug = DMatrix::zeros(nx + controls, nx + controls);
    aug.view_mut((0, 0), (nx, nx)).copy_from(&ac);
    aug.view_mut((0, nx), (nx, controls)).copy_from(&bc);
    let exp = (aug * ts).exp();
    let a = exp.view((0, 0), (nx, nx)).into_owned();
    let b = exp.view((0, nx), (nx, controls)).into_owned();
    (a, b)
}

/// Build the benchmark QP.
pub fn build(cfg: &MassSpringConfig) -> CoreResult<OcpQp> {
    if cfg.masses == 0 || cfg.horizon < 2 || cfg.controls == 0 || cfg.controls > cfg.masses {
        return Err(CoreError::InvalidConfig(format!(
            "mass-spring config out of range: {} masses, {} controls, horizon {}",
            cfg.masses, cfg.controls, cfg.horizon
        )));
    }
    let nx = 2 * cfg.masses;
    let nu = cfg.controls;
    let n = cfg.horizon;
    let (a, b) = discretize(cfg.masses, cfg.controls, cfg.ts);

    // Initial state: the first two masses displaced.
    let mut x0 = vec![0.0; nx];
    x0[0] = 2.5;
    x0[1] = 2.5;

    let nx0 = if cfg.eliminate_x0 { 0 } else { nx };
    let dims = OcpQpDims {
        n,
        nx: {
            let mut v = vec![nx; n + 1];
            v[0] = nx0;
            v
        },
        nu: {
            let mut v = vec![nu; n + 1];
            v[n] = 0;
            v
        },
        nbx: {
            // Interior stages box-bounded; stage 0 pinned unless
            // eliminated; terminal state handled as a general row.
            let mut v = vec![nx; n + 1];
            v[0] = nx0;
            v[n] = 0;
            v
        },
        nbu: {
            let mut v = vec![nu; n + 1];
            v[n] = 0;
            v
        },
        ng: {
            let mut v = vec![0; n + 1];
            v[n] = nx;
            v
        },
    };
    let mut qp = OcpQp::zeros(&dims)?;

    for k in 0..=n {
        let stage = &mut qp.stages[k];
        let nxk = dims.nx[k];

        // Cost: Q = I, R = 2I, q = 0.1, r = 0.2.
        for i in 0..nxk {
            stage.Q[(i, i)] = 1.0;
            stage.q[i] = 0.1;
        }
        for i in 0..dims.nu[k] {
            stage.R[(i, i)] = 2.0;
            stage.r[i] = 0.2;
        }

        if k < n {
            if nxk > 0 {
                stage.A.copy_from(&a);
            }
            stage.B.copy_from(&b);
            if k == 0 && cfg.eliminate_x0 {
                // b_0 absorbs A x0.
                for i in 0..nx {
                    let mut v = 0.0;
                    for j in 0..nx {
                        v += a[(i, j)] * x0[j];
                    }
                    stage.b[i] = v;
                }
            }
            for i in 0..nu {
                stage.idxbu[i] = i;
                stage.lbu[i] = -0.5;
                stage.ubu[i] = 0.5;
            }
        }

        // State bounds: pin x0 (unless eliminated), box the interior.
        if k == 0 && nx0 > 0 {
            for i in 0..nx {
                stage.idxbx[i] = i;
                stage.lbx[i] = x0[i];
                stage.ubx[i] = x0[i];
            }
        } else if k > 0 && k < n {
            for i in 0..nx {
                stage.idxbx[i] = i;
                stage.lbx[i] = -4.0;
                stage.ubx[i] = 4.0;
            }
        }

        // Terminal state box as a general identity row block.
        if k == n {
            for i in 0..nx {
                stage.Cx[(i, i)] = 1.0;
                stage.lg[i] = -4.0;
                stage.ug[i] = 4.0;
            }
        }
    }

    qp.validate()?;
    Ok(qp)
}
