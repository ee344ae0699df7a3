//! Mass-spring benchmark driver for the stageqp backends.
//!
//! Every selected backend solves the same problem `--reps` times
//! against memory assigned once, reporting the minimum timings across
//! repetitions and the KKT residuals of the last solution. Backends
//! that reject the configuration are logged and skipped.

mod backend_choice;
mod mass_spring;

use anyhow::{Context, Result};
use clap::Parser;

use stageqp_core::{
    residuals, Arena, BackendRegistry, CoreResult, KktResiduals, OcpQp, OcpQpBackend,
    OcpQpSolution, QpInfo, QpStatus, SolverOptions,
};

use backend_choice::{BackendChoice, KernelChoice};
use mass_spring::MassSpringConfig;

#[derive(Parser, Debug)]
#[command(name = "stageqp-bench")]
#[command(about = "Benchmark the stageqp backends on a mass-spring OCP QP")]
struct Args {
    /// Backends to run (comma separated); all of them by default.
    #[arg(long, value_enum, value_delimiter = ',')]
    backends: Vec<BackendChoice>,

    /// Reduced horizon lengths swept by the partial condensing row.
    #[arg(long, value_delimiter = ',', default_values_t = [15usize, 5, 3])]
    n2: Vec<usize>,

    /// Inner kernel for the condensing wrappers.
    #[arg(long, value_enum, default_value = "ipm")]
    kernel: KernelChoice,

    /// Kernel iteration limit.
    #[arg(long, default_value_t = 30)]
    max_iter: usize,

    /// Warm start repeated solves where the kernel supports it.
    #[arg(long)]
    warm_start: bool,

    /// Solves per configuration; timings report the minimum.
    #[arg(long, default_value_t = 100)]
    reps: usize,

    /// Horizon length N.
    #[arg(long, default_value_t = 15)]
    horizon: usize,

    /// Masses in the chain (nx = 2 * masses).
    #[arg(long, default_value_t = 4)]
    masses: usize,

    /// Actuated masses (nu).
    #[arg(long, default_value_t = 3)]
    controls: usize,

    /// Keep the initial state as a pinned variable instead of
    /// substituting it into the stage-0 dynamics.
    #[arg(long)]
    keep_x0: bool,
}

struct BenchRow {
    status: QpStatus,
    num_iter: usize,
    min: QpInfo,
    res: KktResiduals,
}

/// Assign memory once, solve `reps` times, keep the minimum timings.
fn run_one(
    backend: &dyn OcpQpBackend,
    opts: &SolverOptions,
    qp: &OcpQp,
    reps: usize,
    warm_start: bool,
) -> CoreResult<BenchRow> {
    let dims = qp.dims();
    let mut buf = vec![0.0; backend.memory_words(dims, opts)?];
    let mut arena = Arena::new(&mut buf);
    let mut mem = backend.assign_memory(dims, opts, &mut arena)?;
    let mut work = vec![0.0; backend.workspace_words(dims, opts)?];
    let mut sol = OcpQpSolution::new(dims);

    let mut status = QpStatus::Success;
    let mut min = QpInfo::default();
    for rep in 0..reps.max(1) {
        status = backend.evaluate(qp, opts, &mut mem, &mut work, &mut sol)?;
        if rep == 0 {
            min = sol.info;
        } else {
            if !warm_start {
                debug_assert_eq!(
                    min.num_iter, sol.info.num_iter,
                    "repeated solve was not cold started"
                );
            }
            min.track_min(&sol.info);
        }
        if !status.is_success() {
            break;
        }
    }

    let mut res_work = vec![0.0; residuals::workspace_words(dims)];
    let res = residuals::compute(qp, &sol, &mut res_work)?;
    Ok(BenchRow {
        status,
        num_iter: sol.info.num_iter,
        min,
        res,
    })
}

fn micros(d: std::time::Duration) -> f64 {
    d.as_secs_f64() * 1e6
}

fn print_header() {
    println!(
        "{:<24} {:>4} {:>16} {:>5} {:>10} {:>10} {:>10} {:>10} {:>10}",
        "backend", "N2", "status", "iter", "total[us]", "cond[us]", "solve[us]", "intf[us]", "kkt"
    );
    println!("{}", "-".repeat(106));
}

fn print_row(label: &str, n2: Option<usize>, row: &BenchRow) {
    let n2 = n2.map_or(String::new(), |v| v.to_string());
    println!(
        "{:<24} {:>4} {:>16} {:>5} {:>10.2} {:>10.2} {:>10.2} {:>10.2} {:>10.2e}",
        label,
        n2,
        row.status.to_string(),
        row.num_iter,
        micros(row.min.total_time),
        micros(row.min.condensing_time),
        micros(row.min.solve_time),
        micros(row.min.interface_time),
        row.res.max(),
    );
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let cfg = MassSpringConfig {
        masses: args.masses,
        controls: args.controls,
        horizon: args.horizon,
        eliminate_x0: !args.keep_x0,
        ..Default::default()
    };
    let qp = mass_spring::build(&cfg).context("building the mass-spring problem")?;
    let dims = qp.dims();

    println!(
        "mass-spring benchmark: {} masses (nx = {}), nu = {}, N = {}, {} reps{}",
        args.masses,
        2 * args.masses,
        args.controls,
        args.horizon,
        args.reps,
        if cfg.eliminate_x0 {
            ", x0 eliminated"
        } else {
            ", x0 pinned"
        }
    );
    println!();
    print_header();

    let registry = BackendRegistry::with_defaults();
    let backends = if args.backends.is_empty() {
        BackendChoice::all()
    } else {
        args.backends.clone()
    };

    for choice in backends {
        let n2_values: Vec<Option<usize>> = if choice.sweeps_n2() {
            args.n2.iter().copied().map(Some).collect()
        } else {
            vec![None]
        };
        for n2 in n2_values {
            let label = choice.label();
            let (backend, mut opts) =
                match choice.resolve(&registry, dims, args.kernel, n2.unwrap_or(0)) {
                    Ok(r) => r,
                    Err(e) => {
                        log::warn!("skipping {label}: {e}");
                        continue;
                    }
                };
            opts.set_kernel_max_iter(args.max_iter);
            if args.warm_start {
                opts.set_warm_start(true);
            }
            if let Err(e) = backend.validate_config(dims, &opts) {
                log::warn!("skipping {label}{}: {e}", fmt_n2(n2));
                continue;
            }
            match run_one(&*backend, &opts, &qp, args.reps, args.warm_start) {
                Ok(row) => print_row(label, n2, &row),
                Err(e) => log::warn!("{label}{} failed: {e}", fmt_n2(n2)),
            }
        }
    }
    Ok(())
}

fn fmt_n2(n2: Option<usize>) -> String {
    n2.map_or(String::new(), |v| format!(" (N2 = {v})"))
}
