use std::{
    ops::ControlFlow,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use clap::Parser;
use horizon::{
    core::{
        backend::Clarabel,
        driver::{Driver, EXCLUDED_TAIL_HOURS, Progress, RunStatus, State},
        summary::Summary,
        window::DEFAULT_DISCLOSURE_HOUR,
    },
    export,
    prelude::*,
    prices,
    tables::build_steps_table,
};
use signal_hook::consts::{SIGINT, SIGTERM};

use crate::cli::battery::{BatteryArgs, TariffArgs};

#[derive(Parser)]
pub struct SimulateArgs {
    /// Hourly prices: a SMARD `.csv` export (€/MWh), or a JSON file with
    /// `[{"time": "<RFC 3339>", "price": <€/kWh>}, …]`.
    #[clap(long = "prices", env = "PRICES_PATH")]
    prices: PathBuf,

    /// Export the trajectory into this file, CSV for `.csv` and JSON otherwise.
    #[clap(long = "output", env = "OUTPUT_PATH")]
    output: Option<PathBuf>,

    /// Hour of day at which the next day's prices become known.
    #[clap(long, default_value_t = DEFAULT_DISCLOSURE_HOUR, env = "DISCLOSURE_HOUR")]
    disclosure_hour: u32,

    /// Number of the final hours that are never decided.
    #[clap(long = "excluded-tail-hours", default_value_t = EXCLUDED_TAIL_HOURS)]
    excluded_tail_hours: usize,

    /// Abort the run once the solver has failed more times than this.
    #[clap(long = "max-solver-failures", env = "MAX_SOLVER_FAILURES")]
    max_solver_failures: Option<usize>,

    /// Do not print the hour-by-hour table.
    #[clap(long)]
    quiet: bool,

    #[clap(flatten)]
    battery: BatteryArgs,

    #[clap(flatten)]
    tariff: TariffArgs,
}

impl SimulateArgs {
    #[instrument(skip_all)]
    pub fn run(self) -> Result {
        let series = prices::load(&self.prices)?;
        let tariff = self.tariff.tariff();
        let driver = Driver::builder()
            .series(&series)
            .backend(Clarabel)
            .battery(self.battery.parameters())
            .tariff(tariff)
            .disclosure_hour(self.disclosure_hour)
            .excluded_tail_hours(self.excluded_tail_hours)
            .maybe_max_solver_failures(self.max_solver_failures)
            .build()
            .context("invalid parameters")?;

        let should_terminate = Arc::new(AtomicBool::new(false));
        signal_hook::flag::register(SIGINT, Arc::clone(&should_terminate))?;
        signal_hook::flag::register(SIGTERM, Arc::clone(&should_terminate))?;

        let run = driver.run_with(|progress| {
            log_progress(progress);
            if should_terminate.load(Ordering::Relaxed) {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });

        if !self.quiet {
            println!("{}", build_steps_table(&run.trajectory, &tariff));
        }
        let summary = Summary::new(&run.trajectory, &tariff);
        println!("{summary}");
        info!(
            profit = ?summary.profit().round_to_mills(),
            residual_energy = ?run.residual_energy,
            n_committed = summary.n_committed,
            n_skipped = summary.n_skipped,
            "realized",
        );

        if let Some(output) = &self.output {
            export::write(output, &run.trajectory, run.status)?;
        }

        match run.status {
            RunStatus::Complete => Ok(()),
            RunStatus::Cancelled { next_step } => {
                bail!("interrupted before step #{next_step}, the trajectory is partial")
            }
            RunStatus::Aborted { n_solver_failures } => {
                bail!("aborted after {n_solver_failures} solver failures")
            }
        }
    }
}

/// Log once per simulated day.
fn log_progress(progress: &Progress) {
    if let State::Running { step, residual_energy } = progress.state
        && step % 24 == 0
    {
        info!(
            day = step / 24 + 1,
            n_days = progress.end_step.div_ceil(24),
            ?residual_energy,
            n_committed = progress.n_committed,
            n_skipped = progress.n_skipped,
            "simulating…",
        );
    }
}
