use std::path::PathBuf;

use clap::{Parser, Subcommand};
use horizon::{
    core::{
        series::Timestamp,
        window::{DEFAULT_DISCLOSURE_HOUR, ForecastWindow},
    },
    prelude::*,
    prices,
    tables::build_horizons_table,
};

#[derive(Parser)]
pub struct BurrowArgs {
    #[command(subcommand)]
    command: BurrowCommand,
}

impl BurrowArgs {
    pub fn run(self) -> Result {
        match self.command {
            BurrowCommand::Horizons(args) => args.run(),
        }
    }
}

#[derive(Subcommand)]
pub enum BurrowCommand {
    /// Show how far ahead the prices are visible at every hour.
    Horizons(BurrowHorizonsArgs),
}

#[derive(Parser)]
pub struct BurrowHorizonsArgs {
    /// Hourly prices: a SMARD `.csv` export or a JSON file.
    #[clap(long = "prices", env = "PRICES_PATH")]
    prices: PathBuf,

    #[clap(long, default_value_t = DEFAULT_DISCLOSURE_HOUR, env = "DISCLOSURE_HOUR")]
    disclosure_hour: u32,

    /// Start at this hour instead of the beginning of the series.
    #[clap(long)]
    since: Option<Timestamp>,

    #[clap(long = "hours", default_value = "48")]
    n_hours: usize,
}

impl BurrowHorizonsArgs {
    fn run(self) -> Result {
        ensure!(self.disclosure_hour < 24, "the disclosure hour must be within 0..=23");
        let series = prices::load(&self.prices)?;
        let start = match self.since {
            Some(since) => series
                .position(since)
                .with_context(|| format!("`{since}` is not in the series"))?,
            None => 0,
        };
        let window = ForecastWindow::builder()
            .disclosure_hour(self.disclosure_hour)
            .first_hour(series.first_hour())
            .build();
        println!("{}", build_horizons_table(&series, &window, start, self.n_hours));
        Ok(())
    }
}
