mod battery;
mod burrow;
mod simulate;

use clap::{Parser, Subcommand};

use crate::cli::{burrow::BurrowArgs, simulate::SimulateArgs};

#[derive(Parser)]
#[command(author, version, about, propagate_version = true)]
#[must_use]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Main command: replay the price series hour by hour and report the realized profit.
    #[clap(name = "simulate")]
    Simulate(Box<SimulateArgs>),

    /// Development tools.
    #[clap(name = "burrow")]
    Burrow(Box<BurrowArgs>),
}
