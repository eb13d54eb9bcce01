mod cli;

use clap::{Parser, crate_version};
use horizon::prelude::*;

use crate::cli::{Args, Command};

fn main() -> Result {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().without_time().compact().init();
    info!(version = crate_version!(), "starting…");

    match Args::parse().command {
        Command::Simulate(args) => args.run()?,
        Command::Burrow(args) => args.run()?,
    }

    info!("done!");
    Ok(())
}
