use clap::Parser;

use crate::opts::{Govwatchd, GovwatchdSubcommand};

mod cmd;
mod opts;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let args = Govwatchd::parse();

    match args.cmd {
        GovwatchdSubcommand::Run(cmd) => cmd.run().await,
        GovwatchdSubcommand::Probe(cmd) => cmd.run().await,
    }
}
