use crate::cmd::{probe::ProbeArgs, run::RunArgs};
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about = "Governance and upgrade monitor for Cosmos SDK chains", long_about = None)]
pub struct Govwatchd {
    #[command(subcommand)]
    pub cmd: GovwatchdSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum GovwatchdSubcommand {
    /// Run the proposal poller and upgrade tracker
    Run(RunArgs),
    /// Validate a candidate REST endpoint before adding it to a chain
    Probe(ProbeArgs),
}
