use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(version, about = "Anonymous reaction node")]
pub struct Cli {
    /// Config file, defaults to $OMEGA_CONFIG
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Feed a JSON-lines log of feed keys, messages, membership events and reactions through
    /// the node and print the resulting tallies.
    Replay {
        #[arg(value_name = "FILE")]
        log: PathBuf,
    },

    /// Convert a snarkjs verification key into the binary cache format.
    ConvertKey {
        /// Circuit version the key verifies
        #[arg(long = "circuit-version", short = 'v')]
        circuit_version: String,

        #[arg(long, short = 'i', value_name = "FILE")]
        input: PathBuf,

        #[arg(long, short = 'o', value_name = "FILE")]
        output: PathBuf,
    },
}
