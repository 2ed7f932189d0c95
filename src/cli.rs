use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "ossatrisk",
    version,
    about = "Surface neglected, risky packages from a public registry"
)]
pub struct Cli {
    /// Increase verbosity (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Configuration file (defaults to ./ossatrisk.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Harvest, score and rank a registry's popular packages
    Harvest(HarvestCommand),
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Ecosystem {
    Php,
}

#[derive(Args)]
pub struct HarvestCommand {
    #[arg(value_enum)]
    pub ecosystem: Ecosystem,

    /// Where to write the ranked feed
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Upper bound on listing pages
    #[arg(long)]
    pub max_pages: Option<usize>,

    /// Replacement suggestions JSON file
    #[arg(long)]
    pub suggestions: Option<PathBuf>,
}
