use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "capstan",
    about = "Capstan — ledger-to-storage pin synchronization",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the sync service
    Serve(ServeArgs),
    /// Write a default configuration file
    InitConfig(InitConfigArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "capstan.toml")]
    pub config: PathBuf,
}

#[derive(Args)]
pub struct InitConfigArgs {
    /// Where to write the configuration
    #[arg(default_value = "capstan.toml")]
    pub path: PathBuf,
}
