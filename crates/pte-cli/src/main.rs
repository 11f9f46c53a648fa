//! PTE command-line tool: find recordings, plot and analyse them, decode features

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Command};
use tracing::Level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match cli.command {
        Command::Find(args) => commands::find::execute(args),
        Command::Decode(args) => commands::decode::execute(args).await,
        Command::Results(args) => commands::results::execute(args),
        Command::Plot(args) => commands::plot::execute(args),
        Command::Spectrum(args) => commands::spectrum::execute(args),
    }
}
