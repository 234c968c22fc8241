//! eventline - event pipeline over Redis Streams

use anyhow::Result;
use clap::{Parser, Subcommand};

use eventline_cli::commands::{consumer, monitor, producer};

#[derive(Parser)]
#[command(name = "eventline", version, about = "At-least-once event pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Append demo events at a fixed interval
    Producer(producer::ProducerArgs),
    /// Run a pool of consumer workers
    Consumer(consumer::ConsumerArgs),
    /// Print pipeline snapshots at a fixed interval
    Monitor(monitor::MonitorArgs),
}

fn main() -> Result<()> {
    eventline_observability::init();

    match Cli::parse().command {
        Commands::Producer(args) => producer::handle(args),
        Commands::Consumer(args) => consumer::handle(args),
        Commands::Monitor(args) => monitor::handle(args),
    }
}
