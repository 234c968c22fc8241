use anyhow::Result;
use clap::Parser;

use eventline_cli::commands::dlq::{self, DlqArgs};

fn main() -> Result<()> {
    eventline_observability::init();
    dlq::handle(DlqArgs::parse())
}
