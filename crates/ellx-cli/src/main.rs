//! Ellx CLI - Main entry point

use clap::Parser;
use ellx_cli::{run, Cli};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let output = run(cli.command)?;
    println!("{}", output);
    Ok(())
}
