use anyhow::anyhow;
use clap::Parser;
use std::path::PathBuf;
use std::process;

use drivecert::config::Config;
use drivecert::run;

#[derive(Parser)]
#[command(name = "drivecert")]
#[command(version, about = "Drives a record-store I/O workload against raw block devices and reports latency histograms", long_about = None)]
struct Cli {
    /// Path to the workload configuration file
    config: PathBuf,

    /// Override one config setting (repeatable)
    #[arg(short = 's', long = "set", value_name = "KEY=VALUE")]
    overrides: Vec<String>,
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run_tool(cli) {
        println!("ERROR: {:#}", err);
        process::exit(-1);
    }
}

fn run_tool(cli: Cli) -> anyhow::Result<()> {
    let mut overrides = Vec::with_capacity(cli.overrides.len());
    for pair in &cli.overrides {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("--set expects KEY=VALUE, got '{}'", pair))?;
        overrides.push((key.to_string(), value.to_string()));
    }

    let cfg = Config::load(&cli.config, &overrides)?;

    println!(
        "{} {} - starting",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );
    cfg.echo();
    println!();

    run::run(cfg)?;
    Ok(())
}
