use std::process::ExitCode;

use clap::Parser;
use virtmem::{
    config::{Cli, Config},
    error::Result,
    kernel::Kernel,
    memory::MemoryStats,
};

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("virtmem: {e}");
            e.exit_code()
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::try_from(cli)?;
    log::info!(
        "running {} with {} pages, {} frames, policy {}",
        config.workload,
        config.npages,
        config.nframes,
        config.policy
    );

    let mut kernel = Kernel::from_config(&config)?;
    let outcome = config.workload.run(&mut kernel);
    let (outcome, stats) = settle(outcome, kernel.shutdown())?;

    if let Ok(total) = &outcome {
        println!("{} result is {}", config.workload, total);
    }
    print_report(&config, &stats);
    outcome.map(|_| ())
}

/// Pairs the workload outcome with the final counters. When both the
/// workload and the shutdown fail, the workload error wins.
fn settle(outcome: Result<u64>, shutdown: Result<MemoryStats>) -> Result<(Result<u64>, MemoryStats)> {
    match (outcome, shutdown) {
        (outcome, Ok(stats)) => Ok((outcome, stats)),
        (Err(e), Err(close)) => {
            log::error!("shutdown failed after the workload error: {close}");
            Err(e)
        }
        (Ok(_), Err(e)) => Err(e),
    }
}

fn print_report(config: &Config, stats: &MemoryStats) {
    println!();
    print_row_header(&format!("## Stats for the `{}` policy", config.policy));
    print_row("Pages", &config.npages);
    print_row("Frames", &config.nframes);
    print_row("Page faults", &stats.fault_count);
    print_row("Disk reads", &stats.read_count);
    print_row("Disk writes", &stats.write_count);
}

fn print_row_header(title: &str) {
    println!("{}", title);
    println!("| {:<20} | {:<20} |", "Metric", "Value");
    println!("| {:-<20} | {:-<20} |", "-", "-");
}

fn print_row(label: &str, value: &dyn std::fmt::Display) {
    println!("| {:<20} | {:<20} |", label, value);
}
