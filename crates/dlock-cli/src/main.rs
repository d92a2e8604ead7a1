mod config;
mod contend;
mod startup;

use clap::Parser;

use crate::config::{Cli, Settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(&cli)?;

    let _logging_guard = startup::logging::init_logging(&settings.logging)?;
    dlock_core::metrics::init_metrics();

    let report = contend::run(&settings).await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "{}: {} workers x {} rounds, {} acquired, {} failed, {} release errors, max {} concurrent holder(s), {} ms",
            report.lock_path,
            report.workers,
            report.rounds,
            report.acquired,
            report.failed,
            report.release_errors,
            report.max_concurrent_holders,
            report.elapsed_ms,
        );
    }

    anyhow::ensure!(
        report.mutual_exclusion_held(),
        "mutual exclusion violated: {} holders at once",
        report.max_concurrent_holders
    );
    Ok(())
}
