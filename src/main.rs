use anyhow::Context;
use logtally::{Analyzer, LogTable};
use std::env;
use std::fs;
use tracing_subscriber::EnvFilter;

/// Input log location when no path argument is given.
const DEFAULT_LOG_PATH: &str = "log.txt";

/// Read the application log and print the per-endpoint report to stdout.
fn main() -> anyhow::Result<()> {
    // Diagnostics go to stderr so stdout stays clean JSON lines.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let path = env::args()
        .nth(1)
        .unwrap_or_else(|| String::from(DEFAULT_LOG_PATH));
    let raw = fs::read_to_string(&path)
        .with_context(|| format!("failed to read log file [{}]", path))?;

    let table = LogTable::parse(raw.lines());
    let report = Analyzer::new().render(&table)?;
    println!("{}", report);
    Ok(())
}
