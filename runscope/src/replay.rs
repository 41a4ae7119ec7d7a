//! runscope-replay - print the trace reconstructed from a recording
//!
//! Feeds a JSON Lines recording through the same dispatcher the viewer uses
//! and prints the resulting run as plain text.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use runscope_core::replay::{read_recording, render_transcript, replay_into};
use runscope_core::{Config, RunId, ViewerState};

#[derive(Parser)]
#[command(name = "runscope-replay")]
#[command(about = "Replay a runscope recording and print the reconstructed trace")]
#[command(version)]
struct Args {
    /// Recording to replay (`<run id>.jsonl`)
    path: PathBuf,

    /// Run to reconstruct (defaults to the first run in the recording)
    #[arg(short, long)]
    run: Option<RunId>,

    /// Print how many frames were applied and ignored
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = Config::load().context("failed to load configuration")?;

    // Initialize logging
    let _log_guard =
        runscope_core::logging::init(&config.logging).context("failed to initialize logging")?;

    let records = read_recording(&args.path)
        .with_context(|| format!("failed to read recording {}", args.path.display()))?;

    let mut state = ViewerState::new(std::time::Duration::ZERO);
    let summary = replay_into(&mut state, &records, args.run)
        .with_context(|| format!("no run found in {}", args.path.display()))?;

    print!("{}", render_transcript(&state));
    if args.verbose {
        println!();
        println!(
            "{} frames applied, {} ignored",
            summary.applied, summary.ignored
        );
    }

    Ok(())
}
