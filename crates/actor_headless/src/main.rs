//! Headless scenario runner.
//!
//! # Usage
//!
//! ```bash
//! # Run a scenario and print a JSON summary
//! cargo run -p actor_headless -- run --scenario scenarios/skirmish.ron
//!
//! # Run every scenario in a directory
//! cargo run -p actor_headless -- batch --dir scenarios --output results/
//!
//! # Check that repeated runs agree
//! cargo run -p actor_headless -- verify --scenario scenarios/skirmish.ron
//!
//! # Save at tick 200, restore, and compare
//! cargo run -p actor_headless -- save-roundtrip --scenario scenarios/skirmish.ron --at 200
//! ```

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use actor_headless::{
    runner::{run_batch, run_scenario_for, verify_determinism, verify_save_roundtrip},
    scenario::Scenario,
};

#[derive(Parser)]
#[command(name = "actor_headless")]
#[command(about = "Headless scenario runner for CI verification")]
#[command(version)]
struct Cli {
    /// Debug-level logs
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario and print its summary
    Run {
        /// Scenario file to load
        #[arg(short, long)]
        scenario: PathBuf,

        /// Override the scenario length
        #[arg(short, long)]
        ticks: Option<u64>,

        /// Write the summary here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run every scenario in a directory in parallel
    Batch {
        /// Directory of .ron scenarios
        #[arg(short, long)]
        dir: PathBuf,

        /// Output directory for summaries
        #[arg(short, long, default_value = "results")]
        output: PathBuf,
    },

    /// Verify determinism by running a scenario multiple times
    Verify {
        /// Scenario file
        #[arg(short, long)]
        scenario: PathBuf,

        /// How many replicas to compare
        #[arg(short, long, default_value = "4")]
        runs: u32,
    },

    /// Save mid-run, restore, and compare with the uninterrupted run
    SaveRoundtrip {
        /// Scenario file
        #[arg(short, long)]
        scenario: PathBuf,

        /// Tick to save at (default: half the scenario)
        #[arg(long)]
        at: Option<u64>,

        /// Keep the save file here
        #[arg(long)]
        save: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    // Logs on stderr, stdout is for summaries
    let log_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true),
        )
        .with(tracing_subscriber::filter::LevelFilter::from_level(
            log_level,
        ))
        .init();

    match cli.command {
        Commands::Run {
            scenario,
            ticks,
            output,
        } => cmd_run(&scenario, ticks, output),
        Commands::Batch { dir, output } => cmd_batch(&dir, &output),
        Commands::Verify { scenario, runs } => cmd_verify(&scenario, runs),
        Commands::SaveRoundtrip { scenario, at, save } => {
            cmd_save_roundtrip(&scenario, at, save.as_deref());
        }
    }
}

fn load_or_exit(path: &Path) -> Scenario {
    match Scenario::load(path) {
        Ok(s) => {
            tracing::info!("Loaded scenario: {}", s.name);
            s
        }
        Err(e) => {
            eprintln!("Cannot load {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
}

/// Run a single scenario
fn cmd_run(path: &Path, ticks: Option<u64>, output: Option<PathBuf>) {
    let scenario = load_or_exit(path);
    let ticks = ticks.unwrap_or(scenario.ticks);

    let summary = match run_scenario_for(&scenario, ticks) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Scenario failed: {}", e);
            std::process::exit(1);
        }
    };

    eprintln!(
        "Ran {} ticks: {} shots, {} deaths ({} crushed), hash {:016x}",
        summary.ticks, summary.shots, summary.deaths, summary.crushed, summary.final_hash
    );

    if let Some(out_path) = output {
        if let Err(e) = summary.save(&out_path) {
            eprintln!("Failed to write summary: {}", e);
            std::process::exit(1);
        }
        eprintln!("Summary saved to: {}", out_path.display());
    } else {
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Failed to encode summary: {}", e);
                std::process::exit(1);
            }
        }
    }
}

/// Run a directory of scenarios
fn cmd_batch(dir: &Path, output: &Path) {
    let mut paths: Vec<PathBuf> = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "ron"))
            .collect(),
        Err(e) => {
            eprintln!("Failed to read {}: {}", dir.display(), e);
            std::process::exit(1);
        }
    };
    paths.sort();

    // Unit catalogs share the extension; only keep files that parse as scenarios
    let scenarios: Vec<(PathBuf, Scenario)> = paths
        .into_iter()
        .filter_map(|path| match Scenario::load(&path) {
            Ok(s) => Some((path, s)),
            Err(e) => {
                tracing::debug!("Skipping {}: {}", path.display(), e);
                None
            }
        })
        .collect();
    tracing::info!("Running {} scenarios", scenarios.len());

    let list: Vec<Scenario> = scenarios.iter().map(|(_, s)| s.clone()).collect();
    let mut failures = 0;
    for ((path, _), result) in scenarios.iter().zip(run_batch(&list)) {
        let stem = path.file_stem().map_or_else(
            || "scenario".to_string(),
            |s| s.to_string_lossy().into_owned(),
        );
        match result {
            Ok(summary) => {
                let out_path = output.join(format!("{stem}.json"));
                if let Err(e) = summary.save(&out_path) {
                    eprintln!("Failed to write {}: {}", out_path.display(), e);
                    failures += 1;
                } else {
                    eprintln!("  {}: hash {:016x}", stem, summary.final_hash);
                }
            }
            Err(e) => {
                eprintln!("  {}: FAILED ({})", stem, e);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        eprintln!("{} scenarios failed", failures);
        std::process::exit(1);
    }
}

/// Compare replicas of one scenario
fn cmd_verify(path: &Path, runs: u32) {
    let scenario = load_or_exit(path);
    tracing::info!("Verifying determinism: {} ({} runs)", scenario.name, runs);

    match verify_determinism(&scenario, runs) {
        Ok(report) if report.is_deterministic() => {
            eprintln!("PASS: {} replicas agree", runs);
            eprintln!("  Final hash: {:016x}", report.hashes[0]);
        }
        Ok(report) => {
            eprintln!("FAIL: replicas disagree");
            if let Some(tick) = report.first_divergence {
                eprintln!("  First divergence at tick {}", tick);
            }
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("FAIL: {}", e);
            std::process::exit(1);
        }
    }
}

/// Save, restore and compare
fn cmd_save_roundtrip(path: &Path, at: Option<u64>, save: Option<&Path>) {
    let scenario = load_or_exit(path);
    let at = at.unwrap_or(scenario.ticks / 2);

    match verify_save_roundtrip(&scenario, at, save) {
        Ok(report) if report.matches() => {
            eprintln!("PASS: Restored run matches after saving at tick {}", report.saved_at);
            eprintln!("  Save size: {} bytes", report.save_bytes);
            eprintln!("  Final hash: {:016x}", report.original_hash);
        }
        Ok(report) => {
            eprintln!("FAIL: Restored run diverged!");
            if let Some(tick) = report.first_mismatch {
                eprintln!("  First mismatch at tick {}", tick);
            }
            eprintln!("  Expected: {:016x}", report.original_hash);
            eprintln!("  Actual:   {:016x}", report.restored_hash);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("FAIL: {}", e);
            std::process::exit(1);
        }
    }
}
