//! SuperWrangler ML CLI Module
//!
//! Command-line interface for serving the API, running a training session
//! locally and listing the algorithm catalog.

use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::{RegistryProfile, SessionConfig, CLIENT_SIDE_ALGORITHMS};
use crate::server::{run_server, ServerConfig};
use crate::training::{AlgorithmRegistry, EvaluationResult, ProgressEvent, SessionSummary, TrainEngine};
use crate::utils::DataLoader;

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(72)));
}

fn fmt_auc(auc: Option<f64>) -> String {
    auc.map(|v| format!("{:.4}", v)).unwrap_or_else(|| "-".to_string())
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "superwrangler-ml")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Train and compare a catalog of classifiers on one dataset")]
#[command(long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API (default)
    Serve {
        /// Server host
        #[arg(long)]
        host: Option<String>,

        /// Server port
        #[arg(short, long)]
        port: Option<u16>,

        /// Algorithm profile (full, advanced)
        #[arg(long)]
        profile: Option<RegistryProfile>,
    },

    /// Run a training session on a local file
    Train {
        /// Input data file (CSV or JSON rows)
        #[arg(short, long)]
        data: PathBuf,

        /// Target column name
        #[arg(short, long)]
        target: String,

        /// Algorithm profile (full, advanced)
        #[arg(long)]
        profile: Option<RegistryProfile>,

        /// Print each model as it finishes
        #[arg(long)]
        stream: bool,

        /// Write the session summary as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the algorithm catalog
    Algorithms {
        /// Algorithm profile (full, advanced)
        #[arg(long)]
        profile: Option<RegistryProfile>,
    },
}

/// Environment defaults with an optional profile override
pub fn session_config(profile: Option<RegistryProfile>) -> anyhow::Result<SessionConfig> {
    let config = SessionConfig::from_env()?;
    config.validate()?;
    Ok(match profile {
        Some(profile) => config.with_profile(profile),
        None => config,
    })
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub async fn cmd_serve(
    host: Option<String>,
    port: Option<u16>,
    profile: Option<RegistryProfile>,
) -> anyhow::Result<()> {
    let mut config = ServerConfig::default();
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    run_server(config, session_config(profile)?).await
}

pub fn cmd_train(
    data_path: &Path,
    target: &str,
    profile: Option<RegistryProfile>,
    stream: bool,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    section("Train");

    step_run("Loading data");
    let start = Instant::now();
    let dataset = DataLoader::new().load(data_path)?;
    step_done(&format!(
        "{} rows × {} cols in {:?}",
        dataset.len(),
        dataset.columns().len(),
        start.elapsed()
    ));

    let engine = TrainEngine::new(session_config(profile)?);

    let summary = if stream {
        run_streaming(&engine, &dataset, target)?
    } else {
        step_run(&format!("Training {} algorithms", engine.registry().len()));
        let summary = engine.run_batch(&dataset, target)?;
        step_done(&format!("{:.0} ms", summary.total_time));
        summary
    };

    print_leaderboard(&summary);

    if let Some(path) = output {
        step_run(&format!("Saving → {}", path.display()));
        std::fs::write(path, serde_json::to_string_pretty(&summary)?)?;
        step_done("");
    }

    println!();
    Ok(())
}

fn run_streaming(
    engine: &TrainEngine,
    dataset: &crate::preprocessing::RawDataset,
    target: &str,
) -> anyhow::Result<SessionSummary> {
    let session = engine.run_streaming(dataset, target)?;

    for event in session {
        match event {
            ProgressEvent::Start { dataset_info, total } => {
                println!(
                    "  {} {} samples, {} features ({} encoded), {} classes, {}/{} split, {} algorithms",
                    accent("›"),
                    dataset_info.samples,
                    dataset_info.features,
                    dataset_info.features_after_encoding,
                    dataset_info.classes,
                    dataset_info.train_size,
                    dataset_info.test_size,
                    total
                );
            }
            ProgressEvent::ModelComplete { index, total, result } => {
                let progress = format!("[{:>2}/{}]", index, total);
                if result.is_success() {
                    println!(
                        "  {} {:<30} {} {:.4} {}",
                        dim(&progress),
                        result.algorithm,
                        muted("f1"),
                        result.f1_score,
                        dim(&format!("{:.0} ms", result.training_time))
                    );
                } else {
                    println!(
                        "  {} {:<30} {}",
                        dim(&progress),
                        result.algorithm,
                        result.error.as_deref().unwrap_or("failed").red()
                    );
                }
            }
            ProgressEvent::Error { error } => anyhow::bail!(error),
            ProgressEvent::Complete(summary) => return Ok(summary),
        }
    }

    anyhow::bail!("Training session ended without a result")
}

fn print_leaderboard(summary: &SessionSummary) {
    section("Leaderboard");

    let mut ranked: Vec<&EvaluationResult> = summary.results.iter().filter(|r| r.is_success()).collect();
    // Stable sort keeps catalog order among equal scores.
    ranked.sort_by(|a, b| b.f1_score.total_cmp(&a.f1_score));

    println!(
        "  {:<4} {:<30} {:>8} {:>8} {:>8} {:>8} {:>10}",
        muted("#"),
        muted("Algorithm"),
        muted("F1"),
        muted("Acc"),
        muted("ROC-AUC"),
        muted("CV F1"),
        muted("Train")
    );
    println!("  {}", dim(&"─".repeat(72)));

    for (rank, result) in ranked.iter().enumerate() {
        let name = if result.algorithm == summary.best_model.algorithm {
            result.algorithm.white().bold()
        } else {
            result.algorithm.normal()
        };
        println!(
            "  {:<4} {:<30} {:>8.4} {:>8.4} {:>8} {:>8.4} {:>10}",
            rank + 1,
            name,
            result.f1_score,
            result.accuracy,
            fmt_auc(result.roc_auc),
            result.cv_f1_mean,
            format!("{:.0} ms", result.training_time)
        );
    }

    for result in summary.results.iter().filter(|r| !r.is_success()) {
        println!(
            "  {:<4} {:<30} {}",
            "-",
            result.algorithm,
            result.error.as_deref().unwrap_or("failed").red()
        );
    }

    println!("  {}", dim(&"─".repeat(72)));
    println!();
    println!(
        "  {} {} {} {:.4}",
        ok("best"),
        summary.best_model.algorithm.white().bold(),
        muted("f1:"),
        summary.best_model.f1_score
    );
    println!(
        "  {} {} succeeded, {} failed in {:.0} ms",
        muted("runs"),
        summary.success_count,
        summary.failure_count,
        summary.total_time
    );
}

pub fn cmd_algorithms(profile: Option<RegistryProfile>) -> anyhow::Result<()> {
    let config = session_config(profile)?;
    let registry = AlgorithmRegistry::for_config(&config);

    section(&format!("Algorithms ({} profile)", config.profile));
    for (i, name) in registry.names().iter().enumerate() {
        let tag = if CLIENT_SIDE_ALGORITHMS.contains(name) {
            dim("  quick ml")
        } else {
            "".normal()
        };
        println!("  {:>3}  {}{}", i + 1, name, tag);
    }
    println!();
    println!("  {} {}", muted("total"), registry.len());
    println!();
    Ok(())
}
