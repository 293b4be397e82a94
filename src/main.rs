//! SuperWrangler ML - Main Entry Point
//!
//! Serves the training API by default; `train` and `algorithms` run locally.

use clap::Parser;
use superwrangler_ml::cli::{cmd_algorithms, cmd_serve, cmd_train, Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "superwrangler_ml=debug,tower_http=debug"
    } else {
        "superwrangler_ml=info,tower_http=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    match cli.command {
        Some(Commands::Train { data, target, profile, stream, output }) => {
            // Blocking work stays off the async runtime's worker threads.
            tokio::task::spawn_blocking(move || {
                cmd_train(&data, &target, profile, stream, output.as_deref())
            })
            .await??;
        }
        Some(Commands::Algorithms { profile }) => {
            cmd_algorithms(profile)?;
        }
        Some(Commands::Serve { host, port, profile }) => {
            cmd_serve(host, port, profile).await?;
        }
        None => {
            cmd_serve(None, None, None).await?;
        }
    }

    Ok(())
}
