mod app;
mod audit;
mod config;
mod dsl;
mod service;
mod store;

use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;

use app::{Cli, Output, execute, failure, init_service, resolve_config, success};

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("CLI: Failed to initialize thread pool")?;
    }

    let config = resolve_config(&cli)?;
    let start = std::time::Instant::now();

    let outcome = init_service(&config, &cli.command)
        .and_then(|mut service| execute(&mut service, &cli.command, &config));

    let code = match outcome {
        Ok(Output::Text(text)) => {
            print!("{}", text);
            ExitCode::SUCCESS
        }
        Ok(Output::Json(data)) => {
            println!("{}", serde_json::to_string(&success(data))?);
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::warn!("{:#}", err);
            println!("{}", serde_json::to_string(&failure(&err))?);
            ExitCode::FAILURE
        }
    };

    tracing::info!("Done in {:.3}s", start.elapsed().as_secs_f64());
    Ok(code)
}
