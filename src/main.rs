#![recursion_limit = "256"]

use anyhow::Context;
use clap::Parser;
use drivenets::backend::{Backend, default_device};
use drivenets::config::{AppConfig, NetOverrides};
use drivenets::core::{AnyNet, NetConfig, NetKind};
use serde::Serialize;
use std::io::{self, Write};
use tracing::instrument;

#[derive(Debug, Parser)]
#[command(
    name = "drivenets",
    version = "1.0",
    about = "Build a driving network and run it once on random inputs"
)]
struct Args {
    /// Net config JSON, takes precedence over DRIVENET_CONFIG
    #[arg(long)]
    config: Option<String>,
    /// Network architecture
    #[arg(long, value_enum)]
    kind: Option<NetKind>,
    /// Number of stacked past frames
    #[arg(long)]
    n_frames: Option<usize>,
    /// Number of future steps predicted
    #[arg(long)]
    n_steps: Option<usize>,
    /// Number of random samples in the forward pass
    #[arg(long, default_value = "1")]
    batch_size: usize,
    /// Write the resolved net config to this path
    #[arg(long)]
    save_config: Option<String>,
}

#[derive(Debug, Serialize)]
struct Summary {
    kind: NetKind,
    n_frames: usize,
    n_steps: usize,
    num_params: usize,
    output_shape: Vec<Vec<usize>>,
}

fn main() {
    dotenv::from_filename(".env").ok();

    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    let app_config = AppConfig::from_env()?;

    // Log diagnostics to stderr, stdout carries the summary
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .pretty()
        .with_thread_ids(true)
        .with_max_level(app_config.log_level)
        .init();

    tracing::info!(
        message = "Configuration loaded",
        log_level = %app_config.log_level,
        net_path = ?app_config.net_path
    );

    let config = resolve(&args, &app_config)?;

    if let Some(path) = &args.save_config {
        config
            .save(path)
            .with_context(|| format!("Failed to save net config to {}", path))?;
        tracing::info!(path = %path, "Net config saved");
    }

    let summary = forward(&config, args.batch_size)?;

    let json = serde_json::to_string(&summary)?;
    io::stdout().write_all(json.as_bytes())?;
    io::stdout().write_all(b"\n")?;
    io::stdout().flush()?;

    Ok(())
}

#[instrument(level = "info", skip(app_config))]
fn resolve(args: &Args, app_config: &AppConfig) -> anyhow::Result<NetConfig> {
    let base = app_config.net_config(args.config.as_deref())?;

    let overrides = NetOverrides {
        kind: args.kind,
        n_frames: args.n_frames,
        n_steps: args.n_steps,
    };

    Ok(overrides.apply(base)?)
}

#[instrument(level = "info")]
fn forward(config: &NetConfig, batch_size: usize) -> anyhow::Result<Summary> {
    anyhow::ensure!(batch_size > 0, "batch_size must be greater than 0");

    let device = default_device();
    let net = AnyNet::<Backend>::init(config, &device);
    let num_params = net.num_params();

    tracing::info!(net = net.name(), num_params, "Network built");

    let output = net
        .forward(net.sample_input(batch_size, &device))
        .with_context(|| format!("{} forward pass failed", net.name()))?;
    let output_shape = output.shapes();

    tracing::info!(output_shape = ?output_shape, "Forward pass complete");

    Ok(Summary {
        kind: net.kind(),
        n_frames: net.n_frames(),
        n_steps: net.n_steps(),
        num_params,
        output_shape,
    })
}
