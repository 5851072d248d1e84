// src/lib.rs

pub mod artifact;
pub mod cli;
pub mod codec;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod http;
pub mod logging;
pub mod types;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::artifact::workdir::sweep_stale;
use crate::cli::CliArgs;
use crate::config::ConfigFile;
use crate::config::loader::load_and_validate;
use crate::engine::{ConcurrencyGate, RenderService, RenderSettings};
use crate::exec::{ProcessBackend, RendererCommand, Supervisor, locate};
use crate::http::AppState;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading (file + environment + CLI)
/// - the render service (gate, supervisor backend, job registry)
/// - the artifact retention sweeper
/// - the HTTP server
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let mut cfg = load_and_validate(args.config.as_deref().map(Path::new))?;
    if let Some(listen) = args.listen.as_deref() {
        cfg.listen = listen
            .parse()
            .with_context(|| format!("--listen {listen:?} is not a socket address"))?;
    }

    if args.check {
        print_check(&cfg);
        return Ok(());
    }

    match sweep_stale(&cfg.render.work_root, cfg.render.retention()) {
        Ok(0) => {}
        Ok(removed) => info!(removed, work_root = ?cfg.render.work_root, "removed stale job directories"),
        Err(e) => warn!(work_root = ?cfg.render.work_root, error = %e, "could not sweep work root"),
    }

    let service = Arc::new(build_service(&cfg));
    let shutdown = CancellationToken::new();
    let sweeper = service.spawn_sweeper(shutdown.clone());

    // Ctrl-C → graceful shutdown.
    {
        let token = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            info!("shutdown requested");
            token.cancel();
        });
    }

    let listener = TcpListener::bind(cfg.listen)
        .await
        .with_context(|| format!("binding {}", cfg.listen))?;
    let app = http::router(AppState::new(Arc::clone(&service), &cfg.renderer.program));

    let token = shutdown.clone();
    http::serve(listener, app, async move { token.cancelled().await })
        .await
        .context("HTTP server failed")?;

    shutdown.cancel();
    if let Err(e) = sweeper.await {
        debug!(error = %e, "retention sweeper ended abnormally");
    }
    info!("server stopped");
    Ok(())
}

/// Build the production render service from validated config.
pub fn build_service(cfg: &ConfigFile) -> RenderService {
    let renderer = RendererCommand::from_config(&cfg.renderer);
    if locate(renderer.program()).is_none() {
        warn!(
            program = ?renderer.program(),
            "renderer not found; renders will fail until it is installed"
        );
    }

    let supervisor = Supervisor::new(
        renderer,
        &cfg.render.work_root,
        cfg.render.stderr_tail_bytes,
    );
    let gate = ConcurrencyGate::new(
        cfg.render.max_concurrent,
        cfg.render.queue_depth,
        cfg.render.overload_policy,
    );
    RenderService::new(
        RenderSettings::from(cfg),
        gate,
        Arc::new(ProcessBackend::new(supervisor)),
    )
}

/// `--check` output: effective config and where the renderer resolves to.
fn print_check(cfg: &ConfigFile) {
    let renderer = RendererCommand::from_config(&cfg.renderer);
    let formats: Vec<&str> = cfg.render.formats.iter().map(|f| f.as_str()).collect();

    println!("tlr-avatar check");
    println!("  server.listen = {}", cfg.listen);
    println!();
    println!("renderer:");
    println!("  program = {}", cfg.renderer.program);
    match locate(renderer.program()) {
        Some(path) => println!("  resolved = {}", path.display()),
        None => println!("  resolved = (not found)"),
    }
    println!("  script = {}", cfg.renderer.script.display());
    if !cfg.renderer.extra_args.is_empty() {
        println!("  extra_args = {:?}", cfg.renderer.extra_args);
    }
    println!();
    println!("render:");
    println!("  timeout_ms = {}", cfg.render.timeout_ms);
    println!("  max_concurrent = {}", cfg.render.max_concurrent);
    println!("  queue_depth = {}", cfg.render.queue_depth);
    println!("  overload_policy = {:?}", cfg.render.overload_policy);
    println!("  formats = {}", formats.join(", "));
    println!("  work_root = {}", cfg.render.work_root.display());
    println!("  retention_secs = {}", cfg.render.retention_secs);
    println!("  stderr_tail_bytes = {}", cfg.render.stderr_tail_bytes);

    debug!("check complete (server not started)");
}
