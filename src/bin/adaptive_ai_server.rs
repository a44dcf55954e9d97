//! adaptive-ai-server — 自适应 AI 编排服务的 HTTP 入口
//!
//! Usage:
//!   adaptive-ai-server [--config <path>]

use anyhow::Context;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use adaptive_ai_service::server;
use adaptive_ai_service::supervisor::{RestartPolicy, Supervisor, SupervisorState};
use adaptive_ai_service::{AdaptiveAiService, ServiceConfig};

fn print_usage() {
    println!(
        r#"adaptive-ai-server: adaptive AI request orchestration service

USAGE:
    adaptive-ai-server [--config <path>]

OPTIONS:
    -c, --config <path>     YAML configuration file (environment overrides still apply)
    -h, --help              Show this help message
    -V, --version           Show version information

ENVIRONMENT:
    OPENAI_API_KEY, GEMINI_API_KEY    Provider credentials
    ADAPTIVE_AI_PORT / PORT           Listen port (default 3001)
    RUST_LOG                          Log filter (default info)"#
    );
}

fn parse_args() -> anyhow::Result<Option<PathBuf>> {
    let mut args = std::env::args().skip(1);
    let mut config = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-c" | "--config" => {
                let path = args.next().context("--config needs a path")?;
                config = Some(PathBuf::from(path));
            }
            "-h" | "--help" => {
                print_usage();
                std::process::exit(0);
            }
            "-V" | "--version" => {
                println!("adaptive-ai-server {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }
    Ok(config)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config_path = parse_args()?;
    let config = ServiceConfig::load(config_path.as_deref()).context("loading configuration")?;
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid listen address")?;

    let service = Arc::new(AdaptiveAiService::from_config(config).context("building service")?);

    let http_service = Arc::clone(&service);
    let http = Supervisor::spawn(
        "http-server",
        RestartPolicy::new()
            .with_max_restarts(3)
            .with_backoff(Duration::from_secs(1), Duration::from_secs(10)),
        move |stop| server::serve(Arc::clone(&http_service), addr, stop),
    );

    let mut http_state = http.subscribe();
    tokio::select! {
        _ = shutdown_signal() => tracing::info!("shutdown signal received"),
        _ = http_state.wait_for(|s| *s == SupervisorState::Stopped) => {
            tracing::error!(error = ?http.last_error(), "HTTP server stopped unexpectedly");
        }
    }

    http.shutdown().await;
    service.shutdown().await;

    match http.last_error() {
        Some(e) if http.restarts() >= 3 => anyhow::bail!("HTTP server failed: {e}"),
        _ => Ok(()),
    }
}
