use std::sync::Arc;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use clap::{Parser, Subcommand};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::EnvFilter;

use wp_domain::config::{Config, ConfigSeverity};
use wp_gateway::api;
use wp_gateway::state::AppState;

#[derive(Parser)]
#[command(name = "wp-gatewayd", about = "workflow orchestration kernel control plane")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP + SSE control plane. Default when no subcommand is given.
    Serve,
    /// Validate configuration and exit non-zero on any error-severity issue.
    ConfigValidate,
    /// Print the effective configuration as JSON.
    ConfigShow,
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => {
            init_tracing();
            let config = Config::load().context("loading configuration")?;
            run_server(Arc::new(config)).await
        }
        Some(Command::ConfigValidate) => {
            let config = Config::load().context("loading configuration")?;
            let issues = config.validate();
            for issue in &issues {
                println!("{issue}");
            }
            if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::ConfigShow) => {
            let config = Config::load().context("loading configuration")?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Some(Command::Version) => {
            println!("wp-gatewayd {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// `WP_LOG_FORMAT=json` (the default) emits structured JSON; anything else
/// falls back to the human-readable formatter.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,wp_gateway=debug"));
    let json = std::env::var("WP_LOG_FORMAT").map(|v| v != "pretty").unwrap_or(true);
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("workflow kernel control plane starting");

    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues.iter().filter(|i| i.severity == ConfigSeverity::Error).count()
        );
    }

    std::fs::create_dir_all(&config.runs.root).with_context(|| format!("creating runs root {}", config.runs.root))?;
    tracing::info!(root = %config.runs.root, "runs root ready");

    let state = AppState::new((*config).clone()).context("building application state")?;
    tracing::info!(in_memory_index = true, "run index ready");

    let cors_layer = build_cors_layer(&config.server.cors);
    let max_concurrent = std::env::var("WP_MAX_CONCURRENT_REQUESTS").ok().and_then(|v| v.parse::<usize>().ok()).unwrap_or(256);

    let app = api::router(state).layer(cors_layer).layer(tower::limit::ConcurrencyLimitLayer::new(max_concurrent));

    let bind_addr = std::env::var("WP_BIND_ADDR").unwrap_or_else(|_| config.server.bind_addr.clone());
    let listener = tokio::net::TcpListener::bind(&bind_addr).await.with_context(|| format!("binding to {bind_addr}"))?;

    tracing::info!(addr = %bind_addr, "workflow kernel control plane listening");
    axum::serve(listener, app).await.context("axum server error")?;
    Ok(())
}

fn build_cors_layer(cors: &wp_domain::config::CorsConfig) -> CorsLayer {
    use axum::http::header;

    if cors.allowed_origins.is_empty() || cors.allowed_origins.iter().any(|o| o == "*") {
        return CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    }

    let origins: Vec<HeaderValue> = cors
        .allowed_origins
        .iter()
        .filter_map(|o| o.parse::<HeaderValue>().inspect_err(|_| tracing::warn!(origin = %o, "invalid CORS origin, skipping")).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}
