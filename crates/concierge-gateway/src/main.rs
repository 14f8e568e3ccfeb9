//! concierge-gateway: WebSocket front door for live voice sessions.
//!
//! Browsers connect, send a `start` frame, then stream microphone audio
//! and text. Each user gets one live engine session; envelopes from the
//! session are forwarded back as JSON text frames.

mod connection;
mod protocol;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use concierge_common::{ConciergeError, ConfigError};
use concierge_config::{ConciergeConfig, LogLevel};
use concierge_live::engine::{GeminiLiveConfig, GeminiLiveConnector};
use concierge_live::tools::{HttpBackend, RecentEntityMemory, StaticToolRegistry};
use concierge_live::{
    BackgroundJobBridge, JobBus, OrchestratorSettings, SessionOrchestrator, SessionRegistry,
    StaticPersona, ToolCallDispatcher,
};
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;
use tracing_subscriber::EnvFilter;

use crate::connection::{handle_connection, handle_job_feed, Gateway};

const JOB_BUS_CAPACITY: usize = 256;

const PERSONA: &str = "You are a friendly, efficient real estate concierge. \
Speak in short, natural sentences. Use the available tools to look up and \
update contacts, properties, deals and tasks instead of guessing. Confirm \
before creating or changing records, and keep answers brief unless asked \
for detail.";

#[derive(Parser)]
#[command(name = "concierge-gateway", about = "Live voice session gateway")]
struct Args {
    /// Port to listen on (overrides config).
    #[arg(short, long)]
    port: Option<u16>,

    /// Config file path (defaults to the platform config dir).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter directive, e.g. `concierge=debug`.
    #[arg(long)]
    log_level: Option<String>,
}

fn load_dotenv() {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let candidates = [
        // Workspace root, two levels up from crates/concierge-gateway/
        manifest_dir.join("..").join("..").join(".env"),
        PathBuf::from(".env"),
    ];

    for path in &candidates {
        if let Ok(contents) = std::fs::read_to_string(path) {
            for line in contents.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if let Some((key, value)) = line.split_once('=') {
                    let key = key.trim();
                    let value = value.trim().trim_matches('"').trim_matches('\'');
                    if std::env::var(key).is_err() {
                        std::env::set_var(key, value);
                    }
                }
            }
            return;
        }
    }
}

fn init_logging(directive: Option<&str>, level: LogLevel, json: bool) {
    let filter = match directive {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(level.directive())),
    };
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<ConciergeConfig, ConfigError> {
    match path {
        Some(path) => concierge_config::load_config_from(path),
        None => concierge_config::load_config(),
    }
}

fn build_gateway(config: &ConciergeConfig) -> Result<Gateway, ConciergeError> {
    let api_key = std::env::var(&config.engine.api_key_env).map_err(|_| {
        ConfigError::ValidationError(format!(
            "environment variable {} is not set",
            config.engine.api_key_env
        ))
    })?;
    let connector = GeminiLiveConnector::new(GeminiLiveConfig::from_config(
        &config.engine,
        &config.live,
        api_key,
    ));

    let tools = if config.tools.catalog.trim().is_empty() {
        tracing::warn!("No tool catalog configured; sessions start without tools");
        StaticToolRegistry::default()
    } else {
        StaticToolRegistry::load(Path::new(&config.tools.catalog))
            .map_err(|e| ConciergeError::Catalog(e.to_string()))?
    };
    tracing::info!(tools = tools.len(), "Tool catalog loaded");

    let backend = HttpBackend::from_config(&config.backend)
        .map_err(|e| ConciergeError::Network(e.to_string()))?;
    let backend = Arc::new(backend);
    let dispatcher = ToolCallDispatcher::new(
        Arc::new(tools),
        backend.clone(),
        backend,
        Arc::new(RecentEntityMemory::new()),
    );

    let jobs = JobBus::new(JOB_BUS_CAPACITY);
    let orchestrator = SessionOrchestrator::new(
        SessionRegistry::new(),
        Arc::new(connector),
        Arc::new(StaticPersona(PERSONA.into())),
        Arc::new(dispatcher),
        BackgroundJobBridge::new(jobs.clone(), config.live.job_delivery_instruction.clone()),
        OrchestratorSettings::from_config(&config.live),
    );

    Ok(Gateway {
        orchestrator,
        jobs,
        start_timeout: Duration::from_secs(config.gateway.start_timeout_secs),
        client_channel_capacity: config.gateway.client_channel_capacity,
    })
}

#[tokio::main]
async fn main() -> Result<(), ConciergeError> {
    load_dotenv();
    let args = Args::parse();

    // Logging needs the config's level, so config errors are held until
    // the subscriber exists.
    let loaded = load_config(args.config.as_ref());
    let (level, json) = match &loaded {
        Ok(config) => (config.logging.level, config.logging.json),
        Err(_) => (LogLevel::default(), false),
    };
    init_logging(args.log_level.as_deref(), level, json);
    tracing::info!("concierge-gateway v{} starting", env!("CARGO_PKG_VERSION"));

    let config = match loaded {
        Ok(config) => config,
        Err(e @ ConfigError::ValidationError(_)) => return Err(e.into()),
        Err(e) => {
            tracing::warn!("Config load failed, using defaults: {e}");
            ConciergeConfig::default()
        }
    };

    let gateway = build_gateway(&config)?;

    let port = args.port.unwrap_or(config.gateway.port);
    let addr = format!("{}:{}", config.gateway.host, port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("concierge-gateway listening on {}", addr);

    let feed_listener = TcpListener::bind(&config.gateway.job_feed_addr).await?;
    tracing::info!("Job feed listening on {}", config.gateway.job_feed_addr);
    let jobs = gateway.jobs.clone();
    tokio::spawn(async move {
        loop {
            match feed_listener.accept().await {
                Ok((stream, peer)) => {
                    let jobs = jobs.clone();
                    tokio::spawn(async move {
                        match accept_async(stream).await {
                            Ok(ws) => handle_job_feed(ws, peer, jobs).await,
                            Err(e) => {
                                tracing::warn!(peer = %peer, error = %e, "Job feed handshake failed");
                            }
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Job feed accept error");
                }
            }
        }
    });

    let accept = {
        let gateway = gateway.clone();
        async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        let gateway = gateway.clone();
                        tokio::spawn(async move {
                            match accept_async(stream).await {
                                Ok(ws) => handle_connection(ws, peer, gateway).await,
                                Err(e) => {
                                    tracing::warn!(peer = %peer, error = %e, "WS handshake failed");
                                }
                            }
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "TCP accept error");
                    }
                }
            }
        }
    };

    tokio::select! {
        _ = accept => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::warn!(error = %e, "Signal handler failed");
            }
            tracing::info!("Shutdown requested");
        }
    }

    gateway.orchestrator.shutdown().await;
    Ok(())
}
