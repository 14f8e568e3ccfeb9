//! Full configuration validation.
//!
//! Every section is checked and all problems are collected into a single
//! `ConfigError`.

mod helpers;


use crate::schema::ConciergeConfig;
use concierge_common::ConfigError;

use helpers::{validate_non_empty, validate_range};

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &ConciergeConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    validate_gateway(&mut errors, config);
    validate_engine(&mut errors, config);
    validate_live(&mut errors, config);
    validate_backend(&mut errors, config);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}

fn validate_gateway(errors: &mut Vec<String>, config: &ConciergeConfig) {
    validate_non_empty(errors, "gateway.host", &config.gateway.host);
    validate_range(
        errors,
        "gateway.client_channel_capacity",
        config.gateway.client_channel_capacity as u64,
        16,
        65536,
    );
    validate_range(
        errors,
        "gateway.start_timeout_secs",
        config.gateway.start_timeout_secs,
        1,
        300,
    );
    if config
        .gateway
        .job_feed_addr
        .parse::<std::net::SocketAddr>()
        .is_err()
    {
        errors.push(format!(
            "gateway.job_feed_addr = {} must be a host:port socket address",
            config.gateway.job_feed_addr
        ));
    }
}

fn validate_engine(errors: &mut Vec<String>, config: &ConciergeConfig) {
    let engine = &config.engine;
    if !(engine.url.starts_with("ws://") || engine.url.starts_with("wss://")) {
        errors.push(format!("engine.url = {} must be a ws:// or wss:// URL", engine.url));
    }
    validate_non_empty(errors, "engine.model", &engine.model);
    validate_non_empty(errors, "engine.api_key_env", &engine.api_key_env);
    validate_range(
        errors,
        "engine.connect_timeout_secs",
        engine.connect_timeout_secs,
        1,
        120,
    );
}

fn validate_live(errors: &mut Vec<String>, config: &ConciergeConfig) {
    let live = &config.live;
    validate_range(errors, "live.greeting_delay_ms", live.greeting_delay_ms, 0, 10_000);
    validate_range(
        errors,
        "live.metadata_scan_depth",
        live.metadata_scan_depth as u64,
        1,
        32,
    );
    if live.blocked_source_hosts.iter().any(|h| h.trim().is_empty()) {
        errors.push("live.blocked_source_hosts contains an empty host".into());
    }
}

fn validate_backend(errors: &mut Vec<String>, config: &ConciergeConfig) {
    let backend = &config.backend;
    if !(backend.url.starts_with("http://") || backend.url.starts_with("https://")) {
        errors.push(format!("backend.url = {} must be an http(s) URL", backend.url));
    }
    validate_range(errors, "backend.timeout_secs", backend.timeout_secs, 1, 600);
}
