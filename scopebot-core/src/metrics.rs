// ABOUTME: Counters for scope creation and command dispatch
// ABOUTME: Optional Prometheus exporter installed at startup when configured

use crate::command::CommandKind;
use crate::scope::ScopeKind;
use anyhow::{Context, Result};
use metrics::counter;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Install the Prometheus exporter listening on `listen` (e.g. "127.0.0.1:9184")
pub fn init_metrics(listen: &str) -> Result<()> {
    let addr: SocketAddr = listen
        .parse()
        .with_context(|| format!("Invalid metrics listen address: {}", listen))?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;
    tracing::info!(%addr, "Prometheus metrics exporter listening");
    Ok(())
}

pub fn record_scope_created(kind: ScopeKind) {
    counter!("scopebot_scopes_created_total", "kind" => kind.as_str()).increment(1);
}

pub fn record_command(kind: CommandKind, command_id: &'static str) {
    counter!(
        "scopebot_commands_total",
        "kind" => kind.as_str(),
        "command" => command_id
    )
    .increment(1);
}

/// `class` is "user" or "system"
pub fn record_dispatch_error(class: &'static str, command_id: &'static str) {
    counter!(
        "scopebot_dispatch_errors_total",
        "class" => class,
        "command" => command_id
    )
    .increment(1);
}
