// ABOUTME: Event loop feeding every platform's inbound messages to the dispatcher
// ABOUTME: One task per message; drains in-flight commands on shutdown

use crate::platform::PlatformRegistry;
use anyhow::Result;
use metrics::counter;
use scopebot_core::{Dispatcher, InboundEvent};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_stream::StreamExt;

/// How long shutdown waits for running commands before aborting them
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

async fn handle_event(
    platforms: Arc<PlatformRegistry>,
    dispatcher: Arc<Dispatcher>,
    event: InboundEvent,
) {
    counter!("scopebot_events_total", "platform" => event.platform.to_string()).increment(1);

    let Some(adapter) = platforms.get(&event.platform) else {
        tracing::warn!(platform = %event.platform, "Event from unregistered platform");
        return;
    };

    let platform = event.platform.clone();
    let outcome = dispatcher.dispatch(adapter, event).await;
    tracing::trace!(platform = %platform, ?outcome, "Event handled");
}

fn log_join(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            tracing::error!(error = %e, "Message handler panicked");
        }
    }
}

/// Dispatch events from every registered platform until the streams end or
/// `shutdown` resolves. Returns the number of events received.
pub async fn run(
    platforms: Arc<PlatformRegistry>,
    dispatcher: Arc<Dispatcher>,
    shutdown: impl Future<Output = ()>,
) -> Result<usize> {
    let mut events = platforms.merged_event_stream().await?;
    let mut tasks = JoinSet::new();
    let mut received = 0usize;
    tokio::pin!(shutdown);

    if platforms.is_empty() {
        tracing::warn!("No platforms registered");
    }
    tracing::info!(platforms = ?platforms.platforms(), "Event loop started");

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("Shutdown requested");
                break;
            }
            next = events.next() => match next {
                Some(event) => {
                    received += 1;
                    tasks.spawn(handle_event(
                        Arc::clone(&platforms),
                        Arc::clone(&dispatcher),
                        event,
                    ));
                }
                None => {
                    tracing::info!("All event streams ended");
                    break;
                }
            },
            Some(result) = tasks.join_next(), if !tasks.is_empty() => log_join(result),
        }
    }

    let in_flight = tasks.len();
    if in_flight > 0 {
        tracing::info!(in_flight, "Waiting for running commands");
        let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
            while let Some(result) = tasks.join_next().await {
                log_join(result);
            }
        })
        .await;
        if drained.is_err() {
            tracing::warn!(remaining = tasks.len(), "Aborting commands still running");
            tasks.abort_all();
        }
    }

    tracing::info!(received, "Event loop stopped");
    Ok(received)
}
