// ABOUTME: Platform registry that manages multiple chat platform adapters
// ABOUTME: Merges their event streams and coordinates shutdown

use anyhow::Result;
use futures_util::stream::SelectAll;
use scopebot_core::{EventStream, Platform, PlatformAdapter};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Registry of all active chat platforms, keyed by platform name
#[derive(Default)]
pub struct PlatformRegistry {
    platforms: HashMap<Platform, Arc<dyn PlatformAdapter>>,
}

impl PlatformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its platform name, replacing any previous one
    pub fn register(&mut self, adapter: Arc<dyn PlatformAdapter>) {
        let platform = adapter.platform().clone();
        tracing::info!(platform = %platform, "Platform registered");
        self.platforms.insert(platform, adapter);
    }

    pub fn get(&self, platform: &Platform) -> Option<Arc<dyn PlatformAdapter>> {
        self.platforms.get(platform).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.platforms.is_empty()
    }

    pub fn platforms(&self) -> Vec<Platform> {
        self.platforms.keys().cloned().collect()
    }

    /// One stream of events from every registered platform
    pub async fn merged_event_stream(&self) -> Result<EventStream> {
        let mut select_all = SelectAll::<EventStream>::new();
        for adapter in self.platforms.values() {
            select_all.push(adapter.event_stream().await?);
        }
        Ok(Box::pin(select_all))
    }

    /// Gracefully shut down all platforms with a 10-second timeout
    pub async fn shutdown(&self) {
        let futures: Vec<_> = self.platforms.values().map(|p| p.shutdown()).collect();

        match tokio::time::timeout(
            Duration::from_secs(10),
            futures_util::future::join_all(futures),
        )
        .await
        {
            Ok(results) => {
                for err in results.into_iter().filter_map(Result::err) {
                    tracing::warn!(error = %err, "Platform shutdown failed");
                }
            }
            Err(_) => tracing::warn!("Timed out waiting for platforms to shut down"),
        }
    }
}
