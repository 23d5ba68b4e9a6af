// ABOUTME: Traits every chat platform adapter implements
// ABOUTME: Identifier classification, reply delivery, and the inbound event stream

use crate::reply::Reply;
use crate::scope::Platform;
use anyhow::Result;
use async_trait::async_trait;
use std::pin::Pin;
use tokio_stream::Stream;

// =============================================================================
// Inbound Events
// =============================================================================

/// A chat message normalized by its platform adapter
#[derive(Debug, Clone)]
pub struct InboundEvent {
    /// Which platform this message came from
    pub platform: Platform,
    /// Platform-specific message id, empty when the platform has none
    pub message_id: String,
    /// Native id of the author
    pub user_id: String,
    /// Display name of the author, if the platform provides one
    pub user_name: Option<String>,
    /// Native id of the channel the message was sent in
    pub channel_id: String,
    /// Native id of the containing guild; empty for DMs and guild-less platforms
    pub guild_id: String,
    /// Raw message text
    pub text: String,
}

/// Boxed stream type for platform events
pub type EventStream = Pin<Box<dyn Stream<Item = InboundEvent> + Send>>;

// =============================================================================
// Identifier Classification
// =============================================================================

/// What a native identifier refers to, with canonical native ids
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Guild {
        guild_id: String,
    },
    Channel {
        channel_id: String,
        /// Empty when the channel has no guild
        guild_id: String,
    },
    /// Recognized as a thread; no adapter resolves these yet
    Thread,
    Unrecognized,
}

/// Asks the platform what an identifier names
#[async_trait]
pub trait PlaceClassifier: Send + Sync {
    async fn classify(&self, native_id: &str) -> Result<Classification>;
}

// =============================================================================
// Adapter
// =============================================================================

/// Rendering capability of a platform, used to pick a render function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    PlainText,
    RichText,
}

/// Reference to a message the bot sent, for later edits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHandle {
    pub platform: Platform,
    pub channel_id: String,
    pub message_id: String,
}

/// A chat platform as seen by the dispatcher.
///
/// The adapter owns protocol details: it produces [`InboundEvent`]s, renders
/// [`Reply`] values in its own format, and answers identifier questions for
/// the scope resolver.
#[async_trait]
pub trait PlatformAdapter: PlaceClassifier {
    /// Platform identifier
    fn platform(&self) -> &Platform;

    fn capability(&self) -> Capability {
        Capability::PlainText
    }

    /// Whether `user_id` may use administrative commands
    fn is_admin(&self, user_id: &str) -> bool {
        let _ = user_id;
        false
    }

    /// Receive incoming messages as a stream
    async fn event_stream(&self) -> Result<EventStream>;

    /// Reply to `origin`. `is_error` lets the platform style user-facing
    /// failures differently.
    async fn send(&self, origin: &InboundEvent, reply: &Reply, is_error: bool)
        -> Result<MessageHandle>;

    /// Replace the content of a message sent earlier
    async fn edit(&self, handle: &MessageHandle, reply: &Reply) -> Result<()> {
        let _ = (handle, reply);
        anyhow::bail!("{} does not support editing messages", self.platform())
    }

    fn supports_edit(&self) -> bool {
        false
    }

    /// Gracefully shut down the platform connection
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}
