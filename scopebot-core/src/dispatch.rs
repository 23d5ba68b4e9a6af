// ABOUTME: Routes inbound messages to commands and delivers exactly one reply
// ABOUTME: Prefix selection, tree matching, permission gate, handler invocation

use crate::command::CommandKind;
use crate::message::{Invocation, Message};
use crate::metrics;
use crate::outcome::Outcome;
use crate::parse::Tokens;
use crate::platform::{InboundEvent, PlatformAdapter};
use crate::registry::Registry;
use crate::reply::Reply;
use crate::resolver::ScopeResolver;
use std::sync::Arc;

/// Shown to the author when a command fails for reasons that are not theirs
pub const SYSTEM_ERROR_REPLY: &str = "Something went wrong while running that command.";

/// Command prefixes, one per kind
#[derive(Debug, Clone)]
pub struct Prefixes {
    /// Longest prefix first so `##` wins over `#`
    entries: Vec<(String, CommandKind)>,
}

impl Prefixes {
    pub fn new(admin: &str, normal: &str, advanced: &str) -> Self {
        let mut entries: Vec<(String, CommandKind)> = [
            (admin, CommandKind::Admin),
            (normal, CommandKind::Normal),
            (advanced, CommandKind::Advanced),
        ]
        .into_iter()
        .filter(|(p, _)| !p.is_empty())
        .map(|(p, k)| (p.to_string(), k))
        .collect();
        entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Self { entries }
    }

    /// Kind selected by the longest matching prefix, the prefix itself, and
    /// the text after it
    pub fn split<'a>(&self, text: &'a str) -> Option<(CommandKind, &str, &'a str)> {
        self.entries.iter().find_map(|(prefix, kind)| {
            text.strip_prefix(prefix.as_str())
                .map(|rest| (*kind, prefix.as_str(), rest))
        })
    }

    pub fn prefix_for(&self, kind: CommandKind) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, k)| *k == kind)
            .map(|(p, _)| p.as_str())
    }
}

impl Default for Prefixes {
    fn default() -> Self {
        Self::new("##", "!", "$")
    }
}

/// What happened to one inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// No command prefix
    NotCommand,
    /// Unknown command, or one the author may not use
    NoMatch,
    Replied { command: &'static str },
    Silent { command: &'static str },
    UserError { command: &'static str },
    SystemError { command: &'static str },
}

pub struct Dispatcher {
    registry: Arc<Registry>,
    resolver: ScopeResolver,
    prefixes: Prefixes,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>, resolver: ScopeResolver, prefixes: Prefixes) -> Self {
        Self {
            registry,
            resolver,
            prefixes,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn prefixes(&self) -> &Prefixes {
        &self.prefixes
    }

    /// Match `event` against the registry and run the command it names.
    ///
    /// Sends at most one reply through `adapter`. Failures to deliver are
    /// logged, not returned: the outcome describes what the command did.
    pub async fn dispatch(
        &self,
        adapter: Arc<dyn PlatformAdapter>,
        event: InboundEvent,
    ) -> DispatchOutcome {
        let text = event.text.trim_start();
        let Some((kind, prefix, rest)) = self.prefixes.split(text) else {
            return DispatchOutcome::NotCommand;
        };

        if kind == CommandKind::Admin && !adapter.is_admin(&event.user_id) {
            tracing::debug!(
                platform = %event.platform,
                user = %event.user_id,
                "Ignoring admin prefix from non-admin"
            );
            return DispatchOutcome::NoMatch;
        }

        let tokens = Tokens::parse(rest);
        let Some(found) = self.registry.resolve(kind, &tokens) else {
            return DispatchOutcome::NoMatch;
        };

        let invocation = Invocation {
            node: found.node,
            kind,
            prefix: prefix.to_string(),
            args: tokens.rest(found.consumed),
            raw_args: tokens.raw_from(found.consumed).to_string(),
        };
        let msg = Message::new(
            event.clone(),
            Arc::clone(&adapter),
            Arc::clone(&self.registry),
            self.resolver.clone(),
            invocation,
        );

        let node = msg.command();
        let command = node.id;
        if !(node.permitted)(&msg) {
            tracing::debug!(
                platform = %event.platform,
                user = %event.user_id,
                command,
                "Permission denied"
            );
            return DispatchOutcome::NoMatch;
        }

        metrics::record_command(kind, command);
        tracing::debug!(
            platform = %event.platform,
            user = %event.user_id,
            channel = %event.channel_id,
            command,
            args = msg.args().len(),
            "Running command"
        );

        let handler = Arc::clone(&node.handler);
        match handler.run(&msg).await {
            Ok(Outcome::Reply(reply)) => {
                deliver(adapter.as_ref(), &event, &reply, false, command).await;
                DispatchOutcome::Replied { command }
            }
            Ok(Outcome::Silent) => DispatchOutcome::Silent { command },
            Ok(Outcome::UserError { error, reply }) => {
                tracing::debug!(command, error = %error, "Command rejected input");
                metrics::record_dispatch_error("user", command);
                let reply = reply.unwrap_or_else(|| Reply::text(error.to_string()));
                deliver(adapter.as_ref(), &event, &reply, true, command).await;
                DispatchOutcome::UserError { command }
            }
            Err(e) => {
                tracing::error!(
                    platform = %event.platform,
                    user = %event.user_id,
                    channel = %event.channel_id,
                    command,
                    error = %format!("{:#}", e),
                    "Command failed"
                );
                metrics::record_dispatch_error("system", command);
                let reply = Reply::text(SYSTEM_ERROR_REPLY);
                deliver(adapter.as_ref(), &event, &reply, true, command).await;
                DispatchOutcome::SystemError { command }
            }
        }
    }
}

async fn deliver(
    adapter: &dyn PlatformAdapter,
    origin: &InboundEvent,
    reply: &Reply,
    is_error: bool,
    command: &'static str,
) {
    if let Err(e) = adapter.send(origin, reply, is_error).await {
        tracing::warn!(
            platform = %origin.platform,
            channel = %origin.channel_id,
            command,
            error = %e,
            "Failed to deliver reply"
        );
    }
}
