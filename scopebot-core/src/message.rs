// ABOUTME: Per-invocation context handed to command handlers
// ABOUTME: Arguments, origin, lazily resolved scopes, and the adapter to reply through

use crate::command::CommandKind;
use crate::platform::{Capability, InboundEvent, PlatformAdapter};
use crate::registry::{Node, NodeId, Registry};
use crate::reply::{RenderTable, Reply};
use crate::resolver::{Here, ResolveError, ScopeResolver};
use crate::scope::{PlaceScopes, Platform, Scope};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Everything a handler knows about the message that invoked it.
///
/// Scopes of the author and the place are resolved on first use, so
/// building a `Message` (and running permission checks) never touches
/// storage.
pub struct Message {
    event: InboundEvent,
    adapter: Arc<dyn PlatformAdapter>,
    registry: Arc<Registry>,
    resolver: ScopeResolver,
    node: NodeId,
    kind: CommandKind,
    prefix: String,
    args: Vec<String>,
    raw_args: String,
    author: OnceCell<Scope>,
    place: OnceCell<PlaceScopes>,
}

/// Matched command and its arguments
#[derive(Debug, Clone)]
pub struct Invocation {
    pub node: NodeId,
    pub kind: CommandKind,
    pub prefix: String,
    pub args: Vec<String>,
    pub raw_args: String,
}

impl Message {
    pub fn new(
        event: InboundEvent,
        adapter: Arc<dyn PlatformAdapter>,
        registry: Arc<Registry>,
        resolver: ScopeResolver,
        invocation: Invocation,
    ) -> Self {
        Self {
            event,
            adapter,
            registry,
            resolver,
            node: invocation.node,
            kind: invocation.kind,
            prefix: invocation.prefix,
            args: invocation.args,
            raw_args: invocation.raw_args,
            author: OnceCell::new(),
            place: OnceCell::new(),
        }
    }

    pub fn event(&self) -> &InboundEvent {
        &self.event
    }

    pub fn platform(&self) -> &Platform {
        &self.event.platform
    }

    pub fn text(&self) -> &str {
        &self.event.text
    }

    pub fn author_id(&self) -> &str {
        &self.event.user_id
    }

    /// Display name, falling back to the native id
    pub fn author_name(&self) -> &str {
        self.event
            .user_name
            .as_deref()
            .unwrap_or(&self.event.user_id)
    }

    pub fn channel_id(&self) -> &str {
        &self.event.channel_id
    }

    pub fn guild_id(&self) -> &str {
        &self.event.guild_id
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }

    /// Argument text exactly as typed, quotes included
    pub fn raw_args(&self) -> &str {
        &self.raw_args
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn command(&self) -> &Node {
        self.registry.node(self.node)
    }

    pub fn node_id(&self) -> NodeId {
        self.node
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Usage line of the matched command, e.g. `$nick set <name>`
    pub fn usage(&self) -> String {
        self.registry.usage_line(self.node, &self.prefix)
    }

    pub fn adapter(&self) -> &Arc<dyn PlatformAdapter> {
        &self.adapter
    }

    pub fn capability(&self) -> Capability {
        self.adapter.capability()
    }

    pub fn is_admin(&self) -> bool {
        self.adapter.is_admin(&self.event.user_id)
    }

    pub fn resolver(&self) -> &ScopeResolver {
        &self.resolver
    }

    pub fn here(&self) -> Here {
        Here {
            platform: self.event.platform.clone(),
            channel_id: self.event.channel_id.clone(),
            guild_id: self.event.guild_id.clone(),
        }
    }

    /// Render `value` with the function the table picks for this platform
    pub fn render<T>(&self, table: &RenderTable<T>, value: &T) -> Reply {
        table.render(self.capability(), value)
    }

    /// Person scope of the author
    pub async fn author_scope(&self) -> Result<Scope, ResolveError> {
        self.author
            .get_or_try_init(|| {
                self.resolver
                    .person_scope(&self.event.platform, &self.event.user_id)
            })
            .await
            .copied()
    }

    /// Channel and guild scopes of the place the message was sent in
    pub async fn place_scopes(&self) -> Result<PlaceScopes, ResolveError> {
        let here = self.here();
        self.place
            .get_or_try_init(|| async move { self.resolver.place_here(&here).await })
            .await
            .copied()
    }

    /// Exact scope of `native_id`, or of here when `None`
    pub async fn exact_scope(&self, native_id: Option<&str>) -> Result<Scope, ResolveError> {
        match native_id {
            None => Ok(self.place_scopes().await?.channel),
            Some(id) => {
                self.resolver
                    .exact_scope(self.adapter.as_ref(), Some(id), &self.here())
                    .await
            }
        }
    }

    /// Logical scope of `native_id`, or of here when `None`
    pub async fn logical_scope(&self, native_id: Option<&str>) -> Result<Scope, ResolveError> {
        match native_id {
            None => Ok(self.place_scopes().await?.logical()),
            Some(id) => {
                self.resolver
                    .logical_scope(self.adapter.as_ref(), Some(id), &self.here())
                    .await
            }
        }
    }

    /// Person scope of `native_user_id`, or of the author when `None`.
    /// Other users must already be known; naming a stranger is a user error.
    pub async fn person_scope(&self, native_user_id: Option<&str>) -> Result<Scope, ResolveError> {
        match native_user_id.map(str::trim) {
            None | Some("") => self.author_scope().await,
            Some(id) if id == self.event.user_id => self.author_scope().await,
            Some(id) => {
                self.resolver
                    .known_person_scope(&self.event.platform, id)
                    .await
            }
        }
    }
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Message")
            .field("platform", &self.event.platform)
            .field("command", &self.command().id)
            .field("kind", &self.kind)
            .field("args", &self.args)
            .field("author", &self.event.user_id)
            .field("channel", &self.event.channel_id)
            .finish_non_exhaustive()
    }
}
