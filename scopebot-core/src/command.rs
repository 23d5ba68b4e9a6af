// ABOUTME: Command descriptors and the handler trait command modules implement
// ABOUTME: Descriptors are plain data assembled into a Registry at startup

use crate::message::Message;
use crate::outcome::Outcome;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Which prefix family a command answers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Normal,
    Advanced,
    Admin,
}

impl CommandKind {
    pub const ALL: [CommandKind; 3] = [Self::Normal, Self::Advanced, Self::Admin];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Advanced => "advanced",
            Self::Admin => "admin",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Self::Normal => 0,
            Self::Advanced => 1,
            Self::Admin => 2,
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CommandKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "normal" => Ok(Self::Normal),
            "advanced" => Ok(Self::Advanced),
            "admin" => Ok(Self::Admin),
            _ => anyhow::bail!("Unknown command kind: {} (expected normal, advanced or admin)", s),
        }
    }
}

/// Predicate deciding whether the author of `msg` may run a command
pub type Permission = fn(&Message) -> bool;

pub fn always(_msg: &Message) -> bool {
    true
}

pub fn admin_only(msg: &Message) -> bool {
    msg.is_admin()
}

/// Behavior behind a command node
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Run the command. `Err` is a system failure: it is logged and the
    /// author sees a generic message.
    async fn run(&self, msg: &Message) -> anyhow::Result<Outcome>;

    /// One-time setup after configuration is loaded. Failure aborts startup.
    fn init(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Handler for grouping commands with no behavior of their own
pub struct ShowUsage;

#[async_trait]
impl CommandHandler for ShowUsage {
    async fn run(&self, msg: &Message) -> anyhow::Result<Outcome> {
        Ok(Outcome::missing_args(msg))
    }
}

/// Declarative description of one command node and its subtree
pub struct Command {
    pub id: &'static str,
    pub names: Vec<&'static str>,
    pub description: String,
    /// Argument usage after the command path; derived from the children
    /// when unset
    pub usage: Option<String>,
    pub kind: CommandKind,
    pub category: &'static str,
    /// Id of the enclosing command; `None` for top-level commands
    pub parent: Option<&'static str>,
    /// Inherited from the parent when unset; top-level defaults to [`always`]
    pub permitted: Option<Permission>,
    pub children: Vec<Command>,
    pub handler: Arc<dyn CommandHandler>,
}

impl Command {
    pub fn new(
        id: &'static str,
        kind: CommandKind,
        category: &'static str,
        handler: Arc<dyn CommandHandler>,
    ) -> Self {
        Self {
            id,
            names: Vec::new(),
            description: String::new(),
            usage: None,
            kind,
            category,
            parent: None,
            permitted: None,
            children: Vec::new(),
            handler,
        }
    }

    /// A node that only groups children and shows its usage when invoked
    pub fn group(id: &'static str, kind: CommandKind, category: &'static str) -> Self {
        Self::new(id, kind, category, Arc::new(ShowUsage))
    }

    pub fn names(mut self, names: &[&'static str]) -> Self {
        self.names = names.to_vec();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = Some(usage.into());
        self
    }

    pub fn parent(mut self, parent: &'static str) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn permitted(mut self, permitted: Permission) -> Self {
        self.permitted = Some(permitted);
        self
    }

    pub fn child(mut self, child: Command) -> Self {
        self.children.push(child);
        self
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("id", &self.id)
            .field("names", &self.names)
            .field("kind", &self.kind)
            .field("category", &self.category)
            .field("parent", &self.parent)
            .field("children", &self.children)
            .finish_non_exhaustive()
    }
}
