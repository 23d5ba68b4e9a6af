// ABOUTME: Immutable command tree built and validated once at startup
// ABOUTME: Matches token sequences to command nodes and exports a catalog for docs

use crate::command::{always, Command, CommandHandler, CommandKind, Permission};
use crate::parse::Tokens;
use crate::validate::{validate, ValidationError};
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

/// Index of a node in the registry arena
pub type NodeId = usize;

/// A command after registration: parent and permission resolved
pub struct Node {
    pub id: &'static str,
    pub names: Vec<&'static str>,
    pub description: String,
    /// Argument usage after the command path
    pub usage: String,
    pub kind: CommandKind,
    pub category: &'static str,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub permitted: Permission,
    pub handler: Arc<dyn CommandHandler>,
}

impl Node {
    /// Canonical name (the first one declared)
    pub fn name(&self) -> &'static str {
        self.names.first().copied().unwrap_or(self.id)
    }

    fn answers_to(&self, token: &str) -> bool {
        self.names.iter().any(|n| *n == token)
    }
}

/// Result of walking the tree with a token sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    pub node: NodeId,
    /// Tokens used to reach `node`; the rest are arguments
    pub consumed: usize,
}

/// One command in the reflection catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    pub id: String,
    pub names: Vec<String>,
    pub description: String,
    pub usage: String,
    pub category: String,
    /// Index of the parent entry, -1 for top-level commands
    pub parent: i64,
    pub children: Vec<usize>,
}

pub struct Registry {
    nodes: Vec<Node>,
    roots: [Vec<NodeId>; 3],
}

impl Registry {
    /// Validate `commands` and build the registry. Nothing is registered if
    /// any check fails.
    pub fn build(commands: Vec<Command>) -> Result<Self, ValidationError> {
        validate(&commands)?;

        let mut registry = Self {
            nodes: Vec::new(),
            roots: Default::default(),
        };
        for command in commands {
            let kind = command.kind;
            let id = registry.insert(command, None);
            registry.roots[kind.index()].push(id);
        }

        tracing::info!(
            commands = registry.nodes.len(),
            normal = registry.roots[CommandKind::Normal.index()].len(),
            advanced = registry.roots[CommandKind::Advanced.index()].len(),
            admin = registry.roots[CommandKind::Admin.index()].len(),
            "Command registry built"
        );
        Ok(registry)
    }

    fn insert(&mut self, command: Command, parent: Option<NodeId>) -> NodeId {
        let permitted = command
            .permitted
            .or_else(|| parent.map(|p| self.nodes[p].permitted))
            .unwrap_or(always);

        let Command {
            id,
            names,
            description,
            usage,
            kind,
            category,
            children,
            handler,
            ..
        } = command;

        let usage = usage.unwrap_or_else(|| {
            let options: Vec<&str> = children
                .iter()
                .filter_map(|c| c.names.first().copied())
                .collect();
            if options.is_empty() {
                String::new()
            } else {
                format!("<{}>", options.join("|"))
            }
        });

        let node_id = self.nodes.len();
        self.nodes.push(Node {
            id,
            names,
            description,
            usage,
            kind,
            category,
            parent,
            children: Vec::new(),
            permitted,
            handler,
        });

        for child in children {
            let child_id = self.insert(child, Some(node_id));
            self.nodes[node_id].children.push(child_id);
        }
        node_id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn roots(&self, kind: CommandKind) -> &[NodeId] {
        &self.roots[kind.index()]
    }

    /// Child of `parent` (or top-level command of `kind` when `parent` is
    /// `None`) answering to `token`
    pub fn find_child(
        &self,
        kind: CommandKind,
        parent: Option<NodeId>,
        token: &str,
    ) -> Option<NodeId> {
        let candidates = match parent {
            Some(p) => &self.nodes[p].children,
            None => &self.roots[kind.index()],
        };
        candidates
            .iter()
            .copied()
            .find(|&id| self.nodes[id].answers_to(token))
    }

    /// Walk the tree of `kind` with `tokens`. Descends while the current node
    /// has children and the next token names one of them.
    pub fn resolve(&self, kind: CommandKind, tokens: &Tokens<'_>) -> Option<Match> {
        let first = tokens.get(0)?;
        let mut node = self.find_child(kind, None, first)?;
        let mut consumed = 1;

        while !self.nodes[node].children.is_empty() {
            let Some(token) = tokens.get(consumed) else {
                break;
            };
            match self.find_child(kind, Some(node), token) {
                Some(child) => {
                    node = child;
                    consumed += 1;
                }
                None => break,
            }
        }

        Some(Match { node, consumed })
    }

    /// Ids from the top-level command down to `id`
    pub fn path(&self, id: NodeId) -> Vec<NodeId> {
        let mut path = vec![id];
        let mut current = id;
        while let Some(parent) = self.nodes[current].parent {
            path.push(parent);
            current = parent;
        }
        path.reverse();
        path
    }

    /// Full usage line, e.g. `$nick set <name>`
    pub fn usage_line(&self, id: NodeId, prefix: &str) -> String {
        let names: Vec<&str> = self
            .path(id)
            .into_iter()
            .map(|n| self.nodes[n].name())
            .collect();
        let usage = &self.nodes[id].usage;
        if usage.is_empty() {
            format!("{}{}", prefix, names.join(" "))
        } else {
            format!("{}{} {}", prefix, names.join(" "), usage)
        }
    }

    /// Every node of `kind` in depth-first declaration order, with its depth
    pub fn walk(&self, kind: CommandKind) -> Vec<(NodeId, usize)> {
        let mut out = Vec::new();
        let mut stack: Vec<(NodeId, usize)> = self.roots[kind.index()]
            .iter()
            .rev()
            .map(|&id| (id, 0))
            .collect();
        while let Some((id, depth)) = stack.pop() {
            out.push((id, depth));
            for &child in self.nodes[id].children.iter().rev() {
                stack.push((child, depth + 1));
            }
        }
        out
    }

    /// Run every command's init hook once. Handlers shared between nodes are
    /// initialized once.
    pub fn init_all(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for node in &self.nodes {
            let key = Arc::as_ptr(&node.handler) as *const u8 as usize;
            if !seen.insert(key) {
                continue;
            }
            node.handler
                .init()
                .with_context(|| format!("Failed to initialize command '{}'", node.id))?;
            tracing::debug!(command = node.id, "Command initialized");
        }
        Ok(())
    }

    /// Reflection data for all commands of `kind`, in `walk` order
    pub fn catalog(&self, kind: CommandKind) -> Vec<CatalogEntry> {
        let order = self.walk(kind);
        let index_of = |id: NodeId| order.iter().position(|(n, _)| *n == id);

        order
            .iter()
            .map(|&(id, _)| {
                let node = &self.nodes[id];
                CatalogEntry {
                    id: node.id.to_string(),
                    names: node.names.iter().map(|n| n.to_string()).collect(),
                    description: node.description.clone(),
                    usage: node.usage.clone(),
                    category: node.category.to_string(),
                    parent: node
                        .parent
                        .and_then(index_of)
                        .map(|i| i as i64)
                        .unwrap_or(-1),
                    children: node.children.iter().filter_map(|&c| index_of(c)).collect(),
                }
            })
            .collect()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("commands", &self.nodes.iter().map(|n| n.id).collect::<Vec<_>>())
            .finish()
    }
}
