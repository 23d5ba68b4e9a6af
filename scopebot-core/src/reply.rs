// ABOUTME: Reply payloads (plain text or rich structured) and per-capability rendering
// ABOUTME: Commands pick one render function per invocation from a RenderTable

use crate::platform::Capability;

/// Content a command sends back
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    Rich(RichReply),
}

/// Structured reply for platforms that render embeds or cards
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RichReply {
    pub title: Option<String>,
    pub description: Option<String>,
    pub fields: Vec<RichField>,
    pub footer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RichField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

impl RichReply {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(RichField {
            name: name.into(),
            value: value.into(),
            inline,
        });
        self
    }

    pub fn footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = Some(footer.into());
        self
    }
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn rich(rich: RichReply) -> Self {
        Self::Rich(rich)
    }

    /// Standard usage reply
    pub fn usage(usage: &str) -> Self {
        Self::Rich(RichReply::new().title(format!("Usage: `{}`", usage)))
    }

    /// Flatten to plain text for platforms without rich rendering
    pub fn to_plain(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Rich(rich) => {
                let mut lines = Vec::new();
                if let Some(title) = &rich.title {
                    lines.push(title.clone());
                }
                if let Some(description) = &rich.description {
                    lines.push(description.clone());
                }
                for field in &rich.fields {
                    lines.push(format!("{}: {}", field.name, field.value));
                }
                if let Some(footer) = &rich.footer {
                    lines.push(footer.clone());
                }
                lines.join("\n")
            }
        }
    }
}

/// Render function for one capability
pub type RenderFn<T> = fn(&T) -> Reply;

/// Explicit mapping from platform capability to a render function.
///
/// Built once per command; the function is picked once per invocation with
/// the adapter's [`Capability`], falling back when no entry matches.
pub struct RenderTable<T> {
    entries: Vec<(Capability, RenderFn<T>)>,
    fallback: RenderFn<T>,
}

impl<T> RenderTable<T> {
    pub fn new(fallback: RenderFn<T>) -> Self {
        Self {
            entries: Vec::new(),
            fallback,
        }
    }

    pub fn with(mut self, capability: Capability, render: RenderFn<T>) -> Self {
        self.entries.retain(|(c, _)| *c != capability);
        self.entries.push((capability, render));
        self
    }

    pub fn select(&self, capability: Capability) -> RenderFn<T> {
        self.entries
            .iter()
            .find(|(c, _)| *c == capability)
            .map(|(_, f)| *f)
            .unwrap_or(self.fallback)
    }

    pub fn render(&self, capability: Capability, value: &T) -> Reply {
        (self.select(capability))(value)
    }
}

/// Split `text` into chunks of at most `limit` bytes, preferring to break at
/// newlines, then spaces, never inside a UTF-8 character. A character wider
/// than `limit` becomes a chunk of its own.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    if limit == 0 || text.len() <= limit {
        return vec![text.to_string()];
    }

    let mut parts = Vec::new();
    let mut rest = text;
    while rest.len() > limit {
        let mut cut = limit;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        if cut == 0 {
            cut = rest.chars().next().map_or(1, char::len_utf8);
        }
        let window = &rest[..cut];
        let at = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .filter(|&i| i > 0)
            .unwrap_or(cut);
        parts.push(rest[..at].to_string());
        rest = rest[at..].trim_start_matches(['\n', ' ']);
    }
    if !rest.is_empty() {
        parts.push(rest.to_string());
    }
    parts
}
