// ABOUTME: Help command listing the commands the author may run
// ABOUTME: The Advanced and Admin variants also explain a single command and its subcommands

use anyhow::Result;
use async_trait::async_trait;
use scopebot_core::parse::Tokens;
use scopebot_core::registry::NodeId;
use scopebot_core::{
    Capability, Command, CommandHandler, CommandKind, Message, Outcome, RenderTable, Reply,
    RichReply,
};
use std::sync::Arc;

const CATEGORY: &str = "info";

struct HelpView {
    title: String,
    description: String,
    /// (usage line, description)
    entries: Vec<(String, String)>,
}

fn render_plain(view: &HelpView) -> Reply {
    let mut lines = vec![view.title.clone()];
    if !view.description.is_empty() {
        lines.push(view.description.clone());
    }
    for (usage, description) in &view.entries {
        if description.is_empty() {
            lines.push(format!("  {}", usage));
        } else {
            lines.push(format!("  {} - {}", usage, description));
        }
    }
    Reply::text(lines.join("\n"))
}

fn render_rich(view: &HelpView) -> Reply {
    let mut rich = RichReply::new().title(view.title.clone());
    if !view.description.is_empty() {
        rich = rich.description(view.description.clone());
    }
    for (usage, description) in &view.entries {
        rich = rich.field(usage.clone(), description.clone(), false);
    }
    Reply::rich(rich)
}

struct Help {
    views: RenderTable<HelpView>,
}

impl Help {
    fn visible(&self, msg: &Message, id: NodeId) -> bool {
        (msg.registry().node(id).permitted)(msg)
    }

    fn entry(&self, msg: &Message, id: NodeId) -> (String, String) {
        let registry = msg.registry();
        (
            registry.usage_line(id, msg.prefix()),
            registry.node(id).description.clone(),
        )
    }

    fn list(&self, msg: &Message) -> HelpView {
        let entries = msg
            .registry()
            .roots(msg.kind())
            .iter()
            .copied()
            .filter(|&id| self.visible(msg, id))
            .map(|id| self.entry(msg, id))
            .collect();
        HelpView {
            title: format!("{} commands", msg.kind()),
            description: String::new(),
            entries,
        }
    }

    fn detail(&self, msg: &Message, id: NodeId) -> HelpView {
        let node = msg.registry().node(id);
        let entries = node
            .children
            .iter()
            .copied()
            .filter(|&child| self.visible(msg, child))
            .map(|child| self.entry(msg, child))
            .collect();
        HelpView {
            title: msg.registry().usage_line(id, msg.prefix()),
            description: node.description.clone(),
            entries,
        }
    }
}

#[async_trait]
impl CommandHandler for Help {
    async fn run(&self, msg: &Message) -> Result<Outcome> {
        if msg.kind() == CommandKind::Normal || msg.args().is_empty() {
            return Ok(Outcome::Reply(msg.render(&self.views, &self.list(msg))));
        }

        let tokens = Tokens::parse(msg.raw_args());
        match msg.registry().resolve(msg.kind(), &tokens) {
            // Hidden commands read as unknown ones
            Some(found) if self.visible(msg, found.node) => {
                Ok(Outcome::Reply(msg.render(&self.views, &self.detail(msg, found.node))))
            }
            _ => Ok(Outcome::user_message(format!(
                "No command named '{}'",
                msg.raw_args()
            ))),
        }
    }
}

pub fn commands() -> Vec<Command> {
    let help = Arc::new(Help {
        views: RenderTable::new(render_plain).with(Capability::RichText, render_rich),
    });

    vec![
        Command::new("help", CommandKind::Normal, CATEGORY, help.clone())
            .names(&["help", "commands"])
            .description("List the commands you can use"),
        Command::new("help.advanced", CommandKind::Advanced, CATEGORY, help.clone())
            .names(&["help"])
            .description("List commands, or explain one")
            .usage("[command]"),
        Command::new("help.admin", CommandKind::Admin, CATEGORY, help)
            .names(&["help"])
            .description("List admin commands, or explain one")
            .usage("[command]"),
    ]
}
