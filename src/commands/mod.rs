// ABOUTME: Built-in command modules and the list the binary registers at startup
// ABOUTME: Each module returns its declarative commands; shared state comes in through CommandDeps

pub mod help;
pub mod id;
pub mod nick;
pub mod ticker;

use nick::NickStore;
use scopebot_core::{ActivitySlots, Command};
use std::path::PathBuf;
use std::sync::Arc;

/// State shared by command handlers for the life of the process
#[derive(Clone)]
pub struct CommandDeps {
    pub nicks: Arc<NickStore>,
    pub activities: Arc<ActivitySlots>,
}

impl CommandDeps {
    pub fn new(database: impl Into<PathBuf>) -> Self {
        Self {
            nicks: Arc::new(NickStore::new(database)),
            activities: Arc::new(ActivitySlots::new()),
        }
    }
}

/// Every built-in command, in help order
pub fn all(deps: &CommandDeps) -> Vec<Command> {
    let mut commands = help::commands();
    commands.extend(id::commands());
    commands.extend(nick::commands(Arc::clone(&deps.nicks)));
    commands.extend(ticker::commands(Arc::clone(&deps.activities)));
    commands
}
