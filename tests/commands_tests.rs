// ABOUTME: Integration tests for the built-in commands running through the dispatcher
// ABOUTME: Uses a recording mock platform and a temporary SQLite database

use anyhow::Result;
use async_trait::async_trait;
use scopebot::commands::{self, CommandDeps};
use scopebot_core::{
    Classification, DispatchOutcome, Dispatcher, EventStream, InboundEvent, MessageHandle,
    PlaceClassifier, Platform, PlatformAdapter, Prefixes, Registry, Reply, ScopeResolver,
    ScopeStore,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

// =============================================================================
// Mock platform
// =============================================================================

struct MockAdapter {
    platform: Platform,
    edits_supported: bool,
    sent: Mutex<Vec<(String, bool)>>,
    edits: Mutex<Vec<(String, String)>>,
    next_id: AtomicU64,
}

impl MockAdapter {
    fn new(edits_supported: bool) -> Arc<Self> {
        Arc::new(Self {
            platform: Platform::new("mock").unwrap(),
            edits_supported,
            sent: Mutex::new(Vec::new()),
            edits: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        })
    }

    fn sent(&self) -> Vec<(String, bool)> {
        self.sent.lock().unwrap().clone()
    }

    fn edits(&self) -> Vec<(String, String)> {
        self.edits.lock().unwrap().clone()
    }
}

#[async_trait]
impl PlaceClassifier for MockAdapter {
    async fn classify(&self, native_id: &str) -> Result<Classification> {
        Ok(match native_id {
            "home" | "away" => Classification::Guild {
                guild_id: native_id.to_string(),
            },
            "general" | "random" => Classification::Channel {
                channel_id: native_id.to_string(),
                guild_id: "home".into(),
            },
            _ => Classification::Unrecognized,
        })
    }
}

#[async_trait]
impl PlatformAdapter for MockAdapter {
    fn platform(&self) -> &Platform {
        &self.platform
    }

    async fn event_stream(&self) -> Result<EventStream> {
        Ok(Box::pin(tokio_stream::empty::<InboundEvent>()))
    }

    async fn send(
        &self,
        origin: &InboundEvent,
        reply: &Reply,
        is_error: bool,
    ) -> Result<MessageHandle> {
        self.sent.lock().unwrap().push((reply.to_plain(), is_error));
        Ok(MessageHandle {
            platform: self.platform.clone(),
            channel_id: origin.channel_id.clone(),
            message_id: self.next_id.fetch_add(1, Ordering::Relaxed).to_string(),
        })
    }

    async fn edit(&self, handle: &MessageHandle, reply: &Reply) -> Result<()> {
        self.edits
            .lock()
            .unwrap()
            .push((handle.message_id.clone(), reply.to_plain()));
        Ok(())
    }

    fn supports_edit(&self) -> bool {
        self.edits_supported
    }

    fn is_admin(&self, user_id: &str) -> bool {
        user_id == "root"
    }
}

// =============================================================================
// Harness
// =============================================================================

struct Bot {
    dispatcher: Dispatcher,
    adapter: Arc<MockAdapter>,
    dir: TempDir,
}

impl Bot {
    fn new(edits_supported: bool) -> Self {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("bot.db");
        let store = Arc::new(ScopeStore::open(&db).unwrap());
        let deps = CommandDeps::new(&db);
        let registry = Registry::build(commands::all(&deps)).unwrap();
        registry.init_all().unwrap();

        Self {
            dispatcher: Dispatcher::new(
                Arc::new(registry),
                ScopeResolver::new(store),
                Prefixes::default(),
            ),
            adapter: MockAdapter::new(edits_supported),
            dir,
        }
    }

    async fn say(&self, user: &str, channel: &str, guild: &str, text: &str) -> DispatchOutcome {
        let event = InboundEvent {
            platform: self.adapter.platform.clone(),
            message_id: String::new(),
            user_id: user.to_string(),
            user_name: None,
            channel_id: channel.to_string(),
            guild_id: guild.to_string(),
            text: text.to_string(),
        };
        let adapter: Arc<dyn PlatformAdapter> = self.adapter.clone();
        self.dispatcher.dispatch(adapter, event).await
    }

    /// Shorthand for alice in #general of the home guild
    async fn alice(&self, text: &str) -> DispatchOutcome {
        self.say("alice", "general", "home", text).await
    }

    /// Number of rows `sql` counts in the bot database
    fn count(&self, sql: &str) -> i64 {
        let conn = rusqlite::Connection::open(self.dir.path().join("bot.db")).unwrap();
        conn.query_row(sql, [], |row| row.get(0)).unwrap()
    }

    fn last(&self) -> (String, bool) {
        self.adapter.sent().last().cloned().unwrap()
    }
}

async fn wait_for<F: Fn() -> bool>(condition: F) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("condition not met in time");
}

// =============================================================================
// help
// =============================================================================

#[tokio::test]
async fn test_help_lists_commands_of_invoking_kind() {
    let bot = Bot::new(false);
    assert_eq!(
        bot.alice("!help").await,
        DispatchOutcome::Replied { command: "help" }
    );
    let (text, is_error) = bot.last();
    assert!(!is_error);
    assert!(text.starts_with("normal commands"));
    assert!(text.contains("!help - List the commands you can use"));
    assert!(text.contains("!nick [name] - Show your nickname here, or set it"));
    assert!(!text.contains("ticker"));
}

#[tokio::test]
async fn test_advanced_help_explains_one_command() {
    let bot = Bot::new(false);
    bot.alice("$help nick").await;
    let (text, _) = bot.last();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "$nick <show|set|delete>");
    assert_eq!(lines[1], "Manage nicknames in this place");
    assert!(lines.contains(&"  $nick show [user] - Show someone's nickname here"));
    assert!(lines.contains(&"  $nick set <name> - Set your nickname here"));
}

#[tokio::test]
async fn test_advanced_help_descends_into_subcommands() {
    let bot = Bot::new(false);
    bot.alice("$help ticker start").await;
    let (text, _) = bot.last();
    assert!(text.starts_with("$ticker start [seconds] [count]"));
}

#[tokio::test]
async fn test_help_for_unknown_command() {
    let bot = Bot::new(false);
    assert_eq!(
        bot.alice("$help bogus").await,
        DispatchOutcome::UserError {
            command: "help.advanced"
        }
    );
    assert_eq!(bot.last(), ("No command named 'bogus'".to_string(), true));
}

// =============================================================================
// nick
// =============================================================================

#[tokio::test]
async fn test_nick_is_shared_across_channels_of_a_guild() {
    let bot = Bot::new(false);
    bot.alice("!nick Al").await;
    assert_eq!(bot.last(), ("You are now known here as Al".to_string(), false));

    bot.say("alice", "random", "home", "!nick").await;
    assert_eq!(bot.last().0, "alice is known here as Al");

    bot.say("bob", "random", "home", "$nick show alice").await;
    assert_eq!(bot.last().0, "alice is known here as Al");
}

#[tokio::test]
async fn test_nick_taken_in_same_place() {
    let bot = Bot::new(false);
    bot.alice("!nick Al").await;

    assert_eq!(
        bot.say("bob", "random", "home", "$nick set Al").await,
        DispatchOutcome::UserError {
            command: "nick.set"
        }
    );
    assert_eq!(
        bot.last(),
        ("The nickname 'Al' is already taken here".to_string(), true)
    );

    // A different guild is a different place
    bot.say("bob", "lobby", "away", "$nick set Al").await;
    assert_eq!(bot.last(), ("You are now known here as Al".to_string(), false));
}

#[tokio::test]
async fn test_nick_in_guildless_channel_is_per_channel() {
    let bot = Bot::new(false);
    bot.say("alice", "dm-1", "", "!nick Ally").await;
    bot.say("alice", "dm-2", "", "!nick").await;
    assert_eq!(bot.last().0, "alice has no nickname here");
    bot.say("alice", "dm-1", "", "!nick").await;
    assert_eq!(bot.last().0, "alice is known here as Ally");
}

#[tokio::test]
async fn test_nick_quoted_name() {
    let bot = Bot::new(false);
    bot.alice(r#"$nick set "Big Al""#).await;
    assert_eq!(bot.last().0, "You are now known here as Big Al");

    bot.alice("$nick set O'Brien").await;
    assert_eq!(bot.last().0, "You are now known here as O'Brien");
}

#[tokio::test]
async fn test_nick_set_without_name_shows_usage() {
    let bot = Bot::new(false);
    assert_eq!(
        bot.alice("$nick set").await,
        DispatchOutcome::UserError {
            command: "nick.set"
        }
    );
    assert_eq!(bot.last(), ("Usage: `$nick set <name>`".to_string(), true));
}

#[tokio::test]
async fn test_nick_group_without_subcommand_shows_usage() {
    let bot = Bot::new(false);
    bot.alice("$nick").await;
    assert_eq!(
        bot.last(),
        ("Usage: `$nick <show|set|delete>`".to_string(), true)
    );
}

#[tokio::test]
async fn test_nick_rejects_overlong_name() {
    let bot = Bot::new(false);
    bot.alice(&format!("!nick {}", "x".repeat(40))).await;
    assert_eq!(
        bot.last(),
        (
            "invalid argument: nicknames are 1 to 32 characters".to_string(),
            true
        )
    );
}

#[tokio::test]
async fn test_nick_delete() {
    let bot = Bot::new(false);
    bot.alice("$nick delete").await;
    assert_eq!(bot.last(), ("You have no nickname here".to_string(), true));

    bot.alice("!nick Al").await;
    bot.alice("$nick rm").await;
    assert_eq!(bot.last(), ("Nickname removed".to_string(), false));
    bot.alice("!nick").await;
    assert_eq!(bot.last().0, "alice has no nickname here");
}

#[tokio::test]
async fn test_looking_up_strangers_creates_no_users() {
    let bot = Bot::new(false);
    bot.alice("!nick").await;

    for n in 0..5 {
        assert_eq!(
            bot.alice(&format!("$nick show ghost-{}", n)).await,
            DispatchOutcome::UserError {
                command: "nick.show"
            }
        );
    }
    assert_eq!(
        bot.last(),
        ("I don't know anyone called 'ghost-4'".to_string(), true)
    );
    assert_eq!(
        bot.alice("$id who nobody").await,
        DispatchOutcome::UserError {
            command: "id.person"
        }
    );

    assert_eq!(bot.count("SELECT COUNT(*) FROM platform_mock_users"), 1);
    assert_eq!(
        bot.count("SELECT COUNT(*) FROM scopes WHERE kind = 'user'"),
        1
    );
}

// =============================================================================
// admin
// =============================================================================

#[tokio::test]
async fn test_admin_commands_are_invisible_to_others() {
    let bot = Bot::new(false);
    assert_eq!(bot.alice("##help").await, DispatchOutcome::NoMatch);
    assert_eq!(bot.alice("##nick get home alice").await, DispatchOutcome::NoMatch);
    assert!(bot.adapter.sent().is_empty());

    assert_eq!(
        bot.say("root", "general", "home", "##help").await,
        DispatchOutcome::Replied {
            command: "help.admin"
        }
    );
    let (text, _) = bot.last();
    assert!(text.starts_with("admin commands"), "got: {}", text);
    assert!(text.contains("##nick <get|set|rm>"), "got: {}", text);
}

#[tokio::test]
async fn test_admin_manages_nicks_in_other_places() {
    let bot = Bot::new(false);
    bot.alice("!nick Al").await;

    // Asked from a DM; random is a channel of the home guild
    bot.say("root", "dm-9", "", "##nick get random alice").await;
    assert_eq!(bot.last(), ("alice is known in random as Al".to_string(), false));

    bot.say("root", "dm-9", "", "##nick set away alice Wanderer").await;
    assert_eq!(
        bot.last(),
        ("alice is now known in away as Wanderer".to_string(), false)
    );
    bot.say("alice", "lobby", "away", "!nick").await;
    assert_eq!(bot.last().0, "alice is known here as Wanderer");

    assert_eq!(
        bot.say("root", "dm-9", "", "##nick rm home alice").await,
        DispatchOutcome::Replied {
            command: "nick.admin.rm"
        }
    );
    assert_eq!(
        bot.last(),
        ("Removed alice's nickname in home".to_string(), false)
    );
    bot.alice("!nick").await;
    assert_eq!(bot.last().0, "alice has no nickname here");
}

#[tokio::test]
async fn test_admin_nick_errors() {
    let bot = Bot::new(false);
    bot.alice("!nick Al").await;

    assert_eq!(
        bot.say("root", "general", "home", "##nick set home alice").await,
        DispatchOutcome::UserError {
            command: "nick.admin.set"
        }
    );
    assert_eq!(
        bot.last(),
        (
            "Usage: `##nick set <place> <person> <name>`".to_string(),
            true
        )
    );

    bot.say("root", "general", "home", "##nick get home ghost").await;
    assert_eq!(
        bot.last(),
        ("I don't know anyone called 'ghost'".to_string(), true)
    );

    bot.say("root", "general", "home", "##nick set nowhere alice X").await;
    assert_eq!(
        bot.last(),
        (
            "I don't know a channel or server called 'nowhere'".to_string(),
            true
        )
    );

    // Nick uniqueness still holds for admins
    bot.say("root", "general", "home", "##nick set home bob Al").await;
    assert_eq!(
        bot.last(),
        ("The nickname 'Al' is already taken in home".to_string(), true)
    );
}

// =============================================================================
// id
// =============================================================================

#[tokio::test]
async fn test_id_place_here() {
    let bot = Bot::new(false);
    bot.alice("$id place").await;
    let (text, is_error) = bot.last();
    assert!(!is_error);
    assert!(text.starts_with("here: exact "));
    assert!(text.contains("(channel general)"));
    assert!(text.contains("(guild home)"));
}

#[tokio::test]
async fn test_id_place_of_remote_guild() {
    let bot = Bot::new(false);
    bot.alice("$id where away").await;
    let (text, _) = bot.last();
    assert!(text.starts_with("away: exact "));
    // A guild is its own logical scope
    let scopes: Vec<&str> = text.matches("(guild away)").collect();
    assert_eq!(scopes.len(), 2);
}

#[tokio::test]
async fn test_id_place_unknown() {
    let bot = Bot::new(false);
    assert_eq!(
        bot.alice("$id place nowhere").await,
        DispatchOutcome::UserError { command: "id.place" }
    );
    assert_eq!(
        bot.last(),
        (
            "I don't know a channel or server called 'nowhere'".to_string(),
            true
        )
    );
}

#[tokio::test]
async fn test_id_place_without_guild() {
    let bot = Bot::new(false);
    bot.say("alice", "dm-1", "", "$id place").await;
    let (text, _) = bot.last();
    let scopes: Vec<&str> = text.matches("(channel dm-1)").collect();
    assert_eq!(scopes.len(), 2, "logical scope should be the channel: {}", text);
}

#[tokio::test]
async fn test_id_person_is_stable() {
    let bot = Bot::new(false);
    bot.alice("$id person").await;
    let mine = bot.last().0;
    assert!(mine.starts_with("alice: person "));

    bot.say("bob", "random", "home", "$id who alice").await;
    assert_eq!(bot.last().0, mine);
}

// =============================================================================
// ticker
// =============================================================================

#[tokio::test]
async fn test_ticker_edits_its_message() {
    let bot = Bot::new(true);
    assert_eq!(
        bot.alice("$ticker start 1 1").await,
        DispatchOutcome::Silent {
            command: "ticker.start"
        }
    );
    assert_eq!(
        bot.adapter.sent(),
        vec![("Ticker started: 1 ticks every 1s".to_string(), false)]
    );

    wait_for(|| !bot.adapter.edits().is_empty()).await;
    let edits = bot.adapter.edits();
    assert_eq!(edits[0].0, "1");
    assert!(edits[0].1.starts_with("Tick 1/1 at "));
    assert_eq!(bot.adapter.sent().len(), 1);
}

#[tokio::test]
async fn test_ticker_posts_without_edit_support() {
    let bot = Bot::new(false);
    bot.alice("$ticker start 1 1").await;
    wait_for(|| bot.adapter.sent().len() == 2).await;
    assert!(bot.adapter.sent()[1].0.starts_with("Tick 1/1 at "));
    assert!(bot.adapter.edits().is_empty());
}

#[tokio::test]
async fn test_ticker_stop() {
    let bot = Bot::new(true);
    bot.alice("$ticker start 60 5").await;

    bot.alice("$ticker stop").await;
    assert_eq!(bot.last(), ("Ticker stopped".to_string(), false));

    bot.alice("$ticker stop").await;
    assert_eq!(bot.last(), ("No ticker is running here".to_string(), true));
}

#[tokio::test]
async fn test_ticker_pause_and_resume() {
    let bot = Bot::new(true);
    bot.alice("$ticker start 60 5").await;

    bot.alice("$ticker pause").await;
    assert_eq!(bot.last(), ("Ticker paused".to_string(), false));
    bot.alice("$ticker pause").await;
    assert_eq!(
        bot.last(),
        ("No running ticker to pause here".to_string(), true)
    );

    bot.alice("$ticker resume").await;
    assert_eq!(bot.last(), ("Ticker resumed".to_string(), false));
    bot.alice("$ticker resume").await;
    assert_eq!(
        bot.last(),
        ("No paused ticker to resume here".to_string(), true)
    );

    bot.alice("$ticker stop").await;
    assert_eq!(bot.last(), ("Ticker stopped".to_string(), false));
}

#[tokio::test]
async fn test_tickers_are_per_place() {
    let bot = Bot::new(true);
    bot.alice("$ticker start 60 5").await;

    // Another channel of the same guild shares the logical place
    bot.say("bob", "random", "home", "$ticker pause").await;
    assert_eq!(bot.last(), ("Ticker paused".to_string(), false));

    bot.say("bob", "dm-1", "", "$ticker stop").await;
    assert_eq!(bot.last(), ("No ticker is running here".to_string(), true));

    bot.alice("$ticker stop").await;
    assert_eq!(bot.last(), ("Ticker stopped".to_string(), false));
}

#[tokio::test]
async fn test_ticker_rejects_bad_interval() {
    let bot = Bot::new(true);
    bot.alice("$ticker start 0").await;
    assert_eq!(
        bot.last(),
        (
            "invalid argument: interval must be a whole number from 1 to 3600".to_string(),
            true
        )
    );
}
