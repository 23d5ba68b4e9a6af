// ABOUTME: Per-place nicknames keyed by person scope and logical place scope
// ABOUTME: Normal `nick [name]`, the Advanced `nick show|set|delete` group and Admin `nick get|set|rm`

use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use scopebot_core::{
    Capability, Command, CommandHandler, CommandKind, Message, Outcome, RenderTable, Reply,
    ResolveError, RichReply, Scope, UserError,
};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

const CATEGORY: &str = "people";
pub const MAX_NICK_LEN: usize = 32;

/// Result of trying to claim a nickname
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetNick {
    Set,
    /// Someone else in the same place already uses it
    Taken,
}

/// Nickname table living next to the scope tables.
///
/// The connection is opened by the command init hook, so a broken database
/// path fails startup instead of the first `nick` invocation.
pub struct NickStore {
    db_path: PathBuf,
    db: OnceLock<Mutex<Connection>>,
}

impl NickStore {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            db: OnceLock::new(),
        }
    }

    /// Open the database and create the table. Safe to call more than once.
    pub fn open(&self) -> Result<()> {
        if self.db.get().is_some() {
            return Ok(());
        }

        let conn = Connection::open(&self.db_path)
            .with_context(|| format!("Failed to open nickname database {}", self.db_path.display()))?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS nicknames (
                person_scope INTEGER NOT NULL,
                place_scope INTEGER NOT NULL,
                nick TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(person_scope, place_scope),
                UNIQUE(nick, place_scope)
            );",
        )
        .context("Failed to create nicknames table")?;

        // A concurrent opener may already have set it
        let _ = self.db.set(Mutex::new(conn));
        tracing::debug!(db = %self.db_path.display(), "Nickname store ready");
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db
            .get()
            .context("Nickname store used before it was opened")?
            .lock()
            .map_err(|_| anyhow::anyhow!("nickname database lock poisoned"))
    }

    pub fn get(&self, person: Scope, place: Scope) -> Result<Option<String>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT nick FROM nicknames WHERE person_scope = ?1 AND place_scope = ?2",
            params![person.id(), place.id()],
            |row| row.get(0),
        )
        .optional()
        .context("Failed to look up nickname")
    }

    pub fn set(&self, person: Scope, place: Scope, nick: &str) -> Result<SetNick> {
        let conn = self.conn()?;
        let result = conn.execute(
            "INSERT INTO nicknames (person_scope, place_scope, nick, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(person_scope, place_scope)
             DO UPDATE SET nick = excluded.nick, updated_at = excluded.updated_at",
            params![
                person.id(),
                place.id(),
                nick,
                chrono::Utc::now().to_rfc3339()
            ],
        );
        match result {
            Ok(_) => Ok(SetNick::Set),
            Err(e) if e.sqlite_error_code() == Some(ErrorCode::ConstraintViolation) => {
                Ok(SetNick::Taken)
            }
            Err(e) => Err(e).context("Failed to store nickname"),
        }
    }

    /// Returns whether a nickname was removed
    pub fn delete(&self, person: Scope, place: Scope) -> Result<bool> {
        let conn = self.conn()?;
        let removed = conn
            .execute(
                "DELETE FROM nicknames WHERE person_scope = ?1 AND place_scope = ?2",
                params![person.id(), place.id()],
            )
            .context("Failed to delete nickname")?;
        Ok(removed > 0)
    }
}

fn check_nick(nick: &str) -> Result<&str, UserError> {
    let nick = nick.trim();
    if nick.is_empty() || nick.chars().count() > MAX_NICK_LEN {
        return Err(UserError::InvalidArgument(format!(
            "nicknames are 1 to {} characters",
            MAX_NICK_LEN
        )));
    }
    if nick.chars().any(char::is_control) {
        return Err(UserError::InvalidArgument(
            "nicknames must be a single line".to_string(),
        ));
    }
    Ok(nick)
}

struct NickView {
    who: String,
    /// "here", or "in <place>" when an admin asks about another place
    place: String,
    nick: Option<String>,
}

fn render_plain(view: &NickView) -> Reply {
    match &view.nick {
        Some(nick) => Reply::text(format!("{} is known {} as {}", view.who, view.place, nick)),
        None => Reply::text(format!("{} has no nickname {}", view.who, view.place)),
    }
}

fn render_rich(view: &NickView) -> Reply {
    Reply::rich(
        RichReply::new()
            .title("Nickname")
            .field("Who", view.who.clone(), true)
            .field("Where", view.place.clone(), true)
            .field("Nick", view.nick.as_deref().unwrap_or("(none)"), true),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    /// `nick` shows, `nick <name>` sets
    Quick,
    Show,
    Set,
    Delete,
}

struct Nick {
    store: Arc<NickStore>,
    action: Action,
    views: RenderTable<NickView>,
}

impl Nick {
    fn new(store: Arc<NickStore>, action: Action) -> Arc<Self> {
        Arc::new(Self {
            store,
            action,
            views: RenderTable::new(render_plain).with(Capability::RichText, render_rich),
        })
    }

    async fn show(&self, msg: &Message, user: Option<&str>) -> Result<Outcome> {
        let person = match msg.person_scope(user).await {
            Ok(scope) => scope,
            Err(e) => return e.into_outcome(),
        };
        let place = msg.logical_scope(None).await?;
        let store = Arc::clone(&self.store);
        let nick = tokio::task::spawn_blocking(move || store.get(person, place)).await??;

        let view = NickView {
            who: user.unwrap_or_else(|| msg.author_name()).to_string(),
            place: "here".to_string(),
            nick,
        };
        Ok(Outcome::Reply(msg.render(&self.views, &view)))
    }

    async fn set(&self, msg: &Message, name: &str) -> Result<Outcome> {
        let nick = match check_nick(name) {
            Ok(nick) => nick.to_string(),
            Err(e) => return Ok(e.into()),
        };
        let person = msg.author_scope().await?;
        let place = msg.logical_scope(None).await?;
        let store = Arc::clone(&self.store);
        let stored = nick.clone();
        let result =
            tokio::task::spawn_blocking(move || store.set(person, place, &stored)).await??;

        match result {
            SetNick::Set => {
                tracing::debug!(person = %person, place = %place, nick = %nick, "Nickname set");
                Ok(Outcome::text(format!("You are now known here as {}", nick)))
            }
            SetNick::Taken => Ok(Outcome::user_message(format!(
                "The nickname '{}' is already taken here",
                nick
            ))),
        }
    }

    async fn delete(&self, msg: &Message) -> Result<Outcome> {
        let person = msg.author_scope().await?;
        let place = msg.logical_scope(None).await?;
        let store = Arc::clone(&self.store);
        if tokio::task::spawn_blocking(move || store.delete(person, place)).await?? {
            Ok(Outcome::text("Nickname removed"))
        } else {
            Ok(Outcome::user_message("You have no nickname here"))
        }
    }
}

#[async_trait]
impl CommandHandler for Nick {
    async fn run(&self, msg: &Message) -> Result<Outcome> {
        match self.action {
            Action::Quick if msg.args().is_empty() => self.show(msg, None).await,
            Action::Quick | Action::Set => {
                if msg.args().is_empty() {
                    return Ok(Outcome::missing_args(msg));
                }
                self.set(msg, &msg.args().join(" ")).await
            }
            Action::Show => self.show(msg, msg.arg(0)).await,
            Action::Delete => self.delete(msg).await,
        }
    }

    fn init(&self) -> Result<()> {
        self.store.open()
    }
}

/// Admin variant: every action names the place and the person explicitly
struct ManageNick {
    store: Arc<NickStore>,
    action: Action,
    views: RenderTable<NickView>,
}

impl ManageNick {
    fn new(store: Arc<NickStore>, action: Action) -> Arc<Self> {
        Arc::new(Self {
            store,
            action,
            views: RenderTable::new(render_plain).with(Capability::RichText, render_rich),
        })
    }

    /// Logical scope of `place` and the person scope of `user`. Only `set`
    /// may introduce a person the store has not seen yet.
    async fn target(
        &self,
        msg: &Message,
        place: &str,
        user: &str,
    ) -> Result<(Scope, Scope), ResolveError> {
        let place = msg.logical_scope(Some(place)).await?;
        let person = match self.action {
            Action::Set => msg.resolver().person_scope(msg.platform(), user).await?,
            _ => msg.person_scope(Some(user)).await?,
        };
        Ok((place, person))
    }
}

#[async_trait]
impl CommandHandler for ManageNick {
    async fn run(&self, msg: &Message) -> Result<Outcome> {
        let needed = if self.action == Action::Set { 3 } else { 2 };
        if msg.args().len() < needed {
            return Ok(Outcome::missing_args(msg));
        }
        let (place_id, user) = (msg.args()[0].as_str(), msg.args()[1].as_str());

        let nick = match self.action {
            Action::Set => match check_nick(&msg.args()[2..].join(" ")) {
                Ok(nick) => Some(nick.to_string()),
                Err(e) => return Ok(e.into()),
            },
            _ => None,
        };
        let (place, person) = match self.target(msg, place_id, user).await {
            Ok(target) => target,
            Err(e) => return e.into_outcome(),
        };
        let store = Arc::clone(&self.store);

        // Only set carries a nickname
        match (self.action, nick) {
            (_, Some(nick)) => {
                let stored = nick.clone();
                let result =
                    tokio::task::spawn_blocking(move || store.set(person, place, &stored)).await??;
                match result {
                    SetNick::Set => {
                        tracing::info!(
                            admin = %msg.author_id(),
                            person = %person,
                            place = %place,
                            nick = %nick,
                            "Nickname set by admin"
                        );
                        Ok(Outcome::text(format!(
                            "{} is now known in {} as {}",
                            user, place_id, nick
                        )))
                    }
                    SetNick::Taken => Ok(Outcome::user_message(format!(
                        "The nickname '{}' is already taken in {}",
                        nick, place_id
                    ))),
                }
            }
            (Action::Delete, None) => {
                if tokio::task::spawn_blocking(move || store.delete(person, place)).await?? {
                    tracing::info!(
                        admin = %msg.author_id(),
                        person = %person,
                        place = %place,
                        "Nickname removed by admin"
                    );
                    Ok(Outcome::text(format!("Removed {}'s nickname in {}", user, place_id)))
                } else {
                    Ok(Outcome::user_message(format!(
                        "{} has no nickname in {}",
                        user, place_id
                    )))
                }
            }
            _ => {
                let nick = tokio::task::spawn_blocking(move || store.get(person, place)).await??;
                let view = NickView {
                    who: user.to_string(),
                    place: format!("in {}", place_id),
                    nick,
                };
                Ok(Outcome::Reply(msg.render(&self.views, &view)))
            }
        }
    }

    fn init(&self) -> Result<()> {
        self.store.open()
    }
}

pub fn commands(store: Arc<NickStore>) -> Vec<Command> {
    vec![
        Command::new(
            "nick",
            CommandKind::Normal,
            CATEGORY,
            Nick::new(Arc::clone(&store), Action::Quick),
        )
        .names(&["nick", "nickname"])
        .description("Show your nickname here, or set it")
        .usage("[name]"),
        Command::group("nick.advanced", CommandKind::Advanced, CATEGORY)
            .names(&["nick"])
            .description("Manage nicknames in this place")
            .child(
                Command::new(
                    "nick.show",
                    CommandKind::Advanced,
                    CATEGORY,
                    Nick::new(Arc::clone(&store), Action::Show),
                )
                .names(&["show", "get"])
                .description("Show someone's nickname here")
                .usage("[user]")
                .parent("nick.advanced"),
            )
            .child(
                Command::new(
                    "nick.set",
                    CommandKind::Advanced,
                    CATEGORY,
                    Nick::new(Arc::clone(&store), Action::Set),
                )
                .names(&["set"])
                .description("Set your nickname here")
                .usage("<name>")
                .parent("nick.advanced"),
            )
            .child(
                Command::new(
                    "nick.delete",
                    CommandKind::Advanced,
                    CATEGORY,
                    Nick::new(Arc::clone(&store), Action::Delete),
                )
                .names(&["delete", "rm"])
                .description("Forget your nickname here")
                .parent("nick.advanced"),
            ),
        Command::group("nick.admin", CommandKind::Admin, CATEGORY)
            .names(&["nick"])
            .description("Manage anyone's nickname in any place")
            .child(
                Command::new(
                    "nick.admin.get",
                    CommandKind::Admin,
                    CATEGORY,
                    ManageNick::new(Arc::clone(&store), Action::Show),
                )
                .names(&["get", "show"])
                .description("Show a person's nickname in a place")
                .usage("<place> <person>")
                .parent("nick.admin"),
            )
            .child(
                Command::new(
                    "nick.admin.set",
                    CommandKind::Admin,
                    CATEGORY,
                    ManageNick::new(Arc::clone(&store), Action::Set),
                )
                .names(&["set"])
                .description("Set a person's nickname in a place")
                .usage("<place> <person> <name>")
                .parent("nick.admin"),
            )
            .child(
                Command::new(
                    "nick.admin.rm",
                    CommandKind::Admin,
                    CATEGORY,
                    ManageNick::new(store, Action::Delete),
                )
                .names(&["rm", "delete"])
                .description("Remove a person's nickname in a place")
                .usage("<place> <person>")
                .parent("nick.admin"),
            ),
    ]
}
