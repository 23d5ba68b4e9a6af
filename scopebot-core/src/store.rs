// ABOUTME: Durable SQLite mapping from (platform, native id) to canonical scopes
// ABOUTME: Lazy idempotent creation with per-operation transactions and conflict re-select

use crate::metrics;
use crate::scope::{InvalidPlatform, PlaceScopes, Platform, Scope, ScopeKind};
use rusqlite::{
    params, Connection, ErrorCode, OptionalExtension, Transaction, TransactionBehavior,
};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

/// How long a connection waits on SQLite's write lock before reporting busy
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Attempts for an operation that keeps hitting SQLITE_BUSY
const MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} '{native_id}' has no scope on {platform}")]
    NotFound {
        platform: String,
        kind: ScopeKind,
        native_id: String,
    },

    #[error("scope {0} does not exist")]
    UnknownScope(Scope),

    #[error("native {0} id must not be empty")]
    EmptyId(&'static str),

    #[error(transparent)]
    InvalidPlatform(#[from] InvalidPlatform),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to prepare database directory: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::UnknownScope(_))
    }

    fn is_busy(&self) -> bool {
        match self {
            Self::Sqlite(e) => matches!(
                e.sqlite_error_code(),
                Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
            ),
            _ => false,
        }
    }
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    e.sqlite_error_code() == Some(ErrorCode::ConstraintViolation)
}

fn not_found(platform: &Platform, kind: ScopeKind, native_id: &str) -> StoreError {
    StoreError::NotFound {
        platform: platform.to_string(),
        kind,
        native_id: native_id.to_string(),
    }
}

fn table_exists(conn: &Connection, name: &str) -> Result<bool, StoreError> {
    let found = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![name],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Everything the store knows about one scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopeInfo {
    pub scope: Scope,
    pub platform: Platform,
    pub kind: ScopeKind,
    pub native_id: String,
    pub is_sentinel: bool,
    /// Guild scope for channels, `None` otherwise
    pub parent: Option<Scope>,
}

/// Scope store backed by a SQLite file.
///
/// Every operation opens its own connection and transaction. Racing creators
/// of the same native id are kept apart by the UNIQUE constraints on the
/// platform tables; the loser re-selects the winning row.
#[derive(Debug)]
pub struct ScopeStore {
    db_path: PathBuf,
    initialized: Mutex<HashSet<Platform>>,
}

impl ScopeStore {
    /// Open (or create) the scope database at `db_path`
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self, StoreError> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let store = Self {
            db_path,
            initialized: Mutex::new(HashSet::new()),
        };

        let conn = store.connect()?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS scopes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                platform TEXT NOT NULL,
                kind TEXT NOT NULL,
                is_sentinel INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );
            CREATE UNIQUE INDEX IF NOT EXISTS scopes_one_sentinel_per_platform
                ON scopes(platform) WHERE is_sentinel = 1;",
        )?;

        tracing::info!(
            db = %store.db_path.display(),
            journal_mode = %mode,
            "ScopeStore initialized"
        );

        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open(&self.db_path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    /// Run `op` on a fresh connection, retrying while SQLite reports busy
    fn retrying<T>(
        &self,
        op: &'static str,
        mut f: impl FnMut(&mut Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut conn = self.connect()?;
        let mut attempt = 1;
        loop {
            match f(&mut conn) {
                Err(e) if e.is_busy() && attempt < MAX_ATTEMPTS => {
                    tracing::warn!(op, attempt, error = %e, "Scope store busy, retrying");
                    std::thread::sleep(Duration::from_millis(20 * u64::from(attempt)));
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Create the platform's guild/channel/user tables and its no-guild
    /// sentinel. Idempotent; called lazily by every operation.
    pub fn ensure_platform(&self, platform: &Platform) -> Result<(), StoreError> {
        if self
            .initialized
            .lock()
            .map(|set| set.contains(platform))
            .unwrap_or(false)
        {
            return Ok(());
        }

        let guilds = platform.table("guilds");
        let channels = platform.table("channels");
        let users = platform.table("users");

        self.retrying("ensure_platform", |conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {guilds} (
                    scope_id INTEGER NOT NULL UNIQUE REFERENCES scopes(id),
                    native_guild_id TEXT NOT NULL UNIQUE
                );
                CREATE TABLE IF NOT EXISTS {channels} (
                    scope_id INTEGER NOT NULL UNIQUE REFERENCES scopes(id),
                    native_channel_id TEXT NOT NULL UNIQUE,
                    guild_scope_id INTEGER NOT NULL REFERENCES {guilds}(scope_id)
                );
                CREATE TABLE IF NOT EXISTS {users} (
                    scope_id INTEGER NOT NULL UNIQUE REFERENCES scopes(id),
                    native_user_id TEXT NOT NULL UNIQUE
                );"
            ))?;

            // The sentinel is the guild with the empty native id
            let mut tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let (sentinel, _) = guild_in_tx(&mut tx, platform, "")?;
            tx.commit()?;

            tracing::debug!(platform = %platform, sentinel = %sentinel, "Platform tables ready");
            Ok(())
        })?;

        if let Ok(mut set) = self.initialized.lock() {
            set.insert(platform.clone());
        }
        Ok(())
    }

    /// Resolve or create the channel scope and its guild scope.
    ///
    /// An empty `native_guild_id` means the channel has no real guild (a DM);
    /// the channel then hangs off the platform sentinel. Once a channel exists
    /// its guild never changes.
    pub fn get_or_create_place_scope(
        &self,
        platform: &Platform,
        native_channel_id: &str,
        native_guild_id: &str,
    ) -> Result<PlaceScopes, StoreError> {
        if native_channel_id.is_empty() {
            return Err(StoreError::EmptyId("channel"));
        }
        self.ensure_platform(platform)?;

        let insert_sql = format!(
            "INSERT INTO {} (scope_id, native_channel_id, guild_scope_id) VALUES (?1, ?2, ?3)",
            platform.table("channels")
        );

        self.retrying("get_or_create_place_scope", |conn| {
            let mut tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            if let Some(place) = select_channel(&tx, platform, native_channel_id)? {
                return Ok(place);
            }

            let (guild, guild_is_sentinel) = guild_in_tx(&mut tx, platform, native_guild_id)?;
            let created = create_mapped(&mut tx, platform, ScopeKind::Channel, false, |conn, scope| {
                conn.execute(&insert_sql, params![scope.id(), native_channel_id, guild.id()])
            })?;

            let place = match created {
                Some(channel) => PlaceScopes {
                    channel,
                    guild,
                    guild_is_sentinel,
                },
                None => select_channel(&tx, platform, native_channel_id)?.ok_or_else(|| {
                    StoreError::NotFound {
                        platform: platform.to_string(),
                        kind: ScopeKind::Channel,
                        native_id: native_channel_id.to_string(),
                    }
                })?,
            };

            tx.commit()?;
            Ok(place)
        })
    }

    /// Resolve or create the scope of a guild named directly
    pub fn get_or_create_guild_scope(
        &self,
        platform: &Platform,
        native_guild_id: &str,
    ) -> Result<Scope, StoreError> {
        self.ensure_platform(platform)?;
        self.retrying("get_or_create_guild_scope", |conn| {
            let mut tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let (guild, _) = guild_in_tx(&mut tx, platform, native_guild_id)?;
            tx.commit()?;
            Ok(guild)
        })
    }

    /// Resolve or create the scope of a user, independent of any place
    pub fn get_or_create_person_scope(
        &self,
        platform: &Platform,
        native_user_id: &str,
    ) -> Result<Scope, StoreError> {
        if native_user_id.is_empty() {
            return Err(StoreError::EmptyId("user"));
        }
        self.ensure_platform(platform)?;

        let insert_sql = format!(
            "INSERT INTO {} (scope_id, native_user_id) VALUES (?1, ?2)",
            platform.table("users")
        );

        self.retrying("get_or_create_person_scope", |conn| {
            let mut tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            if let Some(person) = select_user(&tx, platform, native_user_id)? {
                return Ok(person);
            }

            let created = create_mapped(&mut tx, platform, ScopeKind::User, false, |conn, scope| {
                conn.execute(&insert_sql, params![scope.id(), native_user_id])
            })?;
            let person = match created {
                Some(scope) => scope,
                None => select_user(&tx, platform, native_user_id)?.ok_or_else(|| {
                    StoreError::NotFound {
                        platform: platform.to_string(),
                        kind: ScopeKind::User,
                        native_id: native_user_id.to_string(),
                    }
                })?,
            };

            tx.commit()?;
            Ok(person)
        })
    }

    /// Connection for a read-only lookup, or `None` when the platform has
    /// never been seen and `table` does not exist yet. Never creates tables.
    fn lookup_conn(
        &self,
        platform: &Platform,
        table: &str,
    ) -> Result<Option<Connection>, StoreError> {
        let known = self
            .initialized
            .lock()
            .map(|set| set.contains(platform))
            .unwrap_or(false);
        let conn = self.connect()?;
        if known || table_exists(&conn, &platform.table(table))? {
            Ok(Some(conn))
        } else {
            Ok(None)
        }
    }

    /// Look up an existing channel without creating anything
    pub fn existing_place_scope(
        &self,
        platform: &Platform,
        native_channel_id: &str,
    ) -> Result<PlaceScopes, StoreError> {
        let found = match self.lookup_conn(platform, "channels")? {
            Some(conn) => select_channel(&conn, platform, native_channel_id)?,
            None => None,
        };
        found.ok_or_else(|| not_found(platform, ScopeKind::Channel, native_channel_id))
    }

    /// Look up an existing guild without creating anything
    pub fn existing_guild_scope(
        &self,
        platform: &Platform,
        native_guild_id: &str,
    ) -> Result<Scope, StoreError> {
        let found = match self.lookup_conn(platform, "guilds")? {
            Some(conn) => select_guild(&conn, platform, native_guild_id)?,
            None => None,
        };
        found
            .map(|(scope, _)| scope)
            .ok_or_else(|| not_found(platform, ScopeKind::Guild, native_guild_id))
    }

    /// Look up an existing user without creating anything
    pub fn existing_person_scope(
        &self,
        platform: &Platform,
        native_user_id: &str,
    ) -> Result<Scope, StoreError> {
        let found = match self.lookup_conn(platform, "users")? {
            Some(conn) => select_user(&conn, platform, native_user_id)?,
            None => None,
        };
        found.ok_or_else(|| not_found(platform, ScopeKind::User, native_user_id))
    }

    /// The platform's no-guild sentinel scope
    pub fn sentinel_scope(&self, platform: &Platform) -> Result<Scope, StoreError> {
        self.ensure_platform(platform)?;
        let conn = self.connect()?;
        let scope = conn.query_row(
            "SELECT id FROM scopes WHERE platform = ?1 AND is_sentinel = 1",
            params![platform.as_str()],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(Scope::new(scope))
    }

    pub fn is_sentinel(&self, scope: Scope) -> Result<bool, StoreError> {
        let conn = self.connect()?;
        conn.query_row(
            "SELECT is_sentinel FROM scopes WHERE id = ?1",
            params![scope.id()],
            |row| row.get::<_, bool>(0),
        )
        .optional()?
        .ok_or(StoreError::UnknownScope(scope))
    }

    /// Guild scope a channel scope belongs to
    pub fn guild_of(&self, channel: Scope) -> Result<Scope, StoreError> {
        let info = self.scope_info(channel)?;
        match (info.kind, info.parent) {
            (ScopeKind::Channel, Some(guild)) => Ok(guild),
            _ => Err(StoreError::UnknownScope(channel)),
        }
    }

    /// Reverse lookup: platform, kind and native id of a scope
    pub fn scope_info(&self, scope: Scope) -> Result<ScopeInfo, StoreError> {
        let conn = self.connect()?;
        let row = conn
            .query_row(
                "SELECT platform, kind, is_sentinel FROM scopes WHERE id = ?1",
                params![scope.id()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, bool>(2)?,
                    ))
                },
            )
            .optional()?;
        let Some((platform, kind, is_sentinel)) = row else {
            return Err(StoreError::UnknownScope(scope));
        };

        let platform = Platform::new(platform)?;
        let kind: ScopeKind = kind.parse().map_err(|_| StoreError::UnknownScope(scope))?;

        let (native_id, parent) = match kind {
            ScopeKind::Guild => {
                let native: String = conn.query_row(
                    &format!(
                        "SELECT native_guild_id FROM {} WHERE scope_id = ?1",
                        platform.table("guilds")
                    ),
                    params![scope.id()],
                    |row| row.get(0),
                )?;
                (native, None)
            }
            ScopeKind::Channel => {
                let (native, guild): (String, i64) = conn.query_row(
                    &format!(
                        "SELECT native_channel_id, guild_scope_id FROM {} WHERE scope_id = ?1",
                        platform.table("channels")
                    ),
                    params![scope.id()],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )?;
                (native, Some(Scope::new(guild)))
            }
            ScopeKind::User => {
                let native: String = conn.query_row(
                    &format!(
                        "SELECT native_user_id FROM {} WHERE scope_id = ?1",
                        platform.table("users")
                    ),
                    params![scope.id()],
                    |row| row.get(0),
                )?;
                (native, None)
            }
        };

        Ok(ScopeInfo {
            scope,
            platform,
            kind,
            native_id,
            is_sentinel,
            parent,
        })
    }
}

fn insert_scope(
    conn: &Connection,
    platform: &Platform,
    kind: ScopeKind,
    sentinel: bool,
) -> rusqlite::Result<Scope> {
    conn.execute(
        "INSERT INTO scopes (platform, kind, is_sentinel, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![
            platform.as_str(),
            kind.as_str(),
            sentinel,
            chrono::Utc::now().to_rfc3339()
        ],
    )?;
    Ok(Scope::new(conn.last_insert_rowid()))
}

/// Insert a new scope row plus its platform mapping inside a savepoint.
///
/// Returns `None` when the mapping hit a uniqueness violation; the savepoint
/// is rolled back so the orphaned scope row disappears, and the caller
/// re-selects the row that won.
fn create_mapped<F>(
    tx: &mut Transaction<'_>,
    platform: &Platform,
    kind: ScopeKind,
    sentinel: bool,
    insert_mapping: F,
) -> Result<Option<Scope>, StoreError>
where
    F: FnOnce(&Connection, Scope) -> rusqlite::Result<usize>,
{
    let sp = tx.savepoint()?;
    let scope = insert_scope(&sp, platform, kind, sentinel)?;
    match insert_mapping(&sp, scope) {
        Ok(_) => {
            sp.commit()?;
            metrics::record_scope_created(kind);
            tracing::debug!(
                platform = %platform,
                kind = %kind,
                scope = %scope,
                sentinel,
                "Scope created"
            );
            Ok(Some(scope))
        }
        Err(e) if is_constraint_violation(&e) => {
            tracing::debug!(
                platform = %platform,
                kind = %kind,
                "Lost scope creation race, re-selecting"
            );
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

fn guild_in_tx(
    tx: &mut Transaction<'_>,
    platform: &Platform,
    native_guild_id: &str,
) -> Result<(Scope, bool), StoreError> {
    if let Some(found) = select_guild(tx, platform, native_guild_id)? {
        return Ok(found);
    }

    let sentinel = native_guild_id.is_empty();
    let insert_sql = format!(
        "INSERT INTO {} (scope_id, native_guild_id) VALUES (?1, ?2)",
        platform.table("guilds")
    );
    let created = create_mapped(tx, platform, ScopeKind::Guild, sentinel, |conn, scope| {
        conn.execute(&insert_sql, params![scope.id(), native_guild_id])
    })?;

    match created {
        Some(scope) => Ok((scope, sentinel)),
        None => select_guild(tx, platform, native_guild_id)?.ok_or_else(|| StoreError::NotFound {
            platform: platform.to_string(),
            kind: ScopeKind::Guild,
            native_id: native_guild_id.to_string(),
        }),
    }
}

fn select_guild(
    conn: &Connection,
    platform: &Platform,
    native_guild_id: &str,
) -> Result<Option<(Scope, bool)>, StoreError> {
    let found = conn
        .query_row(
            &format!(
                "SELECT g.scope_id, s.is_sentinel
                 FROM {} g JOIN scopes s ON s.id = g.scope_id
                 WHERE g.native_guild_id = ?1",
                platform.table("guilds")
            ),
            params![native_guild_id],
            |row| Ok((Scope::new(row.get(0)?), row.get::<_, bool>(1)?)),
        )
        .optional()?;
    Ok(found)
}

fn select_channel(
    conn: &Connection,
    platform: &Platform,
    native_channel_id: &str,
) -> Result<Option<PlaceScopes>, StoreError> {
    let found = conn
        .query_row(
            &format!(
                "SELECT c.scope_id, c.guild_scope_id, s.is_sentinel
                 FROM {} c JOIN scopes s ON s.id = c.guild_scope_id
                 WHERE c.native_channel_id = ?1",
                platform.table("channels")
            ),
            params![native_channel_id],
            |row| {
                Ok(PlaceScopes {
                    channel: Scope::new(row.get(0)?),
                    guild: Scope::new(row.get(1)?),
                    guild_is_sentinel: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(found)
}

fn select_user(
    conn: &Connection,
    platform: &Platform,
    native_user_id: &str,
) -> Result<Option<Scope>, StoreError> {
    let found = conn
        .query_row(
            &format!(
                "SELECT scope_id FROM {} WHERE native_user_id = ?1",
                platform.table("users")
            ),
            params![native_user_id],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;
    Ok(found.map(Scope::new))
}
