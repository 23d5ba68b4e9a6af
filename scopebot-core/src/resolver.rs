// ABOUTME: Turns raw place and person identifiers into exact and logical scopes
// ABOUTME: Uses the current message context first, the platform classifier otherwise

use crate::outcome::{Outcome, UserError};
use crate::platform::{Classification, PlaceClassifier};
use crate::scope::{PlaceScopes, Platform, Scope};
use crate::store::{ScopeStore, StoreError};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("I don't know a channel or server called '{0}'")]
    NotFound(String),

    #[error("I don't know anyone called '{0}'")]
    UnknownPerson(String),

    #[error("threads are not supported here")]
    Unsupported,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("platform lookup failed: {0:#}")]
    Platform(anyhow::Error),

    #[error("scope lookup task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ResolveError {
    /// Whether the invoking user caused this (bad identifier) rather than
    /// the system
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::UnknownPerson(_) | Self::Unsupported
        )
    }

    /// User errors become a user-facing outcome, everything else an `Err`
    pub fn into_outcome(self) -> anyhow::Result<Outcome> {
        match self {
            Self::NotFound(_) | Self::UnknownPerson(_) => {
                Ok(Outcome::user_error(UserError::Message(self.to_string())))
            }
            Self::Unsupported => Ok(Outcome::user_error(UserError::Unsupported)),
            other => Err(anyhow::Error::new(other)),
        }
    }
}

/// Where the current message was sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Here {
    pub platform: Platform,
    pub channel_id: String,
    /// Empty when the channel has no guild
    pub guild_id: String,
}

/// What a place identifier turned out to be
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Guild(String),
    Channel { channel_id: String, guild_id: String },
}

#[derive(Debug, Clone)]
pub struct ScopeResolver {
    store: Arc<ScopeStore>,
}

impl ScopeResolver {
    pub fn new(store: Arc<ScopeStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<ScopeStore> {
        &self.store
    }

    /// Run a store operation off the async runtime
    async fn blocking<T, F>(&self, f: F) -> Result<T, ResolveError>
    where
        T: Send + 'static,
        F: FnOnce(&ScopeStore) -> Result<T, StoreError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        Ok(tokio::task::spawn_blocking(move || f(&store)).await??)
    }

    /// Channel and guild scopes of `here`, created on first sight
    pub async fn place_here(&self, here: &Here) -> Result<PlaceScopes, ResolveError> {
        let here = here.clone();
        self.blocking(move |store| {
            store.get_or_create_place_scope(&here.platform, &here.channel_id, &here.guild_id)
        })
        .await
    }

    /// Scope of a user, created on first sight
    pub async fn person_scope(
        &self,
        platform: &Platform,
        native_user_id: &str,
    ) -> Result<Scope, ResolveError> {
        let platform = platform.clone();
        let user = native_user_id.to_string();
        self.blocking(move |store| store.get_or_create_person_scope(&platform, &user))
            .await
    }

    /// Scope of a user the store has already seen. Never creates one.
    pub async fn known_person_scope(
        &self,
        platform: &Platform,
        native_user_id: &str,
    ) -> Result<Scope, ResolveError> {
        let platform = platform.clone();
        let user = native_user_id.to_string();
        let lookup = user.clone();
        match self
            .blocking(move |store| store.existing_person_scope(&platform, &lookup))
            .await
        {
            Err(ResolveError::Store(e)) if e.is_not_found() => {
                Err(ResolveError::UnknownPerson(user))
            }
            other => other,
        }
    }

    /// Scope of the exact place `native_id` names: a guild id gives the guild
    /// scope, a channel id the channel scope. `None` means here.
    pub async fn exact_scope<C: PlaceClassifier + ?Sized>(
        &self,
        classifier: &C,
        native_id: Option<&str>,
        here: &Here,
    ) -> Result<Scope, ResolveError> {
        match self.target(classifier, native_id, here).await? {
            Target::Guild(guild) => self.guild_scope(&here.platform, guild).await,
            Target::Channel {
                channel_id,
                guild_id,
            } => Ok(self
                .place(&here.platform, channel_id, guild_id)
                .await?
                .channel),
        }
    }

    /// Scope where configuration for `native_id` attaches: the owning guild,
    /// or the channel itself when it has no real guild. `None` means here.
    pub async fn logical_scope<C: PlaceClassifier + ?Sized>(
        &self,
        classifier: &C,
        native_id: Option<&str>,
        here: &Here,
    ) -> Result<Scope, ResolveError> {
        match self.target(classifier, native_id, here).await? {
            Target::Guild(guild) => self.guild_scope(&here.platform, guild).await,
            Target::Channel {
                channel_id,
                guild_id,
            } => Ok(self
                .place(&here.platform, channel_id, guild_id)
                .await?
                .logical()),
        }
    }

    async fn target<C: PlaceClassifier + ?Sized>(
        &self,
        classifier: &C,
        native_id: Option<&str>,
        here: &Here,
    ) -> Result<Target, ResolveError> {
        let id = match native_id.map(str::trim) {
            None | Some("") => return Ok(here_channel(here)),
            Some(id) => id,
        };
        if id == here.channel_id {
            return Ok(here_channel(here));
        }
        if !here.guild_id.is_empty() && id == here.guild_id {
            return Ok(Target::Guild(id.to_string()));
        }

        let classification = classifier
            .classify(id)
            .await
            .map_err(ResolveError::Platform)?;
        tracing::debug!(
            platform = %here.platform,
            native_id = id,
            ?classification,
            "Classified place identifier"
        );

        match classification {
            Classification::Guild { guild_id } if !guild_id.is_empty() => {
                Ok(Target::Guild(guild_id))
            }
            Classification::Channel {
                channel_id,
                guild_id,
            } if !channel_id.is_empty() => Ok(Target::Channel {
                channel_id,
                guild_id,
            }),
            Classification::Thread => Err(ResolveError::Unsupported),
            _ => Err(ResolveError::NotFound(id.to_string())),
        }
    }

    async fn guild_scope(&self, platform: &Platform, guild: String) -> Result<Scope, ResolveError> {
        let platform = platform.clone();
        self.blocking(move |store| store.get_or_create_guild_scope(&platform, &guild))
            .await
    }

    async fn place(
        &self,
        platform: &Platform,
        channel_id: String,
        guild_id: String,
    ) -> Result<PlaceScopes, ResolveError> {
        let platform = platform.clone();
        self.blocking(move |store| {
            store.get_or_create_place_scope(&platform, &channel_id, &guild_id)
        })
        .await
    }
}

fn here_channel(here: &Here) -> Target {
    Target::Channel {
        channel_id: here.channel_id.clone(),
        guild_id: here.guild_id.clone(),
    }
}
