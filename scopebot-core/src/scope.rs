// ABOUTME: Canonical scope identities and validated platform names
// ABOUTME: A scope is one integer id for a guild, channel or user on any platform

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Process-wide unique identity of a place (guild, channel) or a person.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scope(i64);

impl Scope {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn id(self) -> i64 {
        self.0
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a scope row stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    Guild,
    Channel,
    User,
}

impl ScopeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Guild => "guild",
            Self::Channel => "channel",
            Self::User => "user",
        }
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ScopeKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "guild" => Ok(Self::Guild),
            "channel" => Ok(Self::Channel),
            "user" => Ok(Self::User),
            _ => anyhow::bail!("Unknown scope kind: {}", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid platform name '{0}': expected a lowercase letter followed by [a-z0-9_]")]
pub struct InvalidPlatform(pub String);

/// Name of a chat platform (e.g. "discord", "twitch", "console").
///
/// Platform names end up inside table names (`platform_<name>_channels`),
/// so only `[a-z][a-z0-9_]*` is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Platform(String);

impl Platform {
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidPlatform> {
        let name = name.into();
        let mut chars = name.chars();
        let valid = chars.next().is_some_and(|c| c.is_ascii_lowercase())
            && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
        if !valid || name.len() > 32 {
            return Err(InvalidPlatform(name));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of one of this platform's tables, e.g. `platform_discord_guilds`
    pub(crate) fn table(&self, suffix: &str) -> String {
        format!("platform_{}_{}", self.0, suffix)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Platform {
    type Error = InvalidPlatform;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Platform> for String {
    fn from(value: Platform) -> Self {
        value.0
    }
}

/// Channel scope together with the guild it belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceScopes {
    pub channel: Scope,
    pub guild: Scope,
    /// True when `guild` is the platform's no-guild sentinel
    pub guild_is_sentinel: bool,
}

impl PlaceScopes {
    /// Where configuration for this place attaches: the guild, or the channel
    /// itself when there is no real guild.
    pub fn logical(&self) -> Scope {
        if self.guild_is_sentinel {
            self.channel
        } else {
            self.guild
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_accepts_simple_names() {
        assert!(Platform::new("discord").is_ok());
        assert!(Platform::new("irc_2").is_ok());
    }

    #[test]
    fn test_platform_rejects_table_injection() {
        assert!(Platform::new("").is_err());
        assert!(Platform::new("Discord").is_err());
        assert!(Platform::new("1discord").is_err());
        assert!(Platform::new("a; DROP TABLE scopes").is_err());
        assert!(Platform::new("a-b").is_err());
    }

    #[test]
    fn test_platform_table_name() {
        let platform = Platform::new("twitch").unwrap();
        assert_eq!(platform.table("users"), "platform_twitch_users");
    }

    #[test]
    fn test_platform_deserialize_validates() {
        let ok: Result<Platform, _> = serde_json::from_str("\"console\"");
        assert!(ok.is_ok());
        let bad: Result<Platform, _> = serde_json::from_str("\"Not Valid\"");
        assert!(bad.is_err());
    }

    #[test]
    fn test_logical_scope_prefers_real_guild() {
        let place = PlaceScopes {
            channel: Scope::new(5),
            guild: Scope::new(2),
            guild_is_sentinel: false,
        };
        assert_eq!(place.logical(), Scope::new(2));

        let dm = PlaceScopes {
            guild_is_sentinel: true,
            ..place
        };
        assert_eq!(dm.logical(), Scope::new(5));
    }

    #[test]
    fn test_scope_kind_round_trips_through_str() {
        for kind in [ScopeKind::Guild, ScopeKind::Channel, ScopeKind::User] {
            assert_eq!(kind.as_str().parse::<ScopeKind>().unwrap(), kind);
        }
        assert!("thread".parse::<ScopeKind>().is_err());
    }
}
