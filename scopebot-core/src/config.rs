// ABOUTME: Configuration parsing from TOML file with environment variable overrides
// ABOUTME: Validates prefixes and storage settings and fills in defaults for the rest
use crate::dispatch::Prefixes;
use crate::paths;
use crate::scope::Platform;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub console: Option<ConsoleConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default)]
    pub prefixes: PrefixConfig,
    /// Bot administrators per platform: `console = ["alice"]`
    #[serde(default)]
    pub admins: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrefixConfig {
    #[serde(default = "default_admin_prefix")]
    pub admin: String,
    #[serde(default = "default_normal_prefix")]
    pub normal: String,
    #[serde(default = "default_advanced_prefix")]
    pub advanced: String,
}

impl Default for PrefixConfig {
    fn default() -> Self {
        Self {
            admin: default_admin_prefix(),
            normal: default_normal_prefix(),
            advanced: default_advanced_prefix(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_database")]
    pub database: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
    /// Also write a daily rolling log file under the data directory
    #[serde(default = "default_true")]
    pub file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            file: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Prometheus listen address, e.g. "127.0.0.1:9184". Disabled when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen: Option<String>,
}

/// Local stdin/stdout platform, useful for trying commands without a chat
/// service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleConfig {
    #[serde(default = "default_console_platform")]
    pub platform: String,
    #[serde(default = "default_console_user")]
    pub user_id: String,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default = "default_console_channel")]
    pub channel_id: String,
    /// Empty means the console channel has no guild
    #[serde(default)]
    pub guild_id: String,
    #[serde(default = "default_max_message_len")]
    pub max_message_len: usize,
    /// Places the console pretends to know about: guild id -> channel ids
    #[serde(default)]
    pub guilds: HashMap<String, Vec<String>>,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            platform: default_console_platform(),
            user_id: default_console_user(),
            user_name: None,
            channel_id: default_console_channel(),
            guild_id: String::new(),
            max_message_len: default_max_message_len(),
            guilds: HashMap::new(),
        }
    }
}

fn default_admin_prefix() -> String {
    "##".to_string()
}

fn default_normal_prefix() -> String {
    "!".to_string()
}

fn default_advanced_prefix() -> String {
    "$".to_string()
}

fn default_database() -> String {
    paths::database_file().to_string_lossy().to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_console_platform() -> String {
    "console".to_string()
}

fn default_console_user() -> String {
    "local".to_string()
}

fn default_console_channel() -> String {
    "console".to_string()
}

fn default_max_message_len() -> usize {
    2000
}

/// Expand tilde (~) to home directory in paths
fn expand_tilde(path: &str) -> String {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(base_dirs) = directories::BaseDirs::new() {
            return base_dirs
                .home_dir()
                .join(stripped)
                .to_string_lossy()
                .to_string();
        }
        tracing::warn!(
            path = %path,
            "Failed to expand tilde in path: could not determine home directory"
        );
    }
    path.to_string()
}

/// Parse `platform:user,platform:user` into the admins table
fn parse_admins(value: &str) -> Result<HashMap<String, Vec<String>>> {
    let mut admins: HashMap<String, Vec<String>> = HashMap::new();
    for entry in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (platform, user) = entry.split_once(':').with_context(|| {
            format!(
                "SCOPEBOT_ADMINS entries must look like platform:user_id, got: {}",
                entry
            )
        })?;
        admins
            .entry(platform.trim().to_string())
            .or_default()
            .push(user.trim().to_string());
    }
    Ok(admins)
}

impl Config {
    /// Find the config file, checking multiple locations in order:
    /// 1. SCOPEBOT_CONFIG_PATH env var (if set)
    /// 2. ./config.toml (current directory - for development)
    /// 3. ~/.config/scopebot/config.toml (XDG config dir)
    pub fn find_config_file() -> Option<PathBuf> {
        if let Ok(env_path) = std::env::var("SCOPEBOT_CONFIG_PATH") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Some(path);
            }
        }

        let local_config = PathBuf::from("config.toml");
        if local_config.exists() {
            return Some(local_config);
        }

        let xdg_config = paths::config_file();
        if xdg_config.exists() {
            return Some(xdg_config);
        }

        None
    }

    /// Load configuration from config.toml with environment variable overrides
    pub fn load() -> Result<Self> {
        let mut config = if let Some(config_path) = Self::find_config_file() {
            tracing::info!(
                path = %config_path.display(),
                "Loading configuration from file"
            );
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            Self::from_toml(&content)
                .with_context(|| format!("Failed to parse {}", config_path.display()))?
        } else {
            tracing::info!("No config file found, using environment variables and defaults");
            Config::default()
        };

        config.apply_env()?;
        config.storage.database = expand_tilde(&config.storage.database);
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str::<Config>(content)?)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("SCOPEBOT_DATABASE") {
            self.storage.database = val;
        }
        if let Ok(val) = std::env::var("SCOPEBOT_ADMINS") {
            self.bot.admins = parse_admins(&val)?;
        }
        if let Ok(val) = std::env::var("SCOPEBOT_PREFIX_ADMIN") {
            self.bot.prefixes.admin = val;
        }
        if let Ok(val) = std::env::var("SCOPEBOT_PREFIX_NORMAL") {
            self.bot.prefixes.normal = val;
        }
        if let Ok(val) = std::env::var("SCOPEBOT_PREFIX_ADVANCED") {
            self.bot.prefixes.advanced = val;
        }
        if let Ok(val) = std::env::var("SCOPEBOT_METRICS_LISTEN") {
            self.metrics.listen = Some(val).filter(|v| !v.trim().is_empty());
        }
        if let Ok(val) = std::env::var("SCOPEBOT_LOG_JSON") {
            self.logging.json = matches!(val.as_str(), "1" | "true" | "yes");
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.storage.database.trim().is_empty() {
            anyhow::bail!("storage.database must not be empty (set in config.toml or SCOPEBOT_DATABASE)");
        }

        let p = &self.bot.prefixes;
        for (name, prefix) in [("admin", &p.admin), ("normal", &p.normal), ("advanced", &p.advanced)] {
            if prefix.chars().any(char::is_whitespace) {
                anyhow::bail!("bot.prefixes.{} must not contain whitespace: {:?}", name, prefix);
            }
        }
        if p.normal.is_empty() || p.advanced.is_empty() {
            anyhow::bail!("bot.prefixes.normal and bot.prefixes.advanced are required");
        }
        if p.admin == p.normal || p.admin == p.advanced || p.normal == p.advanced {
            anyhow::bail!(
                "Command prefixes must be distinct (admin {:?}, normal {:?}, advanced {:?})",
                p.admin,
                p.normal,
                p.advanced
            );
        }

        for platform in self.bot.admins.keys() {
            Platform::new(platform.as_str())
                .with_context(|| format!("Invalid platform in bot.admins: {}", platform))?;
        }

        if let Some(console) = &self.console {
            Platform::new(console.platform.as_str())
                .with_context(|| format!("Invalid console.platform: {}", console.platform))?;
            if console.user_id.trim().is_empty() || console.channel_id.trim().is_empty() {
                anyhow::bail!("console.user_id and console.channel_id must not be empty");
            }
            if console.max_message_len == 0 {
                anyhow::bail!("console.max_message_len must be greater than zero");
            }
        }

        Ok(())
    }

    pub fn prefixes(&self) -> Prefixes {
        let p = &self.bot.prefixes;
        Prefixes::new(&p.admin, &p.normal, &p.advanced)
    }

    /// Admin user ids configured for `platform`
    pub fn admins(&self, platform: &str) -> &[String] {
        self.bot
            .admins
            .get(platform)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_file() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.bot.prefixes.admin, "##");
        assert_eq!(config.bot.prefixes.normal, "!");
        assert_eq!(config.bot.prefixes.advanced, "$");
        assert!(config.console.is_none());
        assert!(config.metrics.listen.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_console_section() {
        let config = Config::from_toml(
            r#"
            [console]
            user_id = "alice"
            guild_id = "home"

            [console.guilds]
            home = ["general", "random"]
            "#,
        )
        .unwrap();
        let console = config.console.unwrap();
        assert_eq!(console.platform, "console");
        assert_eq!(console.channel_id, "console");
        assert_eq!(console.max_message_len, 2000);
        assert_eq!(console.guilds["home"].len(), 2);
    }

    #[test]
    fn test_admin_lookup() {
        let config = Config::from_toml(
            r#"
            [bot.admins]
            console = ["alice"]
            "#,
        )
        .unwrap();
        assert_eq!(config.admins("console"), ["alice"]);
        assert!(config.admins("discord").is_empty());
    }

    #[test]
    fn test_rejects_clashing_prefixes() {
        let mut config = Config::default();
        config.bot.prefixes.advanced = "!".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_whitespace_prefix() {
        let mut config = Config::default();
        config.bot.prefixes.normal = "! ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_admin_prefix_is_allowed() {
        let mut config = Config::default();
        config.bot.prefixes.admin = String::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_admins() {
        let admins = parse_admins("console:alice, discord:42,console:bob").unwrap();
        assert_eq!(admins["console"], vec!["alice", "bob"]);
        assert_eq!(admins["discord"], vec!["42"]);
        assert!(parse_admins("alice").is_err());
    }

    #[test]
    fn test_invalid_platform_in_admins() {
        let mut config = Config::default();
        config
            .bot
            .admins
            .insert("Not A Platform".to_string(), vec!["x".to_string()]);
        assert!(config.validate().is_err());
    }
}
