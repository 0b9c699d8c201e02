use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Token value shipped in hosting panels' startup tab before the owner sets one.
pub const PLACEHOLDER_TOKEN: &str = "PUTYOURTOKENHERE";


#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no token provided, pass it as the first startup argument")]
    MissingToken,
    #[error("token is still the placeholder, set it in the startup tab")]
    PlaceholderToken,
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("no bot variant selected, set `bot` in the config file or pass --bot")]
    NoVariant,
}

/// Which bot this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BotKind {
    Moderation,
    Welcome,
    Logger,
    Addcommands,
}

impl BotKind {
    /// Manifest key used when the config does not name one.
    pub fn default_identifier(self) -> &'static str {
        match self {
            BotKind::Moderation => "moderation-bot.js",
            BotKind::Welcome => "welcome-bot.js",
            BotKind::Logger => "message-logger.js",
            BotKind::Addcommands => "addcommands-bot.js",
        }
    }

    pub fn default_settings_file(self) -> Option<&'static str> {
        match self {
            BotKind::Welcome => Some("settings.json"),
            BotKind::Logger => Some("logconfig.json"),
            BotKind::Moderation | BotKind::Addcommands => None,
        }
    }
}

/// Bot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub bot: BotKind,

    /// Self-update configuration
    #[serde(default)]
    pub update: UpdateConfig,

    /// JSON settings document (welcome and logger bots)
    #[serde(default)]
    pub settings: SettingsConfig,

    /// Presence rotation
    #[serde(default)]
    pub status: StatusConfig,

    /// Footer text stamped on every embed
    #[serde(default)]
    pub embed_footer: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Manifest key; defaults to the variant's identifier
    #[serde(default)]
    pub identifier: Option<String>,
    /// Release manifest; self-update stays off until this is set
    #[serde(default)]
    pub manifest_url: Option<String>,
    /// Payload URL template, `{identifier}` is substituted
    #[serde(default)]
    pub update_url: Option<String>,
    /// File replaced on update; defaults to the running executable
    #[serde(default)]
    pub installed_path: Option<PathBuf>,
    #[serde(default)]
    pub version_source: VersionSourceConfig,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum VersionSourceConfig {
    #[default]
    Embedded,
    Sidecar {
        path: PathBuf,
    },
    Marker {
        #[serde(default)]
        path: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    #[serde(default = "default_status_interval")]
    pub interval_secs: u64,
    /// Overrides the variant's built-in status lines when non-empty
    #[serde(default)]
    pub lines: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> u64 {
    30
}

fn default_status_interval() -> u64 {
    40
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            identifier: None,
            manifest_url: None,
            update_url: None,
            installed_path: None,
            version_source: VersionSourceConfig::default(),
            timeout_secs: default_timeout(),
        }
    }
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_status_interval(),
            lines: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&content)?;
        info!(bot = ?config.bot, path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Create default configuration
    pub fn default_for(bot: BotKind) -> Self {
        Self {
            bot,
            update: UpdateConfig::default(),
            settings: SettingsConfig::default(),
            status: StatusConfig::default(),
            embed_footer: None,
        }
    }

    /// Read `path` if it exists, otherwise fall back to defaults for the
    /// variant given on the command line. `bot_override` wins over the file.
    pub fn load(path: &Path, bot_override: Option<BotKind>) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            Self::from_file(path)?
        } else {
            let bot = bot_override.ok_or(ConfigError::NoVariant)?;
            info!(path = %path.display(), ?bot, "no config file, using defaults");
            Self::default_for(bot)
        };
        if let Some(bot) = bot_override {
            config.bot = bot;
        }
        Ok(config)
    }

    pub fn identifier(&self) -> String {
        self.update
            .identifier
            .clone()
            .unwrap_or_else(|| self.bot.default_identifier().to_string())
    }

    /// Payload URL with `{identifier}` substituted, if configured.
    pub fn update_url(&self) -> Option<String> {
        self.update
            .update_url
            .as_ref()
            .map(|url| url.replace("{identifier}", &self.identifier()))
    }

    pub fn settings_path(&self) -> Option<PathBuf> {
        self.settings
            .path
            .clone()
            .or_else(|| self.bot.default_settings_file().map(PathBuf::from))
    }
}

/// Reject a missing or placeholder credential before any network activity.
pub fn validate_token(token: Option<&str>) -> Result<&str, ConfigError> {
    match token.map(str::trim) {
        None | Some("") => Err(ConfigError::MissingToken),
        Some(PLACEHOLDER_TOKEN) => Err(ConfigError::PlaceholderToken),
        Some(t) => Ok(t),
    }
}
