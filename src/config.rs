// Configuration management module
// Handles loading, saving, and validating configuration

use crate::scrobbler::listenbrainz::DEFAULT_API_URL;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use zbus::names::{BusName, InterfaceName, MemberName};
use zbus::zvariant::ObjectPath;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Which signal to subscribe to
    #[serde(default)]
    pub bus: BusConfig,

    /// Audioscrobbler 1.1 (username/password) configuration
    pub audioscrobbler: Option<AudioscrobblerConfig>,

    /// Last.fm configuration
    pub lastfm: Option<LastFmConfig>,

    /// ListenBrainz configurations (can have multiple instances)
    #[serde(default)]
    pub listenbrainz: Vec<ListenBrainzConfig>,
}

/// Signal match settings; unset filters match anything
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    pub signal_name: String,
    pub interface: Option<String>,
    pub path: Option<String>,
    pub sender: Option<String>,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            signal_name: "NowPlaying".to_string(),
            interface: None,
            path: None,
            sender: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioscrobblerConfig {
    pub enabled: bool,
    pub username: String,
    pub password: String,
    pub handshake_url: String,
    pub client_id: String,
    pub client_version: String,
}

impl Default for AudioscrobblerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            username: "dbus-cmus".to_string(),
            password: "dbus-cmus".to_string(),
            handshake_url: "http://post.audioscrobbler.com/".to_string(),
            client_id: "tst".to_string(),
            client_version: "1.0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastFmConfig {
    pub enabled: bool,
    pub api_key: String,
    pub api_secret: String,
    pub session_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenBrainzConfig {
    pub enabled: bool,
    pub name: String,
    pub token: String,
    pub api_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bus: BusConfig::default(),
            audioscrobbler: Some(AudioscrobblerConfig::default()),
            lastfm: Some(LastFmConfig {
                enabled: false,
                api_key: String::new(),
                api_secret: String::new(),
                session_key: String::new(),
            }),
            listenbrainz: vec![ListenBrainzConfig {
                enabled: false,
                name: "Primary".to_string(),
                token: String::new(),
                api_url: DEFAULT_API_URL.to_string(),
            }],
        }
    }
}

impl Config {
    /// Get the path to the configuration file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Failed to get config directory")?;

        Ok(config_dir.join("cmus_scrobbler.conf"))
    }

    /// Load configuration from `path`, or create a default one there if it doesn't exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!("Config file not found, creating default at {:?}", path);
            let default_config = Self::default();
            default_config.save_to(path)?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {:?}", path))?;

        config.validate()?;

        Ok(config)
    }

    /// Save configuration to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, content).context("Failed to write config file")?;

        log::info!("Config saved to {:?}", path);

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        MemberName::try_from(self.bus.signal_name.as_str())
            .with_context(|| format!("Invalid signal name {:?}", self.bus.signal_name))?;
        if let Some(interface) = &self.bus.interface {
            InterfaceName::try_from(interface.as_str())
                .with_context(|| format!("Invalid interface {:?}", interface))?;
        }
        if let Some(path) = &self.bus.path {
            ObjectPath::try_from(path.as_str())
                .with_context(|| format!("Invalid object path {:?}", path))?;
        }
        if let Some(sender) = &self.bus.sender {
            BusName::try_from(sender.as_str())
                .with_context(|| format!("Invalid sender {:?}", sender))?;
        }

        // Check that at least one scrobbler is enabled
        let audioscrobbler_enabled = self.audioscrobbler.as_ref().is_some_and(|a| a.enabled);
        let lastfm_enabled = self.lastfm.as_ref().is_some_and(|l| l.enabled);
        let listenbrainz_enabled = self.listenbrainz.iter().any(|l| l.enabled);

        if !audioscrobbler_enabled && !lastfm_enabled && !listenbrainz_enabled {
            log::warn!("No scrobbling services are enabled");
        }

        if let Some(audioscrobbler) = self.audioscrobbler.as_ref().filter(|a| a.enabled) {
            if audioscrobbler.username.is_empty() {
                anyhow::bail!("Audioscrobbler username is required when Audioscrobbler is enabled");
            }
            if audioscrobbler.handshake_url.is_empty() {
                anyhow::bail!(
                    "Audioscrobbler handshake_url is required when Audioscrobbler is enabled"
                );
            }
        }

        // Validate Last.fm config if enabled
        if let Some(lastfm) = self.lastfm.as_ref().filter(|l| l.enabled) {
            if lastfm.api_key.is_empty() {
                anyhow::bail!("Last.fm api_key is required when Last.fm is enabled");
            }
            if lastfm.api_secret.is_empty() {
                anyhow::bail!("Last.fm api_secret is required when Last.fm is enabled");
            }
        }

        // Validate ListenBrainz configs if enabled
        for lb in self.listenbrainz.iter().filter(|l| l.enabled) {
            if lb.token.is_empty() {
                anyhow::bail!(
                    "ListenBrainz token is required when enabled (instance: {})",
                    lb.name
                );
            }
            if lb.api_url.is_empty() {
                anyhow::bail!("ListenBrainz api_url is required (instance: {})", lb.name);
            }
        }

        Ok(())
    }
}
