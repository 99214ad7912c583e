use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Client configuration. Every field has a default so a partial config file
/// (or none at all) works.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// WebSocket address of the relay signaling server.
    #[serde(default = "default_signaling_server")]
    pub signaling_server: String,
    /// Request microphone capture.
    #[serde(default = "default_use_audio")]
    pub use_audio: bool,
    /// Request camera capture.
    #[serde(default = "default_use_video")]
    pub use_video: bool,
    /// Channel joined on startup.
    #[serde(default = "default_channel")]
    pub default_channel: String,
    /// Start remote playback sinks muted.
    #[serde(default)]
    pub mute_audio_by_default: bool,
    /// ICE servers handed to the connection engine.
    #[serde(default = "default_ice_servers")]
    pub ice_servers: Vec<String>,
}

fn default_signaling_server() -> String {
    "wss://localhost:8443".to_string()
}

fn default_use_audio() -> bool {
    true
}

fn default_use_video() -> bool {
    true
}

fn default_channel() -> String {
    "some-global-channel-name".to_string()
}

fn default_ice_servers() -> Vec<String> {
    vec!["stun:stun.l.google.com:19302".to_string()]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            signaling_server: default_signaling_server(),
            use_audio: default_use_audio(),
            use_video: default_use_video(),
            default_channel: default_channel(),
            mute_audio_by_default: false,
            ice_servers: default_ice_servers(),
        }
    }
}

impl Config {
    /// Load config from file, or create default if doesn't exist
    pub fn load() -> Result<Self> {
        Self::load_from(get_config_path())
    }

    pub fn load_from(path: PathBuf) -> Result<Self> {
        if path.exists() {
            let content = fs::read_to_string(&path).context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        self.save_to(get_config_path())
    }

    pub fn save_to(&self, path: PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content)?;
        Ok(())
    }
}

/// Get the rtcmesh directory (~/.rtcmesh)
pub fn get_rtcmesh_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".rtcmesh")
}

/// Get the config file path (~/.rtcmesh/config.toml)
pub fn get_config_path() -> PathBuf {
    get_rtcmesh_dir().join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.default_channel, "some-global-channel-name");
        assert!(config.use_audio);
        assert!(config.use_video);
        assert!(!config.mute_audio_by_default);
        assert_eq!(config.ice_servers, vec!["stun:stun.l.google.com:19302"]);
    }

    #[test]
    fn test_config_round_trip() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("config.toml");

        let mut config = Config::default();
        config.default_channel = "room1".to_string();
        config.use_video = false;
        config.save_to(path.clone())?;

        let loaded = Config::load_from(path)?;
        assert_eq!(loaded.default_channel, "room1");
        assert!(!loaded.use_video);
        assert!(loaded.use_audio);
        Ok(())
    }

    #[test]
    fn test_partial_config_uses_defaults() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "default_channel = \"room1\"\n")?;

        let loaded = Config::load_from(path)?;
        assert_eq!(loaded.default_channel, "room1");
        assert_eq!(loaded.signaling_server, "wss://localhost:8443");
        assert_eq!(loaded.ice_servers, vec!["stun:stun.l.google.com:19302"]);
        Ok(())
    }

    #[test]
    fn test_load_missing_file_creates_default() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("config.toml");

        let loaded = Config::load_from(path.clone())?;
        assert_eq!(loaded.default_channel, "some-global-channel-name");
        assert!(path.exists());
        Ok(())
    }
}
