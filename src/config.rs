use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// How much a metadata write is allowed to touch.
///
/// Re-read before every background write, so changing it affects the next write without
/// restarting anything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "kebab-case")]
pub enum WritePolicy {
    /// Writes are accepted and dropped.
    #[default]
    NoWrite,
    /// Only the application namespace of the XMP packet is written.
    PacketOnly,
    /// The whole XMP packet, including the conventional namespaces, plus the EXIF tags.
    PacketAndTags,
}

impl WritePolicy {
    pub fn writes_packet(self) -> bool {
        self != Self::NoWrite
    }

    pub fn writes_tags(self) -> bool {
        self == Self::PacketAndTags
    }
}

/// Top-level configuration.
///
/// # Loading
///
/// ```rust,no_run
/// use eyephoto_meta::config::{Config, WritePolicy};
///
/// // From a JSON file
/// let config = Config::load(Some("config.json".as_ref())).unwrap();
///
/// // Or use defaults and customize
/// let mut config = Config::default();
/// config.write_policy = WritePolicy::PacketAndTags;
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// What metadata writes may change. Defaults to [`WritePolicy::NoWrite`].
    pub write_policy: WritePolicy,
}

impl Config {
    /// Resolve the config file path — same directory as the executable.
    pub fn config_path() -> Result<PathBuf> {
        let exe_path = std::env::current_exe().context("Failed to get executable path")?;
        let exe_dir = exe_path
            .parent()
            .context("Failed to get executable directory")?;
        Ok(exe_dir.join("config.json"))
    }

    /// Load config from the given path, or from the default location.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        if !config_path.exists() {
            log::warn!(
                "Config file not found at {}. Using defaults.",
                config_path.display()
            );
            return Ok(Self::default());
        }

        let contents =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;
        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Save config to the given path, or to the default location.
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, contents).context("Failed to write config file")?;
        log::info!("Config saved to {}", config_path.display());
        Ok(())
    }
}

/// A [`Config`] shared between the code that edits settings and the write coordinator.
#[derive(Debug, Clone, Default)]
pub struct SharedConfig(Arc<RwLock<Config>>);

impl SharedConfig {
    pub fn new(config: Config) -> Self {
        Self(Arc::new(RwLock::new(config)))
    }

    /// A copy of the current config.
    pub fn snapshot(&self) -> Config {
        match self.0.read() {
            Ok(config) => config.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn update(&self, f: impl FnOnce(&mut Config)) {
        match self.0.write() {
            Ok(mut config) => f(&mut config),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    pub fn write_policy(&self) -> WritePolicy {
        self.snapshot().write_policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_policy_is_no_write() {
        assert_eq!(Config::default().write_policy, WritePolicy::NoWrite);
        assert!(!WritePolicy::NoWrite.writes_packet());
        assert!(WritePolicy::PacketOnly.writes_packet());
        assert!(!WritePolicy::PacketOnly.writes_tags());
        assert!(WritePolicy::PacketAndTags.writes_tags());
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        let config = Config {
            write_policy: WritePolicy::PacketAndTags,
        };
        config.save(Some(&path)).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"packet-and-tags\""));
        assert_eq!(Config::load(Some(&path)).unwrap(), config);
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(Some(&dir.path().join("absent.json"))).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn missing_keys_use_defaults_and_bad_json_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{}").unwrap();
        assert_eq!(Config::load(Some(&path)).unwrap(), Config::default());

        std::fs::write(&path, "{\"write_policy\": \"sometimes\"}").unwrap();
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn shared_config_sees_updates() {
        let shared = SharedConfig::default();
        let handle = shared.clone();
        assert_eq!(shared.write_policy(), WritePolicy::NoWrite);

        handle.update(|c| c.write_policy = WritePolicy::PacketOnly);
        assert_eq!(shared.write_policy(), WritePolicy::PacketOnly);
    }
}
