use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::icon::{BUILTIN_ICON, DEFAULT_FAVICON_SERVICE};
use super::platform;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub folder: FolderConfig,
    #[serde(default)]
    pub favicon: FaviconConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// JSON bookmark tree.
    #[serde(default = "default_bookmarks_file")]
    pub bookmarks_file: PathBuf,
    /// JSON key-value store holding settings, custom icons and the favicon cache.
    #[serde(default = "default_settings_file")]
    pub settings_file: PathBuf,
    /// How often both files are checked for edits made by other programs.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

/// The designated folder whose children populate the dock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderConfig {
    #[serde(default = "default_folder_name")]
    pub name: String,
    /// Link seeded into a freshly created folder.
    #[serde(default = "default_welcome_title")]
    pub welcome_title: String,
    #[serde(default = "default_welcome_url")]
    pub welcome_url: String,
    /// Icon of the settings entry when the `settingsIcon` preference is unset.
    #[serde(default = "default_settings_icon")]
    pub settings_icon: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaviconConfig {
    /// `{host}` and `{size}` are substituted.
    #[serde(default = "default_favicon_service")]
    pub service: String,
    #[serde(default = "default_favicon_size")]
    pub size: u32,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    /// Drop cached icons whose bookmark is no longer in the dock.
    #[serde(default)]
    pub prune_orphans: bool,
}

/// Commands used to hand URLs to the desktop.  The URL is appended as the
/// last argument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    #[serde(default = "platform::default_open_command")]
    pub open_command: Vec<String>,
    #[serde(default = "platform::default_open_command")]
    pub new_window_command: Vec<String>,
    #[serde(default = "platform::default_open_command")]
    pub incognito_command: Vec<String>,
    /// Page opened by `open_settings`.  Empty means the settings file itself.
    #[serde(default)]
    pub settings_url: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            bookmarks_file: default_bookmarks_file(),
            settings_file: default_settings_file(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for FolderConfig {
    fn default() -> Self {
        Self {
            name: default_folder_name(),
            welcome_title: default_welcome_title(),
            welcome_url: default_welcome_url(),
            settings_icon: default_settings_icon(),
        }
    }
}

impl Default for FaviconConfig {
    fn default() -> Self {
        Self {
            service: default_favicon_service(),
            size: default_favicon_size(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            prune_orphans: false,
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            open_command: platform::default_open_command(),
            new_window_command: platform::default_open_command(),
            incognito_command: platform::default_open_command(),
            settings_url: String::new(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    platform::DAEMON_TCP_PORT
}

fn default_bookmarks_file() -> PathBuf {
    platform::data_dir().join("bookmarks.json")
}

fn default_settings_file() -> PathBuf {
    platform::data_dir().join("settings.json")
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_folder_name() -> String {
    "Vertical-bookmark-list".to_string()
}

fn default_welcome_title() -> String {
    "Welcome to the Dock".to_string()
}

fn default_welcome_url() -> String {
    "https://www.rust-lang.org/".to_string()
}

fn default_settings_icon() -> String {
    BUILTIN_ICON.to_string()
}

fn default_favicon_service() -> String {
    DEFAULT_FAVICON_SERVICE.to_string()
}

fn default_favicon_size() -> u32 {
    128
}

fn default_fetch_timeout_secs() -> u64 {
    5
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load `path`, writing the defaults there first if it does not exist.
    pub fn load_from(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            let config = Self::default();
            config.save_to(path)?;
            tracing::info!("Wrote default config to {:?}", path);
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to(&self, path: &std::path::Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.daemon.port, platform::DAEMON_TCP_PORT);
        assert_eq!(config.daemon.bind_address, "127.0.0.1");
        assert_eq!(config.folder.name, "Vertical-bookmark-list");
        assert!(config.favicon.service.contains("{host}"));
        assert!(!config.favicon.prune_orphans);
        assert!(config.daemon.bookmarks_file.ends_with("dock/bookmarks.json"));
        assert!(!config.browser.open_command.is_empty());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [folder]
            name = "Dock"

            [favicon]
            prune_orphans = true
            "#,
        )
        .unwrap();
        assert_eq!(config.folder.name, "Dock");
        assert_eq!(config.folder.welcome_url, default_welcome_url());
        assert!(config.favicon.prune_orphans);
        assert_eq!(config.favicon.size, 128);
        assert_eq!(config.daemon.poll_interval_ms, 1000);
    }
}
