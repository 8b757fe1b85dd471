use std::path::PathBuf;

pub const DAEMON_TCP_PORT: u16 = 9787;
const DAEMON_TCP_HOST: &str = "127.0.0.1";

pub fn daemon_address() -> String {
    format!("{}:{}", DAEMON_TCP_HOST, DAEMON_TCP_PORT)
}

pub fn data_dir() -> PathBuf {
    // On macOS and Linux, use ~/.local/share/dock/ (XDG standard)
    // instead of macOS Application Support for consistency
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".local")
            .join("share")
            .join("dock")
    }
    #[cfg(windows)]
    {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("dock")
    }
}

pub fn config_dir() -> PathBuf {
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("dock")
    }

    #[cfg(windows)]
    {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("dock")
    }
}

/// Default opener for URLs handed to the desktop.
pub fn default_open_command() -> Vec<String> {
    #[cfg(target_os = "macos")]
    {
        vec!["open".to_string()]
    }
    #[cfg(windows)]
    {
        vec![
            "cmd".to_string(),
            "/C".to_string(),
            "start".to_string(),
            String::new(),
        ]
    }
    #[cfg(all(unix, not(target_os = "macos")))]
    {
        vec!["xdg-open".to_string()]
    }
}
