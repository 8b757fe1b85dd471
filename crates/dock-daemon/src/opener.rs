//! Hands URLs to the desktop by spawning the configured commands.

use std::process::Stdio;

use dock_proto::config::BrowserConfig;
use futures_util::future::BoxFuture;
use tokio::process::Command;
use tracing::{debug, info};

use crate::api::WindowOpener;
use crate::error::{PlatformError, PlatformResult};

pub struct CommandOpener {
    browser: BrowserConfig,
    /// Opened by `open_settings_page` when no settings URL is configured.
    settings_fallback: String,
}

impl CommandOpener {
    pub fn new(browser: BrowserConfig, settings_fallback: impl Into<String>) -> Self {
        Self {
            browser,
            settings_fallback: settings_fallback.into(),
        }
    }

    fn settings_target(&self) -> &str {
        if self.browser.settings_url.trim().is_empty() {
            &self.settings_fallback
        } else {
            &self.browser.settings_url
        }
    }
}

/// Run `command` with `target` appended.  The child is not awaited.
fn spawn_with(command: &[String], target: &str) -> PlatformResult<()> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| PlatformError::Invalid("empty opener command".into()))?;
    if target.trim().is_empty() {
        return Err(PlatformError::Invalid("nothing to open".into()));
    }
    debug!("Spawning {} {:?} {}", program, args, target);
    Command::new(program)
        .args(args)
        .arg(target)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    Ok(())
}

impl WindowOpener for CommandOpener {
    fn open_tab(&self, url: String) -> BoxFuture<'_, PlatformResult<()>> {
        Box::pin(async move {
            info!("Opening {}", url);
            spawn_with(&self.browser.open_command, &url)
        })
    }

    fn open_window(&self, url: String, incognito: bool) -> BoxFuture<'_, PlatformResult<()>> {
        Box::pin(async move {
            info!("Opening {} in a new {}window", url, if incognito { "private " } else { "" });
            let command = if incognito {
                &self.browser.incognito_command
            } else {
                &self.browser.new_window_command
            };
            spawn_with(command, &url)
        })
    }

    fn open_settings_page(&self) -> BoxFuture<'_, PlatformResult<()>> {
        Box::pin(async move { spawn_with(&self.browser.open_command, self.settings_target()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_command_is_rejected() {
        assert!(matches!(
            spawn_with(&[], "https://example.com"),
            Err(PlatformError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_blank_target_is_rejected() {
        let opener = CommandOpener::new(
            BrowserConfig {
                open_command: vec!["true".into()],
                ..BrowserConfig::default()
            },
            "",
        );
        assert!(opener.open_settings_page().await.is_err());
        assert!(opener.open_tab("  ".into()).await.is_err());
    }

    #[test]
    fn test_configured_settings_url_wins() {
        let opener = CommandOpener::new(
            BrowserConfig {
                settings_url: "http://127.0.0.1:9787/settings".into(),
                ..BrowserConfig::default()
            },
            "/tmp/settings.json",
        );
        assert_eq!(opener.settings_target(), "http://127.0.0.1:9787/settings");
    }
}
