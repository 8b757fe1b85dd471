use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use dock_daemon::core::{BackgroundEvent, TOGGLE_DOCK_COMMAND};
use dock_daemon::fetch::HttpFaviconFetcher;
use dock_daemon::opener::CommandOpener;
use dock_daemon::store::{JsonBookmarkStore, JsonSettingsStore};
use dock_daemon::{socket, Services};
use dock_proto::config::Config;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Background daemon of the bookmark dock.
///
/// Send SIGUSR1 to show or hide the dock on the active page.
#[derive(Parser, Debug)]
#[command(name = "dockd", version)]
struct Args {
    /// Config file to use instead of ~/.config/dock/config.toml
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen on this port instead of the configured one
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let data_dir = dock_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("dockd.log");
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,dock_daemon=debug")),
        )
        .init();

    info!("Log file: {:?}", log_path);

    let config_path = args.config.unwrap_or_else(Config::config_path);
    let config = Config::load_from(&config_path)?;
    info!("Config loaded from: {:?}", config_path);

    let bookmarks = Arc::new(JsonBookmarkStore::open(&config.daemon.bookmarks_file).await?);
    let settings = Arc::new(JsonSettingsStore::open(&config.daemon.settings_file).await?);
    let poll = Duration::from_millis(config.daemon.poll_interval_ms.max(100));
    let _bookmark_watch = bookmarks.clone().spawn_watcher(poll);
    let _settings_watch = settings.clone().spawn_watcher(poll);

    let opener = Arc::new(CommandOpener::new(
        config.browser.clone(),
        config.daemon.settings_file.display().to_string(),
    ));
    let fetcher = Arc::new(HttpFaviconFetcher::new(Duration::from_secs(
        config.favicon.fetch_timeout_secs,
    ))?);

    let port = args.port.unwrap_or(config.daemon.port);
    let listener = socket::bind(&format!("{}:{}", config.daemon.bind_address, port)).await?;

    let handle = dock_daemon::launch(
        &config,
        listener,
        Services {
            bookmarks,
            settings,
            opener,
            fetcher,
        },
    )?;
    spawn_signal_handlers(handle.events.clone())?;

    info!("Daemon initialised on {}, running event loop", handle.addr);
    handle.join().await
}

/// SIGUSR1 is the toggle shortcut; Ctrl-C stops the daemon.
fn spawn_signal_handlers(events: mpsc::Sender<BackgroundEvent>) -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut toggle = signal(SignalKind::user_defined1())?;
        let toggle_tx = events.clone();
        tokio::spawn(async move {
            while toggle.recv().await.is_some() {
                info!("Toggle requested by signal");
                let command = BackgroundEvent::Command(TOGGLE_DOCK_COMMAND.to_string());
                if toggle_tx.send(command).await.is_err() {
                    break;
                }
            }
        });
    }

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, shutting down");
            let _ = events.send(BackgroundEvent::Shutdown).await;
        }
    });
    Ok(())
}
