use std::io::Write;
use std::time::Duration;

use clap::Parser;
use dock_page::client::DockClient;
use dock_page::controller::PageEvent;
use dock_page::geometry::Viewport;
use dock_page::host::{HostOutput, PageHost};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Headless dock page.
///
/// Reads page events as JSON lines on stdin and writes view frames, links to
/// open and prompts as JSON lines on stdout.
#[derive(Parser, Debug)]
#[command(name = "dock-page", version)]
struct Args {
    /// Daemon address, host:port
    #[arg(long, default_value_t = dock_proto::platform::daemon_address())]
    addr: String,

    /// URL reported for this page
    #[arg(long, default_value = "about:blank")]
    url: String,

    #[arg(long, default_value = "")]
    title: String,

    #[arg(long, default_value_t = 1280.0)]
    width: f64,

    #[arg(long, default_value_t = 800.0)]
    height: f64,

    /// Seconds to wait for a snapshot answer
    #[arg(long, default_value_t = 3)]
    timeout: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let data_dir = dock_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("dock-page.log");
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
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,dock_page=debug")),
        )
        .init();

    info!("Log file: {:?}", log_path);

    let (client, pushes) = DockClient::connect(
        args.addr.as_str(),
        &args.url,
        &args.title,
        Duration::from_secs(args.timeout),
    )
    .await?;
    let host = PageHost::new(client, pushes, Viewport::new(args.width, args.height));
    let events = host.events();

    let input = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<PageEvent>(&line) {
                Ok(event) => {
                    if events.send(event).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!("Ignoring bad event {:?}: {}", line, e),
            }
        }
        info!("Input closed");
    });

    let output = host.run(|out: HostOutput| {
        let mut stdout = std::io::stdout().lock();
        match serde_json::to_string(&out) {
            Ok(line) => {
                let _ = writeln!(stdout, "{}", line);
                let _ = stdout.flush();
            }
            Err(e) => warn!("Failed to encode output: {}", e),
        }
    });

    tokio::select! {
        _ = output => {}
        _ = input => {}
    }
    Ok(())
}
