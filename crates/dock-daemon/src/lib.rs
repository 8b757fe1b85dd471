//! Background context of the bookmark dock: keeps the enriched snapshot of
//! the dock folder and pushes it to every connected page.

pub mod api;
pub mod bus;
pub mod core;
pub mod error;
pub mod favicon;
pub mod fetch;
pub mod opener;
pub mod registry;
pub mod snapshot;
pub mod socket;
pub mod store;

use std::net::SocketAddr;
use std::sync::Arc;

use dock_proto::config::Config;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::api::{BookmarkStore, FaviconFetcher, Platform, SettingsStore, WindowOpener};
use crate::core::{BackgroundCore, BackgroundEvent};
use crate::registry::PageRegistry;

/// Platform services other than the page registry, which `launch` owns.
pub struct Services {
    pub bookmarks: Arc<dyn BookmarkStore>,
    pub settings: Arc<dyn SettingsStore>,
    pub opener: Arc<dyn WindowOpener>,
    pub fetcher: Arc<dyn FaviconFetcher>,
}

pub struct DaemonHandle {
    pub addr: SocketAddr,
    pub events: mpsc::Sender<BackgroundEvent>,
    pub registry: Arc<PageRegistry>,
    core: JoinHandle<anyhow::Result<()>>,
    tasks: Vec<JoinHandle<()>>,
}

impl DaemonHandle {
    /// Wait for the core loop to stop, then tear down the server.
    pub async fn join(self) -> anyhow::Result<()> {
        let result = self.core.await?;
        for task in self.tasks {
            task.abort();
        }
        result
    }

    pub async fn shutdown(self) -> anyhow::Result<()> {
        let _ = self.events.send(BackgroundEvent::Shutdown).await;
        self.join().await
    }
}

/// Wire the core, the store forwarders and the page server together and
/// start them on the current runtime.
pub fn launch(config: &Config, listener: TcpListener, services: Services) -> anyhow::Result<DaemonHandle> {
    let addr = listener.local_addr()?;
    let registry = Arc::new(PageRegistry::new());
    let platform = Platform {
        bookmarks: services.bookmarks,
        settings: services.settings,
        tabs: registry.clone(),
        opener: services.opener,
        fetcher: services.fetcher,
    };

    // All background inputs funnel into BackgroundCore
    let (event_tx, event_rx) = mpsc::channel::<BackgroundEvent>(256);

    let mut tasks = core::spawn_forwarders(&platform, event_tx.clone());
    let background = BackgroundCore::new(platform, config);
    let core = tokio::spawn(background.run(event_rx));
    tasks.push(socket::start_server(listener, registry.clone(), event_tx.clone()));

    Ok(DaemonHandle {
        addr,
        events: event_tx,
        registry,
        core,
        tasks,
    })
}
