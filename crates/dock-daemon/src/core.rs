/// BackgroundCore: single-owner event loop of the background context.
///
/// Every input (page intents, bookmark events, key-value change events,
/// keyboard commands) arrives as a `BackgroundEvent` on one channel and is
/// handled to completion before the next.  Mutations go through the platform
/// stores only; the resulting store events come back through the same
/// channel and trigger the rebuild and fan-out, so each mutation yields
/// exactly one refresh and none is sent from inside the mutating call.
use std::collections::HashSet;

use dock_proto::config::Config;
use dock_proto::icon::FaviconService;
use dock_proto::protocol::{Intent, PageMessage, Snapshot, SETTINGS_ITEM_ID};
use dock_proto::settings::{
    is_relevant_key, is_settings_key, DockSettings, KEY_CUSTOM_ICONS,
    KEY_SETTINGS_ICON, SNAPSHOT_KEYS, VISUAL_KEYS,
};
use serde_json::{Map, Value};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::{
    BookmarkChanges, BookmarkEvent, CreateDetails, Platform, StorageChange, TabId, TabInfo,
};
use crate::bus::BroadcastBus;
use crate::error::PlatformResult;
use crate::favicon::FaviconCache;
use crate::snapshot::SnapshotBuilder;

/// Keyboard command that shows or hides the dock on the active page.
pub const TOGGLE_DOCK_COMMAND: &str = "toggle_dock";

// ── BackgroundEvent ───────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum BackgroundEvent {
    /// An intent from a page.  `reply` is set when the page waits for a
    /// snapshot in return.
    Intent {
        intent: Intent,
        sender: Option<TabId>,
        reply: Option<oneshot::Sender<Snapshot>>,
    },
    Bookmarks(BookmarkEvent),
    Storage(StorageChange),
    /// A keyboard command, by name.
    Command(String),
    PageConnected(TabId),
    Shutdown,
}

// ── BackgroundCore ────────────────────────────────────────────────────────────

pub struct BackgroundCore {
    platform: Platform,
    builder: SnapshotBuilder,
    favicons: FaviconCache,
    bus: BroadcastBus,
    prune_orphans: bool,
    /// Last preferences read from the store.
    settings: DockSettings,
}

impl BackgroundCore {
    pub fn new(platform: Platform, config: &Config) -> Self {
        let service = FaviconService::new(config.favicon.service.clone(), config.favicon.size);
        let builder = SnapshotBuilder::new(
            platform.bookmarks.clone(),
            platform.settings.clone(),
            config.folder.clone(),
            service,
        );
        let favicons = FaviconCache::new(platform.settings.clone(), platform.fetcher.clone());
        let bus = BroadcastBus::new(platform.tabs.clone());
        Self {
            platform,
            builder,
            favicons,
            bus,
            prune_orphans: config.favicon.prune_orphans,
            settings: DockSettings::default(),
        }
    }

    pub async fn run(mut self, mut events: mpsc::Receiver<BackgroundEvent>) -> anyhow::Result<()> {
        self.settings = self.builder.load_settings().await;
        info!("Background core running");
        while let Some(event) = events.recv().await {
            if !self.handle_event(event).await {
                break;
            }
        }
        info!("Background core stopped");
        Ok(())
    }

    /// Returns false when the loop should stop.
    pub async fn handle_event(&mut self, event: BackgroundEvent) -> bool {
        match event {
            BackgroundEvent::Intent {
                intent,
                sender,
                reply,
            } => self.handle_intent(intent, sender, reply).await,
            BackgroundEvent::Bookmarks(event) => {
                debug!(?event, "Bookmark change");
                self.broadcast_refresh().await;
            }
            BackgroundEvent::Storage(change) => self.on_storage_change(change).await,
            BackgroundEvent::Command(command) => self.on_command(&command).await,
            BackgroundEvent::PageConnected(tab) => {
                let message = PageMessage::ApplySettings {
                    settings: self.settings.clone(),
                };
                if let Err(e) = self.platform.tabs.send(tab, message).await {
                    debug!("Page {} left before receiving settings: {}", tab, e);
                }
            }
            BackgroundEvent::Shutdown => return false,
        }
        true
    }

    /// Build the current snapshot and queue uncached favicons.
    pub async fn snapshot(&self) -> Snapshot {
        let built = self.builder.build().await;
        self.favicons.cache_missing_icons(built.pending_icons.clone());

        if self.prune_orphans && built.folder_found {
            let live: Vec<String> = built.bookmark_ids().into_iter().map(String::from).collect();
            let favicons = self.favicons.clone();
            tokio::spawn(async move {
                let live: HashSet<&str> = live.iter().map(String::as_str).collect();
                if let Err(e) = favicons.prune(&live).await {
                    debug!("Favicon prune skipped: {}", e);
                }
            });
        }
        built.entries
    }

    async fn broadcast_refresh(&self) {
        let data = self.snapshot().await;
        self.bus.broadcast(PageMessage::RefreshDock { data }).await;
    }

    async fn handle_intent(
        &mut self,
        intent: Intent,
        sender: Option<TabId>,
        reply: Option<oneshot::Sender<Snapshot>>,
    ) {
        debug!(?sender, "Intent {:?}", intent);
        let bookmarks = &self.platform.bookmarks;
        let opener = &self.platform.opener;
        match intent {
            Intent::GetBookmarksForMouse => {
                let data = self.snapshot().await;
                if let Some(reply) = reply {
                    let _ = reply.send(data);
                }
            }
            Intent::AddCurrentTab => self.add_current_tab(sender).await,
            Intent::OpenSettings => log_failure("open settings", opener.open_settings_page().await),
            Intent::OpenNewWindow { url } => {
                log_failure("open window", opener.open_window(url, false).await)
            }
            Intent::OpenIncognito { url } => {
                log_failure("open private window", opener.open_window(url, true).await)
            }
            Intent::RenameBookmark { id, title } => {
                if id == SETTINGS_ITEM_ID {
                    return;
                }
                let changes = BookmarkChanges {
                    title: Some(title),
                    url: None,
                };
                log_failure("rename bookmark", bookmarks.update(id, changes).await);
            }
            Intent::DeleteBookmark { id } => {
                if id == SETTINGS_ITEM_ID {
                    return;
                }
                log_failure("delete bookmark", bookmarks.remove(id).await);
            }
            Intent::UpdateIcon { id, url } => self.update_icon(id, url).await,
            Intent::MoveBookmark {
                id,
                parent_id,
                index,
            } => log_failure("move bookmark", bookmarks.move_node(id, parent_id, index).await),
            Intent::SetSetting { key, value } => {
                if !is_settings_key(&key) {
                    warn!("Refusing to write unknown setting {:?}", key);
                    return;
                }
                let mut values = Map::new();
                values.insert(key, value);
                log_failure("store setting", self.platform.settings.set(values).await);
            }
            Intent::RequestRefresh => self.broadcast_refresh().await,
        }
    }

    /// The new link takes the active page's url and title.
    async fn add_current_tab(&self, sender: Option<TabId>) {
        let tab = match self.platform.tabs.active().await {
            Some(tab) => Some(tab),
            None => self.find_tab(sender).await,
        };
        let Some(tab) = tab.filter(|t| !t.url.trim().is_empty()) else {
            info!("No active page with a url to add");
            return;
        };

        let folder_id = match self.builder.locate_or_create_folder().await {
            Ok(id) => id,
            Err(e) => {
                warn!("Failed to locate dock folder: {}", e);
                return;
            }
        };
        let title = if tab.title.trim().is_empty() {
            tab.url.clone()
        } else {
            tab.title
        };
        let details = CreateDetails {
            parent_id: folder_id,
            index: None,
            title,
            url: Some(tab.url),
        };
        log_failure("add page", self.platform.bookmarks.create(details).await);
    }

    async fn find_tab(&self, id: Option<TabId>) -> Option<TabInfo> {
        let id = id?;
        self.platform
            .tabs
            .query()
            .await
            .into_iter()
            .find(|t| t.id == id)
    }

    /// Set or clear a custom icon.  The settings entry keeps its icon under
    /// its own preference key.
    async fn update_icon(&self, id: String, url: Option<String>) {
        let url = url
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());
        let store = &self.platform.settings;
        let mut values = Map::new();

        if id == SETTINGS_ITEM_ID {
            values.insert(
                KEY_SETTINGS_ICON.to_string(),
                url.map(Value::String).unwrap_or(Value::Null),
            );
            log_failure("store settings icon", store.set(values).await);
            return;
        }

        let mut icons = match store.get(vec![KEY_CUSTOM_ICONS.to_string()]).await {
            Ok(mut current) => match current.remove(KEY_CUSTOM_ICONS) {
                Some(Value::Object(icons)) => icons,
                _ => Map::new(),
            },
            Err(e) => {
                warn!("Failed to read custom icons: {}", e);
                return;
            }
        };
        match url {
            Some(url) => {
                icons.insert(id, Value::String(url));
            }
            None => {
                icons.remove(&id);
            }
        }
        values.insert(KEY_CUSTOM_ICONS.to_string(), Value::Object(icons));
        log_failure("store custom icon", store.set(values).await);
    }

    async fn on_storage_change(&mut self, change: StorageChange) {
        let relevant: Vec<&str> = change
            .keys
            .iter()
            .map(String::as_str)
            .filter(|k| is_relevant_key(k))
            .collect();
        if relevant.is_empty() {
            debug!("Ignoring storage change {:?}", change.keys);
            return;
        }

        // Pages keep their own copy of the record, so any key of it that
        // changed goes out before the rebuilt snapshot.
        self.settings = self.builder.load_settings().await;
        if relevant.iter().any(|k| is_settings_key(k)) {
            let settings = self.settings.clone();
            self.bus
                .broadcast(PageMessage::ApplySettings { settings })
                .await;
        }
        self.broadcast_refresh().await;
    }

    async fn on_command(&self, command: &str) {
        if command != TOGGLE_DOCK_COMMAND {
            warn!("Unknown command {:?}", command);
            return;
        }
        let data = self.snapshot().await;
        if !self.bus.send_to_active(PageMessage::ToggleDock { data }).await {
            info!("Toggle requested with no page to show it");
        }
    }
}

fn log_failure<T>(what: &str, result: PlatformResult<T>) {
    if let Err(e) = result {
        warn!("Failed to {}: {}", what, e);
    }
}

/// Pipe store notifications into the core's channel.  A lagging receiver is
/// turned into one catch-all event so the next refresh is still correct.
pub fn spawn_forwarders(
    platform: &Platform,
    tx: mpsc::Sender<BackgroundEvent>,
) -> Vec<JoinHandle<()>> {
    let mut bookmark_rx = platform.bookmarks.subscribe();
    let bookmark_tx = tx.clone();
    let bookmarks = tokio::spawn(async move {
        loop {
            let event = match bookmark_rx.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Missed {} bookmark events", n);
                    BookmarkEvent::Reloaded
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            if bookmark_tx.send(BackgroundEvent::Bookmarks(event)).await.is_err() {
                break;
            }
        }
    });

    let mut storage_rx = platform.settings.subscribe();
    let storage = tokio::spawn(async move {
        loop {
            let change = match storage_rx.recv().await {
                Ok(change) => change,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Missed {} storage events", n);
                    StorageChange {
                        keys: VISUAL_KEYS
                            .iter()
                            .chain(SNAPSHOT_KEYS)
                            .map(|k| k.to_string())
                            .collect(),
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            if tx.send(BackgroundEvent::Storage(change)).await.is_err() {
                break;
            }
        }
    });

    vec![bookmarks, storage]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{BookmarkStore, FaviconFetcher, FetchedIcon, SettingsStore, WindowOpener};
    use crate::error::PlatformError;
    use crate::registry::PageRegistry;
    use crate::store::{JsonBookmarkStore, JsonSettingsStore};
    use futures_util::future::BoxFuture;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingOpener {
        opened: Mutex<Vec<String>>,
    }

    impl WindowOpener for RecordingOpener {
        fn open_tab(&self, url: String) -> BoxFuture<'_, PlatformResult<()>> {
            Box::pin(async move {
                self.opened.lock().unwrap().push(format!("tab {}", url));
                Ok(())
            })
        }

        fn open_window(&self, url: String, incognito: bool) -> BoxFuture<'_, PlatformResult<()>> {
            Box::pin(async move {
                let kind = if incognito { "incognito" } else { "window" };
                self.opened.lock().unwrap().push(format!("{} {}", kind, url));
                Ok(())
            })
        }

        fn open_settings_page(&self) -> BoxFuture<'_, PlatformResult<()>> {
            Box::pin(async move {
                self.opened.lock().unwrap().push("settings".into());
                Ok(())
            })
        }
    }

    struct OfflineFetcher;

    impl FaviconFetcher for OfflineFetcher {
        fn fetch(&self, _url: String) -> BoxFuture<'_, PlatformResult<FetchedIcon>> {
            Box::pin(async { Err(PlatformError::Fetch("offline".into())) })
        }
    }

    struct Harness {
        core: BackgroundCore,
        registry: Arc<PageRegistry>,
        bookmarks: Arc<JsonBookmarkStore>,
        settings: Arc<JsonSettingsStore>,
        opener: Arc<RecordingOpener>,
    }

    fn harness() -> Harness {
        let registry = Arc::new(PageRegistry::new());
        let bookmarks = Arc::new(JsonBookmarkStore::in_memory());
        let settings = Arc::new(JsonSettingsStore::in_memory());
        let opener = Arc::new(RecordingOpener::default());
        let platform = Platform {
            bookmarks: bookmarks.clone(),
            settings: settings.clone(),
            tabs: registry.clone(),
            opener: opener.clone(),
            fetcher: Arc::new(OfflineFetcher),
        };
        Harness {
            core: BackgroundCore::new(platform, &Config::default()),
            registry,
            bookmarks,
            settings,
            opener,
        }
    }

    fn intent(intent: Intent) -> BackgroundEvent {
        BackgroundEvent::Intent {
            intent,
            sender: None,
            reply: None,
        }
    }

    #[tokio::test]
    async fn test_snapshot_request_is_answered() {
        let mut h = harness();
        let (tx, rx) = oneshot::channel();
        h.core
            .handle_event(BackgroundEvent::Intent {
                intent: Intent::GetBookmarksForMouse,
                sender: None,
                reply: Some(tx),
            })
            .await;
        let data = rx.await.unwrap();
        assert_eq!(data.last().unwrap().id, SETTINGS_ITEM_ID);
    }

    #[tokio::test]
    async fn test_mutation_does_not_push_by_itself() {
        let mut h = harness();
        let folder = h.core.builder.locate_or_create_folder().await.unwrap();
        let seeded = h.bookmarks.get_children(folder).await.unwrap();
        let (_tab, mut rx) = h.registry.register("", "").await;
        let mut events = h.bookmarks.subscribe();

        h.core
            .handle_event(intent(Intent::RenameBookmark {
                id: seeded[0].id.clone(),
                title: "New Name".into(),
            }))
            .await;
        assert!(rx.try_recv().is_err());

        // The store event is what drives the refresh.
        let event = events.recv().await.unwrap();
        h.core.handle_event(BackgroundEvent::Bookmarks(event)).await;
        match rx.try_recv() {
            Ok(PageMessage::RefreshDock { data }) => assert_eq!(data[0].title, "New Name"),
            other => panic!("expected refresh, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_add_current_tab_uses_active_page() {
        let mut h = harness();
        let (_a, _rx_a) = h.registry.register("https://a.example/", "A").await;
        let (b, _rx_b) = h.registry.register("https://b.example/", "").await;
        h.registry.mark_active(b).await;

        h.core.handle_event(intent(Intent::AddCurrentTab)).await;

        let folder = h.core.builder.locate_or_create_folder().await.unwrap();
        let children = h.bookmarks.get_children(folder).await.unwrap();
        let added = children.last().unwrap();
        assert_eq!(added.url.as_deref(), Some("https://b.example/"));
        assert_eq!(added.title, "https://b.example/");
    }

    #[tokio::test]
    async fn test_update_icon_sets_and_clears() {
        let mut h = harness();
        h.core
            .handle_event(intent(Intent::UpdateIcon {
                id: "7".into(),
                url: Some(" https://icons.example/7.png ".into()),
            }))
            .await;
        let stored = h.settings.get(vec![KEY_CUSTOM_ICONS.into()]).await.unwrap();
        assert_eq!(stored[KEY_CUSTOM_ICONS]["7"], "https://icons.example/7.png");

        h.core
            .handle_event(intent(Intent::UpdateIcon {
                id: "7".into(),
                url: Some(String::new()),
            }))
            .await;
        let stored = h.settings.get(vec![KEY_CUSTOM_ICONS.into()]).await.unwrap();
        assert!(stored[KEY_CUSTOM_ICONS].get("7").is_none());

        h.core
            .handle_event(intent(Intent::UpdateIcon {
                id: SETTINGS_ITEM_ID.into(),
                url: Some("https://icons.example/gear.png".into()),
            }))
            .await;
        let stored = h.settings.get(vec![KEY_SETTINGS_ICON.into()]).await.unwrap();
        assert_eq!(stored[KEY_SETTINGS_ICON], "https://icons.example/gear.png");
    }

    #[tokio::test]
    async fn test_irrelevant_storage_change_is_ignored() {
        let mut h = harness();
        let (_tab, mut rx) = h.registry.register("", "").await;
        h.core
            .handle_event(BackgroundEvent::Storage(StorageChange {
                keys: vec!["faviconCache".into(), "somethingElse".into()],
            }))
            .await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_visual_change_pushes_settings_then_refresh() {
        let mut h = harness();
        let (_tab, mut rx) = h.registry.register("", "").await;
        let mut values = Map::new();
        values.insert("dockPosition".into(), Value::String("right".into()));
        h.settings.set(values).await.unwrap();

        h.core
            .handle_event(BackgroundEvent::Storage(StorageChange {
                keys: vec!["dockPosition".into()],
            }))
            .await;
        match rx.try_recv() {
            Ok(PageMessage::ApplySettings { settings }) => {
                assert_eq!(settings.dock_position, dock_proto::settings::DockPosition::Right)
            }
            other => panic!("expected settings, got {:?}", other),
        }
        assert!(matches!(rx.try_recv(), Ok(PageMessage::RefreshDock { .. })));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_show_settings_change_reaches_pages() {
        let mut h = harness();
        let (_tab, mut rx) = h.registry.register("", "").await;
        let mut values = Map::new();
        values.insert("showSettings".into(), Value::Bool(false));
        h.settings.set(values).await.unwrap();

        h.core
            .handle_event(BackgroundEvent::Storage(StorageChange {
                keys: vec!["showSettings".into()],
            }))
            .await;
        match rx.try_recv() {
            Ok(PageMessage::ApplySettings { settings }) => assert!(!settings.show_settings),
            other => panic!("expected settings, got {:?}", other),
        }
        match rx.try_recv() {
            Ok(PageMessage::RefreshDock { data }) => {
                assert!(data.iter().all(|entry| entry.id != SETTINGS_ITEM_ID))
            }
            other => panic!("expected refresh, got {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_custom_icon_change_refreshes_without_settings() {
        let mut h = harness();
        let (_tab, mut rx) = h.registry.register("", "").await;
        h.core
            .handle_event(BackgroundEvent::Storage(StorageChange {
                keys: vec!["customIcons".into()],
            }))
            .await;
        assert!(matches!(rx.try_recv(), Ok(PageMessage::RefreshDock { .. })));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_set_setting_allows_known_keys_only() {
        let mut h = harness();
        h.core
            .handle_event(intent(Intent::SetSetting {
                key: "showSettings".into(),
                value: Value::Bool(false),
            }))
            .await;
        h.core
            .handle_event(intent(Intent::SetSetting {
                key: "faviconCache".into(),
                value: Value::Null,
            }))
            .await;
        let stored = h
            .settings
            .get(vec!["showSettings".into(), "faviconCache".into()])
            .await
            .unwrap();
        assert_eq!(stored["showSettings"], false);
        assert!(!stored.contains_key("faviconCache"));
    }

    #[tokio::test]
    async fn test_toggle_goes_to_active_page_only() {
        let mut h = harness();
        let (a, mut rx_a) = h.registry.register("", "").await;
        let (_b, mut rx_b) = h.registry.register("", "").await;
        h.registry.mark_active(a).await;

        h.core
            .handle_event(BackgroundEvent::Command(TOGGLE_DOCK_COMMAND.into()))
            .await;
        assert!(matches!(rx_a.try_recv(), Ok(PageMessage::ToggleDock { .. })));
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_window_intents_reach_opener() {
        let mut h = harness();
        h.core
            .handle_event(intent(Intent::OpenNewWindow {
                url: "https://a.example".into(),
            }))
            .await;
        h.core
            .handle_event(intent(Intent::OpenIncognito {
                url: "https://b.example".into(),
            }))
            .await;
        h.core.handle_event(intent(Intent::OpenSettings)).await;
        assert_eq!(
            *h.opener.opened.lock().unwrap(),
            vec![
                "window https://a.example".to_string(),
                "incognito https://b.example".to_string(),
                "settings".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_shutdown_stops_loop() {
        let mut h = harness();
        assert!(!h.core.handle_event(BackgroundEvent::Shutdown).await);
    }
}
