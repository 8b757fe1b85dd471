//! Background favicon caching.
//!
//! Derived favicon-service URLs are fetched once and stored as `data:` URLs
//! under the bookmark id, so later snapshots embed them without touching the
//! network.  Every failure just leaves the item uncached.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use dock_proto::icon::FaviconCacheEntry;
use dock_proto::settings::KEY_FAVICON_CACHE;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::api::{FaviconFetcher, SettingsStore};
use crate::error::PlatformResult;
use crate::snapshot::PendingIcon;

pub fn to_data_url(content_type: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", content_type, STANDARD.encode(bytes))
}

#[derive(Clone)]
pub struct FaviconCache {
    settings: Arc<dyn SettingsStore>,
    fetcher: Arc<dyn FaviconFetcher>,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl FaviconCache {
    pub fn new(settings: Arc<dyn SettingsStore>, fetcher: Arc<dyn FaviconFetcher>) -> Self {
        Self {
            settings,
            fetcher,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Fetch and store every icon not already being fetched.  Returns at once;
    /// the work runs on its own task, which is returned for tests to await.
    pub fn cache_missing_icons(&self, items: Vec<PendingIcon>) -> Option<tokio::task::JoinHandle<()>> {
        let items = self.claim(items);
        if items.is_empty() {
            return None;
        }
        let this = self.clone();
        Some(tokio::spawn(async move {
            for item in items {
                let id = item.id.clone();
                if let Err(e) = this.cache_one(item).await {
                    debug!("Favicon for {} not cached: {}", id, e);
                }
                this.release(&id);
            }
        }))
    }

    fn claim(&self, items: Vec<PendingIcon>) -> Vec<PendingIcon> {
        let Ok(mut in_flight) = self.in_flight.lock() else {
            return Vec::new();
        };
        items
            .into_iter()
            .filter(|item| in_flight.insert(item.id.clone()))
            .collect()
    }

    fn release(&self, id: &str) {
        if let Ok(mut in_flight) = self.in_flight.lock() {
            in_flight.remove(id);
        }
    }

    /// Read-modify-write of the whole cache map without a lock; a concurrent
    /// writer can lose an entry, which the next snapshot simply re-queues.
    async fn cache_one(&self, item: PendingIcon) -> PlatformResult<()> {
        let icon = self.fetcher.fetch(item.icon_url.clone()).await?;
        let entry = FaviconCacheEntry {
            page_url: item.page_url,
            data: to_data_url(&icon.content_type, &icon.bytes),
        };

        let mut cache = self.load().await?;
        cache.insert(item.id.clone(), serde_json::to_value(entry)?);
        self.store(cache).await?;
        debug!("Cached favicon for {}", item.id);
        Ok(())
    }

    /// Drop entries whose bookmark is no longer listed.  Returns how many went.
    pub async fn prune(&self, live_ids: &HashSet<&str>) -> PlatformResult<usize> {
        let mut cache = self.load().await?;
        let before = cache.len();
        cache.retain(|id, _| live_ids.contains(id.as_str()));
        let removed = before - cache.len();
        if removed > 0 {
            self.store(cache).await?;
            info!("Pruned {} orphaned favicons", removed);
        }
        Ok(removed)
    }

    async fn load(&self) -> PlatformResult<Map<String, Value>> {
        let mut values = self.settings.get(vec![KEY_FAVICON_CACHE.to_string()]).await?;
        Ok(match values.remove(KEY_FAVICON_CACHE) {
            Some(Value::Object(cache)) => cache,
            _ => Map::new(),
        })
    }

    async fn store(&self, cache: Map<String, Value>) -> PlatformResult<()> {
        let mut values = Map::new();
        values.insert(KEY_FAVICON_CACHE.to_string(), Value::Object(cache));
        self.settings.set(values).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::FetchedIcon;
    use crate::error::PlatformError;
    use crate::store::JsonSettingsStore;
    use futures_util::future::BoxFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubFetcher {
        calls: AtomicUsize,
    }

    impl FaviconFetcher for StubFetcher {
        fn fetch(&self, url: String) -> BoxFuture<'_, PlatformResult<FetchedIcon>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if url.contains("broken") {
                    return Err(PlatformError::Fetch("404".into()));
                }
                Ok(FetchedIcon {
                    bytes: vec![1, 2, 3],
                    content_type: "image/png".into(),
                })
            })
        }
    }

    fn pending(id: &str, host: &str) -> PendingIcon {
        PendingIcon {
            id: id.into(),
            page_url: format!("https://{}/", host),
            icon_url: format!("https://favicons.example/{}", host),
        }
    }

    #[test]
    fn test_to_data_url() {
        assert_eq!(to_data_url("image/png", &[1, 2, 3]), "data:image/png;base64,AQID");
    }

    #[tokio::test]
    async fn test_fetched_icons_are_stored_and_failures_skipped() {
        let settings = Arc::new(JsonSettingsStore::in_memory());
        let fetcher = Arc::new(StubFetcher {
            calls: AtomicUsize::new(0),
        });
        let cache = FaviconCache::new(settings.clone(), fetcher.clone());

        let task = cache
            .cache_missing_icons(vec![pending("1", "a.example"), pending("2", "broken.example")])
            .unwrap();
        task.await.unwrap();

        let stored = cache.load().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored["1"]["pageUrl"], "https://a.example/");
        assert_eq!(stored["1"]["data"], "data:image/png;base64,AQID");
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
        assert!(cache.in_flight.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_requests_are_claimed_once() {
        let settings = Arc::new(JsonSettingsStore::in_memory());
        let fetcher = Arc::new(StubFetcher {
            calls: AtomicUsize::new(0),
        });
        let cache = FaviconCache::new(settings, fetcher);

        let claimed = cache.claim(vec![pending("1", "a.example"), pending("1", "a.example")]);
        assert_eq!(claimed.len(), 1);
        assert!(cache.cache_missing_icons(vec![pending("1", "a.example")]).is_none());
        cache.release("1");
        assert_eq!(cache.claim(vec![pending("1", "a.example")]).len(), 1);
    }

    #[tokio::test]
    async fn test_prune_keeps_live_ids() {
        let settings = Arc::new(JsonSettingsStore::in_memory());
        let fetcher = Arc::new(StubFetcher {
            calls: AtomicUsize::new(0),
        });
        let cache = FaviconCache::new(settings, fetcher);
        cache
            .cache_missing_icons(vec![pending("1", "a.example"), pending("2", "b.example")])
            .unwrap()
            .await
            .unwrap();

        let live: HashSet<&str> = ["2"].into_iter().collect();
        assert_eq!(cache.prune(&live).await.unwrap(), 1);
        assert_eq!(cache.prune(&live).await.unwrap(), 0);
        let stored = cache.load().await.unwrap();
        assert!(stored.contains_key("2"));
        assert!(!stored.contains_key("1"));
    }
}
