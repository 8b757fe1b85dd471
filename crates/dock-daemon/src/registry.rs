//! Connected pages, addressed like browser tabs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use dock_proto::protocol::PageMessage;
use futures_util::future::BoxFuture;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

use crate::api::{TabHost, TabId, TabInfo};
use crate::error::{PlatformError, PlatformResult};

/// Per-page queue depth.  A page that falls this far behind loses pushes.
const PAGE_QUEUE: usize = 32;

struct PageSlot {
    info: TabInfo,
    tx: mpsc::Sender<PageMessage>,
}

/// Every page currently attached to the background.
///
/// Exactly one page is active at a time: the one that most recently connected,
/// reported focus, or sent a request.
pub struct PageRegistry {
    next_id: AtomicU64,
    pages: RwLock<HashMap<TabId, PageSlot>>,
}

impl Default for PageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PageRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pages: RwLock::new(HashMap::new()),
        }
    }

    /// Attach a page.  It becomes the active one.  Pushes for it arrive on the
    /// returned receiver.
    pub async fn register(
        &self,
        url: impl Into<String>,
        title: impl Into<String>,
    ) -> (TabId, mpsc::Receiver<PageMessage>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(PAGE_QUEUE);
        let mut pages = self.pages.write().await;
        for slot in pages.values_mut() {
            slot.info.active = false;
        }
        pages.insert(
            id,
            PageSlot {
                info: TabInfo {
                    id,
                    url: url.into(),
                    title: title.into(),
                    active: true,
                },
                tx,
            },
        );
        debug!("Page {} registered ({} open)", id, pages.len());
        (id, rx)
    }

    pub async fn unregister(&self, id: TabId) {
        let mut pages = self.pages.write().await;
        let was_active = pages.remove(&id).is_some_and(|slot| slot.info.active);
        // Hand focus to the most recently opened page that is left.
        if was_active {
            if let Some(slot) = pages
                .iter_mut()
                .max_by_key(|(id, _)| **id)
                .map(|(_, slot)| slot)
            {
                slot.info.active = true;
            }
        }
        debug!("Page {} unregistered ({} open)", id, pages.len());
    }

    pub async fn update_info(&self, id: TabId, url: String, title: String, active: bool) {
        let mut pages = self.pages.write().await;
        if let Some(slot) = pages.get_mut(&id) {
            slot.info.url = url;
            slot.info.title = title;
        }
        if active {
            activate(&mut pages, id);
        }
    }

    pub async fn mark_active(&self, id: TabId) {
        activate(&mut *self.pages.write().await, id);
    }

    pub async fn len(&self) -> usize {
        self.pages.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pages.read().await.is_empty()
    }
}

fn activate(pages: &mut HashMap<TabId, PageSlot>, id: TabId) {
    if !pages.contains_key(&id) {
        return;
    }
    for (tab, slot) in pages.iter_mut() {
        slot.info.active = *tab == id;
    }
}

impl TabHost for PageRegistry {
    fn query(&self) -> BoxFuture<'_, Vec<TabInfo>> {
        Box::pin(async move {
            let mut tabs: Vec<TabInfo> = self
                .pages
                .read()
                .await
                .values()
                .map(|slot| slot.info.clone())
                .collect();
            tabs.sort_by_key(|t| t.id);
            tabs
        })
    }

    fn active(&self) -> BoxFuture<'_, Option<TabInfo>> {
        Box::pin(async move {
            self.pages
                .read()
                .await
                .values()
                .find(|slot| slot.info.active)
                .map(|slot| slot.info.clone())
        })
    }

    fn send(&self, tab: TabId, message: PageMessage) -> BoxFuture<'_, PlatformResult<()>> {
        Box::pin(async move {
            let pages = self.pages.read().await;
            let slot = pages.get(&tab).ok_or(PlatformError::PeerGone(tab))?;
            match slot.tx.try_send(message) {
                Ok(()) => Ok(()),
                Err(mpsc::error::TrySendError::Closed(_)) => Err(PlatformError::PeerGone(tab)),
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!("Page {} is not keeping up, dropping push", tab);
                    Ok(())
                }
            }
        })
    }
}
