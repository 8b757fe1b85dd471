//! Best-effort fan-out of pushes to open pages.

use std::sync::Arc;

use dock_proto::protocol::PageMessage;
use tracing::debug;

use crate::api::TabHost;

#[derive(Clone)]
pub struct BroadcastBus {
    tabs: Arc<dyn TabHost>,
}

impl BroadcastBus {
    pub fn new(tabs: Arc<dyn TabHost>) -> Self {
        Self { tabs }
    }

    /// Send `message` to every open page.  A page that cannot receive is
    /// skipped; nothing is retried.  Returns how many pages accepted it.
    pub async fn broadcast(&self, message: PageMessage) -> usize {
        let tabs = self.tabs.query().await;
        let mut delivered = 0;
        for tab in &tabs {
            match self.tabs.send(tab.id, message.clone()).await {
                Ok(()) => delivered += 1,
                Err(e) => debug!("Push to page {} dropped: {}", tab.id, e),
            }
        }
        debug!("Pushed to {}/{} pages", delivered, tabs.len());
        delivered
    }

    /// Send `message` to the active page only.
    pub async fn send_to_active(&self, message: PageMessage) -> bool {
        let Some(tab) = self.tabs.active().await else {
            debug!("No active page to receive push");
            return false;
        };
        match self.tabs.send(tab.id, message).await {
            Ok(()) => true,
            Err(e) => {
                debug!("Push to active page {} dropped: {}", tab.id, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::PageRegistry;

    #[tokio::test]
    async fn test_broadcast_skips_gone_pages() {
        let registry = Arc::new(PageRegistry::new());
        let (_a, mut rx_a) = registry.register("", "").await;
        let (_b, rx_b) = registry.register("", "").await;
        let (_c, mut rx_c) = registry.register("", "").await;
        drop(rx_b);

        let bus = BroadcastBus::new(registry.clone());
        let delivered = bus
            .broadcast(PageMessage::RefreshDock { data: Vec::new() })
            .await;
        assert_eq!(delivered, 2);
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_c.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_send_to_active_only() {
        let registry = Arc::new(PageRegistry::new());
        let (a, mut rx_a) = registry.register("", "").await;
        let (_b, mut rx_b) = registry.register("", "").await;
        registry.mark_active(a).await;

        let bus = BroadcastBus::new(registry.clone());
        assert!(bus.send_to_active(PageMessage::ToggleDock { data: Vec::new() }).await);
        assert!(matches!(rx_a.try_recv(), Ok(PageMessage::ToggleDock { .. })));
        assert!(rx_b.try_recv().is_err());
    }
}
