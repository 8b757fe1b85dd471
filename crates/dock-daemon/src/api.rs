//! Capability ports the background depends on.
//!
//! Every platform facility (bookmark tree, key-value store, open pages, window
//! management, network) is reached through one of these traits.  The core
//! never touches files, sockets or processes directly, which keeps it testable
//! with in-memory implementations.

use std::sync::Arc;

use dock_proto::protocol::PageMessage;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::broadcast;

use crate::error::PlatformResult;

/// Id of the tree root.
pub const ROOT_ID: &str = "0";
/// Id of the bookmarks bar, a permanent child of the root.
pub const BOOKMARKS_BAR_ID: &str = "1";
/// Id of the "Other bookmarks" folder, where new top-level folders go.
pub const OTHER_BOOKMARKS_ID: &str = "2";

pub type TabId = u64;

/// A node of the platform bookmark tree.  `url == None` marks a folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkNode {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Milliseconds since the epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_added: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<BookmarkNode>>,
}

impl BookmarkNode {
    pub fn is_folder(&self) -> bool {
        self.url.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct CreateDetails {
    pub parent_id: String,
    pub index: Option<u32>,
    pub title: String,
    /// `None` creates a folder.
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct BookmarkChanges {
    pub title: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookmarkEvent {
    Created { id: String },
    Removed { id: String },
    Changed { id: String },
    Moved { id: String },
    /// The backing file was replaced by another program.
    Reloaded,
}

/// Keys written in one key-value store transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageChange {
    pub keys: Vec<String>,
}

/// What the background knows about one open page.
#[derive(Debug, Clone, PartialEq)]
pub struct TabInfo {
    pub id: TabId,
    pub url: String,
    pub title: String,
    pub active: bool,
}

#[derive(Debug, Clone)]
pub struct FetchedIcon {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

pub trait BookmarkStore: Send + Sync {
    /// The whole tree; a single-element list holding the root.
    fn get_tree(&self) -> BoxFuture<'_, PlatformResult<Vec<BookmarkNode>>>;

    /// Direct children of a folder, without their own children.
    fn get_children(&self, id: String) -> BoxFuture<'_, PlatformResult<Vec<BookmarkNode>>>;

    fn create(&self, details: CreateDetails) -> BoxFuture<'_, PlatformResult<BookmarkNode>>;

    fn update(
        &self,
        id: String,
        changes: BookmarkChanges,
    ) -> BoxFuture<'_, PlatformResult<BookmarkNode>>;

    /// Removes the node and anything below it.
    fn remove(&self, id: String) -> BoxFuture<'_, PlatformResult<()>>;

    /// `parent_id == None` keeps the current parent.
    fn move_node(
        &self,
        id: String,
        parent_id: Option<String>,
        index: u32,
    ) -> BoxFuture<'_, PlatformResult<BookmarkNode>>;

    /// Events are sent after the mutation is persisted.
    fn subscribe(&self) -> broadcast::Receiver<BookmarkEvent>;
}

pub trait SettingsStore: Send + Sync {
    /// Values for the keys that are present; missing keys are simply absent.
    fn get(&self, keys: Vec<String>) -> BoxFuture<'_, PlatformResult<Map<String, Value>>>;

    fn set(&self, values: Map<String, Value>) -> BoxFuture<'_, PlatformResult<()>>;

    /// Notified with the keys whose value actually changed.
    fn subscribe(&self) -> broadcast::Receiver<StorageChange>;
}

pub trait TabHost: Send + Sync {
    fn query(&self) -> BoxFuture<'_, Vec<TabInfo>>;

    fn active(&self) -> BoxFuture<'_, Option<TabInfo>>;

    /// Fails with `PeerGone` if the page is not there to receive.
    fn send(&self, tab: TabId, message: PageMessage) -> BoxFuture<'_, PlatformResult<()>>;
}

pub trait WindowOpener: Send + Sync {
    fn open_tab(&self, url: String) -> BoxFuture<'_, PlatformResult<()>>;

    fn open_window(&self, url: String, incognito: bool) -> BoxFuture<'_, PlatformResult<()>>;

    fn open_settings_page(&self) -> BoxFuture<'_, PlatformResult<()>>;
}

pub trait FaviconFetcher: Send + Sync {
    fn fetch(&self, url: String) -> BoxFuture<'_, PlatformResult<FetchedIcon>>;
}

/// The full capability set handed to the background core.
#[derive(Clone)]
pub struct Platform {
    pub bookmarks: Arc<dyn BookmarkStore>,
    pub settings: Arc<dyn SettingsStore>,
    pub tabs: Arc<dyn TabHost>,
    pub opener: Arc<dyn WindowOpener>,
    pub fetcher: Arc<dyn FaviconFetcher>,
}
