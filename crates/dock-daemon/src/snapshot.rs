//! Builds the enriched list of dock entries from the designated folder.

use std::collections::HashMap;
use std::sync::Arc;

use dock_proto::config::FolderConfig;
use dock_proto::icon::{resolve_icon, FaviconCacheEntry, FaviconService};
use dock_proto::protocol::{BookmarkEntry, Snapshot};
use dock_proto::settings::{
    DockSettings, KEY_CUSTOM_ICONS, KEY_FAVICON_CACHE, SETTINGS_KEYS,
};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::api::{BookmarkNode, BookmarkStore, CreateDetails, SettingsStore, OTHER_BOOKMARKS_ID};
use crate::error::PlatformResult;

/// A derived favicon URL that should be fetched and stored.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingIcon {
    pub id: String,
    pub page_url: String,
    pub icon_url: String,
}

#[derive(Debug, Clone, Default)]
pub struct BuiltSnapshot {
    pub entries: Snapshot,
    /// Icons resolved from the favicon service rather than the cache.
    pub pending_icons: Vec<PendingIcon>,
    /// False when the folder could not be read and `entries` is a fallback.
    pub folder_found: bool,
}

impl BuiltSnapshot {
    /// Every real bookmark id in the snapshot, nested ones included.
    pub fn bookmark_ids(&self) -> Vec<&str> {
        self.entries
            .iter()
            .flat_map(|e| std::iter::once(e).chain(e.children.iter().flatten()))
            .filter(|e| !e.is_synthetic())
            .map(|e| e.id.as_str())
            .collect()
    }
}

pub struct SnapshotBuilder {
    bookmarks: Arc<dyn BookmarkStore>,
    settings: Arc<dyn SettingsStore>,
    folder: FolderConfig,
    favicons: FaviconService,
}

impl SnapshotBuilder {
    pub fn new(
        bookmarks: Arc<dyn BookmarkStore>,
        settings: Arc<dyn SettingsStore>,
        folder: FolderConfig,
        favicons: FaviconService,
    ) -> Self {
        Self {
            bookmarks,
            settings,
            folder,
            favicons,
        }
    }

    /// Id of the designated folder, creating and seeding it on first use.
    ///
    /// The lookup is a depth-first title match restricted to folders, first
    /// hit wins.  A new folder goes under "Other bookmarks" when the tree has
    /// one, otherwise under the root.
    pub async fn locate_or_create_folder(&self) -> PlatformResult<String> {
        let tree = self.bookmarks.get_tree().await?;
        if let Some(found) = find_folder(&tree, &self.folder.name) {
            return Ok(found.id.clone());
        }

        let parent_id = tree
            .first()
            .map(|root| {
                root.children
                    .iter()
                    .flatten()
                    .find(|c| c.id == OTHER_BOOKMARKS_ID)
                    .unwrap_or(root)
                    .id
                    .clone()
            })
            .unwrap_or_else(|| OTHER_BOOKMARKS_ID.to_string());

        let folder = self
            .bookmarks
            .create(CreateDetails {
                parent_id,
                index: None,
                title: self.folder.name.clone(),
                url: None,
            })
            .await?;
        info!("Created dock folder {:?} ({})", self.folder.name, folder.id);

        if !self.folder.welcome_url.is_empty() {
            self.bookmarks
                .create(CreateDetails {
                    parent_id: folder.id.clone(),
                    index: None,
                    title: self.folder.welcome_title.clone(),
                    url: Some(self.folder.welcome_url.clone()),
                })
                .await?;
        }
        Ok(folder.id)
    }

    /// Current preferences, defaults filled in.
    pub async fn load_settings(&self) -> DockSettings {
        let keys = SETTINGS_KEYS.iter().map(|k| k.to_string()).collect();
        match self.settings.get(keys).await {
            Ok(values) => DockSettings::from_values(&values),
            Err(e) => {
                warn!("Failed to read settings, using defaults: {}", e);
                DockSettings::default()
            }
        }
    }

    /// Always produces a list.  Store failures degrade to an empty folder.
    pub async fn build(&self) -> BuiltSnapshot {
        let mut built = BuiltSnapshot::default();

        let children = match self.locate_or_create_folder().await {
            Ok(folder_id) => match self.bookmarks.get_children(folder_id).await {
                Ok(children) => {
                    built.folder_found = true;
                    children
                }
                Err(e) => {
                    warn!("Failed to list dock folder: {}", e);
                    Vec::new()
                }
            },
            Err(e) => {
                warn!("Failed to locate dock folder: {}", e);
                Vec::new()
            }
        };

        let mut keys: Vec<String> = SETTINGS_KEYS.iter().map(|k| k.to_string()).collect();
        keys.push(KEY_CUSTOM_ICONS.to_string());
        keys.push(KEY_FAVICON_CACHE.to_string());
        let values = self.settings.get(keys).await.unwrap_or_else(|e| {
            warn!("Failed to read stored icons and settings: {}", e);
            Map::new()
        });
        let custom_icons = custom_icon_map(values.get(KEY_CUSTOM_ICONS));
        let favicon_cache = favicon_cache_map(values.get(KEY_FAVICON_CACHE));
        let settings = DockSettings::from_values(&values);

        let mut enrich = |node: &BookmarkNode| -> BookmarkEntry {
            let icon = resolve_icon(
                &node.id,
                node.url.as_deref(),
                &custom_icons,
                &favicon_cache,
                &self.favicons,
            );
            if icon.needs_caching() {
                if let Some(page_url) = &node.url {
                    built.pending_icons.push(PendingIcon {
                        id: node.id.clone(),
                        page_url: page_url.clone(),
                        icon_url: icon.url.clone(),
                    });
                }
            }
            BookmarkEntry {
                id: node.id.clone(),
                title: node.title.clone(),
                url: node.url.clone(),
                parent_id: node.parent_id.clone(),
                index: Some(node.index),
                icon_url: icon.url,
                children: node.is_folder().then(Vec::new),
            }
        };

        let mut entries = Vec::with_capacity(children.len() + 2);
        for child in &children {
            let mut entry = enrich(child);
            if child.is_folder() {
                // One extra level for folder stacks; anything deeper stays collapsed.
                match self.bookmarks.get_children(child.id.clone()).await {
                    Ok(nested) => entry.children = Some(nested.iter().map(&mut enrich).collect()),
                    Err(e) => debug!("Failed to list folder {}: {}", child.id, e),
                }
            }
            entries.push(entry);
        }

        if settings.show_settings {
            let icon = settings
                .settings_icon
                .clone()
                .unwrap_or_else(|| self.folder.settings_icon.clone());
            entries.push(BookmarkEntry::spacer());
            entries.push(BookmarkEntry::settings_item(icon));
        }

        built.entries = entries;
        built
    }
}

fn find_folder<'a>(nodes: &'a [BookmarkNode], name: &str) -> Option<&'a BookmarkNode> {
    nodes.iter().find_map(|node| {
        if node.title == name && node.is_folder() {
            return Some(node);
        }
        node.children.as_deref().and_then(|c| find_folder(c, name))
    })
}

fn custom_icon_map(value: Option<&Value>) -> HashMap<String, String> {
    value
        .and_then(Value::as_object)
        .map(|icons| {
            icons
                .iter()
                .filter_map(|(id, url)| url.as_str().map(|u| (id.clone(), u.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

/// Entries that do not parse are skipped, not fatal.
fn favicon_cache_map(value: Option<&Value>) -> HashMap<String, FaviconCacheEntry> {
    value
        .and_then(Value::as_object)
        .map(|cache| {
            cache
                .iter()
                .filter_map(|(id, entry)| {
                    serde_json::from_value::<FaviconCacheEntry>(entry.clone())
                        .ok()
                        .map(|e| (id.clone(), e))
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{BookmarkChanges, BOOKMARKS_BAR_ID};
    use crate::store::{JsonBookmarkStore, JsonSettingsStore};
    use dock_proto::icon::{PLACEHOLDER_FOLDER, BUILTIN_ICON};
    use dock_proto::protocol::SETTINGS_ITEM_ID;
    use serde_json::json;

    struct Fixture {
        bookmarks: Arc<JsonBookmarkStore>,
        settings: Arc<JsonSettingsStore>,
        builder: SnapshotBuilder,
    }

    fn fixture() -> Fixture {
        let bookmarks = Arc::new(JsonBookmarkStore::in_memory());
        let settings = Arc::new(JsonSettingsStore::in_memory());
        let builder = SnapshotBuilder::new(
            bookmarks.clone(),
            settings.clone(),
            FolderConfig::default(),
            FaviconService::default(),
        );
        Fixture {
            bookmarks,
            settings,
            builder,
        }
    }

    fn link(parent: &str, title: &str, url: &str) -> CreateDetails {
        CreateDetails {
            parent_id: parent.into(),
            index: None,
            title: title.into(),
            url: Some(url.into()),
        }
    }

    fn set(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_missing_folder_is_created_once() {
        let f = fixture();
        let first = f.builder.locate_or_create_folder().await.unwrap();
        let second = f.builder.locate_or_create_folder().await.unwrap();
        assert_eq!(first, second);

        let other = f.bookmarks.get_children(OTHER_BOOKMARKS_ID.into()).await.unwrap();
        assert_eq!(other.len(), 1);
        assert_eq!(other[0].title, "Vertical-bookmark-list");

        let seeded = f.bookmarks.get_children(first).await.unwrap();
        assert_eq!(seeded.len(), 1);
        assert_eq!(seeded[0].url.as_deref(), Some("https://www.rust-lang.org/"));
    }

    #[tokio::test]
    async fn test_link_with_folder_title_is_not_the_folder() {
        let f = fixture();
        f.bookmarks
            .create(link(BOOKMARKS_BAR_ID, "Vertical-bookmark-list", "https://x.example"))
            .await
            .unwrap();
        let id = f.builder.locate_or_create_folder().await.unwrap();
        let node = f.bookmarks.get_children(OTHER_BOOKMARKS_ID.into()).await.unwrap();
        assert_eq!(node[0].id, id);
    }

    #[tokio::test]
    async fn test_missing_empty_and_populated_folder_all_build() {
        let f = fixture();

        // Missing: created and seeded.
        let built = f.builder.build().await;
        assert!(built.folder_found);
        assert_eq!(built.entries.len(), 3);
        assert_eq!(built.entries[2].id, SETTINGS_ITEM_ID);

        // Empty.
        let folder = f.builder.locate_or_create_folder().await.unwrap();
        let seeded = f.bookmarks.get_children(folder.clone()).await.unwrap();
        f.bookmarks.remove(seeded[0].id.clone()).await.unwrap();
        let built = f.builder.build().await;
        assert_eq!(built.entries.len(), 2);
        assert!(built.entries[0].is_synthetic());

        // Populated, with a nested stack.
        f.bookmarks
            .create(link(&folder, "Example", "https://example.com"))
            .await
            .unwrap();
        let stack = f
            .bookmarks
            .create(CreateDetails {
                parent_id: folder.clone(),
                index: None,
                title: "Stack".into(),
                url: None,
            })
            .await
            .unwrap();
        f.bookmarks
            .create(link(&stack.id, "Inner", "https://inner.example"))
            .await
            .unwrap();

        let built = f.builder.build().await;
        let titles: Vec<&str> = built.entries.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["Example", "Stack", "-", "Dock Settings"]);
        assert_eq!(built.entries[1].icon_url, PLACEHOLDER_FOLDER);
        let nested = built.entries[1].children.as_ref().unwrap();
        assert_eq!(nested[0].title, "Inner");
        assert!(nested[0].children.is_none());
        assert_eq!(built.pending_icons.len(), 2);
        assert_eq!(built.bookmark_ids().len(), 3);
    }

    #[tokio::test]
    async fn test_settings_entry_follows_preferences() {
        let f = fixture();
        let built = f.builder.build().await;
        assert_eq!(built.entries.last().unwrap().icon_url, BUILTIN_ICON);

        f.settings
            .set(set(json!({"settingsIcon": "https://icons.example/gear.png"})))
            .await
            .unwrap();
        let built = f.builder.build().await;
        assert_eq!(
            built.entries.last().unwrap().icon_url,
            "https://icons.example/gear.png"
        );

        f.settings.set(set(json!({"showSettings": false}))).await.unwrap();
        let built = f.builder.build().await;
        assert!(built.entries.iter().all(|e| !e.is_synthetic()));
    }

    #[tokio::test]
    async fn test_custom_and_cached_icons_are_applied() {
        let f = fixture();
        let folder = f.builder.locate_or_create_folder().await.unwrap();
        let a = f
            .bookmarks
            .create(link(&folder, "A", "https://a.example"))
            .await
            .unwrap();
        let b = f
            .bookmarks
            .create(link(&folder, "B", "https://b.example"))
            .await
            .unwrap();
        f.settings
            .set(set(json!({
                "customIcons": { a.id.clone(): "https://icons.example/a.png" },
                "faviconCache": {
                    b.id.clone(): { "pageUrl": "https://b.example", "data": "data:image/png;base64,AA==" }
                }
            })))
            .await
            .unwrap();

        let built = f.builder.build().await;
        let find = |id: &str| built.entries.iter().find(|e| e.id == id).unwrap();
        assert_eq!(find(&a.id).icon_url, "https://icons.example/a.png");
        assert_eq!(find(&b.id).icon_url, "data:image/png;base64,AA==");
        assert!(built.pending_icons.iter().all(|p| p.id != a.id && p.id != b.id));

        // Changing the url invalidates the cached icon.
        f.bookmarks
            .update(
                b.id.clone(),
                BookmarkChanges {
                    title: None,
                    url: Some("https://b2.example".into()),
                },
            )
            .await
            .unwrap();
        let built = f.builder.build().await;
        assert!(built.pending_icons.iter().any(|p| p.id == b.id));
    }
}
