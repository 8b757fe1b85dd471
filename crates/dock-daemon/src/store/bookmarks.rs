use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::{modified, write_json};
use crate::api::{
    BookmarkChanges, BookmarkEvent, BookmarkNode, BookmarkStore, CreateDetails, BOOKMARKS_BAR_ID,
    OTHER_BOOKMARKS_ID, ROOT_ID,
};
use crate::error::{PlatformError, PlatformResult};

const EVENT_CAPACITY: usize = 64;

/// On-disk layout of the bookmark file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TreeFile {
    next_id: u64,
    root: BookmarkNode,
}

impl Default for TreeFile {
    fn default() -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        let permanent = |id: &str, index: u32, title: &str| BookmarkNode {
            id: id.to_string(),
            parent_id: Some(ROOT_ID.to_string()),
            index,
            title: title.to_string(),
            url: None,
            date_added: Some(now),
            children: Some(Vec::new()),
        };
        Self {
            next_id: 3,
            root: BookmarkNode {
                id: ROOT_ID.to_string(),
                parent_id: None,
                index: 0,
                title: String::new(),
                url: None,
                date_added: Some(now),
                children: Some(vec![
                    permanent(BOOKMARKS_BAR_ID, 0, "Bookmarks bar"),
                    permanent(OTHER_BOOKMARKS_ID, 1, "Other bookmarks"),
                ]),
            },
        }
    }
}

struct State {
    tree: TreeFile,
    /// Modification time of our last write or reload.
    mtime: Option<SystemTime>,
}

/// Bookmark tree kept in memory and mirrored to a JSON file.
///
/// Ids are decimal strings handed out from a counter; `0` is the root, `1` the
/// bookmarks bar and `2` "Other bookmarks".  None of those three can be
/// renamed, moved or removed.
pub struct JsonBookmarkStore {
    path: Option<PathBuf>,
    state: RwLock<State>,
    events: broadcast::Sender<BookmarkEvent>,
}

impl JsonBookmarkStore {
    /// A store that never touches the disk.
    pub fn in_memory() -> Self {
        Self::with_tree(None, TreeFile::default(), None)
    }

    /// Load `path`, creating it with an empty tree if it does not exist.
    pub async fn open(path: impl Into<PathBuf>) -> PlatformResult<Self> {
        let path = path.into();
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let mut tree: TreeFile = serde_json::from_slice(&bytes)?;
                normalize(&mut tree.root, None, 0);
                let mtime = modified(&path).await;
                info!("Loaded bookmarks from {:?}", path);
                Ok(Self::with_tree(Some(path), tree, mtime))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let tree = TreeFile::default();
                let mtime = write_json(&path, &tree).await?;
                info!("Created bookmark file {:?}", path);
                Ok(Self::with_tree(Some(path), tree, mtime))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn with_tree(path: Option<PathBuf>, tree: TreeFile, mtime: Option<SystemTime>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            path,
            state: RwLock::new(State { tree, mtime }),
            events,
        }
    }

    /// Poll the backing file and reload it when another program rewrites it.
    /// Returns `None` for in-memory stores.
    pub fn spawn_watcher(self: Arc<Self>, interval: Duration) -> Option<tokio::task::JoinHandle<()>> {
        let path = self.path.clone()?;
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(mtime) = modified(&path).await else {
                    continue;
                };
                if self.state.read().await.mtime == Some(mtime) {
                    continue;
                }
                match self.reload(&path, mtime).await {
                    Ok(()) => {
                        info!("Bookmark file changed on disk, reloaded");
                        let _ = self.events.send(BookmarkEvent::Reloaded);
                    }
                    Err(e) => warn!("Ignoring unreadable bookmark file {:?}: {}", path, e),
                }
            }
        }))
    }

    async fn reload(&self, path: &Path, mtime: SystemTime) -> PlatformResult<()> {
        let mut state = self.state.write().await;
        // Recorded up front so a broken file is reported once, not every tick.
        state.mtime = Some(mtime);
        let bytes = tokio::fs::read(path).await?;
        let mut tree: TreeFile = serde_json::from_slice(&bytes)?;
        normalize(&mut tree.root, None, 0);
        state.tree = tree;
        Ok(())
    }

    /// Apply `f` to a copy of the tree, persist the copy, then commit it and
    /// emit the event.  A failed write leaves the store untouched.
    async fn mutate<T, F>(&self, f: F) -> PlatformResult<T>
    where
        F: FnOnce(&mut TreeFile) -> PlatformResult<(T, BookmarkEvent)>,
    {
        let mut state = self.state.write().await;
        let mut next = state.tree.clone();
        let (out, event) = f(&mut next)?;
        if let Some(path) = &self.path {
            state.mtime = write_json(path, &next).await?;
        }
        state.tree = next;
        drop(state);

        debug!(?event, "Bookmark tree changed");
        let _ = self.events.send(event);
        Ok(out)
    }
}

impl BookmarkStore for JsonBookmarkStore {
    fn get_tree(&self) -> BoxFuture<'_, PlatformResult<Vec<BookmarkNode>>> {
        Box::pin(async move { Ok(vec![self.state.read().await.tree.root.clone()]) })
    }

    fn get_children(&self, id: String) -> BoxFuture<'_, PlatformResult<Vec<BookmarkNode>>> {
        Box::pin(async move {
            let state = self.state.read().await;
            let node = find(&state.tree.root, &id).ok_or(PlatformError::NotFound(id))?;
            Ok(node
                .children
                .as_deref()
                .unwrap_or_default()
                .iter()
                .map(shallow)
                .collect())
        })
    }

    fn create(&self, details: CreateDetails) -> BoxFuture<'_, PlatformResult<BookmarkNode>> {
        Box::pin(async move {
            self.mutate(move |tree| {
                let id = tree.next_id.to_string();
                tree.next_id += 1;

                let parent_id = details.parent_id;
                let parent = find_mut(&mut tree.root, &parent_id)
                    .ok_or_else(|| PlatformError::NotFound(parent_id.clone()))?;
                let children = parent
                    .children
                    .as_mut()
                    .ok_or_else(|| PlatformError::Invalid(format!("{} is not a folder", parent_id)))?;

                let index = details
                    .index
                    .map_or(children.len(), |i| (i as usize).min(children.len()));
                let is_folder = details.url.is_none();
                children.insert(
                    index,
                    BookmarkNode {
                        id: id.clone(),
                        parent_id: Some(parent_id.clone()),
                        index: index as u32,
                        title: details.title,
                        url: details.url,
                        date_added: Some(chrono::Utc::now().timestamp_millis()),
                        children: is_folder.then(Vec::new),
                    },
                );
                reindex(children);
                Ok((shallow(&children[index]), BookmarkEvent::Created { id }))
            })
            .await
        })
    }

    fn update(
        &self,
        id: String,
        changes: BookmarkChanges,
    ) -> BoxFuture<'_, PlatformResult<BookmarkNode>> {
        Box::pin(async move {
            self.mutate(move |tree| {
                if is_permanent(&id) {
                    return Err(PlatformError::Invalid(format!("{} cannot be modified", id)));
                }
                let node =
                    find_mut(&mut tree.root, &id).ok_or_else(|| PlatformError::NotFound(id.clone()))?;
                if let Some(url) = changes.url {
                    if node.is_folder() {
                        return Err(PlatformError::Invalid(format!("{} is a folder", id)));
                    }
                    node.url = Some(url);
                }
                if let Some(title) = changes.title {
                    node.title = title;
                }
                Ok((shallow(node), BookmarkEvent::Changed { id }))
            })
            .await
        })
    }

    fn remove(&self, id: String) -> BoxFuture<'_, PlatformResult<()>> {
        Box::pin(async move {
            self.mutate(move |tree| {
                if is_permanent(&id) {
                    return Err(PlatformError::Invalid(format!("{} cannot be removed", id)));
                }
                detach(&mut tree.root, &id).ok_or_else(|| PlatformError::NotFound(id.clone()))?;
                Ok(((), BookmarkEvent::Removed { id }))
            })
            .await
        })
    }

    fn move_node(
        &self,
        id: String,
        parent_id: Option<String>,
        index: u32,
    ) -> BoxFuture<'_, PlatformResult<BookmarkNode>> {
        Box::pin(async move {
            self.mutate(move |tree| {
                if is_permanent(&id) {
                    return Err(PlatformError::Invalid(format!("{} cannot be moved", id)));
                }
                let current =
                    find(&tree.root, &id).ok_or_else(|| PlatformError::NotFound(id.clone()))?;
                let old_parent = current.parent_id.clone().unwrap_or_default();
                let old_index = current.index as usize;
                let target = parent_id.unwrap_or_else(|| old_parent.clone());
                if find(current, &target).is_some() {
                    return Err(PlatformError::Invalid(format!(
                        "cannot move {} into its own subtree",
                        id
                    )));
                }
                match find(&tree.root, &target) {
                    None => return Err(PlatformError::NotFound(target)),
                    Some(n) if !n.is_folder() => {
                        return Err(PlatformError::Invalid(format!("{} is not a folder", target)))
                    }
                    Some(_) => {}
                }

                let mut node =
                    detach(&mut tree.root, &id).ok_or_else(|| PlatformError::NotFound(id.clone()))?;
                // The index counts the node's old slot when staying in the same folder.
                let mut index = index as usize;
                if target == old_parent && old_index < index {
                    index -= 1;
                }
                let parent = find_mut(&mut tree.root, &target)
                    .ok_or_else(|| PlatformError::NotFound(target.clone()))?;
                let children = parent.children.get_or_insert_with(Vec::new);
                let index = index.min(children.len());
                node.parent_id = Some(target.clone());
                children.insert(index, node);
                reindex(children);
                Ok((shallow(&children[index]), BookmarkEvent::Moved { id }))
            })
            .await
        })
    }

    fn subscribe(&self) -> broadcast::Receiver<BookmarkEvent> {
        self.events.subscribe()
    }
}

fn is_permanent(id: &str) -> bool {
    matches!(id, ROOT_ID | BOOKMARKS_BAR_ID | OTHER_BOOKMARKS_ID)
}

fn find<'a>(node: &'a BookmarkNode, id: &str) -> Option<&'a BookmarkNode> {
    if node.id == id {
        return Some(node);
    }
    node.children.as_deref()?.iter().find_map(|c| find(c, id))
}

fn find_mut<'a>(node: &'a mut BookmarkNode, id: &str) -> Option<&'a mut BookmarkNode> {
    if node.id == id {
        return Some(node);
    }
    node.children.as_mut()?.iter_mut().find_map(|c| find_mut(c, id))
}

/// Unlink `id` from its parent and return it.
fn detach(node: &mut BookmarkNode, id: &str) -> Option<BookmarkNode> {
    let children = node.children.as_mut()?;
    if let Some(pos) = children.iter().position(|c| c.id == id) {
        let removed = children.remove(pos);
        reindex(children);
        return Some(removed);
    }
    children.iter_mut().find_map(|c| detach(c, id))
}

fn reindex(children: &mut [BookmarkNode]) {
    for (i, child) in children.iter_mut().enumerate() {
        child.index = i as u32;
    }
}

/// Fill in parent ids and indices, which hand-edited files may lack.
fn normalize(node: &mut BookmarkNode, parent_id: Option<&str>, index: u32) {
    node.parent_id = parent_id.map(str::to_string);
    node.index = index;
    let id = node.id.clone();
    if let Some(children) = node.children.as_mut() {
        for (i, child) in children.iter_mut().enumerate() {
            normalize(child, Some(&id), i as u32);
        }
    }
}

fn shallow(node: &BookmarkNode) -> BookmarkNode {
    BookmarkNode {
        id: node.id.clone(),
        parent_id: node.parent_id.clone(),
        index: node.index,
        title: node.title.clone(),
        url: node.url.clone(),
        date_added: node.date_added,
        children: None,
    }
}
