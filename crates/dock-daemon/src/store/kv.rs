use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use futures_util::future::BoxFuture;
use serde_json::{Map, Value};
use tokio::sync::{broadcast, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::{modified, write_json};
use crate::api::{SettingsStore, StorageChange};
use crate::error::PlatformResult;

const EVENT_CAPACITY: usize = 64;

struct State {
    values: Map<String, Value>,
    mtime: Option<SystemTime>,
}

/// Flat JSON object store for preferences, custom icons and cached favicons.
///
/// Writes are last-writer-wins per key.  Change notifications list only the
/// keys whose value differs from what was stored before.
pub struct JsonSettingsStore {
    path: Option<PathBuf>,
    state: RwLock<State>,
    events: broadcast::Sender<StorageChange>,
}

impl JsonSettingsStore {
    pub fn in_memory() -> Self {
        Self::with_values(None, Map::new(), None)
    }

    pub async fn open(path: impl Into<PathBuf>) -> PlatformResult<Self> {
        let path = path.into();
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let values = parse_object(&bytes)?;
                let mtime = modified(&path).await;
                info!("Loaded {} stored keys from {:?}", values.len(), path);
                Ok(Self::with_values(Some(path), values, mtime))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let values = Map::new();
                let mtime = write_json(&path, &values).await?;
                Ok(Self::with_values(Some(path), values, mtime))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn with_values(path: Option<PathBuf>, values: Map<String, Value>, mtime: Option<SystemTime>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            path,
            state: RwLock::new(State { values, mtime }),
            events,
        }
    }

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
                    Ok(keys) if keys.is_empty() => {}
                    Ok(keys) => {
                        info!("Settings file changed on disk: {:?}", keys);
                        let _ = self.events.send(StorageChange { keys });
                    }
                    Err(e) => warn!("Ignoring unreadable settings file {:?}: {}", path, e),
                }
            }
        }))
    }

    async fn reload(&self, path: &Path, mtime: SystemTime) -> PlatformResult<Vec<String>> {
        let mut state = self.state.write().await;
        state.mtime = Some(mtime);
        let bytes = tokio::fs::read(path).await?;
        let values = parse_object(&bytes)?;
        let keys = changed_keys(&state.values, &values);
        state.values = values;
        Ok(keys)
    }
}

impl SettingsStore for JsonSettingsStore {
    fn get(&self, keys: Vec<String>) -> BoxFuture<'_, PlatformResult<Map<String, Value>>> {
        Box::pin(async move {
            let state = self.state.read().await;
            Ok(keys
                .into_iter()
                .filter_map(|k| state.values.get(&k).cloned().map(|v| (k, v)))
                .collect())
        })
    }

    fn set(&self, values: Map<String, Value>) -> BoxFuture<'_, PlatformResult<()>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            let keys: Vec<String> = values
                .iter()
                .filter(|(k, v)| state.values.get(k.as_str()) != Some(*v))
                .map(|(k, _)| k.clone())
                .collect();
            if keys.is_empty() {
                return Ok(());
            }

            let mut next = state.values.clone();
            next.extend(values);
            if let Some(path) = &self.path {
                state.mtime = write_json(path, &next).await?;
            }
            state.values = next;
            drop(state);

            debug!("Stored keys changed: {:?}", keys);
            let _ = self.events.send(StorageChange { keys });
            Ok(())
        })
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.events.subscribe()
    }
}

fn parse_object(bytes: &[u8]) -> PlatformResult<Map<String, Value>> {
    match serde_json::from_slice::<Value>(bytes)? {
        Value::Object(map) => Ok(map),
        _ => Ok(Map::new()),
    }
}

/// Keys added, removed or modified between two versions of the store.
fn changed_keys(old: &Map<String, Value>, new: &Map<String, Value>) -> Vec<String> {
    let mut keys: Vec<String> = new
        .iter()
        .filter(|(k, v)| old.get(k.as_str()) != Some(*v))
        .map(|(k, _)| k.clone())
        .collect();
    keys.extend(old.keys().filter(|k| !new.contains_key(k.as_str())).cloned());
    keys
}
