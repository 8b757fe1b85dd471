//! JSON-file backed implementations of the bookmark and key-value ports.
//!
//! Both stores keep their data in memory behind a lock and write the whole
//! file after every mutation.  Edits made by other programs are picked up by
//! polling the file's modification time.

mod bookmarks;
mod kv;

pub use bookmarks::JsonBookmarkStore;
pub use kv::JsonSettingsStore;

use std::path::Path;
use std::time::SystemTime;

use serde::Serialize;

use crate::error::PlatformResult;

/// Write `value` as pretty JSON through a temp file and rename, returning the
/// new modification time.
async fn write_json<T: Serialize>(path: &Path, value: &T) -> PlatformResult<Option<SystemTime>> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(modified(path).await)
}

async fn modified(path: &Path) -> Option<SystemTime> {
    tokio::fs::metadata(path).await.ok()?.modified().ok()
}
