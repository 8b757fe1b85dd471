use serde::{Deserialize, Serialize};

use crate::settings::DockSettings;

/// Current protocol version.  Bump this when the wire format changes in a
/// breaking way.  Pages send it in `Hello`; the daemon answers with its own in
/// `Welcome`.
pub const PROTOCOL_VERSION: u32 = 1;

/// Largest frame either side will accept.  Snapshots carry inline favicon
/// payloads, so this is generous.
pub const MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;

/// Fixed id of the synthetic settings-gear entry.
pub const SETTINGS_ITEM_ID: &str = "dock_settings_item";
/// Fixed id of the synthetic spacer placed before the settings entry.
pub const SETTINGS_SPACER_ID: &str = "dock_settings_spacer";
pub const SETTINGS_ITEM_TITLE: &str = "Dock Settings";
pub const SPACER_TITLE: &str = "-";

/// One node of the designated folder, enriched with its display icon.
///
/// A node with `url == None` is a folder and carries `children == Some(..)`;
/// a link carries a url and no children.  Use [`BookmarkEntry::link`] and
/// [`BookmarkEntry::folder`] to keep that invariant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkEntry {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    #[serde(default)]
    pub icon_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<BookmarkEntry>>,
}

impl BookmarkEntry {
    pub fn link(id: impl Into<String>, title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            url: Some(url.into()),
            parent_id: None,
            index: None,
            icon_url: String::new(),
            children: None,
        }
    }

    /// A folder whose children have not (yet) been resolved.
    pub fn folder(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            url: None,
            parent_id: None,
            index: None,
            icon_url: String::new(),
            children: Some(Vec::new()),
        }
    }

    pub fn settings_item(icon_url: impl Into<String>) -> Self {
        Self {
            icon_url: icon_url.into(),
            ..Self::link(SETTINGS_ITEM_ID, SETTINGS_ITEM_TITLE, "")
        }
    }

    pub fn spacer() -> Self {
        Self::link(SETTINGS_SPACER_ID, SPACER_TITLE, "")
    }

    pub fn is_folder(&self) -> bool {
        self.url.is_none()
    }

    pub fn is_settings_item(&self) -> bool {
        self.id == SETTINGS_ITEM_ID
    }

    /// True for the render-only entries appended by the snapshot builder.
    pub fn is_synthetic(&self) -> bool {
        self.id == SETTINGS_ITEM_ID || self.id == SETTINGS_SPACER_ID
    }

    /// Look up an entry by id in this node and its (one level of) children.
    pub fn find(&self, id: &str) -> Option<&BookmarkEntry> {
        if self.id == id {
            return Some(self);
        }
        self.children
            .as_deref()
            .and_then(|children| children.iter().find(|c| c.id == id))
    }
}

/// The enriched, ordered list handed from the background to every page.
pub type Snapshot = Vec<BookmarkEntry>;

/// Find an entry anywhere in a snapshot (top level or one level down).
pub fn find_entry<'a>(snapshot: &'a [BookmarkEntry], id: &str) -> Option<&'a BookmarkEntry> {
    snapshot.iter().find_map(|e| e.find(id))
}

/// Intents a page sends to the background request handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Intent {
    /// Answered with the current snapshot.
    GetBookmarksForMouse,
    AddCurrentTab,
    OpenSettings,
    OpenNewWindow {
        url: String,
    },
    OpenIncognito {
        url: String,
    },
    RenameBookmark {
        id: String,
        title: String,
    },
    DeleteBookmark {
        id: String,
    },
    /// `url == None` (or empty) clears the override.
    UpdateIcon {
        id: String,
        #[serde(default)]
        url: Option<String>,
    },
    /// Drag-reorder inside (or out of) the designated folder.
    MoveBookmark {
        id: String,
        #[serde(default, rename = "parentId")]
        parent_id: Option<String>,
        index: u32,
    },
    /// Quick toggle from the context menu; only known settings keys are written.
    SetSetting {
        key: String,
        value: serde_json::Value,
    },
    RequestRefresh,
}

impl Intent {
    pub fn expects_response(&self) -> bool {
        matches!(self, Intent::GetBookmarksForMouse)
    }
}

/// One-way pushes from the background to a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PageMessage {
    RefreshDock { data: Snapshot },
    /// Also flips the page's visibility.
    ToggleDock { data: Snapshot },
    ApplySettings { settings: DockSettings },
}

/// Envelope for socket communication between a page and the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Message {
    /// Page → daemon, first frame on connect.
    Hello {
        protocol_version: u32,
        #[serde(default)]
        url: String,
        #[serde(default)]
        title: String,
    },
    /// Daemon → page, answer to `Hello`.
    Welcome { protocol_version: u32, tab_id: u64 },
    /// Page → daemon, the page navigated or gained focus.
    PageInfo {
        url: String,
        title: String,
        #[serde(default)]
        active: bool,
    },
    /// Page → daemon.  `id` is set only for intents that expect a response.
    Request {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
        intent: Intent,
    },
    /// Daemon → page, answer to a `Request` carrying `id`.
    Response { id: u64, data: Snapshot },
    /// Daemon → page.
    Push(PageMessage),
}

impl Message {
    pub fn encode(&self) -> anyhow::Result<Vec<u8>> {
        let json = serde_json::to_vec(self)?;
        if json.len() > MAX_FRAME_BYTES {
            anyhow::bail!("Frame of {} bytes exceeds limit", json.len());
        }
        let len = json.len() as u32;
        let mut result = Vec::with_capacity(4 + json.len());
        result.extend_from_slice(&len.to_be_bytes());
        result.extend_from_slice(&json);
        Ok(result)
    }

    /// Decode one frame from the front of `data`.  Returns the message and
    /// the number of bytes consumed.
    pub fn decode(data: &[u8]) -> anyhow::Result<(Self, usize)> {
        if data.len() < 4 {
            anyhow::bail!("Insufficient data for length header");
        }
        let len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if len > MAX_FRAME_BYTES {
            anyhow::bail!("Frame of {} bytes exceeds limit", len);
        }
        if data.len() < 4 + len {
            anyhow::bail!("Insufficient data for message");
        }
        let msg: Self = serde_json::from_slice(&data[4..4 + len])?;
        Ok((msg, 4 + len))
    }
}

/// Outcome of trying to pull frames out of a read buffer.
#[derive(Debug)]
pub enum FrameResult {
    Message(Message),
    /// Not enough bytes buffered yet.
    Incomplete,
    /// The frame was complete but did not parse; it has been dropped.
    Malformed(String),
    /// The length header is beyond the limit; the stream cannot be resynced.
    Oversized(usize),
}

/// Pop the next frame off `buf`, draining what was consumed.
pub fn next_frame(buf: &mut Vec<u8>) -> FrameResult {
    if buf.len() < 4 {
        return FrameResult::Incomplete;
    }
    let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if len > MAX_FRAME_BYTES {
        return FrameResult::Oversized(len);
    }
    if buf.len() < 4 + len {
        return FrameResult::Incomplete;
    }
    let parsed = serde_json::from_slice::<Message>(&buf[4..4 + len]);
    buf.drain(..4 + len);
    match parsed {
        Ok(msg) => FrameResult::Message(msg),
        Err(e) => FrameResult::Malformed(e.to_string()),
    }
}
