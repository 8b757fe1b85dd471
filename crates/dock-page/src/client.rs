use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use dock_proto::protocol::{
    next_frame, FrameResult, Intent, Message, PageMessage, Snapshot, PROTOCOL_VERSION,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const PUSH_QUEUE: usize = 32;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Snapshot>>>>;

/// A page's connection to the background daemon.
///
/// Requests that expect an answer are matched to responses by id; pushes are
/// forwarded to the receiver returned from [`DockClient::connect`].  When the
/// daemon goes away every call degrades to `None`/`false` instead of failing.
pub struct DockClient {
    tab_id: u64,
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    pending: Pending,
    next_id: AtomicU64,
    snapshot_requests: AtomicU64,
    timeout: Duration,
    reader: JoinHandle<()>,
}

impl DockClient {
    pub async fn connect(
        addr: impl ToSocketAddrs,
        url: &str,
        title: &str,
        timeout: Duration,
    ) -> anyhow::Result<(Self, mpsc::Receiver<PageMessage>)> {
        let stream = TcpStream::connect(addr)
            .await
            .context("Failed to reach the dock daemon")?;
        let (mut read_half, mut write_half) = stream.into_split();

        let hello = Message::Hello {
            protocol_version: PROTOCOL_VERSION,
            url: url.to_string(),
            title: title.to_string(),
        };
        write_half.write_all(&hello.encode()?).await?;

        let mut read_buf = Vec::new();
        let tab_id = tokio::time::timeout(timeout, read_welcome(&mut read_half, &mut read_buf))
            .await
            .context("Daemon did not answer hello")??;
        info!("Connected to daemon as page {}", tab_id);

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let (push_tx, push_rx) = mpsc::channel(PUSH_QUEUE);
        let reader = tokio::spawn(read_loop(read_half, read_buf, pending.clone(), push_tx));

        Ok((
            Self {
                tab_id,
                writer: tokio::sync::Mutex::new(write_half),
                pending,
                next_id: AtomicU64::new(1),
                snapshot_requests: AtomicU64::new(0),
                timeout,
                reader,
            },
            push_rx,
        ))
    }

    pub fn tab_id(&self) -> u64 {
        self.tab_id
    }

    /// Snapshot requests issued so far.
    pub fn snapshot_requests(&self) -> u64 {
        self.snapshot_requests.load(Ordering::Relaxed)
    }

    /// Ask for the current snapshot.  `None` when the daemon is unreachable
    /// or does not answer in time.
    pub async fn request_snapshot(&self) -> Option<Snapshot> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.lock_pending().insert(id, tx);
        self.snapshot_requests.fetch_add(1, Ordering::Relaxed);

        let request = Message::Request {
            id: Some(id),
            intent: Intent::GetBookmarksForMouse,
        };
        if !self.write(&request).await {
            self.lock_pending().remove(&id);
            return None;
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(data)) => Some(data),
            Ok(Err(_)) => {
                debug!("Connection closed before snapshot {} arrived", id);
                None
            }
            Err(_) => {
                warn!("Snapshot request {} timed out", id);
                self.lock_pending().remove(&id);
                None
            }
        }
    }

    /// Fire-and-forget intent.  Returns false if it could not be written.
    pub async fn send(&self, intent: Intent) -> bool {
        self.write(&Message::Request { id: None, intent }).await
    }

    pub async fn page_info(&self, url: &str, title: &str, active: bool) -> bool {
        self.write(&Message::PageInfo {
            url: url.to_string(),
            title: title.to_string(),
            active,
        })
        .await
    }

    async fn write(&self, msg: &Message) -> bool {
        let bytes = match msg.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to encode {:?}: {}", msg, e);
                return false;
            }
        };
        let mut writer = self.writer.lock().await;
        match writer.write_all(&bytes).await {
            Ok(()) => true,
            Err(e) => {
                debug!("Daemon unreachable: {}", e);
                false
            }
        }
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, HashMap<u64, oneshot::Sender<Snapshot>>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for DockClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_welcome(read_half: &mut OwnedReadHalf, read_buf: &mut Vec<u8>) -> anyhow::Result<u64> {
    let mut tmp = [0u8; 4096];
    loop {
        match next_frame(read_buf) {
            FrameResult::Message(Message::Welcome {
                protocol_version,
                tab_id,
            }) => {
                if protocol_version != PROTOCOL_VERSION {
                    warn!(
                        "Daemon speaks protocol {}, page speaks {}",
                        protocol_version, PROTOCOL_VERSION
                    );
                }
                return Ok(tab_id);
            }
            FrameResult::Message(other) => anyhow::bail!("Expected welcome, got {:?}", other),
            FrameResult::Malformed(e) => anyhow::bail!("Malformed welcome: {}", e),
            FrameResult::Oversized(len) => anyhow::bail!("Welcome frame of {} bytes", len),
            FrameResult::Incomplete => {
                let n = read_half.read(&mut tmp).await?;
                if n == 0 {
                    anyhow::bail!("Daemon closed the connection during handshake");
                }
                read_buf.extend_from_slice(&tmp[..n]);
            }
        }
    }
}

async fn read_loop(
    mut read_half: OwnedReadHalf,
    mut read_buf: Vec<u8>,
    pending: Pending,
    push_tx: mpsc::Sender<PageMessage>,
) {
    let mut tmp = [0u8; 4096];
    loop {
        loop {
            match next_frame(&mut read_buf) {
                FrameResult::Message(Message::Response { id, data }) => {
                    let waiter = pending
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .remove(&id);
                    match waiter {
                        Some(tx) => {
                            let _ = tx.send(data);
                        }
                        None => debug!("Late response {} dropped", id),
                    }
                }
                FrameResult::Message(Message::Push(msg)) => {
                    if push_tx.send(msg).await.is_err() {
                        debug!("Nobody listens for pushes any more");
                    }
                }
                FrameResult::Message(other) => debug!("Unexpected {:?} from daemon", other),
                FrameResult::Malformed(e) => warn!("Malformed frame from daemon: {}", e),
                FrameResult::Oversized(len) => {
                    warn!("Daemon sent a frame of {} bytes, disconnecting", len);
                    return;
                }
                FrameResult::Incomplete => break,
            }
        }

        match read_half.read(&mut tmp).await {
            Ok(0) => {
                info!("Daemon closed the connection");
                break;
            }
            Ok(n) => read_buf.extend_from_slice(&tmp[..n]),
            Err(e) => {
                warn!("Read from daemon failed: {}", e);
                break;
            }
        }
    }
    // Dropping the waiters resolves their requests to `None`.
    pending
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clear();
}
