use std::sync::Arc;

use anyhow::Context;
use dock_proto::protocol::{next_frame, FrameResult, Message, PROTOCOL_VERSION};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::api::TabId;
use crate::core::BackgroundEvent;
use crate::registry::PageRegistry;

pub async fn bind(addr: &str) -> anyhow::Result<TcpListener> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind TCP socket {}", addr))?;
    info!("TCP server listening at {}", listener.local_addr()?);
    Ok(listener)
}

pub fn start_server(
    listener: TcpListener,
    registry: Arc<PageRegistry>,
    event_tx: mpsc::Sender<BackgroundEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    debug!("Connection from {}", peer);
                    let registry = registry.clone();
                    let event_tx = event_tx.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_client(stream, registry, event_tx).await {
                            warn!("Page connection from {} ended: {:#}", peer, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    })
}

async fn handle_client(
    stream: TcpStream,
    registry: Arc<PageRegistry>,
    event_tx: mpsc::Sender<BackgroundEvent>,
) -> anyhow::Result<()> {
    let (mut read_half, write_half) = stream.into_split();
    let mut tmp = [0u8; 4096];
    let mut read_buf: Vec<u8> = Vec::new();

    // The first frame must introduce the page.
    let (url, title) = loop {
        match next_frame(&mut read_buf) {
            FrameResult::Message(Message::Hello {
                protocol_version,
                url,
                title,
            }) => {
                if protocol_version != PROTOCOL_VERSION {
                    warn!(
                        "Page speaks protocol {}, daemon speaks {}",
                        protocol_version, PROTOCOL_VERSION
                    );
                }
                break (url, title);
            }
            FrameResult::Message(_) => anyhow::bail!("Page did not start with hello"),
            FrameResult::Malformed(e) => anyhow::bail!("Malformed hello: {}", e),
            FrameResult::Oversized(len) => anyhow::bail!("Hello frame of {} bytes", len),
            FrameResult::Incomplete => {
                let n = read_half.read(&mut tmp).await?;
                if n == 0 {
                    return Ok(());
                }
                read_buf.extend_from_slice(&tmp[..n]);
            }
        }
    };

    let (tab_id, push_rx) = registry.register(url, title).await;
    info!("Page {} connected", tab_id);
    let conn = PageConnection {
        tab_id,
        registry: registry.clone(),
        event_tx,
    };
    let result = conn.serve(read_half, write_half, read_buf, push_rx).await;
    registry.unregister(tab_id).await;
    info!("Page {} disconnected", tab_id);
    result
}

struct PageConnection {
    tab_id: TabId,
    registry: Arc<PageRegistry>,
    event_tx: mpsc::Sender<BackgroundEvent>,
}

impl PageConnection {
    async fn serve(
        &self,
        mut read_half: OwnedReadHalf,
        mut write_half: OwnedWriteHalf,
        mut read_buf: Vec<u8>,
        mut push_rx: mpsc::Receiver<dock_proto::protocol::PageMessage>,
    ) -> anyhow::Result<()> {
        let welcome = Message::Welcome {
            protocol_version: PROTOCOL_VERSION,
            tab_id: self.tab_id,
        };
        write_half.write_all(&welcome.encode()?).await?;
        let _ = self
            .event_tx
            .send(BackgroundEvent::PageConnected(self.tab_id))
            .await;

        let (reply_tx, mut reply_rx) = mpsc::channel::<Message>(16);
        let mut tmp = [0u8; 4096];

        loop {
            loop {
                match next_frame(&mut read_buf) {
                    FrameResult::Message(msg) => self.on_message(msg, &reply_tx).await?,
                    FrameResult::Malformed(e) => {
                        warn!("Page {} sent a malformed frame: {}", self.tab_id, e)
                    }
                    FrameResult::Oversized(len) => {
                        anyhow::bail!("Page {} sent a frame of {} bytes", self.tab_id, len)
                    }
                    FrameResult::Incomplete => break,
                }
            }

            tokio::select! {
                result = read_half.read(&mut tmp) => {
                    let n = result?;
                    if n == 0 {
                        return Ok(());
                    }
                    read_buf.extend_from_slice(&tmp[..n]);
                }

                push = push_rx.recv() => {
                    let Some(push) = push else {
                        return Ok(());
                    };
                    write_half.write_all(&Message::Push(push).encode()?).await?;
                }

                Some(reply) = reply_rx.recv() => {
                    write_half.write_all(&reply.encode()?).await?;
                }
            }
        }
    }

    async fn on_message(&self, msg: Message, reply_tx: &mpsc::Sender<Message>) -> anyhow::Result<()> {
        match msg {
            Message::Request { id, intent } => {
                self.registry.mark_active(self.tab_id).await;
                let reply = match id.filter(|_| intent.expects_response()) {
                    Some(id) => {
                        let (tx, rx) = oneshot::channel();
                        let reply_tx = reply_tx.clone();
                        tokio::spawn(async move {
                            // No answer means the core is gone; the page gives up on its own.
                            if let Ok(data) = rx.await {
                                let _ = reply_tx.send(Message::Response { id, data }).await;
                            }
                        });
                        Some(tx)
                    }
                    None => None,
                };
                self.event_tx
                    .send(BackgroundEvent::Intent {
                        intent,
                        sender: Some(self.tab_id),
                        reply,
                    })
                    .await
                    .map_err(|_| anyhow::anyhow!("Background core is gone"))?;
            }
            Message::PageInfo { url, title, active } => {
                self.registry
                    .update_info(self.tab_id, url, title, active)
                    .await;
            }
            other => debug!("Page {} sent unexpected {:?}", self.tab_id, other),
        }
        Ok(())
    }
}
