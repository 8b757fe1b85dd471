use std::sync::Arc;
use std::time::Duration;

use dock_proto::protocol::{Intent, PageMessage};
use dock_proto::settings::DockSettings;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::client::DockClient;
use crate::controller::{DockController, Effect, PageEvent, PromptPurpose};
use crate::geometry::Viewport;
use crate::view::DockView;

const EVENT_QUEUE: usize = 256;

/// What the embedding page has to act on after an event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "output", rename_all = "snake_case")]
pub enum HostOutput {
    /// The frame changed; redraw.
    View(DockView),
    OpenLink {
        url: String,
    },
    /// Ask the user for text; answer with `PageEvent::PromptResolved`.
    Prompt {
        message: String,
        default: String,
        purpose: PromptPurpose,
    },
    /// Ask for a yes/no; answer with `PageEvent::ConfirmResolved`.
    Confirm {
        message: String,
        intent: Intent,
    },
}

/// Runs a `DockController` against a live daemon connection: carries out its
/// effects, owns the hide and re-clamp timers, and feeds pushes, timer
/// firings and snapshot answers back in as events.
pub struct PageHost {
    controller: DockController,
    client: Arc<DockClient>,
    events_tx: mpsc::Sender<PageEvent>,
    events_rx: mpsc::Receiver<PageEvent>,
    hide_timer: Option<JoinHandle<()>>,
    reclamp_timer: Option<JoinHandle<()>>,
    last_view: Option<DockView>,
}

impl PageHost {
    pub fn new(client: DockClient, mut pushes: mpsc::Receiver<PageMessage>, viewport: Viewport) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE);
        let push_tx = events_tx.clone();
        tokio::spawn(async move {
            while let Some(msg) = pushes.recv().await {
                if push_tx.send(PageEvent::Push(msg)).await.is_err() {
                    break;
                }
            }
        });

        Self {
            controller: DockController::new(DockSettings::default(), viewport),
            client: Arc::new(client),
            events_tx,
            events_rx,
            hide_timer: None,
            reclamp_timer: None,
            last_view: None,
        }
    }

    /// Sender for page input (pointer, keyboard, prompt answers).
    pub fn events(&self) -> mpsc::Sender<PageEvent> {
        self.events_tx.clone()
    }

    pub fn controller(&self) -> &DockController {
        &self.controller
    }

    pub fn client(&self) -> &DockClient {
        &self.client
    }

    /// Feed one event through the controller and carry out its effects.
    pub async fn dispatch(&mut self, event: PageEvent) -> Vec<HostOutput> {
        let effects = self.controller.handle(event);
        let mut outputs = Vec::new();
        for effect in effects {
            self.apply(effect, &mut outputs).await;
        }

        let view = self.controller.view();
        if self.last_view.as_ref() != Some(&view) {
            self.last_view = Some(view.clone());
            outputs.push(HostOutput::View(view));
        }
        outputs
    }

    /// Wait for the next queued event and dispatch it.
    pub async fn next(&mut self) -> Option<Vec<HostOutput>> {
        let event = self.events_rx.recv().await?;
        Some(self.dispatch(event).await)
    }

    pub async fn run<F: FnMut(HostOutput)>(mut self, mut emit: F) {
        while let Some(outputs) = self.next().await {
            for output in outputs {
                emit(output);
            }
        }
    }

    async fn apply(&mut self, effect: Effect, outputs: &mut Vec<HostOutput>) {
        match effect {
            Effect::Send(intent) => {
                if !self.client.send(intent).await {
                    warn!("Background unreachable, intent dropped");
                }
            }
            Effect::RequestSnapshot => {
                let client = self.client.clone();
                let tx = self.events_tx.clone();
                tokio::spawn(async move {
                    let data = client.request_snapshot().await;
                    let _ = tx.send(PageEvent::SnapshotArrived { data }).await;
                });
            }
            Effect::ScheduleHide {
                generation,
                delay_ms,
            } => {
                abort(&mut self.hide_timer);
                self.hide_timer = Some(self.timer(delay_ms, PageEvent::HideTimerFired { generation }));
            }
            Effect::CancelHide => abort(&mut self.hide_timer),
            Effect::ScheduleReclamp { delay_ms } => {
                abort(&mut self.reclamp_timer);
                self.reclamp_timer = Some(self.timer(delay_ms, PageEvent::ReclampTimerFired));
            }
            Effect::OpenLink { url } => outputs.push(HostOutput::OpenLink { url }),
            Effect::Prompt {
                message,
                default,
                purpose,
            } => outputs.push(HostOutput::Prompt {
                message,
                default,
                purpose,
            }),
            Effect::Confirm { message, intent } => outputs.push(HostOutput::Confirm { message, intent }),
        }
    }

    fn timer(&self, delay_ms: u64, event: PageEvent) -> JoinHandle<()> {
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            if tx.send(event).await.is_err() {
                debug!("Page host gone before timer fired");
            }
        })
    }
}

fn abort(timer: &mut Option<JoinHandle<()>>) {
    if let Some(handle) = timer.take() {
        handle.abort();
    }
}

impl Drop for PageHost {
    fn drop(&mut self) {
        abort(&mut self.hide_timer);
        abort(&mut self.reclamp_timer);
    }
}
