use crate::pipeline::types::ProgressEvent;
use futures::Stream;
use std::pin::Pin;
use std::sync::Mutex;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// Producer side of a request's progress channel.
///
/// The channel closes right after the first terminal event; anything emitted later is dropped,
/// so subscribers see exactly one terminal event and then end-of-stream.
pub struct ProgressSender {
    request_id: Uuid,
    tx: Mutex<Option<mpsc::UnboundedSender<ProgressEvent>>>,
}

impl ProgressSender {
    /// A connected sender/stream pair.
    pub fn channel(request_id: Uuid) -> (Self, ProgressStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                request_id,
                tx: Mutex::new(Some(tx)),
            },
            ProgressStream { rx },
        )
    }

    /// A sender with no subscriber; events are only logged.
    pub fn detached(request_id: Uuid) -> Self {
        Self {
            request_id,
            tx: Mutex::new(None),
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn emit(&self, event: ProgressEvent) {
        debug!(request_id = %self.request_id, event = %event, "progress");
        let mut guard = match self.tx.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let terminal = event.is_terminal();
        if let Some(tx) = guard.as_ref() {
            // a dropped subscriber is not an error for the pipeline
            let _ = tx.send(event);
        }
        if terminal {
            guard.take();
        }
    }

    pub fn is_closed(&self) -> bool {
        match self.tx.lock() {
            Ok(g) => g.is_none(),
            Err(poisoned) => poisoned.into_inner().is_none(),
        }
    }
}

/// Consumer side: a single-subscriber stream that ends after the terminal event.
pub struct ProgressStream {
    rx: mpsc::UnboundedReceiver<ProgressEvent>,
}

impl Stream for ProgressStream {
    type Item = ProgressEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
