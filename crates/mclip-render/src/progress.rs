//! Progress sinks for render requests.
//!
//! The pipeline pushes [`ProgressEvent`]s to a [`ProgressBus`] without
//! knowing what transport sits behind it.

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use mclip_models::{ProgressEvent, RenderPhase};

/// Receives ordered progress events per request id.
pub trait ProgressBus: Send + Sync {
    /// Publish one event. Must not block the pipeline.
    fn publish(&self, request_id: &str, event: ProgressEvent);
}

/// Events as delivered by a [`ChannelProgressBus`].
pub type ProgressMessage = (String, ProgressEvent);

/// Bus backed by a bounded channel.
///
/// Intermediate events use `try_send` and are dropped, with a warning, when
/// the receiver lags behind. Terminal events are never dropped: if the
/// channel is full they are handed to a task that waits for capacity.
#[derive(Debug, Clone)]
pub struct ChannelProgressBus {
    tx: mpsc::Sender<ProgressMessage>,
}

impl ChannelProgressBus {
    pub fn new(tx: mpsc::Sender<ProgressMessage>) -> Self {
        Self { tx }
    }

    fn deliver_later(&self, message: ProgressMessage) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(request_id = %message.0, "No runtime to deliver terminal progress event");
            return;
        };
        let tx = self.tx.clone();
        runtime.spawn(async move {
            if tx.send(message).await.is_err() {
                debug!("Progress receiver closed before terminal event");
            }
        });
    }
}

impl ProgressBus for ChannelProgressBus {
    fn publish(&self, request_id: &str, event: ProgressEvent) {
        match self.tx.try_send((request_id.to_string(), event)) {
            Ok(()) => {}
            Err(TrySendError::Full(message)) if message.1.phase.is_terminal() => {
                self.deliver_later(message)
            }
            Err(TrySendError::Full((request_id, event))) => {
                warn!(
                    request_id = %request_id,
                    phase = %event.phase,
                    "Progress receiver is lagging, dropping event"
                );
            }
            Err(TrySendError::Closed((request_id, _))) => {
                debug!(request_id = %request_id, "Progress receiver closed");
            }
        }
    }
}

/// Create a channel-backed bus and its receiving end.
pub fn channel(capacity: usize) -> (ChannelProgressBus, mpsc::Receiver<ProgressMessage>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ChannelProgressBus::new(tx), rx)
}

/// Bus that writes every event to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgressBus;

impl ProgressBus for LogProgressBus {
    fn publish(&self, request_id: &str, event: ProgressEvent) {
        if event.phase == RenderPhase::Failed {
            warn!(
                request_id = %request_id,
                percent = event.percent,
                "{}", event.message
            );
        } else {
            info!(
                request_id = %request_id,
                phase = %event.phase,
                percent = %format!("{:.1}", event.percent),
                eta_secs = event.eta_secs,
                "{}", event.message
            );
        }
    }
}

/// Bus that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgressBus;

impl ProgressBus for NoopProgressBus {
    fn publish(&self, _request_id: &str, _event: ProgressEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_bus_delivers_in_order() {
        let (bus, mut rx) = channel(8);
        bus.publish("req-1", ProgressEvent::new(RenderPhase::Extracting, 10.0, "a"));
        bus.publish("req-1", ProgressEvent::new(RenderPhase::Audio, 80.0, "b"));

        let (id, first) = rx.recv().await.unwrap();
        assert_eq!(id, "req-1");
        assert_eq!(first.phase, RenderPhase::Extracting);
        let (_, second) = rx.recv().await.unwrap();
        assert_eq!(second.message, "b");
    }

    #[test]
    fn test_full_channel_drops_instead_of_blocking() {
        let (bus, mut rx) = channel(1);
        bus.publish("r", ProgressEvent::new(RenderPhase::Extracting, 1.0, "kept"));
        bus.publish("r", ProgressEvent::new(RenderPhase::Extracting, 2.0, "dropped"));

        assert_eq!(rx.try_recv().unwrap().1.message, "kept");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_terminal_event_survives_full_channel() {
        let (bus, mut rx) = channel(2);
        for percent in [10.0, 20.0, 30.0, 40.0] {
            bus.publish("r", ProgressEvent::new(RenderPhase::Extracting, percent, "x"));
        }
        bus.publish("r", ProgressEvent::complete("/out.mp4"));

        let mut phases = Vec::new();
        while let Some((_, event)) = rx.recv().await {
            let done = event.phase.is_terminal();
            phases.push(event.phase);
            if done {
                break;
            }
        }
        assert_eq!(
            phases,
            vec![RenderPhase::Extracting, RenderPhase::Extracting, RenderPhase::Complete]
        );
    }

    #[test]
    fn test_closed_channel_is_ignored() {
        let (bus, rx) = channel(1);
        drop(rx);
        bus.publish("r", ProgressEvent::complete("/out.mp4"));
    }

    #[test]
    fn test_log_and_noop_buses_accept_events() {
        LogProgressBus.publish("r", ProgressEvent::failed(40.0, "boom"));
        LogProgressBus.publish("r", ProgressEvent::new(RenderPhase::Audio, 50.0, "mixing"));
        NoopProgressBus.publish("r", ProgressEvent::complete("/out.mp4"));
    }
}
