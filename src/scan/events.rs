use serde::Serialize;
use tokio::sync::mpsc;

use crate::models::Message;

use super::state::ScanSnapshot;

/// Notifications from the scan core to whatever renders it.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ScanEvent {
    StateChanged(ScanSnapshot),
    Status(Message),
    Error(Message),
    /// Open the detail view of this student. Routing belongs to the host.
    Navigate { code: String },
    /// A collaborator rejected the credentials; the host must log in again.
    SessionExpired,
}

impl ScanEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ScanEvent::StateChanged(_) => "scan-state-changed",
            ScanEvent::Status(_) => "scan-status",
            ScanEvent::Error(_) => "scan-error",
            ScanEvent::Navigate { .. } => "scan-navigate",
            ScanEvent::SessionExpired => "session-expired",
        }
    }
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: ScanEvent);
}

/// Forwards events over an unbounded channel to the host's event loop.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ScanEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ScanEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: ScanEvent) {
        let name = event.name();
        if self.tx.send(event).is_err() {
            log::debug!("dropping {name} event; no listener");
        }
    }
}
