use serde::Serialize;

use crate::models::{DetectionSource, Message, ScanMode};

/// Mutable state of one scan page visit.
///
/// Channels never own this; they mutate it through [`super::ScanContext`].
#[derive(Debug, Clone)]
pub struct ScanState {
    pub mode: ScanMode,
    pub barcode_active: bool,
    pub face_active: bool,
    pub last_recognized_identity: Option<String>,
    pub status: Option<Message>,
    pub error: Option<Message>,
    /// False once the page is unmounted; late results must not navigate.
    pub mounted: bool,
    resolving: bool,
    recognitions_in_flight: u32,
    barcode_epoch: u64,
    face_epoch: u64,
}

impl Default for ScanState {
    fn default() -> Self {
        Self {
            mode: ScanMode::Lookup,
            barcode_active: false,
            face_active: false,
            last_recognized_identity: None,
            status: None,
            error: None,
            mounted: true,
            resolving: false,
            recognitions_in_flight: 0,
            barcode_epoch: 0,
            face_epoch: 0,
        }
    }
}

/// Serializable view handed to the front end.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScanSnapshot {
    pub mode: ScanMode,
    pub active_channels: Vec<DetectionSource>,
    pub last_recognized_identity: Option<String>,
    pub status: Option<Message>,
    pub error: Option<Message>,
    pub busy: bool,
}

impl ScanState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn busy(&self) -> bool {
        self.resolving || self.recognitions_in_flight > 0
    }

    pub fn snapshot(&self) -> ScanSnapshot {
        let mut active_channels = Vec::with_capacity(2);
        if self.barcode_active {
            active_channels.push(DetectionSource::Barcode);
        }
        if self.face_active {
            active_channels.push(DetectionSource::Face);
        }

        ScanSnapshot {
            mode: self.mode,
            active_channels,
            last_recognized_identity: self.last_recognized_identity.clone(),
            status: self.status.clone(),
            error: self.error.clone(),
            busy: self.busy(),
        }
    }

    pub fn is_active(&self, source: DetectionSource) -> bool {
        match source {
            DetectionSource::Barcode => self.barcode_active,
            DetectionSource::Face => self.face_active,
        }
    }

    /// Marks a channel active and returns the epoch identifying this activation.
    pub fn begin_channel(&mut self, source: DetectionSource) -> u64 {
        match source {
            DetectionSource::Barcode => {
                self.barcode_epoch += 1;
                self.barcode_active = true;
                self.barcode_epoch
            }
            DetectionSource::Face => {
                self.face_epoch += 1;
                self.face_active = true;
                self.face_epoch
            }
        }
    }

    /// True while `epoch` is the live activation of `source`.
    pub fn is_current(&self, source: DetectionSource, epoch: u64) -> bool {
        match source {
            DetectionSource::Barcode => self.barcode_active && self.barcode_epoch == epoch,
            DetectionSource::Face => self.face_active && self.face_epoch == epoch,
        }
    }

    /// Deactivates `source` if `epoch` is still its live activation.
    pub fn end_channel(&mut self, source: DetectionSource, epoch: u64) -> bool {
        if !self.is_current(source, epoch) {
            return false;
        }
        match source {
            DetectionSource::Barcode => self.barcode_active = false,
            DetectionSource::Face => self.face_active = false,
        }
        true
    }

    /// Dedup gate for face matches: false when `label` was the last identity seen.
    pub fn accept_identity(&mut self, label: &str) -> bool {
        if self.last_recognized_identity.as_deref() == Some(label) {
            return false;
        }
        self.last_recognized_identity = Some(label.to_string());
        true
    }

    pub fn reset_identity(&mut self) {
        self.last_recognized_identity = None;
    }

    /// Claims the single resolution slot. False if a resolution is already in flight.
    pub fn try_begin_resolution(&mut self) -> bool {
        if self.resolving {
            return false;
        }
        self.resolving = true;
        true
    }

    pub fn end_resolution(&mut self) {
        self.resolving = false;
    }

    pub fn recognition_started(&mut self) {
        self.recognitions_in_flight = self.recognitions_in_flight.saturating_add(1);
    }

    pub fn recognition_finished(&mut self) {
        self.recognitions_in_flight = self.recognitions_in_flight.saturating_sub(1);
    }

    pub fn set_status(&mut self, text: impl Into<String>) -> Message {
        let message = Message::new(text);
        self.status = Some(message.clone());
        message
    }

    pub fn set_error(&mut self, text: impl Into<String>) -> Message {
        let message = Message::new(text);
        self.error = Some(message.clone());
        message
    }

    pub fn clear_messages(&mut self) {
        self.status = None;
        self.error = None;
    }

    /// Fresh page state; activation epochs keep counting so stale work stays stale.
    pub fn remount(&mut self) {
        *self = Self {
            barcode_epoch: self.barcode_epoch,
            face_epoch: self.face_epoch,
            ..Self::default()
        };
    }

    pub fn unmount(&mut self) {
        self.mounted = false;
        self.barcode_active = false;
        self.face_active = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_identity_is_deduplicated() {
        let mut state = ScanState::new();
        assert!(state.accept_identity("STU2026001"));
        assert!(!state.accept_identity("STU2026001"));
        assert!(state.accept_identity("STU2026002"));

        state.reset_identity();
        assert!(state.accept_identity("STU2026002"));
    }

    #[test]
    fn stale_epoch_cannot_end_new_activation() {
        let mut state = ScanState::new();
        let first = state.begin_channel(DetectionSource::Face);
        assert!(state.end_channel(DetectionSource::Face, first));

        let second = state.begin_channel(DetectionSource::Face);
        assert!(!state.end_channel(DetectionSource::Face, first));
        assert!(state.is_current(DetectionSource::Face, second));
    }

    #[test]
    fn resolution_slot_is_exclusive() {
        let mut state = ScanState::new();
        assert!(state.try_begin_resolution());
        assert!(!state.try_begin_resolution());
        assert!(state.busy());
        state.end_resolution();
        assert!(!state.busy());
    }

    #[test]
    fn remount_keeps_epochs_monotonic() {
        let mut state = ScanState::new();
        let old = state.begin_channel(DetectionSource::Barcode);
        state.mode = ScanMode::Attendance;
        state.unmount();
        state.remount();

        assert!(state.mounted);
        assert_eq!(state.mode, ScanMode::Lookup);
        let fresh = state.begin_channel(DetectionSource::Barcode);
        assert!(fresh > old);
    }

    #[test]
    fn snapshot_lists_both_channels_when_both_run() {
        let mut state = ScanState::new();
        state.begin_channel(DetectionSource::Barcode);
        state.begin_channel(DetectionSource::Face);
        assert_eq!(
            state.snapshot().active_channels,
            vec![DetectionSource::Barcode, DetectionSource::Face]
        );
    }
}
