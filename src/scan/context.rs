use std::sync::Arc;

use log::{debug, info};
use tokio::sync::Mutex;

use crate::models::{Detection, DetectionSource};

use super::{
    events::{EventSink, ScanEvent},
    pipeline::{Outcome, ResolutionPipeline},
    state::{ScanSnapshot, ScanState},
};

/// State and collaborators shared by both channels and the manual search path.
pub struct ScanContext {
    state: Mutex<ScanState>,
    events: Arc<dyn EventSink>,
    pipeline: ResolutionPipeline,
}

impl ScanContext {
    pub fn new(pipeline: ResolutionPipeline, events: Arc<dyn EventSink>) -> Self {
        Self {
            state: Mutex::new(ScanState::new()),
            events,
            pipeline,
        }
    }

    pub async fn snapshot(&self) -> ScanSnapshot {
        self.state.lock().await.snapshot()
    }

    /// Runs `f` against the state and broadcasts the resulting snapshot.
    pub async fn update<R>(&self, f: impl FnOnce(&mut ScanState) -> R) -> R {
        let (result, snapshot) = {
            let mut state = self.state.lock().await;
            let result = f(&mut state);
            (result, state.snapshot())
        };
        self.events.emit(ScanEvent::StateChanged(snapshot));
        result
    }

    pub async fn read<R>(&self, f: impl FnOnce(&ScanState) -> R) -> R {
        let state = self.state.lock().await;
        f(&state)
    }

    pub async fn report_status(&self, text: impl Into<String>) {
        let message = self.update(|state| state.set_status(text)).await;
        self.events.emit(ScanEvent::Status(message));
    }

    pub async fn report_error(&self, text: impl Into<String>) {
        let message = self.update(|state| state.set_error(text)).await;
        self.events.emit(ScanEvent::Error(message));
    }

    pub async fn begin_channel(&self, source: DetectionSource) -> u64 {
        let epoch = self.update(|state| state.begin_channel(source)).await;
        info!("{source:?} channel activated (epoch {epoch})");
        epoch
    }

    pub async fn end_channel(&self, source: DetectionSource, epoch: u64) {
        let ended = self.update(|state| state.end_channel(source, epoch)).await;
        if ended {
            info!("{source:?} channel deactivated (epoch {epoch})");
        }
    }

    pub async fn is_current(&self, source: DetectionSource, epoch: u64) -> bool {
        self.read(|state| state.is_current(source, epoch)).await
    }

    /// Resolves a channel detection under the mode in force right now.
    pub async fn dispatch(&self, detection: Detection) -> Outcome {
        let claimed = self
            .update(|state| state.try_begin_resolution().then_some(state.mode))
            .await;
        let Some(mode) = claimed else {
            debug!("Dropping {:?} detection; resolution in flight", detection.source);
            return Outcome::Busy;
        };

        let outcome = self.pipeline.resolve(&detection, mode).await;
        self.update(|state| state.end_resolution()).await;
        self.apply(&outcome).await;
        outcome
    }

    /// Manual search, sharing the resolution slot with the channels.
    pub async fn search(&self, query: &str) -> Outcome {
        let claimed = self
            .update(|state| state.try_begin_resolution().then_some(state.mode))
            .await;
        let Some(mode) = claimed else {
            return Outcome::Busy;
        };

        self.update(|state| state.clear_messages()).await;
        let outcome = self.pipeline.search(query, mode).await;
        self.update(|state| state.end_resolution()).await;
        self.apply(&outcome).await;
        outcome
    }

    async fn apply(&self, outcome: &Outcome) {
        if let Some(text) = outcome.status_text() {
            self.report_status(text).await;
        }
        if let Some(text) = outcome.error_text() {
            self.report_error(text).await;
        }

        match outcome {
            Outcome::Navigate { student, delay, .. } => {
                if !delay.is_zero() {
                    tokio::time::sleep(*delay).await;
                }
                if self.read(|state| state.mounted).await {
                    self.events.emit(ScanEvent::Navigate {
                        code: student.code.clone(),
                    });
                } else {
                    debug!("Scan page unmounted; not navigating to {}", student.code);
                }
            }
            Outcome::SessionExpired => self.events.emit(ScanEvent::SessionExpired),
            _ => {}
        }
    }
}
