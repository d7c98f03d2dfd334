use std::{sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{interval_at, Instant, Interval, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    api::{ApiError, RecognitionReply, RecognitionService},
    models::{Detection, DetectionSource},
};

use super::{
    camera::{encode_frame, CameraDevice, CameraFacing, CameraStream, VideoSurface},
    context::ScanContext,
    pipeline::Outcome,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

#[derive(Debug, Clone)]
pub struct FacePollConfig {
    /// Frame sampling period. Throttles load on the recognition server.
    pub interval: Duration,
    pub jpeg_quality: u8,
}

impl Default for FacePollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1800),
            jpeg_quality: 75,
        }
    }
}

/// Camera stream plus poll timer of one activation.
///
/// Dropping it clears the timer, stops every camera track and detaches the
/// stream, in that order, whichever way the activation ends.
pub struct CaptureScope {
    ticker: Option<Interval>,
    surface: VideoSurface,
}

impl CaptureScope {
    pub fn new(stream: Box<dyn CameraStream>, period: Duration) -> Self {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut surface = VideoSurface::default();
        surface.attach(stream);

        Self {
            ticker: Some(ticker),
            surface,
        }
    }

    async fn tick(&mut self) {
        match self.ticker.as_mut() {
            Some(ticker) => {
                ticker.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }

    fn stream(&self) -> Option<Arc<dyn CameraStream>> {
        self.surface.stream()
    }
}

/// Reads the latest frame and encodes it for the recognizer. Blocking.
fn capture_payload(stream: &dyn CameraStream, quality: u8) -> Result<Option<String>> {
    stream
        .current_frame()
        .map(|frame| encode_frame(&frame, quality))
        .transpose()
}

impl Drop for CaptureScope {
    fn drop(&mut self) {
        self.ticker = None;
        self.surface.release();
    }
}

/// Continuous face recognition channel.
pub struct FaceChannel {
    camera: Arc<dyn CameraDevice>,
    recognizer: Arc<dyn RecognitionService>,
    config: FacePollConfig,
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
    activation: Option<(Arc<ScanContext>, u64)>,
}

impl FaceChannel {
    pub fn new(
        camera: Arc<dyn CameraDevice>,
        recognizer: Arc<dyn RecognitionService>,
        config: FacePollConfig,
    ) -> Self {
        Self {
            camera,
            recognizer,
            config,
            handle: None,
            cancel_token: None,
            activation: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    pub async fn activate(&mut self, ctx: Arc<ScanContext>) -> Result<()> {
        if self.is_running() {
            bail!("face scanning already active");
        }
        self.deactivate().await?;

        let stream = self
            .camera
            .acquire(CameraFacing::Front)
            .await
            .context("camera unavailable")?;
        let scope = CaptureScope::new(stream, self.config.interval);

        let epoch = ctx.begin_channel(DetectionSource::Face).await;
        let cancel_token = CancellationToken::new();
        let poller = FacePoller {
            ctx: Arc::clone(&ctx),
            recognizer: Arc::clone(&self.recognizer),
            jpeg_quality: self.config.jpeg_quality,
            epoch,
            cancel_token: cancel_token.clone(),
        };
        let handle = tokio::spawn(poller.run(scope));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        self.activation = Some((ctx, epoch));
        Ok(())
    }

    pub async fn deactivate(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        let joined = match self.handle.take() {
            Some(handle) => handle
                .await
                .context("face recognition task failed to join"),
            None => Ok(()),
        };

        if let Some((ctx, epoch)) = self.activation.take() {
            ctx.end_channel(DetectionSource::Face, epoch).await;
        }
        joined
    }
}

impl Drop for FaceChannel {
    fn drop(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
        // Aborting drops the loop future and with it the capture scope.
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FaceStep {
    Continue,
    Stop,
}

struct InFlight {
    seq: u64,
    handle: JoinHandle<()>,
}

type Reply = (u64, Result<RecognitionReply, ApiError>);

struct FacePoller {
    ctx: Arc<ScanContext>,
    recognizer: Arc<dyn RecognitionService>,
    jpeg_quality: u8,
    epoch: u64,
    cancel_token: CancellationToken,
}

impl FacePoller {
    async fn run(self, mut scope: CaptureScope) {
        let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<Reply>();
        let mut in_flight: Option<InFlight> = None;
        let mut seq: u64 = 0;

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    log_info!("face recognition loop shutting down");
                    break;
                }
                _ = scope.tick() => {
                    let Some(stream) = scope.stream() else {
                        continue;
                    };
                    let quality = self.jpeg_quality;
                    let captured =
                        tokio::task::spawn_blocking(move || capture_payload(stream.as_ref(), quality)).await;
                    let payload = match captured {
                        Ok(Ok(Some(payload))) => payload,
                        // No decoded frame yet.
                        Ok(Ok(None)) => continue,
                        Ok(Err(err)) => {
                            log_warn!("skipping frame: {err:#}");
                            continue;
                        }
                        Err(err) => {
                            log_error!("frame encoder worker join failed: {err}");
                            continue;
                        }
                    };

                    // Single slot: the newest frame replaces any outstanding request.
                    if let Some(previous) = in_flight.take() {
                        previous.handle.abort();
                        self.ctx.update(|state| state.recognition_finished()).await;
                        log_info!("recognition request #{} superseded", previous.seq);
                    }

                    seq += 1;
                    self.ctx
                        .update(|state| {
                            state.recognition_started();
                            state.error = None;
                        })
                        .await;

                    let recognizer = Arc::clone(&self.recognizer);
                    let reply_tx = reply_tx.clone();
                    let request_seq = seq;
                    let handle = tokio::spawn(async move {
                        let reply = recognizer.recognize(&payload).await;
                        let _ = reply_tx.send((request_seq, reply));
                    });
                    in_flight = Some(InFlight { seq, handle });
                }
                Some((reply_seq, reply)) = reply_rx.recv() => {
                    if in_flight.as_ref().map(|f| f.seq) != Some(reply_seq) {
                        continue;
                    }
                    in_flight = None;
                    self.ctx.update(|state| state.recognition_finished()).await;

                    if self.handle_reply(reply).await == FaceStep::Stop {
                        break;
                    }
                }
            }
        }

        if let Some(previous) = in_flight.take() {
            previous.handle.abort();
            self.ctx.update(|state| state.recognition_finished()).await;
        }
        drop(scope);
        self.ctx.end_channel(DetectionSource::Face, self.epoch).await;
    }

    async fn handle_reply(&self, reply: Result<RecognitionReply, ApiError>) -> FaceStep {
        if !self.ctx.is_current(DetectionSource::Face, self.epoch).await {
            log_info!("dropping recognition reply for a finished activation");
            return FaceStep::Stop;
        }

        let reply = match reply {
            Ok(reply) => reply,
            Err(err) => {
                log_warn!("recognition request failed: {err}");
                self.ctx
                    .report_error(format!("Face recognition failed: {err}"))
                    .await;
                return FaceStep::Continue;
            }
        };

        let Some(best) = reply.positive_match() else {
            self.ctx
                .report_status("No known face detected, still scanning")
                .await;
            return FaceStep::Continue;
        };

        let name = best.name.clone();
        let confidence = best.confidence;
        if !self.ctx.update(|state| state.accept_identity(&name)).await {
            log_info!("ignoring repeat match for {name}");
            return FaceStep::Continue;
        }
        log_info!("face matched {name} ({:.1}%)", confidence * 100.0);

        // Run the resolution on its own task so deactivation never cuts a write short.
        let resolution = tokio::spawn({
            let ctx = Arc::clone(&self.ctx);
            let detection = Detection::face(name.clone(), confidence);
            async move { ctx.dispatch(detection).await }
        });

        tokio::select! {
            joined = resolution => match joined {
                Ok(Outcome::Busy) => {
                    // Not handled; let the next tick try this identity again.
                    self.ctx
                        .update(|state| {
                            if state.last_recognized_identity.as_deref() == Some(name.as_str()) {
                                state.reset_identity();
                            }
                        })
                        .await;
                    FaceStep::Continue
                }
                Ok(outcome) if outcome.is_success() || outcome == Outcome::SessionExpired => {
                    FaceStep::Stop
                }
                Ok(_) => FaceStep::Continue,
                Err(err) => {
                    log_error!("resolution task for {name} failed: {err}");
                    FaceStep::Continue
                }
            },
            _ = self.cancel_token.cancelled() => FaceStep::Stop,
        }
    }
}
