use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::{
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::models::{Detection, DetectionSource};

use super::{camera::CameraFacing, context::ScanContext, pipeline::Outcome};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Barcode symbologies the decoder can be asked to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbology {
    Code128,
    Ean13,
    Ean8,
}

fn ean_check_digit_valid(digits: &[u8]) -> bool {
    let Some((check, body)) = digits.split_last() else {
        return false;
    };
    // Weights alternate 3,1 starting from the digit nearest the check digit.
    let sum: u32 = body
        .iter()
        .rev()
        .enumerate()
        .map(|(i, d)| u32::from(*d) * if i % 2 == 0 { 3 } else { 1 })
        .sum();
    (10 - sum % 10) % 10 == u32::from(*check)
}

impl Symbology {
    /// Whether `code` is a well-formed payload for this symbology.
    pub fn accepts(&self, code: &str) -> bool {
        match self {
            Symbology::Code128 => {
                !code.is_empty() && code.chars().all(|c| c.is_ascii() && !c.is_ascii_control())
            }
            Symbology::Ean13 | Symbology::Ean8 => {
                let len = if *self == Symbology::Ean13 { 13 } else { 8 };
                if code.len() != len || !code.bytes().all(|b| b.is_ascii_digit()) {
                    return false;
                }
                let digits: Vec<u8> = code.bytes().map(|b| b - b'0').collect();
                ean_check_digit_valid(&digits)
            }
        }
    }
}

/// Live-stream decoder configuration.
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    pub readers: Vec<Symbology>,
    /// Preprocess input to locate the code before decoding.
    pub locate: bool,
    pub facing: CameraFacing,
    pub width: u32,
    pub height: u32,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            readers: vec![Symbology::Code128, Symbology::Ean13, Symbology::Ean8],
            locate: true,
            facing: CameraFacing::Environment,
            width: 640,
            height: 480,
        }
    }
}

/// Rendering surface the decoder draws into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewport {
    pub target: String,
}

impl Viewport {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CodeResult {
    pub code: Option<String>,
    pub format: Option<Symbology>,
}

/// One detection event from the decoder.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeEvent {
    pub code_result: Option<CodeResult>,
}

impl DecodeEvent {
    pub fn decoded(code: impl Into<String>, format: Symbology) -> Self {
        Self {
            code_result: Some(CodeResult {
                code: Some(code.into()),
                format: Some(format),
            }),
        }
    }

    pub fn code(&self) -> Option<&str> {
        self.code_result
            .as_ref()
            .and_then(|result| result.code.as_deref())
            .filter(|code| !code.is_empty())
    }
}

/// Live-video barcode decoder, consumed as a black box.
#[async_trait]
pub trait BarcodeDecoder: Send + Sync {
    async fn init(&self, config: &DecoderConfig, viewport: &Viewport)
        -> Result<Box<dyn DecodeStream>>;
}

#[async_trait]
pub trait DecodeStream: Send {
    /// Next detection; `None` once the stream has ended.
    async fn next_event(&mut self) -> Option<DecodeEvent>;

    fn stop(&mut self);
}

/// Stops the wrapped stream exactly once, on whichever exit path comes first.
struct StreamGuard {
    stream: Box<dyn DecodeStream>,
    stopped: bool,
}

impl StreamGuard {
    fn new(stream: Box<dyn DecodeStream>) -> Self {
        Self {
            stream,
            stopped: false,
        }
    }

    fn stop_once(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.stream.stop();
        }
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.stop_once();
    }
}

/// Single-shot barcode acquisition channel.
pub struct BarcodeChannel {
    decoder: Arc<dyn BarcodeDecoder>,
    config: DecoderConfig,
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl BarcodeChannel {
    pub fn new(decoder: Arc<dyn BarcodeDecoder>, config: DecoderConfig) -> Self {
        Self {
            decoder,
            config,
            handle: None,
            cancel_token: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    pub async fn activate(&mut self, ctx: Arc<ScanContext>, viewport: Viewport) -> Result<()> {
        if self.is_running() {
            bail!("barcode scanning already active");
        }
        self.deactivate().await?;

        let stream = self
            .decoder
            .init(&self.config, &viewport)
            .await
            .context("barcode scanner unavailable")?;
        let guard = StreamGuard::new(stream);

        let epoch = ctx.begin_channel(DetectionSource::Barcode).await;
        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(barcode_loop(ctx, guard, epoch, cancel_token.clone()));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    pub async fn deactivate(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("barcode scan task failed to join")
                .map(|_| ())
        } else {
            Ok(())
        }
    }
}

impl Drop for BarcodeChannel {
    fn drop(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

async fn barcode_loop(
    ctx: Arc<ScanContext>,
    mut guard: StreamGuard,
    epoch: u64,
    cancel_token: CancellationToken,
) {
    loop {
        tokio::select! {
            event = guard.stream.next_event() => {
                let Some(event) = event else {
                    log_warn!("barcode decode stream ended unexpectedly");
                    ctx.report_error("barcode scanner unavailable").await;
                    break;
                };
                let Some(code) = event.code().map(str::to_string) else {
                    continue;
                };

                // Single shot: stop before handing the code on.
                guard.stop_once();
                ctx.end_channel(DetectionSource::Barcode, epoch).await;
                log_info!("barcode decoded: {code}");

                let ctx = Arc::clone(&ctx);
                tokio::spawn(async move {
                    let outcome = ctx.dispatch(Detection::barcode(code.clone())).await;
                    if outcome == Outcome::Busy {
                        ctx.report_error(format!(
                            "Another scan is being resolved; scan {code} again"
                        ))
                        .await;
                    }
                });
                break;
            }
            _ = cancel_token.cancelled() => {
                log_info!("barcode scanning shutting down");
                break;
            }
        }
    }

    drop(guard);
    ctx.end_channel(DetectionSource::Barcode, epoch).await;
}

/// Decoder fed by a keyboard-wedge hand scanner: each typed line is one read.
pub struct WedgeDecoder {
    lines: broadcast::Sender<String>,
}

impl WedgeDecoder {
    pub fn new() -> Self {
        let (lines, _) = broadcast::channel(16);
        Self { lines }
    }

    /// Feeds one scanned line. Returns false when no stream is listening.
    pub fn push_line(&self, line: &str) -> bool {
        self.lines.send(line.to_string()).is_ok()
    }
}

impl Default for WedgeDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BarcodeDecoder for WedgeDecoder {
    async fn init(
        &self,
        config: &DecoderConfig,
        viewport: &Viewport,
    ) -> Result<Box<dyn DecodeStream>> {
        if config.readers.is_empty() {
            bail!("no barcode readers configured");
        }
        log::info!(
            "Wedge decoder attached to {} ({:?})",
            viewport.target,
            config.readers
        );
        Ok(Box::new(WedgeStream {
            rx: self.lines.subscribe(),
            readers: config.readers.clone(),
            locate: config.locate,
            stopped: false,
        }))
    }
}

struct WedgeStream {
    rx: broadcast::Receiver<String>,
    readers: Vec<Symbology>,
    locate: bool,
    stopped: bool,
}

/// Strips scanner prefixes/suffixes: control characters and surrounding blanks.
fn locate_code(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .trim()
        .to_string()
}

#[async_trait]
impl DecodeStream for WedgeStream {
    async fn next_event(&mut self) -> Option<DecodeEvent> {
        loop {
            if self.stopped {
                return None;
            }
            let line = match self.rx.recv().await {
                Ok(line) => line,
                Err(RecvError::Lagged(skipped)) => {
                    log::debug!("wedge decoder skipped {skipped} lines");
                    continue;
                }
                Err(RecvError::Closed) => return None,
            };

            let candidate = if self.locate { locate_code(&line) } else { line };
            if let Some(format) = self.readers.iter().find(|s| s.accepts(&candidate)) {
                return Some(DecodeEvent::decoded(candidate, *format));
            }
            log::debug!("wedge input {candidate:?} matched no enabled reader");
        }
    }

    fn stop(&mut self) {
        self.stopped = true;
    }
}
