use std::sync::Arc;

use tokio::sync::Mutex;

use crate::models::{DetectionSource, ScanMode};

use super::{
    barcode::{BarcodeChannel, Viewport},
    context::ScanContext,
    face::FaceChannel,
    pipeline::Outcome,
    state::ScanSnapshot,
};

/// Handle the front end drives: mode switch, channel toggles, search, retry, unmount.
///
/// The two channels are owned independently; either, both or neither may run.
#[derive(Clone)]
pub struct ScanController {
    ctx: Arc<ScanContext>,
    barcode: Arc<Mutex<BarcodeChannel>>,
    face: Arc<Mutex<FaceChannel>>,
}

impl ScanController {
    pub fn new(ctx: Arc<ScanContext>, barcode: BarcodeChannel, face: FaceChannel) -> Self {
        Self {
            ctx,
            barcode: Arc::new(Mutex::new(barcode)),
            face: Arc::new(Mutex::new(face)),
        }
    }

    pub fn context(&self) -> &Arc<ScanContext> {
        &self.ctx
    }

    pub async fn snapshot(&self) -> ScanSnapshot {
        self.ctx.snapshot().await
    }

    /// Switches the interpretation of future detections. Running channels keep running.
    pub async fn set_attendance_mode(&self, enabled: bool) -> ScanMode {
        let mode = if enabled {
            ScanMode::Attendance
        } else {
            ScanMode::Lookup
        };
        self.ctx.update(|state| state.mode = mode).await;
        log::info!("Scan mode set to {}", mode.as_str());
        mode
    }

    pub async fn toggle_attendance_mode(&self) -> ScanMode {
        let enabled = self.ctx.read(|state| state.mode == ScanMode::Lookup).await;
        self.set_attendance_mode(enabled).await
    }

    /// Starts or stops the barcode channel. Returns whether it is active afterwards.
    pub async fn toggle_barcode(&self, viewport: Viewport) -> bool {
        let mut channel = self.barcode.lock().await;
        if channel.is_running() {
            if let Err(err) = channel.deactivate().await {
                log::warn!("Barcode channel stopped with error: {err:#}");
            }
            return false;
        }

        self.ctx.update(|state| state.error = None).await;
        match channel.activate(Arc::clone(&self.ctx), viewport).await {
            Ok(()) => true,
            Err(err) => {
                log::warn!("Barcode activation failed: {err:#}");
                self.ctx.report_error(format!("{err:#}")).await;
                false
            }
        }
    }

    /// Starts or stops the face channel. Returns whether it is active afterwards.
    pub async fn toggle_face(&self) -> bool {
        let mut channel = self.face.lock().await;
        if channel.is_running() {
            if let Err(err) = channel.deactivate().await {
                log::warn!("Face channel stopped with error: {err:#}");
            }
            return false;
        }
        self.start_face(&mut channel).await
    }

    /// Clears the remembered identity and restarts face scanning for the next person.
    pub async fn retry_face(&self) -> bool {
        let mut channel = self.face.lock().await;
        if channel.is_running() {
            if let Err(err) = channel.deactivate().await {
                log::warn!("Face channel stopped with error: {err:#}");
            }
        }
        self.ctx
            .update(|state| {
                state.reset_identity();
                state.clear_messages();
            })
            .await;
        self.start_face(&mut channel).await
    }

    /// Whether the retry action applies: attendance mode with face scanning idle.
    pub async fn retry_available(&self) -> bool {
        let face_running = self.face.lock().await.is_running();
        !face_running && self.ctx.read(|state| state.mode == ScanMode::Attendance).await
    }

    pub async fn search(&self, query: &str) -> Outcome {
        self.ctx.search(query).await
    }

    pub async fn is_active(&self, source: DetectionSource) -> bool {
        match source {
            DetectionSource::Barcode => self.barcode.lock().await.is_running(),
            DetectionSource::Face => self.face.lock().await.is_running(),
        }
    }

    /// Leaves the scan page: tears down both channels and suppresses pending navigation.
    pub async fn unmount(&self) {
        self.ctx.update(|state| state.unmount()).await;

        if let Err(err) = self.barcode.lock().await.deactivate().await {
            log::warn!("Barcode teardown failed: {err:#}");
        }
        if let Err(err) = self.face.lock().await.deactivate().await {
            log::warn!("Face teardown failed: {err:#}");
        }
        log::info!("Scan page unmounted");
    }

    /// Reopens the scan page after an unmount. Returns false, changing nothing,
    /// while the page is still open.
    pub async fn remount(&self) -> bool {
        if self.ctx.read(|state| state.mounted).await {
            return false;
        }

        // Unmount already stopped both; this only catches a channel started since.
        if let Err(err) = self.barcode.lock().await.deactivate().await {
            log::warn!("Barcode teardown failed: {err:#}");
        }
        if let Err(err) = self.face.lock().await.deactivate().await {
            log::warn!("Face teardown failed: {err:#}");
        }
        self.ctx.update(|state| state.remount()).await;
        log::info!("Scan page reopened");
        true
    }

    async fn start_face(&self, channel: &mut FaceChannel) -> bool {
        self.ctx.update(|state| state.error = None).await;
        match channel.activate(Arc::clone(&self.ctx)).await {
            Ok(()) => true,
            Err(err) => {
                log::warn!("Face activation failed: {err:#}");
                self.ctx.report_error(format!("{err:#}")).await;
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::AttendanceMethod,
        scan::{
            barcode::{DecoderConfig, WedgeDecoder},
            context::tests::{context, RecordingSink},
            face::{
                tests::{advance, frame, matched, no_match, FakeCamera, ScriptedRecognizer},
                FacePollConfig,
            },
            pipeline::tests::{student, FakeAttendance, FakeDirectory},
        },
    };
    use std::time::Duration;

    struct Harness {
        controller: ScanController,
        wedge: Arc<WedgeDecoder>,
        camera: Arc<FakeCamera>,
        recognizer: Arc<ScriptedRecognizer>,
        attendance: Arc<FakeAttendance>,
        sink: Arc<RecordingSink>,
    }

    fn harness(recognizer: Arc<ScriptedRecognizer>) -> Harness {
        let sink = Arc::new(RecordingSink::default());
        let attendance = Arc::new(FakeAttendance::default());
        let directory = FakeDirectory::with(vec![
            student("STU2026001", "Amina Yusuf"),
            student("STU2026002", "Ahmed Bello"),
        ]);
        let ctx = context(directory, attendance.clone(), sink.clone());

        let wedge = Arc::new(WedgeDecoder::new());
        let camera = FakeCamera::new(frame());
        let controller = ScanController::new(
            ctx,
            BarcodeChannel::new(wedge.clone(), DecoderConfig::default()),
            FaceChannel::new(camera.clone(), recognizer.clone(), FacePollConfig::default()),
        );

        Harness {
            controller,
            wedge,
            camera,
            recognizer,
            attendance,
            sink,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn barcode_lookup_navigates_without_recording() {
        let h = harness(ScriptedRecognizer::new(|_| (Duration::ZERO, no_match())));

        assert!(h.controller.toggle_barcode(Viewport::new("scanner")).await);
        assert!(h.wedge.push_line("STU2026002"));
        advance(10).await;

        assert_eq!(h.sink.navigations(), vec!["STU2026002".to_string()]);
        assert!(h.attendance.calls().is_empty());
        assert!(!h.controller.is_active(DetectionSource::Barcode).await);
    }

    #[tokio::test(start_paused = true)]
    async fn face_attendance_records_once_with_confidence() {
        let h = harness(ScriptedRecognizer::new(|_| {
            (Duration::ZERO, matched("STU2026001", 0.92))
        }));
        h.controller.set_attendance_mode(true).await;

        assert!(h.controller.toggle_face().await);
        advance(1900).await;
        advance(1800).await;

        assert_eq!(
            h.attendance.calls(),
            vec![("STU2026001".to_string(), AttendanceMethod::Face, "system".to_string())]
        );
        let status = h.controller.snapshot().await.status.unwrap();
        assert!(status.text.contains("Amina Yusuf"));
        assert!(status.text.contains("92.0%"));
        assert!(h.controller.retry_available().await);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_allows_the_same_person_again() {
        let h = harness(ScriptedRecognizer::new(|_| {
            (Duration::ZERO, matched("STU2026001", 0.92))
        }));
        h.controller.set_attendance_mode(true).await;

        h.controller.toggle_face().await;
        advance(1900).await;
        assert!(h.controller.retry_face().await);
        assert!(h.controller.snapshot().await.last_recognized_identity.is_none());
        advance(1900).await;

        assert_eq!(h.attendance.calls().len(), 2);
        assert_eq!(h.camera.acquires(), 2);
        assert_eq!(h.camera.stops(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn mode_toggle_keeps_channels_running() {
        let h = harness(ScriptedRecognizer::new(|_| (Duration::ZERO, no_match())));

        h.controller.toggle_barcode(Viewport::new("scanner")).await;
        h.controller.toggle_face().await;
        assert_eq!(h.controller.toggle_attendance_mode().await, ScanMode::Attendance);

        assert!(h.controller.is_active(DetectionSource::Barcode).await);
        assert!(h.controller.is_active(DetectionSource::Face).await);

        h.wedge.push_line("STU2026002");
        advance(10).await;
        assert_eq!(h.attendance.calls().len(), 1);
        assert_eq!(h.attendance.calls()[0].1, AttendanceMethod::Barcode);
        assert!(h.controller.is_active(DetectionSource::Face).await);
        assert!(!h.controller.toggle_face().await);
    }

    #[tokio::test(start_paused = true)]
    async fn unmount_mid_poll_releases_everything() {
        let h = harness(ScriptedRecognizer::new(|_| {
            (Duration::from_secs(3), no_match())
        }));

        h.controller.toggle_barcode(Viewport::new("scanner")).await;
        h.controller.toggle_face().await;
        advance(1900).await;
        assert_eq!(h.recognizer.calls(), 1);

        h.controller.unmount().await;
        advance(5000).await;

        let snapshot = h.controller.snapshot().await;
        assert!(snapshot.active_channels.is_empty());
        assert!(!snapshot.busy);
        assert_eq!(h.camera.acquires(), h.camera.stops());
        assert_eq!(h.recognizer.calls(), 1);
        assert!(!h.wedge.push_line("STU2026002"));
    }

    #[tokio::test(start_paused = true)]
    async fn unmount_during_lookup_delay_suppresses_navigation() {
        let h = harness(ScriptedRecognizer::new(|_| {
            (Duration::ZERO, matched("STU2026001", 0.9))
        }));

        h.controller.toggle_face().await;
        advance(1900).await;
        h.controller.unmount().await;
        advance(3000).await;

        assert!(h.sink.navigations().is_empty());
        assert_eq!(h.camera.stops(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn remount_leaves_an_open_page_alone() {
        let h = harness(ScriptedRecognizer::new(|_| (Duration::ZERO, no_match())));
        h.controller.set_attendance_mode(true).await;
        assert!(h.controller.toggle_barcode(Viewport::new("scanner")).await);

        assert!(!h.controller.remount().await);

        let snapshot = h.controller.snapshot().await;
        assert_eq!(snapshot.mode, ScanMode::Attendance);
        assert_eq!(snapshot.active_channels, vec![DetectionSource::Barcode]);

        h.wedge.push_line("STU2026002");
        advance(10).await;
        assert_eq!(h.attendance.calls().len(), 1);
        assert!(h.sink.navigations().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn remount_after_unmount_starts_fresh() {
        let h = harness(ScriptedRecognizer::new(|_| (Duration::ZERO, no_match())));
        h.controller.set_attendance_mode(true).await;
        h.controller.toggle_face().await;
        h.controller.unmount().await;

        assert!(h.controller.remount().await);

        let snapshot = h.controller.snapshot().await;
        assert_eq!(snapshot.mode, ScanMode::Lookup);
        assert!(snapshot.active_channels.is_empty());
        assert!(!h.controller.is_active(DetectionSource::Face).await);
        assert_eq!(h.camera.acquires(), h.camera.stops());
    }

    #[tokio::test(start_paused = true)]
    async fn barcode_read_while_slot_is_held_is_reported() {
        let h = harness(ScriptedRecognizer::new(|_| (Duration::ZERO, no_match())));
        h.controller.set_attendance_mode(true).await;
        let ctx = h.controller.context().clone();
        assert!(ctx.update(|state| state.try_begin_resolution()).await);

        h.controller.toggle_barcode(Viewport::new("scanner")).await;
        h.wedge.push_line("STU2026002");
        advance(10).await;
        ctx.update(|state| state.end_resolution()).await;

        assert!(h.attendance.calls().is_empty());
        let error = h.controller.snapshot().await.error.unwrap();
        assert!(error.text.contains("STU2026002"));
        assert!(error.text.contains("scan"));
        assert!(!h.controller.is_active(DetectionSource::Barcode).await);
    }

    #[tokio::test(start_paused = true)]
    async fn face_lookup_waits_before_navigating() {
        let h = harness(ScriptedRecognizer::new(|_| {
            (Duration::ZERO, matched("STU2026001", 0.9))
        }));

        h.controller.toggle_face().await;
        // Match lands at 1.8s; navigation is due 1.8s later.
        advance(1900).await;
        assert!(h.sink.navigations().is_empty());
        let status = h.controller.snapshot().await.status.unwrap();
        assert!(status.text.contains("90.0%"));

        advance(1000).await;
        assert!(h.sink.navigations().is_empty());

        advance(1000).await;
        assert_eq!(h.sink.navigations(), vec!["STU2026001".to_string()]);
        assert!(h.attendance.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_search_is_rejected() {
        let h = harness(ScriptedRecognizer::new(|_| (Duration::ZERO, no_match())));

        let outcome = h.controller.search("   ").await;

        assert!(matches!(outcome, Outcome::Failed { .. }));
        assert!(h.sink.count("scan-error") >= 1);
    }
}
