use std::{
    io::Cursor,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{codecs::jpeg::JpegEncoder, RgbImage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraFacing {
    /// Toward the operator (face scanning).
    Front,
    /// Away from the operator (barcode scanning).
    Environment,
}

/// Source of live camera streams. Every acquisition is fresh; streams are never reused.
#[async_trait]
pub trait CameraDevice: Send + Sync {
    async fn acquire(&self, facing: CameraFacing) -> Result<Box<dyn CameraStream>>;
}

/// A live media stream. `stop_tracks` must release the device.
///
/// Frame reads may block on I/O and decoding; callers run them on the blocking pool.
pub trait CameraStream: Send + Sync {
    /// Latest decoded frame, or `None` when the stream has not produced one yet.
    fn current_frame(&self) -> Option<RgbImage>;

    fn stop_tracks(&self);
}

/// Where an attached stream renders; frames are snapshotted from here.
#[derive(Default)]
pub struct VideoSurface {
    stream: Option<Arc<dyn CameraStream>>,
}

impl VideoSurface {
    pub fn attach(&mut self, stream: Box<dyn CameraStream>) {
        self.stream = Some(Arc::from(stream));
    }

    pub fn is_attached(&self) -> bool {
        self.stream.is_some()
    }

    /// Shared handle for reading frames off the async worker.
    pub fn stream(&self) -> Option<Arc<dyn CameraStream>> {
        self.stream.clone()
    }

    /// Stops every track of the attached stream, then detaches it.
    pub fn release(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.stop_tracks();
        }
    }
}

/// Encodes a frame as JPEG and returns it base64 encoded.
pub fn encode_frame(frame: &RgbImage, quality: u8) -> Result<String> {
    let mut jpeg = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100))
        .encode_image(frame)
        .context("failed to encode frame as jpeg")?;
    Ok(STANDARD.encode(jpeg.into_inner()))
}

/// Camera backed by a frame file that an external capture tool keeps overwriting.
pub struct FileCamera {
    frame_path: PathBuf,
}

impl FileCamera {
    pub fn new(frame_path: PathBuf) -> Self {
        Self { frame_path }
    }
}

#[async_trait]
impl CameraDevice for FileCamera {
    async fn acquire(&self, facing: CameraFacing) -> Result<Box<dyn CameraStream>> {
        let Some(dir) = self.frame_path.parent() else {
            bail!("camera frame path {} has no directory", self.frame_path.display());
        };
        if !dir.is_dir() {
            bail!("no camera device: {} does not exist", dir.display());
        }

        log::info!(
            "Acquired file camera ({facing:?}) reading {}",
            self.frame_path.display()
        );
        Ok(Box::new(FileStream {
            frame_path: self.frame_path.clone(),
            stopped: AtomicBool::new(false),
        }))
    }
}

struct FileStream {
    frame_path: PathBuf,
    stopped: AtomicBool,
}

fn read_frame(path: &Path) -> Option<RgbImage> {
    match image::open(path) {
        Ok(frame) => Some(frame.to_rgb8()),
        Err(err) => {
            log::trace!("no decodable frame at {}: {err}", path.display());
            None
        }
    }
}

impl CameraStream for FileStream {
    fn current_frame(&self) -> Option<RgbImage> {
        if self.stopped.load(Ordering::SeqCst) {
            return None;
        }
        read_frame(&self.frame_path)
    }

    fn stop_tracks(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            log::info!("Stopped file camera at {}", self.frame_path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn encoded_frame_is_base64_jpeg() {
        let frame = RgbImage::from_pixel(8, 8, image::Rgb([200, 120, 40]));
        let encoded = encode_frame(&frame, 75).unwrap();
        let bytes = STANDARD.decode(encoded).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[tokio::test]
    async fn file_camera_without_directory_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let camera = FileCamera::new(dir.path().join("missing").join("frame.jpg"));
        assert!(camera.acquire(CameraFacing::Front).await.is_err());
    }

    #[tokio::test]
    async fn file_camera_yields_no_frame_until_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        let camera = FileCamera::new(path.clone());
        let stream = camera.acquire(CameraFacing::Front).await.unwrap();

        assert!(stream.current_frame().is_none());

        RgbImage::from_pixel(4, 4, image::Rgb([1, 2, 3])).save(&path).unwrap();
        assert_eq!(stream.current_frame().map(|f| f.dimensions()), Some((4, 4)));

        stream.stop_tracks();
        assert!(stream.current_frame().is_none());
    }

    #[tokio::test]
    async fn frames_are_read_on_the_blocking_pool() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        RgbImage::from_pixel(6, 2, image::Rgb([9, 9, 9])).save(&path).unwrap();

        let camera = FileCamera::new(path);
        let mut surface = VideoSurface::default();
        surface.attach(camera.acquire(CameraFacing::Front).await.unwrap());

        let stream = surface.stream().unwrap();
        let dims = tokio::task::spawn_blocking(move || stream.current_frame().map(|f| f.dimensions()))
            .await
            .unwrap();
        assert_eq!(dims, Some((6, 2)));

        // A handle still held by a blocking read sees the release.
        let stream = surface.stream().unwrap();
        surface.release();
        let after = tokio::task::spawn_blocking(move || stream.current_frame().is_none())
            .await
            .unwrap();
        assert!(after);
    }

    #[test]
    fn surface_release_stops_then_detaches() {
        struct Counting(Arc<AtomicUsize>);
        impl CameraStream for Counting {
            fn current_frame(&self) -> Option<RgbImage> {
                None
            }
            fn stop_tracks(&self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let stops = Arc::new(AtomicUsize::new(0));
        let mut surface = VideoSurface::default();
        surface.attach(Box::new(Counting(stops.clone())));
        surface.release();
        surface.release();

        assert!(!surface.is_attached());
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }
}
