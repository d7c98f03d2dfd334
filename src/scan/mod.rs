mod barcode;
mod camera;
mod context;
mod controller;
mod events;
mod face;
mod pipeline;
mod state;

pub use barcode::{
    BarcodeChannel, BarcodeDecoder, CodeResult, DecodeEvent, DecodeStream, DecoderConfig,
    Symbology, Viewport, WedgeDecoder,
};
pub use camera::{encode_frame, CameraDevice, CameraFacing, CameraStream, FileCamera, VideoSurface};
pub use context::ScanContext;
pub use controller::ScanController;
pub use events::{ChannelSink, EventSink, ScanEvent};
pub use face::{CaptureScope, FaceChannel, FacePollConfig};
pub use pipeline::{Outcome, PipelineConfig, ResolutionPipeline};
pub use state::{ScanSnapshot, ScanState};
