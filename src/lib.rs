pub mod api;
mod console;
pub mod models;
pub mod scan;
pub mod settings;
mod utils;

use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};
use tokio::sync::mpsc::UnboundedReceiver;

use api::{CredentialStore, HttpBackend, RecognitionClient};
use scan::{
    BarcodeChannel, ChannelSink, DecoderConfig, FaceChannel, FacePollConfig, FileCamera,
    PipelineConfig, ResolutionPipeline, ScanContext, ScanController, ScanEvent, WedgeDecoder,
};
use settings::SettingsStore;

pub(crate) struct AppState {
    pub(crate) settings: SettingsStore,
    pub(crate) credentials: Arc<CredentialStore>,
    pub(crate) backend: HttpBackend,
    pub(crate) scan: ScanController,
    pub(crate) wedge: Arc<WedgeDecoder>,
}

impl AppState {
    fn build(data_dir: &Path) -> Result<(Self, UnboundedReceiver<ScanEvent>)> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data dir {}", data_dir.display()))?;

        let settings = SettingsStore::new(data_dir.join("settings.json"))?;
        let config = settings.effective();

        let credentials = Arc::new(CredentialStore::new(data_dir.join("token"))?);
        let backend = HttpBackend::new(&config.api_base_url, credentials.clone())?;
        let recognizer = Arc::new(RecognitionClient::new(&config.recognition_url)?);

        let pipeline = ResolutionPipeline::new(
            Arc::new(backend.clone()),
            Arc::new(backend.clone()),
            PipelineConfig {
                recorded_by: config.recorded_by.clone(),
                face_navigate_delay: config.lookup_navigate_delay(),
                search_page_size: config.search_page_size,
            },
        );
        let (sink, events) = ChannelSink::new();
        let ctx = Arc::new(ScanContext::new(pipeline, Arc::new(sink)));

        let wedge = Arc::new(WedgeDecoder::new());
        let camera = Arc::new(FileCamera::new(config.frame_path(data_dir)));
        let scan = ScanController::new(
            ctx,
            BarcodeChannel::new(wedge.clone(), DecoderConfig::default()),
            FaceChannel::new(
                camera,
                recognizer,
                FacePollConfig {
                    interval: config.face_poll_interval(),
                    jpeg_quality: config.jpeg_quality,
                },
            ),
        );

        log::info!(
            "Directory service at {}, recognition service at {}",
            config.api_base_url,
            config.recognition_url
        );

        Ok((
            Self {
                settings,
                credentials,
                backend,
                scan,
                wedge,
            },
            events,
        ))
    }
}

async fn serve() -> Result<()> {
    let data_dir = settings::data_dir();
    let (state, events) = AppState::build(&data_dir)?;
    console::run(Arc::new(state), events).await
}

pub fn run() {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    log::info!("AttendScan starting up...");

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            log::error!("Failed to start async runtime: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = runtime.block_on(serve()) {
        log::error!("AttendScan stopped: {err:#}");
        std::process::exit(1);
    }
}
