use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::RwLock,
    time::Duration,
};

pub const DATA_DIR_ENV: &str = "ATTENDSCAN_DATA_DIR";
pub const API_BASE_URL_ENV: &str = "ATTENDSCAN_API_BASE_URL";
pub const RECOGNITION_URL_ENV: &str = "ATTENDSCAN_RECOGNITION_URL";

const DEFAULT_DATA_DIR: &str = ".attendscan";

/// Directory holding settings, the remembered token and the camera frame.
pub fn data_dir() -> PathBuf {
    std::env::var_os(DATA_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    pub api_base_url: String,
    pub recognition_url: String,
    pub recorded_by: String,
    pub face_poll_interval_ms: u64,
    pub lookup_navigate_delay_ms: u64,
    pub jpeg_quality: u8,
    pub search_page_size: u32,
    /// Empty means `<data dir>/camera/frame.jpg`.
    pub camera_frame_path: Option<PathBuf>,
    pub remember_login: bool,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080/api".into(),
            recognition_url: "http://localhost:8000".into(),
            recorded_by: "system".into(),
            face_poll_interval_ms: 1800,
            lookup_navigate_delay_ms: 1800,
            jpeg_quality: 75,
            search_page_size: 50,
            camera_frame_path: None,
            remember_login: true,
        }
    }
}

impl ScanSettings {
    pub fn face_poll_interval(&self) -> Duration {
        Duration::from_millis(self.face_poll_interval_ms.max(1))
    }

    pub fn lookup_navigate_delay(&self) -> Duration {
        Duration::from_millis(self.lookup_navigate_delay_ms)
    }

    pub fn frame_path(&self, data_dir: &Path) -> PathBuf {
        self.camera_frame_path
            .clone()
            .unwrap_or_else(|| data_dir.join("camera").join("frame.jpg"))
    }

    /// Applies environment overrides through `lookup` (normally `std::env::var`).
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup(API_BASE_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.api_base_url = url.trim().to_string();
        }
        if let Some(url) = lookup(RECOGNITION_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.recognition_url = url.trim().to_string();
        }
        self
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<ScanSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log::warn!("Ignoring unreadable settings at {}: {err}", path.display());
                ScanSettings::default()
            })
        } else {
            ScanSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// Stored settings as written on disk, without environment overrides.
    pub fn stored(&self) -> ScanSettings {
        match self.data.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Settings in force for this process.
    pub fn effective(&self) -> ScanSettings {
        self.stored().with_overrides(|key| std::env::var(key).ok())
    }

    pub fn update(&self, f: impl FnOnce(&mut ScanSettings)) -> Result<()> {
        let mut guard = match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard);
        self.persist(&guard)
    }

    fn persist(&self, data: &ScanSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
