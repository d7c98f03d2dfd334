use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which acquisition channel produced a detection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum DetectionSource {
    Barcode,
    Face,
}

/// How an attendance record was taken, as sent to the attendance service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceMethod {
    Manual,
    Barcode,
    Face,
}

impl AttendanceMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceMethod::Manual => "manual",
            AttendanceMethod::Barcode => "barcode",
            AttendanceMethod::Face => "face",
        }
    }
}

impl From<DetectionSource> for AttendanceMethod {
    fn from(source: DetectionSource) -> Self {
        match source {
            DetectionSource::Barcode => AttendanceMethod::Barcode,
            DetectionSource::Face => AttendanceMethod::Face,
        }
    }
}

/// Whether detections record attendance or open the student's profile.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ScanMode {
    Attendance,
    Lookup,
}

impl ScanMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanMode::Attendance => "attendance",
            ScanMode::Lookup => "lookup",
        }
    }
}

impl Default for ScanMode {
    fn default() -> Self {
        ScanMode::Lookup
    }
}

/// One raw identification event, consumed immediately by the resolution pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub source: DetectionSource,
    pub raw_value: String,
    /// Recognition confidence in `[0, 1]`; barcode detections carry none.
    pub confidence: Option<f32>,
}

impl Detection {
    pub fn barcode(code: impl Into<String>) -> Self {
        Self {
            source: DetectionSource::Barcode,
            raw_value: code.into(),
            confidence: None,
        }
    }

    pub fn face(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            source: DetectionSource::Face,
            raw_value: label.into(),
            confidence: Some(confidence.clamp(0.0, 1.0)),
        }
    }
}

/// Minimal projection of a student needed to act on a detection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedStudent {
    pub code: String,
    pub display_name: String,
}

impl ResolvedStudent {
    /// Used when the directory has no record for a raw value.
    pub fn from_raw(raw_value: &str) -> Self {
        Self {
            code: raw_value.to_string(),
            display_name: raw_value.to_string(),
        }
    }
}

/// Inline banner text shown to the operator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub text: String,
    pub at: DateTime<Utc>,
}

impl Message {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.into(),
            at: Utc::now(),
        }
    }
}
