use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Local};
use log::{info, warn};

use crate::{
    api::{ApiError, AttendanceService, DirectoryService},
    models::{AttendanceMethod, Detection, ResolvedStudent, ScanMode, StudentRecord},
};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Sent as `recordedBy` with every attendance record.
    pub recorded_by: String,
    /// Pause before a face-sourced lookup navigates, so the banner is readable.
    pub face_navigate_delay: Duration,
    /// Page size fetched when a manual query misses the exact-code lookup.
    pub search_page_size: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            recorded_by: "system".into(),
            face_navigate_delay: Duration::from_millis(1800),
            search_page_size: 50,
        }
    }
}

/// What the pipeline did with a detection or a manual query.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Recorded {
        student: ResolvedStudent,
        method: AttendanceMethod,
        confidence: Option<f32>,
        at: DateTime<Local>,
    },
    /// Identification worked but the attendance write did not.
    RecordFailed {
        student: ResolvedStudent,
        reason: String,
    },
    Navigate {
        student: ResolvedStudent,
        confidence: Option<f32>,
        delay: Duration,
    },
    NotFound {
        query: String,
    },
    SessionExpired,
    Failed {
        reason: String,
    },
    /// Dropped because another resolution was still in flight.
    Busy,
}

impl Outcome {
    /// Recorded or navigating: the identification cycle is complete.
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Recorded { .. } | Outcome::Navigate { .. })
    }

    pub fn status_text(&self) -> Option<String> {
        match self {
            Outcome::Recorded {
                student,
                method,
                confidence,
                at,
            } => {
                let at = at.format("%d %b %Y %H:%M");
                Some(match confidence {
                    Some(confidence) => format!(
                        "Welcome {}! Attendance recorded ({}) with {:.1}% confidence at {at}",
                        student.display_name,
                        method.as_str(),
                        confidence * 100.0
                    ),
                    None => format!(
                        "Attendance recorded for {} ({}) at {at}",
                        student.display_name,
                        method.as_str()
                    ),
                })
            }
            Outcome::Navigate {
                student,
                confidence: Some(confidence),
                ..
            } => Some(format!(
                "Recognized {} with {:.1}% confidence, opening profile",
                student.display_name,
                confidence * 100.0
            )),
            Outcome::NotFound { query } => {
                Some(format!("No student found with code or name \"{query}\""))
            }
            _ => None,
        }
    }

    pub fn error_text(&self) -> Option<String> {
        match self {
            Outcome::RecordFailed { student, reason } => Some(format!(
                "Recognized {} but failed to record attendance: {reason}",
                student.display_name
            )),
            Outcome::SessionExpired => Some("Session expired, please log in again".into()),
            Outcome::Failed { reason } => Some(reason.clone()),
            _ => None,
        }
    }
}

/// Resolves detections to students and performs the mode-dependent action.
#[derive(Clone)]
pub struct ResolutionPipeline {
    directory: Arc<dyn DirectoryService>,
    attendance: Arc<dyn AttendanceService>,
    config: PipelineConfig,
}

fn resolved(record: &StudentRecord) -> ResolvedStudent {
    ResolvedStudent {
        code: record.student_code.clone(),
        display_name: record.display_name().to_string(),
    }
}

impl ResolutionPipeline {
    pub fn new(
        directory: Arc<dyn DirectoryService>,
        attendance: Arc<dyn AttendanceService>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            directory,
            attendance,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn resolve(&self, detection: &Detection, mode: ScanMode) -> Outcome {
        let raw = detection.raw_value.trim();
        let student = match self.directory.lookup_by_code(raw).await {
            Ok(Some(record)) => resolved(&record),
            Ok(None) => {
                info!("No directory record for {raw}; using raw value");
                ResolvedStudent::from_raw(raw)
            }
            Err(err) if err.is_auth() => return Outcome::SessionExpired,
            Err(err) => {
                warn!("Directory lookup for {raw} failed, using raw value: {err}");
                ResolvedStudent::from_raw(raw)
            }
        };

        self.act(student, detection.source.into(), detection.confidence, mode)
            .await
    }

    /// Manual path: exact code first, then the first fuzzy match on one directory page.
    pub async fn search(&self, query: &str, mode: ScanMode) -> Outcome {
        let query = query.trim();
        if query.is_empty() {
            return Outcome::Failed {
                reason: "Enter a student code or name".into(),
            };
        }

        let exact = match self.directory.lookup_by_code(query).await {
            Ok(found) => found,
            Err(err) => return failure(err),
        };

        let found = match exact {
            Some(record) => Some(record),
            None => {
                let needle = query.to_lowercase();
                match self.directory.list(0, self.config.search_page_size).await {
                    Ok(page) => page
                        .content
                        .into_iter()
                        .find(|student| student.matches_query(&needle)),
                    Err(err) => return failure(err),
                }
            }
        };

        match found {
            Some(record) => {
                self.act(resolved(&record), AttendanceMethod::Manual, None, mode)
                    .await
            }
            None => Outcome::NotFound {
                query: query.to_string(),
            },
        }
    }

    async fn act(
        &self,
        student: ResolvedStudent,
        method: AttendanceMethod,
        confidence: Option<f32>,
        mode: ScanMode,
    ) -> Outcome {
        match mode {
            ScanMode::Attendance => {
                match self
                    .attendance
                    .record(&student.code, method, &self.config.recorded_by)
                    .await
                {
                    Ok(()) => {
                        info!("Recorded attendance for {} via {}", student.code, method.as_str());
                        Outcome::Recorded {
                            student,
                            method,
                            confidence,
                            at: Local::now(),
                        }
                    }
                    Err(err) if err.is_auth() => Outcome::SessionExpired,
                    Err(err) => {
                        warn!("Attendance write for {} failed: {err}", student.code);
                        Outcome::RecordFailed {
                            student,
                            reason: err.to_string(),
                        }
                    }
                }
            }
            ScanMode::Lookup => {
                let delay = match method {
                    AttendanceMethod::Face => self.config.face_navigate_delay,
                    AttendanceMethod::Barcode | AttendanceMethod::Manual => Duration::ZERO,
                };
                Outcome::Navigate {
                    student,
                    confidence,
                    delay,
                }
            }
        }
    }
}

fn failure(err: ApiError) -> Outcome {
    if err.is_auth() {
        Outcome::SessionExpired
    } else {
        Outcome::Failed {
            reason: err.to_string(),
        }
    }
}
