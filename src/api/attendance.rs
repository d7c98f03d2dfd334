use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;

use crate::models::{AttendanceMethod, AttendanceRecord};

use super::{client::HttpBackend, ApiError};

/// Records attendance. A 409 means the student was already recorded today.
#[async_trait]
pub trait AttendanceService: Send + Sync {
    async fn record(
        &self,
        code: &str,
        method: AttendanceMethod,
        recorded_by: &str,
    ) -> Result<(), ApiError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AttendRequest<'a> {
    method: AttendanceMethod,
    recorded_by: &'a str,
}

#[async_trait]
impl AttendanceService for HttpBackend {
    async fn record(
        &self,
        code: &str,
        method: AttendanceMethod,
        recorded_by: &str,
    ) -> Result<(), ApiError> {
        let url = self.endpoint(&["students", code, "attend"])?;
        let body = AttendRequest {
            method,
            recorded_by,
        };
        self.send::<Value>(self.http().post(url).json(&body)).await?;
        Ok(())
    }
}

impl HttpBackend {
    /// Attendance history, optionally bounded by inclusive dates.
    pub async fn attendance_history(
        &self,
        code: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<AttendanceRecord>, ApiError> {
        let mut url = self.endpoint(&["students", code, "attendance"])?;
        if from.is_some() || to.is_some() {
            let mut pairs = url.query_pairs_mut();
            if let Some(from) = from {
                pairs.append_pair("from", &from.format("%Y-%m-%d").to_string());
            }
            if let Some(to) = to {
                pairs.append_pair("to", &to.format("%Y-%m-%d").to_string());
            }
        }

        Ok(self
            .send::<Vec<AttendanceRecord>>(self.http().get(url))
            .await?
            .unwrap_or_default())
    }
}
