use async_trait::async_trait;
use serde_json::Value;

use crate::models::{GradeEntry, GradeSheet, StudentPage, StudentRecord};

use super::{client::HttpBackend, ApiError};

/// Resolves student codes and lists students.
#[async_trait]
pub trait DirectoryService: Send + Sync {
    /// Exact-code lookup. `Ok(None)` when the directory has no such student.
    async fn lookup_by_code(&self, code: &str) -> Result<Option<StudentRecord>, ApiError>;

    /// One page of students, newest first.
    async fn list(&self, page: u32, size: u32) -> Result<StudentPage, ApiError>;
}

#[async_trait]
impl DirectoryService for HttpBackend {
    async fn lookup_by_code(&self, code: &str) -> Result<Option<StudentRecord>, ApiError> {
        let url = self.endpoint(&["students", "code", code])?;
        match self.send::<StudentRecord>(self.http().get(url)).await {
            Ok(student) => Ok(student.filter(|s| !s.student_code.is_empty())),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn list(&self, page: u32, size: u32) -> Result<StudentPage, ApiError> {
        let mut url = self.endpoint(&["students"])?;
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("size", &size.to_string())
            .append_pair("sortBy", "createdAt")
            .append_pair("direction", "desc");

        Ok(self
            .send::<StudentPage>(self.http().get(url))
            .await?
            .unwrap_or_default())
    }
}

/// Smallest page fetched when filtering client-side.
const SEARCH_MIN_PAGE: u32 = 100;

/// Client-side search over one directory page (code, name or email substring).
pub async fn search_students(
    directory: &dyn DirectoryService,
    query: &str,
    page: u32,
    size: u32,
) -> Result<StudentPage, ApiError> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return directory.list(page, size).await;
    }

    let all = directory.list(page, size.max(SEARCH_MIN_PAGE)).await?;
    let content: Vec<StudentRecord> = all
        .content
        .into_iter()
        .filter(|student| student.matches_query(&needle))
        .collect();

    Ok(StudentPage {
        total_elements: content.len() as u64,
        content,
    })
}

impl HttpBackend {
    pub async fn update_student(&self, code: &str, updates: &Value) -> Result<StudentRecord, ApiError> {
        let url = self.endpoint(&["students", code])?;
        self.send::<StudentRecord>(self.http().patch(url).json(updates))
            .await?
            .ok_or_else(|| ApiError::Decode("empty update response".into()))
    }

    pub async fn student_grades(&self, code: &str) -> Result<GradeSheet, ApiError> {
        let url = self.endpoint(&["students", code, "grades"])?;
        Ok(self
            .send::<GradeSheet>(self.http().get(url))
            .await?
            .unwrap_or_default())
    }

    pub async fn add_grade(&self, code: &str, entry: &GradeEntry) -> Result<StudentRecord, ApiError> {
        let url = self.endpoint(&["students", code, "grade"])?;
        self.send::<StudentRecord>(self.http().patch(url).json(entry))
            .await?
            .ok_or_else(|| ApiError::Decode("empty grade response".into()))
    }
}
