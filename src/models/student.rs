use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Partial,
    Paid,
    Overdue,
    Refunded,
}

impl Default for PaymentStatus {
    fn default() -> Self {
        PaymentStatus::Pending
    }
}

/// Student as returned by the directory service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StudentRecord {
    pub id: Option<String>,
    pub student_code: String,
    pub full_name: Option<String>,
    pub class_name: Option<String>,
    pub division: Option<String>,
    pub guardian_phone_primary: Option<String>,
    pub student_email: Option<String>,
    pub email: Option<String>,
    pub total_fees: f64,
    pub amount_paid: f64,
    pub payment_status: PaymentStatus,
    pub currency: Option<String>,
    pub notes: Option<String>,
    pub active: bool,
    pub attendance_records: Vec<AttendanceRecord>,
    pub grades: Vec<Grade>,
    pub exam_results: Vec<ExamResult>,
}

impl StudentRecord {
    /// Name to show in banners; falls back to the code when the record has no name.
    pub fn display_name(&self) -> &str {
        match self.full_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.student_code,
        }
    }

    /// The directory has used both `email` and `studentEmail` over time.
    pub fn contact_email(&self) -> Option<&str> {
        self.email.as_deref().or(self.student_email.as_deref())
    }

    pub fn balance_due(&self) -> f64 {
        (self.total_fees - self.amount_paid).max(0.0)
    }

    /// Case-insensitive substring match on code, name or email.
    pub fn matches_query(&self, needle_lower: &str) -> bool {
        let contains = |value: &str| value.to_lowercase().contains(needle_lower);
        contains(&self.student_code)
            || self.full_name.as_deref().map(contains).unwrap_or(false)
            || self.contact_email().map(contains).unwrap_or(false)
    }
}

/// One page of the directory listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StudentPage {
    pub content: Vec<StudentRecord>,
    pub total_elements: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub date_time: NaiveDateTime,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub recorded_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grade {
    pub subject: String,
    pub score: f64,
    pub max_score: f64,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamResult {
    pub exam_name: String,
    pub obtained_marks: f64,
    pub total_marks: f64,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub grade_letter: Option<String>,
}

/// Body of `PATCH /students/{code}/grade`: either a grade or an exam result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GradeEntry {
    Grade(Grade),
    Exam(ExamResult),
}

/// Grades and exam results for one student.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GradeSheet {
    pub grades: Vec<Grade>,
    pub exam_results: Vec<ExamResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_directory_payload_with_missing_fields() {
        let json = r#"{
            "studentCode": "STU2026001",
            "fullName": "Ahmed Hassan",
            "totalFees": 1500.0,
            "amountPaid": 500.0,
            "paymentStatus": "PARTIAL",
            "attendanceRecords": [
                {"dateTime": "2026-02-10T09:30:00", "method": "face", "recordedBy": "system"}
            ]
        }"#;
        let student: StudentRecord = serde_json::from_str(json).unwrap();
        assert_eq!(student.student_code, "STU2026001");
        assert_eq!(student.payment_status, PaymentStatus::Partial);
        assert_eq!(student.attendance_records.len(), 1);
        assert!(student.grades.is_empty());
        assert_eq!(student.balance_due(), 1000.0);
    }

    #[test]
    fn display_name_falls_back_to_code() {
        let student = StudentRecord {
            student_code: "STU1".into(),
            full_name: Some("  ".into()),
            ..Default::default()
        };
        assert_eq!(student.display_name(), "STU1");
    }

    #[test]
    fn query_matches_code_name_and_email() {
        let student = StudentRecord {
            student_code: "STU2026003".into(),
            full_name: Some("Ahmed Ali".into()),
            student_email: Some("a.ali@school.eg".into()),
            ..Default::default()
        };
        assert!(student.matches_query("ahmed"));
        assert!(student.matches_query("stu2026"));
        assert!(student.matches_query("school.eg"));
        assert!(!student.matches_query("mona"));
    }
}
