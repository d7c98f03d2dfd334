use std::{collections::BTreeMap, fmt::Write as _};

use chrono::Local;

use crate::{
    models::{AttendanceRecord, GradeSheet, Message, StudentRecord},
    scan::ScanSnapshot,
};

pub fn message_line(message: &Message) -> String {
    format!(
        "[{}] {}",
        message.at.with_timezone(&Local).format("%H:%M:%S"),
        message.text
    )
}

pub fn snapshot(snapshot: &ScanSnapshot, retry_available: bool) -> String {
    let channels = if snapshot.active_channels.is_empty() {
        "none".to_string()
    } else {
        snapshot
            .active_channels
            .iter()
            .map(|source| format!("{source:?}").to_lowercase())
            .collect::<Vec<_>>()
            .join(", ")
    };

    let mut out = String::new();
    let _ = writeln!(out, "mode:      {}", snapshot.mode.as_str());
    let _ = writeln!(out, "scanning:  {channels}");
    if let Some(identity) = &snapshot.last_recognized_identity {
        let _ = writeln!(out, "last face: {identity}");
    }
    if snapshot.busy {
        let _ = writeln!(out, "resolving...");
    }
    if let Some(status) = &snapshot.status {
        let _ = writeln!(out, "status:    {}", status.text);
    }
    if let Some(error) = &snapshot.error {
        let _ = writeln!(out, "error:     {}", error.text);
    }
    if retry_available {
        let _ = writeln!(out, "type `retry` to scan the next person");
    }
    out.trim_end().to_string()
}

fn money(amount: f64, currency: Option<&str>) -> String {
    format!("{amount:.2} {}", currency.unwrap_or("EGP"))
}

/// Attendance totals per recording method.
fn attendance_counts(records: &[AttendanceRecord]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for record in records {
        let method = record.method.clone().unwrap_or_else(|| "manual".into());
        *counts.entry(method.to_lowercase()).or_insert(0) += 1;
    }
    counts
}

pub fn student(record: &StudentRecord, sheet: Option<&GradeSheet>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} ({})", record.display_name(), record.student_code);

    let class = [record.class_name.as_deref(), record.division.as_deref()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");
    if !class.is_empty() {
        let _ = writeln!(out, "  class:    {class}");
    }
    if let Some(email) = record.contact_email() {
        let _ = writeln!(out, "  email:    {email}");
    }
    if let Some(phone) = &record.guardian_phone_primary {
        let _ = writeln!(out, "  guardian: {phone}");
    }
    let currency = record.currency.as_deref();
    let _ = writeln!(
        out,
        "  fees:     {} paid of {} ({:?}, balance {})",
        money(record.amount_paid, currency),
        money(record.total_fees, currency),
        record.payment_status,
        money(record.balance_due(), currency)
    );
    if !record.active {
        let _ = writeln!(out, "  inactive");
    }

    let counts = attendance_counts(&record.attendance_records);
    let total: usize = counts.values().sum();
    let breakdown = counts
        .iter()
        .map(|(method, count)| format!("{method} {count}"))
        .collect::<Vec<_>>()
        .join(", ");
    if total == 0 {
        let _ = writeln!(out, "  attendance: none recorded");
    } else {
        let _ = writeln!(out, "  attendance: {total} ({breakdown})");
    }

    let (grades_len, exams_len) = match sheet {
        Some(sheet) => (sheet.grades.len(), sheet.exam_results.len()),
        None => (record.grades.len(), record.exam_results.len()),
    };
    let _ = writeln!(out, "  grades:   {grades_len}, exams: {exams_len}");
    out.trim_end().to_string()
}

pub fn matches(query: &str, students: &[StudentRecord]) -> String {
    if students.is_empty() {
        return format!("No students match '{query}'");
    }

    let mut out = String::new();
    for student in students {
        let _ = writeln!(
            out,
            "  {:<12} {:<28} {}",
            student.student_code,
            student.display_name(),
            student.class_name.as_deref().unwrap_or("")
        );
    }
    out.trim_end().to_string()
}

pub fn history(code: &str, records: &[AttendanceRecord]) -> String {
    if records.is_empty() {
        return format!("No attendance recorded for {code}");
    }

    let mut sorted: Vec<&AttendanceRecord> = records.iter().collect();
    sorted.sort_by_key(|record| std::cmp::Reverse(record.date_time));

    let mut out = format!("Attendance for {code} ({}):\n", records.len());
    for record in sorted {
        let _ = writeln!(
            out,
            "  {}  {:<8} {}",
            record.date_time.format("%Y-%m-%d %H:%M"),
            record.method.as_deref().unwrap_or("manual"),
            record.recorded_by.as_deref().unwrap_or("")
        );
    }
    out.trim_end().to_string()
}

pub fn grades(code: &str, sheet: &GradeSheet) -> String {
    if sheet.grades.is_empty() && sheet.exam_results.is_empty() {
        return format!("No grades recorded for {code}");
    }

    let mut out = format!("Grades for {code}:\n");
    for grade in &sheet.grades {
        let _ = write!(out, "  {:<16} {}/{}", grade.subject, grade.score, grade.max_score);
        if let Some(comment) = &grade.comment {
            let _ = write!(out, "  {comment}");
        }
        out.push('\n');
    }
    for exam in &sheet.exam_results {
        let _ = write!(
            out,
            "  {:<16} {}/{}",
            exam.exam_name, exam.obtained_marks, exam.total_marks
        );
        if let Some(letter) = &exam.grade_letter {
            let _ = write!(out, "  {letter}");
        }
        out.push('\n');
    }
    out.trim_end().to_string()
}
