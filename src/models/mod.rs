mod detection;
mod student;

pub use detection::{
    AttendanceMethod, Detection, DetectionSource, Message, ResolvedStudent, ScanMode,
};
pub use student::{
    AttendanceRecord, ExamResult, Grade, GradeEntry, GradeSheet, PaymentStatus, StudentPage,
    StudentRecord,
};
