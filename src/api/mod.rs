//! Clients for the external collaborators: the directory/attendance backend,
//! its auth endpoint, and the face recognition service.

pub mod attendance;
pub mod auth;
pub mod client;
pub mod directory;
mod error;
pub mod recognition;

pub use attendance::AttendanceService;
pub use auth::{CredentialProvider, CredentialStore};
pub use client::HttpBackend;
pub use directory::{search_students, DirectoryService};
pub use error::ApiError;
pub use recognition::{BestMatch, RecognitionClient, RecognitionReply, RecognitionService};
