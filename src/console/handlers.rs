use chrono::Local;
use serde_json::json;

use crate::{
    api::{search_students, ApiError, DirectoryService},
    models::{DetectionSource, Grade, GradeEntry},
    scan::{Outcome, Viewport},
    AppState,
};

use super::{
    commands::{Command, HELP},
    render,
};

const SCANNER_VIEWPORT: &str = "console-scanner";
const FIND_PAGE_SIZE: u32 = 100;

fn api_error(err: ApiError) -> String {
    if err.is_auth() {
        "Session expired. Please login again.".into()
    } else {
        err.to_string()
    }
}

fn require_session(state: &AppState) -> Result<(), String> {
    if state.credentials.is_authenticated() {
        Ok(())
    } else {
        Err("Please login first".into())
    }
}

/// Channels and search need the scan page; a navigation or expiry closes it.
async fn ensure_mounted(state: &AppState) {
    state.scan.remount().await;
}

pub async fn execute(state: &AppState, command: Command) -> Result<String, String> {
    match command {
        Command::Help => Ok(HELP.to_string()),
        Command::Quit => Ok("Bye".into()),
        Command::Login { email, password } => login(state, &email, &password).await,
        Command::Remember(remember) => remember_login(state, remember),
        Command::Logout => logout(state).await,
        command => {
            require_session(state)?;
            scan_command(state, command).await
        }
    }
}

async fn scan_command(state: &AppState, command: Command) -> Result<String, String> {
    match command {
        Command::Mode(enabled) => {
            let mode = match enabled {
                Some(enabled) => state.scan.set_attendance_mode(enabled).await,
                None => state.scan.toggle_attendance_mode().await,
            };
            Ok(format!("Mode: {}", mode.as_str()))
        }
        Command::Search(query) => {
            ensure_mounted(state).await;
            match state.scan.search(&query).await {
                Outcome::Busy => Err("Another scan is being resolved, try again".into()),
                // Banners arrive as events.
                _ => Ok(String::new()),
            }
        }
        Command::Find(query) => {
            let page = search_students(&state.backend, &query, 0, FIND_PAGE_SIZE)
                .await
                .map_err(api_error)?;
            Ok(render::matches(&query, &page.content))
        }
        Command::Barcode => {
            ensure_mounted(state).await;
            let was_active = state.scan.is_active(DetectionSource::Barcode).await;
            let active = state
                .scan
                .toggle_barcode(Viewport::new(SCANNER_VIEWPORT))
                .await;
            Ok(match (was_active, active) {
                (_, true) => "Barcode scanning on. Scan a code or type it and press enter.".into(),
                (true, false) => "Barcode scanning off".into(),
                (false, false) => String::new(),
            })
        }
        Command::Face => {
            ensure_mounted(state).await;
            let was_active = state.scan.is_active(DetectionSource::Face).await;
            let active = state.scan.toggle_face().await;
            Ok(match (was_active, active) {
                (_, true) => "Face scanning on".into(),
                (true, false) => "Face scanning off".into(),
                (false, false) => String::new(),
            })
        }
        Command::Retry => {
            ensure_mounted(state).await;
            if !state.scan.retry_available().await {
                return Err("Retry is available in attendance mode while face scanning is off".into());
            }
            if state.scan.retry_face().await {
                Ok("Face scanning restarted for the next person".into())
            } else {
                Ok(String::new())
            }
        }
        Command::Status => {
            let snapshot = state.scan.snapshot().await;
            let retry = state.scan.retry_available().await;
            Ok(render::snapshot(&snapshot, retry))
        }
        Command::Back => Ok(if state.scan.remount().await {
            "Scan page ready".into()
        } else {
            "Scan page already open".into()
        }),
        Command::Student(code) => student_detail(state, &code).await,
        Command::History { code, from, to } => {
            let records = state
                .backend
                .attendance_history(&code, from, to)
                .await
                .map_err(api_error)?;
            Ok(render::history(&code, &records))
        }
        Command::Grades(code) => {
            let sheet = state
                .backend
                .student_grades(&code)
                .await
                .map_err(api_error)?;
            Ok(render::grades(&code, &sheet))
        }
        Command::AddGrade {
            code,
            subject,
            score,
            max_score,
        } => {
            let entry = GradeEntry::Grade(Grade {
                subject,
                score,
                max_score,
                date: Some(Local::now().date_naive()),
                comment: None,
            });
            let record = state
                .backend
                .add_grade(&code, &entry)
                .await
                .map_err(api_error)?;
            Ok(format!(
                "Grade added for {} ({} grades)",
                record.display_name(),
                record.grades.len()
            ))
        }
        Command::Note { code, text } => {
            let record = state
                .backend
                .update_student(&code, &json!({ "notes": text }))
                .await
                .map_err(api_error)?;
            Ok(format!("Notes updated for {}", record.display_name()))
        }
        Command::Help
        | Command::Quit
        | Command::Login { .. }
        | Command::Logout
        | Command::Remember(_) => {
            Err("unexpected command".into())
        }
    }
}

async fn login(state: &AppState, email: &str, password: &str) -> Result<String, String> {
    let token = state
        .backend
        .login(email, password)
        .await
        .map_err(|e| e.to_string())?;
    let remember = state.settings.effective().remember_login;
    state
        .credentials
        .establish(token, remember)
        .map_err(|e| e.to_string())?;
    // Leaves an open page, with its mode and channels, as it is.
    ensure_mounted(state).await;
    Ok(format!("Logged in as {}", email.trim().to_lowercase()))
}

/// Shows or changes whether the next login is kept across restarts.
fn remember_login(state: &AppState, remember: Option<bool>) -> Result<String, String> {
    if let Some(remember) = remember {
        state
            .settings
            .update(|settings| settings.remember_login = remember)
            .map_err(|e| e.to_string())?;
    }
    Ok(if state.settings.stored().remember_login {
        "Logins are remembered across restarts".into()
    } else {
        "Logins last until the console exits".into()
    })
}

async fn logout(state: &AppState) -> Result<String, String> {
    state.scan.unmount().await;
    state.credentials.clear().map_err(|e| e.to_string())?;
    Ok("Logged out".into())
}

pub async fn student_detail(state: &AppState, code: &str) -> Result<String, String> {
    let record = state
        .backend
        .lookup_by_code(code)
        .await
        .map_err(api_error)?
        .ok_or_else(|| format!("No student found with code {code}"))?;

    let sheet = match state.backend.student_grades(code).await {
        Ok(sheet) => Some(sheet),
        Err(err) => {
            log::warn!("Grades unavailable for {code}: {err}");
            None
        }
    };
    Ok(render::student(&record, sheet.as_ref()))
}

/// Routes a non-command line to the barcode channel when it is listening.
pub async fn feed_scanner(state: &AppState, raw: &str) -> Result<String, String> {
    if !state.scan.is_active(DetectionSource::Barcode).await {
        return Err(format!("Unknown command '{raw}'. Type help for commands."));
    }
    if state.wedge.push_line(raw) {
        Ok(String::new())
    } else {
        Err("Barcode scanner is not listening".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::SettingsStore;

    #[tokio::test]
    async fn remember_setting_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let (state, _events) = AppState::build(dir.path()).unwrap();

        let reply = execute(&state, Command::Remember(Some(false))).await.unwrap();
        assert!(reply.contains("until the console exits"));

        let reloaded = SettingsStore::new(dir.path().join("settings.json")).unwrap();
        assert!(!reloaded.stored().remember_login);

        let reply = execute(&state, Command::Remember(None)).await.unwrap();
        assert!(reply.contains("until the console exits"));
    }

    #[tokio::test]
    async fn scan_commands_require_login() {
        let dir = tempfile::tempdir().unwrap();
        let (state, _events) = AppState::build(dir.path()).unwrap();

        let err = execute(&state, Command::Back).await.unwrap_err();
        assert_eq!(err, "Please login first");
    }
}
