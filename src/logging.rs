//! Structured logging module for VIONA
//!
//! Events go through `tracing` to stderr and to a daily file in the
//! configured log directory, tagged with a category:
//! - CHAT: Session lifecycle and turns
//! - CLASSIFIER: Tone and smart-command decisions
//! - DISPATCH: Model candidate attempts
//! - STORE: Records created as side effects of chat
//! - ERROR: Errors

use crate::config::AppConfig;
use chrono::{Local, Utc};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER: &str = "viona=info,viona_lib=info";
const LOG_RETENTION_DAYS: i64 = 7;

/// Log categories for structured logging
#[derive(Debug, Clone, Copy)]
pub enum LogCategory {
    Chat,
    Classifier,
    Dispatch,
    Store,
    Error,
}

impl LogCategory {
    fn as_str(&self) -> &'static str {
        match self {
            LogCategory::Chat => "CHAT",
            LogCategory::Classifier => "CLASSIFIER",
            LogCategory::Dispatch => "DISPATCH",
            LogCategory::Store => "STORE",
            LogCategory::Error => "ERROR",
        }
    }
}

/// Today's log file inside `log_dir`
fn get_log_file_path(log_dir: &Path) -> PathBuf {
    let today = Local::now().format("%Y-%m-%d").to_string();
    log_dir.join(format!("viona-{}.log", today))
}

/// Install the global subscriber: stderr plus an append-only daily file.
///
/// Returns the file path in use. If the file cannot be opened, console
/// logging is still installed and the error is returned. Calling this again
/// after a subscriber is set is a no-op.
pub fn init_logging(config: &AppConfig) -> std::io::Result<PathBuf> {
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let console = fmt::layer().with_writer(std::io::stderr).with_target(false);

    let log_path = get_log_file_path(&config.log_dir);
    let file = fs::create_dir_all(&config.log_dir)
        .and_then(|_| OpenOptions::new().create(true).append(true).open(&log_path));

    match file {
        Ok(file) => {
            let file_layer = fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(false);
            let _ = tracing_subscriber::registry()
                .with(filter())
                .with(console)
                .with(file_layer)
                .try_init();
            log(LogCategory::Chat, None, "VIONA logging initialized");
            Ok(log_path)
        }
        Err(e) => {
            let _ = tracing_subscriber::registry().with(filter()).with(console).try_init();
            log_error(None, &format!("Log file unavailable at {}: {}", log_path.display(), e));
            Err(e)
        }
    }
}

fn short_id(id: &str) -> &str {
    // ids are ASCII uuids; fall back to the whole id for anything else
    id.get(..8).unwrap_or(id)
}

/// Log a message with category and optional session context
pub fn log(category: LogCategory, session_id: Option<&str>, message: &str) {
    let session = session_id.map(short_id).unwrap_or("-");
    match category {
        LogCategory::Error => {
            tracing::error!(category = category.as_str(), session, "{}", message)
        }
        _ => tracing::info!(category = category.as_str(), session, "{}", message),
    }
}

/// Log a session lifecycle event (created, titled, turn saved)
pub fn log_chat(session_id: Option<&str>, message: &str) {
    log(LogCategory::Chat, session_id, message);
}

/// Log a classification result
pub fn log_classifier(session_id: Option<&str>, message: &str) {
    log(LogCategory::Classifier, session_id, message);
}

/// Log a dispatch attempt or outcome
pub fn log_dispatch(session_id: Option<&str>, message: &str) {
    log(LogCategory::Dispatch, session_id, message);
}

/// Log a record written because of a smart command
pub fn log_store(session_id: Option<&str>, message: &str) {
    log(LogCategory::Store, session_id, message);
}

/// Log an error
pub fn log_error(session_id: Option<&str>, message: &str) {
    log(LogCategory::Error, session_id, message);
}

/// Clean up old log files (keep last 7 days)
pub fn cleanup_old_logs(log_dir: &Path) -> std::io::Result<usize> {
    let mut deleted = 0;

    if !log_dir.exists() {
        return Ok(0);
    }

    let cutoff = Utc::now() - chrono::Duration::days(LOG_RETENTION_DAYS);

    for entry in fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();

        let is_log = path.extension().is_some_and(|ext| ext == "log");
        if !is_log {
            continue;
        }

        if let Ok(modified) = entry.metadata().and_then(|m| m.modified()) {
            let modified_time: chrono::DateTime<Utc> = modified.into();
            if modified_time < cutoff && fs::remove_file(&path).is_ok() {
                deleted += 1;
            }
        }
    }

    Ok(deleted)
}

/// Run `cleanup_old_logs`, reporting failures instead of returning them.
pub fn prune_old_logs(log_dir: &Path) -> usize {
    match cleanup_old_logs(log_dir) {
        Ok(deleted) => deleted,
        Err(e) => {
            log_error(
                None,
                &format!("Failed to clean up logs in {}: {}", log_dir.display(), e),
            );
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_name_is_dated() {
        let path = get_log_file_path(Path::new("/var/log/viona"));
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("viona-"));
        assert!(name.ends_with(".log"));
        assert_eq!(name.len(), "viona-2026-01-01.log".len());
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("0123456789abcdef"), "01234567");
        assert_eq!(short_id("abc"), "abc");
    }

    #[test]
    fn test_cleanup_keeps_recent_logs() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("viona-today.log"), "line\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "keep").unwrap();

        assert_eq!(cleanup_old_logs(dir.path()).unwrap(), 0);
        assert!(dir.path().join("viona-today.log").exists());
        assert_eq!(cleanup_old_logs(&dir.path().join("missing")).unwrap(), 0);
    }

    #[test]
    fn test_prune_reports_unreadable_dir() {
        let dir = tempfile::tempdir().unwrap();
        let not_a_dir = dir.path().join("viona.log");
        fs::write(&not_a_dir, "line\n").unwrap();

        assert!(cleanup_old_logs(&not_a_dir).is_err());
        assert_eq!(prune_old_logs(&not_a_dir), 0);
        assert_eq!(prune_old_logs(dir.path()), 0);
        assert!(not_a_dir.exists());
    }

    #[test]
    fn test_init_creates_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            log_dir: dir.path().join("logs"),
            ..AppConfig::default()
        };
        let path = init_logging(&config).unwrap();
        assert!(path.exists());
    }
}
