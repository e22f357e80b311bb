//! Application configuration.
//!
//! Everything the app needs from its environment is collected here once and
//! handed to `App` explicitly. A missing API key is a valid configuration:
//! chat keeps working and answers with a setup hint instead.

use crate::gemini::{default_candidates, CandidateModel};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_ATTEMPT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_USER_ID: &str = "local";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_key: Option<String>,
    pub database_path: PathBuf,
    pub log_dir: PathBuf,
    pub attempt_timeout: Duration,
    pub candidates: Vec<CandidateModel>,
    pub user_id: String,
}

fn get_data_dir(lookup: &impl Fn(&str) -> Option<String>) -> PathBuf {
    let home = lookup("HOME").unwrap_or_else(|| "/tmp".to_string());
    PathBuf::from(home).join(".viona")
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl AppConfig {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from any key/value source.
    ///
    /// Unparseable values fall back to their defaults rather than failing.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = get_data_dir(&lookup);

        let api_key = non_blank(lookup("GEMINI_API_KEY")).or_else(|| non_blank(lookup("VITE_GEMINI_API_KEY")));

        let database_path = non_blank(lookup("VIONA_DB_PATH"))
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("viona.db"));

        let log_dir = non_blank(lookup("VIONA_LOG_DIR"))
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("logs"));

        let attempt_timeout = non_blank(lookup("VIONA_ATTEMPT_TIMEOUT_SECS"))
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_ATTEMPT_TIMEOUT_SECS));

        let candidates = non_blank(lookup("VIONA_MODELS"))
            .map(|list| list.split(',').filter_map(CandidateModel::parse).collect::<Vec<_>>())
            .filter(|models| !models.is_empty())
            .unwrap_or_else(default_candidates);

        let user_id = non_blank(lookup("VIONA_USER_ID")).unwrap_or_else(|| DEFAULT_USER_ID.to_string());

        Self {
            api_key,
            database_path,
            log_dir,
            attempt_timeout,
            candidates,
            user_id,
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_environment() {
        let config = AppConfig::default();
        assert!(!config.has_api_key());
        assert_eq!(config.database_path, PathBuf::from("/tmp/.viona/viona.db"));
        assert_eq!(config.log_dir, PathBuf::from("/tmp/.viona/logs"));
        assert_eq!(config.attempt_timeout, Duration::from_secs(DEFAULT_ATTEMPT_TIMEOUT_SECS));
        assert_eq!(config.candidates, default_candidates());
        assert_eq!(config.user_id, DEFAULT_USER_ID);
    }

    #[test]
    fn test_reads_overrides() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("HOME", "/home/ada"),
            ("GEMINI_API_KEY", " abc "),
            ("VIONA_ATTEMPT_TIMEOUT_SECS", "5"),
            ("VIONA_MODELS", "gemini-1.5-flash@v1, bogus"),
            ("VIONA_USER_ID", "ada"),
        ]));

        assert_eq!(config.api_key.as_deref(), Some("abc"));
        assert_eq!(config.database_path, PathBuf::from("/home/ada/.viona/viona.db"));
        assert_eq!(config.attempt_timeout, Duration::from_secs(5));
        assert_eq!(config.candidates, vec![CandidateModel::new("gemini-1.5-flash", "v1")]);
        assert_eq!(config.user_id, "ada");
    }

    #[test]
    fn test_blank_key_counts_as_missing() {
        let config = AppConfig::from_lookup(lookup_from(&[("GEMINI_API_KEY", "   ")]));
        assert!(!config.has_api_key());

        let legacy = AppConfig::from_lookup(lookup_from(&[("VITE_GEMINI_API_KEY", "xyz")]));
        assert_eq!(legacy.api_key.as_deref(), Some("xyz"));
    }

    #[test]
    fn test_bad_values_fall_back() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("VIONA_ATTEMPT_TIMEOUT_SECS", "soon"),
            ("VIONA_MODELS", "nope"),
        ]));
        assert_eq!(config.attempt_timeout, Duration::from_secs(DEFAULT_ATTEMPT_TIMEOUT_SECS));
        assert_eq!(config.candidates, default_candidates());
    }
}
