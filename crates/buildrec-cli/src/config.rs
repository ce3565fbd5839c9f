//! CLI settings read from the environment.

use std::path::PathBuf;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct CliConfig {
    /// `BUILDREC_LOG_FORMAT`: `json` for JSON log lines.
    pub log_format: LogFormat,
    /// `BUILDREC_BUILD_JSON_DIR`: plugin template dir when neither the flag
    /// nor the user params name one.
    pub build_json_dir: Option<PathBuf>,
}

impl CliConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let log_format = match lookup("BUILDREC_LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };
        let build_json_dir = lookup("BUILDREC_BUILD_JSON_DIR")
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from);
        Self {
            log_format,
            build_json_dir,
        }
    }
}
