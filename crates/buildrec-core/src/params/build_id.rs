//! Build ID rule.

use std::sync::LazyLock;

use regex::Regex;

use super::ParamsError;

pub const BUILD_ID_MAX_LEN: usize = 63;

const BUILD_ID_PATTERN: &str = r"^(([A-Za-z0-9][-A-Za-z0-9_.]*)?[A-Za-z0-9])?$";

static BUILD_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(BUILD_ID_PATTERN).expect("build id pattern compiles"));

/// Check a build ID, truncating it to 63 characters first.
///
/// Returns the (possibly truncated) ID.
pub fn validate_build_id(value: &str) -> Result<String, ParamsError> {
    let value = if value.chars().count() > BUILD_ID_MAX_LEN {
        let truncated: String = value.chars().take(BUILD_ID_MAX_LEN).collect();
        tracing::warn!("'{value}' is too long, changing to '{truncated}'");
        truncated
    } else {
        value.to_string()
    };

    if !BUILD_ID_RE.is_match(&value) {
        tracing::error!("'{value}' is not valid build ID");
        return Err(ParamsError::InvalidBuildId {
            value,
            pattern: BUILD_ID_PATTERN,
        });
    }
    Ok(value)
}
