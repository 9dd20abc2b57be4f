//! Custom template functions
//!
//! Functions and filters available to every template and hook block,
//! independent of the run they are rendered in.

use minijinja::Value;
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;

static HOSTNAME_CACHE: OnceLock<String> = OnceLock::new();

const MAX_REGEX_LEN: usize = 200;

fn invalid(message: impl Into<String>) -> minijinja::Error {
    minijinja::Error::new(minijinja::ErrorKind::InvalidOperation, message.into())
}

/// Get an environment variable
///
/// Usage: `{{ env("PATH") }}`
pub fn env(name: &str) -> String {
    env::var(name).unwrap_or_default()
}

/// Get the operating system name
///
/// Usage: `{{ os() }}`
#[must_use]
pub fn os() -> &'static str {
    settle_core::platform::CURRENT_PLATFORM.os
}

/// Get the system architecture
///
/// Usage: `{{ arch() }}`
#[must_use]
pub fn arch() -> &'static str {
    settle_core::platform::CURRENT_PLATFORM.arch
}

/// Get the system hostname
///
/// Usage: `{{ hostname() }}`
pub fn hostname() -> &'static str {
    HOSTNAME_CACHE.get_or_init(|| {
        hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string())
    })
}

/// Join path components
///
/// Usage: `{{ joinPath(target_dir, "conf.d", "app.conf") }}`
#[must_use]
pub fn join_path(args: &[Value]) -> String {
    let mut path = PathBuf::new();
    for arg in args {
        if let Some(s) = arg.as_str() {
            path.push(s);
        }
    }
    path.to_string_lossy().into_owned()
}

/// Look up an executable in PATH, empty when missing
///
/// Usage: `{% if lookPath("systemctl") %}...{% endif %}`
///
/// # Errors
///
/// Returns error if the name contains anything but alphanumerics, `-` and `_`
pub fn look_path(name: &str) -> Result<String, minijinja::Error> {
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(invalid(format!("Invalid executable name: '{name}'")));
    }

    Ok(which::which(name)
        .ok()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default())
}

/// Always wrap a string in double quotes with proper escaping
///
/// Usage: `{{ some_var | quote }}`
///
/// - `hello` → `"hello"`
/// - `say "hi"` → `"say \"hi\""`
#[must_use]
pub fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Trim whitespace from both ends of a string
///
/// Usage: `{{ " value " | trim }}`
#[must_use]
pub fn trim(value: &str) -> String {
    value.trim().to_string()
}

/// Serialize a value as JSON
///
/// Usage: `{{ ports | toJson }}`
///
/// # Errors
///
/// Returns error if value cannot be serialized
pub fn to_json(value: &Value) -> Result<String, minijinja::Error> {
    serde_json::to_string(value).map_err(|e| invalid(e.to_string()))
}

/// Split a string on a delimiter
///
/// Usage: `{% for part in split(path, "/") %}...{% endfor %}`
pub fn split(text: &str, delimiter: &str) -> Vec<String> {
    text.split(delimiter).map(ToString::to_string).collect()
}

/// Test if a string matches a regular expression
///
/// Usage: `{{ regexMatch(version, "^1\\.") }}`
///
/// # Errors
///
/// Returns error if the pattern is invalid or longer than 200 characters
pub fn regex_match(text: &str, pattern: &str) -> Result<bool, minijinja::Error> {
    if pattern.len() > MAX_REGEX_LEN {
        return Err(invalid(format!(
            "Regex pattern too long ({} chars, max {MAX_REGEX_LEN})",
            pattern.len()
        )));
    }
    let re = regex::RegexBuilder::new(pattern)
        .size_limit(10 * (1 << 20))
        .build()
        .map_err(|e| invalid(format!("Invalid regex pattern: {e}")))?;
    Ok(re.is_match(text))
}
