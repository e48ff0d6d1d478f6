//! Per-resource response headers sourced from `headers.json`.
//!
//! A resource directory may carry a `headers.json` whose top-level keys are
//! method names mapping to header dictionaries. Emission is opt-in via the
//! server configuration; with it off the file is never consulted.

use crate::error::ServerError;
use hyper::Method;
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Hop-by-hop headers a fixture is never allowed to set; the HTTP layer
/// owns these.
pub const SUPPRESSED_HEADERS: [&str; 4] = [
    "connection",
    "keep-alive",
    "content-length",
    "transfer-encoding",
];

/// What `headers.json` yielded for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixtureHeaders {
    /// No `headers.json` in the resource directory.
    Missing,
    /// The file parsed but holds no header map for this method.
    Unusable,
    /// A usable header map, already filtered.
    Headers(Vec<(String, String)>),
}

/// Load the header map for `method` from the resource directory.
///
/// `HEAD` falls back to the `GET` map when it has no map of its own. A file
/// that is not valid JSON is a mockup configuration error.
pub fn load_fixture_headers(
    resource_dir: &Path,
    method: &Method,
) -> Result<FixtureHeaders, ServerError> {
    let file = resource_dir.join("headers.json");
    if !file.is_file() {
        return Ok(FixtureHeaders::Missing);
    }
    let raw = fs::read_to_string(&file).map_err(|e| ServerError::Fixture {
        path: file.display().to_string(),
        reason: e.to_string(),
    })?;
    let doc: Value = serde_json::from_str(&raw).map_err(|e| ServerError::Fixture {
        path: file.display().to_string(),
        reason: e.to_string(),
    })?;

    let map = match *method {
        Method::HEAD => doc.get("HEAD").or_else(|| doc.get("GET")),
        _ => doc.get(method.as_str()),
    };
    let Some(Value::Object(map)) = map else {
        return Ok(FixtureHeaders::Unusable);
    };

    let headers = map
        .iter()
        .filter(|(key, _)| {
            !SUPPRESSED_HEADERS.contains(&key.to_ascii_lowercase().as_str())
        })
        .map(|(key, value)| {
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), rendered)
        })
        .collect();
    Ok(FixtureHeaders::Headers(headers))
}
