//! Request delay injection, fixed or per-resource via `time.json`.

use hyper::Method;
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Computes the artificial latency applied before a request is served.
#[derive(Debug, Clone)]
pub struct ResponseTimer {
    default_delay: Duration,
    per_resource: bool,
}

impl ResponseTimer {
    pub fn new(default_secs: f64, per_resource: bool) -> Self {
        Self {
            default_delay: duration_from_secs(default_secs).unwrap_or(Duration::ZERO),
            per_resource,
        }
    }

    /// Delay for one request. In per-resource mode the resource directory's
    /// `time.json` is consulted for a `<METHOD>_Time` value; anything
    /// missing or unusable falls back to the fixed default.
    pub fn delay_for(&self, method: &Method, resource_dir: &Path) -> Duration {
        if !self.per_resource {
            return self.default_delay;
        }
        let key = match *method {
            Method::GET => "GET_Time",
            Method::HEAD => "HEAD_Time",
            Method::POST => "POST_Time",
            Method::PATCH => "PATCH_Time",
            Method::DELETE => "DELETE_Time",
            _ => return self.default_delay,
        };
        self.read_time(resource_dir, key).unwrap_or(self.default_delay)
    }

    /// Sleep out the computed delay, if any.
    pub async fn apply(&self, method: &Method, resource_dir: &Path) {
        let delay = self.delay_for(method, resource_dir);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    fn read_time(&self, resource_dir: &Path, key: &str) -> Option<Duration> {
        let file = resource_dir.join("time.json");
        let raw = fs::read_to_string(&file).ok()?;
        let doc: Value = match serde_json::from_str(&raw) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(file = %file.display(), error = %e, "unparseable time.json, using default delay");
                return None;
            }
        };
        let secs = match doc.get(key)? {
            Value::Number(n) => n.as_f64()?,
            Value::String(s) => match s.parse::<f64>() {
                Ok(secs) => secs,
                Err(_) => {
                    warn!(file = %file.display(), key, value = %s, "non-numeric delay, using default");
                    return None;
                }
            },
            other => {
                warn!(file = %file.display(), key, ?other, "non-numeric delay, using default");
                return None;
            }
        };
        match duration_from_secs(secs) {
            Some(delay) => Some(delay),
            None => {
                warn!(file = %file.display(), key, secs, "delay out of range, using default");
                None
            }
        }
    }
}

/// `Duration::from_secs_f64` panics on negative, NaN, and overflowing
/// inputs, so gate it.
fn duration_from_secs(secs: f64) -> Option<Duration> {
    if secs.is_finite() && secs >= 0.0 {
        Duration::try_from_secs_f64(secs).ok()
    } else {
        None
    }
}
