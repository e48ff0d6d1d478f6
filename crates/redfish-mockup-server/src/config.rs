//! Server configuration and startup validation.

use std::path::PathBuf;

/// Certificate material for HTTPS serving.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

/// Everything the server needs to run, assembled from the command line.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Root of the mockup tree being served.
    pub mock_dir: PathBuf,
    /// Tree is rooted at the service root instead of containing `redfish/v1/`.
    pub short_form: bool,
    /// Emit per-resource `headers.json` headers.
    pub emit_headers: bool,
    /// Fixed artificial delay, seconds.
    pub default_delay_secs: f64,
    /// Consult per-resource `time.json` files for the delay.
    pub per_resource_delay: bool,
    /// Serve canned ETags on the well-known test resources.
    pub test_etag: bool,
    pub tls: Option<TlsConfig>,
    /// Answer SSDP discovery searches.
    pub ssdp: bool,
}

impl ServerConfig {
    /// Check that the mockup directory matches the declared form before the
    /// listener comes up. A tree of the wrong shape would serve nothing but
    /// 404s, which is always a misconfiguration.
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !self.mock_dir.is_dir() {
            anyhow::bail!(
                "Mockup directory '{}' does not exist or is not a directory",
                self.mock_dir.display()
            );
        }

        if self.short_form {
            if !self.mock_dir.join("index.json").is_file() {
                anyhow::bail!(
                    "Mockup directory '{}' has no index.json at its root. \
                     Short-form mockups must start at the service root document",
                    self.mock_dir.display()
                );
            }
        } else if !self.mock_dir.join("redfish").is_dir() {
            anyhow::bail!(
                "Mockup directory '{}' has no 'redfish' directory. \
                 Pass --short-form for trees rooted at the service root",
                self.mock_dir.display()
            );
        }

        if !self.default_delay_secs.is_finite() || self.default_delay_secs < 0.0 {
            anyhow::bail!(
                "Response delay must be a non-negative number of seconds, got {}",
                self.default_delay_secs
            );
        }

        Ok(())
    }

    /// URL scheme the server answers on.
    pub fn scheme(&self) -> &'static str {
        if self.tls.is_some() {
            "https"
        } else {
            "http"
        }
    }
}
