//! # Configuration Utilities
//!
//! Client configuration loaded from TOML: where the remote steganography
//! service lives and how the editing session admits files.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

use crate::session::capacity::AdmissionPolicy;

/// The only carrier container the service accepts.
pub const DEFAULT_CARRIER_MIME: &str = "image/png";

/// Load a TOML configuration file and deserialize it into the specified type.
///
/// # Arguments
/// - `path`: Path to the TOML configuration file
///
/// # Returns
/// - `Ok(T)`: Successfully loaded and parsed configuration
/// - `Err`: File I/O or parsing error
///
/// # Example
/// ```ignore
/// let config: ClientConfig = load_config("config/client.toml")?;
/// ```
pub fn load_config<T>(path: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    let content = fs::read_to_string(path)?;
    let config: T = toml::from_str(&content)?;
    Ok(config)
}

/// Client configuration loaded from TOML file.
///
/// # Example TOML
///
/// ```toml
/// [service]
/// base_url = "http://127.0.0.1:8080"
/// request_timeout_secs = 60
///
/// [session]
/// carrier_mime = "image/png"
/// admission = "pre-batch"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Remote service connection settings
    pub service: ServiceConfig,
    /// Editing session behaviour
    #[serde(default)]
    pub session: SessionConfig,
}

/// Where and how to reach the remote steganography service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Base URL of the service (e.g., "http://127.0.0.1:8080")
    pub base_url: String,
    /// Upper bound for a single request, in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl ServiceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Session-level policy knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Declared MIME type a carrier image must have
    #[serde(default = "default_carrier_mime")]
    pub carrier_mime: String,
    /// How oversized batches are split into admitted and rejected files
    #[serde(default)]
    pub admission: AdmissionPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            carrier_mime: default_carrier_mime(),
            admission: AdmissionPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Loads client configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &str) -> Result<Self> {
        load_config(path)
    }
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_carrier_mime() -> String {
    DEFAULT_CARRIER_MIME.to_string()
}
