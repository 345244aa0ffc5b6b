//! # Service Messages
//!
//! Responses of the remote steganography service for its three operations:
//! - `upload`: analysis of the carrier image (coded, password, capacity, overhead)
//! - `embed`: outcome of hiding the admitted files in the carrier
//! - `extract`: outcome of recovering hidden files from the carrier
//!
//! The deployed service answers with JSON maps whose values are mostly
//! strings (`"True"`, `"1024"`, `"0.125 sec"`), and the extracted file list
//! arrives as a JSON document nested inside a string. Parsing here accepts
//! those shapes as well as plain JSON booleans, numbers and arrays.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Wire value of `extracted` when the service rejected the password.
pub const WRONG_PASSWORD_FLAG: &str = "Incorrect password provided";

/// A response that could not be turned into one of the message types.
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("field `{field}` has unexpected value `{value}`")]
    InvalidField { field: &'static str, value: String },
}

/// Analysis of an uploaded carrier image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadResponse {
    /// The carrier already holds an embedded payload
    pub coded_already: bool,
    /// The embedded payload is password protected
    pub password_protected: bool,
    /// Payload bytes the carrier can hold
    pub capacity_bytes: u64,
    /// Fixed cost charged per embedded file
    pub overhead_per_file_bytes: u64,
}

/// Outcome of an embed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedResponse {
    pub embedded_count: u64,
    pub elapsed: Option<Duration>,
    /// Where the service published the new carrier (thumbnail link)
    pub artifact: Option<String>,
    pub filename: Option<String>,
}

/// Domain-level result of an extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractStatus {
    Succeeded,
    NotCoded,
    WrongPassword,
}

impl ExtractStatus {
    /// Maps the service's `extracted` value. Unknown values read as not coded.
    pub fn from_wire(value: &str) -> Self {
        match value.trim() {
            "True" | "true" | "succeeded" => ExtractStatus::Succeeded,
            WRONG_PASSWORD_FLAG | "wrong-password" => ExtractStatus::WrongPassword,
            _ => ExtractStatus::NotCoded,
        }
    }
}

/// Outcome of an extract request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractResponse {
    pub status: ExtractStatus,
    pub elapsed: Option<Duration>,
    pub files: Vec<ExtractedFile>,
}

/// How the presentation layer should depict an extracted file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Image,
    Video,
    Text,
    Audio,
    Pdf,
    Archive,
    Generic,
}

/// One file recovered from the carrier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedFile {
    pub name: String,
    #[serde(rename = "type", alias = "mimeType", alias = "mime_type")]
    pub mime_type: String,
    pub path: String,
    #[serde(default, deserialize_with = "optional_flag")]
    pub coded: Option<bool>,
}

impl ExtractedFile {
    pub fn category(&self) -> FileCategory {
        let mime = self.mime_type.as_str();
        if mime.starts_with("image/") {
            FileCategory::Image
        } else if mime.starts_with("video/") {
            FileCategory::Video
        } else if mime.starts_with("text/") {
            FileCategory::Text
        } else if mime.starts_with("audio/") {
            FileCategory::Audio
        } else if mime.starts_with("application/pdf") {
            FileCategory::Pdf
        } else if mime.starts_with("application/x-tar") {
            FileCategory::Archive
        } else {
            FileCategory::Generic
        }
    }

    /// Whether the file is itself a carrier with hidden content.
    ///
    /// Only PNG files can carry a payload, so the flag is ignored for anything else.
    pub fn is_coded_carrier(&self) -> bool {
        self.mime_type == "image/png" && self.coded == Some(true)
    }
}

impl UploadResponse {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, MessageError> {
        #[derive(Deserialize)]
        struct Raw {
            coded: Loose,
            #[serde(default)]
            password: Option<Loose>,
            capacity: Loose,
            overhead: Loose,
        }

        let raw: Raw = serde_json::from_slice(bytes)?;
        Ok(Self {
            coded_already: raw.coded.flag("coded")?,
            password_protected: match raw.password {
                Some(value) => value.flag("password")?,
                None => false,
            },
            capacity_bytes: raw.capacity.count("capacity")?,
            overhead_per_file_bytes: raw.overhead.count("overhead")?,
        })
    }
}

impl EmbedResponse {
    /// Parses an embed response for a request that carried `submitted` files.
    ///
    /// A bare `"True"` flag counts every submitted file; `"False"` is rejected.
    pub fn from_slice(bytes: &[u8], submitted: usize) -> Result<Self, MessageError> {
        #[derive(Deserialize)]
        struct Raw {
            embedded: Loose,
            #[serde(default)]
            time: Option<String>,
            #[serde(default)]
            thumbnail: Option<String>,
            #[serde(default)]
            filename: Option<String>,
        }

        let raw: Raw = serde_json::from_slice(bytes)?;
        let embedded_count = match &raw.embedded {
            Loose::Number(count) => *count,
            Loose::Bool(true) => submitted as u64,
            Loose::Text(text) if text.trim().parse::<u64>().is_ok() => raw.embedded.count("embedded")?,
            other => {
                if other.flag("embedded")? {
                    submitted as u64
                } else {
                    return Err(MessageError::InvalidField {
                        field: "embedded",
                        value: other.to_string(),
                    });
                }
            }
        };

        Ok(Self {
            embedded_count,
            elapsed: raw.time.as_deref().and_then(parse_elapsed),
            artifact: raw.thumbnail,
            filename: raw.filename,
        })
    }
}

impl ExtractResponse {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, MessageError> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum FileList {
            Listed(Vec<ExtractedFile>),
            Encoded(String),
        }

        #[derive(Deserialize)]
        struct Raw {
            extracted: String,
            #[serde(default)]
            time: Option<String>,
            #[serde(default)]
            files: Option<FileList>,
        }

        let raw: Raw = serde_json::from_slice(bytes)?;
        let files = match raw.files {
            Some(FileList::Listed(files)) => files,
            Some(FileList::Encoded(text)) if text.trim().is_empty() => Vec::new(),
            Some(FileList::Encoded(text)) => serde_json::from_str(&text)?,
            None => Vec::new(),
        };

        Ok(Self {
            status: ExtractStatus::from_wire(&raw.extracted),
            elapsed: raw.time.as_deref().and_then(parse_elapsed),
            files,
        })
    }
}

/// Parses a duration such as `"0.125 sec"` or `"2"` (seconds).
pub fn parse_elapsed(text: &str) -> Option<Duration> {
    let seconds: f64 = text.trim().trim_end_matches("sec").trim().parse().ok()?;
    if seconds.is_finite() && seconds >= 0.0 {
        Some(Duration::from_secs_f64(seconds))
    } else {
        None
    }
}

/// A JSON value that may arrive as a native type or as a string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Loose {
    Bool(bool),
    Number(u64),
    Text(String),
}

impl Loose {
    fn flag(&self, field: &'static str) -> Result<bool, MessageError> {
        match self {
            Loose::Bool(value) => Ok(*value),
            Loose::Number(value) => Ok(*value != 0),
            Loose::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                _ => Err(self.invalid(field)),
            },
        }
    }

    fn count(&self, field: &'static str) -> Result<u64, MessageError> {
        match self {
            Loose::Number(value) => Ok(*value),
            Loose::Text(text) => text.trim().parse().map_err(|_| self.invalid(field)),
            Loose::Bool(_) => Err(self.invalid(field)),
        }
    }

    fn invalid(&self, field: &'static str) -> MessageError {
        MessageError::InvalidField {
            field,
            value: self.to_string(),
        }
    }
}

impl std::fmt::Display for Loose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Loose::Bool(value) => write!(f, "{}", value),
            Loose::Number(value) => write!(f, "{}", value),
            Loose::Text(text) => f.write_str(text),
        }
    }
}

fn optional_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: Option<Loose> = Option::deserialize(deserializer)?;
    value
        .map(|v| v.flag("coded"))
        .transpose()
        .map_err(serde::de::Error::custom)
}
