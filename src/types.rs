// src/types.rs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Behaviour when a render request arrives while every renderer slot is busy.
///
/// - `Queue`: park the request in a bounded FIFO queue and admit it when a
///   slot frees up (default behaviour). Requests beyond the queue depth are
///   rejected.
/// - `Reject`: refuse the request immediately with an overload signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverloadPolicy {
    Queue,
    Reject,
}

impl Default for OverloadPolicy {
    fn default() -> Self {
        OverloadPolicy::Queue
    }
}

impl FromStr for OverloadPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "queue" => Ok(OverloadPolicy::Queue),
            "reject" => Ok(OverloadPolicy::Reject),
            other => Err(format!(
                "invalid overload_policy: {other} (expected \"queue\" or \"reject\")"
            )),
        }
    }
}

/// Image formats the renderer can be asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Png,
    #[serde(alias = "jpg")]
    Jpeg,
    /// Freestyle outline export.
    Svg,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 3] = [OutputFormat::Png, OutputFormat::Jpeg, OutputFormat::Svg];

    /// Name used on the wire and in renderer arguments.
    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Svg => "svg",
        }
    }

    /// File extension the entry script writes.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Svg => "svg",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            OutputFormat::Png => "image/png",
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Svg => "image/svg+xml",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "png" => Ok(OutputFormat::Png),
            "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
            "svg" => Ok(OutputFormat::Svg),
            other => Err(format!(
                "unsupported output format: {other} (expected one of png, jpeg, svg)"
            )),
        }
    }
}
