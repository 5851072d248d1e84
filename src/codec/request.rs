// src/codec/request.rs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Avatar description as supplied by the caller (JSON body or query string).
///
/// Every field is optional on the wire so that validation, not
/// deserialization, reports which field is wrong. Lengths: `height` is in
/// metres, `chest`/`waist`/`hip` in centimetres. Enum-like fields stay
/// strings here and are checked by [`super::encode`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AvatarRequest {
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub identity: Option<String>,
    #[serde(default)]
    pub height: Option<f64>,
    #[serde(default)]
    pub chest: Option<f64>,
    #[serde(default)]
    pub waist: Option<f64>,
    #[serde(default)]
    pub hip: Option<f64>,
    #[serde(default)]
    pub sex: Option<String>,
    #[serde(default)]
    pub pose: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub image_width: Option<u32>,
    #[serde(default)]
    pub image_height: Option<u32>,
}

/// Base character the add-on starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Female,
    Male,
}

impl FromStr for Sex {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "female" | "f" => Ok(Sex::Female),
            "male" | "m" => Ok(Sex::Male),
            other => Err(format!("unknown value {other:?} (expected female or male)")),
        }
    }
}

/// Neutral poses the entry script knows how to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Pose {
    #[serde(rename = "POSE01")]
    Pose01,
    #[serde(rename = "POSE02")]
    Pose02,
    #[serde(rename = "POSE03")]
    Pose03,
}

impl Pose {
    pub fn as_str(self) -> &'static str {
        match self {
            Pose::Pose01 => "POSE01",
            Pose::Pose02 => "POSE02",
            Pose::Pose03 => "POSE03",
        }
    }
}

impl fmt::Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Pose {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "POSE01" => Ok(Pose::Pose01),
            "POSE02" => Ok(Pose::Pose02),
            "POSE03" => Ok(Pose::Pose03),
            other => Err(format!(
                "unknown value {other:?} (expected POSE01, POSE02 or POSE03)"
            )),
        }
    }
}
