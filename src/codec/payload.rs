// src/codec/payload.rs

//! Validation and serialization of avatar requests.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use uuid::Uuid;

use crate::errors::RenderError;
use crate::types::OutputFormat;

use super::request::{AvatarRequest, Pose, Sex};

pub const HEIGHT_RANGE_M: (f64, f64) = (0.5, 2.5);
pub const CHEST_RANGE_CM: (f64, f64) = (40.0, 200.0);
pub const WAIST_RANGE_CM: (f64, f64) = (40.0, 200.0);
pub const HIP_RANGE_CM: (f64, f64) = (50.0, 200.0);
pub const RESOLUTION_RANGE_PX: (u32, u32) = (64, 4096);
pub const DEFAULT_RESOLUTION: (u32, u32) = (800, 1100);

/// Blender stores seeds as signed 32-bit integers.
pub const MAX_SEED: u64 = i32::MAX as u64;

static IDENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]{0,63}$").expect("identity pattern is valid")
});

/// Validated, immutable avatar parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct AvatarParams {
    pub seed: u64,
    /// True when the caller did not supply a seed and one was drawn.
    pub seed_generated: bool,
    pub identity: Option<String>,
    pub height_m: f64,
    pub chest_cm: Option<f64>,
    pub waist_cm: Option<f64>,
    pub hip_cm: Option<f64>,
    pub sex: Sex,
    pub pose: Pose,
    pub format: OutputFormat,
    pub resolution: (u32, u32),
}

/// Everything the supervisor needs to hand a request to the renderer.
///
/// `params_json` is written to the job's parameter file (`--in`); `args`
/// are appended after the script's own `--in`/`--out` arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct SerializedPayload {
    params: AvatarParams,
    params_json: String,
    args: Vec<String>,
}

impl SerializedPayload {
    pub fn params(&self) -> &AvatarParams {
        &self.params
    }

    pub fn params_json(&self) -> &str {
        &self.params_json
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn format(&self) -> OutputFormat {
        self.params.format
    }

    pub fn seed(&self) -> u64 {
        self.params.seed
    }
}

/// Parameter file layout read by the entry script. Measurements are in
/// centimetres, which is what the script converts from.
#[derive(Serialize)]
struct RendererParams<'a> {
    seed: u64,
    identity: Option<&'a str>,
    sex: Sex,
    pose: Pose,
    measurements: Measurements,
    render: RenderSettings,
    meta: Meta,
}

#[derive(Serialize)]
struct Measurements {
    height: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    chest: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    waist: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hip: Option<f64>,
}

#[derive(Serialize)]
struct RenderSettings {
    format: OutputFormat,
    width: u32,
    height: u32,
}

#[derive(Serialize)]
struct Meta {
    units: &'static str,
}

/// Validate `request` and serialize it for the renderer, drawing a random
/// seed when the caller did not supply one.
pub fn encode(
    request: &AvatarRequest,
    formats: &[OutputFormat],
) -> Result<SerializedPayload, RenderError> {
    encode_with_seed(request, formats, random_seed())
}

/// Deterministic variant of [`encode`]: `fallback_seed` is used when the
/// request carries no seed.
pub fn encode_with_seed(
    request: &AvatarRequest,
    formats: &[OutputFormat],
    fallback_seed: u64,
) -> Result<SerializedPayload, RenderError> {
    let params = validate(request, formats, fallback_seed)?;
    let params_json = serialize_params(&params)?;
    let args = renderer_args(&params);
    Ok(SerializedPayload {
        params,
        params_json,
        args,
    })
}

fn validate(
    request: &AvatarRequest,
    formats: &[OutputFormat],
    fallback_seed: u64,
) -> Result<AvatarParams, RenderError> {
    let (seed, seed_generated) = match request.seed {
        Some(seed) if seed > MAX_SEED => {
            return Err(RenderError::invalid(
                "seed",
                format!("must be at most {MAX_SEED}"),
            ));
        }
        Some(seed) => (seed, false),
        None => (fallback_seed & MAX_SEED, true),
    };

    let identity = match request.identity.as_deref() {
        None => None,
        Some(id) if IDENTITY_RE.is_match(id) => Some(id.to_string()),
        Some(_) => {
            return Err(RenderError::invalid(
                "identity",
                "must be 1-64 characters of [A-Za-z0-9_-] and start with a letter or digit",
            ));
        }
    };

    let height = request
        .height
        .ok_or_else(|| RenderError::invalid("height", "is required"))?;
    let height_m = in_range("height", height, HEIGHT_RANGE_M, "m")?;
    let chest_cm = optional_in_range("chest", request.chest, CHEST_RANGE_CM, "cm")?;
    let waist_cm = optional_in_range("waist", request.waist, WAIST_RANGE_CM, "cm")?;
    let hip_cm = optional_in_range("hip", request.hip, HIP_RANGE_CM, "cm")?;

    let sex = match request.sex.as_deref() {
        None => Sex::Female,
        Some(s) => s.parse().map_err(|e: String| RenderError::invalid("sex", e))?,
    };
    let pose = match request.pose.as_deref() {
        None => Pose::Pose01,
        Some(p) => p.parse().map_err(|e: String| RenderError::invalid("pose", e))?,
    };

    let format = match request.format.as_deref() {
        None => OutputFormat::Png,
        Some(f) => f
            .parse::<OutputFormat>()
            .map_err(|e| RenderError::invalid("format", e))?,
    };
    if !formats.contains(&format) {
        let allowed: Vec<&str> = formats.iter().map(|f| f.as_str()).collect();
        return Err(RenderError::invalid(
            "format",
            format!("{format} is not enabled (allowed: {})", allowed.join(", ")),
        ));
    }

    let width = pixels("image_width", request.image_width, DEFAULT_RESOLUTION.0)?;
    let height_px = pixels("image_height", request.image_height, DEFAULT_RESOLUTION.1)?;

    Ok(AvatarParams {
        seed,
        seed_generated,
        identity,
        height_m,
        chest_cm,
        waist_cm,
        hip_cm,
        sex,
        pose,
        format,
        resolution: (width, height_px),
    })
}

fn in_range(field: &str, value: f64, (min, max): (f64, f64), unit: &str) -> Result<f64, RenderError> {
    if !value.is_finite() {
        return Err(RenderError::invalid(field, "must be a finite number"));
    }
    if value < min || value > max {
        return Err(RenderError::invalid(
            field,
            format!("must be between {min} and {max} {unit} (got {value})"),
        ));
    }
    Ok(value)
}

fn optional_in_range(
    field: &str,
    value: Option<f64>,
    range: (f64, f64),
    unit: &str,
) -> Result<Option<f64>, RenderError> {
    value.map(|v| in_range(field, v, range, unit)).transpose()
}

fn pixels(field: &str, value: Option<u32>, default: u32) -> Result<u32, RenderError> {
    let (min, max) = RESOLUTION_RANGE_PX;
    match value {
        None => Ok(default),
        Some(px) if (min..=max).contains(&px) => Ok(px),
        Some(px) => Err(RenderError::invalid(
            field,
            format!("must be between {min} and {max} px (got {px})"),
        )),
    }
}

fn serialize_params(params: &AvatarParams) -> Result<String, RenderError> {
    let doc = RendererParams {
        seed: params.seed,
        identity: params.identity.as_deref(),
        sex: params.sex,
        pose: params.pose,
        measurements: Measurements {
            height: round_cm(params.height_m * 100.0),
            chest: params.chest_cm.map(round_cm),
            waist: params.waist_cm.map(round_cm),
            hip: params.hip_cm.map(round_cm),
        },
        render: RenderSettings {
            format: params.format,
            width: params.resolution.0,
            height: params.resolution.1,
        },
        meta: Meta { units: "cm" },
    };
    serde_json::to_string(&doc)
        .map_err(|e| RenderError::Internal(format!("serializing renderer parameters: {e}")))
}

/// Round to 0.1 mm so float noise like `170.00000000000003` stays out of
/// the parameter file.
fn round_cm(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Ordered script arguments. Every element is built from validated enums
/// and integers only.
fn renderer_args(params: &AvatarParams) -> Vec<String> {
    vec![
        "--format".to_string(),
        params.format.as_str().to_string(),
        "--seed".to_string(),
        params.seed.to_string(),
        "--resolution".to_string(),
        format!("{}x{}", params.resolution.0, params.resolution.1),
    ]
}

fn random_seed() -> u64 {
    Uuid::new_v4().as_u64_pair().0
}
