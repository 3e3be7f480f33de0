//! Asset descriptors.
//!
//! An asset is one unit of quality computation: a reference source, a
//! distorted source, their native dimensions, and the transform that brings
//! both to the common "quality" resolution before measurement.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{AssetError, AssetResult};

/// Frame dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Both sides are non-zero.
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Dimensions {
    type Err = AssetError;

    /// Parse `WIDTHxHEIGHT`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(|| AssetError::invalid_dimensions(s))?;
        let width = w.parse().map_err(|_| AssetError::invalid_dimensions(s))?;
        let height = h.parse().map_err(|_| AssetError::invalid_dimensions(s))?;
        Ok(Self { width, height })
    }
}

/// A rectangular region `width:height:x:y`, used for both crop and pad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct FrameRegion {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub x: u32,
    #[serde(default)]
    pub y: u32,
}

impl FrameRegion {
    pub const fn new(width: u32, height: u32, x: u32, y: u32) -> Self {
        Self { width, height, x, y }
    }
}

impl fmt::Display for FrameRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}:{}", self.width, self.height, self.x, self.y)
    }
}

impl FromStr for FrameRegion {
    type Err = AssetError;

    /// Parse `W:H:X:Y` (offsets may be omitted and default to zero).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<u32> = s
            .trim()
            .split(':')
            .map(|p| p.parse::<u32>())
            .collect::<Result<_, _>>()
            .map_err(|_| AssetError::invalid_region(s))?;

        match parts.as_slice() {
            [w, h] => Ok(Self::new(*w, *h, 0, 0)),
            [w, h, x, y] => Ok(Self::new(*w, *h, *x, *y)),
            _ => Err(AssetError::invalid_region(s)),
        }
    }
}

/// Planar YUV pixel format of raw sources and workfiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    #[default]
    Yuv420p,
    Yuv422p,
    Yuv444p,
    Yuv420p10le,
    Yuv422p10le,
    Yuv444p10le,
}

impl PixelFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            PixelFormat::Yuv420p => "yuv420p",
            PixelFormat::Yuv422p => "yuv422p",
            PixelFormat::Yuv444p => "yuv444p",
            PixelFormat::Yuv420p10le => "yuv420p10le",
            PixelFormat::Yuv422p10le => "yuv422p10le",
            PixelFormat::Yuv444p10le => "yuv444p10le",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scaler algorithm used when resizing to the quality resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ResamplingType {
    #[default]
    Bicubic,
    Bilinear,
    Lanczos,
    Neighbor,
}

impl ResamplingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResamplingType::Bicubic => "bicubic",
            ResamplingType::Bilinear => "bilinear",
            ResamplingType::Lanczos => "lanczos",
            ResamplingType::Neighbor => "neighbor",
        }
    }
}

impl fmt::Display for ResamplingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the source files are stored on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    /// Headerless planar YUV; readers need the pixel format and dimensions.
    #[default]
    Raw,
    /// Any container/codec the transcoder can decode on its own.
    Container,
}

impl SourceFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFormat::Raw => "raw",
            SourceFormat::Container => "container",
        }
    }
}

/// Description of one computation unit.
///
/// The descriptor is never mutated by the executor. Whether the sources can
/// be measured in place, and where transient workfiles live, are derived
/// from the fields below.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AssetDescriptor {
    /// Optional grouping labels, part of the identity when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<String>,

    /// Reference ("A") source path
    pub ref_path: PathBuf,
    /// Distorted ("B") source path
    pub dis_path: PathBuf,
    /// Directory for workfiles and log artifacts (not part of the identity)
    pub workdir: PathBuf,

    /// Native dimensions of the reference source
    pub ref_dims: Dimensions,
    /// Native dimensions of the distorted source
    pub dis_dims: Dimensions,
    /// Explicit quality dimensions; defaults to `ref_dims` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_dims: Option<Dimensions>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop: Option<FrameRegion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pad: Option<FrameRegion>,

    #[serde(default)]
    pub pixel_format: PixelFormat,
    #[serde(default)]
    pub resampling: ResamplingType,
    #[serde(default)]
    pub source_format: SourceFormat,
}

impl AssetDescriptor {
    /// Create a descriptor with default format, resampling and no transform.
    pub fn new(
        ref_path: impl Into<PathBuf>,
        dis_path: impl Into<PathBuf>,
        workdir: impl Into<PathBuf>,
        ref_dims: Dimensions,
        dis_dims: Dimensions,
    ) -> Self {
        Self {
            dataset: None,
            content_id: None,
            asset_id: None,
            ref_path: ref_path.into(),
            dis_path: dis_path.into(),
            workdir: workdir.into(),
            ref_dims,
            dis_dims,
            quality_dims: None,
            crop: None,
            pad: None,
            pixel_format: PixelFormat::default(),
            resampling: ResamplingType::default(),
            source_format: SourceFormat::default(),
        }
    }

    pub fn with_quality_dims(mut self, dims: Dimensions) -> Self {
        self.quality_dims = Some(dims);
        self
    }

    pub fn with_crop(mut self, crop: FrameRegion) -> Self {
        self.crop = Some(crop);
        self
    }

    pub fn with_pad(mut self, pad: FrameRegion) -> Self {
        self.pad = Some(pad);
        self
    }

    pub fn with_pixel_format(mut self, pixel_format: PixelFormat) -> Self {
        self.pixel_format = pixel_format;
        self
    }

    pub fn with_resampling(mut self, resampling: ResamplingType) -> Self {
        self.resampling = resampling;
        self
    }

    pub fn with_source_format(mut self, source_format: SourceFormat) -> Self {
        self.source_format = source_format;
        self
    }

    pub fn with_labels(
        mut self,
        dataset: impl Into<String>,
        content_id: impl Into<String>,
        asset_id: impl Into<String>,
    ) -> Self {
        self.dataset = Some(dataset.into());
        self.content_id = Some(content_id.into());
        self.asset_id = Some(asset_id.into());
        self
    }

    /// Effective quality dimensions.
    pub fn quality_dims(&self) -> Dimensions {
        self.quality_dims.unwrap_or(self.ref_dims)
    }

    /// True when no scaling, crop or pad is required, so the compute step
    /// can read the sources directly and no workfile is ever created.
    pub fn uses_source_as_workfile(&self) -> bool {
        let quality = self.quality_dims();
        quality == self.ref_dims
            && quality == self.dis_dims
            && self.crop.is_none()
            && self.pad.is_none()
    }

    /// Check the invariants that must hold before any job runs.
    pub fn validate(&self) -> AssetResult<()> {
        for (side, dims) in [("reference", self.ref_dims), ("distorted", self.dis_dims)] {
            if !dims.is_valid() {
                return Err(AssetError::invalid_dimensions(format!(
                    "{} dimensions {} must be non-zero",
                    side, dims
                )));
            }
        }

        if let Some(quality) = self.quality_dims {
            if !quality.is_valid() {
                return Err(AssetError::invalid_dimensions(format!(
                    "quality dimensions {} must be non-zero",
                    quality
                )));
            }
        }

        if self.quality_dims.is_none() {
            if self.crop.is_some() {
                return Err(AssetError::configuration(
                    "crop is set, so quality dimensions must be set explicitly",
                ));
            }
            if self.pad.is_some() {
                return Err(AssetError::configuration(
                    "pad is set, so quality dimensions must be set explicitly",
                ));
            }
        }

        Ok(())
    }

    /// Canonical identity string.
    ///
    /// Covers every field that affects the computed result. The working
    /// directory is deliberately excluded. Free-text values (labels, paths)
    /// have `\\` and `|` backslash-escaped so fields cannot run together.
    pub fn identity(&self) -> String {
        let mut parts = Vec::with_capacity(14);

        if let Some(dataset) = &self.dataset {
            parts.push(format!("dataset={}", escape_identity_value(dataset)));
        }
        if let Some(content_id) = &self.content_id {
            parts.push(format!("content_id={}", escape_identity_value(content_id)));
        }
        if let Some(asset_id) = &self.asset_id {
            parts.push(format!("asset_id={}", escape_identity_value(asset_id)));
        }

        parts.push(format!(
            "ref={}",
            escape_identity_value(&self.ref_path.to_string_lossy())
        ));
        parts.push(format!("ref_wh={}", self.ref_dims));
        parts.push(format!(
            "dis={}",
            escape_identity_value(&self.dis_path.to_string_lossy())
        ));
        parts.push(format!("dis_wh={}", self.dis_dims));
        parts.push(format!("quality_wh={}", self.quality_dims()));

        if let Some(crop) = &self.crop {
            parts.push(format!("crop={}", crop));
        }
        if let Some(pad) = &self.pad {
            parts.push(format!("pad={}", pad));
        }

        parts.push(format!("pix_fmt={}", self.pixel_format));
        parts.push(format!("resampling={}", self.resampling));
        parts.push(format!("source={}", self.source_format.as_str()));

        parts.join("|")
    }

    /// SHA-256 hex digest of [`identity`](Self::identity).
    pub fn identity_hash(&self) -> String {
        format!("{:x}", Sha256::digest(self.identity().as_bytes()))
    }

    /// Transient workfile path for the reference side.
    pub fn ref_workfile_path(&self) -> PathBuf {
        self.workfile_path("ref")
    }

    /// Transient workfile path for the distorted side.
    pub fn dis_workfile_path(&self) -> PathBuf {
        self.workfile_path("dis")
    }

    fn workfile_path(&self, side: &str) -> PathBuf {
        self.workdir
            .join(format!("{}_{}.yuv", side, self.identity_hash()))
    }

    /// Working directory root.
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }
}

impl fmt::Display for AssetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identity())
    }
}

fn escape_identity_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '\\' || c == '|' {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
