use bytes::Bytes;
use futures_core::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::{AssetError, AssetResult};

/// Stream of bytes for asset content
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Smallest width/height a transform may ask for, in pixels
pub const MIN_DIMENSION: u32 = 10;
/// Largest width/height a transform may ask for, in pixels
pub const MAX_DIMENSION: u32 = 5000;
pub const MIN_DPI: u32 = 72;
pub const MAX_DPI: u32 = 600;

/// Opaque caller-supplied key for a collection of assets (usually a SKU).
///
/// The value is never interpreted; it only feeds the shard strategy. Values
/// that cannot be a single path segment are refused here; shard chunks that
/// come out as `..` are refused by the layout when the directory is built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(String);

impl AssetId {
    /// Parse an identifier, rejecting values that cannot be a single path segment
    pub fn parse<S: Into<String>>(id: S) -> AssetResult<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(AssetError::invalid("Asset ID is required"));
        }
        if id == "." || id == ".." || id.contains(['/', '\\', '\0']) {
            return Err(AssetError::invalid(format!(
                "Asset ID must be a single path segment: {:?}",
                id
            )));
        }
        Ok(Self(id))
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AssetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<&str> for AssetId {
    type Error = AssetError;

    fn try_from(value: &str) -> AssetResult<Self> {
        Self::parse(value)
    }
}

/// Request to store an asset
#[derive(Debug, Clone)]
pub struct AssetPut {
    pub id: AssetId,
    pub filename: String,
    pub content_type: Option<String>,
    pub size_hint: Option<u64>,
    pub mark_as_default: bool,
}

impl AssetPut {
    pub fn new<S: Into<String>>(id: AssetId, filename: S) -> Self {
        Self {
            id,
            filename: filename.into(),
            content_type: None,
            size_hint: None,
            mark_as_default: false,
        }
    }

    /// Declared MIME type; checked against the extension's allow-list entry
    pub fn with_content_type<S: Into<String>>(mut self, content_type: S) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Known payload size, lets oversized uploads fail before anything is written
    pub fn with_size_hint(mut self, size: u64) -> Self {
        self.size_hint = Some(size);
        self
    }

    pub fn as_default(mut self) -> Self {
        self.mark_as_default = true;
        self
    }
}

/// Optional transform parameters for a retrieval
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformRequest {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub dpi: Option<u32>,
    pub quality: Option<u32>,
}

impl TransformRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_width(mut self, width: u32) -> Self {
        self.width = Some(width);
        self
    }

    pub fn with_height(mut self, height: u32) -> Self {
        self.height = Some(height);
        self
    }

    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.dpi = Some(dpi);
        self
    }

    pub fn with_quality(mut self, quality: u32) -> Self {
        self.quality = Some(quality);
        self
    }

    /// Only a dimension or a DPI value triggers decode/re-encode; quality alone does not.
    pub fn is_requested(&self) -> bool {
        self.width.is_some() || self.height.is_some() || self.dpi.is_some()
    }

    pub fn validate(&self) -> AssetResult<()> {
        for (name, value) in [("Width", self.width), ("Height", self.height)] {
            if let Some(v) = value {
                if !(MIN_DIMENSION..=MAX_DIMENSION).contains(&v) {
                    return Err(AssetError::invalid(format!(
                        "{} must be between {} and {} pixels",
                        name, MIN_DIMENSION, MAX_DIMENSION
                    )));
                }
            }
        }
        if let Some(dpi) = self.dpi {
            if !(MIN_DPI..=MAX_DPI).contains(&dpi) {
                return Err(AssetError::invalid(format!(
                    "DPI must be between {} and {}",
                    MIN_DPI, MAX_DPI
                )));
            }
        }
        Ok(())
    }

    pub fn effective_quality(&self, default: u8) -> u8 {
        clamp_quality(self.quality, default)
    }
}

/// Query of the path-based transform (`?w=&h=&q=`)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizeQuery {
    pub w: Option<u32>,
    pub h: Option<u32>,
    pub q: Option<u32>,
}

impl ResizeQuery {
    pub fn is_requested(&self) -> bool {
        self.w.is_some() || self.h.is_some()
    }

    pub(crate) fn to_transform(self) -> TransformRequest {
        TransformRequest {
            width: self.w,
            height: self.h,
            dpi: None,
            quality: self.q,
        }
    }
}

pub(crate) fn clamp_quality(requested: Option<u32>, default: u8) -> u8 {
    match requested {
        Some(q) => q.clamp(1, 100) as u8,
        None => default,
    }
}
