use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};

use crate::{AssetError, AssetId, AssetResult, ByteStream};

/// Descriptor returned after storing an asset or changing the default
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredAsset {
    pub id: AssetId,
    /// Filename on disk, including the marker when default
    pub name: String,
    /// Root-relative path, `/`-separated
    pub path: String,
    pub is_default: bool,
    /// Set when a set-default call found the file already marked
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub already_default: bool,
}

/// Metadata for one file in an identifier's directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRecordMeta {
    pub name: String,
    pub path: String,
    pub size: u64,
    pub is_default: bool,
    /// Not every filesystem records a birth time
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
}

/// Outcome of a recovery scan over the default markers of one identifier
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairReport {
    /// The file left carrying the marker, if any was marked
    pub kept: Option<String>,
    /// Files whose marker was stripped, by their new name
    pub unmarked: Vec<String>,
}

impl RepairReport {
    pub fn was_consistent(&self) -> bool {
        self.unmarked.is_empty()
    }
}

/// Bytes handed back to a caller: the stored file or a transformed version
pub struct Rendition {
    /// Name of the stored file the rendition came from
    pub source_name: String,
    pub content_type: String,
    /// Cache directive; only transformed renditions carry one
    pub cache_control: Option<String>,
    pub body: RenditionBody,
}

pub enum RenditionBody {
    /// Untouched file content, streamed from disk
    Stream { stream: ByteStream, size_bytes: u64 },
    /// Re-encoded image held in memory
    Bytes(Bytes),
}

impl Rendition {
    pub fn stream(source_name: String, content_type: String, stream: ByteStream, size_bytes: u64) -> Self {
        Self {
            source_name,
            content_type,
            cache_control: None,
            body: RenditionBody::Stream { stream, size_bytes },
        }
    }

    pub fn transformed(source_name: String, content_type: String, data: Bytes, max_age_secs: u64) -> Self {
        let cache_control = cache_control_for(&content_type, true, max_age_secs);
        Self {
            source_name,
            content_type,
            cache_control,
            body: RenditionBody::Bytes(data),
        }
    }

    pub fn is_transformed(&self) -> bool {
        matches!(self.body, RenditionBody::Bytes(_))
    }

    pub fn content_length(&self) -> u64 {
        match &self.body {
            RenditionBody::Stream { size_bytes, .. } => *size_bytes,
            RenditionBody::Bytes(data) => data.len() as u64,
        }
    }

    /// Convert into a byte stream regardless of how the body is held
    pub fn into_stream(self) -> ByteStream {
        match self.body {
            RenditionBody::Stream { stream, .. } => stream,
            RenditionBody::Bytes(data) => Box::pin(futures_util::stream::once(async move { Ok(data) })),
        }
    }

    /// Buffer the whole body in memory
    pub async fn into_bytes(self) -> AssetResult<Bytes> {
        match self.body {
            RenditionBody::Bytes(data) => Ok(data),
            RenditionBody::Stream { mut stream, size_bytes } => {
                let mut buf = BytesMut::with_capacity(size_bytes as usize);
                while let Some(chunk) = stream.next().await {
                    let chunk = chunk.map_err(|e| AssetError::storage("reading asset", e))?;
                    buf.extend_from_slice(&chunk);
                }
                Ok(buf.freeze())
            }
        }
    }
}

impl std::fmt::Debug for Rendition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rendition")
            .field("source_name", &self.source_name)
            .field("content_type", &self.content_type)
            .field("cache_control", &self.cache_control)
            .field("transformed", &self.is_transformed())
            .field("content_length", &self.content_length())
            .finish()
    }
}

/// Cache directive for a rendition, derived only from its type and whether a transform succeeded
pub fn cache_control_for(content_type: &str, transformed: bool, max_age_secs: u64) -> Option<String> {
    if transformed && content_type.starts_with("image/") {
        Some(format!("public, max-age={}", max_age_secs))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_control_only_for_transformed_images() {
        assert_eq!(
            cache_control_for("image/png", true, 86400).as_deref(),
            Some("public, max-age=86400")
        );
        assert_eq!(cache_control_for("image/png", false, 86400), None);
        assert_eq!(cache_control_for("application/pdf", true, 86400), None);
    }

    #[tokio::test]
    async fn bytes_body_round_trips_through_stream() {
        let rendition = Rendition::transformed(
            "a.png".into(),
            "image/png".into(),
            Bytes::from_static(b"png!"),
            60,
        );
        assert!(rendition.is_transformed());
        assert_eq!(rendition.content_length(), 4);
        let mut stream = rendition.into_stream();
        let chunk = stream.next().await.unwrap().unwrap();
        assert_eq!(&chunk[..], b"png!");
    }
}
