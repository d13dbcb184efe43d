//! # dog-asset: sharded asset storage for DogRS applications
//!
//! `dog-asset` stores uploaded files (product images, PDFs, office documents)
//! under a deterministic directory per identifier, keeps exactly one of them
//! marked as the default rendition, and serves them back either untouched or
//! resized on the fly.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dog_asset::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() -> AssetResult<()> {
//! let adapter = AssetAdapter::new(AssetConfig::default().with_base_dir("/var/lib/shop"))?;
//! let sku = AssetId::parse("123456")?;
//!
//! // Lands in /var/lib/shop/assets/12/34/56/123456/
//! let png = std::fs::read("front.png").unwrap();
//! let stored = adapter
//!     .upload_bytes(AssetPut::new(sku.clone(), "front.png").as_default(), png)
//!     .await?;
//!
//! // Thumbnail of the default asset
//! let thumb = adapter
//!     .retrieve(&sku, Some(TransformRequest::new().with_width(200)))
//!     .await?;
//! assert_eq!(thumb.content_type, "image/png");
//! # let _ = stored;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │               AssetAdapter              │  ← upload / retrieve / list / set_default
//! ├─────────────┬─────────────┬─────────────┤
//! │   Writer    │ Designation │  Retrieval  │  ← plus ListingService
//! ├─────────────┴─────────────┴─────────────┤
//! │          Layout + ShardStrategy         │  ← identifier → directory
//! └─────────────────────────────────────────┘
//! ```
//!
//! There is no index: the directory tree is the only state, and "default" is
//! a marker in the filename (see [`marker`]). Marker changes are serialized
//! per directory inside one process.

pub mod adapter;
mod config;
mod designation;
mod error;
mod layout;
mod listing;
mod locks;
pub mod marker;
pub mod mime;
mod receipt;
mod retrieve;
pub mod shard;
pub mod transform;
mod types;
mod writer;

// Re-export main types for clean API
pub use adapter::AssetAdapter;
pub use config::{AssetConfig, ResizePolicy};
pub use designation::DefaultDesignation;
pub use error::{AssetError, AssetErrorKind, AssetResult};
pub use layout::Layout;
pub use listing::ListingService;
pub use locks::{DirLockGuard, DirLocks};
pub use receipt::{cache_control_for, AssetRecordMeta, Rendition, RenditionBody, RepairReport, StoredAsset};
pub use retrieve::{select_rendition, RetrievalService};
pub use shard::{shard_path, DefaultShardStrategy, ShardStrategy, DEFAULT_ROOT_SEGMENT};
pub use types::{
    AssetId, AssetPut, ByteStream, ResizeQuery, TransformRequest, MAX_DIMENSION, MAX_DPI,
    MIN_DIMENSION, MIN_DPI,
};
pub use writer::AssetWriter;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        AssetAdapter, AssetConfig, AssetError, AssetId, AssetPut, AssetResult, ByteStream,
        Rendition, ResizeQuery, StoredAsset, TransformRequest,
    };
}
