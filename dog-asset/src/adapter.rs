use std::path::PathBuf;

use bytes::Bytes;

use crate::{
    AssetConfig, AssetId, AssetPut, AssetRecordMeta, AssetResult, AssetWriter, ByteStream,
    DefaultDesignation, DefaultShardStrategy, DirLocks, Layout, ListingService, Rendition,
    RepairReport, ResizeQuery, RetrievalService, ShardStrategy, StoredAsset, TransformRequest,
};

/// The main asset adapter - this is what services embed
#[derive(Clone)]
pub struct AssetAdapter {
    layout: Layout,
    writer: AssetWriter,
    designation: DefaultDesignation,
    retrieval: RetrievalService,
    listing: ListingService,
    config: AssetConfig,
}

impl AssetAdapter {
    /// Create an adapter using the default shard strategy
    pub fn new(config: AssetConfig) -> AssetResult<Self> {
        Self::with_shard_strategy(config, DefaultShardStrategy)
    }

    /// Create with custom shard strategy
    pub fn with_shard_strategy<K: ShardStrategy + 'static>(config: AssetConfig, shards: K) -> AssetResult<Self> {
        config.validate()?;
        let layout = Layout::with_strategy(config.base_dir.clone(), config.root_segment.clone(), shards);
        let designation = DefaultDesignation::new(layout.clone(), DirLocks::new());
        let writer = AssetWriter::new(layout.clone(), designation.clone(), config.max_upload_bytes);
        let retrieval = RetrievalService::new(layout.clone(), &config);
        let listing = ListingService::new(layout.clone());

        Ok(Self {
            layout,
            writer,
            designation,
            retrieval,
            listing,
            config,
        })
    }

    /// Store an uploaded file from a stream
    pub async fn upload(&self, put: AssetPut, body: ByteStream) -> AssetResult<StoredAsset> {
        self.writer.store(put, body).await
    }

    /// Store an in-memory payload; its length doubles as the size hint
    pub async fn upload_bytes<B: Into<Bytes>>(&self, put: AssetPut, data: B) -> AssetResult<StoredAsset> {
        let data = data.into();
        let put = put.with_size_hint(data.len() as u64);
        let body: ByteStream = Box::pin(futures_util::stream::once(async move { Ok(data) }));
        self.writer.store(put, body).await
    }

    /// Serve the default asset, optionally resized / density-tagged
    pub async fn retrieve(&self, id: &AssetId, transform: Option<TransformRequest>) -> AssetResult<Rendition> {
        self.retrieval.retrieve(id, transform).await
    }

    pub async fn list(&self, id: &AssetId) -> AssetResult<Vec<AssetRecordMeta>> {
        self.listing.list(id).await
    }

    pub async fn set_default(&self, id: &AssetId, filename: &str) -> AssetResult<StoredAsset> {
        self.designation.set_default(id, filename).await
    }

    /// Fix up a directory left with several default markers
    pub async fn repair_defaults(&self, id: &AssetId) -> AssetResult<RepairReport> {
        self.designation.repair(id).await
    }

    /// Serve a file by its path below the root segment (`?w=&h=&q=` style)
    pub async fn serve_path(&self, relative_path: &str, query: ResizeQuery) -> AssetResult<Rendition> {
        self.retrieval.serve_path(relative_path, query).await
    }

    /// Sharded segments for an identifier, root segment first
    pub fn shard_path(&self, id: &AssetId) -> Vec<String> {
        self.layout.segments(id)
    }

    /// On-disk directory for an identifier; fails if a shard segment is not a plain name
    pub fn directory(&self, id: &AssetId) -> AssetResult<PathBuf> {
        self.layout.directory(id)
    }

    /// Get configuration
    pub fn config(&self) -> &AssetConfig {
        &self.config
    }
}
