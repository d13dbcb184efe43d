use std::io::ErrorKind;

use chrono::{DateTime, Utc};
use tokio::fs;

use crate::layout::scan_dir;
use crate::marker::is_default;
use crate::{AssetError, AssetId, AssetRecordMeta, AssetResult, Layout};

/// Enumerates the files stored for an identifier
#[derive(Clone)]
pub struct ListingService {
    layout: Layout,
}

impl ListingService {
    pub fn new(layout: Layout) -> Self {
        Self { layout }
    }

    /// Records sorted by filename. In-flight uploads are not listed.
    pub async fn list(&self, id: &AssetId) -> AssetResult<Vec<AssetRecordMeta>> {
        let dir = self.layout.directory(id)?;
        let names = scan_dir(&dir)
            .await?
            .ok_or_else(|| AssetError::not_found(format!("asset folder for {}", id)))?;

        let mut records = Vec::with_capacity(names.len());
        for name in names {
            let meta = match fs::metadata(dir.join(&name)).await {
                Ok(meta) => meta,
                // Renamed by a concurrent default change; its new name was not scanned.
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(AssetError::storage("reading asset metadata", e)),
            };
            records.push(AssetRecordMeta {
                path: self.layout.display_path(id, &name),
                is_default: is_default(&name),
                size: meta.len(),
                created_at: meta.created().ok().map(DateTime::<Utc>::from),
                modified_at: meta.modified().ok().map(DateTime::<Utc>::from),
                name,
            });
        }
        Ok(records)
    }
}
