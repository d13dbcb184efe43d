use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tokio::fs;

use crate::{AssetError, AssetId, AssetResult, DefaultShardStrategy, ShardStrategy};

/// Where an identifier's files live: base dir + root segment + shard strategy
#[derive(Clone)]
pub struct Layout {
    base_dir: PathBuf,
    root_segment: String,
    shards: Arc<dyn ShardStrategy>,
}

impl Layout {
    pub fn new<P: Into<PathBuf>, S: Into<String>>(base_dir: P, root_segment: S) -> Self {
        Self::with_strategy(base_dir, root_segment, DefaultShardStrategy)
    }

    pub fn with_strategy<P, S, K>(base_dir: P, root_segment: S, shards: K) -> Self
    where
        P: Into<PathBuf>,
        S: Into<String>,
        K: ShardStrategy + 'static,
    {
        Self {
            base_dir: base_dir.into(),
            root_segment: root_segment.into(),
            shards: Arc::new(shards),
        }
    }

    pub fn segments(&self, id: &AssetId) -> Vec<String> {
        self.shards.segments(&self.root_segment, id.as_str())
    }

    /// Absolute (or base-relative) directory for an identifier.
    ///
    /// Every segment must be a plain directory name: an identifier whose
    /// chunks come out as `..` (e.g. `"......"`) would otherwise climb out of
    /// the root.
    pub fn directory(&self, id: &AssetId) -> AssetResult<PathBuf> {
        let mut dir = self.base_dir.clone();
        for segment in self.segments(id) {
            if !is_plain_segment(&segment) {
                return Err(AssetError::invalid(format!(
                    "Asset ID {:?} maps to an unsafe path segment {:?}",
                    id.as_str(),
                    segment
                )));
            }
            dir.push(segment);
        }
        Ok(dir)
    }

    /// Directory holding the root segment
    pub fn root_dir(&self) -> PathBuf {
        self.base_dir.join(&self.root_segment)
    }

    /// Root-relative, `/`-separated path of a file, as reported to callers
    pub fn display_path(&self, id: &AssetId, name: &str) -> String {
        let mut segments = self.segments(id);
        segments.push(name.to_string());
        segments.join("/")
    }
}

fn is_plain_segment(segment: &str) -> bool {
    let mut components = Path::new(segment).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None) => part == segment,
        _ => false,
    }
}

/// Names of the visible regular files in `dir`, sorted lexicographically.
///
/// Returns `None` when the directory does not exist. Dot-files are in-flight
/// uploads and never count as assets.
pub(crate) async fn scan_dir(dir: &Path) -> AssetResult<Option<Vec<String>>> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(AssetError::storage("listing asset directory", e)),
    };

    let mut names = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| AssetError::storage("listing asset directory", e))?
    {
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        // A file renamed away mid-scan simply drops out of the listing.
        match entry.file_type().await {
            Ok(kind) if kind.is_file() => names.push(name),
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(AssetError::storage("listing asset directory", e)),
        }
    }
    names.sort();
    Ok(Some(names))
}

/// Rename within one directory, refusing to clobber an existing file
pub(crate) async fn rename_no_clobber(dir: &Path, from: &str, to: &str) -> AssetResult<()> {
    let target = dir.join(to);
    let exists = fs::try_exists(&target)
        .await
        .map_err(|e| AssetError::storage("checking rename target", e))?;
    if exists {
        return Err(AssetError::storage(
            format!("renaming {} to {}", from, to),
            std::io::Error::new(ErrorKind::AlreadyExists, "target file already exists"),
        ));
    }
    fs::rename(dir.join(from), &target)
        .await
        .map_err(|e| AssetError::storage(format!("renaming {} to {}", from, to), e))
}
