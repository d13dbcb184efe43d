//! Default designation: at most one file per identifier directory carries the
//! default marker.
//!
//! All mutations run under the directory's [`DirLocks`] entry, so two callers
//! in this process never interleave their scan-and-rename steps. Renames are
//! not transactional: if one fails midway the directory can be left with zero
//! or two marked files until the next [`DefaultDesignation::repair`].

use std::path::Path;
use std::time::SystemTime;

use tokio::fs;
use tracing::{debug, info, warn};

use crate::layout::{rename_no_clobber, scan_dir};
use crate::marker::{is_default, mark, unmark};
use crate::{AssetError, AssetId, AssetResult, DirLocks, Layout, RepairReport, StoredAsset};

/// Result of designating a file inside a directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Designated {
    pub name: String,
    pub already_default: bool,
}

#[derive(Clone)]
pub struct DefaultDesignation {
    layout: Layout,
    locks: DirLocks,
}

impl DefaultDesignation {
    pub fn new(layout: Layout, locks: DirLocks) -> Self {
        Self { layout, locks }
    }

    /// Make `filename` the single default asset of `id`
    pub async fn set_default(&self, id: &AssetId, filename: &str) -> AssetResult<StoredAsset> {
        validate_filename(filename)?;
        let dir = self.layout.directory(id)?;
        let _guard = self.locks.lock(&dir).await;

        let designated = designate(&dir, id, filename).await?;
        if designated.already_default {
            debug!(%id, file = %designated.name, "asset is already the default");
        } else {
            info!(%id, file = %designated.name, "default asset changed");
        }
        Ok(self.describe(id, designated))
    }

    /// Mark a file the writer just created; same protocol as [`Self::set_default`]
    pub async fn mark_on_write(&self, id: &AssetId, new_filename: &str) -> AssetResult<StoredAsset> {
        let dir = self.layout.directory(id)?;
        let _guard = self.locks.lock(&dir).await;
        let designated = designate(&dir, id, new_filename).await?;
        debug!(%id, file = %designated.name, "upload stored as default");
        Ok(self.describe(id, designated))
    }

    /// Recovery scan: when several files carry the marker, keep the most
    /// recently modified one and strip the rest.
    pub async fn repair(&self, id: &AssetId) -> AssetResult<RepairReport> {
        let dir = self.layout.directory(id)?;
        let _guard = self.locks.lock(&dir).await;

        let names = scan_dir(&dir)
            .await?
            .ok_or_else(|| AssetError::not_found(format!("asset folder for {}", id)))?;
        let marked: Vec<String> = names.into_iter().filter(|n| is_default(n)).collect();
        if marked.len() <= 1 {
            return Ok(RepairReport {
                kept: marked.into_iter().next(),
                unmarked: Vec::new(),
            });
        }

        let mut dated = Vec::with_capacity(marked.len());
        for name in marked {
            let modified = fs::metadata(dir.join(&name))
                .await
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            dated.push((modified, name));
        }
        // Newest first; name breaks ties so the outcome is deterministic.
        dated.sort_by(|a, b| b.cmp(a));

        let mut report = RepairReport::default();
        let mut dated = dated.into_iter();
        report.kept = dated.next().map(|(_, name)| name);
        for (_, name) in dated {
            let bare = unmark(&name);
            rename_no_clobber(&dir, &name, &bare).await?;
            report.unmarked.push(bare);
        }
        warn!(
            %id,
            kept = ?report.kept,
            unmarked = report.unmarked.len(),
            "repaired directory with multiple default assets"
        );
        Ok(report)
    }

    fn describe(&self, id: &AssetId, designated: Designated) -> StoredAsset {
        StoredAsset {
            id: id.clone(),
            path: self.layout.display_path(id, &designated.name),
            name: designated.name,
            is_default: true,
            already_default: designated.already_default,
        }
    }
}

/// Scan-and-rename step; the caller holds the directory lock
pub(crate) async fn designate(dir: &Path, id: &AssetId, filename: &str) -> AssetResult<Designated> {
    let names = scan_dir(dir)
        .await?
        .ok_or_else(|| AssetError::not_found(format!("asset folder for {}", id)))?;
    if !names.iter().any(|n| n == filename) {
        return Err(AssetError::not_found(format!("file {} for {}", filename, id)));
    }

    for name in names.iter().filter(|n| *n != filename && is_default(n)) {
        let bare = unmark(name);
        rename_no_clobber(dir, name, &bare).await?;
        debug!(%id, from = %name, to = %bare, "cleared previous default");
    }

    if is_default(filename) {
        return Ok(Designated {
            name: filename.to_string(),
            already_default: true,
        });
    }

    let marked = mark(filename);
    rename_no_clobber(dir, filename, &marked).await?;
    Ok(Designated {
        name: marked,
        already_default: false,
    })
}

fn validate_filename(filename: &str) -> AssetResult<()> {
    if filename.is_empty() {
        return Err(AssetError::invalid("Filename is required"));
    }
    if filename.starts_with('.') || filename.contains(['/', '\\', '\0']) {
        return Err(AssetError::invalid(format!("Invalid filename: {:?}", filename)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(names: &[&str]) -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        for name in names {
            std::fs::write(tmp.path().join(name), name.as_bytes()).unwrap();
        }
        tmp
    }

    fn listing(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn moves_marker_to_requested_file() {
        let tmp = fixture(&["a-default.png", "b.png"]);
        let id = AssetId::parse("sku").unwrap();

        let designated = designate(tmp.path(), &id, "b.png").await.unwrap();
        assert_eq!(designated.name, "b-default.png");
        assert!(!designated.already_default);
        assert_eq!(listing(tmp.path()), vec!["a.png", "b-default.png"]);
    }

    #[tokio::test]
    async fn already_default_is_not_an_error() {
        let tmp = fixture(&["a-default.png", "b.png"]);
        let id = AssetId::parse("sku").unwrap();

        let designated = designate(tmp.path(), &id, "a-default.png").await.unwrap();
        assert!(designated.already_default);
        assert_eq!(listing(tmp.path()), vec!["a-default.png", "b.png"]);
    }

    #[tokio::test]
    async fn clears_every_stale_marker() {
        let tmp = fixture(&["a-default.png", "b-default.jpg", "c.pdf"]);
        let id = AssetId::parse("sku").unwrap();

        designate(tmp.path(), &id, "c.pdf").await.unwrap();
        assert_eq!(listing(tmp.path()), vec!["a.png", "b.jpg", "c-default.pdf"]);
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let tmp = fixture(&["a.png"]);
        let id = AssetId::parse("sku").unwrap();

        let err = designate(tmp.path(), &id, "zzz.png").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(listing(tmp.path()), vec!["a.png"]);
    }

    #[test]
    fn filenames_with_separators_are_rejected() {
        assert!(validate_filename("").is_err());
        assert!(validate_filename("../a.png").is_err());
        assert!(validate_filename(".hidden").is_err());
        assert!(validate_filename("a.png").is_ok());
    }
}
