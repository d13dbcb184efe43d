use std::io::ErrorKind;
use std::path::Path;

use futures_util::StreamExt;
use rand::Rng;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::marker::{split_extension, DEFAULT_MARKER};
use crate::mime::{declared_type_matches, is_upload_allowed};
use crate::{AssetError, AssetPut, AssetResult, ByteStream, DefaultDesignation, Layout, StoredAsset};

const NAME_ATTEMPTS: usize = 8;

/// Accepts uploads into an identifier's sharded directory
#[derive(Clone)]
pub struct AssetWriter {
    layout: Layout,
    designation: DefaultDesignation,
    max_upload_bytes: u64,
}

impl AssetWriter {
    pub fn new(layout: Layout, designation: DefaultDesignation, max_upload_bytes: u64) -> Self {
        Self {
            layout,
            designation,
            max_upload_bytes,
        }
    }

    /// Store an uploaded file, optionally making it the identifier's default.
    ///
    /// Validation happens before anything touches the filesystem. The payload
    /// is streamed into a hidden temp file and only becomes visible once
    /// renamed to its final collision-resistant name. A default upload that
    /// cannot be marked is deleted again before the error is returned, so a
    /// failed call leaves no new visible file behind.
    pub async fn store(&self, put: AssetPut, body: ByteStream) -> AssetResult<StoredAsset> {
        let original = self.validate(&put)?;

        let dir = self.layout.directory(&put.id)?;
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| AssetError::storage("creating asset directory", e))?;
        debug!(id = %put.id, dir = %dir.display(), "storing asset");

        let temp_name = format!(".upload-{}.part", Uuid::new_v4().simple());
        let temp_path = dir.join(&temp_name);
        let size = match self.write_stream(&temp_path, body).await {
            Ok(size) => size,
            Err(e) => {
                let _ = fs::remove_file(&temp_path).await;
                return Err(e);
            }
        };

        let name = match self.publish(&dir, &temp_name, original).await {
            Ok(name) => name,
            Err(e) => {
                let _ = fs::remove_file(&temp_path).await;
                return Err(e);
            }
        };
        info!(id = %put.id, file = %name, size, "asset stored");

        if put.mark_as_default {
            let marked = self.designation.mark_on_write(&put.id, &name).await;
            return discard_unless_marked(&dir, &name, marked).await;
        }

        Ok(StoredAsset {
            path: self.layout.display_path(&put.id, &name),
            id: put.id,
            name,
            is_default: false,
            already_default: false,
        })
    }

    /// Returns the sanitized original base name
    fn validate<'a>(&self, put: &'a AssetPut) -> AssetResult<&'a str> {
        let original = base_name(&put.filename);
        if original.is_empty() {
            return Err(AssetError::invalid("No file was uploaded"));
        }
        if original.starts_with('.') {
            return Err(AssetError::invalid(format!("Invalid filename: {:?}", original)));
        }
        if original.contains(DEFAULT_MARKER) {
            return Err(AssetError::invalid(format!(
                "Filename must not contain the reserved marker {:?}",
                DEFAULT_MARKER
            )));
        }
        if !is_upload_allowed(original) {
            return Err(AssetError::invalid(
                "File type not supported. Allowed types: images, PDF, Word, Excel",
            ));
        }
        if let Some(declared) = put.content_type.as_deref() {
            if !declared_type_matches(original, declared) {
                return Err(AssetError::invalid(format!(
                    "Content type {} does not match file {}",
                    declared, original
                )));
            }
        }
        if let Some(size) = put.size_hint {
            if size > self.max_upload_bytes {
                return Err(self.too_large(size));
            }
        }
        Ok(original)
    }

    async fn write_stream(&self, path: &Path, mut body: ByteStream) -> AssetResult<u64> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await
            .map_err(|e| AssetError::storage("creating upload file", e))?;

        let mut written: u64 = 0;
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| AssetError::storage("receiving upload", e))?;
            written += chunk.len() as u64;
            if written > self.max_upload_bytes {
                return Err(self.too_large(written));
            }
            file.write_all(&chunk)
                .await
                .map_err(|e| AssetError::storage("writing upload", e))?;
        }
        file.sync_all()
            .await
            .map_err(|e| AssetError::storage("flushing upload", e))?;
        Ok(written)
    }

    /// Move the temp file to a fresh unique name
    async fn publish(&self, dir: &Path, temp_name: &str, original: &str) -> AssetResult<String> {
        for _ in 0..NAME_ATTEMPTS {
            let candidate = unique_name(original);
            match fs::try_exists(dir.join(&candidate)).await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => return Err(AssetError::storage("checking upload name", e)),
            }
            fs::rename(dir.join(temp_name), dir.join(&candidate))
                .await
                .map_err(|e| AssetError::storage("publishing upload", e))?;
            return Ok(candidate);
        }
        Err(AssetError::storage(
            "publishing upload",
            std::io::Error::new(ErrorKind::AlreadyExists, "could not find a free filename"),
        ))
    }

    fn too_large(&self, size: u64) -> AssetError {
        AssetError::invalid(format!(
            "File size {} exceeds maximum {}",
            size, self.max_upload_bytes
        ))
    }
}

/// Last component of a client-supplied filename, whichever separator it used
fn base_name(filename: &str) -> &str {
    filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim()
}

/// `name.ext` → `name-<millis>-<random>.ext`
fn unique_name(original: &str) -> String {
    let (stem, ext) = split_extension(original);
    let millis = chrono::Utc::now().timestamp_millis();
    let nonce: u32 = rand::thread_rng().gen_range(0..1_000_000_000);
    format!("{}-{}-{}{}", stem, millis, nonce, ext)
}

async fn discard_unless_marked(
    dir: &Path,
    name: &str,
    marked: AssetResult<StoredAsset>,
) -> AssetResult<StoredAsset> {
    if let Err(e) = &marked {
        warn!(file = %name, error = %e, "could not mark upload as default, removing it");
        if let Err(remove) = fs::remove_file(dir.join(name)).await {
            if remove.kind() != ErrorKind::NotFound {
                warn!(file = %name, error = %remove, "failed to remove unmarked upload");
            }
        }
    }
    marked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AssetId;

    fn stored(name: &str) -> StoredAsset {
        StoredAsset {
            id: AssetId::parse("123456").unwrap(),
            name: name.to_string(),
            path: format!("assets/12/34/56/123456/{}", name),
            is_default: true,
            already_default: false,
        }
    }

    #[tokio::test]
    async fn failed_marking_removes_the_upload() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("front-1-2.png"), b"png").unwrap();

        let failed = Err(AssetError::storage(
            "renaming front-1-2.png",
            std::io::Error::from(ErrorKind::PermissionDenied),
        ));
        let err = discard_unless_marked(tmp.path(), "front-1-2.png", failed).await.unwrap_err();
        assert_eq!(err.kind(), crate::AssetErrorKind::Storage);
        assert!(!tmp.path().join("front-1-2.png").exists());
    }

    #[tokio::test]
    async fn successful_marking_keeps_the_upload() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("front-1-2-default.png"), b"png").unwrap();

        let result = discard_unless_marked(tmp.path(), "front-1-2.png", Ok(stored("front-1-2-default.png"))).await;
        assert_eq!(result.unwrap().name, "front-1-2-default.png");
        assert!(tmp.path().join("front-1-2-default.png").exists());
    }

    #[test]
    fn base_name_strips_client_directories() {
        assert_eq!(base_name("C:\\Users\\me\\photo.png"), "photo.png");
        assert_eq!(base_name("../../etc/passwd.png"), "passwd.png");
        assert_eq!(base_name("photo.png"), "photo.png");
        assert_eq!(base_name("dir/"), "");
    }

    #[test]
    fn unique_name_keeps_stem_and_extension() {
        let name = unique_name("front.view.JPG");
        assert!(name.starts_with("front.view-"), "{name}");
        assert!(name.ends_with(".JPG"), "{name}");
        assert_ne!(unique_name("a.png"), unique_name("a.png"));
    }
}
