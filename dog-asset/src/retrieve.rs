use std::future::Future;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use image::ImageFormat;
use tokio::fs;
use tokio::sync::Semaphore;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use crate::layout::scan_dir;
use crate::marker::is_default;
use crate::mime::{content_type_for, raster_format};
use crate::transform::{carries_density, transform_image, TransformSpec};
use crate::{
    AssetConfig, AssetError, AssetId, AssetResult, Layout, Rendition, ResizePolicy, ResizeQuery,
    TransformRequest,
};

/// A racing rename can make the chosen file vanish between listing and open.
const RESOLVE_ATTEMPTS: usize = 3;

/// Locates an identifier's default asset and renders it, transformed or not
#[derive(Clone)]
pub struct RetrievalService {
    layout: Layout,
    transforms: Arc<Semaphore>,
    resize_policy: ResizePolicy,
    default_quality: u8,
    cache_max_age_secs: u64,
}

impl RetrievalService {
    pub fn new(layout: Layout, config: &AssetConfig) -> Self {
        Self {
            layout,
            transforms: Arc::new(Semaphore::new(config.max_concurrent_transforms)),
            resize_policy: config.resize_policy,
            default_quality: config.default_quality,
            cache_max_age_secs: config.transform_cache_max_age_secs,
        }
    }

    /// Serve the default asset of `id` (or the first file when none is marked).
    ///
    /// Without transform parameters the file is streamed byte-for-byte and
    /// never decoded.
    pub async fn retrieve(&self, id: &AssetId, transform: Option<TransformRequest>) -> AssetResult<Rendition> {
        let request = transform.unwrap_or_default();
        request.validate()?;
        let dir = self.layout.directory(id)?;

        let (dir, request) = (&dir, &request);
        reresolving(id, || async move {
            let name = self.resolve(dir, id).await?;
            self.render(dir.join(&name), name, request, self.resize_policy)
                .await
        })
        .await
    }

    /// Path-addressed variant: `relative_path` is below the root segment.
    ///
    /// Only `w`/`h` trigger a transform, which never enlarges the source.
    pub async fn serve_path(&self, relative_path: &str, query: ResizeQuery) -> AssetResult<Rendition> {
        let path = self.resolve_relative(relative_path)?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| AssetError::invalid(format!("Invalid asset path: {}", relative_path)))?;

        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Err(AssetError::not_found(relative_path)),
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(AssetError::not_found(relative_path)),
            Err(e) => return Err(AssetError::storage("reading asset metadata", e)),
        }

        let request = if query.is_requested() {
            let request = query.to_transform();
            request.validate()?;
            debug!(path = %relative_path, w = ?query.w, h = ?query.h, q = ?query.q, "resizing on the fly");
            request
        } else {
            TransformRequest::default()
        };

        self.render(path, name, &request, ResizePolicy::WithoutEnlargement)
            .await
            .map_err(|e| {
                if vanished(&e) {
                    AssetError::not_found(relative_path)
                } else {
                    e
                }
            })
    }

    async fn resolve(&self, dir: &Path, id: &AssetId) -> AssetResult<String> {
        let names = scan_dir(dir)
            .await?
            .ok_or_else(|| AssetError::not_found(format!("asset {}", id)))?;
        select_rendition(&names)
            .cloned()
            .ok_or_else(|| AssetError::not_found(format!("no assets stored for {}", id)))
    }

    async fn render(
        &self,
        path: PathBuf,
        name: String,
        request: &TransformRequest,
        policy: ResizePolicy,
    ) -> AssetResult<Rendition> {
        match raster_format(&name) {
            Some(format) if request.is_requested() => {
                if request.width.is_none() && request.height.is_none() && !carries_density(format) {
                    debug!(file = %name, dpi = ?request.dpi, "format has no density field, serving unmodified");
                    return self.render_stream(path, name).await;
                }
                let spec = TransformSpec {
                    width: request.width,
                    height: request.height,
                    dpi: request.dpi,
                    quality: request.effective_quality(self.default_quality),
                    policy,
                };
                self.render_transformed(path, name, format, spec).await
            }
            _ => self.render_stream(path, name).await,
        }
    }

    async fn render_stream(&self, path: PathBuf, name: String) -> AssetResult<Rendition> {
        let file = fs::File::open(&path)
            .await
            .map_err(|e| AssetError::storage("opening asset", e))?;
        let size = file
            .metadata()
            .await
            .map_err(|e| AssetError::storage("reading asset metadata", e))?
            .len();
        let content_type = content_type_for(&name).to_string();
        Ok(Rendition::stream(
            name,
            content_type,
            Box::pin(ReaderStream::new(file)),
            size,
        ))
    }

    async fn render_transformed(
        &self,
        path: PathBuf,
        name: String,
        format: ImageFormat,
        spec: TransformSpec,
    ) -> AssetResult<Rendition> {
        let permit = self
            .transforms
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| AssetError::transform("transform pool is closed", e))?;

        let data = fs::read(&path)
            .await
            .map_err(|e| AssetError::storage("reading asset", e))?;

        let output = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            transform_image(&data, format, &spec)
        })
        .await
        .map_err(|e| AssetError::transform("transform task failed", e))?
        .map_err(|e| {
            warn!(file = %name, error = %e, "image transform failed");
            e
        })?;

        debug!(file = %name, width = output.width, height = output.height, "image transformed");
        Ok(Rendition::transformed(
            name,
            output.content_type.to_string(),
            output.data,
            self.cache_max_age_secs,
        ))
    }

    fn resolve_relative(&self, relative_path: &str) -> AssetResult<PathBuf> {
        let mut path = self.layout.root_dir();
        let mut depth = 0;
        for component in Path::new(relative_path.trim_start_matches('/')).components() {
            match component {
                Component::Normal(part) => {
                    if part.to_string_lossy().starts_with('.') {
                        return Err(AssetError::invalid(format!("Invalid asset path: {}", relative_path)));
                    }
                    path.push(part);
                    depth += 1;
                }
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(AssetError::invalid(format!("Invalid asset path: {}", relative_path)));
                }
            }
        }
        if depth == 0 {
            return Err(AssetError::invalid("Asset path is required"));
        }
        Ok(path)
    }
}

/// Prefer the marked default (first by name if several); otherwise the first file by name.
///
/// `names` must already be sorted.
pub fn select_rendition(names: &[String]) -> Option<&String> {
    names
        .iter()
        .find(|name| is_default(name))
        .or_else(|| names.first())
}

/// Run `attempt` (resolve + render) again when the file it picked vanished,
/// up to [`RESOLVE_ATTEMPTS`] times in total.
async fn reresolving<T, F, Fut>(id: &AssetId, mut attempt: F) -> AssetResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AssetResult<T>>,
{
    let mut tries = 1;
    loop {
        match attempt().await {
            Err(e) if vanished(&e) && tries < RESOLVE_ATTEMPTS => {
                debug!(%id, attempt = tries, "asset moved during retrieval, resolving again");
                tries += 1;
            }
            other => return other,
        }
    }
}

fn vanished(error: &AssetError) -> bool {
    matches!(error, AssetError::Storage { source, .. } if source.kind() == ErrorKind::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn default_wins_over_listing_order() {
        let list = names(&["a.png", "b-default.png", "c.png"]);
        assert_eq!(select_rendition(&list).map(String::as_str), Some("b-default.png"));
    }

    #[test]
    fn falls_back_to_first_name() {
        let list = names(&["a.png", "b.png"]);
        assert_eq!(select_rendition(&list).map(String::as_str), Some("a.png"));
        assert_eq!(select_rendition(&[]), None);
    }

    #[test]
    fn two_defaults_resolve_deterministically() {
        let list = names(&["a-default.png", "b-default.png"]);
        assert_eq!(select_rendition(&list).map(String::as_str), Some("a-default.png"));
    }

    #[test]
    fn relative_paths_cannot_escape_root() {
        let service = RetrievalService::new(Layout::new("/srv", "assets"), &AssetConfig::default());
        assert!(service.resolve_relative("../secret.png").is_err());
        assert!(service.resolve_relative("12/../../x.png").is_err());
        assert!(service.resolve_relative("12/34/.upload-x.part").is_err());
        assert!(service.resolve_relative("").is_err());
        assert_eq!(
            service.resolve_relative("/12/34/56/123456/a.png").unwrap(),
            PathBuf::from("/srv/assets/12/34/56/123456/a.png")
        );
    }

    #[test]
    fn only_missing_files_count_as_vanished() {
        let missing = AssetError::storage("opening asset", io::Error::from(io::ErrorKind::NotFound));
        let denied = AssetError::storage("opening asset", io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(vanished(&missing));
        assert!(!vanished(&denied));
        assert!(!vanished(&AssetError::not_found("asset 123456")));
        assert!(!vanished(&AssetError::transform_msg("bad image")));
    }

    fn service_in(root: &Path) -> RetrievalService {
        RetrievalService::new(Layout::new(root, "assets"), &AssetConfig::default())
    }

    #[tokio::test]
    async fn stale_name_is_reported_as_vanished() {
        let tmp = tempfile::tempdir().unwrap();
        let service = service_in(tmp.path());
        let err = service
            .render(
                tmp.path().join("gone-default.pdf"),
                "gone-default.pdf".to_string(),
                &TransformRequest::default(),
                ResizePolicy::WithoutEnlargement,
            )
            .await
            .unwrap_err();
        assert!(vanished(&err));
    }

    #[tokio::test]
    async fn retrieval_follows_default_moved_after_resolution() {
        let tmp = tempfile::tempdir().unwrap();
        let service = service_in(tmp.path());
        let id = AssetId::parse("123456").unwrap();
        let dir = service.layout.directory(&id).unwrap();
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("a-default.pdf"), b"first").unwrap();
        std::fs::write(dir.join("b.pdf"), b"second").unwrap();

        let request = TransformRequest::default();
        let calls = AtomicUsize::new(0);
        let (service_ref, dir_ref, id_ref, request_ref, calls_ref) = (&service, &dir, &id, &request, &calls);
        let rendition = reresolving(id_ref, || async move {
            let name = service_ref.resolve(dir_ref, id_ref).await?;
            if calls_ref.fetch_add(1, Ordering::SeqCst) == 0 {
                // A concurrent set_default("b.pdf") lands between resolve and open.
                std::fs::rename(dir_ref.join("a-default.pdf"), dir_ref.join("a.pdf")).unwrap();
                std::fs::rename(dir_ref.join("b.pdf"), dir_ref.join("b-default.pdf")).unwrap();
            }
            service_ref
                .render(dir_ref.join(&name), name, request_ref, ResizePolicy::WithoutEnlargement)
                .await
        })
        .await
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(rendition.source_name, "b-default.pdf");
        assert_eq!(&rendition.into_bytes().await.unwrap()[..], b"second");

        // The public path resolves the moved marker directly.
        let rendition = service.retrieve(&id, None).await.unwrap();
        assert_eq!(rendition.source_name, "b-default.pdf");
    }

    #[tokio::test]
    async fn re_resolution_is_bounded() {
        let id = AssetId::parse("123456").unwrap();
        let calls = AtomicUsize::new(0);
        let calls_ref = &calls;
        let result: AssetResult<()> = reresolving(&id, || async move {
            calls_ref.fetch_add(1, Ordering::SeqCst);
            Err(AssetError::storage("opening asset", io::Error::from(io::ErrorKind::NotFound)))
        })
        .await;
        assert!(vanished(&result.unwrap_err()));
        assert_eq!(calls.load(Ordering::SeqCst), RESOLVE_ATTEMPTS);
    }

    #[tokio::test]
    async fn other_storage_errors_are_not_retried() {
        let id = AssetId::parse("123456").unwrap();
        let calls = AtomicUsize::new(0);
        let calls_ref = &calls;
        let result: AssetResult<()> = reresolving(&id, || async move {
            calls_ref.fetch_add(1, Ordering::SeqCst);
            Err(AssetError::storage("opening asset", io::Error::from(io::ErrorKind::PermissionDenied)))
        })
        .await;
        assert_eq!(result.unwrap_err().kind(), crate::AssetErrorKind::Storage);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
