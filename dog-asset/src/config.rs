use std::env;
use std::path::PathBuf;

use crate::{AssetError, AssetResult};

/// How a resize treats targets larger than the source image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizePolicy {
    /// Keep the source dimensions when the target would enlarge the image
    WithoutEnlargement,
    /// Scale up to the requested dimensions
    AllowEnlargement,
}

/// Configuration for asset operations
#[derive(Debug, Clone)]
pub struct AssetConfig {
    /// Filesystem directory under which the root segment lives
    pub base_dir: PathBuf,

    /// Fixed first segment of every sharded path
    pub root_segment: String,

    /// Absolute max size allowed for a single upload (safety guard)
    pub max_upload_bytes: u64,

    /// Applies to retrieval transforms; the path-based transform never enlarges
    pub resize_policy: ResizePolicy,

    /// Encoder quality used when the caller does not ask for one
    pub default_quality: u8,

    /// Upper bound on transforms decoding at the same time
    pub max_concurrent_transforms: usize,

    /// `max-age` advertised on transformed renditions
    pub transform_cache_max_age_secs: u64,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            root_segment: "assets".to_string(),
            max_upload_bytes: 10 * 1024 * 1024, // 10MB
            resize_policy: ResizePolicy::WithoutEnlargement,
            default_quality: 80,
            max_concurrent_transforms: 4,
            transform_cache_max_age_secs: 24 * 60 * 60,
        }
    }
}

impl AssetConfig {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a config from `ASSET_*` environment variables.
    ///
    /// Unset variables keep their defaults; values that fail to parse are
    /// rejected rather than silently ignored.
    pub fn from_env() -> AssetResult<Self> {
        fn parse_env<T: std::str::FromStr>(key: &str) -> AssetResult<Option<T>> {
            match env::var(key) {
                Ok(raw) => raw
                    .trim()
                    .parse()
                    .map(Some)
                    .map_err(|_| AssetError::invalid(format!("{} has an invalid value: {}", key, raw))),
                Err(_) => Ok(None),
            }
        }

        let mut config = Self::default();
        if let Ok(dir) = env::var("ASSET_BASE_DIR") {
            config.base_dir = PathBuf::from(dir);
        }
        if let Ok(segment) = env::var("ASSET_ROOT_SEGMENT") {
            config.root_segment = segment;
        }
        if let Some(bytes) = parse_env::<u64>("ASSET_MAX_UPLOAD_BYTES")? {
            config.max_upload_bytes = bytes;
        }
        if let Some(permits) = parse_env::<usize>("ASSET_MAX_CONCURRENT_TRANSFORMS")? {
            config.max_concurrent_transforms = permits;
        }
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the adapter cannot run with
    pub fn validate(&self) -> AssetResult<()> {
        if self.root_segment.is_empty() || self.root_segment.contains(['/', '\\']) {
            return Err(AssetError::invalid(format!(
                "root segment must be a single path component, got {:?}",
                self.root_segment
            )));
        }
        if self.max_concurrent_transforms == 0 {
            return Err(AssetError::invalid("max_concurrent_transforms must be at least 1"));
        }
        if !(1..=100).contains(&self.default_quality) {
            return Err(AssetError::invalid("default_quality must be between 1 and 100"));
        }
        Ok(())
    }

    /// Directory that holds the root segment
    pub fn with_base_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.base_dir = dir.into();
        self
    }

    pub fn with_root_segment<S: Into<String>>(mut self, segment: S) -> Self {
        self.root_segment = segment.into();
        self
    }

    /// Set max upload size
    pub fn with_max_upload_bytes(mut self, bytes: u64) -> Self {
        self.max_upload_bytes = bytes;
        self
    }

    pub fn with_resize_policy(mut self, policy: ResizePolicy) -> Self {
        self.resize_policy = policy;
        self
    }

    /// Set the fallback encoder quality (clamped to 1-100)
    pub fn with_default_quality(mut self, quality: u8) -> Self {
        self.default_quality = quality.clamp(1, 100);
        self
    }

    pub fn with_max_concurrent_transforms(mut self, permits: usize) -> Self {
        self.max_concurrent_transforms = permits;
        self
    }

    pub fn with_transform_cache_max_age(mut self, secs: u64) -> Self {
        self.transform_cache_max_age_secs = secs;
        self
    }
}
