use image::ImageFormat;

use crate::marker::split_extension;

const OCTET_STREAM: &str = "application/octet-stream";

struct MediaEntry {
    extensions: &'static [&'static str],
    content_type: &'static str,
    /// Extra MIME spellings clients send for the same format
    aliases: &'static [&'static str],
    uploadable: bool,
    raster: Option<ImageFormat>,
}

const MEDIA_TABLE: &[MediaEntry] = &[
    MediaEntry {
        extensions: &["jpg", "jpeg"],
        content_type: "image/jpeg",
        aliases: &["image/jpg", "image/pjpeg"],
        uploadable: true,
        raster: Some(ImageFormat::Jpeg),
    },
    MediaEntry {
        extensions: &["png"],
        content_type: "image/png",
        aliases: &[],
        uploadable: true,
        raster: Some(ImageFormat::Png),
    },
    MediaEntry {
        extensions: &["gif"],
        content_type: "image/gif",
        aliases: &[],
        uploadable: true,
        raster: Some(ImageFormat::Gif),
    },
    MediaEntry {
        extensions: &["webp"],
        content_type: "image/webp",
        aliases: &[],
        uploadable: false,
        raster: Some(ImageFormat::WebP),
    },
    MediaEntry {
        extensions: &["pdf"],
        content_type: "application/pdf",
        aliases: &[],
        uploadable: true,
        raster: None,
    },
    MediaEntry {
        extensions: &["doc"],
        content_type: "application/msword",
        aliases: &[],
        uploadable: true,
        raster: None,
    },
    MediaEntry {
        extensions: &["docx"],
        content_type: "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        aliases: &[],
        uploadable: true,
        raster: None,
    },
    MediaEntry {
        extensions: &["xls"],
        content_type: "application/vnd.ms-excel",
        aliases: &[],
        uploadable: true,
        raster: None,
    },
    MediaEntry {
        extensions: &["xlsx"],
        content_type: "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        aliases: &[],
        uploadable: true,
        raster: None,
    },
];

fn lookup(name: &str) -> Option<&'static MediaEntry> {
    let (_, ext) = split_extension(name);
    let ext = ext.strip_prefix('.')?.to_ascii_lowercase();
    MEDIA_TABLE
        .iter()
        .find(|entry| entry.extensions.contains(&ext.as_str()))
}

/// Content type derived from a filename's extension
pub fn content_type_for(name: &str) -> &'static str {
    lookup(name).map_or(OCTET_STREAM, |entry| entry.content_type)
}

/// Whether uploads with this filename's extension are accepted
pub fn is_upload_allowed(name: &str) -> bool {
    lookup(name).is_some_and(|entry| entry.uploadable)
}

/// Whether a declared MIME type agrees with the filename's extension.
///
/// Parameters (`; charset=...`) and case are ignored.
pub fn declared_type_matches(name: &str, declared: &str) -> bool {
    let Some(entry) = lookup(name) else {
        return false;
    };
    let essence = declared
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == entry.content_type || entry.aliases.contains(&essence.as_str())
}

/// Raster format for files the transform path can decode
pub fn raster_format(name: &str) -> Option<ImageFormat> {
    lookup(name).and_then(|entry| entry.raster)
}

/// Human-readable list of accepted upload extensions
pub fn allowed_upload_extensions() -> Vec<&'static str> {
    MEDIA_TABLE
        .iter()
        .filter(|entry| entry.uploadable)
        .flat_map(|entry| entry.extensions.iter().copied())
        .collect()
}
