//! Default-marker filename convention.
//!
//! The default rendition of an identifier carries [`DEFAULT_MARKER`]
//! immediately before its extension: `photo.png` becomes `photo-default.png`.
//! Detection is a plain substring test, so uploads whose name already
//! contains the marker are refused by the writer.

pub const DEFAULT_MARKER: &str = "-default";

/// Whether a filename carries the default marker
pub fn is_default(name: &str) -> bool {
    name.contains(DEFAULT_MARKER)
}

/// Split `name` into stem and extension (extension keeps its dot).
///
/// A leading dot does not start an extension, matching `Path::extension`.
pub fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => name.split_at(idx),
        _ => (name, ""),
    }
}

/// Insert the marker before the extension. Names already marked are returned unchanged.
pub fn mark(name: &str) -> String {
    if is_default(name) {
        return name.to_string();
    }
    let (stem, ext) = split_extension(name);
    format!("{}{}{}", stem, DEFAULT_MARKER, ext)
}

/// Remove the marker, preserving the extension
pub fn unmark(name: &str) -> String {
    let (stem, ext) = split_extension(name);
    if let Some(bare) = stem.strip_suffix(DEFAULT_MARKER) {
        return format!("{}{}", bare, ext);
    }
    name.replacen(DEFAULT_MARKER, "", 1)
}
