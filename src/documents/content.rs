use std::path::Path;

pub const UNKNOWN_FILE_TYPE: &str = "unknown";

const INLINE_TYPES: &[&str] = &["pdf", "jpg", "jpeg", "png", "gif", "bmp", "webp"];
const TEXT_TYPES: &[&str] = &["txt", "md", "csv", "json", "xml", "log", "html", "htm"];

/// Lowercased extension without the dot, or `unknown`.
#[must_use]
pub fn file_type_of(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map_or_else(|| UNKNOWN_FILE_TYPE.to_string(), str::to_lowercase)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewKind {
    /// Served as-is with its own content type.
    Inline,
    /// Served as UTF-8 text.
    Text,
    Unsupported,
}

#[must_use]
pub fn preview_kind(file_type: &str) -> PreviewKind {
    if INLINE_TYPES.contains(&file_type) {
        PreviewKind::Inline
    } else if TEXT_TYPES.contains(&file_type) {
        PreviewKind::Text
    } else {
        PreviewKind::Unsupported
    }
}

/// Human-readable size with one decimal: `1.5 MB`.
#[must_use]
pub fn format_size(bytes: i64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes.max(0) as f64;
    let mut idx = 0;
    while size >= 1024.0 && idx < UNITS.len() - 1 {
        size /= 1024.0;
        idx += 1;
    }
    format!("{size:.1} {}", UNITS[idx])
}

/// MIME type guessed from a file name.
#[must_use]
pub fn mime_type_for(file_name: &str) -> String {
    mime_guess::from_path(file_name)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// Builds a Content-Disposition value with an ASCII fallback name and the
/// UTF-8 name in `filename*`.
#[must_use]
pub fn content_disposition(disposition: &str, file_name: &str) -> String {
    let fallback: String = file_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let fallback = if fallback.trim().is_empty() {
        "download".to_string()
    } else {
        fallback
    };

    format!(
        "{disposition}; filename=\"{fallback}\"; filename*=UTF-8''{}",
        urlencoding::encode(file_name)
    )
}

/// Download name for a document: its title plus the stored extension.
#[must_use]
pub fn download_name(title: &str, suffix: Option<&str>, file_type: &str) -> String {
    let mut name = title.trim().to_string();
    if let Some(suffix) = suffix {
        name.push('_');
        name.push_str(suffix);
    }
    if file_type != UNKNOWN_FILE_TYPE {
        name.push('.');
        name.push_str(file_type);
    }
    name
}
