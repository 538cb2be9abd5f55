//! Document rules that do not depend on HTTP or storage.

mod content;
mod sharing;
mod versioning;

pub use content::{
    PreviewKind, UNKNOWN_FILE_TYPE, content_disposition, download_name, file_type_of, format_size,
    mime_type_for, preview_kind,
};
pub use sharing::{MAX_SHARE_DAYS, ShareDenied, check_share_access, resolve_share_expiry};
pub use versioning::next_version_label;
