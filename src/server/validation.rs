use chrono::NaiveDate;

use crate::server::response::ApiError;

const MAX_TITLE_LEN: usize = 255;
const MAX_FILE_NAME_LEN: usize = 255;
const MAX_CATEGORY_NAME_LEN: usize = 100;

fn validate_text(value: &str, entity: &str, max_len: usize) -> Result<String, String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(format!("{entity} cannot be empty"));
    }
    if value.chars().count() > max_len {
        return Err(format!("{entity} cannot exceed {max_len} characters"));
    }
    Ok(value.to_string())
}

pub fn validate_title(title: &str) -> Result<String, ApiError> {
    validate_text(title, "Title", MAX_TITLE_LEN).map_err(ApiError::bad_request)
}

pub fn validate_file_name(name: &str) -> Result<String, ApiError> {
    let name = validate_text(name, "File name", MAX_FILE_NAME_LEN).map_err(ApiError::bad_request)?;
    // Browsers may send a full client path.
    Ok(name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(&name)
        .to_string())
}

pub fn validate_category_name(name: &str) -> Result<String, ApiError> {
    validate_text(name, "Category name", MAX_CATEGORY_NAME_LEN).map_err(ApiError::bad_request)
}

/// Parses a `YYYY-MM-DD` filter. Malformed or empty dates are ignored.
#[must_use]
pub fn parse_date(value: Option<&str>) -> Option<NaiveDate> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| NaiveDate::parse_from_str(v, "%Y-%m-%d").ok())
}

/// Interprets a multipart checkbox value.
#[must_use]
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "on" | "yes"
    )
}

/// Treats blank optional strings as absent.
#[must_use]
pub fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
