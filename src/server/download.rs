use axum::body::Body;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use tokio::fs::File;
use tokio::io::BufReader;
use tokio_util::io::ReaderStream;

use crate::documents::{content_disposition, mime_type_for};
use crate::storage::FileStoreError;
use crate::server::response::ApiError;

pub enum Disposition {
    Attachment,
    Inline,
}

impl Disposition {
    const fn as_str(&self) -> &'static str {
        match self {
            Self::Attachment => "attachment",
            Self::Inline => "inline",
        }
    }
}

/// Maps a blob lookup failure to an API error.
pub fn missing_file(e: FileStoreError) -> ApiError {
    match e {
        FileStoreError::NotFound => ApiError::not_found("File not found"),
        e => {
            tracing::error!("Failed to open stored file: {e}");
            ApiError::internal("Failed to read file")
        }
    }
}

/// Streams a file from disk with a content type guessed from `file_name`.
pub fn stream_file(
    reader: BufReader<File>,
    size: i64,
    file_name: &str,
    disposition: Disposition,
) -> Response {
    let content_type = mime_type_for(file_name);
    let disposition = content_disposition(disposition.as_str(), file_name);

    let body = Body::from_stream(ReaderStream::new(reader));

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, size)
        .header("X-Content-Type-Options", "nosniff");

    if let Ok(value) = HeaderValue::from_str(&disposition) {
        builder = builder.header(header::CONTENT_DISPOSITION, value);
    }

    builder
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
