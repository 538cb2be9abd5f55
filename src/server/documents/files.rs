use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};

use super::access::load_visible;
use crate::auth::RequireAuth;
use crate::documents::{PreviewKind, download_name, preview_kind};
use crate::server::AppState;
use crate::server::client::ClientInfo;
use crate::server::download::{Disposition, missing_file, stream_file};
use crate::server::response::{ApiError, StoreResultExt};
use crate::system::audit;
use crate::types::DocumentOperation;

/// Text previews are cut at this many bytes.
const TEXT_PREVIEW_LIMIT: usize = 1024 * 1024;

pub async fn download_document(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let document = load_visible(&state, &auth.user, &id)?;

    let (reader, size) = state
        .files
        .open_current(&document.id)
        .await
        .map_err(missing_file)?;

    state
        .store
        .increment_download_count(&document.id)
        .api_err("Failed to count download")?;

    audit::document_event(
        state.store.as_ref(),
        &document.id,
        DocumentOperation::Download,
        client.actor(&auth.user.id),
        None,
    );

    let name = download_name(&document.title, None, &document.file_type);
    Ok(stream_file(reader, size, &name, Disposition::Attachment))
}

pub async fn preview_document(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let document = load_visible(&state, &auth.user, &id)?;
    let name = download_name(&document.title, None, &document.file_type);

    match preview_kind(&document.file_type) {
        PreviewKind::Inline => {
            let (reader, size) = state
                .files
                .open_current(&document.id)
                .await
                .map_err(missing_file)?;
            Ok(stream_file(reader, size, &name, Disposition::Inline))
        }
        PreviewKind::Text => {
            let bytes = state
                .files
                .read_current_prefix(&document.id, TEXT_PREVIEW_LIMIT)
                .await
                .map_err(missing_file)?;
            let text = String::from_utf8_lossy(&bytes).into_owned();
            Ok((
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                text,
            )
                .into_response())
        }
        PreviewKind::Unsupported => Err(ApiError::unsupported_media_type(format!(
            "Preview is not available for '{}' files",
            document.file_type
        ))),
    }
}
