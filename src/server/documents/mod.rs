mod access;
mod categories;
mod files;
mod handlers;
mod shares;
mod versions;

use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, patch, post},
};

use crate::server::AppState;

pub fn documents_router() -> Router<Arc<AppState>> {
    Router::new()
        // Document routes
        .route(
            "/documents",
            get(handlers::list_documents).post(handlers::upload_document),
        )
        .route("/documents/facets", get(handlers::get_facets))
        .route("/documents/batch-delete", post(handlers::batch_delete))
        .route(
            "/documents/{id}",
            get(handlers::get_document)
                .patch(handlers::update_document)
                .delete(handlers::delete_document),
        )
        .route("/documents/{id}/download", get(files::download_document))
        .route("/documents/{id}/preview", get(files::preview_document))
        .route("/documents/{id}/star", post(handlers::toggle_star))
        .route("/documents/{id}/info", get(handlers::get_document_info))
        .route("/documents/{id}/logs", get(handlers::list_document_logs))
        // Version routes
        .route(
            "/documents/{id}/versions",
            get(versions::list_versions).post(versions::upload_version),
        )
        .route(
            "/documents/{id}/versions/{vid}/download",
            get(versions::download_version),
        )
        .route(
            "/documents/{id}/versions/{vid}/restore",
            post(versions::restore_version),
        )
        // Share routes
        .route("/documents/{id}/shares", post(shares::create_share))
        .route("/shares", get(shares::list_shares))
        .route("/shares/{id}", delete(shares::delete_share))
        .route("/shares/{id}/disable", post(shares::disable_share))
        .route("/shares/{id}/enable", post(shares::enable_share))
        // Category routes
        .route(
            "/categories",
            get(categories::list_categories).post(categories::create_category),
        )
        .route(
            "/categories/{id}",
            patch(categories::update_category).delete(categories::delete_category),
        )
        .route(
            "/categories/{id}/documents",
            get(categories::category_documents),
        )
}
