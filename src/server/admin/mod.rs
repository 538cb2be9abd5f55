mod backups;
mod config;
mod dashboard;
mod logs;
mod reviews;
mod users;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};

use crate::server::AppState;

pub fn admin_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/dashboard", get(dashboard::get_dashboard))
        // User routes
        .route("/users", get(users::list_users).post(users::create_user))
        .route("/users/departments", get(users::list_departments))
        .route(
            "/users/{id}",
            get(users::get_user)
                .patch(users::update_user)
                .delete(users::delete_user),
        )
        .route("/users/{id}/freeze", post(users::freeze_user))
        .route("/users/{id}/unfreeze", post(users::unfreeze_user))
        .route("/users/{id}/reset-password", post(users::reset_password))
        .route("/users/{id}/logs", get(users::list_user_logs))
        // Configuration routes
        .route("/config", get(config::get_config).put(config::update_config))
        // Review routes
        .route("/reviews", get(reviews::list_reviews))
        .route("/reviews/{id}", post(reviews::decide_review))
        // Audit log routes
        .route("/logs/system", get(logs::list_system_logs))
        .route("/logs/login", get(logs::list_login_logs))
        .route("/logs/documents", get(logs::list_document_logs))
        // Backup routes
        .route(
            "/backups",
            get(backups::list_backups).post(backups::create_backup),
        )
        .route(
            "/backups/{id}",
            get(backups::get_backup).delete(backups::delete_backup),
        )
        .route("/backups/{id}/download", get(backups::download_backup))
}
