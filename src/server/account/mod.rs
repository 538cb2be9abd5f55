mod auth;
mod dashboard;
mod profile;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};

use crate::server::AppState;

pub fn account_router() -> Router<Arc<AppState>> {
    Router::new()
        // Session routes
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/change-password", post(auth::change_password))
        // Profile routes
        .route("/me", get(profile::get_me).patch(profile::update_me))
        .route("/me/storage", get(profile::get_storage))
        .route("/me/login-logs", get(profile::list_login_logs))
        .route("/dashboard", get(dashboard::get_dashboard))
}
