use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use crate::auth::RequireAuth;
use crate::error::Error;
use crate::server::AppState;
use crate::server::dto::{
    CategoryView, CreateCategoryRequest, DocumentView, UpdateCategoryRequest,
};
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt, StoreResultExt};
use crate::server::validation::{non_blank, validate_category_name};
use crate::types::{Category, User};

/// Categories visible to `visible_to` (all of them for `None`), each with
/// its `Parent→Child` path.
pub fn category_views(
    state: &AppState,
    visible_to: Option<&str>,
) -> Result<Vec<CategoryView>, ApiError> {
    let summaries = state
        .store
        .list_categories(visible_to)
        .api_err("Failed to list categories")?;

    let names: HashMap<String, String> = summaries
        .iter()
        .map(|s| (s.category.id.clone(), s.category.name.clone()))
        .collect();

    Ok(summaries
        .into_iter()
        .map(|summary| {
            let full_path = match summary
                .category
                .parent_id
                .as_ref()
                .and_then(|id| names.get(id))
            {
                Some(parent) => format!("{parent}→{}", summary.category.name),
                None => summary.category.name.clone(),
            };
            CategoryView { summary, full_path }
        })
        .collect())
}

fn save_error(e: Error) -> ApiError {
    match e {
        Error::AlreadyExists => ApiError::conflict("Category name already exists"),
        e => ApiError::from_store(e, "Failed to save category"),
    }
}

fn load_category(state: &AppState, id: &str) -> Result<Category, ApiError> {
    state
        .store
        .get_category(id)
        .api_err("Failed to get category")?
        .or_not_found("Category not found")
}

fn load_editable(state: &AppState, user: &User, id: &str) -> Result<Category, ApiError> {
    let category = load_category(state, id)?;
    if !user.is_admin() && category.created_by.as_deref() != Some(user.id.as_str()) {
        return Err(ApiError::forbidden("You can only manage your own categories"));
    }
    Ok(category)
}

/// Categories nest one level deep.
fn check_parent(
    state: &AppState,
    parent_id: &str,
    category_id: Option<&str>,
) -> Result<(), ApiError> {
    if category_id == Some(parent_id) {
        return Err(ApiError::bad_request("A category cannot be its own parent"));
    }

    let parent = state
        .store
        .get_category(parent_id)
        .api_err("Failed to get category")?
        .ok_or_else(|| ApiError::bad_request("Parent category does not exist"))?;

    if parent.parent_id.is_some() {
        return Err(ApiError::bad_request(
            "Parent category cannot itself have a parent",
        ));
    }
    Ok(())
}

fn ensure_unique_name(state: &AppState, name: &str, except_id: Option<&str>) -> Result<(), ApiError> {
    let existing = state
        .store
        .get_category_by_name(name)
        .api_err("Failed to get category")?;
    match existing {
        Some(c) if Some(c.id.as_str()) != except_id => {
            Err(ApiError::conflict("Category name already exists"))
        }
        _ => Ok(()),
    }
}

pub async fn list_categories(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let scope = (!auth.user.is_admin()).then_some(auth.user.id.as_str());
    let views = category_views(&state, scope)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(views)))
}

pub async fn create_category(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateCategoryRequest>,
) -> impl IntoResponse {
    let name = validate_category_name(&req.name)?;
    ensure_unique_name(&state, &name, None)?;

    let parent_id = non_blank(req.parent_id);
    if let Some(parent_id) = &parent_id {
        check_parent(&state, parent_id, None)?;
    }

    let category = Category {
        id: Uuid::new_v4().to_string(),
        name,
        parent_id,
        icon: non_blank(req.icon).unwrap_or_default(),
        is_active: true,
        created_by: Some(auth.user.id.clone()),
        created_at: Utc::now(),
    };

    state
        .store
        .create_category(&category)
        .map_err(save_error)?;

    tracing::info!("User {} created category {}", auth.user.username, category.name);

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(category))))
}

pub async fn update_category(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateCategoryRequest>,
) -> impl IntoResponse {
    let mut category = load_editable(&state, &auth.user, &id)?;

    if let Some(name) = req.name {
        let name = validate_category_name(&name)?;
        ensure_unique_name(&state, &name, Some(category.id.as_str()))?;
        category.name = name;
    }

    if let Some(parent_id) = req.parent_id {
        category.parent_id = non_blank(Some(parent_id));
        if let Some(parent_id) = &category.parent_id {
            check_parent(&state, parent_id, Some(category.id.as_str()))?;

            let has_children = !state
                .store
                .list_child_categories(&category.id)
                .api_err("Failed to list categories")?
                .is_empty();
            if has_children {
                return Err(ApiError::bad_request(
                    "A category with subcategories cannot be nested",
                ));
            }
        }
    }

    if let Some(icon) = req.icon {
        category.icon = icon.trim().to_string();
    }
    if let Some(is_active) = req.is_active {
        category.is_active = is_active;
    }

    state
        .store
        .update_category(&category)
        .map_err(save_error)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(category)))
}

pub async fn delete_category(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let category = load_editable(&state, &auth.user, &id)?;
    state
        .store
        .delete_category(&category.id)
        .api_err("Failed to delete category")?;

    tracing::info!("User {} deleted category {}", auth.user.username, category.name);

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

/// The caller's documents filed under the category or one of its children.
pub async fn category_documents(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let category = load_category(&state, &id)?;

    let mut ids = vec![category.id.clone()];
    ids.extend(
        state
            .store
            .list_child_categories(&category.id)
            .api_err("Failed to list categories")?
            .into_iter()
            .map(|c| c.id),
    );

    let documents: Vec<DocumentView> = state
        .store
        .list_category_documents(&auth.user.id, &ids)
        .api_err("Failed to list documents")?
        .into_iter()
        .map(DocumentView::from)
        .collect();

    Ok::<_, ApiError>(Json(ApiResponse::success(documents)))
}
