use crate::server::AppState;
use crate::server::response::{ApiError, StoreOptionExt, StoreResultExt};
use crate::types::{Category, Document, User};

pub fn load_document(state: &AppState, id: &str) -> Result<Document, ApiError> {
    state
        .store
        .get_document(id)
        .api_err("Failed to get document")?
        .or_not_found("Document not found")
}

/// A document the caller may read. Hidden documents read as missing.
pub fn load_visible(state: &AppState, user: &User, id: &str) -> Result<Document, ApiError> {
    let document = load_document(state, id)?;
    if !document.is_visible_to(user) {
        return Err(ApiError::not_found("Document not found"));
    }
    Ok(document)
}

/// A document the caller authored.
pub fn load_owned(state: &AppState, user: &User, id: &str) -> Result<Document, ApiError> {
    let document = load_document(state, id)?;
    if document.author_id != user.id {
        return Err(ApiError::forbidden("Only the author can do this"));
    }
    Ok(document)
}

/// Whether `user` may file documents under `category`: it must be active
/// and created by an administrator or by the user.
pub fn check_category_usable(
    state: &AppState,
    user: &User,
    category_id: &str,
) -> Result<Category, ApiError> {
    let category = state
        .store
        .get_category(category_id)
        .api_err("Failed to get category")?
        .ok_or_else(|| ApiError::bad_request("Category does not exist"))?;

    if !category.is_active {
        return Err(ApiError::bad_request("Category is not active"));
    }
    if user.is_admin() {
        return Ok(category);
    }

    let allowed = match category.created_by.as_deref() {
        Some(creator) if creator == user.id => true,
        Some(creator) => state
            .store
            .get_user(creator)
            .api_err("Failed to get category owner")?
            .is_some_and(|u| u.is_admin()),
        None => false,
    };

    if !allowed {
        return Err(ApiError::bad_request("Category is not available"));
    }
    Ok(category)
}

/// Display names for a document's author and category.
pub fn display_names(
    state: &AppState,
    document: &Document,
) -> Result<(String, Option<String>), ApiError> {
    let author = state
        .store
        .get_user(&document.author_id)
        .api_err("Failed to get author")?
        .map(|u| u.display_name())
        .unwrap_or_default();

    let category = match &document.category_id {
        Some(id) => state
            .store
            .get_category(id)
            .api_err("Failed to get category")?
            .map(|c| c.name),
        None => None,
    };

    Ok((author, category))
}
