mod account;
mod admin;
pub mod client;
mod documents;
pub mod download;
pub mod dto;
mod public;
pub mod response;
mod router;
pub mod upload;
pub mod validation;

pub use account::account_router;
pub use admin::admin_router;
pub use client::ClientInfo;
pub use documents::documents_router;
pub use public::public_router;
pub use router::{AppState, create_router};
