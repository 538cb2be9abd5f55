use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::header::USER_AGENT;
use axum::http::request::Parts;

use crate::server::AppState;
use crate::system::Actor;

const FORWARDED_FOR: &str = "x-forwarded-for";

/// Where a request came from, for audit records.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip: Option<String>,
    pub user_agent: String,
}

impl ClientInfo {
    #[must_use]
    pub fn actor<'a>(&'a self, user_id: &'a str) -> Actor<'a> {
        Actor {
            user_id: Some(user_id),
            ip: self.ip.as_deref(),
            user_agent: &self.user_agent,
        }
    }

    #[must_use]
    pub fn anonymous(&self) -> Actor<'_> {
        Actor {
            user_id: None,
            ip: self.ip.as_deref(),
            user_agent: &self.user_agent,
        }
    }

    #[must_use]
    pub fn ip_or_unknown(&self) -> String {
        self.ip.clone().unwrap_or_else(|| "unknown".to_string())
    }
}

/// First entry of `X-Forwarded-For`, else the peer address.
fn client_ip(parts: &Parts) -> Option<String> {
    let forwarded = parts
        .headers
        .get(FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    if let Some(ip) = forwarded {
        return Some(ip.to_string());
    }

    parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

impl FromRequestParts<Arc<AppState>> for ClientInfo {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user_agent = parts
            .headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        Ok(ClientInfo {
            ip: client_ip(parts),
            user_agent,
        })
    }
}
