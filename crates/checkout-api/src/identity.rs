//! # Caller Identity
//!
//! Session issuance lives outside this service. Upstream auth forwards the
//! caller as `X-User-Id` (signed-in user) or `X-Session-Token` (anonymous
//! shopper); admin calls carry `X-Admin-Token`.

use crate::error::ApiError;
use crate::state::AppState;
use axum::{extract::FromRequestParts, http::request::Parts};
use checkout_core::OwnerRef;
use checkout_razorpay::signature::constant_time_compare;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const SESSION_TOKEN_HEADER: &str = "x-session-token";
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// The cart/order owner making the request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller(pub OwnerRef);

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // A signed-in user wins over a leftover anonymous session
        if let Some(user_id) = header(parts, USER_ID_HEADER) {
            return Ok(Caller(OwnerRef::User(user_id.to_string())));
        }
        if let Some(token) = header(parts, SESSION_TOKEN_HEADER) {
            return Ok(Caller(OwnerRef::Session(token.to_string())));
        }
        Err(ApiError::Unauthorized(
            "Missing X-User-Id or X-Session-Token header",
        ))
    }
}

/// Proof that the request carries the configured admin token
#[derive(Debug, Clone, Copy)]
pub struct Admin;

impl FromRequestParts<AppState> for Admin {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let expected = state
            .config
            .admin_token
            .as_deref()
            .ok_or(ApiError::Unauthorized("Admin access is not configured"))?;

        match header(parts, ADMIN_TOKEN_HEADER) {
            Some(presented) if constant_time_compare(presented, expected) => Ok(Admin),
            _ => Err(ApiError::Unauthorized("Invalid admin token")),
        }
    }
}
