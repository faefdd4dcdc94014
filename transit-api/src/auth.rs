use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use transit_shared::UserId;

use crate::error::AppError;
use crate::state::{AppState, AuthConfig};

// ============================================================================
// JWT Claims
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Numeric user id, as a string.
    pub sub: String,
    pub role: String,
    pub exp: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Booking,
    Ops,
}

impl Role {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "admin" => Some(Role::Admin),
            "booking" => Some(Role::Booking),
            "ops" => Some(Role::Ops),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Booking => "booking",
            Role::Ops => "ops",
        }
    }
}

/// Authenticated principal, inserted into request extensions by the guards.
#[derive(Debug, Clone, Copy)]
pub struct Caller {
    pub user_id: UserId,
}

fn authenticate(auth: &AuthConfig, headers: &HeaderMap) -> Result<(UserId, String), AppError> {
    let bearer = headers
        .typed_get::<Authorization<Bearer>>()
        .ok_or_else(|| AppError::AuthenticationError("missing bearer token".into()))?;

    let token_data = decode::<Claims>(
        bearer.token(),
        &DecodingKey::from_secret(auth.secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        debug!(error = %e, "Token rejected");
        AppError::AuthenticationError("invalid or expired token".into())
    })?;

    let user_id = token_data
        .claims
        .sub
        .parse::<UserId>()
        .map_err(|_| AppError::AuthenticationError("token subject is not a user id".into()))?;

    Ok((user_id, token_data.claims.role))
}

async fn guard(state: &AppState, mut req: Request, next: Next, allowed: &[Role]) -> Result<Response, AppError> {
    let (user_id, role) = authenticate(&state.auth, req.headers())?;

    if !Role::parse(&role).is_some_and(|r| allowed.contains(&r)) {
        warn!(user_id, role = %role, path = %req.uri().path(), "Role not permitted");
        return Err(AppError::AuthorizationError("insufficient role".into()));
    }

    req.extensions_mut().insert(Caller { user_id });
    Ok(next.run(req).await)
}

// ============================================================================
// Role Guards
// ============================================================================

pub async fn require_admin(State(state): State<AppState>, req: Request, next: Next) -> Result<Response, AppError> {
    guard(&state, req, next, &[Role::Admin]).await
}

pub async fn require_booking(State(state): State<AppState>, req: Request, next: Next) -> Result<Response, AppError> {
    guard(&state, req, next, &[Role::Booking, Role::Admin]).await
}

pub async fn require_ops(State(state): State<AppState>, req: Request, next: Next) -> Result<Response, AppError> {
    guard(&state, req, next, &[Role::Ops, Role::Admin]).await
}
