use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

pub const ROLE_USER: &str = "USER";
pub const ROLE_ADMIN: &str = "ADMIN";

// ============================================================================
// JWT Claims
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// User id; the requester identity for every ownership check
    pub sub: String,
    pub email: String,
    pub role: String,
    pub exp: usize,
}

impl Claims {
    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }
}

/// Sign an HS256 token for `sub`. Used by the account service and by tests.
pub fn issue_token(secret: &str, sub: &str, email: &str, role: &str, ttl_seconds: u64) -> Result<String, AppError> {
    let claims = Claims {
        sub: sub.to_owned(),
        email: email.to_owned(),
        role: role.to_owned(),
        exp: (Utc::now() + Duration::seconds(ttl_seconds as i64)).timestamp() as usize,
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|e| AppError::Internal(format!("Token encoding failed: {}", e)))
}

fn bearer_claims(req: &Request, secret: &str) -> Result<Claims, AppError> {
    let auth_header = req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::Authentication("Unauthorized".to_string()))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Authentication("Unauthorized".to_string()))?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    ).map_err(|e| {
        tracing::debug!("Rejected token: {}", e);
        AppError::Authentication("Unauthorized".to_string())
    })?;

    Ok(token_data.claims)
}

// ============================================================================
// Authentication Middleware
// ============================================================================

/// Any signed-in user. Injects `Claims` into request extensions.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let claims = bearer_claims(&req, &state.auth.secret)?;

    if claims.role != ROLE_USER && claims.role != ROLE_ADMIN {
        return Err(AppError::Forbidden("Unknown role".to_string()));
    }

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Admin-only routes.
pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let claims = bearer_claims(&req, &state.auth.secret)?;

    if !claims.is_admin() {
        return Err(AppError::Forbidden("Admin access required".to_string()));
    }

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
