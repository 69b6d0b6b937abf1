use axum::{
    extract::Request,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::config::get_config;
use crate::error::{Error, Result};

pub const SYSTEM_SECRET_HEADER: &str = "x-system-secret";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub role: Option<String>,
}

impl Claims {
    /// The authenticated student; `sub` carries the student id.
    pub fn student_id(&self) -> Result<Uuid> {
        Uuid::parse_str(&self.sub)
            .map_err(|_| Error::Unauthorized("token subject is not a student id".into()))
    }
}

fn unauthorized(code: &str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "error": code }))).into_response()
}

fn bearer_token(headers: &HeaderMap) -> std::result::Result<&str, &'static str> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or("missing_authorization")?;
    let value = header.to_str().map_err(|_| "bad_authorization")?;
    value.strip_prefix("Bearer ").ok_or("unsupported_scheme")
}

pub fn decode_claims(token: &str, secret: &str) -> Option<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .ok()
        .map(|data| data.claims)
}

/// Accepts a valid HS256 bearer token for a student. Tokens without a role
/// are treated as student tokens.
pub async fn require_student(mut req: Request, next: Next) -> Response {
    let token = match bearer_token(req.headers()) {
        Ok(token) => token,
        Err(code) => return unauthorized(code),
    };
    let Some(claims) = decode_claims(token, &get_config().jwt_secret) else {
        return unauthorized("invalid_token");
    };

    let is_student = claims
        .role
        .as_deref()
        .map_or(true, |role| role.eq_ignore_ascii_case("student"));
    if !is_student || claims.student_id().is_err() {
        tracing::warn!(sub = %claims.sub, role = ?claims.role, "non-student token rejected");
        return (StatusCode::FORBIDDEN, Json(json!({ "error": "forbidden" }))).into_response();
    }

    req.extensions_mut().insert(claims);
    next.run(req).await
}

/// Guards the scheduler-facing routes with a shared secret header.
pub async fn require_system_secret(req: Request, next: Next) -> Response {
    match verify_system_secret(req.headers(), &get_config().system_secret) {
        Ok(()) => next.run(req).await,
        Err(e) => e.into_response(),
    }
}

pub fn verify_system_secret(headers: &HeaderMap, expected: &str) -> Result<()> {
    let Some(provided) = headers.get(SYSTEM_SECRET_HEADER) else {
        return Err(Error::Unauthorized("missing_system_secret".into()));
    };
    let provided = provided
        .to_str()
        .map_err(|_| Error::Unauthorized("invalid_secret_header".into()))?;
    if !expected.is_empty() && bool::from(provided.as_bytes().ct_eq(expected.as_bytes())) {
        Ok(())
    } else {
        Err(Error::Unauthorized("invalid_system_secret".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token(sub: &str, role: Option<&str>, secret: &str) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            exp: (chrono::Utc::now().timestamp() + 3600) as usize,
            role: role.map(str::to_string),
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[test]
    fn decodes_tokens_signed_with_the_shared_secret() {
        let id = Uuid::new_v4();
        let claims = decode_claims(&token(&id.to_string(), Some("student"), "s3cret"), "s3cret")
            .expect("valid token");
        assert_eq!(claims.student_id().unwrap(), id);
        assert!(decode_claims(&token(&id.to_string(), None, "other"), "s3cret").is_none());
    }

    #[test]
    fn non_uuid_subject_is_not_a_student() {
        let claims = Claims {
            sub: "staff-7".into(),
            exp: 0,
            role: None,
        };
        assert!(matches!(claims.student_id(), Err(Error::Unauthorized(_))));
    }

    #[test]
    fn system_secret_must_match_exactly() {
        let mut headers = HeaderMap::new();
        assert!(verify_system_secret(&headers, "sweep-key").is_err());

        headers.insert(SYSTEM_SECRET_HEADER, HeaderValue::from_static("sweep-ke"));
        assert!(verify_system_secret(&headers, "sweep-key").is_err());

        headers.insert(SYSTEM_SECRET_HEADER, HeaderValue::from_static("sweep-key"));
        assert!(verify_system_secret(&headers, "sweep-key").is_ok());
        assert!(verify_system_secret(&headers, "").is_err());
    }
}
