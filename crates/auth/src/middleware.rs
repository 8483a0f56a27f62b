//! # Request-Plane Security Middleware
//!
//! Bearer-token authentication, per-subtree role checks, per-IP rate
//! limiting, and CSRF verification for state-changing methods. Each
//! middleware writes the standard JSON error envelope directly so rejected
//! requests look identical to handler-level errors.

use crate::csrf::{tokens_match, CSRF_COOKIE, CSRF_HEADER};
use crate::models::ROLE_ADMIN;
use crate::rate_limit::RateLimiter;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header::AUTHORIZATION, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;
use vigil_core::security::{JwtService, TokenKind};

/// Identity extracted from a verified access token; attached to the request
/// extensions for handlers and downstream middleware.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub roles: Vec<String>,
    pub is_first_login: bool,
}

impl AuthContext {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role || r == ROLE_ADMIN)
    }
}

/// Requires a valid, unexpired, HMAC-signed access token.
pub async fn auth_middleware(
    State(jwt): State<Arc<JwtService>>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = match extract_bearer(&request) {
        Some(token) => token,
        None => return error_response(StatusCode::UNAUTHORIZED, "Missing authorization token"),
    };

    let claims = match jwt.verify(&token, TokenKind::Access) {
        Ok(claims) => claims,
        Err(e) => {
            warn!(error = %e, "Access token rejected");
            return error_response(StatusCode::UNAUTHORIZED, "Invalid or expired token");
        }
    };

    request.extensions_mut().insert(AuthContext {
        user_id: claims.user_id,
        username: claims.username,
        email: claims.email,
        roles: claims.roles,
        is_first_login: claims.is_first_login,
    });

    next.run(request).await
}

/// Role gate for a subtree. `admin` subsumes any required role.
pub fn require_role(
    role: &'static str,
) -> impl Fn(
    Request,
    Next,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Response> + Send>>
       + Clone {
    move |request: Request, next: Next| {
        Box::pin(async move {
            let context = match request.extensions().get::<AuthContext>() {
                Some(ctx) => ctx,
                None => {
                    return error_response(
                        StatusCode::UNAUTHORIZED,
                        "Missing authorization token",
                    );
                }
            };

            if !context.has_role(role) {
                warn!(
                    username = %context.username,
                    required = role,
                    "Role check failed"
                );
                return error_response(StatusCode::FORBIDDEN, "Insufficient role");
            }

            next.run(request).await
        })
    }
}

/// Per-client-IP sliding-window rate limit; rejected requests get a
/// `Retry-After` hint.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let client_ip = client_ip(&request);

    if !limiter.check(&client_ip) {
        let mut response =
            error_response(StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded");
        response
            .headers_mut()
            .insert("Retry-After", HeaderValue::from_static("60"));
        return response;
    }

    next.run(request).await
}

/// Double-submit CSRF check on state-changing methods.
pub async fn csrf_middleware(request: Request, next: Next) -> Response {
    if !matches!(
        *request.method(),
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    ) {
        return next.run(request).await;
    }

    let jar = CookieJar::from_headers(request.headers());
    let cookie = jar.get(CSRF_COOKIE).map(|c| c.value().to_string());
    let header = request
        .headers()
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    match (cookie, header) {
        (Some(cookie), Some(header)) if tokens_match(&cookie, &header) => {
            next.run(request).await
        }
        _ => error_response(StatusCode::FORBIDDEN, "CSRF token missing or mismatched"),
    }
}

/// Client IP resolution: first `X-Forwarded-For` entry, then `X-Real-IP`,
/// then the transport peer.
pub fn client_ip(request: &Request) -> String {
    if let Some(forwarded) = request
        .headers()
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    if let Some(real_ip) = request
        .headers()
        .get("X-Real-IP")
        .and_then(|v| v.to_str().ok())
    {
        let real_ip = real_ip.trim();
        if !real_ip.is_empty() {
            return real_ip.to_string();
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// The JSON error envelope used on every error path.
pub fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(serde_json::json!({
            "status": "error",
            "code": status.as_u16(),
            "error": message,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })),
    )
        .into_response()
}

fn extract_bearer(request: &Request) -> Option<String> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request_with_headers(headers: &[(&str, &str)]) -> Request {
        let mut builder = axum::http::Request::builder().uri("/api/incidents");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn forwarded_for_takes_first_token() {
        let request =
            request_with_headers(&[("X-Forwarded-For", "203.0.113.7, 10.0.0.1, 10.0.0.2")]);
        assert_eq!(client_ip(&request), "203.0.113.7");
    }

    #[test]
    fn real_ip_is_second_choice() {
        let request = request_with_headers(&[("X-Real-IP", "198.51.100.4")]);
        assert_eq!(client_ip(&request), "198.51.100.4");
    }

    #[test]
    fn falls_back_to_unknown_without_peer_info() {
        let request = request_with_headers(&[]);
        assert_eq!(client_ip(&request), "unknown");
    }

    #[test]
    fn bearer_extraction() {
        let request = request_with_headers(&[("authorization", "Bearer abc.def.ghi")]);
        assert_eq!(extract_bearer(&request).as_deref(), Some("abc.def.ghi"));

        let request = request_with_headers(&[("authorization", "Basic dXNlcg==")]);
        assert!(extract_bearer(&request).is_none());
    }

    #[test]
    fn auth_context_role_subsumption() {
        let ctx = AuthContext {
            user_id: Uuid::new_v4(),
            username: "root".into(),
            email: "root@example.com".into(),
            roles: vec!["admin".into()],
            is_first_login: false,
        };
        assert!(ctx.has_role("editor"));
        assert!(ctx.has_role("viewer"));

        let viewer = AuthContext {
            roles: vec!["viewer".into()],
            ..ctx
        };
        assert!(!viewer.has_role("editor"));
    }
}
