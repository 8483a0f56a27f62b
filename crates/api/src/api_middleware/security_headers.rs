//! # Security Headers Middleware
//!
//! Applies the baseline header set to every response; HSTS is added only in
//! production where TLS termination is guaranteed.

use axum::{
    extract::Request,
    http::{header, HeaderValue},
    middleware::Next,
    response::Response,
};

#[derive(Debug, Clone, Copy)]
pub struct SecurityHeadersConfig {
    pub enable_hsts: bool,
}

pub async fn security_headers_middleware(
    axum::extract::State(config): axum::extract::State<SecurityHeadersConfig>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        "X-XSS-Protection",
        HeaderValue::from_static("1; mode=block"),
    );
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("default-src 'self'"),
    );
    headers.insert(
        header::REFERRER_POLICY,
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    headers.insert(
        "Permissions-Policy",
        HeaderValue::from_static("geolocation=(), microphone=(), camera=()"),
    );

    if config.enable_hsts {
        headers.insert(
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static("max-age=31536000; includeSubDomains; preload"),
        );
    }

    headers.remove(header::SERVER);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body, http::Request, http::StatusCode, middleware::from_fn_with_state,
        routing::get, Router,
    };
    use tower::ServiceExt;

    async fn send(config: SecurityHeadersConfig, uri: &str) -> axum::response::Response {
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(from_fn_with_state(config, security_headers_middleware));
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    fn assert_baseline(response: &axum::response::Response) {
        let headers = response.headers();
        assert_eq!(headers["X-Content-Type-Options"], "nosniff");
        assert_eq!(headers["X-Frame-Options"], "DENY");
        assert_eq!(headers["X-XSS-Protection"], "1; mode=block");
        assert_eq!(headers["Content-Security-Policy"], "default-src 'self'");
        assert_eq!(
            headers["Referrer-Policy"],
            "strict-origin-when-cross-origin"
        );
        assert_eq!(
            headers["Permissions-Policy"],
            "geolocation=(), microphone=(), camera=()"
        );
        assert!(headers.get(header::SERVER).is_none());
    }

    #[tokio::test]
    async fn baseline_header_set_on_success_responses() {
        let response = send(SecurityHeadersConfig { enable_hsts: false }, "/").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_baseline(&response);
        assert!(response.headers().get(header::STRICT_TRANSPORT_SECURITY).is_none());
    }

    #[tokio::test]
    async fn headers_also_cover_unmatched_routes() {
        let response = send(SecurityHeadersConfig { enable_hsts: false }, "/nope").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_baseline(&response);
    }

    #[tokio::test]
    async fn hsts_is_a_production_toggle() {
        let response = send(SecurityHeadersConfig { enable_hsts: true }, "/").await;
        assert_baseline(&response);
        assert_eq!(
            response.headers()[header::STRICT_TRANSPORT_SECURITY],
            "max-age=31536000; includeSubDomains; preload"
        );
    }
}
