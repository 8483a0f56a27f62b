use crate::{
    csrf::{mint_token, CSRF_COOKIE},
    dto::{CsrfTokenResponse, LoginRequest, RegisterRequest, TokenResponse},
    middleware::{auth_middleware, client_ip, AuthContext},
    models::PublicUser,
    service::AuthService,
};
use vigil_core::security::JwtService;
use axum::{
    extract::{Extension, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use std::sync::Arc;
use vigil_core::{Error, Result};

pub const REFRESH_COOKIE: &str = "refresh_token";

#[derive(Clone)]
pub struct AuthHandlerState {
    pub service: Arc<AuthService>,
    pub access_token_expiry: i64,
    pub refresh_token_expiry: i64,
    /// Production marks cookies Secure.
    pub secure_cookies: bool,
}

/// Authentication routes, mounted under `/api/auth`. Login, refresh, and
/// register are public; `/me` verifies the access token itself because this
/// subtree sits outside the authenticated `/api` nest.
pub fn auth_routes(state: AuthHandlerState, jwt: Arc<JwtService>) -> Router {
    let me_route = Router::new()
        .route("/me", get(me))
        .route_layer(axum::middleware::from_fn_with_state(jwt, auth_middleware))
        .with_state(state.clone());

    Router::new()
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/register", post(register))
        .with_state(state)
        .merge(me_route)
}

/// CSRF token minting; lives in the authenticated `/api` subtree.
pub fn csrf_routes(state: AuthHandlerState) -> Router {
    Router::new()
        .route("/csrf-token", get(csrf_token))
        .with_state(state)
}

async fn login(
    State(state): State<AuthHandlerState>,
    jar: CookieJar,
    request: Request,
) -> Result<Response> {
    let ip = client_ip(&request);
    let body: LoginRequest = parse_json(request).await?;
    validate(&body)?;

    let (_, tokens) = state.service.login(body, &ip).await?;

    let refresh_cookie = Cookie::build((REFRESH_COOKIE, tokens.refresh_token))
        .http_only(true)
        .secure(state.secure_cookies)
        .same_site(SameSite::Lax)
        .path("/api/auth")
        .max_age(time::Duration::seconds(state.refresh_token_expiry))
        .build();

    Ok((
        jar.add(refresh_cookie),
        Json(TokenResponse {
            access_token: tokens.access_token,
            token_type: "Bearer",
            expires_in: state.access_token_expiry,
        }),
    )
        .into_response())
}

async fn refresh(
    State(state): State<AuthHandlerState>,
    jar: CookieJar,
    request: Request,
) -> Result<Json<TokenResponse>> {
    let ip = client_ip(&request);
    let refresh_token = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or_else(|| Error::unauthenticated("Missing refresh token"))?;

    let access_token = state.service.refresh(&refresh_token, &ip).await?;

    Ok(Json(TokenResponse {
        access_token,
        token_type: "Bearer",
        expires_in: state.access_token_expiry,
    }))
}

async fn register(
    State(state): State<AuthHandlerState>,
    request: Request,
) -> Result<Response> {
    let ip = client_ip(&request);
    let body: RegisterRequest = parse_json(request).await?;
    validate(&body)?;

    let user = state.service.register(body, &ip).await?;

    Ok((StatusCode::CREATED, Json(PublicUser::from(user))).into_response())
}

async fn me(
    State(state): State<AuthHandlerState>,
    Extension(context): Extension<AuthContext>,
) -> Result<Json<PublicUser>> {
    let user = state.service.current_user(context.user_id).await?;
    Ok(Json(PublicUser::from(user)))
}

/// Mints a CSRF token; returned in the body and mirrored in a cookie that the
/// double-submit middleware compares against.
async fn csrf_token(State(state): State<AuthHandlerState>, jar: CookieJar) -> Response {
    let token = mint_token();

    let cookie = Cookie::build((CSRF_COOKIE, token.clone()))
        .secure(state.secure_cookies)
        .same_site(SameSite::Lax)
        .path("/")
        .build();

    (jar.add(cookie), Json(CsrfTokenResponse { csrf_token: token })).into_response()
}

/// Deserializes a JSON body with a 400 (not 422) on malformed input, keeping
/// body errors inside the shared envelope.
async fn parse_json<T: serde::de::DeserializeOwned>(request: Request) -> Result<T> {
    let bytes = axum::body::to_bytes(request.into_body(), 1 << 20)
        .await
        .map_err(|e| Error::validation("Unreadable request body").with_detail(e.to_string()))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| Error::validation(format!("Invalid request body: {e}")))
}

fn validate<T: validator::Validate>(body: &T) -> Result<()> {
    body.validate()
        .map_err(|e| Error::validation(format!("Validation failed: {e}")))
}
