//! # Vigil API Server
//!
//! The HTTP front door of the control plane. Startup wires configuration,
//! the database pool (with migrations and seed), the telemetry adapters, the
//! correlation engine, and the SLO evaluator, then serves the public and
//! authenticated route trees behind the security middleware stack.
//!
//! Middleware order, outermost first: panic recovery, access log, security
//! headers, rate limiting, CORS; the `/api` subtree adds bearer-token
//! authentication and CSRF verification, and the audit subtree an admin role
//! gate.
//!
//! On SIGINT/SIGTERM the root cancellation token fires: the listener stops
//! accepting, in-flight requests drain within the grace period, the SLO
//! evaluator exits between ticks, and the correlation pool drains.

use axum::{
    extract::ConnectInfo,
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower::{ServiceBuilder, ServiceExt};
use tower_http::{
    catch_panic::CatchPanicLayer,
    compression::CompressionLayer,
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{debug, info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vigil_auth::{
    auth_middleware, auth_routes, csrf_middleware, csrf_routes, rate_limit_middleware,
    require_role, AuthHandlerState, AuthService, LockoutTracker, RateLimiter, UserRepository,
    ROLE_ADMIN,
};
use vigil_core::{
    config::CorsConfig,
    security::{JwtService, PasswordHasher},
    AuditEvent, AuditEventType, AuditLogger, Config, DatabasePool,
};
use vigil_reliability::{
    CorrelationEngine, IncidentRepository, ServiceRepository, SloEvaluator, SloRepository,
    Telemetry,
};

mod api_middleware;
mod handlers;
mod state;
mod tls;

use crate::api_middleware::{security_headers_middleware, SecurityHeadersConfig};
use crate::handlers::{audit, health, incidents, services, slos};
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("Starting vigil control plane");
    let config = Config::load().map_err(|e| anyhow::anyhow!("configuration error: {e}"))?;

    let db = DatabasePool::new(&config.database).await?;
    db.run_migrations().await?;

    let hasher = PasswordHasher::new();
    db.seed_defaults(&hasher, config.app.admin_password.as_deref())
        .await?;

    let telemetry = Telemetry::from_config(&config.telemetry);
    let audit_logger = AuditLogger::new(db.pool.clone());
    let jwt = Arc::new(JwtService::new(&config.jwt)?);

    let auth_service = Arc::new(AuthService::new(
        UserRepository::new(db.pool.clone()),
        hasher,
        jwt.clone(),
        LockoutTracker::new(
            config.security.lockout_threshold,
            config.security.lockout_minutes,
        ),
        audit_logger.clone(),
    ));

    let incidents_repo = IncidentRepository::new(db.pool.clone());
    let services_repo = ServiceRepository::new(db.pool.clone());
    let slos_repo = SloRepository::new(db.pool.clone());

    let shutdown = CancellationToken::new();
    let engine = CorrelationEngine::new(
        telemetry.clone(),
        Arc::new(incidents_repo.clone()),
        shutdown.clone(),
    );
    let evaluator = Arc::new(SloEvaluator::new(
        slos_repo.clone(),
        telemetry.metrics.clone(),
        Duration::from_secs(config.evaluator.interval_secs),
    ));

    let evaluator_handle = tokio::spawn({
        let evaluator = evaluator.clone();
        let token = shutdown.clone();
        async move { evaluator.run(token).await }
    });

    tokio::spawn(watch_for_signals(shutdown.clone()));

    audit_logger
        .log(AuditEvent::new(AuditEventType::SystemStartup, "startup"))
        .await;

    let state = AppState {
        config: config.clone(),
        db,
        telemetry,
        audit: audit_logger.clone(),
        auth_service,
        incidents: incidents_repo,
        services: services_repo,
        slos: slos_repo,
        engine: engine.clone(),
        evaluator,
    };

    let app = build_router(state, jwt)?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    let grace = Duration::from_secs(config.server.shutdown_grace_secs);

    match (&config.server.tls_cert_path, &config.server.tls_key_path) {
        (Some(cert), Some(key)) => {
            let tls_config = tls::load_tls_config(cert, key)?;
            info!("Listening on {addr} (TLS)");
            serve_tls(listener, tls_config, app, shutdown.clone(), grace).await?;
        }
        _ => {
            info!("Listening on {addr}");
            let server = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown({
                let token = shutdown.clone();
                async move { token.cancelled().await }
            })
            .into_future();

            tokio::select! {
                result = server => result?,
                _ = async {
                    shutdown.cancelled().await;
                    tokio::time::sleep(grace).await;
                } => {
                    warn!("In-flight requests did not drain within the grace period");
                }
            }
        }
    }

    engine.drain(grace).await;
    if tokio::time::timeout(grace, evaluator_handle).await.is_err() {
        warn!("SLO evaluator did not stop within the grace period");
    }

    audit_logger
        .log(AuditEvent::new(AuditEventType::SystemShutdown, "shutdown"))
        .await;
    info!("Shutdown complete");
    Ok(())
}

fn build_router(state: AppState, jwt: Arc<JwtService>) -> anyhow::Result<Router> {
    let auth_state = AuthHandlerState {
        service: state.auth_service.clone(),
        access_token_expiry: state.config.jwt.access_token_expiry,
        refresh_token_expiry: state.config.jwt.refresh_token_expiry,
        secure_cookies: state.config.is_production(),
    };

    let limiter = Arc::new(RateLimiter::new(state.config.security.rate_limit_per_minute));
    let headers_config = SecurityHeadersConfig {
        enable_hsts: state.config.is_production(),
    };
    let cors = build_cors_layer(&state.config.cors)?;

    let incident_routes = Router::new()
        .route(
            "/incidents",
            get(incidents::list_incidents).post(incidents::create_incident),
        )
        .route(
            "/incidents/:id",
            get(incidents::get_incident).patch(incidents::update_incident),
        )
        .route(
            "/incidents/:id/timeline",
            get(incidents::get_timeline).post(incidents::add_comment),
        )
        .route(
            "/incidents/:id/correlations",
            get(incidents::get_correlations),
        )
        .route("/incidents/:id/correlate", post(incidents::rerun_correlation))
        .with_state(state.clone());

    let slo_routes = Router::new()
        .route("/slos", get(slos::list_slos).post(slos::create_slo))
        .route(
            "/slos/:id",
            get(slos::get_slo)
                .patch(slos::update_slo)
                .delete(slos::delete_slo),
        )
        .route("/slos/:id/calculate", post(slos::calculate_slo))
        .with_state(state.clone());

    let service_routes = Router::new()
        .route(
            "/services",
            get(services::list_services).post(services::create_service),
        )
        .route("/services/:id", get(services::get_service))
        .with_state(state.clone());

    let audit_routes = Router::new()
        .route("/audit", get(audit::list_audit_log))
        .route_layer(from_fn(require_role(ROLE_ADMIN)))
        .with_state(state.clone());

    // Everything under /api (except /api/auth) requires a valid access token;
    // state-changing methods additionally require the CSRF token.
    let protected = Router::new()
        .merge(incident_routes)
        .merge(slo_routes)
        .merge(service_routes)
        .merge(audit_routes)
        .merge(csrf_routes(auth_state.clone()))
        .layer(from_fn(csrf_middleware))
        .layer(from_fn_with_state(jwt.clone(), auth_middleware));

    let health_route = Router::new()
        .route("/health", get(health::health))
        .with_state(state.clone());

    let app = Router::new()
        .merge(health_route)
        .nest("/api/auth", auth_routes(auth_state, jwt))
        .nest("/api", protected)
        .layer(
            ServiceBuilder::new()
                .layer(CatchPanicLayer::custom(handle_panic))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                        .on_request(DefaultOnRequest::new().level(Level::INFO))
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                )
                .layer(from_fn_with_state(headers_config, security_headers_middleware))
                .layer(from_fn_with_state(limiter, rate_limit_middleware))
                .layer(CompressionLayer::new())
                .layer(cors),
        )
        .fallback(handler_404);

    Ok(app)
}

fn build_cors_layer(config: &CorsConfig) -> anyhow::Result<CorsLayer> {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .map(|origin| origin.parse())
        .collect::<Result<_, _>>()
        .map_err(|e| anyhow::anyhow!("invalid CORS origin: {e}"))?;

    Ok(CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-csrf-token"),
        ])
        .allow_credentials(true))
}

async fn handler_404() -> impl IntoResponse {
    vigil_core::Error::not_found("Resource not found")
}

fn handle_panic(
    _err: Box<dyn std::any::Any + Send + 'static>,
) -> axum::http::Response<axum::body::Body> {
    tracing::error!("Handler panicked; returning 500");
    let body = serde_json::json!({
        "status": "error",
        "code": 500,
        "error": "Internal server error",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });
    axum::http::Response::builder()
        .status(500)
        .header(header::CONTENT_TYPE, "application/json")
        .body(axum::body::Body::from(body.to_string()))
        .unwrap_or_default()
}

/// Serves the router over TLS with a manual accept loop; each connection is
/// tracked so shutdown can wait for in-flight work.
async fn serve_tls(
    listener: TcpListener,
    tls_config: Arc<tokio_rustls::rustls::ServerConfig>,
    app: Router,
    shutdown: CancellationToken,
    grace: Duration,
) -> anyhow::Result<()> {
    let acceptor = TlsAcceptor::from(tls_config);
    let connections = TaskTracker::new();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => {
                let (stream, peer_addr) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(error = %e, "Failed to accept connection");
                        continue;
                    }
                };

                let acceptor = acceptor.clone();
                let app = app.clone();
                connections.spawn(async move {
                    let tls_stream = match acceptor.accept(stream).await {
                        Ok(stream) => stream,
                        Err(e) => {
                            debug!(error = %e, "TLS handshake failed");
                            return;
                        }
                    };

                    let service = hyper::service::service_fn(move |mut request: axum::http::Request<Incoming>| {
                        request.extensions_mut().insert(ConnectInfo(peer_addr));
                        app.clone().oneshot(request)
                    });

                    if let Err(e) = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new())
                        .serve_connection_with_upgrades(TokioIo::new(tls_stream), service)
                        .await
                    {
                        debug!(error = %e, "Connection error");
                    }
                });
            }
        }
    }

    connections.close();
    if tokio::time::timeout(grace, connections.wait()).await.is_err() {
        warn!("TLS connections did not drain within the grace period");
    }
    Ok(())
}

async fn watch_for_signals(shutdown: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C signal"),
        _ = terminate => info!("Received terminate signal"),
    }
    shutdown.cancel();
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "vigil_api=debug,vigil_auth=debug,vigil_core=debug,vigil_reliability=debug,tower_http=info"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
