//! # Authentication & Request-Plane Security
//!
//! JWT access/refresh flows, account lockout, per-IP rate limiting, CSRF
//! double-submit verification, and the role-aware middleware stack used by
//! the HTTP surface.

pub mod csrf;
pub mod dto;
pub mod handlers;
pub mod lockout;
pub mod middleware;
pub mod models;
pub mod rate_limit;
pub mod repository;
pub mod service;
pub mod validation;

pub use handlers::{auth_routes, csrf_routes, AuthHandlerState, REFRESH_COOKIE};
pub use lockout::LockoutTracker;
pub use middleware::{
    auth_middleware, client_ip, csrf_middleware, rate_limit_middleware, require_role, AuthContext,
};
pub use models::{PublicUser, User, ROLE_ADMIN, ROLE_EDITOR, ROLE_VIEWER};
pub use rate_limit::RateLimiter;
pub use repository::UserRepository;
pub use service::AuthService;
