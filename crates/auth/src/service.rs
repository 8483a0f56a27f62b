//! # Authentication Service
//!
//! Orchestrates the authentication flows: credential verification with
//! lockout protection, token issuance and refresh, registration with
//! password-policy enforcement, and the audit trail for every outcome.

use crate::{
    dto::{LoginRequest, RegisterRequest},
    lockout::LockoutTracker,
    models::{User, ROLE_VIEWER},
    repository::UserRepository,
    validation::validate_password,
};
use std::sync::Arc;
use tracing::{info, warn};
use vigil_core::{
    security::{JwtService, PasswordHasher, TokenKind, TokenPair},
    AuditEvent, AuditEventType, AuditLogger, Error, Result,
};

pub struct AuthService {
    repository: UserRepository,
    password_hasher: PasswordHasher,
    jwt_service: Arc<JwtService>,
    lockout: LockoutTracker,
    audit: AuditLogger,
}

impl AuthService {
    pub fn new(
        repository: UserRepository,
        password_hasher: PasswordHasher,
        jwt_service: Arc<JwtService>,
        lockout: LockoutTracker,
        audit: AuditLogger,
    ) -> Self {
        Self {
            repository,
            password_hasher,
            jwt_service,
            lockout,
            audit,
        }
    }

    pub fn jwt_service(&self) -> Arc<JwtService> {
        self.jwt_service.clone()
    }

    /// Verifies credentials and issues a token pair.
    ///
    /// Failure paths are indistinguishable to the caller (always "Invalid
    /// credentials") except for an active lockout, which is reported as 403.
    pub async fn login(&self, request: LoginRequest, client_ip: &str) -> Result<(User, TokenPair)> {
        let username = request.username.trim();

        if self.lockout.locked_until(username).is_some() {
            self.audit
                .log(
                    AuditEvent::new(AuditEventType::AuthenticationFailure, "login")
                        .with_username(username)
                        .with_client_ip(client_ip)
                        .with_description("Rejected: account locked")
                        .with_success(false),
                )
                .await;
            return Err(Error::forbidden("Account is temporarily locked"));
        }

        let user = match self.repository.find_by_username(username).await? {
            Some(user) => user,
            None => {
                self.note_failure(username, client_ip, "Unknown username").await;
                return Err(Error::unauthenticated("Invalid credentials"));
            }
        };

        let verified = self
            .password_hasher
            .verify_password(&request.password, &user.password_hash)?;
        if !verified {
            self.note_failure(username, client_ip, "Wrong password").await;
            return Err(Error::unauthenticated("Invalid credentials"));
        }

        self.lockout.reset(username);
        self.repository.touch_last_login(user.id).await?;

        let tokens = self.jwt_service.generate_token_pair(
            user.id,
            &user.username,
            &user.email,
            user.roles.clone(),
            user.is_first_login,
        )?;

        info!(username = %user.username, "User authenticated");
        self.audit
            .log(
                AuditEvent::new(AuditEventType::AuthenticationSuccess, "login")
                    .with_user(user.id)
                    .with_username(&user.username)
                    .with_client_ip(client_ip),
            )
            .await;

        Ok((user, tokens))
    }

    /// Exchanges a valid refresh token for a fresh access token. Roles are
    /// re-read from the store so a role change takes effect at next refresh.
    pub async fn refresh(&self, refresh_token: &str, client_ip: &str) -> Result<String> {
        let claims = self.jwt_service.verify(refresh_token, TokenKind::Refresh)?;

        let user = self
            .repository
            .find_by_id(claims.user_id)
            .await?
            .ok_or_else(|| Error::unauthenticated("Unknown user"))?;

        let access = self.jwt_service.generate_token(
            user.id,
            &user.username,
            &user.email,
            user.roles.clone(),
            user.is_first_login,
            TokenKind::Access,
        )?;

        self.audit
            .log(
                AuditEvent::new(AuditEventType::TokenRefresh, "refresh")
                    .with_user(user.id)
                    .with_username(&user.username)
                    .with_client_ip(client_ip),
            )
            .await;

        Ok(access)
    }

    /// Registers a new user with the viewer role.
    pub async fn register(&self, request: RegisterRequest, client_ip: &str) -> Result<User> {
        validate_password(&request.password)?;

        let hash = self.password_hasher.hash_password(&request.password)?;
        let user = self
            .repository
            .create(
                request.email.trim(),
                request.username.trim(),
                &hash,
                &[ROLE_VIEWER.to_string()],
            )
            .await?;

        self.audit
            .log(
                AuditEvent::new(AuditEventType::UserRegistered, "register")
                    .with_user(user.id)
                    .with_username(&user.username)
                    .with_client_ip(client_ip),
            )
            .await;

        Ok(user)
    }

    pub async fn current_user(&self, user_id: uuid::Uuid) -> Result<User> {
        self.repository
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| Error::not_found("User not found"))
    }

    async fn note_failure(&self, username: &str, client_ip: &str, reason: &str) {
        let just_locked = self.lockout.record_failure(username);

        self.audit
            .log(
                AuditEvent::new(AuditEventType::AuthenticationFailure, "login")
                    .with_username(username)
                    .with_client_ip(client_ip)
                    .with_description(reason)
                    .with_success(false),
            )
            .await;

        if just_locked {
            warn!(username, "Account locked after repeated authentication failures");
            self.audit
                .log(
                    AuditEvent::new(AuditEventType::AccountLocked, "lockout")
                        .with_username(username)
                        .with_client_ip(client_ip)
                        .with_description("Consecutive failure threshold reached")
                        .with_success(false),
                )
                .await;
        }
    }
}
