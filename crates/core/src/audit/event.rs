use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event types recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventType {
    AuthenticationAttempt,
    AuthenticationSuccess,
    AuthenticationFailure,
    TokenRefresh,
    UserRegistered,
    AccountLocked,
    ResourceCreated,
    ResourceUpdated,
    ResourceDeleted,
    SystemStartup,
    SystemShutdown,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::AuthenticationAttempt => "AUTHENTICATION_ATTEMPT",
            AuditEventType::AuthenticationSuccess => "AUTHENTICATION_SUCCESS",
            AuditEventType::AuthenticationFailure => "AUTHENTICATION_FAILURE",
            AuditEventType::TokenRefresh => "TOKEN_REFRESH",
            AuditEventType::UserRegistered => "USER_REGISTERED",
            AuditEventType::AccountLocked => "ACCOUNT_LOCKED",
            AuditEventType::ResourceCreated => "RESOURCE_CREATED",
            AuditEventType::ResourceUpdated => "RESOURCE_UPDATED",
            AuditEventType::ResourceDeleted => "RESOURCE_DELETED",
            AuditEventType::SystemStartup => "SYSTEM_STARTUP",
            AuditEventType::SystemShutdown => "SYSTEM_SHUTDOWN",
        }
    }
}

/// One audit trail entry. Rows are append-only; the application never
/// updates or deletes them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub user_id: Option<Uuid>,
    pub username: Option<String>,
    pub action: String,
    pub event_type: AuditEventType,
    pub description: String,
    pub client_ip: String,
    pub success: bool,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(event_type: AuditEventType, action: impl Into<String>) -> Self {
        Self {
            user_id: None,
            username: None,
            action: action.into(),
            event_type,
            description: String::new(),
            client_ip: String::new(),
            success: true,
            metadata: serde_json::Value::Object(Default::default()),
            created_at: Utc::now(),
        }
    }

    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_client_ip(mut self, client_ip: impl Into<String>) -> Self {
        self.client_ip = client_ip.into();
        self
    }

    pub fn with_success(mut self, success: bool) -> Self {
        self.success = success;
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A persisted audit row, as read back by the admin listing.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AuditRecord {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub username: Option<String>,
    pub action: String,
    pub event_type: String,
    pub description: String,
    pub client_ip: String,
    pub success: bool,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_populates_fields() {
        let user = Uuid::new_v4();
        let event = AuditEvent::new(AuditEventType::AuthenticationFailure, "login")
            .with_user(user)
            .with_username("alice")
            .with_description("wrong password")
            .with_client_ip("10.0.0.1")
            .with_success(false);

        assert_eq!(event.user_id, Some(user));
        assert_eq!(event.username.as_deref(), Some("alice"));
        assert_eq!(event.action, "login");
        assert_eq!(event.client_ip, "10.0.0.1");
        assert!(!event.success);
        assert_eq!(event.event_type.as_str(), "AUTHENTICATION_FAILURE");
    }
}
