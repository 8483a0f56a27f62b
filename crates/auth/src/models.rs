use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_EDITOR: &str = "editor";
pub const ROLE_VIEWER: &str = "viewer";

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub roles: Vec<String>,
    pub is_first_login: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Role check with admin subsumption: `admin` satisfies any requirement.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role || r == ROLE_ADMIN)
    }
}

/// The user shape returned by the API; never includes the password hash.
#[derive(Debug, Clone, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub roles: Vec<String>,
    pub is_first_login: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            username: user.username,
            roles: user.roles,
            is_first_login: user.is_first_login,
            last_login: user.last_login,
            created_at: user.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_with_roles(roles: Vec<&str>) -> User {
        User {
            id: Uuid::new_v4(),
            email: "a@b.c".into(),
            username: "a".into(),
            password_hash: "x".into(),
            roles: roles.into_iter().map(String::from).collect(),
            is_first_login: false,
            last_login: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn admin_subsumes_other_roles() {
        let admin = user_with_roles(vec![ROLE_ADMIN]);
        assert!(admin.has_role(ROLE_EDITOR));
        assert!(admin.has_role(ROLE_VIEWER));

        let viewer = user_with_roles(vec![ROLE_VIEWER]);
        assert!(viewer.has_role(ROLE_VIEWER));
        assert!(!viewer.has_role(ROLE_EDITOR));
    }
}
