use chrono::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    User,
}

impl UserRole {
    pub fn to_str(&self) -> &str {
        match self {
            UserRole::Admin => "admin",
            UserRole::User => "user",
        }
    }
}

#[derive(Debug, Deserialize, Serialize, sqlx::FromRow, Clone)]
pub struct User {
    pub id: uuid::Uuid,
    pub username: String,
    pub email: String,
    pub fullname: Option<String>,
    #[serde(skip_serializing)]
    pub password: String,
    pub role: UserRole,
    pub is_technician: bool,

    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,

    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// Admins double as technicians for assignment purposes.
    pub fn can_be_assigned(&self) -> bool {
        self.is_admin() || self.is_technician
    }

    pub fn display_name(&self) -> &str {
        self.fullname.as_deref().unwrap_or(&self.username)
    }
}

/// The identity every lifecycle operation runs as. Built from the
/// authenticated user by the HTTP layer and trusted as-is by the services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: uuid::Uuid,
    pub username: String,
    pub role: UserRole,
    pub is_technician: bool,
}

impl Actor {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

impl From<&User> for Actor {
    fn from(user: &User) -> Self {
        Actor {
            id: user.id,
            username: user.username.clone(),
            role: user.role,
            is_technician: user.is_technician,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct UserSummary {
    pub id: uuid::Uuid,
    pub username: String,
    pub fullname: Option<String>,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        UserSummary {
            id: user.id,
            username: user.username.clone(),
            fullname: user.fullname.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct UserCounts {
    pub total: i64,
    pub admins: i64,
    pub regulars: i64,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub fullname: Option<String>,
    pub password_hash: String,
    pub role: UserRole,
    pub is_technician: bool,
}

#[derive(Debug, Clone)]
pub struct UserChanges {
    pub username: String,
    pub email: String,
    pub fullname: Option<String>,
    pub role: UserRole,
    pub is_technician: bool,
    pub password_hash: Option<String>,
}
