use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::usermodel::{User, UserCounts, UserRole};

#[derive(Validate, Debug, Default, Clone, Serialize, Deserialize)]
pub struct LoginUserDto {
    /// Username or e-mail.
    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserDto {
    #[validate(length(min = 1, max = 64, message = "Username is required"))]
    pub username: String,

    #[validate(
        length(min = 1, message = "Email is required"),
        email(message = "Email is invalid")
    )]
    pub email: String,

    pub fullname: Option<String>,

    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,

    #[serde(default = "default_role")]
    pub role: UserRole,

    #[serde(default)]
    pub is_technician: bool,
}

fn default_role() -> UserRole {
    UserRole::User
}

#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
pub struct UpdateUserDto {
    #[validate(length(min = 1, max = 64, message = "Username is required"))]
    pub username: String,

    #[validate(
        length(min = 1, message = "Email is required"),
        email(message = "Email is invalid")
    )]
    pub email: String,

    pub fullname: Option<String>,

    pub role: UserRole,

    #[serde(default)]
    pub is_technician: bool,

    /// Left out keeps the current password.
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: Option<String>,
}

#[derive(Debug, Validate, Default, Clone, Serialize, Deserialize)]
pub struct UserPasswordUpdateDto {
    #[validate(length(min = 1, message = "Current password is required."))]
    pub current_password: String,

    #[validate(length(min = 6, message = "New password must be at least 6 characters"))]
    pub new_password: String,

    #[validate(must_match(other = "new_password", message = "New passwords do not match"))]
    pub new_password_confirm: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UserSearchQueryDto {
    pub search: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FilterUserDto {
    pub id: String,
    pub username: String,
    pub email: String,
    pub fullname: Option<String>,
    pub role: String,
    pub is_technician: bool,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl FilterUserDto {
    pub fn filter_user(user: &User) -> Self {
        FilterUserDto {
            id: user.id.to_string(),
            username: user.username.to_owned(),
            email: user.email.to_owned(),
            fullname: user.fullname.clone(),
            role: user.role.to_str().to_string(),
            is_technician: user.is_technician,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }

    pub fn filter_users(users: &[User]) -> Vec<FilterUserDto> {
        users.iter().map(FilterUserDto::filter_user).collect()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserData {
    pub user: FilterUserDto,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponseDto {
    pub status: String,
    pub data: UserData,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserListResponseDto {
    pub status: String,
    pub users: Vec<FilterUserDto>,
    pub counts: UserCounts,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserLoginResponseDto {
    pub status: String,
    pub token: String,
}

#[derive(Serialize, Deserialize)]
pub struct Response {
    pub status: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BulkDeleteResponseDto {
    pub status: String,
    pub deleted: u64,
    /// Accounts kept because they still own tickets.
    pub kept: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserIdDto {
    pub user_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_confirmation_must_match() {
        let dto = UserPasswordUpdateDto {
            current_password: "old-secret".to_string(),
            new_password: "new-secret".to_string(),
            new_password_confirm: "other".to_string(),
        };
        assert!(dto.validate().is_err());

        let dto = UserPasswordUpdateDto {
            new_password_confirm: "new-secret".to_string(),
            ..dto
        };
        assert!(dto.validate().is_ok());
    }

    #[test]
    fn create_defaults_to_regular_user() {
        let dto: CreateUserDto = serde_json::from_str(
            r#"{"username":"ana","email":"ana@corp.local","password":"secret1"}"#,
        )
        .unwrap();
        assert_eq!(dto.role, UserRole::User);
        assert!(!dto.is_technician);
        assert!(dto.validate().is_ok());
    }

    #[test]
    fn filtered_user_hides_password() {
        let user = User {
            id: Uuid::new_v4(),
            username: "ana".to_string(),
            email: "ana@corp.local".to_string(),
            fullname: None,
            password: "hash".to_string(),
            role: UserRole::Admin,
            is_technician: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let json = serde_json::to_value(FilterUserDto::filter_user(&user)).unwrap();
        assert!(json.get("password").is_none());
        assert_eq!(json["role"], "admin");
    }
}
