use serde::Deserialize;
use validator::Validate;

use crate::models::settingsmodel::{DirectoryConfig, DirectoryUser, SlaSettings};

#[derive(Validate, Debug, Clone, Deserialize)]
pub struct SlaSettingsDto {
    #[validate(range(min = 1, message = "SLA hours must be at least 1"))]
    pub baixa: i32,
    #[validate(range(min = 1, message = "SLA hours must be at least 1"))]
    pub media: i32,
    #[validate(range(min = 1, message = "SLA hours must be at least 1"))]
    pub alta: i32,
    #[validate(range(min = 1, message = "SLA hours must be at least 1"))]
    pub critica: i32,
}

impl From<SlaSettingsDto> for SlaSettings {
    fn from(dto: SlaSettingsDto) -> Self {
        SlaSettings {
            baixa: Some(dto.baixa),
            media: Some(dto.media),
            alta: Some(dto.alta),
            critica: Some(dto.critica),
        }
    }
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct DirectoryConfigDto {
    pub server: Option<String>,
    pub domain: Option<String>,
    pub base_dn: Option<String>,
    pub user_dn: Option<String>,
    pub password: Option<String>,
}

impl From<DirectoryConfigDto> for DirectoryConfig {
    fn from(dto: DirectoryConfigDto) -> Self {
        let non_empty = |value: Option<String>| value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        DirectoryConfig {
            server: non_empty(dto.server),
            domain: non_empty(dto.domain),
            base_dn: non_empty(dto.base_dn),
            user_dn: non_empty(dto.user_dn),
            // Passwords are taken verbatim; only an empty one means "keep".
            password: dto.password.filter(|p| !p.is_empty()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DirectoryImportDto {
    #[serde(default)]
    pub users: Vec<DirectoryUser>,
}

#[derive(Validate, Debug, Deserialize)]
pub struct CategoryDto {
    #[validate(length(min = 1, max = 100, message = "Category name is required"))]
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_password_means_keep() {
        let config = DirectoryConfig::from(DirectoryConfigDto {
            server: Some(" ldap://dc01 ".to_string()),
            user_dn: Some("CN=svc".to_string()),
            password: Some(String::new()),
            ..Default::default()
        });
        assert_eq!(config.server.as_deref(), Some("ldap://dc01"));
        assert_eq!(config.password, None);
    }

    #[test]
    fn sla_hours_must_be_positive() {
        let dto = SlaSettingsDto { baixa: 48, media: 24, alta: 0, critica: 4 };
        assert!(dto.validate().is_err());
    }
}
