use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

/// The singleton settings row. Callers load it once per operation and pass
/// the relevant part along explicitly.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, PartialEq)]
pub struct AppSettings {
    pub id: Uuid,
    pub ad_server: Option<String>,
    pub ad_domain: Option<String>,
    pub ad_base_dn: Option<String>,
    pub ad_user_dn: Option<String>,
    #[serde(skip_serializing)]
    pub ad_user_password: Option<String>,
    pub sla_hours_baixa: Option<i32>,
    pub sla_hours_media: Option<i32>,
    pub sla_hours_alta: Option<i32>,
    pub sla_hours_critica: Option<i32>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaSettings {
    pub baixa: Option<i32>,
    pub media: Option<i32>,
    pub alta: Option<i32>,
    pub critica: Option<i32>,
}

impl From<&AppSettings> for SlaSettings {
    fn from(settings: &AppSettings) -> Self {
        SlaSettings {
            baixa: settings.sla_hours_baixa,
            media: settings.sla_hours_media,
            alta: settings.sla_hours_alta,
            critica: settings.sla_hours_critica,
        }
    }
}

impl AppSettings {
    pub fn apply_directory(&mut self, config: DirectoryConfig) {
        if config.user_dn.is_none() {
            self.ad_user_password = None;
        } else if config.password.is_some() {
            self.ad_user_password = config.password;
        }
        self.ad_server = config.server;
        self.ad_domain = config.domain;
        self.ad_base_dn = config.base_dn;
        self.ad_user_dn = config.user_dn;
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectoryConfig {
    pub server: Option<String>,
    pub domain: Option<String>,
    pub base_dn: Option<String>,
    pub user_dn: Option<String>,
    /// `None` keeps whatever password is stored, unless `user_dn` is cleared.
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, PartialEq)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
}

/// One account as reported by the directory service. Every attribute is
/// optional; directories routinely omit mail or display name.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DirectoryUser {
    pub username: Option<String>,
    pub email: Option<String>,
    pub display_name: Option<String>,
}
