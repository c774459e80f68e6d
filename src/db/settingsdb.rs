// db/settingsdb.rs
use async_trait::async_trait;
use uuid::Uuid;

use super::db::DBClient;
use crate::models::settingsmodel::{AppSettings, Category, DirectoryConfig, SlaSettings};

#[async_trait]
pub trait SettingsExt {
    async fn get_settings(&self) -> Result<Option<AppSettings>, sqlx::Error>;

    /// Returns the settings row, creating it with the default budgets first
    /// if it does not exist yet.
    async fn ensure_settings(&self) -> Result<AppSettings, sqlx::Error>;

    async fn update_sla(&self, sla: SlaSettings) -> Result<AppSettings, sqlx::Error>;

    async fn update_directory(&self, config: DirectoryConfig) -> Result<AppSettings, sqlx::Error>;

    async fn get_categories(&self) -> Result<Vec<Category>, sqlx::Error>;

    /// `None` when a category with that name already exists.
    async fn create_category(&self, name: String) -> Result<Option<Category>, sqlx::Error>;

    async fn delete_category(&self, category_id: Uuid) -> Result<bool, sqlx::Error>;
}

#[async_trait]
impl SettingsExt for DBClient {
    async fn get_settings(&self) -> Result<Option<AppSettings>, sqlx::Error> {
        let settings = sqlx::query_as::<_, AppSettings>(
            "SELECT * FROM app_settings ORDER BY updated_at ASC LIMIT 1"
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(settings)
    }

    async fn ensure_settings(&self) -> Result<AppSettings, sqlx::Error> {
        if let Some(settings) = self.get_settings().await? {
            return Ok(settings);
        }

        let settings = sqlx::query_as::<_, AppSettings>(
            "INSERT INTO app_settings DEFAULT VALUES RETURNING *"
        )
        .fetch_one(&self.pool)
        .await?;

        tracing::info!("Created default application settings");
        Ok(settings)
    }

    async fn update_sla(&self, sla: SlaSettings) -> Result<AppSettings, sqlx::Error> {
        let current = self.ensure_settings().await?;

        let settings = sqlx::query_as::<_, AppSettings>(
            r#"
            UPDATE app_settings
            SET sla_hours_baixa = $2,
                sla_hours_media = $3,
                sla_hours_alta = $4,
                sla_hours_critica = $5,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#
        )
        .bind(current.id)
        .bind(sla.baixa)
        .bind(sla.media)
        .bind(sla.alta)
        .bind(sla.critica)
        .fetch_one(&self.pool)
        .await?;

        Ok(settings)
    }

    async fn update_directory(&self, config: DirectoryConfig) -> Result<AppSettings, sqlx::Error> {
        let current = self.ensure_settings().await?;

        // Clearing the bind user clears its password; no new password keeps the old one.
        let settings = sqlx::query_as::<_, AppSettings>(
            r#"
            UPDATE app_settings
            SET ad_server = $2,
                ad_domain = $3,
                ad_base_dn = $4,
                ad_user_dn = $5,
                ad_user_password = CASE
                    WHEN $5::text IS NULL THEN NULL
                    WHEN $6::text IS NOT NULL THEN $6
                    ELSE ad_user_password
                END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#
        )
        .bind(current.id)
        .bind(config.server)
        .bind(config.domain)
        .bind(config.base_dn)
        .bind(config.user_dn)
        .bind(config.password)
        .fetch_one(&self.pool)
        .await?;

        Ok(settings)
    }

    async fn get_categories(&self) -> Result<Vec<Category>, sqlx::Error> {
        let categories = sqlx::query_as::<_, Category>("SELECT * FROM categories ORDER BY name")
            .fetch_all(&self.pool)
            .await?;

        Ok(categories)
    }

    async fn create_category(&self, name: String) -> Result<Option<Category>, sqlx::Error> {
        let category = sqlx::query_as::<_, Category>(
            r#"
            INSERT INTO categories (name)
            VALUES ($1)
            ON CONFLICT (name) DO NOTHING
            RETURNING *
            "#
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(category)
    }

    async fn delete_category(&self, category_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(category_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
