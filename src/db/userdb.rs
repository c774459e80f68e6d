// db/userdb.rs
use async_trait::async_trait;
use uuid::Uuid;

use super::db::DBClient;

use crate::models::usermodel::{NewUser, User, UserChanges, UserCounts, UserRole};

const USER_COLUMNS: &str =
    "id, username, email, fullname, password, role, is_technician, created_at, updated_at";

#[async_trait]
pub trait UserExt {
    async fn get_user(
        &self,
        user_id: Option<Uuid>,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<User>, sqlx::Error>;

    async fn get_users_by_ids(&self, user_ids: &[Uuid]) -> Result<Vec<User>, sqlx::Error>;

    async fn save_user(&self, user: NewUser) -> Result<User, sqlx::Error>;

    /// Inserts every account whose username and e-mail are both unused, in
    /// one transaction. Returns the created users and how many were skipped.
    async fn import_users(&self, users: Vec<NewUser>) -> Result<(Vec<User>, usize), sqlx::Error>;
}

/// Administrative user queries, only needed by the HTTP handlers.
#[async_trait]
pub trait UserAdminExt {
    async fn get_users(&self, search: Option<&str>) -> Result<Vec<User>, sqlx::Error>;

    async fn get_user_counts(&self) -> Result<UserCounts, sqlx::Error>;

    async fn get_technicians(&self) -> Result<Vec<User>, sqlx::Error>;

    async fn update_user(&self, user_id: Uuid, changes: UserChanges) -> Result<Option<User>, sqlx::Error>;

    async fn update_user_password(&self, user_id: Uuid, password_hash: String) -> Result<User, sqlx::Error>;

    async fn count_authored_tickets(&self, user_id: Uuid) -> Result<i64, sqlx::Error>;

    /// Drops the user's assignments, observer memberships and comments,
    /// then the user itself.
    async fn delete_user(&self, user_id: Uuid) -> Result<bool, sqlx::Error>;

    /// Deletes every non-admin without authored tickets, the same way
    /// `delete_user` does, in one transaction. Returns `(deleted, kept)`
    /// where `kept` are the usernames skipped because they own tickets.
    async fn delete_non_admin_users(&self) -> Result<(u64, Vec<String>), sqlx::Error>;
}

#[async_trait]
impl UserExt for DBClient {
    async fn get_user(
        &self,
        user_id: Option<Uuid>,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<User>, sqlx::Error> {
        let mut user: Option<User> = None;

        if let Some(user_id) = user_id {
            user = sqlx::query_as::<_, User>(&format!(
                "SELECT {} FROM users WHERE id = $1",
                USER_COLUMNS
            ))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        } else if let Some(username) = username {
            user = sqlx::query_as::<_, User>(&format!(
                "SELECT {} FROM users WHERE username = $1",
                USER_COLUMNS
            ))
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        } else if let Some(email) = email {
            user = sqlx::query_as::<_, User>(&format!(
                "SELECT {} FROM users WHERE email = $1",
                USER_COLUMNS
            ))
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        }

        Ok(user)
    }

    async fn get_users_by_ids(&self, user_ids: &[Uuid]) -> Result<Vec<User>, sqlx::Error> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }

        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = ANY($1)",
            USER_COLUMNS
        ))
        .bind(user_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    async fn save_user(&self, user: NewUser) -> Result<User, sqlx::Error> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (username, email, fullname, password, role, is_technician)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(user.username)
        .bind(user.email)
        .bind(user.fullname)
        .bind(user.password_hash)
        .bind(user.role)
        .bind(user.is_technician)
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }

    async fn import_users(&self, users: Vec<NewUser>) -> Result<(Vec<User>, usize), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let mut created = Vec::new();
        let mut skipped = 0;

        for user in users {
            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM users WHERE username = $1 OR email = $2)"
            )
            .bind(&user.username)
            .bind(&user.email)
            .fetch_one(&mut *tx)
            .await?;

            if exists {
                skipped += 1;
                continue;
            }

            let saved = sqlx::query_as::<_, User>(&format!(
                r#"
                INSERT INTO users (username, email, fullname, password, role, is_technician)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING {}
                "#,
                USER_COLUMNS
            ))
            .bind(user.username)
            .bind(user.email)
            .bind(user.fullname)
            .bind(user.password_hash)
            .bind(user.role)
            .bind(user.is_technician)
            .fetch_one(&mut *tx)
            .await?;

            created.push(saved);
        }

        tx.commit().await?;
        Ok((created, skipped))
    }
}

#[async_trait]
impl UserAdminExt for DBClient {
    async fn get_users(&self, search: Option<&str>) -> Result<Vec<User>, sqlx::Error> {
        let users = match search.map(str::trim).filter(|s| !s.is_empty()) {
            Some(search) => {
                sqlx::query_as::<_, User>(&format!(
                    r#"
                    SELECT {} FROM users
                    WHERE username ILIKE $1 OR email ILIKE $1 OR fullname ILIKE $1
                    ORDER BY username
                    "#,
                    USER_COLUMNS
                ))
                .bind(format!("%{}%", search))
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, User>(&format!(
                    "SELECT {} FROM users ORDER BY username",
                    USER_COLUMNS
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(users)
    }

    async fn get_user_counts(&self) -> Result<UserCounts, sqlx::Error> {
        let (total, admins, regulars): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COUNT(*) FILTER (WHERE role = $1),
                COUNT(*) FILTER (WHERE role = $2)
            FROM users
            "#
        )
        .bind(UserRole::Admin)
        .bind(UserRole::User)
        .fetch_one(&self.pool)
        .await?;

        Ok(UserCounts { total, admins, regulars })
    }

    async fn get_technicians(&self) -> Result<Vec<User>, sqlx::Error> {
        let users = sqlx::query_as::<_, User>(&format!(
            r#"
            SELECT {} FROM users
            WHERE role = $1 OR is_technician = TRUE
            ORDER BY COALESCE(fullname, username)
            "#,
            USER_COLUMNS
        ))
        .bind(UserRole::Admin)
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    async fn update_user(&self, user_id: Uuid, changes: UserChanges) -> Result<Option<User>, sqlx::Error> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET username = $2,
                email = $3,
                fullname = $4,
                role = $5,
                is_technician = $6,
                password = COALESCE($7, password),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(user_id)
        .bind(changes.username)
        .bind(changes.email)
        .bind(changes.fullname)
        .bind(changes.role)
        .bind(changes.is_technician)
        .bind(changes.password_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn update_user_password(&self, user_id: Uuid, password_hash: String) -> Result<User, sqlx::Error> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET password = $1, updated_at = NOW()
            WHERE id = $2
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(password_hash)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }

    async fn count_authored_tickets(&self, user_id: Uuid) -> Result<i64, sqlx::Error> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tickets WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn delete_user(&self, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE tickets SET assigned_to_id = NULL WHERE assigned_to_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE tickets SET assigned_by_id = NULL WHERE assigned_by_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM ticket_observers WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM comments WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_non_admin_users(&self) -> Result<(u64, Vec<String>), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let kept: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT u.username FROM users u
            WHERE u.role <> $1
              AND EXISTS (SELECT 1 FROM tickets t WHERE t.user_id = u.id)
            ORDER BY u.username
            "#
        )
        .bind(UserRole::Admin)
        .fetch_all(&mut *tx)
        .await?;

        let doomed: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT u.id FROM users u
            WHERE u.role <> $1
              AND NOT EXISTS (SELECT 1 FROM tickets t WHERE t.user_id = u.id)
            FOR UPDATE
            "#
        )
        .bind(UserRole::Admin)
        .fetch_all(&mut *tx)
        .await?;

        sqlx::query("UPDATE tickets SET assigned_to_id = NULL WHERE assigned_to_id = ANY($1)")
            .bind(&doomed)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE tickets SET assigned_by_id = NULL WHERE assigned_by_id = ANY($1)")
            .bind(&doomed)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM ticket_observers WHERE user_id = ANY($1)")
            .bind(&doomed)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM comments WHERE user_id = ANY($1)")
            .bind(&doomed)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM users WHERE id = ANY($1)")
            .bind(&doomed)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok((result.rows_affected(), kept))
    }
}
