// db/ticketdb.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use super::{db::DBClient, inventorydb::InventoryQueryExt, userdb::UserExt};
use crate::models::{
    inventorymodel::TicketItemView,
    ticketmodel::*,
    usermodel::UserSummary,
};

#[async_trait]
pub trait TicketExt {
    async fn create_ticket(&self, ticket: NewTicket) -> Result<Ticket, sqlx::Error>;

    async fn get_ticket(&self, ticket_id: Uuid) -> Result<Option<Ticket>, sqlx::Error>;

    async fn update_ticket(
        &self,
        ticket_id: Uuid,
        changes: TicketChanges,
    ) -> Result<Option<Ticket>, sqlx::Error>;

    /// Writes `to` only while the ticket is still in `expected`; `None` means
    /// the ticket is gone or moved on concurrently.
    async fn set_ticket_status(
        &self,
        ticket_id: Uuid,
        expected: TicketStatus,
        to: TicketStatus,
        resolved_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Option<Ticket>, sqlx::Error>;

    /// Moves the ticket back to Aberto and appends the audit comment in the
    /// same transaction.
    async fn reopen_ticket(
        &self,
        ticket_id: Uuid,
        expected: TicketStatus,
        actor_id: Uuid,
        audit_comment: String,
        now: DateTime<Utc>,
    ) -> Result<Option<(Ticket, Comment)>, sqlx::Error>;

    /// Deletes the ticket with its children and puts every consumed unit
    /// back into stock. The guard is checked against the locked row.
    async fn delete_ticket(
        &self,
        ticket_id: Uuid,
        guard: Option<DeleteGuard>,
    ) -> Result<DeleteOutcome, sqlx::Error>;

    async fn assign_ticket(
        &self,
        ticket_id: Uuid,
        assigned_to: Uuid,
        assigned_by: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Ticket>, sqlx::Error>;

    async fn is_observer(&self, ticket_id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error>;

    /// Returns false when the user already observes the ticket.
    async fn add_observer(&self, ticket_id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error>;

    async fn remove_observer(&self, ticket_id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error>;

    async fn add_comment(
        &self,
        ticket_id: Uuid,
        user_id: Uuid,
        content: String,
        now: DateTime<Utc>,
    ) -> Result<Comment, sqlx::Error>;

    async fn get_comment(&self, comment_id: Uuid) -> Result<Option<Comment>, sqlx::Error>;

    async fn update_comment(
        &self,
        comment_id: Uuid,
        content: String,
    ) -> Result<Option<Comment>, sqlx::Error>;

    async fn delete_comment(&self, comment_id: Uuid) -> Result<bool, sqlx::Error>;

    async fn add_attachment(
        &self,
        ticket_id: Uuid,
        filename: String,
        original_filename: String,
    ) -> Result<Attachment, sqlx::Error>;

    async fn get_attachment_by_filename(
        &self,
        filename: &str,
    ) -> Result<Option<Attachment>, sqlx::Error>;
}

/// Read models for listings, the ticket page and reports.
#[async_trait]
pub trait TicketQueryExt {
    async fn get_tickets(
        &self,
        filter: &TicketFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Ticket>, i64), sqlx::Error>;

    async fn get_ticket_details(
        &self,
        ticket: Ticket,
        now: DateTime<Utc>,
    ) -> Result<TicketDetails, sqlx::Error>;

    async fn get_dashboard_stats(&self, author: Option<Uuid>) -> Result<DashboardStats, sqlx::Error>;

    async fn get_recent_open_tickets(
        &self,
        author: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<Ticket>, sqlx::Error>;

    async fn get_admin_stats(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<AdminStats, sqlx::Error>;

    /// Tickets created in the window, newest first.
    async fn get_ticket_report(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<TicketReportRow>, sqlx::Error>;
}

#[async_trait]
impl TicketExt for DBClient {
    async fn create_ticket(&self, ticket: NewTicket) -> Result<Ticket, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let created = sqlx::query_as::<_, Ticket>(
            r#"
            INSERT INTO tickets
                (title, description, category, priority, status, user_id, created_at, updated_at, due_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7, $8)
            RETURNING *
            "#
        )
        .bind(ticket.title)
        .bind(ticket.description)
        .bind(ticket.category)
        .bind(ticket.priority)
        .bind(TicketStatus::Aberto)
        .bind(ticket.user_id)
        .bind(ticket.created_at)
        .bind(ticket.due_at)
        .fetch_one(&mut *tx)
        .await?;

        if !ticket.observer_ids.is_empty() {
            sqlx::query(
                r#"
                INSERT INTO ticket_observers (ticket_id, user_id)
                SELECT $1, u.id FROM users u WHERE u.id = ANY($2)
                ON CONFLICT DO NOTHING
                "#
            )
            .bind(created.id)
            .bind(&ticket.observer_ids)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(created)
    }

    async fn get_ticket(&self, ticket_id: Uuid) -> Result<Option<Ticket>, sqlx::Error> {
        let ticket = sqlx::query_as::<_, Ticket>("SELECT * FROM tickets WHERE id = $1")
            .bind(ticket_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(ticket)
    }

    async fn update_ticket(
        &self,
        ticket_id: Uuid,
        changes: TicketChanges,
    ) -> Result<Option<Ticket>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let ticket = sqlx::query_as::<_, Ticket>(
            r#"
            UPDATE tickets
            SET title = $2,
                description = $3,
                category = $4,
                priority = $5,
                user_id = $6,
                due_at = COALESCE($7, due_at),
                updated_at = $8
            WHERE id = $1
            RETURNING *
            "#
        )
        .bind(ticket_id)
        .bind(changes.title)
        .bind(changes.description)
        .bind(changes.category)
        .bind(changes.priority)
        .bind(changes.user_id)
        .bind(changes.due_at)
        .bind(changes.updated_at)
        .fetch_optional(&mut *tx)
        .await?;

        if ticket.is_none() {
            return Ok(None);
        }

        if let Some(observer_ids) = changes.observer_ids {
            sqlx::query("DELETE FROM ticket_observers WHERE ticket_id = $1")
                .bind(ticket_id)
                .execute(&mut *tx)
                .await?;

            sqlx::query(
                r#"
                INSERT INTO ticket_observers (ticket_id, user_id)
                SELECT $1, u.id FROM users u WHERE u.id = ANY($2)
                ON CONFLICT DO NOTHING
                "#
            )
            .bind(ticket_id)
            .bind(&observer_ids)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(ticket)
    }

    async fn set_ticket_status(
        &self,
        ticket_id: Uuid,
        expected: TicketStatus,
        to: TicketStatus,
        resolved_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Option<Ticket>, sqlx::Error> {
        let ticket = sqlx::query_as::<_, Ticket>(
            r#"
            UPDATE tickets
            SET status = $3, resolved_at = $4, updated_at = $5
            WHERE id = $1 AND status = $2
            RETURNING *
            "#
        )
        .bind(ticket_id)
        .bind(expected)
        .bind(to)
        .bind(resolved_at)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(ticket)
    }

    async fn reopen_ticket(
        &self,
        ticket_id: Uuid,
        expected: TicketStatus,
        actor_id: Uuid,
        audit_comment: String,
        now: DateTime<Utc>,
    ) -> Result<Option<(Ticket, Comment)>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let ticket = sqlx::query_as::<_, Ticket>(
            r#"
            UPDATE tickets
            SET status = $3, resolved_at = NULL, updated_at = $4
            WHERE id = $1 AND status = $2
            RETURNING *
            "#
        )
        .bind(ticket_id)
        .bind(expected)
        .bind(TicketStatus::Aberto)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(ticket) = ticket else {
            return Ok(None);
        };

        let comment = sqlx::query_as::<_, Comment>(
            r#"
            INSERT INTO comments (ticket_id, user_id, content, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#
        )
        .bind(ticket_id)
        .bind(actor_id)
        .bind(audit_comment)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some((ticket, comment)))
    }

    async fn delete_ticket(
        &self,
        ticket_id: Uuid,
        guard: Option<DeleteGuard>,
    ) -> Result<DeleteOutcome, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let locked = sqlx::query_as::<_, Ticket>("SELECT * FROM tickets WHERE id = $1 FOR UPDATE")
            .bind(ticket_id)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(locked) = locked else {
            return Ok(DeleteOutcome::NotFound);
        };
        if guard.is_some_and(|g| !g.allows(&locked)) {
            return Ok(DeleteOutcome::Refused);
        }

        let restocked = sqlx::query(
            r#"
            UPDATE items i
            SET quantity = i.quantity + used.total, updated_at = NOW()
            FROM (
                SELECT item_id, SUM(quantity_used)::int AS total
                FROM ticket_items
                WHERE ticket_id = $1
                GROUP BY item_id
            ) used
            WHERE i.id = used.item_id
            "#
        )
        .bind(ticket_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM tickets WHERE id = $1")
            .bind(ticket_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(DeleteOutcome::Deleted { restocked: restocked.rows_affected() })
    }

    async fn assign_ticket(
        &self,
        ticket_id: Uuid,
        assigned_to: Uuid,
        assigned_by: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Ticket>, sqlx::Error> {
        let ticket = sqlx::query_as::<_, Ticket>(
            r#"
            UPDATE tickets
            SET assigned_to_id = $2, assigned_by_id = $3, updated_at = $4
            WHERE id = $1
            RETURNING *
            "#
        )
        .bind(ticket_id)
        .bind(assigned_to)
        .bind(assigned_by)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(ticket)
    }

    async fn is_observer(&self, ticket_id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM ticket_observers WHERE ticket_id = $1 AND user_id = $2)"
        )
        .bind(ticket_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn add_observer(&self, ticket_id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO ticket_observers (ticket_id, user_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#
        )
        .bind(ticket_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn remove_observer(&self, ticket_id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM ticket_observers WHERE ticket_id = $1 AND user_id = $2")
            .bind(ticket_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn add_comment(
        &self,
        ticket_id: Uuid,
        user_id: Uuid,
        content: String,
        now: DateTime<Utc>,
    ) -> Result<Comment, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let comment = sqlx::query_as::<_, Comment>(
            r#"
            INSERT INTO comments (ticket_id, user_id, content, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#
        )
        .bind(ticket_id)
        .bind(user_id)
        .bind(content)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE tickets SET updated_at = $2 WHERE id = $1")
            .bind(ticket_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(comment)
    }

    async fn get_comment(&self, comment_id: Uuid) -> Result<Option<Comment>, sqlx::Error> {
        let comment = sqlx::query_as::<_, Comment>("SELECT * FROM comments WHERE id = $1")
            .bind(comment_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(comment)
    }

    async fn update_comment(
        &self,
        comment_id: Uuid,
        content: String,
    ) -> Result<Option<Comment>, sqlx::Error> {
        let comment = sqlx::query_as::<_, Comment>(
            "UPDATE comments SET content = $2 WHERE id = $1 RETURNING *"
        )
        .bind(comment_id)
        .bind(content)
        .fetch_optional(&self.pool)
        .await?;

        Ok(comment)
    }

    async fn delete_comment(&self, comment_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(comment_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn add_attachment(
        &self,
        ticket_id: Uuid,
        filename: String,
        original_filename: String,
    ) -> Result<Attachment, sqlx::Error> {
        let attachment = sqlx::query_as::<_, Attachment>(
            r#"
            INSERT INTO attachments (ticket_id, filename, original_filename)
            VALUES ($1, $2, $3)
            RETURNING *
            "#
        )
        .bind(ticket_id)
        .bind(filename)
        .bind(original_filename)
        .fetch_one(&self.pool)
        .await?;

        Ok(attachment)
    }

    async fn get_attachment_by_filename(
        &self,
        filename: &str,
    ) -> Result<Option<Attachment>, sqlx::Error> {
        let attachment = sqlx::query_as::<_, Attachment>("SELECT * FROM attachments WHERE filename = $1")
            .bind(filename)
            .fetch_optional(&self.pool)
            .await?;

        Ok(attachment)
    }
}

fn push_ticket_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &TicketFilter) {
    builder.push(" WHERE TRUE");

    if let Some(user_id) = filter.visible_to {
        builder
            .push(" AND (t.user_id = ")
            .push_bind(user_id)
            .push(" OR t.assigned_to_id = ")
            .push_bind(user_id)
            .push(" OR EXISTS (SELECT 1 FROM ticket_observers o WHERE o.ticket_id = t.id AND o.user_id = ")
            .push_bind(user_id)
            .push("))");
    }

    if let Some(q) = filter.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        let pattern = format!("%{}%", q);
        builder
            .push(" AND (t.title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR t.description ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR CAST(t.id AS TEXT) ILIKE ")
            .push_bind(pattern)
            .push(")");
    }

    if let Some(status) = filter.status {
        builder.push(" AND t.status = ").push_bind(status);
    }

    if let Some(priority) = filter.priority {
        builder.push(" AND t.priority = ").push_bind(priority);
    }
}

#[async_trait]
impl TicketQueryExt for DBClient {
    async fn get_tickets(
        &self,
        filter: &TicketFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Ticket>, i64), sqlx::Error> {
        let mut count_query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM tickets t");
        push_ticket_filters(&mut count_query, filter);
        let total: i64 = count_query
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let mut query = QueryBuilder::<Postgres>::new("SELECT t.* FROM tickets t");
        push_ticket_filters(&mut query, filter);
        query
            .push(" ORDER BY t.created_at DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let tickets = query
            .build_query_as::<Ticket>()
            .fetch_all(&self.pool)
            .await?;

        Ok((tickets, total))
    }

    async fn get_ticket_details(
        &self,
        ticket: Ticket,
        now: DateTime<Utc>,
    ) -> Result<TicketDetails, sqlx::Error> {
        let mut ids = vec![ticket.user_id];
        ids.extend(ticket.assigned_to_id);
        ids.extend(ticket.assigned_by_id);
        let people = self.get_users_by_ids(&ids).await?;
        let summary = |id: Option<Uuid>| {
            id.and_then(|id| people.iter().find(|u| u.id == id))
                .map(UserSummary::from)
        };

        let observers = sqlx::query_as::<_, UserSummary>(
            r#"
            SELECT u.id, u.username, u.fullname
            FROM ticket_observers o
            JOIN users u ON o.user_id = u.id
            WHERE o.ticket_id = $1
            ORDER BY COALESCE(u.fullname, u.username)
            "#
        )
        .bind(ticket.id)
        .fetch_all(&self.pool)
        .await?;

        let comments = sqlx::query_as::<_, CommentWithAuthor>(
            r#"
            SELECT
                c.*,
                u.username AS author_username,
                u.fullname AS author_fullname
            FROM comments c
            JOIN users u ON c.user_id = u.id
            WHERE c.ticket_id = $1
            ORDER BY c.created_at ASC
            "#
        )
        .bind(ticket.id)
        .fetch_all(&self.pool)
        .await?;

        let attachments = sqlx::query_as::<_, Attachment>(
            "SELECT * FROM attachments WHERE ticket_id = $1 ORDER BY created_at ASC"
        )
        .bind(ticket.id)
        .fetch_all(&self.pool)
        .await?;

        let used_items = self
            .get_ticket_items(ticket.id)
            .await?
            .into_iter()
            .map(TicketItemView::from)
            .collect();

        Ok(TicketDetails {
            author: summary(Some(ticket.user_id)),
            assigned_to: summary(ticket.assigned_to_id),
            assigned_by: summary(ticket.assigned_by_id),
            is_overdue: ticket.is_overdue(now),
            ticket,
            observers,
            comments,
            attachments,
            used_items,
        })
    }

    async fn get_dashboard_stats(&self, author: Option<Uuid>) -> Result<DashboardStats, sqlx::Error> {
        let (total, open, in_progress, closed): (i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COUNT(*) FILTER (WHERE status = $2),
                COUNT(*) FILTER (WHERE status = $3),
                COUNT(*) FILTER (WHERE status IN ($4, $5))
            FROM tickets
            WHERE $1::uuid IS NULL OR user_id = $1
            "#
        )
        .bind(author)
        .bind(TicketStatus::Aberto)
        .bind(TicketStatus::EmAndamento)
        .bind(TicketStatus::Resolvido)
        .bind(TicketStatus::Fechado)
        .fetch_one(&self.pool)
        .await?;

        Ok(DashboardStats { total, open, in_progress, closed })
    }

    async fn get_recent_open_tickets(
        &self,
        author: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<Ticket>, sqlx::Error> {
        let tickets = sqlx::query_as::<_, Ticket>(
            r#"
            SELECT * FROM tickets
            WHERE ($1::uuid IS NULL OR user_id = $1)
              AND status NOT IN ($2, $3)
            ORDER BY updated_at DESC
            LIMIT $4
            "#
        )
        .bind(author)
        .bind(TicketStatus::Resolvido)
        .bind(TicketStatus::Fechado)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(tickets)
    }

    async fn get_admin_stats(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<AdminStats, sqlx::Error> {
        let (total_tickets, total_open, overdue_count): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COUNT(*) FILTER (WHERE status IN ($3, $4)),
                COUNT(*) FILTER (
                    WHERE status IN ($3, $4)
                      AND COALESCE(due_at, created_at + INTERVAL '48 hours') < NOW()
                )
            FROM tickets
            WHERE ($1::timestamptz IS NULL OR created_at >= $1)
              AND ($2::timestamptz IS NULL OR created_at <= $2)
            "#
        )
        .bind(start)
        .bind(end)
        .bind(TicketStatus::Aberto)
        .bind(TicketStatus::EmAndamento)
        .fetch_one(&self.pool)
        .await?;

        let months = sqlx::query_as::<_, MonthlyTicketStats>(
            r#"
            WITH scoped AS (
                SELECT created_at, resolved_at FROM tickets
                WHERE ($1::timestamptz IS NULL OR created_at >= $1)
                  AND ($2::timestamptz IS NULL OR created_at <= $2)
            ),
            opened AS (
                SELECT
                    EXTRACT(YEAR FROM created_at)::int AS year,
                    EXTRACT(MONTH FROM created_at)::int AS month,
                    COUNT(*) AS opened
                FROM scoped
                GROUP BY 1, 2
            ),
            resolved AS (
                SELECT
                    EXTRACT(YEAR FROM resolved_at)::int AS year,
                    EXTRACT(MONTH FROM resolved_at)::int AS month,
                    COUNT(*) AS resolved
                FROM scoped
                WHERE resolved_at IS NOT NULL
                GROUP BY 1, 2
            )
            SELECT
                COALESCE(o.year, r.year) AS year,
                COALESCE(o.month, r.month) AS month,
                COALESCE(o.opened, 0) AS opened,
                COALESCE(r.resolved, 0) AS resolved
            FROM opened o
            FULL OUTER JOIN resolved r ON o.year = r.year AND o.month = r.month
            ORDER BY year DESC, month DESC
            "#
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        Ok(AdminStats {
            total_tickets,
            total_open,
            overdue_count,
            months,
        })
    }

    async fn get_ticket_report(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<TicketReportRow>, sqlx::Error> {
        let rows = sqlx::query_as::<_, TicketReportRow>(
            r#"
            SELECT
                t.id, t.title, t.category, t.status, t.priority, t.created_at, t.resolved_at,
                a.username AS author_username,
                a.fullname AS author_fullname,
                tech.username AS assignee_username,
                tech.fullname AS assignee_fullname
            FROM tickets t
            JOIN users a ON a.id = t.user_id
            LEFT JOIN users tech ON tech.id = t.assigned_to_id
            WHERE ($1::timestamptz IS NULL OR t.created_at >= $1)
              AND ($2::timestamptz IS NULL OR t.created_at <= $2)
            ORDER BY t.created_at DESC
            "#
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
