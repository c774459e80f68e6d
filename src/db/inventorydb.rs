// db/inventorydb.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Postgres, QueryBuilder};
use uuid::Uuid;

use super::db::DBClient;
use crate::models::{
    inventorymodel::*,
    ticketmodel::{Ticket, TicketStatus},
};

#[async_trait]
pub trait InventoryExt {
    async fn get_item(&self, item_id: Uuid) -> Result<Option<Item>, sqlx::Error>;

    async fn get_item_by_name(&self, name: &str) -> Result<Option<Item>, sqlx::Error>;

    async fn create_item(&self, data: ItemData) -> Result<Item, sqlx::Error>;

    async fn update_item(&self, item_id: Uuid, data: ItemData) -> Result<Option<Item>, sqlx::Error>;

    async fn delete_item(&self, item_id: Uuid) -> Result<bool, sqlx::Error>;

    /// Number of consumption records that still reference the item.
    async fn count_item_usage(&self, item_id: Uuid) -> Result<i64, sqlx::Error>;

    async fn get_ticket_item(&self, ticket_item_id: Uuid) -> Result<Option<TicketItem>, sqlx::Error>;

    /// Checks and decrements stock and records the consumption atomically.
    /// Nothing is written unless the outcome is `Consumed`.
    async fn consume_item(
        &self,
        ticket_id: Uuid,
        line: ConsumptionLine,
        now: DateTime<Utc>,
    ) -> Result<ConsumeOutcome, sqlx::Error>;

    /// Deletes the consumption record and gives its quantity back to the item.
    async fn restore_ticket_item(&self, ticket_item_id: Uuid) -> Result<Option<RestoredStock>, sqlx::Error>;

    /// Moves the ticket from `expected` to Resolvido and applies every line
    /// that has enough stock, all in one transaction. Lines that fail are
    /// reported in the outcome list and leave no trace.
    async fn resolve_ticket_with_items(
        &self,
        ticket_id: Uuid,
        expected: TicketStatus,
        lines: Vec<ConsumptionLine>,
        now: DateTime<Utc>,
    ) -> Result<Option<(Ticket, Vec<ConsumeOutcome>)>, sqlx::Error>;

    /// Updates items matched by name and creates the rest. Returns
    /// `(updated, created)`.
    async fn upsert_items(&self, items: Vec<ImportedItem>) -> Result<(usize, usize), sqlx::Error>;
}

#[async_trait]
pub trait InventoryQueryExt {
    async fn get_items(&self, filter: &ItemFilter) -> Result<Vec<Item>, sqlx::Error>;

    async fn get_available_items(&self) -> Result<Vec<Item>, sqlx::Error>;

    async fn get_item_categories(&self) -> Result<Vec<String>, sqlx::Error>;

    async fn get_ticket_items(&self, ticket_id: Uuid) -> Result<Vec<TicketItemWithItem>, sqlx::Error>;

    async fn get_usage_records(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<UsageRecord>, sqlx::Error>;
}

async fn consume_locked(
    conn: &mut PgConnection,
    ticket_id: Uuid,
    line: ConsumptionLine,
    now: DateTime<Utc>,
) -> Result<ConsumeOutcome, sqlx::Error> {
    let available: Option<i32> = sqlx::query_scalar("SELECT quantity FROM items WHERE id = $1 FOR UPDATE")
        .bind(line.item_id)
        .fetch_optional(&mut *conn)
        .await?;

    let Some(available) = available else {
        return Ok(ConsumeOutcome::ItemNotFound);
    };

    if available < line.quantity {
        return Ok(ConsumeOutcome::InsufficientStock { available });
    }

    let remaining: i32 = sqlx::query_scalar(
        r#"
        UPDATE items
        SET quantity = quantity - $2, updated_at = $3
        WHERE id = $1
        RETURNING quantity
        "#
    )
    .bind(line.item_id)
    .bind(line.quantity)
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;

    let ticket_item = sqlx::query_as::<_, TicketItem>(
        r#"
        INSERT INTO ticket_items (ticket_id, item_id, quantity_used, used_at, notes)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#
    )
    .bind(ticket_id)
    .bind(line.item_id)
    .bind(line.quantity)
    .bind(now)
    .bind(line.notes)
    .fetch_one(&mut *conn)
    .await?;

    Ok(ConsumeOutcome::Consumed { ticket_item, remaining })
}

#[async_trait]
impl InventoryExt for DBClient {
    async fn get_item(&self, item_id: Uuid) -> Result<Option<Item>, sqlx::Error> {
        let item = sqlx::query_as::<_, Item>("SELECT * FROM items WHERE id = $1")
            .bind(item_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(item)
    }

    async fn get_item_by_name(&self, name: &str) -> Result<Option<Item>, sqlx::Error> {
        let item = sqlx::query_as::<_, Item>("SELECT * FROM items WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(item)
    }

    async fn create_item(&self, data: ItemData) -> Result<Item, sqlx::Error> {
        let item = sqlx::query_as::<_, Item>(
            r#"
            INSERT INTO items
                (name, description, category, quantity, min_quantity, unit_cost, location, supplier)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#
        )
        .bind(data.name)
        .bind(data.description)
        .bind(data.category)
        .bind(data.quantity)
        .bind(data.min_quantity)
        .bind(data.unit_cost)
        .bind(data.location)
        .bind(data.supplier)
        .fetch_one(&self.pool)
        .await?;

        Ok(item)
    }

    async fn update_item(&self, item_id: Uuid, data: ItemData) -> Result<Option<Item>, sqlx::Error> {
        let item = sqlx::query_as::<_, Item>(
            r#"
            UPDATE items
            SET name = $2,
                description = $3,
                category = $4,
                quantity = $5,
                min_quantity = $6,
                unit_cost = $7,
                location = $8,
                supplier = $9,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#
        )
        .bind(item_id)
        .bind(data.name)
        .bind(data.description)
        .bind(data.category)
        .bind(data.quantity)
        .bind(data.min_quantity)
        .bind(data.unit_cost)
        .bind(data.location)
        .bind(data.supplier)
        .fetch_optional(&self.pool)
        .await?;

        Ok(item)
    }

    async fn delete_item(&self, item_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM items WHERE id = $1")
            .bind(item_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_item_usage(&self, item_id: Uuid) -> Result<i64, sqlx::Error> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ticket_items WHERE item_id = $1")
            .bind(item_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn get_ticket_item(&self, ticket_item_id: Uuid) -> Result<Option<TicketItem>, sqlx::Error> {
        let ticket_item = sqlx::query_as::<_, TicketItem>("SELECT * FROM ticket_items WHERE id = $1")
            .bind(ticket_item_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(ticket_item)
    }

    async fn consume_item(
        &self,
        ticket_id: Uuid,
        line: ConsumptionLine,
        now: DateTime<Utc>,
    ) -> Result<ConsumeOutcome, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let outcome = consume_locked(&mut *tx, ticket_id, line, now).await?;

        if matches!(outcome, ConsumeOutcome::Consumed { .. }) {
            tx.commit().await?;
        }

        Ok(outcome)
    }

    async fn restore_ticket_item(&self, ticket_item_id: Uuid) -> Result<Option<RestoredStock>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let ticket_item = sqlx::query_as::<_, TicketItem>(
            "DELETE FROM ticket_items WHERE id = $1 RETURNING *"
        )
        .bind(ticket_item_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(ticket_item) = ticket_item else {
            return Ok(None);
        };

        let quantity_after: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE items
            SET quantity = quantity + $2, updated_at = NOW()
            WHERE id = $1
            RETURNING quantity
            "#
        )
        .bind(ticket_item.item_id)
        .bind(ticket_item.quantity_used)
        .fetch_optional(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(RestoredStock { ticket_item, quantity_after }))
    }

    async fn resolve_ticket_with_items(
        &self,
        ticket_id: Uuid,
        expected: TicketStatus,
        lines: Vec<ConsumptionLine>,
        now: DateTime<Utc>,
    ) -> Result<Option<(Ticket, Vec<ConsumeOutcome>)>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let ticket = sqlx::query_as::<_, Ticket>(
            r#"
            UPDATE tickets
            SET status = $3, resolved_at = $4, updated_at = $4
            WHERE id = $1 AND status = $2
            RETURNING *
            "#
        )
        .bind(ticket_id)
        .bind(expected)
        .bind(TicketStatus::Resolvido)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(ticket) = ticket else {
            return Ok(None);
        };

        let mut outcomes = Vec::with_capacity(lines.len());
        for line in lines {
            outcomes.push(consume_locked(&mut *tx, ticket_id, line, now).await?);
        }

        tx.commit().await?;
        Ok(Some((ticket, outcomes)))
    }

    async fn upsert_items(&self, items: Vec<ImportedItem>) -> Result<(usize, usize), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let mut updated = 0;
        let mut created = 0;

        for data in items {
            let existing: Option<Uuid> = sqlx::query_scalar("SELECT id FROM items WHERE name = $1 FOR UPDATE")
                .bind(&data.name)
                .fetch_optional(&mut *tx)
                .await?;

            match existing {
                Some(item_id) => {
                    sqlx::query(
                        r#"
                        UPDATE items
                        SET description = COALESCE($2, description),
                            category = $3,
                            quantity = $4,
                            min_quantity = COALESCE($5, min_quantity),
                            unit_cost = COALESCE($6, unit_cost),
                            location = COALESCE($7, location),
                            supplier = COALESCE($8, supplier),
                            updated_at = NOW()
                        WHERE id = $1
                        "#
                    )
                    .bind(item_id)
                    .bind(data.description)
                    .bind(data.category)
                    .bind(data.quantity)
                    .bind(data.min_quantity)
                    .bind(data.unit_cost)
                    .bind(data.location)
                    .bind(data.supplier)
                    .execute(&mut *tx)
                    .await?;
                    updated += 1;
                }
                None => {
                    sqlx::query(
                        r#"
                        INSERT INTO items
                            (name, description, category, quantity, min_quantity, unit_cost, location, supplier)
                        VALUES ($1, $2, $3, $4, COALESCE($5, 0), COALESCE($6, 0), $7, $8)
                        "#
                    )
                    .bind(data.name)
                    .bind(data.description)
                    .bind(data.category)
                    .bind(data.quantity)
                    .bind(data.min_quantity)
                    .bind(data.unit_cost)
                    .bind(data.location)
                    .bind(data.supplier)
                    .execute(&mut *tx)
                    .await?;
                    created += 1;
                }
            }
        }

        tx.commit().await?;
        Ok((updated, created))
    }
}

#[async_trait]
impl InventoryQueryExt for DBClient {
    async fn get_items(&self, filter: &ItemFilter) -> Result<Vec<Item>, sqlx::Error> {
        let mut query = QueryBuilder::<Postgres>::new("SELECT * FROM items WHERE TRUE");

        if let Some(category) = filter.category.as_deref().filter(|c| !c.is_empty()) {
            query.push(" AND category = ").push_bind(category.to_string());
        }

        if let Some(q) = filter.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            let pattern = format!("%{}%", q);
            query
                .push(" AND (name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR description ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR location ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR supplier ILIKE ")
                .push_bind(pattern)
                .push(")");
        }

        if filter.low_stock_only {
            query.push(" AND quantity <= min_quantity");
        }

        query.push(" ORDER BY category, name");

        let items = query.build_query_as::<Item>().fetch_all(&self.pool).await?;
        Ok(items)
    }

    async fn get_available_items(&self) -> Result<Vec<Item>, sqlx::Error> {
        let items = sqlx::query_as::<_, Item>(
            "SELECT * FROM items WHERE quantity > 0 ORDER BY category, name"
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    async fn get_item_categories(&self) -> Result<Vec<String>, sqlx::Error> {
        let categories: Vec<String> = sqlx::query_scalar("SELECT DISTINCT category FROM items ORDER BY category")
            .fetch_all(&self.pool)
            .await?;

        Ok(categories)
    }

    async fn get_ticket_items(&self, ticket_id: Uuid) -> Result<Vec<TicketItemWithItem>, sqlx::Error> {
        let items = sqlx::query_as::<_, TicketItemWithItem>(
            r#"
            SELECT
                ti.*,
                i.name AS item_name,
                i.category AS item_category,
                i.unit_cost
            FROM ticket_items ti
            JOIN items i ON ti.item_id = i.id
            WHERE ti.ticket_id = $1
            ORDER BY ti.used_at ASC
            "#
        )
        .bind(ticket_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    async fn get_usage_records(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<UsageRecord>, sqlx::Error> {
        let records = sqlx::query_as::<_, UsageRecord>(
            r#"
            SELECT
                ti.used_at,
                ti.quantity_used,
                ti.notes,
                i.name AS item_name,
                i.category AS item_category,
                i.unit_cost,
                t.id AS ticket_id,
                t.title AS ticket_title,
                u.username AS author_username,
                u.fullname AS author_fullname
            FROM ticket_items ti
            JOIN items i ON ti.item_id = i.id
            JOIN tickets t ON ti.ticket_id = t.id
            JOIN users u ON t.user_id = u.id
            WHERE ($1::timestamptz IS NULL OR ti.used_at >= $1)
              AND ($2::timestamptz IS NULL OR ti.used_at <= $2)
            ORDER BY i.name ASC, ti.used_at DESC
            "#
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}
