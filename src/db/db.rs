// db/db.rs
use sqlx::{Pool, Postgres};

use super::{inventorydb::InventoryExt, settingsdb::SettingsExt, ticketdb::TicketExt, userdb::UserExt};

#[derive(Clone)]
pub struct DBClient {
    pub pool: Pool<Postgres>,
}

impl std::fmt::Debug for DBClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DBClient")
            .field("pool", &"Pool<Postgres>")
            .field("size", &self.pool.size())
            .finish()
    }
}

impl DBClient {
    pub fn new(pool: Pool<Postgres>) -> Self {
        DBClient { pool }
    }
}

/// Everything the lifecycle services need from persistence. Implemented by
/// `DBClient` and, in tests, by the in-memory store.
pub trait HelpdeskStore: UserExt + TicketExt + InventoryExt + SettingsExt + Send + Sync + 'static {}

impl<T> HelpdeskStore for T where T: UserExt + TicketExt + InventoryExt + SettingsExt + Send + Sync + 'static {}
