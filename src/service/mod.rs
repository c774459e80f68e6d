pub mod directory_sync;
pub mod error;
pub mod inventory_service;
pub mod sla;
pub mod spreadsheet;
pub mod ticket_service;
