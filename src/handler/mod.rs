pub mod auth;
pub mod inventory;
pub mod settings;
pub mod stats;
pub mod tickets;
pub mod users;
