pub mod db;
pub mod inventorydb;
pub mod settingsdb;
pub mod ticketdb;
pub mod userdb;

#[cfg(test)]
pub mod memorydb;
