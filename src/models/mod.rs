pub mod inventorymodel;
pub mod settingsmodel;
pub mod ticketmodel;
pub mod usermodel;
