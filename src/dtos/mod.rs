pub mod inventorydtos;
pub mod settingsdtos;
pub mod ticketdtos;
pub mod userdtos;

pub use userdtos::*;
