use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::inventorymodel::{InventoryTotals, ItemData, ItemFilter, ItemView};

#[derive(Validate, Debug, Clone, Deserialize)]
pub struct ItemDto {
    #[validate(length(min = 1, max = 200, message = "Name is required"))]
    pub name: String,
    pub description: Option<String>,
    #[validate(length(min = 1, message = "Category is required"))]
    pub category: String,
    #[validate(range(min = 0, message = "Quantity cannot be negative"))]
    #[serde(default)]
    pub quantity: i32,
    #[validate(range(min = 0, message = "Minimum quantity cannot be negative"))]
    #[serde(default)]
    pub min_quantity: i32,
    #[validate(range(min = 0.0, message = "Unit cost cannot be negative"))]
    #[serde(default)]
    pub unit_cost: f64,
    pub location: Option<String>,
    pub supplier: Option<String>,
}

impl From<ItemDto> for ItemData {
    fn from(dto: ItemDto) -> Self {
        ItemData {
            name: dto.name,
            description: dto.description,
            category: dto.category,
            quantity: dto.quantity,
            min_quantity: dto.min_quantity,
            unit_cost: dto.unit_cost,
            location: dto.location,
            supplier: dto.supplier,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ItemListQueryDto {
    pub category: Option<String>,
    pub q: Option<String>,
    #[serde(default)]
    pub low_stock: bool,
}

impl From<ItemListQueryDto> for ItemFilter {
    fn from(query: ItemListQueryDto) -> Self {
        let non_empty = |value: Option<String>| value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        ItemFilter {
            category: non_empty(query.category),
            q: non_empty(query.q),
            low_stock_only: query.low_stock,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ItemListResponseDto {
    pub status: String,
    pub items: Vec<ItemView>,
    pub totals: InventoryTotals,
    pub categories: Vec<String>,
}
