/// Record store reading one JSON file per user.
pub mod json_store;

/// Record store held entirely in memory.
pub mod memory_store;

/// Loader for tabular nutrition facts stored as CSV files.
pub mod nutrition_table;

mod utils;

pub use json_store::JsonUserStore;
pub use memory_store::InMemoryUserStore;
pub use nutrition_table::{NutritionRow, NutritionTableLoader, NutritionTableLoaderBuilder};
