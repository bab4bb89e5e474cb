pub mod item;
pub mod trend;

pub use item::{CollectedData, DedupKey, Item, Stats};
pub use trend::TrendItem;
