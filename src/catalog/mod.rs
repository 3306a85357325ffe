pub mod index;
pub mod stats;

pub use index::{Catalog, ColumnFilter};
pub use stats::{summarize, LevelCount, Stats};
