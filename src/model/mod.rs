pub mod column;

pub use column::{ColumnRecord, LengthUnit, Shape};
