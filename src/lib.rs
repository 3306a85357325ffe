//! # Column Catalog
//!
//! Ingests structural columns exported from a BIM model and exposes search,
//! filter and summary statistics over them.
//!
//! ## Features
//!
//! - Parse JSON column exports and IFC files (IFC2x3 and IFC4 schemas)
//! - Normalize shapes, levels, heights (millimetres) and materials
//! - Case-insensitive search over name, type, level and material
//! - Counts by shape and level, average height
//! - Export to CSV and JSON
//!
//! ## Example
//!
//! ```no_run
//! use column_catalog::engine::{ColumnCatalog, Scope};
//!
//! let catalog = ColumnCatalog::new();
//! let summary = catalog.load_path("model.ifc", None).expect("Failed to load");
//! println!("Columns: {}", summary.record_count);
//! println!("Round: {}", catalog.search("круглая").len());
//! println!("Average height: {} mm", catalog.stats(Scope::All).average_height);
//! ```

pub mod catalog;
pub mod engine;
pub mod error;
pub mod export;
pub mod model;
pub mod parser;
pub mod ui;
