//! Titanic dataset: typed records, CSV table, cache-backed provider and deterministic split.

/// Typed passenger record and column names.
pub mod record;
/// Ordered record table with schema-validated CSV I/O.
pub mod table;
/// Cache-first dataset provider with remote fallback.
pub mod provider;
/// Seeded train/test partitioning.
pub mod split;

pub use provider::{DatasetProvider, HttpSource, LoadOrigin, RemoteSource};
pub use record::{TitanicRecord, COLUMNS};
pub use split::Split;
pub use table::Dataset;
