//! STRATA Core - Dimensional Entity Types
//!
//! Pure data structures with no behavior. All other crates depend on this.
//! This crate contains ONLY data types and error definitions - the cache and
//! loading logic live in `strata-cache` and `strata-load`.

pub mod entities;
pub mod error;
pub mod properties;

pub use entities::{AggregationKey, Datum, Hierarchy, Level, Member};
pub use error::{CacheError, CacheResult, LoadError, LoadResult, StrataError, StrataResult};
pub use properties::{SchemaProperties, CATALOG, CATALOG_CONTENT, DYNAMIC_SCHEMA_PROCESSOR};
