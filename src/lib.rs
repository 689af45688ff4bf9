//! # datamapper
//!
//! Active-record style data mapper over sea-query and `may_postgres`.
//!
//! Mappers are declared as schemas, registered once in a [`Registry`] and
//! looked up by name. Fetches return [`Entity`] values that track which fields
//! changed since they were loaded and carry lazy has-one / has-many relations.
//!
//! ```no_run
//! use datamapper::config::DataMapperConfig;
//! use datamapper::mapper::{EntryOptions, MapperSchema, Registry};
//! use datamapper::query::sql::PostgresQueryService;
//! use datamapper::relation::WhereTemplate;
//! use datamapper::{Condition, Operator};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DataMapperConfig::load()?;
//! let service = PostgresQueryService::connect(&config.database)?;
//!
//! let registry = Registry::builder(Arc::new(service))
//!     .settings(config.mapper)
//!     .register(MapperSchema::register("test", "tests", [
//!         ("id", EntryOptions::primary()),
//!         ("name", EntryOptions::field()),
//!         ("images", EntryOptions::has_many("image").template(WhereTemplate::eq("test_id", "id"))),
//!     ])?)
//!     .register(MapperSchema::register("image", "images", [
//!         ("id", EntryOptions::primary()),
//!         ("test_id", EntryOptions::field()),
//!     ])?)
//!     .build()?;
//!
//! let tests = registry.mapper("test")?;
//! for mut test in tests.fetch_all(&Condition::term("id", Operator::Lte, 15))? {
//!     let count = test.has_many("images")?.count()?;
//!     println!("{} has {count} images", test.value("name"));
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod entity;
pub mod error;
pub mod executor;
pub mod mapper;
pub mod query;
pub mod relation;
pub mod validation;

#[cfg(feature = "tracing")]
mod tracing_helpers;

pub use connection::{connect, ConnectionError};
pub use entity::{Entity, Record};
pub use error::MapperError;
pub use executor::{Executor, ExecutorError, MayPostgresExecutor};
pub use mapper::{Mapper, Registry};
pub use query::{Condition, Operator, OrderBy, QueryError, QueryService};
pub use relation::{HasMany, HasOne, Relation, RelationKind};
