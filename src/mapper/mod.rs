//! Mappers: schema plus fetch and persist orchestration for one entity type.
//!
//! A [`Mapper`] is a cheap handle pairing a [`MapperSchema`] with the
//! [`Registry`] it was looked up from. It holds no per-call state, so it can be
//! cloned and shared freely; entities and relations are owned by the caller.
//!
//! - fetching (`fetch_by_key`, `fetch_one`, `fetch_all`) hydrates rows into
//!   loaded entities with unfetched relations attached;
//! - saving dispatches on the primary key: absent or null inserts, present
//!   updates only the modified fields;
//! - validation runs the per-field rules of the schema.

mod fetch;
mod persist;
pub mod registry;
pub mod schema;

pub use persist::DeleteTarget;
#[doc(inline)]
pub use registry::{Registry, RegistryBuilder};
#[doc(inline)]
pub use schema::{EntryOptions, FieldDef, MapperSchema, SchemaBuilder};

use crate::entity::{Entity, Record};
use crate::error::MapperError;
use crate::query::QueryService;
use crate::relation::RelationDef;
use crate::validation::{ValidationErrors, Validator};
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::Arc;

/// Handle on one registered entity type
#[derive(Clone)]
pub struct Mapper {
    schema: Arc<MapperSchema>,
    registry: Registry,
}

impl Mapper {
    pub(crate) fn new(schema: Arc<MapperSchema>, registry: Registry) -> Self {
        Self { schema, registry }
    }

    pub fn name(&self) -> &str {
        self.schema.name()
    }

    pub fn table(&self) -> &str {
        self.schema.table()
    }

    pub fn schema(&self) -> &MapperSchema {
        &self.schema
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Declared fields, in declaration order
    pub fn fields(&self) -> &[FieldDef] {
        self.schema.fields()
    }

    /// Declared relations, in declaration order
    pub fn relations(&self) -> &[RelationDef] {
        self.schema.relations()
    }

    pub fn field_exists(&self, field: &str) -> bool {
        self.schema.field_exists(field)
    }

    /// # Errors
    ///
    /// Returns `MapperError::Configuration` if the schema declares no primary key.
    pub fn primary_key_field(&self) -> Result<&str, MapperError> {
        self.schema.primary_key_field()
    }

    /// Primary key value of `entity`, `None` when absent or null
    ///
    /// # Errors
    ///
    /// Returns `MapperError::Configuration` if the schema declares no primary key.
    pub fn primary_key(&self, entity: &Entity) -> Result<Option<JsonValue>, MapperError> {
        let field = self.primary_key_field()?;
        Ok(entity.get(field).filter(|v| !v.is_null()).cloned())
    }

    fn service(&self) -> &dyn QueryService {
        self.registry.query_service()
    }

    /// `data` restricted to declared fields
    fn known_fields(&self, data: &Record) -> Record {
        data.iter()
            .filter(|(field, _)| self.field_exists(field))
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect()
    }

    /// Check the entity's effective data against every declared rule
    ///
    /// Messages of a failed check are stored on the entity and available from
    /// [`errors`](Self::errors). A schema without rules always passes.
    pub fn validate(&self, entity: &mut Entity) -> bool {
        let data = entity.data();
        let mut validator = Validator::new(&data);
        let mut ruled = 0;
        for field in self.fields().iter().filter(|f| !f.rules.is_empty()) {
            validator.rules(&field.name, field.rules.iter().cloned());
            ruled += 1;
        }

        if ruled == 0 {
            entity.set_errors(ValidationErrors::new());
            return true;
        }

        let valid = validator.check();
        if !valid {
            log::debug!("{} failed validation: {:?}", self.name(), validator.errors());
        }
        entity.set_errors(validator.errors().clone());
        valid
    }

    /// Messages recorded by the last [`validate`](Self::validate) of `entity`
    pub fn errors<'e>(&self, entity: &'e Entity) -> &'e ValidationErrors {
        entity.errors()
    }
}

impl fmt::Debug for Mapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mapper")
            .field("name", &self.name())
            .field("table", &self.table())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::memory::MemoryQueryService;
    use crate::validation::Rule;
    use serde_json::json;

    fn registry() -> Registry {
        Registry::builder(Arc::new(MemoryQueryService::new()))
            .register(
                MapperSchema::builder("test", "tests")
                    .primary_key("id")
                    .entry("name", EntryOptions::field().rule(Rule::NotEmpty))
                    .field("title")
                    .build()
                    .unwrap(),
            )
            .register(MapperSchema::builder("log", "logs").field("message").build().unwrap())
            .build()
            .unwrap()
    }

    #[test]
    fn test_accessors() {
        let tests = registry().mapper("test").unwrap();
        assert_eq!(tests.table(), "tests");
        assert_eq!(tests.primary_key_field().unwrap(), "id");
        assert!(tests.field_exists("title"));
        assert!(!tests.field_exists("content"));
        assert_eq!(tests.fields().len(), 3);
        assert!(format!("{tests:?}").contains("tests"));
    }

    #[test]
    fn test_primary_key_value() {
        let tests = registry().mapper("test").unwrap();
        let mut entity = Entity::new();
        assert_eq!(tests.primary_key(&entity).unwrap(), None);

        entity.set("id", JsonValue::Null);
        assert_eq!(tests.primary_key(&entity).unwrap(), None);

        entity.set("id", 5);
        assert_eq!(tests.primary_key(&entity).unwrap(), Some(json!(5)));
    }

    #[test]
    fn test_missing_primary_key_is_configuration_error() {
        let logs = registry().mapper("log").unwrap();
        assert!(matches!(logs.primary_key(&Entity::new()), Err(MapperError::Configuration(_))));
    }

    #[test]
    fn test_validate_records_errors_on_entity() {
        let tests = registry().mapper("test").unwrap();
        let mut entity = Entity::new();
        entity.set("title", "No name");

        assert!(!tests.validate(&mut entity));
        assert!(tests.errors(&entity).contains_key("name"));

        entity.set("name", "Test");
        assert!(tests.validate(&mut entity));
        assert!(tests.errors(&entity).is_empty());
    }

    #[test]
    fn test_validate_without_rules_passes() {
        let logs = registry().mapper("log").unwrap();
        assert!(logs.validate(&mut Entity::new()));
    }
}
