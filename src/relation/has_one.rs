use super::RelationState;
use crate::entity::Entity;
use crate::error::MapperError;
use crate::mapper::Mapper;
use crate::query::Condition;
use serde_json::Value as JsonValue;

/// Relation to at most one entity
///
/// Field reads and writes proxy to the related entity, fetching it on first
/// access. When no related row exists, reads return `None`/`false` and writes
/// are ignored.
///
/// # Example
///
/// ```no_run
/// # use datamapper::{Mapper, MapperError};
/// # fn run(tests: &Mapper) -> Result<(), MapperError> {
/// let mut test = tests.fetch_by_key(1)?.expect("row 1");
/// let file = test.has_one("file")?;
/// if let Some(name) = file.get("name")? {
///     println!("file name: {name}");
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HasOne {
    pub(super) state: RelationState,
}

impl HasOne {
    pub(super) fn new(state: RelationState) -> Self {
        Self { state }
    }

    pub fn mapper(&self) -> &Mapper {
        &self.state.mapper
    }

    pub fn condition(&self) -> &Condition {
        &self.state.condition
    }

    /// The related entity, if a row exists
    ///
    /// # Errors
    ///
    /// Returns `MapperError` if the related mapper fails to fetch.
    pub fn entity(&mut self) -> Result<Option<&Entity>, MapperError> {
        Ok(self.state.results(false)?.first())
    }

    /// # Errors
    ///
    /// Returns `MapperError` if the related mapper fails to fetch.
    pub fn entity_mut(&mut self) -> Result<Option<&mut Entity>, MapperError> {
        Ok(self.state.results(false)?.first_mut())
    }

    /// Replace the related entity, to be saved with the owner
    pub fn set_entity(&mut self, entity: Entity) {
        self.state.results = vec![entity];
        self.state.fetched = true;
    }

    /// Value of a field of the related entity
    ///
    /// # Errors
    ///
    /// Returns `MapperError` if the related mapper fails to fetch.
    pub fn get(&mut self, field: &str) -> Result<Option<JsonValue>, MapperError> {
        Ok(self.entity()?.and_then(|entity| entity.get(field).cloned()))
    }

    /// Assign a field of the related entity
    ///
    /// Returns `false` when there is no related entity to assign to.
    ///
    /// # Errors
    ///
    /// Returns `MapperError` if the related mapper fails to fetch.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<JsonValue>) -> Result<bool, MapperError> {
        match self.entity_mut()? {
            Some(entity) => {
                entity.set(field, value);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// True when a related entity exists and holds a non-null `field`
    ///
    /// # Errors
    ///
    /// Returns `MapperError` if the related mapper fails to fetch.
    pub fn has(&mut self, field: &str) -> Result<bool, MapperError> {
        Ok(self.entity()?.is_some_and(|entity| entity.is_set(field)))
    }
}
