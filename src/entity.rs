//! Entity data model with dirty tracking.
//!
//! An [`Entity`] keeps two maps: the *original* values it was constructed or
//! loaded with, and the *modified* values assigned after it became loaded.
//! Where a [`set`](Entity::set) lands depends only on the loaded flag:
//!
//! - not loaded (new entity being populated): the value goes to original data,
//!   so an insert writes the full record;
//! - loaded (hydrated from a row, or persisted): the value goes to modified
//!   data, so an update writes only the delta.
//!
//! Effective data is original overlaid by modified, modified winning.

use crate::error::MapperError;
use crate::relation::{HasMany, HasOne, Relation, RelationKind};
use crate::validation::ValidationErrors;
use serde::{Serialize, Serializer};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Raw field map, as returned by a query service or passed to `save_data`
pub type Record = serde_json::Map<String, JsonValue>;

static NULL: JsonValue = JsonValue::Null;

/// One record with change tracking and attached relations
///
/// # Example
///
/// ```
/// use datamapper::Entity;
///
/// let mut entity = Entity::new();
/// entity.set("name", "Name 1");
/// assert_eq!(entity.original_data().len(), 1);
///
/// entity.set_loaded(true);
/// entity.set("name", "Name 2");
/// assert_eq!(entity.modified_data().len(), 1);
/// assert_eq!(entity.value("name"), "Name 2");
/// ```
#[derive(Debug, Clone, Default)]
pub struct Entity {
    original: Record,
    modified: Record,
    loaded: bool,
    mapper: Option<String>,
    relations: BTreeMap<String, Relation>,
    errors: ValidationErrors,
}

impl Entity {
    /// Empty, not yet loaded entity
    pub fn new() -> Self {
        Self::default()
    }

    /// Not yet loaded entity holding `data` as its original values
    pub fn from_data(data: Record) -> Self {
        Self {
            original: data,
            ..Self::default()
        }
    }

    /// Loaded entity built from a fetched row
    pub(crate) fn hydrate(row: Record) -> Self {
        let mut entity = Self::from_data(row);
        entity.loaded = true;
        entity
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn set_loaded(&mut self, loaded: bool) {
        self.loaded = loaded;
    }

    /// Effective value of a field, `None` when never assigned
    pub fn get(&self, field: &str) -> Option<&JsonValue> {
        self.modified.get(field).or_else(|| self.original.get(field))
    }

    /// Effective value of a field, `Null` when never assigned
    pub fn value(&self, field: &str) -> &JsonValue {
        self.get(field).unwrap_or(&NULL)
    }

    /// True when the field holds a non-null value
    pub fn is_set(&self, field: &str) -> bool {
        self.get(field).is_some_and(|v| !v.is_null())
    }

    /// Assign one field, routed by the loaded flag
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<JsonValue>) {
        let field = field.into();
        let value = value.into();
        if self.loaded {
            self.modified.insert(field, value);
        } else {
            self.original.insert(field, value);
        }
    }

    /// Assign every entry through [`set`](Self::set)
    pub fn set_data(&mut self, data: impl IntoIterator<Item = (String, JsonValue)>) {
        for (field, value) in data {
            self.set(field, value);
        }
    }

    /// Original values overlaid by modified values
    pub fn data(&self) -> Record {
        let mut data = self.original.clone();
        for (field, value) in &self.modified {
            data.insert(field.clone(), value.clone());
        }
        data
    }

    pub fn original_data(&self) -> &Record {
        &self.original
    }

    pub fn modified_data(&self) -> &Record {
        &self.modified
    }

    pub fn is_dirty(&self) -> bool {
        !self.modified.is_empty()
    }

    /// Fold modified values into original data after a successful write
    pub(crate) fn mark_persisted(&mut self) {
        let modified = std::mem::take(&mut self.modified);
        self.original.extend(modified);
        self.loaded = true;
    }

    pub fn to_map(&self) -> Record {
        self.data()
    }

    /// Render the effective data as a JSON object string
    ///
    /// # Errors
    ///
    /// Returns `MapperError::Serialization` if serialization fails.
    pub fn to_json(&self) -> Result<String, MapperError> {
        Ok(serde_json::to_string(&self.data())?)
    }

    /// Name of the mapper whose relations are attached, if any
    pub fn mapper_name(&self) -> Option<&str> {
        self.mapper.as_deref()
    }

    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations.get(name)
    }

    pub fn relation_mut(&mut self, name: &str) -> Option<&mut Relation> {
        self.relations.get_mut(name)
    }

    /// Attached relations by name
    pub fn relations(&self) -> impl Iterator<Item = (&str, &Relation)> {
        self.relations.iter().map(|(name, relation)| (name.as_str(), relation))
    }

    /// Attach or replace a relation under `name`
    pub fn attach_relation(&mut self, name: impl Into<String>, relation: Relation) {
        self.relations.insert(name.into(), relation);
    }

    /// Single-entity relation by name
    ///
    /// # Errors
    ///
    /// Returns `MapperError::UnknownRelation` if nothing is attached under `name`,
    /// or `MapperError::RelationKind` if it is a has-many relation.
    pub fn has_one(&mut self, name: &str) -> Result<&mut HasOne, MapperError> {
        let relation = self.require_relation(name)?;
        relation.as_one_mut().ok_or_else(|| MapperError::RelationKind {
            relation: name.to_string(),
            expected: RelationKind::HasOne,
        })
    }

    /// Collection relation by name
    ///
    /// # Errors
    ///
    /// Returns `MapperError::UnknownRelation` if nothing is attached under `name`,
    /// or `MapperError::RelationKind` if it is a has-one relation.
    pub fn has_many(&mut self, name: &str) -> Result<&mut HasMany, MapperError> {
        let relation = self.require_relation(name)?;
        relation.as_many_mut().ok_or_else(|| MapperError::RelationKind {
            relation: name.to_string(),
            expected: RelationKind::HasMany,
        })
    }

    fn require_relation(&mut self, name: &str) -> Result<&mut Relation, MapperError> {
        let mapper = self.mapper.clone().unwrap_or_else(|| "<detached>".to_string());
        self.relations
            .get_mut(name)
            .ok_or_else(|| MapperError::UnknownRelation {
                mapper,
                relation: name.to_string(),
            })
    }

    pub(crate) fn set_relations(&mut self, mapper: &str, relations: BTreeMap<String, Relation>) {
        self.mapper = Some(mapper.to_string());
        self.relations = relations;
    }

    pub(crate) fn take_relations(&mut self) -> BTreeMap<String, Relation> {
        std::mem::take(&mut self.relations)
    }

    pub(crate) fn restore_relations(&mut self, relations: BTreeMap<String, Relation>) {
        self.relations = relations;
    }

    /// Validation messages recorded by the last `Mapper::validate`
    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    pub(crate) fn set_errors(&mut self, errors: ValidationErrors) {
        self.errors = errors;
    }
}

impl From<Record> for Entity {
    fn from(data: Record) -> Self {
        Self::from_data(data)
    }
}

impl Serialize for Entity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.data().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unloaded_assignment_lands_in_original() {
        let mut entity = Entity::new();
        entity.set("name", "Name 1");

        assert!(!entity.is_loaded());
        assert_eq!(entity.original_data().get("name"), Some(&json!("Name 1")));
        assert!(entity.modified_data().is_empty());
        assert!(!entity.is_dirty());
    }

    #[test]
    fn test_loaded_assignment_lands_in_modified() {
        let mut row = Record::new();
        row.insert("id".to_string(), json!(5));
        row.insert("title".to_string(), json!("Title 5"));
        let mut entity = Entity::hydrate(row);

        entity.set("title", "Title 5 changed");

        assert_eq!(entity.original_data()["title"], json!("Title 5"));
        assert_eq!(entity.modified_data()["title"], json!("Title 5 changed"));
        assert_eq!(entity.value("title"), &json!("Title 5 changed"));
        assert_eq!(entity.data().len(), 2);
        assert!(entity.is_dirty());
    }

    #[test]
    fn test_missing_and_null_fields() {
        let mut entity = Entity::new();
        entity.set("file_id", JsonValue::Null);

        assert!(entity.get("name").is_none());
        assert_eq!(entity.value("name"), &JsonValue::Null);
        assert!(entity.get("file_id").is_some());
        assert!(!entity.is_set("file_id"));
    }

    #[test]
    fn test_set_data_respects_routing() {
        let mut entity = Entity::new();
        entity.set_loaded(true);
        let mut data = Record::new();
        data.insert("name".to_string(), json!("a"));
        data.insert("title".to_string(), json!("b"));
        entity.set_data(data);

        assert!(entity.original_data().is_empty());
        assert_eq!(entity.modified_data().len(), 2);
    }

    #[test]
    fn test_mark_persisted_folds_changes() {
        let mut entity = Entity::new();
        entity.set("name", "a");
        entity.set_loaded(true);
        entity.set("name", "b");

        entity.mark_persisted();

        assert!(entity.is_loaded());
        assert!(entity.modified_data().is_empty());
        assert_eq!(entity.original_data()["name"], json!("b"));
    }

    #[test]
    fn test_to_json_renders_effective_data() {
        let mut entity = Entity::new();
        entity.set("id", 1);
        entity.set_loaded(true);
        entity.set("name", "Test");

        let rendered: JsonValue = serde_json::from_str(&entity.to_json().unwrap()).unwrap();
        assert_eq!(rendered, json!({"id": 1, "name": "Test"}));
        assert_eq!(serde_json::to_value(&entity).unwrap(), rendered);
    }

    #[test]
    fn test_unknown_relation_is_an_error() {
        let mut entity = Entity::new();
        let err = entity.has_many("images").unwrap_err();
        assert!(matches!(err, MapperError::UnknownRelation { .. }));
    }
}
