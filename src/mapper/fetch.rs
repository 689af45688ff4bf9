use super::Mapper;
use crate::entity::{Entity, Record};
use crate::error::MapperError;
use crate::query::{Condition, OrderBy, Select};
use crate::relation::{Relation, WhereTemplate};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

#[cfg(feature = "tracing")]
use crate::tracing_helpers;

impl Mapper {
    /// Empty, not yet loaded entity with relations attached
    ///
    /// # Errors
    ///
    /// Returns `MapperError` if a relation target cannot be looked up.
    pub fn new_entity(&self) -> Result<Entity, MapperError> {
        self.attach_relations(Entity::new())
    }

    /// Entity whose primary key equals `key`
    ///
    /// # Errors
    ///
    /// Returns `MapperError` if the schema has no primary key or the query fails.
    /// A missing row is `Ok(None)`.
    pub fn fetch_by_key(&self, key: impl Into<JsonValue>) -> Result<Option<Entity>, MapperError> {
        let condition = Condition::eq(self.primary_key_field()?, key);
        self.fetch_one(&condition)
    }

    /// First entity matching `condition`
    ///
    /// # Errors
    ///
    /// Returns `MapperError` if the query fails. No match is `Ok(None)`.
    pub fn fetch_one(&self, condition: &Condition) -> Result<Option<Entity>, MapperError> {
        let select = Select::new(self.table(), condition.clone()).limit(1);
        let mut entities = self.fetch(&select)?;
        Ok(if entities.is_empty() { None } else { Some(entities.swap_remove(0)) })
    }

    /// Every entity matching `condition`
    ///
    /// # Errors
    ///
    /// Returns `MapperError` if the query fails. No match is an empty `Vec`.
    pub fn fetch_all(&self, condition: &Condition) -> Result<Vec<Entity>, MapperError> {
        self.fetch_all_ordered(condition, &[])
    }

    /// Every entity matching `condition`, sorted by `order`
    ///
    /// # Errors
    ///
    /// Returns `MapperError` if the query fails.
    pub fn fetch_all_ordered(&self, condition: &Condition, order: &[OrderBy]) -> Result<Vec<Entity>, MapperError> {
        let select = Select::new(self.table(), condition.clone()).order_by(order.iter().cloned());
        self.fetch(&select)
    }

    fn fetch(&self, select: &Select) -> Result<Vec<Entity>, MapperError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::fetch_span(self.name(), self.table()).entered();

        log::debug!("{}: select from {} where {:?}", self.name(), self.table(), select.condition);
        let rows = self.service().select(select)?;
        rows.into_iter().map(|row| self.hydrate(row)).collect()
    }

    fn hydrate(&self, row: Record) -> Result<Entity, MapperError> {
        self.attach_relations(Entity::hydrate(row))
    }

    /// Substitute the template's placeholders with `entity`'s current values
    pub fn resolve_relation_condition(&self, entity: &Entity, template: &WhereTemplate) -> Condition {
        template.resolve(entity)
    }

    /// Attach one unfetched relation per declared relation
    ///
    /// Conditions are resolved against the entity's current values.
    ///
    /// # Errors
    ///
    /// Returns `MapperError::UnknownMapper` if a relation target is not registered.
    pub fn attach_relations(&self, mut entity: Entity) -> Result<Entity, MapperError> {
        let mut relations = BTreeMap::new();
        for def in self.relations() {
            let target = self.registry().mapper(&def.mapper)?;
            relations.insert(def.name.clone(), Relation::new(def, target, &entity));
        }
        entity.set_relations(self.name(), relations);
        Ok(entity)
    }

    /// Re-resolve relation conditions after the entity's key values changed
    pub(crate) fn refresh_relation_conditions(&self, entity: &mut Entity) {
        let mut relations = entity.take_relations();
        for def in self.relations() {
            if let Some(relation) = relations.get_mut(&def.name) {
                relation.resolve(def, entity);
            }
        }
        entity.restore_relations(relations);
    }
}
