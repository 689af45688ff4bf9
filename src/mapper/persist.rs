use super::Mapper;
use crate::entity::{Entity, Record};
use crate::error::MapperError;
use crate::query::{Condition, Operator};
use crate::relation::Relation;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

#[cfg(feature = "tracing")]
use crate::tracing_helpers;

/// What [`Mapper::delete`] removes
#[derive(Debug, Clone)]
pub enum DeleteTarget<'a> {
    /// The row of this entity, by primary key
    Entity(&'a Entity),
    /// Every row matching the condition
    Condition(Condition),
}

impl<'a> From<&'a Entity> for DeleteTarget<'a> {
    fn from(entity: &'a Entity) -> Self {
        DeleteTarget::Entity(entity)
    }
}

impl<'a> From<&'a mut Entity> for DeleteTarget<'a> {
    fn from(entity: &'a mut Entity) -> Self {
        DeleteTarget::Entity(entity)
    }
}

impl From<Condition> for DeleteTarget<'_> {
    fn from(condition: Condition) -> Self {
        DeleteTarget::Condition(condition)
    }
}

impl Mapper {
    /// Insert or update `entity` and its buffered related entities
    ///
    /// Entities without a primary key value are inserted, the others updated.
    /// Returns whether the write affected a row; an update with nothing to
    /// write returns `true` without touching the database.
    ///
    /// # Errors
    ///
    /// Returns `MapperError` if the schema has no primary key, a query fails, or
    /// related entities nest deeper than `max_relation_depth`.
    pub fn save(&self, entity: &mut Entity) -> Result<bool, MapperError> {
        self.save_at_depth(entity, 0)
    }

    /// Save a raw field map as a new entity
    ///
    /// Returns the saved entity, with its generated key, and the save result.
    ///
    /// # Errors
    ///
    /// Returns `MapperError::Argument` if `data` is not a JSON object, or any
    /// error of [`save`](Self::save).
    pub fn save_data(&self, data: JsonValue) -> Result<(Entity, bool), MapperError> {
        let JsonValue::Object(data) = data else {
            return Err(MapperError::Argument(format!(
                "{} can only save an entity or an object of fields, got {data}",
                self.name()
            )));
        };
        let mut entity = self.attach_relations(Entity::from_data(data))?;
        let saved = self.save(&mut entity)?;
        Ok((entity, saved))
    }

    pub(crate) fn save_at_depth(&self, entity: &mut Entity, depth: usize) -> Result<bool, MapperError> {
        if depth > self.registry().settings().max_relation_depth {
            return Err(MapperError::RelationDepthExceeded {
                mapper: self.name().to_string(),
                depth,
            });
        }

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::save_span(self.name(), depth).entered();

        if self.primary_key(entity)?.is_some() {
            self.update_at_depth(entity, depth)
        } else {
            self.insert_at_depth(entity, depth)
        }
    }

    /// Insert the entity's known fields
    ///
    /// The generated key is assigned to the entity, relation conditions are
    /// re-resolved against it and buffered related entities are saved.
    /// Returns `false` without a query when the entity has no known fields.
    ///
    /// # Errors
    ///
    /// Returns `MapperError` if the schema has no primary key or a query fails.
    pub fn insert(&self, entity: &mut Entity) -> Result<bool, MapperError> {
        self.insert_at_depth(entity, 0)
    }

    fn insert_at_depth(&self, entity: &mut Entity, depth: usize) -> Result<bool, MapperError> {
        let key_field = self.primary_key_field()?.to_string();
        let mut data = self.known_fields(&entity.data());
        if data.get(&key_field).is_some_and(JsonValue::is_null) {
            data.remove(&key_field);
        }
        if data.is_empty() {
            log::debug!("{}: nothing to insert", self.name());
            return Ok(false);
        }

        log::debug!("{}: insert into {} ({} fields)", self.name(), self.table(), data.len());
        let outcome = self.service().insert(self.table(), &data, &key_field)?;
        let inserted = outcome.affected > 0;
        if !inserted {
            return Ok(false);
        }

        if let Some(key) = outcome.generated_key {
            entity.set(key_field, key);
        }
        entity.mark_persisted();
        self.refresh_relation_conditions(entity);
        self.save_related_at_depth(entity, depth)?;

        Ok(true)
    }

    /// Write the entity's modified known fields
    ///
    /// Buffered related entities are saved even when the entity itself has
    /// nothing to write, in which case no statement is issued and `true` is
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns `MapperError::Argument` if the entity has no primary key value,
    /// or any query error.
    pub fn update(&self, entity: &mut Entity) -> Result<bool, MapperError> {
        self.update_at_depth(entity, 0)
    }

    fn update_at_depth(&self, entity: &mut Entity, depth: usize) -> Result<bool, MapperError> {
        let key_field = self.primary_key_field()?;
        let key = self.primary_key(entity)?.ok_or_else(|| {
            MapperError::Argument(format!("{}: cannot update an entity without '{key_field}'", self.name()))
        })?;

        let data = self.known_fields(entity.modified_data());
        let updated = if data.is_empty() {
            log::debug!("{}: nothing to update for {key_field} = {key}", self.name());
            true
        } else {
            log::debug!("{}: update {} ({} fields)", self.name(), self.table(), data.len());
            let affected = self
                .service()
                .update(self.table(), &data, &Condition::eq(key_field, key))?;
            if affected > 0 {
                entity.mark_persisted();
            }
            affected > 0
        };

        self.save_related_at_depth(entity, depth)?;
        Ok(updated)
    }

    /// Delete an entity's row, or every row matching a condition
    ///
    /// # Errors
    ///
    /// Returns `MapperError::Argument` for an entity without primary key value
    /// or an empty condition, or any query error.
    pub fn delete<'a>(&self, target: impl Into<DeleteTarget<'a>>) -> Result<bool, MapperError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::delete_span(self.name()).entered();

        let condition = match target.into() {
            DeleteTarget::Entity(entity) => {
                let key_field = self.primary_key_field()?;
                let key = self.primary_key(entity)?.ok_or_else(|| {
                    MapperError::Argument(format!("{}: cannot delete an entity without '{key_field}'", self.name()))
                })?;
                Condition::eq(key_field, key)
            }
            DeleteTarget::Condition(condition) if condition.is_empty() => {
                return Err(MapperError::Argument(format!(
                    "{}: refusing to delete with an empty condition",
                    self.name()
                )));
            }
            DeleteTarget::Condition(condition) => condition,
        };

        log::debug!("{}: delete from {} where {condition:?}", self.name(), self.table());
        let affected = self.service().delete(self.table(), &condition)?;
        Ok(affected > 0)
    }

    /// Save every fetched or buffered related entity through its own mapper
    ///
    /// Equality terms of the relation condition are copied onto each related
    /// entity first (except onto the related primary key), so entities appended
    /// to a has-many relation receive their foreign key.
    ///
    /// # Errors
    ///
    /// Returns `MapperError` if a related save fails.
    pub fn save_related_entities(&self, entity: &mut Entity) -> Result<(), MapperError> {
        self.save_related_at_depth(entity, 0)
    }

    fn save_related_at_depth(&self, entity: &mut Entity, depth: usize) -> Result<(), MapperError> {
        let mut relations = entity.take_relations();
        let result = save_relations(&mut relations, depth);
        entity.restore_relations(relations);
        result
    }
}

fn save_relations(relations: &mut BTreeMap<String, Relation>, depth: usize) -> Result<(), MapperError> {
    for (name, relation) in relations.iter_mut() {
        let mapper = relation.mapper().clone();
        let inherited = inherited_values(relation.condition(), &mapper);
        let Some(related) = relation.pending_mut() else {
            continue;
        };

        log::debug!("saving {} related entities of '{name}'", related.len());
        for entity in related.iter_mut() {
            for (field, value) in &inherited {
                if entity.get(field) != Some(value) {
                    entity.set(field.clone(), value.clone());
                }
            }
            mapper.save_at_depth(entity, depth + 1)?;
        }
    }
    Ok(())
}

/// `field = value` terms of a relation condition that related entities take on
fn inherited_values(condition: &Condition, mapper: &Mapper) -> Record {
    let key_field = mapper.primary_key_field().ok();
    condition
        .predicates()
        .into_iter()
        .filter(|p| p.op == Operator::Eq && !p.value.is_null())
        .filter(|p| key_field != Some(p.field.as_str()) && mapper.field_exists(&p.field))
        .map(|p| (p.field, p.value))
        .collect()
}
