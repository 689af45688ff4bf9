//! Lazy relations between entities.
//!
//! Every entity returned by a [`Mapper`] carries one [`Relation`] per declared
//! relation. A relation holds the related mapper, a condition resolved from the
//! owning entity at attach time and a result cache:
//!
//! - **unfetched**: nothing has been queried yet;
//! - **fetched**: the related mapper was queried once and the entities cached.
//!
//! Any access to the results moves an unfetched relation to fetched. Passing
//! `force_reload = true` to [`Relation::results`] queries again and replaces the
//! cache. Entities fetched through a relation get their own relations attached,
//! unfetched, so a relation graph is walked one level per access.
//!
//! Writes through a relation only touch the cached entities. They are persisted
//! when the owning entity is saved.

pub mod def;
mod has_many;
mod has_one;

#[doc(inline)]
pub use def::{RelationDef, RelationKind, TemplateTerm, WhereTemplate};
pub use has_many::HasMany;
pub use has_one::HasOne;

use crate::entity::Entity;
use crate::error::MapperError;
use crate::mapper::Mapper;
use crate::query::{Condition, OrderBy};

/// State shared by both relation kinds
#[derive(Debug, Clone)]
pub(crate) struct RelationState {
    mapper: Mapper,
    condition: Condition,
    order: Vec<OrderBy>,
    resolvable: bool,
    results: Vec<Entity>,
    fetched: bool,
}

impl RelationState {
    fn new(mapper: Mapper, condition: Condition, resolvable: bool, order: Vec<OrderBy>) -> Self {
        Self {
            mapper,
            condition,
            order,
            resolvable,
            results: Vec::new(),
            fetched: false,
        }
    }

    fn load(&mut self, force_reload: bool) -> Result<(), MapperError> {
        if self.fetched && !force_reload {
            return Ok(());
        }

        self.results = if self.resolvable {
            log::debug!("loading relation from {} where {:?}", self.mapper.name(), self.condition);
            self.mapper.fetch_all_ordered(&self.condition, &self.order)?
        } else {
            log::debug!("relation on {} has unresolved keys, nothing to load", self.mapper.name());
            Vec::new()
        };
        self.fetched = true;
        Ok(())
    }

    fn results(&mut self, force_reload: bool) -> Result<&mut Vec<Entity>, MapperError> {
        self.load(force_reload)?;
        Ok(&mut self.results)
    }
}

/// Relation attached to an entity
#[derive(Debug, Clone)]
pub enum Relation {
    One(HasOne),
    Many(HasMany),
}

impl Relation {
    /// Build the relation described by `def` for `owner`
    pub fn new(def: &RelationDef, mapper: Mapper, owner: &Entity) -> Self {
        let (condition, resolvable) = def.resolve(owner);
        match def.kind {
            RelationKind::HasOne => Relation::One(HasOne::new(RelationState::new(
                mapper,
                condition,
                resolvable,
                Vec::new(),
            ))),
            RelationKind::HasMany => Relation::Many(HasMany::new(RelationState::new(
                mapper,
                condition,
                resolvable,
                def.order.clone(),
            ))),
        }
    }

    pub fn kind(&self) -> RelationKind {
        match self {
            Relation::One(_) => RelationKind::HasOne,
            Relation::Many(_) => RelationKind::HasMany,
        }
    }

    fn state(&self) -> &RelationState {
        match self {
            Relation::One(one) => &one.state,
            Relation::Many(many) => &many.state,
        }
    }

    fn state_mut(&mut self) -> &mut RelationState {
        match self {
            Relation::One(one) => &mut one.state,
            Relation::Many(many) => &mut many.state,
        }
    }

    /// Mapper of the related entities
    pub fn mapper(&self) -> &Mapper {
        &self.state().mapper
    }

    /// Condition used to fetch the related entities
    pub fn condition(&self) -> &Condition {
        &self.state().condition
    }

    /// Replace the fetch condition
    ///
    /// Cached results are kept; pass `force_reload` on the next access to
    /// query with the new condition.
    pub fn set_condition(&mut self, condition: Condition) {
        let state = self.state_mut();
        state.condition = condition;
        state.resolvable = true;
    }

    pub(crate) fn resolve(&mut self, def: &RelationDef, owner: &Entity) {
        let (condition, resolvable) = def.resolve(owner);
        let state = self.state_mut();
        state.condition = condition;
        state.resolvable = resolvable;
    }

    /// Related entities, fetched on first access
    ///
    /// # Errors
    ///
    /// Returns `MapperError` if the related mapper fails to fetch.
    pub fn results(&mut self, force_reload: bool) -> Result<&[Entity], MapperError> {
        Ok(self.state_mut().results(force_reload)?.as_slice())
    }

    pub fn is_fetched(&self) -> bool {
        self.state().fetched
    }

    /// Cached entities to persist, `None` while nothing was fetched or buffered
    pub(crate) fn pending_mut(&mut self) -> Option<&mut Vec<Entity>> {
        let state = self.state_mut();
        state.fetched.then_some(&mut state.results)
    }

    pub fn as_one(&self) -> Option<&HasOne> {
        match self {
            Relation::One(one) => Some(one),
            Relation::Many(_) => None,
        }
    }

    pub fn as_one_mut(&mut self) -> Option<&mut HasOne> {
        match self {
            Relation::One(one) => Some(one),
            Relation::Many(_) => None,
        }
    }

    pub fn as_many(&self) -> Option<&HasMany> {
        match self {
            Relation::Many(many) => Some(many),
            Relation::One(_) => None,
        }
    }

    pub fn as_many_mut(&mut self) -> Option<&mut HasMany> {
        match self {
            Relation::Many(many) => Some(many),
            Relation::One(_) => None,
        }
    }
}
