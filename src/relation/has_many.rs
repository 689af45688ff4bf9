use super::RelationState;
use crate::entity::Entity;
use crate::error::MapperError;
use crate::mapper::Mapper;
use crate::query::{Condition, OrderBy};

/// Relation to a collection of entities
///
/// Every accessor fetches the collection on first use. Appending buffers a new
/// entity which is inserted when the owning entity is saved.
///
/// # Example
///
/// ```no_run
/// # use datamapper::{Mapper, MapperError};
/// # fn run(tests: &Mapper, images: &Mapper) -> Result<(), MapperError> {
/// let mut test = tests.new_entity()?;
/// test.set("name", "Test");
///
/// let mut image = images.new_entity()?;
/// image.set("name", "cover.png");
/// test.has_many("images")?.append(image)?;
///
/// // inserts the test row, then the image with `test_id` set
/// tests.save(&mut test)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HasMany {
    pub(super) state: RelationState,
}

impl HasMany {
    pub(super) fn new(state: RelationState) -> Self {
        Self { state }
    }

    pub fn mapper(&self) -> &Mapper {
        &self.state.mapper
    }

    pub fn condition(&self) -> &Condition {
        &self.state.condition
    }

    pub fn order(&self) -> &[OrderBy] {
        &self.state.order
    }

    /// All related entities
    ///
    /// # Errors
    ///
    /// Returns `MapperError` if the related mapper fails to fetch.
    pub fn all(&mut self) -> Result<&[Entity], MapperError> {
        Ok(self.state.results(false)?.as_slice())
    }

    /// # Errors
    ///
    /// Returns `MapperError` if the related mapper fails to fetch.
    pub fn count(&mut self) -> Result<usize, MapperError> {
        Ok(self.state.results(false)?.len())
    }

    /// # Errors
    ///
    /// Returns `MapperError` if the related mapper fails to fetch.
    pub fn iter(&mut self) -> Result<std::slice::Iter<'_, Entity>, MapperError> {
        Ok(self.state.results(false)?.iter())
    }

    /// # Errors
    ///
    /// Returns `MapperError` if the related mapper fails to fetch.
    pub fn iter_mut(&mut self) -> Result<std::slice::IterMut<'_, Entity>, MapperError> {
        Ok(self.state.results(false)?.iter_mut())
    }

    /// # Errors
    ///
    /// Returns `MapperError` if the related mapper fails to fetch.
    pub fn contains(&mut self, index: usize) -> Result<bool, MapperError> {
        Ok(index < self.state.results(false)?.len())
    }

    /// # Errors
    ///
    /// Returns `MapperError` if the related mapper fails to fetch.
    pub fn get(&mut self, index: usize) -> Result<Option<&Entity>, MapperError> {
        Ok(self.state.results(false)?.get(index))
    }

    /// # Errors
    ///
    /// Returns `MapperError` if the related mapper fails to fetch.
    pub fn get_mut(&mut self, index: usize) -> Result<Option<&mut Entity>, MapperError> {
        Ok(self.state.results(false)?.get_mut(index))
    }

    /// Replace the entity at `index`; `index == count()` appends
    ///
    /// # Errors
    ///
    /// Returns `MapperError::Argument` if `index` is past the end, or a fetch error.
    pub fn set(&mut self, index: usize, entity: Entity) -> Result<(), MapperError> {
        let results = self.state.results(false)?;
        match index.cmp(&results.len()) {
            std::cmp::Ordering::Less => results[index] = entity,
            std::cmp::Ordering::Equal => results.push(entity),
            std::cmp::Ordering::Greater => {
                return Err(MapperError::Argument(format!(
                    "index {index} is past the end of a relation holding {} entities",
                    results.len()
                )));
            }
        }
        Ok(())
    }

    /// Buffer an entity to be saved with the owner
    ///
    /// # Errors
    ///
    /// Returns `MapperError` if the related mapper fails to fetch.
    pub fn append(&mut self, entity: Entity) -> Result<(), MapperError> {
        self.state.results(false)?.push(entity);
        Ok(())
    }

    /// Drop the entity at `index` from the collection
    ///
    /// The row is not deleted; use the related mapper's `delete` for that.
    ///
    /// # Errors
    ///
    /// Returns `MapperError` if the related mapper fails to fetch.
    pub fn remove(&mut self, index: usize) -> Result<Option<Entity>, MapperError> {
        let results = self.state.results(false)?;
        Ok((index < results.len()).then(|| results.remove(index)))
    }
}
