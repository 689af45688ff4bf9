//! Mapper registry.
//!
//! Schemas are registered once at startup and validated together, so a
//! relation naming a missing mapper or field fails at build time rather than
//! on first access.

use super::schema::MapperSchema;
use super::Mapper;
use crate::config::MapperSettings;
use crate::error::MapperError;
use crate::query::QueryService;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

struct RegistryInner {
    schemas: HashMap<String, Arc<MapperSchema>>,
    service: Arc<dyn QueryService>,
    settings: MapperSettings,
}

/// Name → mapper lookup shared by every mapper and relation
///
/// Cloning is cheap; all clones share the same schemas and query service.
///
/// # Example
///
/// ```
/// use datamapper::mapper::{MapperSchema, Registry};
/// use datamapper::query::memory::MemoryQueryService;
/// use std::sync::Arc;
///
/// let registry = Registry::builder(Arc::new(MemoryQueryService::new()))
///     .register(MapperSchema::builder("file", "files").primary_key("id").field("name").build()?)
///     .build()?;
///
/// let files = registry.mapper("file")?;
/// assert_eq!(files.table(), "files");
/// # Ok::<(), datamapper::MapperError>(())
/// ```
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

impl Registry {
    pub fn builder(service: Arc<dyn QueryService>) -> RegistryBuilder {
        RegistryBuilder {
            schemas: Vec::new(),
            service,
            settings: MapperSettings::default(),
        }
    }

    /// Mapper registered under `name`
    ///
    /// # Errors
    ///
    /// Returns `MapperError::UnknownMapper` if nothing is registered under `name`.
    pub fn mapper(&self, name: &str) -> Result<Mapper, MapperError> {
        let schema = self
            .inner
            .schemas
            .get(name)
            .ok_or_else(|| MapperError::UnknownMapper(name.to_string()))?;
        Ok(Mapper::new(Arc::clone(schema), self.clone()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.schemas.contains_key(name)
    }

    /// Registered mapper names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.inner.schemas.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn query_service(&self) -> &dyn QueryService {
        self.inner.service.as_ref()
    }

    pub fn settings(&self) -> &MapperSettings {
        &self.inner.settings
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("mappers", &self.names())
            .field("settings", &self.inner.settings)
            .finish()
    }
}

/// Collects schemas and validates them as a whole
pub struct RegistryBuilder {
    schemas: Vec<MapperSchema>,
    service: Arc<dyn QueryService>,
    settings: MapperSettings,
}

impl RegistryBuilder {
    #[must_use]
    pub fn register(mut self, schema: MapperSchema) -> Self {
        self.schemas.push(schema);
        self
    }

    #[must_use]
    pub fn settings(mut self, settings: MapperSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Validate every schema against the others and build the registry
    ///
    /// # Errors
    ///
    /// Returns `MapperError::Configuration` for a duplicate mapper name, a
    /// relation to an unregistered mapper, a template placeholder that is not a
    /// field of the owning mapper, or a template field missing on the target.
    pub fn build(self) -> Result<Registry, MapperError> {
        let mut schemas = HashMap::with_capacity(self.schemas.len());
        for schema in self.schemas {
            let name = schema.name().to_string();
            if schemas.insert(name.clone(), Arc::new(schema)).is_some() {
                return Err(MapperError::Configuration(format!(
                    "Mapper '{name}' is registered twice"
                )));
            }
        }

        for schema in schemas.values() {
            validate_relations(schema, &schemas)?;
        }
        for cycle in relation_cycles(&schemas) {
            log::warn!("relation cycle between mappers: {}", cycle.join(" -> "));
        }

        log::info!("mapper registry built with {} mapper(s)", schemas.len());
        Ok(Registry {
            inner: Arc::new(RegistryInner {
                schemas,
                service: self.service,
                settings: self.settings,
            }),
        })
    }
}

fn validate_relations(
    schema: &MapperSchema,
    schemas: &HashMap<String, Arc<MapperSchema>>,
) -> Result<(), MapperError> {
    for relation in schema.relations() {
        let target = schemas.get(&relation.mapper).ok_or_else(|| {
            MapperError::Configuration(format!(
                "Relation '{}' on mapper '{}' targets unregistered mapper '{}'",
                relation.name,
                schema.name(),
                relation.mapper
            ))
        })?;

        let Some(template) = &relation.template else {
            continue;
        };
        if let Some(missing) = template.placeholders().into_iter().find(|f| !schema.field_exists(f)) {
            return Err(MapperError::Configuration(format!(
                "Relation '{}' on mapper '{}' reads '{missing}', which is not a field of '{}'",
                relation.name,
                schema.name(),
                schema.name()
            )));
        }
        if let Some(missing) = template.remote_fields().into_iter().find(|f| !target.field_exists(f)) {
            return Err(MapperError::Configuration(format!(
                "Relation '{}' on mapper '{}' filters on '{missing}', which is not a field of '{}'",
                relation.name,
                schema.name(),
                target.name()
            )));
        }
    }
    Ok(())
}

/// Each mapper that can reach itself through relations, with one path back
fn relation_cycles(schemas: &HashMap<String, Arc<MapperSchema>>) -> Vec<Vec<String>> {
    let mut names: Vec<_> = schemas.keys().cloned().collect();
    names.sort_unstable();

    let mut cycles = Vec::new();
    for start in &names {
        let mut path = vec![start.clone()];
        let mut visited = HashSet::new();
        if find_path_back(start, start, schemas, &mut path, &mut visited) {
            cycles.push(path);
        }
    }
    cycles
}

fn find_path_back(
    start: &str,
    current: &str,
    schemas: &HashMap<String, Arc<MapperSchema>>,
    path: &mut Vec<String>,
    visited: &mut HashSet<String>,
) -> bool {
    let Some(schema) = schemas.get(current) else {
        return false;
    };
    for relation in schema.relations() {
        let next = relation.mapper.as_str();
        if next == start {
            path.push(next.to_string());
            return true;
        }
        if visited.insert(next.to_string()) {
            path.push(next.to_string());
            if find_path_back(start, next, schemas, path, visited) {
                return true;
            }
            path.pop();
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::EntryOptions;
    use crate::query::memory::MemoryQueryService;
    use crate::relation::WhereTemplate;

    fn builder() -> RegistryBuilder {
        Registry::builder(Arc::new(MemoryQueryService::new()))
    }

    fn test_schema(template: WhereTemplate) -> MapperSchema {
        MapperSchema::builder("test", "tests")
            .primary_key("id")
            .field("name")
            .relation("images", EntryOptions::has_many("image").template(template))
            .build()
            .unwrap()
    }

    fn image_schema() -> MapperSchema {
        MapperSchema::builder("image", "images")
            .primary_key("id")
            .field("test_id")
            .build()
            .unwrap()
    }

    #[test]
    fn test_lookup() {
        let registry = builder()
            .register(test_schema(WhereTemplate::eq("test_id", "id")))
            .register(image_schema())
            .build()
            .unwrap();

        assert!(registry.contains("image"));
        assert_eq!(registry.names(), vec!["image", "test"]);
        assert_eq!(registry.mapper("test").unwrap().name(), "test");
        assert!(matches!(registry.mapper("nope"), Err(MapperError::UnknownMapper(_))));
    }

    #[test]
    fn test_unregistered_target() {
        let result = builder().register(test_schema(WhereTemplate::eq("test_id", "id"))).build();
        let err = result.unwrap_err();
        assert!(err.to_string().contains("unregistered mapper 'image'"));
    }

    #[test]
    fn test_placeholder_must_be_owner_field() {
        let result = builder()
            .register(test_schema(WhereTemplate::eq("test_id", "uuid")))
            .register(image_schema())
            .build();
        assert!(result.unwrap_err().to_string().contains("'uuid'"));
    }

    #[test]
    fn test_remote_field_must_exist_on_target() {
        let result = builder()
            .register(test_schema(WhereTemplate::eq("owner_id", "id")))
            .register(image_schema())
            .build();
        assert!(result.unwrap_err().to_string().contains("'owner_id'"));
    }

    #[test]
    fn test_duplicate_mapper_name() {
        let result = builder().register(image_schema()).register(image_schema()).build();
        assert!(matches!(result, Err(MapperError::Configuration(_))));
    }

    #[test]
    fn test_cycles_are_allowed() {
        let image = MapperSchema::builder("image", "images")
            .primary_key("id")
            .field("test_id")
            .relation("test", EntryOptions::has_one("test").template(WhereTemplate::eq("id", "test_id")))
            .build()
            .unwrap();
        let schemas: HashMap<_, _> = [
            ("test".to_string(), Arc::new(test_schema(WhereTemplate::eq("test_id", "id")))),
            ("image".to_string(), Arc::new(image.clone())),
        ]
        .into_iter()
        .collect();

        let cycles = relation_cycles(&schemas);
        assert_eq!(cycles.len(), 2);
        assert_eq!(cycles[0], vec!["image", "test", "image"]);

        let registry = builder()
            .register(test_schema(WhereTemplate::eq("test_id", "id")))
            .register(image)
            .build();
        assert!(registry.is_ok());
    }
}
