//! Declarative mapper schemas.
//!
//! A schema is declared as a list of named entries, each an [`EntryOptions`]
//! record. Entries carrying a relation kind become [`RelationDef`]s, all others
//! become [`FieldDef`]s. Declaration order is kept.

use crate::error::MapperError;
use crate::query::OrderBy;
use crate::relation::{RelationDef, RelationKind, WhereTemplate};
use crate::validation::Rule;
use std::collections::HashSet;

/// Declared field of a mapper
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub primary: bool,
    pub rules: Vec<Rule>,
}

/// Options of one schema entry
///
/// # Example
///
/// ```
/// use datamapper::mapper::{EntryOptions, MapperSchema};
/// use datamapper::relation::WhereTemplate;
/// use datamapper::validation::Rule;
///
/// let schema = MapperSchema::register("test", "tests", [
///     ("id", EntryOptions::primary()),
///     ("name", EntryOptions::field().rule(Rule::NotEmpty)),
///     ("file_id", EntryOptions::field()),
///     ("file", EntryOptions::has_one("file").template(WhereTemplate::eq("id", "file_id"))),
/// ])?;
/// assert_eq!(schema.primary_key_field()?, "id");
/// assert_eq!(schema.relations().len(), 1);
/// # Ok::<(), datamapper::MapperError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct EntryOptions {
    pub primary: bool,
    pub relation: Option<RelationKind>,
    pub mapper: Option<String>,
    pub template: Option<WhereTemplate>,
    pub order: Vec<OrderBy>,
    pub rules: Vec<Rule>,
}

impl EntryOptions {
    /// Plain field
    pub fn field() -> Self {
        Self::default()
    }

    /// Primary key field
    pub fn primary() -> Self {
        Self {
            primary: true,
            ..Self::default()
        }
    }

    /// Relation of the given kind, target mapper still to be set
    pub fn relation(kind: RelationKind) -> Self {
        Self {
            relation: Some(kind),
            ..Self::default()
        }
    }

    pub fn has_one(mapper: impl Into<String>) -> Self {
        Self::relation(RelationKind::HasOne).mapper(mapper)
    }

    pub fn has_many(mapper: impl Into<String>) -> Self {
        Self::relation(RelationKind::HasMany).mapper(mapper)
    }

    #[must_use]
    pub fn mapper(mut self, mapper: impl Into<String>) -> Self {
        self.mapper = Some(mapper.into());
        self
    }

    #[must_use]
    pub fn template(mut self, template: WhereTemplate) -> Self {
        self.template = Some(template);
        self
    }

    #[must_use]
    pub fn order(mut self, order: OrderBy) -> Self {
        self.order.push(order);
        self
    }

    #[must_use]
    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    #[must_use]
    pub fn rules(mut self, rules: impl IntoIterator<Item = Rule>) -> Self {
        self.rules.extend(rules);
        self
    }
}

/// Fields and relations of one mapper
#[derive(Debug, Clone)]
pub struct MapperSchema {
    name: String,
    table: String,
    fields: Vec<FieldDef>,
    relations: Vec<RelationDef>,
    primary_key: Option<String>,
}

impl MapperSchema {
    /// Partition declared entries into fields and relations
    ///
    /// # Errors
    ///
    /// Returns `MapperError::Configuration` if an entry name repeats, more than
    /// one field is primary, a relation has no target mapper, or a relation is
    /// marked primary.
    pub fn register<N>(
        name: impl Into<String>,
        table: impl Into<String>,
        entries: impl IntoIterator<Item = (N, EntryOptions)>,
    ) -> Result<Self, MapperError>
    where
        N: Into<String>,
    {
        let name = name.into();
        let mut schema = Self {
            name,
            table: table.into(),
            fields: Vec::new(),
            relations: Vec::new(),
            primary_key: None,
        };
        let mut seen = HashSet::new();

        for (entry, options) in entries {
            let entry = entry.into();
            if !seen.insert(entry.clone()) {
                return Err(MapperError::Configuration(format!(
                    "'{entry}' is declared twice on mapper '{}'",
                    schema.name
                )));
            }

            match options.relation {
                Some(kind) => {
                    if options.primary {
                        return Err(MapperError::Configuration(format!(
                            "Relation '{entry}' on mapper '{}' cannot be a primary key",
                            schema.name
                        )));
                    }
                    let mapper = options.mapper.ok_or_else(|| {
                        MapperError::Configuration(format!(
                            "Relationship mapper for '{entry}' on mapper '{}' has not been defined",
                            schema.name
                        ))
                    })?;
                    schema.relations.push(RelationDef {
                        name: entry,
                        kind,
                        mapper,
                        template: options.template,
                        order: options.order,
                    });
                }
                None => {
                    if options.primary {
                        if let Some(existing) = &schema.primary_key {
                            return Err(MapperError::Configuration(format!(
                                "Mapper '{}' declares two primary keys: '{existing}' and '{entry}'",
                                schema.name
                            )));
                        }
                        schema.primary_key = Some(entry.clone());
                    }
                    schema.fields.push(FieldDef {
                        name: entry,
                        primary: options.primary,
                        rules: options.rules,
                    });
                }
            }
        }

        Ok(schema)
    }

    /// Start declaring a schema entry by entry
    pub fn builder(name: impl Into<String>, table: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            name: name.into(),
            table: table.into(),
            entries: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn relations(&self) -> &[RelationDef] {
        &self.relations
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn relation(&self, name: &str) -> Option<&RelationDef> {
        self.relations.iter().find(|r| r.name == name)
    }

    pub fn field_exists(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// # Errors
    ///
    /// Returns `MapperError::Configuration` if no field is primary.
    pub fn primary_key_field(&self) -> Result<&str, MapperError> {
        self.primary_key.as_deref().ok_or_else(|| {
            MapperError::Configuration(format!("No primary key field set for mapper '{}'", self.name))
        })
    }
}

/// Entry-by-entry schema declaration
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    name: String,
    table: String,
    entries: Vec<(String, EntryOptions)>,
}

impl SchemaBuilder {
    #[must_use]
    pub fn entry(mut self, name: impl Into<String>, options: EntryOptions) -> Self {
        self.entries.push((name.into(), options));
        self
    }

    #[must_use]
    pub fn primary_key(self, name: impl Into<String>) -> Self {
        self.entry(name, EntryOptions::primary())
    }

    #[must_use]
    pub fn field(self, name: impl Into<String>) -> Self {
        self.entry(name, EntryOptions::field())
    }

    #[must_use]
    pub fn relation(self, name: impl Into<String>, options: EntryOptions) -> Self {
        self.entry(name, options)
    }

    /// # Errors
    ///
    /// See [`MapperSchema::register`].
    pub fn build(self) -> Result<MapperSchema, MapperError> {
        MapperSchema::register(self.name, self.table, self.entries)
    }
}
