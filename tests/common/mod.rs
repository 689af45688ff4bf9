//! Shared fixtures: `test`, `file` and `image` mappers over an in-memory store.

#![allow(dead_code)]

use datamapper::config::MapperSettings;
use datamapper::mapper::{EntryOptions, MapperSchema, Registry};
use datamapper::query::memory::MemoryQueryService;
use datamapper::query::{InsertOutcome, QueryService, RowSet, Select};
use datamapper::relation::WhereTemplate;
use datamapper::validation::Rule;
use datamapper::{Condition, Mapper, OrderBy, QueryError, Record};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Passes every call through to a `MemoryQueryService`, recording writes
#[derive(Default)]
pub struct CountingQueryService {
    inner: Arc<MemoryQueryService>,
    selects: AtomicUsize,
    inserts: AtomicUsize,
    updates: Mutex<Vec<(String, Vec<String>)>>,
    deletes: AtomicUsize,
}

impl CountingQueryService {
    pub fn new(inner: Arc<MemoryQueryService>) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    pub fn selects(&self) -> usize {
        self.selects.load(Ordering::SeqCst)
    }

    pub fn inserts(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    /// `(table, written columns)` of every update issued
    pub fn updates(&self) -> Vec<(String, Vec<String>)> {
        self.updates.lock().unwrap().clone()
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.inserts() + self.updates().len() + self.deletes()
    }
}

impl QueryService for CountingQueryService {
    fn select(&self, select: &Select) -> Result<RowSet, QueryError> {
        self.selects.fetch_add(1, Ordering::SeqCst);
        self.inner.select(select)
    }

    fn insert(&self, table: &str, values: &Record, key_column: &str) -> Result<InsertOutcome, QueryError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.inner.insert(table, values, key_column)
    }

    fn update(&self, table: &str, values: &Record, condition: &Condition) -> Result<u64, QueryError> {
        self.updates
            .lock()
            .unwrap()
            .push((table.to_string(), values.keys().cloned().collect()));
        self.inner.update(table, values, condition)
    }

    fn delete(&self, table: &str, condition: &Condition) -> Result<u64, QueryError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(table, condition)
    }
}

pub struct Fixture {
    pub store: Arc<MemoryQueryService>,
    pub calls: Arc<CountingQueryService>,
    pub registry: Registry,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_settings(MapperSettings::default())
    }

    pub fn with_settings(settings: MapperSettings) -> Self {
        let store = Arc::new(MemoryQueryService::new());
        let calls = Arc::new(CountingQueryService::new(store.clone()));
        let registry = Registry::builder(calls.clone())
            .settings(settings)
            .register(test_schema())
            .register(file_schema())
            .register(image_schema())
            .build()
            .expect("fixture schemas are valid");
        Self { store, calls, registry }
    }

    pub fn tests(&self) -> Mapper {
        self.registry.mapper("test").expect("test mapper")
    }

    pub fn files(&self) -> Mapper {
        self.registry.mapper("file").expect("file mapper")
    }

    pub fn images(&self) -> Mapper {
        self.registry.mapper("image").expect("image mapper")
    }

    /// Insert `Name i` / `Title i` / `Content i` for `i` in `1..=count`
    pub fn seed_tests(&self, count: usize) {
        let tests = self.tests();
        for i in 1..=count {
            let mut entity = tests.new_entity().expect("new entity");
            entity.set("name", format!("Name {i}"));
            entity.set("title", format!("Title {i}"));
            entity.set("content", format!("Content {i}"));
            assert!(tests.save(&mut entity).expect("seed save"));
        }
    }
}

pub fn test_schema() -> MapperSchema {
    MapperSchema::register(
        "test",
        "tests",
        [
            ("id", EntryOptions::primary()),
            ("name", EntryOptions::field().rule(Rule::NotEmpty)),
            ("title", EntryOptions::field()),
            ("content", EntryOptions::field()),
            ("file_id", EntryOptions::field()),
            ("file", EntryOptions::has_one("file").template(WhereTemplate::eq("id", "file_id"))),
            (
                "images",
                EntryOptions::has_many("image")
                    .template(WhereTemplate::eq("test_id", "id"))
                    .order(OrderBy::asc("name")),
            ),
        ],
    )
    .expect("test schema")
}

pub fn file_schema() -> MapperSchema {
    MapperSchema::builder("file", "files")
        .primary_key("id")
        .entry("name", EntryOptions::field().rule(Rule::NotEmpty))
        .build()
        .expect("file schema")
}

pub fn image_schema() -> MapperSchema {
    MapperSchema::builder("image", "images")
        .primary_key("id")
        .field("test_id")
        .entry("name", EntryOptions::field().rule(Rule::NotEmpty))
        .relation("test", EntryOptions::has_one("test").template(WhereTemplate::eq("id", "test_id")))
        .build()
        .expect("image schema")
}
