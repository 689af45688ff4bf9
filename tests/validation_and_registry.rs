//! Mapper validation and registry configuration errors.

mod common;

use common::{file_schema, image_schema, test_schema, Fixture};
use datamapper::mapper::{EntryOptions, MapperSchema, Registry};
use datamapper::query::memory::MemoryQueryService;
use datamapper::relation::{RelationKind, WhereTemplate};
use datamapper::validation::Rule;
use datamapper::MapperError;
use std::sync::Arc;

#[test]
fn test_validate_complete_entity() {
    let fixture = Fixture::new();
    let tests = fixture.tests();

    let mut item = tests.new_entity().unwrap();
    item.set("name", "Test");
    item.set("title", "Test title");
    item.set("content", "Test content");

    assert!(tests.validate(&mut item));
    assert!(tests.errors(&item).is_empty());
}

#[test]
fn test_validate_reports_field_messages() {
    let fixture = Fixture::new();
    let tests = fixture.tests();

    let mut item = tests.new_entity().unwrap();
    item.set("name", "");
    item.set("title", "Untitled");

    assert!(!tests.validate(&mut item));
    let errors = tests.errors(&item);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors["name"], vec!["name must not be empty".to_string()]);
}

#[test]
fn test_validate_uses_effective_data() {
    let fixture = Fixture::new();
    fixture.seed_tests(1);
    let tests = fixture.tests();

    let mut item = tests.fetch_by_key(1).unwrap().unwrap();
    item.set("name", "");
    assert!(!tests.validate(&mut item));
}

#[test]
fn test_rules_on_several_fields() {
    let schema = MapperSchema::builder("account", "accounts")
        .primary_key("id")
        .entry("email", EntryOptions::field().rules([Rule::NotEmpty, Rule::Email]))
        .entry("age", EntryOptions::field().rule(Rule::Range { min: 18.0, max: 130.0 }))
        .build()
        .unwrap();
    let registry = Registry::builder(Arc::new(MemoryQueryService::new()))
        .register(schema)
        .build()
        .unwrap();
    let accounts = registry.mapper("account").unwrap();

    let mut account = accounts.new_entity().unwrap();
    account.set("email", "nobody");
    account.set("age", 12);

    assert!(!accounts.validate(&mut account));
    let errors = accounts.errors(&account);
    assert!(errors.contains_key("email"));
    assert!(errors.contains_key("age"));
}

#[test]
fn test_registry_rejects_unknown_target() {
    let result = Registry::builder(Arc::new(MemoryQueryService::new()))
        .register(test_schema())
        .register(file_schema())
        .build();
    assert!(matches!(result, Err(MapperError::Configuration(_))));
}

#[test]
fn test_registry_rejects_bad_placeholder() {
    let broken = MapperSchema::builder("gallery", "galleries")
        .primary_key("id")
        .relation(
            "images",
            EntryOptions::has_many("image").template(WhereTemplate::map([("test_id", "gallery_key")])),
        )
        .build()
        .unwrap();

    let result = Registry::builder(Arc::new(MemoryQueryService::new()))
        .register(broken)
        .register(image_schema())
        .register(test_schema())
        .register(file_schema())
        .build();
    let err = result.unwrap_err();
    assert!(err.to_string().contains("gallery_key"), "{err}");
}

#[test]
fn test_schema_rejects_relation_without_target() {
    let result = MapperSchema::register(
        "test",
        "tests",
        [
            ("id", EntryOptions::primary()),
            ("file", EntryOptions::relation(RelationKind::HasOne)),
        ],
    );
    assert!(matches!(result, Err(MapperError::Configuration(_))));
}

#[test]
fn test_unknown_mapper_lookup() {
    let fixture = Fixture::new();
    assert!(matches!(fixture.registry.mapper("Test"), Err(MapperError::UnknownMapper(_))));
}

#[test]
fn test_mapper_without_primary_key_cannot_save() {
    let schema = MapperSchema::builder("log", "logs").field("message").build().unwrap();
    let registry = Registry::builder(Arc::new(MemoryQueryService::new()))
        .register(schema)
        .build()
        .unwrap();
    let logs = registry.mapper("log").unwrap();

    let mut entry = logs.new_entity().unwrap();
    entry.set("message", "hello");
    assert!(matches!(logs.save(&mut entry), Err(MapperError::Configuration(_))));
    assert!(matches!(logs.fetch_by_key(1), Err(MapperError::Configuration(_))));
}
