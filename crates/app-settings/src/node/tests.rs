use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::{Value, json};

use super::*;
use crate::instance::{Component, FnFactory, Instance};
use crate::registry::{SymbolKind, SymbolRegistry};
use crate::value::mapping_from_json;

fn raw(value: Value) -> Mapping {
    let Value::Object(map) = value else {
        panic!("test settings must be a JSON object");
    };
    mapping_from_json(map)
}

fn schema(doc: Value) -> Arc<Schema> {
    Schema::from_value(doc, Arc::new(SymbolRegistry::with_builtins())).unwrap()
}

fn backends_schema() -> Arc<Schema> {
    schema(json!({
        "NAME": "APP",
        "SETTINGS": {
            "LEVEL": null,
            "DEFAULT_BACKEND": null,
            "BACKEND": { "NAME": null, "URL": null, "TIMEOUT": null },
        },
        "ONE_TO_MANY": { "BACKENDS": "BACKEND|NAME" },
        "LINK": { "DEFAULT_BACKEND": "BACKENDS|NAME" },
    }))
}

fn two_backends() -> Mapping {
    raw(json!({
        "BACKENDS": [
            { "NAME": "a", "URL": "http://a" },
            { "NAME": "b", "URL": "http://b" },
        ],
    }))
}

#[derive(Debug)]
struct Store {
    size: i64,
}

impl Component for Store {
    fn attribute(&self, name: &str) -> Option<Setting> {
        (name == "CAPACITY").then(|| Setting::from(self.size.saturating_mul(10)))
    }
}

fn store_registry(created: Arc<AtomicUsize>) -> Arc<SymbolRegistry> {
    let mut registry = SymbolRegistry::with_builtins();
    registry
        .register_factory(
            "app.stores.Memory",
            FnFactory::new("app.stores.Memory", move |settings| {
                created.fetch_add(1, Ordering::SeqCst);
                let size = settings.get("SIZE")?.as_i64().unwrap_or_default();
                Ok(Arc::new(Store { size }) as Instance)
            }),
        )
        .unwrap();
    Arc::new(registry)
}

#[test]
fn test_raw_value_wins_over_default() {
    let schema = schema(json!({
        "NAME": "APP",
        "SETTINGS": ["LEVEL", "DEBUG"],
        "DEFAULTS": { "LEVEL": 1, "DEBUG": false },
    }));
    let root = SettingsNode::root(schema, raw(json!({ "LEVEL": 3 })));

    assert_eq!(root.get("LEVEL").unwrap(), Setting::from(3));
    assert_eq!(root.get("DEBUG").unwrap(), Setting::from(false));
    assert_eq!(root.source_of("LEVEL"), Some(ValueSource::Raw));
    assert_eq!(root.source_of("DEBUG"), Some(ValueSource::Default));
}

#[test]
fn test_unlisted_name_is_unknown_even_if_raw_has_it() {
    let schema = schema(json!({ "NAME": "APP", "SETTINGS": ["LEVEL"] }));
    let root = SettingsNode::root(schema, raw(json!({ "SECRET": 1 })));

    let err = root.get("SECRET").unwrap_err();
    assert!(matches!(err, SettingsError::UnknownSetting { ref name, .. } if name == "SECRET"));
    assert_eq!(err.to_string(), "Invalid 'APP' setting: 'SECRET'");
}

#[test]
fn test_unset_name_is_unknown_and_lookup_is_none() {
    let schema = schema(json!({ "NAME": "APP", "SETTINGS": ["LEVEL"] }));
    let root = SettingsNode::root(schema, Mapping::new());

    assert!(matches!(
        root.get("LEVEL"),
        Err(SettingsError::UnknownSetting { .. })
    ));
    assert_eq!(root.lookup("LEVEL").unwrap(), None);
    assert!(!root.is_resolved("LEVEL"));
}

#[test]
fn test_memoized_value_validated_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let mut registry = SymbolRegistry::new();
    registry
        .register_validator("app.checks.count", move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        })
        .unwrap();
    let schema = Schema::builder("APP")
        .setting("LEVEL")
        .validate("LEVEL", "app.checks.count")
        .build(Arc::new(registry))
        .unwrap();
    let root = SettingsNode::root(schema, raw(json!({ "LEVEL": 3 })));

    let first = root.get("LEVEL").unwrap();
    let second = root.get("LEVEL").unwrap();
    assert_eq!(first, second);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(root.is_resolved("LEVEL"));
}

#[test]
fn test_rejected_value_is_not_memoized() {
    let mut registry = SymbolRegistry::new();
    registry
        .register_validator("app.checks.never", |_, _| false)
        .unwrap();
    let schema = Schema::builder("APP")
        .setting("LEVEL")
        .validate("LEVEL", "app.checks.never")
        .build(Arc::new(registry))
        .unwrap();
    let root = SettingsNode::root(schema, raw(json!({ "LEVEL": 3 })));

    let err = root.get("LEVEL").unwrap_err();
    assert!(matches!(err, SettingsError::InvalidSetting { .. }));
    assert!(err.to_string().contains("app.checks.never"));
    assert!(!root.is_resolved("LEVEL"));
    assert!(root.sources().is_empty());
}

#[test]
fn test_per_attribute_validator_replaces_schema_validator() {
    let mut registry = SymbolRegistry::new();
    registry
        .register_validator("app.checks.positive", |_, v| {
            v.as_i64().is_none_or(|n| n > 0)
        })
        .unwrap();
    registry
        .register_validator("app.checks.any", |_, _| true)
        .unwrap();
    let schema = Schema::builder("APP")
        .setting("LEVEL")
        .setting("OFFSET")
        .validation_method("app.checks.positive")
        .validate("OFFSET", "app.checks.any")
        .build(Arc::new(registry))
        .unwrap();
    let root = SettingsNode::root(schema, raw(json!({ "LEVEL": -1, "OFFSET": -1 })));

    assert!(matches!(
        root.get("LEVEL"),
        Err(SettingsError::InvalidSetting { .. })
    ));
    assert_eq!(root.get("OFFSET").unwrap(), Setting::from(-1));
}

#[test]
fn test_singular_alias_keyed_by_filter_field() {
    let root = SettingsNode::root(
        backends_schema(),
        raw(json!({ "BACKEND": { "NAME": "x", "URL": "http://x" } })),
    );

    let backends = root.get("BACKENDS").unwrap();
    let members = backends.as_map().unwrap();
    assert_eq!(members.keys().collect::<Vec<_>>(), ["x"]);
    let x = members["x"].as_node().unwrap();
    assert_eq!(x.lookup_path(), "BACKENDS.x");
    assert_eq!(x.get("URL").unwrap(), Setting::from("http://x"));
    assert_eq!(root.source_of("BACKENDS"), Some(ValueSource::Alias));
}

#[test]
fn test_list_alias_keyed_by_filter_field() {
    let root = SettingsNode::root(backends_schema(), two_backends());

    let backends = root.get("BACKENDS").unwrap();
    let members = backends.as_map().unwrap();
    assert_eq!(members.keys().collect::<Vec<_>>(), ["a", "b"]);
    assert_eq!(
        members["b"].as_node().unwrap().get("URL").unwrap(),
        Setting::from("http://b")
    );
}

#[test]
fn test_member_without_filter_field_is_invalid() {
    let root = SettingsNode::root(
        backends_schema(),
        raw(json!({ "BACKENDS": [{ "URL": "http://nameless" }] })),
    );

    let err = root.get("BACKENDS").unwrap_err();
    assert!(matches!(err, SettingsError::InvalidSetting { ref name, .. } if name == "BACKENDS"));
}

#[test]
fn test_unfiltered_alias_wraps_singular_in_list() {
    let schema = schema(json!({
        "NAME": "APP",
        "SETTINGS": ["HOST"],
        "ONE_TO_MANY": { "HOSTS": "HOST" },
    }));
    let root = SettingsNode::root(schema, raw(json!({ "HOST": "db1" })));

    assert_eq!(
        root.get("HOSTS").unwrap(),
        Setting::List(vec![Setting::from("db1")])
    );
}

#[test]
fn test_filtered_lookup() {
    let root = SettingsNode::root(backends_schema(), two_backends());

    let b = root.get_filtered("BACKENDS", "NAME", "b").unwrap();
    assert_eq!(b.as_node().unwrap().get("URL").unwrap(), Setting::from("http://b"));

    let err = root.get_filtered("BACKENDS", "NAME", "zzz").unwrap_err();
    assert!(matches!(err, SettingsError::FilterNotMatched { .. }));
    assert!(err.is_unresolved());
}

#[test]
fn test_link_resolves_to_member() {
    let mut settings = two_backends();
    settings.insert("DEFAULT_BACKEND".to_owned(), Setting::from("b"));
    let root = SettingsNode::root(backends_schema(), settings);

    let linked = root.get("DEFAULT_BACKEND").unwrap();
    let node = linked.as_node().unwrap();
    assert_eq!(node.lookup_path(), "BACKENDS.b");
    assert_eq!(node.get("URL").unwrap(), Setting::from("http://b"));
}

#[test]
fn test_broken_link() {
    let mut settings = two_backends();
    settings.insert("DEFAULT_BACKEND".to_owned(), Setting::from("missing"));
    let root = SettingsNode::root(backends_schema(), settings);

    let err = root.get("DEFAULT_BACKEND").unwrap_err();
    assert!(matches!(
        err,
        SettingsError::BrokenLink { ref key, ref link, .. } if key == "missing" && link == "BACKENDS|NAME"
    ));
}

#[test]
fn test_self_link_is_a_cycle() {
    let schema = schema(json!({
        "NAME": "APP",
        "SETTINGS": ["SELF"],
        "LINK": { "SELF": "SELF|NAME" },
    }));
    let root = SettingsNode::root(schema, raw(json!({ "SELF": "a" })));

    let err = root.get("SELF").unwrap_err();
    assert!(matches!(err, SettingsError::LinkCycle { ref key, .. } if key == "a"));
}

#[test]
fn test_nested_node_and_parent() {
    let root = SettingsNode::root(
        backends_schema(),
        raw(json!({ "BACKEND": { "NAME": "x", "URL": "http://x" } })),
    );

    let backend = root.get("BACKEND").unwrap();
    let child = backend.as_node().unwrap();
    assert_eq!(child.lookup_path(), "BACKEND");
    assert!(!child.is_root());

    let parent = child.get(PARENT).unwrap();
    assert!(Arc::ptr_eq(parent.as_node().unwrap(), &root));
    assert!(matches!(
        root.get(PARENT),
        Err(SettingsError::UnknownSetting { .. })
    ));

    let err = child.get("LEVEL").unwrap_err();
    assert_eq!(err.to_string(), "Invalid 'APP.BACKEND' setting: 'LEVEL'");
}

#[test]
fn test_get_path() {
    let root = SettingsNode::root(backends_schema(), two_backends());

    assert_eq!(
        root.get_path("BACKENDS.a.URL").unwrap(),
        Setting::from("http://a")
    );
    assert!(matches!(
        root.get_path("BACKENDS.a.URL.DEEPER"),
        Err(SettingsError::UnknownSetting { .. })
    ));
    assert!(root.get_path("").is_err());
}

#[test]
fn test_global_read_from_ancestor() {
    let schema = schema(json!({
        "NAME": "APP",
        "SETTINGS": { "REGION": null, "BACKEND": { "URL": null } },
        "GLOBALS": ["REGION"],
    }));
    let root = SettingsNode::root(
        schema,
        raw(json!({ "REGION": "eu", "BACKEND": { "URL": "http://x" } })),
    );

    let backend = root.get("BACKEND").unwrap();
    let child = backend.as_node().unwrap();
    assert_eq!(child.get("REGION").unwrap(), Setting::from("eu"));
    assert_eq!(child.source_of("REGION"), Some(ValueSource::Ancestor));
}

#[test]
fn test_fallback_supplies_missing_values() {
    let global = SettingsNode::root(
        Schema::open("GLOBAL"),
        raw(json!({ "LEVEL": 3, "BACKEND": { "URL": "http://global", "TIMEOUT": 30 } })),
    );
    let root = SettingsNode::root_with(
        backends_schema(),
        raw(json!({ "BACKEND": { "NAME": "x", "URL": "http://own" } })),
        RootOptions {
            fallback: Some(global),
            ..RootOptions::default()
        },
    );

    assert_eq!(root.get("LEVEL").unwrap(), Setting::from(3));
    assert_eq!(root.source_of("LEVEL"), Some(ValueSource::Fallback));

    let backend = root.get("BACKEND").unwrap();
    let child = backend.as_node().unwrap();
    assert_eq!(child.get("URL").unwrap(), Setting::from("http://own"));
    assert_eq!(child.get("TIMEOUT").unwrap(), Setting::from(30));
}

#[test]
fn test_import_strings() {
    let mut registry = SymbolRegistry::new();
    registry
        .register(
            "app.consts.ANSWER",
            SymbolKind::Constant(Arc::new(Setting::from(42))),
        )
        .unwrap();
    let schema = Schema::builder("APP")
        .setting("HANDLER")
        .setting("BROKEN")
        .import_string("HANDLER")
        .import_string("BROKEN")
        .build(Arc::new(registry))
        .unwrap();
    let root = SettingsNode::root(
        schema,
        raw(json!({ "HANDLER": "app.consts.ANSWER", "BROKEN": "app.consts.MISSING" })),
    );

    let handler = root.get("HANDLER").unwrap();
    let symbol = handler.as_symbol().unwrap();
    assert_eq!(symbol.path(), "app.consts.ANSWER");
    assert_eq!(symbol.as_constant(), Some(&Setting::from(42)));

    let err = root.get("BROKEN").unwrap_err();
    assert!(matches!(err, SettingsError::ImportResolution { ref reference, .. } if reference == "app.consts.MISSING"));
}

#[test]
fn test_protected_default_rejects_override() {
    let schema = schema(json!({
        "NAME": "APP",
        "SETTINGS": { "BACKEND": { "NAME": null, "URL": null } },
        "ONE_TO_MANY": { "BACKENDS": "BACKEND|NAME" },
        "DEFAULTS": {
            "BACKENDS": { "main": { "PROTECTED": true, "NAME": "main", "URL": "http://main" } },
        },
    }));

    let defaulted = SettingsNode::root(Arc::clone(&schema), Mapping::new());
    assert!(defaulted.get("BACKENDS").is_ok());

    let root = SettingsNode::root(
        schema,
        raw(json!({ "BACKENDS": [{ "NAME": "main", "URL": "http://evil" }] })),
    );
    let err = root.get("BACKENDS").unwrap_err();
    assert!(matches!(
        err,
        SettingsError::ProtectedSettingOverride { ref key, .. } if key == "URL"
    ));
}

#[test]
fn test_protected_attribute_default_rejects_override() {
    let schema = schema(json!({
        "NAME": "APP",
        "SETTINGS": { "STORE": { "URL": null } },
        "DEFAULTS": { "STORE": { "PROTECTED": true, "URL": "mem://" } },
    }));

    let defaulted = SettingsNode::root(Arc::clone(&schema), Mapping::new());
    assert_eq!(defaulted.get_path("STORE.URL").unwrap(), Setting::from("mem://"));

    let root = SettingsNode::root(schema, raw(json!({ "STORE": { "URL": "redis://" } })));
    let err = root.get_path("STORE.URL").unwrap_err();
    assert!(matches!(
        err,
        SettingsError::ProtectedSettingOverride { ref key, .. } if key == "URL"
    ));
    assert!(!root.is_resolved("STORE"));
}

#[test]
fn test_defaults_merge_into_members() {
    let schema = schema(json!({
        "NAME": "APP",
        "SETTINGS": { "BACKEND": { "NAME": null, "URL": null, "TIMEOUT": null } },
        "ONE_TO_MANY": { "BACKENDS": "BACKEND|NAME" },
        "DEFAULTS": {
            "BACKENDS": { "main": { "NAME": "main", "URL": "http://main", "TIMEOUT": 5 } },
        },
    }));
    let root = SettingsNode::root(
        schema,
        raw(json!({ "BACKENDS": [{ "NAME": "main", "URL": "http://other" }] })),
    );

    let main = root.get_path("BACKENDS.main").unwrap();
    let main = main.as_node().unwrap();
    assert_eq!(main.get("URL").unwrap(), Setting::from("http://other"));
    assert_eq!(main.get("TIMEOUT").unwrap(), Setting::from(5));
}

#[test]
fn test_with_configuration_starts_fresh() {
    let schema = schema(json!({ "NAME": "APP", "SETTINGS": ["LEVEL"] }));
    let root = SettingsNode::root(schema, raw(json!({ "LEVEL": 1 })));
    assert_eq!(root.get("LEVEL").unwrap(), Setting::from(1));

    let overridden = root.with_configuration(&raw(json!({ "LEVEL": 9 })));
    assert_eq!(overridden.get("LEVEL").unwrap(), Setting::from(9));
    assert_eq!(overridden.source_of("LEVEL"), Some(ValueSource::Overlay));
    assert_eq!(root.get("LEVEL").unwrap(), Setting::from(1));
    assert_ne!(root.fingerprint(), overridden.fingerprint());
}

#[test]
fn test_nested_with_configuration_reaches_link_targets() {
    let schema = schema(json!({
        "NAME": "APP",
        "SETTINGS": { "BACKEND": { "NAME": null, "URL": null, "FAILOVER": null } },
        "ONE_TO_MANY": { "BACKENDS": "BACKEND|NAME" },
        "LINK": { "BACKEND.FAILOVER": "BACKENDS|NAME" },
    }));
    let root = SettingsNode::root(
        schema,
        raw(json!({
            "BACKENDS": [
                { "NAME": "a", "URL": "http://a" },
                { "NAME": "b", "URL": "http://b", "FAILOVER": "a" },
            ],
        })),
    );
    let member = root.get_path("BACKENDS.a").unwrap();
    let member = member.as_node().unwrap();

    let patched = member.with_configuration(&raw(json!({
        "URL": "http://a2",
        "FAILOVER": "a",
    })));
    assert_eq!(patched.lookup_path(), "BACKENDS.a");
    assert_eq!(patched.get("URL").unwrap(), Setting::from("http://a2"));
    assert_eq!(
        patched.get_path("FAILOVER.URL").unwrap(),
        Setting::from("http://a2")
    );
    assert_eq!(
        root.get_path("BACKENDS.b.FAILOVER.URL").unwrap(),
        Setting::from("http://a")
    );
}

#[test]
fn test_member_overlay_patches_only_that_member() {
    let root = SettingsNode::root(backends_schema(), two_backends());
    let patched = root.with_configuration(&raw(json!({
        "BACKENDS": { "a": { "URL": "http://patched" } },
    })));

    assert_eq!(
        patched.get_path("BACKENDS.a.URL").unwrap(),
        Setting::from("http://patched")
    );
    assert_eq!(patched.get_path("BACKENDS.a.NAME").unwrap(), Setting::from("a"));
    assert_eq!(
        patched.get_path("BACKENDS.b.URL").unwrap(),
        Setting::from("http://b")
    );
}

#[test]
fn test_singular_overlay_patch_reaches_alias_members() {
    let root = SettingsNode::root(
        backends_schema(),
        raw(json!({ "BACKEND": { "NAME": "x", "URL": "http://a" } })),
    );
    let patched = root.with_configuration(&raw(json!({ "BACKEND": { "URL": "http://b" } })));

    assert_eq!(patched.get_path("BACKEND.URL").unwrap(), Setting::from("http://b"));
    assert_eq!(patched.get_path("BACKENDS.x.URL").unwrap(), Setting::from("http://b"));
    assert_eq!(root.get_path("BACKENDS.x.URL").unwrap(), Setting::from("http://a"));
}

#[test]
fn test_singular_overlay_patch_reaches_unfiltered_alias() {
    let schema = schema(json!({
        "NAME": "APP",
        "SETTINGS": { "REPLICA": { "HOST": null, "PORT": null } },
        "ONE_TO_MANY": { "REPLICAS": "REPLICA" },
    }));
    let root = SettingsNode::root(schema, raw(json!({ "REPLICA": { "HOST": "h", "PORT": 1 } })));
    let patched = root.with_configuration(&raw(json!({ "REPLICA": { "PORT": 2 } })));

    let replicas = patched.get("REPLICAS").unwrap();
    let replicas = replicas.as_list().unwrap();
    assert_eq!(replicas.len(), 1);
    let replica = replicas[0].as_node().unwrap();
    assert_eq!(replica.get("PORT").unwrap(), Setting::from(2));
    assert_eq!(replica.get("HOST").unwrap(), Setting::from("h"));
}

#[test]
fn test_overlay_only_member_is_seeded() {
    let root = SettingsNode::root(backends_schema(), two_backends());
    let patched = root.with_configuration(&raw(json!({
        "BACKENDS": { "c": { "URL": "http://c" } },
    })));

    let backends = patched.get("BACKENDS").unwrap();
    assert_eq!(
        backends.as_map().unwrap().keys().collect::<Vec<_>>(),
        ["a", "b", "c"]
    );
    assert_eq!(patched.get_path("BACKENDS.c.NAME").unwrap(), Setting::from("c"));
    assert_eq!(patched.get_path("BACKENDS.c.URL").unwrap(), Setting::from("http://c"));
}

#[test]
fn test_named_collection_members_are_open() {
    let schema = schema(json!({ "NAME": "APP", "SETTINGS": { "CACHE_ITEMS": null } }));
    let root = SettingsNode::root(
        schema,
        raw(json!({ "CACHE_ITEMS": { "hot": { "SIZE": 1 }, "cold": { "SIZE": 2 } } })),
    );

    let cold = root.get_path("CACHE_ITEMS.cold").unwrap();
    let cold = cold.as_node().unwrap();
    assert_eq!(cold.lookup_path(), "CACHE_ITEMS.cold");
    assert_eq!(cold.get("SIZE").unwrap(), Setting::from(2));
}

#[test]
fn test_deprecated_setting_still_resolves() {
    let schema = Schema::builder("APP")
        .setting("OLD")
        .deprecate("OLD")
        .build(Arc::new(SymbolRegistry::new()))
        .unwrap();
    let root = SettingsNode::root(schema, raw(json!({ "OLD": 1 })));
    assert_eq!(root.get("OLD").unwrap(), Setting::from(1));
}

#[test]
fn test_fingerprint_ignores_node_identity() {
    let schema = backends_schema();
    let first = SettingsNode::root(Arc::clone(&schema), two_backends());
    let second = SettingsNode::root(schema, two_backends());
    assert_eq!(first.fingerprint(), second.fingerprint());
}

#[test]
fn test_init_builds_singleton() {
    let created = Arc::new(AtomicUsize::new(0));
    let schema = Schema::from_value(
        json!({
            "NAME": "APP",
            "SETTINGS": { "STORE": { "CLASS": null, "SIZE": null } },
            "INIT": { "STORE": "app_settings.init.get_class_from_config" },
        }),
        store_registry(Arc::clone(&created)),
    )
    .unwrap();
    let settings = raw(json!({ "STORE": { "CLASS": "app.stores.Memory", "SIZE": 4 } }));
    let cache = Arc::new(InstanceCache::new());
    let options = RootOptions {
        instances: Some(Arc::clone(&cache)),
        ..RootOptions::default()
    };

    let first = SettingsNode::root_with(Arc::clone(&schema), settings.clone(), options.clone());
    let second = SettingsNode::root_with(schema, settings, options);
    let a = first.get("STORE").unwrap();
    let b = second.get("STORE").unwrap();

    let a = a.as_instance().unwrap();
    assert!(Arc::ptr_eq(a, b.as_instance().unwrap()));
    assert_eq!(a.attribute("CAPACITY"), Some(Setting::from(40)));
    assert_eq!(created.load(Ordering::SeqCst), 1);
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_instance_on_node() {
    let created = Arc::new(AtomicUsize::new(0));
    let schema = Schema::from_value(
        json!({ "NAME": "APP", "SETTINGS": { "STORE": { "CLASS": null, "SIZE": null } } }),
        store_registry(Arc::clone(&created)),
    )
    .unwrap();
    let root = SettingsNode::root_with(
        schema,
        raw(json!({ "STORE": { "CLASS": "app.stores.Memory", "SIZE": 1 } })),
        RootOptions {
            instances: Some(Arc::new(InstanceCache::new())),
            ..RootOptions::default()
        },
    );

    let store = root.get("STORE").unwrap();
    let node = store.as_node().unwrap();
    let instance = node.get(INSTANCE).unwrap();
    assert!(instance.as_instance().is_some());
    assert!(Arc::ptr_eq(
        instance.as_instance().unwrap(),
        node.get(INSTANCE).unwrap().as_instance().unwrap()
    ));
    assert_eq!(created.load(Ordering::SeqCst), 1);
}
