//! Integration tests for preset persistence and effective-default resolution.
//!
//! These run against real storage backends (a JSON file on disk) and the
//! bundled factory presets, the way the runner wires them up.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use patternkit::prelude::*;

fn temp_store_path(tag: &str) -> PathBuf {
    let unique = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before epoch")
        .as_nanos();
    std::env::temp_dir()
        .join(format!("patternkit-it-{tag}-{}-{unique}", std::process::id()))
        .join("presets.json")
}

fn params(pairs: &[(&str, ParamValue)]) -> ParamMap {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

fn bundled() -> FactoryPresets<BundledFactoryPresets> {
    FactoryPresets::new(BundledFactoryPresets::new())
}

/// Bundled presets that count how often they are fetched.
#[derive(Default)]
struct CountingSource {
    fetches: AtomicUsize,
}

impl FactorySource for CountingSource {
    async fn fetch(&self) -> patternkit::Result<String> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        BundledFactoryPresets::new().fetch().await
    }
}

// ============================================================================
// Persistence
// ============================================================================

#[test]
fn test_save_load_round_trip_through_file() {
    let path = temp_store_path("round-trip");
    let values = params(&[
        ("rho", ParamValue::Number(30.5)),
        ("color", ParamValue::Text("#ff8800".into())),
    ]);

    let saved = {
        let mut store = PresetStore::new(FileStorage::open(&path).unwrap());
        store.save_preset("Warm", "lorenz", values.clone()).unwrap()
    };

    let store = PresetStore::new(FileStorage::open(&path).unwrap());
    let loaded = store.load_user_presets();
    assert_eq!(loaded.len(), 1);
    let p = &loaded[0];
    assert_eq!(p.id, saved.id);
    assert_eq!(p.name, "Warm");
    assert_eq!(p.generator_type, "lorenz");
    assert_eq!(p.parameters, values);
    assert_eq!(p.content_hash, saved.content_hash);
    assert_eq!(p.content_hash, patternkit::preset::content_hash("Warm", "lorenz", &values));

    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}

#[test]
fn test_content_hash_ignores_insertion_order_and_time() {
    let a = params(&[("a", ParamValue::Number(1.0)), ("b", ParamValue::Bool(true))]);
    let mut b = ParamMap::new();
    b.insert("b".into(), ParamValue::Bool(true));
    b.insert("a".into(), ParamValue::Number(1.0));

    let first = PatternPreset::new("Same", "thomas", a);
    let second = PatternPreset::new("Same", "thomas", b);
    assert_ne!(first.id, second.id);
    assert_eq!(first.content_hash, second.content_hash);
    assert_ne!(
        first.content_hash,
        PatternPreset::new("Other", "thomas", ParamMap::new()).content_hash
    );
}

#[test]
fn test_user_default_survives_reopen() {
    let path = temp_store_path("reopen");
    {
        let mut store = PresetStore::new(FileStorage::open(&path).unwrap());
        let first = store.save_preset("One", "halvorsen", params(&[("a", ParamValue::Number(1.5))])).unwrap();
        let second = store.save_preset("Two", "halvorsen", params(&[("a", ParamValue::Number(2.2))])).unwrap();
        store.set_user_default(&first.id).unwrap();
        store.set_user_default(&second.id).unwrap();
    }

    let store = PresetStore::new(FileStorage::open(&path).unwrap());
    let default = store.user_default("halvorsen").unwrap().unwrap();
    assert_eq!(default.name, "Two");
    let marked = store.presets_for("halvorsen").iter().filter(|p| p.is_user_default).count();
    assert_eq!(marked, 1);

    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}

#[test]
fn test_corrupt_file_loads_as_empty_store() {
    let path = temp_store_path("corrupt-entry");
    {
        let mut storage = FileStorage::open(&path).unwrap();
        storage.set("pattern-presets", "{not an array".into()).unwrap();
    }

    let store = PresetStore::new(FileStorage::open(&path).unwrap());
    assert!(store.load_user_presets().is_empty());
    assert!(store.user_default("lorenz").is_err());

    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}

#[test]
fn test_quota_refuses_write_and_keeps_previous_data() {
    let config = StoreConfig::default().with_storage_budget(600);
    let mut store = PresetStore::new(MemoryStorage::new()).with_config(config);
    store.save_preset("Small", "thomas", ParamMap::new()).unwrap();

    let big = params(&[("notes", ParamValue::Text("x".repeat(1_000)))]);
    let err = store.save_preset("Big", "thomas", big).unwrap_err();
    assert!(matches!(err, PatternError::QuotaExceeded { budget: 600, .. }));

    let names: Vec<String> = store.load_user_presets().into_iter().map(|p| p.name).collect();
    assert_eq!(names, vec!["Small".to_string()]);
}

// ============================================================================
// Effective default precedence
// ============================================================================

#[test]
fn test_bundled_factory_default_is_used() {
    let store = PresetStore::new(MemoryStorage::new());
    let factory = bundled();
    let resolver = PresetResolver::new(&store, &factory);

    for pattern in builtin_patterns() {
        let resolved = pollster::block_on(resolver.resolve(&pattern.id));
        assert_eq!(resolved.source(), "factory", "{} has no factory default", pattern.id);
        let preset = resolved.preset().unwrap();
        assert!(preset.is_factory && preset.is_default);
        assert_eq!(preset.generator_type, pattern.id);
    }
}

#[test]
fn test_user_default_beats_bundled_factory_default() {
    let path = temp_store_path("precedence");
    let mut store = PresetStore::new(FileStorage::open(&path).unwrap());
    let mine = store.save_preset("Mine", "lorenz", params(&[("rho", ParamValue::Number(35.0))])).unwrap();
    store.set_user_default(&mine.id).unwrap();

    let factory = bundled();
    let resolver = PresetResolver::new(&store, &factory);
    assert_eq!(resolver.effective_default_blocking("lorenz").unwrap().id, mine.id);

    let values = pollster::block_on(resolver.effective_values(&builtin_pattern("lorenz").unwrap()));
    assert_eq!(values["rho"], ParamValue::Number(35.0));

    // Clearing the mark hands control back to the factory
    store.clear_user_default("lorenz").unwrap();
    let resolver = PresetResolver::new(&store, &factory);
    assert!(resolver.effective_default_blocking("lorenz").unwrap().is_factory);

    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}

#[test]
fn test_user_default_skips_factory_fetch() {
    let mut store = PresetStore::new(MemoryStorage::new());
    let mine = store.save_preset("Mine", "thomas", params(&[("b", ParamValue::Number(0.2))])).unwrap();
    store.set_user_default(&mine.id).unwrap();

    let factory = FactoryPresets::new(CountingSource::default());
    let resolver = PresetResolver::new(&store, &factory);
    let resolved = pollster::block_on(resolver.resolve("thomas"));
    assert_eq!(resolved.source(), "user");
    assert_eq!(factory_fetches(&factory), 0);
    assert!(!factory.is_cached());

    // Without a user default the factory is consulted exactly once
    let resolved = pollster::block_on(resolver.resolve("lorenz"));
    assert_eq!(resolved.source(), "factory");
    pollster::block_on(resolver.resolve("aizawa"));
    assert_eq!(factory_fetches(&factory), 1);
}

fn factory_fetches(factory: &FactoryPresets<CountingSource>) -> usize {
    factory.source().fetches.load(Ordering::SeqCst)
}

#[test]
fn test_missing_factory_file_falls_back_to_pattern_defaults() {
    let store = PresetStore::new(MemoryStorage::new());
    let factory = FactoryPresets::new(FileFactoryPresets::new("/nonexistent/patternkit/factory.json"));
    let resolver = PresetResolver::new(&store, &factory);

    let pattern = builtin_pattern("thomas").unwrap();
    assert_eq!(pollster::block_on(resolver.resolve("thomas")), EffectiveDefault::PatternDefaults);
    assert_eq!(pollster::block_on(resolver.effective_values(&pattern)), pattern.default_values());
}

#[test]
fn test_factory_file_source() {
    let path = temp_store_path("factory-file");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(
        &path,
        r#"{"aizawa": [{"name": "Wide", "isDefault": true, "parameters": {"a": 0.8}}]}"#,
    )
    .unwrap();

    let store = PresetStore::new(MemoryStorage::new());
    let factory = FactoryPresets::new(FileFactoryPresets::new(&path));
    let resolver = PresetResolver::new(&store, &factory);
    let values = pollster::block_on(resolver.effective_values(&builtin_pattern("aizawa").unwrap()));
    assert_eq!(values["a"], ParamValue::Number(0.8));
    assert_eq!(values["b"], ParamValue::Number(0.7));

    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}

#[test]
fn test_stale_factory_copies_are_purged_and_ignored() {
    let mut store = PresetStore::new(MemoryStorage::new());
    let mut stale = PatternPreset::new("Copied", "thomas", ParamMap::new());
    stale.is_factory = true;
    let kept = PatternPreset::new("Kept", "thomas", ParamMap::new());
    assert!(store.save_user_presets(&[stale, kept]));

    assert_eq!(store.purge_factory_copies().unwrap(), 1);
    let names: Vec<String> = store.presets_for("thomas").into_iter().map(|p| p.name).collect();
    assert_eq!(names, vec!["Kept".to_string()]);
}

// ============================================================================
// Modification detection
// ============================================================================

#[test]
fn test_fresh_values_are_unmodified() {
    let store = PresetStore::new(MemoryStorage::new());
    let factory = bundled();
    let resolver = PresetResolver::new(&store, &factory);
    let pattern = builtin_pattern("halvorsen").unwrap();

    let preset = resolver.effective_default_blocking("halvorsen").unwrap();
    let mut current = pollster::block_on(resolver.effective_values(&pattern));
    assert!(!is_modified(&current, &preset));

    let a = current["a"].as_f64().unwrap();
    current.insert("a".into(), ParamValue::Number(a + 1e-12));
    assert!(!is_modified(&current, &preset));

    current.insert("a".into(), ParamValue::Number(a + 0.01));
    assert!(is_modified(&current, &preset));
}
