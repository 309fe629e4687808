//! Tests for configuration defaults, JSON loading and derived resource limits.

use pretty_assertions::assert_eq;
use skiff::{
    CollectStringPrint, Config, Context, DEFAULT_GC_RUN_FACTOR, DEFAULT_MAX_ALLOCATIONS, DEFAULT_MAX_RECURSION_DEPTH,
};

/// Defaults match the documented resource constants.
#[test]
fn defaults() {
    let config = Config::default();
    assert!(!config.enable_os_access);
    assert_eq!(config.max_alloc, DEFAULT_MAX_ALLOCATIONS as i64);
    assert_eq!(config.max_recursion, DEFAULT_MAX_RECURSION_DEPTH);
    assert_eq!(config.gc_run_factor, DEFAULT_GC_RUN_FACTOR);
    assert!(config.import_path.is_empty());
    assert!(config.argv.is_empty());
}

/// Fields missing from the JSON keep their defaults.
#[test]
fn partial_json() {
    let config = Config::from_json(r#"{"max_recursion": 12, "argv": ["a", "b"]}"#).unwrap();
    assert_eq!(config.max_recursion, 12);
    assert_eq!(config.argv, vec!["a".to_owned(), "b".to_owned()]);
    assert_eq!(config.max_alloc, DEFAULT_MAX_ALLOCATIONS as i64);

    let config = Config::from_json("{}").unwrap();
    assert_eq!(config.max_recursion, DEFAULT_MAX_RECURSION_DEPTH);
}

/// Malformed or mistyped JSON is rejected rather than defaulted.
#[test]
fn malformed_json() {
    assert!(Config::from_json("{").is_err());
    assert!(Config::from_json(r#"{"max_recursion": "deep"}"#).is_err());
}

/// A non-positive allocation ceiling means unlimited.
#[test]
fn resource_limits_from_config() {
    let limits = Config::default().max_alloc(50).max_recursion(7).resource_limits();
    assert_eq!(limits.max_allocations, Some(50));
    assert_eq!(limits.max_recursion_depth, Some(7));

    assert_eq!(Config::default().max_alloc(0).resource_limits().max_allocations, None);
    assert_eq!(Config::default().max_alloc(-3).resource_limits().max_allocations, None);
}

/// The print sink receives script output through `print` and the host helpers.
#[test]
fn print_sink() {
    let sink = CollectStringPrint::new();
    let mut ctx = Context::new(Config::default().print(sink.clone()));
    ctx.print_string("host ");
    ctx.print(b"bytes\n");
    assert_eq!(sink.output(), "host bytes\n");

    let print = ctx.get_global("print").unwrap();
    let value = ctx.create_int(3).unwrap();
    ctx.call(print, &[value], None).unwrap();
    assert_eq!(sink.output(), "host bytes\n3\n");
}

/// JSON-loaded settings drive a context.
#[test]
fn json_config_builds_context() {
    let config = Config::from_json(r#"{"max_alloc": 2}"#).unwrap();
    let mut ctx = Context::new(config);
    ctx.create_int(1).unwrap();
    ctx.create_int(2).unwrap();
    assert!(ctx.create_int(3).is_err());
}
