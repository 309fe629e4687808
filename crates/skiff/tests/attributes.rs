//! Tests for attribute resolution through instances, classes and the MRO.

use pretty_assertions::assert_eq;
use skiff::{Context, ExcType, Object};

fn class_with_attr(ctx: &mut Context, name: &str, bases: &[Object], attr: &str, value: i64) -> Object {
    let class = ctx.new_class(name, bases).unwrap();
    let value = ctx.create_int(value).unwrap();
    ctx.set_attribute(class, attr, value).unwrap();
    class
}

// =============================================================================
// 1. Single inheritance
// =============================================================================

/// `Derived` overrides `x`; the from-base lookup sees `Base`'s value.
#[test]
fn derived_override_and_from_base() {
    let mut ctx = Context::default();
    let base = class_with_attr(&mut ctx, "Base", &[], "x", 1);
    let derived = class_with_attr(&mut ctx, "Derived", &[base], "x", 2);
    let obj = ctx.call(derived, &[], None).unwrap();

    let x = ctx.get_attribute(obj, "x").unwrap();
    assert_eq!(ctx.get_int(x), 2);
    let x = ctx.get_attribute_from_base(obj, "x", None).unwrap();
    assert_eq!(ctx.get_int(x), 1);
    let x = ctx.get_attribute_from_base(obj, "x", Some(base)).unwrap();
    assert_eq!(ctx.get_int(x), 1);
}

/// Instance attributes shadow class attributes, but from-base lookups ignore them.
#[test]
fn instance_attribute_shadows_class() {
    let mut ctx = Context::default();
    let base = class_with_attr(&mut ctx, "Base", &[], "x", 1);
    let derived = ctx.new_class("Derived", &[base]).unwrap();
    let obj = ctx.call(derived, &[], None).unwrap();
    let own = ctx.create_int(3).unwrap();
    ctx.set_attribute(obj, "x", own).unwrap();

    let x = ctx.get_attribute(obj, "x").unwrap();
    assert_eq!(ctx.get_int(x), 3);
    let x = ctx.get_attribute_from_base(obj, "x", None).unwrap();
    assert_eq!(ctx.get_int(x), 1);
}

/// Attributes are inherited from bases when not overridden.
#[test]
fn inherited_attribute() {
    let mut ctx = Context::default();
    let base = class_with_attr(&mut ctx, "Base", &[], "greeting", 7);
    let derived = ctx.new_class("Derived", &[base]).unwrap();
    let obj = ctx.call(derived, &[], None).unwrap();
    let value = ctx.get_attribute(obj, "greeting").unwrap();
    assert_eq!(ctx.get_int(value), 7);
    let value = ctx.get_attribute(derived, "greeting").unwrap();
    assert_eq!(ctx.get_int(value), 7);
}

// =============================================================================
// 2. Missing attributes
// =============================================================================

/// The raising and non-raising lookups agree apart from the raise.
#[test]
fn missing_attribute_variants() {
    let mut ctx = Context::default();
    let class = ctx.new_class("Thing", &[]).unwrap();
    let obj = ctx.call(class, &[], None).unwrap();

    assert!(ctx.get_attribute_no_except(obj, "nope").is_none());
    assert!(ctx.exception().is_none());
    assert!(!ctx.has_attribute(obj, "nope"));

    assert!(ctx.get_attribute(obj, "nope").is_err());
    assert!(ctx.error_message().ends_with("AttributeError: 'Thing' object has no attribute 'nope'\n"));
    ctx.clear_exception();

    let value = ctx.create_int(1).unwrap();
    ctx.set_attribute(obj, "nope", value).unwrap();
    assert!(ctx.has_attribute(obj, "nope"));
    let found = ctx.get_attribute_no_except(obj, "nope").unwrap();
    assert_eq!(ctx.get_int(found), 1);
}

/// Intrinsic values have no attribute table.
#[test]
fn set_attribute_on_intrinsic_fails() {
    let mut ctx = Context::default();
    let target = ctx.create_string("text").unwrap();
    let value = ctx.create_int(1).unwrap();
    assert!(ctx.set_attribute(target, "size", value).is_err());
    assert!(ctx.exception_matches(ExcType::AttributeError));
}

/// From-base lookup with nothing above the class raises.
#[test]
fn from_base_missing_raises() {
    let mut ctx = Context::default();
    let class = class_with_attr(&mut ctx, "Only", &[], "x", 1);
    let obj = ctx.call(class, &[], None).unwrap();
    assert!(ctx.get_attribute_from_base(obj, "x", None).is_err());
    assert!(ctx.exception_matches(ExcType::AttributeError));
}

// =============================================================================
// 3. Multiple inheritance
// =============================================================================

/// Diamond inheritance walks each base depth-first before the next one.
#[test]
fn diamond_is_depth_first() {
    let mut ctx = Context::default();
    let a = class_with_attr(&mut ctx, "A", &[], "who", 1);
    let b = ctx.new_class("B", &[a]).unwrap();
    let c = class_with_attr(&mut ctx, "C", &[a], "who", 3);
    let d = ctx.new_class("D", &[b, c]).unwrap();
    let obj = ctx.call(d, &[], None).unwrap();

    let who = ctx.get_attribute(obj, "who").unwrap();
    assert_eq!(ctx.get_int(who), 1, "A is reached through B before C is visited");

    let only_c = class_with_attr(&mut ctx, "OnlyC", &[c], "other", 5);
    let e = ctx.new_class("E", &[b, only_c]).unwrap();
    let obj = ctx.call(e, &[], None).unwrap();
    let other = ctx.get_attribute(obj, "other").unwrap();
    assert_eq!(ctx.get_int(other), 5, "later bases are still searched");

    let who = ctx.get_attribute_from_base(obj, "who", Some(only_c)).unwrap();
    assert_eq!(ctx.get_int(who), 3, "OnlyC's order is OnlyC, C, A, object");
}

/// From-base lookup skips only the class's own layer and then walks its bases.
#[test]
fn from_base_walks_bases_in_order() {
    let mut ctx = Context::default();
    let left = class_with_attr(&mut ctx, "Left", &[], "side", 1);
    let right = class_with_attr(&mut ctx, "Right", &[], "side", 2);
    let both = class_with_attr(&mut ctx, "Both", &[left, right], "side", 3);
    let obj = ctx.call(both, &[], None).unwrap();

    let side = ctx.get_attribute(obj, "side").unwrap();
    assert_eq!(ctx.get_int(side), 3);
    let side = ctx.get_attribute_from_base(obj, "side", None).unwrap();
    assert_eq!(ctx.get_int(side), 1);
}

/// A base listed before its own subclass is accepted.
#[test]
fn base_before_subclass_accepted() {
    let mut ctx = Context::default();
    let a = class_with_attr(&mut ctx, "A", &[], "x", 1);
    let b = class_with_attr(&mut ctx, "B", &[a], "x", 2);
    let c = ctx.new_class("C", &[a, b]).unwrap();
    let obj = ctx.call(c, &[], None).unwrap();
    let x = ctx.get_attribute(obj, "x").unwrap();
    assert_eq!(ctx.get_int(x), 1, "A comes first in the bases");
    assert_eq!(ctx.is_instance(obj, &[b]), Some(b));
}

/// Bases that are not classes are rejected.
#[test]
fn non_class_base_rejected() {
    let mut ctx = Context::default();
    let not_a_class = ctx.create_int(1).unwrap();
    assert!(ctx.new_class("C", &[not_a_class]).is_err());
    assert!(ctx.exception_matches(ExcType::TypeError));
    assert!(ctx.error_message().ends_with("TypeError: bases must be classes\n"));
}

/// `is_instance` reports the first matching class.
#[test]
fn is_instance_first_match() {
    let mut ctx = Context::default();
    let base = ctx.new_class("Base", &[]).unwrap();
    let derived = ctx.new_class("Derived", &[base]).unwrap();
    let other = ctx.new_class("Other", &[]).unwrap();
    let obj = ctx.call(derived, &[], None).unwrap();

    assert_eq!(ctx.is_instance(obj, &[other, base, derived]), Some(base));
    assert_eq!(ctx.is_instance(obj, &[other]), None);

    let value = ctx.create_bool(true);
    let int = ctx.get_global("int").unwrap();
    assert_eq!(ctx.is_instance(value, &[int]), Some(int), "bool derives from int");
}

/// Module attributes are readable like any other attribute table.
#[test]
fn module_attributes() {
    let mut ctx = Context::default();
    let main = ctx.main_module();
    let value = ctx.create_int(9).unwrap();
    ctx.set_global("answer", value);
    let found = ctx.get_attribute(main, "answer").unwrap();
    assert_eq!(ctx.get_int(found), 9);
    assert_eq!(ctx.class_name(main), "module");
}
