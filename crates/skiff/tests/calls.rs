//! Tests for the call protocol: native functions, keyword arguments, methods,
//! class instantiation and iteration.

use std::{cell::Cell, rc::Rc};

use pretty_assertions::assert_eq;
use skiff::{Context, ExcType, Object, ObjectKind, RunResult};

fn ints(ctx: &mut Context, values: &[i64]) -> Vec<Object> {
    values.iter().map(|&v| ctx.create_int(v).unwrap()).collect()
}

fn int_values(ctx: &Context, objects: &[Object]) -> Vec<i64> {
    objects.iter().map(|&obj| ctx.get_int(obj)).collect()
}

// =============================================================================
// 1. Native functions
// =============================================================================

/// Positional arguments arrive in order and the result is returned to the host.
#[test]
fn native_function_receives_arguments() {
    let mut ctx = Context::default();
    let sub = ctx
        .new_function(
            "sub",
            |ctx, args| {
                ctx.check_arg_count(args, 2)?;
                let (a, b) = (ctx.get_int(args[0]), ctx.get_int(args[1]));
                ctx.create_int(a - b)
            },
            None,
        )
        .unwrap();
    let args = ints(&mut ctx, &[10, 3]);
    let result = ctx.call(sub, &args, None).unwrap();
    assert_eq!(ctx.get_int(result), 7);
    assert_eq!(ctx.depth(), 0);
}

/// Keyword arguments are read by name; absent names come back as `None`.
#[test]
fn keyword_arguments_by_name() {
    let mut ctx = Context::default();
    let pick = ctx
        .new_function(
            "pick",
            |ctx, _args| {
                let [a, b] = ctx.parse_kwargs(ctx.kwargs(), ["a", "b"]);
                let a = a.map_or(-1, |a| ctx.get_int(a));
                let b = b.map_or(-1, |b| ctx.get_int(b));
                ctx.create_int(a * 100 + b)
            },
            None,
        )
        .unwrap();

    let key = ctx.create_string("a").unwrap();
    let value = ctx.create_int(4).unwrap();
    let kwargs = ctx.create_dict(&[(key, value)]).unwrap();
    let result = ctx.call(pick, &[], Some(kwargs)).unwrap();
    assert_eq!(ctx.get_int(result), 399);

    let result = ctx.call(pick, &[], None).unwrap();
    assert_eq!(ctx.get_int(result), -101);

    let empty = ctx.create_dict(&[]).unwrap();
    let result = ctx.call(pick, &[], Some(empty)).unwrap();
    assert_eq!(ctx.get_int(result), -101);
}

/// Non-string keys are ignored by the keyword lookup rather than raising.
#[test]
fn keyword_lookup_ignores_non_string_keys() {
    let mut ctx = Context::default();
    let count = ctx
        .new_function(
            "count",
            |ctx, _args| {
                let found = ctx.parse_kwargs(ctx.kwargs(), ["x"]);
                let matched = found.iter().filter(|slot| slot.is_some()).count();
                ctx.create_int(matched as i64)
            },
            None,
        )
        .unwrap();
    let key = ctx.create_int(1).unwrap();
    let value = ctx.create_int(2).unwrap();
    let kwargs = ctx.create_dict(&[(key, value)]).unwrap();
    let result = ctx.call(count, &[], Some(kwargs)).unwrap();
    assert_eq!(ctx.get_int(result), 0);
    assert!(ctx.exception().is_none());
}

/// Keyword arguments must be a dict.
#[test]
fn keyword_arguments_must_be_dict() {
    let mut ctx = Context::default();
    let noop = ctx.new_function("noop", |ctx, _args| Ok(ctx.none()), None).unwrap();
    let list = ctx.create_list(&[]).unwrap();
    assert!(ctx.call(noop, &[], Some(list)).is_err());
    assert!(ctx.error_message().ends_with("TypeError: keyword arguments must be a dict\n"));
}

/// Function userdata is visible to the function while it runs.
#[test]
fn function_userdata_visible_inside_call() {
    let mut ctx = Context::default();
    let scale = ctx
        .new_function(
            "scale",
            |ctx, args| {
                let factor = ctx.function_userdata_as::<i64>().map_or(1, |factor| *factor);
                let value = ctx.arg_int(args, 0)?;
                ctx.create_int(value * factor)
            },
            Some(Rc::new(3_i64)),
        )
        .unwrap();
    let arg = ctx.create_int(5).unwrap();
    let result = ctx.call(scale, &[arg], None).unwrap();
    assert_eq!(ctx.get_int(result), 15);
}

/// Calling a value that is neither a function, a class nor defines `__call__`
/// raises `TypeError`.
#[test]
fn calling_non_callable() {
    let mut ctx = Context::default();
    let value = ctx.create_int(1).unwrap();
    assert!(ctx.call(value, &[], None).is_err());
    assert!(ctx.error_message().ends_with("TypeError: 'int' object is not callable\n"));
}

/// Instances whose class defines `__call__` are callable.
#[test]
fn dunder_call_makes_instances_callable() {
    let mut ctx = Context::default();
    let class = ctx.new_class("Adder", &[]).unwrap();
    ctx.bind_method(
        class,
        "__call__",
        |ctx, args| {
            let offset = ctx.get_attribute(args[0], "offset")?;
            let (a, b) = (ctx.get_int(offset), ctx.arg_int(args, 1)?);
            ctx.create_int(a + b)
        },
        None,
    )
    .unwrap();
    let adder = ctx.call(class, &[], None).unwrap();
    let offset = ctx.create_int(10).unwrap();
    ctx.set_attribute(adder, "offset", offset).unwrap();
    let arg = ctx.create_int(5).unwrap();
    let result = ctx.call(adder, &[arg], None).unwrap();
    assert_eq!(ctx.get_int(result), 15);
}

// =============================================================================
// 2. Methods
// =============================================================================

fn counter_class(ctx: &mut Context) -> Object {
    let class = ctx.new_class("Counter", &[]).unwrap();
    ctx.bind_method(
        class,
        "__init__",
        |ctx, args| {
            ctx.check_arg_range(args, 1, 2)?;
            let start = match args.get(1) {
                Some(&start) => start,
                None => ctx.create_int(0)?,
            };
            ctx.set_attribute(args[0], "value", start)?;
            Ok(ctx.none())
        },
        None,
    )
    .unwrap();
    ctx.bind_method(
        class,
        "bump",
        |ctx, args| {
            let this = args[0];
            let step = if args.len() > 1 { ctx.arg_int(args, 1)? } else { 1 };
            let value = ctx.get_attribute(this, "value")?;
            let value = ctx.create_int(ctx.get_int(value) + step)?;
            ctx.set_attribute(this, "value", value)?;
            Ok(value)
        },
        None,
    )
    .unwrap();
    class
}

/// `__init__` receives the constructor arguments after the new instance.
#[test]
fn instantiation_runs_init() {
    let mut ctx = Context::default();
    let class = counter_class(&mut ctx);
    let start = ctx.create_int(5).unwrap();
    let counter = ctx.call(class, &[start], None).unwrap();
    assert_eq!(ctx.kind(counter), ObjectKind::Instance);
    assert_eq!(ctx.class_name(counter), "Counter");
    let value = ctx.get_attribute(counter, "value").unwrap();
    assert_eq!(ctx.get_int(value), 5);
}

/// `call_method` passes the receiver implicitly.
#[test]
fn call_method_binds_receiver() {
    let mut ctx = Context::default();
    let class = counter_class(&mut ctx);
    let counter = ctx.call(class, &[], None).unwrap();
    ctx.call_method(counter, "bump", &[], None).unwrap();
    let step = ctx.create_int(10).unwrap();
    let result = ctx.call_method(counter, "bump", &[step], None).unwrap();
    assert_eq!(ctx.get_int(result), 11);

    assert!(ctx.call_method(counter, "missing", &[], None).is_err());
    assert!(ctx.error_message().ends_with("AttributeError: 'Counter' object has no attribute 'missing'\n"));
}

/// Fetching a method from an instance yields a bound method usable later.
#[test]
fn fetched_method_is_bound() {
    let mut ctx = Context::default();
    let class = counter_class(&mut ctx);
    let counter = ctx.call(class, &[], None).unwrap();
    let bump = ctx.get_attribute(counter, "bump").unwrap();
    assert!(ctx.is_function(bump));
    ctx.call(bump, &[], None).unwrap();
    let result = ctx.call(bump, &[], None).unwrap();
    assert_eq!(ctx.get_int(result), 2);

    let unbound = ctx.get_attribute(class, "bump").unwrap();
    let result = ctx.call(unbound, &[counter], None).unwrap();
    assert_eq!(ctx.get_int(result), 3);
}

/// `call_method_from_base` skips the override in the instance's class.
#[test]
fn call_method_from_base_skips_override() {
    let mut ctx = Context::default();
    let base = ctx.new_class("Base", &[]).unwrap();
    ctx.bind_method(base, "name", |ctx, _args| ctx.create_string("base"), None).unwrap();
    let derived = ctx.new_class("Derived", &[base]).unwrap();
    ctx.bind_method(derived, "name", |ctx, _args| ctx.create_string("derived"), None).unwrap();
    let obj = ctx.call(derived, &[], None).unwrap();

    let direct = ctx.call_method(obj, "name", &[], None).unwrap();
    assert_eq!(ctx.get_string(direct), "derived");
    let from_base = ctx.call_method_from_base(obj, "name", &[], None, None).unwrap();
    assert_eq!(ctx.get_string(from_base), "base");
    let scoped = ctx.call_method_from_base(obj, "name", &[], None, Some(base)).unwrap();
    assert_eq!(ctx.get_string(scoped), "base");
}

/// `__init__` returning anything but None raises `TypeError`.
#[test]
fn init_must_return_none() {
    let mut ctx = Context::default();
    let class = ctx.new_class("Bad", &[]).unwrap();
    ctx.bind_method(class, "__init__", |ctx, _args| ctx.create_int(1), None).unwrap();
    assert!(ctx.call(class, &[], None).is_err());
    assert!(ctx.error_message().ends_with("TypeError: __init__() should return None\n"));
}

/// A class without `__init__` takes no constructor arguments.
#[test]
fn class_without_init_rejects_arguments() {
    let mut ctx = Context::default();
    let class = ctx.new_class("Plain", &[]).unwrap();
    let arg = ctx.create_int(1).unwrap();
    assert!(ctx.call(class, &[arg], None).is_err());
    assert!(ctx.exception_matches(ExcType::TypeError));
}

/// Failures inside a method propagate to the host with the slot populated.
#[test]
fn method_failure_propagates() {
    let mut ctx = Context::default();
    let class = counter_class(&mut ctx);
    let counter = ctx.call(class, &[], None).unwrap();
    let text = ctx.create_string("x").unwrap();
    assert!(ctx.call_method(counter, "bump", &[text], None).is_err());
    assert!(ctx.error_message().ends_with("TypeError: Argument 2 Expected type int\n"));
    assert_eq!(ctx.depth(), 0);
}

// =============================================================================
// 3. Builtin classes
// =============================================================================

/// Calling the intrinsic classes converts their argument.
#[test]
fn builtin_class_conversions() {
    let mut ctx = Context::default();
    let int = ctx.get_global("int").unwrap();
    let text = ctx.create_string(" 42 ").unwrap();
    let value = ctx.call(int, &[text], None).unwrap();
    assert_eq!(ctx.get_int(value), 42);

    let float = ctx.get_global("float").unwrap();
    let value = ctx.call(float, &[value], None).unwrap();
    assert_eq!(ctx.get_float(value), 42.0);

    let str_class = ctx.get_global("str").unwrap();
    let text = ctx.call(str_class, &[value], None).unwrap();
    assert_eq!(ctx.get_string(text), "42.0");

    let list = ctx.get_global("list").unwrap();
    let items = ints(&mut ctx, &[3, 1, 3]);
    let tuple = ctx.create_tuple(&items).unwrap();
    let as_list = ctx.call(list, &[tuple], None).unwrap();
    assert!(ctx.is_list(as_list));
    assert_eq!(int_values(&ctx, &ctx.get_items(as_list)), vec![3, 1, 3]);

    let set = ctx.get_global("set").unwrap();
    let as_set = ctx.call(set, &[tuple], None).unwrap();
    assert_eq!(int_values(&ctx, &ctx.get_items(as_set)), vec![3, 1]);

    let bad = ctx.create_string("nope").unwrap();
    assert!(ctx.call(int, &[bad], None).is_err());
    assert!(ctx.exception_matches(ExcType::ValueError));
}

/// `dict(pairs)` unpacks two-element items.
#[test]
fn dict_from_pairs() {
    let mut ctx = Context::default();
    let dict = ctx.get_global("dict").unwrap();
    let (k, v) = (ctx.create_string("k").unwrap(), ctx.create_int(1).unwrap());
    let pair = ctx.create_tuple(&[k, v]).unwrap();
    let pairs = ctx.create_list(&[pair]).unwrap();
    let result = ctx.call(dict, &[pairs], None).unwrap();
    let items = ctx.get_dict_items(result);
    assert_eq!(items.len(), 1);
    assert_eq!(ctx.get_string(items[0].0), "k");
    assert_eq!(ctx.get_int(items[0].1), 1);

    let short = ctx.create_tuple(&[k]).unwrap();
    let pairs = ctx.create_list(&[short]).unwrap();
    assert!(ctx.call(dict, &[pairs], None).is_err());
    assert!(ctx.error_message().ends_with("ValueError: not enough values to unpack (expected 2, got 1)\n"));
}

/// `append` binds to a list and grows it in place.
#[test]
fn list_append_grows_in_place() {
    let mut ctx = Context::default();
    let list = ctx.create_list(&[]).unwrap();
    for value in ints(&mut ctx, &[4, 5]) {
        let result = ctx.call_method(list, "append", &[value], None).unwrap();
        assert!(ctx.is_none(result));
    }
    let append = ctx.get_attribute(list, "append").unwrap();
    let six = ctx.create_int(6).unwrap();
    ctx.call(append, &[six], None).unwrap();
    assert_eq!(int_values(&ctx, &ctx.get_items(list)), vec![4, 5, 6]);

    let list_class = ctx.get_global("list").unwrap();
    let unbound = ctx.get_attribute(list_class, "append").unwrap();
    let tuple = ctx.create_tuple(&[]).unwrap();
    assert!(ctx.call(unbound, &[tuple, six], None).is_err());
    assert!(ctx.error_message().ends_with("TypeError: Argument 1 Expected type list\n"));
    ctx.clear_exception();

    assert!(ctx.call_method(tuple, "append", &[six], None).is_err());
    assert!(ctx.exception_matches(ExcType::AttributeError));
}

/// `range` counts toward its end by its step, in either direction.
#[test]
fn range_iterates_by_step() {
    let mut ctx = Context::default();
    let range = ctx.get_global("range").unwrap();
    let collect = |ctx: &mut Context, bounds: &[i64]| {
        let bounds = ints(ctx, bounds);
        let r = ctx.call(range, &bounds, None).unwrap();
        let mut seen = Vec::new();
        ctx.iterate(r, |ctx, item| {
            seen.push(ctx.get_int(item));
            Ok(())
        })
        .unwrap();
        seen
    };
    assert_eq!(collect(&mut ctx, &[3]), vec![0, 1, 2]);
    assert_eq!(collect(&mut ctx, &[1, 4]), vec![1, 2, 3]);
    assert_eq!(collect(&mut ctx, &[5, 0, -2]), vec![5, 3, 1]);
    assert_eq!(collect(&mut ctx, &[3, 3]), Vec::<i64>::new());
    assert_eq!(collect(&mut ctx, &[0, 3, -1]), Vec::<i64>::new());
}

/// A range feeds the builtin constructors and is used up by one pass.
#[test]
fn range_is_single_pass() {
    let mut ctx = Context::default();
    let range = ctx.get_global("range").unwrap();
    let list = ctx.get_global("list").unwrap();
    let three = ctx.create_int(3).unwrap();
    let r = ctx.call(range, &[three], None).unwrap();
    let first = ctx.call(list, &[r], None).unwrap();
    assert_eq!(int_values(&ctx, &ctx.get_items(first)), vec![0, 1, 2]);
    let second = ctx.call(list, &[r], None).unwrap();
    assert!(ctx.get_items(second).is_empty());

    let r = ctx.call(range, &[three], None).unwrap();
    let values = ctx.unpack(r, 3).unwrap();
    assert_eq!(int_values(&ctx, &values), vec![0, 1, 2]);
}

/// A zero step or a missing bound is rejected.
#[test]
fn range_rejects_bad_arguments() {
    let mut ctx = Context::default();
    let range = ctx.get_global("range").unwrap();
    let bounds = ints(&mut ctx, &[1, 2, 0]);
    assert!(ctx.call(range, &bounds, None).is_err());
    assert!(ctx.error_message().ends_with("ValueError: range() arg 3 must not be zero\n"));
    ctx.clear_exception();

    assert!(ctx.call(range, &[], None).is_err());
    assert!(ctx.exception_matches(ExcType::TypeError));
}

/// The builtin `print` writes through the configured sink with `sep` and `end`.
#[test]
fn builtin_print_uses_sink() {
    let output = skiff::CollectStringPrint::new();
    let mut ctx = Context::new(skiff::Config::default().print(output.clone()));
    let print = ctx.get_global("print").unwrap();
    let args = ints(&mut ctx, &[1, 2]);
    ctx.call(print, &args, None).unwrap();

    let sep_key = ctx.create_string("sep").unwrap();
    let sep = ctx.create_string("-").unwrap();
    let kwargs = ctx.create_dict(&[(sep_key, sep)]).unwrap();
    ctx.call(print, &args, Some(kwargs)).unwrap();
    assert_eq!(output.output(), "1 2\n1-2\n");
}

// =============================================================================
// 4. Iteration
// =============================================================================

/// Iterating a list visits every element in order.
#[test]
fn iterate_list() {
    let mut ctx = Context::default();
    let items = ints(&mut ctx, &[1, 2, 3]);
    let list = ctx.create_list(&items).unwrap();
    let mut seen = Vec::new();
    ctx.iterate(list, |ctx, item| {
        seen.push(ctx.get_int(item));
        Ok(())
    })
    .unwrap();
    assert_eq!(seen, vec![1, 2, 3]);
}

/// Iterating a string yields one string per character.
#[test]
fn iterate_string_by_character() {
    let mut ctx = Context::default();
    let text = ctx.create_string("añb").unwrap();
    let mut seen = Vec::new();
    ctx.iterate(text, |ctx, item| {
        seen.push(ctx.get_string(item));
        Ok(())
    })
    .unwrap();
    assert_eq!(seen, vec!["a".to_owned(), "ñ".to_owned(), "b".to_owned()]);
}

/// An error from the callback stops the iteration and propagates.
#[test]
fn iterate_stops_on_callback_error() {
    let mut ctx = Context::default();
    let items = ints(&mut ctx, &[1, 2, 3]);
    let tuple = ctx.create_tuple(&items).unwrap();
    let visits = Cell::new(0);
    let result = ctx.iterate(tuple, |ctx, item| -> RunResult<()> {
        visits.set(visits.get() + 1);
        if ctx.get_int(item) == 2 {
            return Err(ctx.raise_exception(ExcType::ValueError, Some("stop")));
        }
        Ok(())
    });
    assert!(result.is_err());
    assert_eq!(visits.get(), 2);
    assert!(ctx.exception_matches(ExcType::ValueError));
}

/// Instances iterate through `__iter__` and `__next__`, ending at `StopIteration`.
#[test]
fn iterate_instance_protocol() {
    let mut ctx = Context::default();
    let class = ctx.new_class("Countdown", &[]).unwrap();
    ctx.bind_method(class, "__iter__", |_ctx, args| Ok(args[0]), None).unwrap();
    ctx.bind_method(
        class,
        "__next__",
        |ctx, args| {
            let remaining = ctx.get_attribute(args[0], "remaining")?;
            let remaining = ctx.get_int(remaining);
            if remaining == 0 {
                return Err(ctx.raise_exception(ExcType::StopIteration, None));
            }
            let next = ctx.create_int(remaining - 1)?;
            ctx.set_attribute(args[0], "remaining", next)?;
            ctx.create_int(remaining)
        },
        None,
    )
    .unwrap();
    let countdown = ctx.call(class, &[], None).unwrap();
    let start = ctx.create_int(3).unwrap();
    ctx.set_attribute(countdown, "remaining", start).unwrap();

    let values = ctx.unpack(countdown, 3).unwrap();
    assert_eq!(int_values(&ctx, &values), vec![3, 2, 1]);
    assert!(ctx.exception().is_none(), "StopIteration is consumed");
}

/// Unpacking checks the exact number of values.
#[test]
fn unpack_count_mismatch() {
    let mut ctx = Context::default();
    let items = ints(&mut ctx, &[1, 2, 3]);
    let list = ctx.create_list(&items).unwrap();

    let values = ctx.unpack(list, 3).unwrap();
    assert_eq!(int_values(&ctx, &values), vec![1, 2, 3]);

    assert!(ctx.unpack(list, 2).is_err());
    assert!(ctx.error_message().ends_with("ValueError: too many values to unpack (expected 2)\n"));
    ctx.clear_exception();

    assert!(ctx.unpack(list, 4).is_err());
    assert!(ctx.error_message().ends_with("ValueError: not enough values to unpack (expected 4, got 3)\n"));
}

/// Scalars are not iterable.
#[test]
fn iterate_non_iterable() {
    let mut ctx = Context::default();
    let value = ctx.create_float(1.5).unwrap();
    assert!(ctx.iterate(value, |_, _| Ok(())).is_err());
    assert!(ctx.error_message().ends_with("TypeError: 'float' object is not iterable\n"));
}
