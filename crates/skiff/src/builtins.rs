//! Builtin classes, exception hierarchy and builtin functions.
//!
//! Everything here is allocated while the context boots, before the allocation
//! tracker is armed, and stays rooted for the lifetime of the context.

use std::rc::Rc;

use strum::IntoEnumIterator;

use crate::{
    context::Context,
    exception::{ExcType, RunResult},
    heap::{Heap, HeapData, HeapId},
    object::{Object, ObjectKind},
    ops::UnaryOp,
    resource::ResourceTracker,
    types::{ClassObject, Function, FunctionKind, Instance, Module, NativeFn, compute_mro},
};

/// Ids of every object created at bootstrap.
#[derive(Debug)]
pub(crate) struct Builtins {
    pub none: HeapId,
    pub true_: HeapId,
    pub false_: HeapId,
    pub object: HeapId,
    pub type_: HeapId,
    pub none_type: HeapId,
    pub bool_: HeapId,
    pub int: HeapId,
    pub float: HeapId,
    pub str: HeapId,
    pub tuple: HeapId,
    pub list: HeapId,
    pub dict: HeapId,
    pub set: HeapId,
    pub function: HeapId,
    pub module: HeapId,
    /// Exception classes indexed by `ExcType as usize`.
    exceptions: Vec<HeapId>,
    /// Raised when the allocation ceiling is hit, so raising needs no allocation.
    pub memory_error: HeapId,
    /// The `builtins` namespace consulted after the active module.
    pub namespace: HeapId,
}

fn boot(heap: &mut Heap<impl ResourceTracker>, data: HeapData) -> HeapId {
    heap.allocate(data).expect("bootstrap allocations are never limited")
}

fn boot_class(heap: &mut Heap<impl ResourceTracker>, class: ClassObject, object: HeapId) -> HeapId {
    let bases = class.bases().to_vec();
    let id = boot(heap, HeapData::Class(class));
    let mro = compute_mro(id, &bases, heap, object).expect("builtin bases are classes");
    if let HeapData::Class(cls) = heap.get_mut(id) {
        cls.set_mro(mro);
    }
    id
}

fn boot_native(heap: &mut Heap<impl ResourceTracker>, name: &str, native: Rc<NativeFn>, method: bool) -> HeapId {
    let mut function = Function::new(name, FunctionKind::Native(native), None);
    if method {
        function = function.into_method();
    }
    boot(heap, HeapData::Function(function))
}

fn set_class_attr(heap: &mut Heap<impl ResourceTracker>, class: HeapId, name: &str, value: HeapId) {
    if let HeapData::Class(cls) = heap.get_mut(class) {
        cls.set_attr(name, value);
    }
}

impl Builtins {
    pub fn bootstrap(heap: &mut Heap<impl ResourceTracker>) -> Self {
        let none = boot(heap, HeapData::None);
        let true_ = boot(heap, HeapData::Bool(true));
        let false_ = boot(heap, HeapData::Bool(false));

        let object = boot(heap, HeapData::Class(ClassObject::new("object", Vec::new())));
        if let HeapData::Class(cls) = heap.get_mut(object) {
            cls.set_mro(vec![object]);
        }
        let class = |heap: &mut Heap<_>, name: &str, base: HeapId| {
            boot_class(heap, ClassObject::new(name, vec![base]), object)
        };
        let type_ = class(heap, "type", object);
        let none_type = class(heap, "NoneType", object);
        let int = class(heap, "int", object);
        let bool_ = class(heap, "bool", int);
        let float = class(heap, "float", object);
        let str = class(heap, "str", object);
        let tuple = class(heap, "tuple", object);
        let list = class(heap, "list", object);
        let dict = class(heap, "dict", object);
        let set = class(heap, "set", object);
        let function = class(heap, "function", object);
        let module = class(heap, "module", object);

        let mut exceptions: Vec<HeapId> = Vec::new();
        for kind in ExcType::iter() {
            let base = kind.parent().map_or(object, |parent| exceptions[parent as usize]);
            let name: &'static str = kind.into();
            let id = boot_class(heap, ClassObject::new(name, vec![base]).with_exc_kind(kind), object);
            exceptions.push(id);
        }
        let append = boot_native(heap, "append", Rc::new(list_append), true);
        set_class_attr(heap, list, "append", append);

        let range = class(heap, "range", object);
        let range_methods: [(&str, Rc<NativeFn>); 3] = [
            ("__init__", Rc::new(range_init)),
            ("__iter__", Rc::new(range_iter)),
            ("__next__", Rc::new(range_next)),
        ];
        for (name, native) in range_methods {
            let method = boot_native(heap, name, native, true);
            set_class_attr(heap, range, name, method);
        }

        let base_exception = exceptions[ExcType::BaseException as usize];
        let init = boot_native(heap, "__init__", Rc::new(base_exception_init), true);
        set_class_attr(heap, base_exception, "__init__", init);
        let str_method = boot_native(heap, "__str__", Rc::new(base_exception_str), true);
        set_class_attr(heap, base_exception, "__str__", str_method);

        let memory_error = boot(
            heap,
            HeapData::Instance(Instance::new(exceptions[ExcType::MemoryError as usize])),
        );

        let mut namespace = Module::new("builtins");
        for (name, id) in [
            ("object", object),
            ("type", type_),
            ("bool", bool_),
            ("int", int),
            ("float", float),
            ("str", str),
            ("tuple", tuple),
            ("list", list),
            ("dict", dict),
            ("set", set),
            ("range", range),
        ] {
            namespace.set_attr(name, id);
        }
        for (kind, &id) in ExcType::iter().zip(&exceptions) {
            let name: &'static str = kind.into();
            namespace.set_attr(name, id);
        }
        let natives: [(&str, Rc<NativeFn>); 5] = [
            ("print", Rc::new(builtin_print)),
            ("len", Rc::new(builtin_len)),
            ("repr", Rc::new(builtin_repr)),
            ("hash", Rc::new(builtin_hash)),
            ("isinstance", Rc::new(builtin_isinstance)),
        ];
        for (name, native) in natives {
            let id = boot_native(heap, name, native, false);
            namespace.set_attr(name, id);
        }
        let namespace = boot(heap, HeapData::Module(namespace));

        Self {
            none,
            true_,
            false_,
            object,
            type_,
            none_type,
            bool_,
            int,
            float,
            str,
            tuple,
            list,
            dict,
            set,
            function,
            module,
            exceptions,
            memory_error,
            namespace,
        }
    }

    pub fn exception_class(&self, kind: ExcType) -> HeapId {
        self.exceptions[kind as usize]
    }

    /// Returns whether `class_id` is one of the builtin exception classes.
    pub fn is_exception_kind_class(&self, class_id: HeapId) -> bool {
        self.exceptions.contains(&class_id)
    }

    /// `None`, `True` or `False`.
    pub fn is_singleton(&self, id: HeapId) -> bool {
        id == self.none || id == self.true_ || id == self.false_
    }

    pub fn bool_id(&self, value: bool) -> HeapId {
        if value { self.true_ } else { self.false_ }
    }

    /// Builtin class backing values of an intrinsic kind.
    ///
    /// Instances are resolved through their own class; `Instance` maps to `object`.
    pub fn class_for_kind(&self, kind: ObjectKind) -> HeapId {
        match kind {
            ObjectKind::None => self.none_type,
            ObjectKind::Bool => self.bool_,
            ObjectKind::Int => self.int,
            ObjectKind::Float => self.float,
            ObjectKind::Str => self.str,
            ObjectKind::Tuple => self.tuple,
            ObjectKind::List => self.list,
            ObjectKind::Dict => self.dict,
            ObjectKind::Set => self.set,
            ObjectKind::Function => self.function,
            ObjectKind::Class => self.type_,
            ObjectKind::Instance => self.object,
            ObjectKind::Module => self.module,
        }
    }

    /// Everything the collector must treat as a root.
    pub fn roots(&self) -> Vec<HeapId> {
        let mut roots = vec![
            self.none,
            self.true_,
            self.false_,
            self.object,
            self.type_,
            self.none_type,
            self.bool_,
            self.int,
            self.float,
            self.str,
            self.tuple,
            self.list,
            self.dict,
            self.set,
            self.function,
            self.module,
            self.memory_error,
            self.namespace,
        ];
        roots.extend_from_slice(&self.exceptions);
        roots
    }
}

// ============================================================================
// Native implementations
// ============================================================================

/// `BaseException.__init__(self, message=None)`: stores `str(message)` as `_message`.
fn base_exception_init(ctx: &mut Context, args: &[Object]) -> RunResult<Object> {
    let Some((&this, rest)) = args.split_first() else {
        return Err(ctx.raise_argument_count_error(0, Some(1)));
    };
    if let Some(&message) = rest.first() {
        let text = ctx.unary_op(UnaryOp::Str, message)?;
        ctx.set_attribute(this, "_message", text)?;
    }
    Ok(ctx.none())
}

fn base_exception_str(ctx: &mut Context, args: &[Object]) -> RunResult<Object> {
    ctx.check_arg_count(args, 1)?;
    match ctx.get_attribute_no_except(args[0], "_message") {
        Some(message) if ctx.is_string(message) => Ok(message),
        _ => ctx.create_string(""),
    }
}

/// `list.append(self, value)`
fn list_append(ctx: &mut Context, args: &[Object]) -> RunResult<Object> {
    let (this, value) = ctx.get_two_args(args)?;
    if !ctx.is_list(this) {
        return Err(ctx.raise_argument_type_error(0, "list"));
    }
    let (list, value) = (ctx.id(this), ctx.id(value));
    if let HeapData::List(items) = ctx.heap.get_mut(list) {
        items.push(value);
    }
    Ok(ctx.none())
}

/// `range(stop)`, `range(start, stop)` or `range(start, stop, step)`.
///
/// A range is its own iterator: `_cur`, `_end` and `_step` hold the state, and
/// iterating it a second time continues where the first pass stopped.
fn range_init(ctx: &mut Context, args: &[Object]) -> RunResult<Object> {
    let Some((&this, bounds)) = args.split_first() else {
        return Err(ctx.raise_argument_count_error(0, Some(1)));
    };
    ctx.check_arg_range(bounds, 1, 3)?;
    let (start, end, step) = match bounds.len() {
        1 => (0, ctx.arg_int(bounds, 0)?, 1),
        2 => (ctx.arg_int(bounds, 0)?, ctx.arg_int(bounds, 1)?, 1),
        _ => (ctx.arg_int(bounds, 0)?, ctx.arg_int(bounds, 1)?, ctx.arg_int(bounds, 2)?),
    };
    if step == 0 {
        return Err(ctx.raise_exception(ExcType::ValueError, Some("range() arg 3 must not be zero")));
    }
    for (name, value) in [("_cur", start), ("_end", end), ("_step", step)] {
        let value = ctx.create_int(value)?;
        ctx.set_attribute(this, name, value)?;
    }
    Ok(ctx.none())
}

fn range_iter(ctx: &mut Context, args: &[Object]) -> RunResult<Object> {
    ctx.get_one_arg(args)
}

fn range_next(ctx: &mut Context, args: &[Object]) -> RunResult<Object> {
    let this = ctx.get_one_arg(args)?;
    let mut state = [0; 3];
    for (slot, name) in state.iter_mut().zip(["_cur", "_end", "_step"]) {
        let value = ctx.get_attribute(this, name)?;
        if !ctx.is_int(value) {
            return Err(ctx.raise_exception(ExcType::TypeError, Some("range state must be int")));
        }
        *slot = ctx.get_int(value);
    }
    let [cur, end, step] = state;
    let exhausted = if step > 0 { cur >= end } else { cur <= end };
    if exhausted {
        return Err(ctx.raise_exception(ExcType::StopIteration, None));
    }
    let value = ctx.create_int(cur)?;
    let next = ctx.create_int(cur.saturating_add(step))?;
    ctx.set_attribute(this, "_cur", next)?;
    Ok(value)
}

/// `print(*values, sep=' ', end='\n')`
fn builtin_print(ctx: &mut Context, args: &[Object]) -> RunResult<Object> {
    let [sep, end] = ctx.parse_kwargs(ctx.kwargs(), ["sep", "end"]);
    let sep = match sep {
        Some(sep) if !ctx.is_none(sep) => ctx.text_bytes(sep)?,
        _ => b" ".to_vec(),
    };
    let end = match end {
        Some(end) if !ctx.is_none(end) => ctx.text_bytes(end)?,
        _ => b"\n".to_vec(),
    };
    let mut out = Vec::new();
    for (index, &arg) in args.iter().enumerate() {
        if index > 0 {
            out.extend_from_slice(&sep);
        }
        out.extend_from_slice(&ctx.text_bytes(arg)?);
    }
    out.extend_from_slice(&end);
    ctx.print(&out);
    Ok(ctx.none())
}

fn builtin_len(ctx: &mut Context, args: &[Object]) -> RunResult<Object> {
    ctx.check_arg_count(args, 1)?;
    ctx.unary_op(UnaryOp::Len, args[0])
}

fn builtin_repr(ctx: &mut Context, args: &[Object]) -> RunResult<Object> {
    ctx.check_arg_count(args, 1)?;
    ctx.unary_op(UnaryOp::Repr, args[0])
}

fn builtin_hash(ctx: &mut Context, args: &[Object]) -> RunResult<Object> {
    ctx.check_arg_count(args, 1)?;
    ctx.unary_op(UnaryOp::Hash, args[0])
}

/// `isinstance(obj, class_or_tuple)`
fn builtin_isinstance(ctx: &mut Context, args: &[Object]) -> RunResult<Object> {
    ctx.check_arg_count(args, 2)?;
    let classes = if ctx.is_tuple(args[1]) {
        ctx.get_items(args[1])
    } else {
        vec![args[1]]
    };
    for &class in &classes {
        if !ctx.is_class(class) {
            return Err(ctx.raise_argument_type_error(1, "class or tuple of classes"));
        }
    }
    let matched = ctx.is_instance(args[0], &classes).is_some();
    Ok(ctx.create_bool(matched))
}
