use std::{any::Any, rc::Rc};

use smallvec::SmallVec;

use crate::{
    attr::Found,
    context::{Context, Frame},
    exception::{ExcType, RunResult, programmer_error},
    heap::{HeapData, HeapId},
    object::Object,
    ops::UnaryOp,
    types::{ClassObject, Dict, Function, FunctionKind, Instance, Set, compute_mro},
};

/// Argument vector; most calls pass only a handful of arguments.
type ArgIds = SmallVec<[HeapId; 8]>;

impl Context {
    /// Calls a function, class or object defining `__call__`.
    ///
    /// `kwargs` must be a dict; `None` means no keyword arguments. Raises
    /// `RecursionError` without entering the callee when the call would exceed the
    /// depth ceiling, and `TimeoutError` when a deadline has elapsed.
    pub fn call(&mut self, callable: Object, args: &[Object], kwargs: Option<Object>) -> RunResult<Object> {
        let callable = self.id(callable);
        let args: ArgIds = args.iter().map(|&arg| self.id(arg)).collect();
        let kwargs = self.kwargs_id(kwargs)?;
        let result = self.call_id(callable, &args, kwargs)?;
        Ok(self.rooted(result))
    }

    /// Looks up `name` on `obj` and calls it with `obj` as the receiver.
    ///
    /// No bound method object is allocated. Raises `AttributeError` if the name is
    /// not found.
    pub fn call_method(&mut self, obj: Object, name: &str, args: &[Object], kwargs: Option<Object>) -> RunResult<Object> {
        let id = self.id(obj);
        let args: ArgIds = args.iter().map(|&arg| self.id(arg)).collect();
        let kwargs = self.kwargs_id(kwargs)?;
        let result = match self.find_attribute(id, name) {
            Some(Found::Class(method)) => self.call_with_receiver(method, id, &args, kwargs)?,
            Some(Found::Own(value)) => self.call_id(value, &args, kwargs)?,
            None => return Err(self.raise_attribute_error_id(id, name)),
        };
        Ok(self.rooted(result))
    }

    /// Like [`Context::call_method`] but resolves `name` with
    /// [`Context::get_attribute_from_base`] semantics.
    pub fn call_method_from_base(
        &mut self,
        obj: Object,
        name: &str,
        args: &[Object],
        kwargs: Option<Object>,
        base: Option<Object>,
    ) -> RunResult<Object> {
        let id = self.id(obj);
        let base = base.map(|base| self.id(base));
        let args: ArgIds = args.iter().map(|&arg| self.id(arg)).collect();
        let kwargs = self.kwargs_id(kwargs)?;
        let Some(method) = self.find_from_base(id, name, base) else {
            return Err(self.raise_attribute_error_id(id, name));
        };
        let result = self.call_with_receiver(method, id, &args, kwargs)?;
        Ok(self.rooted(result))
    }

    fn kwargs_id(&mut self, kwargs: Option<Object>) -> RunResult<Option<HeapId>> {
        let Some(kwargs) = kwargs else {
            return Ok(None);
        };
        let id = self.id(kwargs);
        if matches!(self.heap.get(id), HeapData::Dict(_)) {
            Ok(Some(id))
        } else {
            Err(self.raise_exception(ExcType::TypeError, Some("keyword arguments must be a dict")))
        }
    }

    pub(crate) fn call_id(&mut self, callable: HeapId, args: &[HeapId], kwargs: Option<HeapId>) -> RunResult<HeapId> {
        match self.heap.get(callable) {
            HeapData::Function(function) => {
                let function = function.clone();
                self.invoke(callable, &function, args, kwargs)
            }
            HeapData::Class(_) => self.instantiate(callable, args, kwargs),
            _ => match self.find_special(callable, "__call__") {
                Some(method) => self.call_with_receiver(method, callable, args, kwargs),
                None => {
                    let message = format!("'{}' object is not callable", self.class_name_of(callable));
                    Err(self.raise_exception(ExcType::TypeError, Some(&message)))
                }
            },
        }
    }

    /// Calls a value found on the class of `receiver`.
    ///
    /// Unbound methods get `receiver` prepended to the arguments; anything else is
    /// called as is.
    pub(crate) fn call_with_receiver(
        &mut self,
        callable: HeapId,
        receiver: HeapId,
        args: &[HeapId],
        kwargs: Option<HeapId>,
    ) -> RunResult<HeapId> {
        if let HeapData::Function(function) = self.heap.get(callable)
            && function.is_method()
            && function.bound_self().is_none()
        {
            let function = function.clone();
            let mut full = ArgIds::with_capacity(args.len() + 1);
            full.push(receiver);
            full.extend_from_slice(args);
            return self.invoke(callable, &function, &full, kwargs);
        }
        self.call_id(callable, args, kwargs)
    }

    /// Calls a special method of `receiver`'s class, or returns `None` if the class
    /// does not define it.
    pub(crate) fn call_special(&mut self, receiver: HeapId, name: &str, args: &[HeapId]) -> Option<RunResult<HeapId>> {
        let method = self.find_special(receiver, name)?;
        Some(self.call_with_receiver(method, receiver, args, None))
    }

    fn invoke(
        &mut self,
        function_id: HeapId,
        function: &Function,
        args: &[HeapId],
        kwargs: Option<HeapId>,
    ) -> RunResult<HeapId> {
        // the receiver and arguments are the callee's first roots
        let mut roots = Vec::with_capacity(args.len() + 1);
        roots.extend(function.bound_self());
        roots.extend_from_slice(args);
        let full: SmallVec<[Object; 8]> = roots.iter().map(|&id| self.handle(id)).collect();

        let frame = Frame {
            roots,
            kwargs,
            function: Some(function_id),
            native: matches!(function.kind(), FunctionKind::Native(_)),
            name: (!function.is_module_code()).then(|| Rc::clone(function.name())),
            tag: function.tag().cloned(),
            ..Frame::default()
        };
        self.enter_frame(frame)?;
        let result = match function.kind() {
            FunctionKind::Native(native) => native(self, &full),
            FunctionKind::Compiled(code) => code.execute(self, &full),
        };
        self.leave_frame(result)
    }

    fn instantiate(&mut self, class_id: HeapId, args: &[HeapId], kwargs: Option<HeapId>) -> RunResult<HeapId> {
        if let Some(result) = self.construct_builtin(class_id, args) {
            return result;
        }
        let instance = self.alloc(HeapData::Instance(Instance::new(class_id)))?;
        match self.find_in_mro(&self.mro_of(class_id), "__init__") {
            Some(init) => {
                let returned = self.call_with_receiver(init, instance, args, kwargs)?;
                if !matches!(self.heap.get(returned), HeapData::None) {
                    return Err(self.raise_exception(ExcType::TypeError, Some("__init__() should return None")));
                }
            }
            None if !args.is_empty() => return Err(self.raise_argument_count_error(args.len(), Some(0))),
            None => {}
        }
        Ok(instance)
    }

    /// Calls of the builtin value classes convert their argument.
    fn construct_builtin(&mut self, class_id: HeapId, args: &[HeapId]) -> Option<RunResult<HeapId>> {
        let builtins = &self.builtins;
        let conversion = [
            (builtins.int, UnaryOp::Int),
            (builtins.float, UnaryOp::Float),
            (builtins.str, UnaryOp::Str),
            (builtins.bool_, UnaryOp::Bool),
        ]
        .into_iter()
        .find_map(|(class, op)| (class == class_id).then_some(op));
        if let Some(op) = conversion {
            return Some(match args {
                [] => self.default_of(op),
                [arg] => self.unary_op_id(op, *arg),
                _ => Err(self.raise_argument_count_error(args.len(), Some(1))),
            });
        }

        let builtins = &self.builtins;
        if class_id == builtins.tuple || class_id == builtins.list || class_id == builtins.set {
            let is_set = class_id == builtins.set;
            let is_tuple = class_id == builtins.tuple;
            return Some(match args {
                [] if is_set => self.alloc(HeapData::Set(Set::new())),
                [] => self.alloc(if is_tuple { HeapData::Tuple(Vec::new()) } else { HeapData::List(Vec::new()) }),
                [arg] => self.collect_iterable(*arg).and_then(|items| {
                    if is_set {
                        let set = self.alloc(HeapData::Set(Set::new()))?;
                        for item in items {
                            self.set_add(set, item)?;
                        }
                        Ok(set)
                    } else if is_tuple {
                        self.alloc(HeapData::Tuple(items))
                    } else {
                        self.alloc(HeapData::List(items))
                    }
                }),
                _ => Err(self.raise_argument_count_error(args.len(), Some(1))),
            });
        }
        if class_id == builtins.dict {
            return Some(match args {
                [] => self.alloc(HeapData::Dict(Dict::new())),
                [arg] => self.dict_from_iterable(*arg),
                _ => Err(self.raise_argument_count_error(args.len(), Some(1))),
            });
        }
        if class_id == builtins.type_ {
            return Some(match args {
                [arg] => Ok(self.class_of_id(*arg)),
                _ => Err(self.raise_argument_count_error(args.len(), Some(1))),
            });
        }
        if class_id == builtins.none_type {
            return Some(match args {
                [] => Ok(self.builtins.none),
                _ => Err(self.raise_argument_count_error(args.len(), Some(0))),
            });
        }
        if class_id == builtins.function || class_id == builtins.module {
            let message = format!("cannot create '{}' instances", self.class_name_of_class(class_id));
            return Some(Err(self.raise_exception(ExcType::TypeError, Some(&message))));
        }
        None
    }

    fn default_of(&mut self, op: UnaryOp) -> RunResult<HeapId> {
        match op {
            UnaryOp::Int => self.alloc(HeapData::Int(0)),
            UnaryOp::Float => self.alloc(HeapData::Float(0.0)),
            UnaryOp::Bool => Ok(self.builtins.false_),
            _ => self.alloc(HeapData::Str(crate::types::Str::new(b""))),
        }
    }

    fn dict_from_iterable(&mut self, source: HeapId) -> RunResult<HeapId> {
        let dict = self.alloc(HeapData::Dict(Dict::new()))?;
        if let HeapData::Dict(existing) = self.heap.get(source) {
            let pairs: Vec<(HeapId, HeapId)> = existing.iter().collect();
            for (key, value) in pairs {
                self.dict_insert(dict, key, value)?;
            }
            return Ok(dict);
        }
        for pair in self.collect_iterable(source)? {
            let items = self.unpack_id(pair, 2)?;
            self.dict_insert(dict, items[0], items[1])?;
        }
        Ok(dict)
    }

    pub(crate) fn class_name_of_class(&self, class_id: HeapId) -> String {
        match self.heap.get(class_id) {
            HeapData::Class(cls) => cls.name().to_string(),
            _ => self.class_name_of(class_id),
        }
    }

    // ------------------------------------------------------------------------
    // Functions and classes
    // ------------------------------------------------------------------------

    /// Creates a native function.
    ///
    /// `userdata` is readable through [`Context::function_userdata`] while the
    /// function runs.
    pub fn new_function<F>(&mut self, name: &str, native: F, userdata: Option<Rc<dyn Any>>) -> RunResult<Object>
    where
        F: Fn(&mut Self, &[Object]) -> RunResult<Object> + 'static,
    {
        let function = Function::new(name, FunctionKind::Native(Rc::new(native)), userdata);
        let id = self.alloc(HeapData::Function(function))?;
        Ok(self.handle(id))
    }

    /// Creates a native method and stores it in `class` under `name`.
    ///
    /// Fetching the method from an instance binds it to that instance.
    pub fn bind_method<F>(
        &mut self,
        class: Object,
        name: &str,
        native: F,
        userdata: Option<Rc<dyn Any>>,
    ) -> RunResult<Object>
    where
        F: Fn(&mut Self, &[Object]) -> RunResult<Object> + 'static,
    {
        let class_id = self.id(class);
        if !matches!(self.heap.get(class_id), HeapData::Class(_)) {
            programmer_error("bind_method expects a class");
        }
        let function = Function::new(name, FunctionKind::Native(Rc::new(native)), userdata).into_method();
        let id = self.alloc(HeapData::Function(function))?;
        self.set_attribute_id(class_id, name, id)?;
        Ok(self.handle(id))
    }

    /// Creates a class. With no bases the class derives from `object`.
    ///
    /// Lookup walks the bases depth-first, left to right. Raises `TypeError` if a
    /// base is not a class.
    pub fn new_class(&mut self, name: &str, bases: &[Object]) -> RunResult<Object> {
        let bases = self.ids(bases);
        let id = self.alloc(HeapData::Class(ClassObject::new(name, bases.clone())))?;
        match compute_mro(id, &bases, &self.heap, self.builtins.object) {
            Ok(mro) => {
                if let HeapData::Class(cls) = self.heap.get_mut(id) {
                    cls.set_mro(mro);
                }
                Ok(self.handle(id))
            }
            Err(message) => Err(self.raise_exception(ExcType::TypeError, Some(&message))),
        }
    }

    /// Userdata of the native function currently executing.
    ///
    /// Calling this outside a native function is a programmer error.
    #[must_use]
    pub fn function_userdata(&self) -> Option<Rc<dyn Any>> {
        let frame = self.frames.last().filter(|frame| frame.native);
        let Some(function) = frame.and_then(|frame| frame.function) else {
            programmer_error("function_userdata called outside a native function");
        };
        match self.heap.get(function) {
            HeapData::Function(function) => function.userdata().cloned(),
            _ => None,
        }
    }

    /// [`Context::function_userdata`] downcast to `T`.
    #[must_use]
    pub fn function_userdata_as<T: Any>(&self) -> Option<Rc<T>> {
        self.function_userdata()?.downcast::<T>().ok()
    }
}
