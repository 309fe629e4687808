//! Value constructors, accessors and classification predicates.
//!
//! Constructors allocate and can fail under the allocation ceiling. Accessors
//! expect the right kind: reading an int out of a list is a programmer error,
//! not a language exception. Predicates never fail.

use crate::{
    context::Context,
    exception::{RunResult, programmer_error},
    heap::{HeapData, HeapId},
    object::{Object, ObjectKind},
    types::{Dict, Instance, Set, Str},
};

impl Context {
    // ------------------------------------------------------------------------
    // Constructors
    // ------------------------------------------------------------------------

    /// The `None` singleton.
    #[must_use]
    pub fn none(&self) -> Object {
        self.handle(self.builtins.none)
    }

    /// The `True` or `False` singleton.
    #[must_use]
    pub fn create_bool(&self, value: bool) -> Object {
        self.handle(self.builtins.bool_id(value))
    }

    pub fn create_int(&mut self, value: i64) -> RunResult<Object> {
        let id = self.alloc(HeapData::Int(value))?;
        Ok(self.handle(id))
    }

    pub fn create_float(&mut self, value: f32) -> RunResult<Object> {
        let id = self.alloc(HeapData::Float(value))?;
        Ok(self.handle(id))
    }

    pub fn create_string(&mut self, value: &str) -> RunResult<Object> {
        self.create_string_bytes(value.as_bytes())
    }

    /// Creates a string from raw bytes. Embedded NUL bytes and invalid UTF-8 are kept.
    pub fn create_string_bytes(&mut self, value: &[u8]) -> RunResult<Object> {
        let id = self.alloc(HeapData::Str(Str::new(value)))?;
        Ok(self.handle(id))
    }

    pub fn create_tuple(&mut self, items: &[Object]) -> RunResult<Object> {
        let items = self.ids(items);
        let id = self.alloc(HeapData::Tuple(items))?;
        Ok(self.handle(id))
    }

    pub fn create_list(&mut self, items: &[Object]) -> RunResult<Object> {
        let items = self.ids(items);
        let id = self.alloc(HeapData::List(items))?;
        Ok(self.handle(id))
    }

    /// Creates a dict from key/value pairs; later duplicates overwrite earlier ones.
    ///
    /// Raises `TypeError` for unhashable keys.
    pub fn create_dict(&mut self, pairs: &[(Object, Object)]) -> RunResult<Object> {
        let id = self.alloc(HeapData::Dict(Dict::new()))?;
        for &(key, value) in pairs {
            let (key, value) = (self.id(key), self.id(value));
            self.dict_insert(id, key, value)?;
        }
        Ok(self.handle(id))
    }

    /// Creates a set; duplicates are dropped.
    pub fn create_set(&mut self, items: &[Object]) -> RunResult<Object> {
        let id = self.alloc(HeapData::Set(Set::new()))?;
        for &item in items {
            let item = self.id(item);
            self.set_add(id, item)?;
        }
        Ok(self.handle(id))
    }

    // ------------------------------------------------------------------------
    // Predicates
    // ------------------------------------------------------------------------

    #[must_use]
    pub fn kind(&self, obj: Object) -> ObjectKind {
        self.heap.get(self.id(obj)).kind()
    }

    #[must_use]
    pub fn is_none(&self, obj: Object) -> bool {
        self.kind(obj) == ObjectKind::None
    }

    #[must_use]
    pub fn is_bool(&self, obj: Object) -> bool {
        self.kind(obj) == ObjectKind::Bool
    }

    #[must_use]
    pub fn is_int(&self, obj: Object) -> bool {
        self.kind(obj) == ObjectKind::Int
    }

    #[must_use]
    pub fn is_float(&self, obj: Object) -> bool {
        self.kind(obj) == ObjectKind::Float
    }

    #[must_use]
    pub fn is_int_or_float(&self, obj: Object) -> bool {
        matches!(self.kind(obj), ObjectKind::Int | ObjectKind::Float)
    }

    #[must_use]
    pub fn is_string(&self, obj: Object) -> bool {
        self.kind(obj) == ObjectKind::Str
    }

    #[must_use]
    pub fn is_tuple(&self, obj: Object) -> bool {
        self.kind(obj) == ObjectKind::Tuple
    }

    #[must_use]
    pub fn is_list(&self, obj: Object) -> bool {
        self.kind(obj) == ObjectKind::List
    }

    #[must_use]
    pub fn is_dict(&self, obj: Object) -> bool {
        self.kind(obj) == ObjectKind::Dict
    }

    #[must_use]
    pub fn is_set(&self, obj: Object) -> bool {
        self.kind(obj) == ObjectKind::Set
    }

    #[must_use]
    pub fn is_function(&self, obj: Object) -> bool {
        self.kind(obj) == ObjectKind::Function
    }

    #[must_use]
    pub fn is_class(&self, obj: Object) -> bool {
        self.kind(obj) == ObjectKind::Class
    }

    #[must_use]
    pub fn is_module(&self, obj: Object) -> bool {
        self.kind(obj) == ObjectKind::Module
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    #[must_use]
    pub fn get_bool(&self, obj: Object) -> bool {
        match self.heap.get(self.id(obj)) {
            HeapData::Bool(value) => *value,
            _ => programmer_error("get_bool on a non-bool object"),
        }
    }

    /// Reads an int. Bools read as 0 or 1.
    #[must_use]
    pub fn get_int(&self, obj: Object) -> i64 {
        match self.heap.get(self.id(obj)) {
            HeapData::Int(value) => *value,
            HeapData::Bool(value) => i64::from(*value),
            _ => programmer_error("get_int on a non-int object"),
        }
    }

    /// Reads a float. Ints are converted.
    #[must_use]
    pub fn get_float(&self, obj: Object) -> f32 {
        match self.heap.get(self.id(obj)) {
            HeapData::Float(value) => *value,
            HeapData::Int(value) => *value as f32,
            HeapData::Bool(value) => f32::from(u8::from(*value)),
            _ => programmer_error("get_float on a non-numeric object"),
        }
    }

    /// Reads a string's bytes, without the terminator.
    #[must_use]
    pub fn get_string_bytes(&self, obj: Object) -> &[u8] {
        match self.heap.get(self.id(obj)) {
            HeapData::Str(s) => s.as_bytes(),
            _ => programmer_error("get_string on a non-string object"),
        }
    }

    /// Reads a string's bytes followed by the NUL terminator.
    #[must_use]
    pub fn get_string_with_nul(&self, obj: Object) -> &[u8] {
        match self.heap.get(self.id(obj)) {
            HeapData::Str(s) => s.as_bytes_with_nul(),
            _ => programmer_error("get_string on a non-string object"),
        }
    }

    /// Reads a string, replacing invalid UTF-8.
    #[must_use]
    pub fn get_string(&self, obj: Object) -> String {
        String::from_utf8_lossy(self.get_string_bytes(obj)).into_owned()
    }

    /// Elements of a tuple, list or set, in iteration order.
    ///
    /// The element handles are kept alive by the container, not by the current
    /// scope. Read an element with [`Context::get_index`] to keep it past a
    /// mutation of the container.
    #[must_use]
    pub fn get_items(&self, obj: Object) -> Vec<Object> {
        let ids: Vec<HeapId> = match self.heap.get(self.id(obj)) {
            HeapData::Tuple(items) | HeapData::List(items) => items.clone(),
            HeapData::Set(set) => set.items().collect(),
            _ => programmer_error("get_items on a non-sequence object"),
        };
        ids.into_iter().map(|id| self.handle(id)).collect()
    }

    /// Key/value pairs of a dict, in insertion order. Like [`Context::get_items`],
    /// the handles are kept alive by the dict.
    #[must_use]
    pub fn get_dict_items(&self, obj: Object) -> Vec<(Object, Object)> {
        match self.heap.get(self.id(obj)) {
            HeapData::Dict(dict) => dict
                .iter()
                .map(|(key, value)| (self.handle(key), self.handle(value)))
                .collect(),
            _ => programmer_error("get_dict_items on a non-dict object"),
        }
    }

    /// The class of an object. Intrinsic values report their builtin class.
    #[must_use]
    pub fn class_of(&self, obj: Object) -> Object {
        let id = self.id(obj);
        self.handle(self.class_of_id(id))
    }

    /// Name of the class of an object, e.g. `int` or `MyClass`.
    #[must_use]
    pub fn class_name(&self, obj: Object) -> String {
        self.class_name_of(self.id(obj))
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    pub(crate) fn class_of_id(&self, id: HeapId) -> HeapId {
        match self.heap.get(id) {
            HeapData::Instance(inst) => inst.class_id(),
            data => self.builtins.class_for_kind(data.kind()),
        }
    }

    pub(crate) fn class_name_of(&self, id: HeapId) -> String {
        match self.heap.get(self.class_of_id(id)) {
            HeapData::Class(cls) => cls.name().to_string(),
            _ => "object".to_owned(),
        }
    }

    /// MRO of a class id; empty for non-classes.
    pub(crate) fn mro_of(&self, class_id: HeapId) -> Vec<HeapId> {
        match self.heap.get(class_id) {
            HeapData::Class(cls) => cls.mro().to_vec(),
            _ => Vec::new(),
        }
    }

    pub(crate) fn is_instance_id(&self, id: HeapId, class_id: HeapId) -> bool {
        match self.heap.get(self.class_of_id(id)) {
            HeapData::Class(cls) => cls.mro().contains(&class_id),
            _ => false,
        }
    }

    /// `str(obj)` as bytes.
    pub(crate) fn text_bytes(&mut self, obj: Object) -> RunResult<Vec<u8>> {
        let text = self.unary_op(crate::ops::UnaryOp::Str, obj)?;
        Ok(self.get_string_bytes(text).to_vec())
    }

    /// Builds an exception instance directly, without running `__init__`.
    pub(crate) fn new_exception_instance(&mut self, class_id: HeapId, message: Option<&str>) -> RunResult<HeapId> {
        let id = self.alloc(HeapData::Instance(Instance::new(class_id)))?;
        if let Some(message) = message {
            let message = self.alloc(HeapData::Str(Str::new(message.as_bytes())))?;
            if let HeapData::Instance(inst) = self.heap.get_mut(id) {
                inst.set_attr("_message", message);
            }
        }
        Ok(id)
    }
}
