pub(crate) mod class;
pub(crate) mod dict;
pub(crate) mod function;
pub(crate) mod module;
pub(crate) mod str;

pub(crate) use class::{ClassObject, Instance, compute_mro};
pub(crate) use dict::{Dict, Set};
pub use function::{CodeObject, NativeFn};
pub(crate) use function::{Function, FunctionKind};
pub(crate) use module::Module;
pub(crate) use str::Str;

/// Ordered name → object table used by instances, classes and modules.
pub(crate) type AttrTable = indexmap::IndexMap<String, crate::heap::HeapId, ahash::RandomState>;
