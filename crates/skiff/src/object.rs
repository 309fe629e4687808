use std::{
    fmt,
    sync::atomic::{AtomicU32, Ordering},
};

use strum::{Display, IntoStaticStr};

use crate::heap::HeapId;

/// Identity of one [`Context`](crate::Context).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u32);

impl ContextId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU32 = AtomicU32::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Opaque handle to a runtime value.
///
/// A handle is bound to the context that created it (see [`Object::context_id`]) and
/// to the generation of its heap slot. Every context operation validates the handle
/// first; passing a handle whose object was reclaimed, or one from another context,
/// is a programmer error. After the context is dropped every handle it produced is
/// dead.
///
/// "No value" is expressed with `Option<Object>` or `Err(RunError)`, never with a
/// special handle, so it cannot be confused with the language's `None` object.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Object {
    context: ContextId,
    id: HeapId,
    generation: u32,
}

impl Object {
    pub(crate) fn new(context: ContextId, id: HeapId, generation: u32) -> Self {
        Self { context, id, generation }
    }

    /// The context this object belongs to.
    #[must_use]
    pub fn context_id(self) -> ContextId {
        self.context
    }

    pub(crate) fn heap_id(self) -> HeapId {
        self.id
    }

    pub(crate) fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Object({}#{})", self.id.index(), self.generation)
    }
}

/// Type tag of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
pub enum ObjectKind {
    None,
    Bool,
    Int,
    Float,
    Str,
    Tuple,
    List,
    Dict,
    Set,
    Function,
    Class,
    /// Instance of a class, including exception instances.
    Instance,
    Module,
}

impl ObjectKind {
    /// Name of the builtin class backing values of this kind.
    ///
    /// Instances report `object`; their actual class is looked up per object.
    #[must_use]
    pub fn class_name(self) -> &'static str {
        match self {
            Self::None => "NoneType",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Str => "str",
            Self::Tuple => "tuple",
            Self::List => "list",
            Self::Dict => "dict",
            Self::Set => "set",
            Self::Function => "function",
            Self::Class => "type",
            Self::Instance => "object",
            Self::Module => "module",
        }
    }
}
