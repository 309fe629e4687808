use std::{any::Any, fmt, rc::Rc};

use crate::{context::Context, exception::RunResult, heap::HeapId, object::Object};

/// Signature of a native function.
///
/// Receives the context and the positional arguments; for bound methods the
/// receiver is prepended. Keyword arguments are read with [`Context::kwargs`] or
/// [`Context::parse_kwargs`].
pub type NativeFn = dyn Fn(&mut Context, &[Object]) -> RunResult<Object>;

/// Executable produced by a [`Compiler`](crate::Compiler).
///
/// The runtime treats it as opaque: calling the owning function object pushes a
/// frame and hands control to [`CodeObject::execute`].
pub trait CodeObject: fmt::Debug {
    /// Runs the code with the given positional arguments.
    ///
    /// Implementations poll [`Context::poll_timeout`] at bounded intervals and
    /// report positions through [`Context::set_source_position`].
    fn execute(&self, ctx: &mut Context, args: &[Object]) -> RunResult<Object>;

    /// Objects captured by the code (constants, closure cells, defaults).
    ///
    /// They are traced as children of the function object.
    fn references(&self) -> Vec<Object> {
        Vec::new()
    }
}

#[derive(Clone)]
pub(crate) enum FunctionKind {
    Native(Rc<NativeFn>),
    Compiled(Rc<dyn CodeObject>),
}

impl fmt::Debug for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native(_) => f.write_str("Native"),
            Self::Compiled(code) => f.debug_tuple("Compiled").field(code).finish(),
        }
    }
}

/// Function object: a native trampoline or compiled code.
#[derive(Clone)]
pub(crate) struct Function {
    name: Rc<str>,
    /// Module or display name, used as the traceback tag.
    tag: Option<Rc<str>>,
    kind: FunctionKind,
    userdata: Option<Rc<dyn Any>>,
    /// Fetching a method through an instance binds it to that instance.
    is_method: bool,
    bound_self: Option<HeapId>,
    /// Module or expression body produced by the compiler.
    module_code: bool,
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("is_method", &self.is_method)
            .field("bound_self", &self.bound_self)
            .finish_non_exhaustive()
    }
}

impl Function {
    pub fn new(name: &str, kind: FunctionKind, userdata: Option<Rc<dyn Any>>) -> Self {
        Self {
            name: Rc::from(name),
            tag: None,
            kind,
            userdata,
            is_method: false,
            bound_self: None,
            module_code: false,
        }
    }

    #[must_use]
    pub fn with_tag(mut self, tag: Option<Rc<str>>) -> Self {
        self.tag = tag;
        self
    }

    #[must_use]
    pub fn into_method(mut self) -> Self {
        self.is_method = true;
        self
    }

    #[must_use]
    pub fn into_module_code(mut self) -> Self {
        self.module_code = true;
        self
    }

    /// Copy of this method bound to `receiver`.
    pub fn bind(&self, receiver: HeapId) -> Self {
        let mut bound = self.clone();
        bound.bound_self = Some(receiver);
        bound
    }

    pub fn name(&self) -> &Rc<str> {
        &self.name
    }

    pub fn tag(&self) -> Option<&Rc<str>> {
        self.tag.as_ref()
    }

    pub fn kind(&self) -> &FunctionKind {
        &self.kind
    }

    pub fn userdata(&self) -> Option<&Rc<dyn Any>> {
        self.userdata.as_ref()
    }

    pub fn is_method(&self) -> bool {
        self.is_method
    }

    pub fn bound_self(&self) -> Option<HeapId> {
        self.bound_self
    }

    pub fn is_module_code(&self) -> bool {
        self.module_code
    }

    pub fn collect_child_ids(&self, work_list: &mut Vec<HeapId>) {
        if let Some(receiver) = self.bound_self {
            work_list.push(receiver);
        }
        if let FunctionKind::Compiled(code) = &self.kind {
            work_list.extend(code.references().into_iter().map(Object::heap_id));
        }
    }
}
