//! Module registry and import operations.
//!
//! Modules come from three places, tried in order: the cache of already loaded
//! modules, loaders registered by the host (plus the builtin `sys` loader), and
//! `<import_path>/<name>.py` compiled through the installed compiler.
//!
//! A loader runs with the fresh module as the active namespace, so
//! [`Context::set_global`] inside the loader populates that module. A module is
//! only added to the cache once its loader succeeded; a failed loader is never
//! retried.

use std::{fmt, io, path::Path, rc::Rc};

use ahash::{AHashMap, AHashSet};
use indexmap::IndexMap;

use crate::{
    compile::CompileMode,
    context::Context,
    exception::{ExcType, RunResult},
    heap::{Heap, HeapData, HeapId},
    object::Object,
    resource::ResourceTracker,
    types::{Function, FunctionKind, Module},
};

pub(crate) mod sys;

/// Populates a module being imported. Returns `Err` after raising on failure.
pub type ModuleLoader = dyn Fn(&mut Context) -> RunResult<()>;

pub(crate) struct ModuleRegistry {
    loaders: AHashMap<String, Rc<ModuleLoader>>,
    loaded: IndexMap<String, HeapId, ahash::RandomState>,
    failed: AHashSet<String>,
    /// Modules whose loader or top-level code is running; the last one is active.
    stack: Vec<HeapId>,
    main: HeapId,
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("loaders", &self.loaders.keys().collect::<Vec<_>>())
            .field("loaded", &self.loaded.keys().collect::<Vec<_>>())
            .field("failed", &self.failed)
            .field("stack", &self.stack)
            .finish_non_exhaustive()
    }
}

impl ModuleRegistry {
    pub fn bootstrap(heap: &mut Heap<impl ResourceTracker>) -> Self {
        let main = heap
            .allocate(HeapData::Module(Module::new("__main__")))
            .expect("bootstrap allocations are never limited");
        let mut loaded = IndexMap::default();
        loaded.insert("__main__".to_owned(), main);
        let mut loaders: AHashMap<String, Rc<ModuleLoader>> = AHashMap::new();
        loaders.insert("sys".to_owned(), Rc::new(sys::load));
        Self {
            loaders,
            loaded,
            failed: AHashSet::new(),
            stack: Vec::new(),
            main,
        }
    }

    /// Namespace that globals are read from and written to.
    pub fn active(&self) -> HeapId {
        self.stack.last().copied().unwrap_or(self.main)
    }

    pub fn roots(&self) -> Vec<HeapId> {
        let mut roots: Vec<HeapId> = self.loaded.values().copied().collect();
        roots.extend_from_slice(&self.stack);
        roots.push(self.main);
        roots
    }
}

impl Context {
    /// Registers a loader invoked the first time `name` is imported.
    ///
    /// Registering a name again replaces its loader and forgets an earlier load
    /// failure; a module that already loaded stays cached.
    pub fn register_module(&mut self, name: &str, loader: impl Fn(&mut Self) -> RunResult<()> + 'static) {
        self.modules.loaders.insert(name.to_owned(), Rc::new(loader));
        self.modules.failed.remove(name);
    }

    /// Imports a module and binds it in the active namespace under `alias`, or
    /// under its own name.
    pub fn import_module(&mut self, name: &str, alias: Option<&str>) -> RunResult<Object> {
        let module = self.load_module(name)?;
        self.set_global_id(alias.unwrap_or(name), module);
        Ok(self.rooted(module))
    }

    /// Imports one name from a module and binds it in the active namespace.
    ///
    /// The binding copies the current value: rebinding the name inside the module
    /// later does not affect the importer.
    pub fn import_from_module(&mut self, module: &str, name: &str, alias: Option<&str>) -> RunResult<Object> {
        let module_id = self.load_module(module)?;
        let value = match self.heap.get(module_id) {
            HeapData::Module(m) => m.get_attr(name),
            _ => None,
        };
        let Some(value) = value else {
            let message = format!("cannot import name '{name}' from '{module}'");
            return Err(self.raise_exception(ExcType::ImportError, Some(&message)));
        };
        self.set_global_id(alias.unwrap_or(name), value);
        Ok(self.rooted(value))
    }

    /// Imports every name not starting with an underscore into the active namespace.
    pub fn import_all_from_module(&mut self, module: &str) -> RunResult<()> {
        let module_id = self.load_module(module)?;
        let public = match self.heap.get(module_id) {
            HeapData::Module(m) => m.public_attrs(),
            _ => Vec::new(),
        };
        for (name, value) in public {
            self.set_global_id(&name, value);
        }
        Ok(())
    }

    /// Binds a name in the active module.
    pub fn set_global(&mut self, name: &str, value: Object) {
        let value = self.id(value);
        self.set_global_id(name, value);
    }

    /// Reads a name from the active module, then from builtins.
    ///
    /// The value is rooted in the current scope, so it outlives a later rebinding.
    #[must_use]
    pub fn get_global(&mut self, name: &str) -> Option<Object> {
        let id = [self.modules.active(), self.builtins.namespace]
            .into_iter()
            .find_map(|namespace| match self.heap.get(namespace) {
                HeapData::Module(module) => module.get_attr(name),
                _ => None,
            })?;
        Some(self.rooted(id))
    }

    /// The `__main__` module.
    #[must_use]
    pub fn main_module(&self) -> Object {
        self.handle(self.modules.main)
    }

    pub(crate) fn set_global_id(&mut self, name: &str, value: HeapId) {
        if let HeapData::Module(module) = self.heap.get_mut(self.modules.active()) {
            module.set_attr(name, value);
        }
    }

    fn load_module(&mut self, name: &str) -> RunResult<HeapId> {
        if let Some(&module) = self.modules.loaded.get(name) {
            return Ok(module);
        }
        if self.modules.failed.contains(name) {
            let message = format!("module '{name}' failed to load");
            return Err(self.raise_exception(ExcType::ImportError, Some(&message)));
        }
        let body = match self.modules.loaders.get(name) {
            Some(loader) => ModuleBody::Loader(Rc::clone(loader)),
            None => self.module_from_file(name)?,
        };

        let module = self.alloc(HeapData::Module(Module::new(name)))?;
        self.modules.stack.push(module);
        let result = match body {
            ModuleBody::Loader(loader) => loader(self),
            ModuleBody::Code(code) => {
                let code = self.handle(code);
                self.call(code, &[], None).map(|_| ())
            }
        };
        self.modules.stack.pop();

        match result {
            Ok(()) => {
                self.modules.loaded.insert(name.to_owned(), module);
                self.tracer.on_import(name);
                tracing::debug!(module = name, "module loaded");
                Ok(module)
            }
            Err(err) => {
                self.modules.failed.insert(name.to_owned());
                tracing::debug!(module = name, "module failed to load");
                Err(err)
            }
        }
    }

    /// Compiles `<import_path>/<name>.py` into a module body.
    fn module_from_file(&mut self, name: &str) -> RunResult<ModuleBody> {
        if self.compiler.is_none() {
            return Err(self.raise_no_module(name));
        }
        let path = Path::new(&self.import_path).join(format!("{name}.py"));
        if path.is_dir() {
            let message = format!("Is a directory: '{}'", path.display());
            return Err(self.raise_exception(ExcType::IsADirectoryError, Some(&message)));
        }
        let source = match std::fs::read_to_string(&path) {
            Ok(source) => source,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Err(self.raise_no_module(name)),
            Err(err) => {
                let message = format!("{}: '{}'", err, path.display());
                return Err(self.raise_exception(ExcType::OSError, Some(&message)));
            }
        };
        let compiled = match self.compiler.as_mut() {
            Some(compiler) => compiler.compile(&source, name, CompileMode::Module),
            None => return Err(self.raise_no_module(name)),
        };
        match compiled {
            Ok(code) => {
                let function = Function::new(name, FunctionKind::Compiled(code), None)
                    .with_tag(Some(Rc::from(name)))
                    .into_module_code();
                Ok(ModuleBody::Code(self.alloc(HeapData::Function(function))?))
            }
            Err(err) => Err(self.raise_compile_error(&err, name)),
        }
    }

    fn raise_no_module(&mut self, name: &str) -> crate::exception::RunError {
        let message = format!("No module named '{name}'");
        self.raise_exception(ExcType::ImportError, Some(&message))
    }
}

enum ModuleBody {
    Loader(Rc<ModuleLoader>),
    Code(HeapId),
}
