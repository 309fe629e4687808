use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    compile::Compiler,
    io::PrintWriter,
    resource::{DEFAULT_GC_RUN_FACTOR, DEFAULT_MAX_ALLOCATIONS, DEFAULT_MAX_RECURSION_DEPTH, ResourceLimits},
    tracer::RuntimeTracer,
};

/// Settings supplied when a [`Context`](crate::Context) is created.
///
/// The plain fields can be loaded from JSON with [`Config::from_json`]; every field
/// is optional there and falls back to its default. The print sink, tracer and
/// compiler are runtime hooks and are only set through the builder methods.
#[derive(Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Gates OS-facing library surface. This is not a security sandbox.
    pub enable_os_access: bool,
    /// Ceiling on live allocations made after bootstrap. 0 or negative means unlimited.
    pub max_alloc: i64,
    /// Maximum call depth.
    pub max_recursion: usize,
    /// Growth of the live object count between automatic collection passes.
    /// Larger values collect less often.
    pub gc_run_factor: f64,
    /// Directory searched for `<name>.py` when importing a module with no loader.
    pub import_path: String,
    /// Exposed to scripts as `sys.argv`.
    pub argv: Vec<String>,
    #[serde(skip)]
    pub(crate) print: Option<Box<dyn PrintWriter>>,
    #[serde(skip)]
    pub(crate) tracer: Option<Box<dyn RuntimeTracer>>,
    #[serde(skip)]
    pub(crate) compiler: Option<Box<dyn Compiler>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enable_os_access: false,
            max_alloc: DEFAULT_MAX_ALLOCATIONS as i64,
            max_recursion: DEFAULT_MAX_RECURSION_DEPTH,
            gc_run_factor: DEFAULT_GC_RUN_FACTOR,
            import_path: String::new(),
            argv: Vec::new(),
            print: None,
            tracer: None,
            compiler: None,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("enable_os_access", &self.enable_os_access)
            .field("max_alloc", &self.max_alloc)
            .field("max_recursion", &self.max_recursion)
            .field("gc_run_factor", &self.gc_run_factor)
            .field("import_path", &self.import_path)
            .field("argv", &self.argv)
            .field("has_print", &self.print.is_some())
            .field("tracer", &self.tracer)
            .field("compiler", &self.compiler)
            .finish()
    }
}

impl Config {
    /// Parses the serializable fields from JSON.
    ///
    /// # Errors
    /// Returns the `serde_json` error for malformed input or mistyped fields.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Resource limits derived from this configuration.
    #[must_use]
    pub fn resource_limits(&self) -> ResourceLimits {
        let max_allocations = usize::try_from(self.max_alloc).ok().filter(|&limit| limit > 0);
        ResourceLimits::new()
            .max_allocations(max_allocations)
            .max_recursion_depth(Some(self.max_recursion))
            .gc_run_factor(Some(self.gc_run_factor))
    }

    #[must_use]
    pub fn enable_os_access(mut self, enable: bool) -> Self {
        self.enable_os_access = enable;
        self
    }

    #[must_use]
    pub fn max_alloc(mut self, limit: i64) -> Self {
        self.max_alloc = limit;
        self
    }

    #[must_use]
    pub fn max_recursion(mut self, limit: usize) -> Self {
        self.max_recursion = limit;
        self
    }

    #[must_use]
    pub fn gc_run_factor(mut self, factor: f64) -> Self {
        self.gc_run_factor = factor;
        self
    }

    #[must_use]
    pub fn import_path(mut self, path: impl Into<String>) -> Self {
        self.import_path = path.into();
        self
    }

    #[must_use]
    pub fn argv(mut self, argv: Vec<String>) -> Self {
        self.argv = argv;
        self
    }

    /// Sets the sink for script output. Without one, output is discarded.
    #[must_use]
    pub fn print(mut self, writer: impl PrintWriter + 'static) -> Self {
        self.print = Some(Box::new(writer));
        self
    }

    /// Sets the runtime event tracer.
    #[must_use]
    pub fn tracer(mut self, tracer: impl RuntimeTracer + 'static) -> Self {
        self.tracer = Some(Box::new(tracer));
        self
    }

    /// Sets the compiler used by `execute`, `compile` and file-based imports.
    #[must_use]
    pub fn compiler(mut self, compiler: impl Compiler + 'static) -> Self {
        self.compiler = Some(Box::new(compiler));
        self
    }
}
