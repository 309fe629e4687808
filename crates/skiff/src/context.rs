use std::{any::Any, fmt, rc::Rc, time::Duration};

use crate::{
    builtins::Builtins,
    compile::Compiler,
    config::Config,
    exception::{RunResult, TraceFrame, programmer_error},
    heap::{Finalizer, Heap, HeapData, HeapId, HeapStats},
    io::{NoPrint, PrintWriter},
    modules::ModuleRegistry,
    object::{ContextId, Object},
    resource::{LimitedTracker, ResourceTracker},
    tracer::{NoopTracer, RuntimeTracer},
};

/// One isolated runtime instance.
///
/// Owns the heap, the builtin classes, the module registry, the exception slot and
/// the call stack. Every [`Object`] handle is bound to the context that produced it.
///
/// # Handle scopes
///
/// Every object handed to the caller (a new value, a call result, an attribute,
/// index or global read) is rooted in the innermost active scope: the frame of the
/// native function that is running, or the host scope at top level. Arguments stay
/// rooted for the whole call they are passed to. A function's scope ends when it
/// returns; [`Context::scope`] ends a nested one early.
///
/// The host scope only ends when the host calls [`Context::collect_garbage`]. A
/// long-running host loop must call it (after pinning whatever it keeps with
/// [`Context::inc_ref`]) or wrap each iteration in [`Context::scope`]; otherwise
/// every intermediate value stays reachable and counts against `max_alloc`.
///
/// Dropping the context runs the finalizers of every remaining object; handles
/// produced by it are dead afterwards.
pub struct Context {
    id: ContextId,
    pub(crate) heap: Heap<LimitedTracker>,
    pub(crate) builtins: Builtins,
    /// The pending exception. Always an instance deriving from `BaseException`.
    pub(crate) exception: Option<HeapId>,
    /// Call frames; `frames[0]` is the host scope and is never popped.
    pub(crate) frames: Vec<Frame>,
    pub(crate) modules: ModuleRegistry,
    pub(crate) tracer: Box<dyn RuntimeTracer>,
    pub(crate) compiler: Option<Box<dyn Compiler>>,
    print: Box<dyn PrintWriter>,
    pub(crate) hasher: ahash::RandomState,
    /// Containers being rendered by `repr`, to print `[...]` for cycles.
    pub(crate) repr_stack: Vec<HeapId>,
    enable_os_access: bool,
    pub(crate) import_path: String,
    pub(crate) argv: Vec<String>,
}

/// A call frame and the handle scope rooted in it.
#[derive(Debug, Default)]
pub(crate) struct Frame {
    /// Objects allocated while this frame was on top, plus results returned into it.
    pub roots: Vec<HeapId>,
    pub kwargs: Option<HeapId>,
    pub function: Option<HeapId>,
    pub native: bool,
    /// Function name for tracebacks, `None` for module-level code.
    pub name: Option<Rc<str>>,
    pub tag: Option<Rc<str>>,
    pub line: Option<usize>,
    pub column: Option<usize>,
    pub line_text: Option<Rc<str>>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("depth", &self.depth())
            .field("exception", &self.exception)
            .field("live_objects", &self.heap.live_count())
            .finish_non_exhaustive()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl Context {
    /// Creates a context, allocating the builtin classes and the `__main__` module.
    #[must_use]
    pub fn new(mut config: Config) -> Self {
        let limits = config.resource_limits();
        let mut heap = Heap::new(1024, LimitedTracker::new(limits));
        let builtins = Builtins::bootstrap(&mut heap);
        let modules = ModuleRegistry::bootstrap(&mut heap);
        heap.mark_bootstrapped();
        heap.tracker_mut().arm();

        let ctx = Self {
            id: ContextId::next(),
            heap,
            builtins,
            exception: None,
            frames: vec![Frame::default()],
            modules,
            tracer: config.tracer.take().unwrap_or_else(|| Box::new(NoopTracer)),
            compiler: config.compiler.take(),
            print: config.print.take().unwrap_or_else(|| Box::new(NoPrint)),
            hasher: ahash::RandomState::with_seeds(
                0x243f_6a88_85a3_08d3,
                0x1319_8a2e_0370_7344,
                0xa409_3822_299f_31d0,
                0x082e_fa98_ec4e_6c89,
            ),
            repr_stack: Vec::new(),
            enable_os_access: config.enable_os_access,
            import_path: config.import_path,
            argv: config.argv,
        };
        tracing::debug!(context = ?ctx.id, live = ctx.heap.live_count(), "context created");
        ctx
    }

    /// Identity of this context; compare with [`Object::context_id`].
    #[must_use]
    pub fn context_id(&self) -> ContextId {
        self.id
    }

    /// Whether OS-facing library surface may be exposed. This is not a sandbox.
    #[must_use]
    pub fn os_access_enabled(&self) -> bool {
        self.enable_os_access
    }

    // ------------------------------------------------------------------------
    // Handles
    // ------------------------------------------------------------------------

    /// Builds a handle for a live heap id.
    pub(crate) fn handle(&self, id: HeapId) -> Object {
        Object::new(self.id, id, self.heap.generation(id))
    }

    /// Validates a handle and returns its heap id.
    pub(crate) fn id(&self, obj: Object) -> HeapId {
        if obj.context_id() != self.id {
            programmer_error("object belongs to another context");
        }
        if !self.heap.is_live(obj.heap_id(), obj.generation()) {
            programmer_error("object was reclaimed by the garbage collector");
        }
        obj.heap_id()
    }

    pub(crate) fn ids(&self, objects: &[Object]) -> Vec<HeapId> {
        objects.iter().map(|&obj| self.id(obj)).collect()
    }

    /// Allocates an object, rooting it in the current frame.
    ///
    /// Runs an automatic collection pass when one is due or when the allocation
    /// ceiling is reached; raises `MemoryError` if the ceiling still holds.
    pub(crate) fn alloc(&mut self, data: HeapData) -> RunResult<HeapId> {
        if self.heap.tracker().at_allocation_limit() || self.heap.should_collect() {
            self.run_collection();
        }
        match self.heap.allocate(data) {
            Ok(id) => {
                self.root_in_current_frame(id);
                Ok(id)
            }
            Err(err) => Err(self.raise_resource_error(&err)),
        }
    }

    /// Keeps `id` alive until the current scope ends.
    ///
    /// The singletons are permanent roots and are skipped, as is an id that was
    /// the last one rooted in the same scope.
    pub(crate) fn root_in_current_frame(&mut self, id: HeapId) {
        if self.builtins.is_singleton(id) {
            return;
        }
        if let Some(frame) = self.frames.last_mut()
            && frame.roots.last() != Some(&id)
        {
            frame.roots.push(id);
        }
    }

    /// Roots an id handed out to the caller and returns its handle.
    pub(crate) fn rooted(&mut self, id: HeapId) -> Object {
        self.root_in_current_frame(id);
        self.handle(id)
    }

    // ------------------------------------------------------------------------
    // Frames
    // ------------------------------------------------------------------------

    /// Current call depth; 0 when no call is active.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len() - 1
    }

    /// Pushes a frame after checking the recursion ceiling and active deadlines.
    pub(crate) fn enter_frame(&mut self, frame: Frame) -> RunResult<()> {
        let tracker = self.heap.tracker();
        if let Err(err) = tracker
            .check_recursion_depth(self.depth())
            .and_then(|()| tracker.check_time())
        {
            return Err(self.raise_resource_error(&err));
        }
        let name = frame.name.clone();
        self.frames.push(frame);
        self.tracer.on_call(name.as_deref(), self.depth());
        Ok(())
    }

    /// Pops the current frame, moving a successful result into the caller's scope.
    pub(crate) fn leave_frame(&mut self, result: RunResult<Object>) -> RunResult<HeapId> {
        let result = result.map(|obj| self.id(obj));
        if result.is_err() && self.exception.is_none() {
            programmer_error("a function reported failure without raising an exception");
        }
        self.frames.pop();
        self.tracer.on_return(self.depth());
        if let Ok(id) = result {
            self.root_in_current_frame(id);
        }
        result
    }

    /// Reports the executing code's source position for tracebacks.
    ///
    /// Called by executors as they step through compiled code.
    pub fn set_source_position(&mut self, line: usize, column: usize, line_text: Option<Rc<str>>) {
        if let Some(frame) = self.frames.last_mut() {
            frame.line = Some(line);
            frame.column = Some(column);
            frame.line_text = line_text;
        }
    }

    /// Snapshot of the active frames, most recent first.
    pub(crate) fn current_trace(&self) -> Vec<TraceFrame> {
        self.frames[1..]
            .iter()
            .rev()
            .map(|frame| TraceFrame {
                tag: frame.tag.as_deref().map(str::to_owned),
                line: frame.line,
                column: frame.column,
                function: frame.name.as_deref().map(str::to_owned),
                line_text: frame.line_text.as_deref().map(str::to_owned),
            })
            .collect()
    }

    /// Runs `f` in a nested handle scope.
    ///
    /// Objects allocated inside `f` are released from the current scope when it
    /// returns, except the returned object, which stays rooted. Executors use this to
    /// keep long-running frames from accumulating temporaries.
    pub fn scope(&mut self, f: impl FnOnce(&mut Self) -> RunResult<Object>) -> RunResult<Object> {
        let mark = self.frames.last().map_or(0, |frame| frame.roots.len());
        let result = f(self);
        if let Some(frame) = self.frames.last_mut() {
            frame.roots.truncate(mark);
        }
        if let Ok(obj) = result {
            let id = self.id(obj);
            self.root_in_current_frame(id);
        }
        result
    }

    // ------------------------------------------------------------------------
    // Lifetime
    // ------------------------------------------------------------------------

    /// Pins an object: a positive pin count keeps it alive with no other root.
    pub fn inc_ref(&mut self, obj: Object) {
        let id = self.id(obj);
        self.heap.pin(id);
    }

    /// Releases one pin. Releasing an unpinned object is a programmer error.
    pub fn dec_ref(&mut self, obj: Object) {
        let id = self.id(obj);
        if !self.heap.unpin(id) {
            programmer_error("dec_ref on an object with no pins");
        }
    }

    /// Current pin count of an object.
    #[must_use]
    pub fn ref_count(&self, obj: Object) -> usize {
        self.heap.pins(self.id(obj))
    }

    /// Declares that `parent` holds a reference to `child` that the collector cannot
    /// see, typically one stored in host userdata.
    pub fn link_reference(&mut self, parent: Object, child: Object) {
        let (parent, child) = (self.id(parent), self.id(child));
        self.heap.link(parent, child);
    }

    /// Removes one edge added by [`Context::link_reference`].
    pub fn unlink_reference(&mut self, parent: Object, child: Object) {
        let (parent, child) = (self.id(parent), self.id(child));
        if !self.heap.unlink(parent, child) {
            programmer_error("unlink_reference without a matching link_reference");
        }
    }

    /// Attaches a finalizer, run once when the object is reclaimed or the context
    /// is dropped. Finalizers run in registration order and must not touch the
    /// context.
    pub fn register_finalizer(&mut self, obj: Object, finalizer: impl FnOnce(Option<&dyn Any>) + 'static) {
        let id = self.id(obj);
        let finalizer: Finalizer = Box::new(finalizer);
        self.heap.add_finalizer(id, finalizer);
    }

    /// Attaches host data to an object, replacing any previous data.
    pub fn set_userdata(&mut self, obj: Object, userdata: Rc<dyn Any>) {
        let id = self.id(obj);
        self.heap.set_userdata(id, Some(userdata));
    }

    /// Returns the host data of an object if it has type `T`.
    #[must_use]
    pub fn userdata<T: Any>(&self, obj: Object) -> Option<Rc<T>> {
        let userdata = self.heap.userdata(self.id(obj))?;
        Rc::clone(userdata).downcast::<T>().ok()
    }

    /// Runs a full collection pass.
    ///
    /// Issued from the host scope (no call active) it first releases every object
    /// the host received without pinning. Returns the number of reclaimed objects.
    pub fn collect_garbage(&mut self) -> usize {
        if self.frames.len() == 1 {
            self.frames[0].roots.clear();
        }
        self.run_collection()
    }

    pub(crate) fn run_collection(&mut self) -> usize {
        let mut roots = self.builtins.roots();
        roots.extend(self.modules.roots());
        roots.extend(self.exception);
        for frame in &self.frames {
            roots.extend_from_slice(&frame.roots);
            roots.extend(frame.kwargs);
            roots.extend(frame.function);
        }
        roots.extend_from_slice(&self.repr_stack);
        let freed = self.heap.collect_garbage(roots);
        let live = self.heap.live_count();
        self.tracer.on_collect(freed, live);
        tracing::debug!(freed, live, "collection pass");
        freed
    }

    /// Snapshot of heap occupancy.
    #[must_use]
    pub fn heap_stats(&self) -> HeapStats {
        self.heap.stats()
    }

    /// Live objects allocated after bootstrap, as counted against `max_alloc`.
    #[must_use]
    pub fn allocation_count(&self) -> usize {
        self.heap.tracker().allocation_count().unwrap_or(0)
    }

    // ------------------------------------------------------------------------
    // Timeouts
    // ------------------------------------------------------------------------

    /// Pushes a deadline `milliseconds` from now.
    pub fn set_timeout(&mut self, milliseconds: u64) {
        self.heap
            .tracker_mut()
            .push_deadline(Duration::from_millis(milliseconds));
    }

    /// Pops the most recent deadline, restoring the enclosing one.
    pub fn clear_timeout(&mut self) {
        if !self.heap.tracker_mut().pop_deadline() {
            programmer_error("clear_timeout with no active timeout");
        }
    }

    /// Returns whether any active deadline has elapsed.
    #[must_use]
    pub fn check_timeout(&self) -> bool {
        self.heap.tracker().check_time().is_err()
    }

    /// Raises `TimeoutError` if any active deadline has elapsed.
    ///
    /// Executors call this at bounded intervals of their step loop.
    pub fn poll_timeout(&mut self) -> RunResult<()> {
        match self.heap.tracker().check_time() {
            Ok(()) => Ok(()),
            Err(err) => Err(self.raise_resource_error(&err)),
        }
    }

    // ------------------------------------------------------------------------
    // Output
    // ------------------------------------------------------------------------

    /// Writes raw bytes to the print sink.
    pub fn print(&mut self, bytes: &[u8]) {
        self.print.write_bytes(bytes);
    }

    /// Writes text to the print sink.
    pub fn print_string(&mut self, text: &str) {
        self.print.write_bytes(text.as_bytes());
    }
}
