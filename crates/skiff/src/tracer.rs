//! Runtime event tracing.
//!
//! The [`RuntimeTracer`] trait defines hook points at the events an embedding host
//! usually wants to observe: calls, returns, raises, collection passes and module
//! loads. Concrete implementations collect different kinds of data:
//!
//! | Tracer | Purpose |
//! |--------|---------|
//! | [`NoopTracer`] | No-op (default) |
//! | [`StderrTracer`] | Human-readable event log to stderr |
//! | [`RecordingTracer`] | Full event recording for post-mortem analysis and tests |
//!
//! # Usage
//!
//! ```ignore
//! let tracer = RecordingTracer::new();
//! let ctx = Context::new(Config::default().tracer(tracer.clone()));
//! // ... run ...
//! for event in tracer.events() {
//!     println!("{event:?}");
//! }
//! ```
//!
//! Independently of these hooks, the runtime emits `tracing` debug events, so a
//! host that installs a `tracing` subscriber sees the same milestones.

use std::{cell::RefCell, rc::Rc};

/// Trace event emitted by the runtime.
///
/// Used by [`RecordingTracer`] to capture a full trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    /// A call pushed a new frame.
    Call {
        /// Function name, `None` for module-level code.
        func_name: Option<String>,
        /// Call depth after the push.
        depth: usize,
    },
    /// A frame was popped.
    Return {
        /// Call depth after the pop.
        depth: usize,
    },
    /// An exception was placed in the exception slot.
    Raise {
        /// Class name of the exception.
        exception: String,
        /// Call depth at the raise.
        depth: usize,
    },
    /// A collection pass finished.
    Collect {
        /// Objects reclaimed by the pass.
        freed: usize,
        /// Objects alive after the pass.
        live: usize,
    },
    /// A module finished loading.
    Import {
        /// Module name.
        module: String,
    },
}

/// Trait for runtime tracing.
///
/// All methods have default no-op implementations, so [`NoopTracer`] requires
/// zero lines of code. Implementations only override the hooks they care about.
pub trait RuntimeTracer: std::fmt::Debug {
    /// Called when a new frame is pushed.
    ///
    /// # Arguments
    /// * `func_name` - Function name if available (None for module-level code)
    /// * `depth` - Call depth after the push
    #[inline(always)]
    fn on_call(&mut self, _func_name: Option<&str>, _depth: usize) {}

    /// Called when a frame is popped.
    ///
    /// # Arguments
    /// * `depth` - Call depth after the pop
    #[inline(always)]
    fn on_return(&mut self, _depth: usize) {}

    /// Called when an exception is raised or reraised.
    #[inline(always)]
    fn on_raise(&mut self, _exception: &str, _depth: usize) {}

    /// Called after every collection pass, automatic or explicit.
    #[inline(always)]
    fn on_collect(&mut self, _freed: usize, _live: usize) {}

    /// Called once a module has been loaded and cached.
    #[inline(always)]
    fn on_import(&mut self, _module: &str) {}
}

// ============================================================================
// NoopTracer
// ============================================================================

/// A tracer that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl RuntimeTracer for NoopTracer {}

// ============================================================================
// StderrTracer: human-readable event log
// ============================================================================

/// Tracer that prints a human-readable event log to stderr.
///
/// Output format:
/// ```text
///   >>> CALL fib                  depth=1
///   !!! RAISE ValueError          depth=1
///   <<< RETURN                    depth=0
///   ### GC freed=12 live=340
/// ```
#[derive(Debug, Default)]
pub struct StderrTracer {
    /// Maximum number of lines to print. None = unlimited.
    limit: Option<usize>,
    count: usize,
}

impl StderrTracer {
    /// Creates a new stderr tracer with no line limit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new stderr tracer that stops after `limit` lines.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            count: 0,
        }
    }

    fn emit(&mut self, line: &str) {
        if self.limit.is_some_and(|limit| self.count >= limit) {
            return;
        }
        eprintln!("{line}");
        self.count += 1;
        if let Some(limit) = self.limit
            && self.count == limit
        {
            eprintln!("--- trace limit reached ({limit} lines) ---");
        }
    }
}

impl RuntimeTracer for StderrTracer {
    fn on_call(&mut self, func_name: Option<&str>, depth: usize) {
        let name = func_name.unwrap_or("<module>");
        self.emit(&format!("  >>> CALL {name:<20} depth={depth}"));
    }

    fn on_return(&mut self, depth: usize) {
        self.emit(&format!("  <<< RETURN               depth={depth}"));
    }

    fn on_raise(&mut self, exception: &str, depth: usize) {
        self.emit(&format!("  !!! RAISE {exception:<19} depth={depth}"));
    }

    fn on_collect(&mut self, freed: usize, live: usize) {
        self.emit(&format!("  ### GC freed={freed} live={live}"));
    }

    fn on_import(&mut self, module: &str) {
        self.emit(&format!("  +++ IMPORT {module}"));
    }
}

// ============================================================================
// RecordingTracer: full event recording
// ============================================================================

/// Tracer that records every event.
///
/// Clones share the event log, so the host can keep one clone while the context
/// owns the other.
#[derive(Debug, Clone, Default)]
pub struct RecordingTracer {
    events: Rc<RefCell<Vec<TraceEvent>>>,
}

impl RecordingTracer {
    /// Creates a new recording tracer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.borrow().clone()
    }

    /// Returns the recorded call events' function names, in order.
    #[must_use]
    pub fn call_names(&self) -> Vec<Option<String>> {
        self.events
            .borrow()
            .iter()
            .filter_map(|event| match event {
                TraceEvent::Call { func_name, .. } => Some(func_name.clone()),
                _ => None,
            })
            .collect()
    }

    /// Returns the deepest call depth recorded.
    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.events
            .borrow()
            .iter()
            .filter_map(|event| match event {
                TraceEvent::Call { depth, .. } => Some(*depth),
                _ => None,
            })
            .max()
            .unwrap_or(0)
    }

    fn push(&self, event: TraceEvent) {
        self.events.borrow_mut().push(event);
    }
}

impl RuntimeTracer for RecordingTracer {
    fn on_call(&mut self, func_name: Option<&str>, depth: usize) {
        self.push(TraceEvent::Call {
            func_name: func_name.map(str::to_owned),
            depth,
        });
    }

    fn on_return(&mut self, depth: usize) {
        self.push(TraceEvent::Return { depth });
    }

    fn on_raise(&mut self, exception: &str, depth: usize) {
        self.push(TraceEvent::Raise {
            exception: exception.to_owned(),
            depth,
        });
    }

    fn on_collect(&mut self, freed: usize, live: usize) {
        self.push(TraceEvent::Collect { freed, live });
    }

    fn on_import(&mut self, module: &str) {
        self.push(TraceEvent::Import {
            module: module.to_owned(),
        });
    }
}
