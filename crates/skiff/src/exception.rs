use std::{
    fmt::{self, Write},
    rc::Rc,
    sync::{Arc, Mutex},
};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{
    context::Context,
    heap::{HeapData, HeapId},
    object::Object,
    resource::ResourceError,
};

/// Result type alias for operations that can raise into the exception slot.
pub type RunResult<T> = Result<T, RunError>;

/// Marker returned when an operation fails.
///
/// Only the raise path can construct one, so holding a `RunError` means the
/// context's exception slot is populated. Inspect it through
/// [`Context::exception`] and [`Context::error_message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct RunError(());

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an exception was raised; see Context::error_message")
    }
}

impl std::error::Error for RunError {}

/// Builtin exception kinds.
///
/// Each variant is backed by a class object created when the context boots, so
/// scripts can subclass them and `except` clauses match through the MRO.
/// Uses strum derives for `Display`, `FromStr` and `Into<&'static str>`; the string
/// form is the class name.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, EnumIter, Serialize, Deserialize,
)]
pub enum ExcType {
    BaseException,
    SystemExit,
    /// Raised when a deadline elapses. Derives directly from `BaseException` so
    /// `except Exception` cannot swallow it.
    TimeoutError,
    Exception,
    StopIteration,
    ArithmeticError,
    OverflowError,
    ZeroDivisionError,
    AttributeError,
    ImportError,
    LookupError,
    IndexError,
    KeyError,
    MemoryError,
    NameError,
    OSError,
    IsADirectoryError,
    RuntimeError,
    NotImplementedError,
    RecursionError,
    SyntaxError,
    TypeError,
    ValueError,
}

impl ExcType {
    /// Direct base kind, `None` for `BaseException`.
    ///
    /// Variants are declared so that every parent precedes its children.
    #[must_use]
    pub fn parent(self) -> Option<Self> {
        match self {
            Self::BaseException => None,
            Self::SystemExit | Self::TimeoutError | Self::Exception => Some(Self::BaseException),
            Self::OverflowError | Self::ZeroDivisionError => Some(Self::ArithmeticError),
            Self::IndexError | Self::KeyError => Some(Self::LookupError),
            Self::IsADirectoryError => Some(Self::OSError),
            Self::NotImplementedError | Self::RecursionError => Some(Self::RuntimeError),
            Self::StopIteration
            | Self::ArithmeticError
            | Self::AttributeError
            | Self::ImportError
            | Self::LookupError
            | Self::MemoryError
            | Self::NameError
            | Self::OSError
            | Self::RuntimeError
            | Self::SyntaxError
            | Self::TypeError
            | Self::ValueError => Some(Self::Exception),
        }
    }

    /// Checks if this exception kind is a subclass of another kind.
    ///
    /// Returns true if `self` would be caught by `except handler_type:`.
    #[must_use]
    pub fn is_subclass_of(self, handler_type: Self) -> bool {
        let mut current = Some(self);
        while let Some(kind) = current {
            if kind == handler_type {
                return true;
            }
            current = kind.parent();
        }
        false
    }
}

/// One entry of a traceback.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TraceFrame {
    /// Module or display name the code came from.
    pub tag: Option<String>,
    /// 1-based source line.
    pub line: Option<usize>,
    /// 0-based column used for the caret marker.
    pub column: Option<usize>,
    /// Function name, `None` at module level.
    pub function: Option<String>,
    /// Source text of the line.
    pub line_text: Option<String>,
}

impl TraceFrame {
    fn write_to(&self, out: &mut String) {
        out.push_str("  ");
        let mut parts = Vec::with_capacity(3);
        if let Some(tag) = &self.tag {
            parts.push(format!("Tag {tag}"));
        }
        if let Some(line) = self.line {
            parts.push(format!("Line {line}"));
        }
        if let Some(function) = &self.function {
            parts.push(format!("Function {function}()"));
        }
        out.push_str(&parts.join(", "));
        out.push('\n');

        if let Some(text) = &self.line_text {
            let text = text.replace('\t', " ");
            let skip = text.len() - text.trim_start_matches(' ').len();
            let _ = writeln!(out, "    {}", &text[skip..]);
            if let Some(column) = self.column
                && skip <= column
            {
                let _ = writeln!(out, "{}^", " ".repeat(column + 4 - skip));
            }
        }
    }
}

// ============================================================================
// Programmer-error channel
// ============================================================================

type ErrorCallback = Arc<dyn Fn(&str) + Send + Sync>;

static ERROR_CALLBACK: Mutex<Option<ErrorCallback>> = Mutex::new(None);

/// Installs the process-wide callback for programmer errors.
///
/// Programmer errors are contract violations by the embedding host (stale handles,
/// unbalanced `dec_ref`, calling native-only accessors outside a native call). They
/// are not language exceptions. With no callback installed the process aborts;
/// with one installed the callback runs and the offending call then panics.
pub fn set_error_callback(callback: Option<Box<dyn Fn(&str) + Send + Sync>>) {
    let mut slot = ERROR_CALLBACK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    *slot = callback.map(Arc::from);
}

/// Reports a programmer error and never returns.
#[cold]
pub(crate) fn programmer_error(message: &str) -> ! {
    let callback = ERROR_CALLBACK
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .clone();
    tracing::error!(message, "programmer error");
    match callback {
        Some(callback) => {
            callback(message);
            panic!("programmer error: {message}");
        }
        None => std::process::abort(),
    }
}

// ============================================================================
// Raising
// ============================================================================

impl Context {
    /// Returns the pending exception, if any.
    ///
    /// The slot keeps the exception alive; once it is cleared or replaced the
    /// exception moves into the current scope, so the handle stays usable.
    #[must_use]
    pub fn exception(&self) -> Option<Object> {
        self.exception.map(|id| self.handle(id))
    }

    /// Empties the exception slot.
    pub fn clear_exception(&mut self) {
        if let Some(previous) = self.exception.take() {
            self.root_in_current_frame(previous);
        }
    }

    /// Formats the pending exception with its traceback, or `"Ok"` when none is pending.
    #[must_use]
    pub fn error_message(&self) -> String {
        let Some(exc_id) = self.exception else {
            return "Ok".to_owned();
        };
        let mut out = String::from("Traceback (most recent call first):\n");
        if let HeapData::Instance(inst) = self.heap.get(exc_id)
            && let Some(trace) = inst.traceback()
        {
            for frame in trace.iter() {
                frame.write_to(&mut out);
            }
        }
        out.push_str(&self.class_name_of(exc_id));
        if let Some(message) = self.exception_message_of(exc_id) {
            out.push_str(": ");
            out.push_str(&message);
        }
        out.push('\n');
        out
    }

    /// Returns the `_message` attribute of an exception instance as text.
    pub(crate) fn exception_message_of(&self, exc_id: HeapId) -> Option<String> {
        let HeapData::Instance(inst) = self.heap.get(exc_id) else {
            return None;
        };
        let message_id = inst.attrs().get("_message").copied()?;
        match self.heap.get(message_id) {
            HeapData::Str(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        }
    }

    /// Returns whether the pending exception is an instance of the given kind.
    #[must_use]
    pub fn exception_matches(&self, kind: ExcType) -> bool {
        match self.exception {
            Some(id) => self.is_instance_id(id, self.builtins.exception_class(kind)),
            None => false,
        }
    }

    /// Raises a builtin exception kind with an optional message.
    pub fn raise_exception(&mut self, kind: ExcType, message: Option<&str>) -> RunError {
        let class_id = self.builtins.exception_class(kind);
        self.raise_with_class_id(class_id, message)
    }

    /// Instantiates `class` with the message and raises the result.
    ///
    /// Raises `TypeError` if `class` is not an exception class.
    pub fn raise_exception_class(&mut self, class: Object, message: Option<&str>) -> RunError {
        let class_id = self.id(class);
        self.raise_with_class_id(class_id, message)
    }

    fn raise_with_class_id(&mut self, class_id: HeapId, message: Option<&str>) -> RunError {
        // builtin kinds are built directly so raising never re-enters the
        // recursion and deadline checks of a regular call
        if self.builtins.is_exception_kind_class(class_id) {
            return match self.new_exception_instance(class_id, message) {
                Ok(id) => self.raise_id(id, true),
                Err(err) => err,
            };
        }
        let args = match message {
            Some(message) => match self.create_string(message) {
                Ok(msg) => vec![msg],
                Err(err) => return err,
            },
            None => Vec::new(),
        };
        let class = self.handle(class_id);
        match self.call(class, &args, None) {
            Ok(exc) => self.raise_exception_object(exc),
            Err(err) => err,
        }
    }

    /// Raises an existing exception instance with a fresh traceback.
    ///
    /// Raises `TypeError` instead when the object does not derive from `BaseException`.
    pub fn raise_exception_object(&mut self, exception: Object) -> RunError {
        let id = self.id(exception);
        self.raise_id(id, true)
    }

    /// Raises an existing exception instance, keeping the traceback it was first raised with.
    pub fn reraise_exception_object(&mut self, exception: Object) -> RunError {
        let id = self.id(exception);
        self.raise_id(id, false)
    }

    fn raise_id(&mut self, id: HeapId, fresh: bool) -> RunError {
        let base = self.builtins.exception_class(ExcType::BaseException);
        if !self.is_instance_id(id, base) {
            return self.raise_exception(ExcType::TypeError, Some("exceptions must derive from BaseException"));
        }
        let trace = self.current_trace();
        if let HeapData::Instance(inst) = self.heap.get_mut(id)
            && (fresh || inst.traceback().is_none())
        {
            inst.set_traceback(Rc::from(trace));
        }
        let class_name = self.class_name_of(id);
        self.tracer.on_raise(&class_name, self.depth());
        tracing::debug!(exception = %class_name, depth = self.depth(), "exception raised");
        if let Some(previous) = self.exception.replace(id) {
            self.root_in_current_frame(previous);
        }
        RunError(())
    }

    /// Raises the exception mapped from a resource error.
    ///
    /// Allocation failures raise the preallocated `MemoryError` instance since no
    /// further allocation can be relied on.
    pub(crate) fn raise_resource_error(&mut self, err: &ResourceError) -> RunError {
        if let ResourceError::Allocation { limit, .. } = err {
            tracing::debug!(limit, "allocation ceiling reached");
            let memory_error = self.builtins.memory_error;
            return self.raise_id(memory_error, true);
        }
        self.raise_exception(err.exc_type(), Some(&err.message()))
    }

    /// Raises `TypeError` for a wrong number of arguments.
    ///
    /// With `expected = None` the message states that the function does not take
    /// `given` arguments at all.
    pub fn raise_argument_count_error(&mut self, given: usize, expected: Option<usize>) -> RunError {
        let message = match expected {
            Some(expected) => format!(
                "Function takes {expected} argument(s) but {given} {}",
                if given == 1 { "was given" } else { "were given" }
            ),
            None => format!("function does not take {given} argument(s)"),
        };
        self.raise_exception(ExcType::TypeError, Some(&message))
    }

    /// Raises `TypeError` for an argument of the wrong type. `index` is 0-based.
    pub fn raise_argument_type_error(&mut self, index: usize, expected: &str) -> RunError {
        let message = format!("Argument {} Expected type {expected}", index + 1);
        self.raise_exception(ExcType::TypeError, Some(&message))
    }

    /// Raises `AttributeError` for a missing attribute of `obj`.
    pub fn raise_attribute_error(&mut self, obj: Object, attribute: &str) -> RunError {
        let id = self.id(obj);
        self.raise_attribute_error_id(id, attribute)
    }

    pub(crate) fn raise_attribute_error_id(&mut self, id: HeapId, attribute: &str) -> RunError {
        let message = format!("'{}' object has no attribute '{attribute}'", self.class_name_of(id));
        self.raise_exception(ExcType::AttributeError, Some(&message))
    }

    /// Raises `ZeroDivisionError: division by zero`.
    pub fn raise_zero_division_error(&mut self) -> RunError {
        self.raise_exception(ExcType::ZeroDivisionError, Some("division by zero"))
    }

    /// Raises `IndexError: index out of range`.
    pub fn raise_index_error(&mut self) -> RunError {
        self.raise_exception(ExcType::IndexError, Some("index out of range"))
    }

    /// Raises `KeyError` whose message is the key's repr.
    pub fn raise_key_error(&mut self, key: Option<Object>) -> RunError {
        let Some(key) = key else {
            return self.raise_exception(ExcType::KeyError, None);
        };
        let key_id = self.id(key);
        match self.repr_id(key_id) {
            Ok(text) => self.raise_exception(ExcType::KeyError, Some(&text)),
            Err(err) => err,
        }
    }

    /// Raises `NameError` for an undefined name.
    pub fn raise_name_error(&mut self, name: &str) -> RunError {
        let message = format!("The name '{name}' is not defined");
        self.raise_exception(ExcType::NameError, Some(&message))
    }
}
