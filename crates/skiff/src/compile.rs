//! Seam to the external compiler.
//!
//! The runtime does not parse source. A host installs a [`Compiler`] that turns
//! source text into [`CodeObject`]s; the context wraps those in function objects
//! and runs them through the ordinary call protocol.

use std::{fmt, rc::Rc};

use crate::{
    context::Context,
    exception::{ExcType, RunError, RunResult, TraceFrame},
    heap::HeapData,
    object::Object,
    types::{CodeObject, Function, FunctionKind},
};

/// What the source is expected to contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileMode {
    /// A sequence of statements, run for effect.
    Module,
    /// A single expression whose value is the result.
    Expression,
}

/// Failure reported by a [`Compiler`]; raised as `SyntaxError`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompileError {
    pub message: String,
    /// 1-based line of the offending token.
    pub line: Option<usize>,
    /// 0-based column of the offending token.
    pub column: Option<usize>,
    pub line_text: Option<String>,
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "line {line}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for CompileError {}

/// Turns source text into executable code.
pub trait Compiler: fmt::Debug {
    /// Compiles `source`.
    ///
    /// # Arguments
    /// * `display_name` - Name shown as the traceback tag of the compiled code
    /// * `mode` - Whether the source is a module body or a single expression
    ///
    /// # Errors
    /// Returns a [`CompileError`] describing the first syntax error.
    fn compile(&mut self, source: &str, display_name: &str, mode: CompileMode)
    -> Result<Rc<dyn CodeObject>, CompileError>;
}

impl Context {
    /// Compiles a module body into a function object taking no arguments.
    ///
    /// Calling the function runs the statements against the active module.
    pub fn compile(&mut self, source: &str, display_name: &str) -> RunResult<Object> {
        self.compile_with_mode(source, display_name, CompileMode::Module)
    }

    /// Compiles a single expression into a function object returning its value.
    pub fn compile_expression(&mut self, source: &str, display_name: &str) -> RunResult<Object> {
        self.compile_with_mode(source, display_name, CompileMode::Expression)
    }

    /// Compiles and runs a module body against the active module, `__main__` at top level.
    pub fn execute(&mut self, source: &str, display_name: &str) -> RunResult<()> {
        let code = self.compile(source, display_name)?;
        self.call(code, &[], None)?;
        Ok(())
    }

    /// Compiles and evaluates a single expression.
    pub fn execute_expression(&mut self, source: &str, display_name: &str) -> RunResult<Object> {
        let code = self.compile_expression(source, display_name)?;
        self.call(code, &[], None)
    }

    fn compile_with_mode(&mut self, source: &str, display_name: &str, mode: CompileMode) -> RunResult<Object> {
        let Some(compiler) = self.compiler.as_mut() else {
            return Err(self.raise_exception(ExcType::NotImplementedError, Some("no compiler is installed")));
        };
        match compiler.compile(source, display_name, mode) {
            Ok(code) => self.new_code_function(display_name, code, Some(display_name), true),
            Err(err) => Err(self.raise_compile_error(&err, display_name)),
        }
    }

    /// Wraps a code object in a function.
    ///
    /// `module_code` marks a module or expression body, which has no function name
    /// in tracebacks.
    pub fn new_code_function(
        &mut self,
        name: &str,
        code: Rc<dyn CodeObject>,
        tag: Option<&str>,
        module_code: bool,
    ) -> RunResult<Object> {
        let mut function = Function::new(name, FunctionKind::Compiled(code), None).with_tag(tag.map(Rc::from));
        if module_code {
            function = function.into_module_code();
        }
        let id = self.alloc(HeapData::Function(function))?;
        Ok(self.handle(id))
    }

    /// Raises `SyntaxError` with a leading traceback frame pointing at the error.
    pub(crate) fn raise_compile_error(&mut self, err: &CompileError, display_name: &str) -> RunError {
        let raised = self.raise_exception(ExcType::SyntaxError, Some(&err.message));
        if let Some(exc_id) = self.exception
            && let HeapData::Instance(inst) = self.heap.get_mut(exc_id)
        {
            let mut frames = vec![TraceFrame {
                tag: Some(display_name.to_owned()),
                line: err.line,
                column: err.column,
                function: None,
                line_text: err.line_text.clone(),
            }];
            if let Some(existing) = inst.traceback() {
                frames.extend(existing.iter().cloned());
            }
            inst.set_traceback(Rc::from(frames));
        }
        raised
    }
}
