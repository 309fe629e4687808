//! A line-oriented toy compiler for exercising the compiler seam.
//!
//! Module bodies are lines of `name = atom`, where an atom is an integer literal
//! or a global name. The line `fail` raises `RuntimeError`. Expressions are a
//! single atom.

use std::{cell::Cell, rc::Rc};

use skiff::{CodeObject, CompileError, CompileMode, Compiler, Context, ExcType, Object, RunResult};

#[derive(Debug, Clone, Default)]
pub struct TinyCompiler {
    compiled: Rc<Cell<usize>>,
}

impl TinyCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sources compiled so far, shared across clones.
    pub fn compiled(&self) -> usize {
        self.compiled.get()
    }
}

impl Compiler for TinyCompiler {
    fn compile(
        &mut self,
        source: &str,
        _display_name: &str,
        mode: CompileMode,
    ) -> Result<Rc<dyn CodeObject>, CompileError> {
        self.compiled.set(self.compiled.get() + 1);
        match mode {
            CompileMode::Module => {
                let mut statements = Vec::new();
                for (index, line) in source.lines().enumerate() {
                    let text = line.trim();
                    if text.is_empty() {
                        continue;
                    }
                    statements.push(Statement::parse(text, index + 1).ok_or_else(|| syntax_error(line, index + 1))?);
                }
                Ok(Rc::new(ModuleCode { statements }))
            }
            CompileMode::Expression => {
                let atom = Atom::parse(source.trim()).ok_or_else(|| syntax_error(source, 1))?;
                Ok(Rc::new(ExpressionCode { atom }))
            }
        }
    }
}

fn syntax_error(line: &str, number: usize) -> CompileError {
    CompileError {
        message: "invalid syntax".to_owned(),
        line: Some(number),
        column: Some(line.trim_end().len()),
        line_text: Some(line.to_owned()),
    }
}

#[derive(Debug)]
enum Atom {
    Int(i64),
    Name(String),
}

impl Atom {
    fn parse(text: &str) -> Option<Self> {
        if let Ok(value) = text.parse() {
            return Some(Self::Int(value));
        }
        let mut chars = text.chars();
        let first = chars.next()?;
        let is_name = (first.is_alphabetic() || first == '_') && chars.all(|c| c.is_alphanumeric() || c == '_');
        is_name.then(|| Self::Name(text.to_owned()))
    }

    fn eval(&self, ctx: &mut Context) -> RunResult<Object> {
        match self {
            Self::Int(value) => ctx.create_int(*value),
            Self::Name(name) => match ctx.get_global(name) {
                Some(value) => Ok(value),
                None => Err(ctx.raise_name_error(name)),
            },
        }
    }
}

#[derive(Debug)]
enum Statement {
    Assign { line: usize, name: String, value: Atom },
    Fail { line: usize },
}

impl Statement {
    fn parse(text: &str, line: usize) -> Option<Self> {
        if text == "fail" {
            return Some(Self::Fail { line });
        }
        let (name, value) = text.split_once('=')?;
        let Atom::Name(name) = Atom::parse(name.trim())? else {
            return None;
        };
        Some(Self::Assign {
            line,
            name,
            value: Atom::parse(value.trim())?,
        })
    }
}

#[derive(Debug)]
struct ModuleCode {
    statements: Vec<Statement>,
}

impl CodeObject for ModuleCode {
    fn execute(&self, ctx: &mut Context, _args: &[Object]) -> RunResult<Object> {
        for statement in &self.statements {
            ctx.poll_timeout()?;
            match statement {
                Statement::Assign { line, name, value } => {
                    ctx.set_source_position(*line, 0, None);
                    let value = value.eval(ctx)?;
                    ctx.set_global(name, value);
                }
                Statement::Fail { line } => {
                    ctx.set_source_position(*line, 0, Some("fail".into()));
                    return Err(ctx.raise_exception(ExcType::RuntimeError, Some("module body failed")));
                }
            }
        }
        Ok(ctx.none())
    }
}

#[derive(Debug)]
struct ExpressionCode {
    atom: Atom,
}

impl CodeObject for ExpressionCode {
    fn execute(&self, ctx: &mut Context, _args: &[Object]) -> RunResult<Object> {
        ctx.set_source_position(1, 0, None);
        self.atom.eval(ctx)
    }
}
