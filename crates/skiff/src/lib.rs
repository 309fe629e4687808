#![doc = include_str!("../../../README.md")]
#![expect(clippy::cast_possible_truncation, reason = "float narrowing to f32 is the storage format")]
#![expect(clippy::cast_sign_loss, reason = "sign-changing casts are range checked")]
#![expect(clippy::cast_possible_wrap, reason = "hash values wrap into i64 on purpose")]
#![expect(clippy::float_cmp, reason = "operator semantics require exact float comparison")]
// first so the handle type is visible to every other module
mod heap;

mod args;
mod attr;
mod builtins;
mod call;
mod compile;
mod config;
mod context;
mod exception;
mod io;
mod iter;
mod modules;
mod object;
mod ops;
mod resource;
pub mod tracer;
mod types;
mod values;

pub use crate::{
    compile::{CompileError, CompileMode, Compiler},
    config::Config,
    context::Context,
    exception::{ExcType, RunError, RunResult, TraceFrame, set_error_callback},
    heap::{Finalizer, HeapStats},
    io::{CallbackPrint, CollectStringPrint, NoPrint, PrintWriter, StdPrint},
    modules::ModuleLoader,
    object::{ContextId, Object, ObjectKind},
    ops::{BinaryOp, UnaryOp},
    resource::{
        DEFAULT_GC_RUN_FACTOR, DEFAULT_MAX_ALLOCATIONS, DEFAULT_MAX_RECURSION_DEPTH, LimitedTracker,
        MAX_DATA_RECURSION_DEPTH, MAX_INHERITANCE_DEPTH, MAX_MRO_LENGTH, NoLimitTracker, ResourceError,
        ResourceLimits, ResourceTracker,
    },
    tracer::{NoopTracer, RecordingTracer, RuntimeTracer, StderrTracer, TraceEvent},
    types::{CodeObject, NativeFn},
};
