//! Operator dispatch: unary and binary opcodes, truthiness, hashing, equality,
//! ordering, indexing and the dict/set primitives built on hashing.
//!
//! Intrinsic values are handled inline. Instances dispatch to the special method
//! named by the opcode, looked up on their class.

use std::{cmp::Ordering, hash::BuildHasher, num::IntErrorKind};

use strum::{Display, EnumIter, IntoStaticStr};

use crate::{
    context::Context,
    exception::{ExcType, RunError, RunResult, programmer_error},
    heap::{HeapData, HeapId},
    iter::Flow,
    object::Object,
    resource::MAX_DATA_RECURSION_DEPTH,
    types::Str,
};

/// Largest element or byte count a repeated sequence may have.
const MAX_REPEAT_LENGTH: usize = 1 << 28;

/// Seed mixed into tuple hashes so `()` does not hash like `0`.
const TUPLE_HASH_SEED: u64 = 0x0034_5678;

/// Unary opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr, EnumIter)]
pub enum UnaryOp {
    Pos,
    Neg,
    BitNot,
    /// Logical negation; never dispatches, uses truthiness.
    Not,
    Hash,
    Len,
    Bool,
    Int,
    Float,
    Str,
    Repr,
    Index,
}

impl UnaryOp {
    /// Special method implementing this opcode on instances.
    #[must_use]
    pub fn dunder(self) -> Option<&'static str> {
        Some(match self {
            Self::Pos => "__pos__",
            Self::Neg => "__neg__",
            Self::BitNot => "__invert__",
            Self::Not => return None,
            Self::Hash => "__hash__",
            Self::Len => "__len__",
            Self::Bool => "__bool__",
            Self::Int => "__int__",
            Self::Float => "__float__",
            Self::Str => "__str__",
            Self::Repr => "__repr__",
            Self::Index => "__index__",
        })
    }

    fn symbol(self) -> &'static str {
        match self {
            Self::Pos => "+",
            Self::Neg => "-",
            Self::BitNot => "~",
            _ => self.into(),
        }
    }
}

/// Binary opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr, EnumIter)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    BitAnd,
    BitOr,
    BitXor,
    /// Short-circuiting `and`; evaluates to one of its operands.
    And,
    /// Short-circuiting `or`; evaluates to one of its operands.
    Or,
    Shl,
    Shr,
    /// `lhs in rhs`, dispatched to `rhs.__contains__(lhs)`.
    In,
    NotIn,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    /// Special method implementing this opcode on instances.
    ///
    /// For `In` and `NotIn` the method is looked up on the right operand.
    #[must_use]
    pub fn dunder(self) -> Option<&'static str> {
        Some(match self {
            Self::Add => "__add__",
            Self::Sub => "__sub__",
            Self::Mul => "__mul__",
            Self::Div => "__truediv__",
            Self::FloorDiv => "__floordiv__",
            Self::Mod => "__mod__",
            Self::Pow => "__pow__",
            Self::BitAnd => "__and__",
            Self::BitOr => "__or__",
            Self::BitXor => "__xor__",
            Self::And | Self::Or => return None,
            Self::Shl => "__lshift__",
            Self::Shr => "__rshift__",
            Self::In | Self::NotIn => "__contains__",
            Self::Eq => "__eq__",
            Self::Ne => "__ne__",
            Self::Lt => "__lt__",
            Self::Le => "__le__",
            Self::Gt => "__gt__",
            Self::Ge => "__ge__",
        })
    }

    /// Operator as written in source.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::FloorDiv => "//",
            Self::Mod => "%",
            Self::Pow => "**",
            Self::BitAnd => "&",
            Self::BitOr => "|",
            Self::BitXor => "^",
            Self::And => "and",
            Self::Or => "or",
            Self::Shl => "<<",
            Self::Shr => ">>",
            Self::In => "in",
            Self::NotIn => "not in",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    /// Comparison to try on the right operand when the left one has no method.
    fn reflected(self) -> Option<Self> {
        match self {
            Self::Lt => Some(Self::Gt),
            Self::Le => Some(Self::Ge),
            Self::Gt => Some(Self::Lt),
            Self::Ge => Some(Self::Le),
            Self::Eq => Some(Self::Eq),
            Self::Ne => Some(Self::Ne),
            _ => None,
        }
    }
}

/// Result type a special method must produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReturnKind {
    Bool,
    Int,
    Float,
    Str,
}

impl ReturnKind {
    fn label(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Str => "string",
        }
    }

    fn accepts(self, data: &HeapData) -> bool {
        match self {
            Self::Bool => matches!(data, HeapData::Bool(_)),
            Self::Int => matches!(data, HeapData::Int(_) | HeapData::Bool(_)),
            Self::Float => matches!(data, HeapData::Float(_)),
            Self::Str => matches!(data, HeapData::Str(_)),
        }
    }
}

// ============================================================================
// Numeric core
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
enum Num {
    Int(i64),
    Float(f32),
}

impl Num {
    fn of(data: &HeapData) -> Option<Self> {
        match data {
            HeapData::Int(value) => Some(Self::Int(*value)),
            HeapData::Bool(value) => Some(Self::Int(i64::from(*value))),
            HeapData::Float(value) => Some(Self::Float(*value)),
            _ => None,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Self::Int(value) => value as f64,
            Self::Float(value) => f64::from(value),
        }
    }

    fn equals(self, other: Self) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a == b,
            _ => self.as_f64() == other.as_f64(),
        }
    }

    fn compare(self, other: Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(&b)),
            _ => self.as_f64().partial_cmp(&other.as_f64()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArithError {
    ZeroDivision,
    Overflow,
    NegativeShift,
    /// The opcode does not apply to these operands.
    Unsupported,
}

fn arith(op: BinaryOp, lhs: Num, rhs: Num) -> Result<Num, ArithError> {
    match (lhs, rhs) {
        (Num::Int(a), Num::Int(b)) => int_arith(op, a, b),
        _ => float_arith(op, lhs.as_f64(), rhs.as_f64()).map(|value| Num::Float(value as f32)),
    }
}

fn int_arith(op: BinaryOp, a: i64, b: i64) -> Result<Num, ArithError> {
    let int = |value: Option<i64>| value.map(Num::Int).ok_or(ArithError::Overflow);
    match op {
        BinaryOp::Add => int(a.checked_add(b)),
        BinaryOp::Sub => int(a.checked_sub(b)),
        BinaryOp::Mul => int(a.checked_mul(b)),
        BinaryOp::Div => {
            if b == 0 {
                return Err(ArithError::ZeroDivision);
            }
            Ok(Num::Float((a as f64 / b as f64) as f32))
        }
        BinaryOp::FloorDiv => {
            if b == 0 {
                return Err(ArithError::ZeroDivision);
            }
            let quotient = a.checked_div(b).ok_or(ArithError::Overflow)?;
            // rounds toward negative infinity, unlike `/` on i64
            let adjust = a % b != 0 && (a < 0) != (b < 0);
            Ok(Num::Int(if adjust { quotient - 1 } else { quotient }))
        }
        BinaryOp::Mod => {
            if b == 0 {
                return Err(ArithError::ZeroDivision);
            }
            // the result takes the sign of the divisor
            let rem = a.wrapping_rem(b);
            Ok(Num::Int(if rem != 0 && (rem < 0) != (b < 0) { rem + b } else { rem }))
        }
        BinaryOp::Pow => int_pow(a, b),
        BinaryOp::BitAnd => Ok(Num::Int(a & b)),
        BinaryOp::BitOr => Ok(Num::Int(a | b)),
        BinaryOp::BitXor => Ok(Num::Int(a ^ b)),
        BinaryOp::Shl => {
            if b < 0 {
                return Err(ArithError::NegativeShift);
            }
            if a == 0 {
                return Ok(Num::Int(0));
            }
            let shift = u32::try_from(b).ok().filter(|&shift| shift < 64).ok_or(ArithError::Overflow)?;
            let shifted = a << shift;
            if shifted >> shift == a {
                Ok(Num::Int(shifted))
            } else {
                Err(ArithError::Overflow)
            }
        }
        BinaryOp::Shr => {
            if b < 0 {
                return Err(ArithError::NegativeShift);
            }
            match u32::try_from(b).ok().filter(|&shift| shift < 64) {
                Some(shift) => Ok(Num::Int(a >> shift)),
                None => Ok(Num::Int(if a < 0 { -1 } else { 0 })),
            }
        }
        _ => Err(ArithError::Unsupported),
    }
}

fn int_pow(base: i64, exp: i64) -> Result<Num, ArithError> {
    if exp < 0 {
        if base == 0 {
            return Err(ArithError::ZeroDivision);
        }
        return Ok(Num::Float((base as f64).powf(exp as f64) as f32));
    }
    match base {
        _ if exp == 0 => Ok(Num::Int(1)),
        0 | 1 => Ok(Num::Int(base)),
        -1 => Ok(Num::Int(if exp % 2 == 0 { 1 } else { -1 })),
        _ => u32::try_from(exp)
            .ok()
            .and_then(|exp| base.checked_pow(exp))
            .map(Num::Int)
            .ok_or(ArithError::Overflow),
    }
}

fn float_arith(op: BinaryOp, a: f64, b: f64) -> Result<f64, ArithError> {
    match op {
        BinaryOp::Add => Ok(a + b),
        BinaryOp::Sub => Ok(a - b),
        BinaryOp::Mul => Ok(a * b),
        BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Mod if b == 0.0 => Err(ArithError::ZeroDivision),
        BinaryOp::Div => Ok(a / b),
        BinaryOp::FloorDiv => Ok((a / b).floor()),
        BinaryOp::Mod => {
            let rem = a % b;
            Ok(if rem != 0.0 && (rem < 0.0) != (b < 0.0) { rem + b } else { rem })
        }
        BinaryOp::Pow if a == 0.0 && b < 0.0 => Err(ArithError::ZeroDivision),
        BinaryOp::Pow => Ok(a.powf(b)),
        _ => Err(ArithError::Unsupported),
    }
}

/// Resolves a possibly negative index against a length.
fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let index = if index < 0 { index + len } else { index };
    if (0..len).contains(&index) { usize::try_from(index).ok() } else { None }
}

fn ordering_matches(op: BinaryOp, ordering: Option<Ordering>) -> bool {
    match op {
        BinaryOp::Lt => ordering == Some(Ordering::Less),
        BinaryOp::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
        BinaryOp::Gt => ordering == Some(Ordering::Greater),
        BinaryOp::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
        _ => false,
    }
}

/// Shortest text that reads back as the same `f32`, in the language's spelling.
pub(crate) fn float_repr(value: f32) -> String {
    if value.is_nan() {
        return "nan".to_owned();
    }
    if value.is_infinite() {
        return if value.is_sign_negative() { "-inf" } else { "inf" }.to_owned();
    }
    let mut buffer = ryu::Buffer::new();
    let text = buffer.format_finite(value);
    match text.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = exp.strip_prefix('-').map_or(("+", exp), |digits| ("-", digits));
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None if text.contains('.') => text.to_owned(),
        None => format!("{text}.0"),
    }
}

/// Units a string is indexed and iterated by: code points for valid UTF-8,
/// single bytes otherwise.
pub(crate) fn str_units(bytes: &[u8]) -> Vec<&[u8]> {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.char_indices().map(|(start, c)| &bytes[start..start + c.len_utf8()]).collect(),
        Err(_) => bytes.chunks(1).collect(),
    }
}

fn str_len(bytes: &[u8]) -> usize {
    std::str::from_utf8(bytes).map_or(bytes.len(), |text| text.chars().count())
}

enum Sequence {
    Bytes(Vec<u8>),
    Tuple(Vec<HeapId>),
    List(Vec<HeapId>),
}

impl Sequence {
    fn of(data: &HeapData) -> Option<Self> {
        match data {
            HeapData::Str(s) => Some(Self::Bytes(s.as_bytes().to_vec())),
            HeapData::Tuple(items) => Some(Self::Tuple(items.clone())),
            HeapData::List(items) => Some(Self::List(items.clone())),
            _ => None,
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Bytes(bytes) => bytes.len(),
            Self::Tuple(items) | Self::List(items) => items.len(),
        }
    }

    fn concat(self, other: Self) -> Option<Self> {
        match (self, other) {
            (Self::Bytes(mut a), Self::Bytes(b)) => {
                a.extend_from_slice(&b);
                Some(Self::Bytes(a))
            }
            (Self::Tuple(mut a), Self::Tuple(b)) => {
                a.extend_from_slice(&b);
                Some(Self::Tuple(a))
            }
            (Self::List(mut a), Self::List(b)) => {
                a.extend_from_slice(&b);
                Some(Self::List(a))
            }
            _ => None,
        }
    }

    fn repeat(self, count: usize) -> Self {
        match self {
            Self::Bytes(bytes) => Self::Bytes(bytes.repeat(count)),
            Self::Tuple(items) => Self::Tuple(items.repeat(count)),
            Self::List(items) => Self::List(items.repeat(count)),
        }
    }

    fn into_data(self) -> HeapData {
        match self {
            Self::Bytes(bytes) => HeapData::Str(Str::new(&bytes)),
            Self::Tuple(items) => HeapData::Tuple(items),
            Self::List(items) => HeapData::List(items),
        }
    }
}

// ============================================================================
// Context operations
// ============================================================================

impl Context {
    /// Applies a unary opcode.
    ///
    /// `Not` and `Bool` use truthiness, `Str`/`Repr`/`Hash`/`Len` return the
    /// corresponding value, `Int`/`Float`/`Index` convert. Instances dispatch to the
    /// opcode's special method.
    pub fn unary_op(&mut self, op: UnaryOp, operand: Object) -> RunResult<Object> {
        let id = self.id(operand);
        let result = self.unary_op_id(op, id)?;
        Ok(self.rooted(result))
    }

    /// Applies a binary opcode to two evaluated operands.
    ///
    /// `And` and `Or` evaluate to one of the operands and never touch the right one
    /// when the left decides the result. Use [`Context::binary_op_lazy`] to avoid
    /// computing the right operand at all.
    pub fn binary_op(&mut self, op: BinaryOp, lhs: Object, rhs: Object) -> RunResult<Object> {
        let (lhs, rhs) = (self.id(lhs), self.id(rhs));
        let result = self.binary_op_id(op, lhs, rhs)?;
        Ok(self.rooted(result))
    }

    /// Applies a binary opcode, producing the right operand only when needed.
    ///
    /// For `And`/`Or`, `rhs` is not called if the left operand's truthiness decides
    /// the result. Every other opcode always calls it.
    pub fn binary_op_lazy(
        &mut self,
        op: BinaryOp,
        lhs: Object,
        rhs: impl FnOnce(&mut Self) -> RunResult<Object>,
    ) -> RunResult<Object> {
        if matches!(op, BinaryOp::And | BinaryOp::Or) {
            let lhs_id = self.id(lhs);
            if self.truthy(lhs_id)? == (op == BinaryOp::Or) {
                return Ok(lhs);
            }
            return rhs(self);
        }
        let rhs = rhs(self)?;
        self.binary_op(op, lhs, rhs)
    }

    /// `container[index]`.
    ///
    /// Sequences take integer indexes, negative ones counting from the end; dicts
    /// look up keys; instances dispatch to `__getitem__`.
    pub fn get_index(&mut self, container: Object, index: Object) -> RunResult<Object> {
        let (container, index) = (self.id(container), self.id(index));
        let result = self.get_index_id(container, index)?;
        Ok(self.rooted(result))
    }

    /// `container[index] = value`.
    ///
    /// Returns `None` for builtin containers and whatever `__setitem__` returned for
    /// instances.
    pub fn set_index(&mut self, container: Object, index: Object, value: Object) -> RunResult<Object> {
        let (container, index, value) = (self.id(container), self.id(index), self.id(value));
        let result = self.set_index_id(container, index, value)?;
        Ok(self.rooted(result))
    }

    // ------------------------------------------------------------------------
    // Unary
    // ------------------------------------------------------------------------

    pub(crate) fn unary_op_id(&mut self, op: UnaryOp, id: HeapId) -> RunResult<HeapId> {
        match op {
            UnaryOp::Not => {
                let truth = self.truthy(id)?;
                Ok(self.builtins.bool_id(!truth))
            }
            UnaryOp::Bool => {
                let truth = self.truthy(id)?;
                Ok(self.builtins.bool_id(truth))
            }
            UnaryOp::Hash => {
                let hash = self.hash_id(id)?;
                self.alloc(HeapData::Int(hash as i64))
            }
            UnaryOp::Len => {
                let len = self.len_of(id)?;
                self.alloc(HeapData::Int(i64::try_from(len).unwrap_or(i64::MAX)))
            }
            UnaryOp::Repr => {
                let text = self.repr_id(id)?;
                self.alloc_str(&text)
            }
            UnaryOp::Str => self.str_id(id),
            UnaryOp::Int => self.int_of(id),
            UnaryOp::Float => self.float_of(id),
            UnaryOp::Index => match self.heap.get(id) {
                HeapData::Int(_) => Ok(id),
                _ => {
                    let value = self.index_value(id)?;
                    self.alloc(HeapData::Int(value))
                }
            },
            UnaryOp::Pos | UnaryOp::Neg | UnaryOp::BitNot => {
                let data = self.heap.get(id);
                let is_float = matches!(data, HeapData::Float(_));
                match (op, Num::of(data)) {
                    (UnaryOp::Pos, Some(_)) if is_float => Ok(id),
                    (UnaryOp::Pos, Some(Num::Int(value))) => self.alloc(HeapData::Int(value)),
                    (UnaryOp::Neg, Some(Num::Int(value))) => match value.checked_neg() {
                        Some(negated) => self.alloc(HeapData::Int(negated)),
                        None => Err(self.raise_overflow()),
                    },
                    (UnaryOp::Neg, Some(Num::Float(value))) => self.alloc(HeapData::Float(-value)),
                    (UnaryOp::BitNot, Some(Num::Int(value))) => self.alloc(HeapData::Int(!value)),
                    _ => self.dispatch_unary(op, id),
                }
            }
        }
    }

    fn dispatch_unary(&mut self, op: UnaryOp, id: HeapId) -> RunResult<HeapId> {
        if let Some(dunder) = op.dunder()
            && let Some(result) = self.call_special(id, dunder, &[])
        {
            return result;
        }
        let message = format!("bad operand type for unary {}: '{}'", op.symbol(), self.class_name_of(id));
        Err(self.raise_exception(ExcType::TypeError, Some(&message)))
    }

    /// Truthiness: `__bool__` (or `__nonzero__`), then `__len__`, then true.
    pub(crate) fn truthy(&mut self, id: HeapId) -> RunResult<bool> {
        Ok(match self.heap.get(id) {
            HeapData::None => false,
            HeapData::Bool(value) => *value,
            HeapData::Int(value) => *value != 0,
            HeapData::Float(value) => *value != 0.0,
            HeapData::Str(s) => !s.is_empty(),
            HeapData::Tuple(items) | HeapData::List(items) => !items.is_empty(),
            HeapData::Dict(dict) => !dict.is_empty(),
            HeapData::Set(set) => !set.is_empty(),
            HeapData::Function(_) | HeapData::Class(_) | HeapData::Module(_) => true,
            HeapData::Instance(_) => {
                for name in ["__bool__", "__nonzero__"] {
                    if let Some(result) = self.call_special(id, name, &[]) {
                        let result = self.expect_return(name, ReturnKind::Bool, result?)?;
                        return Ok(matches!(self.heap.get(result), HeapData::Bool(true)));
                    }
                }
                match self.call_special(id, "__len__", &[]) {
                    Some(result) => {
                        let result = self.expect_return("__len__", ReturnKind::Int, result?)?;
                        !matches!(self.heap.get(result), HeapData::Int(0) | HeapData::Bool(false))
                    }
                    None => true,
                }
            }
        })
    }

    pub(crate) fn len_of(&mut self, id: HeapId) -> RunResult<usize> {
        match self.heap.get(id) {
            HeapData::Str(s) => Ok(str_len(s.as_bytes())),
            HeapData::Tuple(items) | HeapData::List(items) => Ok(items.len()),
            HeapData::Dict(dict) => Ok(dict.len()),
            HeapData::Set(set) => Ok(set.len()),
            _ => {
                if let Some(result) = self.call_special(id, "__len__", &[]) {
                    let result = self.expect_return("__len__", ReturnKind::Int, result?)?;
                    let len = Num::of(self.heap.get(result)).map_or(0, |num| match num {
                        Num::Int(value) => value,
                        Num::Float(_) => 0,
                    });
                    return usize::try_from(len).map_err(|_| {
                        self.raise_exception(ExcType::ValueError, Some("__len__() should return >= 0"))
                    });
                }
                let message = format!("object of type '{}' has no len()", self.class_name_of(id));
                Err(self.raise_exception(ExcType::TypeError, Some(&message)))
            }
        }
    }

    /// `str(obj)`: strings as they are, `__str__` for instances, otherwise `repr`.
    pub(crate) fn str_id(&mut self, id: HeapId) -> RunResult<HeapId> {
        match self.heap.get(id) {
            HeapData::Str(_) => return Ok(id),
            HeapData::Instance(_) => {
                if let Some(result) = self.call_special(id, "__str__", &[]) {
                    return self.expect_return("__str__", ReturnKind::Str, result?);
                }
            }
            _ => {}
        }
        let text = self.repr_id(id)?;
        self.alloc_str(&text)
    }

    fn int_of(&mut self, id: HeapId) -> RunResult<HeapId> {
        let value = match self.heap.get(id) {
            HeapData::Int(_) => return Ok(id),
            HeapData::Bool(value) => i64::from(*value),
            HeapData::Float(value) => {
                let value = *value;
                if value.is_nan() {
                    return Err(self.raise_exception(ExcType::ValueError, Some("cannot convert float NaN to integer")));
                }
                if value.is_infinite() {
                    return Err(self.raise_exception(
                        ExcType::OverflowError,
                        Some("cannot convert float infinity to integer"),
                    ));
                }
                let truncated = value.trunc();
                if !(-9.223_372e18..9.223_372e18).contains(&truncated) {
                    return Err(self.raise_overflow());
                }
                truncated as i64
            }
            HeapData::Str(s) => {
                let parsed = s.to_string_lossy().trim().parse::<i64>();
                match parsed {
                    Ok(value) => value,
                    Err(err) if matches!(err.kind(), IntErrorKind::PosOverflow | IntErrorKind::NegOverflow) => {
                        return Err(self.raise_overflow());
                    }
                    Err(_) => {
                        let message = format!("invalid literal for int() with base 10: {}", s.repr());
                        return Err(self.raise_exception(ExcType::ValueError, Some(&message)));
                    }
                }
            }
            _ => {
                if let Some(result) = self.call_special(id, "__int__", &[]) {
                    return self.expect_return("__int__", ReturnKind::Int, result?);
                }
                let message = format!(
                    "int() argument must be a string or a number, not '{}'",
                    self.class_name_of(id)
                );
                return Err(self.raise_exception(ExcType::TypeError, Some(&message)));
            }
        };
        self.alloc(HeapData::Int(value))
    }

    fn float_of(&mut self, id: HeapId) -> RunResult<HeapId> {
        let value = match self.heap.get(id) {
            HeapData::Float(_) => return Ok(id),
            HeapData::Int(value) => *value as f32,
            HeapData::Bool(value) => f32::from(u8::from(*value)),
            HeapData::Str(s) => {
                let parsed = s.to_string_lossy().trim().parse::<f32>();
                if let Ok(value) = parsed {
                    value
                } else {
                    let message = format!("could not convert string to float: {}", s.repr());
                    return Err(self.raise_exception(ExcType::ValueError, Some(&message)));
                }
            }
            _ => {
                if let Some(result) = self.call_special(id, "__float__", &[]) {
                    return self.expect_return("__float__", ReturnKind::Float, result?);
                }
                let message = format!(
                    "float() argument must be a string or a number, not '{}'",
                    self.class_name_of(id)
                );
                return Err(self.raise_exception(ExcType::TypeError, Some(&message)));
            }
        };
        self.alloc(HeapData::Float(value))
    }

    /// Integer value of an index operand: ints, bools and `__index__`.
    pub(crate) fn index_value(&mut self, id: HeapId) -> RunResult<i64> {
        match self.heap.get(id) {
            HeapData::Int(value) => Ok(*value),
            HeapData::Bool(value) => Ok(i64::from(*value)),
            _ => {
                if let Some(result) = self.call_special(id, "__index__", &[]) {
                    let result = self.expect_return("__index__", ReturnKind::Int, result?)?;
                    if let Some(Num::Int(value)) = Num::of(self.heap.get(result)) {
                        return Ok(value);
                    }
                }
                let message = format!(
                    "'{}' object cannot be interpreted as an integer",
                    self.class_name_of(id)
                );
                Err(self.raise_exception(ExcType::TypeError, Some(&message)))
            }
        }
    }

    // ------------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------------

    /// `repr(obj)` as text.
    pub(crate) fn repr_id(&mut self, id: HeapId) -> RunResult<String> {
        Ok(match self.heap.get(id) {
            HeapData::None => "None".to_owned(),
            HeapData::Bool(value) => if *value { "True" } else { "False" }.to_owned(),
            HeapData::Int(value) => value.to_string(),
            HeapData::Float(value) => float_repr(*value),
            HeapData::Str(s) => s.repr(),
            HeapData::Function(function) => format!("<function {}>", function.name()),
            HeapData::Class(cls) => format!("<class '{}'>", cls.name()),
            HeapData::Module(module) => format!("<module '{}'>", module.name()),
            HeapData::Tuple(_) | HeapData::List(_) | HeapData::Dict(_) | HeapData::Set(_) => {
                return self.repr_container(id);
            }
            HeapData::Instance(_) => return self.repr_instance(id),
        })
    }

    fn repr_container(&mut self, id: HeapId) -> RunResult<String> {
        if self.repr_stack.contains(&id) {
            let cycle = match self.heap.get(id) {
                HeapData::Tuple(_) => "(...)",
                HeapData::List(_) => "[...]",
                _ => "{...}",
            };
            return Ok(cycle.to_owned());
        }
        if self.repr_stack.len() >= MAX_DATA_RECURSION_DEPTH {
            return Err(self.raise_exception(
                ExcType::RecursionError,
                Some("maximum recursion depth exceeded while getting the repr of an object"),
            ));
        }
        self.repr_stack.push(id);
        let result = self.repr_container_items(id);
        self.repr_stack.pop();
        result
    }

    fn repr_container_items(&mut self, id: HeapId) -> RunResult<String> {
        match self.heap.get(id) {
            HeapData::Tuple(items) => {
                let items = items.clone();
                let body = self.join_reprs(&items)?;
                Ok(if items.len() == 1 { format!("({body},)") } else { format!("({body})") })
            }
            HeapData::List(items) => {
                let items = items.clone();
                Ok(format!("[{}]", self.join_reprs(&items)?))
            }
            HeapData::Set(set) if set.is_empty() => Ok("set()".to_owned()),
            HeapData::Set(set) => {
                let items: Vec<HeapId> = set.items().collect();
                Ok(format!("{{{}}}", self.join_reprs(&items)?))
            }
            HeapData::Dict(dict) => {
                let pairs: Vec<(HeapId, HeapId)> = dict.iter().collect();
                let mut out = String::from("{");
                for (index, (key, value)) in pairs.into_iter().enumerate() {
                    if index > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(&self.repr_id(key)?);
                    out.push_str(": ");
                    out.push_str(&self.repr_id(value)?);
                }
                out.push('}');
                Ok(out)
            }
            _ => programmer_error("repr_container on a non-container"),
        }
    }

    fn join_reprs(&mut self, items: &[HeapId]) -> RunResult<String> {
        let mut out = String::new();
        for (index, &item) in items.iter().enumerate() {
            if index > 0 {
                out.push_str(", ");
            }
            out.push_str(&self.repr_id(item)?);
        }
        Ok(out)
    }

    fn repr_instance(&mut self, id: HeapId) -> RunResult<String> {
        if let Some(result) = self.call_special(id, "__repr__", &[]) {
            let result = self.expect_return("__repr__", ReturnKind::Str, result?)?;
            return Ok(self.str_text(result));
        }
        let class_name = self.class_name_of(id);
        if self.is_instance_id(id, self.builtins.exception_class(ExcType::BaseException)) {
            return Ok(match self.exception_message_of(id) {
                Some(message) => format!("{class_name}({})", Str::new(message.as_bytes()).repr()),
                None => format!("{class_name}()"),
            });
        }
        Ok(format!("<{class_name} object>"))
    }

    fn str_text(&self, id: HeapId) -> String {
        match self.heap.get(id) {
            HeapData::Str(s) => s.to_string_lossy().into_owned(),
            _ => programmer_error("str_text on a non-string"),
        }
    }

    pub(crate) fn alloc_str(&mut self, text: &str) -> RunResult<HeapId> {
        self.alloc(HeapData::Str(Str::new(text.as_bytes())))
    }

    // ------------------------------------------------------------------------
    // Hashing and equality
    // ------------------------------------------------------------------------

    /// Hash consistent with [`Context::eq_id`]: equal numbers hash alike across
    /// int, bool and float.
    pub(crate) fn hash_id(&mut self, id: HeapId) -> RunResult<u64> {
        Ok(match self.heap.get(id) {
            HeapData::None => self.hasher.hash_one(()),
            HeapData::Bool(value) => self.hasher.hash_one(i64::from(*value)),
            HeapData::Int(value) => self.hasher.hash_one(*value),
            HeapData::Float(value) => {
                let value = *value;
                if value.fract() == 0.0 && (-9.223_372e18..9.223_372e18).contains(&value) {
                    self.hasher.hash_one(value as i64)
                } else {
                    self.hasher.hash_one(value.to_bits())
                }
            }
            HeapData::Str(s) => self.hasher.hash_one(s.as_bytes()),
            HeapData::Tuple(items) => {
                let items = items.clone();
                let mut hash = TUPLE_HASH_SEED;
                for item in items {
                    let item_hash = self.hash_id(item)?;
                    hash = self.hasher.hash_one((hash, item_hash));
                }
                hash
            }
            HeapData::List(_) | HeapData::Dict(_) | HeapData::Set(_) => {
                let message = format!("unhashable type: '{}'", self.class_name_of(id));
                return Err(self.raise_exception(ExcType::TypeError, Some(&message)));
            }
            HeapData::Function(_) | HeapData::Class(_) | HeapData::Module(_) => self.hasher.hash_one(id),
            HeapData::Instance(_) => match self.call_special(id, "__hash__", &[]) {
                Some(result) => {
                    let result = self.expect_return("__hash__", ReturnKind::Int, result?)?;
                    match Num::of(self.heap.get(result)) {
                        Some(Num::Int(value)) => value as u64,
                        _ => 0,
                    }
                }
                None => self.hasher.hash_one(id),
            },
        })
    }

    /// `lhs == rhs`.
    pub(crate) fn eq_id(&mut self, lhs: HeapId, rhs: HeapId) -> RunResult<bool> {
        self.eq_at_depth(lhs, rhs, 0)
    }

    fn eq_at_depth(&mut self, lhs: HeapId, rhs: HeapId, depth: usize) -> RunResult<bool> {
        if depth > MAX_DATA_RECURSION_DEPTH {
            return Err(self.raise_exception(
                ExcType::RecursionError,
                Some("maximum recursion depth exceeded in comparison"),
            ));
        }
        if let (Some(a), Some(b)) = (Num::of(self.heap.get(lhs)), Num::of(self.heap.get(rhs))) {
            return Ok(a.equals(b));
        }
        let (a, b) = (self.heap.get(lhs), self.heap.get(rhs));
        match (a, b) {
            (HeapData::Str(a), HeapData::Str(b)) => Ok(a.as_bytes() == b.as_bytes()),
            (HeapData::Tuple(a), HeapData::Tuple(b)) | (HeapData::List(a), HeapData::List(b)) => {
                if a.len() != b.len() {
                    return Ok(false);
                }
                let pairs: Vec<(HeapId, HeapId)> = a.iter().copied().zip(b.iter().copied()).collect();
                for (x, y) in pairs {
                    if x != y && !self.eq_at_depth(x, y, depth + 1)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            (HeapData::Dict(a), HeapData::Dict(b)) => {
                if a.len() != b.len() {
                    return Ok(false);
                }
                let pairs: Vec<(HeapId, HeapId)> = a.iter().collect();
                for (key, value) in pairs {
                    let Some(other) = self.dict_get(rhs, key)? else {
                        return Ok(false);
                    };
                    if other != value && !self.eq_at_depth(value, other, depth + 1)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            (HeapData::Set(a), HeapData::Set(b)) => {
                if a.len() != b.len() {
                    return Ok(false);
                }
                let items: Vec<HeapId> = a.items().collect();
                for item in items {
                    if !self.set_contains(rhs, item)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            (HeapData::Instance(_), _) | (_, HeapData::Instance(_)) => {
                match self.compare_special(BinaryOp::Eq, lhs, rhs)? {
                    Some(result) => Ok(result),
                    None => Ok(lhs == rhs),
                }
            }
            _ => Ok(lhs == rhs),
        }
    }

    fn ne_id(&mut self, lhs: HeapId, rhs: HeapId) -> RunResult<bool> {
        if matches!(self.heap.get(lhs), HeapData::Instance(_))
            && let Some(result) = self.compare_special(BinaryOp::Ne, lhs, rhs)?
        {
            return Ok(result);
        }
        Ok(!self.eq_id(lhs, rhs)?)
    }

    /// Calls a comparison method on `lhs`, falling back to the reflected method on
    /// `rhs`. Returns `None` when neither operand defines one.
    fn compare_special(&mut self, op: BinaryOp, lhs: HeapId, rhs: HeapId) -> RunResult<Option<bool>> {
        let Some(dunder) = op.dunder() else {
            return Ok(None);
        };
        let mut attempt = self.call_special(lhs, dunder, &[rhs]).map(|result| (dunder, result));
        if attempt.is_none()
            && let Some(reflected) = op.reflected().and_then(BinaryOp::dunder)
        {
            attempt = self.call_special(rhs, reflected, &[lhs]).map(|result| (reflected, result));
        }
        let Some((name, result)) = attempt else {
            return Ok(None);
        };
        let result = self.expect_return(name, ReturnKind::Bool, result?)?;
        Ok(Some(matches!(self.heap.get(result), HeapData::Bool(true))))
    }

    fn compare_id(&mut self, op: BinaryOp, lhs: HeapId, rhs: HeapId, depth: usize) -> RunResult<bool> {
        if depth > MAX_DATA_RECURSION_DEPTH {
            return Err(self.raise_exception(
                ExcType::RecursionError,
                Some("maximum recursion depth exceeded in comparison"),
            ));
        }
        if let (Some(a), Some(b)) = (Num::of(self.heap.get(lhs)), Num::of(self.heap.get(rhs))) {
            return Ok(ordering_matches(op, a.compare(b)));
        }
        match (self.heap.get(lhs), self.heap.get(rhs)) {
            (HeapData::Str(a), HeapData::Str(b)) => Ok(ordering_matches(op, Some(a.as_bytes().cmp(b.as_bytes())))),
            (HeapData::Tuple(a), HeapData::Tuple(b)) | (HeapData::List(a), HeapData::List(b)) => {
                let (a, b) = (a.clone(), b.clone());
                for (&x, &y) in a.iter().zip(&b) {
                    if x != y && !self.eq_at_depth(x, y, depth + 1)? {
                        return self.compare_id(op, x, y, depth + 1);
                    }
                }
                Ok(ordering_matches(op, Some(a.len().cmp(&b.len()))))
            }
            _ => match self.compare_special(op, lhs, rhs)? {
                Some(result) => Ok(result),
                None => {
                    let message = format!(
                        "'{}' not supported between instances of '{}' and '{}'",
                        op.symbol(),
                        self.class_name_of(lhs),
                        self.class_name_of(rhs)
                    );
                    Err(self.raise_exception(ExcType::TypeError, Some(&message)))
                }
            },
        }
    }

    /// `item in container`.
    pub(crate) fn contains_id(&mut self, container: HeapId, item: HeapId) -> RunResult<bool> {
        match self.heap.get(container) {
            HeapData::Str(haystack) => match self.heap.get(item) {
                HeapData::Str(needle) => {
                    let (haystack, needle) = (haystack.as_bytes(), needle.as_bytes());
                    Ok(needle.is_empty() || haystack.windows(needle.len()).any(|window| window == needle))
                }
                _ => {
                    let message = format!(
                        "'in <string>' requires string as left operand, not {}",
                        self.class_name_of(item)
                    );
                    Err(self.raise_exception(ExcType::TypeError, Some(&message)))
                }
            },
            HeapData::Tuple(items) | HeapData::List(items) => {
                let items = items.clone();
                for candidate in items {
                    if candidate == item || self.eq_id(candidate, item)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            HeapData::Dict(_) => Ok(self.dict_get(container, item)?.is_some()),
            HeapData::Set(_) => self.set_contains(container, item),
            HeapData::Instance(_) => {
                if let Some(result) = self.call_special(container, "__contains__", &[item]) {
                    let result = self.expect_return("__contains__", ReturnKind::Bool, result?)?;
                    return Ok(matches!(self.heap.get(result), HeapData::Bool(true)));
                }
                let mut found = false;
                self.iterate_id(container, &mut |ctx, candidate| {
                    if candidate == item || ctx.eq_id(candidate, item)? {
                        found = true;
                        return Ok(Flow::Stop);
                    }
                    Ok(Flow::Continue)
                })?;
                Ok(found)
            }
            _ => {
                let message = format!("argument of type '{}' is not iterable", self.class_name_of(container));
                Err(self.raise_exception(ExcType::TypeError, Some(&message)))
            }
        }
    }

    // ------------------------------------------------------------------------
    // Binary
    // ------------------------------------------------------------------------

    pub(crate) fn binary_op_id(&mut self, op: BinaryOp, lhs: HeapId, rhs: HeapId) -> RunResult<HeapId> {
        let truth = match op {
            BinaryOp::And | BinaryOp::Or => {
                let decided = self.truthy(lhs)? == (op == BinaryOp::Or);
                return Ok(if decided { lhs } else { rhs });
            }
            BinaryOp::Eq => self.eq_id(lhs, rhs)?,
            BinaryOp::Ne => self.ne_id(lhs, rhs)?,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => self.compare_id(op, lhs, rhs, 0)?,
            BinaryOp::In => self.contains_id(rhs, lhs)?,
            BinaryOp::NotIn => !self.contains_id(rhs, lhs)?,
            _ => return self.arithmetic(op, lhs, rhs),
        };
        Ok(self.builtins.bool_id(truth))
    }

    fn arithmetic(&mut self, op: BinaryOp, lhs: HeapId, rhs: HeapId) -> RunResult<HeapId> {
        let (a, b) = (self.heap.get(lhs), self.heap.get(rhs));
        if let (Some(x), Some(y)) = (Num::of(a), Num::of(b)) {
            let both_bool = matches!((a, b), (HeapData::Bool(_), HeapData::Bool(_)));
            match arith(op, x, y) {
                Ok(Num::Int(value)) if both_bool && matches!(op, BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor) => {
                    return Ok(self.builtins.bool_id(value != 0));
                }
                Ok(Num::Int(value)) => return self.alloc(HeapData::Int(value)),
                Ok(Num::Float(value)) => return self.alloc(HeapData::Float(value)),
                Err(ArithError::ZeroDivision) => return Err(self.raise_zero_division_error()),
                Err(ArithError::Overflow) => return Err(self.raise_overflow()),
                Err(ArithError::NegativeShift) => {
                    return Err(self.raise_exception(ExcType::ValueError, Some("negative shift count")));
                }
                Err(ArithError::Unsupported) => {}
            }
        }
        if let Some(result) = self.sequence_arithmetic(op, lhs, rhs) {
            return result;
        }
        if let Some(dunder) = op.dunder()
            && let Some(result) = self.call_special(lhs, dunder, &[rhs])
        {
            return result;
        }
        let message = format!(
            "unsupported operand type(s) for {}: '{}' and '{}'",
            op.symbol(),
            self.class_name_of(lhs),
            self.class_name_of(rhs)
        );
        Err(self.raise_exception(ExcType::TypeError, Some(&message)))
    }

    fn sequence_arithmetic(&mut self, op: BinaryOp, lhs: HeapId, rhs: HeapId) -> Option<RunResult<HeapId>> {
        let (a, b) = (self.heap.get(lhs), self.heap.get(rhs));
        let result = match op {
            BinaryOp::Add => Sequence::of(a)?.concat(Sequence::of(b)?)?,
            BinaryOp::Mul => {
                let (sequence, count) = match (Sequence::of(a), Sequence::of(b)) {
                    (Some(sequence), None) => (sequence, Num::of(b)),
                    (None, Some(sequence)) => (sequence, Num::of(a)),
                    _ => return None,
                };
                let Some(Num::Int(count)) = count else {
                    return None;
                };
                let count = usize::try_from(count).unwrap_or(0);
                if sequence.len().checked_mul(count).is_none_or(|total| total > MAX_REPEAT_LENGTH) {
                    return Some(Err(self.raise_exception(ExcType::MemoryError, None)));
                }
                sequence.repeat(count)
            }
            _ => return None,
        };
        Some(self.alloc(result.into_data()))
    }

    // ------------------------------------------------------------------------
    // Indexing
    // ------------------------------------------------------------------------

    pub(crate) fn get_index_id(&mut self, container: HeapId, index: HeapId) -> RunResult<HeapId> {
        match self.heap.get(container) {
            HeapData::Tuple(_) | HeapData::List(_) => {
                let position = self.index_value(index)?;
                let item = match self.heap.get(container) {
                    HeapData::Tuple(items) | HeapData::List(items) => {
                        normalize_index(position, items.len()).map(|position| items[position])
                    }
                    _ => None,
                };
                item.ok_or_else(|| self.raise_index_error())
            }
            HeapData::Str(_) => {
                let position = self.index_value(index)?;
                let unit = match self.heap.get(container) {
                    HeapData::Str(s) => {
                        let units = str_units(s.as_bytes());
                        normalize_index(position, units.len()).map(|position| units[position].to_vec())
                    }
                    _ => None,
                };
                match unit {
                    Some(unit) => self.alloc(HeapData::Str(Str::new(&unit))),
                    None => Err(self.raise_index_error()),
                }
            }
            HeapData::Dict(_) => match self.dict_get(container, index)? {
                Some(value) => Ok(value),
                None => {
                    let key = self.handle(index);
                    Err(self.raise_key_error(Some(key)))
                }
            },
            _ => {
                if let Some(result) = self.call_special(container, "__getitem__", &[index]) {
                    return result;
                }
                let message = format!("'{}' object is not subscriptable", self.class_name_of(container));
                Err(self.raise_exception(ExcType::TypeError, Some(&message)))
            }
        }
    }

    pub(crate) fn set_index_id(&mut self, container: HeapId, index: HeapId, value: HeapId) -> RunResult<HeapId> {
        match self.heap.get(container) {
            HeapData::List(_) => {
                let position = self.index_value(index)?;
                if let HeapData::List(items) = self.heap.get_mut(container)
                    && let Some(position) = normalize_index(position, items.len())
                {
                    items[position] = value;
                    return Ok(self.builtins.none);
                }
                Err(self.raise_index_error())
            }
            HeapData::Dict(_) => {
                self.dict_insert(container, index, value)?;
                Ok(self.builtins.none)
            }
            _ => {
                if let Some(result) = self.call_special(container, "__setitem__", &[index, value]) {
                    return result;
                }
                let message = format!(
                    "'{}' object does not support item assignment",
                    self.class_name_of(container)
                );
                Err(self.raise_exception(ExcType::TypeError, Some(&message)))
            }
        }
    }

    // ------------------------------------------------------------------------
    // Dict and set primitives
    // ------------------------------------------------------------------------

    /// Hashes `key` and finds its entry index in a dict or set.
    fn find_entry(&mut self, container: HeapId, key: HeapId) -> RunResult<(u64, Option<usize>)> {
        let hash = self.hash_id(key)?;
        let candidates = match self.heap.get(container) {
            HeapData::Dict(dict) => dict.candidates(hash),
            HeapData::Set(set) => set.candidates(hash),
            _ => programmer_error("find_entry on a non-hashed container"),
        };
        for (index, existing) in candidates {
            if existing == key || self.eq_id(existing, key)? {
                return Ok((hash, Some(index)));
            }
        }
        Ok((hash, None))
    }

    /// Inserts or overwrites `key`. Raises `TypeError` for unhashable keys.
    pub(crate) fn dict_insert(&mut self, dict: HeapId, key: HeapId, value: HeapId) -> RunResult<()> {
        let (hash, found) = self.find_entry(dict, key)?;
        if let HeapData::Dict(entries) = self.heap.get_mut(dict) {
            match found {
                Some(index) => entries.set_value_at(index, value),
                None => entries.push(key, value, hash),
            }
        }
        Ok(())
    }

    pub(crate) fn dict_get(&mut self, dict: HeapId, key: HeapId) -> RunResult<Option<HeapId>> {
        let (_, found) = self.find_entry(dict, key)?;
        Ok(found.and_then(|index| match self.heap.get(dict) {
            HeapData::Dict(entries) => Some(entries.value_at(index)),
            _ => None,
        }))
    }

    pub(crate) fn set_add(&mut self, set: HeapId, item: HeapId) -> RunResult<()> {
        let (hash, found) = self.find_entry(set, item)?;
        if found.is_none()
            && let HeapData::Set(items) = self.heap.get_mut(set)
        {
            items.push(item, hash);
        }
        Ok(())
    }

    pub(crate) fn set_contains(&mut self, set: HeapId, item: HeapId) -> RunResult<bool> {
        Ok(self.find_entry(set, item)?.1.is_some())
    }

    // ------------------------------------------------------------------------
    // Errors
    // ------------------------------------------------------------------------

    fn expect_return(&mut self, method: &str, kind: ReturnKind, result: HeapId) -> RunResult<HeapId> {
        if kind.accepts(self.heap.get(result)) {
            Ok(result)
        } else {
            Err(self.raise_bad_return(method, kind))
        }
    }

    /// Raises `TypeError` for a special method that returned the wrong type.
    pub(crate) fn raise_bad_return(&mut self, method: &str, kind: ReturnKind) -> RunError {
        let message = format!("{method}() returned a non {} type", kind.label());
        self.raise_exception(ExcType::TypeError, Some(&message))
    }

    fn raise_overflow(&mut self) -> RunError {
        self.raise_exception(ExcType::OverflowError, Some("integer overflow"))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    // =========================================================================
    // Integer arithmetic
    // =========================================================================

    /// Floor division rounds toward negative infinity.
    #[test]
    fn floor_division_rounds_down() {
        assert_eq!(int_arith(BinaryOp::FloorDiv, 7, 2), Ok(Num::Int(3)));
        assert_eq!(int_arith(BinaryOp::FloorDiv, -7, 2), Ok(Num::Int(-4)));
        assert_eq!(int_arith(BinaryOp::FloorDiv, 7, -2), Ok(Num::Int(-4)));
        assert_eq!(int_arith(BinaryOp::FloorDiv, -7, -2), Ok(Num::Int(3)));
    }

    /// The remainder takes the divisor's sign.
    #[test]
    fn modulo_follows_divisor_sign() {
        assert_eq!(int_arith(BinaryOp::Mod, -7, 3), Ok(Num::Int(2)));
        assert_eq!(int_arith(BinaryOp::Mod, 7, -3), Ok(Num::Int(-2)));
        assert_eq!(int_arith(BinaryOp::Mod, i64::MIN, -1), Ok(Num::Int(0)));
    }

    /// Division by zero is reported for every dividing opcode.
    #[test]
    fn zero_divisors() {
        for op in [BinaryOp::Div, BinaryOp::FloorDiv, BinaryOp::Mod] {
            assert_eq!(int_arith(op, 1, 0), Err(ArithError::ZeroDivision));
            assert_eq!(float_arith(op, 1.0, 0.0), Err(ArithError::ZeroDivision));
        }
        assert_eq!(int_pow(0, -1), Err(ArithError::ZeroDivision));
    }

    /// Results outside i64 are overflow errors, not wrapped values.
    #[test]
    fn overflow_is_detected() {
        assert_eq!(int_arith(BinaryOp::Add, i64::MAX, 1), Err(ArithError::Overflow));
        assert_eq!(int_arith(BinaryOp::FloorDiv, i64::MIN, -1), Err(ArithError::Overflow));
        assert_eq!(int_pow(2, 63), Err(ArithError::Overflow));
        assert_eq!(int_arith(BinaryOp::Shl, 1, 63), Err(ArithError::Overflow));
        assert_eq!(int_arith(BinaryOp::Shl, 1, 62), Ok(Num::Int(1 << 62)));
    }

    /// Powers with trivial bases never overflow, negative exponents go to float.
    #[test]
    fn powers() {
        assert_eq!(int_pow(1, i64::MAX), Ok(Num::Int(1)));
        assert_eq!(int_pow(-1, 7), Ok(Num::Int(-1)));
        assert_eq!(int_pow(0, 0), Ok(Num::Int(1)));
        assert_eq!(int_pow(2, -1), Ok(Num::Float(0.5)));
    }

    /// Shifts reject negative counts; large right shifts saturate.
    #[test]
    fn shifts() {
        assert_eq!(int_arith(BinaryOp::Shl, 1, -1), Err(ArithError::NegativeShift));
        assert_eq!(int_arith(BinaryOp::Shr, -8, 100), Ok(Num::Int(-1)));
        assert_eq!(int_arith(BinaryOp::Shr, 8, 100), Ok(Num::Int(0)));
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Negative indexes count from the end; anything outside is rejected.
    #[test]
    fn index_normalization() {
        assert_eq!(normalize_index(0, 3), Some(0));
        assert_eq!(normalize_index(-1, 3), Some(2));
        assert_eq!(normalize_index(3, 3), None);
        assert_eq!(normalize_index(-4, 3), None);
        assert_eq!(normalize_index(0, 0), None);
    }

    /// Floats always show a decimal point or an exponent.
    #[test]
    fn float_rendering() {
        assert_eq!(float_repr(2.0), "2.0");
        assert_eq!(float_repr(1.5), "1.5");
        assert_eq!(float_repr(f32::INFINITY), "inf");
        assert_eq!(float_repr(f32::NAN), "nan");
    }

    /// Valid UTF-8 splits into code points, invalid bytes into single bytes.
    #[test]
    fn string_units() {
        assert_eq!(str_units("aé".as_bytes()), vec![b"a".as_slice(), "é".as_bytes()]);
        assert_eq!(str_units(&[0xff, b'a']), vec![[0xffu8].as_slice(), b"a".as_slice()]);
        assert_eq!(str_len("aé".as_bytes()), 2);
    }

    /// Boolean-valued slots name the type they expected.
    #[test]
    fn return_kind_labels() {
        assert_eq!(ReturnKind::Bool.label(), "bool");
        assert_eq!(ReturnKind::Str.label(), "string");
        assert!(ReturnKind::Int.accepts(&HeapData::Bool(true)));
        assert!(!ReturnKind::Float.accepts(&HeapData::Int(1)));
    }
}
