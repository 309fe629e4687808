use std::{borrow::Cow, fmt::Write};

/// Immutable byte string.
///
/// The buffer always ends with a NUL terminator that is not part of the value, so
/// the bytes can be handed to C-style consumers while the explicit length keeps
/// embedded NUL bytes representable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct Str {
    bytes: Box<[u8]>,
}

impl Str {
    pub fn new(value: &[u8]) -> Self {
        let mut bytes = Vec::with_capacity(value.len() + 1);
        bytes.extend_from_slice(value);
        bytes.push(0);
        Self {
            bytes: bytes.into_boxed_slice(),
        }
    }

    /// The value, without the terminator.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.bytes.len() - 1]
    }

    /// The value followed by its NUL terminator.
    pub fn as_bytes_with_nul(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.as_bytes())
    }

    /// Quoted form: single quotes unless the text contains a single quote and no
    /// double quote. Control bytes are escaped.
    pub fn repr(&self) -> String {
        let text = self.to_string_lossy();
        let quote = if text.contains('\'') && !text.contains('"') { '"' } else { '\'' };
        let mut out = String::with_capacity(text.len() + 2);
        out.push(quote);
        for c in text.chars() {
            match c {
                '\\' => out.push_str("\\\\"),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                c if c == quote => {
                    out.push('\\');
                    out.push(c);
                }
                c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                    let _ = write!(out, "\\x{:02x}", c as u32);
                }
                c => out.push(c),
            }
        }
        out.push(quote);
        out
    }
}
