//! Argument helpers for native functions.
//!
//! Positional arguments arrive as a slice; keyword arguments as an optional dict
//! reachable through [`Context::kwargs`]. The checkers raise the standard
//! `TypeError` messages so native functions read like their compiled counterparts.

use crate::{
    context::Context,
    exception::{RunResult, programmer_error},
    heap::{HeapData, HeapId},
    object::Object,
};

impl Context {
    /// Checks that exactly `expected` positional arguments were passed.
    pub fn check_arg_count(&mut self, args: &[Object], expected: usize) -> RunResult<()> {
        if args.len() == expected {
            Ok(())
        } else {
            Err(self.raise_argument_count_error(args.len(), Some(expected)))
        }
    }

    /// Checks that between `min` and `max` positional arguments were passed.
    ///
    /// The error names `max` when too many were given and `min` otherwise.
    pub fn check_arg_range(&mut self, args: &[Object], min: usize, max: usize) -> RunResult<()> {
        match args.len() {
            n if n < min => Err(self.raise_argument_count_error(n, Some(min))),
            n if n > max => Err(self.raise_argument_count_error(n, Some(max))),
            _ => Ok(()),
        }
    }

    /// Checks that exactly one argument was passed, returning it.
    pub fn get_one_arg(&mut self, args: &[Object]) -> RunResult<Object> {
        match args {
            [a] => Ok(*a),
            _ => Err(self.raise_argument_count_error(args.len(), Some(1))),
        }
    }

    /// Checks that exactly two arguments were passed, returning them.
    pub fn get_two_args(&mut self, args: &[Object]) -> RunResult<(Object, Object)> {
        match args {
            [a, b] => Ok((*a, *b)),
            _ => Err(self.raise_argument_count_error(args.len(), Some(2))),
        }
    }

    /// Reads argument `index` as an int; bools are accepted.
    pub fn arg_int(&mut self, args: &[Object], index: usize) -> RunResult<i64> {
        match args.get(index) {
            Some(&arg) if self.is_int(arg) || self.is_bool(arg) => Ok(self.get_int(arg)),
            Some(_) => Err(self.raise_argument_type_error(index, "int")),
            None => Err(self.raise_argument_count_error(args.len(), Some(index + 1))),
        }
    }

    /// Reads argument `index` as a float; ints are converted.
    pub fn arg_float(&mut self, args: &[Object], index: usize) -> RunResult<f32> {
        match args.get(index) {
            Some(&arg) if self.is_int_or_float(arg) || self.is_bool(arg) => Ok(self.get_float(arg)),
            Some(_) => Err(self.raise_argument_type_error(index, "float")),
            None => Err(self.raise_argument_count_error(args.len(), Some(index + 1))),
        }
    }

    /// Reads argument `index` as a string.
    pub fn arg_string(&mut self, args: &[Object], index: usize) -> RunResult<String> {
        match args.get(index) {
            Some(&arg) if self.is_string(arg) => Ok(self.get_string(arg)),
            Some(_) => Err(self.raise_argument_type_error(index, "str")),
            None => Err(self.raise_argument_count_error(args.len(), Some(index + 1))),
        }
    }

    /// Keyword arguments of the call currently executing, if any were passed.
    ///
    /// Calling this outside a function call is a programmer error.
    #[must_use]
    pub fn kwargs(&self) -> Option<Object> {
        if self.frames.len() < 2 {
            programmer_error("kwargs called outside a function call");
        }
        self.frames.last()?.kwargs.map(|id| self.handle(id))
    }

    /// Looks up keyword arguments by name.
    ///
    /// Returns one slot per requested name, `None` where the name was not passed.
    /// An absent dict behaves as an empty one. Only string keys are compared and
    /// the lookup never raises.
    #[must_use]
    pub fn parse_kwargs<const N: usize>(&self, kwargs: Option<Object>, names: [&str; N]) -> [Option<Object>; N] {
        let Some(kwargs) = kwargs else {
            return [None; N];
        };
        let HeapData::Dict(dict) = self.heap.get(self.id(kwargs)) else {
            return [None; N];
        };
        let entries = dict.iter().filter_map(|(key, value)| match self.heap.get(key) {
            HeapData::Str(s) => Some((s.as_bytes(), value)),
            _ => None,
        });
        match_keywords(entries, names).map(|found| found.map(|id| self.handle(id)))
    }
}

/// Assigns each keyword entry to the first requested name equal to its key.
///
/// Later duplicates of a key do not override an earlier match.
fn match_keywords<'a, const N: usize>(
    entries: impl Iterator<Item = (&'a [u8], HeapId)>,
    names: [&str; N],
) -> [Option<HeapId>; N] {
    let mut found = [None; N];
    for (key, value) in entries {
        if let Some(slot) = names.iter().position(|name| name.as_bytes() == key)
            && found[slot].is_none()
        {
            found[slot] = Some(value);
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn id(index: usize) -> HeapId {
        HeapId::from_index(index)
    }

    /// Requested names pick up their values regardless of entry order.
    #[test]
    fn matches_requested_names() {
        let entries = [(b"end".as_slice(), id(1)), (b"sep".as_slice(), id(2))];
        let found = match_keywords(entries.into_iter(), ["sep", "end", "file"]);
        assert_eq!(found, [Some(id(2)), Some(id(1)), None]);
    }

    /// Keys nobody asked for are ignored.
    #[test]
    fn ignores_unrequested_keys() {
        let entries = [(b"flush".as_slice(), id(3))];
        let found = match_keywords(entries.into_iter(), ["sep"]);
        assert_eq!(found, [None]);
    }

    /// An empty request list yields an empty array.
    #[test]
    fn empty_request() {
        let entries = [(b"sep".as_slice(), id(3))];
        let found: [Option<HeapId>; 0] = match_keywords(entries.into_iter(), []);
        assert!(found.is_empty());
    }
}
