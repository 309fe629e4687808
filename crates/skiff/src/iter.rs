//! Iteration protocol.
//!
//! Builtin containers are walked directly; instances go through `__iter__` and
//! `__next__`, with `StopIteration` marking exhaustion. Lists are read by index on
//! every step so appends made by the callback are visited; tuples, dicts and sets
//! are snapshotted first.

use crate::{
    context::Context,
    exception::{ExcType, RunResult},
    heap::{HeapData, HeapId},
    object::Object,
    ops::str_units,
    types::Str,
};

/// Whether an internal iteration should keep going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Stop,
}

type Step<'a> = &'a mut dyn FnMut(&mut Context, HeapId) -> RunResult<Flow>;

impl Context {
    /// Runs `callback` once per value produced by iterating `obj`.
    ///
    /// Stops at the first failure, whether raised by the iterable or returned by the
    /// callback, and propagates it.
    pub fn iterate(&mut self, obj: Object, mut callback: impl FnMut(&mut Self, Object) -> RunResult<()>) -> RunResult<()> {
        let id = self.id(obj);
        self.iterate_id(id, &mut |ctx, item| {
            let item = ctx.rooted(item);
            callback(ctx, item)?;
            Ok(Flow::Continue)
        })
    }

    /// Iterates `obj` expecting exactly `count` values.
    ///
    /// Raises `ValueError` when the iterable produces fewer or more values. The
    /// iterable is not advanced past the first surplus value.
    pub fn unpack(&mut self, obj: Object, count: usize) -> RunResult<Vec<Object>> {
        let id = self.id(obj);
        let items = self.unpack_id(id, count)?;
        Ok(items.into_iter().map(|item| self.rooted(item)).collect())
    }

    pub(crate) fn unpack_id(&mut self, id: HeapId, count: usize) -> RunResult<Vec<HeapId>> {
        let mut items = Vec::with_capacity(count);
        self.iterate_id(id, &mut |ctx, item| {
            if items.len() == count {
                let message = format!("too many values to unpack (expected {count})");
                return Err(ctx.raise_exception(ExcType::ValueError, Some(&message)));
            }
            items.push(item);
            Ok(Flow::Continue)
        })?;
        if items.len() < count {
            let message = format!("not enough values to unpack (expected {count}, got {})", items.len());
            return Err(self.raise_exception(ExcType::ValueError, Some(&message)));
        }
        Ok(items)
    }

    /// Every value an iterable produces, in order.
    pub(crate) fn collect_iterable(&mut self, id: HeapId) -> RunResult<Vec<HeapId>> {
        let mut items = Vec::new();
        self.iterate_id(id, &mut |_, item| {
            items.push(item);
            Ok(Flow::Continue)
        })?;
        Ok(items)
    }

    pub(crate) fn iterate_id(&mut self, id: HeapId, step: Step<'_>) -> RunResult<()> {
        let snapshot: Vec<HeapId> = match self.heap.get(id) {
            HeapData::List(_) => return self.iterate_list(id, step),
            HeapData::Str(s) => {
                let units: Vec<Vec<u8>> = str_units(s.as_bytes()).into_iter().map(<[u8]>::to_vec).collect();
                for unit in units {
                    let item = self.alloc(HeapData::Str(Str::new(&unit)))?;
                    if step(self, item)? == Flow::Stop {
                        break;
                    }
                }
                return Ok(());
            }
            HeapData::Tuple(items) => items.clone(),
            HeapData::Dict(dict) => dict.keys().collect(),
            HeapData::Set(set) => set.items().collect(),
            HeapData::Instance(_) => return self.iterate_instance(id, step),
            _ => return Err(self.raise_not_iterable(id)),
        };
        for item in snapshot {
            if step(self, item)? == Flow::Stop {
                break;
            }
        }
        Ok(())
    }

    fn iterate_list(&mut self, id: HeapId, step: Step<'_>) -> RunResult<()> {
        let mut index = 0;
        loop {
            let item = match self.heap.get(id) {
                HeapData::List(items) => items.get(index).copied(),
                _ => None,
            };
            let Some(item) = item else {
                return Ok(());
            };
            if step(self, item)? == Flow::Stop {
                return Ok(());
            }
            index += 1;
        }
    }

    fn iterate_instance(&mut self, id: HeapId, step: Step<'_>) -> RunResult<()> {
        let Some(iterator) = self.call_special(id, "__iter__", &[]) else {
            return Err(self.raise_not_iterable(id));
        };
        let iterator = iterator?;
        if self.find_special(iterator, "__next__").is_none() {
            if matches!(self.heap.get(iterator), HeapData::Instance(_)) {
                let message = format!("iter() returned non-iterator of type '{}'", self.class_name_of(iterator));
                return Err(self.raise_exception(ExcType::TypeError, Some(&message)));
            }
            return self.iterate_id(iterator, step);
        }
        loop {
            let Some(next) = self.call_special(iterator, "__next__", &[]) else {
                return Ok(());
            };
            let item = match next {
                Ok(item) => item,
                Err(_) if self.exception_matches(ExcType::StopIteration) => {
                    self.clear_exception();
                    return Ok(());
                }
                Err(err) => return Err(err),
            };
            if step(self, item)? == Flow::Stop {
                return Ok(());
            }
        }
    }

    fn raise_not_iterable(&mut self, id: HeapId) -> crate::exception::RunError {
        let message = format!("'{}' object is not iterable", self.class_name_of(id));
        self.raise_exception(ExcType::TypeError, Some(&message))
    }
}
