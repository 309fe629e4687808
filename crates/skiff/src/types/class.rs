use std::rc::Rc;

use super::AttrTable;
use crate::{
    exception::{ExcType, TraceFrame},
    heap::{Heap, HeapData, HeapId},
    resource::{MAX_INHERITANCE_DEPTH, MAX_MRO_LENGTH, ResourceTracker},
};

/// A class: name, namespace, direct bases and precomputed MRO.
///
/// The MRO starts with the class itself, so attribute lookup is a walk over
/// `mro()` and "from-base" lookup walks `mro()[1..]`.
#[derive(Debug)]
pub(crate) struct ClassObject {
    name: Rc<str>,
    namespace: AttrTable,
    bases: Vec<HeapId>,
    mro: Vec<HeapId>,
    /// Set for the builtin exception classes.
    exc_kind: Option<ExcType>,
}

impl ClassObject {
    pub fn new(name: &str, bases: Vec<HeapId>) -> Self {
        Self {
            name: Rc::from(name),
            namespace: AttrTable::default(),
            bases,
            mro: Vec::new(),
            exc_kind: None,
        }
    }

    #[must_use]
    pub fn with_exc_kind(mut self, kind: ExcType) -> Self {
        self.exc_kind = Some(kind);
        self
    }

    pub fn name(&self) -> &Rc<str> {
        &self.name
    }

    pub fn bases(&self) -> &[HeapId] {
        &self.bases
    }

    pub fn mro(&self) -> &[HeapId] {
        &self.mro
    }

    pub fn set_mro(&mut self, mro: Vec<HeapId>) {
        self.mro = mro;
    }

    pub fn exc_kind(&self) -> Option<ExcType> {
        self.exc_kind
    }

    pub fn namespace(&self) -> &AttrTable {
        &self.namespace
    }

    pub fn get_own(&self, name: &str) -> Option<HeapId> {
        self.namespace.get(name).copied()
    }

    pub fn set_attr(&mut self, name: &str, value: HeapId) {
        self.namespace.insert(name.to_owned(), value);
    }

    pub fn collect_child_ids(&self, work_list: &mut Vec<HeapId>) {
        work_list.extend(self.namespace.values().copied());
        work_list.extend_from_slice(&self.bases);
        work_list.extend_from_slice(&self.mro);
    }
}

/// Instance of a user-defined or exception class.
#[derive(Debug)]
pub(crate) struct Instance {
    class_id: HeapId,
    attrs: AttrTable,
    /// Traceback captured when the instance was first raised.
    traceback: Option<Rc<[TraceFrame]>>,
}

impl Instance {
    pub fn new(class_id: HeapId) -> Self {
        Self {
            class_id,
            attrs: AttrTable::default(),
            traceback: None,
        }
    }

    pub fn class_id(&self) -> HeapId {
        self.class_id
    }

    pub fn attrs(&self) -> &AttrTable {
        &self.attrs
    }

    pub fn set_attr(&mut self, name: &str, value: HeapId) {
        self.attrs.insert(name.to_owned(), value);
    }

    pub fn traceback(&self) -> Option<&Rc<[TraceFrame]>> {
        self.traceback.as_ref()
    }

    pub fn set_traceback(&mut self, traceback: Rc<[TraceFrame]>) {
        self.traceback = Some(traceback);
    }

    pub fn collect_child_ids(&self, work_list: &mut Vec<HeapId>) {
        work_list.push(self.class_id);
        work_list.extend(self.attrs.values().copied());
    }
}

// ============================================================================
// Method resolution order
// ============================================================================

/// Computes the method resolution order of a class with the given bases.
///
/// The order is a depth-first, left-to-right walk: the class itself, then the
/// full order of each base in declaration order. A class reached again through a
/// later base keeps its first position, so first-match lookup over the result
/// finds the same attribute as walking the bases recursively.
///
/// # Arguments
/// * `self_id` - HeapId of the class being defined
/// * `bases` - Direct base class HeapIds
/// * `heap` - Heap to look up base class MROs
/// * `object_id` - The root class appended when no bases are given
///
/// # Returns
/// The full MRO starting with `self_id`, or the message of the `TypeError` to raise
/// if a base is not a class or the hierarchy is too large.
pub(crate) fn compute_mro(
    self_id: HeapId,
    bases: &[HeapId],
    heap: &Heap<impl ResourceTracker>,
    object_id: HeapId,
) -> Result<Vec<HeapId>, String> {
    if bases.is_empty() {
        return Ok(vec![self_id, object_id]);
    }
    if bases.contains(&self_id) {
        return Err("a class cannot inherit from itself".to_owned());
    }

    let mut result = vec![self_id];
    for &base_id in bases {
        let HeapData::Class(cls) = heap.get(base_id) else {
            return Err("bases must be classes".to_owned());
        };
        if cls.mro().len() > MAX_INHERITANCE_DEPTH {
            return Err(format!(
                "inheritance chain too deep (maximum depth {MAX_INHERITANCE_DEPTH})"
            ));
        }
        for &class in cls.mro() {
            if !result.contains(&class) {
                result.push(class);
            }
        }
        if result.len() > MAX_MRO_LENGTH {
            return Err("MRO exceeds maximum length".to_owned());
        }
    }
    Ok(result)
}
