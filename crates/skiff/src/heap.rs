use std::{any::Any, collections::BTreeMap, fmt, rc::Rc};

use crate::{
    object::ObjectKind,
    resource::{ResourceError, ResourceTracker},
    types::{ClassObject, Dict, Function, Instance, Module, Set, Str},
};

/// Snapshot of heap state at a point in time.
///
/// The `objects_by_type` map uses `BTreeMap` for deterministic iteration order,
/// making snapshots suitable for display and comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapStats {
    /// Total number of live objects on the heap.
    pub live_objects: usize,
    /// Number of free (recycled) slots available for reuse.
    pub free_slots: usize,
    /// Total heap capacity (live + free).
    pub total_slots: usize,
    /// Number of objects with a positive pin count.
    pub pinned_objects: usize,
    /// Breakdown of live objects by kind name.
    pub objects_by_type: BTreeMap<&'static str, usize>,
}

/// Unique identifier for values stored inside the heap arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HeapId(usize);

impl HeapId {
    /// Returns the raw index value.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }

    #[cfg(test)]
    pub(crate) fn from_index(index: usize) -> Self {
        Self(index)
    }
}

/// Callback run when an object is reclaimed. Receives the object's host userdata.
///
/// Finalizers get no access to the context, so they cannot allocate.
pub type Finalizer = Box<dyn FnOnce(Option<&dyn Any>)>;

/// Payload of a heap slot.
#[derive(Debug)]
pub(crate) enum HeapData {
    None,
    Bool(bool),
    Int(i64),
    Float(f32),
    Str(Str),
    Tuple(Vec<HeapId>),
    List(Vec<HeapId>),
    Dict(Dict),
    Set(Set),
    Function(Function),
    Class(ClassObject),
    Instance(Instance),
    Module(Module),
}

impl HeapData {
    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::None => ObjectKind::None,
            Self::Bool(_) => ObjectKind::Bool,
            Self::Int(_) => ObjectKind::Int,
            Self::Float(_) => ObjectKind::Float,
            Self::Str(_) => ObjectKind::Str,
            Self::Tuple(_) => ObjectKind::Tuple,
            Self::List(_) => ObjectKind::List,
            Self::Dict(_) => ObjectKind::Dict,
            Self::Set(_) => ObjectKind::Set,
            Self::Function(_) => ObjectKind::Function,
            Self::Class(_) => ObjectKind::Class,
            Self::Instance(_) => ObjectKind::Instance,
            Self::Module(_) => ObjectKind::Module,
        }
    }

    /// Pushes every heap id this payload refers to.
    fn collect_child_ids(&self, work_list: &mut Vec<HeapId>) {
        match self {
            Self::None | Self::Bool(_) | Self::Int(_) | Self::Float(_) | Self::Str(_) => {}
            Self::Tuple(items) | Self::List(items) => work_list.extend_from_slice(items),
            Self::Dict(dict) => dict.collect_child_ids(work_list),
            Self::Set(set) => set.collect_child_ids(work_list),
            Self::Function(function) => function.collect_child_ids(work_list),
            Self::Class(class) => class.collect_child_ids(work_list),
            Self::Instance(inst) => inst.collect_child_ids(work_list),
            Self::Module(module) => module.collect_child_ids(work_list),
        }
    }
}

/// A live heap slot.
struct HeapValue {
    /// Host-held pins. A positive count keeps the object alive on its own.
    pins: usize,
    data: HeapData,
    userdata: Option<Rc<dyn Any>>,
    /// Run in registration order when the object is reclaimed.
    finalizers: Vec<Finalizer>,
    /// Extra edges declared by the host for references hidden in userdata.
    links: Vec<HeapId>,
    /// Objects allocated before the tracker was armed are not reported on free.
    tracked: bool,
}

impl fmt::Debug for HeapValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeapValue")
            .field("pins", &self.pins)
            .field("data", &self.data)
            .field("has_userdata", &self.userdata.is_some())
            .field("finalizers", &self.finalizers.len())
            .field("links", &self.links)
            .finish()
    }
}

/// Arena of runtime objects reclaimed by mark-and-sweep.
///
/// Uses a free list to reuse slots. Each slot carries a generation counter that is
/// bumped on reuse, so stale handles can be told apart from the object now living
/// in the same slot.
///
/// Structural references between objects are not counted; reachability is decided
/// by tracing from the roots the owner passes to [`Heap::collect_garbage`] plus
/// every pinned object.
#[derive(Debug)]
pub(crate) struct Heap<T: ResourceTracker> {
    entries: Vec<Option<HeapValue>>,
    generations: Vec<u32>,
    /// IDs of freed slots available for reuse.
    free_list: Vec<HeapId>,
    tracker: T,
    live: usize,
    /// Survivors of the previous collection pass, used to schedule the next one.
    live_after_last_pass: usize,
    armed: bool,
}

impl<T: ResourceTracker> Heap<T> {
    pub fn new(capacity: usize, tracker: T) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            generations: Vec::with_capacity(capacity),
            free_list: Vec::new(),
            tracker,
            live: 0,
            live_after_last_pass: 0,
            armed: false,
        }
    }

    pub fn tracker(&self) -> &T {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut T {
        &mut self.tracker
    }

    /// Marks the end of bootstrap. Later allocations are reported as tracked frees.
    pub fn mark_bootstrapped(&mut self) {
        self.armed = true;
        self.live_after_last_pass = self.live;
    }

    /// Number of live objects.
    pub fn live_count(&self) -> usize {
        self.live
    }

    /// Allocates a new heap entry.
    ///
    /// Returns `Err(ResourceError)` if the tracker refuses the allocation.
    pub fn allocate(&mut self, data: HeapData) -> Result<HeapId, ResourceError> {
        self.tracker.on_allocate()?;
        let entry = HeapValue {
            pins: 0,
            data,
            userdata: None,
            finalizers: Vec::new(),
            links: Vec::new(),
            tracked: self.armed,
        };
        self.live += 1;

        let id = if let Some(id) = self.free_list.pop() {
            let index = id.index();
            self.generations[index] = self.generations[index].wrapping_add(1);
            self.entries[index] = Some(entry);
            id
        } else {
            let id = HeapId(self.entries.len());
            self.generations.push(0);
            self.entries.push(Some(entry));
            id
        };
        Ok(id)
    }

    /// Returns whether the tracker wants an automatic collection pass.
    pub fn should_collect(&self) -> bool {
        self.tracker.should_collect(self.live, self.live_after_last_pass)
    }

    /// Returns whether `id` refers to a live object of the given generation.
    pub fn is_live(&self, id: HeapId, generation: u32) -> bool {
        matches!(self.entries.get(id.index()), Some(Some(_))) && self.generations[id.index()] == generation
    }

    pub fn generation(&self, id: HeapId) -> u32 {
        self.generations[id.index()]
    }

    fn entry(&self, id: HeapId) -> &HeapValue {
        self.entries
            .get(id.index())
            .expect("Heap::get: slot missing")
            .as_ref()
            .expect("Heap::get: object already freed")
    }

    fn entry_mut(&mut self, id: HeapId) -> &mut HeapValue {
        self.entries
            .get_mut(id.index())
            .expect("Heap::get_mut: slot missing")
            .as_mut()
            .expect("Heap::get_mut: object already freed")
    }

    /// Returns the data stored at the given ID.
    ///
    /// # Panics
    /// Panics if the ID is invalid or the value has already been freed.
    pub fn get(&self, id: HeapId) -> &HeapData {
        &self.entry(id).data
    }

    /// Returns the data stored at the given ID mutably.
    ///
    /// # Panics
    /// Panics if the ID is invalid or the value has already been freed.
    pub fn get_mut(&mut self, id: HeapId) -> &mut HeapData {
        &mut self.entry_mut(id).data
    }

    /// Increments the host pin count.
    pub fn pin(&mut self, id: HeapId) {
        self.entry_mut(id).pins += 1;
    }

    /// Decrements the host pin count. Returns false if it was already zero.
    pub fn unpin(&mut self, id: HeapId) -> bool {
        let entry = self.entry_mut(id);
        if entry.pins == 0 {
            return false;
        }
        entry.pins -= 1;
        true
    }

    pub fn pins(&self, id: HeapId) -> usize {
        self.entry(id).pins
    }

    pub fn set_userdata(&mut self, id: HeapId, userdata: Option<Rc<dyn Any>>) {
        self.entry_mut(id).userdata = userdata;
    }

    pub fn userdata(&self, id: HeapId) -> Option<&Rc<dyn Any>> {
        self.entry(id).userdata.as_ref()
    }

    pub fn add_finalizer(&mut self, id: HeapId, finalizer: Finalizer) {
        self.entry_mut(id).finalizers.push(finalizer);
    }

    pub fn link(&mut self, parent: HeapId, child: HeapId) {
        self.entry_mut(parent).links.push(child);
    }

    /// Removes one link from `parent` to `child`. Returns false if none existed.
    pub fn unlink(&mut self, parent: HeapId, child: HeapId) -> bool {
        let links = &mut self.entry_mut(parent).links;
        match links.iter().position(|&id| id == child) {
            Some(index) => {
                links.swap_remove(index);
                true
            }
            None => false,
        }
    }

    /// Runs mark-sweep garbage collection.
    ///
    /// Marks everything reachable from `roots` and from pinned objects, then runs the
    /// finalizers of every unreachable object and reclaims its slot. All finalizers of
    /// a pass run before any slot of that pass is reused.
    ///
    /// Returns the number of reclaimed objects.
    pub fn collect_garbage(&mut self, roots: Vec<HeapId>) -> usize {
        // Mark phase: Vec<bool> instead of a set for O(1) operations without hashing
        let mut reachable: Vec<bool> = vec![false; self.entries.len()];
        let mut work_list: Vec<HeapId> = roots;
        for (index, slot) in self.entries.iter().enumerate() {
            if let Some(entry) = slot
                && entry.pins > 0
            {
                work_list.push(HeapId(index));
            }
        }

        while let Some(id) = work_list.pop() {
            let idx = id.index();
            if idx >= reachable.len() || reachable[idx] {
                continue;
            }
            reachable[idx] = true;
            if let Some(Some(entry)) = self.entries.get(idx) {
                entry.data.collect_child_ids(&mut work_list);
                work_list.extend_from_slice(&entry.links);
            }
        }

        // Sweep phase: detach unreachable values, finalize, then free
        let mut doomed = Vec::new();
        for (index, slot) in self.entries.iter_mut().enumerate() {
            if !reachable[index]
                && let Some(value) = slot.take()
            {
                doomed.push((HeapId(index), value));
            }
        }
        let freed = doomed.len();
        for (_, value) in &mut doomed {
            run_finalizers(value);
        }
        for (id, value) in doomed {
            if value.tracked {
                self.tracker.on_free();
            }
            self.live -= 1;
            self.free_list.push(id);
        }

        self.live_after_last_pass = self.live;
        freed
    }

    /// Runs the finalizers of every remaining object, in slot order.
    ///
    /// Used when the owning context is destroyed.
    pub fn finalize_all(&mut self) {
        for slot in &mut self.entries {
            if let Some(value) = slot.as_mut() {
                run_finalizers(value);
            }
        }
    }

    pub fn stats(&self) -> HeapStats {
        let mut objects_by_type = BTreeMap::new();
        let mut pinned_objects = 0;
        for entry in self.entries.iter().flatten() {
            let name: &'static str = entry.data.kind().into();
            *objects_by_type.entry(name).or_insert(0) += 1;
            if entry.pins > 0 {
                pinned_objects += 1;
            }
        }
        HeapStats {
            live_objects: self.live,
            free_slots: self.free_list.len(),
            total_slots: self.entries.len(),
            pinned_objects,
            objects_by_type,
        }
    }
}

impl<T: ResourceTracker> Drop for Heap<T> {
    fn drop(&mut self) {
        self.finalize_all();
    }
}

fn run_finalizers(value: &mut HeapValue) {
    let userdata = value.userdata.clone();
    for finalizer in value.finalizers.drain(..) {
        finalizer(userdata.as_deref());
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::resource::NoLimitTracker;

    fn recording_finalizer(log: &Rc<RefCell<Vec<String>>>, label: &str) -> Finalizer {
        let log = Rc::clone(log);
        let label = label.to_owned();
        Box::new(move |_| log.borrow_mut().push(label))
    }

    /// Two lists holding each other are reclaimed together.
    #[test]
    fn collects_unrooted_cycle() {
        let mut heap = Heap::new(8, NoLimitTracker);
        let a = heap.allocate(HeapData::List(Vec::new())).unwrap();
        let b = heap.allocate(HeapData::List(vec![a])).unwrap();
        if let HeapData::List(items) = heap.get_mut(a) {
            items.push(b);
        }
        let kept = heap.allocate(HeapData::Int(7)).unwrap();

        let freed = heap.collect_garbage(vec![kept]);
        assert_eq!(freed, 2);
        assert_eq!(heap.live_count(), 1);
        assert_eq!(heap.stats().free_slots, 2);
    }

    /// Pins keep objects alive without any root and slot reuse bumps the generation.
    #[test]
    fn pins_root_objects_and_reuse_bumps_generation() {
        let mut heap = Heap::new(4, NoLimitTracker);
        let id = heap.allocate(HeapData::Int(1)).unwrap();
        let generation = heap.generation(id);
        heap.pin(id);
        assert_eq!(heap.collect_garbage(Vec::new()), 0);
        assert!(heap.unpin(id));
        assert!(!heap.unpin(id), "pin count must not go negative");
        assert_eq!(heap.collect_garbage(Vec::new()), 1);
        assert!(!heap.is_live(id, generation));

        let reused = heap.allocate(HeapData::Int(2)).unwrap();
        assert_eq!(reused, id);
        assert!(!heap.is_live(reused, generation));
        assert!(heap.is_live(reused, heap.generation(reused)));
    }

    /// Finalizers run once each, in registration order, and see the userdata.
    #[test]
    fn finalizers_run_in_registration_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut heap = Heap::new(4, NoLimitTracker);
        let id = heap.allocate(HeapData::None).unwrap();
        heap.set_userdata(id, Some(Rc::new(41_i32)));
        heap.add_finalizer(id, recording_finalizer(&log, "first"));
        heap.add_finalizer(id, recording_finalizer(&log, "second"));
        let seen = Rc::new(RefCell::new(None));
        let seen_clone = Rc::clone(&seen);
        heap.add_finalizer(
            id,
            Box::new(move |userdata| {
                *seen_clone.borrow_mut() = userdata.and_then(|u| u.downcast_ref::<i32>()).copied();
            }),
        );

        heap.collect_garbage(Vec::new());
        heap.collect_garbage(Vec::new());
        assert_eq!(*log.borrow(), vec!["first".to_owned(), "second".to_owned()]);
        assert_eq!(*seen.borrow(), Some(41));
    }

    /// Host links behave like structural references during marking.
    #[test]
    fn links_are_traced() {
        let mut heap = Heap::new(4, NoLimitTracker);
        let parent = heap.allocate(HeapData::None).unwrap();
        let child = heap.allocate(HeapData::Int(3)).unwrap();
        heap.link(parent, child);
        assert_eq!(heap.collect_garbage(vec![parent]), 0);
        assert!(heap.unlink(parent, child));
        assert_eq!(heap.collect_garbage(vec![parent]), 1);
    }
}
