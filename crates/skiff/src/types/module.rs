use std::rc::Rc;

use super::AttrTable;
use crate::heap::HeapId;

/// A module namespace.
#[derive(Debug)]
pub(crate) struct Module {
    name: Rc<str>,
    attrs: AttrTable,
}

impl Module {
    pub fn new(name: &str) -> Self {
        Self {
            name: Rc::from(name),
            attrs: AttrTable::default(),
        }
    }

    pub fn name(&self) -> &Rc<str> {
        &self.name
    }

    pub fn attrs(&self) -> &AttrTable {
        &self.attrs
    }

    pub fn set_attr(&mut self, name: &str, value: HeapId) {
        self.attrs.insert(name.to_owned(), value);
    }

    pub fn get_attr(&self, name: &str) -> Option<HeapId> {
        self.attrs.get(name).copied()
    }

    /// Names not starting with an underscore, with their values, in definition order.
    pub fn public_attrs(&self) -> Vec<(String, HeapId)> {
        self.attrs
            .iter()
            .filter(|(name, _)| !name.starts_with('_'))
            .map(|(name, &value)| (name.clone(), value))
            .collect()
    }

    pub fn collect_child_ids(&self, work_list: &mut Vec<HeapId>) {
        work_list.extend(self.attrs.values().copied());
    }
}
