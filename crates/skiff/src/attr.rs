use crate::{
    context::Context,
    exception::{RunResult, programmer_error},
    heap::{HeapData, HeapId},
    object::Object,
};

/// Where an attribute lookup succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Found {
    /// In the object's own table: instance attributes, a class's own MRO, a module.
    Own(HeapId),
    /// In the class of the object; methods found here bind to the object.
    Class(HeapId),
}

impl Found {
    pub fn value(self) -> HeapId {
        match self {
            Self::Own(id) | Self::Class(id) => id,
        }
    }
}

impl Context {
    /// Reads an attribute.
    ///
    /// Looks at the object's own table first, then walks the MRO of its class.
    /// Methods found on the class come back bound to `obj`. Raises `AttributeError`
    /// when the name is not found.
    pub fn get_attribute(&mut self, obj: Object, name: &str) -> RunResult<Object> {
        let id = self.id(obj);
        match self.find_attribute(id, name) {
            Some(found) => {
                let value = self.bind_found(id, found)?;
                Ok(self.rooted(value))
            }
            None => Err(self.raise_attribute_error_id(id, name)),
        }
    }

    /// Same lookup as [`Context::get_attribute`] but returns `None` instead of raising.
    ///
    /// If binding a method fails, the failure is discarded and the exception slot is
    /// left as it was before the call.
    pub fn get_attribute_no_except(&mut self, obj: Object, name: &str) -> Option<Object> {
        let id = self.id(obj);
        let found = self.find_attribute(id, name)?;
        let previous = self.exception;
        match self.bind_found(id, found) {
            Ok(value) => Some(self.rooted(value)),
            Err(_) => {
                self.exception = previous;
                None
            }
        }
    }

    /// Reads an attribute skipping the most-derived layer, like `super()`.
    ///
    /// With `base = None` the search starts after the object's class in its MRO;
    /// with a base class the search covers that class's full MRO. Instance
    /// attributes are never consulted.
    pub fn get_attribute_from_base(&mut self, obj: Object, name: &str, base: Option<Object>) -> RunResult<Object> {
        let id = self.id(obj);
        let base = base.map(|base| self.id(base));
        match self.find_from_base(id, name, base) {
            Some(value) => {
                let value = self.bind_found(id, Found::Class(value))?;
                Ok(self.rooted(value))
            }
            None => Err(self.raise_attribute_error_id(id, name)),
        }
    }

    /// Sets an attribute on an instance, class or module.
    ///
    /// Raises `AttributeError` for intrinsic values, which have no attribute table.
    pub fn set_attribute(&mut self, obj: Object, name: &str, value: Object) -> RunResult<()> {
        let (id, value) = (self.id(obj), self.id(value));
        self.set_attribute_id(id, name, value)
    }

    pub(crate) fn set_attribute_id(&mut self, id: HeapId, name: &str, value: HeapId) -> RunResult<()> {
        match self.heap.get_mut(id) {
            HeapData::Instance(inst) => inst.set_attr(name, value),
            HeapData::Class(cls) => cls.set_attr(name, value),
            HeapData::Module(module) => module.set_attr(name, value),
            _ => return Err(self.raise_attribute_error_id(id, name)),
        }
        Ok(())
    }

    /// Returns whether the attribute lookup would succeed. Never raises.
    #[must_use]
    pub fn has_attribute(&self, obj: Object, name: &str) -> bool {
        self.find_attribute(self.id(obj), name).is_some()
    }

    /// Returns the first of `classes` that `obj` is an instance of.
    #[must_use]
    pub fn is_instance(&self, obj: Object, classes: &[Object]) -> Option<Object> {
        let id = self.id(obj);
        classes.iter().copied().find(|&class| {
            let class_id = self.id(class);
            if !matches!(self.heap.get(class_id), HeapData::Class(_)) {
                programmer_error("is_instance expects classes");
            }
            self.is_instance_id(id, class_id)
        })
    }

    // ------------------------------------------------------------------------
    // Lookup internals
    // ------------------------------------------------------------------------

    pub(crate) fn find_attribute(&self, id: HeapId, name: &str) -> Option<Found> {
        match self.heap.get(id) {
            HeapData::Instance(inst) => match inst.attrs().get(name) {
                Some(&value) => Some(Found::Own(value)),
                None => self.find_in_mro(&self.mro_of(inst.class_id()), name).map(Found::Class),
            },
            HeapData::Class(cls) => self.find_in_mro(cls.mro(), name).map(Found::Own),
            HeapData::Module(module) => module.get_attr(name).map(Found::Own),
            data => {
                let class = self.builtins.class_for_kind(data.kind());
                self.find_in_mro(&self.mro_of(class), name).map(Found::Class)
            }
        }
    }

    pub(crate) fn find_in_mro(&self, mro: &[HeapId], name: &str) -> Option<HeapId> {
        mro.iter().find_map(|&class| match self.heap.get(class) {
            HeapData::Class(cls) => cls.get_own(name),
            _ => None,
        })
    }

    /// Class-level lookup used for special methods; instance attributes are skipped.
    pub(crate) fn find_special(&self, id: HeapId, name: &str) -> Option<HeapId> {
        let class = self.class_of_id(id);
        self.find_in_mro(&self.mro_of(class), name)
    }

    pub(crate) fn find_from_base(&self, id: HeapId, name: &str, base: Option<HeapId>) -> Option<HeapId> {
        let mro = match base {
            Some(base) => {
                if !matches!(self.heap.get(base), HeapData::Class(_)) {
                    programmer_error("from-base lookup expects a class as base");
                }
                self.mro_of(base)
            }
            None => self.mro_of(self.class_of_id(id)).split_off(1),
        };
        self.find_in_mro(&mro, name)
    }

    /// Binds unbound methods found on the class to `receiver`.
    ///
    /// Allocates the bound copy, so this can raise `MemoryError`.
    pub(crate) fn bind_found(&mut self, receiver: HeapId, found: Found) -> RunResult<HeapId> {
        let Found::Class(value) = found else {
            return Ok(found.value());
        };
        match self.heap.get(value) {
            HeapData::Function(function) if function.is_method() && function.bound_self().is_none() => {
                let bound = function.bind(receiver);
                self.alloc(HeapData::Function(bound))
            }
            _ => Ok(value),
        }
    }
}

