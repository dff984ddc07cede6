use std::{
    cell::{Cell, RefCell},
    fmt,
};

use smallvec::SmallVec;

use crate::{
    context::ExecContext,
    exception_private::RunResult,
    frame::Frame,
    py_hash::hash_str,
    storage::map::MapStorage,
    types::Str,
    value::Value,
};

/// Number of `(key, shape)` combinations the slot cache remembers before
/// lookups fall back to scanning.
const SLOT_CACHE_LIMIT: usize = 3;

/// A cached string-key lookup.
///
/// The key is held so that its buffer address, which identifies it, cannot
/// be reused by another string while the entry exists.
#[derive(Debug, Clone)]
struct CachedSlot {
    key: Str,
    shape: usize,
    slot: Option<usize>,
}

/// A mapping view over the named bindings of a [`Frame`].
///
/// The view aliases the frame: stores through the frame are visible through
/// every view over it. Only user-visible slots that are currently bound are
/// entries, and cells are read through.
pub struct LocalsStorage {
    frame: Frame,
    /// Number of visible entries, computed on first use.
    len: Cell<Option<usize>>,
    cache: RefCell<SmallVec<[CachedSlot; SLOT_CACHE_LIMIT]>>,
}

impl LocalsStorage {
    #[must_use]
    pub fn new(frame: Frame) -> Self {
        Self {
            frame,
            len: Cell::new(None),
            cache: RefCell::new(SmallVec::new()),
        }
    }

    #[must_use]
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Value of slot `index` if it is a visible, bound entry.
    fn visible_value(&self, index: usize) -> Option<Value> {
        let descriptor = self.frame.descriptor();
        descriptor.slot(index)?.user_name()?;
        self.frame.load(index)
    }

    /// Number of visible entries.
    ///
    /// The count is computed once per view; a fresh view (see
    /// [`LocalsStorage::copy`]) recounts.
    #[must_use]
    pub fn len(&self) -> usize {
        if let Some(len) = self.len.get() {
            return len;
        }
        let len = (0..self.frame.descriptor().len())
            .filter(|&index| self.visible_value(index).is_some())
            .count();
        self.len.set(Some(len));
        len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Looks up a string key by identity through the slot cache, falling
    /// back to a scan of the slot names.
    pub fn get_str(&self, ctx: &mut ExecContext, key: &Str) -> Option<Value> {
        let (slot, cache_hit) = self.find_slot(key);
        ctx.tracer_mut().on_locals_lookup(cache_hit);
        slot.and_then(|index| self.frame.load(index))
    }

    fn find_slot(&self, key: &Str) -> (Option<usize>, bool) {
        let shape = self.frame.descriptor().shape_id();
        if let Some(cached) = self
            .cache
            .borrow()
            .iter()
            .find(|cached| cached.key.ptr_eq(key) && cached.shape == shape)
        {
            return (cached.slot, true);
        }
        let slot = self.frame.descriptor().find_user_slot(key.as_str());
        let mut cache = self.cache.borrow_mut();
        if cache.len() < SLOT_CACHE_LIMIT {
            cache.push(CachedSlot {
                key: key.clone(),
                shape,
                slot,
            });
        }
        (slot, false)
    }

    /// Looks up a key of any type.
    ///
    /// String keys take the slot-name path. Other keys are hashed (unless
    /// `hash` is given) and compared against every visible slot name whose
    /// hash matches, using the key's `__eq__` under `ctx`.
    pub fn get_item(&self, ctx: &mut ExecContext, key: &Value, hash: Option<u64>) -> RunResult<Option<Value>> {
        if let Value::Str(name) = key {
            return Ok(self.get_str(ctx, name));
        }
        let hash = match hash {
            Some(hash) => hash,
            None => key.py_hash(ctx)?,
        };
        let descriptor = self.frame.descriptor();
        for (index, slot) in descriptor.slots().iter().enumerate() {
            let Some(name) = slot.user_name() else {
                continue;
            };
            if hash_str(name) != hash {
                continue;
            }
            if key.py_eq(ctx, &Value::Str(name.clone()))? {
                return Ok(self.frame.load(index));
            }
        }
        Ok(None)
    }

    /// Visits visible entries in slot order.
    pub fn for_each<A>(&self, init: A, mut f: impl FnMut(A, &Value, &Value) -> RunResult<A>) -> RunResult<A> {
        let descriptor = self.frame.descriptor();
        let mut acc = init;
        for (index, slot) in descriptor.slots().iter().enumerate() {
            let Some(name) = slot.user_name() else {
                continue;
            };
            // the slot borrow is released before the visitor runs
            let Some(value) = self.frame.load(index) else {
                continue;
            };
            acc = f(acc, &Value::Str(name.clone()), &value)?;
        }
        Ok(acc)
    }

    /// Keys of the visible entries.
    #[must_use]
    pub(crate) fn keys(&self) -> LocalsKeys {
        LocalsKeys {
            frame: self.frame.clone(),
            front: 0,
            back: self.frame.descriptor().len(),
        }
    }

    /// A new view over the same frame, with its own length count and cache.
    #[must_use]
    pub fn copy(&self) -> Self {
        Self::new(self.frame.clone())
    }

    /// Snapshot of the visible bindings as an independent map.
    #[must_use]
    pub fn to_map_storage(&self) -> MapStorage {
        let mut map = MapStorage::with_capacity(self.frame.descriptor().len());
        let descriptor = self.frame.descriptor();
        for (index, slot) in descriptor.slots().iter().enumerate() {
            if let Some(name) = slot.user_name()
                && let Some(value) = self.frame.load(index)
            {
                map.set_str(name.clone(), value);
            }
        }
        map
    }
}

impl fmt::Debug for LocalsStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalsStorage")
            .field("frame", &self.frame)
            .field("len", &self.len.get())
            .field("cached", &self.cache.borrow().len())
            .finish()
    }
}

/// Double-ended iterator over the keys of a locals view.
///
/// Holds its own reference to the frame and reads each slot when it is
/// reached, so bindings made during iteration may be observed.
#[derive(Debug, Clone)]
pub(crate) struct LocalsKeys {
    frame: Frame,
    front: usize,
    back: usize,
}

impl LocalsKeys {
    fn key_at(&self, index: usize) -> Option<Value> {
        let name = self.frame.descriptor().slot(index)?.user_name()?.clone();
        self.frame.load(index).map(|_| Value::Str(name))
    }
}

impl Iterator for LocalsKeys {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        while self.front < self.back {
            let index = self.front;
            self.front += 1;
            if let Some(key) = self.key_at(index) {
                return Some(key);
            }
        }
        None
    }
}

impl DoubleEndedIterator for LocalsKeys {
    fn next_back(&mut self) -> Option<Value> {
        while self.front < self.back {
            self.back -= 1;
            if let Some(key) = self.key_at(self.back) {
                return Some(key);
            }
        }
        None
    }
}
