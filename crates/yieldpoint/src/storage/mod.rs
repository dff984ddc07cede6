//! Backing storage for dictionaries.
//!
//! A [`HashingStorage`] is either an ordinary hash map or a view over the
//! named slots of a frame, as produced by `locals()`. The view answers reads
//! straight from the frame. The first write turns it into an independent
//! map holding a snapshot of the visible bindings, so a write never reaches
//! the frame.

mod locals;
mod map;

use std::{fmt, slice};

use indexmap::IndexMap;

pub use self::{locals::LocalsStorage, map::MapStorage};
use self::{locals::LocalsKeys, map::MapEntry};
use crate::{context::ExecContext, exception_private::RunResult, types::Str, value::Value};

/// Storage behind a dictionary.
#[derive(Debug)]
pub enum HashingStorage {
    Map(MapStorage),
    Locals(LocalsStorage),
}

impl Default for HashingStorage {
    fn default() -> Self {
        Self::Map(MapStorage::new())
    }
}

impl HashingStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Map storage filled from a string-keyed ordered map.
    #[must_use]
    pub fn from_str_map(source: IndexMap<String, Value>) -> Self {
        Self::Map(MapStorage::from_str_map(source))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Map(map) => map.len(),
            Self::Locals(locals) => locals.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn is_locals(&self) -> bool {
        matches!(self, Self::Locals(_))
    }

    /// Looks up `key`.
    ///
    /// `hash`, when given, must be the key's Python hash; it saves
    /// recomputing it.
    pub fn get_item(&self, ctx: &mut ExecContext, key: &Value, hash: Option<u64>) -> RunResult<Option<Value>> {
        match self {
            Self::Map(map) => map.get(ctx, key, hash),
            Self::Locals(locals) => locals.get_item(ctx, key, hash),
        }
    }

    /// Looks up a string key.
    pub fn get_str(&self, ctx: &mut ExecContext, key: &Str) -> RunResult<Option<Value>> {
        match self {
            Self::Map(map) => map.get(ctx, &Value::Str(key.clone()), Some(key.py_hash())),
            Self::Locals(locals) => Ok(locals.get_str(ctx, key)),
        }
    }

    /// Inserts or replaces `key`, returning the previous value.
    ///
    /// A locals view is first converted to map storage; the frame is not
    /// modified.
    pub fn set_item(&mut self, ctx: &mut ExecContext, key: Value, value: Value) -> RunResult<Option<Value>> {
        self.make_map().set(ctx, key, value)
    }

    /// Removes `key`, returning its value.
    pub fn pop(&mut self, ctx: &mut ExecContext, key: &Value) -> RunResult<Option<Value>> {
        if let Self::Locals(locals) = self
            && locals.get_item(ctx, key, None)?.is_none()
        {
            // nothing to remove, the view stays live
            return Ok(None);
        }
        Ok(self.make_map().remove(ctx, key)?.map(|(_, value)| value))
    }

    /// Removes every entry. A locals view becomes an empty map.
    pub fn clear(&mut self) {
        match self {
            Self::Map(map) => map.clear(),
            Self::Locals(_) => *self = Self::default(),
        }
    }

    /// Whether a key whose hash or equality can run user code was stored.
    #[must_use]
    pub fn has_side_effect(&self) -> bool {
        match self {
            Self::Map(map) => map.has_side_effect(),
            // slot names are strings
            Self::Locals(_) => false,
        }
    }

    pub fn set_side_effecting_keys(&mut self) {
        self.make_map().set_side_effecting_keys();
    }

    /// Folds over `(key, value)` entries in order.
    pub fn for_each<A>(&self, init: A, f: impl FnMut(A, &Value, &Value) -> RunResult<A>) -> RunResult<A> {
        match self {
            Self::Map(map) => map.for_each(init, f),
            Self::Locals(locals) => locals.for_each(init, f),
        }
    }

    /// Keys in order.
    #[must_use]
    pub fn keys(&self) -> StorageKeys<'_> {
        StorageKeys(match self {
            Self::Map(map) => KeysInner::Map(map.entries().iter()),
            Self::Locals(locals) => KeysInner::Locals(locals.keys()),
        })
    }

    /// A shallow copy.
    ///
    /// A map is duplicated. A locals view yields another view over the same
    /// frame, so the copy stays live.
    #[must_use]
    pub fn copy(&self) -> Self {
        match self {
            Self::Map(map) => Self::Map(map.clone()),
            Self::Locals(locals) => Self::Locals(locals.copy()),
        }
    }

    fn make_map(&mut self) -> &mut MapStorage {
        if let Self::Locals(locals) = self {
            *self = Self::Map(locals.to_map_storage());
        }
        match self {
            Self::Map(map) => map,
            Self::Locals(_) => unreachable!("locals storage was just converted"),
        }
    }
}

impl From<MapStorage> for HashingStorage {
    fn from(map: MapStorage) -> Self {
        Self::Map(map)
    }
}

impl From<LocalsStorage> for HashingStorage {
    fn from(locals: LocalsStorage) -> Self {
        Self::Locals(locals)
    }
}

impl fmt::Display for HashingStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Map(map) => fmt::Display::fmt(map, f),
            Self::Locals(locals) => write!(f, "locals(size={}, frame={:?})", locals.len(), locals.frame()),
        }
    }
}

/// Iterator over the keys of a [`HashingStorage`].
#[derive(Debug, Clone)]
pub struct StorageKeys<'a>(KeysInner<'a>);

#[derive(Debug, Clone)]
enum KeysInner<'a> {
    Map(slice::Iter<'a, MapEntry>),
    Locals(LocalsKeys),
}

impl Iterator for StorageKeys<'_> {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        match &mut self.0 {
            KeysInner::Map(entries) => entries.next().map(|entry| entry.key.clone()),
            KeysInner::Locals(keys) => keys.next(),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match &self.0 {
            KeysInner::Map(entries) => entries.size_hint(),
            KeysInner::Locals(keys) => keys.size_hint(),
        }
    }
}

impl DoubleEndedIterator for StorageKeys<'_> {
    fn next_back(&mut self) -> Option<Value> {
        match &mut self.0 {
            KeysInner::Map(entries) => entries.next_back().map(|entry| entry.key.clone()),
            KeysInner::Locals(keys) => keys.next_back(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Frame, FrameDescriptor};

    #[test]
    fn pop_of_missing_key_keeps_view() {
        let mut ctx = ExecContext::new();
        let frame = Frame::new(FrameDescriptor::from_names(&["a"]));
        frame.store(0, Value::Int(1));
        let mut storage = HashingStorage::from(LocalsStorage::new(frame));
        assert!(storage.pop(&mut ctx, &Value::str("zz")).unwrap().is_none());
        assert!(storage.is_locals());
        let popped = storage.pop(&mut ctx, &Value::str("a")).unwrap();
        assert!(matches!(popped, Some(Value::Int(1))));
        assert!(!storage.is_locals());
        assert!(storage.is_empty());
    }

    #[test]
    fn keys_iterate_both_ways() {
        let mut ctx = ExecContext::new();
        let mut storage = HashingStorage::new();
        for i in 0..3 {
            storage.set_item(&mut ctx, Value::Int(i), Value::None).unwrap();
        }
        let forward: Vec<String> = storage.keys().map(|k| k.py_repr()).collect();
        let backward: Vec<String> = storage.keys().rev().map(|k| k.py_repr()).collect();
        assert_eq!(forward, ["0", "1", "2"]);
        assert_eq!(backward, ["2", "1", "0"]);
    }
}
