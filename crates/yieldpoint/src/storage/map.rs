use std::{fmt, mem};

use hashbrown::HashTable;
use indexmap::IndexMap;

use crate::{context::ExecContext, exception_private::RunResult, types::Str, value::Value};

/// Most entries rendered by `Display` before the output is truncated.
const DISPLAY_LIMIT: usize = 100;

/// Insertion-ordered hash map.
///
/// `indices` maps hashes to positions in `entries`, which holds the entries
/// in insertion order together with their precomputed hash. Lookups that
/// compare keys can run user `__eq__`, so they take the caller's context and
/// can fail.
#[derive(Debug, Clone, Default)]
pub struct MapStorage {
    indices: HashTable<usize>,
    entries: Vec<MapEntry>,
    /// Set once a key whose hash or equality may run user code was inserted.
    side_effecting_keys: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct MapEntry {
    pub(crate) key: Value,
    pub(crate) value: Value,
    /// the hash is needed here for correct use of insert_unique
    hash: u64,
}

impl MapStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            indices: HashTable::with_capacity(capacity),
            entries: Vec::with_capacity(capacity),
            side_effecting_keys: false,
        }
    }

    /// Bulk import from a string-keyed ordered map.
    ///
    /// Keeps the source order and hashes each key exactly once.
    #[must_use]
    pub fn from_str_map(source: IndexMap<String, Value>) -> Self {
        let mut map = Self::with_capacity(source.len());
        for (key, value) in source {
            let key = Str::from(key);
            let hash = key.py_hash();
            // IndexMap keys are already distinct
            map.push_unique(Value::Str(key), hash, value);
        }
        map
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn has_side_effect(&self) -> bool {
        self.side_effecting_keys
    }

    pub fn set_side_effecting_keys(&mut self) {
        self.side_effecting_keys = true;
    }

    fn find_index(&self, ctx: &mut ExecContext, key: &Value, hash: u64) -> RunResult<Option<usize>> {
        let mut failure = None;
        let found = self
            .indices
            .find(hash, |&index| {
                if failure.is_some() {
                    return false;
                }
                let entry = &self.entries[index];
                if entry.hash != hash {
                    return false;
                }
                if entry.key.is_identical(key) {
                    return true;
                }
                match key.py_eq(ctx, &entry.key) {
                    Ok(equal) => equal,
                    Err(err) => {
                        failure = Some(err);
                        false
                    }
                }
            })
            .copied();
        match failure {
            Some(err) => Err(err),
            None => Ok(found),
        }
    }

    fn hash_of(ctx: &mut ExecContext, key: &Value, hash: Option<u64>) -> RunResult<u64> {
        match hash {
            Some(hash) => Ok(hash),
            None => key.py_hash(ctx),
        }
    }

    /// Looks up `key`, using `hash` when the caller already computed it.
    pub fn get(&self, ctx: &mut ExecContext, key: &Value, hash: Option<u64>) -> RunResult<Option<Value>> {
        let hash = Self::hash_of(ctx, key, hash)?;
        Ok(self
            .find_index(ctx, key, hash)?
            .map(|index| self.entries[index].value.clone()))
    }

    /// Inserts or replaces, returning the previous value.
    ///
    /// An existing equal key is kept; only its value is replaced.
    pub fn set(&mut self, ctx: &mut ExecContext, key: Value, value: Value) -> RunResult<Option<Value>> {
        let hash = key.py_hash(ctx)?;
        if let Some(index) = self.find_index(ctx, &key, hash)? {
            return Ok(Some(mem::replace(&mut self.entries[index].value, value)));
        }
        if key.may_run_code() {
            self.side_effecting_keys = true;
        }
        self.push_unique(key, hash, value);
        Ok(None)
    }

    /// Inserts a string key without running any user code.
    pub(crate) fn set_str(&mut self, key: Str, value: Value) -> Option<Value> {
        let hash = key.py_hash();
        let existing = self
            .indices
            .find(hash, |&index| matches!(&self.entries[index].key, Value::Str(s) if *s == key))
            .copied();
        match existing {
            Some(index) => Some(mem::replace(&mut self.entries[index].value, value)),
            None => {
                self.push_unique(Value::Str(key), hash, value);
                None
            }
        }
    }

    fn push_unique(&mut self, key: Value, hash: u64, value: Value) {
        let index = self.entries.len();
        self.entries.push(MapEntry { key, value, hash });
        self.indices
            .insert_unique(hash, index, |index| self.entries[*index].hash);
    }

    /// Removes `key`, returning the stored key and value.
    ///
    /// Later entries keep their relative order.
    pub fn remove(&mut self, ctx: &mut ExecContext, key: &Value) -> RunResult<Option<(Value, Value)>> {
        let hash = key.py_hash(ctx)?;
        let Some(index) = self.find_index(ctx, key, hash)? else {
            return Ok(None);
        };
        if let Ok(slot) = self.indices.find_entry(hash, |&i| i == index) {
            slot.remove();
        }
        let entry = self.entries.remove(index);
        for position in self.indices.iter_mut() {
            if *position > index {
                *position -= 1;
            }
        }
        Ok(Some((entry.key, entry.value)))
    }

    pub fn clear(&mut self) {
        self.indices.clear();
        self.entries.clear();
    }

    pub(crate) fn entries(&self) -> &[MapEntry] {
        &self.entries
    }

    /// Visits entries in insertion order.
    pub fn for_each<A>(&self, init: A, mut f: impl FnMut(A, &Value, &Value) -> RunResult<A>) -> RunResult<A> {
        let mut acc = init;
        for entry in &self.entries {
            acc = f(acc, &entry.key, &entry.value)?;
        }
        Ok(acc)
    }
}

impl fmt::Display for MapStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "map(size={}, {{", self.len())?;
        for (index, entry) in self.entries.iter().take(DISPLAY_LIMIT).enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "({}, {})", entry.key.py_repr(), entry.value.py_repr())?;
        }
        if self.len() > DISPLAY_LIMIT {
            f.write_str(", ...")?;
        }
        f.write_str("})")
    }
}
