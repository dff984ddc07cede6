use std::fmt::Write;

use indexmap::IndexMap;

use crate::{
    context::ExecContext,
    exception_private::{ExcType, RunResult},
    frame::Frame,
    storage::{HashingStorage, LocalsStorage, StorageKeys},
    value::Value,
};

/// A Python `dict` over [`HashingStorage`].
///
/// Mapping operations that fail with a missing key raise `KeyError`; the
/// storage level reports a missing key as `None` instead.
#[derive(Debug, Default)]
pub struct Dict {
    storage: HashingStorage,
}

impl Dict {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_storage(storage: HashingStorage) -> Self {
        Self { storage }
    }

    /// A live view over the visible bindings of `frame`.
    pub(crate) fn locals_of(frame: &Frame) -> Self {
        Self::from_storage(LocalsStorage::new(frame.clone()).into())
    }

    #[must_use]
    pub fn storage(&self) -> &HashingStorage {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut HashingStorage {
        &mut self.storage
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// `d[key]`.
    pub fn get_item(&self, ctx: &mut ExecContext, key: &Value) -> RunResult<Value> {
        match self.storage.get_item(ctx, key, None)? {
            Some(value) => Ok(value),
            None => Err(ExcType::key_error(key.clone())),
        }
    }

    /// `d.get(key)`.
    pub fn get(&self, ctx: &mut ExecContext, key: &Value) -> RunResult<Option<Value>> {
        self.storage.get_item(ctx, key, None)
    }

    /// `d[key] = value`.
    pub fn set_item(&mut self, ctx: &mut ExecContext, key: Value, value: Value) -> RunResult<()> {
        self.storage.set_item(ctx, key, value)?;
        Ok(())
    }

    /// `del d[key]`.
    pub fn del_item(&mut self, ctx: &mut ExecContext, key: &Value) -> RunResult<()> {
        match self.storage.pop(ctx, key)? {
            Some(_) => Ok(()),
            None => Err(ExcType::key_error(key.clone())),
        }
    }

    /// `key in d`.
    pub fn contains(&self, ctx: &mut ExecContext, key: &Value) -> RunResult<bool> {
        Ok(self.storage.get_item(ctx, key, None)?.is_some())
    }

    #[must_use]
    pub fn keys(&self) -> StorageKeys<'_> {
        self.storage.keys()
    }

    pub fn items(&self) -> RunResult<Vec<(Value, Value)>> {
        self.storage.for_each(Vec::with_capacity(self.len()), |mut items, key, value| {
            items.push((key.clone(), value.clone()));
            Ok(items)
        })
    }

    #[must_use]
    pub fn copy(&self) -> Self {
        Self::from_storage(self.storage.copy())
    }

    pub fn py_repr(&self) -> RunResult<String> {
        let mut out = self.storage.for_each(String::from("{"), |mut out, key, value| {
            if out.len() > 1 {
                out.push_str(", ");
            }
            // writing to a String cannot fail
            let _ = write!(out, "{}: {}", key.py_repr(), value.py_repr());
            Ok(out)
        })?;
        out.push('}');
        Ok(out)
    }
}

impl From<IndexMap<String, Value>> for Dict {
    fn from(source: IndexMap<String, Value>) -> Self {
        Self::from_storage(HashingStorage::from_str_map(source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameDescriptor;

    #[test]
    fn repr_in_insertion_order() {
        let mut ctx = ExecContext::new();
        let mut dict = Dict::new();
        dict.set_item(&mut ctx, Value::str("b"), Value::Int(2)).unwrap();
        dict.set_item(&mut ctx, Value::Int(1), Value::tuple([Value::None])).unwrap();
        assert_eq!(dict.py_repr().unwrap(), "{'b': 2, 1: (None,)}");
        assert_eq!(Dict::new().py_repr().unwrap(), "{}");
    }

    #[test]
    fn missing_key_raises_key_error() {
        let mut ctx = ExecContext::new();
        let mut dict = Dict::new();
        let err = dict.get_item(&mut ctx, &Value::str("x")).unwrap_err();
        assert!(err.is(ExcType::KeyError));
        assert!(dict.del_item(&mut ctx, &Value::Int(3)).unwrap_err().is(ExcType::KeyError));
    }

    #[test]
    fn locals_dict_reads_frame() {
        let mut ctx = ExecContext::new();
        let frame = Frame::new(FrameDescriptor::from_names(&["x", ".tmp"]));
        frame.store(0, Value::Int(5));
        frame.store(1, Value::Int(6));
        let dict = frame.locals();
        assert_eq!(dict.len(), 1);
        assert!(dict.contains(&mut ctx, &Value::str("x")).unwrap());
        assert!(!dict.contains(&mut ctx, &Value::str(".tmp")).unwrap());
        assert_eq!(dict.py_repr().unwrap(), "{'x': 5}");
    }
}
