//! Closure cells.

use std::{cell::RefCell, fmt, rc::Rc};

use crate::value::Value;

/// A boxed variable shared between an enclosing scope and the closures that
/// capture it.
///
/// Frames store a cell in the slot of every captured variable. Reading the
/// slot through a frame or a locals view yields the cell's contents, never
/// the cell itself.
#[derive(Clone, Default)]
pub struct ClosureCell(Rc<RefCell<Option<Value>>>);

impl ClosureCell {
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self(Rc::new(RefCell::new(Some(value))))
    }

    /// A cell whose variable is not bound yet.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self) -> Option<Value> {
        self.0.borrow().clone()
    }

    pub fn set(&self, value: Value) {
        *self.0.borrow_mut() = Some(value);
    }

    pub fn clear(&self) {
        *self.0.borrow_mut() = None;
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    #[must_use]
    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0).addr()
    }
}

impl fmt::Debug for ClosureCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(contents) => f.debug_tuple("ClosureCell").field(&*contents).finish(),
            Err(_) => f.write_str("ClosureCell(<borrowed>)"),
        }
    }
}
