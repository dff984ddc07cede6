//! User-defined classes and their instances.
//!
//! The runtime does not model attribute lookup or method resolution. A class
//! carries only the hooks storage and the generator engine call into:
//! `__hash__`, `__eq__` and the constructor. Each hook is host code that runs
//! with the caller's [`ExecContext`] and may raise.

use std::{fmt, rc::Rc};

use crate::{
    context::ExecContext,
    exception_private::{ExcType, RunResult, SimpleException},
    types::Str,
    value::Value,
};

/// `__hash__` implementation.
pub type HashHook = Rc<dyn Fn(&mut ExecContext, &Instance) -> RunResult<u64>>;
/// `__eq__` implementation, called with the instance on the left.
pub type EqHook = Rc<dyn Fn(&mut ExecContext, &Instance, &Value) -> RunResult<bool>>;
/// Replacement for the default constructor; may return any value.
pub type CtorHook = Rc<dyn Fn(&mut ExecContext, &Rc<Class>, &[Value]) -> RunResult<Value>>;

/// A user-defined class.
///
/// Hooks and the exception base are inherited from the parent class unless
/// overridden.
pub struct Class {
    name: Str,
    parent: Option<Rc<Class>>,
    exc_base: Option<ExcType>,
    hash: Option<HashHook>,
    eq: Option<EqHook>,
    ctor: Option<CtorHook>,
}

impl Class {
    /// A plain class deriving from `object`.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: Str::new(name),
            parent: None,
            exc_base: None,
            hash: None,
            eq: None,
            ctor: None,
        }
    }

    /// An exception class deriving from a builtin exception type.
    #[must_use]
    pub fn exception(name: &str, base: ExcType) -> Self {
        Self {
            exc_base: Some(base),
            ..Self::new(name)
        }
    }

    /// A class deriving from another user class.
    #[must_use]
    pub fn subclass(name: &str, parent: &Rc<Self>) -> Self {
        Self {
            parent: Some(Rc::clone(parent)),
            exc_base: parent.exc_base,
            ..Self::new(name)
        }
    }

    #[must_use]
    pub fn with_hash(mut self, hook: impl Fn(&mut ExecContext, &Instance) -> RunResult<u64> + 'static) -> Self {
        self.hash = Some(Rc::new(hook));
        self
    }

    #[must_use]
    pub fn with_eq(
        mut self,
        hook: impl Fn(&mut ExecContext, &Instance, &Value) -> RunResult<bool> + 'static,
    ) -> Self {
        self.eq = Some(Rc::new(hook));
        self
    }

    #[must_use]
    pub fn with_ctor(
        mut self,
        hook: impl Fn(&mut ExecContext, &Rc<Self>, &[Value]) -> RunResult<Value> + 'static,
    ) -> Self {
        self.ctor = Some(Rc::new(hook));
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Builtin exception type this class derives from, if it is an exception class.
    #[must_use]
    pub fn exc_base(&self) -> Option<ExcType> {
        self.exc_base
    }

    #[must_use]
    pub fn is_subclass_of(&self, other: &Self) -> bool {
        let mut current = Some(self);
        while let Some(class) = current {
            if std::ptr::eq(class, other) {
                return true;
            }
            current = class.parent.as_deref();
        }
        false
    }

    pub(crate) fn hash_hook(&self) -> Option<&HashHook> {
        self.lookup(|class| class.hash.as_ref())
    }

    pub(crate) fn eq_hook(&self) -> Option<&EqHook> {
        self.lookup(|class| class.eq.as_ref())
    }

    fn lookup<'a, T>(&'a self, get: impl Fn(&'a Self) -> Option<&'a T>) -> Option<&'a T> {
        let mut current = Some(self);
        while let Some(class) = current {
            if let Some(found) = get(class) {
                return Some(found);
            }
            current = class.parent.as_deref();
        }
        None
    }

    /// Calls the class: the constructor hook if present, otherwise a new
    /// exception (for exception classes) or instance whose payload is the
    /// first argument.
    pub fn instantiate(self: &Rc<Self>, ctx: &mut ExecContext, args: &[Value]) -> RunResult<Value> {
        if let Some(ctor) = self.lookup(|class| class.ctor.as_ref()) {
            let ctor = Rc::clone(ctor);
            return ctor(ctx, self, args);
        }
        Ok(match self.exc_base {
            Some(exc_type) => Value::Exception(SimpleException::with_class(Rc::clone(self), exc_type, args.to_vec())),
            None => Value::Instance(Rc::new(Instance::new(
                self,
                args.first().cloned().unwrap_or(Value::None),
            ))),
        })
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.name)
            .field("exc_base", &self.exc_base)
            .finish_non_exhaustive()
    }
}

/// An instance of a user class with a single payload value.
#[derive(Debug)]
pub struct Instance {
    class: Rc<Class>,
    payload: Value,
}

impl Instance {
    #[must_use]
    pub fn new(class: &Rc<Class>, payload: Value) -> Self {
        Self {
            class: Rc::clone(class),
            payload,
        }
    }

    #[must_use]
    pub fn class(&self) -> &Rc<Class> {
        &self.class
    }

    #[must_use]
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Whether hashing or comparing this instance runs host code.
    #[must_use]
    pub(crate) fn has_hooks(&self) -> bool {
        self.class.hash_hook().is_some() || self.class.eq_hook().is_some()
    }

    pub(crate) fn py_hash(&self, ctx: &mut ExecContext) -> RunResult<Option<u64>> {
        match (self.class.hash_hook(), self.class.eq_hook()) {
            (Some(hook), _) => {
                let hook = Rc::clone(hook);
                hook(ctx, self).map(Some)
            }
            // defining __eq__ without __hash__ makes a class unhashable
            (None, Some(_)) => Err(ExcType::type_error_unhashable(self.class.name())),
            (None, None) => Ok(None),
        }
    }

    /// Calls `__eq__`, `None` when the class does not define one.
    pub(crate) fn py_eq(&self, ctx: &mut ExecContext, other: &Value) -> RunResult<Option<bool>> {
        match self.class.eq_hook() {
            Some(hook) => {
                let hook = Rc::clone(hook);
                hook(ctx, self, other).map(Some)
            }
            None => Ok(None),
        }
    }
}
