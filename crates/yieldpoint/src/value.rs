//! The runtime value type.

use std::rc::Rc;

use crate::{
    context::ExecContext,
    exception_private::{ExcRef, ExcType, RunError, RunResult, SimpleException},
    frame::Traceback,
    generator::Generator,
    py_hash::{hash_float, hash_int, hash_str, hash_tuple},
    types::{Class, ClosureCell, Instance, Str, Type},
};

/// `hash(None)`, a fixed constant as in CPython 3.12+.
const NONE_HASH: u64 = 0xFCA8_6420;

/// A runtime value.
///
/// Immutable scalars are stored inline. Everything with object identity is
/// reference counted, and `clone()` produces another reference to the same
/// object.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// Contents of a frame slot that was never bound. Never visible to user code.
    #[default]
    Undefined,
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Str),
    Tuple(Rc<[Value]>),
    /// A captured variable; frames unwrap it on every read.
    Cell(ClosureCell),
    ExcType(ExcType),
    Class(Rc<Class>),
    Exception(ExcRef),
    Instance(Rc<Instance>),
    Traceback(Rc<Traceback>),
    Generator(Generator),
}

impl Value {
    #[must_use]
    pub fn str(value: &str) -> Self {
        Self::Str(Str::new(value))
    }

    #[must_use]
    pub fn tuple(items: impl IntoIterator<Item = Self>) -> Self {
        Self::Tuple(items.into_iter().collect())
    }

    #[must_use]
    pub fn instance(class: &Rc<Class>, payload: Self) -> Self {
        Self::Instance(Rc::new(Instance::new(class, payload)))
    }

    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_exception(&self) -> Option<&ExcRef> {
        match self {
            Self::Exception(exc) => Some(exc),
            _ => None,
        }
    }

    /// True for builtin exception types and user exception classes.
    #[must_use]
    pub fn is_exception_class(&self) -> bool {
        match self {
            Self::ExcType(_) => true,
            Self::Class(class) => class.exc_base().is_some(),
            _ => false,
        }
    }

    #[must_use]
    pub fn py_type(&self) -> Type {
        match self {
            Self::Undefined | Self::None => Type::NoneType,
            Self::Bool(_) => Type::Bool,
            Self::Int(_) => Type::Int,
            Self::Float(_) => Type::Float,
            Self::Str(_) => Type::Str,
            Self::Tuple(_) => Type::Tuple,
            Self::Cell(_) => Type::Cell,
            Self::ExcType(_) | Self::Class(_) => Type::Type,
            Self::Exception(exc) => Type::Exception(exc.exc_type()),
            Self::Instance(_) => Type::Object,
            Self::Traceback(_) => Type::Traceback,
            Self::Generator(_) => Type::Generator,
        }
    }

    /// Name of the value's type as `type(v).__name__` would report it.
    #[must_use]
    pub fn type_name(&self) -> String {
        match self {
            Self::Exception(exc) => exc.type_name(),
            Self::Instance(instance) => instance.class().name().to_owned(),
            other => other.py_type().to_string(),
        }
    }

    /// Identity comparison, Python's `is`.
    ///
    /// Scalars compare by value since they have no observable identity here.
    #[must_use]
    pub fn is_identical(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::None, Self::None) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Str(a), Self::Str(b)) => a.ptr_eq(b),
            (Self::Tuple(a), Self::Tuple(b)) => Rc::ptr_eq(a, b),
            (Self::Cell(a), Self::Cell(b)) => a.ptr_eq(b),
            (Self::ExcType(a), Self::ExcType(b)) => a == b,
            (Self::Class(a), Self::Class(b)) => Rc::ptr_eq(a, b),
            (Self::Exception(a), Self::Exception(b)) => Rc::ptr_eq(a, b),
            (Self::Instance(a), Self::Instance(b)) => Rc::ptr_eq(a, b),
            (Self::Traceback(a), Self::Traceback(b)) => Rc::ptr_eq(a, b),
            (Self::Generator(a), Self::Generator(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Whether hashing or comparing this value can run host code, and so
    /// have side effects or raise.
    #[must_use]
    pub fn may_run_code(&self) -> bool {
        match self {
            Self::Instance(instance) => instance.has_hooks(),
            Self::Tuple(items) => items.iter().any(Self::may_run_code),
            _ => false,
        }
    }

    /// Python `hash()`.
    ///
    /// Objects without a value-based hash use their address. Instances whose
    /// class defines `__hash__` run it with `ctx`, and any exception it raises
    /// propagates.
    pub fn py_hash(&self, ctx: &mut ExecContext) -> RunResult<u64> {
        Ok(match self {
            Self::Undefined => return Err(RunError::internal("hash of an unbound slot")),
            Self::None => NONE_HASH,
            Self::Bool(b) => hash_int(i64::from(*b)),
            Self::Int(i) => hash_int(*i),
            Self::Float(f) => hash_float(*f),
            Self::Str(s) => s.py_hash(),
            Self::Tuple(items) => {
                let mut lanes = Vec::with_capacity(items.len());
                for item in items.iter() {
                    lanes.push(item.py_hash(ctx)?);
                }
                hash_tuple(lanes.into_iter())
            }
            Self::ExcType(exc_type) => hash_str((*exc_type).into()),
            Self::Cell(cell) => identity_hash(cell.addr()),
            Self::Class(class) => identity_hash(Rc::as_ptr(class).addr()),
            Self::Exception(exc) => identity_hash(Rc::as_ptr(exc).addr()),
            Self::Traceback(tb) => identity_hash(Rc::as_ptr(tb).addr()),
            Self::Generator(generator) => identity_hash(generator.addr()),
            Self::Instance(instance) => match instance.py_hash(ctx)? {
                Some(hash) => hash,
                None => identity_hash(Rc::as_ptr(instance).addr()),
            },
        })
    }

    /// Python `==`.
    ///
    /// Numbers compare across `bool`, `int` and `float`. Tuples compare
    /// element-wise with an identity shortcut per element. Instances defer to
    /// `__eq__` on the left operand, then the reflected `__eq__` on the right,
    /// then identity.
    pub fn py_eq(&self, ctx: &mut ExecContext, other: &Self) -> RunResult<bool> {
        if let Self::Instance(instance) = self
            && let Some(eq) = instance.py_eq(ctx, other)?
        {
            return Ok(eq);
        }
        if let Self::Instance(instance) = other
            && let Some(eq) = instance.py_eq(ctx, self)?
        {
            return Ok(eq);
        }
        Ok(match (self, other) {
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Float(f), other) | (other, Self::Float(f)) => other.as_int().is_some_and(|i| float_eq_int(*f, i)),
            (Self::Tuple(a), Self::Tuple(b)) => {
                if a.len() != b.len() {
                    return Ok(false);
                }
                for (left, right) in a.iter().zip(b.iter()) {
                    if !left.is_identical(right) && !left.py_eq(ctx, right)? {
                        return Ok(false);
                    }
                }
                true
            }
            (left, right) => match (left.as_int(), right.as_int()) {
                (Some(a), Some(b)) => a == b,
                _ => left.is_identical(right),
            },
        })
    }

    /// Calls the value with positional arguments.
    ///
    /// Only builtin exception types and user classes are callable.
    pub fn call(&self, ctx: &mut ExecContext, args: &[Self]) -> RunResult<Self> {
        match self {
            Self::ExcType(exc_type) => Ok(Self::Exception(SimpleException::new(*exc_type, args.to_vec()))),
            Self::Class(class) => class.instantiate(ctx, args),
            other => Err(ExcType::type_error_not_callable(&other.type_name())),
        }
    }

    /// Python `repr()`.
    #[must_use]
    pub fn py_repr(&self) -> String {
        match self {
            Self::Undefined => "<undefined>".to_owned(),
            Self::None => "None".to_owned(),
            Self::Bool(true) => "True".to_owned(),
            Self::Bool(false) => "False".to_owned(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => float_repr(*f),
            Self::Str(s) => s.py_repr(),
            Self::Tuple(items) => match &**items {
                [single] => format!("({},)", single.py_repr()),
                items => {
                    let parts: Vec<String> = items.iter().map(Self::py_repr).collect();
                    format!("({})", parts.join(", "))
                }
            },
            Self::Cell(cell) => match cell.get() {
                Some(value) => format!("<cell at {:#x}: {} object>", cell.addr(), value.type_name()),
                None => format!("<cell at {:#x}: empty>", cell.addr()),
            },
            Self::ExcType(exc_type) => format!("<class '{exc_type}'>"),
            Self::Class(class) => format!("<class '{}'>", class.name()),
            Self::Exception(exc) => exc.py_repr(),
            Self::Instance(instance) => {
                format!("<{} object at {:#x}>", instance.class().name(), Rc::as_ptr(instance).addr())
            }
            Self::Traceback(tb) => format!("<traceback object at {:#x}>", Rc::as_ptr(tb).addr()),
            Self::Generator(generator) => generator.py_repr(),
        }
    }
}

/// Address-based hash, rotated so the low alignment bits carry entropy.
fn identity_hash(addr: usize) -> u64 {
    (addr as u64).rotate_right(4)
}

/// Exact float/int equality. `f` must be integral and inside the `i64`
/// range before it is converted, so no precision is lost on either side.
fn float_eq_int(f: f64, i: i64) -> bool {
    // 2**63, the first float above i64::MAX
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if f.fract() != 0.0 || !(-LIMIT..LIMIT).contains(&f) {
        return false;
    }
    #[expect(clippy::cast_possible_truncation)]
    let whole = f as i64;
    whole == i
}

fn float_repr(f: f64) -> String {
    if f.is_nan() {
        "nan".to_owned()
    } else if f == f64::INFINITY {
        "inf".to_owned()
    } else if f == f64::NEG_INFINITY {
        "-inf".to_owned()
    } else {
        format!("{f:?}")
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::str(value)
    }
}

impl From<Str> for Value {
    fn from(value: Str) -> Self {
        Self::Str(value)
    }
}

impl From<ExcType> for Value {
    fn from(value: ExcType) -> Self {
        Self::ExcType(value)
    }
}

impl From<ExcRef> for Value {
    fn from(value: ExcRef) -> Self {
        Self::Exception(value)
    }
}

impl From<Generator> for Value {
    fn from(value: Generator) -> Self {
        Self::Generator(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_equality_crosses_types() {
        let mut ctx = ExecContext::new();
        assert!(Value::Int(1).py_eq(&mut ctx, &Value::Bool(true)).unwrap());
        assert!(Value::Float(2.0).py_eq(&mut ctx, &Value::Int(2)).unwrap());
        assert!(Value::Int(2).py_eq(&mut ctx, &Value::Float(2.0)).unwrap());
        assert!(!Value::Float(2.5).py_eq(&mut ctx, &Value::Int(2)).unwrap());
        assert!(!Value::str("1").py_eq(&mut ctx, &Value::Int(1)).unwrap());
    }

    #[test]
    fn float_int_equality_is_exact() {
        let mut ctx = ExecContext::new();
        let two_63 = Value::Float(9_223_372_036_854_775_808.0);
        assert!(!two_63.py_eq(&mut ctx, &Value::Int(i64::MAX)).unwrap());
        assert!(!Value::Int(i64::MAX).py_eq(&mut ctx, &two_63).unwrap());
        assert!(Value::Float(-9_223_372_036_854_775_808.0).py_eq(&mut ctx, &Value::Int(i64::MIN)).unwrap());
        // 2**53 + 1 has no exact float; the nearest one is 2**53
        let big = 9_007_199_254_740_993_i64;
        assert!(!Value::Float(9_007_199_254_740_992.0).py_eq(&mut ctx, &Value::Int(big)).unwrap());
        assert!(Value::Float(9_007_199_254_740_992.0).py_eq(&mut ctx, &Value::Int(big - 1)).unwrap());
        for odd in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(!Value::Float(odd).py_eq(&mut ctx, &Value::Int(0)).unwrap());
        }
    }

    #[test]
    fn equal_numbers_hash_equal() {
        let mut ctx = ExecContext::new();
        let one = Value::Int(1).py_hash(&mut ctx).unwrap();
        assert_eq!(Value::Bool(true).py_hash(&mut ctx).unwrap(), one);
        assert_eq!(Value::Float(1.0).py_hash(&mut ctx).unwrap(), one);
    }

    #[test]
    fn tuples_compare_elementwise() {
        let mut ctx = ExecContext::new();
        let a = Value::tuple([Value::Int(1), Value::str("x")]);
        let b = Value::tuple([Value::Float(1.0), Value::str("x")]);
        assert!(a.py_eq(&mut ctx, &b).unwrap());
        assert_eq!(a.py_hash(&mut ctx).unwrap(), b.py_hash(&mut ctx).unwrap());
        assert!(!a.is_identical(&b));
    }

    #[test]
    fn reprs() {
        assert_eq!(Value::None.py_repr(), "None");
        assert_eq!(Value::Float(1.0).py_repr(), "1.0");
        assert_eq!(Value::Float(f64::NAN).py_repr(), "nan");
        assert_eq!(Value::tuple([Value::Int(1)]).py_repr(), "(1,)");
        assert_eq!(Value::tuple([Value::Int(1), Value::None]).py_repr(), "(1, None)");
        assert_eq!(Value::ExcType(ExcType::KeyError).py_repr(), "<class 'KeyError'>");
    }
}
