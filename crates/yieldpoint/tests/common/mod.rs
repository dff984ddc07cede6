//! Shared helpers for the integration tests.
//!
//! Each test binary uses a different subset, hence the `dead_code` expectation.
#![expect(dead_code)]

use std::rc::Rc;

use yieldpoint::{
    BodyResult, CallTarget, Class, CodeInfo, ExcType, FnTarget, FrameDescriptor, Generator, RunError, Value,
};

/// Code info with the given named slots.
pub fn code(name: &str, slots: &[&str]) -> CodeInfo {
    CodeInfo::new(name, FrameDescriptor::from_names(slots))
}

/// Builds a generator without arguments from a closure body.
pub fn generator(
    code: CodeInfo,
    body: impl Fn(&mut yieldpoint::ExecContext, &mut yieldpoint::Activation) -> yieldpoint::RunResult<BodyResult>
    + 'static,
) -> Generator {
    let target: Rc<dyn CallTarget> = FnTarget::new(code, body);
    Generator::new(target, Vec::new()).unwrap()
}

/// A generator yielding `0..limit` from slot `i` and then returning `"done"`.
pub fn counter(limit: i64) -> Generator {
    generator(code("count", &["i"]), move |_, act| {
        act.take_sent_value()?;
        let i = act.frame().load(0).and_then(|v| v.as_int()).unwrap_or(0);
        if i >= limit {
            return Ok(BodyResult::Return(Value::str("done")));
        }
        act.frame().store(0, Value::Int(i + 1));
        Ok(BodyResult::yield_value(Value::Int(i), 0))
    })
}

/// The `str()` of the raised exception, empty for internal errors.
pub fn message(err: &RunError) -> String {
    err.exception().map(|exc| exc.message()).unwrap_or_default()
}

/// Asserts `err` is a catchable exception of exactly `exc_type` and returns its message.
pub fn expect_exc(err: &RunError, exc_type: ExcType) -> String {
    assert_eq!(err.exc_type(), Some(exc_type), "unexpected error: {err}");
    assert!(err.is(exc_type));
    message(err)
}

pub fn int(value: &Value) -> i64 {
    value.as_int().unwrap_or_else(|| panic!("expected int, got {}", value.py_repr()))
}

/// A class whose instances hash and compare by their integer payload and
/// count how often `__eq__` ran.
pub fn counting_key_class(eq_calls: Rc<std::cell::Cell<usize>>) -> Rc<Class> {
    Rc::new(
        Class::new("Key")
            .with_hash(|_, instance| Ok(instance.payload().as_int().map_or(0, i64::cast_unsigned)))
            .with_eq(move |_, instance, other| {
                eq_calls.set(eq_calls.get() + 1);
                Ok(match other {
                    Value::Instance(other) => other.payload().as_int() == instance.payload().as_int(),
                    _ => false,
                })
            }),
    )
}

/// A class whose `__eq__` always raises `ValueError("boom")`.
pub fn raising_eq_class() -> Rc<Class> {
    Rc::new(
        Class::new("Bad")
            .with_hash(|_, _| Ok(7))
            .with_eq(|_, _, _| Err(yieldpoint::SimpleException::new_msg(ExcType::ValueError, "boom").into())),
    )
}
