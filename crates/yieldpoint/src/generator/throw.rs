use std::rc::Rc;

use crate::{
    context::ExecContext,
    exception_private::{ExcRef, ExcType, RunResult, SimpleException},
    frame::Traceback,
    value::Value,
};

/// Validates the third argument of `throw()`.
///
/// `None` and an absent argument both mean "no traceback".
pub(super) fn check_traceback(tb: Option<&Value>) -> RunResult<Option<Rc<Traceback>>> {
    match tb {
        None | Some(Value::None) => Ok(None),
        Some(Value::Traceback(tb)) => Ok(Some(Rc::clone(tb))),
        Some(_) => Err(ExcType::type_error("throw() third argument must be a traceback object")),
    }
}

/// Builds the exception `throw(typ, val)` injects.
///
/// An exception class is instantiated unless `val` is already an instance
/// of it: with no arguments for a missing or `None` value, with the items
/// of a tuple value, or with the value as single argument. An exception
/// instance is used as is and must not come with a value.
///
/// A constructor that returns something other than an exception yields a
/// `TypeError`, which is injected in place of the requested exception.
pub(super) fn prepare_exception(ctx: &mut ExecContext, typ: &Value, val: Option<&Value>) -> RunResult<ExcRef> {
    let val = val.filter(|val| !val.is_none());
    if typ.is_exception_class() {
        if let Some(Value::Exception(exc)) = val
            && exc.is_instance_of(typ)
        {
            return Ok(Rc::clone(exc));
        }
        let args: Vec<Value> = match val {
            None => Vec::new(),
            Some(Value::Tuple(items)) => items.to_vec(),
            Some(other) => vec![other.clone()],
        };
        return match typ.call(ctx, &args)? {
            Value::Exception(exc) => Ok(exc),
            other => Ok(not_an_exception(typ, &other)),
        };
    }
    match typ {
        Value::Exception(_) if val.is_some() => Err(ExcType::type_error(
            "instance exception may not have a separate value",
        )),
        Value::Exception(exc) => Ok(Rc::clone(exc)),
        other => Err(ExcType::type_error(format!(
            "exceptions must be classes or instances deriving from BaseException, not {}",
            other.type_name()
        ))),
    }
}

fn not_an_exception(typ: &Value, produced: &Value) -> ExcRef {
    SimpleException::new_msg(ExcType::TypeError, format!(
        "calling {} should have returned an instance of BaseException, not {}",
        typ.py_repr(),
        produced.type_name()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{exception_private::RunError, types::Class};

    fn message(err: RunError) -> String {
        err.exception().map(|exc| exc.message()).unwrap_or_default()
    }

    #[test]
    fn class_is_called_with_unpacked_tuple() {
        let mut ctx = ExecContext::new();
        let typ = Value::ExcType(ExcType::ValueError);
        let exc = prepare_exception(&mut ctx, &typ, Some(&Value::tuple([Value::Int(1), Value::Int(2)]))).unwrap();
        assert_eq!(exc.args().len(), 2);
        let exc = prepare_exception(&mut ctx, &typ, Some(&Value::None)).unwrap();
        assert!(exc.args().is_empty());
    }

    #[test]
    fn matching_instance_is_reused() {
        let mut ctx = ExecContext::new();
        let instance = Value::Exception(crate::SimpleException::new_msg(ExcType::KeyError, "k"));
        let exc = prepare_exception(&mut ctx, &Value::ExcType(ExcType::LookupError), Some(&instance)).unwrap();
        assert!(Rc::ptr_eq(&exc, instance.as_exception().unwrap()));
        // an unrelated class wraps the instance as its argument instead
        let wrapped = prepare_exception(&mut ctx, &Value::ExcType(ExcType::TypeError), Some(&instance)).unwrap();
        assert!(wrapped.matches(ExcType::TypeError));
        assert_eq!(wrapped.args().len(), 1);
    }

    #[test]
    fn constructor_must_produce_exception() {
        let mut ctx = ExecContext::new();
        let class = Rc::new(
            Class::exception("Weird", ExcType::Exception).with_ctor(|_, _, _| Ok(Value::Int(3))),
        );
        let exc = prepare_exception(&mut ctx, &Value::Class(class), None).unwrap();
        assert!(exc.matches(ExcType::TypeError));
        assert_eq!(
            exc.message(),
            "calling <class 'Weird'> should have returned an instance of BaseException, not int"
        );
    }

    #[test]
    fn invalid_arguments() {
        let mut ctx = ExecContext::new();
        let instance = Value::Exception(crate::SimpleException::new_none(ExcType::ValueError));
        let err = prepare_exception(&mut ctx, &instance, Some(&Value::Int(1))).unwrap_err();
        assert_eq!(message(err), "instance exception may not have a separate value");

        let err = prepare_exception(&mut ctx, &Value::Int(1), None).unwrap_err();
        assert_eq!(
            message(err),
            "exceptions must be classes or instances deriving from BaseException, not int"
        );

        let err = check_traceback(Some(&Value::Int(0))).unwrap_err();
        assert_eq!(message(err), "throw() third argument must be a traceback object");
    }
}
