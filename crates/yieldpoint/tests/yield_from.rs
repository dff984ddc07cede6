/// Tests for `yield from` delegation to a sub-generator.
mod common;

use std::{cell::RefCell, rc::Rc};

use common::{code, counter, expect_exc, generator, int};
use pretty_assertions::assert_eq;
use yieldpoint::{
    BodyResult, ExcType, ExecContext, FinishReason, Generator, GeneratorState, RecordingTracer, SimpleException,
    TraceEvent, Value, YieldResult,
};

/// `result = yield from make_sub()`, returning `("result", result)`.
///
/// A `KeyError` raised at the delegation point is handled by returning
/// `"handled"`. The sub-generator is kept in slot `sub`.
fn delegator(make_sub: impl Fn() -> Generator + 'static) -> Generator {
    generator(code("outer", &["sub"]).with_line(1, 12), move |ctx, act| {
        if act.resume_point() == -1 {
            act.take_sent_value()?;
            let sub = make_sub();
            act.frame().store(0, Value::Generator(sub.clone()));
            return match sub.next(ctx) {
                Ok(first) => Ok(BodyResult::Yield(YieldResult::new(first, 1).delegating(sub))),
                Err(err) => match err.stop_value() {
                    Some(value) => Ok(BodyResult::Return(Value::tuple([Value::str("result"), value]))),
                    None => Err(err),
                },
            };
        }
        match act.take_sent_value() {
            Ok(value) => Ok(BodyResult::Return(Value::tuple([Value::str("result"), value]))),
            Err(err) if err.is(ExcType::KeyError) => Ok(BodyResult::Return(Value::str("handled"))),
            Err(err) => Err(err),
        }
    })
}

fn sub_of(outer: &Generator) -> Generator {
    match outer.frame().load(0) {
        Some(Value::Generator(sub)) => sub,
        other => panic!("no sub-generator in slot: {other:?}"),
    }
}

/// Yields `"ready"`, then echoes sent values until it receives `None`.
fn echo() -> Generator {
    generator(code("echo", &[]), |_, act| {
        let value = act.take_sent_value()?;
        if act.resume_point() == -1 {
            return Ok(BodyResult::yield_value(Value::str("ready"), 0));
        }
        if value.is_none() {
            return Ok(BodyResult::Return(Value::str("bye")));
        }
        Ok(BodyResult::yield_value(value, 0))
    })
}

/// Values from the sub-generator pass through and its return value becomes
/// the result of the delegation.
#[test]
fn values_pass_through() {
    let mut ctx = ExecContext::new();
    let outer = delegator(|| counter(3));

    assert_eq!(int(&outer.next(&mut ctx).unwrap()), 0);
    let sub = sub_of(&outer);
    assert!(outer.gi_yieldfrom().unwrap().ptr_eq(&sub));
    assert_eq!(outer.lasti(), 1);

    assert_eq!(int(&outer.next(&mut ctx).unwrap()), 1);
    assert_eq!(int(&outer.next(&mut ctx).unwrap()), 2);
    assert_eq!(outer.state(), GeneratorState::Suspended);

    let err = outer.next(&mut ctx).unwrap_err();
    assert_eq!(err.stop_value().unwrap().py_repr(), "('result', 'done')");
    assert_eq!(sub.state(), GeneratorState::Finished);
    assert_eq!(outer.state(), GeneratorState::Finished);
    assert!(outer.gi_yieldfrom().is_none());
}

/// A sub-generator that is exhausted immediately never suspends the outer one.
#[test]
fn empty_sub_generator() {
    let mut ctx = ExecContext::new();
    let outer = delegator(|| counter(0));
    let err = outer.next(&mut ctx).unwrap_err();
    assert_eq!(err.stop_value().unwrap().py_repr(), "('result', 'done')");
}

/// `send()` reaches the sub-generator.
#[test]
fn send_is_forwarded() {
    let mut ctx = ExecContext::new();
    let outer = delegator(echo);
    assert_eq!(outer.next(&mut ctx).unwrap().as_str(), Some("ready"));
    assert_eq!(int(&outer.send(&mut ctx, Value::Int(5)).unwrap()), 5);
    assert_eq!(outer.send(&mut ctx, Value::str("x")).unwrap().as_str(), Some("x"));
    let err = outer.send(&mut ctx, Value::None).unwrap_err();
    assert_eq!(err.stop_value().unwrap().py_repr(), "('result', 'bye')");
}

/// `throw()` reaches the sub-generator first; what it does not handle is
/// raised at the delegation point.
#[test]
fn throw_is_forwarded() {
    let mut ctx = ExecContext::new();
    let outer = delegator(|| {
        generator(code("catcher", &[]), |_, act| match act.take_sent_value() {
            Err(err) if err.is(ExcType::ValueError) => Ok(BodyResult::yield_value(Value::str("caught"), 0)),
            Err(err) => Err(err),
            Ok(_) => Ok(BodyResult::yield_value(Value::str("start"), 0)),
        })
    });
    assert_eq!(outer.next(&mut ctx).unwrap().as_str(), Some("start"));
    let sub = sub_of(&outer);

    let value = outer
        .throw(&mut ctx, &Value::ExcType(ExcType::ValueError), None, None)
        .unwrap();
    assert_eq!(value.as_str(), Some("caught"));
    assert!(outer.gi_yieldfrom().is_some());

    let err = outer
        .throw(&mut ctx, &Value::ExcType(ExcType::KeyError), None, None)
        .unwrap_err();
    assert_eq!(err.stop_value().unwrap().as_str(), Some("handled"));
    assert_eq!(sub.state(), GeneratorState::Finished);
    assert_eq!(outer.state(), GeneratorState::Finished);
}

/// An exception escaping the sub-generator continues through the outer one,
/// collecting a traceback entry in each.
#[test]
fn sub_generator_failure_propagates() {
    let mut ctx = ExecContext::new();
    let outer = delegator(|| {
        generator(code("inner", &[]).with_line(0, 40), |_, act| {
            act.take_sent_value()?;
            if act.resume_point() == -1 {
                return Ok(BodyResult::yield_value(Value::None, 0));
            }
            Err(SimpleException::new_msg(ExcType::ValueError, "bad").into())
        })
    });
    outer.next(&mut ctx).unwrap();
    let err = outer.next(&mut ctx).unwrap_err();
    assert_eq!(expect_exc(&err, ExcType::ValueError), "bad");

    let tb = err.exception().unwrap().traceback().unwrap();
    assert_eq!(tb.depth(), 2);
    assert_eq!(tb.tb_frame().code_info().name().as_str(), "outer");
    assert_eq!(tb.tb_lineno(), 12);
    let inner = tb.tb_next().unwrap();
    assert_eq!(inner.tb_frame().code_info().name().as_str(), "inner");
    assert_eq!(inner.tb_lineno(), 40);
    assert_eq!(outer.state(), GeneratorState::Finished);
}

/// `close()` closes the sub-generator before the outer body sees
/// `GeneratorExit`.
#[test]
fn close_closes_sub_generator_first() {
    let mut ctx = ExecContext::new().with_tracer(RecordingTracer::new());
    let outer = delegator(|| counter(3));
    outer.next(&mut ctx).unwrap();
    let sub = sub_of(&outer);

    outer.close(&mut ctx).unwrap();
    assert_eq!(sub.state(), GeneratorState::Finished);
    assert_eq!(outer.state(), GeneratorState::Finished);
    assert!(outer.gi_yieldfrom().is_none());

    let finishes: Vec<TraceEvent> = ctx
        .tracer_as::<RecordingTracer>()
        .unwrap()
        .events()
        .iter()
        .filter(|event| matches!(event, TraceEvent::Finish { .. }))
        .cloned()
        .collect();
    assert_eq!(
        finishes,
        [
            TraceEvent::Finish {
                name: "count".to_owned(),
                reason: FinishReason::Raised,
            },
            TraceEvent::Finish {
                name: "outer".to_owned(),
                reason: FinishReason::Raised,
            },
        ]
    );
}

/// The outer generator reports itself running while the sub-generator runs.
#[test]
fn outer_is_running_during_delegation() {
    let mut ctx = ExecContext::new();
    let outer_slot: Rc<RefCell<Option<Generator>>> = Rc::new(RefCell::new(None));
    let observed = Rc::new(RefCell::new(Vec::new()));

    let slot = Rc::clone(&outer_slot);
    let record = Rc::clone(&observed);
    let outer = delegator(move || {
        let slot = Rc::clone(&slot);
        let record = Rc::clone(&record);
        generator(code("watch", &[]), move |ctx, act| {
            act.take_sent_value()?;
            if let Some(outer) = slot.borrow().as_ref() {
                record.borrow_mut().push(outer.state_name());
                // resuming the delegating generator from inside is refused
                let err = outer.next(ctx).unwrap_err();
                assert_eq!(err.exception().unwrap().message(), "generator already executing");
            }
            Ok(BodyResult::yield_value(Value::None, 0))
        })
    });
    *outer_slot.borrow_mut() = Some(outer.clone());

    outer.next(&mut ctx).unwrap();
    outer.next(&mut ctx).unwrap();
    assert_eq!(outer.state(), GeneratorState::Suspended);
    assert_eq!(*observed.borrow(), ["GEN_RUNNING", "GEN_RUNNING"]);
    outer_slot.borrow_mut().take();
}
