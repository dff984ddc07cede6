//! `yield from` delegation.
//!
//! While an outer generator delegates to a sub-generator, its resumptions
//! are forwarded to the sub-generator with the outer marked running. Values
//! the sub-generator yields pass straight through and leave the outer
//! suspended at the same point. Once the sub-generator stops, the outer
//! body resumes: with the sub-generator's return value as the result of
//! `yield from`, or with the exception that ended it raised at the
//! suspension point.

use crate::{
    context::ExecContext,
    exception_private::{ExcType, RunError, RunResult},
    generator::{Generator, ResumeOutcome, ResumePayload, RunningGuard, ThrowData},
    tracer::ResumeKind,
    value::Value,
};

/// Forwards `next()` or `send()` to the delegate.
pub(super) fn forward(
    outer: &Generator,
    ctx: &mut ExecContext,
    sub: &Generator,
    payload: Option<ResumePayload>,
) -> ResumeOutcome {
    let value = match payload {
        Some(ResumePayload::Throw(data)) => return throw(outer, ctx, sub, data, ResumeKind::Throw),
        Some(ResumePayload::Send(value)) => value,
        None => Value::None,
    };
    let result = while_delegating(outer, || sub.send(ctx, value));
    settle(outer, ctx, result)
}

/// Forwards an injected exception to the delegate.
///
/// `GeneratorExit` closes the delegate and is then raised in the outer
/// body, unless closing the delegate failed, in which case that failure is
/// raised instead.
pub(super) fn throw(
    outer: &Generator,
    ctx: &mut ExecContext,
    sub: &Generator,
    data: ThrowData,
    kind: ResumeKind,
) -> ResumeOutcome {
    if data.exc.matches(ExcType::GeneratorExit) {
        let closed = while_delegating(outer, || sub.close(ctx));
        outer.0.yield_from.take();
        return match closed {
            Ok(()) => outer.run_body(ctx, Some(ResumePayload::Throw(data)), kind),
            Err(RunError::Exc(raise)) => outer.run_body(
                ctx,
                Some(ResumePayload::Throw(ThrowData::new(raise.exc, data.with_host_backtrace))),
                kind,
            ),
            Err(err) => ResumeOutcome::Raised(err),
        };
    }
    let result = while_delegating(outer, || sub.throw_outcome(ctx, data).into_result());
    settle(outer, ctx, result)
}

/// Runs `f` with the outer generator marked running, restoring it to
/// suspended afterwards.
fn while_delegating<R>(outer: &Generator, f: impl FnOnce() -> R) -> R {
    let mut guard = RunningGuard::new(&outer.0.state);
    guard.suspend();
    f()
}

/// Continues the outer generator after the delegate produced `result`.
fn settle(outer: &Generator, ctx: &mut ExecContext, result: RunResult<Value>) -> ResumeOutcome {
    let err = match result {
        Ok(value) => {
            ctx.tracer_mut().on_yield(&outer.qualname(), outer.lasti());
            return ResumeOutcome::Yielded(value);
        }
        Err(err) => err,
    };
    outer.0.yield_from.take();
    if let Some(value) = err.stop_value() {
        return outer.run_body(ctx, Some(ResumePayload::Send(value)), ResumeKind::Send);
    }
    match err {
        RunError::Exc(raise) => outer.run_body(
            ctx,
            Some(ResumePayload::Throw(ThrowData::new(raise.exc, false))),
            ResumeKind::Throw,
        ),
        // limits and engine errors are not delivered to bodies
        other => ResumeOutcome::Raised(other),
    }
}
