//! The resumable body of a generator.
//!
//! The engine does not interpret code. A host supplies each generator body
//! as a [`CallTarget`]: an explicit state machine that is invoked once per
//! resumption, reads where it stopped from [`Activation::resume_point`],
//! keeps its state in frame slots, and either yields or returns.

use std::{fmt, rc::Rc};

use crate::{
    context::ExecContext,
    exception_private::{ExcRef, RunError, RunResult},
    frame::{CodeInfo, Frame},
    generator::{
        Generator,
        arguments::{ExceptionState, GeneratorArguments, ResumePayload},
    },
    value::Value,
};

/// A compiled entry point a generator resumes into.
pub trait CallTarget {
    /// Code of the body. Frames, tracebacks and `gi_code` are derived from it.
    fn code(&self) -> &Rc<CodeInfo>;

    /// Runs the body from `activation.resume_point()` to the next yield or
    /// to completion.
    fn invoke(&self, ctx: &mut ExecContext, activation: &mut Activation) -> RunResult<BodyResult>;
}

/// How one invocation of a body ended without raising.
#[derive(Debug)]
pub enum BodyResult {
    Yield(YieldResult),
    Return(Value),
}

impl BodyResult {
    /// Suspends with `value`, resuming next time at `resume_at`.
    #[must_use]
    pub fn yield_value(value: Value, resume_at: i32) -> Self {
        Self::Yield(YieldResult::new(value, resume_at))
    }
}

/// A suspension.
pub struct YieldResult {
    pub value: Value,
    /// Instruction offset the body resumes at; becomes `gi_frame.f_lasti`.
    pub resume_at: i32,
    /// Sub-generator the body is delegating to with `yield from`.
    pub yield_from: Option<Generator>,
    /// Entry point to use for the next resumption instead of the current one.
    pub retarget: Option<Rc<dyn CallTarget>>,
}

impl YieldResult {
    #[must_use]
    pub fn new(value: Value, resume_at: i32) -> Self {
        Self {
            value,
            resume_at,
            yield_from: None,
            retarget: None,
        }
    }

    /// Marks the suspension as a `yield from sub`.
    ///
    /// `value` should be what `sub` just yielded. Until `sub` is exhausted,
    /// resumptions of the outer generator are forwarded to it, and its
    /// return value is then sent into the outer body.
    #[must_use]
    pub fn delegating(mut self, sub: Generator) -> Self {
        self.yield_from = Some(sub);
        self
    }

    #[must_use]
    pub fn retarget(mut self, target: Rc<dyn CallTarget>) -> Self {
        self.retarget = Some(target);
        self
    }
}

impl fmt::Debug for YieldResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("YieldResult")
            .field("value", &self.value)
            .field("resume_at", &self.resume_at)
            .field("yield_from", &self.yield_from)
            .field("retarget", &self.retarget.is_some())
            .finish()
    }
}

/// The state one resumption of a body sees.
///
/// Wraps the per-resumption copy of the generator's arguments.
#[derive(Debug)]
pub struct Activation {
    arguments: GeneratorArguments,
    resume_point: i32,
}

impl Activation {
    pub(crate) fn new(arguments: GeneratorArguments, resume_point: i32) -> Self {
        Self {
            arguments,
            resume_point,
        }
    }

    #[must_use]
    pub fn frame(&self) -> &Frame {
        self.arguments.frame()
    }

    /// Positional argument `index` as passed at creation.
    #[must_use]
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.arguments.user_args().get(index)
    }

    #[must_use]
    pub fn user_args(&self) -> &[Value] {
        self.arguments.user_args()
    }

    /// Offset of the suspension point being resumed; `-1` on the first run.
    #[must_use]
    pub fn resume_point(&self) -> i32 {
        self.resume_point
    }

    #[must_use]
    pub fn arguments(&self) -> &GeneratorArguments {
        &self.arguments
    }

    /// Takes the value of the `yield` expression being resumed.
    ///
    /// Returns the sent value, `None` for `next()` and the first run, and
    /// raises the injected exception for `throw()` and `close()`.
    pub fn take_sent_value(&mut self) -> RunResult<Value> {
        match self.arguments.take_payload() {
            None => Ok(Value::None),
            Some(ResumePayload::Send(value)) => Ok(value),
            Some(ResumePayload::Throw(data)) => Err(data.into_error()),
        }
    }

    /// The exception the resumer was handling when it resumed this body.
    ///
    /// Looked up on first use and kept for the rest of this resumption only.
    pub fn caller_exception(&mut self, ctx: &ExecContext) -> Option<ExcRef> {
        if let ExceptionState::Captured(exc) = self.arguments.exception_state() {
            return exc.clone();
        }
        let exc = ctx.current_exception().cloned();
        self.arguments.capture_exception(exc.clone());
        exc
    }

    /// Raises `exc` from the body, chaining the caller's exception as its
    /// `__context__` when it has none.
    pub fn raise(&mut self, ctx: &ExecContext, exc: ExcRef) -> RunError {
        self.chain_caller_exception(ctx, &exc);
        exc.into()
    }

    pub(crate) fn chain_caller_exception(&mut self, ctx: &ExecContext, exc: &ExcRef) {
        if exc.context().is_some() {
            return;
        }
        if let Some(caller) = self.caller_exception(ctx)
            && !Rc::ptr_eq(&caller, exc)
        {
            exc.set_context(Some(caller));
        }
    }

    pub(crate) fn has_pending_throw(&self) -> bool {
        self.arguments.has_pending_throw()
    }
}

/// A [`CallTarget`] backed by a closure.
pub struct FnTarget<F> {
    code: Rc<CodeInfo>,
    body: F,
}

impl<F> FnTarget<F>
where
    F: Fn(&mut ExecContext, &mut Activation) -> RunResult<BodyResult>,
{
    #[must_use]
    pub fn new(code: CodeInfo, body: F) -> Rc<Self> {
        Rc::new(Self {
            code: Rc::new(code),
            body,
        })
    }

    /// A closure target sharing existing code, for re-specialized entry points.
    #[must_use]
    pub fn with_code(code: Rc<CodeInfo>, body: F) -> Rc<Self> {
        Rc::new(Self { code, body })
    }
}

impl<F> CallTarget for FnTarget<F>
where
    F: Fn(&mut ExecContext, &mut Activation) -> RunResult<BodyResult>,
{
    fn code(&self) -> &Rc<CodeInfo> {
        &self.code
    }

    fn invoke(&self, ctx: &mut ExecContext, activation: &mut Activation) -> RunResult<BodyResult> {
        (self.body)(ctx, activation)
    }
}

impl<F> fmt::Debug for FnTarget<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTarget").field("code", &self.code.qualname()).finish()
    }
}
