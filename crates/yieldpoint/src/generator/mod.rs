//! Generator objects and the suspend/resume protocol.
//!
//! A generator wraps a resumable body (a [`CallTarget`]) together with its
//! frame. Each call to `next()`, `send()`, `throw()` or `close()` resumes
//! the body until it yields again, returns (raising `StopIteration`) or
//! lets an exception escape.

mod arguments;
mod delegate;
mod target;
mod throw;

use std::{
    cell::{Cell, OnceCell, RefCell},
    fmt,
    rc::Rc,
};

pub use self::{
    arguments::{GeneratorArguments, ResumePayload, ThrowData},
    target::{Activation, BodyResult, CallTarget, FnTarget, YieldResult},
};
use crate::{
    context::ExecContext,
    exception_private::{ExcRef, ExcType, ExceptionRaise, RunError, RunResult, SimpleException},
    frame::{Code, CodeInfo, Frame, FrameSnapshot},
    tracer::{FinishReason, ResumeKind},
    types::Str,
    value::Value,
};

/// Generator execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum GeneratorState {
    /// Generator has been created but not yet started.
    New,
    /// Generator is currently executing.
    /// Prevents reentrant calls.
    Running,
    /// Generator is suspended at a yield expression.
    Suspended,
    /// Generator has finished execution (returned, raised or closed).
    /// Further calls to `__next__()` will raise `StopIteration`.
    Finished,
}

impl GeneratorState {
    /// The name `inspect.getgeneratorstate()` reports.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::New => "GEN_CREATED",
            Self::Running => "GEN_RUNNING",
            Self::Suspended => "GEN_SUSPENDED",
            Self::Finished => "GEN_CLOSED",
        }
    }
}

/// Result of one resumption.
#[derive(Debug)]
pub enum ResumeOutcome {
    /// The body suspended, producing a value.
    Yielded(Value),
    /// The body completed with a return value (`None` if it returned nothing).
    Returned(Value),
    /// An exception propagated out, or the resumption was refused.
    Raised(RunError),
}

impl ResumeOutcome {
    /// Maps the outcome to what `send()` reports: the yielded value, or
    /// `StopIteration` carrying the return value.
    pub fn into_result(self) -> RunResult<Value> {
        match self {
            Self::Yielded(value) => Ok(value),
            Self::Returned(value) => Err(ExcType::stop_iteration(value)),
            Self::Raised(err) => Err(err),
        }
    }
}

/// A generator object.
///
/// Cloning produces another reference to the same generator.
#[derive(Clone)]
pub struct Generator(Rc<GeneratorObject>);

struct GeneratorObject {
    state: Cell<GeneratorState>,
    /// Template copied for every resumption; never mutated.
    arguments: GeneratorArguments,
    current_target: RefCell<Rc<dyn CallTarget>>,
    code: Rc<CodeInfo>,
    /// Offset of the last suspension point, -1 before the first resume.
    lasti: Cell<i32>,
    yield_from: RefCell<Option<Generator>>,
    name: RefCell<Str>,
    qualname: RefCell<Str>,
    code_object: OnceCell<Rc<Code>>,
}

/// Marks a generator running for the lifetime of the guard.
///
/// On drop the state becomes `exit`: `Finished` unless [`suspend`] was
/// called. Every way out of a resumption, including `?` and unwinding,
/// passes through the drop.
///
/// [`suspend`]: RunningGuard::suspend
struct RunningGuard<'a> {
    state: &'a Cell<GeneratorState>,
    exit: GeneratorState,
}

impl<'a> RunningGuard<'a> {
    fn new(state: &'a Cell<GeneratorState>) -> Self {
        state.set(GeneratorState::Running);
        Self {
            state,
            exit: GeneratorState::Finished,
        }
    }

    fn suspend(&mut self) {
        self.exit = GeneratorState::Suspended;
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.state.set(self.exit);
    }
}

impl Generator {
    /// Creates a generator for a call of `target` with positional `args`.
    ///
    /// The arguments are bound to the first slots of a new frame. The body
    /// does not run until the first resumption.
    pub fn new(target: Rc<dyn CallTarget>, args: Vec<Value>) -> RunResult<Self> {
        let code = Rc::clone(target.code());
        if args.len() != code.arg_count() {
            return Err(ExcType::type_error(format!(
                "{}() takes {} positional arguments but {} were given",
                code.name(),
                code.arg_count(),
                args.len()
            )));
        }
        let frame = Frame::new(Rc::clone(code.descriptor()));
        for (index, arg) in args.iter().enumerate() {
            frame.store(index, arg.clone());
        }
        Ok(Self(Rc::new(GeneratorObject {
            state: Cell::new(GeneratorState::New),
            arguments: GeneratorArguments::new(frame, args),
            current_target: RefCell::new(target),
            name: RefCell::new(code.name().clone()),
            qualname: RefCell::new(code.qualname().clone()),
            code,
            lasti: Cell::new(-1),
            yield_from: RefCell::new(None),
            code_object: OnceCell::new(),
        })))
    }

    #[must_use]
    pub fn state(&self) -> GeneratorState {
        self.0.state.get()
    }

    #[must_use]
    pub fn state_name(&self) -> &'static str {
        self.state().name()
    }

    #[must_use]
    pub fn frame(&self) -> &Frame {
        self.0.arguments.frame()
    }

    /// The saved argument template.
    #[must_use]
    pub fn arguments(&self) -> &GeneratorArguments {
        &self.0.arguments
    }

    #[must_use]
    pub fn code_info(&self) -> &Rc<CodeInfo> {
        &self.0.code
    }

    /// Offset of the last suspension point, -1 before the first resume.
    #[must_use]
    pub fn lasti(&self) -> i32 {
        self.0.lasti.get()
    }

    /// `next(gen)`.
    pub fn next(&self, ctx: &mut ExecContext) -> RunResult<Value> {
        self.resume_with(ctx, None, ResumeKind::Next).into_result()
    }

    /// `gen.send(value)`.
    pub fn send(&self, ctx: &mut ExecContext, value: Value) -> RunResult<Value> {
        self.resume_with(ctx, Some(ResumePayload::Send(value)), ResumeKind::Send)
            .into_result()
    }

    /// `gen.throw(typ, val, tb)`.
    ///
    /// Builds the exception from `typ` and `val`, attaches `tb`, and raises
    /// it at the suspension point. A generator that has not started or has
    /// finished is closed and the exception is raised straight to the caller.
    /// A running generator is refused before any argument is looked at.
    pub fn throw(
        &self,
        ctx: &mut ExecContext,
        typ: &Value,
        val: Option<&Value>,
        tb: Option<&Value>,
    ) -> RunResult<Value> {
        if self.state() == GeneratorState::Running {
            return Err(ExcType::generator_already_executing());
        }
        let tb = throw::check_traceback(tb)?;
        let exc = throw::prepare_exception(ctx, typ, val)?;
        if tb.is_some() {
            exc.set_traceback(tb);
        }
        exc.set_context(None);
        let data = ThrowData::new(exc, ctx.options().host_backtraces);
        self.throw_outcome(ctx, data).into_result()
    }

    /// Injects an already built exception, as `throw(exc)` does.
    pub fn throw_exception(&self, ctx: &mut ExecContext, exc: ExcRef) -> RunResult<Value> {
        let data = ThrowData::new(exc, ctx.options().host_backtraces);
        self.throw_outcome(ctx, data).into_result()
    }

    /// `gen.close()`.
    ///
    /// The generator is finished afterwards whatever the outcome.
    pub fn close(&self, ctx: &mut ExecContext) -> RunResult<()> {
        match self.state() {
            GeneratorState::Running => return Err(ExcType::generator_already_executing()),
            GeneratorState::Finished => return Ok(()),
            GeneratorState::New => {
                self.finish_without_running(ctx);
                return Ok(());
            }
            GeneratorState::Suspended => {}
        }
        if let Err(err) = ctx.enter() {
            self.0.yield_from.take();
            self.finish_without_running(ctx);
            return Err(err);
        }
        let exit = ThrowData::new(SimpleException::new_none(ExcType::GeneratorExit), false);
        let outcome = match self.delegate() {
            Some(sub) => delegate::throw(self, ctx, &sub, exit, ResumeKind::Close),
            None => self.run_body(ctx, Some(ResumePayload::Throw(exit)), ResumeKind::Close),
        };
        ctx.leave();
        if self.state() != GeneratorState::Finished {
            // the body yielded instead of exiting
            self.0.state.set(GeneratorState::Finished);
            self.0.yield_from.take();
            ctx.tracer_mut().on_finish(&self.qualname(), FinishReason::Closed);
        }
        match outcome {
            ResumeOutcome::Yielded(_) => Err(ExcType::generator_ignored_exit()),
            ResumeOutcome::Raised(err) if !err.is(ExcType::GeneratorExit) && !err.is(ExcType::StopIteration) => {
                Err(err)
            }
            _ => Ok(()),
        }
    }

    /// Resumes with an explicit payload and reports the raw outcome.
    ///
    /// `None` resumes as `next()`. A `Throw` payload follows the `throw()`
    /// rules for generators that have not started or have finished.
    pub fn resume(&self, ctx: &mut ExecContext, payload: Option<ResumePayload>) -> ResumeOutcome {
        match payload {
            Some(ResumePayload::Throw(data)) => self.throw_outcome(ctx, data),
            Some(send @ ResumePayload::Send(_)) => self.resume_with(ctx, Some(send), ResumeKind::Send),
            None => self.resume_with(ctx, None, ResumeKind::Next),
        }
    }

    /// `gen.gi_running`.
    #[must_use]
    pub fn gi_running(&self) -> bool {
        self.state() == GeneratorState::Running
    }

    /// Assigning `gen.gi_running`, which is always refused.
    pub fn set_gi_running(&self, _value: &Value) -> RunResult<()> {
        Err(ExcType::attribute_not_writable("generator", "gi_running"))
    }

    /// `gen.gi_frame`: `None` once finished, otherwise the frame positioned
    /// at the last suspension point.
    #[must_use]
    pub fn gi_frame(&self) -> Option<FrameSnapshot> {
        if self.state() == GeneratorState::Finished {
            return None;
        }
        Some(FrameSnapshot::at(
            self.frame().clone(),
            Rc::clone(&self.0.code),
            self.0.lasti.get(),
        ))
    }

    /// `gen.gi_code`, created on first access.
    #[must_use]
    pub fn gi_code(&self) -> Rc<Code> {
        Rc::clone(
            self.0
                .code_object
                .get_or_init(|| Rc::new(Code::new(Rc::clone(&self.0.code)))),
        )
    }

    /// `gen.gi_yieldfrom`.
    #[must_use]
    pub fn gi_yieldfrom(&self) -> Option<Self> {
        self.delegate()
    }

    #[must_use]
    pub fn name(&self) -> Str {
        self.0.name.borrow().clone()
    }

    #[must_use]
    pub fn qualname(&self) -> Str {
        self.0.qualname.borrow().clone()
    }

    /// Assigning `gen.__name__`.
    pub fn set_name(&self, value: &Value) -> RunResult<()> {
        match value {
            Value::Str(name) => {
                *self.0.name.borrow_mut() = name.clone();
                Ok(())
            }
            _ => Err(ExcType::type_error("__name__ must be set to a string object")),
        }
    }

    /// Assigning `gen.__qualname__`.
    pub fn set_qualname(&self, value: &Value) -> RunResult<()> {
        match value {
            Value::Str(qualname) => {
                *self.0.qualname.borrow_mut() = qualname.clone();
                Ok(())
            }
            _ => Err(ExcType::type_error("__qualname__ must be set to a string object")),
        }
    }

    #[must_use]
    pub fn py_repr(&self) -> String {
        format!("<generator object {} at {:#x}>", self.qualname(), self.addr())
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0).addr()
    }

    /// Adapts the generator to a Rust iterator driven by `next()`.
    pub fn iter<'a>(&self, ctx: &'a mut ExecContext) -> GeneratorIter<'a> {
        GeneratorIter {
            generator: self.clone(),
            ctx,
            return_value: None,
            done: false,
        }
    }

    fn delegate(&self) -> Option<Self> {
        self.0.yield_from.borrow().clone()
    }

    fn check_resumable(&self) -> RunResult<()> {
        match self.state() {
            GeneratorState::Running => Err(ExcType::generator_already_executing()),
            GeneratorState::Finished => Err(ExcType::stop_iteration(Value::None)),
            GeneratorState::New | GeneratorState::Suspended => Ok(()),
        }
    }

    fn resume_with(&self, ctx: &mut ExecContext, payload: Option<ResumePayload>, kind: ResumeKind) -> ResumeOutcome {
        if let Err(err) = self.check_resumable() {
            return ResumeOutcome::Raised(err);
        }
        if self.state() == GeneratorState::New
            && let Some(ResumePayload::Send(value)) = &payload
            && !value.is_none()
        {
            return ResumeOutcome::Raised(ExcType::generator_send_not_started());
        }
        if let Err(err) = ctx.enter() {
            return ResumeOutcome::Raised(err);
        }
        let outcome = match self.delegate() {
            Some(sub) => delegate::forward(self, ctx, &sub, payload),
            None => self.run_body(ctx, payload, kind),
        };
        ctx.leave();
        outcome
    }

    fn throw_outcome(&self, ctx: &mut ExecContext, data: ThrowData) -> ResumeOutcome {
        match self.state() {
            GeneratorState::Running => ResumeOutcome::Raised(ExcType::generator_already_executing()),
            GeneratorState::New | GeneratorState::Finished => ResumeOutcome::Raised(self.throw_unstarted(ctx, data)),
            GeneratorState::Suspended => {
                if let Err(err) = ctx.enter() {
                    return ResumeOutcome::Raised(err);
                }
                let outcome = match self.delegate() {
                    Some(sub) => delegate::throw(self, ctx, &sub, data, ResumeKind::Throw),
                    None => self.run_body(ctx, Some(ResumePayload::Throw(data)), ResumeKind::Throw),
                };
                ctx.leave();
                outcome
            }
        }
    }

    /// Raises an injected exception without entering the body.
    ///
    /// The traceback gains an entry for the generator's first line so that
    /// it names the generator even though no code ran.
    fn throw_unstarted(&self, ctx: &mut ExecContext, data: ThrowData) -> RunError {
        self.finish_without_running(ctx);
        let line = self.0.code.first_lineno();
        let snapshot = FrameSnapshot::new(self.frame().clone(), Rc::clone(&self.0.code), self.0.lasti.get(), line);
        data.exc.push_traceback(snapshot, line);
        data.into_error()
    }

    fn finish_without_running(&self, ctx: &mut ExecContext) {
        if self.state() != GeneratorState::Finished {
            self.0.state.set(GeneratorState::Finished);
            ctx.tracer_mut().on_finish(&self.qualname(), FinishReason::Closed);
        }
    }

    /// Invokes the body once with a fresh copy of the arguments.
    ///
    /// The caller has checked that the generator is resumable and entered
    /// the context.
    fn run_body(&self, ctx: &mut ExecContext, payload: Option<ResumePayload>, kind: ResumeKind) -> ResumeOutcome {
        let inner = &*self.0;
        let thrown = match &payload {
            Some(ResumePayload::Throw(data)) => Some(Rc::clone(&data.exc)),
            _ => None,
        };
        let mut activation = Activation::new(inner.arguments.for_resumption(payload), inner.lasti.get());
        // no borrow of the generator is held while the body runs
        let target = Rc::clone(&inner.current_target.borrow());
        let name = self.qualname();
        let depth = ctx.depth();

        let mut guard = RunningGuard::new(&inner.state);
        ctx.tracer_mut().on_resume(&name, kind, depth);
        let result = target.invoke(ctx, &mut activation);

        match result {
            Ok(_) if activation.has_pending_throw() => {
                drop(guard);
                inner.yield_from.take();
                ctx.tracer_mut().on_finish(&name, FinishReason::Raised);
                ResumeOutcome::Raised(RunError::internal("call target ignored a thrown exception"))
            }
            Ok(BodyResult::Yield(yielded)) => {
                guard.suspend();
                inner.lasti.set(yielded.resume_at);
                *inner.yield_from.borrow_mut() = yielded.yield_from;
                if let Some(target) = yielded.retarget {
                    *inner.current_target.borrow_mut() = target;
                }
                drop(guard);
                ctx.tracer_mut().on_yield(&name, yielded.resume_at);
                ResumeOutcome::Yielded(yielded.value)
            }
            Ok(BodyResult::Return(value)) => {
                drop(guard);
                inner.yield_from.take();
                ctx.tracer_mut().on_finish(&name, FinishReason::Returned);
                ResumeOutcome::Returned(value)
            }
            Err(err) => {
                drop(guard);
                inner.yield_from.take();
                let err = self.escape(ctx, &mut activation, err, thrown.as_ref());
                ctx.tracer_mut().on_finish(&name, FinishReason::Raised);
                ResumeOutcome::Raised(err)
            }
        }
    }

    /// Prepares an exception leaving the body.
    ///
    /// Adds the generator's traceback entry, chains the caller's exception
    /// unless the exception was thrown in, and replaces `StopIteration`
    /// with `RuntimeError`.
    fn escape(
        &self,
        ctx: &mut ExecContext,
        activation: &mut Activation,
        err: RunError,
        thrown: Option<&ExcRef>,
    ) -> RunError {
        let raise = match err {
            RunError::Exc(raise) => raise,
            other => return other,
        };
        let exc = &raise.exc;
        if !thrown.is_some_and(|thrown| Rc::ptr_eq(thrown, exc)) {
            activation.chain_caller_exception(ctx, exc);
        }
        let lasti = self.0.lasti.get();
        let line = self.0.code.line_for(lasti);
        exc.push_traceback(
            FrameSnapshot::new(self.frame().clone(), Rc::clone(&self.0.code), lasti, line),
            line,
        );
        if exc.matches(ExcType::StopIteration) {
            let wrapped = ExcType::generator_raised_stop_iteration(Rc::clone(exc));
            wrapped.set_traceback(exc.traceback());
            return ExceptionRaise {
                exc: wrapped,
                host_backtrace: raise.host_backtrace,
            }
            .into();
        }
        RunError::Exc(raise)
    }
}

impl fmt::Debug for Generator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Generator")
            .field("qualname", &self.0.qualname.borrow().as_str())
            .field("state", &self.state())
            .field("lasti", &self.0.lasti.get())
            .finish_non_exhaustive()
    }
}

/// Iterator returned by [`Generator::iter`].
///
/// Yields `Ok` for each value and stops when the generator is exhausted.
/// An exception other than `StopIteration` is yielded once as `Err` and
/// ends the iteration.
pub struct GeneratorIter<'a> {
    generator: Generator,
    ctx: &'a mut ExecContext,
    return_value: Option<Value>,
    done: bool,
}

impl GeneratorIter<'_> {
    /// The generator's return value once iteration ended normally.
    #[must_use]
    pub fn return_value(&self) -> Option<&Value> {
        self.return_value.as_ref()
    }
}

impl Iterator for GeneratorIter<'_> {
    type Item = RunResult<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.generator.next(self.ctx) {
            Ok(value) => Some(Ok(value)),
            Err(err) => {
                self.done = true;
                match err.stop_value() {
                    Some(value) => {
                        self.return_value = Some(value);
                        None
                    }
                    None => Some(Err(err)),
                }
            }
        }
    }
}
