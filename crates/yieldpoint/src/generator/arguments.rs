//! The saved argument vector of a generator and the payloads a resumption
//! installs into its per-resumption copy.

use std::{backtrace::Backtrace, rc::Rc};

use crate::{
    exception_private::{ExcRef, ExceptionRaise, RunError},
    frame::Frame,
    value::Value,
};

/// An exception injected at the suspension point by `throw()` or `close()`.
#[derive(Debug, Clone)]
pub struct ThrowData {
    pub exc: ExcRef,
    /// Record a host backtrace when the injection is raised.
    pub with_host_backtrace: bool,
}

impl ThrowData {
    #[must_use]
    pub fn new(exc: ExcRef, with_host_backtrace: bool) -> Self {
        Self {
            exc,
            with_host_backtrace,
        }
    }

    /// The error the body observes when it reads its resumption value.
    #[must_use]
    pub fn into_error(self) -> RunError {
        let host_backtrace = self
            .with_host_backtrace
            .then(|| Backtrace::force_capture().to_string());
        ExceptionRaise {
            exc: self.exc,
            host_backtrace,
        }
        .into()
    }
}

/// Value delivered to a resumed body.
#[derive(Debug, Clone)]
pub enum ResumePayload {
    /// A value from `send()`.
    Send(Value),
    /// An exception from `throw()` or `close()`.
    Throw(ThrowData),
}

/// Whether the exception the resumer was handling has been looked up yet.
#[derive(Debug, Clone, Default)]
pub(crate) enum ExceptionState {
    #[default]
    NotCaptured,
    Captured(Option<ExcRef>),
}

/// The arguments a generator was created with.
///
/// The generator keeps one instance as an immutable template. Every
/// resumption works on a clone, and only the clone ever carries a
/// resumption payload or a captured caller exception, so nothing written
/// during one resumption is visible to the next.
#[derive(Debug, Clone)]
pub struct GeneratorArguments {
    frame: Frame,
    user_args: Rc<[Value]>,
    special: Option<ResumePayload>,
    exception_state: ExceptionState,
}

impl GeneratorArguments {
    pub(crate) fn new(frame: Frame, user_args: Vec<Value>) -> Self {
        Self {
            frame,
            user_args: user_args.into(),
            special: None,
            exception_state: ExceptionState::NotCaptured,
        }
    }

    /// The generator's frame. Clones of the arguments share it.
    #[must_use]
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Positional arguments the generator was created with.
    #[must_use]
    pub fn user_args(&self) -> &[Value] {
        &self.user_args
    }

    /// Whether a resumption payload is installed.
    #[must_use]
    pub fn has_payload(&self) -> bool {
        self.special.is_some()
    }

    /// Whether the resumer's exception has been captured.
    #[must_use]
    pub fn has_captured_exception(&self) -> bool {
        matches!(self.exception_state, ExceptionState::Captured(_))
    }

    /// A copy for one resumption carrying `payload`.
    pub(crate) fn for_resumption(&self, payload: Option<ResumePayload>) -> Self {
        let mut copy = self.clone();
        copy.special = payload;
        copy
    }

    pub(crate) fn take_payload(&mut self) -> Option<ResumePayload> {
        self.special.take()
    }

    pub(crate) fn has_pending_throw(&self) -> bool {
        matches!(self.special, Some(ResumePayload::Throw(_)))
    }

    pub(crate) fn exception_state(&self) -> &ExceptionState {
        &self.exception_state
    }

    pub(crate) fn capture_exception(&mut self, exc: Option<ExcRef>) {
        self.exception_state = ExceptionState::Captured(exc);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        exception_private::{ExcType, SimpleException},
        frame::FrameDescriptor,
    };

    #[test]
    fn resumption_copy_leaves_template_untouched() {
        let frame = Frame::new(FrameDescriptor::from_names(&["x"]));
        let template = GeneratorArguments::new(frame, vec![Value::Int(1)]);
        let exc = SimpleException::new_none(ExcType::ValueError);

        let mut copy = template.for_resumption(Some(ResumePayload::Send(Value::Int(2))));
        copy.capture_exception(Some(exc));
        assert!(copy.has_payload());
        assert!(copy.has_captured_exception());

        assert!(!template.has_payload());
        assert!(!template.has_captured_exception());
        assert!(copy.frame().ptr_eq(template.frame()));
    }

    #[test]
    fn throw_data_backtrace_is_opt_in() {
        let exc = SimpleException::new_none(ExcType::ValueError);
        let plain = ThrowData::new(Rc::clone(&exc), false).into_error();
        assert!(plain.host_backtrace().is_none());
        let traced = ThrowData::new(exc, true).into_error();
        assert!(traced.host_backtrace().is_some());
    }
}
