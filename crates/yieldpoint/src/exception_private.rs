use std::{
    borrow::Cow,
    cell::RefCell,
    fmt::{self, Write as _},
    rc::Rc,
};

use strum::{Display, EnumString, IntoStaticStr};

use crate::{
    frame::{FrameSnapshot, Traceback},
    types::Class,
    value::Value,
};

/// Result type alias for operations that can produce a runtime error.
pub type RunResult<T> = Result<T, RunError>;

/// Shared handle to a raised exception object.
///
/// Exceptions have identity: the same object can be re-raised, chained as a
/// `__context__` and stored in a frame at the same time.
pub type ExcRef = Rc<SimpleException>;

/// Builtin exception types known to the runtime.
///
/// Uses strum derives for automatic `Display`, `FromStr`, and `Into<&'static str>` implementations.
/// The string representation matches the variant name exactly (e.g., `ValueError` -> "ValueError").
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, serde::Serialize, serde::Deserialize,
)]
pub enum ExcType {
    BaseException,
    SystemExit,
    KeyboardInterrupt,
    /// Injected by `close()`. Inherits from BaseException, not Exception.
    GeneratorExit,
    /// primary exception class - matches any exception in isinstance checks.
    Exception,

    // --- ArithmeticError hierarchy ---
    ArithmeticError,
    OverflowError,
    ZeroDivisionError,

    // --- LookupError hierarchy ---
    LookupError,
    IndexError,
    KeyError,

    // --- iteration protocol ---
    StopIteration,
    StopAsyncIteration,

    // --- RuntimeError hierarchy ---
    RuntimeError,
    RecursionError,
    NotImplementedError,

    // --- NameError hierarchy ---
    NameError,
    UnboundLocalError,

    AttributeError,
    TimeoutError,
    TypeError,
    ValueError,
}

impl ExcType {
    /// Direct base class in the builtin hierarchy, `None` for `BaseException`.
    #[must_use]
    pub fn base(self) -> Option<Self> {
        match self {
            Self::BaseException => None,
            Self::SystemExit | Self::KeyboardInterrupt | Self::GeneratorExit | Self::Exception => {
                Some(Self::BaseException)
            }
            Self::OverflowError | Self::ZeroDivisionError => Some(Self::ArithmeticError),
            Self::IndexError | Self::KeyError => Some(Self::LookupError),
            Self::RecursionError | Self::NotImplementedError => Some(Self::RuntimeError),
            Self::UnboundLocalError => Some(Self::NameError),
            Self::ArithmeticError
            | Self::LookupError
            | Self::StopIteration
            | Self::StopAsyncIteration
            | Self::RuntimeError
            | Self::NameError
            | Self::AttributeError
            | Self::TimeoutError
            | Self::TypeError
            | Self::ValueError => Some(Self::Exception),
        }
    }

    /// Checks if this exception type is a subclass of another exception type.
    ///
    /// Every type is a subclass of itself, as in `issubclass(ValueError, ValueError)`.
    #[must_use]
    pub fn is_subclass_of(self, handler_type: Self) -> bool {
        let mut current = Some(self);
        while let Some(exc_type) = current {
            if exc_type == handler_type {
                return true;
            }
            current = exc_type.base();
        }
        false
    }

    /// Creates the `StopIteration` that reports an exhausted generator.
    ///
    /// A `None` return value produces a bare `StopIteration` with no args.
    #[must_use]
    pub(crate) fn stop_iteration(value: Value) -> RunError {
        if value.is_none() {
            SimpleException::new_none(Self::StopIteration).into()
        } else {
            SimpleException::new(Self::StopIteration, vec![value]).into()
        }
    }

    /// Creates a ValueError for resuming a generator that is currently running.
    ///
    /// Matches CPython's format: `ValueError: generator already executing`
    #[must_use]
    pub(crate) fn generator_already_executing() -> RunError {
        SimpleException::new_msg(Self::ValueError, "generator already executing").into()
    }

    /// Creates a TypeError for sending a non-None value to a just-started generator.
    ///
    /// Matches CPython's format: `TypeError: can't send non-None value to a just-started generator`
    #[must_use]
    pub(crate) fn generator_send_not_started() -> RunError {
        SimpleException::new_msg(Self::TypeError, "can't send non-None value to a just-started generator").into()
    }

    /// Creates the RuntimeError raised when `close()` observes another yield.
    #[must_use]
    pub(crate) fn generator_ignored_exit() -> RunError {
        SimpleException::new_msg(Self::RuntimeError, "generator ignored GeneratorExit").into()
    }

    /// Wraps a `StopIteration` that escaped a generator body.
    ///
    /// The original exception becomes both `__cause__` and `__context__`.
    #[must_use]
    pub(crate) fn generator_raised_stop_iteration(stop: ExcRef) -> ExcRef {
        let exc = SimpleException::new_msg(Self::RuntimeError, "generator raised StopIteration");
        exc.set_cause(Some(Rc::clone(&stop)));
        exc.set_context(Some(stop));
        exc
    }

    /// Creates an AttributeError for assigning a read-only attribute.
    #[must_use]
    pub(crate) fn attribute_not_writable(type_name: &str, attr: &str) -> RunError {
        SimpleException::new_msg(
            Self::AttributeError,
            format!("attribute '{attr}' of '{type_name}' objects is not writable"),
        )
        .into()
    }

    #[must_use]
    pub(crate) fn type_error(msg: impl fmt::Display) -> RunError {
        SimpleException::new_msg(Self::TypeError, msg).into()
    }

    /// Creates a TypeError for hashing a value whose class defines equality but no hash.
    #[must_use]
    pub(crate) fn type_error_unhashable(type_name: &str) -> RunError {
        Self::type_error(format!("unhashable type: '{type_name}'"))
    }

    /// Creates a TypeError for calling a value that is not callable.
    #[must_use]
    pub(crate) fn type_error_not_callable(type_name: &str) -> RunError {
        Self::type_error(format!("'{type_name}' object is not callable"))
    }

    /// Creates a KeyError carrying the missing key as its only argument.
    #[must_use]
    pub(crate) fn key_error(key: Value) -> RunError {
        SimpleException::new(Self::KeyError, vec![key]).into()
    }
}

/// An exception object.
///
/// Holds the builtin type it ultimately derives from, the user class when it
/// was created from one, its constructor args and the mutable dunder slots
/// (`__traceback__`, `__context__`, `__cause__`) that raising and chaining
/// update in place.
pub struct SimpleException {
    exc_type: ExcType,
    class: Option<Rc<Class>>,
    args: Vec<Value>,
    traceback: RefCell<Option<Rc<Traceback>>>,
    context: RefCell<Option<ExcRef>>,
    cause: RefCell<Option<ExcRef>>,
}

impl SimpleException {
    #[must_use]
    pub fn new(exc_type: ExcType, args: Vec<Value>) -> ExcRef {
        Rc::new(Self {
            exc_type,
            class: None,
            args,
            traceback: RefCell::new(None),
            context: RefCell::new(None),
            cause: RefCell::new(None),
        })
    }

    /// Creates an exception with a single string argument.
    #[must_use]
    pub fn new_msg(exc_type: ExcType, msg: impl fmt::Display) -> ExcRef {
        Self::new(exc_type, vec![Value::str(&msg.to_string())])
    }

    /// Creates an exception with no arguments, as `raise ValueError` does.
    #[must_use]
    pub fn new_none(exc_type: ExcType) -> ExcRef {
        Self::new(exc_type, Vec::new())
    }

    /// Creates an instance of a user-defined exception class.
    ///
    /// The builtin type is inherited from the class hierarchy.
    #[must_use]
    pub(crate) fn with_class(class: Rc<Class>, exc_type: ExcType, args: Vec<Value>) -> ExcRef {
        Rc::new(Self {
            exc_type,
            class: Some(class),
            args,
            traceback: RefCell::new(None),
            context: RefCell::new(None),
            cause: RefCell::new(None),
        })
    }

    #[must_use]
    pub fn exc_type(&self) -> ExcType {
        self.exc_type
    }

    #[must_use]
    pub fn class(&self) -> Option<&Rc<Class>> {
        self.class.as_ref()
    }

    #[must_use]
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Name of the exception's type, the user class name when there is one.
    #[must_use]
    pub fn type_name(&self) -> String {
        match &self.class {
            Some(class) => class.name().to_owned(),
            None => self.exc_type.to_string(),
        }
    }

    /// Whether this exception would be caught by `except exc_type`.
    #[must_use]
    pub fn matches(&self, exc_type: ExcType) -> bool {
        self.exc_type.is_subclass_of(exc_type)
    }

    /// Whether this exception is an instance of `target`, a builtin exception
    /// type or an exception class.
    #[must_use]
    pub fn is_instance_of(&self, target: &Value) -> bool {
        match target {
            Value::ExcType(exc_type) => self.matches(*exc_type),
            Value::Class(class) => self.class.as_ref().is_some_and(|own| own.is_subclass_of(class)),
            _ => false,
        }
    }

    /// The value carried by a `StopIteration`: its first argument, or `None`.
    #[must_use]
    pub fn stop_value(&self) -> Value {
        self.args.first().cloned().unwrap_or(Value::None)
    }

    /// Equivalent of `str(exc)`.
    #[must_use]
    pub fn message(&self) -> String {
        match self.args.as_slice() {
            [] => String::new(),
            [Value::Str(s)] => s.as_str().to_owned(),
            [single] => single.py_repr(),
            many => Value::tuple(many.iter().cloned()).py_repr(),
        }
    }

    #[must_use]
    pub fn py_repr(&self) -> String {
        let mut out = self.type_name();
        out.push('(');
        for (index, arg) in self.args.iter().enumerate() {
            if index > 0 {
                out.push_str(", ");
            }
            out.push_str(&arg.py_repr());
        }
        out.push(')');
        out
    }

    #[must_use]
    pub fn traceback(&self) -> Option<Rc<Traceback>> {
        self.traceback.borrow().clone()
    }

    pub fn set_traceback(&self, traceback: Option<Rc<Traceback>>) {
        *self.traceback.borrow_mut() = traceback;
    }

    /// Pushes an outer traceback entry in front of the existing chain.
    pub(crate) fn push_traceback(&self, frame: FrameSnapshot, lineno: u32) {
        let mut slot = self.traceback.borrow_mut();
        let next = slot.take();
        *slot = Some(Rc::new(Traceback::new(frame, lineno, next)));
    }

    #[must_use]
    pub fn context(&self) -> Option<ExcRef> {
        self.context.borrow().clone()
    }

    pub fn set_context(&self, context: Option<ExcRef>) {
        *self.context.borrow_mut() = context;
    }

    #[must_use]
    pub fn cause(&self) -> Option<ExcRef> {
        self.cause.borrow().clone()
    }

    pub fn set_cause(&self, cause: Option<ExcRef>) {
        *self.cause.borrow_mut() = cause;
    }
}

impl fmt::Debug for SimpleException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // context and cause chains may be cyclic, so only their presence is shown
        f.debug_struct("SimpleException")
            .field("type", &self.type_name())
            .field("args", &self.args)
            .field("has_traceback", &self.traceback.borrow().is_some())
            .field("has_context", &self.context.borrow().is_some())
            .field("has_cause", &self.cause.borrow().is_some())
            .finish()
    }
}

impl fmt::Display for SimpleException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = self.message();
        if message.is_empty() {
            f.write_str(&self.type_name())
        } else {
            write!(f, "{}: {message}", self.type_name())
        }
    }
}

/// A raised exception together with optional host diagnostics.
#[derive(Debug, Clone)]
pub struct ExceptionRaise {
    pub exc: ExcRef,
    /// Rust backtrace captured when the exception was injected by `throw()`
    /// with host backtraces enabled.
    pub host_backtrace: Option<String>,
}

impl From<ExcRef> for ExceptionRaise {
    fn from(exc: ExcRef) -> Self {
        Self {
            exc,
            host_backtrace: None,
        }
    }
}

/// Runtime error types that can occur during execution.
///
/// Three variants:
/// - `Internal`: Bug in the engine or in a host call target (static message)
/// - `Exc`: exception that generator bodies can catch
/// - `UncatchableExc`: exception from resource limits that bodies must not swallow
#[derive(Debug)]
pub enum RunError {
    /// Internal error - indicates a bug in the engine or its host, not user code.
    Internal(Cow<'static, str>),
    /// Catchable exception (e.g., ValueError, TypeError).
    Exc(Box<ExceptionRaise>),
    /// Exception from an exhausted operation budget.
    UncatchableExc(Box<ExceptionRaise>),
}

impl From<ExceptionRaise> for RunError {
    fn from(exc: ExceptionRaise) -> Self {
        Self::Exc(Box::new(exc))
    }
}

impl From<ExcRef> for RunError {
    fn from(exc: ExcRef) -> Self {
        Self::Exc(Box::new(exc.into()))
    }
}

impl RunError {
    #[must_use]
    pub fn internal(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Internal(msg.into())
    }

    /// The exception object, `None` for internal errors.
    #[must_use]
    pub fn exception(&self) -> Option<&ExcRef> {
        match self {
            Self::Exc(raise) | Self::UncatchableExc(raise) => Some(&raise.exc),
            Self::Internal(_) => None,
        }
    }

    #[must_use]
    pub fn exc_type(&self) -> Option<ExcType> {
        self.exception().map(|exc| exc.exc_type())
    }

    /// Whether this is a catchable exception matching `exc_type`.
    #[must_use]
    pub fn is(&self, exc_type: ExcType) -> bool {
        match self {
            Self::Exc(raise) => raise.exc.matches(exc_type),
            Self::Internal(_) | Self::UncatchableExc(_) => false,
        }
    }

    /// The value of a `StopIteration`, `None` when this is any other error.
    #[must_use]
    pub fn stop_value(&self) -> Option<Value> {
        match self {
            Self::Exc(raise) if raise.exc.matches(ExcType::StopIteration) => Some(raise.exc.stop_value()),
            _ => None,
        }
    }

    /// Host backtrace recorded when the exception was injected, if any.
    #[must_use]
    pub fn host_backtrace(&self) -> Option<&str> {
        match self {
            Self::Exc(raise) | Self::UncatchableExc(raise) => raise.host_backtrace.as_deref(),
            Self::Internal(_) => None,
        }
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
            Self::Exc(raise) | Self::UncatchableExc(raise) => {
                let mut rendered = String::new();
                let mut entry = raise.exc.traceback();
                if entry.is_some() {
                    rendered.push_str("Traceback (most recent call last):\n");
                }
                while let Some(tb) = entry {
                    let code = tb.tb_frame().code_info();
                    let _ = writeln!(
                        rendered,
                        "  File \"{}\", line {}, in {}",
                        code.filename(),
                        tb.tb_lineno(),
                        code.name()
                    );
                    entry = tb.tb_next().cloned();
                }
                write!(f, "{rendered}{}", raise.exc)
            }
        }
    }
}

impl std::error::Error for RunError {}
