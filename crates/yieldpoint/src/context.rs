//! Per-caller execution state threaded through every operation that may run
//! user code.

use std::any::Any;

use crate::{
    exception_private::{ExcRef, RunResult},
    resource::{LimitedTracker, ResourceLimits, ResourceTracker},
    tracer::{NoopTracer, VmTracer},
};

/// Host-facing configuration.
///
/// Every field has a default, so partial JSON documents are accepted:
///
/// ```
/// use yieldpoint::RuntimeOptions;
///
/// let options = RuntimeOptions::from_json(r#"{"limits": {"max_recursion_depth": 50}}"#).unwrap();
/// assert_eq!(options.limits.max_recursion_depth, Some(50));
/// assert!(!options.host_backtraces);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RuntimeOptions {
    pub limits: ResourceLimits,
    /// Record a host backtrace on exceptions injected with `throw()`.
    pub host_backtraces: bool,
}

impl RuntimeOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    #[must_use]
    pub fn host_backtraces(mut self, enabled: bool) -> Self {
        self.host_backtraces = enabled;
        self
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// The execution context of one logical caller.
///
/// Carries the options, the resource tracker, the tracer, the stack of
/// exceptions currently being handled by the caller and the resumption
/// depth. User hooks (`__hash__`, `__eq__`, constructors) and generator
/// bodies receive the same context as the operation that invoked them.
#[derive(Debug)]
pub struct ExecContext {
    options: RuntimeOptions,
    tracker: Box<dyn ResourceTracker>,
    tracer: Box<dyn VmTracer>,
    handled: Vec<ExcRef>,
    depth: usize,
}

impl Default for ExecContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecContext {
    /// Creates a context with default options.
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(RuntimeOptions::default())
    }

    /// Creates a context enforcing `options.limits`.
    #[must_use]
    pub fn with_options(options: RuntimeOptions) -> Self {
        Self {
            tracker: Box::new(LimitedTracker::new(options.limits.clone())),
            options,
            tracer: Box::new(NoopTracer),
            handled: Vec::new(),
            depth: 0,
        }
    }

    #[must_use]
    pub fn with_tracer(mut self, tracer: impl VmTracer) -> Self {
        self.tracer = Box::new(tracer);
        self
    }

    /// Replaces the tracker built from the options' limits.
    #[must_use]
    pub fn with_tracker(mut self, tracker: impl ResourceTracker + 'static) -> Self {
        self.tracker = Box::new(tracker);
        self
    }

    #[must_use]
    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }

    #[must_use]
    pub fn limits(&self) -> &ResourceLimits {
        &self.options.limits
    }

    pub fn tracer_mut(&mut self) -> &mut dyn VmTracer {
        self.tracer.as_mut()
    }

    /// The installed tracer if it is a `T`.
    #[must_use]
    pub fn tracer_as<T: VmTracer>(&self) -> Option<&T> {
        let tracer: &dyn Any = self.tracer.as_ref();
        tracer.downcast_ref::<T>()
    }

    /// Innermost exception the caller is currently handling, as
    /// `sys.exception()` reports it.
    #[must_use]
    pub fn current_exception(&self) -> Option<&ExcRef> {
        self.handled.last()
    }

    /// Runs `f` as if inside an `except` block handling `exc`.
    pub fn with_handled<R>(&mut self, exc: ExcRef, f: impl FnOnce(&mut Self) -> R) -> R {
        self.handled.push(exc);
        let result = f(self);
        self.handled.pop();
        result
    }

    /// Current resumption nesting depth.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Checks the limits and enters one resumption level.
    pub(crate) fn enter(&mut self) -> RunResult<()> {
        self.tracker.check_recursion_depth(self.depth)?;
        self.tracker.on_resume()?;
        self.depth += 1;
        Ok(())
    }

    pub(crate) fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }
}
