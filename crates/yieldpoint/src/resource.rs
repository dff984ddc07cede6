use std::fmt;

use crate::exception_private::{ExcType, ExceptionRaise, RunError, SimpleException};

/// Default maximum nesting of generator resumptions, matching CPython's default
/// recursion limit.
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 1000;

/// Error returned when a resource limit is exceeded during execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// Maximum nesting of resumptions exceeded.
    Recursion { limit: usize, depth: usize },
    /// Maximum number of resumptions exceeded.
    Operation { limit: usize, count: usize },
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Recursion { .. } => write!(f, "maximum recursion depth exceeded"),
            Self::Operation { limit, count } => {
                write!(f, "operation limit exceeded: {count} > {limit}")
            }
        }
    }
}

impl std::error::Error for ResourceError {}

impl ResourceError {
    /// Converts this resource error to an exception.
    ///
    /// - `Recursion` → `RecursionError`
    /// - `Operation` → `TimeoutError`
    #[must_use]
    pub(crate) fn into_exception(self) -> ExceptionRaise {
        let exc_type = match self {
            Self::Recursion { .. } => ExcType::RecursionError,
            Self::Operation { .. } => ExcType::TimeoutError,
        };
        SimpleException::new_msg(exc_type, self).into()
    }
}

impl From<ResourceError> for RunError {
    fn from(err: ResourceError) -> Self {
        // an exhausted operation budget is not catchable by bodies
        if matches!(err, ResourceError::Recursion { .. }) {
            Self::Exc(Box::new(err.into_exception()))
        } else {
            Self::UncatchableExc(Box::new(err.into_exception()))
        }
    }
}

/// Configuration for resource limits.
///
/// `None` disables the corresponding limit.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    /// Maximum nesting of resumptions (a generator resuming another generator).
    pub max_recursion_depth: Option<usize>,
    /// Maximum number of resumptions over the lifetime of one execution context.
    pub max_resumes: Option<usize>,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceLimits {
    /// Creates limits with everything disabled except the default recursion limit.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_recursion_depth: Some(DEFAULT_MAX_RECURSION_DEPTH),
            max_resumes: None,
        }
    }

    #[must_use]
    pub fn max_recursion_depth(mut self, limit: Option<usize>) -> Self {
        self.max_recursion_depth = limit;
        self
    }

    #[must_use]
    pub fn max_resumes(mut self, limit: usize) -> Self {
        self.max_resumes = Some(limit);
        self
    }
}

/// Trait for enforcing resource limits on resumptions.
pub trait ResourceTracker: fmt::Debug {
    /// Called before entering a generator body.
    ///
    /// # Arguments
    /// * `current_depth` - Number of resumptions already on the stack
    fn check_recursion_depth(&self, current_depth: usize) -> Result<(), ResourceError>;

    /// Called once per resumption, after the depth check passed.
    fn on_resume(&mut self) -> Result<(), ResourceError> {
        Ok(())
    }
}

/// A tracker without limits apart from the default recursion depth, which
/// keeps runaway delegation from overflowing the host stack.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLimitTracker;

impl ResourceTracker for NoLimitTracker {
    fn check_recursion_depth(&self, current_depth: usize) -> Result<(), ResourceError> {
        if current_depth >= DEFAULT_MAX_RECURSION_DEPTH {
            return Err(ResourceError::Recursion {
                limit: DEFAULT_MAX_RECURSION_DEPTH,
                depth: current_depth + 1,
            });
        }
        Ok(())
    }
}

/// A resource tracker that enforces configurable limits.
#[derive(Debug, Clone)]
pub struct LimitedTracker {
    limits: ResourceLimits,
    /// Resumptions performed so far.
    resume_count: usize,
}

impl LimitedTracker {
    #[must_use]
    pub fn new(limits: ResourceLimits) -> Self {
        Self {
            limits,
            resume_count: 0,
        }
    }

    #[must_use]
    pub fn resume_count(&self) -> usize {
        self.resume_count
    }

    #[must_use]
    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }
}

impl ResourceTracker for LimitedTracker {
    fn check_recursion_depth(&self, current_depth: usize) -> Result<(), ResourceError> {
        if let Some(max) = self.limits.max_recursion_depth {
            // current_depth is before entering, so the new depth would be current_depth + 1
            if current_depth >= max {
                return Err(ResourceError::Recursion {
                    limit: max,
                    depth: current_depth + 1,
                });
            }
        }
        Ok(())
    }

    fn on_resume(&mut self) -> Result<(), ResourceError> {
        self.resume_count += 1;
        if let Some(max) = self.limits.max_resumes
            && self.resume_count > max
        {
            return Err(ResourceError::Operation {
                limit: max,
                count: self.resume_count,
            });
        }
        Ok(())
    }
}
