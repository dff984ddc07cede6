//! Execution tracing for the generator engine.
//!
//! The [`VmTracer`] trait defines hook points at the engine's key events:
//! resuming a body, suspending at a yield, finishing, and locals lookups
//! that hit or miss the slot cache. Every hook has a no-op default, so a
//! tracer only overrides what it records.
//!
//! | Tracer | Purpose |
//! |--------|---------|
//! | [`NoopTracer`] | No-op (default) |
//! | [`StderrTracer`] | Human-readable execution log to stderr |
//! | [`ProfilingTracer`] | Per-generator resume counters and depth tracking |
//! | [`RecordingTracer`] | Full event recording for post-mortem inspection |
//!
//! The tracer is installed on the [`ExecContext`](crate::ExecContext):
//!
//! ```
//! use yieldpoint::{ExecContext, ProfilingTracer};
//!
//! let mut ctx = ExecContext::new().with_tracer(ProfilingTracer::new());
//! // ... resume generators with `ctx` ...
//! let report = ctx.tracer_as::<ProfilingTracer>().map(ProfilingTracer::report);
//! assert!(report.is_some());
//! ```

use std::{any::Any, fmt};

use ahash::AHashMap;
use strum::{Display, IntoStaticStr};

/// How a generator was resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum ResumeKind {
    Next,
    Send,
    Throw,
    Close,
}

/// Why a generator reached its terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum FinishReason {
    /// The body returned.
    Returned,
    /// An exception escaped the body.
    Raised,
    /// `close()` or a throw into an unstarted generator finished it without
    /// the body completing.
    Closed,
}

/// Trace event emitted by the engine.
///
/// Used by [`RecordingTracer`] to capture a full execution trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    /// A body was entered.
    Resume {
        /// Qualified name of the generator.
        name: String,
        kind: ResumeKind,
        /// Resumption nesting depth after entering.
        depth: usize,
    },
    /// A body suspended.
    Yield {
        name: String,
        /// Instruction offset of the new suspension point.
        lasti: i32,
    },
    /// A generator finished.
    Finish { name: String, reason: FinishReason },
    /// A string-keyed lookup on a locals view.
    LocalsLookup {
        /// Whether the slot cache answered the lookup.
        cache_hit: bool,
    },
}

/// Trait for engine tracing.
///
/// All methods have default no-op implementations. Implementations only
/// override the hooks they care about.
pub trait VmTracer: fmt::Debug + Any {
    /// Called after the running flag is set, right before the body is invoked.
    ///
    /// # Arguments
    /// * `name` - Qualified name of the generator
    /// * `kind` - Which operation resumed it
    /// * `depth` - Resumption nesting depth including this one
    #[inline(always)]
    fn on_resume(&mut self, _name: &str, _kind: ResumeKind, _depth: usize) {}

    /// Called when a body suspends at a yield.
    #[inline(always)]
    fn on_yield(&mut self, _name: &str, _lasti: i32) {}

    /// Called when a generator becomes finished.
    #[inline(always)]
    fn on_finish(&mut self, _name: &str, _reason: FinishReason) {}

    /// Called for each string-keyed lookup on a locals view.
    #[inline(always)]
    fn on_locals_lookup(&mut self, _cache_hit: bool) {}
}

// ============================================================================
// NoopTracer
// ============================================================================

/// Tracer that records nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl VmTracer for NoopTracer {}

// ============================================================================
// StderrTracer
// ============================================================================

/// Prints one line per event to stderr.
///
/// An optional limit caps the number of lines so that long-running hosts do
/// not flood their logs.
#[derive(Debug, Default)]
pub struct StderrTracer {
    limit: Option<usize>,
    emitted: usize,
}

impl StderrTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stops printing after `limit` events.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            emitted: 0,
        }
    }

    fn emit(&mut self, line: fmt::Arguments<'_>) {
        if self.limit.is_some_and(|limit| self.emitted >= limit) {
            return;
        }
        self.emitted += 1;
        eprintln!("[yieldpoint] {line}");
    }
}

impl VmTracer for StderrTracer {
    fn on_resume(&mut self, name: &str, kind: ResumeKind, depth: usize) {
        self.emit(format_args!("{:>width$}resume {name} via {kind}", "", width = depth * 2));
    }

    fn on_yield(&mut self, name: &str, lasti: i32) {
        self.emit(format_args!("yield  {name} at {lasti}"));
    }

    fn on_finish(&mut self, name: &str, reason: FinishReason) {
        self.emit(format_args!("finish {name}: {reason}"));
    }
}

// ============================================================================
// ProfilingTracer
// ============================================================================

/// Counts resumptions per generator and tracks the deepest nesting.
#[derive(Debug, Default)]
pub struct ProfilingTracer {
    resumes: AHashMap<String, usize>,
    by_kind: AHashMap<ResumeKind, usize>,
    yields: usize,
    finishes: AHashMap<FinishReason, usize>,
    max_depth: usize,
    cache_hits: usize,
    cache_misses: usize,
}

impl ProfilingTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a summary sorted by resume count, most frequent first.
    #[must_use]
    pub fn report(&self) -> ProfilingReport {
        let mut resumes: Vec<(String, usize)> = self.resumes.iter().map(|(k, v)| (k.clone(), *v)).collect();
        resumes.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ProfilingReport {
            total_resumes: resumes.iter().map(|(_, count)| count).sum(),
            resumes,
            sends: self.by_kind.get(&ResumeKind::Send).copied().unwrap_or(0),
            throws: self.by_kind.get(&ResumeKind::Throw).copied().unwrap_or(0),
            yields: self.yields,
            returned: self.finishes.get(&FinishReason::Returned).copied().unwrap_or(0),
            raised: self.finishes.get(&FinishReason::Raised).copied().unwrap_or(0),
            closed: self.finishes.get(&FinishReason::Closed).copied().unwrap_or(0),
            max_depth: self.max_depth,
            cache_hits: self.cache_hits,
            cache_misses: self.cache_misses,
        }
    }
}

impl VmTracer for ProfilingTracer {
    fn on_resume(&mut self, name: &str, kind: ResumeKind, depth: usize) {
        *self.resumes.entry(name.to_owned()).or_default() += 1;
        *self.by_kind.entry(kind).or_default() += 1;
        self.max_depth = self.max_depth.max(depth);
    }

    fn on_yield(&mut self, _name: &str, _lasti: i32) {
        self.yields += 1;
    }

    fn on_finish(&mut self, _name: &str, reason: FinishReason) {
        *self.finishes.entry(reason).or_default() += 1;
    }

    fn on_locals_lookup(&mut self, cache_hit: bool) {
        if cache_hit {
            self.cache_hits += 1;
        } else {
            self.cache_misses += 1;
        }
    }
}

/// Summary produced by [`ProfilingTracer::report`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfilingReport {
    /// `(generator, resumes)` pairs, most resumed first.
    pub resumes: Vec<(String, usize)>,
    pub total_resumes: usize,
    pub sends: usize,
    pub throws: usize,
    pub yields: usize,
    pub returned: usize,
    pub raised: usize,
    pub closed: usize,
    pub max_depth: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
}

impl fmt::Display for ProfilingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Generator Profile ===")?;
        writeln!(
            f,
            "resumes: {} (send {}, throw {}), yields: {}, max depth: {}",
            self.total_resumes, self.sends, self.throws, self.yields, self.max_depth
        )?;
        writeln!(
            f,
            "finished: {} returned, {} raised, {} closed",
            self.returned, self.raised, self.closed
        )?;
        writeln!(f, "locals cache: {} hits, {} misses", self.cache_hits, self.cache_misses)?;
        for (name, count) in &self.resumes {
            writeln!(f, "  {name:<30} {count:>8}")?;
        }
        Ok(())
    }
}

// ============================================================================
// RecordingTracer
// ============================================================================

/// Records every event, up to an optional limit.
#[derive(Debug, Default)]
pub struct RecordingTracer {
    events: Vec<TraceEvent>,
    limit: Option<usize>,
}

impl RecordingTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            events: Vec::new(),
            limit: Some(limit),
        }
    }

    #[must_use]
    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<TraceEvent> {
        std::mem::take(&mut self.events)
    }

    fn record(&mut self, event: TraceEvent) {
        if self.limit.is_none_or(|limit| self.events.len() < limit) {
            self.events.push(event);
        }
    }
}

impl VmTracer for RecordingTracer {
    fn on_resume(&mut self, name: &str, kind: ResumeKind, depth: usize) {
        self.record(TraceEvent::Resume {
            name: name.to_owned(),
            kind,
            depth,
        });
    }

    fn on_yield(&mut self, name: &str, lasti: i32) {
        self.record(TraceEvent::Yield {
            name: name.to_owned(),
            lasti,
        });
    }

    fn on_finish(&mut self, name: &str, reason: FinishReason) {
        self.record(TraceEvent::Finish {
            name: name.to_owned(),
            reason,
        });
    }

    fn on_locals_lookup(&mut self, cache_hit: bool) {
        self.record(TraceEvent::LocalsLookup { cache_hit });
    }
}
