#![doc = include_str!("../../../README.md")]

mod context;
mod exception_private;
mod frame;
mod generator;
mod py_hash;
mod resource;
mod storage;
mod tracer;
mod types;
mod value;

pub use crate::{
    context::{ExecContext, RuntimeOptions},
    exception_private::{ExcRef, ExcType, ExceptionRaise, RunError, RunResult, SimpleException},
    frame::{Code, CodeInfo, Frame, FrameDescriptor, FrameSnapshot, SlotIdentifier, Traceback},
    generator::{
        Activation, BodyResult, CallTarget, FnTarget, Generator, GeneratorArguments, GeneratorIter, GeneratorState,
        ResumeOutcome, ResumePayload, ThrowData, YieldResult,
    },
    resource::{
        DEFAULT_MAX_RECURSION_DEPTH, LimitedTracker, NoLimitTracker, ResourceError, ResourceLimits, ResourceTracker,
    },
    storage::{HashingStorage, LocalsStorage, MapStorage, StorageKeys},
    tracer::{
        FinishReason, NoopTracer, ProfilingReport, ProfilingTracer, RecordingTracer, ResumeKind, StderrTracer,
        TraceEvent, VmTracer,
    },
    types::{Class, ClosureCell, CtorHook, Dict, EqHook, HashHook, Instance, Str, Type},
    value::Value,
};
