//! Stepwise - breakpoint resolution and execution event dispatch for an
//! embedded source-level debugger.
//!
//! The host runtime reports execution events through
//! [`Debugger::trace_dispatch`]; the presentation layer gets control back
//! through [`DebuggerHooks`].

pub mod compiler;
pub mod config;
pub mod debugger;
pub mod error;
pub mod source;

// Re-export commonly used types
pub use config::DebuggerConfig;
pub use debugger::{
    BreakLocation, Breakpoint, BreakpointHits, BreakpointId, Debugger, DebuggerHooks, FrameId,
    FrameKind, Position, Runtime, TraceAction, TraceEvent,
};
pub use error::{ConditionError, DebuggerError, Quit, Result};
pub use source::{FsLoader, MemoryLoader, SourceLoader, SourceUnitIndex};
