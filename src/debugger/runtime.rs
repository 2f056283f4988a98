//! The interface the traced program's runtime exposes to the debugger.
//!
//! Frames are owned by the runtime. The debugger only keeps [`FrameId`]s,
//! and only asks about frames that are live on the current stack.

use std::fmt;

use crate::error::ConditionError;

/// Identity of one activation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub u64);

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameKind {
    #[default]
    Normal,
    /// Suspends and is re-entered: every resumption arrives as a new call
    /// event on the same frame.
    Resumable,
}

/// The compiled unit a frame executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeRef<'a> {
    /// File name as recorded when the unit was compiled.
    pub filename: &'a str,
    /// Start line of the unit.
    pub first_line: u32,
    pub name: &'a str,
}

/// Access to the runtime's frames and trace hooks.
///
/// Tracing has two switches, as in most interpreters: a global one that
/// makes the runtime report call events at all, and a local hook per frame
/// that makes it report the frame's line, return and exception events.
pub trait Runtime {
    /// Arguments, return values and exception values.
    type Value: fmt::Debug;

    fn current_line(&self, frame: FrameId) -> u32;
    fn code(&self, frame: FrameId) -> CodeRef<'_>;
    /// The calling frame.
    fn parent(&self, frame: FrameId) -> Option<FrameId>;
    fn frame_kind(&self, frame: FrameId) -> FrameKind;
    /// Name of the module whose global namespace the frame runs in.
    fn module_name(&self, frame: FrameId) -> Option<&str>;

    fn has_local_trace(&self, frame: FrameId) -> bool;
    fn set_local_trace(&mut self, frame: FrameId, enabled: bool);
    fn global_trace(&self) -> bool;
    fn set_global_trace(&mut self, enabled: bool);

    /// Evaluate a breakpoint condition in the frame's namespace.
    fn eval_condition(&mut self, frame: FrameId, condition: &str) -> Result<bool, ConditionError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionKind {
    /// An ordinary exception.
    Raised,
    /// The iteration-complete signal a resumable frame raises when it is
    /// exhausted.
    IterationComplete,
    /// A resumable frame being closed before completion.
    ResumableExit,
}

/// Where an exception was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub frame: FrameId,
    pub line: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct Exception<'a, V> {
    pub kind: ExceptionKind,
    pub value: &'a V,
    /// `None` for a signal raised by the runtime itself, with no traceback.
    pub origin: Option<Location>,
}

/// An execution event, as delivered by the runtime.
#[derive(Debug, Clone, Copy)]
pub enum TraceEvent<'a, V> {
    /// A frame was entered, or a resumable frame resumed.
    Call(&'a V),
    /// A new line is about to execute.
    Line,
    Return(&'a V),
    Exception(Exception<'a, V>),
}

/// What the runtime must do with the frame's local hook after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceAction {
    /// Keep, or install, the local hook.
    KeepTracing,
    /// Remove the local hook: no more line events for this frame.
    StopTracing,
}
