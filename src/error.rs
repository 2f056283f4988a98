//! Error types shared by the source index, the breakpoint tables and the
//! debugger facade.

use thiserror::Error;

use crate::debugger::BreakpointId;

/// Errors returned to callers of the debugger API.
///
/// None of these are fatal to the traced program: they are reported to the
/// presentation layer, which decides what to show.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DebuggerError {
    /// The source file is unreadable or empty.
    #[error("{file}: {reason}")]
    Source { file: String, reason: String },

    /// The source file does not parse.
    #[error("{file}:{line}: {message}")]
    Syntax {
        file: String,
        line: u32,
        message: String,
    },

    /// The requested line is past every statement of the file.
    #[error("{file}: line {line} is after the last valid statement")]
    LineResolution { file: String, line: u32 },

    #[error("{file}: function \"{name}\" not found")]
    FunctionNotFound { file: String, name: String },

    #[error("Breakpoint number {0} out of range")]
    BreakpointNotFound(u32),

    #[error("Breakpoint {0} already deleted")]
    AlreadyDeleted(BreakpointId),

    #[error("There is no breakpoint at {file}:{line}")]
    NoBreakpointAt { file: String, line: u32 },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl DebuggerError {
    pub(crate) fn source_error(file: &str, reason: impl Into<String>) -> Self {
        DebuggerError::Source {
            file: file.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn syntax(file: &str, line: u32, message: impl Into<String>) -> Self {
        DebuggerError::Syntax {
            file: file.to_string(),
            line,
            message: message.into(),
        }
    }
}

/// Failure to evaluate a breakpoint condition in the frame's namespace.
///
/// The dispatcher never lets this reach the traced program: the breakpoint
/// stops instead, and a temporary breakpoint is kept.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ConditionError(pub String);

/// Abort signal used to unwind the debugging session itself.
///
/// By the time a dispatcher returns it, every frame between the current frame
/// and the bottom frame has had its local hook cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("debugging session aborted")]
pub struct Quit;

pub type Result<T, E = DebuggerError> = std::result::Result<T, E>;
