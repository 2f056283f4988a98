//! The event dispatcher: decides, on every event the runtime reports, whether
//! to hand control to the user.
//!
//! Everything up to the breakpoint lookup runs on every line of the traced
//! program, so the non-stopping path does no allocation and no logging.

use glob::Pattern;
use tracing::trace;

use crate::debugger::{BreakpointHits, Debugger, DebuggerHooks, Position};
use crate::debugger::runtime::{
    Exception, ExceptionKind, FrameId, FrameKind, Runtime, TraceAction, TraceEvent,
};
use crate::error::{DebuggerError, Quit, Result};

/// Line at which the debugger stops next in the target frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Threshold {
    Line(u32),
    /// Never stop on a line event.
    Never,
}

/// Stepping mode.
///
/// | mode       | target        | threshold   |
/// |------------|---------------|-------------|
/// | run        | `None`        | `Never`     |
/// | step       | `None`        | `Line(0)`   |
/// | next/until | current frame | `Line(n)`   |
/// | return     | current frame | `Never`     |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepState {
    pub target: Option<FrameId>,
    pub threshold: Threshold,
}

impl StepState {
    pub const STEP: StepState = StepState {
        target: None,
        threshold: Threshold::Line(0),
    };

    /// Anything but single stepping.
    fn stepping_over(&self) -> bool {
        *self != Self::STEP
    }
}

/// Shell-style module name patterns.
#[derive(Debug, Clone)]
pub struct SkipPatterns {
    patterns: Vec<Pattern>,
}

impl SkipPatterns {
    pub fn new<S: AsRef<str>>(globs: &[S]) -> Result<Self> {
        let patterns = globs
            .iter()
            .map(|g| {
                let g = g.as_ref();
                Pattern::new(g).map_err(|e| {
                    DebuggerError::Config(format!("invalid skip pattern {:?}: {}", g, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn matches(&self, module: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(module))
    }
}

/// Dispatcher state for one traced thread.
#[derive(Debug, Clone)]
pub(crate) struct Tracer {
    pub(crate) step: StepState,
    /// Kind of the target frame, recorded when stepping state is set.
    pub(crate) target_kind: FrameKind,
    /// Outermost frame of the session.
    pub(crate) botframe: Option<FrameId>,
    /// Frame the user is stopped in, while a hook runs.
    pub(crate) topframe: Option<FrameId>,
    pub(crate) quitting: bool,
    pub(crate) ignore_first_call_event: bool,
    pub(crate) skip: SkipPatterns,
}

impl Tracer {
    pub(crate) fn new(skip: SkipPatterns) -> Self {
        Self {
            step: StepState::STEP,
            target_kind: FrameKind::Normal,
            botframe: None,
            topframe: None,
            quitting: false,
            ignore_first_call_event: true,
            skip,
        }
    }

    pub(crate) fn reset(&mut self, ignore_first_call_event: bool, botframe: Option<FrameId>) {
        self.ignore_first_call_event = ignore_first_call_event;
        self.botframe = botframe;
        self.quitting = false;
        self.topframe = None;
        self.step = StepState::STEP;
        self.target_kind = FrameKind::Normal;
    }

    fn stop_here<R: Runtime>(&self, rt: &R, frame: FrameId) -> bool {
        if !self.skip.is_empty()
            && let Some(module) = rt.module_name(frame)
            && self.skip.matches(module)
        {
            return false;
        }
        if self.step.target.is_some_and(|target| target != frame) {
            return false;
        }
        match self.step.threshold {
            Threshold::Never => false,
            Threshold::Line(line) => rt.current_line(frame) >= line,
        }
    }
}

impl Debugger {
    /// Handle one event reported by the runtime for `frame`.
    ///
    /// Call and line events are delivered while global tracing is on; line,
    /// return and exception events only to frames whose local hook is set.
    /// The returned action tells the runtime what to do with that hook.
    ///
    /// `Err(Quit)` aborts the session: the runtime must unwind the traced
    /// program. The local hooks of every frame between `frame` and the bottom
    /// frame are cleared by then.
    pub fn trace_dispatch<R, H>(
        &mut self,
        rt: &mut R,
        hooks: &mut H,
        frame: FrameId,
        event: TraceEvent<'_, R::Value>,
    ) -> Result<TraceAction, Quit>
    where
        R: Runtime,
        H: DebuggerHooks<R> + ?Sized,
    {
        match event {
            TraceEvent::Line => self.dispatch_line(rt, hooks, frame),
            TraceEvent::Call(args) => self.dispatch_call(rt, hooks, frame, args),
            TraceEvent::Return(value) => self.dispatch_return(rt, hooks, frame, value),
            TraceEvent::Exception(exception) => {
                self.dispatch_exception(rt, hooks, frame, &exception)
            }
        }
    }

    fn dispatch_line<R, H>(
        &mut self,
        rt: &mut R,
        hooks: &mut H,
        frame: FrameId,
    ) -> Result<TraceAction, Quit>
    where
        R: Runtime,
        H: DebuggerHooks<R> + ?Sized,
    {
        if self.tracer.stop_here(rt, frame) {
            trace!(frame = %frame, line = rt.current_line(frame), "stop on line");
            self.enter_user(frame);
            hooks.on_line(self, rt, frame, None);
            return self.leave_user(rt, frame);
        }

        if let Some((file, actual)) = self.breakpoint_line(rt, frame) {
            self.enter_user(frame);
            if let Some(hits) = self.process_hits(rt, frame, file, actual) {
                trace!(frame = %frame, actual = %actual, fired = ?hits.fired, "stop at breakpoint");
                hooks.on_line(self, rt, frame, Some(&hits));
            }
            return self.leave_user(rt, frame);
        }
        Ok(TraceAction::KeepTracing)
    }

    fn dispatch_call<R, H>(
        &mut self,
        rt: &mut R,
        hooks: &mut H,
        frame: FrameId,
        args: &R::Value,
    ) -> Result<TraceAction, Quit>
    where
        R: Runtime,
        H: DebuggerHooks<R> + ?Sized,
    {
        if self.tracer.ignore_first_call_event {
            self.tracer.ignore_first_call_event = false;
            return Ok(TraceAction::KeepTracing);
        }

        let resumable = rt.frame_kind(frame) == FrameKind::Resumable;
        let stop_here = self.tracer.stop_here(rt, frame);
        if !(stop_here || self.breakpoints_in_code(rt, frame)) {
            // Resuming the frame a next, until or return was issued in.
            if resumable && self.tracer.step.target == Some(frame) {
                return Ok(TraceAction::KeepTracing);
            }
            return Ok(TraceAction::StopTracing);
        }
        // Resumptions only stop when single stepping.
        if resumable && self.tracer.step.stepping_over() {
            return Ok(TraceAction::KeepTracing);
        }
        if stop_here {
            trace!(frame = %frame, "stop on call");
            self.enter_user(frame);
            hooks.on_call(self, rt, frame, args);
            return self.leave_user(rt, frame);
        }
        // A breakpoint is set in this unit.
        Ok(TraceAction::KeepTracing)
    }

    fn dispatch_return<R, H>(
        &mut self,
        rt: &mut R,
        hooks: &mut H,
        frame: FrameId,
        value: &R::Value,
    ) -> Result<TraceAction, Quit>
    where
        R: Runtime,
        H: DebuggerHooks<R> + ?Sized,
    {
        if self.tracer.stop_here(rt, frame) || self.tracer.step.target == Some(frame) {
            // A resumable frame suspending is not a return worth stopping
            // at, unless single stepping.
            let ignore = rt.frame_kind(frame) == FrameKind::Resumable
                && self.tracer.step.stepping_over();
            if !ignore {
                trace!(frame = %frame, "stop on return");
                self.enter_user(frame);
                hooks.on_return(self, rt, frame, value);
                if self.leave_user(rt, frame)? == TraceAction::StopTracing {
                    return Ok(TraceAction::StopTracing);
                }
            }

            // Keep stepping in the caller.
            if Some(frame) != self.tracer.botframe
                && (self.tracer.step == StepState::STEP || self.tracer.step.target == Some(frame))
            {
                if let Some(caller) = rt.parent(frame)
                    && !rt.has_local_trace(caller)
                {
                    rt.set_local_trace(caller, true);
                }
                if !ignore {
                    self.tracer.step = StepState::STEP;
                    self.tracer.target_kind = FrameKind::Normal;
                }
            }
        }

        if Some(frame) == self.tracer.botframe {
            self.stop_tracing(rt, Some(frame));
            return Ok(TraceAction::StopTracing);
        }
        Ok(TraceAction::KeepTracing)
    }

    fn dispatch_exception<R, H>(
        &mut self,
        rt: &mut R,
        hooks: &mut H,
        frame: FrameId,
        exception: &Exception<'_, R::Value>,
    ) -> Result<TraceAction, Quit>
    where
        R: Runtime,
        H: DebuggerHooks<R> + ?Sized,
    {
        let resumable = rt.frame_kind(frame) == FrameKind::Resumable;
        if self.tracer.stop_here(rt, frame) {
            // The runtime's own iteration-complete signal, raised inside a
            // resumable frame when a nested iteration ends.
            let internal = resumable
                && exception.kind == ExceptionKind::IterationComplete
                && exception.origin.is_none();
            if !internal {
                trace!(frame = %frame, kind = ?exception.kind, "stop on exception");
                self.enter_user(frame);
                hooks.on_exception(self, rt, frame, exception);
                return self.leave_user(rt, frame);
            }
        } else if let Some(target) = self.tracer.step.target
            && target != frame
            && self.tracer.target_kind == FrameKind::Resumable
            && matches!(
                exception.kind,
                ExceptionKind::IterationComplete | ExceptionKind::ResumableExit
            )
        {
            // The user stepped to the end of a resumable frame: show the
            // completion signal in the frame that receives it.
            trace!(frame = %frame, kind = ?exception.kind, "stop on resumable completion");
            self.enter_user(frame);
            hooks.on_exception(self, rt, frame, exception);
            return self.leave_user(rt, frame);
        }
        Ok(TraceAction::KeepTracing)
    }

    fn enter_user(&mut self, frame: FrameId) {
        if self.tracer.botframe.is_none() {
            self.tracer.botframe = Some(frame);
        }
        self.tracer.topframe = Some(frame);
    }

    fn leave_user<R: Runtime>(&mut self, rt: &mut R, frame: FrameId) -> Result<TraceAction, Quit> {
        self.tracer.topframe = None;
        // A session started from the outermost frame is simply detached.
        if self.tracer.quitting
            && self
                .tracer
                .botframe
                .is_some_and(|bot| rt.parent(bot).is_some())
        {
            self.stop_tracing(rt, Some(frame));
            return Err(Quit);
        }
        if !rt.global_trace() {
            return Ok(TraceAction::StopTracing);
        }
        Ok(TraceAction::KeepTracing)
    }

    /// Table and position of the breakpoints at the frame's current line.
    fn breakpoint_line<R: Runtime>(&self, rt: &R, frame: FrameId) -> Option<(usize, Position)> {
        self.store().breakpoint_line(rt.code(frame), rt.current_line(frame))
    }

    fn breakpoints_in_code<R: Runtime>(&self, rt: &R, frame: FrameId) -> bool {
        self.store().breakpoints_in_code(rt.code(frame))
    }

    fn process_hits<R: Runtime>(
        &mut self,
        rt: &mut R,
        frame: FrameId,
        file: usize,
        actual: Position,
    ) -> Option<BreakpointHits> {
        self.store_mut()
            .process_hits(file, actual, |condition| rt.eval_condition(frame, condition))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bracket_classes() {
        // `^` has no special meaning in a class; `!` negates it.
        let caret = SkipPatterns::new(&["a[^x]"]).unwrap();
        assert!(caret.matches("a^"));
        assert!(caret.matches("ax"));
        assert!(!caret.matches("ab"));

        // A `]` right after the opening bracket is a member.
        let bracket = SkipPatterns::new(&["m[!]a]"]).unwrap();
        assert!(bracket.matches("mb"));
        assert!(!bracket.matches("ma"));
        assert!(!bracket.matches("m]"));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(matches!(
            SkipPatterns::new(&["lib.***"]),
            Err(DebuggerError::Config(_))
        ));
    }

    #[test]
    fn test_skip_patterns() {
        let skip = SkipPatterns::new(&["stdlib.*", "vendor.?ib", "tests.[ab]*"]).unwrap();
        assert!(skip.matches("stdlib.os"));
        assert!(skip.matches("vendor.lib"));
        assert!(skip.matches("tests.alpha"));
        assert!(!skip.matches("stdlib"));
        assert!(!skip.matches("vendor.glib2"));
        assert!(!skip.matches("tests.charlie"));
        assert!(!skip.matches("app.stdlib.os"));

        let none = SkipPatterns::new::<&str>(&[]).unwrap();
        assert!(none.is_empty());
        assert!(!none.matches("anything"));
    }

    #[test]
    fn test_step_state_modes() {
        assert!(!StepState::STEP.stepping_over());
        let run = StepState {
            target: None,
            threshold: Threshold::Never,
        };
        assert!(run.stepping_over());
        let next = StepState {
            target: Some(FrameId(1)),
            threshold: Threshold::Line(0),
        };
        assert!(next.stepping_over());
    }
}
