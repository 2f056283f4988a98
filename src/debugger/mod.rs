//! Debugger core: breakpoint bookkeeping and the execution event dispatcher.
//!
//! The presentation layer drives a [`Debugger`] through its breakpoint and
//! stepping operations, and gets control back through [`DebuggerHooks`]
//! whenever the dispatcher decides to stop.

mod breakpoint;
mod cache;
pub mod resolver;
pub mod runtime;
mod store;
mod table;
mod tracer;

pub use breakpoint::{Breakpoint, BreakpointId, BreakpointRegistry, HitOutcome};
pub use cache::IntegersCache;
pub use resolver::Position;
pub use runtime::{
    CodeRef, Exception, ExceptionKind, FrameId, FrameKind, Location, Runtime, TraceAction,
    TraceEvent,
};
pub use store::BreakpointStore;
pub use table::BreakpointTable;
pub use tracer::{SkipPatterns, StepState, Threshold};

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::DebuggerConfig;
use crate::error::Result;
use crate::source::{self, SourceLoader};
use tracer::Tracer;

/// Breakpoints that stopped the program on a line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BreakpointHits {
    /// Breakpoints that fired, by number.
    pub fired: Vec<BreakpointId>,
    /// Fired temporary breakpoints that should now be deleted, by number.
    pub temporaries: Vec<BreakpointId>,
}

/// Callbacks into the presentation layer.
///
/// Each runs with the traced program suspended, and may block for as long as
/// the user needs. They receive the debugger back so that they can change
/// breakpoints and set the next stepping mode; a hook that sets nothing
/// leaves the previous mode in force.
#[allow(unused_variables)]
pub trait DebuggerHooks<R: Runtime> {
    /// There is a remote possibility that the debugger stops in this frame.
    fn on_call(&mut self, dbg: &mut Debugger, rt: &mut R, frame: FrameId, args: &R::Value) {}

    /// Stopped at a line, by a stepping command or, with `hits`, at
    /// breakpoints.
    fn on_line(
        &mut self,
        dbg: &mut Debugger,
        rt: &mut R,
        frame: FrameId,
        hits: Option<&BreakpointHits>,
    ) {
    }

    fn on_return(&mut self, dbg: &mut Debugger, rt: &mut R, frame: FrameId, value: &R::Value) {}

    fn on_exception(
        &mut self,
        dbg: &mut Debugger,
        rt: &mut R,
        frame: FrameId,
        exception: &Exception<'_, R::Value>,
    ) {
    }
}

/// Where to set a breakpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakLocation {
    Line(u32),
    /// A function, by name qualified with its enclosing classes.
    Function(String),
}

impl BreakLocation {
    pub fn function(name: impl Into<String>) -> Self {
        BreakLocation::Function(name.into())
    }
}

/// Debugger state.
///
/// One instance serves one traced thread. The breakpoints live in a
/// [`BreakpointStore`] that [`Debugger::for_thread`] shares with the
/// debuggers of other threads; each keeps its own stepping state.
pub struct Debugger {
    config: DebuggerConfig,
    store: Arc<RwLock<BreakpointStore>>,
    tracer: Tracer,
}

impl Debugger {
    pub fn new(config: DebuggerConfig, loader: impl SourceLoader + 'static) -> Result<Self> {
        let skip = SkipPatterns::new(&config.skip)?;
        let store = BreakpointStore::new(config.case_insensitive_paths, Box::new(loader));
        Ok(Self {
            config,
            store: Arc::new(RwLock::new(store)),
            tracer: Tracer::new(skip),
        })
    }

    /// A debugger for another thread, sharing this one's breakpoints.
    ///
    /// Its session starts fresh: the first call event it sees is ignored.
    pub fn for_thread(&self) -> Debugger {
        Self {
            config: self.config.clone(),
            store: Arc::clone(&self.store),
            tracer: Tracer::new(self.tracer.skip.clone()),
        }
    }

    pub fn config(&self) -> &DebuggerConfig {
        &self.config
    }

    /// Canonical form of a file name, as breakpoints record it.
    pub fn canonic(&self, filename: &str) -> String {
        source::canonic(filename, self.config.case_insensitive_paths)
    }

    /// Read access to the shared breakpoints.
    ///
    /// Drop the guard before changing breakpoints through this debugger or
    /// any debugger sharing them.
    pub fn store(&self) -> RwLockReadGuard<'_, BreakpointStore> {
        self.store.read().unwrap_or_else(|e| e.into_inner())
    }

    fn store_mut(&self) -> RwLockWriteGuard<'_, BreakpointStore> {
        self.store.write().unwrap_or_else(|e| e.into_inner())
    }

    // Breakpoints

    /// Set a breakpoint, loading the file on first use.
    ///
    /// Frames of the current stack that run the breakpoint's subunit get
    /// their local hook, so the breakpoint fires without re-entering them.
    pub fn set_break<R: Runtime>(
        &mut self,
        rt: &mut R,
        filename: &str,
        location: BreakLocation,
        temporary: bool,
        condition: Option<String>,
    ) -> Result<BreakpointId> {
        let filename = self.canonic(filename);
        let (id, actual, pathnames) =
            self.store_mut().add(&filename, location, temporary, condition)?;

        let mut current = self.tracer.topframe;
        while let Some(frame) = current {
            let code = rt.code(frame);
            let runs_subunit = code.first_line == actual.subunit_start
                && pathnames.iter().any(|n| n == code.filename);
            if runs_subunit && !rt.has_local_trace(frame) {
                rt.set_local_trace(frame, true);
            }
            if Some(frame) == self.tracer.botframe {
                break;
            }
            current = rt.parent(frame);
        }
        Ok(id)
    }

    /// Delete the breakpoints requested at `filename:line`.
    pub fn clear_break(&mut self, filename: &str, line: u32) -> Result<Vec<BreakpointId>> {
        self.store_mut().clear_break(filename, line)
    }

    pub fn clear_by_id(&mut self, id: BreakpointId) -> Result<()> {
        self.store_mut().delete(id)
    }

    /// Delete every breakpoint, returning their numbers.
    pub fn clear_all(&mut self) -> Vec<BreakpointId> {
        self.store_mut().clear_all()
    }

    pub fn enable(&mut self, id: BreakpointId) -> Result<()> {
        self.store_mut().breakpoint_mut(id)?.enabled = true;
        Ok(())
    }

    pub fn disable(&mut self, id: BreakpointId) -> Result<()> {
        self.store_mut().breakpoint_mut(id)?.enabled = false;
        Ok(())
    }

    pub fn set_condition(&mut self, id: BreakpointId, condition: Option<String>) -> Result<()> {
        self.store_mut().breakpoint_mut(id)?.condition = condition;
        Ok(())
    }

    pub fn set_ignore(&mut self, id: BreakpointId, count: u32) -> Result<()> {
        self.store_mut().breakpoint_mut(id)?.ignore_count = count;
        Ok(())
    }

    /// A snapshot of a breakpoint.
    pub fn breakpoint(&self, id: BreakpointId) -> Result<Breakpoint> {
        self.store().breakpoint(id).cloned()
    }

    /// Snapshots of the live breakpoints, by number.
    pub fn breakpoints(&self) -> Vec<Breakpoint> {
        self.store().breakpoints().cloned().collect()
    }

    /// Breakpoints requested at exactly `filename:line`, by number.
    pub fn get_breakpoints(&self, filename: &str, line: u32) -> Result<Vec<BreakpointId>> {
        self.store().get_breakpoints(filename, line)
    }

    /// Requested lines of the breakpoints of a file, by breakpoint number.
    pub fn get_file_breaks(&self, filename: &str) -> Vec<u32> {
        self.store().get_file_breaks(filename)
    }

    pub fn has_breakpoints(&self) -> bool {
        self.store().has_breakpoints()
    }

    /// Reload every source that changed and resolve its breakpoints again.
    ///
    /// Returns the breakpoints that were deleted because they no longer
    /// resolve.
    pub fn restart(&mut self) -> Vec<BreakpointId> {
        self.store_mut().restart()
    }

    // Stepping

    /// Point the stepping state at `target`, which must be a frame between
    /// the current top frame and the bottom frame; any other frame is
    /// replaced by the bottom frame.
    fn set_stopinfo<R: Runtime>(
        &mut self,
        rt: &mut R,
        target: Option<FrameId>,
        threshold: Threshold,
    ) {
        let mut target = target;
        if let Some(wanted) = target {
            let mut current = self.tracer.topframe;
            while let Some(frame) = current
                && frame != wanted
            {
                if Some(frame) == self.tracer.botframe {
                    target = self.tracer.botframe;
                    break;
                }
                current = rt.parent(frame);
            }
        }

        self.tracer.target_kind = FrameKind::Normal;
        if let Some(frame) = target {
            if !rt.has_local_trace(frame) {
                rt.set_local_trace(frame, true);
            }
            self.tracer.target_kind = rt.frame_kind(frame);
        }
        self.tracer.step = StepState { target, threshold };
    }

    /// Stop at the next line event, in any frame.
    pub fn set_step(&mut self) {
        self.tracer.step = StepState::STEP;
        self.tracer.target_kind = FrameKind::Normal;
    }

    /// Stop at the next line of `frame`, or when it returns.
    pub fn set_next<R: Runtime>(&mut self, rt: &mut R, frame: FrameId) {
        self.set_stopinfo(rt, Some(frame), Threshold::Line(0));
    }

    /// Stop in `frame` at a line past `line` (by default its current line),
    /// or when it returns.
    pub fn set_until<R: Runtime>(&mut self, rt: &mut R, frame: FrameId, line: Option<u32>) {
        let line = line.unwrap_or_else(|| rt.current_line(frame) + 1);
        self.set_stopinfo(rt, Some(frame), Threshold::Line(line));
    }

    /// Stop when `frame` returns.
    pub fn set_return<R: Runtime>(&mut self, rt: &mut R, frame: FrameId) {
        self.set_stopinfo(rt, Some(frame), Threshold::Never);
    }

    /// Run until a breakpoint. Without breakpoints, tracing stops altogether.
    pub fn set_continue<R: Runtime>(&mut self, rt: &mut R) {
        self.set_stopinfo(rt, None, Threshold::Never);
        if !self.has_breakpoints() {
            self.stop_tracing(rt, None);
        }
    }

    /// End the session. The dispatcher aborts the traced program with
    /// [`Quit`](crate::error::Quit) when it next returns.
    pub fn set_quit<R: Runtime>(&mut self, rt: &mut R) {
        self.tracer.quitting = true;
        self.stop_tracing(rt, None);
    }

    /// Start debugging from `frame`.
    ///
    /// The bottom frame of a session already in progress is kept when it is
    /// on the stack of `frame`; otherwise the outermost frame becomes the
    /// bottom frame.
    pub fn set_trace<R: Runtime>(&mut self, rt: &mut R, frame: FrameId) {
        rt.set_global_trace(false);
        rt.set_local_trace(frame, true);

        let botframe = self.tracer.botframe;
        self.tracer.reset(false, botframe);
        self.tracer.topframe = Some(frame);

        let mut outermost = frame;
        let mut current = Some(frame);
        let mut found = false;
        while let Some(f) = current {
            if Some(f) == self.tracer.botframe {
                found = true;
                break;
            }
            outermost = f;
            current = rt.parent(f);
        }
        if !found {
            self.tracer.botframe = Some(outermost);
        }

        // The bottom frame's return event ends the session.
        if let Some(bot) = self.tracer.botframe
            && !rt.has_local_trace(bot)
        {
            rt.set_local_trace(bot, true);
        }
        rt.set_global_trace(true);
    }

    /// Forget the session: the next call event is the debugger's own entry
    /// and is ignored.
    pub fn reset(&mut self) {
        self.tracer.reset(true, None);
    }

    /// Turn tracing off, clearing the local hooks from `frame` (by default
    /// the frame stopped in) down to the bottom frame.
    pub fn stop_tracing<R: Runtime>(&mut self, rt: &mut R, frame: Option<FrameId>) {
        rt.set_global_trace(false);
        let mut current = frame.or(self.tracer.topframe);
        while let Some(f) = current {
            rt.set_local_trace(f, false);
            if Some(f) == self.tracer.botframe {
                break;
            }
            current = rt.parent(f);
        }
    }

    /// `(frame, line)` pairs from the bottom frame up to `frame`.
    pub fn stack<R: Runtime>(&self, rt: &R, frame: FrameId) -> Vec<(FrameId, u32)> {
        let mut stack = Vec::new();
        let mut current = Some(frame);
        while let Some(f) = current {
            stack.push((f, rt.current_line(f)));
            if Some(f) == self.tracer.botframe {
                break;
            }
            current = rt.parent(f);
        }
        stack.reverse();
        stack
    }

    pub fn step_state(&self) -> StepState {
        self.tracer.step
    }

    pub fn bottom_frame(&self) -> Option<FrameId> {
        self.tracer.botframe
    }

    pub fn is_quitting(&self) -> bool {
        self.tracer.quitting
    }
}
