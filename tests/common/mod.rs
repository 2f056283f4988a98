//! A simulated host runtime for driving the dispatcher the way an interpreter
//! would: call events while global tracing is on, line, return and exception
//! events only for frames with a local hook.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};

use stepwise::debugger::{CodeRef, Exception, ExceptionKind, Location};
use stepwise::{
    BreakLocation, BreakpointHits, BreakpointId, ConditionError, Debugger, DebuggerConfig,
    DebuggerHooks, FrameId, FrameKind, MemoryLoader, Quit, Runtime, TraceAction, TraceEvent,
};

pub const PROG: &str = "\
\"\"\"Demo program.\"\"\"
def f(n):
    x = n + 1
    return x

def g():
    y = f(1)
    return y

r = g()
print(r)
";

/// Compiled units of [`PROG`]: module at 1, `f` at 2, `g` at 6.
pub const MODULE: u32 = 1;
pub const F: u32 = 2;
pub const G: u32 = 6;

#[derive(Debug, Clone)]
pub struct Frame {
    pub parent: Option<FrameId>,
    pub filename: String,
    pub first_line: u32,
    pub name: String,
    pub module: String,
    pub line: u32,
    pub kind: FrameKind,
    pub locals: HashMap<String, i64>,
    pub local_trace: bool,
}

#[derive(Debug, Default)]
pub struct MockRuntime {
    frames: Vec<Frame>,
    /// Frames currently executing, outermost first.
    stack: Vec<FrameId>,
    global_trace: bool,
    pub evaluations: usize,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn frame(&self, id: FrameId) -> &Frame {
        &self.frames[id.0 as usize]
    }

    fn frame_mut(&mut self, id: FrameId) -> &mut Frame {
        &mut self.frames[id.0 as usize]
    }

    /// Push a new frame on top of the stack, without delivering any event.
    pub fn push(
        &mut self,
        filename: &str,
        first_line: u32,
        name: &str,
        kind: FrameKind,
    ) -> FrameId {
        let id = FrameId(self.frames.len() as u64);
        self.frames.push(Frame {
            parent: self.stack.last().copied(),
            filename: filename.to_string(),
            first_line,
            name: name.to_string(),
            module: "__main__".to_string(),
            line: first_line,
            kind,
            locals: HashMap::new(),
            local_trace: false,
        });
        self.stack.push(id);
        id
    }

    /// Put a suspended resumable frame back on top of the stack.
    pub fn resume(&mut self, id: FrameId) {
        let parent = self.stack.last().copied();
        self.frame_mut(id).parent = parent;
        self.stack.push(id);
    }

    pub fn pop(&mut self) -> Option<FrameId> {
        self.stack.pop()
    }

    pub fn top(&self) -> Option<FrameId> {
        self.stack.last().copied()
    }

    pub fn set_var(&mut self, frame: FrameId, name: &str, value: i64) {
        self.frame_mut(frame).locals.insert(name.to_string(), value);
    }

    pub fn set_module(&mut self, frame: FrameId, module: &str) {
        self.frame_mut(frame).module = module.to_string();
    }

    pub fn set_line(&mut self, frame: FrameId, line: u32) {
        self.frame_mut(frame).line = line;
    }

    pub fn traced(&self, frame: FrameId) -> bool {
        self.frame(frame).local_trace
    }

    pub fn live_frames(&self) -> &[FrameId] {
        &self.stack
    }

    fn lookup(&self, frame: FrameId, name: &str) -> Result<i64, ConditionError> {
        self.frame(frame)
            .locals
            .get(name)
            .copied()
            .ok_or_else(|| ConditionError(format!("name '{}' is not defined", name)))
    }
}

impl Runtime for MockRuntime {
    type Value = i64;

    fn current_line(&self, frame: FrameId) -> u32 {
        self.frame(frame).line
    }

    fn code(&self, frame: FrameId) -> CodeRef<'_> {
        let frame = self.frame(frame);
        CodeRef {
            filename: &frame.filename,
            first_line: frame.first_line,
            name: &frame.name,
        }
    }

    fn parent(&self, frame: FrameId) -> Option<FrameId> {
        self.frame(frame).parent
    }

    fn frame_kind(&self, frame: FrameId) -> FrameKind {
        self.frame(frame).kind
    }

    fn module_name(&self, frame: FrameId) -> Option<&str> {
        Some(&self.frame(frame).module)
    }

    fn has_local_trace(&self, frame: FrameId) -> bool {
        self.frame(frame).local_trace
    }

    fn set_local_trace(&mut self, frame: FrameId, enabled: bool) {
        self.frame_mut(frame).local_trace = enabled;
    }

    fn global_trace(&self) -> bool {
        self.global_trace
    }

    fn set_global_trace(&mut self, enabled: bool) {
        self.global_trace = enabled;
    }

    /// Understands `name`, `name == N`, `name > N` and `name < N`.
    fn eval_condition(&mut self, frame: FrameId, condition: &str) -> Result<bool, ConditionError> {
        self.evaluations += 1;
        let parts: Vec<&str> = condition.split_whitespace().collect();
        match parts.as_slice() {
            [name] => Ok(self.lookup(frame, name)? != 0),
            [name, op, value] => {
                let lhs = self.lookup(frame, name)?;
                let rhs: i64 = value
                    .parse()
                    .map_err(|_| ConditionError(format!("invalid literal {}", value)))?;
                match *op {
                    "==" => Ok(lhs == rhs),
                    ">" => Ok(lhs > rhs),
                    "<" => Ok(lhs < rhs),
                    _ => Err(ConditionError(format!("unsupported operator {}", op))),
                }
            }
            _ => Err(ConditionError("invalid syntax".to_string())),
        }
    }
}

/// A stop the dispatcher handed to the hooks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stop {
    Call { frame: FrameId, line: u32 },
    Line { frame: FrameId, line: u32, hits: Option<BreakpointHits> },
    Return { frame: FrameId, value: i64 },
    Exception { frame: FrameId, kind: ExceptionKind },
}

/// What the user types at a stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Step,
    Next,
    Until(Option<u32>),
    Return,
    Continue,
    Quit,
    /// Set a breakpoint in [`PROG`], then run the next command.
    Break(u32),
}

/// Hooks that record every stop and answer with scripted commands, then
/// with `Continue` once the script runs out.
#[derive(Debug, Default)]
pub struct Recorder {
    pub stops: Vec<Stop>,
    /// `stack()` at each stop.
    pub stacks: Vec<Vec<(FrameId, u32)>>,
    pub script: VecDeque<Command>,
    /// Delete fired temporaries, as an interactive shell does.
    pub delete_temporaries: bool,
    pub set: Vec<BreakpointId>,
}

impl Recorder {
    pub fn new(script: impl IntoIterator<Item = Command>) -> Self {
        Self {
            script: script.into_iter().collect(),
            ..Default::default()
        }
    }

    fn answer(&mut self, dbg: &mut Debugger, rt: &mut MockRuntime, frame: FrameId) {
        self.stacks.push(dbg.stack(rt, frame));
        loop {
            let command = self.script.pop_front().unwrap_or(Command::Continue);
            match command {
                Command::Step => dbg.set_step(),
                Command::Next => dbg.set_next(rt, frame),
                Command::Until(line) => dbg.set_until(rt, frame, line),
                Command::Return => dbg.set_return(rt, frame),
                Command::Continue => dbg.set_continue(rt),
                Command::Quit => dbg.set_quit(rt),
                Command::Break(line) => {
                    let id = dbg
                        .set_break(rt, "<prog>", BreakLocation::Line(line), false, None)
                        .unwrap();
                    self.set.push(id);
                    continue;
                }
            }
            break;
        }
    }
}

impl DebuggerHooks<MockRuntime> for Recorder {
    fn on_call(&mut self, dbg: &mut Debugger, rt: &mut MockRuntime, frame: FrameId, _args: &i64) {
        self.stops.push(Stop::Call {
            frame,
            line: rt.current_line(frame),
        });
        self.answer(dbg, rt, frame);
    }

    fn on_line(
        &mut self,
        dbg: &mut Debugger,
        rt: &mut MockRuntime,
        frame: FrameId,
        hits: Option<&BreakpointHits>,
    ) {
        self.stops.push(Stop::Line {
            frame,
            line: rt.current_line(frame),
            hits: hits.cloned(),
        });
        if self.delete_temporaries
            && let Some(hits) = hits
        {
            for &id in &hits.temporaries {
                dbg.clear_by_id(id).unwrap();
            }
        }
        self.answer(dbg, rt, frame);
    }

    fn on_return(&mut self, dbg: &mut Debugger, rt: &mut MockRuntime, frame: FrameId, value: &i64) {
        self.stops.push(Stop::Return {
            frame,
            value: *value,
        });
        self.answer(dbg, rt, frame);
    }

    fn on_exception(
        &mut self,
        dbg: &mut Debugger,
        rt: &mut MockRuntime,
        frame: FrameId,
        exception: &Exception<'_, i64>,
    ) {
        self.stops.push(Stop::Exception {
            frame,
            kind: exception.kind,
        });
        self.answer(dbg, rt, frame);
    }
}

/// A traced program: runtime, debugger and hooks.
pub struct Session {
    pub rt: MockRuntime,
    pub dbg: Debugger,
    pub hooks: Recorder,
    pub loader: MemoryLoader,
}

impl Session {
    pub fn new(script: impl IntoIterator<Item = Command>) -> Self {
        Self::with_config(DebuggerConfig::default(), script)
    }

    pub fn with_config(config: DebuggerConfig, script: impl IntoIterator<Item = Command>) -> Self {
        let loader = MemoryLoader::new();
        loader.insert("<prog>", PROG);
        let dbg = Debugger::new(config, loader.clone()).unwrap();
        Self::with_debugger(dbg, loader, script)
    }

    /// A session around a debugger built elsewhere, such as one made by
    /// [`Debugger::for_thread`].
    pub fn with_debugger(
        dbg: Debugger,
        loader: MemoryLoader,
        script: impl IntoIterator<Item = Command>,
    ) -> Self {
        Self {
            rt: MockRuntime::new(),
            dbg,
            hooks: Recorder::new(script),
            loader,
        }
    }

    /// Start the way `run()` starts a program: a host frame that is never
    /// traced, then the debugger's own entry, whose call event is ignored,
    /// and the module frame.
    pub fn start(&mut self) -> Result<FrameId, Quit> {
        self.start_file("<prog>")
    }

    /// Like [`Session::start`], for a module frame reporting `filename`.
    pub fn start_file(&mut self, filename: &str) -> Result<FrameId, Quit> {
        self.rt.push("<host>", 1, "run", FrameKind::Normal);
        self.dbg.reset();
        self.rt.set_global_trace(true);
        self.call(filename, MODULE, "<module>", FrameKind::Normal)
    }

    fn dispatch(
        &mut self,
        frame: FrameId,
        event: TraceEvent<'_, i64>,
    ) -> Result<TraceAction, Quit> {
        self.dbg.trace_dispatch(&mut self.rt, &mut self.hooks, frame, event)
    }

    fn apply(&mut self, frame: FrameId, action: TraceAction) {
        self.rt.set_local_trace(frame, action == TraceAction::KeepTracing);
    }

    fn deliver_local(&self, frame: FrameId) -> bool {
        self.rt.global_trace() && self.rt.traced(frame)
    }

    pub fn call(
        &mut self,
        filename: &str,
        first_line: u32,
        name: &str,
        kind: FrameKind,
    ) -> Result<FrameId, Quit> {
        let frame = self.rt.push(filename, first_line, name, kind);
        self.enter(frame, 0)?;
        Ok(frame)
    }

    /// Call a function defined in another module.
    pub fn call_module(
        &mut self,
        filename: &str,
        first_line: u32,
        name: &str,
        module: &str,
    ) -> Result<FrameId, Quit> {
        let frame = self.rt.push(filename, first_line, name, FrameKind::Normal);
        self.rt.set_module(frame, module);
        self.enter(frame, 0)?;
        Ok(frame)
    }

    /// Call a function of [`PROG`] with one argument bound to `n`.
    pub fn call_with(&mut self, first_line: u32, name: &str, n: i64) -> Result<FrameId, Quit> {
        let frame = self.rt.push("<prog>", first_line, name, FrameKind::Normal);
        self.rt.set_var(frame, "n", n);
        self.enter(frame, n)?;
        Ok(frame)
    }

    /// Resume a suspended resumable frame.
    pub fn resume(&mut self, frame: FrameId) -> Result<(), Quit> {
        self.rt.resume(frame);
        self.enter(frame, 0)
    }

    fn enter(&mut self, frame: FrameId, args: i64) -> Result<(), Quit> {
        if self.rt.global_trace() {
            let action = self.dispatch(frame, TraceEvent::Call(&args))?;
            self.apply(frame, action);
        }
        Ok(())
    }

    /// Execute `line` in the top frame.
    pub fn line(&mut self, line: u32) -> Result<(), Quit> {
        let frame = self.rt.top().unwrap();
        self.rt.set_line(frame, line);
        if self.deliver_local(frame) {
            let action = self.dispatch(frame, TraceEvent::Line)?;
            self.apply(frame, action);
        }
        Ok(())
    }

    pub fn lines(&mut self, lines: &[u32]) -> Result<(), Quit> {
        for &line in lines {
            self.line(line)?;
        }
        Ok(())
    }

    /// Return from, or suspend, the top frame.
    pub fn ret(&mut self, value: i64) -> Result<(), Quit> {
        let frame = self.rt.top().unwrap();
        if self.deliver_local(frame) {
            self.dispatch(frame, TraceEvent::Return(&value))?;
        }
        self.rt.pop();
        Ok(())
    }

    pub fn raise(&mut self, kind: ExceptionKind, origin: Option<Location>) -> Result<(), Quit> {
        let frame = self.rt.top().unwrap();
        if self.deliver_local(frame) {
            let value = -1;
            let exception = Exception {
                kind,
                value: &value,
                origin,
            };
            let action = self.dispatch(frame, TraceEvent::Exception(exception))?;
            self.apply(frame, action);
        }
        Ok(())
    }

    /// Run [`PROG`] from its first line to the end.
    pub fn run_prog(&mut self) -> Result<(), Quit> {
        self.start()?;
        self.lines(&[1, 2, 6, 10])?;
        self.call("<prog>", G, "g", FrameKind::Normal)?;
        self.line(7)?;
        self.call_with(F, "f", 1)?;
        self.lines(&[3, 4])?;
        self.ret(2)?;
        self.line(8)?;
        self.ret(2)?;
        self.line(11)?;
        self.ret(0)
    }

    pub fn line_stops(&self) -> Vec<u32> {
        self.hooks
            .stops
            .iter()
            .filter_map(|stop| match stop {
                Stop::Line { line, .. } => Some(*line),
                _ => None,
            })
            .collect()
    }
}
