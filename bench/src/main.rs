use serde::Serialize;
use std::hint::black_box;
use std::time::Instant;

use stepwise::debugger::CodeRef;
use stepwise::{
    BreakLocation, BreakpointHits, ConditionError, Debugger, DebuggerConfig, DebuggerHooks,
    FrameId, FrameKind, MemoryLoader, Runtime, TraceEvent,
};

const PROGRAM: &str = "\
x = 0
def f(n):
    a = n
    b = a + 1
    c = b * 2
    return c

def g():
    return f(1)
";

/// Lines of `f` the traced frame cycles through.
const HOT_LINES: [u32; 3] = [3, 4, 5];
const EVENTS: u64 = 5_000_000;

#[derive(Serialize)]
struct BenchmarkResult {
    name: String,
    events: u64,
    ns_per_event: f64,
    stops: u64,
}

#[derive(Serialize)]
struct BenchmarkOutput {
    results: Vec<BenchmarkResult>,
}

/// One frame running `f`, always traced.
struct HotFrame {
    line: u32,
    global: bool,
}

impl Runtime for HotFrame {
    type Value = ();

    fn current_line(&self, _frame: FrameId) -> u32 {
        self.line
    }

    fn code(&self, _frame: FrameId) -> CodeRef<'_> {
        CodeRef {
            filename: "<bench>",
            first_line: 2,
            name: "f",
        }
    }

    fn parent(&self, _frame: FrameId) -> Option<FrameId> {
        None
    }

    fn frame_kind(&self, _frame: FrameId) -> FrameKind {
        FrameKind::Normal
    }

    fn module_name(&self, _frame: FrameId) -> Option<&str> {
        Some("__main__")
    }

    fn has_local_trace(&self, _frame: FrameId) -> bool {
        true
    }

    fn set_local_trace(&mut self, _frame: FrameId, _enabled: bool) {}

    fn global_trace(&self) -> bool {
        self.global
    }

    fn set_global_trace(&mut self, enabled: bool) {
        self.global = enabled;
    }

    fn eval_condition(
        &mut self,
        _frame: FrameId,
        _condition: &str,
    ) -> Result<bool, ConditionError> {
        Ok(true)
    }
}

#[derive(Default)]
struct CountStops {
    stops: u64,
}

impl DebuggerHooks<HotFrame> for CountStops {
    fn on_line(
        &mut self,
        _dbg: &mut Debugger,
        _rt: &mut HotFrame,
        _frame: FrameId,
        _hits: Option<&BreakpointHits>,
    ) {
        self.stops += 1;
    }
}

fn run_case(name: &str, breakpoints: &[u32]) -> BenchmarkResult {
    let loader = MemoryLoader::new();
    loader.insert("<bench>", PROGRAM);
    let mut dbg = match Debugger::new(DebuggerConfig::default(), loader) {
        Ok(dbg) => dbg,
        Err(e) => panic!("failed to create debugger: {}", e),
    };
    let mut rt = HotFrame {
        line: HOT_LINES[0],
        global: true,
    };
    for &line in breakpoints {
        if let Err(e) = dbg.set_break(&mut rt, "<bench>", BreakLocation::Line(line), false, None) {
            panic!("failed to set breakpoint at line {}: {}", line, e);
        }
    }
    dbg.set_continue(&mut rt);

    let mut hooks = CountStops::default();
    let frame = FrameId(0);
    let start = Instant::now();
    for i in 0..EVENTS {
        rt.line = HOT_LINES[(i % HOT_LINES.len() as u64) as usize];
        let action = dbg.trace_dispatch(&mut rt, &mut hooks, frame, TraceEvent::Line);
        let _ = black_box(action);
    }
    let elapsed = start.elapsed();

    BenchmarkResult {
        name: name.to_string(),
        events: EVENTS,
        ns_per_event: elapsed.as_nanos() as f64 / EVENTS as f64,
        stops: hooks.stops,
    }
}

fn main() {
    let results = vec![
        run_case("no_breakpoints", &[]),
        // Line 9 is in `g`.
        run_case("other_subunit", &[9]),
        // Line 6 is in `f`, which never reaches it here.
        run_case("same_subunit_other_line", &[6]),
    ];

    let output = BenchmarkOutput { results };
    println!("{}", serde_json::to_string_pretty(&output).unwrap());
}
