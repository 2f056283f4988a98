//! Breakpoint line resolution.
//!
//! A requested line rarely sits exactly on a statement boundary. The actual
//! breakpoint line is the nearest statement line at or after the request,
//! searched through the nested subunit tree. A request on a `def`/`class`
//! line, or anywhere before one with no statement in between, breaks on the
//! first statement inside that unit rather than on the definition.

use serde::Serialize;
use std::fmt;

use crate::compiler::CompiledSubunit;

/// Resolved location of a breakpoint: the start line of the subunit that
/// owns the statement, and the statement line itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Position {
    pub subunit_start: u32,
    pub line: u32,
}

impl Position {
    pub fn new(subunit_start: u32, line: u32) -> Self {
        Self {
            subunit_start,
            line,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.subunit_start, self.line)
    }
}

/// Resolve `line` against the unit tree rooted at `unit`.
///
/// Returns `None` when `line` is after the last statement of every unit it
/// could belong to.
pub fn resolve(unit: &CompiledSubunit, line: u32) -> Option<Position> {
    distance(unit, line).map(|(_, position)| position)
}

/// Shortest distance from `line` to a statement at or after it, in `unit` or
/// in the nested unit whose start line is the last one not after `line`.
fn distance(unit: &CompiledSubunit, line: u32) -> Option<(u32, Position)> {
    let children = unit.children();
    let idx = children.partition_point(|c| c.start_line <= line);
    let child_distance = if idx > 0 {
        distance(&children[idx - 1], line)
    } else {
        None
    };

    let lines = unit.statement_lines();
    if lines.binary_search(&line).is_ok() && unit.child_at(line).is_none() {
        return Some((0, Position::new(unit.start_line, line)));
    }

    let idx = lines.partition_point(|&l| l <= line);
    let Some(&actual) = lines.get(idx) else {
        // `line` is after every statement of this unit.
        return child_distance;
    };
    let dist = actual - line;
    if let Some((child_dist, _)) = child_distance
        && child_dist < dist
    {
        return child_distance;
    }

    match unit.child_at(actual) {
        None => Some((dist, Position::new(unit.start_line, actual))),
        // Break on definition: use the first statement inside the unit.
        Some(child) => distance(child, line),
    }
}
