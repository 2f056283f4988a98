use serde::Serialize;
use std::fmt;
use tracing::warn;

use crate::debugger::Position;
use crate::error::{ConditionError, DebuggerError, Result};

/// Breakpoint number. Numbers start at 1 and are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct BreakpointId(pub u32);

impl fmt::Display for BreakpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Breakpoint {
    pub id: BreakpointId,
    /// Canonical file name.
    pub file: String,
    /// Line as requested by the user.
    pub line: u32,
    /// Where the breakpoint actually stops.
    pub actual: Position,
    pub condition: Option<String>,
    pub enabled: bool,
    pub temporary: bool,
    pub ignore_count: u32,
    pub hit_count: u32,
}

/// Outcome of a breakpoint hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HitOutcome {
    pub stop: bool,
    /// A temporary breakpoint that stopped may now be deleted.
    pub may_delete: bool,
}

impl HitOutcome {
    const SKIP: HitOutcome = HitOutcome {
        stop: false,
        may_delete: false,
    };
}

impl Breakpoint {
    pub fn new(file: impl Into<String>, line: u32, actual: Position) -> Self {
        Self {
            id: BreakpointId(0),
            file: file.into(),
            line,
            actual,
            condition: None,
            enabled: true,
            temporary: false,
            ignore_count: 0,
            hit_count: 0,
        }
    }

    /// Account for the execution reaching this breakpoint.
    ///
    /// `eval` evaluates the condition in the hit frame. A failed evaluation
    /// stops, but never lets a temporary breakpoint be deleted.
    pub fn process_hit<F>(&mut self, eval: F) -> HitOutcome
    where
        F: FnOnce(&str) -> std::result::Result<bool, ConditionError>,
    {
        if !self.enabled {
            return HitOutcome::SKIP;
        }
        self.hit_count += 1;

        if let Some(condition) = &self.condition {
            match eval(condition) {
                Ok(true) => {}
                Ok(false) => return HitOutcome::SKIP,
                Err(e) => {
                    warn!(
                        breakpoint = %self.id,
                        condition = %condition,
                        error = %e,
                        "breakpoint condition failed"
                    );
                    return HitOutcome {
                        stop: true,
                        may_delete: false,
                    };
                }
            }
        }

        if self.ignore_count > 0 {
            self.ignore_count -= 1;
            return HitOutcome::SKIP;
        }
        HitOutcome {
            stop: true,
            may_delete: true,
        }
    }
}

impl fmt::Display for Breakpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let disp = if self.temporary { "del  " } else { "keep " };
        let enabled = if self.enabled { "yes  " } else { "no   " };
        write!(
            f,
            "{:<4}breakpoint   {}{} at {}:{}",
            self.id.0, disp, enabled, self.file, self.line
        )?;
        if let Some(condition) = &self.condition {
            write!(f, "\n\tstop only if {}", condition)?;
        }
        if self.ignore_count > 0 {
            write!(f, "\n\tignore next {} hits", self.ignore_count)?;
        }
        if self.hit_count > 0 {
            let plural = if self.hit_count > 1 { "s" } else { "" };
            write!(f, "\n\tbreakpoint already hit {} time{}", self.hit_count, plural)?;
        }
        Ok(())
    }
}

/// Every breakpoint ever created, indexed by number.
///
/// A deleted breakpoint leaves a tombstone so its number stays taken.
#[derive(Debug, Clone, Default)]
pub struct BreakpointRegistry {
    slots: Vec<Option<Breakpoint>>,
}

impl BreakpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> BreakpointId {
        BreakpointId(self.slots.len() as u32 + 1)
    }

    /// Number `bp` and store it.
    pub fn insert(&mut self, mut bp: Breakpoint) -> BreakpointId {
        let id = self.next_id();
        bp.id = id;
        self.slots.push(Some(bp));
        id
    }

    fn slot(&self, id: BreakpointId) -> Result<usize> {
        let idx = (id.0 as usize)
            .checked_sub(1)
            .filter(|&idx| idx < self.slots.len())
            .ok_or(DebuggerError::BreakpointNotFound(id.0))?;
        if self.slots[idx].is_none() {
            return Err(DebuggerError::AlreadyDeleted(id));
        }
        Ok(idx)
    }

    pub fn get(&self, id: BreakpointId) -> Result<&Breakpoint> {
        let idx = self.slot(id)?;
        self.slots[idx]
            .as_ref()
            .ok_or(DebuggerError::AlreadyDeleted(id))
    }

    pub fn get_mut(&mut self, id: BreakpointId) -> Result<&mut Breakpoint> {
        let idx = self.slot(id)?;
        self.slots[idx]
            .as_mut()
            .ok_or(DebuggerError::AlreadyDeleted(id))
    }

    /// Delete a breakpoint, leaving its tombstone.
    pub fn remove(&mut self, id: BreakpointId) -> Result<Breakpoint> {
        let idx = self.slot(id)?;
        self.slots[idx]
            .take()
            .ok_or(DebuggerError::AlreadyDeleted(id))
    }

    /// Live breakpoints, by number.
    pub fn iter(&self) -> impl Iterator<Item = &Breakpoint> {
        self.slots.iter().flatten()
    }

    pub fn ids(&self) -> Vec<BreakpointId> {
        self.iter().map(|bp| bp.id).collect()
    }
}
