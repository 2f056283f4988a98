//! Breakpoint bookkeeping shared by the dispatchers of every traced thread.

use std::borrow::Cow;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::debugger::{
    BreakLocation, Breakpoint, BreakpointHits, BreakpointId, BreakpointRegistry, BreakpointTable,
    CodeRef, IntegersCache, Position,
};
use crate::error::{ConditionError, DebuggerError, Result};
use crate::source::{self, SourceLoader, SourceUnitIndex};

/// The breakpoint tables of every source file, with the registry and the
/// line cache that index them.
pub struct BreakpointStore {
    case_insensitive: bool,
    loader: Box<dyn SourceLoader>,
    /// Breakpoint tables, one per source file.
    files: Vec<BreakpointTable>,
    /// Every spelling of a file name, to its table.
    paths: HashMap<String, usize>,
    registry: BreakpointRegistry,
    /// Subunit start lines and actual lines of all tables.
    lineno_cache: IntegersCache,
}

impl BreakpointStore {
    pub fn new(case_insensitive: bool, loader: Box<dyn SourceLoader>) -> Self {
        Self {
            case_insensitive,
            loader,
            files: Vec::new(),
            paths: HashMap::new(),
            registry: BreakpointRegistry::new(),
            lineno_cache: IntegersCache::new(),
        }
    }

    /// The breakpoint table of a file, once a breakpoint was set in it.
    pub fn table(&self, filename: &str) -> Option<&BreakpointTable> {
        self.paths
            .get(&source::canonic(filename, self.case_insensitive))
            .map(|&idx| &self.files[idx])
    }

    pub fn lineno_cache(&self) -> &IntegersCache {
        &self.lineno_cache
    }

    pub fn breakpoint(&self, id: BreakpointId) -> Result<&Breakpoint> {
        self.registry.get(id)
    }

    /// Live breakpoints, by number.
    pub fn breakpoints(&self) -> impl Iterator<Item = &Breakpoint> {
        self.registry.iter()
    }

    pub(crate) fn breakpoint_mut(&mut self, id: BreakpointId) -> Result<&mut Breakpoint> {
        self.registry.get_mut(id)
    }

    /// File a new breakpoint under the canonical `filename`, loading the
    /// file on first use.
    ///
    /// Returns the breakpoint's number and position, and the names under
    /// which frames may report the file.
    pub(crate) fn add(
        &mut self,
        filename: &str,
        location: BreakLocation,
        temporary: bool,
        condition: Option<String>,
    ) -> Result<(BreakpointId, Position, Vec<String>)> {
        let mut fresh = None;
        let table = match self.paths.get(filename) {
            Some(&idx) => &mut self.files[idx],
            None => fresh.insert(BreakpointTable::new(SourceUnitIndex::parse(
                filename,
                self.loader.as_ref(),
            )?)),
        };

        let line = match location {
            BreakLocation::Line(line) => line,
            BreakLocation::Function(name) => table.source().function_start_line(&name)?,
        };
        let actual = table.add(self.registry.next_id(), line, &mut self.lineno_cache)?;

        let mut bp = Breakpoint::new(filename, line, actual);
        bp.temporary = temporary;
        bp.condition = condition;
        let id = self.registry.insert(bp);

        let pathnames = source::all_pathnames(filename, self.case_insensitive);
        if let Some(table) = fresh {
            let idx = self.files.len();
            self.files.push(table);
            for name in &pathnames {
                self.paths.insert(name.clone(), idx);
            }
        }
        debug!(breakpoint = %id, file = %filename, line, actual = %actual, "breakpoint set");
        Ok((id, actual, pathnames))
    }

    pub(crate) fn delete(&mut self, id: BreakpointId) -> Result<()> {
        let bp = self.registry.remove(id)?;
        if let Some(&idx) = self.paths.get(&bp.file) {
            self.files[idx].delete(id, bp.actual, &mut self.lineno_cache);
        }
        debug!(breakpoint = %id, file = %bp.file, line = bp.line, "breakpoint deleted");
        Ok(())
    }

    /// Delete every breakpoint, returning their numbers.
    pub(crate) fn clear_all(&mut self) -> Vec<BreakpointId> {
        let ids = self.registry.ids();
        for &id in &ids {
            // Every id comes from the live registry.
            let _ = self.delete(id);
        }
        ids
    }

    /// Breakpoints requested at exactly `filename:line`, by number.
    pub fn get_breakpoints(&self, filename: &str, line: u32) -> Result<Vec<BreakpointId>> {
        match self.table(filename) {
            Some(table) => table.query(line, &self.registry),
            None => Ok(Vec::new()),
        }
    }

    /// Requested lines of the breakpoints of a file, by breakpoint number.
    pub fn get_file_breaks(&self, filename: &str) -> Vec<u32> {
        let Some(table) = self.table(filename) else {
            return Vec::new();
        };
        table
            .ids()
            .into_iter()
            .filter_map(|id| self.registry.get(id).ok())
            .map(|bp| bp.line)
            .collect()
    }

    pub fn has_breakpoints(&self) -> bool {
        self.files.iter().any(|table| !table.is_empty())
    }

    pub(crate) fn restart(&mut self) -> Vec<BreakpointId> {
        let mut dropped = Vec::new();
        for table in &mut self.files {
            dropped.extend(table.reset(
                self.loader.as_ref(),
                &mut self.registry,
                &mut self.lineno_cache,
            ));
        }
        info!(files = self.files.len(), dropped = dropped.len(), "restart");
        dropped
    }

    // Dispatcher lookups. A frame reports its file name as the runtime knows
    // it, so these match it against every registered spelling rather than
    // canonicalising it.

    fn table_index(&self, filename: &str) -> Option<usize> {
        let key = if self.case_insensitive {
            Cow::Owned(filename.to_lowercase())
        } else {
            Cow::Borrowed(filename)
        };
        self.paths.get(key.as_ref()).copied()
    }

    /// Table and position of the breakpoints at `line` of `code`.
    pub(crate) fn breakpoint_line(
        &self,
        code: CodeRef<'_>,
        line: u32,
    ) -> Option<(usize, Position)> {
        if !self.lineno_cache.contains(code.first_line) || !self.lineno_cache.contains(line) {
            return None;
        }
        let file = self.table_index(code.filename)?;
        let actual = Position::new(code.first_line, line);
        (!self.files[file].at(actual).is_empty()).then_some((file, actual))
    }

    pub(crate) fn breakpoints_in_code(&self, code: CodeRef<'_>) -> bool {
        self.lineno_cache.contains(code.first_line)
            && self
                .table_index(code.filename)
                .is_some_and(|file| self.files[file].has_subunit(code.first_line))
    }

    pub(crate) fn process_hits<F>(
        &mut self,
        file: usize,
        actual: Position,
        mut eval: F,
    ) -> Option<BreakpointHits>
    where
        F: FnMut(&str) -> std::result::Result<bool, ConditionError>,
    {
        let ids = self.files[file].at(actual).to_vec();
        let mut hits = BreakpointHits::default();
        for id in ids {
            let Ok(bp) = self.registry.get_mut(id) else {
                continue;
            };
            let outcome = bp.process_hit(&mut eval);
            if outcome.stop {
                hits.fired.push(id);
                if bp.temporary && outcome.may_delete {
                    hits.temporaries.push(id);
                }
            }
        }
        (!hits.fired.is_empty()).then_some(hits)
    }

    /// Fail with [`DebuggerError::NoBreakpointAt`] when nothing was requested
    /// at `filename:line`.
    pub(crate) fn clear_break(&mut self, filename: &str, line: u32) -> Result<Vec<BreakpointId>> {
        let ids = self.get_breakpoints(filename, line).unwrap_or_default();
        if ids.is_empty() {
            return Err(DebuggerError::NoBreakpointAt {
                file: filename.to_string(),
                line,
            });
        }
        for &id in &ids {
            self.delete(id)?;
        }
        Ok(ids)
    }
}
