use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::debugger::{BreakpointId, BreakpointRegistry, IntegersCache, Position};
use crate::error::Result;
use crate::source::{SourceLoader, SourceUnitIndex};

/// Breakpoints of one source file, keyed by subunit start line and then by
/// actual line.
///
/// A subunit entry is never removed once created, even when it has no lines
/// left: a dispatcher may be holding on to it while tracing that subunit.
#[derive(Debug, Clone)]
pub struct BreakpointTable {
    source: SourceUnitIndex,
    units: BTreeMap<u32, BTreeMap<u32, Vec<BreakpointId>>>,
}

impl BreakpointTable {
    pub fn new(source: SourceUnitIndex) -> Self {
        Self {
            source,
            units: BTreeMap::new(),
        }
    }

    pub fn source(&self) -> &SourceUnitIndex {
        &self.source
    }

    pub fn filename(&self) -> &str {
        self.source.filename()
    }

    /// Resolve `line` and file breakpoint `id` under the resolved position.
    pub fn add(
        &mut self,
        id: BreakpointId,
        line: u32,
        cache: &mut IntegersCache,
    ) -> Result<Position> {
        let actual = self.source.resolve(line)?;
        self.insert(id, actual, cache);
        debug!(
            file = %self.filename(),
            breakpoint = %id,
            requested = line,
            actual = %actual,
            "breakpoint resolved"
        );
        Ok(actual)
    }

    fn insert(&mut self, id: BreakpointId, actual: Position, cache: &mut IntegersCache) {
        let lines = self.units.entry(actual.subunit_start).or_insert_with(|| {
            cache.add(actual.subunit_start);
            BTreeMap::new()
        });
        let ids = lines.entry(actual.line).or_insert_with(|| {
            cache.add(actual.line);
            Vec::new()
        });
        let idx = ids.partition_point(|&other| other < id);
        ids.insert(idx, id);
    }

    /// Unfile `id` from `actual`. Returns false if it was not there.
    pub fn delete(
        &mut self,
        id: BreakpointId,
        actual: Position,
        cache: &mut IntegersCache,
    ) -> bool {
        let Some(lines) = self.units.get_mut(&actual.subunit_start) else {
            return false;
        };
        let Some(ids) = lines.get_mut(&actual.line) else {
            return false;
        };
        let Some(idx) = ids.iter().position(|&other| other == id) else {
            return false;
        };
        ids.remove(idx);
        if ids.is_empty() {
            lines.remove(&actual.line);
            cache.delete(actual.line);
        }
        true
    }

    /// Breakpoints requested at exactly `line`, by number.
    pub fn query(&self, line: u32, registry: &BreakpointRegistry) -> Result<Vec<BreakpointId>> {
        let actual = self.source.resolve(line)?;
        Ok(self
            .at(actual)
            .iter()
            .copied()
            .filter(|&id| registry.get(id).is_ok_and(|bp| bp.line == line))
            .collect())
    }

    /// Breakpoints that stop at `actual`, by number.
    pub fn at(&self, actual: Position) -> &[BreakpointId] {
        self.units
            .get(&actual.subunit_start)
            .and_then(|lines| lines.get(&actual.line))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn has_subunit(&self, subunit_start: u32) -> bool {
        self.units.contains_key(&subunit_start)
    }

    /// Whether any breakpoint is filed. Retained empty subunits do not count.
    pub fn is_empty(&self) -> bool {
        self.units.values().all(BTreeMap::is_empty)
    }

    /// Every filed breakpoint, by number.
    pub fn ids(&self) -> Vec<BreakpointId> {
        let mut ids: Vec<BreakpointId> = self
            .units
            .values()
            .flat_map(|lines| lines.values().flatten().copied())
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Reload the source and, if it changed, resolve every breakpoint again.
    ///
    /// Breakpoints that no longer resolve are deleted from the registry and
    /// returned. A source that fails to reload drops all its breakpoints.
    pub fn reset(
        &mut self,
        loader: &dyn SourceLoader,
        registry: &mut BreakpointRegistry,
        cache: &mut IntegersCache,
    ) -> Vec<BreakpointId> {
        match self.source.reload(loader) {
            Ok(false) => return Vec::new(),
            Ok(true) => {}
            Err(e) => warn!(file = %self.filename(), error = %e, "failed to reload source"),
        }

        let ids = self.ids();
        for lines in self.units.values_mut() {
            for line in lines.keys() {
                cache.delete(*line);
            }
            lines.clear();
        }

        let mut dropped = Vec::new();
        for id in ids {
            let Ok(bp) = registry.get_mut(id) else {
                continue;
            };
            match self.source.resolve(bp.line) {
                Ok(actual) => {
                    bp.actual = actual;
                    self.insert(id, actual, cache);
                }
                Err(e) => {
                    debug!(breakpoint = %id, error = %e, "breakpoint dropped");
                    if registry.remove(id).is_ok() {
                        dropped.push(id);
                    }
                }
            }
        }
        dropped
    }
}
