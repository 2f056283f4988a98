/// Reference-counted membership over small non-negative integers.
///
/// Backs the dispatcher's first check on every line event: a line number is
/// looked up by index, before any hashing of the breakpoint tables.
#[derive(Debug, Clone, Default)]
pub struct IntegersCache {
    /// Reference count per integer; 0 means absent.
    counts: Vec<u32>,
}

impl IntegersCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, n: u32) {
        let idx = n as usize;
        if idx >= self.counts.len() {
            self.counts.resize(idx + 1, 0);
        }
        self.counts[idx] += 1;
    }

    /// Drop one reference to `n`, returning the remaining count, or `None`
    /// if `n` was not present.
    pub fn delete(&mut self, n: u32) -> Option<u32> {
        let idx = n as usize;
        let count = self.counts.get_mut(idx).filter(|c| **c > 0)?;
        *count -= 1;
        let remaining = *count;
        if remaining == 0 && idx + 1 == self.counts.len() {
            let len = self
                .counts
                .iter()
                .rposition(|&c| c > 0)
                .map_or(0, |last| last + 1);
            self.counts.truncate(len);
        }
        Some(remaining)
    }

    #[inline]
    pub fn contains(&self, n: u32) -> bool {
        self.counts.get(n as usize).is_some_and(|&c| c > 0)
    }

    pub fn count(&self, n: u32) -> u32 {
        self.counts.get(n as usize).copied().unwrap_or(0)
    }

    /// Length of the backing array: one past the largest present integer.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}
