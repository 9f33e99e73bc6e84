pub const MAX_LEVEL: usize = 9;

/// Per-level header counters. Incrementing level `k` zeroes every deeper
/// level except those marked no-reset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderCounters {
    counts: [u32; MAX_LEVEL],
    no_reset: [bool; MAX_LEVEL],
}

impl HeaderCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Levels (1-based) that keep counting across higher-level headers.
    pub fn with_no_reset(levels: impl IntoIterator<Item = usize>) -> Self {
        let mut counters = Self::new();
        for level in levels {
            if (1..=MAX_LEVEL).contains(&level) {
                counters.no_reset[level - 1] = true;
            }
        }
        counters
    }

    /// Advances `level` and returns its new value. Out-of-range levels are
    /// ignored.
    pub fn increment(&mut self, level: usize) -> u32 {
        if !(1..=MAX_LEVEL).contains(&level) {
            return 0;
        }
        self.counts[level - 1] += 1;
        for deeper in level..MAX_LEVEL {
            if !self.no_reset[deeper] {
                self.counts[deeper] = 0;
            }
        }
        self.counts[level - 1]
    }

    pub fn get(&self, level: usize) -> u32 {
        if (1..=MAX_LEVEL).contains(&level) {
            self.counts[level - 1]
        } else {
            0
        }
    }

    pub fn reset(&mut self) {
        self.counts = [0; MAX_LEVEL];
    }
}
