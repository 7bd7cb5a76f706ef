//! Edit counting between confirmed saves.

/// Counts content mutations since the last confirmed save.
///
/// Once the count exceeds the threshold the debounce is bypassed, which
/// bounds how many edits can be lost to a crash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeTracker {
    count: u32,
    threshold: u32,
}

impl ChangeTracker {
    pub fn new(threshold: u32) -> Self {
        Self {
            count: 0,
            threshold: threshold.max(1),
        }
    }

    /// Record one edit and return the new count.
    pub fn record_change(&mut self) -> u32 {
        self.count = self.count.saturating_add(1);
        self.count
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn is_dirty(&self) -> bool {
        self.count > 0
    }

    /// True once more edits than the threshold are unsaved.
    pub fn should_force_save(&self) -> bool {
        self.count > self.threshold
    }
}
