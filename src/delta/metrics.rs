// src/delta/metrics.rs

//! What a generated delta package contains and what it saves

/// Deltas above this fraction of the new full package are flagged
pub const MAX_DELTA_RATIO: f64 = 0.9;

/// How one file under `lib/` of the new package was encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    /// Not in the base package; shipped as-is
    Added,
    /// Byte-identical to the base; zero-length patch
    Unchanged,
    /// Shipped as a bsdiff patch plus `.shasum`
    Patched,
}

/// Summary of one `create_delta_package` run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeltaMetrics {
    pub base_size: u64,
    pub new_size: u64,
    pub delta_size: u64,
    pub files_added: usize,
    pub files_unchanged: usize,
    pub files_patched: usize,
}

impl DeltaMetrics {
    pub fn new(base_size: u64, new_size: u64, delta_size: u64) -> Self {
        Self {
            base_size,
            new_size,
            delta_size,
            ..Default::default()
        }
    }

    /// Count each file outcome
    pub fn tally<'a>(mut self, outcomes: impl IntoIterator<Item = &'a FileOutcome>) -> Self {
        for outcome in outcomes {
            match outcome {
                FileOutcome::Added => self.files_added += 1,
                FileOutcome::Unchanged => self.files_unchanged += 1,
                FileOutcome::Patched => self.files_patched += 1,
            }
        }
        self
    }

    /// Delta size over full size; 1.0 for an empty full package
    pub fn ratio(&self) -> f64 {
        if self.new_size == 0 {
            return 1.0;
        }
        self.delta_size as f64 / self.new_size as f64
    }

    /// Download saved by taking the delta, negative when it is larger
    pub fn savings_percentage(&self) -> f64 {
        if self.new_size == 0 {
            return 0.0;
        }
        (1.0 - self.ratio()) * 100.0
    }

    pub fn is_worthwhile(&self) -> bool {
        self.ratio() < MAX_DELTA_RATIO
    }
}
