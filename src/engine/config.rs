/// Configuration for the in-memory engine and its batches.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Initial capacity in bytes of a batch's record buffer.
    pub batch_capacity: usize,
    /// Hard limit of records per batch. Writes beyond it fail.
    pub max_batch_records: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_capacity: 4096,
            max_batch_records: 1_000_000,
        }
    }
}

impl EngineConfig {
    /// A config tuned for fast testing.
    ///
    /// - **batch:** Tiny buffers force reallocation, and a low record limit is easy to hit.
    #[cfg(test)]
    pub fn for_testing() -> Self {
        Self {
            batch_capacity: 16,
            max_batch_records: 8,
        }
    }
}
