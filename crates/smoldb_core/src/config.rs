//! Database configuration.

/// Configuration for opening a database.
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether to create the database directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to run the background compaction worker.
    pub gc_enabled: bool,

    /// Dead-space ratio (`file_size / live_data_size`) above which the
    /// worker compacts a collection automatically.
    pub gc_trigger_ratio: f64,

    /// Encoded documents larger than this many bytes are stored as blob
    /// files instead of inline slots.
    pub blob_threshold: usize,

    /// Capacity of the per-collection read cache. Zero disables it.
    pub cache_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            gc_enabled: true,
            gc_trigger_ratio: 2.0,
            blob_threshold: 1024 * 1024, // 1 MiB
            cache_size: 0,               // disabled
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the database directory if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether the background compaction worker runs.
    #[must_use]
    pub const fn gc_enabled(mut self, value: bool) -> Self {
        self.gc_enabled = value;
        self
    }

    /// Sets the automatic compaction trigger ratio.
    #[must_use]
    pub const fn gc_trigger_ratio(mut self, ratio: f64) -> Self {
        self.gc_trigger_ratio = ratio;
        self
    }

    /// Sets the inline-vs-blob size threshold in bytes.
    #[must_use]
    pub const fn blob_threshold(mut self, bytes: usize) -> Self {
        self.blob_threshold = bytes;
        self
    }

    /// Sets the read-cache capacity (0 = disabled).
    #[must_use]
    pub const fn cache_size(mut self, entries: usize) -> Self {
        self.cache_size = entries;
        self
    }
}
