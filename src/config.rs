use std::time::Duration;

// Compile-time default page size, selected via Cargo features.
// Exactly one of `page-4k` or `page-8k` should be enabled.
#[cfg(feature = "page-4k")]
pub const DEFAULT_PAGE_SIZE: usize = 4096;
#[cfg(feature = "page-8k")]
pub const DEFAULT_PAGE_SIZE: usize = 8192;

#[cfg(all(feature = "page-4k", feature = "page-8k"))]
compile_error!("Enable only one of the `page-4k` or `page-8k` features.");

#[cfg(not(any(feature = "page-4k", feature = "page-8k")))]
compile_error!("One of `page-4k` or `page-8k` features must be enabled to select a page size.");

/// Advisory number of cached pages for callers constructing a pool.
pub const DEFAULT_PAGES: usize = 50;

/// Construction-time settings shared by the buffer pool, catalog and heap files.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Bytes per page, header included.
    pub page_size: usize,
    /// Strict upper bound on the number of cached pages.
    pub buffer_pages: usize,
    /// Sleep between two lock attempts inside `get_page`.
    pub lock_poll_interval: Duration,
    /// Lower bound of the per-call randomized lock wait.
    pub lock_timeout_min: Duration,
    /// Upper bound of the per-call randomized lock wait.
    pub lock_timeout_max: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            buffer_pages: DEFAULT_PAGES,
            lock_poll_interval: Duration::from_millis(50),
            lock_timeout_min: Duration::from_millis(1000),
            lock_timeout_max: Duration::from_millis(3000),
        }
    }
}

impl DbConfig {
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_buffer_pages(mut self, buffer_pages: usize) -> Self {
        self.buffer_pages = buffer_pages;
        self
    }

    pub fn with_lock_poll_interval(mut self, interval: Duration) -> Self {
        self.lock_poll_interval = interval;
        self
    }

    /// Set the range the per-call lock timeout is drawn from. Bounds are swapped if reversed.
    pub fn with_lock_timeout(mut self, min: Duration, max: Duration) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        self.lock_timeout_min = min;
        self.lock_timeout_max = max;
        self
    }
}
