//! Victim ordering for buffer pool eviction.
//!
//! The buffer pool runs NO-STEAL: a page dirtied by a running transaction is never
//! a victim. These policies only decide in which order the clean pages are tried.
//! Exactly one is enabled at compile time.
//!
//! # Available Policies
//!
//! - **LRU** (`replacement_lru`): tries the least recently fetched page first.
//! - **Clock** (`replacement_clock`): second-chance sweep over a ring of pages with
//!   reference bits.
//!
//! # Interface
//!
//! Both policies expose a `PolicyState` struct with:
//! - `record_insert()`: a page entered the cache
//! - `record_hit()`: a cached page was fetched again
//! - `record_remove()`: a page left the cache without being chosen as a victim
//! - `pick_victim()`: choose and forget an evictable page

#[cfg(all(feature = "replacement_lru", feature = "replacement_clock"))]
compile_error!("Enable only one buffer replacement policy feature (LRU or Clock)");

#[cfg(not(any(feature = "replacement_lru", feature = "replacement_clock")))]
compile_error!("At least one buffer replacement policy feature must be enabled");

#[cfg(feature = "replacement_lru")]
mod lru;
#[cfg(feature = "replacement_lru")]
pub use lru::PolicyState;

#[cfg(feature = "replacement_clock")]
mod clock;
#[cfg(feature = "replacement_clock")]
pub use clock::PolicyState;
