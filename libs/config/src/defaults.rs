//! Default values for [`ContextConfig`](crate::ContextConfig) fields

/// Context name used when none is configured
pub const CTXID: &str = "local";

/// Strands per worker thread
pub const PER_THREAD_SERVICE_NUM: usize = 1;

/// Utility strands hosting threaded actors
pub const NONBLOCKED_NUM: usize = 1;

/// Actor slot pool
pub mod pool {
    /// Slots reserved up front on every strand
    pub const ACTOR_RESERVE_SIZE: usize = 64;

    /// Slot ceiling per strand; zero means unbounded
    pub const ACTOR_MAX_SIZE: usize = 0;
}

/// Mailbox sizing
pub mod mailbox {
    /// Envelope nodes reserved per mailbox
    pub const NODE_RESERVE_SIZE: usize = 16;

    /// Match types below this value use the direct-indexed cache
    pub const CACHE_MATCH_SIZE: usize = 32;
}

/// Commands a strand handles before yielding to its thread
pub const MAX_TICK_HANDLE_SIZE: usize = 64;

/// Default `respond` timeout (milliseconds)
pub const REQUEST_TIMEOUT_MS: u64 = 180_000;

/// Worker threads when the host cannot report its parallelism
pub const FALLBACK_THREAD_NUM: usize = 1;
