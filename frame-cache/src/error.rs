use thiserror::Error;

/// Error taxonomy from spec §7. `DecodeFailed` is deliberately absent: a
/// failed decode is not surfaced as an error to the caller, the coordinator
/// still returns a pinned handle so a black frame can be served (§4.3,
/// transition 5).
#[derive(Debug, Error)]
pub enum CacheError {
    /// Every line was pinned for the full ~1s wait (spec §4.2, §7). The
    /// HTTP layer should surface this as 503 Service Unavailable.
    #[error("cache exhausted: no buffer became available within the wait budget")]
    Exhausted,

    /// Buffer allocation failed; effectively fatal (spec §7 `AllocFailure`).
    /// Kept to fully enumerate the §7 taxonomy and to give callers a stable
    /// variant to match on, but nothing in this tree constructs it: the
    /// global allocator aborts the process on OOM rather than handing back
    /// a `Result`, so there is no Rust-level call site that could raise it.
    #[error("failed to allocate a {size}-byte frame buffer")]
    AllocFailure { size: usize },
}
