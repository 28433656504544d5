use std::sync::Arc;

/// Flag bits mirroring harvid's `CLF_DECODING` / `CLF_INUSE` / `CLF_VALID`,
/// kept only for the stats snapshot (spec §4.5) — internal logic never
/// touches them directly, see [`LineState`].
pub const FLAG_DECODING: u8 = 1;
pub const FLAG_IN_USE: u8 = 2;
pub const FLAG_VALID: u8 = 4;

/// A line's state as a tagged variant rather than a bitfield, so invariant
/// I1 (`IN_USE ⇔ refcnt > 0`) holds by construction instead of by
/// convention (spec §9 design note). There is no explicit `Empty` variant:
/// an empty line simply has no entry in [`crate::index::CacheIndex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LineState {
    /// Decode in flight; not yet indexable as a hit.
    Decoding,
    /// Valid, unpinned, refcnt = 0: an eviction candidate.
    Ready,
    /// Valid and pinned by at least one live handle.
    Pinned { refcnt: u32 },
    /// Decode failed: pinned (so the caller's black-frame handle stays
    /// alive) but not valid, so future lookups skip it (spec §4.3
    /// transition 5).
    Failed { refcnt: u32 },
    /// A [`LineState::Failed`] line whose last handle was released: still
    /// resident and unpinned, but not valid, so it is never a hit. An
    /// eviction candidate exactly like `Ready`, just never chosen by a
    /// lookup (spec §9 open question: the source leaves such a line
    /// resident "until evicted by LRU").
    Stale,
}

impl LineState {
    pub fn flags(self) -> u8 {
        match self {
            LineState::Decoding => FLAG_DECODING,
            LineState::Ready => FLAG_VALID,
            LineState::Pinned { .. } => FLAG_VALID | FLAG_IN_USE,
            LineState::Failed { .. } => FLAG_IN_USE,
            LineState::Stale => 0,
        }
    }

    pub fn refcnt(self) -> u32 {
        match self {
            LineState::Decoding | LineState::Ready | LineState::Stale => 0,
            LineState::Pinned { refcnt } | LineState::Failed { refcnt } => refcnt,
        }
    }

    /// `IN_USE ∨ DECODING` (spec §3 invariant 3): must not be evicted, its
    /// buffer must not be freed, its fingerprint must not mutate.
    pub fn is_pinned(self) -> bool {
        matches!(
            self,
            LineState::Decoding | LineState::Pinned { .. } | LineState::Failed { .. }
        )
    }

    /// Eligible for LRU eviction: unpinned (spec §4.3 transition 3 scans
    /// exactly this set — `Ready` and `Stale` both qualify).
    pub fn is_evictable(self) -> bool {
        matches!(self, LineState::Ready | LineState::Stale)
    }
}

/// One decoded-frame slot (spec §3). Geometry and pixel format live in the
/// [`crate::fingerprint::Fingerprint`] key rather than being duplicated
/// here.
pub(crate) struct CacheLine {
    pub state: LineState,
    /// Seconds since epoch at the last hit-serve or decode completion; `0`
    /// while decoding or never yet served.
    pub lru: u64,
    pub buffer: Option<Arc<Vec<u8>>>,
}

impl CacheLine {
    pub fn decoding() -> Self {
        CacheLine {
            state: LineState::Decoding,
            lru: 0,
            buffer: None,
        }
    }
}
