use std::{
    sync::{Arc, RwLock},
    thread,
    time::Duration,
};

use tracing::{instrument, warn};

use crate::{
    clock::{Clock, SystemClock},
    decoder::{DecodeError, FrameDecoder},
    error::CacheError,
    fingerprint::{FileId, Fingerprint},
    format::{picture_bytesize, PixelFormat},
    handle::FrameHandle,
    index::CacheIndex,
    line::{CacheLine, LineState},
    stats::StatsReporter,
};

/// Minimum and maximum accepted capacity (spec §6: the source clamps to
/// `[2, 8192]`).
const MIN_CAPACITY: usize = 2;
const MAX_CAPACITY: usize = 8192;
/// The source constructs with a fixed initial capacity and relies on the
/// caller to `resize` immediately afterwards (spec §6). We still honour
/// that shape: [`CacheCoordinator::new`] seeds the index at this size and
/// then resizes to the configured capacity in the same call, so external
/// behaviour is "configured capacity from the start".
const CONSTRUCTION_CAPACITY: usize = 48;

const EXHAUSTION_RETRY_ATTEMPTS: u32 = 250;
const EXHAUSTION_RETRY_INTERVAL: Duration = Duration::from_millis(5);
const PURGE_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// The single tunable (spec §6). Default `128`, clamped to `[2, 8192]`.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig { capacity: 128 }
    }
}

impl CacheConfig {
    fn clamped_capacity(self) -> usize {
        self.capacity.clamp(MIN_CAPACITY, MAX_CAPACITY)
    }
}

pub(crate) struct State {
    pub index: CacheIndex,
    pub hits: u64,
    pub misses: u64,
}

pub(crate) struct Inner {
    pub state: RwLock<State>,
    pub clock: Box<dyn Clock>,
}

/// Public façade over the cache (spec §4.2, component C). Cheap to clone:
/// every clone shares the same index, lock, and counters, the way a single
/// `xjcd*` is shared across harvid's worker threads.
#[derive(Clone)]
pub struct CacheCoordinator {
    inner: Arc<Inner>,
}

impl CacheCoordinator {
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, Box::new(SystemClock))
    }

    pub(crate) fn with_clock(config: CacheConfig, clock: Box<dyn Clock>) -> Self {
        let coordinator = CacheCoordinator {
            inner: Arc::new(Inner {
                state: RwLock::new(State {
                    index: CacheIndex::new(CONSTRUCTION_CAPACITY),
                    hits: 0,
                    misses: 0,
                }),
                clock,
            }),
        };
        coordinator.resize(config.clamped_capacity());
        coordinator
    }

    /// A read-only view for an operator-facing status page (spec §4.5,
    /// component D).
    pub fn stats_reporter(&self) -> StatsReporter {
        StatsReporter::new(self.inner.clone())
    }

    /// Returns a pinned handle to a line holding the decoded frame for
    /// `(id, frame, width, height, pixel_format)` (spec §4.2 `acquire`).
    #[instrument(skip(self, decoder), fields(id, frame, width, height))]
    pub fn acquire(
        &self,
        id: FileId,
        frame: i64,
        width: i16,
        height: i16,
        pixel_format: PixelFormat,
        decoder: &dyn FrameDecoder,
    ) -> Result<FrameHandle, CacheError> {
        assert!(width > 0 && height > 0, "picture geometry must be positive");
        let fp = Fingerprint::new(id, width, height, pixel_format, frame);

        if let Some(handle) = self.try_hit(fp) {
            return Ok(handle);
        }
        self.miss(fp, decoder)
    }

    /// Releases a pinned handle (spec §4.2 `release`). Equivalent to
    /// dropping the handle directly; this just gives the operation a name
    /// that matches the acquire/release pairing callers reason about.
    /// Double-release is impossible through this API since `handle` is
    /// consumed by value and its `Drop` runs exactly once.
    pub fn release(&self, handle: FrameHandle) {
        drop(handle);
    }

    /// Spec §4.3 transition 1: fast-path cache hit, with a read-then-write
    /// re-verification so a line invalidated between the peek and the lock
    /// upgrade correctly falls through to the miss path.
    fn try_hit(&self, fp: Fingerprint) -> Option<FrameHandle> {
        {
            let state = self.inner.state.read().unwrap();
            match state.index.get(&fp) {
                Some(line) if line.state == LineState::Ready => {}
                Some(line) if matches!(line.state, LineState::Pinned { .. }) => {}
                _ => return None,
            }
        }

        let mut state = self.inner.state.write().unwrap();
        let now = self.inner.clock.now_secs();
        let line = state.index.get_mut(&fp)?;
        let buffer = match line.state {
            LineState::Ready => {
                line.state = LineState::Pinned { refcnt: 1 };
                line.lru = now;
                line.buffer.clone()
            }
            LineState::Pinned { refcnt } => {
                line.state = LineState::Pinned { refcnt: refcnt + 1 };
                line.lru = now;
                line.buffer.clone()
            }
            // Invalidated (evicted, or turned Failed) by another writer
            // between the read peek and the write lock: fall through.
            _ => None,
        }?;
        state.hits += 1;
        Some(FrameHandle::new(self.inner.clone(), fp, buffer))
    }

    /// Spec §4.3 transitions 2-5: reserve a slot, decode with the lock
    /// released, then record the outcome.
    fn miss(&self, fp: Fingerprint, decoder: &dyn FrameDecoder) -> Result<FrameHandle, CacheError> {
        let reused = self.begin_decode(fp)?;

        let size = picture_bytesize(fp.pixel_format, fp.width, fp.height);
        let mut buffer = reused.unwrap_or_default();
        if buffer.len() != size {
            buffer.clear();
            buffer.resize(size, 0);
        }

        // Lock released for the whole decode: this is the point decodes
        // for disjoint lines actually run concurrently (spec §5).
        let decode_result = decoder.decode(fp.id, fp.frame, &mut buffer, fp.width, fp.height, fp.pixel_format);

        Ok(self.finish_decode(fp, buffer, decode_result))
    }

    /// Allocates a fresh line if the index has room, otherwise evicts the
    /// LRU-smallest unpinned line, retrying under exhaustion for ~1s
    /// (spec §4.3 transitions 2-3). Returns the victim's buffer when its
    /// geometry matches, so the caller can avoid reallocating (spec §4.4).
    fn begin_decode(&self, fp: Fingerprint) -> Result<Option<Vec<u8>>, CacheError> {
        for attempt in 0..EXHAUSTION_RETRY_ATTEMPTS {
            {
                let mut state = self.inner.state.write().unwrap();
                match state.index.get(&fp) {
                    // Another thread genuinely holds this exact fingerprint
                    // mid-decode or pinned (spec §5: concurrent misses on
                    // the same key are not coalesced, but the index still
                    // holds at most one line per fingerprint, I4). Don't
                    // touch it — `finish_decode` folds this decode's result
                    // into whatever is there once it completes.
                    Some(line) if line.state.is_pinned() => return Ok(None),
                    // A resolved, unpinned leftover at this exact
                    // fingerprint (Ready, or Stale per §9's open-question
                    // resolution). `try_hit` already declined to serve it
                    // as a hit, so this decode must actually land: evict
                    // this line's own slot, same as evicting any other
                    // unpinned victim, instead of leaving it to be
                    // silently papered over by a stale buffer later.
                    Some(_) => {
                        let victim = state
                            .index
                            .remove(&fp)
                            .expect("entry was just found at this fingerprint");
                        let reused = reuse_buffer_if_matching(victim, fp, fp);
                        state.index.insert(fp, CacheLine::decoding());
                        return Ok(reused);
                    }
                    None => {
                        if !state.index.is_full() {
                            state.index.insert(fp, CacheLine::decoding());
                            return Ok(None);
                        }
                        if let Some(victim_fp) = state.index.find_victim(None) {
                            let victim = state
                                .index
                                .remove(&victim_fp)
                                .expect("victim fingerprint was just found by the index scan");
                            let reused = reuse_buffer_if_matching(victim, victim_fp, fp);
                            state.index.insert(fp, CacheLine::decoding());
                            return Ok(reused);
                        }
                    }
                }
            }
            if attempt == 0 {
                warn!("cache full, all cache-lines in use; retrying for up to ~1s");
            }
            thread::sleep(EXHAUSTION_RETRY_INTERVAL);
        }
        Err(CacheError::Exhausted)
    }

    fn finish_decode(
        &self,
        fp: Fingerprint,
        buffer: Vec<u8>,
        decode_result: Result<(), DecodeError>,
    ) -> FrameHandle {
        let mut state = self.inner.state.write().unwrap();
        let now = self.inner.clock.now_secs();

        match state.index.get_mut(&fp) {
            Some(line) if line.state == LineState::Decoding => {
                // The expected path: we are the one who installed this
                // line's `Decoding` placeholder and are the first to finish.
                let buffer = Arc::new(buffer);
                match decode_result {
                    Ok(()) => {
                        line.state = LineState::Pinned { refcnt: 1 };
                        line.lru = now;
                        line.buffer = Some(buffer.clone());
                        state.misses += 1;
                    }
                    Err(err) => {
                        warn!(%err, id = fp.id, frame = fp.frame, "decode failed; serving an unvalidated frame");
                        line.state = LineState::Failed { refcnt: 1 };
                        line.buffer = Some(buffer.clone());
                    }
                }
                FrameHandle::new(self.inner.clone(), fp, buffer)
            }
            Some(line) => {
                // A racing, uncoalesced decode for the same fingerprint
                // already committed first. Our own decode still ran (spec
                // §5 explicitly allows the duplicated work) but we fold the
                // result into an extra pin on the survivor instead of
                // overwriting it, so refcnt bookkeeping (I1) stays correct.
                let refcnt = line.state.refcnt();
                line.state = match line.state {
                    LineState::Pinned { .. } => LineState::Pinned { refcnt: refcnt + 1 },
                    LineState::Failed { .. } => LineState::Failed { refcnt: refcnt + 1 },
                    LineState::Ready | LineState::Stale => {
                        line.lru = now;
                        LineState::Pinned { refcnt: 1 }
                    }
                    LineState::Decoding => unreachable!("matched above"),
                };
                let buffer = line
                    .buffer
                    .clone()
                    .expect("a committed line always has a buffer");
                FrameHandle::new(self.inner.clone(), fp, buffer)
            }
            None => {
                // The line was flushed/purged while we were mid-decode.
                // Reinstall it as if we were first to finish.
                let buffer = Arc::new(buffer);
                let mut line = CacheLine::decoding();
                match decode_result {
                    Ok(()) => {
                        line.state = LineState::Pinned { refcnt: 1 };
                        line.lru = now;
                        line.buffer = Some(buffer.clone());
                        state.misses += 1;
                    }
                    Err(err) => {
                        warn!(%err, id = fp.id, frame = fp.frame, "decode failed; serving an unvalidated frame");
                        line.state = LineState::Failed { refcnt: 1 };
                        line.buffer = Some(buffer.clone());
                    }
                }
                state.index.insert(fp, line);
                FrameHandle::new(self.inner.clone(), fp, buffer)
            }
        }
    }

    /// Removes all unpinned lines matching `file_id` (or every file when
    /// `None`). Pinned lines are skipped, never waited on (spec §4.2
    /// `flush`). `reset_counters` resolves spec §9's open question: the
    /// source always resets on flush, which we make an explicit choice
    /// instead (see DESIGN.md).
    pub fn flush(&self, file_id: Option<FileId>, reset_counters: bool) {
        let mut state = self.inner.state.write().unwrap();
        remove_unpinned(&mut state.index, file_id);
        if reset_counters {
            state.hits = 0;
            state.misses = 0;
        }
    }

    /// Removes every line, waiting for pinned lines to become unpinned
    /// (spec §4.2 `purge`, §5). Always resets the hit/miss counters.
    pub fn purge(&self) {
        loop {
            let mut state = self.inner.state.write().unwrap();
            let any_pinned = state.index.iter().any(|(_, line)| line.state.is_pinned());
            if !any_pinned {
                remove_unpinned(&mut state.index, None);
                state.hits = 0;
                state.misses = 0;
                return;
            }
            drop(state);
            warn!("purge waiting for pinned cache-lines to be released");
            thread::sleep(PURGE_POLL_INTERVAL);
        }
    }

    /// Shrinking triggers a full purge first; capacity is then clamped to
    /// at least 1 (spec §4.2 `resize`). Note this bypasses the `[2, 8192]`
    /// clamp `CacheConfig` enforces at construction — the source's
    /// `vcache_resize` applies no such clamp to runtime resizes either.
    pub fn resize(&self, new_capacity: usize) {
        let new_capacity = new_capacity.max(1);
        let current = self.inner.state.read().unwrap().index.capacity();
        if new_capacity < current {
            self.purge();
        }
        self.inner.state.write().unwrap().index.set_capacity(new_capacity);
    }
}

fn remove_unpinned(index: &mut CacheIndex, file_id: Option<FileId>) {
    let victims: Vec<Fingerprint> = index
        .iter()
        .filter(|(fp, line)| !line.state.is_pinned() && file_id.map_or(true, |id| fp.id == id))
        .map(|(fp, _)| *fp)
        .collect();
    for fp in victims {
        index.remove(&fp);
    }
}

/// Spec §4.4: retain the victim's buffer only if geometry and pixel format
/// match exactly; otherwise it is dropped here (freed) and a fresh buffer
/// is allocated by the caller.
fn reuse_buffer_if_matching(victim: CacheLine, old: Fingerprint, new: Fingerprint) -> Option<Vec<u8>> {
    let same_geometry =
        old.width == new.width && old.height == new.height && old.pixel_format == new.pixel_format;
    let buffer = victim.buffer?;
    if !same_geometry {
        return None;
    }
    Arc::try_unwrap(buffer).ok()
}

pub(crate) fn release_fingerprint(inner: &Inner, fp: Fingerprint) {
    let mut state = inner.state.write().unwrap();
    let line = state
        .index
        .get_mut(&fp)
        .expect("a live handle's line must still be in the index (invariant I2)");
    let refcnt = line.state.refcnt();
    assert!(refcnt > 0, "double release of {fp:?}: refcnt already zero");
    let refcnt = refcnt - 1;
    line.state = match (line.state, refcnt) {
        (LineState::Pinned { .. }, 0) => LineState::Ready,
        (LineState::Pinned { .. }, n) => LineState::Pinned { refcnt: n },
        // Decode-failure line released: stays resident, unpinned, but
        // not valid, until evicted by LRU (spec §9 open question).
        (LineState::Failed { .. }, 0) => LineState::Stale,
        (LineState::Failed { .. }, n) => LineState::Failed { refcnt: n },
        (other, _) => unreachable!("release on a line that was never pinned: {other:?}"),
    };
}

pub(crate) fn line_is_valid(inner: &Inner, fp: Fingerprint) -> bool {
    let state = inner.state.read().unwrap();
    matches!(
        state.index.get(&fp).map(|l| l.state),
        Some(LineState::Ready) | Some(LineState::Pinned { .. })
    )
}
