use std::sync::Arc;

use crate::{coordinator::Inner, fingerprint::Fingerprint};

/// Opaque, move-only pin on a decoded frame (spec §6 "cache handle",
/// §9 design note). Its `Drop` impl performs the `release` the source's
/// `void*` handle left to caller discipline, which makes double-release
/// a type error rather than a runtime assertion: you simply cannot drop
/// the same owned `FrameHandle` twice.
pub struct FrameHandle {
    inner: Arc<Inner>,
    fingerprint: Fingerprint,
    buffer: Arc<Vec<u8>>,
}

impl FrameHandle {
    pub(crate) fn new(inner: Arc<Inner>, fingerprint: Fingerprint, buffer: Arc<Vec<u8>>) -> Self {
        FrameHandle {
            inner,
            fingerprint,
            buffer,
        }
    }

    /// The decoded (or black, on decode failure) frame bytes. Guaranteed
    /// `len() == picture_bytesize(pixel_format, width, height)` and
    /// immutable for as long as the handle is held (spec §4.2).
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// `true` if this pin came from a failed decode: the buffer is not a
    /// validated frame and will not be served to a future hit (spec §4.3
    /// transition 5).
    pub fn is_decode_failure(&self) -> bool {
        !crate::coordinator::line_is_valid(&self.inner, self.fingerprint)
    }
}

impl Drop for FrameHandle {
    fn drop(&mut self) {
        crate::coordinator::release_fingerprint(&self.inner, self.fingerprint);
    }
}

impl std::fmt::Debug for FrameHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameHandle")
            .field("fingerprint", &self.fingerprint)
            .field("len", &self.buffer.len())
            .finish()
    }
}
