use crate::{fingerprint::FileId, format::PixelFormat};

/// Opaque decode failure; the coordinator never inspects the reason, only
/// whether decoding succeeded (spec §6, §7 `DecodeFailed`).
#[derive(Debug, Clone)]
pub struct DecodeError(pub String);

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for DecodeError {}

/// The decoder callback the cache consumes (spec §6). Implementations must
/// fill `dst` fully on success; on failure `dst` is left as-is (the
/// coordinator does not zero it again — it was already zero-initialised or
/// carried over from a reused buffer).
pub trait FrameDecoder: Send + Sync {
    fn decode(
        &self,
        id: FileId,
        frame: i64,
        dst: &mut [u8],
        width: i16,
        height: i16,
        pixel_format: PixelFormat,
    ) -> Result<(), DecodeError>;
}
