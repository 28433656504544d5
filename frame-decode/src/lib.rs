//! The external decoder collaborator the cache in `frame-cache` never
//! speaks to directly (spec §1, §6): a [`FileTable`] to name videos, and an
//! [`FfmpegDecoder`] implementing `frame_cache::FrameDecoder` over it.

mod decode;
mod file_table;
mod read;

pub use decode::FfmpegDecoder;
pub use file_table::FileTable;
pub use read::VideoMeta;

/// Must be called once before any decoding happens, mirroring `tlc-core`'s
/// `video::init`.
pub fn init() {
    ffmpeg::init().expect("failed to init ffmpeg");
}
