use std::{
    cell::RefCell,
    collections::HashMap,
    ops::{Deref, DerefMut},
};

use anyhow::Result;
use ffmpeg::{
    codec,
    codec::packet::Packet,
    format::Pixel,
    software::{scaling, scaling::flag::Flags},
    util::frame::video::Video,
};
use frame_cache::{DecodeError, FileId, FrameDecoder, PixelFormat};
use thread_local::ThreadLocal;
use tracing::instrument;

use crate::file_table::FileTable;

fn ffmpeg_pixel(fmt: PixelFormat) -> Pixel {
    match fmt {
        PixelFormat::Gray8 => Pixel::GRAY8,
        PixelFormat::Rgb24 => Pixel::RGB24,
        PixelFormat::Bgr24 => Pixel::BGR24,
        PixelFormat::Rgba32 => Pixel::RGBA,
        PixelFormat::Yuv420P => Pixel::YUV420P,
    }
}

/// One opened codec + scaling context, bound to a single `(file, width,
/// height, pixel_format)` combination. `src_frame`/`dst_frame` are reused
/// across calls the same way `tlc-core`'s `Decoder` reuses them to avoid
/// per-frame allocation.
struct DecodeContext {
    codec_ctx: ffmpeg::decoder::Video,
    sws_ctx: SendableSwsCtx,
    src_frame: Video,
    dst_frame: Video,
}

impl DecodeContext {
    fn new(parameters: ffmpeg::codec::Parameters, width: i16, height: i16, pixel_format: PixelFormat) -> Result<Self> {
        let codec_ctx = codec::Context::from_parameters(parameters)?.decoder().video()?;
        let sws_ctx = scaling::Context::get(
            codec_ctx.format(),
            codec_ctx.width(),
            codec_ctx.height(),
            ffmpeg_pixel(pixel_format),
            width as u32,
            height as u32,
            Flags::BILINEAR,
        )?;
        Ok(DecodeContext {
            codec_ctx,
            sws_ctx: SendableSwsCtx(sws_ctx),
            src_frame: Video::empty(),
            dst_frame: Video::empty(),
        })
    }

    fn decode_into(&mut self, packet: &Packet, dst: &mut [u8]) -> Result<()> {
        self.codec_ctx.send_packet(packet)?;
        self.codec_ctx.receive_frame(&mut self.src_frame)?;
        self.sws_ctx.run(&self.src_frame, &mut self.dst_frame)?;
        let plane = self.dst_frame.data(0);
        let len = plane.len().min(dst.len());
        dst[..len].copy_from_slice(&plane[..len]);
        Ok(())
    }
}

/// Wrap `scaling::Context` to cross the `ThreadLocal` boundary (it holds a
/// raw pointer internally); matches `tlc-core`'s `SendableSwsCtx` exactly.
struct SendableSwsCtx(scaling::Context);

#[allow(clippy::non_send_fields_in_send_ty)]
unsafe impl Send for SendableSwsCtx {}

impl Deref for SendableSwsCtx {
    type Target = scaling::Context;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for SendableSwsCtx {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

#[derive(Hash, PartialEq, Eq, Clone, Copy)]
struct ContextKey {
    id: FileId,
    width: i16,
    height: i16,
    pixel_format: PixelFormat,
}

/// The [`frame_cache::FrameDecoder`] implementation `frame-cache` is
/// deliberately decoupled from (spec §6 "external decoder collaborator").
/// One decoder context is kept per thread per requested geometry, mirroring
/// `tlc-core`'s `DecoderManager` thread-local pool, so repeated decodes on
/// the hot path don't reopen a codec context every call.
pub struct FfmpegDecoder {
    files: FileTable,
    contexts: ThreadLocal<RefCell<HashMap<ContextKey, DecodeContext>>>,
}

impl FfmpegDecoder {
    pub fn new(files: FileTable) -> Self {
        FfmpegDecoder {
            files,
            contexts: ThreadLocal::new(),
        }
    }

    pub fn files(&self) -> &FileTable {
        &self.files
    }

    fn try_decode(
        &self,
        id: FileId,
        frame: i64,
        dst: &mut [u8],
        width: i16,
        height: i16,
        pixel_format: PixelFormat,
    ) -> Result<()> {
        let packet = self.files.packet(id, frame)?;
        let key = ContextKey {
            id,
            width,
            height,
            pixel_format,
        };

        let cell = self.contexts.get_or(|| RefCell::new(HashMap::new()));
        let mut map = cell.borrow_mut();
        let ctx = match map.entry(key) {
            std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
            std::collections::hash_map::Entry::Vacant(e) => {
                let parameters = self.files.parameters(id)?;
                e.insert(DecodeContext::new(parameters, width, height, pixel_format)?)
            }
        };
        ctx.decode_into(&packet, dst)
    }
}

impl FrameDecoder for FfmpegDecoder {
    #[instrument(skip(self, dst), fields(id, frame, width, height))]
    fn decode(
        &self,
        id: FileId,
        frame: i64,
        dst: &mut [u8],
        width: i16,
        height: i16,
        pixel_format: PixelFormat,
    ) -> Result<(), DecodeError> {
        self.try_decode(id, frame, dst, width, height, pixel_format)
            .map_err(|err| DecodeError(err.to_string()))
    }
}
