use std::path::Path;

use anyhow::{anyhow, Result};
use ffmpeg::codec::{self, packet::Packet, Parameters};
use tracing::instrument;

/// Metadata recovered from the container on registration (spec §6: the
/// decoder side is an external collaborator, not part of the cache).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoMeta {
    pub frame_rate: usize,
    pub nframes: usize,
    pub shape: (u32, u32),
}

/// Demuxes every packet of the best video stream up front. Videos used
/// behind this cache are expected to be one-frame-per-packet, so a frame
/// index maps directly to a position in the returned `Vec` (grounded on
/// `tlc-core`'s `read_video`, minus the channel: a cache decoder needs
/// random access to a frame index, not a progressive stream).
#[instrument(fields(video_path = %video_path.as_ref().display()), err)]
pub fn read_video(video_path: impl AsRef<Path>) -> Result<(VideoMeta, Parameters, Vec<Packet>)> {
    let video_path = video_path.as_ref();
    let mut input = ffmpeg::format::input(&video_path)?;
    let video_stream = input
        .streams()
        .best(ffmpeg::media::Type::Video)
        .ok_or_else(|| anyhow!("no video stream in {}", video_path.display()))?;
    let video_stream_index = video_stream.index();
    let parameters = video_stream.parameters();
    let codec_ctx = codec::Context::from_parameters(parameters.clone())?;
    let rational = video_stream.avg_frame_rate();
    let frame_rate = (rational.0 as f64 / rational.1 as f64).round() as usize;
    let nframes = video_stream.frames() as usize;
    let decoder = codec_ctx.decoder().video()?;
    let shape = (decoder.height(), decoder.width());
    let meta = VideoMeta {
        frame_rate,
        nframes,
        shape,
    };
    let packets: Vec<_> = input
        .packets()
        .filter_map(|(stream, packet)| (stream.index() == video_stream_index).then_some(packet))
        .collect();
    Ok((meta, parameters, packets))
}
