use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use frame_cache::{CacheCoordinator, CacheError, PixelFormat};
use frame_decode::FfmpegDecoder;
use serde::Deserialize;

pub struct AppState {
    pub cache: CacheCoordinator,
    pub decoder: Arc<FfmpegDecoder>,
    pub video_root: std::path::PathBuf,
}

/// Wraps any error as a 500, the way `tlc-server`'s own `AppError` does,
/// except a [`CacheError::Exhausted`] is surfaced as 503 (spec §7).
pub struct AppError(StatusCode, anyhow::Error);

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(e: E) -> Self {
        AppError(StatusCode::INTERNAL_SERVER_ERROR, e.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.0, self.1.to_string()).into_response()
    }
}

fn cache_error_status(err: &CacheError) -> StatusCode {
    match err {
        CacheError::Exhausted => StatusCode::SERVICE_UNAVAILABLE,
        CacheError::AllocFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn parse_pixel_format(s: &str) -> anyhow::Result<PixelFormat> {
    Ok(match s {
        "gray8" => PixelFormat::Gray8,
        "rgb24" => PixelFormat::Rgb24,
        "bgr24" => PixelFormat::Bgr24,
        "rgba32" => PixelFormat::Rgba32,
        "yuv420p" => PixelFormat::Yuv420P,
        other => anyhow::bail!("unrecognised pixel format: {other}"),
    })
}

#[derive(Debug, Deserialize)]
pub struct FrameQuery {
    path: String,
    frame: i64,
    w: i16,
    h: i16,
    #[serde(default = "default_fmt")]
    fmt: String,
}

fn default_fmt() -> String {
    "rgb24".to_string()
}

/// Resolves `path` under the configured video root, decodes `frame` at
/// `(w, h, fmt)` through the cache, and serves the raw pixel buffer.
/// Pixel-format conversion for the HTTP response itself stays out of
/// scope (spec §1) — the bytes served are exactly what the decoder wrote.
pub async fn get_frame(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FrameQuery>,
) -> Result<Response, AppError> {
    let pixel_format = parse_pixel_format(&query.fmt)?;
    let video_path = state.video_root.join(&query.path);
    let files = state.decoder.files();

    let (cache, decoder, frame, w, h) = (
        state.cache.clone(),
        state.decoder.clone(),
        query.frame,
        query.w,
        query.h,
    );
    let id = files.register(&video_path)?;

    let handle = tokio::task::spawn_blocking(move || {
        cache
            .acquire(id, frame, w, h, pixel_format, decoder.as_ref())
            .map_err(|err| (cache_error_status(&err), err))
    })
    .await?
    .map_err(|(status, err)| AppError(status, err.into()))?;

    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        handle.buffer().to_vec(),
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    file: Option<u16>,
    reset: Option<bool>,
}

pub async fn flush(State(state): State<Arc<AppState>>, Query(query): Query<StatusQuery>) {
    state.cache.flush(query.file, query.reset.unwrap_or(false));
}

pub async fn purge(State(state): State<Arc<AppState>>) {
    state.cache.purge();
}

pub async fn status_json(State(state): State<Arc<AppState>>) -> Json<frame_cache::StatsSnapshot> {
    Json(state.cache.stats_reporter().snapshot())
}

/// A small operator-facing table; `vcache_info_html` in the source
/// conflates this with the JSON form, which [`status_json`] now serves
/// separately (spec §9 supplemented feature).
pub async fn status(State(state): State<Arc<AppState>>) -> Html<String> {
    let snap = state.cache.stats_reporter().snapshot();
    let mut out = String::new();
    out.push_str(&format!(
        "<h1>frame cache</h1><p>capacity {} &middot; hits {} &middot; misses {}</p>",
        snap.capacity, snap.hits, snap.misses
    ));
    out.push_str("<table border=1><tr><th>file</th><th>frame</th><th>w</th><th>h</th><th>fmt</th><th>flags</th><th>lru</th></tr>");
    for line in &snap.lines {
        out.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{:#05b}</td><td>{}</td></tr>",
            line.file_id, line.frame, line.width, line.height, line.pixel_format, line.flags, line.lru
        ));
    }
    out.push_str("</table>");
    Html(out)
}
