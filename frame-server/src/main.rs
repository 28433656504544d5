mod cli;
mod handler;

use std::sync::Arc;

use axum::{
    routing::{get, put},
    Router, Server,
};
use clap::Parser;
use frame_cache::{CacheConfig, CacheCoordinator};
use frame_decode::{FfmpegDecoder, FileTable};
use tokio::runtime::Builder;
use tower_http::trace::TraceLayer;
use tracing::info;

use cli::Cli;
use handler::*;

fn main() -> anyhow::Result<()> {
    frame_util::log::init();
    frame_decode::init();

    let cli = Cli::parse();

    let cache = CacheCoordinator::new(CacheConfig {
        capacity: cli.capacity,
    });
    let decoder = Arc::new(FfmpegDecoder::new(FileTable::new()));
    let state = Arc::new(AppState {
        cache,
        decoder,
        video_root: cli.video_root,
    });

    let app = Router::new()
        .route("/frame", get(get_frame))
        .route("/flush", put(flush))
        .route("/purge", put(purge))
        .route("/status", get(status))
        .route("/status.json", get(status_json))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let rt = Builder::new_current_thread().enable_all().build()?;
    let _guard = rt.enter();
    let server = Server::bind(&cli.bind).serve(app.into_make_service());
    info!(addr = %server.local_addr(), "listening");
    rt.block_on(server)?;

    Ok(())
}
