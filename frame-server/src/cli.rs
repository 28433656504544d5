use std::{net::SocketAddr, path::PathBuf};

use clap::Parser;

/// Command-line flags (spec's "CLI flag parsing" is named as an external
/// collaborator in §1; `starpact-tlc`'s own server hard-codes its bind
/// address, so exposing these as flags is an enrichment grounded on the
/// wider example pack rather than the teacher itself).
#[derive(Debug, Parser)]
pub struct Cli {
    /// Address to bind the HTTP server to.
    #[arg(long, default_value = "127.0.0.1:6666")]
    pub bind: SocketAddr,

    /// Maximum number of decoded frames kept resident, clamped to
    /// `[2, 8192]` (spec §6).
    #[arg(long, default_value_t = 128)]
    pub capacity: usize,

    /// Root directory video paths are resolved relative to.
    #[arg(long, default_value = ".")]
    pub video_root: PathBuf,
}
