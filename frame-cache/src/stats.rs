use std::sync::Arc;

use serde::Serialize;

use crate::{coordinator::Inner, fingerprint::FileId, format::PixelFormat};

/// One row of the operator-facing cache table (spec §4.5).
#[derive(Debug, Clone, Serialize)]
pub struct LineRecord {
    pub index: usize,
    pub file_id: FileId,
    pub flags: u8,
    pub width: i16,
    pub height: i16,
    pub pixel_format: PixelFormat,
    pub frame: i64,
    pub lru: u64,
}

/// Read-only snapshot of the cache's configuration and contents (spec
/// §4.5). The core hands back structured data; rendering it as HTML,
/// JSON, or plain text is the caller's job.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub lines: Vec<LineRecord>,
}

/// Component D (spec §2): a read-only view over the coordinator's index,
/// kept as its own type so callers that only need statistics don't need a
/// full [`crate::CacheCoordinator`] in scope.
#[derive(Clone)]
pub struct StatsReporter {
    inner: Arc<Inner>,
}

impl StatsReporter {
    pub(crate) fn new(inner: Arc<Inner>) -> Self {
        StatsReporter { inner }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let state = self.inner.state.read().unwrap();
        let lines = state
            .index
            .iter()
            .enumerate()
            .map(|(index, (fp, line))| LineRecord {
                index,
                file_id: fp.id,
                flags: line.state.flags(),
                width: fp.width,
                height: fp.height,
                pixel_format: fp.pixel_format,
                frame: fp.frame,
                lru: line.lru,
            })
            .collect();

        StatsSnapshot {
            capacity: state.index.capacity(),
            hits: state.hits,
            misses: state.misses,
            lines,
        }
    }
}
