use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
};

use anyhow::{anyhow, bail, Result};
use ffmpeg::codec::{packet::Packet, Parameters};
use frame_cache::FileId;
use tracing::instrument;

use crate::read::{read_video, VideoMeta};

struct FileEntry {
    path: PathBuf,
    meta: VideoMeta,
    parameters: Parameters,
    packets: Vec<Arc<Packet>>,
}

struct Inner {
    by_id: HashMap<FileId, FileEntry>,
    by_path: HashMap<PathBuf, FileId>,
    next_id: u32,
}

/// Maps filesystem paths to the small `FileId` fingerprints flow through
/// the cache (spec §3 calls `file_id` "assigned by the external decoder
/// controller" — this is that controller). Registration eagerly reads the
/// whole packet list, matching `tlc-core`'s `read_video` + `VideoData`
/// shape; lookups afterwards are free of I/O.
pub struct FileTable {
    inner: RwLock<Inner>,
}

impl Default for FileTable {
    fn default() -> Self {
        Self::new()
    }
}

impl FileTable {
    pub fn new() -> Self {
        FileTable {
            inner: RwLock::new(Inner {
                by_id: HashMap::new(),
                by_path: HashMap::new(),
                next_id: 0,
            }),
        }
    }

    /// Assigns (or returns the existing) `FileId` for `path`, reading the
    /// container the first time this path is seen.
    #[instrument(skip(self), err)]
    pub fn register(&self, path: impl AsRef<Path> + std::fmt::Debug) -> Result<FileId> {
        let path = path.as_ref().to_owned();
        if let Some(&id) = self.inner.read().unwrap().by_path.get(&path) {
            return Ok(id);
        }

        let (meta, parameters, packets) = read_video(&path)?;
        let packets = packets.into_iter().map(Arc::new).collect();

        let mut inner = self.inner.write().unwrap();
        // Another thread may have registered the same path while we were
        // reading the container; don't assign a second id for it.
        if let Some(&id) = inner.by_path.get(&path) {
            return Ok(id);
        }
        let id = inner
            .next_id
            .try_into()
            .map_err(|_| anyhow!("file table exhausted ({} files registered)", inner.next_id))?;
        inner.next_id += 1;
        inner.by_path.insert(path.clone(), id);
        inner.by_id.insert(
            id,
            FileEntry {
                path,
                meta,
                parameters,
                packets,
            },
        );
        Ok(id)
    }

    pub fn path(&self, id: FileId) -> Option<PathBuf> {
        self.inner.read().unwrap().by_id.get(&id).map(|e| e.path.clone())
    }

    pub fn meta(&self, id: FileId) -> Option<VideoMeta> {
        self.inner.read().unwrap().by_id.get(&id).map(|e| e.meta)
    }

    pub(crate) fn parameters(&self, id: FileId) -> Result<Parameters> {
        self.inner
            .read()
            .unwrap()
            .by_id
            .get(&id)
            .map(|e| e.parameters.clone())
            .ok_or_else(|| anyhow!("unknown file id {id}"))
    }

    pub(crate) fn packet(&self, id: FileId, frame: i64) -> Result<Arc<Packet>> {
        let inner = self.inner.read().unwrap();
        let entry = inner.by_id.get(&id).ok_or_else(|| anyhow!("unknown file id {id}"))?;
        let frame: usize = frame
            .try_into()
            .map_err(|_| anyhow!("negative frame index {frame}"))?;
        match entry.packets.get(frame) {
            Some(packet) => Ok(packet.clone()),
            None => bail!(
                "frame {frame} out of bounds for {} ({} frames)",
                entry.path.display(),
                entry.packets.len()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Registering a video requires decoding its container with real
    // ffmpeg, so these need a real file on disk; point VIDEO_PATH at one
    // locally to exercise them.
    const VIDEO_PATH: &str = "/tmp/frame-decode-sample.mp4";

    #[test]
    #[ignore]
    fn register_is_idempotent_for_the_same_path() {
        let table = FileTable::new();
        let id1 = table.register(VIDEO_PATH).unwrap();
        let id2 = table.register(VIDEO_PATH).unwrap();
        assert_eq!(id1, id2);
    }

    #[test]
    #[ignore]
    fn unknown_file_id_is_an_error() {
        let table = FileTable::new();
        assert!(table.packet(999, 0).is_err());
    }
}
