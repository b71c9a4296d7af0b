//! Export, import and file persistence.
//!
//! An [`Archive`] pairs the canonical [`Snapshot`] with an optional
//! [`AdjacencySummary`]. Import builds the whole graph off to the side and
//! only then wraps it in a store, so a failure leaves nothing behind.

pub mod codec;
mod snapshot;

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::GraphConfig;
use crate::error::{KgError, KgResult};
use crate::store::GraphStore;

pub use snapshot::{AdjacencySummary, GenerationStamp, Snapshot, FORMAT_VERSION};

/// Serialised form of a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Archive {
    pub snapshot: Snapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<AdjacencySummary>,
}

impl Archive {
    /// Stamp of the canonical list.
    pub fn stamp(&self) -> KgResult<GenerationStamp> {
        self.snapshot.stamp()
    }
}

/// Captures the store's current generation, with an adjacency summary.
pub fn export(store: &GraphStore) -> KgResult<Archive> {
    let view = store.snapshot()?;
    let snapshot = Snapshot::capture(&view);
    let stamp = snapshot.stamp()?;
    let summary = AdjacencySummary::capture(&view, stamp);
    info!(
        generation = snapshot.generation,
        entities = snapshot.entities.len(),
        relationships = snapshot.relationships.len(),
        "Graph exported"
    );
    Ok(Archive {
        snapshot,
        summary: Some(summary),
    })
}

/// Rebuilds a store from an archive.
///
/// # Errors
/// `SchemaConflict` for duplicate ids with different types, `CyclicHierarchy`
/// for a cyclic class hierarchy, `MalformedSnapshot` for any other structural
/// problem.
pub fn import(archive: &Archive, config: GraphConfig) -> KgResult<GraphStore> {
    let mut state = archive.snapshot.restore()?;
    let stamp = archive.stamp()?;
    let used_summary = AdjacencySummary::apply(archive.summary.as_ref(), &stamp, &mut state)?;
    info!(
        generation = state.generation,
        entities = state.entities.len(),
        relationships = state.triples.len(),
        used_summary,
        "Graph imported"
    );
    Ok(GraphStore::from_state(config, state))
}

/// Writes the store to `path` atomically (temp file, fsync, rename).
pub fn save(path: impl AsRef<Path>, store: &GraphStore) -> KgResult<()> {
    let path = path.as_ref();
    let archive = export(store)?;
    let temp_path = path.with_extension("fkg.tmp");
    let written = write_synced(&temp_path, &archive).and_then(|()| fs::rename(&temp_path, path).map_err(KgError::from));
    if let Err(err) = written {
        if let Err(cleanup) = fs::remove_file(&temp_path) {
            if cleanup.kind() != io::ErrorKind::NotFound {
                warn!(path = %temp_path.display(), error = %cleanup, "Failed to remove temp snapshot");
            }
        }
        return Err(err);
    }
    info!(path = %path.display(), "Snapshot saved");
    Ok(())
}

fn write_synced(temp_path: &Path, archive: &Archive) -> KgResult<()> {
    let mut writer = BufWriter::new(File::create(temp_path)?);
    codec::encode(archive, &mut writer)?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(())
}

/// Loads a store saved with [`save`], using the default graph config.
pub fn load(path: impl AsRef<Path>) -> KgResult<GraphStore> {
    load_with_config(path, GraphConfig::default())
}

pub fn load_with_config(path: impl AsRef<Path>, config: GraphConfig) -> KgResult<GraphStore> {
    let path = path.as_ref();
    let mut reader = BufReader::new(File::open(path)?);
    let archive: Archive = codec::decode(&mut reader)?;
    info!(path = %path.display(), "Snapshot loaded");
    import(&archive, config)
}
