use crate::index::SearchIndex;
use crate::{Artifact, DocId, ForwardEntry, IndexError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{create_dir_all, File};
use std::io::{Read, Write};
use std::path::Path;
use time::OffsetDateTime;

pub const SNAPSHOT_VERSION: u32 = 1;

/// Serializable image of the whole index. Importing one replaces the current state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSnapshot {
    pub version: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub index: BTreeMap<DocId, ForwardEntry>,
    pub inverted_index: BTreeMap<String, Vec<DocId>>,
    pub artifacts: BTreeMap<DocId, Artifact>,
}

impl SearchIndex {
    pub fn export_snapshot(&self) -> IndexSnapshot {
        IndexSnapshot {
            version: SNAPSHOT_VERSION,
            timestamp: OffsetDateTime::now_utc(),
            index: self.forward.clone(),
            inverted_index: self
                .inverted
                .iter()
                .map(|(term, ids)| (term.clone(), ids.iter().cloned().collect()))
                .collect(),
            artifacts: self.artifacts.clone(),
        }
    }

    /// Replace the current contents with `snapshot`. The snapshot is validated in full
    /// first; on error the current index is left untouched.
    pub fn import_snapshot(&mut self, snapshot: IndexSnapshot) -> Result<()> {
        let inverted = validate(&snapshot)?;
        self.forward = snapshot.index;
        self.artifacts = snapshot.artifacts;
        self.inverted = inverted;
        self.last_updated = Some(snapshot.timestamp);
        tracing::info!(artifacts = self.forward.len(), terms = self.inverted.len(), "imported index snapshot");
        Ok(())
    }
}

fn validate(snapshot: &IndexSnapshot) -> Result<BTreeMap<String, BTreeSet<DocId>>> {
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(IndexError::UnsupportedVersion { found: snapshot.version, expected: SNAPSHOT_VERSION });
    }
    for (id, artifact) in &snapshot.artifacts {
        if id != &artifact.id {
            return Err(IndexError::InconsistentSnapshot(format!("artifact key {id} holds id {}", artifact.id)));
        }
        if !snapshot.index.contains_key(id) {
            return Err(IndexError::InconsistentSnapshot(format!("artifact {id} has no index entry")));
        }
    }
    if let Some(id) = snapshot.index.keys().find(|id| !snapshot.artifacts.contains_key(*id)) {
        return Err(IndexError::InconsistentSnapshot(format!("index entry {id} has no artifact")));
    }

    let mut expected: BTreeMap<String, BTreeSet<DocId>> = BTreeMap::new();
    for (id, entry) in &snapshot.index {
        for token in &entry.tokens {
            expected.entry(token.clone()).or_default().insert(id.clone());
        }
    }
    let provided: BTreeMap<String, BTreeSet<DocId>> = snapshot
        .inverted_index
        .iter()
        .map(|(term, ids)| (term.clone(), ids.iter().cloned().collect()))
        .collect();
    if provided != expected {
        return Err(IndexError::InconsistentSnapshot("inverted index does not match forward index".into()));
    }
    Ok(expected)
}

/// Write a snapshot to disk; `.bin` files use bincode, anything else pretty JSON.
pub fn save_snapshot<P: AsRef<Path>>(path: P, snapshot: &IndexSnapshot) -> Result<()> {
    let path = path.as_ref();
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        create_dir_all(dir)?;
    }
    let mut f = File::create(path)?;
    if is_binary(path) {
        let bytes = bincode::serialize(snapshot)?;
        f.write_all(&bytes)?;
    } else {
        let json = serde_json::to_string_pretty(snapshot)?;
        f.write_all(json.as_bytes())?;
    }
    Ok(())
}

pub fn load_snapshot<P: AsRef<Path>>(path: P) -> Result<IndexSnapshot> {
    let path = path.as_ref();
    let mut f = File::open(path)?;
    let mut buf = Vec::new();
    f.read_to_end(&mut buf)?;
    let snapshot = if is_binary(path) {
        bincode::deserialize(&buf)?
    } else {
        serde_json::from_slice(&buf)?
    };
    Ok(snapshot)
}

fn is_binary(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("bin")
}
