// ABOUTME: Persistent checkpoint tracking for multi-step wiki deployments
// ABOUTME: Provides deploy resume support with hashed wiki identities

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

const DEPLOY_CHECKPOINT_VERSION: u32 = 1;

/// Step names recorded in a deploy checkpoint, in execution order
pub mod steps {
    pub const DATABASE_CREATED: &str = "database-created";
    pub const CONTAINER_READY: &str = "container-ready";
    pub const INSTALLED: &str = "installed";
    pub const UPDATED: &str = "updated";
    pub const SETTINGS_COPIED: &str = "settings-copied";
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeployCheckpointMetadata {
    pub wiki_hash: String,
    pub profile: String,
}

impl DeployCheckpointMetadata {
    pub fn new(wiki_name: &str, database: &str, profile: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(wiki_name.as_bytes());
        hasher.update(b"::");
        hasher.update(database.as_bytes());
        Self {
            wiki_hash: format!("{:x}", hasher.finalize()),
            profile: profile.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DeployCheckpointData {
    version: u32,
    metadata: DeployCheckpointMetadata,
    completed: BTreeSet<String>,
}

/// Resume state for one wiki deployment
///
/// A deploy that failed at step N picks up after the last completed step on
/// the next run, as long as the wiki identity and profile still match.
#[derive(Debug, Clone)]
pub struct DeployCheckpoint {
    data: DeployCheckpointData,
}

impl DeployCheckpoint {
    pub fn new(metadata: DeployCheckpointMetadata) -> Self {
        Self {
            data: DeployCheckpointData {
                version: DEPLOY_CHECKPOINT_VERSION,
                metadata,
                completed: BTreeSet::new(),
            },
        }
    }

    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read checkpoint at {}", path.display()))?;
        let data: DeployCheckpointData = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse checkpoint JSON at {}", path.display()))?;

        if data.version != DEPLOY_CHECKPOINT_VERSION {
            bail!(
                "Checkpoint version mismatch (found {}, expected {}). Re-run with --fresh-install to discard it.",
                data.version,
                DEPLOY_CHECKPOINT_VERSION
            );
        }

        Ok(Some(Self { data }))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create checkpoint directory {}", parent.display())
            })?;
        }

        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(parent)
            .with_context(|| format!("Failed to create temp checkpoint in {}", parent.display()))?;

        serde_json::to_writer_pretty(tmp.as_file_mut(), &self.data)
            .with_context(|| format!("Failed to serialize checkpoint at {}", path.display()))?;

        tmp.persist(path)
            .with_context(|| format!("Failed to persist checkpoint at {}", path.display()))?;

        Ok(())
    }

    pub fn metadata(&self) -> &DeployCheckpointMetadata {
        &self.data.metadata
    }

    pub fn mark_completed(&mut self, step: &str) -> bool {
        self.data.completed.insert(step.to_string())
    }

    pub fn is_completed(&self, step: &str) -> bool {
        self.data.completed.contains(step)
    }

    pub fn completed_count(&self) -> usize {
        self.data.completed.len()
    }

    /// Refuse to resume when the checkpoint belongs to a different wiki
    /// identity or deploy profile
    pub fn validate(&self, metadata: &DeployCheckpointMetadata) -> Result<()> {
        if self.data.metadata != *metadata {
            bail!(
                "Checkpoint does not match this wiki/profile. Re-run with --fresh-install to discard the previous state."
            );
        }
        Ok(())
    }
}

/// Checkpoint location inside a wiki's state directory
pub fn checkpoint_path(wiki_dir: &Path) -> PathBuf {
    wiki_dir.join("deploy-checkpoint.json")
}

pub fn remove_checkpoint(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_file(path)
            .with_context(|| format!("Failed to remove checkpoint at {}", path.display()))?;
    }
    Ok(())
}
