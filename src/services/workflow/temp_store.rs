//! File-backed scratch space holding one context per (workflow, channel) during a run.

use std::path::{Path, PathBuf};

use anyhow::Context;
use tokio::fs;
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::services::workflow::ChannelContext;

/// Resolvable reference to a stored context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextHandle(PathBuf);

impl ContextHandle {
    pub fn path(&self) -> &Path {
        &self.0
    }
}

#[derive(Debug, Clone)]
pub struct TempContextStore {
    dir: PathBuf,
}

/// Percent-encodes everything outside `[A-Za-z0-9.-]` so ids map to safe, unique file names.
fn encode_component(raw: &str) -> String {
    let mut encoded = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'.' {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }
    encoded
}

fn workflow_prefix(workflow_id: &str) -> String {
    format!("workflow_{}_", encode_component(workflow_id))
}

fn io_error(operation: &str, error: anyhow::Error) -> AppError {
    AppError::Internal {
        source: error.context(operation.to_string()),
    }
}

impl TempContextStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, workflow_id: &str, channel_id: &str) -> PathBuf {
        self.dir.join(format!(
            "{}channel_{}.json",
            workflow_prefix(workflow_id),
            encode_component(channel_id)
        ))
    }

    /// Persists a context, replacing any earlier one for the same pair.
    pub async fn write(
        &self,
        workflow_id: &str,
        channel_id: &str,
        context: &ChannelContext,
    ) -> AppResult<ContextHandle> {
        let path = self.path_for(workflow_id, channel_id);
        let payload = serde_json::to_vec(context)
            .context("serialize channel context")
            .map_err(|e| io_error("temp context write", e))?;

        let staging = path.with_extension("json.tmp");
        async {
            fs::create_dir_all(&self.dir).await?;
            fs::write(&staging, &payload).await?;
            fs::rename(&staging, &path).await
        }
        .await
        .with_context(|| format!("write {}", path.display()))
        .map_err(|e| io_error("temp context write", e))?;

        debug!(path = %path.display(), bytes = payload.len(), "Stored channel context");
        Ok(ContextHandle(path))
    }

    pub async fn read(&self, handle: &ContextHandle) -> AppResult<ChannelContext> {
        let payload = fs::read(handle.path())
            .await
            .with_context(|| format!("read {}", handle.path().display()))
            .map_err(|e| io_error("temp context read", e))?;

        serde_json::from_slice(&payload)
            .with_context(|| format!("decode {}", handle.path().display()))
            .map_err(|e| io_error("temp context read", e))
    }

    /// Removes every stored context of the workflow. Returns how many were removed.
    pub async fn cleanup_all(&self, workflow_id: &str) -> AppResult<usize> {
        let prefix = workflow_prefix(workflow_id);
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(io_error("temp context cleanup", e.into())),
        };

        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_error("temp context cleanup", e.into()))?
        {
            let name = entry.file_name();
            if name.to_string_lossy().starts_with(&prefix) {
                fs::remove_file(entry.path())
                    .await
                    .with_context(|| format!("remove {}", entry.path().display()))
                    .map_err(|e| io_error("temp context cleanup", e))?;
                removed += 1;
            }
        }

        debug!(workflow_definition_id = workflow_id, removed, "Cleared temp contexts");
        Ok(removed)
    }
}
