use std::{path::PathBuf, process::Stdio, time::Duration};

use common::{error::AppError, utils::config::AppConfig};
use tokio::process::Command;
use tracing::{info, instrument, warn};

const ROOT_PLACEHOLDER: &str = "{root}";
const STDERR_TAIL_LINES: usize = 20;

/// The external index build, resolved against one (derived) configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexCommand {
    root: PathBuf,
    program: String,
    args: Vec<String>,
    envs: Vec<(String, String)>,
    timeout: Option<Duration>,
}

impl IndexCommand {
    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let root = config.dataset_root.display().to_string();
        let mut parts = config
            .indexing
            .command
            .iter()
            .map(|part| part.replace(ROOT_PLACEHOLDER, &root));
        let program = parts
            .next()
            .ok_or_else(|| AppError::Indexing("indexing.command is empty".into()))?;

        let envs = [
            ("GRAPHRAG_ROOT", root.clone()),
            ("GRAPHRAG_API_KEY", config.llm.api_key.clone()),
            ("GRAPHRAG_API_BASE", config.llm.api_base.clone()),
            ("GRAPHRAG_LLM_MODEL", config.llm.model.clone()),
            ("GRAPHRAG_EMBEDDING_MODEL", config.embeddings.model.clone()),
            ("GRAPHRAG_EMBEDDING_API_KEY", config.embeddings.api_key.clone()),
            ("GRAPHRAG_CHUNK_SIZE", config.chunks.size.to_string()),
            ("GRAPHRAG_CHUNK_OVERLAP", config.chunks.overlap.to_string()),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect();

        Ok(Self {
            root: config.dataset_root.clone(),
            program,
            args: parts.collect(),
            envs,
            timeout: config.indexing.timeout_secs.map(Duration::from_secs),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn env(&self, key: &str) -> Option<&str> {
        self.envs
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    /// Runs the command to completion. The child is killed if this future is
    /// dropped or the timeout elapses.
    #[instrument(skip_all, fields(root = %self.root.display(), program = %self.program))]
    pub async fn run(&self) -> Result<(), AppError> {
        if !self.root.is_dir() {
            return Err(AppError::Indexing(format!(
                "dataset root {} is not a directory",
                self.root.display()
            )));
        }

        let child = Command::new(&self.program)
            .args(&self.args)
            .envs(self.envs.iter().map(|(key, value)| (key.as_str(), value.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AppError::Indexing(format!("failed to start '{}': {e}", self.program)))?;

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| {
                    AppError::Indexing(format!("timed out after {}s", limit.as_secs()))
                })??,
            None => child.wait_with_output().await?,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(status = %output.status, "Index command failed");
            return Err(AppError::Indexing(format!(
                "command exited with {}: {}",
                output.status,
                tail_lines(&stderr, STDERR_TAIL_LINES)
            )));
        }

        info!("Index command completed");
        Ok(())
    }
}

fn tail_lines(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text.trim_end().lines().collect();
    let start = lines.len().saturating_sub(count);
    lines.get(start..).unwrap_or_default().join("\n")
}
