//! Archive extraction through an external tool.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Failed to run {program}: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status} extracting {}: {stderr}", archive.display())]
    ToolFailed {
        program: String,
        archive: PathBuf,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("{program} did not finish extracting {} within {timeout:?}", archive.display())]
    TimedOut {
        program: String,
        archive: PathBuf,
        timeout: Duration,
    },
}

/// Decompresses a downloaded archive into a directory.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, archive: &Path, dest_dir: &Path) -> Result<(), ExtractError>;
}

/// Runs `<program> <archive> -X <dest_dir>`, the `aunpack` calling convention.
#[derive(Debug, Clone)]
pub struct CommandExtractor {
    program: String,
    timeout: Duration,
}

impl CommandExtractor {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Extractor for CommandExtractor {
    async fn extract(&self, archive: &Path, dest_dir: &Path) -> Result<(), ExtractError> {
        debug!(program = %self.program, archive = %archive.display(), "Extracting archive");

        let child = Command::new(&self.program)
            .arg(archive)
            .arg("-X")
            .arg(dest_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ExtractError::SpawnFailed {
                program: self.program.clone(),
                source,
            })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| ExtractError::SpawnFailed {
                program: self.program.clone(),
                source,
            })?,
            // Dropping the future drops the child, which kills it
            Err(_) => {
                return Err(ExtractError::TimedOut {
                    program: self.program.clone(),
                    archive: archive.to_path_buf(),
                    timeout: self.timeout,
                })
            }
        };

        if !output.status.success() {
            return Err(ExtractError::ToolFailed {
                program: self.program.clone(),
                archive: archive.to_path_buf(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(())
    }
}
