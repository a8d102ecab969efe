//! Backend that runs jobs as subprocesses of the current machine.
//!
//! The job id is the working directory. Status is read back from the
//! files the rendered script leaves behind, so a job submitted by an
//! earlier process can still be polled after a restart.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::backend::{RemoteBackend, RemoteStatus};
use crate::error::RemoteError;
use crate::script::{JobScript, EXIT_STATUS_FILE, SCRIPT_FILE};

/// Runs every host's jobs locally through `sh`.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    shell: PathBuf,
}

impl Default for LocalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalBackend {
    pub fn new() -> Self {
        Self {
            shell: PathBuf::from("sh"),
        }
    }

    pub fn with_shell(shell: impl Into<PathBuf>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

fn map_io(host: &str, path: &Path, e: std::io::Error) -> RemoteError {
    if e.kind() == std::io::ErrorKind::NotFound {
        RemoteError::NotFound {
            host: host.to_string(),
            path: path.display().to_string(),
        }
    } else {
        RemoteError::Io(e)
    }
}

#[async_trait]
impl RemoteBackend for LocalBackend {
    async fn submit(&self, host_id: &str, script: &JobScript) -> Result<String, RemoteError> {
        let dir = &script.working_dir;
        let script_path = dir.join(SCRIPT_FILE);
        if tokio::fs::try_exists(&script_path).await? {
            return Err(RemoteError::SubmissionRejected {
                host: host_id.to_string(),
                reason: format!("{} already holds a job", dir.display()),
            });
        }

        tokio::fs::create_dir_all(dir).await?;
        tokio::fs::write(&script_path, script.render_shell()).await?;

        let mut child = Command::new(&self.shell)
            .arg(&script_path)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| RemoteError::SubmissionRejected {
                host: host_id.to_string(),
                reason: format!("failed to start {}: {e}", self.shell.display()),
            })?;

        let job_id = dir.display().to_string();
        tracing::debug!(job_id = %job_id, pid = child.id(), "Started local job");

        // Reap the child; the exit code itself is written by the script.
        tokio::spawn(async move {
            let _ = child.wait().await;
        });

        Ok(job_id)
    }

    async fn status(&self, host_id: &str, job_id: &str) -> Result<RemoteStatus, RemoteError> {
        let dir = Path::new(job_id);
        let exit_path = dir.join(EXIT_STATUS_FILE);
        match tokio::fs::read_to_string(&exit_path).await {
            Ok(code) => {
                return Ok(if code.trim() == "0" {
                    RemoteStatus::Done
                } else {
                    RemoteStatus::Failed
                });
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(RemoteError::Io(e)),
        }

        let script_path = dir.join(SCRIPT_FILE);
        if tokio::fs::try_exists(&script_path).await? {
            Ok(RemoteStatus::Running)
        } else {
            Err(RemoteError::NotFound {
                host: host_id.to_string(),
                path: job_id.to_string(),
            })
        }
    }

    async fn read_file(&self, host_id: &str, path: &Path) -> Result<Vec<u8>, RemoteError> {
        tokio::fs::read(path).await.map_err(|e| map_io(host_id, path, e))
    }

    async fn list_dir(&self, host_id: &str, path: &Path) -> Result<Vec<String>, RemoteError> {
        let mut entries = tokio::fs::read_dir(path)
            .await
            .map_err(|e| map_io(host_id, path, e))?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }

    async fn delete(&self, host_id: &str, path: &Path) -> Result<(), RemoteError> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| map_io(host_id, path, e))?;
        if metadata.is_dir() {
            tokio::fs::remove_dir_all(path).await?;
        } else {
            tokio::fs::remove_file(path).await?;
        }
        Ok(())
    }
}
