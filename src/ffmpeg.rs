use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("frame extraction tool not found: {0}")]
    ToolNotFound(String),

    #[error("failed to run frame extraction tool: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("frame extraction exited with status {status:?}: {stderr}")]
    Failed { status: Option<i32>, stderr: String },

    #[error("frame extraction timed out after {0:?}")]
    Timeout(Duration),

    #[error("frame extraction produced no output at {0:?}")]
    MissingOutput(PathBuf),
}

/// Produces a single still image from a video at a given offset.
///
/// Implementations overwrite `destination` if it exists and do not retry.
#[async_trait]
pub trait FrameExtractor: Send + Sync {
    async fn extract_frame(
        &self,
        source: &Path,
        offset_seconds: f64,
        destination: &Path,
    ) -> Result<(), ExtractionError>;
}

/// Frame extraction via an external `ffmpeg` process.
#[derive(Clone, Debug)]
pub struct FfmpegExtractor {
    binary: String,
    width: u32,
    timeout: Duration,
}

impl FfmpegExtractor {
    pub fn new(binary: impl Into<String>, width: u32, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            width,
            timeout,
        }
    }
}

#[async_trait]
impl FrameExtractor for FfmpegExtractor {
    async fn extract_frame(
        &self,
        source: &Path,
        offset_seconds: f64,
        destination: &Path,
    ) -> Result<(), ExtractionError> {
        let child = Command::new(&self.binary)
            .arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-ss")
            .arg(format!("{:.3}", offset_seconds))
            .arg("-i")
            .arg(source)
            .arg("-frames:v")
            .arg("1")
            .arg("-vf")
            .arg(format!("scale={}:-2", self.width))
            .arg("-y") // Overwrite output file
            .arg(destination)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ExtractionError::ToolNotFound(self.binary.clone())
                } else {
                    ExtractionError::Spawn(e)
                }
            })?;

        // Dropping the future on timeout kills the child
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ExtractionError::Timeout(self.timeout))?
            .map_err(ExtractionError::Spawn)?;

        if !output.status.success() {
            return Err(ExtractionError::Failed {
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        match tokio::fs::try_exists(destination).await {
            Ok(true) => Ok(()),
            _ => Err(ExtractionError::MissingOutput(destination.to_path_buf())),
        }
    }
}

/// Version line of the extraction tool, if it can be run.
pub async fn tool_version(binary: &str) -> anyhow::Result<String> {
    let output = Command::new(binary)
        .arg("-version")
        .stdin(Stdio::null())
        .output()
        .await?;

    if !output.status.success() {
        anyhow::bail!("{} not available", binary);
    }

    let version = String::from_utf8_lossy(&output.stdout);
    Ok(version.lines().next().unwrap_or("unknown").to_string())
}
