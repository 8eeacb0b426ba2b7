use async_trait::async_trait;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::models::detection::DetectionFields;

/// Runs face detection on one image.
///
/// Implementations may be slow and may fail; the worker pool turns a failure
/// into a failed outcome for that image only.
#[async_trait]
pub trait Detector: Send + Sync {
    async fn execute(&self, image_name: &str, image_bytes: &[u8]) -> Result<DetectionFields, ExecutionError>;
}

/// Detector that runs an external script per image.
///
/// Invoked as `<program> <script> <image_name>` with the image bytes on stdin;
/// the script must print a single JSON object on stdout.
pub struct ScriptDetector {
    program: String,
    script: String,
    timeout: Duration,
}

impl ScriptDetector {
    pub fn new(program: impl Into<String>, script: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            script: script.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Detector for ScriptDetector {
    async fn execute(&self, image_name: &str, image_bytes: &[u8]) -> Result<DetectionFields, ExecutionError> {
        let mut child = Command::new(&self.program)
            .arg(&self.script)
            .arg(image_name)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(ExecutionError::Spawn)?;

        let mut stdin = child.stdin.take().ok_or(ExecutionError::StdinUnavailable)?;

        let run = async move {
            let write_input = async move {
                let written = stdin.write_all(image_bytes).await;
                drop(stdin);
                written
            };
            tokio::join!(write_input, child.wait_with_output())
        };

        let (written, output) = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| ExecutionError::Timeout(self.timeout))?;
        let output = output.map_err(ExecutionError::Wait)?;

        if !output.status.success() {
            return Err(ExecutionError::Exit {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        written.map_err(ExecutionError::Stdin)?;

        parse_output(&output.stdout)
    }
}

/// Parse detector stdout into a JSON object.
pub fn parse_output(stdout: &[u8]) -> Result<DetectionFields, ExecutionError> {
    match serde_json::from_slice(stdout)? {
        serde_json::Value::Object(fields) => Ok(fields),
        _ => Err(ExecutionError::NotAnObject),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("Failed to start detector: {0}")]
    Spawn(std::io::Error),

    #[error("Detector stdin was not captured")]
    StdinUnavailable,

    #[error("Failed to write image to detector: {0}")]
    Stdin(std::io::Error),

    #[error("Failed waiting for detector: {0}")]
    Wait(std::io::Error),

    #[error("Detector timed out after {0:?}")]
    Timeout(Duration),

    #[error("Detector exited with {status}: {stderr}")]
    Exit { status: ExitStatus, stderr: String },

    #[error("Failed to parse detector output: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Detector output is not a JSON object")]
    NotAnObject,
}
