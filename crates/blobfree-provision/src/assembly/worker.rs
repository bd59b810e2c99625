//! Isolated filesystem builder worker.
//!
//! `make_ext4fs` runs as a separate process with an empty environment (only
//! `PATH` survives), no stdin, its working directory set to `images/` and a
//! hard time limit. The caller sees a plain request/response exchange.

use blobfree_device::host::{ToolCommand, ToolError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Paths in, options for the builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerRequest {
    /// Content directory to pack
    pub source: PathBuf,
    /// Image file to produce
    pub image: PathBuf,
    /// Extra builder options from `cmdline-fs.txt`
    #[serde(default)]
    pub options: Vec<String>,
}

/// Outcome of one worker run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerResponse {
    /// The builder ran to completion
    pub done: bool,
    /// The image file exists afterwards
    pub result: bool,
    /// Failure detail, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl WorkerResponse {
    fn aborted(message: String) -> Self {
        Self {
            done: false,
            result: false,
            message: Some(message),
        }
    }
}

/// Runs the filesystem image builder out of process.
#[derive(Debug, Clone)]
pub struct IsolatedWorker {
    program: PathBuf,
    timeout: Duration,
}

impl IsolatedWorker {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    /// Arguments: options, then image, then source.
    pub fn command(&self, request: &WorkerRequest) -> ToolCommand {
        let mut command = ToolCommand::new(&self.program)
            .args(&request.options)
            .arg_path(&request.image)
            .arg_path(&request.source)
            .timeout(self.timeout)
            .isolated();
        if let Some(dir) = request.image.parent() {
            command = command.dir(dir);
        }
        command
    }

    /// Run the builder and report whether it produced the image.
    pub async fn run(&self, request: &WorkerRequest) -> WorkerResponse {
        let command = self.command(request);
        debug!(command = %command.display(), "Starting filesystem builder");

        match command.run().await {
            Ok(_) => {
                let result = image_exists(&request.image).await;
                WorkerResponse {
                    done: true,
                    result,
                    message: (!result).then(|| "builder exited without writing the image".to_string()),
                }
            }
            Err(e @ ToolError::Failed { .. }) => {
                warn!(error = %e, "Filesystem builder failed");
                WorkerResponse {
                    done: true,
                    result: false,
                    message: Some(e.to_string()),
                }
            }
            Err(e) => {
                warn!(error = %e, "Filesystem builder did not complete");
                WorkerResponse::aborted(e.to_string())
            }
        }
    }
}

async fn image_exists(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok_and(|meta| meta.is_file())
}
