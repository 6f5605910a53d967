//! External scraper programs.
//!
//! The program receives the resource id in `WARMCACHE_RESOURCE_ID`, must print
//! the JSON payload on stdout and exit with status 0. Anything on stderr is
//! kept for the error message when it fails.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use warmcache_core::{AcquireError, Acquirer, Payload, ResourceId};

use super::excerpt;

/// Environment variable carrying the resource id to the child process.
pub const RESOURCE_ID_ENV: &str = "WARMCACHE_RESOURCE_ID";

#[derive(Debug, Clone)]
pub struct CommandAcquirer {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandAcquirer {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl Acquirer for CommandAcquirer {
    async fn acquire(&self, resource_id: &ResourceId) -> Result<Payload, AcquireError> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .env(RESOURCE_ID_ENV, resource_id.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                AcquireError::failed(resource_id, format!("Failed to spawn {}: {}", self.program, e))
            })?;

        // On timeout the future owning the child is dropped, which kills it.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output.map_err(|e| {
                AcquireError::failed(resource_id, format!("Failed to wait for {}: {}", self.program, e))
            })?,
            Err(_) => {
                return Err(AcquireError::Timeout {
                    resource_id: resource_id.clone(),
                    after: self.timeout,
                })
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AcquireError::failed(
                resource_id,
                format!("{} exited with {}: {}", self.program, output.status, excerpt(&stderr)),
            ));
        }

        serde_json::from_slice(&output.stdout).map_err(|e| AcquireError::InvalidPayload {
            resource_id: resource_id.clone(),
            reason: format!("{} did not print JSON: {}", self.program, e),
        })
    }

    fn kind(&self) -> &'static str {
        "command"
    }
}
