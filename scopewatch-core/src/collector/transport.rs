//! Channels to the collector process
//!
//! A [`Transport`] opens one fresh [`Channel`] per request. The production
//! transport spawns the collector executable registered for a host identity
//! and talks native-messaging frames over its stdio.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use super::framing::{read_frame, write_frame};
use crate::config::HostConfig;
use crate::error::DeliveryError;

/// How long a closed channel's process gets to exit on its own
const EXIT_GRACE: Duration = Duration::from_millis(500);

/// Opens request/response channels to a collector process
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, host_identity: &str) -> Result<Box<dyn Channel>, DeliveryError>;
}

/// One open request/response channel
#[async_trait]
pub trait Channel: Send {
    /// Send one message
    async fn send(&mut self, message: &serde_json::Value) -> Result<(), DeliveryError>;

    /// Next message, or `None` once the peer has closed the channel
    async fn recv(&mut self) -> Result<Option<serde_json::Value>, DeliveryError>;

    /// Tear the channel down and release everything it holds
    async fn close(&mut self);
}

/// Spawns the collector executable registered for each host identity
#[derive(Debug, Clone, Default)]
pub struct NativeHostTransport {
    hosts: HashMap<String, HostConfig>,
}

impl NativeHostTransport {
    pub fn new(hosts: HashMap<String, HostConfig>) -> Self {
        Self { hosts }
    }

    pub fn is_registered(&self, host_identity: &str) -> bool {
        self.hosts.contains_key(host_identity)
    }
}

#[async_trait]
impl Transport for NativeHostTransport {
    async fn open(&self, host_identity: &str) -> Result<Box<dyn Channel>, DeliveryError> {
        let host = self.hosts.get(host_identity).ok_or_else(|| {
            DeliveryError::Unreachable(format!("no collector registered for {}", host_identity))
        })?;

        let mut child = Command::new(&host.command)
            .args(&host.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                DeliveryError::Unreachable(format!(
                    "failed to start {}: {}",
                    host.command.display(),
                    e
                ))
            })?;

        // kill_on_drop reaps the child if either pipe is missing
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| DeliveryError::Unreachable("collector stdin unavailable".to_string()))?;
        let stdout = child.stdout.take().ok_or_else(|| {
            DeliveryError::Unreachable("collector stdout unavailable".to_string())
        })?;

        tracing::debug!(
            host = %host_identity,
            command = %host.command.display(),
            pid = ?child.id(),
            "Collector process started"
        );

        Ok(Box::new(NativeHostChannel {
            child,
            stdin: Some(stdin),
            stdout,
        }))
    }
}

/// Channel over a spawned collector's stdio
pub struct NativeHostChannel {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: ChildStdout,
}

#[async_trait]
impl Channel for NativeHostChannel {
    async fn send(&mut self, message: &serde_json::Value) -> Result<(), DeliveryError> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| DeliveryError::Disconnected("channel already closed".to_string()))?;
        write_frame(stdin, message).await.map_err(|e| match e {
            DeliveryError::Io(reason) => DeliveryError::Disconnected(reason),
            other => other,
        })
    }

    async fn recv(&mut self) -> Result<Option<serde_json::Value>, DeliveryError> {
        read_frame(&mut self.stdout).await
    }

    async fn close(&mut self) {
        // EOF on stdin asks a well-behaved host to exit
        drop(self.stdin.take());

        match tokio::time::timeout(EXIT_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(%status, "Collector process exited");
            }
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "Failed to wait for collector process");
            }
            Err(_) => {
                if let Err(e) = self.child.kill().await {
                    tracing::warn!(error = %e, "Failed to kill collector process");
                }
            }
        }
    }
}
