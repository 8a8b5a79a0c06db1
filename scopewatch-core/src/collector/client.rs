//! Delivery client: one batch, one channel, one correlated response
//!
//! Every call opens a fresh channel, sends a single `collector.sync` request
//! with a new request id, and waits (bounded) for the response carrying that
//! id. Responses with any other id are skipped. The channel is closed on every
//! exit path before the call returns.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use super::transport::{Channel, Transport};
use super::wire::{ClientInfo, SyncRequest, SyncResponse};
use crate::error::DeliveryError;
use crate::types::Report;

/// Sends report batches to the collector process
#[derive(Clone)]
pub struct DeliveryClient {
    transport: Arc<dyn Transport>,
    client: ClientInfo,
    timeout: Duration,
}

impl DeliveryClient {
    pub fn new(transport: Arc<dyn Transport>, client: ClientInfo, timeout: Duration) -> Self {
        Self {
            transport,
            client,
            timeout,
        }
    }

    /// Deliver `items` to the collector identified by `host_identity`.
    ///
    /// Resolves exactly once: with the correlated response, or with the
    /// reason no such response arrived.
    pub async fn send(
        &self,
        host_identity: &str,
        items: &[Report],
    ) -> Result<SyncResponse, DeliveryError> {
        let request_id = Uuid::new_v4();
        let request = SyncRequest::new(&self.client, Utc::now(), items, request_id);
        let payload = serde_json::to_value(&request)
            .map_err(|e| DeliveryError::Protocol(format!("failed to encode request: {}", e)))?;

        let mut channel = self.transport.open(host_identity).await?;

        let outcome = tokio::time::timeout(
            self.timeout,
            exchange(channel.as_mut(), &payload, &request_id),
        )
        .await;

        channel.close().await;

        match outcome {
            Ok(Ok(response)) => {
                tracing::debug!(
                    host = %host_identity,
                    request_id = %request_id,
                    items = items.len(),
                    status = response.status().unwrap_or("-"),
                    "Collector acknowledged batch"
                );
                Ok(response)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(DeliveryError::TimedOut(self.timeout)),
        }
    }
}

/// Send the request and read until the matching response or channel close
async fn exchange(
    channel: &mut dyn Channel,
    payload: &serde_json::Value,
    request_id: &Uuid,
) -> Result<SyncResponse, DeliveryError> {
    channel.send(payload).await?;

    loop {
        match channel.recv().await? {
            None => {
                return Err(DeliveryError::Disconnected(
                    "channel closed before a matching response".to_string(),
                ))
            }
            Some(message) => match SyncResponse::correlate(message, request_id) {
                Some(response) => return Ok(response),
                None => {
                    tracing::debug!(request_id = %request_id, "Ignoring uncorrelated message");
                }
            },
        }
    }
}
