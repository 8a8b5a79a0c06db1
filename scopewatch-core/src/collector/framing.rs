//! Native-messaging framing
//!
//! Each message is a 32-bit length in native byte order followed by that many
//! bytes of UTF-8 JSON.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::DeliveryError;

/// Largest frame accepted in either direction (1 MiB)
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Write one JSON message as a frame and flush it
pub async fn write_frame<W>(writer: &mut W, message: &serde_json::Value) -> Result<(), DeliveryError>
where
    W: AsyncWrite + Unpin,
{
    let body = serde_json::to_vec(message)
        .map_err(|e| DeliveryError::Protocol(format!("failed to encode frame: {}", e)))?;
    if body.len() > MAX_FRAME_BYTES {
        return Err(DeliveryError::Protocol(format!(
            "outgoing frame of {} bytes exceeds {} byte limit",
            body.len(),
            MAX_FRAME_BYTES
        )));
    }

    let len = body.len() as u32;
    writer.write_all(&len.to_ne_bytes()).await.map_err(io_error)?;
    writer.write_all(&body).await.map_err(io_error)?;
    writer.flush().await.map_err(io_error)?;
    Ok(())
}

/// Read one frame. `Ok(None)` means the peer closed cleanly between frames.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<serde_json::Value>, DeliveryError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(io_error(e)),
    }

    let len = u32::from_ne_bytes(len_buf) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(DeliveryError::Protocol(format!(
            "incoming frame of {} bytes exceeds {} byte limit",
            len, MAX_FRAME_BYTES
        )));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            DeliveryError::Disconnected("channel closed mid-frame".to_string())
        } else {
            io_error(e)
        }
    })?;

    serde_json::from_slice(&body)
        .map(Some)
        .map_err(|e| DeliveryError::Protocol(format!("invalid JSON frame: {}", e)))
}

fn io_error(e: std::io::Error) -> DeliveryError {
    DeliveryError::Io(e.to_string())
}
