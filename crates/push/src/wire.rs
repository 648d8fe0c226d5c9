//! Push frame format.
//!
//! ```text
//! PUSH (Server -> Device):  [4 bytes BE: payload_len][payload_len bytes: payload]
//! ACK  (Device -> Server):  [1 byte: any value] (optional)
//! ```
//!
//! The payload is the URL list joined with `\n`, UTF-8 encoded.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::PushError;

/// Length of the frame prefix in bytes.
pub const PREFIX_LEN: usize = 4;

/// Builds the complete frame (prefix + payload) so it can go out in one write.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, PushError> {
    let len = u32::try_from(payload.len()).map_err(|_| {
        PushError::Protocol(format!(
            "payload too long: {} bytes (max {})",
            payload.len(),
            u32::MAX
        ))
    })?;

    let mut frame = Vec::with_capacity(PREFIX_LEN + payload.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Writes one frame and flushes the stream.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> Result<(), PushError> {
    let frame = encode_frame(payload)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one frame, refusing payloads larger than `max_len`.
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_len: usize,
) -> Result<Vec<u8>, PushError> {
    let len = reader.read_u32().await? as usize;
    if len > max_len {
        return Err(PushError::Protocol(format!(
            "frame too long: {len} bytes (max {max_len})"
        )));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}
