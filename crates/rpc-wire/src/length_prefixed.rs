//! Length-prefixed framing: `uint64_be length` followed by `length` UTF-8
//! bytes of a JSON document (object or array). A length of zero is illegal;
//! a length greater than the configured bound aborts the connection.

use crate::error::WireError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Default frame size bound (4 MiB), matching the core spec.
pub const DEFAULT_MAX_FRAME_BYTES: u64 = 4 * 1024 * 1024;

/// Encodes a single frame: 8-byte big-endian length prefix plus `payload`.
///
/// `payload` must be non-empty; the spec treats a zero-length frame as
/// illegal rather than as a valid empty message.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, WireError> {
    if payload.is_empty() {
        return Err(WireError::ZeroLengthFrame);
    }
    let mut out = Vec::with_capacity(8 + payload.len());
    out.extend_from_slice(&(payload.len() as u64).to_be_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

/// Reads one length-prefixed frame from `reader`, enforcing `max_frame_bytes`.
///
/// Returns [`WireError::TruncatedFrame`] if the peer closes the connection
/// before the declared length is fully read.
pub async fn read_frame<R>(reader: &mut R, max_frame_bytes: u64) -> Result<Vec<u8>, WireError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 8];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(WireError::TruncatedFrame);
        }
        Err(e) => return Err(WireError::Io(e)),
    }
    let len = u64::from_be_bytes(len_buf);
    if len == 0 {
        return Err(WireError::ZeroLengthFrame);
    }
    if len > max_frame_bytes {
        return Err(WireError::FrameTooLarge {
            max: max_frame_bytes,
            got: len,
        });
    }
    let mut payload = vec![0u8; len as usize];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => WireError::TruncatedFrame,
            _ => WireError::Io(e),
        })?;
    Ok(payload)
}

/// Writes one length-prefixed frame to `writer`.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    let framed = encode_frame(payload)?;
    writer.write_all(&framed).await?;
    writer.flush().await?;
    Ok(())
}
