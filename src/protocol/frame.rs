//! # Framed Transport
//!
//! Reads one complete length-prefixed message off a streaming connection.
//!
//! A frame starts with an 8-byte prefix (head-length u32 + body-length u32,
//! big-endian) followed by exactly `head + body - 8` more bytes. The underlying
//! stream may return partial reads; both phases loop until the target length is
//! reached or the connection errors/closes.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{constants, Result, RpcError};
use crate::protocol::message::{FIXED_HEAD_LEN, LEN_PREFIX};

/// Max allowed frame size (16 MB). Frames declaring more are rejected before
/// any allocation.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Read one complete frame, returning the full message bytes including the
/// length prefix.
///
/// A clean EOF before any prefix byte is `ConnectionClosed` (the peer hung up
/// between requests); EOF after a partial prefix is a malformed-message error.
pub async fn read_frame<R>(conn: &mut R) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; LEN_PREFIX];
    let mut filled = 0;
    while filled < LEN_PREFIX {
        let n = conn.read(&mut prefix[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Err(RpcError::ConnectionClosed);
            }
            return Err(RpcError::MalformedMessage(
                constants::ERR_SHORT_PREFIX.to_string(),
            ));
        }
        filled += n;
    }

    let head_length = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]);
    let body_length = u32::from_be_bytes([prefix[4], prefix[5], prefix[6], prefix[7]]);
    let total = head_length as u64 + body_length as u64;

    if total < FIXED_HEAD_LEN as u64 {
        return Err(RpcError::MalformedMessage(
            constants::ERR_FRAME_UNDERSIZED.to_string(),
        ));
    }
    if total > MAX_FRAME_SIZE as u64 {
        return Err(RpcError::FrameTooLarge(total as usize));
    }

    let mut frame = vec![0u8; total as usize];
    frame[..LEN_PREFIX].copy_from_slice(&prefix);
    conn.read_exact(&mut frame[LEN_PREFIX..]).await?;
    Ok(frame)
}

/// Write one fully encoded frame. `write_all` loops over partial writes, so a
/// short write surfaces as an I/O error rather than a silent truncation.
pub async fn write_frame<W>(conn: &mut W, frame: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    conn.write_all(frame).await?;
    conn.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::protocol::message::Request;
    use tokio::io::AsyncWriteExt;

    fn encoded_request() -> Vec<u8> {
        let mut req = Request {
            message_id: 1,
            service: "user".into(),
            method: "GetById".into(),
            payload: vec![1, 2, 3],
            ..Request::default()
        };
        req.body_length = 3;
        req.compute_head_length();
        req.encode()
    }

    #[tokio::test]
    async fn reads_complete_frame() {
        let encoded = encoded_request();
        let (mut client, mut server) = tokio::io::duplex(1024);
        client.write_all(&encoded).await.unwrap();
        drop(client);

        let frame = read_frame(&mut server).await.unwrap();
        assert_eq!(frame, encoded);
    }

    #[tokio::test]
    async fn tolerates_partial_reads() {
        let encoded = encoded_request();
        // A 3-byte pipe forces every read to come back short.
        let (mut client, mut server) = tokio::io::duplex(3);

        let writer = {
            let encoded = encoded.clone();
            tokio::spawn(async move {
                for chunk in encoded.chunks(3) {
                    client.write_all(chunk).await.unwrap();
                }
            })
        };

        let frame = read_frame(&mut server).await.unwrap();
        writer.await.unwrap();
        assert_eq!(frame, encoded);
    }

    #[tokio::test]
    async fn clean_eof_is_connection_closed() {
        let (client, mut server) = tokio::io::duplex(8);
        drop(client);
        match read_frame(&mut server).await {
            Err(RpcError::ConnectionClosed) => {}
            other => panic!("expected ConnectionClosed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn truncated_prefix_is_malformed() {
        let (mut client, mut server) = tokio::io::duplex(8);
        client.write_all(&[0, 0, 0]).await.unwrap();
        drop(client);
        match read_frame(&mut server).await {
            Err(RpcError::MalformedMessage(_)) => {}
            other => panic!("expected MalformedMessage, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn rejects_undersized_declared_frame() {
        let (mut client, mut server) = tokio::io::duplex(16);
        // head=4, body=0: below the 15-byte fixed header
        client.write_all(&[0, 0, 0, 4, 0, 0, 0, 0]).await.unwrap();
        drop(client);
        assert!(matches!(
            read_frame(&mut server).await,
            Err(RpcError::MalformedMessage(_))
        ));
    }

    #[tokio::test]
    async fn rejects_oversized_declared_frame() {
        let (mut client, mut server) = tokio::io::duplex(16);
        client
            .write_all(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF])
            .await
            .unwrap();
        drop(client);
        assert!(matches!(
            read_frame(&mut server).await,
            Err(RpcError::FrameTooLarge(_))
        ));
    }

    #[tokio::test]
    async fn write_then_read_roundtrip() {
        let encoded = encoded_request();
        let (mut client, mut server) = tokio::io::duplex(1024);
        write_frame(&mut client, &encoded).await.unwrap();
        let frame = read_frame(&mut server).await.unwrap();
        assert_eq!(frame, encoded);
    }
}
