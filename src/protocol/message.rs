//! # Wire Messages
//!
//! Binary encoding of request and response frames. This is the one layout both
//! client and server must agree on bit-exactly.
//!
//! ## Layout (big-endian)
//! ```text
//! [0:4)   head-length (u32)
//! [4:8)   body-length (u32)
//! [8:12)  message-id (u32)
//! [12]    version        [13] compressor-code   [14] serializer-code
//! then (request only): service-name, 0x0A, method-name, 0x0A,
//!   repeated: key, 0x0D, value, 0x0A   (one pair per metadata entry)
//! then (response only): error bytes, length = head-length - 15
//! then: payload bytes, length = body-length
//! ```
//!
//! Service/method names and metadata keys/values must not contain the
//! terminator bytes `0x0A`/`0x0D`. That is a caller-side constraint and is not
//! checked defensively on encode.

use bytes::{Buf, BufMut, BytesMut};
use std::collections::HashMap;

use crate::error::{Result, RpcError};

/// Segment terminator within the request head
const SPLITTER: u8 = b'\n';
/// Separator between a metadata key and its value
const PAIR_SPLITTER: u8 = b'\r';

/// Fixed bytes before the variable-length head section:
/// head-length + body-length + message-id + version + compressor + serializer
pub const FIXED_HEAD_LEN: u32 = 15;

/// Length of the frame prefix used by the transport (head-length + body-length)
pub const LEN_PREFIX: usize = 8;

/// Current wire protocol version. Unknown versions are not rejected; the byte
/// is a forward-compatibility placeholder.
pub const PROTOCOL_VERSION: u8 = 0;

/// One RPC request frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    pub head_length: u32,
    pub body_length: u32,
    pub message_id: u32,

    pub version: u8,
    pub compressor: u8,
    pub serializer: u8,

    pub service: String,
    pub method: String,

    pub meta: HashMap<String, String>,

    pub payload: Vec<u8>,
}

impl Request {
    /// Recompute `head_length` from the current service, method, and metadata.
    /// Must be called after mutating any of those fields and before `encode`.
    pub fn compute_head_length(&mut self) {
        let mut head = FIXED_HEAD_LEN as usize;
        head += self.service.len() + 1;
        head += self.method.len() + 1;
        for (key, value) in &self.meta {
            head += key.len() + 1 + value.len() + 1;
        }
        self.head_length = head as u32;
    }

    /// Encode into a single frame of exactly `head_length + body_length` bytes.
    pub fn encode(&self) -> Vec<u8> {
        let total = (self.head_length + self.body_length) as usize;
        let mut buf = BytesMut::with_capacity(total);

        buf.put_u32(self.head_length);
        buf.put_u32(self.body_length);
        buf.put_u32(self.message_id);
        buf.put_u8(self.version);
        buf.put_u8(self.compressor);
        buf.put_u8(self.serializer);

        buf.put_slice(self.service.as_bytes());
        buf.put_u8(SPLITTER);
        buf.put_slice(self.method.as_bytes());
        buf.put_u8(SPLITTER);

        for (key, value) in &self.meta {
            buf.put_slice(key.as_bytes());
            buf.put_u8(PAIR_SPLITTER);
            buf.put_slice(value.as_bytes());
            buf.put_u8(SPLITTER);
        }

        buf.put_slice(&self.payload);
        buf.to_vec()
    }

    /// Decode a request from a complete frame.
    pub fn decode(data: &[u8]) -> Result<Request> {
        let (head_length, body_length, message_id, version, compressor, serializer) =
            decode_fixed_head(data)?;
        check_lengths(data, head_length, body_length)?;

        let mut req = Request {
            head_length,
            body_length,
            message_id,
            version,
            compressor,
            serializer,
            ..Request::default()
        };

        // Variable head section: service \n method \n (key \r value \n)*
        let mut head = &data[FIXED_HEAD_LEN as usize..head_length as usize];
        req.service = take_segment(&mut head, "service name")?;
        req.method = take_segment(&mut head, "method name")?;

        while !head.is_empty() {
            let pair = take_segment_bytes(&mut head, "metadata pair")?;
            let sep = pair
                .iter()
                .position(|&b| b == PAIR_SPLITTER)
                .ok_or_else(|| {
                    RpcError::MalformedMessage("metadata pair missing key separator".into())
                })?;
            let key = String::from_utf8_lossy(&pair[..sep]).into_owned();
            let value = String::from_utf8_lossy(&pair[sep + 1..]).into_owned();
            req.meta.insert(key, value);
        }

        req.payload = data[head_length as usize..].to_vec();
        Ok(req)
    }
}

/// One RPC response frame. The error field is empty on success; when it is
/// non-empty the payload is meaningless.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    pub head_length: u32,
    pub body_length: u32,
    pub message_id: u32,

    pub version: u8,
    pub compressor: u8,
    pub serializer: u8,

    pub error: Vec<u8>,
    pub payload: Vec<u8>,
}

impl Response {
    /// Recompute `head_length` from the current error field.
    pub fn compute_head_length(&mut self) {
        self.head_length = FIXED_HEAD_LEN + self.error.len() as u32;
    }

    pub fn is_error(&self) -> bool {
        !self.error.is_empty()
    }

    pub fn encode(&self) -> Vec<u8> {
        let total = (self.head_length + self.body_length) as usize;
        let mut buf = BytesMut::with_capacity(total);

        buf.put_u32(self.head_length);
        buf.put_u32(self.body_length);
        buf.put_u32(self.message_id);
        buf.put_u8(self.version);
        buf.put_u8(self.compressor);
        buf.put_u8(self.serializer);

        buf.put_slice(&self.error);
        buf.put_slice(&self.payload);
        buf.to_vec()
    }

    pub fn decode(data: &[u8]) -> Result<Response> {
        let (head_length, body_length, message_id, version, compressor, serializer) =
            decode_fixed_head(data)?;
        check_lengths(data, head_length, body_length)?;

        Ok(Response {
            head_length,
            body_length,
            message_id,
            version,
            compressor,
            serializer,
            error: data[FIXED_HEAD_LEN as usize..head_length as usize].to_vec(),
            payload: data[head_length as usize..].to_vec(),
        })
    }
}

fn decode_fixed_head(data: &[u8]) -> Result<(u32, u32, u32, u8, u8, u8)> {
    if data.len() < FIXED_HEAD_LEN as usize {
        return Err(RpcError::MalformedMessage(format!(
            "frame of {} bytes is shorter than the {FIXED_HEAD_LEN}-byte fixed header",
            data.len()
        )));
    }
    let mut cur = data;
    Ok((
        cur.get_u32(),
        cur.get_u32(),
        cur.get_u32(),
        cur.get_u8(),
        cur.get_u8(),
        cur.get_u8(),
    ))
}

fn check_lengths(data: &[u8], head_length: u32, body_length: u32) -> Result<()> {
    if (head_length as usize) < FIXED_HEAD_LEN as usize {
        return Err(RpcError::MalformedMessage(format!(
            "declared head length {head_length} below fixed minimum"
        )));
    }
    let total = head_length as u64 + body_length as u64;
    if total != data.len() as u64 {
        return Err(RpcError::MalformedMessage(format!(
            "declared lengths {head_length}+{body_length} do not match frame of {} bytes",
            data.len()
        )));
    }
    Ok(())
}

/// Consume bytes up to the next splitter, returning the segment and advancing
/// past the terminator.
fn take_segment_bytes<'a>(head: &mut &'a [u8], what: &str) -> Result<&'a [u8]> {
    let index = head.iter().position(|&b| b == SPLITTER).ok_or_else(|| {
        RpcError::MalformedMessage(format!("{what} missing terminator"))
    })?;
    let segment = &head[..index];
    *head = &head[index + 1..];
    Ok(segment)
}

fn take_segment(head: &mut &[u8], what: &str) -> Result<String> {
    let segment = take_segment_bytes(head, what)?;
    Ok(String::from_utf8_lossy(segment).into_owned())
}
