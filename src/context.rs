//! # Call Context
//!
//! Per-call metadata threaded through both client and server: cancellation,
//! deadlines, the oneway (fire-and-forget) flag, and ad-hoc string values.
//!
//! On the client a context shapes the outgoing request: a deadline becomes
//! `timeout=<epoch ms>` metadata and the oneway flag becomes `oneway=true`.
//! On the server a context is rebuilt from that metadata and bounds the
//! invoked handler, not the frame I/O around it.
//!
//! Cancellation is cooperative: a cancelled client call stops waiting for its
//! result, but the in-flight network operation is abandoned rather than
//! interrupted. The server may still execute the handler — at-most-once
//! execution is not guaranteed.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio_util::sync::CancellationToken;

use crate::error::{Result, RpcError};

/// Metadata key carrying the deadline in epoch milliseconds
pub const META_TIMEOUT: &str = "timeout";
/// Metadata key marking a fire-and-forget call
pub const META_ONEWAY: &str = "oneway";

#[derive(Debug, Clone, Default)]
pub struct Context {
    cancel: CancellationToken,
    deadline: Option<SystemTime>,
    oneway: bool,
    values: HashMap<String, String>,
}

impl Context {
    /// A context with no deadline, no values, and no cancellation pending.
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive a context whose deadline is `timeout` from now.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(SystemTime::now() + timeout);
        self
    }

    /// Derive a context with an absolute deadline.
    pub fn with_deadline(mut self, deadline: SystemTime) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Mark the call fire-and-forget: the caller will not wait for or receive
    /// a response.
    pub fn oneway(mut self) -> Self {
        self.oneway = true;
        self
    }

    /// Attach an ad-hoc string value, carried as request metadata.
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn is_oneway(&self) -> bool {
        self.oneway
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn values(&self) -> &HashMap<String, String> {
        &self.values
    }

    pub fn deadline(&self) -> Option<SystemTime> {
        self.deadline
    }

    /// The deadline as epoch milliseconds, the wire representation used for
    /// the `timeout` metadata entry.
    pub fn deadline_unix_ms(&self) -> Option<u64> {
        self.deadline.map(|d| {
            d.duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0)
        })
    }

    /// Time remaining until the deadline, zero when already past.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|d| {
            d.duration_since(SystemTime::now())
                .unwrap_or(Duration::ZERO)
        })
    }

    /// Request cancellation. Derived clones observe it too.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fail fast before doing any I/O: cancellation wins over the deadline.
    pub fn check(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(RpcError::Cancelled);
        }
        if self.remaining().is_some_and(|r| r.is_zero()) {
            return Err(RpcError::DeadlineExceeded);
        }
        Ok(())
    }

    /// The error this context would currently report, defaulting to
    /// `Cancelled` when neither signal has fired yet.
    pub fn error(&self) -> RpcError {
        match self.check() {
            Err(e) => e,
            Ok(()) => RpcError::Cancelled,
        }
    }

    /// Resolves when the context is cancelled or its deadline elapses.
    /// Pends forever for a plain context.
    pub async fn done(&self) {
        match self.remaining() {
            Some(remaining) => {
                tokio::select! {
                    _ = self.cancel.cancelled() => {}
                    _ = tokio::time::sleep(remaining) => {}
                }
            }
            None => self.cancel.cancelled().await,
        }
    }
}

/// Parse an epoch-milliseconds deadline out of request metadata. A present but
/// unparseable value is an error, reported back to the caller.
pub fn deadline_from_meta(meta: &HashMap<String, String>) -> Result<Option<SystemTime>> {
    match meta.get(META_TIMEOUT) {
        None => Ok(None),
        Some(raw) => {
            let millis: u64 = raw.parse().map_err(|_| RpcError::InvalidMetadata {
                key: META_TIMEOUT.to_string(),
                value: raw.clone(),
            })?;
            Ok(Some(UNIX_EPOCH + Duration::from_millis(millis)))
        }
    }
}
