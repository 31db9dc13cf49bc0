//! # Client
//!
//! RPC client over a pooled set of TCP connections to a single fixed address.
//!
//! Two layers are exposed:
//! - [`Client::invoke`]: the generic operation taking a fully built
//!   [`Request`] and returning the decoded [`Response`]
//! - [`MethodStub`]: a typed callable bound once from a
//!   (service, method, request type, response type) descriptor that encodes
//!   arguments, sends, waits, and decodes results
//!
//! Every invoke runs on its own spawned task and races the context's
//! cancellation signal. When the context fires first the call returns a
//! cancellation error immediately; the in-flight network operation keeps
//! running in the background and its outcome is discarded. A cancelled call
//! therefore does not guarantee the server never executed it.

pub mod pool;

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::codec::{Compressor, Identity, Lz4, PayloadFormat, Zstd};
use crate::config::ClientConfig;
use crate::context::{Context, META_ONEWAY, META_TIMEOUT};
use crate::error::{Result, RpcError};
use crate::protocol::message::{Request, Response, PROTOCOL_VERSION};
use crate::protocol::{read_frame, write_frame};

pub use pool::{ConnectionPool, PoolOptions, PooledConn};

/// RPC client. Cheap to clone; clones share the pool and the message-id
/// counter.
#[derive(Clone)]
pub struct Client {
    pool: Arc<ConnectionPool>,
    serializer: PayloadFormat,
    compressor: Arc<dyn Compressor>,
    // Instance-scoped so independent clients in one process do not
    // interleave ids.
    next_message_id: Arc<AtomicU32>,
}

impl Client {
    /// A client for `addr` with the default JSON serializer, identity
    /// compressor, and default pool sizing. No connection is dialed until the
    /// first call.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            pool: Arc::new(ConnectionPool::new(addr, PoolOptions::default())),
            serializer: PayloadFormat::default(),
            compressor: Arc::new(Identity),
            next_message_id: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Build a client from configuration. A serializer or compressor code with
    /// no known implementation is rejected rather than silently replaced; a
    /// typo in a config file must not change the wire format.
    pub fn with_config(addr: impl Into<String>, config: &ClientConfig) -> Result<Self> {
        let serializer = PayloadFormat::from_code(config.serializer_code).ok_or_else(|| {
            RpcError::ConfigError(format!(
                "unknown serializer code {}",
                config.serializer_code
            ))
        })?;
        let compressor: Arc<dyn Compressor> = match config.compressor_code {
            0 => Arc::new(Identity),
            1 => Arc::new(Zstd),
            2 => Arc::new(Lz4),
            code => {
                return Err(RpcError::ConfigError(format!(
                    "unknown compressor code {code}"
                )))
            }
        };
        Ok(Self {
            pool: Arc::new(ConnectionPool::new(addr, config.pool.to_options())),
            serializer,
            compressor,
            next_message_id: Arc::new(AtomicU32::new(0)),
        })
    }

    /// Use a different payload format for calls made through this client.
    pub fn serializer(mut self, format: PayloadFormat) -> Self {
        self.serializer = format;
        self
    }

    /// Use a compressor for calls made through this client. The server must
    /// have the same code registered.
    pub fn compressor(mut self, compressor: Arc<dyn Compressor>) -> Self {
        self.compressor = compressor;
        self
    }

    /// Begin binding typed stubs against a named remote service.
    pub fn service(&self, name: impl Into<String>) -> ServiceBinder {
        ServiceBinder {
            client: self.clone(),
            service: Arc::from(name.into()),
        }
    }

    fn next_id(&self) -> u32 {
        self.next_message_id.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    /// Send one encoded request and wait for its framed response.
    ///
    /// Checks the context before any I/O, then races the exchange against the
    /// context. Cancellation abandons the exchange without interrupting the
    /// socket operation underneath it.
    pub async fn invoke(&self, ctx: &Context, req: Request) -> Result<Response> {
        ctx.check()?;

        let pool = Arc::clone(&self.pool);
        let exchange = tokio::spawn(async move { Self::do_invoke(&pool, req).await });

        tokio::select! {
            _ = ctx.done() => Err(ctx.error()),
            joined = exchange => match joined {
                Ok(result) => result,
                Err(e) => Err(RpcError::Io(std::io::Error::other(e))),
            },
        }
    }

    /// Send one encoded request without waiting for a response. The server
    /// suppresses the response frame for oneway metadata, so there is nothing
    /// to read; the connection is immediately reusable.
    pub async fn send(&self, ctx: &Context, req: Request) -> Result<()> {
        ctx.check()?;

        let pool = Arc::clone(&self.pool);
        let exchange = tokio::spawn(async move { Self::do_send(&pool, req).await });

        tokio::select! {
            _ = ctx.done() => Err(ctx.error()),
            joined = exchange => match joined {
                Ok(result) => result,
                Err(e) => Err(RpcError::Io(std::io::Error::other(e))),
            },
        }
    }

    async fn do_send(pool: &ConnectionPool, req: Request) -> Result<()> {
        let mut conn = pool.acquire().await?;
        let frame = req.encode();
        match write_frame(&mut conn.stream, &frame).await {
            Ok(()) => {
                pool.release(conn).await;
                Ok(())
            }
            Err(e) => {
                pool.discard(conn);
                Err(e)
            }
        }
    }

    async fn do_invoke(pool: &ConnectionPool, req: Request) -> Result<Response> {
        let mut conn = pool.acquire().await?;
        let frame = req.encode();

        let exchanged: Result<Response> = async {
            write_frame(&mut conn.stream, &frame).await?;
            let resp_frame = read_frame(&mut conn.stream).await?;
            Response::decode(&resp_frame)
        }
        .await;

        match exchanged {
            Ok(resp) => {
                pool.release(conn).await;
                Ok(resp)
            }
            Err(e) => {
                // Transport and protocol failures leave the stream in an
                // unknown state; never pool it again.
                pool.discard(conn);
                Err(e)
            }
        }
    }

    fn build_request(
        &self,
        ctx: &Context,
        service: &str,
        method: &str,
        payload: Vec<u8>,
    ) -> Request {
        let mut req = Request {
            body_length: payload.len() as u32,
            message_id: self.next_id(),
            version: PROTOCOL_VERSION,
            compressor: self.compressor.code(),
            serializer: self.serializer.code(),
            service: service.to_string(),
            method: method.to_string(),
            payload,
            ..Request::default()
        };
        for (key, value) in ctx.values() {
            req.meta.insert(key.clone(), value.clone());
        }
        if ctx.is_oneway() {
            req.meta.insert(META_ONEWAY.to_string(), "true".to_string());
        }
        if let Some(ms) = ctx.deadline_unix_ms() {
            req.meta.insert(META_TIMEOUT.to_string(), ms.to_string());
        }
        req.compute_head_length();
        req
    }
}

/// Binds typed method stubs against one remote service.
pub struct ServiceBinder {
    client: Client,
    service: Arc<str>,
}

impl ServiceBinder {
    /// Produce a live stub for one method. The stub is bound once and can be
    /// called any number of times.
    pub fn method<Req, Resp>(&self, name: impl Into<String>) -> MethodStub<Req, Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        MethodStub {
            client: self.client.clone(),
            service: Arc::clone(&self.service),
            method: name.into(),
            _types: PhantomData,
        }
    }
}

/// A locally callable function value performing a full
/// encode-send-receive-decode round trip against one remote method.
pub struct MethodStub<Req, Resp> {
    client: Client,
    service: Arc<str>,
    method: String,
    _types: PhantomData<fn(Req) -> Resp>,
}

impl<Req, Resp> Clone for MethodStub<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            service: Arc::clone(&self.service),
            method: self.method.clone(),
            _types: PhantomData,
        }
    }
}

impl<Req, Resp> MethodStub<Req, Resp>
where
    Req: Serialize,
    Resp: DeserializeOwned,
{
    /// Invoke the remote method and wait for its result.
    ///
    /// Serialization or compression failures short-circuit before any network
    /// I/O. A non-empty response error field is surfaced verbatim as
    /// [`RpcError::Server`]. Fire-and-forget callers should use
    /// [`MethodStub::call_oneway`] instead; a oneway context passed here would
    /// wait for a response the server never writes.
    pub async fn call(&self, ctx: &Context, arg: &Req) -> Result<Resp> {
        let req = self.prepare(ctx, arg)?;
        debug!(
            service = %self.service,
            method = %self.method,
            message_id = req.message_id,
            "invoking remote method"
        );

        let resp = self.client.invoke(ctx, req).await?;
        if resp.is_error() {
            return Err(RpcError::Server(
                String::from_utf8_lossy(&resp.error).into_owned(),
            ));
        }

        let decompressed = self.client.compressor.decompress(&resp.payload)?;
        self.client.serializer.decode(&decompressed)
    }

    /// Invoke the remote method without waiting for a response.
    ///
    /// The request carries `oneway=true` metadata whether or not the context
    /// is already flagged; the server computes the result for its side effects
    /// but writes nothing back.
    pub async fn call_oneway(&self, ctx: &Context, arg: &Req) -> Result<()> {
        let ctx = if ctx.is_oneway() {
            ctx.clone()
        } else {
            ctx.clone().oneway()
        };
        let req = self.prepare(&ctx, arg)?;
        debug!(
            service = %self.service,
            method = %self.method,
            message_id = req.message_id,
            "invoking remote method (oneway)"
        );
        self.client.send(&ctx, req).await
    }

    fn prepare(&self, ctx: &Context, arg: &Req) -> Result<Request> {
        let encoded = self.client.serializer.encode(arg)?;
        let compressed = self.client.compressor.compress(&encoded)?;
        Ok(self
            .client
            .build_request(ctx, &self.service, &self.method, compressed))
    }
}
