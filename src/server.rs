//! # Server
//!
//! Listens on a socket, accepts connections, and dispatches framed requests to
//! registered service implementations.
//!
//! Each accepted connection runs on its own task; within one connection
//! requests are processed strictly one at a time in arrival order. The
//! per-connection loop is
//! `read frame → decode → dispatch → encode response → read frame`, ending
//! when the connection errors or closes.
//!
//! Unknown services, methods, or codec codes become error responses on the
//! same connection rather than crashes; only transport and framing failures
//! close it. A request carrying `oneway` metadata still runs its handler (side
//! effects and error logging are preserved) but no response frame is written.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::codec::{Compressor, CompressorRegistry, PayloadFormat, SerializerRegistry};
use crate::context::{deadline_from_meta, Context, META_ONEWAY, META_TIMEOUT};
use crate::error::{constants, Result, RpcError};
use crate::protocol::message::{Request, Response};
use crate::protocol::{read_frame, write_frame};
use crate::service::ServiceDescriptor;

pub struct Server {
    services: HashMap<String, ServiceDescriptor>,
    serializers: SerializerRegistry,
    compressors: CompressorRegistry,
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

impl Server {
    /// A server with the JSON serializer and identity compressor
    /// pre-registered under their fixed codes.
    pub fn new() -> Self {
        Self {
            services: HashMap::new(),
            serializers: SerializerRegistry::new(),
            compressors: CompressorRegistry::new(),
        }
    }

    /// Register a service. Keyed by service name; a later registration under
    /// the same name replaces the earlier one.
    pub fn register(&mut self, service: ServiceDescriptor) {
        if self.services.contains_key(service.name()) {
            warn!(service = %service.name(), "replacing existing service registration");
        }
        self.services.insert(service.name().to_string(), service);
    }

    pub fn register_serializer(&mut self, format: PayloadFormat) {
        self.serializers.register(format);
    }

    pub fn register_compressor(&mut self, compressor: Arc<dyn Compressor>) {
        self.compressors.register(compressor);
    }

    /// Bind `addr` and serve until the listener fails.
    pub async fn serve(self, addr: &str) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve_on(listener).await
    }

    /// Serve on an already-bound listener. Useful when the caller needs the
    /// ephemeral port before serving starts.
    pub async fn serve_on(self, listener: TcpListener) -> Result<()> {
        info!(addr = %listener.local_addr()?, "rpc server listening");
        let server = Arc::new(self);

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    debug!(peer = %peer, "connection accepted");
                    let server = Arc::clone(&server);
                    tokio::spawn(async move {
                        match server.handle_conn(stream).await {
                            Ok(()) | Err(RpcError::ConnectionClosed) => {
                                debug!(peer = %peer, "connection closed");
                            }
                            Err(e) => {
                                error!(peer = %peer, error = %e, "connection terminated");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "error accepting connection");
                }
            }
        }
    }

    /// Per-connection request loop. Returns when the peer hangs up or a
    /// transport/framing error makes the stream unusable.
    pub(crate) async fn handle_conn<S>(&self, mut stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        loop {
            let frame = read_frame(&mut stream).await?;
            let req = Request::decode(&frame)?;
            let oneway = req
                .meta
                .get(META_ONEWAY)
                .is_some_and(|v| !v.is_empty());

            let mut resp = Response {
                message_id: req.message_id,
                version: req.version,
                compressor: req.compressor,
                serializer: req.serializer,
                ..Response::default()
            };

            match self.dispatch(&req).await {
                Ok(payload) => {
                    resp.body_length = payload.len() as u32;
                    resp.payload = payload;
                }
                Err(e) => {
                    debug!(
                        service = %req.service,
                        method = %req.method,
                        message_id = req.message_id,
                        error = %e,
                        "dispatch failed"
                    );
                    resp.error = e.to_string().into_bytes();
                }
            }
            resp.compute_head_length();

            if oneway {
                // The response was computed for its side effects; nothing is
                // written, and the next frame is read as usual.
                debug!(message_id = req.message_id, "oneway request, response suppressed");
                continue;
            }

            write_frame(&mut stream, &resp.encode()).await?;
        }
    }

    /// Resolve codecs and target, run the handler, and produce the serialized,
    /// compressed response payload. Every error here becomes the response's
    /// error field; none of them closes the connection.
    async fn dispatch(&self, req: &Request) -> Result<Vec<u8>> {
        // Codec resolution is independent of service resolution: an
        // unsupported code is reported even when the service name is unknown.
        let format = self.serializers.lookup(req.serializer)?;
        let compressor = self.compressors.lookup(req.compressor)?;

        let service = self
            .services
            .get(&req.service)
            .ok_or_else(|| RpcError::Server(constants::ERR_SERVICE_NOT_FOUND.to_string()))?;
        let handler = service
            .handler(&req.method)
            .ok_or_else(|| RpcError::Server(constants::ERR_METHOD_NOT_FOUND.to_string()))?;

        let mut ctx = Context::new();
        for (key, value) in &req.meta {
            if key != META_TIMEOUT {
                ctx = ctx.with_value(key.clone(), value.clone());
            }
        }
        if let Some(deadline) = deadline_from_meta(&req.meta)? {
            ctx = ctx.with_deadline(deadline);
        }

        let payload = compressor.decompress(&req.payload)?;

        // The deadline bounds only the handler, not the frame I/O around it.
        let invocation = (**handler)(ctx.clone(), payload, format);
        let result = match ctx.remaining() {
            Some(remaining) => {
                if remaining.is_zero() {
                    return Err(RpcError::Server(
                        constants::ERR_DEADLINE_EXCEEDED.to_string(),
                    ));
                }
                tokio::time::timeout(remaining, invocation)
                    .await
                    .map_err(|_| {
                        RpcError::Server(constants::ERR_DEADLINE_EXCEEDED.to_string())
                    })??
            }
            None => invocation.await?,
        };

        compressor.compress(&result)
    }
}
