//! # Service Descriptors
//!
//! Static declaration of a service's name and method signatures.
//!
//! Each method is bound at construction time to a strongly-typed handler
//! adapter: the adapter closes over the concrete request/response types once,
//! so dispatch never inspects types at runtime. The server resolves
//! `(service name, method name)` in a plain map and calls the adapter with the
//! decompressed payload and the serialization format negotiated for that
//! message.
//!
//! ```no_run
//! use micro_rpc::{Context, Result, ServiceDescriptor};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct GetByIdReq { id: u64 }
//! #[derive(Serialize, Deserialize)]
//! struct GetByIdResp { id: u64, name: String }
//!
//! let service = ServiceDescriptor::new("user").method(
//!     "GetById",
//!     |_ctx: Context, req: GetByIdReq| async move {
//!         Ok(GetByIdResp { id: req.id, name: "x".into() })
//!     },
//! );
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{de::DeserializeOwned, Serialize};

use crate::codec::PayloadFormat;
use crate::context::Context;
use crate::error::Result;

/// Type-erased method handler: decompressed request payload in, serialized
/// response payload out.
pub(crate) type MethodHandler =
    Arc<dyn Fn(Context, Vec<u8>, PayloadFormat) -> BoxFuture<'static, Result<Vec<u8>>> + Send + Sync>;

/// A named capability exposing one or more typed methods.
///
/// Descriptors are registered with the server once at startup; registering the
/// same service name twice replaces the earlier descriptor (last registration
/// wins).
pub struct ServiceDescriptor {
    name: String,
    methods: HashMap<String, MethodHandler>,
}

impl ServiceDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declare a method and bind its handler.
    ///
    /// The adapter built here decodes the request with the per-message payload
    /// format, awaits the handler, and encodes the result with the same
    /// format. Handler errors propagate out to become the response's error
    /// field.
    pub fn method<Req, Resp, F, Fut>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        F: Fn(Context, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let adapter: MethodHandler = Arc::new(move |ctx, payload, format| {
            let handler = Arc::clone(&handler);
            Box::pin(async move {
                let req: Req = format.decode(&payload)?;
                let resp = (*handler)(ctx, req).await?;
                format.encode(&resp)
            })
        });
        self.methods.insert(name.into(), adapter);
        self
    }

    pub(crate) fn handler(&self, method: &str) -> Option<&MethodHandler> {
        self.methods.get(method)
    }

    /// Declared method names, mainly useful for startup logging.
    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }
}
