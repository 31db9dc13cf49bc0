//! # micro-rpc
//!
//! Minimal synchronous RPC framework: a binary wire protocol, a client that
//! binds typed method stubs against remote services, and a server that
//! dispatches framed requests to registered implementations.
//!
//! ## Features
//! - **Binary framing**: length-prefixed request/response frames over TCP
//! - **Pluggable codecs**: serialization and compression negotiated per
//!   message via one-byte codes
//! - **Connection pooling**: bounded pool with idle expiry and checkout timeout
//! - **Deadlines and oneway calls**: carried through message metadata
//! - **Graceful degradation**: unknown services, methods, and codecs become
//!   error responses, not crashes
//!
//! ## Example
//! ```no_run
//! use micro_rpc::{Client, Context, Result, Server, ServiceDescriptor};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct GetByIdReq { id: u64 }
//! #[derive(Serialize, Deserialize)]
//! struct GetByIdResp { id: u64, name: String }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let mut server = Server::new();
//!     server.register(ServiceDescriptor::new("user").method(
//!         "GetById",
//!         |_ctx: Context, req: GetByIdReq| async move {
//!             Ok(GetByIdResp { id: req.id, name: "x".into() })
//!         },
//!     ));
//!     tokio::spawn(server.serve("0.0.0.0:8081"));
//!
//!     let client = Client::new("127.0.0.1:8081");
//!     let get_by_id = client
//!         .service("user")
//!         .method::<GetByIdReq, GetByIdResp>("GetById");
//!     let resp = get_by_id.call(&Context::new(), &GetByIdReq { id: 12 }).await?;
//!     assert_eq!(resp.name, "x");
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod context;
pub mod error;
pub mod protocol;
pub mod server;
pub mod service;

pub use client::{Client, MethodStub, ServiceBinder};
pub use codec::{Compressor, Identity, Lz4, PayloadFormat, Zstd};
pub use config::RpcConfig;
pub use context::Context;
pub use error::{Result, RpcError};
pub use protocol::{Request, Response};
pub use server::Server;
pub use service::ServiceDescriptor;
