//! End-to-end client/server exchanges over real TCP sockets.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

use micro_rpc::{
    Client, Context, PayloadFormat, Result, RpcError, Server, ServiceDescriptor, Zstd,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct GetByIdReq {
    id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct GetByIdResp {
    id: u64,
    name: String,
}

fn user_service(hits: Arc<AtomicUsize>) -> ServiceDescriptor {
    ServiceDescriptor::new("user")
        .method("GetById", {
            let hits = Arc::clone(&hits);
            move |_ctx: Context, req: GetByIdReq| {
                let hits = Arc::clone(&hits);
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    Ok(GetByIdResp {
                        id: req.id,
                        name: "x".into(),
                    })
                }
            }
        })
        .method("AlwaysError", |_ctx: Context, _req: GetByIdReq| async move {
            Err::<GetByIdResp, _>(RpcError::Server("boom".into()))
        })
        .method("Slow", |_ctx: Context, req: GetByIdReq| async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(GetByIdResp {
                id: req.id,
                name: "late".into(),
            })
        })
}

/// Opt-in log output for debugging test failures: `RUST_LOG=debug cargo test`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Spin up a server with the `user` service on an ephemeral port.
async fn start_server(hits: Arc<AtomicUsize>) -> String {
    init_tracing();
    let mut server = Server::new();
    server.register(user_service(hits));
    server.register_serializer(PayloadFormat::Bincode);
    server.register_compressor(Arc::new(Zstd));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(server.serve_on(listener));
    addr
}

#[tokio::test]
async fn get_by_id_roundtrip() -> Result<()> {
    let addr = start_server(Arc::new(AtomicUsize::new(0))).await;
    let client = Client::new(&addr);
    let get_by_id = client
        .service("user")
        .method::<GetByIdReq, GetByIdResp>("GetById");

    let resp = get_by_id.call(&Context::new(), &GetByIdReq { id: 12 }).await?;
    assert_eq!(
        resp,
        GetByIdResp {
            id: 12,
            name: "x".into()
        }
    );
    Ok(())
}

#[tokio::test]
async fn handler_error_propagates_verbatim() {
    let addr = start_server(Arc::new(AtomicUsize::new(0))).await;
    let client = Client::new(&addr);
    let always_error = client
        .service("user")
        .method::<GetByIdReq, GetByIdResp>("AlwaysError");

    match always_error.call(&Context::new(), &GetByIdReq { id: 12 }).await {
        Err(RpcError::Server(msg)) => assert_eq!(msg, "boom"),
        other => panic!("expected server error, got {other:?}"),
    }
}

#[tokio::test]
async fn unknown_service_is_a_server_error() {
    let addr = start_server(Arc::new(AtomicUsize::new(0))).await;
    let client = Client::new(&addr);
    let stub = client
        .service("account")
        .method::<GetByIdReq, GetByIdResp>("GetById");

    match stub.call(&Context::new(), &GetByIdReq { id: 1 }).await {
        Err(RpcError::Server(msg)) => assert!(msg.contains("service not found")),
        other => panic!("expected server error, got {other:?}"),
    }
}

#[tokio::test]
async fn bincode_and_zstd_negotiated_per_message() -> Result<()> {
    let addr = start_server(Arc::new(AtomicUsize::new(0))).await;
    let client = Client::new(&addr)
        .serializer(PayloadFormat::Bincode)
        .compressor(Arc::new(Zstd));
    let get_by_id = client
        .service("user")
        .method::<GetByIdReq, GetByIdResp>("GetById");

    let resp = get_by_id.call(&Context::new(), &GetByIdReq { id: 7 }).await?;
    assert_eq!(resp.id, 7);
    Ok(())
}

#[tokio::test]
async fn sequential_calls_reuse_the_pool() -> Result<()> {
    let hits = Arc::new(AtomicUsize::new(0));
    let addr = start_server(Arc::clone(&hits)).await;
    let client = Client::new(&addr);
    let get_by_id = client
        .service("user")
        .method::<GetByIdReq, GetByIdResp>("GetById");

    for id in 0..10 {
        let resp = get_by_id.call(&Context::new(), &GetByIdReq { id }).await?;
        assert_eq!(resp.id, id);
    }
    assert_eq!(hits.load(Ordering::SeqCst), 10);
    Ok(())
}

#[tokio::test]
async fn concurrent_clients_are_served_in_parallel() {
    let hits = Arc::new(AtomicUsize::new(0));
    let addr = start_server(Arc::clone(&hits)).await;

    let mut tasks = tokio::task::JoinSet::new();
    for id in 0..16u64 {
        let addr = addr.clone();
        tasks.spawn(async move {
            let client = Client::new(&addr);
            let get_by_id = client
                .service("user")
                .method::<GetByIdReq, GetByIdResp>("GetById");
            get_by_id.call(&Context::new(), &GetByIdReq { id }).await
        });
    }
    while let Some(res) = tasks.join_next().await {
        res.unwrap().unwrap();
    }
    assert_eq!(hits.load(Ordering::SeqCst), 16);
}

#[tokio::test]
async fn oneway_runs_handler_without_response() -> Result<()> {
    let hits = Arc::new(AtomicUsize::new(0));
    let addr = start_server(Arc::clone(&hits)).await;
    let client = Client::new(&addr);
    let get_by_id = client
        .service("user")
        .method::<GetByIdReq, GetByIdResp>("GetById");

    get_by_id
        .call_oneway(&Context::new(), &GetByIdReq { id: 1 })
        .await?;

    // A two-way call on the same pooled connection must still line up with
    // its own response; no stray bytes may be left behind by the oneway call.
    let resp = get_by_id.call(&Context::new(), &GetByIdReq { id: 2 }).await?;
    assert_eq!(resp.id, 2);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn client_deadline_cancels_slow_call() {
    let addr = start_server(Arc::new(AtomicUsize::new(0))).await;
    let client = Client::new(&addr);
    let slow = client
        .service("user")
        .method::<GetByIdReq, GetByIdResp>("Slow");

    // The client's own deadline and the server's timeout response race on the
    // same absolute instant; either way the caller sees a deadline overrun.
    let ctx = Context::new().with_timeout(Duration::from_millis(50));
    match slow.call(&ctx, &GetByIdReq { id: 1 }).await {
        Err(RpcError::DeadlineExceeded) => {}
        Err(RpcError::Server(msg)) => assert!(msg.contains("deadline")),
        other => panic!("expected a deadline error, got {other:?}"),
    }
}

#[tokio::test]
async fn server_rejects_overrun_deadline_as_timeout() {
    let addr = start_server(Arc::new(AtomicUsize::new(0))).await;
    let client = Client::new(&addr);
    let slow = client
        .service("user")
        .method::<GetByIdReq, GetByIdResp>("Slow");

    // Give the client side plenty of slack while the propagated deadline still
    // trips on the server. The server answers with a context-timeout error,
    // not an application error.
    let deadline = std::time::SystemTime::now() + Duration::from_millis(100);
    let ctx = Context::new().with_deadline(deadline);

    // Race: either the client's own deadline fires first or the server's
    // timeout response arrives. Both must identify a deadline overrun.
    match slow.call(&ctx, &GetByIdReq { id: 1 }).await {
        Err(RpcError::DeadlineExceeded) => {}
        Err(RpcError::Server(msg)) => assert!(msg.contains("deadline")),
        other => panic!("expected a deadline error, got {other:?}"),
    }
}

#[tokio::test]
async fn cancellation_returns_immediately() {
    let addr = start_server(Arc::new(AtomicUsize::new(0))).await;
    let client = Client::new(&addr);
    let slow = client
        .service("user")
        .method::<GetByIdReq, GetByIdResp>("Slow");

    let ctx = Context::new();
    let cancel_handle = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel_handle.cancel();
    });

    let started = std::time::Instant::now();
    match slow.call(&ctx, &GetByIdReq { id: 1 }).await {
        Err(RpcError::Cancelled) => {}
        other => panic!("expected Cancelled, got {other:?}"),
    }
    assert!(
        started.elapsed() < Duration::from_millis(400),
        "cancellation must not wait for the slow handler"
    );
}

#[tokio::test]
async fn pre_cancelled_context_skips_io() {
    // No server at this address; a pre-cancelled call must fail before I/O.
    let client = Client::new("127.0.0.1:1");
    let stub = client
        .service("user")
        .method::<GetByIdReq, GetByIdResp>("GetById");

    let ctx = Context::new();
    ctx.cancel();
    match stub.call(&ctx, &GetByIdReq { id: 1 }).await {
        Err(RpcError::Cancelled) => {}
        other => panic!("expected Cancelled, got {other:?}"),
    }
}

#[tokio::test]
async fn deadline_is_propagated_as_epoch_millis() -> Result<()> {
    // A handler that reports the timeout metadata it received.
    #[derive(Debug, Serialize, Deserialize)]
    struct MetaResp {
        timeout: Option<String>,
    }

    // The server consumes `timeout` metadata into the context deadline, so
    // the handler observes it as epoch milliseconds.
    let mut server = Server::new();
    server.register(ServiceDescriptor::new("meta").method(
        "Timeout",
        |ctx: Context, _req: GetByIdReq| async move {
            Ok(MetaResp {
                timeout: ctx.deadline_unix_ms().map(|ms| ms.to_string()),
            })
        },
    ));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(server.serve_on(listener));

    let client = Client::new(&addr);
    let stub = client.service("meta").method::<GetByIdReq, MetaResp>("Timeout");

    let deadline = std::time::SystemTime::now() + Duration::from_secs(5);
    let expected_ms = deadline
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis()
        .to_string();
    let ctx = Context::new().with_deadline(deadline);

    let resp = stub.call(&ctx, &GetByIdReq { id: 1 }).await?;
    assert_eq!(resp.timeout, Some(expected_ms));
    Ok(())
}

#[tokio::test]
async fn response_echoes_request_message_id() -> Result<()> {
    use micro_rpc::protocol::Request;

    let addr = start_server(Arc::new(AtomicUsize::new(0))).await;
    let client = Client::new(&addr);
    let get_by_id = client
        .service("user")
        .method::<GetByIdReq, GetByIdResp>("GetById");

    // Drive a couple of calls so the shared counter advances.
    get_by_id.call(&Context::new(), &GetByIdReq { id: 1 }).await?;
    get_by_id.call(&Context::new(), &GetByIdReq { id: 2 }).await?;

    // A hand-built request with a known id still gets it echoed back.
    let payload = PayloadFormat::Json.encode(&GetByIdReq { id: 3 })?;
    let mut req = Request {
        message_id: 12345,
        service: "user".into(),
        method: "GetById".into(),
        payload,
        ..Request::default()
    };
    req.body_length = req.payload.len() as u32;
    req.compute_head_length();

    let resp = client.invoke(&Context::new(), req).await?;
    assert_eq!(resp.message_id, 12345);
    assert!(!resp.is_error());
    Ok(())
}

#[tokio::test]
async fn connection_refused_surfaces_as_io_error() {
    let client = Client::new("127.0.0.1:1");
    let stub = client
        .service("user")
        .method::<GetByIdReq, GetByIdResp>("GetById");

    match stub.call(&Context::new(), &GetByIdReq { id: 1 }).await {
        Err(RpcError::Io(_)) => {}
        other => panic!("expected Io error, got {other:?}"),
    }
}
