//! # Connection Pool
//!
//! Capacity-bounded pool of TCP connections to a single fixed address.
//!
//! A connection is owned exclusively by the pool while idle, checked out for
//! the duration of one request/response exchange, and returned afterward.
//! Idle connections past their idle timeout are closed rather than reused.
//! When every permit is taken, checkout blocks until a connection is returned
//! or the pool's own timeout elapses.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::TcpStream;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, trace};

use crate::error::{Result, RpcError};

/// Pool tuning knobs, see [`crate::config::PoolConfig`] for the serde-facing
/// variant with defaults.
#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// Upper bound on live connections, idle and checked out combined
    pub max_connections: usize,
    /// Idle connections older than this are closed instead of reused
    pub idle_timeout: Duration,
    /// How long checkout may block waiting for a free permit
    pub checkout_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_connections: 100,
            idle_timeout: Duration::from_secs(60),
            checkout_timeout: Duration::from_secs(5),
        }
    }
}

struct IdleConn {
    stream: TcpStream,
    parked_at: Instant,
}

/// A connection checked out of the pool. Holds the capacity permit for as long
/// as it lives; dropping it without [`ConnectionPool::release`] discards the
/// connection and frees the permit.
pub struct PooledConn {
    pub stream: TcpStream,
    _permit: OwnedSemaphorePermit,
}

pub struct ConnectionPool {
    addr: String,
    options: PoolOptions,
    idle: Mutex<VecDeque<IdleConn>>,
    permits: Arc<Semaphore>,
}

impl ConnectionPool {
    pub fn new(addr: impl Into<String>, options: PoolOptions) -> Self {
        let permits = Arc::new(Semaphore::new(options.max_connections));
        Self {
            addr: addr.into(),
            options,
            idle: Mutex::new(VecDeque::new()),
            permits,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Check out a connection, reusing a fresh idle one when available and
    /// dialing otherwise. Blocks up to `checkout_timeout` for a permit when
    /// the pool is exhausted.
    pub async fn acquire(&self) -> Result<PooledConn> {
        let permit = tokio::time::timeout(
            self.options.checkout_timeout,
            Arc::clone(&self.permits).acquire_owned(),
        )
        .await
        .map_err(|_| RpcError::PoolTimeout)?
        .map_err(|_| RpcError::PoolTimeout)?;

        // Drain expired idle entries; they are closed by drop.
        let reusable = {
            let mut idle = self.idle.lock().await;
            loop {
                match idle.pop_front() {
                    Some(conn) if conn.parked_at.elapsed() > self.options.idle_timeout => {
                        trace!(addr = %self.addr, "closing expired idle connection");
                    }
                    other => break other,
                }
            }
        };

        let stream = match reusable {
            Some(conn) => conn.stream,
            None => {
                debug!(addr = %self.addr, "dialing new connection");
                TcpStream::connect(&self.addr).await?
            }
        };

        Ok(PooledConn {
            stream,
            _permit: permit,
        })
    }

    /// Return a healthy connection to the idle list.
    pub async fn release(&self, conn: PooledConn) {
        let mut idle = self.idle.lock().await;
        idle.push_back(IdleConn {
            stream: conn.stream,
            parked_at: Instant::now(),
        });
        // The permit inside `conn` is dropped here, freeing capacity.
    }

    /// Drop a connection that hit a transport or protocol error. The socket is
    /// closed by drop and never returned to the idle list.
    pub fn discard(&self, conn: PooledConn) {
        trace!(addr = %self.addr, "discarding poisoned connection");
        drop(conn);
    }

    /// Number of parked idle connections, for tests and introspection.
    pub async fn idle_count(&self) -> usize {
        self.idle.lock().await.len()
    }
}
