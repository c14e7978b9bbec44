//! Flag store client.
//!
//! Answers "is this key flagged?" against a Redis-compatible store, within a
//! strict deadline. The store's write path belongs to an external detector;
//! this client only issues `EXISTS` and, when TTL checking is enabled,
//! `TTL` (pipelined in the same write).
//!
//! # Outcomes
//!
//! [`FlagStore::check`] returns a [`FlagStatus`] so callers can map lookup
//! failures explicitly. The three failure kinds stay distinguishable for
//! logging:
//! - `lookup-connect-failure`: the store could not be reached
//! - `lookup-protocol-error`: malformed reply, server error or broken stream
//! - `lookup-timeout`: the deadline elapsed
//!
//! # Connection reuse
//!
//! Up to [`LookupConfig::max_idle_connections`] connections are kept after a
//! clean exchange. A connection that saw any error, or whose lookup was
//! cancelled, is dropped.
//!
//! The store may close idle connections on its own (idle eviction, restart).
//! Such connections are discarded when taken from the pool, and a pooled
//! connection that breaks before the first reply byte is replaced by one
//! fresh dial within the same deadline. Lookups are otherwise never retried.

use std::io::ErrorKind;

use bytes::BytesMut;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{RerouteError, Result};
use crate::resp;
use crate::types::LookupConfig;

type Connection = BufStream<TcpStream>;

/// How an exchange went wrong.
enum ExchangeError {
    /// The connection broke before the store sent a single reply byte.
    Unanswered(RerouteError),
    /// The exchange failed after the store started answering.
    Failed(RerouteError),
}

impl From<RerouteError> for ExchangeError {
    fn from(err: RerouteError) -> Self {
        Self::Failed(err)
    }
}

impl From<ExchangeError> for RerouteError {
    fn from(err: ExchangeError) -> Self {
        match err {
            ExchangeError::Unanswered(err) | ExchangeError::Failed(err) => err,
        }
    }
}

/// Result of a flag lookup, with failures kept as data.
#[derive(Debug)]
pub enum FlagStatus {
    /// The key exists (and has a positive TTL when TTLs are checked).
    Flagged,
    /// The key is absent, or its TTL is non-positive or unreadable.
    NotFlagged,
    /// The lookup could not be completed.
    LookupFailed(RerouteError),
}

impl FlagStatus {
    /// Returns true only for a confirmed flag.
    pub fn is_flagged(&self) -> bool {
        matches!(self, Self::Flagged)
    }
}

/// Client for the external flag store.
///
/// Safe to share between concurrent requests.
#[derive(Debug)]
pub struct FlagStore {
    address: String,
    config: LookupConfig,
    idle: Mutex<Vec<Connection>>,
}

impl FlagStore {
    /// Creates a client for the store at `address` (`host:port`).
    ///
    /// No connection is opened until the first lookup.
    pub fn new(address: impl Into<String>, config: LookupConfig) -> Self {
        Self {
            address: address.into(),
            idle: Mutex::new(Vec::with_capacity(config.max_idle_connections)),
            config,
        }
    }

    /// Address of the flag store.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Lookup configuration in use.
    pub fn config(&self) -> &LookupConfig {
        &self.config
    }

    /// Looks `key` up and folds the result into a [`FlagStatus`].
    pub async fn check(&self, key: &str) -> FlagStatus {
        match self.lookup(key).await {
            Ok(true) => FlagStatus::Flagged,
            Ok(false) => FlagStatus::NotFlagged,
            Err(err) => FlagStatus::LookupFailed(err),
        }
    }

    /// Returns whether `key` is flagged.
    ///
    /// The whole exchange is bounded by [`LookupConfig::timeout`]. Dropping
    /// the returned future aborts the lookup and closes its connection.
    pub async fn lookup(&self, key: &str) -> Result<bool> {
        let deadline = self.config.timeout;
        match tokio::time::timeout(deadline, self.lookup_inner(key)).await {
            Ok(result) => result,
            Err(_) => Err(RerouteError::LookupTimeout(deadline)),
        }
    }

    /// Number of idle connections currently pooled.
    pub async fn idle_connections(&self) -> usize {
        self.idle.lock().await.len()
    }

    async fn lookup_inner(&self, key: &str) -> Result<bool> {
        let request = self.encode_request(key);

        if let Some(mut conn) = self.take_idle().await {
            match self.exchange(&mut conn, &request, key).await {
                Ok(outcome) => return Ok(self.settle(conn, outcome).await),
                Err(ExchangeError::Unanswered(err)) => {
                    debug!(error = %err, "Pooled flag store connection was closed, dialing a new one");
                }
                Err(ExchangeError::Failed(err)) => return Err(err),
            }
        }

        let mut conn = self.connect().await?;
        let outcome = self.exchange(&mut conn, &request, key).await?;
        Ok(self.settle(conn, outcome).await)
    }

    fn encode_request(&self, key: &str) -> BytesMut {
        let mut request = BytesMut::with_capacity(64 + 2 * key.len());
        resp::encode_command(&mut request, &[b"EXISTS", key.as_bytes()]);
        if self.config.check_ttl {
            resp::encode_command(&mut request, &[b"TTL", key.as_bytes()]);
        }
        request
    }

    /// Pools `conn` when it is still in sync and returns the verdict.
    async fn settle(&self, conn: Connection, (flagged, reusable): (bool, bool)) -> bool {
        if reusable {
            self.put_idle(conn).await;
        }
        flagged
    }

    async fn connect(&self) -> Result<Connection> {
        let stream = TcpStream::connect(&self.address)
            .await
            .map_err(RerouteError::LookupConnect)?;
        // Replies are tiny; Nagle would only add latency.
        let _ = stream.set_nodelay(true);
        Ok(BufStream::new(stream))
    }

    /// Runs one lookup on `conn`.
    ///
    /// Returns the verdict and whether the connection is still in sync and
    /// may be reused.
    async fn exchange(
        &self,
        conn: &mut Connection,
        request: &[u8],
        key: &str,
    ) -> std::result::Result<(bool, bool), ExchangeError> {
        let unanswered = |err: std::io::Error, what: &str| {
            ExchangeError::Unanswered(RerouteError::LookupProtocol(format!("{what} failed: {err}")))
        };

        conn.write_all(request)
            .await
            .map_err(|err| unanswered(err, "write"))?;
        conn.flush().await.map_err(|err| unanswered(err, "write"))?;

        let answered = !conn
            .fill_buf()
            .await
            .map_err(|err| unanswered(err, "read"))?
            .is_empty();
        if !answered {
            return Err(ExchangeError::Unanswered(RerouteError::LookupProtocol(
                "connection closed before reply".into(),
            )));
        }

        let mut line = Vec::with_capacity(16);
        resp::read_line(conn, &mut line).await?;
        let exists = resp::parse_integer(&line)? > 0;

        if !self.config.check_ttl {
            return Ok((exists, true));
        }

        // The TTL reply is always consumed to keep the connection in sync.
        resp::read_line(conn, &mut line).await?;
        match resp::parse_integer(&line) {
            Ok(ttl) => Ok((exists && ttl > 0, true)),
            Err(err) => {
                debug!(key = %key, error = %err, "Unreadable TTL reply, treating key as not flagged");
                Ok((false, false))
            }
        }
    }

    async fn take_idle(&self) -> Option<Connection> {
        if self.config.max_idle_connections == 0 {
            return None;
        }
        let mut idle = self.idle.lock().await;
        while let Some(conn) = idle.pop() {
            if is_quiet(&conn) {
                return Some(conn);
            }
            debug!(address = %self.address, "Discarding closed flag store connection");
        }
        None
    }

    async fn put_idle(&self, conn: Connection) {
        if self.config.max_idle_connections == 0 {
            return;
        }
        let mut idle = self.idle.lock().await;
        if idle.len() < self.config.max_idle_connections {
            idle.push(conn);
        }
    }
}

/// An idle connection must have nothing to read: EOF means the store closed
/// it, and unsolicited bytes would be taken for the next reply.
fn is_quiet(conn: &Connection) -> bool {
    let mut byte = [0u8; 1];
    match conn.get_ref().try_read(&mut byte) {
        Ok(_) => false,
        Err(err) => err.kind() == ErrorKind::WouldBlock,
    }
}
