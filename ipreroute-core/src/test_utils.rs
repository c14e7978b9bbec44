//! Test utilities for ipreroute.
//!
//! Shared test configuration plus two in-process fakes: a Redis speaking
//! just enough RESP for flag lookups, and an HTTP upstream that records
//! what it receives, optionally behind TLS with a self-signed certificate.
//! Only compiled when running tests (`#[cfg(test)]`).

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{HeaderMap, Method, Request, Response};
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufStream};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls;
use tokio_rustls::rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};

use crate::types::{
    ConnectionProvider, LookupConfig, LookupProvider, PoolConfig, PoolProvider, RerouteConfig,
    RerouteProvider, Scheme,
};

/// Shared test configuration for unit tests.
///
/// Implements all configuration traits, with builder methods pointing the
/// policy at in-process fakes.
#[derive(Debug, Clone)]
pub struct TestConfig {
    pub reroute: RerouteConfig,
    pub lookup: LookupConfig,
    pub pool: PoolConfig,
    pub max_connections: usize,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            reroute: RerouteConfig::default(),
            lookup: LookupConfig {
                timeout: Duration::from_millis(200),
                ..LookupConfig::default()
            },
            pool: PoolConfig::default(),
            max_connections: 10_000,
        }
    }
}

impl TestConfig {
    /// Create a new test configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Point flag lookups at `address`.
    pub fn with_redis(mut self, address: impl Into<String>) -> Self {
        self.reroute.redis_address = address.into();
        self
    }

    /// Reroute to a plain HTTP listener on localhost.
    pub fn with_reroute_target(mut self, port: u16) -> Self {
        self.reroute.reroute_ip = "127.0.0.1".to_string();
        self.reroute.reroute_port = port;
        self.reroute.reroute_scheme = Scheme::Http;
        self
    }

    /// Configure the lookup deadline.
    pub fn with_lookup_timeout(mut self, millis: u64) -> Self {
        self.lookup.timeout = Duration::from_millis(millis);
        self
    }

    /// Enable or disable the TTL check.
    pub fn with_check_ttl(mut self, check_ttl: bool) -> Self {
        self.lookup.check_ttl = check_ttl;
        self
    }
}

impl RerouteProvider for TestConfig {
    fn reroute_config(&self) -> &RerouteConfig {
        &self.reroute
    }
}

impl LookupProvider for TestConfig {
    fn lookup_config(&self) -> &LookupConfig {
        &self.lookup
    }
}

impl PoolProvider for TestConfig {
    fn pool_config(&self) -> &PoolConfig {
        &self.pool
    }
}

impl ConnectionProvider for TestConfig {
    fn max_connections(&self) -> usize {
        self.max_connections
    }
}

/// Returns a localhost address nothing listens on.
pub async fn unused_address() -> String {
    format!("127.0.0.1:{}", unused_port().await)
}

/// Returns a localhost port nothing listens on.
pub async fn unused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

// ===========================================
// Fake flag store
// ===========================================

/// How the fake Redis answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockRedisMode {
    /// Integer replies to `EXISTS` and `TTL`.
    Normal,
    /// Reads commands, never replies.
    Silent,
    /// Answers every command with an error reply.
    ErrorReply,
    /// Answers `TTL` with a non-integer reply.
    GarbageTtl,
    /// Closes every connection right after accepting it.
    HangUp,
    /// Answers normally, then closes the connection after each `TTL` reply.
    CloseAfterTtl,
}

struct MockRedisState {
    keys: HashMap<String, i64>,
    mode: MockRedisMode,
    connections: AtomicUsize,
    closed: AtomicUsize,
    commands: Mutex<Vec<String>>,
}

/// In-process fake Redis holding `key -> ttl` entries.
///
/// A TTL of `-1` means "no expiry", as in Redis.
pub struct MockRedis {
    address: String,
    state: Arc<MockRedisState>,
    task: JoinHandle<()>,
}

impl MockRedis {
    pub async fn start(entries: &[(&str, i64)]) -> Self {
        Self::start_with_mode(entries, MockRedisMode::Normal).await
    }

    pub async fn start_with_mode(entries: &[(&str, i64)], mode: MockRedisMode) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let state = Arc::new(MockRedisState {
            keys: entries
                .iter()
                .map(|(key, ttl)| (key.to_string(), *ttl))
                .collect(),
            mode,
            connections: AtomicUsize::new(0),
            closed: AtomicUsize::new(0),
            commands: Mutex::new(Vec::new()),
        });

        let accept_state = state.clone();
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                accept_state.connections.fetch_add(1, Ordering::SeqCst);
                if accept_state.mode == MockRedisMode::HangUp {
                    drop(stream);
                    accept_state.closed.fetch_add(1, Ordering::SeqCst);
                    continue;
                }
                let state = accept_state.clone();
                tokio::spawn(async move {
                    serve_redis(stream, &state).await;
                    state.closed.fetch_add(1, Ordering::SeqCst);
                });
            }
        });

        Self {
            address,
            state,
            task,
        }
    }

    pub fn address(&self) -> String {
        self.address.clone()
    }

    /// Number of connections accepted so far.
    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    /// Number of connections that have been closed, by either side.
    pub fn closed_connections(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }

    /// Waits up to a second for `count` connections to be closed.
    pub async fn wait_for_closed(&self, count: usize) -> bool {
        for _ in 0..100 {
            if self.closed_connections() >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    /// Commands received, as space separated words.
    pub fn commands(&self) -> Vec<String> {
        self.state.commands.lock().unwrap().clone()
    }
}

impl Drop for MockRedis {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve_redis(stream: TcpStream, state: &MockRedisState) {
    let mut stream = BufStream::new(stream);
    while let Some(args) = read_command(&mut stream).await {
        state.commands.lock().unwrap().push(args.join(" "));

        let Some(reply) = redis_reply(state, &args) else {
            continue;
        };
        if stream.write_all(reply.as_bytes()).await.is_err() || stream.flush().await.is_err() {
            return;
        }
        let was_ttl = args.first().is_some_and(|command| command.eq_ignore_ascii_case("TTL"));
        if state.mode == MockRedisMode::CloseAfterTtl && was_ttl {
            return;
        }
    }
}

fn redis_reply(state: &MockRedisState, args: &[String]) -> Option<String> {
    let command = args.first().map(|c| c.to_ascii_uppercase()).unwrap_or_default();
    let key = args.get(1).map(String::as_str).unwrap_or_default();

    match (state.mode, command.as_str()) {
        (MockRedisMode::Silent, _) => None,
        (MockRedisMode::ErrorReply, _) => Some("-ERR unknown command\r\n".to_string()),
        (MockRedisMode::GarbageTtl, "TTL") => Some("+soon\r\n".to_string()),
        (_, "EXISTS") => {
            let exists = u8::from(state.keys.contains_key(key));
            Some(format!(":{exists}\r\n"))
        }
        (_, "TTL") => {
            let ttl = state.keys.get(key).copied().unwrap_or(-2);
            Some(format!(":{ttl}\r\n"))
        }
        _ => Some(format!("-ERR unknown command '{command}'\r\n")),
    }
}

async fn read_command(stream: &mut BufStream<TcpStream>) -> Option<Vec<String>> {
    let mut line = String::new();
    if stream.read_line(&mut line).await.ok()? == 0 {
        return None;
    }
    let count: usize = line.trim_end().strip_prefix('*')?.parse().ok()?;

    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        line.clear();
        stream.read_line(&mut line).await.ok()?;
        let len: usize = line.trim_end().strip_prefix('$')?.parse().ok()?;
        let mut data = vec![0; len + 2];
        stream.read_exact(&mut data).await.ok()?;
        data.truncate(len);
        args.push(String::from_utf8_lossy(&data).into_owned());
    }
    Some(args)
}

// ===========================================
// Fake upstream
// ===========================================

/// A request as seen by [`MockUpstream`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub uri: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

struct MockUpstreamState {
    name: String,
    connections: AtomicUsize,
    requests: Mutex<Vec<RecordedRequest>>,
    server_names: Mutex<Vec<String>>,
}

/// In-process HTTP/1.1 server answering `200` with `x-upstream: <name>` and
/// the body `response from <name>`.
pub struct MockUpstream {
    port: u16,
    state: Arc<MockUpstreamState>,
    task: JoinHandle<()>,
}

impl MockUpstream {
    pub async fn start(name: &str) -> Self {
        let (listener, port, state) = bind_upstream(name).await;

        let accept_state = state.clone();
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                accept_state.connections.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve_upstream(stream, accept_state.clone()));
            }
        });

        Self { port, state, task }
    }

    /// Same as [`MockUpstream::start`], behind TLS with a self-signed
    /// certificate for `localhost`.
    pub async fn start_tls(name: &str) -> Self {
        let acceptor = self_signed_acceptor("localhost");
        let (listener, port, state) = bind_upstream(name).await;

        let accept_state = state.clone();
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                accept_state.connections.fetch_add(1, Ordering::SeqCst);
                let acceptor = acceptor.clone();
                let state = accept_state.clone();
                tokio::spawn(async move {
                    let Ok(tls) = acceptor.accept(stream).await else {
                        return;
                    };
                    if let Some(server_name) = tls.get_ref().1.server_name() {
                        state.server_names.lock().unwrap().push(server_name.to_string());
                    }
                    serve_upstream(tls, state).await;
                });
            }
        });

        Self { port, state, task }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Number of connections accepted so far.
    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    /// Requests received so far, in arrival order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    /// SNI names announced by TLS clients.
    pub fn server_names(&self) -> Vec<String> {
        self.state.server_names.lock().unwrap().clone()
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn bind_upstream(name: &str) -> (TcpListener, u16, Arc<MockUpstreamState>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let state = Arc::new(MockUpstreamState {
        name: name.to_string(),
        connections: AtomicUsize::new(0),
        requests: Mutex::new(Vec::new()),
        server_names: Mutex::new(Vec::new()),
    });
    (listener, port, state)
}

async fn serve_upstream<S>(stream: S, state: Arc<MockUpstreamState>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = service_fn(move |req| record_request(state.clone(), req));
    let _ = http1::Builder::new()
        .serve_connection(TokioIo::new(stream), service)
        .await;
}

fn self_signed_acceptor(host: &str) -> TlsAcceptor {
    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec![host.to_string()]).unwrap();
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(vec![cert.der().clone()], key)
        .unwrap();
    TlsAcceptor::from(Arc::new(config))
}

async fn record_request(
    state: Arc<MockUpstreamState>,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let body = body
        .collect()
        .await
        .map(|collected| collected.to_bytes().to_vec())
        .unwrap_or_default();

    state.requests.lock().unwrap().push(RecordedRequest {
        method: parts.method,
        uri: parts.uri.to_string(),
        headers: parts.headers,
        body,
    });

    Ok(Response::builder()
        .header("x-upstream", state.name.as_str())
        .body(Full::new(Bytes::from(format!("response from {}", state.name))))
        .unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TestConfig::new();
        assert_eq!(config.reroute.reroute_key, "attacker_ip_");
        assert_eq!(config.lookup.timeout, Duration::from_millis(200));
        assert_eq!(config.max_connections, 10_000);
    }

    #[test]
    fn test_builder_methods() {
        let config = TestConfig::new()
            .with_redis("127.0.0.1:7000")
            .with_reroute_target(9000)
            .with_lookup_timeout(20)
            .with_check_ttl(false);

        assert_eq!(config.reroute.redis_address, "127.0.0.1:7000");
        assert_eq!(config.reroute.reroute_ip, "127.0.0.1");
        assert_eq!(config.reroute.reroute_port, 9000);
        assert_eq!(config.reroute.reroute_scheme, Scheme::Http);
        assert_eq!(config.lookup.timeout, Duration::from_millis(20));
        assert!(!config.lookup.check_ttl);
    }

    #[tokio::test]
    async fn test_mock_redis_answers_exists() {
        let redis = MockRedis::start(&[("k", 10)]).await;
        let mut stream = BufStream::new(TcpStream::connect(redis.address()).await.unwrap());
        stream
            .write_all(b"*2\r\n$6\r\nEXISTS\r\n$1\r\nk\r\n")
            .await
            .unwrap();
        stream.flush().await.unwrap();

        let mut line = String::new();
        stream.read_line(&mut line).await.unwrap();
        assert_eq!(line, ":1\r\n");
        assert_eq!(redis.commands(), vec!["EXISTS k"]);
    }
}
