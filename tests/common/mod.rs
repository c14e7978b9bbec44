//! Shared harness for integration tests: a fake flag store, echoing
//! upstreams and the reroute layer served on an ephemeral port.

#![allow(dead_code)]

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{HeaderMap, Request, Response};
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufStream};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use ipreroute_core::{
    ConnectionProvider, Destination, Forwarder, LookupConfig, LookupProvider, PoolConfig,
    PoolProvider, RerouteConfig, RerouteHandler, RerouteProvider, Scheme, handle_request,
};

// ===========================================
// Configuration
// ===========================================

pub struct HarnessConfig {
    pub reroute: RerouteConfig,
    pub lookup: LookupConfig,
    pub pool: PoolConfig,
}

impl HarnessConfig {
    pub fn new(redis_address: String, reroute_port: u16) -> Self {
        Self {
            reroute: RerouteConfig {
                redis_address,
                reroute_ip: "127.0.0.1".to_string(),
                reroute_port,
                reroute_scheme: Scheme::Http,
                ..RerouteConfig::default()
            },
            lookup: LookupConfig {
                timeout: Duration::from_millis(100),
                ..LookupConfig::default()
            },
            pool: PoolConfig::default(),
        }
    }
}

impl RerouteProvider for HarnessConfig {
    fn reroute_config(&self) -> &RerouteConfig {
        &self.reroute
    }
}

impl LookupProvider for HarnessConfig {
    fn lookup_config(&self) -> &LookupConfig {
        &self.lookup
    }
}

impl PoolProvider for HarnessConfig {
    fn pool_config(&self) -> &PoolConfig {
        &self.pool
    }
}

impl ConnectionProvider for HarnessConfig {
    fn max_connections(&self) -> usize {
        0
    }
}

pub async fn unused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

// ===========================================
// Fake flag store
// ===========================================

/// Redis stand-in answering `EXISTS` and `TTL` from a fixed table.
pub struct FlagStoreStub {
    address: String,
    task: JoinHandle<()>,
}

impl FlagStoreStub {
    /// `entries` maps keys to their TTL in seconds (`-1`: no expiry).
    pub async fn start(entries: &[(&str, i64)]) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let keys: Arc<HashMap<String, i64>> = Arc::new(
            entries
                .iter()
                .map(|(key, ttl)| (key.to_string(), *ttl))
                .collect(),
        );

        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve_flags(stream, keys.clone()));
            }
        });

        Self { address, task }
    }

    pub fn address(&self) -> String {
        self.address.clone()
    }
}

impl Drop for FlagStoreStub {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve_flags(stream: TcpStream, keys: Arc<HashMap<String, i64>>) {
    let mut stream = BufStream::new(stream);
    while let Some(args) = read_command(&mut stream).await {
        let key = args.get(1).cloned().unwrap_or_default();
        let reply = match args.first().map(|c| c.to_ascii_uppercase()).as_deref() {
            Some("EXISTS") => format!(":{}\r\n", u8::from(keys.contains_key(&key))),
            Some("TTL") => format!(":{}\r\n", keys.get(&key).copied().unwrap_or(-2)),
            _ => "-ERR unknown command\r\n".to_string(),
        };
        if stream.write_all(reply.as_bytes()).await.is_err() || stream.flush().await.is_err() {
            return;
        }
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
// Echo upstream
// ===========================================

#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub method: String,
    pub uri: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

struct EchoState {
    name: String,
    hits: AtomicUsize,
    seen: Mutex<Vec<SeenRequest>>,
}

/// HTTP upstream echoing the request body back, tagged with `x-upstream`.
pub struct EchoUpstream {
    port: u16,
    state: Arc<EchoState>,
    task: JoinHandle<()>,
}

impl EchoUpstream {
    pub async fn start(name: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let state = Arc::new(EchoState {
            name: name.to_string(),
            hits: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        });

        let accept_state = state.clone();
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let state = accept_state.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |req| echo(state.clone(), req));
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        Self { port, state, task }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<SeenRequest> {
        self.state.seen.lock().unwrap().clone()
    }
}

impl Drop for EchoUpstream {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn echo(
    state: Arc<EchoState>,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    state.hits.fetch_add(1, Ordering::SeqCst);
    let (parts, body) = req.into_parts();
    let body = body
        .collect()
        .await
        .map(|collected| collected.to_bytes())
        .unwrap_or_default();

    state.seen.lock().unwrap().push(SeenRequest {
        method: parts.method.to_string(),
        uri: parts.uri.to_string(),
        headers: parts.headers,
        body: body.to_vec(),
    });

    Ok(Response::builder()
        .header("x-upstream", state.name.as_str())
        .body(Full::new(body))
        .unwrap())
}

// ===========================================
// Proxy under test
// ===========================================

/// The reroute layer served over HTTP/1.1 on an ephemeral port, with a
/// forwarder to `origin_port` as the next handler.
pub struct Proxy {
    addr: SocketAddr,
    task: JoinHandle<()>,
}

impl Proxy {
    pub async fn start(config: &HarnessConfig, origin_port: u16) -> Self {
        let next = Forwarder::new(Destination::plain("127.0.0.1", origin_port), &config.pool)
            .unwrap();
        let handler = Arc::new(RerouteHandler::from_config(config, next).unwrap());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let task = tokio::spawn(async move {
            while let Ok((stream, remote_addr)) = listener.accept().await {
                let handler = handler.clone();
                tokio::spawn(async move {
                    let service =
                        service_fn(move |req| handle_request(req, remote_addr, handler.clone()));
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        Self { addr, task }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for Proxy {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}
