//! Forwarding proxy bound to a single, fixed destination.
//!
//! The destination never depends on the incoming request: only the transport
//! target changes, the request itself (method, path, headers, body) is
//! forwarded as received. Request and response bodies are streamed, never
//! held in memory as a whole. A [`Destination`] captures everything that would
//! otherwise live in a request-rewriting callback.
//!
//! # Connection Pooling
//!
//! Each [`Forwarder`] owns one [`reqwest::Client`] for the whole process
//! lifetime. Idle connections are kept per [`PoolConfig`] and evicted after
//! the idle timeout.
//!
//! # TLS
//!
//! For the reroute target the URL host is the configured server name, so it
//! is what the TLS handshake announces. The certificate chain is not
//! validated: the destination is an operator controlled endpoint.
//!
//! # Errors
//!
//! Transport failures are logged with their kind and turned into a fixed
//! `502 Bad Gateway`. Nothing about the failure reaches the client.

use std::net::{IpAddr, SocketAddr};

use bytes::Bytes;
use futures_util::{TryStreamExt, future};
use http_body_util::{BodyExt, BodyStream, StreamBody};
use hyper::body::{Body, Frame};
use hyper::header::{HeaderMap, HeaderName, HeaderValue};
use hyper::{Request, Response};
use tracing::{debug, error};

use crate::body::{BoxError, ProxyBody, create_error_response};
use crate::error::{RerouteError, Result};
use crate::headers::{CONNECTION, X_FORWARDED_FOR, is_hop_by_hop};
use crate::types::{PoolConfig, RerouteConfig, Scheme};

/// Where a [`Forwarder`] sends requests, and how far it trusts it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Destination {
    scheme: Scheme,
    host: String,
    port: u16,
    accept_invalid_certs: bool,
}

impl Destination {
    /// The reroute target described by the policy.
    ///
    /// Uses the policy's server name as host and skips certificate
    /// validation.
    pub fn reroute(config: &RerouteConfig) -> Self {
        Self {
            scheme: config.reroute_scheme,
            host: config.server_name().to_string(),
            port: config.reroute_port,
            accept_invalid_certs: true,
        }
    }

    /// A plain HTTP upstream, such as the local service behind the proxy.
    pub fn plain(host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: Scheme::Http,
            host: host.into(),
            port,
            accept_invalid_certs: false,
        }
    }

    /// Scheme used to reach the destination.
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Destination host, also the expected TLS server name.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Destination port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Whether certificate validation is skipped.
    pub fn accepts_invalid_certs(&self) -> bool {
        self.accept_invalid_certs
    }

    /// `scheme://host:port`, with IPv6 literals bracketed.
    pub fn base_url(&self) -> String {
        if self.host.contains(':') {
            format!("{}://[{}]:{}", self.scheme, self.host, self.port)
        } else {
            format!("{}://{}:{}", self.scheme, self.host, self.port)
        }
    }
}

/// Reverse proxy towards one [`Destination`].
///
/// Cheap to share: wrap it in an `Arc` or keep it inside the handler.
#[derive(Clone, Debug)]
pub struct Forwarder {
    client: reqwest::Client,
    destination: Destination,
    base_url: String,
}

impl Forwarder {
    /// Builds the forwarder and its connection pool.
    pub fn new(destination: Destination, pool: &PoolConfig) -> Result<Self> {
        if destination.host.is_empty() {
            return Err(RerouteError::Config("destination host is empty".into()));
        }

        let client = reqwest::Client::builder()
            .connect_timeout(pool.dial_timeout)
            .tcp_keepalive(pool.tcp_keepalive)
            .pool_idle_timeout(pool.idle_timeout)
            .pool_max_idle_per_host(pool.idle_per_destination())
            .danger_accept_invalid_certs(destination.accept_invalid_certs)
            .redirect(reqwest::redirect::Policy::none())
            .http1_only()
            .no_proxy()
            .build()
            .map_err(|err| {
                RerouteError::Config(format!("failed to build forwarding client: {err}"))
            })?;

        let base_url = destination.base_url();
        Ok(Self {
            client,
            destination,
            base_url,
        })
    }

    /// Destination this forwarder is bound to.
    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    /// Forwards `req` and streams the destination's response back.
    ///
    /// Never fails: transport errors become a `502 Bad Gateway`.
    pub async fn forward<B>(&self, req: Request<B>, remote_addr: SocketAddr) -> Response<ProxyBody>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        match self.try_forward(req, remote_addr).await {
            Ok(response) => response,
            Err(err) => {
                error!(
                    kind = err.kind(),
                    error = %err,
                    destination = %self.base_url,
                    "Proxy error"
                );
                create_error_response(err.status_code(), err.user_message())
            }
        }
    }

    /// Forwards `req`, surfacing transport errors to the caller.
    pub async fn try_forward<B>(
        &self,
        req: Request<B>,
        remote_addr: SocketAddr,
    ) -> Result<Response<ProxyBody>>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = req.into_parts();

        let url = format!(
            "{}{}",
            self.base_url,
            parts.uri.path_and_query().map_or("/", |pq| pq.as_str())
        );

        let mut headers = end_to_end_headers(&parts.headers);
        append_forwarded_for(&mut headers, remote_addr.ip());

        debug!(method = %parts.method, url = %url, "Forwarding request");

        let mut req_builder = self.client.request(parts.method, url).headers(headers);
        if !body.is_end_stream() {
            req_builder = req_builder.body(stream_body(body));
        }

        let response = req_builder.send().await.map_err(classify_error)?;
        Ok(into_proxy_response(response))
    }
}

/// Streams the data frames of `body` to the destination. Trailers are
/// dropped.
fn stream_body<B>(body: B) -> reqwest::Body
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    let data = TryStreamExt::map_err(BodyStream::new(body), |err| -> BoxError { err.into() })
        .try_filter_map(|frame| future::ready(Ok(frame.into_data().ok())));
    reqwest::Body::wrap_stream(data)
}

/// Copies `headers` minus hop-by-hop headers, including any header named
/// in `Connection`.
fn end_to_end_headers(headers: &HeaderMap) -> HeaderMap {
    let listed: Vec<String> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect();

    let mut filtered = HeaderMap::with_capacity(headers.len() + 1);
    for (name, value) in headers {
        let name_str = name.as_str();
        if is_hop_by_hop(name_str) || listed.iter().any(|listed| listed == name_str) {
            continue;
        }
        filtered.append(name.clone(), value.clone());
    }
    filtered
}

/// Appends the peer address to `X-Forwarded-For`, keeping prior hops.
fn append_forwarded_for(headers: &mut HeaderMap, peer: IpAddr) {
    let prior: Vec<&str> = headers
        .get_all(X_FORWARDED_FOR)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .collect();

    let value = if prior.is_empty() {
        peer.to_string()
    } else {
        format!("{}, {}", prior.join(", "), peer)
    };

    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(HeaderName::from_static(X_FORWARDED_FOR), value);
    }
}

fn into_proxy_response(response: reqwest::Response) -> Response<ProxyBody> {
    let status = response.status();
    let mut headers = HeaderMap::with_capacity(response.headers().len());
    for (name, value) in response.headers() {
        if !is_hop_by_hop(name.as_str()) {
            headers.append(name.clone(), value.clone());
        }
    }

    let stream = response
        .bytes_stream()
        .map_ok(Frame::data)
        .map_err(BoxError::from);

    let mut proxied = Response::new(StreamBody::new(stream).boxed_unsync());
    *proxied.status_mut() = status;
    *proxied.headers_mut() = headers;
    proxied
}

/// Maps a transport error onto the forward error kinds.
fn classify_error(err: reqwest::Error) -> RerouteError {
    let detail = error_chain(&err);

    if err.is_connect() {
        if is_tls_failure(&err) {
            RerouteError::ForwardTls(detail)
        } else {
            RerouteError::ForwardDial(detail)
        }
    } else {
        RerouteError::ForwardIo(detail)
    }
}

/// TLS failures surface as connect errors wrapping an `InvalidData` I/O
/// error, or at least mention TLS or certificates somewhere in the chain.
fn is_tls_failure(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>()
            && io.kind() == std::io::ErrorKind::InvalidData
        {
            return true;
        }
        let text = cause.to_string().to_ascii_lowercase();
        if text.contains("tls") || text.contains("certificate") || text.contains("handshake") {
            return true;
        }
        source = cause.source();
    }
    false
}

fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut chain = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        chain.push_str(": ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }
    chain
}
