//! HTTP request handling.
//!
//! Wraps a "next" handler with the reroute decision:
//! 1. Extract the client IP (first `X-Forwarded-For` entry, else the peer)
//! 2. Look `key_prefix + ip` up in the flag store, within the deadline
//! 3. Flagged: forward the request, untouched, to the reroute target
//! 4. Otherwise (including any lookup failure): call the next handler
//!
//! Exactly one of the two paths serves each request. A failed reroute is
//! answered with `502 Bad Gateway` and never falls back to the next handler.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use hyper::body::Body;
use hyper::{Request, Response};
use tracing::info;

use crate::body::{BoxError, ProxyBody};
use crate::decision::DecisionEngine;
use crate::error::Result;
use crate::flag_store::FlagStore;
use crate::forward::{Destination, Forwarder};
use crate::types::ConfigProvider;

/// Whatever serves requests that are not rerouted.
pub trait NextHandler<B>: Send + Sync {
    /// Serves `req`. Must produce a response for every request.
    fn handle(
        &self,
        req: Request<B>,
        remote_addr: SocketAddr,
    ) -> impl Future<Output = Response<ProxyBody>> + Send;
}

impl<B> NextHandler<B> for Forwarder
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    fn handle(
        &self,
        req: Request<B>,
        remote_addr: SocketAddr,
    ) -> impl Future<Output = Response<ProxyBody>> + Send {
        self.forward(req, remote_addr)
    }
}

/// Silent reroute layer in front of a next handler.
pub struct RerouteHandler<N> {
    engine: DecisionEngine,
    reroute: Forwarder,
    next: N,
}

impl<N> RerouteHandler<N> {
    /// Assembles a handler from its parts.
    pub fn new(engine: DecisionEngine, reroute: Forwarder, next: N) -> Self {
        Self {
            engine,
            reroute,
            next,
        }
    }

    /// Builds the flag store client, the decision engine and the reroute
    /// forwarder from `config`.
    ///
    /// Only fails if the reroute client cannot be built. The flag store is
    /// not contacted until the first request.
    pub fn from_config(config: &impl ConfigProvider, next: N) -> Result<Self> {
        let policy = config.reroute_config();
        let store = FlagStore::new(
            policy.redis_address.clone(),
            config.lookup_config().clone(),
        );
        let engine = DecisionEngine::new(store, policy.reroute_key.clone());
        let reroute = Forwarder::new(Destination::reroute(policy), config.pool_config())?;

        Ok(Self::new(engine, reroute, next))
    }

    pub fn engine(&self) -> &DecisionEngine {
        &self.engine
    }

    /// Forwarder bound to the reroute target.
    pub fn reroute(&self) -> &Forwarder {
        &self.reroute
    }

    pub fn next(&self) -> &N {
        &self.next
    }

    /// Serves one request through either the reroute target or the next
    /// handler.
    pub async fn handle<B>(&self, req: Request<B>, remote_addr: SocketAddr) -> Response<ProxyBody>
    where
        N: NextHandler<B>,
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let decision = self
            .engine
            .decide(req.headers(), &remote_addr.to_string())
            .await;

        if decision.should_reroute {
            info!(
                client_ip = %decision.client_ip,
                method = %req.method(),
                path = %req.uri().path(),
                "Silent reroute"
            );
            self.reroute.forward(req, remote_addr).await
        } else {
            self.next.handle(req, remote_addr).await
        }
    }
}

/// Entry point for hyper's `service_fn`.
///
/// Always returns `Ok`: failures are already turned into responses.
pub async fn handle_request<B, N>(
    req: Request<B>,
    remote_addr: SocketAddr,
    handler: Arc<RerouteHandler<N>>,
) -> std::result::Result<Response<ProxyBody>, Infallible>
where
    N: NextHandler<B>,
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    Ok(handler.handle(req, remote_addr).await)
}
