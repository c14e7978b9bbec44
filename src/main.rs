use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use ipreroute::args::Args;
use ipreroute::connection::{ConnectionLimiter, ConnectionTracker};
use ipreroute::{EnvVarConfig, server};
use ipreroute_core::{
    ConnectionProvider, Destination, Forwarder, PoolProvider, RerouteHandler, handle_request,
};

/// How long shutdown waits for in-flight connections.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(err) = args.validate() {
        eprintln!("❌ Configuration error: {err}");
        std::process::exit(1);
    }

    init_logging(&args);
    server::print_startup_info(&args);

    if let Err(err) = run(args).await {
        eprintln!("❌ {err}");
        std::process::exit(1);
    }
}

fn init_logging(args: &Args) {
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if args.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init();
    }
}

/// Where non-rerouted requests go: the bind address, or loopback when
/// listening on all interfaces.
fn pass_through_ip(bind_ip: IpAddr) -> IpAddr {
    match bind_ip {
        IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
        ip => ip,
    }
}

async fn run(args: Args) -> Result<(), String> {
    let config = EnvVarConfig::new();
    let bind_ip = args.bind_ip()?;

    let next = Forwarder::new(
        Destination::plain(pass_through_ip(bind_ip).to_string(), args.forward),
        config.pool_config(),
    )
    .map_err(|err| format!("Failed to build pass-through client: {err}"))?;
    let handler = Arc::new(
        RerouteHandler::from_config(&config, next)
            .map_err(|err| format!("Failed to build reroute client: {err}"))?,
    );

    let listener = TcpListener::bind(SocketAddr::new(bind_ip, args.listen))
        .await
        .map_err(|err| format!("Failed to bind to port {}: {err}", args.listen))?;

    info!(
        flag_store = handler.engine().store().address(),
        key_prefix = handler.engine().key_prefix(),
        lookup_timeout = ?handler.engine().store().config().timeout,
        reroute_target = %handler.reroute().destination().base_url(),
        pass_through = %handler.next().destination().base_url(),
        "Reroute layer ready"
    );
    println!("✅ {} is running on port {}", env!("CARGO_PKG_NAME"), args.listen);

    let limiter = ConnectionLimiter::new(config.max_connections());
    let tracker = ConnectionTracker::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        let (stream, remote_addr) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(err) => {
                    warn!(error = %err, "Failed to accept connection");
                    continue;
                }
            },
            _ = &mut shutdown => {
                info!("Shutdown signal received, no longer accepting connections");
                break;
            }
        };

        let admission = limiter.try_admit();
        if admission.is_rejected() {
            warn!(
                client = %remote_addr,
                max_connections = limiter.max_connections(),
                "Connection limit reached, dropping connection"
            );
            continue;
        }

        debug!(client = %remote_addr, "New connection");

        let guard = tracker.track();
        let handler = handler.clone();
        let mut shutdown_rx = shutdown_rx.clone();

        tokio::spawn(async move {
            let _admission = admission;
            let _guard = guard;

            let service = service_fn(move |req| handle_request(req, remote_addr, handler.clone()));
            let conn = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
            tokio::pin!(conn);

            let result = tokio::select! {
                result = conn.as_mut() => result,
                _ = shutdown_rx.changed() => {
                    conn.as_mut().graceful_shutdown();
                    conn.as_mut().await
                }
            };

            if let Err(err) = result {
                debug!(client = %remote_addr, error = %err, "Connection error");
            }
        });
    }

    drop(listener);
    let _ = shutdown_tx.send(true);

    let active = tracker.count();
    if active > 0 {
        info!(active, "Waiting for in-flight connections to finish");
    }
    if !tracker.wait_for_shutdown(SHUTDOWN_TIMEOUT).await {
        warn!(
            remaining = tracker.count(),
            "Shutdown timeout reached, closing remaining connections"
        );
    }

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
