//! Accept loops for the plain and TLS listeners.
//!
//! Connections are served by hyper directly so that TLS can be terminated
//! per connection with a certificate chosen after reading the client hello.
//! On shutdown the loop stops accepting, asks every open connection to
//! finish gracefully, and waits up to the grace period. Connections still
//! open after that are closed.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::service::TowerToHyperService;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::LazyConfigAcceptor;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::adapters::acme::CertificateProvider;

/// Upper bound on a TLS handshake, including any certificate order it waits for.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(180);

/// Pause after a transient accept failure.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Bind a TCP listener. Separate from [`serve`] so bind failures surface
/// before anything is spawned.
pub async fn bind(addr: SocketAddr) -> io::Result<TcpListener> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "Listening");
    Ok(listener)
}

/// Serve `router` on `listener` until `shutdown` is cancelled.
///
/// With a `tls` provider every connection is TLS-terminated first.
/// Returns an error only for accept failures that cannot be retried.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    tls: Option<Arc<CertificateProvider>>,
    shutdown: CancellationToken,
    grace: Duration,
) -> io::Result<()> {
    let connections = TaskTracker::new();
    let force_close = CancellationToken::new();
    let local_addr = listener.local_addr()?;

    let result = loop {
        let (stream, peer) = tokio::select! {
            _ = shutdown.cancelled() => break Ok(()),
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) if is_transient(&e) => {
                    tracing::warn!(addr = %local_addr, error = %e, "Accept failed, retrying");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
                Err(e) => {
                    tracing::error!(addr = %local_addr, error = %e, "Accept failed");
                    break Err(e);
                }
            },
        };

        let router = router.clone();
        let shutdown = shutdown.clone();
        let force_close = force_close.clone();
        let tls = tls.clone();
        connections.spawn(async move {
            match tls {
                Some(provider) => {
                    serve_tls(stream, peer, router, provider, shutdown, force_close).await
                }
                None => serve_connection(stream, peer, router, shutdown, force_close).await,
            }
        });
    };

    drop(listener);
    connections.close();
    if tokio::time::timeout(grace, connections.wait()).await.is_err() {
        tracing::warn!(
            addr = %local_addr,
            open = connections.len(),
            "Connections still open after grace period, closing"
        );
        force_close.cancel();
        connections.wait().await;
    } else {
        tracing::debug!(addr = %local_addr, "Listener drained");
    }

    result
}

async fn serve_tls(
    stream: TcpStream,
    peer: SocketAddr,
    router: Router,
    provider: Arc<CertificateProvider>,
    shutdown: CancellationToken,
    force_close: CancellationToken,
) {
    let handshake = async {
        let start = LazyConfigAcceptor::new(rustls::server::Acceptor::default(), stream).await?;
        let server_name = start.client_hello().server_name().map(str::to_owned);
        let config = provider
            .server_config(server_name.as_deref())
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        start.into_stream(config).await
    };

    let tls_stream = tokio::select! {
        _ = shutdown.cancelled() => return,
        result = tokio::time::timeout(HANDSHAKE_TIMEOUT, handshake) => match result {
            Ok(Ok(tls_stream)) => tls_stream,
            Ok(Err(e)) => {
                tracing::warn!(peer = %peer, error = %e, "TLS handshake failed");
                return;
            }
            Err(_) => {
                tracing::warn!(peer = %peer, "TLS handshake timed out");
                return;
            }
        },
    };

    serve_connection(tls_stream, peer, router, shutdown, force_close).await;
}

/// Serves one connection. After `shutdown` the connection is asked to
/// finish its in-flight requests; after `force_close` it is dropped.
async fn serve_connection<I>(
    io: I,
    peer: SocketAddr,
    router: Router,
    shutdown: CancellationToken,
    force_close: CancellationToken,
) where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let builder = auto::Builder::new(TokioExecutor::new());
    let conn = builder.serve_connection_with_upgrades(TokioIo::new(io), TowerToHyperService::new(router));
    tokio::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        _ = shutdown.cancelled() => {
            conn.as_mut().graceful_shutdown();
            tokio::select! {
                result = conn.as_mut() => result,
                _ = force_close.cancelled() => {
                    tracing::debug!(peer = %peer, "Closing connection after grace period");
                    return;
                }
            }
        }
    };

    if let Err(e) = result {
        tracing::debug!(peer = %peer, error = %e, "Connection ended with error");
    }
}

/// Accept errors that concern a single connection or a momentary resource
/// shortage rather than the listening socket itself.
fn is_transient(e: &io::Error) -> bool {
    const ENFILE: i32 = 23;
    const EMFILE: i32 = 24;

    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    ) || matches!(e.raw_os_error(), Some(ENFILE) | Some(EMFILE))
}
