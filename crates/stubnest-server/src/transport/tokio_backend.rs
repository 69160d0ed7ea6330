//! Tokio-based transport backend.
//!
//! One worker task per accepted connection, drawn from a semaphore-bounded
//! pool. Workers run independently and share no mutable per-request state;
//! the chains they traverse are read-only after startup. Fault injection is
//! synchronous within the owning worker, so a fault is always applied before
//! the pool slot is released.

use super::http1;
use super::tls::create_tls_acceptor;
use super::{RunningServer, TransportBackend};
use crate::config::ServerOptions;
use crate::dispatch::ServerCore;
use crate::error::StartError;
use crate::exchange::ServedRequest;
use crate::fault::{self, RawConnection, Teardown};
use crate::notifier::{Notifier, TracingNotifier};
use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};

/// The default transport backend, built on tokio's TCP listener and rustls.
pub struct TokioBackend {
    notifier: Option<Arc<dyn Notifier>>,
}

impl TokioBackend {
    pub fn new() -> Self {
        Self { notifier: None }
    }

    /// Use a specific notifier instead of the tracing-backed default.
    pub fn with_notifier(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            notifier: Some(notifier),
        }
    }
}

impl Default for TokioBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransportBackend for TokioBackend {
    async fn start(&self, options: ServerOptions) -> Result<Box<dyn RunningServer>, StartError> {
        let notifier = self
            .notifier
            .clone()
            .unwrap_or_else(|| Arc::new(TracingNotifier::new(options.verbose)));

        // Everything that can fail happens before the first bind: core build
        // (duplicate extension names), TLS material, address parsing.
        let core = Arc::new(ServerCore::build(&options, notifier)?);

        let tls_acceptor = match options.https_port {
            Some(_) => {
                let tls = options.tls.as_ref().ok_or(StartError::MissingTlsMaterial)?;
                Some(
                    create_tls_acceptor(&tls.cert_path, &tls.key_path)
                        .map_err(|e| StartError::Tls(e.to_string()))?,
                )
            }
            None => None,
        };

        let http_listener = bind(&options.bind_host, options.http_port).await?;
        let http_port = local_port(&http_listener, &options.bind_host)?;

        let (https_listener, https_port) = match options.https_port {
            Some(port) => {
                let listener = bind(&options.bind_host, port).await?;
                let port = local_port(&listener, &options.bind_host)?;
                (Some(listener), Some(port))
            }
            None => (None, None),
        };

        let pool = Arc::new(Semaphore::new(options.worker_count()));
        let tracker = TaskTracker::new();
        let listener_cancel = CancellationToken::new();
        let worker_cancel = CancellationToken::new();

        info!(
            "Listening on http://{}:{} (workers: {})",
            options.bind_host,
            http_port,
            options.worker_count()
        );
        if let Some(port) = https_port {
            info!("Listening on https://{}:{}", options.bind_host, port);
        }

        tokio::spawn(accept_loop(
            http_listener,
            None,
            Arc::clone(&core),
            Arc::clone(&pool),
            tracker.clone(),
            listener_cancel.clone(),
            worker_cancel.clone(),
        ));
        if let Some(listener) = https_listener {
            let acceptor = tls_acceptor.expect("TLS acceptor present when HTTPS is configured");
            tokio::spawn(accept_loop(
                listener,
                Some(acceptor),
                Arc::clone(&core),
                Arc::clone(&pool),
                tracker.clone(),
                listener_cancel.clone(),
                worker_cancel.clone(),
            ));
        }

        Ok(Box::new(TokioRunningServer {
            http_port,
            https_port,
            listener_cancel,
            worker_cancel,
            tracker,
            grace_period: options.grace_period,
            stopped: AtomicBool::new(false),
            done: CancellationToken::new(),
        }))
    }
}

async fn bind(host: &str, port: u16) -> Result<TcpListener, StartError> {
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .map_err(|_| StartError::InvalidBindAddress(format!("{host}:{port}")))?;
    TcpListener::bind(addr).await.map_err(|source| StartError::Bind {
        addr: addr.to_string(),
        source,
    })
}

fn local_port(listener: &TcpListener, host: &str) -> Result<u16, StartError> {
    listener
        .local_addr()
        .map(|a| a.port())
        .map_err(|source| StartError::Bind {
            addr: host.to_string(),
            source,
        })
}

#[allow(clippy::too_many_arguments)]
async fn accept_loop(
    listener: TcpListener,
    acceptor: Option<TlsAcceptor>,
    core: Arc<ServerCore>,
    pool: Arc<Semaphore>,
    tracker: TaskTracker,
    listener_cancel: CancellationToken,
    worker_cancel: CancellationToken,
) {
    loop {
        let (stream, peer) = tokio::select! {
            _ = listener_cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    error!("Accept error: {e}");
                    continue;
                }
            },
        };

        // The pool slot is acquired only once a connection exists, so an
        // idle listener never pins a worker; the pool is shared across
        // listeners and bounds in-flight connections only. A connection
        // accepted while the pool is exhausted waits here.
        let permit = tokio::select! {
            _ = listener_cancel.cancelled() => break,
            permit = Arc::clone(&pool).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let core = Arc::clone(&core);
        let acceptor = acceptor.clone();
        let worker_cancel = worker_cancel.clone();
        tracker.spawn(async move {
            let _slot = permit;
            let stream = match acceptor {
                Some(acceptor) => match acceptor.accept(stream).await {
                    Ok(tls) => ServerStream::Tls(Box::new(tls)),
                    Err(e) => {
                        debug!("TLS handshake failed from {peer}: {e}");
                        return;
                    }
                },
                None => ServerStream::Plain(stream),
            };
            tokio::select! {
                // Forced termination after the stop grace period: the
                // connection is dropped where it stands.
                _ = worker_cancel.cancelled() => {}
                _ = serve_connection(core, stream, peer) => {}
            }
        });
    }
    // Dropping the listener closes the listening socket.
}

async fn serve_connection(core: Arc<ServerCore>, mut stream: ServerStream, peer: SocketAddr) {
    let parsed = match http1::read_request(&mut stream).await {
        Ok(parsed) => parsed,
        Err(e) => {
            // Client-side problem; recovered locally by releasing the worker.
            debug!("Failed to read request from {peer}: {e}");
            return;
        }
    };

    let request = ServedRequest::new(core.next_request_id(), parsed.method, parsed.path)
        .with_query(parsed.query)
        .with_headers(parsed.headers)
        .with_body(parsed.body);

    let response = core.dispatch(request).await;

    if let Some(fault) = response.fault {
        match fault::inject(fault, &mut stream).await {
            Ok(Teardown::Graceful) => {
                let _ = stream.shutdown().await;
            }
            // Linger is already zeroed; dropping the stream sends the RST.
            Ok(Teardown::Abrupt) => {}
            Err(e) => debug!("Fault injection write failed for {peer}: {e}"),
        }
        return;
    }

    let bytes = http1::encode_response(&response);
    if let Err(e) = stream.write_all(&bytes).await {
        debug!("Failed to write response to {peer}: {e}");
        return;
    }
    let _ = stream.shutdown().await;
}

/// Plain or TLS-wrapped connection. This is the backend's raw-connection
/// adapter: fault bytes written to the TLS variant travel through the TLS
/// layer (the handshake is already complete), while the abort tears down the
/// TCP layer underneath it.
pub enum ServerStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl ServerStream {
    fn tcp(&self) -> &TcpStream {
        match self {
            ServerStream::Plain(stream) => stream,
            ServerStream::Tls(stream) => stream.get_ref().0,
        }
    }
}

impl AsyncRead for ServerStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            ServerStream::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            ServerStream::Tls(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for ServerStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            ServerStream::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            ServerStream::Tls(stream) => Pin::new(stream.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            ServerStream::Plain(stream) => Pin::new(stream).poll_flush(cx),
            ServerStream::Tls(stream) => Pin::new(stream.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            ServerStream::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            ServerStream::Tls(stream) => Pin::new(stream.as_mut()).poll_shutdown(cx),
        }
    }
}

#[async_trait]
impl RawConnection for ServerStream {
    async fn raw_write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.write_all(bytes).await?;
        self.flush().await
    }

    async fn abrupt_close(&mut self) -> io::Result<()> {
        // SO_LINGER(0): closing the socket discards unsent data and sends a
        // RST instead of a FIN.
        socket2::SockRef::from(self.tcp()).set_linger(Some(Duration::from_secs(0)))
    }
}

struct TokioRunningServer {
    http_port: u16,
    https_port: Option<u16>,
    listener_cancel: CancellationToken,
    worker_cancel: CancellationToken,
    tracker: TaskTracker,
    grace_period: Duration,
    stopped: AtomicBool,
    /// Cancelled once shutdown has fully completed; late `stop()` callers
    /// wait on this instead of returning while workers are still draining.
    done: CancellationToken,
}

#[async_trait]
impl RunningServer for TokioRunningServer {
    fn bound_port(&self) -> u16 {
        self.http_port
    }

    fn bound_https_port(&self) -> Option<u16> {
        self.https_port
    }

    async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            // Another caller is (or was) draining; wait for it to finish so
            // every returned `stop()` means the server is actually stopped.
            self.done.cancelled().await;
            return;
        }
        self.listener_cancel.cancel();
        self.tracker.close();
        if tokio::time::timeout(self.grace_period, self.tracker.wait())
            .await
            .is_err()
        {
            info!(
                "Grace period of {:?} elapsed; terminating in-flight workers",
                self.grace_period
            );
            self.worker_cancel.cancel();
            self.tracker.wait().await;
        }
        self.done.cancel();
        info!("Server stopped");
    }
}
