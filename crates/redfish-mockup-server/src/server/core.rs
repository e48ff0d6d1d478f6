//! MockServer struct and main run loop.
//!
//! This module holds the shared per-request state, binds the listener, and
//! accepts connections, spawning one task per connection.

use super::handler::handle_request;
use super::tls::create_tls_acceptor;
use crate::config::ServerConfig;
use crate::events::EventDispatcher;
use crate::repository::ResourceRepository;
use crate::timing::ResponseTimer;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{error, info};

/// State shared by every request handler.
pub struct AppState {
    pub config: ServerConfig,
    pub repository: Arc<ResourceRepository>,
    pub dispatcher: EventDispatcher,
    pub timer: ResponseTimer,
}

/// The mockup HTTP server.
pub struct MockServer {
    state: Arc<AppState>,
    listener: TcpListener,
    tls_acceptor: Option<TlsAcceptor>,
}

impl MockServer {
    /// Bind the listener and assemble the request-handling state. The
    /// configured port may be 0, in which case the kernel picks one; see
    /// [`MockServer::local_addr`].
    pub fn bind(config: ServerConfig) -> Result<Self, anyhow::Error> {
        let repository = Arc::new(ResourceRepository::new(config.mock_dir.clone()));
        let dispatcher = EventDispatcher::new(Arc::clone(&repository), config.short_form)?;
        let timer = ResponseTimer::new(config.default_delay_secs, config.per_resource_delay);

        let tls_acceptor = match config.tls {
            Some(ref tls) => Some(create_tls_acceptor(&tls.cert_path, &tls.key_path)?),
            None => None,
        };

        let addr = (config.host.as_str(), config.port)
            .to_socket_addrs()
            .map_err(|e| anyhow::anyhow!("Cannot resolve listen address '{}': {e}", config.host))?
            .next()
            .ok_or_else(|| {
                anyhow::anyhow!("Listen address '{}' resolved to nothing", config.host)
            })?;
        let listener = create_listener(addr)?;

        Ok(Self {
            state: Arc::new(AppState {
                config,
                repository,
                dispatcher,
                timer,
            }),
            listener,
            tls_acceptor,
        })
    }

    /// Address the listener actually bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Resolves the service root document, for SSDP advertisement.
    pub fn repository(&self) -> Arc<ResourceRepository> {
        Arc::clone(&self.state.repository)
    }

    /// Accept connections until the process is stopped.
    pub async fn run(self) -> Result<(), anyhow::Error> {
        let scheme = self.state.config.scheme();
        info!(
            "Serving mockup '{}' on {}://{}",
            self.state.config.mock_dir.display(),
            scheme,
            self.local_addr()?
        );

        loop {
            let (stream, remote_addr) = self.listener.accept().await?;
            let state = Arc::clone(&self.state);
            let tls_acceptor = self.tls_acceptor.clone();

            tokio::spawn(async move {
                match tls_acceptor {
                    Some(acceptor) => {
                        // HTTPS: perform TLS handshake first
                        match acceptor.accept(stream).await {
                            Ok(tls_stream) => {
                                let io = TokioIo::new(tls_stream);
                                let service = service_fn(move |req| {
                                    let state = Arc::clone(&state);
                                    async move { handle_request(state, req).await }
                                });

                                if let Err(err) =
                                    http1::Builder::new().serve_connection(io, service).await
                                {
                                    error!(
                                        "Error serving HTTPS connection from {}: {}",
                                        remote_addr, err
                                    );
                                }
                            }
                            Err(err) => {
                                error!("TLS handshake failed from {}: {}", remote_addr, err);
                            }
                        }
                    }
                    None => {
                        // HTTP: serve directly
                        let io = TokioIo::new(stream);
                        let service = service_fn(move |req| {
                            let state = Arc::clone(&state);
                            async move { handle_request(state, req).await }
                        });

                        if let Err(err) = http1::Builder::new().serve_connection(io, service).await
                        {
                            error!(
                                "Error serving HTTP connection from {}: {}",
                                remote_addr, err
                            );
                        }
                    }
                }
            });
        }
    }
}

/// Create the TCP listener with address reuse enabled, so quick restarts do
/// not trip over sockets in TIME_WAIT.
fn create_listener(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?; // Backlog size

    // Convert to tokio TcpListener
    let std_listener: std::net::TcpListener = socket.into();
    TcpListener::from_std(std_listener)
}
