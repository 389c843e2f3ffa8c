use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, warn};

use crate::config::types::TlsPaths;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
// completed handshakes waiting for axum to pick them up
const READY_QUEUE: usize = 64;

/// Server TLS config from PEM files. With a CA, client certificates signed
/// by it are verified when presented.
pub fn load_server_config(paths: &TlsPaths) -> Result<Arc<ServerConfig>> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());

    let certs = CertificateDer::pem_file_iter(&paths.cert_path)
        .and_then(|certs| certs.collect::<Result<Vec<_>, _>>())
        .with_context(|| format!("failed to read certificate {}", paths.cert_path.display()))?;
    if certs.is_empty() {
        bail!("no certificate found in {}", paths.cert_path.display());
    }
    let key = PrivateKeyDer::from_pem_file(&paths.key_path)
        .with_context(|| format!("failed to read private key {}", paths.key_path.display()))?;

    let builder = ServerConfig::builder_with_provider(provider.clone()).with_safe_default_protocol_versions()?;
    let builder = match &paths.ca_path {
        Some(ca_path) => {
            let mut roots = RootCertStore::empty();
            for cert in CertificateDer::pem_file_iter(ca_path)
                .with_context(|| format!("failed to read CA certificate {}", ca_path.display()))?
            {
                roots.add(cert?)?;
            }
            let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider)
                .allow_unauthenticated()
                .build()?;
            builder.with_client_cert_verifier(verifier)
        }
        None => builder.with_no_client_auth(),
    };

    let mut config = builder.with_single_cert(certs, key)?;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Ok(Arc::new(config))
}

/// TLS listener for axum.
///
/// A background task accepts TCP connections and runs every handshake in
/// its own task, so a client that never completes its handshake only holds
/// up itself. Finished handshakes are queued for `accept`. Dropping the
/// listener stops the accept task and closes the socket.
pub struct TlsListener {
    local_addr: SocketAddr,
    ready: mpsc::Receiver<(TlsStream<TcpStream>, SocketAddr)>,
    acceptor_task: JoinHandle<()>,
}

impl TlsListener {
    pub fn new(inner: TcpListener, config: Arc<ServerConfig>) -> io::Result<Self> {
        let local_addr = inner.local_addr()?;
        let (tx, ready) = mpsc::channel(READY_QUEUE);
        let acceptor_task = tokio::spawn(accept_connections(inner, TlsAcceptor::from(config), tx));
        Ok(Self { local_addr, ready, acceptor_task })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.local_addr)
    }
}

impl Drop for TlsListener {
    fn drop(&mut self) {
        self.acceptor_task.abort();
    }
}

async fn accept_connections(
    mut inner: TcpListener,
    acceptor: TlsAcceptor,
    ready: mpsc::Sender<(TlsStream<TcpStream>, SocketAddr)>,
) {
    loop {
        let (stream, addr) = axum::serve::Listener::accept(&mut inner).await;
        let acceptor = acceptor.clone();
        let ready = ready.clone();
        tokio::spawn(async move {
            match tokio::time::timeout(HANDSHAKE_TIMEOUT, acceptor.accept(stream)).await {
                Ok(Ok(tls)) => {
                    if ready.send((tls, addr)).await.is_err() {
                        debug!("TLS listener closed, dropping connection from {}", addr);
                    }
                }
                Ok(Err(e)) => warn!("TLS handshake with {} failed: {}", addr, e),
                Err(_) => warn!("TLS handshake with {} timed out", addr),
            }
        });
    }
}

impl axum::serve::Listener for TlsListener {
    type Io = TlsStream<TcpStream>;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        match self.ready.recv().await {
            Some(conn) => conn,
            // the accept task only ends when aborted by Drop
            None => std::future::pending().await,
        }
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        Ok(self.local_addr)
    }
}
