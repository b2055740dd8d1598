//! Transport accept loop (spec.md §4.6): accepts connections on every
//! configured endpoint (Unix domain socket, TCP, optionally TLS) and spawns
//! [`super::client::handle`] for each one. Listening itself is plain
//! `tokio::spawn` (every type crossing that boundary — `TcpStream`,
//! `UnixStream`, `mpsc::Sender<BotRequest>` — is `Send`); only the
//! dispatcher's own `Bot::run` loop, which owns `!Send` JS plugin contexts,
//! needs to stay off the multi-threaded executor (see `bin/irccd.rs`).

use std::io;
use std::sync::Arc;

use tokio::net::{TcpListener, UnixListener};
use tokio::sync::mpsc;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tracing::{info, warn};

use crate::bot::BotRequest;
use crate::config::{TransportBind, TransportEndpoint};

use super::client;

/// Binds every configured endpoint and spawns one accept loop per endpoint.
/// Returns as soon as every listener is bound; accepting itself runs in the
/// background for as long as `requests` stays open.
pub async fn spawn_all(endpoints: &[TransportEndpoint], requests: mpsc::Sender<BotRequest>) -> io::Result<()> {
    for endpoint in endpoints {
        spawn_one(endpoint, requests.clone()).await?;
    }
    Ok(())
}

async fn spawn_one(endpoint: &TransportEndpoint, requests: mpsc::Sender<BotRequest>) -> io::Result<()> {
    let tls_acceptor = match &endpoint.tls {
        Some(material) => Some(build_tls_acceptor(&material.cert, &material.key)?),
        None => None,
    };
    let has_tls = tls_acceptor.is_some();
    let password = endpoint.password.clone();

    match &endpoint.bind {
        TransportBind::Unix(path) => {
            let _ = std::fs::remove_file(path);
            let listener = UnixListener::bind(path)?;
            info!(path = %path.display(), "transport listening on unix socket");

            tokio::spawn(async move {
                loop {
                    match listener.accept().await {
                        Ok((stream, _addr)) => {
                            let requests = requests.clone();
                            let password = password.clone();
                            tokio::spawn(async move {
                                client::handle(stream, password, false, requests).await;
                            });
                        }
                        Err(err) => {
                            warn!(error = %err, "unix transport accept failed");
                            break;
                        }
                    }
                }
            });
        }
        TransportBind::Tcp { host, port } => {
            let listener = TcpListener::bind((host.as_str(), *port)).await?;
            info!(host = %host, port = %port, tls = has_tls, "transport listening on tcp socket");

            tokio::spawn(async move {
                loop {
                    match listener.accept().await {
                        Ok((stream, _addr)) => {
                            let requests = requests.clone();
                            let password = password.clone();
                            let acceptor = tls_acceptor.clone();

                            tokio::spawn(async move {
                                match acceptor {
                                    Some(acceptor) => match acceptor.accept(stream).await {
                                        Ok(tls_stream) => {
                                            client::handle(tls_stream, password, true, requests).await;
                                        }
                                        Err(err) => warn!(error = %err, "tls handshake failed"),
                                    },
                                    None => client::handle(stream, password, false, requests).await,
                                }
                            });
                        }
                        Err(err) => {
                            warn!(error = %err, "tcp transport accept failed");
                            break;
                        }
                    }
                }
            });
        }
    }

    Ok(())
}

fn build_tls_acceptor(cert_path: &std::path::Path, key_path: &std::path::Path) -> io::Result<TlsAcceptor> {
    let certs = load_certs(cert_path)?;
    let key = load_key(key_path)?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn load_certs(path: &std::path::Path) -> io::Result<Vec<CertificateDer<'static>>> {
    let bytes = std::fs::read(path)?;
    rustls_pemfile::certs(&mut bytes.as_slice()).collect::<Result<Vec<_>, _>>()
}

fn load_key(path: &std::path::Path) -> io::Result<PrivateKeyDer<'static>> {
    let bytes = std::fs::read(path)?;
    rustls_pemfile::private_key(&mut bytes.as_slice())?
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no private key found in file"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportBind;

    #[tokio::test]
    async fn binds_a_unix_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("irccd.sock");
        let endpoint =
            TransportEndpoint { bind: TransportBind::Unix(path.clone()), password: None, tls: None };
        let (tx, _rx) = mpsc::channel(1);

        spawn_all(std::slice::from_ref(&endpoint), tx).await.unwrap();
        assert!(path.exists());
    }
}
