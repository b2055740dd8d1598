//! Per-server connection task (spec.md §4.2): TCP/TLS connect, registration,
//! PING/PONG discipline, outbound flood protection, and reconnect backoff.
//! Generalized from the teacher's websocket `Client` (`src/socket/client.rs`)
//! — same split-reader/writer-task shape, but over raw TCP/TLS instead of a
//! websocket, and posting to the dispatcher through an `mpsc` channel instead
//! of `println!`.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::irc::{IrcMessage, parse_line};

use super::state::State;

/// Messages posted from a server's connection task to the dispatcher.
#[derive(Debug)]
pub enum ServerInbound {
    StateChanged { server: String, state: State },
    Message { server: String, message: IrcMessage },
}

/// Messages posted from the dispatcher (via the plugin façade or a
/// `server-*` command) to a server's connection task.
#[derive(Debug, Clone)]
pub enum ServerOutbound {
    Raw(String),
    Disconnect,
}

/// Handle a dispatcher holds for one running server task.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    pub id: String,
    outbound: mpsc::Sender<ServerOutbound>,
    pub cancel: CancellationToken,
}

impl ServerHandle {
    pub async fn send_raw(&self, line: impl Into<String>) -> Result<(), mpsc::error::SendError<ServerOutbound>> {
        self.outbound.send(ServerOutbound::Raw(line.into())).await
    }

    /// Non-blocking send, used by the plugin façade (spec.md §4.3):
    /// plugin handlers run on the main loop and must not await mid-call.
    pub fn try_send_raw(&self, line: impl Into<String>) -> Result<(), mpsc::error::TrySendError<ServerOutbound>> {
        self.outbound.try_send(ServerOutbound::Raw(line.into()))
    }

    pub fn disconnect(&self) {
        self.cancel.cancel();
    }
}

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const PING_INTERVAL: Duration = Duration::from_secs(90);
const DEAD_WINDOW: Duration = Duration::from_secs(180);
const RECONNECT_JITTER_MS: u64 = 2_000;

/// Spawns the task driving one server's full lifecycle, looping through
/// `connecting -> (tls_handshaking ->) identifying -> connected ->
/// waiting_to_reconnect -> connecting` until `reconnect_tries` is exhausted
/// or the handle is cancelled.
pub fn spawn(config: ServerConfig, inbound: mpsc::Sender<ServerInbound>) -> ServerHandle {
    let (outbound_tx, outbound_rx) = mpsc::channel(64);
    let cancel = CancellationToken::new();
    let handle = ServerHandle { id: config.id.clone(), outbound: outbound_tx, cancel: cancel.clone() };

    tokio::spawn(run(config, inbound, outbound_rx, cancel));

    handle
}

async fn run(
    config: ServerConfig,
    inbound: mpsc::Sender<ServerInbound>,
    mut outbound_rx: mpsc::Receiver<ServerOutbound>,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            report_state(&inbound, &config.id, State::Stopped).await;
            return;
        }

        report_state(&inbound, &config.id, State::Connecting).await;

        let connect = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                report_state(&inbound, &config.id, State::Stopped).await;
                return;
            }
            result = tokio::time::timeout(CONNECT_TIMEOUT, connect_stream(&config, &inbound)) => result,
        };

        let stream = match connect {
            Ok(Ok(stream)) => stream,
            Ok(Err(err)) => {
                warn!(server = %config.id, error = %err, "connect failed");
                if !wait_to_reconnect(&config, &inbound, &cancel, &mut attempt).await {
                    return;
                }
                continue;
            }
            Err(_) => {
                warn!(server = %config.id, "connect timed out");
                if !wait_to_reconnect(&config, &inbound, &cancel, &mut attempt).await {
                    return;
                }
                continue;
            }
        };

        attempt = 0;
        report_state(&inbound, &config.id, State::Identifying).await;

        match session(&config, stream, &inbound, &mut outbound_rx, &cancel).await {
            SessionEnd::Cancelled => {
                report_state(&inbound, &config.id, State::Stopped).await;
                return;
            }
            SessionEnd::Error(err) => {
                warn!(server = %config.id, error = %err, "connection lost");
            }
        }

        if !wait_to_reconnect(&config, &inbound, &cancel, &mut attempt).await {
            return;
        }
    }
}

enum Stream {
    Plain(TcpStream),
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

async fn connect_stream(config: &ServerConfig, inbound: &mpsc::Sender<ServerInbound>) -> io::Result<Stream> {
    let tcp = TcpStream::connect((config.hostname.as_str(), config.port)).await?;
    tcp.set_nodelay(true).ok();

    if !config.tls {
        return Ok(Stream::Plain(tcp));
    }

    report_state(inbound, &config.id, State::TlsHandshaking).await;

    let connector = build_tls_connector(config.tls_verify);
    let server_name = tokio_rustls::rustls::pki_types::ServerName::try_from(config.hostname.clone())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let tls = connector.connect(server_name, tcp).await?;
    Ok(Stream::Tls(Box::new(tls)))
}

fn build_tls_connector(verify: bool) -> TlsConnector {
    let mut roots = RootCertStore::empty();
    if let Ok(native) = rustls_native_certs::load_native_certs().certs.into_iter().try_fold(
        RootCertStore::empty(),
        |mut acc, cert| {
            acc.add(cert).map_err(|e| io::Error::other(e.to_string()))?;
            Ok::<_, io::Error>(acc)
        },
    ) {
        roots = native;
    } else {
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }

    let mut tls_config =
        ClientConfig::builder().with_root_certificates(roots).with_no_client_auth();

    if !verify {
        tls_config.dangerous().set_certificate_verifier(Arc::new(NoVerify));
    }

    TlsConnector::from(Arc::new(tls_config))
}

/// `sslVerify=false` escape hatch for self-signed networks (spec.md §6
/// `server-connect`'s `sslVerify?` field).
#[derive(Debug)]
struct NoVerify;

impl tokio_rustls::rustls::client::danger::ServerCertVerifier for NoVerify {
    fn verify_server_cert(
        &self,
        _end_entity: &tokio_rustls::rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[tokio_rustls::rustls::pki_types::CertificateDer<'_>],
        _server_name: &tokio_rustls::rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: tokio_rustls::rustls::pki_types::UnixTime,
    ) -> Result<tokio_rustls::rustls::client::danger::ServerCertVerified, tokio_rustls::rustls::Error> {
        Ok(tokio_rustls::rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &tokio_rustls::rustls::pki_types::CertificateDer<'_>,
        _dss: &tokio_rustls::rustls::DigitallySignedStruct,
    ) -> Result<tokio_rustls::rustls::client::danger::HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        Ok(tokio_rustls::rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &tokio_rustls::rustls::pki_types::CertificateDer<'_>,
        _dss: &tokio_rustls::rustls::DigitallySignedStruct,
    ) -> Result<tokio_rustls::rustls::client::danger::HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        Ok(tokio_rustls::rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<tokio_rustls::rustls::SignatureScheme> {
        vec![
            tokio_rustls::rustls::SignatureScheme::RSA_PKCS1_SHA256,
            tokio_rustls::rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            tokio_rustls::rustls::SignatureScheme::ED25519,
        ]
    }
}

enum SessionEnd {
    Cancelled,
    Error(io::Error),
}

async fn session(
    config: &ServerConfig,
    stream: Stream,
    inbound: &mpsc::Sender<ServerInbound>,
    outbound_rx: &mut mpsc::Receiver<ServerOutbound>,
    cancel: &CancellationToken,
) -> SessionEnd {
    let (read_half, mut write_half): (Box<dyn tokio::io::AsyncRead + Send + Unpin>, Box<dyn tokio::io::AsyncWrite + Send + Unpin>) =
        match stream {
            Stream::Plain(tcp) => {
                let (r, w) = tcp.into_split();
                (Box::new(r), Box::new(w))
            }
            Stream::Tls(tls) => {
                let (r, w) = tokio::io::split(*tls);
                (Box::new(r), Box::new(w))
            }
        };

    if let Some(password) = &config.password {
        if write_line(&mut write_half, &format!("PASS {password}")).await.is_err() {
            return SessionEnd::Error(io::Error::other("write failed during registration"));
        }
    }
    if write_line(&mut write_half, &format!("NICK {}", config.nickname)).await.is_err()
        || write_line(&mut write_half, &format!("USER {} 8 * :{}", config.username, config.realname)).await.is_err()
    {
        return SessionEnd::Error(io::Error::other("write failed during registration"));
    }

    let bucket = Arc::new(
        leaky_bucket::RateLimiter::builder()
            .initial(1)
            .max(4)
            .interval(Duration::from_millis(config.flood_delay_ms.max(1)))
            .build(),
    );

    let mut reader = BufReader::new(read_half);
    let mut line = String::new();
    let mut nick_attempts = 0u8;
    let mut last_traffic = tokio::time::Instant::now();
    let mut ping_timer = tokio::time::interval(PING_INTERVAL);

    loop {
        line.clear();

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return SessionEnd::Cancelled,

            _ = ping_timer.tick() => {
                if last_traffic.elapsed() > DEAD_WINDOW {
                    return SessionEnd::Error(io::Error::new(io::ErrorKind::TimedOut, "ping timeout"));
                }
                if write_line(&mut write_half, &format!("PING :{}", config.hostname)).await.is_err() {
                    return SessionEnd::Error(io::Error::other("ping write failed"));
                }
            }

            outbound = outbound_rx.recv() => {
                match outbound {
                    Some(ServerOutbound::Raw(raw)) => {
                        bucket.acquire_one().await;
                        if write_line(&mut write_half, &raw).await.is_err() {
                            return SessionEnd::Error(io::Error::other("write failed"));
                        }
                    }
                    Some(ServerOutbound::Disconnect) | None => return SessionEnd::Cancelled,
                }
            }

            read = reader.read_line(&mut line) => {
                match read {
                    Ok(0) => return SessionEnd::Error(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed")),
                    Ok(_) => {
                        last_traffic = tokio::time::Instant::now();

                        let Ok(message) = parse_line(&line) else {
                            debug!(server = %config.id, raw = %line.trim_end(), "dropping unparsable line");
                            continue;
                        };

                        match message.command.as_str() {
                            "PING" => {
                                let reply = message.trailing().unwrap_or_default();
                                if write_line(&mut write_half, &format!("PONG :{reply}")).await.is_err() {
                                    return SessionEnd::Error(io::Error::other("pong write failed"));
                                }
                            }
                            "001" => {
                                let _ = inbound
                                    .send(ServerInbound::StateChanged { server: config.id.clone(), state: State::Connected })
                                    .await;
                                info!(server = %config.id, "registration complete");
                                for channel in &config.channels {
                                    let line = match &channel.key {
                                        Some(key) => format!("JOIN {} {key}", channel.name),
                                        None => format!("JOIN {}", channel.name),
                                    };
                                    if write_line(&mut write_half, &line).await.is_err() {
                                        return SessionEnd::Error(io::Error::other("join write failed"));
                                    }
                                }
                            }
                            "433" if nick_attempts < 9 => {
                                nick_attempts += 1;
                                let retry = format!("{}{}", config.nickname, "_".repeat(nick_attempts as usize));
                                if write_line(&mut write_half, &format!("NICK {retry}")).await.is_err() {
                                    return SessionEnd::Error(io::Error::other("nick retry write failed"));
                                }
                            }
                            "433" => {
                                return SessionEnd::Error(io::Error::other("nickname in use, exhausted retries"));
                            }
                            "ERROR" => {
                                return SessionEnd::Error(io::Error::other(
                                    message.trailing().unwrap_or("server sent ERROR").to_string(),
                                ));
                            }
                            _ => {}
                        }

                        if inbound
                            .send(ServerInbound::Message { server: config.id.clone(), message })
                            .await
                            .is_err()
                        {
                            return SessionEnd::Cancelled;
                        }
                    }
                    Err(err) => return SessionEnd::Error(err),
                }
            }
        }
    }
}

async fn write_line(writer: &mut (dyn tokio::io::AsyncWrite + Send + Unpin), line: &str) -> io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\r\n").await?;
    writer.flush().await
}

async fn report_state(inbound: &mpsc::Sender<ServerInbound>, server: &str, state: State) {
    let _ = inbound.send(ServerInbound::StateChanged { server: server.to_string(), state }).await;
}

/// Waits `reconnect_delay` seconds (plus bounded jitter — a deliberate
/// addition over the source per spec.md §9, which never applies jitter; the
/// default delay value itself is unchanged) before the next connect attempt.
/// Returns `false` once `reconnect_tries` is exhausted or the handle was
/// cancelled mid-wait.
async fn wait_to_reconnect(
    config: &ServerConfig,
    inbound: &mpsc::Sender<ServerInbound>,
    cancel: &CancellationToken,
    attempt: &mut u32,
) -> bool {
    *attempt += 1;
    if config.reconnect_tries >= 0 && *attempt > config.reconnect_tries as u32 {
        report_state(inbound, &config.id, State::Stopped).await;
        return false;
    }

    report_state(inbound, &config.id, State::WaitingToReconnect).await;

    let jitter_ms = rand::rng().random_range(0..=RECONNECT_JITTER_MS);
    let delay = Duration::from_secs(config.reconnect_delay) + Duration::from_millis(jitter_ms);

    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
