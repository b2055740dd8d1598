//! Control-transport client (spec.md §4.6/§6): the dial/greet/auth/exchange
//! logic shared by `irccdctl` and anything else that wants to drive a
//! running bot from outside its process.
//!
//! Speaks the same `\r\n\r\n`-framed JSON protocol [`crate::transport`]
//! implements server-side. Grounded on the teacher's connect-then-loop shape
//! (`examples/plsuwu-pea-fan/src/socket/client.rs`), turned inside out into a
//! one-shot request/response client instead of a long-lived reader: a CLI
//! invocation dials once, sends one command, and prints one response (or, for
//! `watch`, keeps reading broadcast frames until killed).
//!
//! The original `irccdctl` (`examples/original_source/irccdctl/irccdctl.c`)
//! speaks a plaintext newline-delimited protocol with a `"IRCCD %d.%d.%d"`
//! greeting; that wire format is superseded here by spec.md's JSON/`\r\n\r\n`
//! framing; only the C source's subcommand/flag/exit-code shape is carried
//! forward (see DESIGN.md).

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{Map, Value, json};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf, split};
use tokio::net::{TcpStream, UnixStream};
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};

use crate::transport::frame::{FrameError, FrameReader, encode_frame};

#[derive(Debug, Error)]
pub enum CtlError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("connection closed before a response arrived")]
    Closed,
    #[error("malformed frame: {0}")]
    Frame(#[from] FrameError),
    #[error("server rejected authentication")]
    AuthRejected,
    #[error("{message} (category={category}, code={code})")]
    Remote { category: String, code: i32, message: String },
}

/// Where to dial (spec.md §6 transport endpoint shapes, client side).
#[derive(Debug, Clone)]
pub enum Endpoint {
    Unix(PathBuf),
    Tcp { host: String, port: u16, tls: bool },
}

trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

/// A dialed, greeted (and, if needed, authenticated) connection, ready to
/// exchange command frames one at a time.
pub struct Session {
    reader: FrameReader<ReadHalf<Box<dyn AsyncStream>>>,
    writer: WriteHalf<Box<dyn AsyncStream>>,
    pub greeting: Value,
}

impl Session {
    /// Dials `endpoint`, reads the daemon's greeting, and authenticates with
    /// `password` if the endpoint requires it (spec.md §4.6 lifecycle:
    /// connect -> greeting -> [auth] -> steady state).
    pub async fn connect(endpoint: &Endpoint, password: Option<&str>) -> Result<Session, CtlError> {
        let stream = open(endpoint).await?;
        let (read_half, write_half) = split(stream);
        let mut reader = FrameReader::new(read_half);
        let greeting = reader.read_frame().await.map_err(map_frame_err)?;

        let mut session = Session { reader, writer: write_half, greeting };

        if let Some(password) = password {
            session.write_frame(&json!({ "command": "auth", "password": password })).await?;
            let response = session.reader.read_frame().await.map_err(map_frame_err)?;
            if response.get("error").is_some() {
                return Err(CtlError::AuthRejected);
            }
        }

        Ok(session)
    }

    /// Sends one command frame (`body` plus `"command": name`) and returns
    /// the daemon's response, or the error it carries.
    pub async fn call(&mut self, command: &str, mut body: Map<String, Value>) -> Result<Value, CtlError> {
        body.insert("command".to_string(), Value::String(command.to_string()));
        self.write_frame(&Value::Object(body)).await?;

        let response = self.reader.read_frame().await.map_err(map_frame_err)?;
        match response.get("error").and_then(Value::as_i64) {
            Some(code) => Err(CtlError::Remote {
                category: response.get("errorCategory").and_then(Value::as_str).unwrap_or("").to_string(),
                code: code as i32,
                message: response.get("message").and_then(Value::as_str).unwrap_or("").to_string(),
            }),
            None => Ok(response),
        }
    }

    /// Reads the next frame without sending a command. After `watch`'s
    /// acknowledgement, every subsequent frame on the connection is a
    /// broadcast event rather than a command response (spec.md §6 `watch`).
    pub async fn next_event(&mut self) -> Result<Value, CtlError> {
        self.reader.read_frame().await.map_err(map_frame_err)
    }

    async fn write_frame(&mut self, value: &Value) -> Result<(), CtlError> {
        self.writer.write_all(&encode_frame(value)).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

fn map_frame_err(err: FrameError) -> CtlError {
    match err {
        FrameError::Eof => CtlError::Closed,
        other => CtlError::Frame(other),
    }
}

async fn open(endpoint: &Endpoint) -> Result<Box<dyn AsyncStream>, CtlError> {
    match endpoint {
        Endpoint::Unix(path) => Ok(Box::new(UnixStream::connect(path).await?)),
        Endpoint::Tcp { host, port, tls } => {
            let tcp = TcpStream::connect((host.as_str(), *port)).await?;
            tcp.set_nodelay(true).ok();

            if !tls {
                return Ok(Box::new(tcp));
            }

            let connector = build_tls_connector();
            let server_name = tokio_rustls::rustls::pki_types::ServerName::try_from(host.clone())
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
            Ok(Box::new(connector.connect(server_name, tcp).await?))
        }
    }
}

/// Client-side TLS trust: native roots, falling back to the bundled Mozilla
/// set, matching `server::conn`'s outbound-connection trust policy. Unlike
/// the daemon's `server-connect sslVerify` escape hatch, `irccdctl` never
/// disables verification — it talks to a local control socket, not an
/// untrusted IRC network.
fn build_tls_connector() -> TlsConnector {
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

    let tls_config = ClientConfig::builder().with_root_certificates(roots).with_no_client_auth();
    TlsConnector::from(Arc::new(tls_config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_error_display_carries_message() {
        let err = CtlError::Remote { category: "irccd".into(), code: 4, message: "invalid authentication".into() };
        assert!(err.to_string().contains("invalid authentication"));
    }
}
