//! Per-client transport session (spec.md §4.6): greeting, optional password
//! authentication, then a steady-state loop interleaving command frames with
//! broadcast event forwarding.
//!
//! Password authentication is handled directly here, not through the command
//! registry (see DESIGN.md): the endpoint's password lives in
//! [`crate::config::TransportConfig`], which `Bot` never sees, so there is
//! nothing for a generic `auth` command handler to check it against. The
//! registry keeps a structural `auth` entry for documentation completeness;
//! this is the only place the check actually runs.

use serde_json::{Value, json};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, split};
use tokio::sync::{mpsc, oneshot};

use crate::bot::BotRequest;
use crate::error::{BotError, IrccdError};
use crate::event::Event;

use super::frame::{FrameError, FrameReader, encode_frame};

/// Drives one client connection end to end. Returns once the client
/// disconnects, a protocol violation closes it, or the bot itself goes away.
pub async fn handle<S>(stream: S, password: Option<String>, tls: bool, requests: mpsc::Sender<BotRequest>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (read_half, mut write_half) = split(stream);
    let mut reader = FrameReader::new(read_half);

    let greeting = json!({
        "program": "irccd",
        "major": env!("CARGO_PKG_VERSION_MAJOR").parse::<u32>().unwrap_or(0),
        "minor": env!("CARGO_PKG_VERSION_MINOR").parse::<u32>().unwrap_or(0),
        "patch": env!("CARGO_PKG_VERSION_PATCH").parse::<u32>().unwrap_or(0),
        "javascript": cfg!(feature = "js"),
        "ssl": tls,
    });

    if write_frame(&mut write_half, &greeting).await.is_err() {
        return;
    }

    if let Some(expected) = password
        && !authenticate(&mut reader, &mut write_half, &expected).await
    {
        return;
    }

    let (watch_tx, mut watch_rx) = mpsc::unbounded_channel::<Event>();

    loop {
        tokio::select! {
            frame = reader.read_frame() => {
                match frame {
                    Ok(frame) => {
                        if !handle_command_frame(frame, &requests, &watch_tx, &mut write_half).await {
                            break;
                        }
                    }
                    Err(FrameError::Eof) => break,
                    Err(FrameError::TooLarge) | Err(FrameError::Invalid(_)) => {
                        let _ = write_frame(&mut write_half, &error_envelope(&BotError::from(IrccdError::InvalidMessage), None)).await;
                        break;
                    }
                    Err(FrameError::Io(_)) => break,
                }
            }
            Some(event) = watch_rx.recv() => {
                let payload = serde_json::to_value(&event).unwrap_or(Value::Null);
                if write_frame(&mut write_half, &payload).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Reads exactly one frame and checks it against `expected` (spec.md §4.6
/// "authentication" lifecycle stage). Any other first message, or a wrong
/// password, is a protocol violation: respond with `invalid_auth` and close.
async fn authenticate<W: AsyncWrite + Unpin>(
    reader: &mut FrameReader<impl AsyncRead + Unpin>,
    write_half: &mut W,
    expected: &str,
) -> bool {
    let Ok(frame) = reader.read_frame().await else { return false };

    let ok = frame.get("command").and_then(Value::as_str) == Some("auth")
        && frame.get("password").and_then(Value::as_str) == Some(expected);

    if !ok {
        let _ = write_frame(write_half, &error_envelope(&BotError::from(IrccdError::InvalidAuth), Some("auth"))).await;
        return false;
    }

    write_frame(write_half, &json!({ "command": "auth" })).await.is_ok()
}

/// Routes one parsed command frame to the bot and writes back its response.
/// Returns `false` when the connection should close.
async fn handle_command_frame<W: AsyncWrite + Unpin>(
    frame: Value,
    requests: &mpsc::Sender<BotRequest>,
    watch_tx: &mpsc::UnboundedSender<Event>,
    write_half: &mut W,
) -> bool {
    let Some(command) = frame.get("command").and_then(Value::as_str).map(String::from) else {
        let _ = write_frame(write_half, &error_envelope(&BotError::from(IrccdError::InvalidMessage), None)).await;
        return false;
    };

    let (respond_tx, respond_rx) = oneshot::channel();
    let request =
        BotRequest::Command { command: command.clone(), body: frame, watch_sender: watch_tx.clone(), respond: respond_tx };

    if requests.send(request).await.is_err() {
        return false;
    }

    match respond_rx.await {
        Ok(Ok(response)) => write_frame(write_half, &response).await.is_ok(),
        Ok(Err(err)) => {
            let closes = err.closes_client();
            let _ = write_frame(write_half, &error_envelope(&err, Some(&command))).await;
            !closes
        }
        Err(_) => false,
    }
}

fn error_envelope(err: &BotError, command: Option<&str>) -> Value {
    json!({
        "command": command,
        "error": err.code(),
        "errorCategory": err.category(),
        "message": err.to_string(),
    })
}

async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, value: &Value) -> std::io::Result<()> {
    writer.write_all(&encode_frame(value)).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_envelope_carries_category_and_code() {
        let err = BotError::from(IrccdError::InvalidAuth);
        let value = error_envelope(&err, Some("auth"));
        assert_eq!(value["error"], 4);
        assert_eq!(value["errorCategory"], "irccd");
    }
}
