use crate::session::{EventSink, LiveMessage, RemoteSignal};
use crate::types::{ClientMessagePayload, ServerMessage};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, trace, warn};

pub(crate) type LiveSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Owns the socket for the lifetime of the session: writes queued payloads,
/// translates server frames into signals on `sink`, and exits on shutdown,
/// close, or the first transport error.
pub(crate) fn spawn_processing_task(
    ws_stream: LiveSocket,
    sink: EventSink,
    mut shutdown_rx: oneshot::Receiver<()>,
    mut outgoing_receiver: mpsc::Receiver<ClientMessagePayload>,
) {
    tokio::spawn(async move {
        let (mut ws_sink, mut ws_source) = ws_stream.split();
        info!("[LiveConnection] Processing task started.");

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown_rx => {
                    info!("[LiveConnection] Shutdown requested.");
                    if let Err(e) = ws_sink.send(Message::Close(None)).await {
                        debug!("[LiveConnection] Close frame not sent: {}", e);
                    }
                    break;
                }

                maybe_payload = outgoing_receiver.recv() => {
                    let Some(payload) = maybe_payload else {
                        info!("[LiveConnection] Outgoing channel closed, ending session.");
                        let _ = ws_sink.send(Message::Close(None)).await;
                        break;
                    };
                    let json = match serde_json::to_string(&payload) {
                        Ok(json) => json,
                        Err(e) => {
                            error!("[LiveConnection] Failed to serialize payload: {}", e);
                            continue;
                        }
                    };
                    trace!("[LiveConnection] Sending {} bytes.", json.len());
                    if let Err(e) = ws_sink.send(Message::Text(json.into())).await {
                        error!("[LiveConnection] WebSocket send failed: {}", e);
                        sink.remote(RemoteSignal::Error(e.to_string()));
                        break;
                    }
                }

                incoming = ws_source.next() => match incoming {
                    Some(Ok(Message::Text(text))) => dispatch_json(text.as_str(), &sink),
                    Some(Ok(Message::Binary(bytes))) => {
                        // The service sends JSON in binary frames too.
                        match std::str::from_utf8(&bytes) {
                            Ok(text) if text.trim_start().starts_with('{') => dispatch_json(text, &sink),
                            _ => trace!("[LiveConnection] Ignoring {} byte non-JSON binary frame.", bytes.len()),
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!("[LiveConnection] Server closed the session: {:?}", frame);
                        let reason = frame
                            .filter(|f| !f.reason.is_empty())
                            .map(|f| format!("{} (code {})", f.reason.as_str(), u16::from(f.code)));
                        sink.remote(RemoteSignal::Close(reason));
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!("[LiveConnection] WebSocket error: {}", e);
                        sink.remote(RemoteSignal::Error(e.to_string()));
                        break;
                    }
                    None => {
                        info!("[LiveConnection] Stream ended.");
                        sink.remote(RemoteSignal::Close(None));
                        break;
                    }
                },
            }

            if sink.is_closed() {
                debug!("[LiveConnection] Session went away, stopping.");
                break;
            }
        }
        info!("[LiveConnection] Processing task finished.");
    });
}

fn dispatch_json(text: &str, sink: &EventSink) {
    match serde_json::from_str::<ServerMessage>(text) {
        Ok(message) => {
            for signal in translate_server_message(message) {
                sink.remote(signal);
            }
        }
        Err(e) => {
            warn!("[LiveConnection] Unparseable server message: {}", e);
            sink.remote(RemoteSignal::Error(format!(
                "Failed to parse server message: {}",
                e
            )));
        }
    }
}

/// One server message can carry several signals.
pub(crate) fn translate_server_message(message: ServerMessage) -> Vec<RemoteSignal> {
    let mut signals = Vec::new();

    if message.setup_complete.is_some() {
        info!("[LiveConnection] Setup complete.");
        signals.push(RemoteSignal::Open);
    }

    if let Some(content) = message.server_content {
        let audio = content
            .model_turn
            .map(|turn| {
                turn.parts
                    .into_iter()
                    .filter_map(|part| part.inline_data)
                    .filter(|blob| blob.mime_type.starts_with("audio/"))
                    .map(|blob| blob.data)
                    .collect()
            })
            .unwrap_or_default();
        let live = LiveMessage {
            audio,
            interrupted: content.interrupted,
            input_transcript: content.input_transcription.and_then(|t| t.text),
            output_transcript: content.output_transcription.and_then(|t| t.text),
            turn_complete: content.turn_complete,
        };
        if !live.is_empty() {
            signals.push(RemoteSignal::Message(live));
        }
    }

    if let Some(go_away) = message.go_away {
        warn!(
            "[LiveConnection] Server will disconnect soon (time left: {:?}).",
            go_away.time_left
        );
    }

    if let Some(usage) = message.usage_metadata {
        trace!("[LiveConnection] Usage: {:?}", usage);
    }

    if let Some(err) = message.error {
        signals.push(RemoteSignal::Error(err.to_string()));
    }

    signals
}
