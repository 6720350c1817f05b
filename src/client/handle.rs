use crate::codec::EncodedPacket;
use crate::error::{Result, TutorError};
use crate::session::RemoteSession;
use crate::types::{
    BidiGenerateContentClientContent, BidiGenerateContentRealtimeInput, Blob,
    ClientMessagePayload, Content,
};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, trace, warn};

/// Caller side of an open live session. Dropping it shuts the connection
/// task down.
#[derive(Debug)]
pub struct GeminiLiveHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    outgoing_sender: Option<mpsc::Sender<ClientMessagePayload>>,
}

impl GeminiLiveHandle {
    pub(crate) fn new(
        shutdown_tx: oneshot::Sender<()>,
        outgoing_sender: mpsc::Sender<ClientMessagePayload>,
    ) -> Self {
        Self {
            shutdown_tx: Some(shutdown_tx),
            outgoing_sender: Some(outgoing_sender),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.outgoing_sender
            .as_ref()
            .is_none_or(|sender| sender.is_closed())
    }

    /// Queues a payload without waiting. A full queue drops the payload.
    pub fn try_send(&self, payload: ClientMessagePayload) -> Result<()> {
        let sender = self.outgoing_sender.as_ref().ok_or(TutorError::NotReady)?;
        match sender.try_send(payload) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                trace!("[ClientHandle] Outgoing queue full, dropping payload.");
                Err(TutorError::DroppedFrame)
            }
            Err(TrySendError::Closed(_)) => {
                trace!("[ClientHandle] Connection task gone, dropping payload.");
                Err(TutorError::SendError)
            }
        }
    }

    pub fn send_audio_packet(&self, packet: EncodedPacket) -> Result<()> {
        self.try_send(ClientMessagePayload::RealtimeInput(
            BidiGenerateContentRealtimeInput {
                audio: Some(Blob {
                    mime_type: packet.mime_type,
                    data: packet.data,
                }),
                ..Default::default()
            },
        ))
    }

    pub fn send_text_turn(&self, text: impl Into<String>, end_of_turn: bool) -> Result<()> {
        self.try_send(ClientMessagePayload::ClientContent(
            BidiGenerateContentClientContent {
                turns: Some(vec![Content::user_text(text)]),
                turn_complete: Some(end_of_turn),
            },
        ))
    }

    pub fn send_audio_stream_end(&self) -> Result<()> {
        info!("[ClientHandle] Sending audio stream end signal.");
        self.try_send(ClientMessagePayload::RealtimeInput(
            BidiGenerateContentRealtimeInput {
                audio_stream_end: Some(true),
                ..Default::default()
            },
        ))
    }

    pub fn close(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            if tx.send(()).is_err() {
                info!("[ClientHandle] Shutdown signal failed: connection task already gone.");
            } else {
                info!("[ClientHandle] Shutdown signal sent to connection task.");
            }
        }
        self.outgoing_sender.take();
    }
}

impl RemoteSession for GeminiLiveHandle {
    fn send_audio(&self, packet: EncodedPacket) -> Result<()> {
        self.send_audio_packet(packet)
    }

    fn close(&mut self) {
        GeminiLiveHandle::close(self);
    }
}

impl Drop for GeminiLiveHandle {
    fn drop(&mut self) {
        if self.shutdown_tx.is_some() {
            warn!("[ClientHandle] Dropped without explicit close(), signalling shutdown.");
            self.close();
        }
    }
}
