use super::EventSink;
use crate::codec::EncodedPacket;
use crate::error::Result;
use crate::profile::InstructionProfile;
use std::future::Future;

/// An open conversational session on the remote service.
pub trait RemoteSession {
    /// Best-effort, non-blocking. An `Err` means the packet was dropped.
    fn send_audio(&self, packet: EncodedPacket) -> Result<()>;

    /// Ends the session. Calling it more than once is harmless.
    fn close(&mut self);
}

/// Opens remote sessions. Open, message, error and close signals for the
/// session are delivered through `sink`.
pub trait LiveConnector {
    type Session: RemoteSession;

    fn connect(
        &self,
        profile: &InstructionProfile,
        sink: EventSink,
    ) -> impl Future<Output = Result<Self::Session>>;
}
