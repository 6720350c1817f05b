use std::cell::RefCell;
use std::rc::Rc;
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio::net::TcpListener;
use tutor_live::codec::{self, AudioBuffer, EncodedPacket};
use tutor_live::device::{AudioBackend, CaptureDevice, OutputDevice};
use tutor_live::session::{
    EventSink, LiveConnector, LiveMessage, PlaybackId, RemoteSession, RemoteSignal,
    START_FAILED_MESSAGE,
};
use tutor_live::{
    AudioFrame, GeminiLiveConnector, InstructionProfile, LiveAudioSession, Personality, Result,
    Scenario, SessionState, Speaker, TutorConfig, TutorError,
};

fn init_logger() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Everything the fake devices and remote saw, shared with the test body.
#[derive(Default)]
struct Rig {
    device_time: f64,
    capture_sink: Option<EventSink>,
    output_sink: Option<EventSink>,
    remote_sink: Option<EventSink>,
    capture_running: bool,
    capture_released: usize,
    output_released: usize,
    remote_released: usize,
    scheduled: Vec<(PlaybackId, f64, f64)>,
    stopped: Vec<PlaybackId>,
    sent: Vec<EncodedPacket>,
    instruction: Option<String>,
}

type SharedRig = Rc<RefCell<Rig>>;

struct Mic(SharedRig);

impl CaptureDevice for Mic {
    fn begin(&mut self) -> Result<()> {
        self.0.borrow_mut().capture_running = true;
        Ok(())
    }

    fn stop(&mut self) {
        let mut rig = self.0.borrow_mut();
        rig.capture_running = false;
        rig.capture_released += 1;
    }
}

struct Speakers(SharedRig);

impl OutputDevice for Speakers {
    fn current_time(&self) -> f64 {
        self.0.borrow().device_time
    }

    fn play_at(&mut self, id: PlaybackId, buffer: Arc<AudioBuffer>, start_at: f64) -> Result<()> {
        self.0
            .borrow_mut()
            .scheduled
            .push((id, start_at, buffer.duration()));
        Ok(())
    }

    fn stop(&mut self, id: PlaybackId) {
        self.0.borrow_mut().stopped.push(id);
    }

    fn close(&mut self) {
        self.0.borrow_mut().output_released += 1;
    }
}

struct FakeBackend(SharedRig);

impl AudioBackend for FakeBackend {
    type Capture = Mic;
    type Output = Speakers;

    fn open_capture(&self, sample_rate: u32, channels: u16, sink: EventSink) -> Result<Mic> {
        assert_eq!((sample_rate, channels), (16000, 1));
        self.0.borrow_mut().capture_sink = Some(sink);
        Ok(Mic(self.0.clone()))
    }

    fn open_output(&self, sample_rate: u32, channels: u16, sink: EventSink) -> Result<Speakers> {
        assert_eq!((sample_rate, channels), (24000, 1));
        self.0.borrow_mut().output_sink = Some(sink);
        Ok(Speakers(self.0.clone()))
    }
}

struct FakeRemote(SharedRig);

impl RemoteSession for FakeRemote {
    fn send_audio(&self, packet: EncodedPacket) -> Result<()> {
        self.0.borrow_mut().sent.push(packet);
        Ok(())
    }

    fn close(&mut self) {
        self.0.borrow_mut().remote_released += 1;
    }
}

struct FakeConnector(SharedRig);

impl LiveConnector for FakeConnector {
    type Session = FakeRemote;

    async fn connect(&self, profile: &InstructionProfile, sink: EventSink) -> Result<FakeRemote> {
        let mut rig = self.0.borrow_mut();
        rig.instruction = Some(profile.system_instruction());
        rig.remote_sink = Some(sink);
        Ok(FakeRemote(self.0.clone()))
    }
}

fn rig_sink(rig: &SharedRig, pick: fn(&Rig) -> Option<EventSink>) -> EventSink {
    pick(&rig.borrow()).expect("sink registered")
}

#[tokio::test]
async fn speaking_session_end_to_end() {
    init_logger();
    let rig = SharedRig::default();
    let mut session =
        LiveAudioSession::new(FakeBackend(rig.clone()), FakeConnector(rig.clone()));
    let profile = InstructionProfile::new(
        Personality::Friendly,
        Default::default(),
        Scenario::Coffee,
    );

    session.start(&profile).await.unwrap();
    assert_eq!(session.state(), SessionState::Connecting);
    assert!(
        rig.borrow()
            .instruction
            .as_deref()
            .unwrap()
            .contains("Scenario: At the coffee shop")
    );

    let remote = rig_sink(&rig, |r| r.remote_sink.clone());
    remote.remote(RemoteSignal::Open);
    session.drain_pending();
    assert_eq!(session.state(), SessionState::Active);
    assert!(rig.borrow().capture_running);

    // Three capture ticks, no audio back.
    let mic = rig_sink(&rig, |r| r.capture_sink.clone());
    for _ in 0..3 {
        mic.capture(AudioFrame::new(vec![0.25; 4096]));
    }
    session.drain_pending();
    {
        let rig = rig.borrow();
        assert_eq!(rig.sent.len(), 3);
        assert!(rig.sent.iter().all(|p| p.mime_type == "audio/pcm;rate=16000"));
        let bytes = codec::decode_from_transport(&rig.sent[0].data).unwrap();
        assert_eq!(bytes.len(), 4096 * 2);
        assert_eq!(&bytes[..2], &8192i16.to_le_bytes());
    }
    assert!(session.transcript().is_empty());

    // 0.5s of speech arrives while the device clock reads 1.5s.
    rig.borrow_mut().device_time = 1.5;
    remote.remote(RemoteSignal::Message(LiveMessage {
        audio: vec![codec::encode_for_transport(&[1000i16; 12000])],
        output_transcript: Some("What can I get you?".into()),
        ..Default::default()
    }));
    session.drain_pending();
    {
        let rig = rig.borrow();
        assert_eq!(rig.scheduled.len(), 1);
        let (_, start, duration) = rig.scheduled[0];
        assert_eq!(start, 1.5);
        assert!((duration - 0.5).abs() < 1e-9);
    }
    let playback = session.playback().unwrap();
    assert_eq!(playback.active_count(), 1);
    assert!((playback.next_start_time() - 2.0).abs() < 1e-9);

    // Learner talks over the tutor mid-playback.
    rig.borrow_mut().device_time = 1.75;
    remote.remote(RemoteSignal::Message(LiveMessage {
        interrupted: true,
        input_transcript: Some("A flat white, please".into()),
        ..Default::default()
    }));
    session.drain_pending();
    let playback = session.playback().unwrap();
    assert_eq!(playback.active_count(), 0);
    assert_eq!(playback.next_start_time(), 0.0);
    assert_eq!(rig.borrow().stopped.len(), 1);

    let transcript = session.transcript();
    assert_eq!(transcript.len(), 2);
    assert_eq!(transcript[0].speaker, Speaker::Tutor);
    assert_eq!(transcript[1].speaker, Speaker::Learner);
    assert_eq!(transcript[1].text, "A flat white, please");

    // A late ended notification for the cut chunk changes nothing.
    let speakers = rig_sink(&rig, |r| r.output_sink.clone());
    speakers.playback_ended(1);
    session.drain_pending();

    session.stop();
    assert_eq!(session.state(), SessionState::Idle);
    let rig = rig.borrow();
    assert!(!rig.capture_running);
    assert_eq!(rig.capture_released, 1);
    assert_eq!(rig.output_released, 1);
    assert_eq!(rig.remote_released, 1);
    assert_eq!(session.stats().frames_sent, 3);
    assert_eq!(session.stats().interruptions, 1);
}

#[tokio::test]
async fn transcript_keeps_last_eleven_entries() {
    init_logger();
    let rig = SharedRig::default();
    let mut session =
        LiveAudioSession::new(FakeBackend(rig.clone()), FakeConnector(rig.clone()));
    session.start(&InstructionProfile::default()).await.unwrap();
    let remote = rig_sink(&rig, |r| r.remote_sink.clone());
    remote.remote(RemoteSignal::Open);

    for i in 0..15 {
        remote.remote(RemoteSignal::Message(LiveMessage {
            input_transcript: Some(format!("utterance {}", i)),
            ..Default::default()
        }));
    }
    session.drain_pending();

    let texts: Vec<String> = session.transcript().into_iter().map(|e| e.text).collect();
    let expected: Vec<String> = (4..15).map(|i| format!("utterance {}", i)).collect();
    assert_eq!(texts, expected);
}

#[tokio::test]
async fn restart_tears_down_previous_attempt() {
    init_logger();
    let rig = SharedRig::default();
    let mut session =
        LiveAudioSession::new(FakeBackend(rig.clone()), FakeConnector(rig.clone()));

    session.start(&InstructionProfile::default()).await.unwrap();
    let first_remote = rig_sink(&rig, |r| r.remote_sink.clone());
    first_remote.remote(RemoteSignal::Open);
    session.drain_pending();

    session.start(&InstructionProfile::default()).await.unwrap();
    {
        let rig = rig.borrow();
        assert_eq!(rig.capture_released, 1);
        assert_eq!(rig.output_released, 1);
        assert_eq!(rig.remote_released, 1);
    }

    // Audio from the first attempt must not reach the new speakers.
    first_remote.remote(RemoteSignal::Message(LiveMessage::audio(
        codec::encode_for_transport(&[0i16; 2400]),
    )));
    assert_eq!(session.drain_pending(), 0);
    assert!(rig.borrow().scheduled.is_empty());
    assert_eq!(session.state(), SessionState::Connecting);
}

#[tokio::test]
async fn unresponsive_live_server_fails_start() {
    init_logger();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
        drop(stream);
    });

    let rig = SharedRig::default();
    let config = TutorConfig::new("test-key")
        .with_live_endpoint(format!("ws://{}", addr))
        .with_connect_timeout(Duration::from_millis(200));
    let mut session = LiveAudioSession::new(FakeBackend(rig.clone()), GeminiLiveConnector::new(config));

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        session.start(&InstructionProfile::default()),
    )
    .await
    .expect("start must settle on its own");

    assert!(matches!(result, Err(TutorError::Transport(_))));
    assert_eq!(session.state(), SessionState::Errored);
    assert_eq!(session.last_error(), Some(START_FAILED_MESSAGE));
    {
        let rig = rig.borrow();
        assert_eq!(rig.capture_released, 1);
        assert_eq!(rig.output_released, 1);
    }
    server.abort();
}
