//! Spoken practice with the tutor through the default microphone and speakers.
//!
//! Requires `GEMINI_API_KEY` (a `.env` file works). Optional arguments:
//! personality (friendly|strict|creative|caring|rude) and scenario
//! (casual|interview|hotel|coffee|<any custom description>).
//!
//! cargo run --example speaking_room --features cpal-devices -- caring hotel

use std::env;
use tracing::{error, info, warn};
use tutor_live::device::CpalBackend;
use tutor_live::{
    ContentClient, GeminiLiveConnector, InstructionProfile, Level, LiveAudioSession, Personality,
    Scenario, SessionState, Speaker, SpeechCache, TranscriptEntry, TutorConfig,
};

fn parse_personality(raw: Option<&str>) -> Personality {
    match raw.map(str::to_lowercase).as_deref() {
        Some("strict") => Personality::Strict,
        Some("creative") => Personality::Creative,
        Some("caring") => Personality::Caring,
        Some("rude") => Personality::Rude,
        _ => Personality::Friendly,
    }
}

fn parse_scenario(raw: Option<&str>) -> Scenario {
    match raw {
        None | Some("casual") => Scenario::Casual,
        Some("interview") => Scenario::Interview,
        Some("hotel") => Scenario::Hotel,
        Some("coffee") => Scenario::Coffee,
        Some(custom) => Scenario::Custom(custom.to_string()),
    }
}

/// Entries of `current` that were not on screen yet. The window slides, so
/// match the longest tail of `previous` that `current` starts with.
fn fresh_entries<'a>(
    previous: &[TranscriptEntry],
    current: &'a [TranscriptEntry],
) -> &'a [TranscriptEntry] {
    for skip in 0..=previous.len() {
        let tail = &previous[skip..];
        if current.starts_with(tail) {
            return &current[tail.len()..];
        }
    }
    current
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = TutorConfig::from_env()?;
    let args: Vec<String> = env::args().skip(1).collect();
    let profile = InstructionProfile::new(
        parse_personality(args.first().map(String::as_str)),
        Level::Intermediate,
        parse_scenario(args.get(1).map(String::as_str)),
    );
    info!("[Main] {}", profile.system_instruction());

    // Warm up pronunciations of the practice words while we are at it.
    let content = ContentClient::new(config.clone())?;
    let mut pronunciations = SpeechCache::new();
    let warmed = pronunciations
        .prefetch(&profile.vocabulary, |word| {
            let content = &content;
            async move { content.text_to_speech(&word).await }
        })
        .await;
    info!("[Main] {} pronunciation(s) cached.", warmed);

    let mut session = LiveAudioSession::new(CpalBackend::new(), GeminiLiveConnector::new(config));
    if let Err(e) = session.start(&profile).await {
        error!("[Main] {}", session.last_error().unwrap_or("start failed"));
        return Err(e.into());
    }
    info!("[Main] Connecting... speak once the session is active. Ctrl+C to exit.");

    let mut shown: Vec<TranscriptEntry> = Vec::new();
    loop {
        tokio::select! {
            _ = session.process_next() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("[Main] Ctrl+C. Shutting down...");
                session.stop();
                break;
            }
        }

        let transcript = session.transcript();
        for entry in fresh_entries(&shown, &transcript) {
            let who = match entry.speaker {
                Speaker::Learner => "You",
                Speaker::Tutor => "Tutor",
            };
            println!("{}: {}", who, entry.text);
        }
        shown = transcript;

        match session.state() {
            SessionState::Errored => {
                warn!("[Main] {}", session.last_error().unwrap_or("session failed"));
                break;
            }
            SessionState::Idle => break,
            _ => {}
        }
    }

    let stats = session.stats();
    info!(
        "[Main] Sent {} frame(s), dropped {}, played {} chunk(s), {} interruption(s).",
        stats.frames_sent, stats.frames_dropped, stats.chunks_scheduled, stats.interruptions
    );
    Ok(())
}
