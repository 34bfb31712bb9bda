use anyhow::Result;
use med_interpreter::audio::AudioOutputFactory;
use med_interpreter::services::{HttpChatClient, HttpSpeechClient, HttpTranscriptionClient};
use med_interpreter::{CaptureSource, ClipFormat, Config, PartyRole, SessionCoordinator};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config_path = std::env::args().nth(1);
    let cfg = Config::load(config_path.as_deref())?;

    info!("med-interpreter v0.1.0");
    info!(
        "Languages: provider={}, patient={}",
        cfg.session.provider_language, cfg.session.patient_language
    );
    info!("Service endpoint: {}", cfg.services.base_url);

    let timeout = cfg.request_timeout();
    let transcriber = Arc::new(HttpTranscriptionClient::new(
        &cfg.services.base_url,
        &cfg.services.api_key,
        &cfg.services.transcription.model,
        timeout,
    )?);
    let chat = Arc::new(HttpChatClient::new(
        &cfg.services.base_url,
        &cfg.services.chat.path,
        &cfg.services.api_key,
        timeout,
    )?);
    let speech = Arc::new(HttpSpeechClient::new(
        &cfg.services.base_url,
        &cfg.services.speech.path,
        &cfg.services.api_key,
        &cfg.services.speech.provider,
        &cfg.services.speech.engine,
        timeout,
    )?);
    let output = AudioOutputFactory::create_default()?;

    let session =
        SessionCoordinator::new(transcriber, chat, speech, output, cfg.session_options());
    info!("Session {} ready", session.session_id());

    // Run one provider turn from a recorded file if one is present.
    let fixture = "demos/provider-turn.wav";
    if cfg.services.api_key.is_empty() {
        info!("No API key configured; set MEDBRIDGE_SERVICES__API_KEY to run a live turn");
    } else if std::path::Path::new(fixture).exists() {
        let data = std::fs::read(fixture)?;
        info!("Running a provider turn from {} ({} bytes)", fixture, data.len());

        session
            .start_recording(
                PartyRole::Provider,
                CaptureSource::Buffer {
                    data,
                    format: ClipFormat::wav(),
                },
            )
            .await?;

        if let Some(report) = session.stop_recording(PartyRole::Provider).await? {
            info!("Transcript: {}", report.transcript);
            if let Some(translation) = &report.translation {
                info!("Translation: {}", translation);
                if cfg.session.speak_translations {
                    session.speak(PartyRole::Patient).await?;
                    while session.is_speaking(PartyRole::Patient) {
                        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                    }
                }
            }
        }
    } else {
        info!("No recorded turn found; place a short wav at {} to run one", fixture);
    }

    let stats = session.stats().await;
    info!(
        "Session stats: {} turns in {:.1}s",
        stats.turns_completed, stats.duration_secs
    );

    Ok(())
}
