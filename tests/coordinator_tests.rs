// Integration tests for the two-party session coordinator
//
// These tests drive full turns through mock service clients and verify
// the single-active-speaker rule, transcript routing, and playback
// control from the public API only.

use anyhow::Result;
use med_interpreter::audio::{CaptureSource, ClipFormat, MockAudioOutput, ScriptedCaptureDevice};
use med_interpreter::services::{MockChatClient, MockSpeechClient, MockTranscriptionClient};
use med_interpreter::session::{PartyRole, SessionCoordinator, SessionOptions};
use med_interpreter::{LanguageCode, SessionError};
use std::sync::Arc;
use std::time::Duration;

/// A short raw PCM clip (zeros are fine; transcription is mocked).
fn spoken_clip() -> CaptureSource {
    CaptureSource::Buffer {
        data: vec![0u8; 3200],
        format: ClipFormat::Pcm {
            sample_rate: 16000,
            channels: 1,
        },
    }
}

fn session(
    transcriber: MockTranscriptionClient,
    chat: MockChatClient,
    speech: MockSpeechClient,
    output: MockAudioOutput,
    options: SessionOptions,
) -> SessionCoordinator {
    SessionCoordinator::new(
        Arc::new(transcriber),
        Arc::new(chat),
        Arc::new(speech),
        Arc::new(output),
        options,
    )
}

#[tokio::test]
async fn test_provider_turn_routes_translation_to_patient() -> Result<()> {
    let transcriber = MockTranscriptionClient::new().with_reply("met form in five hundred");
    let transcription_calls = transcriber.calls();

    // First completion refines terminology, second translates.
    let chat = MockChatClient::new()
        .with_reply("Metformin 500 milligrams")
        .with_reply("Metformina 500 miligramos");
    let chat_calls = chat.calls();

    let coordinator = session(
        transcriber,
        chat,
        MockSpeechClient::new(),
        MockAudioOutput::new(),
        SessionOptions::default(),
    );

    coordinator
        .start_recording(PartyRole::Provider, spoken_clip())
        .await?;
    assert!(coordinator.is_recording(PartyRole::Provider).await);
    assert_eq!(
        coordinator.active_speaker().await,
        Some(PartyRole::Provider)
    );

    let report = coordinator
        .stop_recording(PartyRole::Provider)
        .await?
        .expect("captured turn should produce a report");

    assert_eq!(report.party, PartyRole::Provider);
    assert_eq!(report.transcript, "met form in five hundred");
    assert_eq!(
        report.translation.as_deref(),
        Some("Metformina 500 miligramos")
    );

    // The speaker keeps the raw transcript; the counterpart receives
    // the translation.
    assert_eq!(
        coordinator.transcript(PartyRole::Provider).await,
        "met form in five hundred"
    );
    assert_eq!(
        coordinator.transcript(PartyRole::Patient).await,
        "Metformina 500 miligramos"
    );

    // Transcription got the speaker's language hint.
    let transcription_calls = transcription_calls.lock().unwrap();
    assert_eq!(transcription_calls.len(), 1);
    assert_eq!(transcription_calls[0].language, "en");

    // Two completions: refine then translate, both on the session model.
    let chat_calls = chat_calls.lock().unwrap();
    assert_eq!(chat_calls.len(), 2);
    assert_eq!(chat_calls[0].model, "gpt-4o-mini");

    assert_eq!(coordinator.active_speaker().await, None);
    assert_eq!(coordinator.stats().await.turns_completed, 1);
    Ok(())
}

#[tokio::test]
async fn test_identity_language_pair_skips_translation_service() -> Result<()> {
    let chat = MockChatClient::new();
    let chat_calls = chat.calls();

    let coordinator = session(
        MockTranscriptionClient::new().with_reply("how are you feeling"),
        chat,
        MockSpeechClient::new(),
        MockAudioOutput::new(),
        SessionOptions::default()
            .with_languages(LanguageCode::new("en"), LanguageCode::new("en")),
    );

    coordinator
        .start_recording(PartyRole::Provider, spoken_clip())
        .await?;
    let report = coordinator
        .stop_recording(PartyRole::Provider)
        .await?
        .expect("captured turn should produce a report");

    // Same language on both sides: the text passes through unchanged
    // and no completion is requested.
    assert_eq!(report.translation.as_deref(), Some("how are you feeling"));
    assert_eq!(
        coordinator.transcript(PartyRole::Patient).await,
        "how are you feeling"
    );
    assert_eq!(chat_calls.lock().unwrap().len(), 0);
    Ok(())
}

#[tokio::test]
async fn test_empty_capture_produces_no_turn() -> Result<()> {
    let transcriber = MockTranscriptionClient::new();
    let transcription_calls = transcriber.calls();

    let coordinator = session(
        transcriber,
        MockChatClient::new(),
        MockSpeechClient::new(),
        MockAudioOutput::new(),
        SessionOptions::default(),
    );

    coordinator
        .start_recording(
            PartyRole::Patient,
            CaptureSource::Buffer {
                data: Vec::new(),
                format: ClipFormat::wav(),
            },
        )
        .await?;

    let report = coordinator.stop_recording(PartyRole::Patient).await?;
    assert!(report.is_none(), "nothing captured should mean no report");

    assert_eq!(transcription_calls.lock().unwrap().len(), 0);
    assert_eq!(coordinator.transcript(PartyRole::Patient).await, "");
    assert_eq!(coordinator.stats().await.turns_completed, 0);
    Ok(())
}

#[tokio::test]
async fn test_second_party_start_preempts_first() -> Result<()> {
    let transcriber = MockTranscriptionClient::new();
    let transcription_calls = transcriber.calls();

    let coordinator = session(
        transcriber,
        MockChatClient::new(),
        MockSpeechClient::new(),
        MockAudioOutput::new(),
        SessionOptions::default(),
    );

    coordinator
        .start_recording(PartyRole::Provider, spoken_clip())
        .await?;
    coordinator
        .start_recording(PartyRole::Patient, spoken_clip())
        .await?;

    // The handover finalized the provider's turn before the patient's
    // capture began; at no point were both lanes recording.
    assert!(!coordinator.is_recording(PartyRole::Provider).await);
    assert!(coordinator.is_recording(PartyRole::Patient).await);
    assert_eq!(coordinator.active_speaker().await, Some(PartyRole::Patient));

    // The preempted turn was transcribed, not dropped, and its
    // transcript is already visible.
    assert_eq!(
        coordinator.transcript(PartyRole::Provider).await,
        "mock transcript"
    );

    // Its translation completes in the background.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        coordinator.transcript(PartyRole::Patient).await,
        "mock transcript"
    );

    let report = coordinator.stop_recording(PartyRole::Patient).await?;
    assert!(report.is_some());

    let calls = transcription_calls.lock().unwrap();
    assert_eq!(calls.len(), 2, "both turns should reach transcription");
    assert_eq!(calls[0].language, "en", "preempted provider turn first");
    assert_eq!(calls[1].language, "es");
    drop(calls);

    assert_eq!(coordinator.stats().await.turns_completed, 2);
    Ok(())
}

#[tokio::test]
async fn test_start_while_already_recording_is_a_noop() -> Result<()> {
    let coordinator = session(
        MockTranscriptionClient::new(),
        MockChatClient::new(),
        MockSpeechClient::new(),
        MockAudioOutput::new(),
        SessionOptions::default(),
    );

    coordinator
        .start_recording(PartyRole::Provider, spoken_clip())
        .await?;

    // A second start for the same party is ignored; the replacement
    // device is never acquired.
    let second_device = ScriptedCaptureDevice::new(vec![0u8; 3200], ClipFormat::wav());
    let probe = second_device.probe();
    coordinator
        .start_recording(PartyRole::Provider, CaptureSource::device(second_device))
        .await?;

    assert_eq!(probe.start_calls(), 0);
    assert_eq!(
        coordinator.active_speaker().await,
        Some(PartyRole::Provider)
    );

    let report = coordinator.stop_recording(PartyRole::Provider).await?;
    assert!(report.is_some(), "the original capture still completes");
    Ok(())
}

#[tokio::test]
async fn test_stop_for_inactive_party_returns_none() -> Result<()> {
    let coordinator = session(
        MockTranscriptionClient::new(),
        MockChatClient::new(),
        MockSpeechClient::new(),
        MockAudioOutput::new(),
        SessionOptions::default(),
    );

    // Nobody is recording at all.
    assert!(coordinator.stop_recording(PartyRole::Patient).await?.is_none());

    coordinator
        .start_recording(PartyRole::Provider, spoken_clip())
        .await?;

    // Stopping the party that is not speaking changes nothing.
    assert!(coordinator.stop_recording(PartyRole::Patient).await?.is_none());
    assert!(coordinator.is_recording(PartyRole::Provider).await);

    assert!(coordinator.stop_recording(PartyRole::Provider).await?.is_some());
    Ok(())
}

#[tokio::test]
async fn test_translation_failure_keeps_own_transcript() -> Result<()> {
    // Refinement failure falls back to the raw text; the translation
    // failure that follows surfaces from stop_recording.
    let chat = MockChatClient::new()
        .with_failure("refine unavailable")
        .with_failure("translate unavailable");

    let coordinator = session(
        MockTranscriptionClient::new().with_reply("the swelling is new"),
        chat,
        MockSpeechClient::new(),
        MockAudioOutput::new(),
        SessionOptions::default(),
    );

    coordinator
        .start_recording(PartyRole::Provider, spoken_clip())
        .await?;
    let err = coordinator
        .stop_recording(PartyRole::Provider)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Translation { .. }));

    // The speaker's words survive; the counterpart saw nothing.
    assert_eq!(
        coordinator.transcript(PartyRole::Provider).await,
        "the swelling is new"
    );
    assert_eq!(coordinator.transcript(PartyRole::Patient).await, "");
    assert_eq!(coordinator.stats().await.turns_completed, 0);
    Ok(())
}

#[tokio::test]
async fn test_swap_languages_swaps_transcripts_too() -> Result<()> {
    let chat = MockChatClient::new()
        .with_reply("good morning")
        .with_reply("buenos dias");

    let coordinator = session(
        MockTranscriptionClient::new().with_reply("good morning"),
        chat,
        MockSpeechClient::new(),
        MockAudioOutput::new(),
        SessionOptions::default(),
    );

    coordinator
        .start_recording(PartyRole::Provider, spoken_clip())
        .await?;
    coordinator.stop_recording(PartyRole::Provider).await?;

    coordinator.swap_languages().await;

    assert_eq!(
        coordinator.language(PartyRole::Provider).await,
        LanguageCode::new("es")
    );
    assert_eq!(
        coordinator.language(PartyRole::Patient).await,
        LanguageCode::new("en")
    );
    assert_eq!(
        coordinator.transcript(PartyRole::Provider).await,
        "buenos dias"
    );
    assert_eq!(
        coordinator.transcript(PartyRole::Patient).await,
        "good morning"
    );
    Ok(())
}

#[tokio::test]
async fn test_clear_session_empties_transcripts_and_stops_playback() -> Result<()> {
    let output = MockAudioOutput::new().with_play_duration(Duration::from_secs(30));
    let probe = output.probe();

    let coordinator = session(
        MockTranscriptionClient::new(),
        MockChatClient::new(),
        MockSpeechClient::new(),
        output,
        SessionOptions::default(),
    );

    coordinator
        .start_recording(PartyRole::Provider, spoken_clip())
        .await?;
    coordinator.stop_recording(PartyRole::Provider).await?;

    coordinator.speak(PartyRole::Patient).await?;
    assert!(coordinator.is_speaking(PartyRole::Patient));

    coordinator.clear_session().await;

    assert_eq!(coordinator.transcript(PartyRole::Provider).await, "");
    assert_eq!(coordinator.transcript(PartyRole::Patient).await, "");
    assert!(!coordinator.is_speaking(PartyRole::Patient));

    // Languages and the recording lanes are untouched.
    assert_eq!(
        coordinator.language(PartyRole::Provider).await,
        LanguageCode::new("en")
    );
    assert!(!coordinator.is_recording(PartyRole::Provider).await);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(probe.stopped(), 1);
    Ok(())
}

#[tokio::test]
async fn test_speak_uses_counterpart_voice_and_translated_text() -> Result<()> {
    let chat = MockChatClient::new()
        .with_reply("any allergies")
        .with_reply("alguna alergia");
    let speech = MockSpeechClient::new();
    let synthesis_calls = speech.calls();
    let output = MockAudioOutput::new();
    let probe = output.probe();

    let coordinator = session(
        MockTranscriptionClient::new().with_reply("any allergies"),
        chat,
        speech,
        output,
        SessionOptions::default(),
    );

    coordinator
        .start_recording(PartyRole::Provider, spoken_clip())
        .await?;
    coordinator.stop_recording(PartyRole::Provider).await?;

    // The patient hears the Spanish translation in the Spanish voice.
    coordinator.speak(PartyRole::Patient).await?;
    // The provider replays their own words in the English voice.
    coordinator.speak(PartyRole::Provider).await?;

    let calls = synthesis_calls.lock().unwrap();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].text, "alguna alergia");
    assert_eq!(calls[0].voice, "Lucia");
    assert_eq!(calls[0].language_tag, "es-ES");
    assert_eq!(calls[1].text, "any allergies");
    assert_eq!(calls[1].voice, "Joanna");
    drop(calls);

    assert_eq!(probe.begun(), 2);
    Ok(())
}

#[tokio::test]
async fn test_speak_with_empty_transcript_is_a_noop() -> Result<()> {
    let speech = MockSpeechClient::new();
    let synthesis_calls = speech.calls();
    let output = MockAudioOutput::new();
    let probe = output.probe();

    let coordinator = session(
        MockTranscriptionClient::new(),
        MockChatClient::new(),
        speech,
        output,
        SessionOptions::default(),
    );

    coordinator.speak(PartyRole::Provider).await?;

    assert_eq!(synthesis_calls.lock().unwrap().len(), 0);
    assert_eq!(probe.begun(), 0);
    assert!(!coordinator.is_speaking(PartyRole::Provider));
    Ok(())
}

#[tokio::test]
async fn test_stats_snapshot_reflects_session() -> Result<()> {
    let output = MockAudioOutput::new().with_play_duration(Duration::from_secs(30));

    let mut options = SessionOptions::default();
    options.session_id = "visit-42".to_string();

    let coordinator = session(
        MockTranscriptionClient::new(),
        MockChatClient::new(),
        MockSpeechClient::new(),
        output,
        options,
    );

    coordinator
        .start_recording(PartyRole::Provider, spoken_clip())
        .await?;
    coordinator.stop_recording(PartyRole::Provider).await?;
    coordinator.speak(PartyRole::Patient).await?;

    let stats = coordinator.stats().await;
    assert_eq!(stats.session_id, "visit-42");
    assert_eq!(stats.turns_completed, 1);
    assert_eq!(stats.active_speaker, None);
    assert!(stats.patient_speaking);
    assert!(!stats.provider_speaking);
    assert!(stats.duration_secs >= 0.0);

    coordinator.stop_speaking(PartyRole::Patient);
    assert!(!coordinator.stats().await.patient_speaking);
    Ok(())
}
