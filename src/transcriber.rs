//! Audio transcriber: spoken answer -> text, or `Unavailable`. Never an error.

use tracing::{info, instrument, warn};

use crate::ai::{call_transcribe, AiBackend, CallOutcome};

/// Outcome of one transcription attempt.
#[derive(Clone, Debug, PartialEq)]
pub enum Transcript {
  Text(String),
  /// Missing credentials, a failed call, or an empty result.
  Unavailable,
}

impl Transcript {
  pub fn as_text(&self) -> Option<&str> {
    match self {
      Transcript::Text(t) => Some(t),
      Transcript::Unavailable => None,
    }
  }
}

#[instrument(target = "pipeline", level = "info", skip(ai, audio), fields(audio_len = audio.len()))]
pub async fn transcribe(ai: Option<&dyn AiBackend>, audio: Vec<u8>, file_name: &str, mime: &str) -> Transcript {
  match call_transcribe(ai, audio, file_name, mime).await {
    CallOutcome::Ok(text) if !text.trim().is_empty() => {
      info!(target: "pipeline", text_len = text.len(), "Transcript ready");
      Transcript::Text(text.trim().to_string())
    }
    CallOutcome::Ok(_) => {
      warn!(target: "pipeline", "Empty transcript");
      Transcript::Unavailable
    }
    CallOutcome::Degraded(e) => {
      warn!(target: "pipeline", category = e.category(), "Transcription unavailable");
      Transcript::Unavailable
    }
    CallOutcome::Unavailable => {
      warn!(target: "pipeline", "Transcription skipped: no AI credentials configured");
      Transcript::Unavailable
    }
  }
}
