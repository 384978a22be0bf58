//! External AI boundary.
//!
//! Every call into an AI service goes through `AiBackend`. Callers never see a raw
//! error: the wrappers here turn each call into a `CallOutcome` which is either a
//! validated payload, a degraded result carrying the failure category, or
//! `Unavailable` when no credentials are configured.

use std::time::Instant;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

/// Failure categories for an external AI call.
#[derive(Debug, Error)]
pub enum AiError {
  #[error("transport error: {0}")]
  Transport(String),
  #[error("HTTP {status}: {message}")]
  Http { status: u16, message: String },
  #[error("quota exhausted: {0}")]
  QuotaExhausted(String),
  #[error("malformed response: {0}")]
  Malformed(String),
  #[error("schema violation: {0}")]
  Schema(String),
}

impl AiError {
  /// Stable category name, safe to show to learners.
  pub fn category(&self) -> &'static str {
    match self {
      AiError::Transport(_) => "TransportError",
      AiError::Http { .. } => "HttpError",
      AiError::QuotaExhausted(_) => "insufficient_quota",
      AiError::Malformed(_) => "MalformedResponse",
      AiError::Schema(_) => "SchemaViolation",
    }
  }

  pub fn is_quota(&self) -> bool {
    matches!(self, AiError::QuotaExhausted(_))
  }
}

/// Result of one external call as seen by pipeline code.
#[derive(Debug)]
pub enum CallOutcome<T> {
  Ok(T),
  Degraded(AiError),
  Unavailable,
}

/// Structured-output request: prompt plus a strict JSON schema.
#[derive(Clone, Debug)]
pub struct SchemaRequest {
  pub name: &'static str,
  pub prompt: String,
  pub schema: Value,
  pub temperature: f32,
  pub max_tokens: Option<u32>,
}

/// Typed responses check the constraints a JSON schema cannot express.
pub trait Validate {
  fn validate(&self) -> Result<(), String>;
}

#[async_trait]
pub trait AiBackend: Send + Sync {
  /// Return the raw JSON text produced for `req`.
  async fn complete_json(&self, req: &SchemaRequest) -> Result<String, AiError>;

  async fn transcribe(&self, audio: Vec<u8>, file_name: &str, mime: &str) -> Result<String, AiError>;

  /// Synthesize speech; returns encoded audio bytes (mp3).
  async fn synthesize(&self, text: &str) -> Result<Vec<u8>, AiError>;
}

/// Parse and validate a JSON document against the target type.
pub fn decode_validated<T: DeserializeOwned + Validate>(raw: &str) -> Result<T, AiError> {
  let value: T = serde_json::from_str(raw).map_err(|e| AiError::Malformed(e.to_string()))?;
  value.validate().map_err(AiError::Schema)?;
  Ok(value)
}

#[instrument(target = "ai", level = "info", skip(ai, req), fields(schema = req.name))]
pub async fn call_json<T: DeserializeOwned + Validate>(
  ai: Option<&dyn AiBackend>,
  req: &SchemaRequest,
) -> CallOutcome<T> {
  let Some(ai) = ai else {
    return CallOutcome::Unavailable;
  };
  let start = Instant::now();
  let result = match ai.complete_json(req).await {
    Ok(raw) => decode_validated::<T>(&raw),
    Err(e) => Err(e),
  };
  let elapsed = start.elapsed();
  match result {
    Ok(v) => {
      info!(target: "ai", ?elapsed, "Structured response accepted");
      CallOutcome::Ok(v)
    }
    Err(e) => {
      error!(target: "ai", ?elapsed, category = e.category(), error = %e, "Structured call failed");
      CallOutcome::Degraded(e)
    }
  }
}

#[instrument(target = "ai", level = "info", skip(ai, audio), fields(audio_len = audio.len(), %mime))]
pub async fn call_transcribe(
  ai: Option<&dyn AiBackend>,
  audio: Vec<u8>,
  file_name: &str,
  mime: &str,
) -> CallOutcome<String> {
  let Some(ai) = ai else {
    return CallOutcome::Unavailable;
  };
  match ai.transcribe(audio, file_name, mime).await {
    Ok(text) => CallOutcome::Ok(text),
    Err(e) => {
      error!(target: "ai", category = e.category(), error = %e, "Transcription failed");
      CallOutcome::Degraded(e)
    }
  }
}

#[instrument(target = "ai", level = "info", skip(ai, text), fields(text_len = text.len()))]
pub async fn call_synthesize(ai: Option<&dyn AiBackend>, text: &str) -> CallOutcome<Vec<u8>> {
  let Some(ai) = ai else {
    return CallOutcome::Unavailable;
  };
  match ai.synthesize(text).await {
    Ok(bytes) if bytes.is_empty() => {
      warn!(target: "ai", "Speech synthesis returned no audio");
      CallOutcome::Degraded(AiError::Malformed("empty audio body".into()))
    }
    Ok(bytes) => CallOutcome::Ok(bytes),
    Err(e) => {
      error!(target: "ai", category = e.category(), error = %e, "Speech synthesis failed");
      CallOutcome::Degraded(e)
    }
  }
}

/// Deterministic in-process backend for tests.
#[cfg(test)]
pub mod stub {
  use std::collections::VecDeque;
  use std::sync::Mutex;

  use super::*;

  pub enum Reply {
    Json(String),
    Fail(AiError),
  }

  #[derive(Default)]
  pub struct ScriptedAi {
    json: Mutex<VecDeque<Reply>>,
    transcripts: Mutex<VecDeque<Result<String, AiError>>>,
    speech: Mutex<VecDeque<Result<Vec<u8>, AiError>>>,
    pub prompts: Mutex<Vec<String>>,
  }

  impl ScriptedAi {
    pub fn json(self, raw: impl Into<String>) -> Self {
      self.json.lock().unwrap().push_back(Reply::Json(raw.into()));
      self
    }
    pub fn json_fail(self, e: AiError) -> Self {
      self.json.lock().unwrap().push_back(Reply::Fail(e));
      self
    }
    pub fn transcript(self, r: Result<String, AiError>) -> Self {
      self.transcripts.lock().unwrap().push_back(r);
      self
    }
    pub fn speech(self, r: Result<Vec<u8>, AiError>) -> Self {
      self.speech.lock().unwrap().push_back(r);
      self
    }
  }

  #[async_trait]
  impl AiBackend for ScriptedAi {
    async fn complete_json(&self, req: &SchemaRequest) -> Result<String, AiError> {
      self.prompts.lock().unwrap().push(req.prompt.clone());
      match self.json.lock().unwrap().pop_front() {
        Some(Reply::Json(s)) => Ok(s),
        Some(Reply::Fail(e)) => Err(e),
        None => Err(AiError::Transport("no scripted reply".into())),
      }
    }

    async fn transcribe(&self, _audio: Vec<u8>, _file_name: &str, _mime: &str) -> Result<String, AiError> {
      self
        .transcripts
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| Err(AiError::Transport("no scripted transcript".into())))
    }

    async fn synthesize(&self, _text: &str) -> Result<Vec<u8>, AiError> {
      self
        .speech
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| Err(AiError::Transport("no scripted audio".into())))
    }
  }
}

#[cfg(test)]
mod tests {
  use super::stub::ScriptedAi;
  use super::*;
  use serde::Deserialize;

  #[derive(Debug, Deserialize)]
  struct Score {
    score: f64,
  }
  impl Validate for Score {
    fn validate(&self) -> Result<(), String> {
      if (0.0..=100.0).contains(&self.score) { Ok(()) } else { Err("score out of range".into()) }
    }
  }

  fn req() -> SchemaRequest {
    SchemaRequest {
      name: "score",
      prompt: "p".into(),
      schema: serde_json::json!({}),
      temperature: 0.0,
      max_tokens: None,
    }
  }

  #[tokio::test]
  async fn missing_backend_is_unavailable() {
    assert!(matches!(call_json::<Score>(None, &req()).await, CallOutcome::Unavailable));
  }

  #[tokio::test]
  async fn schema_violation_degrades() {
    let ai = ScriptedAi::default().json(r#"{"score": 140}"#);
    match call_json::<Score>(Some(&ai), &req()).await {
      CallOutcome::Degraded(e) => assert_eq!(e.category(), "SchemaViolation"),
      other => panic!("unexpected outcome: {other:?}"),
    }
  }

  #[tokio::test]
  async fn malformed_json_degrades() {
    let ai = ScriptedAi::default().json("not json");
    match call_json::<Score>(Some(&ai), &req()).await {
      CallOutcome::Degraded(e) => assert_eq!(e.category(), "MalformedResponse"),
      other => panic!("unexpected outcome: {other:?}"),
    }
  }

  #[tokio::test]
  async fn valid_document_passes() {
    let ai = ScriptedAi::default().json(r#"{"score": 81.5}"#);
    match call_json::<Score>(Some(&ai), &req()).await {
      CallOutcome::Ok(s) => assert_eq!(s.score, 81.5),
      other => panic!("unexpected outcome: {other:?}"),
    }
  }
}
