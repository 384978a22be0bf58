//! Minimal OpenAI client for our use-cases.
//!
//! We call chat.completions with a strict `json_schema` response format, plus the
//! audio transcription and speech endpoints. Calls are instrumented and log model
//! names, latencies, and response sizes (not contents).
//!
//! NOTE: We never log the API key and we keep payload truncations short to avoid PII leaks.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::ai::{AiBackend, AiError, SchemaRequest};
use crate::config::Settings;

const UA: &str = "britais-backend/0.1";

#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub model: String,
  pub transcribe_model: String,
  pub tts_model: String,
  pub tts_voice: String,
}

impl OpenAI {
  /// Construct the client if an API key is configured; otherwise return None.
  pub fn from_settings(settings: &Settings) -> Option<Self> {
    let api_key = settings.openai_api_key.clone()?;
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(30))
      .build()
      .ok()?;

    Some(Self {
      client,
      api_key,
      base_url: settings.openai_base_url.trim_end_matches('/').to_string(),
      model: settings.openai_model.clone(),
      transcribe_model: settings.transcribe_model.clone(),
      tts_model: settings.tts_model.clone(),
      tts_voice: settings.tts_voice.clone(),
    })
  }

  fn post(&self, path: &str) -> reqwest::RequestBuilder {
    self.client
      .post(format!("{}{}", self.base_url, path))
      .header(USER_AGENT, UA)
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
  }
}

#[async_trait]
impl AiBackend for OpenAI {
  /// JSON-schema chat completion. Returns the raw JSON text of the first choice.
  #[instrument(level = "info", skip(self, req), fields(model = %self.model, schema = req.name, prompt_len = req.prompt.len()))]
  async fn complete_json(&self, req: &SchemaRequest) -> Result<String, AiError> {
    let body = ChatCompletionRequest {
      model: self.model.clone(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: "Return ONLY valid JSON matching the schema.".into() },
        ChatMessageReq { role: "user".into(), content: req.prompt.clone() },
      ],
      temperature: req.temperature,
      response_format: Some(ResponseFormat {
        r#type: "json_schema".into(),
        json_schema: JsonSchemaSpec { name: req.name.to_string(), strict: true, schema: req.schema.clone() },
      }),
      max_tokens: req.max_tokens,
    };

    let start = Instant::now();
    let res = self.post("/chat/completions")
      .header(CONTENT_TYPE, "application/json")
      .json(&body).send().await
      .map_err(|e| AiError::Transport(e.to_string()))?;
    let res = check_status(res).await?;

    let body: ChatCompletionResponse = res.json().await.map_err(|e| AiError::Malformed(e.to_string()))?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }
    let text = body.choices.first()
      .and_then(|c| c.message.content.clone())
      .ok_or_else(|| AiError::Malformed("no message content".into()))?;
    info!(elapsed = ?start.elapsed(), resp_len = text.len(), "Chat completion received");
    Ok(text)
  }

  #[instrument(level = "info", skip(self, audio), fields(model = %self.transcribe_model, audio_len = audio.len(), %mime))]
  async fn transcribe(&self, audio: Vec<u8>, file_name: &str, mime: &str) -> Result<String, AiError> {
    let part = reqwest::multipart::Part::bytes(audio)
      .file_name(file_name.to_string())
      .mime_str(mime)
      .map_err(|e| AiError::Transport(e.to_string()))?;
    let form = reqwest::multipart::Form::new()
      .text("model", self.transcribe_model.clone())
      .text("response_format", "text")
      .part("file", part);

    let start = Instant::now();
    let res = self.post("/audio/transcriptions")
      .multipart(form).send().await
      .map_err(|e| AiError::Transport(e.to_string()))?;
    let res = check_status(res).await?;
    let text = res.text().await.map_err(|e| AiError::Malformed(e.to_string()))?;
    info!(elapsed = ?start.elapsed(), text_len = text.len(), "Transcription received");
    Ok(text.trim().to_string())
  }

  #[instrument(level = "info", skip(self, text), fields(model = %self.tts_model, voice = %self.tts_voice, text_len = text.len()))]
  async fn synthesize(&self, text: &str) -> Result<Vec<u8>, AiError> {
    let body = SpeechRequest {
      model: &self.tts_model,
      voice: &self.tts_voice,
      input: text,
      response_format: "mp3",
    };
    let start = Instant::now();
    let res = self.post("/audio/speech")
      .header(CONTENT_TYPE, "application/json")
      .json(&body).send().await
      .map_err(|e| AiError::Transport(e.to_string()))?;
    let res = check_status(res).await?;
    let bytes = res.bytes().await.map_err(|e| AiError::Transport(e.to_string()))?;
    info!(elapsed = ?start.elapsed(), audio_len = bytes.len(), "Speech received");
    Ok(bytes.to_vec())
  }
}

/// Turn a non-2xx response into a categorized error.
async fn check_status(res: reqwest::Response) -> Result<reqwest::Response, AiError> {
  if res.status().is_success() {
    return Ok(res);
  }
  let status = res.status().as_u16();
  let body = res.text().await.unwrap_or_default();
  Err(classify_error(status, &body))
}

fn classify_error(status: u16, body: &str) -> AiError {
  match extract_openai_error(body) {
    Some(err) if err.is_quota() => AiError::QuotaExhausted(err.message),
    Some(err) => AiError::Http { status, message: err.message },
    None => AiError::Http { status, message: crate::util::trunc_for_log(body, 200) },
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  response_format: Option<ResponseFormat>,
  #[serde(skip_serializing_if = "Option::is_none")]
  max_tokens: Option<u32>,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }
#[derive(Serialize)]
struct ResponseFormat {
  #[serde(rename = "type")] r#type: String,
  json_schema: JsonSchemaSpec,
}
#[derive(Serialize)]
struct JsonSchemaSpec { name: String, strict: bool, schema: serde_json::Value }

#[derive(Serialize)]
struct SpeechRequest<'a> {
  model: &'a str,
  voice: &'a str,
  input: &'a str,
  response_format: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

struct ApiErrorBody {
  message: String,
  code: Option<String>,
  kind: Option<String>,
}

impl ApiErrorBody {
  fn is_quota(&self) -> bool {
    self.code.as_deref() == Some("insufficient_quota") || self.kind.as_deref() == Some("insufficient_quota")
  }
}

/// Try to extract message/code/type from an OpenAI error body.
fn extract_openai_error(body: &str) -> Option<ApiErrorBody> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj {
    message: String,
    #[serde(default)] code: Option<String>,
    #[serde(default, rename = "type")] kind: Option<String>,
  }
  serde_json::from_str::<EWrap>(body).ok().map(|w| ApiErrorBody {
    message: w.error.message,
    code: w.error.code,
    kind: w.error.kind,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn quota_errors_are_recognized() {
    let body = r#"{"error":{"message":"You exceeded your current quota","type":"insufficient_quota","code":"insufficient_quota"}}"#;
    assert!(classify_error(429, body).is_quota());
  }

  #[test]
  fn rate_limits_are_plain_http_errors() {
    let body = r#"{"error":{"message":"Rate limit reached","type":"requests","code":"rate_limit_exceeded"}}"#;
    match classify_error(429, body) {
      AiError::Http { status, message } => {
        assert_eq!(status, 429);
        assert_eq!(message, "Rate limit reached");
      }
      other => panic!("unexpected: {other:?}"),
    }
  }

  #[test]
  fn non_json_bodies_are_kept_short() {
    let body = "x".repeat(1000);
    match classify_error(502, &body) {
      AiError::Http { message, .. } => assert!(message.len() < 300),
      other => panic!("unexpected: {other:?}"),
    }
  }

  #[test]
  fn missing_key_disables_client() {
    let settings = Settings { openai_api_key: None, ..Settings::default() };
    assert!(OpenAI::from_settings(&settings).is_none());
  }
}
