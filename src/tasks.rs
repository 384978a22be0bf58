//! Task generator: leveled exercises from the AI service, with deterministic
//! fallback banks when the service is unavailable or returns something unusable.
//!
//! Flow per modality:
//!   - writing / speaking: prompt document (title, prompt, 3-5 guiding questions)
//!   - listening: passage + exactly 3 four-option questions, then best-effort audio

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::ai::{call_json, AiBackend, CallOutcome, SchemaRequest, Validate};
use crate::config::{Prompts, TopicCfg};
use crate::domain::{ExerciseTask, McQuestion, Modality, ProficiencyLevel, TaskPayload, TaskSource};
use crate::seeds::{fallback_listening, fallback_speaking, fallback_writing, LISTENING_INSTRUCTIONS};
use crate::speech::attach_audio;
use crate::store::BlobStore;
use crate::util::{count_words, fill_template};

pub const PASSAGE_WORDS: std::ops::RangeInclusive<usize> = 90..=140;
pub const LISTENING_QUESTIONS: usize = 3;
pub const OPTIONS_PER_QUESTION: usize = 4;

/// Everything the generator needs besides the request itself.
pub struct TaskContext<'a> {
  pub ai: Option<&'a dyn AiBackend>,
  pub prompts: &'a Prompts,
  pub extra_topics: &'a [TopicCfg],
  pub blobs: &'a dyn BlobStore,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PromptDoc {
  title: String,
  prompt: String,
  questions: Vec<String>,
}

impl Validate for PromptDoc {
  fn validate(&self) -> Result<(), String> {
    if self.title.trim().is_empty() || self.prompt.trim().is_empty() {
      return Err("title and prompt must be non-empty".into());
    }
    if !(3..=5).contains(&self.questions.len()) {
      return Err(format!("expected 3-5 questions, got {}", self.questions.len()));
    }
    if self.questions.iter().any(|q| q.trim().is_empty()) {
      return Err("empty guiding question".into());
    }
    Ok(())
  }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ListeningDoc {
  title: String,
  passage: String,
  questions: Vec<McQuestion>,
}

impl Validate for ListeningDoc {
  fn validate(&self) -> Result<(), String> {
    if self.title.trim().is_empty() || self.passage.trim().is_empty() {
      return Err("title and passage must be non-empty".into());
    }
    if self.questions.len() != LISTENING_QUESTIONS {
      return Err(format!("expected {} questions, got {}", LISTENING_QUESTIONS, self.questions.len()));
    }
    for (i, q) in self.questions.iter().enumerate() {
      let n = i + 1;
      if q.question.trim().is_empty() {
        return Err(format!("question {n} is empty"));
      }
      if q.options.len() != OPTIONS_PER_QUESTION {
        return Err(format!("question {n} has {} options", q.options.len()));
      }
      let distinct: HashSet<&str> = q.options.iter().map(|o| o.as_str()).collect();
      if distinct.len() != OPTIONS_PER_QUESTION || q.options.iter().any(|o| o.trim().is_empty()) {
        return Err(format!("question {n} options must be distinct and non-empty"));
      }
      if !q.options.contains(&q.answer) {
        return Err(format!("question {n} answer is not one of its options"));
      }
      if q.why.trim().is_empty() {
        return Err(format!("question {n} is missing a justification"));
      }
    }
    Ok(())
  }
}

fn prompt_schema() -> serde_json::Value {
  json!({
    "type": "object",
    "additionalProperties": false,
    "properties": {
      "title": { "type": "string" },
      "prompt": { "type": "string" },
      "questions": { "type": "array", "items": { "type": "string" }, "minItems": 3, "maxItems": 5 }
    },
    "required": ["title", "prompt", "questions"]
  })
}

fn listening_schema() -> serde_json::Value {
  json!({
    "type": "object",
    "additionalProperties": false,
    "properties": {
      "title": { "type": "string" },
      "passage": { "type": "string" },
      "questions": {
        "type": "array",
        "minItems": 3,
        "maxItems": 3,
        "items": {
          "type": "object",
          "additionalProperties": false,
          "properties": {
            "question": { "type": "string" },
            "options": { "type": "array", "items": { "type": "string" }, "minItems": 4, "maxItems": 4 },
            "answer": { "type": "string" },
            "why": { "type": "string" }
          },
          "required": ["question", "options", "answer", "why"]
        }
      }
    },
    "required": ["title", "passage", "questions"]
  })
}

/// Produce a task for `modality` at `level`. Never fails: any AI problem falls back.
#[instrument(target = "pipeline", level = "info", skip(ctx, rng), fields(%modality, %level))]
pub async fn generate_task<R: Rng + Send + ?Sized>(
  ctx: &TaskContext<'_>,
  modality: Modality,
  level: ProficiencyLevel,
  rng: &mut R,
  now: DateTime<Utc>,
) -> ExerciseTask {
  let task = match modality {
    Modality::Writing | Modality::Speaking => generate_prompt_task(ctx, modality, level, rng).await,
    Modality::Listening => {
      let task = generate_listening_text(ctx, level).await;
      attach_audio(ctx.ai, ctx.blobs, task, now).await
    }
  };
  info!(target: "pipeline", id = %task.id, source = ?task.source, has_audio = task.audio.is_some(), "Task ready");
  task
}

async fn generate_prompt_task<R: Rng + Send + ?Sized>(
  ctx: &TaskContext<'_>,
  modality: Modality,
  level: ProficiencyLevel,
  rng: &mut R,
) -> ExerciseTask {
  let (name, template, temperature) = match modality {
    Modality::Speaking => ("speaking_topic", &ctx.prompts.speaking_topic, 0.8),
    _ => ("writing_topic", &ctx.prompts.writing_topic, 0.8),
  };
  let req = SchemaRequest {
    name,
    prompt: fill_template(template, &[("level", level.as_str())]),
    schema: prompt_schema(),
    temperature,
    max_tokens: Some(220),
  };

  match call_json::<PromptDoc>(ctx.ai, &req).await {
    CallOutcome::Ok(doc) => ExerciseTask::new(
      modality,
      level,
      doc.title.trim().to_string(),
      TaskPayload::Prompt {
        prompt: doc.prompt.trim().to_string(),
        questions: doc.questions.into_iter().map(|q| q.trim().to_string()).collect(),
      },
      TaskSource::AiGenerated,
    ),
    outcome => {
      if let CallOutcome::Degraded(e) = &outcome {
        warn!(target: "pipeline", %modality, category = e.category(), "Topic generation failed; using fallback bank");
      }
      match modality {
        Modality::Speaking => fallback_speaking(level, ctx.extra_topics, rng),
        _ => fallback_writing(level),
      }
    }
  }
}

async fn generate_listening_text(ctx: &TaskContext<'_>, level: ProficiencyLevel) -> ExerciseTask {
  let req = SchemaRequest {
    name: "listening_task",
    prompt: fill_template(&ctx.prompts.listening_task, &[("level", level.as_str())]),
    schema: listening_schema(),
    temperature: 0.7,
    max_tokens: Some(700),
  };

  match call_json::<ListeningDoc>(ctx.ai, &req).await {
    CallOutcome::Ok(doc) => {
      let passage = doc.passage.trim().to_string();
      let words = count_words(&passage);
      if !PASSAGE_WORDS.contains(&words) {
        warn!(target: "pipeline", words, "Generated passage outside the requested word band");
      }
      ExerciseTask::new(
        Modality::Listening,
        level,
        doc.title.trim().to_string(),
        TaskPayload::Listening {
          instructions: LISTENING_INSTRUCTIONS.into(),
          passage,
          questions: doc.questions,
        },
        TaskSource::AiGenerated,
      )
    }
    CallOutcome::Degraded(e) => {
      warn!(target: "pipeline", category = e.category(), "Listening generation failed; using fallback bank");
      fallback_listening(level)
    }
    CallOutcome::Unavailable => fallback_listening(level),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ai::stub::ScriptedAi;
  use crate::ai::AiError;
  use crate::store::LocalBlobStore;
  use chrono::TimeZone;
  use rand::rngs::StdRng;
  use rand::SeedableRng;

  fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 18, 8, 0, 0).unwrap()
  }

  fn listening_json(answer: &str) -> String {
    let q = |n: usize| {
      json!({
        "question": format!("Question {n}?"),
        "options": ["Alpha", "Bravo", "Charlie", "Delta"],
        "answer": answer,
        "why": "Stated in the second sentence."
      })
    };
    json!({
      "title": "Market day",
      "passage": "word ".repeat(100),
      "questions": [q(1), q(2), q(3)]
    })
    .to_string()
  }

  #[tokio::test]
  async fn listening_without_ai_uses_fixed_bank() {
    let dir = tempfile::tempdir().unwrap();
    let blobs = LocalBlobStore::new(dir.path(), "/uploads");
    let prompts = Prompts::default();
    let ctx = TaskContext { ai: None, prompts: &prompts, extra_topics: &[], blobs: &blobs };
    let mut rng = StdRng::seed_from_u64(3);
    let a = generate_task(&ctx, Modality::Listening, ProficiencyLevel::A2, &mut rng, now()).await;
    let b = generate_task(&ctx, Modality::Listening, ProficiencyLevel::A2, &mut rng, now()).await;
    assert_eq!(a, fallback_listening(ProficiencyLevel::A2));
    assert_eq!(a.id, b.id);
    assert!(a.audio.is_none());
  }

  #[tokio::test]
  async fn generated_listening_gets_audio() {
    let dir = tempfile::tempdir().unwrap();
    let blobs = LocalBlobStore::new(dir.path(), "/uploads");
    let prompts = Prompts::default();
    let ai = ScriptedAi::default().json(listening_json("Bravo")).speech(Ok(vec![1, 2, 3]));
    let ctx = TaskContext { ai: Some(&ai), prompts: &prompts, extra_topics: &[], blobs: &blobs };
    let task = generate_task(&ctx, Modality::Listening, ProficiencyLevel::B2, &mut StdRng::seed_from_u64(0), now()).await;
    assert_eq!(task.source, TaskSource::AiGenerated);
    assert_eq!(task.title, "Market day");
    assert_eq!(task.mc_questions().len(), 3);
    assert!(task.audio.is_some());
    assert!(ai.prompts.lock().unwrap()[0].contains("CEFR level B2"));
  }

  #[tokio::test]
  async fn answer_outside_options_falls_back() {
    let dir = tempfile::tempdir().unwrap();
    let blobs = LocalBlobStore::new(dir.path(), "/uploads");
    let prompts = Prompts::default();
    let ai = ScriptedAi::default().json(listening_json("Echo"));
    let ctx = TaskContext { ai: Some(&ai), prompts: &prompts, extra_topics: &[], blobs: &blobs };
    let task = generate_task(&ctx, Modality::Listening, ProficiencyLevel::C1, &mut StdRng::seed_from_u64(0), now()).await;
    assert_eq!(task.source, TaskSource::Fallback);
    assert_eq!(task.id, fallback_listening(ProficiencyLevel::C1).id);
  }

  #[tokio::test]
  async fn tts_failure_keeps_generated_task() {
    let dir = tempfile::tempdir().unwrap();
    let blobs = LocalBlobStore::new(dir.path(), "/uploads");
    let prompts = Prompts::default();
    let ai = ScriptedAi::default()
      .json(listening_json("Alpha"))
      .speech(Err(AiError::QuotaExhausted("no credits".into())));
    let ctx = TaskContext { ai: Some(&ai), prompts: &prompts, extra_topics: &[], blobs: &blobs };
    let task = generate_task(&ctx, Modality::Listening, ProficiencyLevel::B1, &mut StdRng::seed_from_u64(0), now()).await;
    assert_eq!(task.source, TaskSource::AiGenerated);
    assert!(task.audio.is_none());
  }

  #[tokio::test]
  async fn speaking_topic_from_ai() {
    let dir = tempfile::tempdir().unwrap();
    let blobs = LocalBlobStore::new(dir.path(), "/uploads");
    let prompts = Prompts::default();
    let ai = ScriptedAi::default().json(
      r#"{"title":" Food ","prompt":"Talk about a meal you remember.","questions":["When?","Who cooked?","Why memorable?"]}"#,
    );
    let ctx = TaskContext { ai: Some(&ai), prompts: &prompts, extra_topics: &[], blobs: &blobs };
    let task = generate_task(&ctx, Modality::Speaking, ProficiencyLevel::B1, &mut StdRng::seed_from_u64(0), now()).await;
    assert_eq!(task.source, TaskSource::AiGenerated);
    assert_eq!(task.title, "Food");
    assert_eq!(task.modality, Modality::Speaking);
  }

  #[tokio::test]
  async fn speaking_quota_error_falls_back_to_topic_bank() {
    let dir = tempfile::tempdir().unwrap();
    let blobs = LocalBlobStore::new(dir.path(), "/uploads");
    let prompts = Prompts::default();
    let ai = ScriptedAi::default().json_fail(AiError::QuotaExhausted("no credits".into()));
    let ctx = TaskContext { ai: Some(&ai), prompts: &prompts, extra_topics: &[], blobs: &blobs };
    let task = generate_task(&ctx, Modality::Speaking, ProficiencyLevel::B1, &mut StdRng::seed_from_u64(9), now()).await;
    assert_eq!(task.source, TaskSource::Fallback);
    assert_eq!(task, fallback_speaking(ProficiencyLevel::B1, &[], &mut StdRng::seed_from_u64(9)));
  }

  #[tokio::test]
  async fn writing_with_too_few_questions_falls_back() {
    let dir = tempfile::tempdir().unwrap();
    let blobs = LocalBlobStore::new(dir.path(), "/uploads");
    let prompts = Prompts::default();
    let ai = ScriptedAi::default().json(r#"{"title":"T","prompt":"P","questions":["only one"]}"#);
    let ctx = TaskContext { ai: Some(&ai), prompts: &prompts, extra_topics: &[], blobs: &blobs };
    let task = generate_task(&ctx, Modality::Writing, ProficiencyLevel::C2, &mut StdRng::seed_from_u64(0), now()).await;
    assert_eq!(task, fallback_writing(ProficiencyLevel::C2));
  }
}
