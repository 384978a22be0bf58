//! Response evaluator: one strategy per modality, each returning an `EvaluationResult`.
//!
//!   - writing: AI judge with rubric; heuristic when no credentials; fixed degraded result on failure
//!   - speaking: AI judge on the transcript; zero score when no credentials or quota is exhausted
//!   - listening: deterministic exact-match grading, no AI call
//!
//! Nothing here returns an error: every failure becomes a valid, explained result.

use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::ai::{call_json, AiBackend, AiError, CallOutcome, SchemaRequest, Validate};
use crate::config::Prompts;
use crate::domain::{EvaluationResult, McQuestion, ProficiencyLevel};
use crate::util::{count_words, fill_template};

pub const DEGRADED_SCORE: f64 = 55.0;
pub const HEURISTIC_BASE: f64 = 50.0;
pub const HEURISTIC_BONUS: f64 = 10.0;
pub const HEURISTIC_BONUS_WORDS: usize = 80;

/// Structured judge verdict; `MIN..=MAX` bounds the number of feedback bullets.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Judgement<const MIN: usize, const MAX: usize> {
  score: f64,
  feedback: Vec<String>,
}

impl<const MIN: usize, const MAX: usize> Validate for Judgement<MIN, MAX> {
  fn validate(&self) -> Result<(), String> {
    if !self.score.is_finite() || !(0.0..=100.0).contains(&self.score) {
      return Err(format!("score {} outside 0-100", self.score));
    }
    if !(MIN..=MAX).contains(&self.feedback.len()) {
      return Err(format!("expected {MIN}-{MAX} feedback items, got {}", self.feedback.len()));
    }
    Ok(())
  }
}

type WritingJudgement = Judgement<5, 20>;
type SpeakingJudgement = Judgement<5, 15>;

fn judgement_schema(min_items: usize, max_items: usize) -> serde_json::Value {
  json!({
    "type": "object",
    "additionalProperties": false,
    "properties": {
      "score": { "type": "number", "minimum": 0, "maximum": 100 },
      "feedback": { "type": "array", "items": { "type": "string" }, "minItems": min_items, "maxItems": max_items }
    },
    "required": ["score", "feedback"]
  })
}

fn judged<const MIN: usize, const MAX: usize>(j: Judgement<MIN, MAX>) -> EvaluationResult {
  let feedback = j.feedback.into_iter().map(|f| f.trim().to_string()).collect();
  EvaluationResult::new(j.score, feedback)
}

/// Fixed result for a judge call that failed after being configured.
pub fn degraded(e: &AiError) -> EvaluationResult {
  EvaluationResult::new(
    DEGRADED_SCORE,
    vec![
      "AI evaluation failed temporarily.".into(),
      "Please try again later.".into(),
      format!("Debug: {}", e.category()),
    ],
  )
}

/// Offline writing score: 50, plus 10 from 80 words on.
pub fn writing_heuristic(text: &str) -> EvaluationResult {
  let words = count_words(text);
  let bonus = if words >= HEURISTIC_BONUS_WORDS { HEURISTIC_BONUS } else { 0.0 };
  EvaluationResult::new(
    (HEURISTIC_BASE + bonus).min(100.0),
    vec![
      "AI service is not configured (missing OPENAI_API_KEY).".into(),
      "Fallback evaluation was used.".into(),
      format!("Word count: {words}."),
      "Set OPENAI_API_KEY and try again for full AI feedback.".into(),
    ],
  )
}

#[instrument(target = "pipeline", level = "info", skip(ai, prompts, text), fields(text_len = text.len()))]
pub async fn evaluate_writing(ai: Option<&dyn AiBackend>, prompts: &Prompts, text: &str) -> EvaluationResult {
  let req = SchemaRequest {
    name: "writing_assessment",
    prompt: fill_template(&prompts.writing_eval, &[("text", text)]),
    schema: judgement_schema(5, 20),
    temperature: 0.2,
    max_tokens: None,
  };
  let result = match call_json::<WritingJudgement>(ai, &req).await {
    CallOutcome::Ok(j) => judged(j),
    CallOutcome::Degraded(e) => degraded(&e),
    CallOutcome::Unavailable => {
      warn!(target: "pipeline", "Writing judge not configured; heuristic score");
      writing_heuristic(text)
    }
  };
  info!(target: "pipeline", score = result.score, items = result.feedback.len(), "Writing evaluated");
  result
}

#[instrument(target = "pipeline", level = "info", skip(ai, prompts, transcript), fields(transcript_len = transcript.len()))]
pub async fn evaluate_speaking(ai: Option<&dyn AiBackend>, prompts: &Prompts, transcript: &str) -> EvaluationResult {
  let req = SchemaRequest {
    name: "speaking_assessment",
    prompt: fill_template(&prompts.speaking_eval, &[("transcript", transcript)]),
    schema: judgement_schema(5, 15),
    temperature: 0.3,
    max_tokens: Some(450),
  };
  let result = match call_json::<SpeakingJudgement>(ai, &req).await {
    CallOutcome::Ok(j) => judged(j),
    CallOutcome::Degraded(e) if e.is_quota() => EvaluationResult::new(
      0.0,
      vec![
        "AI speaking evaluation is unavailable because your OpenAI account has no remaining quota.".into(),
        "Fix: enable billing/credits, restart the app, then try again.".into(),
        "Debug: insufficient_quota".into(),
      ],
    ),
    CallOutcome::Degraded(e) => degraded(&e),
    CallOutcome::Unavailable => EvaluationResult::new(
      0.0,
      vec![
        "AI speaking feedback unavailable (missing OPENAI_API_KEY).".into(),
        "Enable OpenAI billing/credits to get transcription + speaking feedback.".into(),
      ],
    ),
  };
  info!(target: "pipeline", score = result.score, items = result.feedback.len(), "Speaking evaluated");
  result
}

/// Terminal result when no transcript could be produced. Not retried.
pub fn transcription_failed() -> EvaluationResult {
  EvaluationResult::new(
    0.0,
    vec![
      "Speaking feedback unavailable because transcription failed.".into(),
      "If the service reports insufficient_quota, enable OpenAI billing/credits; otherwise check OPENAI_API_KEY.".into(),
    ],
  )
}

/// Exact-match grading of one submitted option per question.
/// `score = correct / total * 100`, and 0 when there are no questions.
pub fn evaluate_listening(questions: &[McQuestion], level: ProficiencyLevel, answers: &[Option<String>]) -> EvaluationResult {
  let total = questions.len();
  let mut correct = 0usize;
  let mut lines = Vec::new();

  for (i, q) in questions.iter().enumerate() {
    let got = answers.get(i).and_then(|a| a.as_deref());
    if got == Some(q.answer.as_str()) {
      correct += 1;
    } else {
      lines.push(format!("Question {}: Correct answer is '{}'. {}", i + 1, q.answer, q.why.trim()).trim_end().to_string());
    }
  }

  let score = if total == 0 { 0.0 } else { correct as f64 / total as f64 * 100.0 };

  if score == 100.0 {
    let next = match level.next_up() {
      Some(up) => format!("Excellent! All answers correct. Try level {up} next time."),
      None => "Excellent! All answers correct. You are at the top level; keep practising at C2.".to_string(),
    };
    lines.insert(0, next);
  } else {
    lines.insert(0, "Review the audio once more and focus on keywords (names, numbers, cause and effect).".into());
    if score < 50.0 {
      lines.push("Tip: Use a lower level for 2-3 days, then step up again.".into());
    }
  }

  EvaluationResult::new(score, lines)
}
