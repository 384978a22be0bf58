//! Domain models used by the backend: proficiency levels, modalities, exercise tasks,
//! submission records and evaluation results.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// CEFR proficiency level, ordered from lowest to highest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ProficiencyLevel {
  A2,
  B1,
  B2,
  C1,
  C2,
}

impl ProficiencyLevel {
  pub const ALL: [ProficiencyLevel; 5] = [
    ProficiencyLevel::A2,
    ProficiencyLevel::B1,
    ProficiencyLevel::B2,
    ProficiencyLevel::C1,
    ProficiencyLevel::C2,
  ];

  /// Strict parse of a CEFR label (case and surrounding whitespace ignored).
  pub fn parse(raw: &str) -> Option<Self> {
    let raw = raw.trim();
    Self::ALL.into_iter().find(|l| l.as_str().eq_ignore_ascii_case(raw))
  }

  /// Missing or invalid input normalizes to B1.
  pub fn normalize(raw: Option<&str>) -> Self {
    raw.and_then(Self::parse).unwrap_or(Self::B1)
  }

  /// Half-open thresholds: <50 A2, <65 B1, <78 B2, <90 C1, else C2.
  pub fn from_score(score: f64) -> Self {
    if score < 50.0 {
      Self::A2
    } else if score < 65.0 {
      Self::B1
    } else if score < 78.0 {
      Self::B2
    } else if score < 90.0 {
      Self::C1
    } else {
      Self::C2
    }
  }

  pub fn next_up(self) -> Option<Self> {
    match self {
      Self::A2 => Some(Self::B1),
      Self::B1 => Some(Self::B2),
      Self::B2 => Some(Self::C1),
      Self::C1 => Some(Self::C2),
      Self::C2 => None,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::A2 => "A2",
      Self::B1 => "B1",
      Self::B2 => "B2",
      Self::C1 => "C1",
      Self::C2 => "C2",
    }
  }
}

impl fmt::Display for ProficiencyLevel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Level shown on the dashboard. `NoData` is never collapsed into a real tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LevelLabel {
  Level(ProficiencyLevel),
  NoData,
}

impl LevelLabel {
  pub fn from_overall(overall: Option<u32>) -> Self {
    match overall {
      Some(score) => LevelLabel::Level(ProficiencyLevel::from_score(score as f64)),
      None => LevelLabel::NoData,
    }
  }
}

impl fmt::Display for LevelLabel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      LevelLabel::Level(l) => f.write_str(l.as_str()),
      LevelLabel::NoData => f.write_str("—"),
    }
  }
}

impl Serialize for LevelLabel {
  fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&self.to_string())
  }
}

/// Exercise modality; selects the evaluation strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Modality {
  Writing,
  Speaking,
  Listening,
}

impl Modality {
  pub const ALL: [Modality; 3] = [Modality::Writing, Modality::Speaking, Modality::Listening];

  pub fn parse(raw: &str) -> Option<Self> {
    match raw.trim().to_ascii_lowercase().as_str() {
      "writing" => Some(Self::Writing),
      "speaking" => Some(Self::Speaking),
      "listening" => Some(Self::Listening),
      _ => None,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Writing => "WRITING",
      Self::Speaking => "SPEAKING",
      Self::Listening => "LISTENING",
    }
  }
}

impl fmt::Display for Modality {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Where did the task content come from?
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskSource {
  AiGenerated, // produced by the AI service and validated
  Fallback,    // built-in offline bank
}

/// One multiple-choice listening question. `answer` equals one of `options` verbatim.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct McQuestion {
  pub question: String,
  pub options: Vec<String>,
  pub answer: String,
  #[serde(default)]
  pub why: String,
}

/// Retrievable reference to a stored audio blob.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AudioRef {
  pub path: String,
  pub url: String,
  pub mimetype: String,
}

/// Modality-specific task body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskPayload {
  /// Writing or speaking: free-form prompt with a few guiding questions.
  Prompt {
    prompt: String,
    #[serde(default)]
    questions: Vec<String>,
  },
  /// Listening: passage plus exactly three four-option questions.
  Listening {
    instructions: String,
    passage: String,
    questions: Vec<McQuestion>,
  },
}

impl TaskPayload {
  /// Text that identifies the task together with its title.
  pub fn body(&self) -> &str {
    match self {
      TaskPayload::Prompt { prompt, .. } => prompt,
      TaskPayload::Listening { passage, .. } => passage,
    }
  }
}

/// One generated exercise instance, held in session state until answered.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExerciseTask {
  pub id: String,
  pub modality: Modality,
  pub level: ProficiencyLevel,
  pub title: String,
  pub payload: TaskPayload,
  #[serde(default)]
  pub audio: Option<AudioRef>,
  pub source: TaskSource,
}

impl ExerciseTask {
  pub fn new(
    modality: Modality,
    level: ProficiencyLevel,
    title: String,
    payload: TaskPayload,
    source: TaskSource,
  ) -> Self {
    let id = fingerprint(&title, payload.body());
    Self { id, modality, level, title, payload, audio: None, source }
  }

  pub fn body(&self) -> &str {
    self.payload.body()
  }

  /// Listening questions, empty for prompt tasks.
  pub fn mc_questions(&self) -> &[McQuestion] {
    match &self.payload {
      TaskPayload::Listening { questions, .. } => questions,
      TaskPayload::Prompt { .. } => &[],
    }
  }
}

/// Short content identifier: first 12 hex chars of SHA-256 over `title\nbody`.
/// Identifies identical content across requests; not a security primitive.
pub fn fingerprint(title: &str, body: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(title.as_bytes());
  hasher.update(b"\n");
  hasher.update(body.as_bytes());
  let digest = hex::encode(hasher.finalize());
  digest[..12].to_string()
}

/// Transient evaluation outcome; flattened into a `SubmissionRecord`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EvaluationResult {
  pub score: f64,
  pub feedback: Vec<String>,
}

impl EvaluationResult {
  pub fn new(score: f64, feedback: Vec<String>) -> Self {
    Self { score: score.clamp(0.0, 100.0), feedback }
  }

  pub fn feedback_text(&self) -> String {
    self.feedback.join("\n")
  }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpeakingPayload {
  pub topic: ExerciseTask,
  pub audio: AudioRef,
  #[serde(default)]
  pub notes: String,
  pub transcript: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ListeningPayload {
  pub task_id: String,
  pub level: ProficiencyLevel,
  pub title: String,
  pub instructions: String,
  pub passage: String,
  pub questions: Vec<McQuestion>,
  pub audio: Option<AudioRef>,
  pub user_answers: Vec<Option<String>>,
  pub score: f64,
  pub source: TaskSource,
}

/// Raw content of a submission, shaped by modality.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SubmissionContent {
  Writing {
    essay: String,
    #[serde(default)]
    prompt: Option<ExerciseTask>,
  },
  Speaking(SpeakingPayload),
  Listening(ListeningPayload),
}

impl SubmissionContent {
  pub fn modality(&self) -> Modality {
    match self {
      SubmissionContent::Writing { .. } => Modality::Writing,
      SubmissionContent::Speaking(_) => Modality::Speaking,
      SubmissionContent::Listening(_) => Modality::Listening,
    }
  }
}

/// Persisted outcome of one exercise attempt. Never mutated after insertion.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
  pub id: String,
  pub user_id: String,
  pub modality: Modality,
  pub content: SubmissionContent,
  pub score: Option<f64>,
  pub feedback: String,
  pub created_at: DateTime<Utc>,
}

impl SubmissionRecord {
  pub fn evaluated(
    user_id: &str,
    content: SubmissionContent,
    result: &EvaluationResult,
    created_at: DateTime<Utc>,
  ) -> Self {
    Self {
      id: Uuid::new_v4().to_string(),
      user_id: user_id.to_string(),
      modality: content.modality(),
      content,
      score: Some(result.score),
      feedback: result.feedback_text(),
      created_at,
    }
  }
}

/// Planned practice time for one day. Intent only; never counted toward the streak.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlannerEntry {
  pub user_id: String,
  pub date: chrono::NaiveDate,
  pub activity: String,
  pub minutes: u32,
}
