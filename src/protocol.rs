//! Public protocol structs for the HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{
    ExerciseTask, LevelLabel, McQuestion, Modality, ProficiencyLevel, SubmissionRecord, TaskPayload, TaskSource,
};
use crate::progress::{DayMark, WeeklyPlan};

/// A multiple-choice question as shown to the learner (no answer, no explanation).
#[derive(Debug, Serialize)]
pub struct QuestionOut {
    pub question: String,
    pub options: Vec<String>,
}

impl From<&McQuestion> for QuestionOut {
    fn from(q: &McQuestion) -> Self {
        Self { question: q.question.clone(), options: q.options.clone() }
    }
}

/// DTO for task delivery. Answers stay server-side until submission.
#[derive(Debug, Serialize)]
pub struct TaskOut {
    pub id: String,
    pub modality: Modality,
    pub level: ProficiencyLevel,
    pub title: String,
    pub source: TaskSource,

    /// Writing/speaking prompt and guiding questions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub guiding_questions: Vec<String>,

    /// Listening instructions, passage and questions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passage: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub questions: Vec<QuestionOut>,

    pub audio_url: Option<String>,
}

impl From<&ExerciseTask> for TaskOut {
    fn from(t: &ExerciseTask) -> Self {
        let mut out = TaskOut {
            id: t.id.clone(),
            modality: t.modality,
            level: t.level,
            title: t.title.clone(),
            source: t.source,
            prompt: None,
            guiding_questions: Vec::new(),
            instructions: None,
            passage: None,
            questions: Vec::new(),
            audio_url: t.audio.as_ref().map(|a| a.url.clone()),
        };
        match &t.payload {
            TaskPayload::Prompt { prompt, questions } => {
                out.prompt = Some(prompt.clone());
                out.guiding_questions = questions.clone();
            }
            TaskPayload::Listening { instructions, passage, questions } => {
                out.instructions = Some(instructions.clone());
                out.passage = Some(passage.clone());
                out.questions = questions.iter().map(QuestionOut::from).collect();
            }
        }
        out
    }
}

#[derive(Debug, Deserialize)]
pub struct TaskQuery {
    pub modality: String,
    pub level: Option<String>,
    #[serde(default)]
    pub new: bool,
}

#[derive(Deserialize)]
pub struct WritingIn {
    #[serde(default)]
    pub essay: String,
}

#[derive(Deserialize)]
pub struct SpeakingIn {
    #[serde(rename = "audioBase64", default)]
    pub audio_base64: String,
    pub mime: Option<String>,
    #[serde(rename = "fileName")]
    pub file_name: Option<String>,
    pub notes: Option<String>,
}

#[derive(Deserialize)]
pub struct ListeningIn {
    #[serde(rename = "taskId")]
    pub task_id: Option<String>,
    #[serde(default)]
    pub answers: Vec<Option<String>>,
}

/// Outcome of one evaluated submission.
#[derive(Debug, Serialize)]
pub struct SubmitOut {
    pub submission_id: String,
    pub score: f64,
    pub feedback: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct DashboardOut {
    /// `null` when there is no data yet.
    pub overall_score: Option<u32>,
    pub level: LevelLabel,
    pub streak: u32,
    pub streak_window: Vec<DayMark>,
    pub next_session: Option<String>,
    pub weekly: WeeklyPlan,
}

#[derive(Debug, Serialize)]
pub struct StatsOut {
    pub counts: BTreeMap<String, usize>,
    pub submissions: Vec<SubmissionRecord>,
}

/// Planner fields are all optional at the wire level so validation can name
/// the missing one; `minutes` is checked for being a whole number later.
#[derive(Deserialize)]
pub struct PlannerIn {
    pub day: Option<String>,
    pub activity: Option<String>,
    pub minutes: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct ErrorOut {
    pub error: String,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
    pub ai_enabled: bool,
}
