//! Orchestration of one user action. Handlers stay thin and forward here.
//!
//! This includes:
//!   - serving the pending task of a session, or generating a fresh one
//!   - submitting writing, speaking and listening answers (evaluate, persist)
//!   - dashboard, stats and planner entries (derived on demand)
//!
//! Input validation happens before anything reaches the evaluator, so rejected
//! requests never produce a SubmissionRecord.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::domain::{
  EvaluationResult, ListeningPayload, Modality, PlannerEntry, ProficiencyLevel, SpeakingPayload, SubmissionContent,
  SubmissionRecord, TaskPayload,
};
use crate::evaluator::{evaluate_listening, evaluate_speaking, evaluate_writing, transcription_failed};
use crate::progress::{aggregate, modality_counts, next_session_text, streak_window, week_bounds, weekly_plan};
use crate::protocol::{DashboardOut, StatsOut, SubmitOut, TaskOut};
use crate::state::AppState;
use crate::store::{StoreError, Taken};
use crate::tasks::generate_task;
use crate::transcriber::{transcribe, Transcript};
use crate::util::{sanitize_file_name, trunc_for_log};

pub const DEFAULT_AUDIO_MIME: &str = "audio/webm";
pub const MAX_PLANNED_MINUTES: u64 = 24 * 60;

#[derive(Debug, Error)]
pub enum SubmitError {
  #[error("Please write your essay before submitting.")]
  EmptyEssay,
  #[error("Please record your answer before submitting.")]
  MissingAudio,
  #[error("The recorded audio could not be decoded.")]
  InvalidAudio,
  #[error("No {0} task in progress. Request a new task first.")]
  NoPendingTask(Modality),
  #[error("This task is no longer active. Request a new task.")]
  StaleTask,
  #[error("Minutes must be a whole number between 1 and 1440.")]
  InvalidMinutes,
  #[error("Date must be formatted as YYYY-MM-DD.")]
  InvalidDate,
  #[error("Missing required field: {0}")]
  MissingField(&'static str),
  #[error("storage failure: {0}")]
  Storage(#[from] StoreError),
}

/// Serve the session's pending task for `modality`, generating a new one when
/// none is pending, when `force_new` is set, or when a pending listening task
/// was built for another level.
#[instrument(level = "info", skip(state, rng), fields(%session, %modality))]
pub async fn request_task<R: Rng + Send + ?Sized>(
  state: &AppState,
  session: &str,
  modality: Modality,
  level_raw: Option<&str>,
  force_new: bool,
  rng: &mut R,
  now: DateTime<Utc>,
) -> TaskOut {
  let level = ProficiencyLevel::normalize(level_raw);

  if force_new {
    state.sessions.clear(session, modality).await;
  } else if let Some(task) = state.sessions.pending(session, modality).await {
    let level_changed = modality == Modality::Listening && task.level != level;
    if !level_changed {
      info!(target: "pipeline", id = %task.id, "Serving pending task");
      return TaskOut::from(&task);
    }
    info!(target: "pipeline", pending = %task.level, requested = %level, "Level changed; regenerating");
  }

  let task = generate_task(&state.task_context(), modality, level, rng, now).await;
  state.sessions.put(session, task.clone()).await;
  TaskOut::from(&task)
}

#[instrument(level = "info", skip(state, essay), fields(%user, essay_len = essay.len()))]
pub async fn submit_writing(
  state: &AppState,
  user: &str,
  session: &str,
  essay: &str,
  now: DateTime<Utc>,
) -> Result<SubmitOut, SubmitError> {
  let essay = essay.trim();
  if essay.is_empty() {
    return Err(SubmitError::EmptyEssay);
  }

  let prompt = state.sessions.take(session, Modality::Writing).await;
  let result = evaluate_writing(state.ai(), &state.prompts, essay).await;
  let content = SubmissionContent::Writing { essay: essay.to_string(), prompt };
  persist(state, user, content, result, now).await
}

/// Recorded spoken answer as received from the client.
#[derive(Debug, Default)]
pub struct SpeakingUpload {
  pub audio_base64: String,
  pub mime: Option<String>,
  pub file_name: Option<String>,
  pub notes: Option<String>,
}

/// Accepts raw base64 or a `data:<mime>;base64,` URL.
fn decode_audio(raw: &str) -> Result<Vec<u8>, SubmitError> {
  let raw = raw.trim();
  let b64 = match raw.split_once(";base64,") {
    Some((prefix, rest)) if prefix.starts_with("data:") => rest,
    _ => raw,
  };
  if b64.is_empty() {
    return Err(SubmitError::MissingAudio);
  }
  let bytes = STANDARD.decode(b64).map_err(|_| SubmitError::InvalidAudio)?;
  if bytes.is_empty() {
    return Err(SubmitError::MissingAudio);
  }
  Ok(bytes)
}

/// `speaking_<user>_<yyyymmdd_HHMMSS>_<name>` with both user and name sanitised.
pub fn speaking_file_name(user: &str, original: &str, now: DateTime<Utc>) -> String {
  format!(
    "speaking_{}_{}_{}",
    sanitize_file_name(user),
    now.format("%Y%m%d_%H%M%S"),
    sanitize_file_name(original)
  )
}

#[instrument(level = "info", skip(state, upload), fields(%user, b64_len = upload.audio_base64.len()))]
pub async fn submit_speaking(
  state: &AppState,
  user: &str,
  session: &str,
  upload: SpeakingUpload,
  now: DateTime<Utc>,
) -> Result<SubmitOut, SubmitError> {
  let bytes = decode_audio(&upload.audio_base64)?;
  // Consumed up front so a concurrent submission cannot answer the same topic.
  let topic = state
    .sessions
    .take(session, Modality::Speaking)
    .await
    .ok_or(SubmitError::NoPendingTask(Modality::Speaking))?;

  let mime = upload.mime.filter(|m| !m.trim().is_empty()).unwrap_or_else(|| DEFAULT_AUDIO_MIME.to_string());
  let file_name = speaking_file_name(user, upload.file_name.as_deref().unwrap_or_default(), now);
  let audio = match state.blobs.put(&file_name, &bytes, &mime).await {
    Ok(audio) => audio,
    Err(e) => {
      state.sessions.restore(session, topic).await;
      return Err(e.into());
    }
  };
  info!(target: "pipeline", url = %audio.url, bytes = bytes.len(), "Speaking answer stored");

  let transcript = transcribe(state.ai(), bytes, &file_name, &mime).await;
  let result = match &transcript {
    Transcript::Text(text) => evaluate_speaking(state.ai(), &state.prompts, text).await,
    Transcript::Unavailable => transcription_failed(),
  };

  let content = SubmissionContent::Speaking(SpeakingPayload {
    topic: topic.clone(),
    audio,
    notes: upload.notes.unwrap_or_default().trim().to_string(),
    transcript: transcript.as_text().map(str::to_string),
  });
  let out = persist(state, user, content, result, now).await;
  if out.is_err() {
    state.sessions.restore(session, topic).await;
  }
  out
}

#[instrument(level = "info", skip(state, answers), fields(%user, answers = answers.len()))]
pub async fn submit_listening(
  state: &AppState,
  user: &str,
  session: &str,
  task_id: Option<&str>,
  mut answers: Vec<Option<String>>,
  now: DateTime<Utc>,
) -> Result<SubmitOut, SubmitError> {
  let wanted = task_id.filter(|id| !id.is_empty());
  let task = match state
    .sessions
    .take_if(session, Modality::Listening, |t| wanted.map_or(true, |id| id == t.id))
    .await
  {
    Taken::Task(task) => task,
    Taken::Rejected(pending) => {
      warn!(target: "pipeline", submitted = ?wanted, %pending, "Answers for a task that is no longer pending");
      return Err(SubmitError::StaleTask);
    }
    Taken::Empty => return Err(SubmitError::NoPendingTask(Modality::Listening)),
  };

  let (instructions, passage, questions) = match &task.payload {
    TaskPayload::Listening { instructions, passage, questions } => {
      (instructions.clone(), passage.clone(), questions.clone())
    }
    TaskPayload::Prompt { .. } => return Err(SubmitError::StaleTask),
  };

  answers.resize(questions.len(), None);
  for a in answers.iter_mut() {
    if a.as_deref().is_some_and(|s| s.trim().is_empty()) {
      *a = None;
    }
  }
  let result = evaluate_listening(&questions, task.level, &answers);

  let content = SubmissionContent::Listening(ListeningPayload {
    task_id: task.id.clone(),
    level: task.level,
    title: task.title.clone(),
    instructions,
    passage,
    questions,
    audio: task.audio.clone(),
    user_answers: answers,
    score: result.score,
    source: task.source,
  });
  let out = persist(state, user, content, result, now).await;
  if out.is_err() {
    state.sessions.restore(session, task).await;
  }
  out
}

async fn persist(
  state: &AppState,
  user: &str,
  content: SubmissionContent,
  result: EvaluationResult,
  now: DateTime<Utc>,
) -> Result<SubmitOut, SubmitError> {
  let record = SubmissionRecord::evaluated(user, content, &result, now);
  let out = SubmitOut { submission_id: record.id.clone(), score: result.score, feedback: result.feedback };
  info!(target: "pipeline", id = %record.id, modality = %record.modality, score = result.score, "Submission stored");
  state.submissions.append(record).await?;
  Ok(out)
}

#[instrument(level = "info", skip(state), fields(%user, %today))]
pub async fn dashboard(state: &AppState, user: &str, today: NaiveDate) -> Result<DashboardOut, SubmitError> {
  let history = state.submissions.list_for_user(user).await?;
  let progress = aggregate(&history, today);

  let (week_start, week_end) = week_bounds(today);
  let week = state.planner.entries_between(user, week_start, week_end).await?;
  let next = state.planner.next_entry(user, today).await?;

  Ok(DashboardOut {
    overall_score: progress.overall_score,
    level: progress.level,
    streak: progress.streak,
    streak_window: streak_window(&history, today),
    next_session: next.as_ref().map(next_session_text),
    weekly: weekly_plan(&week, today),
  })
}

#[instrument(level = "info", skip(state), fields(%user))]
pub async fn stats(state: &AppState, user: &str) -> Result<StatsOut, SubmitError> {
  let submissions = state.submissions.list_for_user(user).await?;
  Ok(StatsOut { counts: modality_counts(&submissions), submissions })
}

fn parse_minutes(raw: &Value) -> Result<u32, SubmitError> {
  let n = match raw {
    Value::Number(n) => n.as_u64(),
    Value::String(s) => s.trim().parse::<u64>().ok(),
    _ => None,
  };
  match n {
    Some(m) if (1..=MAX_PLANNED_MINUTES).contains(&m) => Ok(m as u32),
    _ => Err(SubmitError::InvalidMinutes),
  }
}

/// Validate and append one planner entry. `minutes` may arrive as a JSON
/// number or a numeric string.
#[instrument(level = "info", skip(state, activity, minutes), fields(%user))]
pub async fn add_planner_entry(
  state: &AppState,
  user: &str,
  day: Option<&str>,
  activity: Option<&str>,
  minutes: Option<&Value>,
) -> Result<PlannerEntry, SubmitError> {
  let day = day.map(str::trim).filter(|s| !s.is_empty()).ok_or(SubmitError::MissingField("day"))?;
  let activity = activity.map(str::trim).filter(|s| !s.is_empty()).ok_or(SubmitError::MissingField("activity"))?;
  let minutes = minutes.filter(|v| !v.is_null()).ok_or(SubmitError::MissingField("minutes"))?;

  let minutes = parse_minutes(minutes)?;
  let date = NaiveDate::parse_from_str(day, "%Y-%m-%d").map_err(|_| SubmitError::InvalidDate)?;

  let entry = PlannerEntry { user_id: user.to_string(), date, activity: activity.to_string(), minutes };
  state.planner.add_entry(entry.clone()).await?;
  info!(target: "britais_backend", %date, minutes, activity = %trunc_for_log(activity, 40), "Planner entry added");
  Ok(entry)
}
