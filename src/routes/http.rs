//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented and logs the caller plus basic result info.

use std::sync::Arc;
use axum::{
  async_trait,
  extract::{FromRequestParts, Query, State},
  http::{request::Parts, StatusCode},
  response::{IntoResponse, Response},
  Json,
};
use chrono::Utc;
use rand::{rngs::StdRng, SeedableRng};
use tracing::{error, info, instrument, warn};

use crate::domain::{Modality, PlannerEntry};
use crate::logic::*;
use crate::protocol::*;
use crate::state::AppState;

pub const USER_HEADER: &str = "x-user-id";
pub const SESSION_HEADER: &str = "x-session-id";

/// Authenticated caller and the session key its pending tasks live under.
#[derive(Debug, Clone)]
pub struct Caller {
  pub user: String,
  pub session: String,
}

fn header_value(parts: &Parts, name: &str) -> Option<String> {
  parts
    .headers
    .get(name)
    .and_then(|v| v.to_str().ok())
    .map(|v| v.trim().to_string())
    .filter(|v| !v.is_empty())
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Caller {
  type Rejection = (StatusCode, Json<ErrorOut>);

  async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
    let Some(user) = header_value(parts, USER_HEADER) else {
      return Err((StatusCode::UNAUTHORIZED, Json(ErrorOut { error: "Please log in first.".into() })));
    };
    let session = header_value(parts, SESSION_HEADER).unwrap_or_else(|| user.clone());
    Ok(Caller { user, session })
  }
}

impl IntoResponse for SubmitError {
  fn into_response(self) -> Response {
    let status = match &self {
      SubmitError::NoPendingTask(_) | SubmitError::StaleTask => StatusCode::CONFLICT,
      SubmitError::Storage(e) => {
        error!(target: "britais_backend", error = %e, "Storage failure");
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorOut { error: "Something went wrong. Please try again.".into() }))
          .into_response();
      }
      _ => StatusCode::BAD_REQUEST,
    };
    warn!(target: "britais_backend", %status, error = %self, "Request rejected");
    (status, Json(ErrorOut { error: self.to_string() })).into_response()
  }
}

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(HealthOut { ok: true, ai_enabled: state.ai.is_some() })
}

#[instrument(level = "info", skip(state, caller), fields(user = %caller.user, modality = %q.modality))]
pub async fn http_get_task(
  State(state): State<Arc<AppState>>,
  caller: Caller,
  Query(q): Query<TaskQuery>,
) -> Response {
  let Some(modality) = Modality::parse(&q.modality) else {
    return (StatusCode::BAD_REQUEST, Json(ErrorOut { error: format!("Unknown modality: {}", q.modality) })).into_response();
  };
  let mut rng = StdRng::from_entropy();
  let task = request_task(&state, &caller.session, modality, q.level.as_deref(), q.new, &mut rng, Utc::now()).await;
  info!(target: "britais_backend", id = %task.id, level = %task.level, "HTTP task served");
  Json(task).into_response()
}

#[instrument(level = "info", skip(state, caller, body), fields(user = %caller.user, essay_len = body.essay.len()))]
pub async fn http_post_writing(
  State(state): State<Arc<AppState>>,
  caller: Caller,
  Json(body): Json<WritingIn>,
) -> Result<Json<SubmitOut>, SubmitError> {
  let out = submit_writing(&state, &caller.user, &caller.session, &body.essay, Utc::now()).await?;
  info!(target: "britais_backend", id = %out.submission_id, score = out.score, "HTTP writing evaluated");
  Ok(Json(out))
}

#[instrument(level = "info", skip(state, caller, body), fields(user = %caller.user, b64_len = body.audio_base64.len()))]
pub async fn http_post_speaking(
  State(state): State<Arc<AppState>>,
  caller: Caller,
  Json(body): Json<SpeakingIn>,
) -> Result<Json<SubmitOut>, SubmitError> {
  let upload = SpeakingUpload {
    audio_base64: body.audio_base64,
    mime: body.mime,
    file_name: body.file_name,
    notes: body.notes,
  };
  let out = submit_speaking(&state, &caller.user, &caller.session, upload, Utc::now()).await?;
  info!(target: "britais_backend", id = %out.submission_id, score = out.score, "HTTP speaking evaluated");
  Ok(Json(out))
}

#[instrument(level = "info", skip(state, caller, body), fields(user = %caller.user, answers = body.answers.len()))]
pub async fn http_post_listening(
  State(state): State<Arc<AppState>>,
  caller: Caller,
  Json(body): Json<ListeningIn>,
) -> Result<Json<SubmitOut>, SubmitError> {
  let out = submit_listening(&state, &caller.user, &caller.session, body.task_id.as_deref(), body.answers, Utc::now()).await?;
  info!(target: "britais_backend", id = %out.submission_id, score = out.score, "HTTP listening evaluated");
  Ok(Json(out))
}

#[instrument(level = "info", skip(state, caller), fields(user = %caller.user))]
pub async fn http_get_dashboard(
  State(state): State<Arc<AppState>>,
  caller: Caller,
) -> Result<Json<DashboardOut>, SubmitError> {
  Ok(Json(dashboard(&state, &caller.user, Utc::now().date_naive()).await?))
}

#[instrument(level = "info", skip(state, caller), fields(user = %caller.user))]
pub async fn http_get_stats(
  State(state): State<Arc<AppState>>,
  caller: Caller,
) -> Result<Json<StatsOut>, SubmitError> {
  Ok(Json(stats(&state, &caller.user).await?))
}

#[instrument(level = "info", skip(state, caller, body), fields(user = %caller.user))]
pub async fn http_post_planner(
  State(state): State<Arc<AppState>>,
  caller: Caller,
  Json(body): Json<PlannerIn>,
) -> Result<(StatusCode, Json<PlannerEntry>), SubmitError> {
  let entry = add_planner_entry(
    &state,
    &caller.user,
    body.day.as_deref(),
    body.activity.as_deref(),
    body.minutes.as_ref(),
  )
  .await?;
  Ok((StatusCode::CREATED, Json(entry)))
}
