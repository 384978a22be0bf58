//! Collaborator seams used by the pipeline, plus the in-memory / local-disk
//! implementations the server runs with.
//!
//!   - `SubmissionStore`: append-only submission history, queried newest first
//!   - `PlannerStore`: append-only planner entries, queried by date range
//!   - `BlobStore`: write bytes under a generated name, get a retrievable reference back
//!   - `SessionStore`: at most one pending task per modality per session

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::domain::{AudioRef, ExerciseTask, Modality, PlannerEntry, SubmissionRecord};

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),
  #[error("invalid blob name: {0}")]
  InvalidName(String),
}

#[async_trait]
pub trait SubmissionStore: Send + Sync {
  async fn append(&self, record: SubmissionRecord) -> Result<(), StoreError>;
  /// All records for `user_id`, newest first.
  async fn list_for_user(&self, user_id: &str) -> Result<Vec<SubmissionRecord>, StoreError>;
}

#[async_trait]
pub trait PlannerStore: Send + Sync {
  async fn add_entry(&self, entry: PlannerEntry) -> Result<(), StoreError>;
  /// Entries dated within `[from, to]`, earliest first.
  async fn entries_between(&self, user_id: &str, from: NaiveDate, to: NaiveDate) -> Result<Vec<PlannerEntry>, StoreError>;
  /// First entry dated on or after `day`.
  async fn next_entry(&self, user_id: &str, day: NaiveDate) -> Result<Option<PlannerEntry>, StoreError>;
}

#[async_trait]
pub trait BlobStore: Send + Sync {
  async fn put(&self, file_name: &str, bytes: &[u8], mimetype: &str) -> Result<AudioRef, StoreError>;
}

/// In-memory history and planner, keyed by user.
#[derive(Default)]
pub struct MemoryStore {
  submissions: RwLock<HashMap<String, Vec<SubmissionRecord>>>,
  planner: RwLock<HashMap<String, Vec<PlannerEntry>>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl SubmissionStore for MemoryStore {
  #[instrument(level = "debug", skip(self, record), fields(user = %record.user_id, modality = %record.modality))]
  async fn append(&self, record: SubmissionRecord) -> Result<(), StoreError> {
    let mut subs = self.submissions.write().await;
    subs.entry(record.user_id.clone()).or_default().push(record);
    Ok(())
  }

  async fn list_for_user(&self, user_id: &str) -> Result<Vec<SubmissionRecord>, StoreError> {
    let subs = self.submissions.read().await;
    let mut out = subs.get(user_id).cloned().unwrap_or_default();
    out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(out)
  }
}

#[async_trait]
impl PlannerStore for MemoryStore {
  async fn add_entry(&self, entry: PlannerEntry) -> Result<(), StoreError> {
    let mut planner = self.planner.write().await;
    planner.entry(entry.user_id.clone()).or_default().push(entry);
    Ok(())
  }

  async fn entries_between(&self, user_id: &str, from: NaiveDate, to: NaiveDate) -> Result<Vec<PlannerEntry>, StoreError> {
    let planner = self.planner.read().await;
    let mut out: Vec<PlannerEntry> = planner
      .get(user_id)
      .map(|v| v.iter().filter(|e| e.date >= from && e.date <= to).cloned().collect())
      .unwrap_or_default();
    out.sort_by_key(|e| e.date);
    Ok(out)
  }

  async fn next_entry(&self, user_id: &str, day: NaiveDate) -> Result<Option<PlannerEntry>, StoreError> {
    let planner = self.planner.read().await;
    Ok(planner
      .get(user_id)
      .and_then(|v| v.iter().filter(|e| e.date >= day).min_by_key(|e| e.date).cloned()))
  }
}

/// Blobs written to a local directory and served back under `url_prefix`.
pub struct LocalBlobStore {
  dir: PathBuf,
  url_prefix: String,
}

impl LocalBlobStore {
  pub fn new(dir: impl Into<PathBuf>, url_prefix: &str) -> Self {
    Self { dir: dir.into(), url_prefix: url_prefix.trim_end_matches('/').to_string() }
  }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
  #[instrument(level = "debug", skip(self, bytes), fields(%file_name, len = bytes.len()))]
  async fn put(&self, file_name: &str, bytes: &[u8], mimetype: &str) -> Result<AudioRef, StoreError> {
    if file_name.is_empty() || file_name.contains(['/', '\\']) || file_name.starts_with('.') {
      return Err(StoreError::InvalidName(file_name.to_string()));
    }
    tokio::fs::create_dir_all(&self.dir).await?;
    tokio::fs::write(self.dir.join(file_name), bytes).await?;
    debug!(target: "britais_backend", %file_name, "Blob stored");
    Ok(AudioRef {
      path: format!("uploads/{file_name}"),
      url: format!("{}/{}", self.url_prefix, file_name),
      mimetype: mimetype.to_string(),
    })
  }
}

#[derive(Default, Clone)]
struct PendingTasks {
  writing: Option<ExerciseTask>,
  speaking: Option<ExerciseTask>,
  listening: Option<ExerciseTask>,
}

impl PendingTasks {
  fn get(&self, modality: Modality) -> Option<&ExerciseTask> {
    match modality {
      Modality::Writing => self.writing.as_ref(),
      Modality::Speaking => self.speaking.as_ref(),
      Modality::Listening => self.listening.as_ref(),
    }
  }

  fn slot(&mut self, modality: Modality) -> &mut Option<ExerciseTask> {
    match modality {
      Modality::Writing => &mut self.writing,
      Modality::Speaking => &mut self.speaking,
      Modality::Listening => &mut self.listening,
    }
  }

  fn is_empty(&self) -> bool {
    self.writing.is_none() && self.speaking.is_none() && self.listening.is_none()
  }
}

/// Result of a conditional take.
#[derive(Debug, PartialEq)]
pub enum Taken {
  Task(ExerciseTask),
  /// A task is pending but was not accepted; it stays pending. Carries its id.
  Rejected(String),
  Empty,
}

/// Ephemeral per-session state between task generation and submission.
/// Sessions never observe each other's pending tasks; a session with nothing
/// pending holds no entry.
#[derive(Default)]
pub struct SessionStore {
  inner: RwLock<HashMap<String, PendingTasks>>,
}

impl SessionStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub async fn pending(&self, session: &str, modality: Modality) -> Option<ExerciseTask> {
    let inner = self.inner.read().await;
    inner.get(session).and_then(|p| p.get(modality).cloned())
  }

  /// Replace the pending task of the task's modality.
  pub async fn put(&self, session: &str, task: ExerciseTask) {
    let mut inner = self.inner.write().await;
    let modality = task.modality;
    *inner.entry(session.to_string()).or_default().slot(modality) = Some(task);
  }

  /// Put a taken task back unless a newer one was issued meanwhile.
  pub async fn restore(&self, session: &str, task: ExerciseTask) {
    let mut inner = self.inner.write().await;
    let slot = inner.entry(session.to_string()).or_default().slot(task.modality);
    if slot.is_none() {
      *slot = Some(task);
    }
  }

  /// Remove and return the pending task; a task is answered at most once.
  pub async fn take(&self, session: &str, modality: Modality) -> Option<ExerciseTask> {
    match self.take_if(session, modality, |_| true).await {
      Taken::Task(task) => Some(task),
      _ => None,
    }
  }

  /// Check and remove under one lock, so concurrent submissions cannot both
  /// consume the same task.
  pub async fn take_if<F>(&self, session: &str, modality: Modality, accept: F) -> Taken
  where
    F: FnOnce(&ExerciseTask) -> bool,
  {
    let mut inner = self.inner.write().await;
    let Some(pending) = inner.get_mut(session) else {
      return Taken::Empty;
    };
    let verdict = pending.get(modality).map(|task| (accept(task), task.id.clone()));
    let taken = match verdict {
      None => Taken::Empty,
      Some((false, id)) => Taken::Rejected(id),
      Some((true, _)) => pending.slot(modality).take().map_or(Taken::Empty, Taken::Task),
    };
    if pending.is_empty() {
      inner.remove(session);
    }
    taken
  }

  pub async fn clear(&self, session: &str, modality: Modality) {
    self.take(session, modality).await;
  }

  #[cfg(test)]
  async fn session_count(&self) -> usize {
    self.inner.read().await.len()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{EvaluationResult, SubmissionContent};
  use crate::seeds::{fallback_listening, fallback_writing};
  use crate::domain::ProficiencyLevel;
  use chrono::{Duration, TimeZone, Utc};

  fn record(user: &str, hours_ago: i64) -> SubmissionRecord {
    let at = Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap() - Duration::hours(hours_ago);
    SubmissionRecord::evaluated(
      user,
      SubmissionContent::Writing { essay: format!("{hours_ago}"), prompt: None },
      &EvaluationResult::new(60.0, vec![]),
      at,
    )
  }

  #[tokio::test]
  async fn history_is_newest_first_and_per_user() {
    let store = MemoryStore::new();
    store.append(record("u1", 5)).await.unwrap();
    store.append(record("u1", 1)).await.unwrap();
    store.append(record("u2", 0)).await.unwrap();
    store.append(record("u1", 30)).await.unwrap();

    let hist = store.list_for_user("u1").await.unwrap();
    assert_eq!(hist.len(), 3);
    assert!(hist.windows(2).all(|w| w[0].created_at >= w[1].created_at));
    assert!(store.list_for_user("nobody").await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn planner_range_and_next_entry() {
    let store = MemoryStore::new();
    let d = |day| NaiveDate::from_ymd_opt(2026, 10, day).unwrap();
    for (day, minutes) in [(12, 30), (14, 20), (19, 45), (25, 10)] {
      store
        .add_entry(PlannerEntry { user_id: "u1".into(), date: d(day), activity: "Writing".into(), minutes })
        .await
        .unwrap();
    }
    let week = store.entries_between("u1", d(12), d(18)).await.unwrap();
    assert_eq!(week.iter().map(|e| e.minutes).sum::<u32>(), 50);
    let next = store.next_entry("u1", d(18)).await.unwrap().unwrap();
    assert_eq!(next.date, d(19));
    assert!(store.next_entry("u1", d(26)).await.unwrap().is_none());
  }

  #[tokio::test]
  async fn sessions_are_isolated_and_take_is_single_use() {
    let sessions = SessionStore::new();
    let task = fallback_listening(ProficiencyLevel::B2);
    sessions.put("s1", task.clone()).await;
    sessions.put("s2", fallback_writing(ProficiencyLevel::A2)).await;

    assert!(sessions.pending("s2", Modality::Listening).await.is_none());
    assert_eq!(sessions.pending("s1", Modality::Listening).await, Some(task.clone()));
    assert_eq!(sessions.take("s1", Modality::Listening).await, Some(task));
    assert!(sessions.take("s1", Modality::Listening).await.is_none());
    assert!(sessions.pending("s2", Modality::Writing).await.is_some());
  }

  #[tokio::test]
  async fn conditional_take_keeps_rejected_task() {
    let sessions = SessionStore::new();
    let task = fallback_listening(ProficiencyLevel::A2);
    sessions.put("s1", task.clone()).await;

    let rejected = sessions.take_if("s1", Modality::Listening, |t| t.id == "000000000000").await;
    assert_eq!(rejected, Taken::Rejected(task.id.clone()));
    assert_eq!(sessions.pending("s1", Modality::Listening).await, Some(task.clone()));

    let id = task.id.clone();
    assert_eq!(sessions.take_if("s1", Modality::Listening, |t| t.id == id).await, Taken::Task(task));
    assert_eq!(sessions.take_if("s1", Modality::Listening, |_| true).await, Taken::Empty);
  }

  #[tokio::test]
  async fn restore_does_not_overwrite_a_newer_task() {
    let sessions = SessionStore::new();
    let old = fallback_writing(ProficiencyLevel::A2);
    let newer = fallback_writing(ProficiencyLevel::C2);
    sessions.put("s1", newer.clone()).await;
    sessions.restore("s1", old.clone()).await;
    assert_eq!(sessions.pending("s1", Modality::Writing).await, Some(newer));

    sessions.clear("s1", Modality::Writing).await;
    sessions.restore("s1", old.clone()).await;
    assert_eq!(sessions.pending("s1", Modality::Writing).await, Some(old));
  }

  #[tokio::test]
  async fn answered_sessions_are_dropped() {
    let sessions = SessionStore::new();
    sessions.put("s1", fallback_listening(ProficiencyLevel::B1)).await;
    sessions.put("s1", fallback_writing(ProficiencyLevel::B1)).await;
    sessions.put("s2", fallback_writing(ProficiencyLevel::B1)).await;
    assert_eq!(sessions.session_count().await, 2);

    sessions.take("s1", Modality::Listening).await;
    assert_eq!(sessions.session_count().await, 2);
    sessions.take("s1", Modality::Writing).await;
    sessions.clear("s2", Modality::Writing).await;
    assert_eq!(sessions.session_count().await, 0);

    sessions.clear("never-seen", Modality::Speaking).await;
    assert_eq!(sessions.session_count().await, 0);
  }

  #[tokio::test]
  async fn blobs_land_in_the_upload_dir() {
    let dir = tempfile::tempdir().unwrap();
    let blobs = LocalBlobStore::new(dir.path(), "/uploads/");
    let r = blobs.put("clip.mp3", b"ID3", "audio/mpeg").await.unwrap();
    assert_eq!(r.url, "/uploads/clip.mp3");
    assert_eq!(r.path, "uploads/clip.mp3");
    assert_eq!(std::fs::read(dir.path().join("clip.mp3")).unwrap(), b"ID3");
    assert!(blobs.put("../escape.mp3", b"x", "audio/mpeg").await.is_err());
  }
}
