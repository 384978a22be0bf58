//! Speech synthesis adapter for listening passages. Best-effort: a failure only
//! leaves the task without audio.

use chrono::{DateTime, Utc};
use tracing::{error, info, instrument, warn};

use crate::ai::{call_synthesize, AiBackend, CallOutcome};
use crate::domain::ExerciseTask;
use crate::store::BlobStore;

pub const LISTENING_AUDIO_MIME: &str = "audio/mpeg";

/// `listening_<yyyymmdd_HHMMSS>_<fingerprint>.mp3`
pub fn listening_file_name(task_id: &str, now: DateTime<Utc>) -> String {
  format!("listening_{}_{}.mp3", now.format("%Y%m%d_%H%M%S"), task_id)
}

/// Synthesize the task body and attach the stored audio reference.
/// The task is returned unchanged (audio stays `None`) on any failure.
#[instrument(target = "pipeline", level = "info", skip_all, fields(task_id = %task.id))]
pub async fn attach_audio(
  ai: Option<&dyn AiBackend>,
  blobs: &dyn BlobStore,
  mut task: ExerciseTask,
  now: DateTime<Utc>,
) -> ExerciseTask {
  let outcome = call_synthesize(ai, task.body()).await;
  let bytes = match outcome {
    CallOutcome::Ok(bytes) => bytes,
    CallOutcome::Degraded(e) => {
      warn!(target: "pipeline", category = e.category(), "No audio for listening task");
      return task;
    }
    CallOutcome::Unavailable => return task,
  };

  let file_name = listening_file_name(&task.id, now);
  match blobs.put(&file_name, &bytes, LISTENING_AUDIO_MIME).await {
    Ok(audio) => {
      info!(target: "pipeline", url = %audio.url, "Listening audio stored");
      task.audio = Some(audio);
    }
    Err(e) => error!(target: "pipeline", error = %e, "Failed to store listening audio"),
  }
  task
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ai::stub::ScriptedAi;
  use crate::ai::AiError;
  use crate::domain::ProficiencyLevel;
  use crate::seeds::fallback_listening;
  use crate::store::LocalBlobStore;
  use chrono::TimeZone;

  fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 18, 9, 5, 7).unwrap()
  }

  #[test]
  fn file_name_embeds_timestamp_and_fingerprint() {
    assert_eq!(listening_file_name("abc123def456", now()), "listening_20261018_090507_abc123def456.mp3");
  }

  #[tokio::test]
  async fn audio_is_attached_on_success() {
    let dir = tempfile::tempdir().unwrap();
    let blobs = LocalBlobStore::new(dir.path(), "/uploads");
    let ai = ScriptedAi::default().speech(Ok(vec![0xFF, 0xFB, 0x90]));
    let task = attach_audio(Some(&ai), &blobs, fallback_listening(ProficiencyLevel::B1), now()).await;
    let audio = task.audio.expect("audio attached");
    assert_eq!(audio.mimetype, "audio/mpeg");
    assert!(audio.url.starts_with("/uploads/listening_20261018_090507_"));
  }

  #[tokio::test]
  async fn synthesis_failure_keeps_the_task() {
    let dir = tempfile::tempdir().unwrap();
    let blobs = LocalBlobStore::new(dir.path(), "/uploads");
    let ai = ScriptedAi::default().speech(Err(AiError::Transport("timeout".into())));
    let original = fallback_listening(ProficiencyLevel::C1);
    let task = attach_audio(Some(&ai), &blobs, original.clone(), now()).await;
    assert_eq!(task, original);
    assert!(task.audio.is_none());
  }
}
