//! Application state shared by all handlers.
//!
//! This module owns:
//!   - the process settings and prompt templates (from TOML or defaults)
//!   - the optional AI backend (absent when no API key is configured)
//!   - the collaborator stores: submissions, planner, blobs, per-session pending tasks

use std::{path::Path, sync::Arc};
use tracing::{info, instrument};

use crate::ai::AiBackend;
use crate::config::{load_agent_config_from_env, Prompts, Settings, TopicCfg};
use crate::openai::OpenAI;
use crate::store::{BlobStore, LocalBlobStore, MemoryStore, PlannerStore, SessionStore, SubmissionStore};
use crate::tasks::TaskContext;

/// URL prefix under which stored blobs are served back.
pub const UPLOADS_URL_PREFIX: &str = "/uploads";

pub struct AppState {
    pub settings: Settings,
    pub prompts: Prompts,
    pub extra_topics: Vec<TopicCfg>,
    pub ai: Option<Arc<dyn AiBackend>>,
    pub submissions: Arc<dyn SubmissionStore>,
    pub planner: Arc<dyn PlannerStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub sessions: SessionStore,
}

impl AppState {
    /// Build state from settings: load the optional TOML config, init the AI client.
    #[instrument(level = "info", skip_all)]
    pub fn new(settings: Settings) -> Self {
        let cfg = load_agent_config_from_env().unwrap_or_default();
        if !cfg.speaking_topics.is_empty() {
            info!(target: "britais_backend", topics = cfg.speaking_topics.len(), "Extra speaking topics loaded");
        }

        let ai: Option<Arc<dyn AiBackend>> = match OpenAI::from_settings(&settings) {
            Some(oa) => {
                info!(target: "britais_backend", base_url = %oa.base_url, model = %oa.model, transcribe_model = %oa.transcribe_model, tts_model = %oa.tts_model, "OpenAI enabled.");
                Some(Arc::new(oa))
            }
            None => {
                info!(target: "britais_backend", "OpenAI disabled (no OPENAI_API_KEY). Using fallback banks and heuristics.");
                None
            }
        };

        let store = Arc::new(MemoryStore::new());
        let blobs = LocalBlobStore::new(settings.upload_dir.clone(), UPLOADS_URL_PREFIX);
        info!(target: "britais_backend", upload_dir = %settings.upload_dir.display(), "Blob store ready");

        Self {
            prompts: cfg.prompts,
            extra_topics: cfg.speaking_topics,
            ai,
            submissions: store.clone(),
            planner: store,
            blobs: Arc::new(blobs),
            sessions: SessionStore::new(),
            settings,
        }
    }

    /// State with default prompts, in-memory stores and blobs under `upload_dir`.
    pub fn with_parts(ai: Option<Arc<dyn AiBackend>>, upload_dir: &Path) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            settings: Settings { upload_dir: upload_dir.to_path_buf(), ..Settings::default() },
            prompts: Prompts::default(),
            extra_topics: Vec::new(),
            ai,
            submissions: store.clone(),
            planner: store,
            blobs: Arc::new(LocalBlobStore::new(upload_dir, UPLOADS_URL_PREFIX)),
            sessions: SessionStore::new(),
        }
    }

    pub fn ai(&self) -> Option<&dyn AiBackend> {
        self.ai.as_deref()
    }

    pub fn task_context(&self) -> TaskContext<'_> {
        TaskContext {
            ai: self.ai(),
            prompts: &self.prompts,
            extra_topics: &self.extra_topics,
            blobs: self.blobs.as_ref(),
        }
    }
}
