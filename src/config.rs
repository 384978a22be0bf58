//! Runtime settings (environment) and agent configuration (prompts + optional
//! fallback topic bank) loaded from TOML.
//!
//! See `AgentConfig` and `Prompts` for the expected TOML schema.

use std::path::PathBuf;

use serde::Deserialize;
use tracing::{error, info};

/// Process settings read once at startup.
#[derive(Clone, Debug)]
pub struct Settings {
  pub port: u16,
  pub openai_api_key: Option<String>,
  pub openai_base_url: String,
  pub openai_model: String,
  pub transcribe_model: String,
  pub tts_model: String,
  pub tts_voice: String,
  pub upload_dir: PathBuf,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      port: 3000,
      openai_api_key: None,
      openai_base_url: "https://api.openai.com/v1".into(),
      openai_model: "gpt-4o-mini".into(),
      transcribe_model: "gpt-4o-mini-transcribe".into(),
      tts_model: "gpt-4o-mini-tts".into(),
      tts_voice: "alloy".into(),
      upload_dir: PathBuf::from("./uploads"),
    }
  }
}

impl Settings {
  pub fn from_env() -> Self {
    let d = Settings::default();
    let var = |k: &str| std::env::var(k).ok().filter(|v| !v.trim().is_empty());
    Self {
      port: var("PORT").and_then(|p| p.parse::<u16>().ok()).unwrap_or(d.port),
      openai_api_key: var("OPENAI_API_KEY"),
      openai_base_url: var("OPENAI_BASE_URL").unwrap_or(d.openai_base_url),
      openai_model: var("OPENAI_MODEL").unwrap_or(d.openai_model),
      transcribe_model: var("OPENAI_TRANSCRIBE_MODEL").unwrap_or(d.transcribe_model),
      tts_model: var("OPENAI_TTS_MODEL").unwrap_or(d.tts_model),
      tts_voice: var("OPENAI_TTS_VOICE").unwrap_or(d.tts_voice),
      upload_dir: var("UPLOAD_DIR").map(PathBuf::from).unwrap_or(d.upload_dir),
    }
  }
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AgentConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub speaking_topics: Vec<TopicCfg>,
}

/// Extra speaking topic accepted in TOML; joins the built-in fallback bank.
#[derive(Clone, Debug, Deserialize)]
pub struct TopicCfg {
  pub title: String,
  pub prompt: String,
  #[serde(default)]
  pub questions: Vec<String>,
}

/// Prompt templates sent to the AI service. Defaults target English learners.
/// Placeholders: `{level}`, `{text}`, `{transcript}`.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub writing_eval: String,
  pub speaking_eval: String,
  pub speaking_topic: String,
  pub writing_topic: String,
  pub listening_task: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      writing_eval: r#"You are an English writing examiner and coach.

Assess the writing using CEFR-style criteria:
- Task achievement
- Coherence and cohesion
- Vocabulary range and accuracy
- Grammar range and accuracy
- Naturalness

Give:
- ONE overall score from 0 to 100
- Clear, specific, actionable feedback (5 to 20 bullet points)
- Include concrete corrections or rewrites where relevant

Return ONLY valid JSON matching the schema.

Writing:
{text}"#.into(),
      speaking_eval: r#"You are an English speaking examiner and coach.

You are given a TRANSCRIPT of a learner's spoken answer.
Score 0-100 and give actionable feedback.

Evaluate:
- Task response & coherence
- Grammar accuracy & range
- Vocabulary range & appropriacy
- Fluency signals visible in text (repetition, unfinished sentences, filler words)
- Natural phrasing

Important:
- You cannot judge pronunciation from text. Do not claim you can.
- Rewrite 2-4 sentences to sound more natural.
- Give 5-15 bullet feedback points.

Return ONLY valid JSON.

Transcript:
{transcript}"#.into(),
      speaking_topic: r#"You are an English speaking tutor.
Generate ONE speaking topic for CEFR level {level}.
Return:
- title (short)
- prompt (2-3 sentences)
- 3 to 5 guiding questions

Keep it practical and not too abstract.
Return ONLY valid JSON."#.into(),
      writing_topic: r#"You are an English writing tutor.
Generate ONE writing task for CEFR level {level}.
Return:
- title (short)
- prompt (2-3 sentences describing what to write and for whom)
- 3 to 5 guiding questions the text should answer

Return ONLY valid JSON."#.into(),
      listening_task: r#"Create an English listening exercise for CEFR level {level}.

Requirements:
- Passage: 90 to 140 words
- Natural spoken style, clear story or explanation
- Exactly 3 multiple-choice questions
- Each question has 4 options
- Provide the correct answer (must match one of the options exactly)
- Provide a short explanation "why"

Return ONLY valid JSON."#.into(),
    }
  }
}

/// Attempt to load `AgentConfig` from AGENT_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_agent_config_from_env() -> Option<AgentConfig> {
  let path = std::env::var("AGENT_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match parse_agent_config(&s) {
      Ok(cfg) => {
        info!(target: "britais_backend", %path, topics = cfg.speaking_topics.len(), "Loaded agent config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "britais_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "britais_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

pub fn parse_agent_config(raw: &str) -> Result<AgentConfig, toml::de::Error> {
  toml::from_str::<AgentConfig>(raw)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn partial_prompt_override_keeps_defaults() {
    let cfg = parse_agent_config(
      r#"
[prompts]
writing_eval = "Grade this: {text}"

[[speaking_topics]]
title = "Weekend plans"
prompt = "Describe what you will do this weekend."
questions = ["Who with?", "Where?", "Why?"]
"#,
    )
    .unwrap();
    assert_eq!(cfg.prompts.writing_eval, "Grade this: {text}");
    assert_eq!(cfg.prompts.listening_task, Prompts::default().listening_task);
    assert_eq!(cfg.speaking_topics.len(), 1);
    assert_eq!(cfg.speaking_topics[0].questions.len(), 3);
  }

  #[test]
  fn empty_config_is_valid() {
    let cfg = parse_agent_config("").unwrap();
    assert!(cfg.speaking_topics.is_empty());
  }

  #[test]
  fn default_prompts_carry_placeholders() {
    let p = Prompts::default();
    assert!(p.writing_eval.contains("{text}"));
    assert!(p.speaking_eval.contains("{transcript}"));
    assert!(p.speaking_eval.contains("cannot judge pronunciation"));
    assert!(p.listening_task.contains("{level}"));
  }
}
