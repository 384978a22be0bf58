//! Small utility helpers used across modules.

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Count words as maximal runs of alphanumeric characters or underscores.
/// "don't" counts as two words.
pub fn count_words(text: &str) -> usize {
  let mut count = 0;
  let mut in_word = false;
  for ch in text.chars() {
    let is_word = ch.is_alphanumeric() || ch == '_';
    if is_word && !in_word {
      count += 1;
    }
    in_word = is_word;
  }
  count
}

/// Log-safe truncation for large strings (char-boundary aware).
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.chars().count() <= max {
    s.to_string()
  } else {
    let head: String = s.chars().take(max).collect();
    format!("{}… ({} bytes total)", head, s.len())
  }
}

/// Reduce an uploaded file name to `[A-Za-z0-9._-]`, without leading dots.
/// Falls back to "audio" when nothing usable is left.
pub fn sanitize_file_name(name: &str) -> String {
  let base = name.rsplit(['/', '\\']).next().unwrap_or("");
  let cleaned: String = base
    .split_whitespace()
    .collect::<Vec<_>>()
    .join("_")
    .chars()
    .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    .collect();
  let cleaned = cleaned.trim_start_matches('.').to_string();
  if cleaned.is_empty() { "audio".into() } else { cleaned }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn template_replaces_all_keys() {
    let out = fill_template("Level {level}: {text} ({level})", &[("level", "B2"), ("text", "hi")]);
    assert_eq!(out, "Level B2: hi (B2)");
  }

  #[test]
  fn word_count_matches_word_runs() {
    assert_eq!(count_words(""), 0);
    assert_eq!(count_words("  Hello, world!  "), 2);
    assert_eq!(count_words("don't stop"), 3);
    assert_eq!(count_words("snake_case word"), 2);
  }

  #[test]
  fn file_names_are_sanitized() {
    assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
    assert_eq!(sanitize_file_name("my answer.webm"), "my_answer.webm");
    assert_eq!(sanitize_file_name("..."), "audio");
    assert_eq!(sanitize_file_name("C:\\tmp\\clip (1).wav"), "clip_1.wav");
  }

  #[test]
  fn truncation_keeps_short_strings() {
    assert_eq!(trunc_for_log("short", 10), "short");
    assert!(trunc_for_log("abcdefghijkl", 4).starts_with("abcd…"));
  }
}
