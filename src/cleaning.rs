//! Best-effort normalisation of raw model output before JSON parsing.
//!
//! Models wrap JSON in code fences, prepend BOMs, emit `//` comments and
//! typographic punctuation. `clean_json_response` removes what it can; whatever
//! is still invalid afterwards is left for the caller's parser to reject.

/// Normalise a raw text response into (hopefully) parseable JSON.
///
/// Runs a single cleaning pass until it reaches a fixed point, so applying it
/// twice yields the same string as applying it once.
pub fn clean_json_response(raw: &str) -> String {
  let mut current = raw.to_string();
  loop {
    let next = clean_once(&current);
    if next == current {
      return current;
    }
    current = next;
  }
}

fn clean_once(input: &str) -> String {
  let mut s = input.trim().trim_start_matches('\u{FEFF}').trim().to_string();

  s = strip_fences(&s);
  s = s.replace("\r\n", "\n").replace('\r', "\n");

  let kept: Vec<&str> = s
    .lines()
    .filter(|line| {
      let t = line.trim_start();
      !(t.starts_with("//") || t.starts_with('#'))
    })
    .collect();
  s = kept.join("\n").trim().to_string();

  if !is_valid_json(&s) {
    s = replace_typographic(&s);
  }
  s
}

fn strip_fences(s: &str) -> String {
  let mut out = s;
  if let Some(rest) = out.strip_prefix("```") {
    // language tag, e.g. ```json / ```javascript
    out = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric()).trim();
  }
  if let Some(rest) = out.strip_suffix("```") {
    out = rest.trim();
  }
  out.to_string()
}

fn is_valid_json(s: &str) -> bool {
  serde_json::from_str::<serde::de::IgnoredAny>(s).is_ok()
}

fn replace_typographic(s: &str) -> String {
  let mut out = String::with_capacity(s.len());
  for ch in s.chars() {
    match ch {
      '\u{201C}' | '\u{201D}' | '\u{201E}' => out.push('"'),
      '\u{2018}' | '\u{2019}' => out.push('\''),
      '\u{2013}' | '\u{2014}' => out.push('-'),
      '\u{2026}' => out.push_str("..."),
      other => out.push(other),
    }
  }
  out
}
