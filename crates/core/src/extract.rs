use serde_json::Value;

/// Hard ceiling on the output-token budget, regardless of retry growth.
pub const MAX_TOKEN_CEILING: u32 = 3000;

/// Output-token budget for the next attempt after a truncated response.
pub fn next_token_budget(current: u32) -> u32 {
    current.saturating_mul(2).min(MAX_TOKEN_CEILING)
}

/// Outcome of scanning one generation API response.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    /// Text recovered from the response, with the truncation verdict.
    Text { text: String, truncated: bool },
    /// Nothing extractable. The caller falls back to the response's raw
    /// string form instead of failing.
    Empty,
}

/// Extract generated text from a loosely-shaped API response.
///
/// The external API's response schema has drifted over time, so extraction
/// is an ordered list of shape probes rather than a single deserialization:
///
/// 1. A non-empty top-level `text` field wins outright and is never
///    considered truncated.
/// 2. Otherwise every candidate is scanned with [`candidate_text`] and the
///    non-empty pieces are joined with a blank line. The result is marked
///    truncated when any candidate's finish reason suggests a token-limit
///    stop (see [`is_truncated`]).
/// 3. With no candidates at all, `Empty` tells the caller to fall back to
///    the raw response text.
pub fn extract_response(response: &Value) -> Extraction {
    if let Some(text) = direct_text(response) {
        return Extraction::Text {
            text,
            truncated: false,
        };
    }

    let candidates = match response.get("candidates").and_then(Value::as_array) {
        Some(candidates) if !candidates.is_empty() => candidates,
        _ => return Extraction::Empty,
    };

    let pieces: Vec<String> = candidates.iter().map(candidate_text).collect();
    Extraction::Text {
        text: pieces.join("\n\n").trim().to_string(),
        truncated: is_truncated(candidates),
    }
}

/// Whether any candidate's finish reason points at a token-limit stop.
///
/// An unset or empty finish reason also counts as truncated. That conflates
/// "unknown" with "known-truncated" and is kept deliberately: the worst case
/// is one extra attempt with a larger budget. The numeric form 2 is the
/// enum value some API versions report for MAX_TOKENS.
pub fn is_truncated(candidates: &[Value]) -> bool {
    candidates.iter().any(|candidate| {
        let reason = candidate
            .get("finishReason")
            .or_else(|| candidate.get("finish_reason"));
        match reason {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => {
                let s = s.trim();
                s.is_empty()
                    || s.eq_ignore_ascii_case("length")
                    || s.eq_ignore_ascii_case("max_tokens")
            }
            Some(Value::Number(n)) => n.as_i64() == Some(2),
            Some(_) => false,
        }
    })
}

/// Text for one candidate, trying each known shape in priority order.
///
/// Falls back to the candidate's compact JSON form so a candidate is never
/// silently dropped from the output.
pub fn candidate_text(candidate: &Value) -> String {
    const EXTRACTORS: &[fn(&Value) -> Option<String>] =
        &[inline_text, parts_text, block_text];

    for extract in EXTRACTORS {
        if let Some(text) = extract(candidate) {
            return text;
        }
    }

    candidate.to_string()
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn string_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| value.get(key).and_then(Value::as_str).and_then(non_empty))
}

/// Top-level `text` field, the shape some SDK wrappers flatten to.
fn direct_text(response: &Value) -> Option<String> {
    response.get("text").and_then(Value::as_str).and_then(non_empty)
}

/// A plain string `content` or `text` field directly on the candidate.
fn inline_text(candidate: &Value) -> Option<String> {
    string_field(candidate, &["content", "text"])
}

/// The current REST shape: `content.parts[].text` blocks, concatenated.
fn parts_text(candidate: &Value) -> Option<String> {
    let parts = candidate.get("content")?.get("parts")?.as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    non_empty(&text)
}

/// Older `output` / `message` shapes: a list whose first entry carries the
/// text either in nested content blocks or as a direct field.
fn block_text(candidate: &Value) -> Option<String> {
    let out = candidate
        .get("output")
        .or_else(|| candidate.get("message"))?;
    let first = out.as_array()?.first()?;

    if let Some(blocks) = first.get("content").and_then(Value::as_array) {
        if let Some(block) = blocks.first() {
            if let Some(text) = string_field(block, &["text", "content"]) {
                return Some(text);
            }
        }
    }

    string_field(first, &["content", "text"])
}
