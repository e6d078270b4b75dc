/// Removes a surrounding Markdown code fence (```lang ... ```), if the whole text is fenced.
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }

    let mut inner = trimmed;
    if let Some(after_first) = inner.splitn(2, '\n').nth(1) {
        inner = after_first;
    } else {
        return String::new();
    }
    if let Some(end) = inner.rfind("```") {
        inner = &inner[..end];
    }
    inner.trim().to_string()
}

/// First `max_chars` characters of `text`, never splitting a code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Collapses whitespace runs and clips to `max_len` characters, ending with `…` when clipped.
pub fn clip_summary(text: &str, max_len: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_len {
        return collapsed;
    }
    let mut out = truncate_chars(&collapsed, max_len.saturating_sub(1)).to_string();
    out.push('…');
    out
}
