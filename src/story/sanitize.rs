//! Cleanup passes for raw model output.
//!
//! Group-chat models routinely leak the other participants' dialogue,
//! markup scaffolding, and editorial asides into a single character's
//! reply. Every transform here is pure text-to-text; emptied-out replies
//! are dropped by the caller.

/// Editorial/meta phrases that mark the end of usable reply text.
const CUTOFF_MARKERS: &[&str] = &["let me know", "choose the response", "next:"];

/// Cleans one character's raw reply.
///
/// In order: drops lines speaking as any *other* character (`Name: ...`),
/// lines speaking as the user, code fences and `###` banner lines; cuts the
/// text at the first editorial marker; trims; and balances a dangling `*`
/// so the UI's emphasis markup never stays open. Balancing appends a single
/// closing marker, which is a best-effort repair rather than a guaranteed
/// fix for nested or multiply-unterminated spans. Already-clean input comes
/// back unchanged.
pub fn sanitize_reply(raw: &str, all_names: &[String], speaker: &str) -> String {
    let mut kept: Vec<&str> = Vec::new();

    for line in raw.lines() {
        let trimmed = line.trim_start();
        if is_other_speaker_line(trimmed, all_names, speaker) {
            continue;
        }
        if starts_with_ignore_case(trimmed, "user:") {
            continue;
        }
        if trimmed.starts_with("```") || trimmed.starts_with("###") {
            continue;
        }
        kept.push(line);
    }

    let mut text = kept.join("\n");
    if let Some(cut) = earliest_marker(&text) {
        text.truncate(cut);
    }

    let mut text = text.trim().to_string();
    if text.matches('*').count() % 2 == 1 {
        text.push('*');
    }
    text
}

/// Cleans the synthetic user message produced by the endless-mode
/// generator: leading letter-choice markers (`A) `), wrapping quotes, and
/// any leaked character-name-prefixed lines.
pub fn sanitize_auto_message(raw: &str, character_names: &[String]) -> String {
    let kept: Vec<&str> = raw
        .lines()
        .filter(|line| {
            let trimmed = line.trim_start();
            !character_names
                .iter()
                .any(|name| is_name_prefixed(trimmed, name))
                && !starts_with_ignore_case(trimmed, "user:")
        })
        .collect();

    let mut text = kept.join("\n").trim().to_string();
    text = strip_choice_marker(&text).to_string();
    text = strip_wrapping_quotes(&text).to_string();
    text.trim().to_string()
}

/// Removes `*...*` spans before speech synthesis; emphasis is stage
/// direction, not spoken text. An unterminated span is left as-is.
pub fn strip_stage_directions(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '*' {
            out.push(c);
            continue;
        }
        let mut span = String::new();
        let mut closed = false;
        for inner in chars.by_ref() {
            if inner == '*' {
                closed = true;
                break;
            }
            span.push(inner);
        }
        if !closed {
            out.push('*');
            out.push_str(&span);
        }
    }
    out.trim().to_string()
}

fn is_other_speaker_line(line: &str, all_names: &[String], speaker: &str) -> bool {
    all_names.iter().any(|name| {
        !name.eq_ignore_ascii_case(speaker) && is_name_prefixed(line, name)
    })
}

fn is_name_prefixed(line: &str, name: &str) -> bool {
    let prefix_len = name.len();
    if line.len() <= prefix_len {
        return false;
    }
    if !line.is_char_boundary(prefix_len) {
        return false;
    }
    line[..prefix_len].eq_ignore_ascii_case(name) && line[prefix_len..].starts_with(':')
}

fn starts_with_ignore_case(line: &str, prefix: &str) -> bool {
    line.len() >= prefix.len()
        && line.is_char_boundary(prefix.len())
        && line[..prefix.len()].eq_ignore_ascii_case(prefix)
}

fn earliest_marker(text: &str) -> Option<usize> {
    // Lowercasing can change byte length for some scripts; only trust the
    // lowered offsets when the lengths line up.
    let lowered = text.to_lowercase();
    let haystack = if lowered.len() == text.len() {
        lowered.as_str()
    } else {
        text
    };
    CUTOFF_MARKERS
        .iter()
        .filter_map(|marker| haystack.find(marker))
        .min()
}

fn strip_choice_marker(text: &str) -> &str {
    let mut chars = text.chars();
    let (Some(first), Some(second)) = (chars.next(), chars.next()) else {
        return text;
    };
    if first.is_ascii_alphanumeric() && matches!(second, ')' | '.') {
        let rest = &text[first.len_utf8() + second.len_utf8()..];
        return rest.trim_start();
    }
    text
}

fn strip_wrapping_quotes(text: &str) -> &str {
    let trimmed = text.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        &trimmed[1..trimmed.len() - 1]
    } else {
        trimmed
    }
}
