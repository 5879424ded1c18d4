use monitor_core::ReleaseEvent;

const MAX_TITLE_LEN: usize = 120;

/// Windows-safe, deterministic filename: `TL-{id}.{sanitized_title}.torrent`.
///
/// The name depends only on the event, so repeating a download lands on the
/// same path. The two sources share only the id prefix since their titles
/// may differ; the dedup ledger keeps the second source from fetching.
pub fn deterministic_filename(event: &ReleaseEvent) -> String {
    let sanitized = sanitize_title(&event.title);
    if sanitized.is_empty() {
        format!("{}.torrent", event.id)
    } else {
        format!("{}.{sanitized}.torrent", event.id)
    }
}

fn sanitize_title(input: &str) -> String {
    let cleaned: String = input
        .chars()
        .map(|c| if is_forbidden(c) { '_' } else { c })
        .collect();
    let cleaned = cleaned.trim_matches(&['_', ' ', '.'][..]);

    // Collapse multiple underscores
    let mut compacted = String::with_capacity(cleaned.len());
    let mut prev_underscore = false;
    for c in cleaned.chars() {
        if c == '_' {
            if !prev_underscore {
                compacted.push(c);
            }
            prev_underscore = true;
        } else {
            compacted.push(c);
            prev_underscore = false;
        }
    }

    let mut end = compacted.len().min(MAX_TITLE_LEN);
    while !compacted.is_char_boundary(end) {
        end -= 1;
    }
    compacted.truncate(end);
    let trimmed = compacted.trim_end_matches(&['_', ' ', '.'][..]).to_string();
    if is_reserved_windows_name(&trimmed) {
        format!("{trimmed}_")
    } else {
        trimmed
    }
}

fn is_forbidden(c: char) -> bool {
    matches!(c,
        '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0'..='\u{1F}'
    )
}

fn is_reserved_windows_name(name: &str) -> bool {
    const RESERVED: &[&str] = &[
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(name))
}
