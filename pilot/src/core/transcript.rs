//! Transcript and preview formatting for executed steps.

/// Longest prefix of `text` with at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Transcript entry for an ordinary shell step. `stdout`/`stderr` are trimmed.
pub fn command_entry(command: &str, exit_code: i32, stdout: &str, stderr: &str) -> String {
    let mut entry = format!("$ {command}\n(exit={exit_code})\n");
    if !stdout.is_empty() {
        entry.push_str(&format!("\n[stdout]\n{stdout}\n"));
    }
    if !stderr.is_empty() {
        entry.push_str(&format!("\n[stderr]\n{stderr}\n"));
    }
    entry
}

/// Transcript entry for the background server start.
pub fn server_start_entry(pid: u32, healthy: bool) -> String {
    format!(
        "Started server in background (pid={pid}). Healthcheck: {}",
        if healthy { "OK" } else { "NOT READY" }
    )
}

/// Join step entries into the final transcript.
pub fn join_entries(entries: &[String]) -> String {
    entries.join("\n").trim().to_string()
}
