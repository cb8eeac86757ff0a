//! Text helpers for captured process output.

/// Cut `s` to at most `max_bytes` on a UTF-8 boundary, marking the cut.
pub fn truncate_bytes_utf8(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }

    // Find a valid UTF-8 boundary <= max_bytes.
    let mut cut = max_bytes;
    while cut > 0 && !s.is_char_boundary(cut) {
        cut -= 1;
    }
    let mut out = s[..cut].to_string();
    out.push_str("\n...(truncated)...\n");
    out
}

/// Decode process output lossily and bound its size.
pub fn capture_output(bytes: &[u8], max_bytes: usize) -> String {
    truncate_bytes_utf8(&String::from_utf8_lossy(bytes), max_bytes)
}
