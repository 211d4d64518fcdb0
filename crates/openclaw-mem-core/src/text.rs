//! Text normalization at the store boundary.
//!
//! Some producers emit lone UTF-16 surrogates from malformed `\uXXXX`
//! escapes. Rust strings cannot carry them and `serde_json` rejects them at
//! parse time, so the scrub happens on the raw JSON line: any `\uD800`..
//! `\uDFFF` escape that is not half of a valid surrogate pair is rewritten
//! to `�` before the line reaches the parser.

/// Rewrite lone UTF-16 surrogate escapes in a raw JSON line to `�`.
///
/// Valid high/low pairs are left intact (the parser combines them). The scan
/// is escape-aware: a `\u` preceded by an escaped backslash is literal text
/// and not touched.
pub fn scrub_surrogate_escapes(line: &str) -> String {
    let bytes = line.as_bytes();
    let mut out = String::with_capacity(line.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 1 < bytes.len() {
            if bytes[i + 1] == b'\\' {
                // Escaped backslash; copy both so `\\u` stays literal.
                out.push_str("\\\\");
                i += 2;
                continue;
            }
            if bytes[i + 1] == b'u' {
                if let Some(code) = parse_hex4(bytes, i + 2) {
                    if (0xD800..=0xDBFF).contains(&code) {
                        // High surrogate: keep only when a low surrogate follows.
                        if let Some(next) = parse_escape_at(bytes, i + 6) {
                            if (0xDC00..=0xDFFF).contains(&next) {
                                out.push_str(&line[i..i + 12]);
                                i += 12;
                                continue;
                            }
                        }
                        out.push_str("\\uFFFD");
                        i += 6;
                        continue;
                    }
                    if (0xDC00..=0xDFFF).contains(&code) {
                        // Lone low surrogate (pairs were consumed above).
                        out.push_str("\\uFFFD");
                        i += 6;
                        continue;
                    }
                }
            }
        }
        let ch_len = utf8_len(bytes[i]);
        out.push_str(&line[i..i + ch_len]);
        i += ch_len;
    }

    out
}

fn parse_hex4(bytes: &[u8], at: usize) -> Option<u32> {
    if at + 4 > bytes.len() {
        return None;
    }
    let s = std::str::from_utf8(&bytes[at..at + 4]).ok()?;
    u32::from_str_radix(s, 16).ok()
}

fn parse_escape_at(bytes: &[u8], at: usize) -> Option<u32> {
    if at + 6 > bytes.len() || bytes[at] != b'\\' || bytes[at + 1] != b'u' {
        return None;
    }
    parse_hex4(bytes, at + 2)
}

fn utf8_len(first_byte: u8) -> usize {
    match first_byte {
        b if b < 0x80 => 1,
        b if b < 0xE0 => 2,
        b if b < 0xF0 => 3,
        _ => 4,
    }
}

/// Lossily decode foreign bytes (harvest logs, job stores) to UTF-8.
pub fn scrub_lossy_bytes(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Token estimate used by every budgeted payload: `max(1, ceil(len/4))`.
pub fn estimate_tokens(text: &str) -> usize {
    std::cmp::max(1, text.len().div_ceil(4))
}

/// Collapse newlines to single spaces for one-line rendering.
pub fn one_line(text: &str) -> String {
    text.split(['\n', '\r'])
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
