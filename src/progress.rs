/// Prefix emitted by the `--progress-template` we pass to yt-dlp
pub const PROGRESS_PREFIX: &str = "progress:";

/// The template itself, as handed to `--progress-template`
pub fn progress_template() -> String {
    format!("download:{}%(progress._percent_str)s", PROGRESS_PREFIX)
}

/// Extracts a percentage (0.0 to 100.0) from one line of yt-dlp output.
pub fn parse_progress_from_line(line: &str) -> Option<f32> {
    let rest = strip_ansi(line.trim().strip_prefix(PROGRESS_PREFIX)?);
    rest.trim()
        .strip_suffix('%')?
        .trim()
        .parse::<f32>()
        .ok()
        .map(|v| v.clamp(0.0, 100.0))
}

// _percent_str is padded and may carry colour escapes
fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\u{1b}' {
            for c in chars.by_ref() {
                if c.is_ascii_alphabetic() {
                    break;
                }
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// A line that is neither progress nor an empty line: with
/// `--print after_move:filepath` this is where the final file landed.
pub fn is_payload_line(line: &str) -> bool {
    let line = line.trim();
    !line.is_empty()
        && !line.starts_with(PROGRESS_PREFIX)
        && !line.starts_with('[')
        && !line.starts_with("WARNING:")
        && !line.starts_with("ERROR:")
}
