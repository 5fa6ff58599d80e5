//! Subtitle cue timing
//!
//! Pairs carry the original cue line of each language, e.g.
//! `00:01:02,500 --> 00:01:04,000`. Temporal navigation only needs the
//! start of the cue, in milliseconds.

/// Parse the start of a cue line into milliseconds
///
/// Returns `None` for missing, malformed, or out-of-range values.
pub fn cue_start_ms(cue: &str) -> Option<i64> {
    let (start, _) = cue.trim_start().split_once("-->")?;
    parse_timestamp_ms(start.trim())
}

/// Parse `HH:MM:SS,mmm` into milliseconds
pub fn parse_timestamp_ms(ts: &str) -> Option<i64> {
    let (hms, millis) = ts.split_once(',')?;
    let mut parts = hms.split(':');
    let hours = parse_fixed(parts.next()?, 2)?;
    let minutes = parse_fixed(parts.next()?, 2)?;
    let seconds = parse_fixed(parts.next()?, 2)?;
    if parts.next().is_some() || minutes >= 60 || seconds >= 60 {
        return None;
    }
    let millis = parse_fixed(millis, 3)?;

    Some(hours * 3_600_000 + minutes * 60_000 + seconds * 1_000 + millis)
}

/// Format milliseconds as `HH:MM:SS,mmm`
pub fn format_timestamp_ms(ms: i64) -> String {
    let ms = ms.max(0);
    format!(
        "{:02}:{:02}:{:02},{:03}",
        ms / 3_600_000,
        (ms / 60_000) % 60,
        (ms / 1_000) % 60,
        ms % 1_000
    )
}

fn parse_fixed(digits: &str, width: usize) -> Option<i64> {
    if digits.len() != width || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
