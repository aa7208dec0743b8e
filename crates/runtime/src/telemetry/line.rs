//! Log line normalization.
//!
//! The engine prepends an RFC3339Nano timestamp to every line when
//! timestamps are requested:
//! `2026-01-30T03:29:06.691716216Z [Server] Done`.
//! The dashboard wants second precision and a tab separator, so the prefix
//! is rewritten to `2026-01-30T03:29:06Z\t[Server] Done`. Color codes are
//! stripped and trailing whitespace trimmed. The rewrite never matches its
//! own output, so applying it twice is a no-op.

use super::ansi::strip_ansi;

/// Normalize one log line: compress the leading engine timestamp, strip
/// ANSI escapes, trim trailing whitespace.
pub fn format_log_line(line: &str) -> String {
    let compressed = compress_timestamp(line);
    let stripped = strip_ansi(&compressed);
    stripped.trim_end().to_string()
}

/// Split a demuxed frame payload into normalized lines, dropping empties.
pub fn payload_lines(payload: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(payload)
        .split('\n')
        .map(format_log_line)
        .filter(|l| !l.is_empty())
        .collect()
}

/// Rewrite a leading `YYYY-MM-DDTHH:MM:SS[.frac]Z ` prefix to
/// `YYYY-MM-DDTHH:MM:SSZ\t`. Lines without the prefix pass through.
fn compress_timestamp(line: &str) -> String {
    let b = line.as_bytes();
    if b.len() < 21 || !looks_like_timestamp(b) {
        return line.to_string();
    }

    // Position 19 is either 'Z' or '.' followed by fractional digits and 'Z'
    let z_pos = if b[19] == b'Z' {
        19
    } else if b[19] == b'.' {
        let mut i = 20;
        while i < b.len() && b[i].is_ascii_digit() {
            i += 1;
        }
        if i >= b.len() || b[i] != b'Z' {
            return line.to_string();
        }
        i
    } else {
        return line.to_string();
    };

    // The separator after Z must be a single space; our own output uses
    // a tab there, which keeps the rewrite idempotent.
    if z_pos + 1 >= b.len() || b[z_pos + 1] != b' ' {
        return line.to_string();
    }

    format!("{}Z\t{}", &line[..19], &line[z_pos + 2..])
}

fn looks_like_timestamp(b: &[u8]) -> bool {
    b[..4].iter().all(u8::is_ascii_digit)
        && b[4] == b'-'
        && b[5..7].iter().all(u8::is_ascii_digit)
        && b[7] == b'-'
        && b[8..10].iter().all(u8::is_ascii_digit)
        && b[10] == b'T'
        && b[11..13].iter().all(u8::is_ascii_digit)
        && b[13] == b':'
        && b[14..16].iter().all(u8::is_ascii_digit)
        && b[16] == b':'
        && b[17..19].iter().all(u8::is_ascii_digit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fractional_timestamp_is_compressed() {
        assert_eq!(
            format_log_line("2026-01-30T03:29:06.691716216Z [Server] Done (2.1s)"),
            "2026-01-30T03:29:06Z\t[Server] Done (2.1s)"
        );
    }

    #[test]
    fn whole_second_timestamp_is_compressed() {
        assert_eq!(
            format_log_line("2026-01-30T03:29:06Z ready"),
            "2026-01-30T03:29:06Z\tready"
        );
    }

    #[test]
    fn line_without_timestamp_passes_through() {
        assert_eq!(format_log_line("plain message"), "plain message");
    }

    #[test]
    fn ansi_codes_are_stripped() {
        assert_eq!(
            format_log_line("2026-01-30T03:29:06.5Z \x1b[32mINFO\x1b[0m up"),
            "2026-01-30T03:29:06Z\t\x1b[32mINFO\x1b[0m up"
                .replace("\x1b[32m", "")
                .replace("\x1b[0m", "")
        );
    }

    #[test]
    fn trailing_whitespace_trimmed() {
        assert_eq!(format_log_line("msg   \r"), "msg");
    }

    #[test]
    fn formatting_is_idempotent() {
        let inputs = [
            "2026-01-30T03:29:06.691716216Z \x1b[33mwarn\x1b[0m low TPS  ",
            "2026-01-30T03:29:06Z done",
            "no timestamp here",
            "",
        ];
        for input in inputs {
            let once = format_log_line(input);
            assert_eq!(format_log_line(&once), once, "input {:?}", input);
        }
    }

    #[test]
    fn timestamp_only_line_is_untouched() {
        assert_eq!(
            format_log_line("2026-01-30T03:29:06.691716216Z"),
            "2026-01-30T03:29:06.691716216Z"
        );
    }

    #[test]
    fn payload_splits_and_drops_empty_lines() {
        let payload = b"2026-01-30T03:29:06.1Z one\n\n2026-01-30T03:29:07.2Z two\n";
        assert_eq!(
            payload_lines(payload),
            vec![
                "2026-01-30T03:29:06Z\tone".to_string(),
                "2026-01-30T03:29:07Z\ttwo".to_string(),
            ]
        );
    }

    #[test]
    fn payload_without_newline_emits_segment() {
        assert_eq!(payload_lines(b"Hello"), vec!["Hello".to_string()]);
    }
}
