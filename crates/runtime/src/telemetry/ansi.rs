//! ANSI escape stripping for log lines.
//!
//! Game servers routinely color their console output; the stripped form is
//! what the dashboard renders.

use std::borrow::Cow;

/// Strip ANSI escape sequences (CSI, including SGR color codes, and OSC)
/// from a line. Returns `Cow::Borrowed` when the line contains no ESC byte.
pub fn strip_ansi(input: &str) -> Cow<'_, str> {
    if !input.bytes().any(|b| b == 0x1b) {
        return Cow::Borrowed(input);
    }

    let bytes = input.as_bytes();
    let mut output = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != 0x1b {
            output.push(bytes[i]);
            i += 1;
            continue;
        }
        if i + 1 >= bytes.len() {
            // Lone trailing ESC byte: drop the incomplete sequence
            break;
        }
        match bytes[i + 1] {
            // CSI: ESC [ ... terminated by 0x40-0x7E ('m' for SGR)
            b'[' => {
                i += 2;
                while i < bytes.len() {
                    let b = bytes[i];
                    i += 1;
                    if (0x40..=0x7e).contains(&b) {
                        break;
                    }
                }
            }
            // OSC: ESC ] ... terminated by BEL or ESC \
            b']' => {
                i += 2;
                while i < bytes.len() {
                    if bytes[i] == 0x07 {
                        i += 1;
                        break;
                    }
                    if bytes[i] == 0x1b && i + 1 < bytes.len() && bytes[i + 1] == b'\\' {
                        i += 2;
                        break;
                    }
                    i += 1;
                }
            }
            // Two-byte escape (ESC c, ESC 7, ...)
            _ => {
                i += 2;
            }
        }
    }

    // Input was valid UTF-8 and we only removed whole ASCII-delimited
    // sequences, so the result still is.
    Cow::Owned(String::from_utf8_lossy(&output).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_line_is_borrowed() {
        let line = "INFO server started";
        assert!(matches!(strip_ansi(line), Cow::Borrowed(_)));
    }

    #[test]
    fn sgr_color_codes_removed() {
        assert_eq!(strip_ansi("\x1b[32mDone\x1b[0m"), "Done");
        assert_eq!(strip_ansi("\x1b[1;31mERROR\x1b[m boom"), "ERROR boom");
    }

    #[test]
    fn osc_hyperlink_removed() {
        assert_eq!(strip_ansi("\x1b]8;;http://x\x07link\x1b]8;;\x07"), "link");
    }

    #[test]
    fn trailing_escape_dropped() {
        assert_eq!(strip_ansi("half\x1b"), "half");
    }

    #[test]
    fn stripping_is_idempotent() {
        let once = strip_ansi("\x1b[33m[World] \x1b[0mready").into_owned();
        assert_eq!(strip_ansi(&once), once);
    }
}
