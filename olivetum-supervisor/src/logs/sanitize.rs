//! Cleanup of raw miner output before it is stored.
//!
//! The miner is launched with `--nocolor`, but some builds and drivers still
//! emit cursor control and colour codes. Only CSI sequences
//! (`ESC [ params letter`) are recognised as sequences; any other stray
//! control byte, including a lone ESC, is dropped on its own.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

static ANSI_CSI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").expect("CSI pattern is valid"));

/// Strip carriage returns, CSI escape sequences, and non-printable control
/// characters. Newline, tab, and space are kept.
pub fn sanitize(raw: &str) -> String {
    let without_cr: Cow<'_, str> = if raw.contains('\r') {
        Cow::Owned(raw.replace('\r', ""))
    } else {
        Cow::Borrowed(raw)
    };
    let without_csi = ANSI_CSI.replace_all(&without_cr, "");

    without_csi
        .chars()
        .filter(|&c| c == '\n' || c == '\t' || c == ' ' || !c.is_control())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_unchanged() {
        assert_eq!(sanitize("m 12:00:01 main Speed 30.12 Mh/s"), "m 12:00:01 main Speed 30.12 Mh/s");
        assert_eq!(sanitize("a\tb c\nd"), "a\tb c\nd");
    }

    #[test]
    fn test_strips_colour_codes() {
        let raw = "\x1b[32mi\x1b[0m 10:11:12 \x1b[1;33mstratum\x1b[0m Connected";
        assert_eq!(sanitize(raw), "i 10:11:12 stratum Connected");
    }

    #[test]
    fn test_strips_carriage_returns() {
        assert_eq!(sanitize("progress 10%\rprogress 20%\r\n"), "progress 10%progress 20%\n");
    }

    #[test]
    fn test_drops_control_characters() {
        assert_eq!(sanitize("bell\x07 nul\x00 del\x7f end"), "bell nul del end");
    }

    #[test]
    fn test_non_csi_escape_only_loses_esc_byte() {
        // OSC title sequence: not a CSI, so only the control bytes go away
        assert_eq!(sanitize("\x1b]0;title\x07text"), "]0;titletext");
    }

    #[test]
    fn test_output_never_contains_esc_or_cr() {
        let inputs = [
            "\x1b[2K\r\x1b[1A speed",
            "\x1b\x1b[[31m",
            "\r\r\r",
            "\x1b[",
            "ünïcödé \x1b[0m ✓",
        ];
        for input in inputs {
            let out = sanitize(input);
            assert!(!out.contains('\x1b'), "ESC survived in {:?}", out);
            assert!(!out.contains('\r'), "CR survived in {:?}", out);
        }
        assert_eq!(sanitize("ünïcödé \x1b[0m ✓"), "ünïcödé  ✓");
    }
}
