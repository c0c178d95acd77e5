//! Analyzer output sanitization.
//!
//! The analyzer may decorate its stdout with terminal styling (colors, cursor
//! movement) when it believes it is attached to a TTY. Those sequences must be
//! removed before the text can be parsed as a JSON envelope.
//!
//! [`strip_ansi`] is total and idempotent: its output never contains an escape
//! character or a disallowed control character, so a second pass is a no-op.

use std::borrow::Cow;

/// ASCII escape character that starts ANSI sequences.
const ESC: char = '\x1b';
/// ASCII bell character that can terminate OSC sequences.
const BEL: char = '\x07';

/// Strip terminal escape sequences and trim surrounding whitespace.
///
/// Removes:
/// - CSI sequences (`ESC [ ... final`) and the C1 CSI form (`\u{9b}`)
/// - OSC sequences terminated by BEL or ST
/// - two- and single-character escapes (`ESC ( B`, `ESC 7`, ...)
/// - C0 controls except `\n`, `\t`, `\r`, plus C1 controls and DEL
///
/// Returns `Cow::Borrowed` when the input only needs trimming.
///
/// ```
/// use helix_diag_types::strip_ansi;
///
/// assert_eq!(strip_ansi("  {\"error\": 1}\n"), "{\"error\": 1}");
/// assert_eq!(strip_ansi("\x1b[1;31m{}\x1b[0m"), "{}");
/// ```
#[must_use]
pub fn strip_ansi(input: &str) -> Cow<'_, str> {
    if !needs_stripping(input) {
        return Cow::Borrowed(input.trim());
    }

    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == ESC {
            skip_escape_sequence(&mut chars);
        } else if is_allowed_control(c) {
            result.push(c);
        } else if is_c0_control(c) || is_c1_control(c) || c == '\x7f' {
            if c == '\u{009b}' {
                skip_csi_params(&mut chars);
            }
        } else {
            result.push(c);
        }
    }

    let trimmed = result.trim();
    if trimmed.len() == result.len() {
        Cow::Owned(result)
    } else {
        Cow::Owned(trimmed.to_string())
    }
}

fn needs_stripping(input: &str) -> bool {
    input.chars().any(|c| {
        c == ESC
            || c == BEL
            || (is_c0_control(c) && !is_allowed_control(c))
            || is_c1_control(c)
            || c == '\x7f'
    })
}

fn is_c0_control(c: char) -> bool {
    c <= '\x1f'
}

fn is_allowed_control(c: char) -> bool {
    matches!(c, '\n' | '\t' | '\r')
}

fn is_c1_control(c: char) -> bool {
    ('\u{0080}'..='\u{009f}').contains(&c)
}

/// Skip an escape sequence starting after ESC.
fn skip_escape_sequence<I: Iterator<Item = char>>(chars: &mut std::iter::Peekable<I>) {
    let Some(&next) = chars.peek() else {
        return;
    };

    match next {
        '[' => {
            chars.next();
            skip_csi_params(chars);
        }
        ']' => {
            chars.next();
            skip_osc_sequence(chars);
        }
        // Charset designation and line attributes carry one extra byte.
        '(' | ')' | '*' | '+' | '#' | ' ' => {
            chars.next();
            chars.next();
        }
        '7' | '8' | 'c' | 'D' | 'E' | 'H' | 'M' | 'N' | 'O' | 'Z' | '=' | '>' | '<' => {
            chars.next();
        }
        // Lone ESC: drop it and let the next char be processed normally.
        _ => {}
    }
}

/// Skip CSI parameter/intermediate bytes up to and including the final byte.
fn skip_csi_params<I: Iterator<Item = char>>(chars: &mut std::iter::Peekable<I>) {
    while let Some(&c) = chars.peek() {
        if ('\x40'..='\x7e').contains(&c) {
            chars.next();
            return;
        } else if ('\x20'..='\x3f').contains(&c) {
            chars.next();
        } else {
            return;
        }
    }
}

/// Skip an OSC body until BEL or ST (`ESC \`).
fn skip_osc_sequence<I: Iterator<Item = char>>(chars: &mut std::iter::Peekable<I>) {
    while let Some(c) = chars.next() {
        if c == BEL {
            return;
        }
        if c == ESC && chars.peek() == Some(&'\\') {
            chars.next();
            return;
        }
    }
}
