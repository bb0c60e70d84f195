//! Key event kinds and host keyboard translation.

use tracing::trace;

/// Input kind delivered by the host keyboard callback. `Code` carries
/// a codepoint; the named kinds carry none.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Code,
    Enter,
    CursorUp,
    CursorDown,
    CursorLeft,
    CursorRight,
    PageUp,
    PageDown,
    Home,
    End,
}

/// Translate a host keyboard event (`key` string plus the ctrl
/// modifier) into a console key. Returns `None` for keys the console
/// does not consume (modifiers, function keys).
pub fn translate_host_key(key: &str, ctrl: bool) -> Option<(KeyKind, char)> {
    let mut chars = key.chars();
    if let (Some(code), None) = (chars.next(), chars.next()) {
        let code = if ctrl { control_code(code) } else { code };
        return Some((KeyKind::Code, code));
    }
    let kind = match key {
        "Enter" => (KeyKind::Enter, '\0'),
        "Backspace" => (KeyKind::Code, '\u{7f}'),
        "Tab" => (KeyKind::Code, '\t'),
        "Escape" => (KeyKind::Code, '\u{1b}'),
        "ArrowUp" => (KeyKind::CursorUp, '\0'),
        "ArrowDown" => (KeyKind::CursorDown, '\0'),
        "ArrowLeft" => (KeyKind::CursorLeft, '\0'),
        "ArrowRight" => (KeyKind::CursorRight, '\0'),
        "PageUp" => (KeyKind::PageUp, '\0'),
        "PageDown" => (KeyKind::PageDown, '\0'),
        "Home" => (KeyKind::Home, '\0'),
        "End" => (KeyKind::End, '\0'),
        other => {
            trace!(target: "tty.key", key = other, "ignored_host_key");
            return None;
        }
    };
    Some(kind)
}

/// Map a ctrl-chorded character onto its C0 control code.
fn control_code(code: char) -> char {
    match code {
        'a'..='z' => char::from_u32(code as u32 - 0x60).unwrap_or(code),
        '_' => '\u{1f}',
        ' ' => '\0',
        other => other,
    }
}

/// The raw-mode byte sequence for a named key.
pub(crate) fn raw_sequence(kind: KeyKind) -> &'static [u8] {
    match kind {
        KeyKind::Enter => b"\r",
        KeyKind::CursorUp => b"\x1b[A",
        KeyKind::CursorDown => b"\x1b[B",
        KeyKind::CursorRight => b"\x1b[C",
        KeyKind::CursorLeft => b"\x1b[D",
        KeyKind::PageUp => b"\x1b[5~",
        KeyKind::PageDown => b"\x1b[6~",
        KeyKind::Home => b"\x1b[H",
        KeyKind::End => b"\x1b[F",
        KeyKind::Code => b"",
    }
}
