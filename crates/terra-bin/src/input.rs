//! Crossterm events → console keys. The kernel's keyboard callback
//! in the browser delivers key names plus a ctrl bit; this task plays
//! that role for the native harness.

use std::sync::Arc;

use core_tty::{Console, KeyKind};
use crossterm::event::{Event, EventStream, KeyCode, KeyEventKind, KeyModifiers};
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::{debug, trace};

pub fn spawn_input_task(console: Arc<Console>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut stream = EventStream::new();
        while let Some(event) = stream.next().await {
            match event {
                Ok(Event::Key(key)) => {
                    if !matches!(key.kind, KeyEventKind::Press | KeyEventKind::Repeat) {
                        continue;
                    }
                    if let Some((kind, code)) = translate(key.code, key.modifiers) {
                        trace!(target: "input", ?kind, code = code as u32, "key");
                        console.on_key(kind, code);
                    }
                }
                Ok(Event::Resize(cols, rows)) => {
                    debug!(target: "input", cols, rows, "resize");
                    console.resize(cols as usize, rows as usize);
                }
                Ok(_) => {}
                Err(e) => {
                    debug!(target: "input", error = %e, "event_stream_error");
                    break;
                }
            }
        }
        console.close();
    })
}

fn translate(code: KeyCode, modifiers: KeyModifiers) -> Option<(KeyKind, char)> {
    let key = match code {
        KeyCode::Char(c) => {
            let code = if modifiers.contains(KeyModifiers::CONTROL) {
                control_code(c)
            } else {
                c
            };
            (KeyKind::Code, code)
        }
        KeyCode::Enter => (KeyKind::Enter, '\0'),
        KeyCode::Backspace => (KeyKind::Code, '\u{7f}'),
        KeyCode::Tab => (KeyKind::Code, '\t'),
        KeyCode::Esc => (KeyKind::Code, '\u{1b}'),
        KeyCode::Up => (KeyKind::CursorUp, '\0'),
        KeyCode::Down => (KeyKind::CursorDown, '\0'),
        KeyCode::Left => (KeyKind::CursorLeft, '\0'),
        KeyCode::Right => (KeyKind::CursorRight, '\0'),
        KeyCode::PageUp => (KeyKind::PageUp, '\0'),
        KeyCode::PageDown => (KeyKind::PageDown, '\0'),
        KeyCode::Home => (KeyKind::Home, '\0'),
        KeyCode::End => (KeyKind::End, '\0'),
        _ => return None,
    };
    Some(key)
}

fn control_code(c: char) -> char {
    match c {
        'a'..='z' => char::from_u32(c as u32 - 0x60).unwrap_or(c),
        '_' => '\u{1f}',
        ' ' => '\0',
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chars_and_ctrl_chords() {
        assert_eq!(
            translate(KeyCode::Char('x'), KeyModifiers::NONE),
            Some((KeyKind::Code, 'x'))
        );
        assert_eq!(
            translate(KeyCode::Char('d'), KeyModifiers::CONTROL),
            Some((KeyKind::Code, '\u{04}'))
        );
    }

    #[test]
    fn named_keys_map_to_kinds() {
        assert_eq!(
            translate(KeyCode::Enter, KeyModifiers::NONE),
            Some((KeyKind::Enter, '\0'))
        );
        assert_eq!(
            translate(KeyCode::Left, KeyModifiers::NONE),
            Some((KeyKind::CursorLeft, '\0'))
        );
        assert_eq!(translate(KeyCode::F(5), KeyModifiers::NONE), None);
    }
}
