//! Canonical input mode with Emacs-like line editing.
//!
//! The editor owns a fixed-capacity line buffer with a cursor and a
//! tail (`0 <= cursor <= tail <= capacity`), plus the committed-line
//! byte queue readers drain. It never inspects the emulator; the echo
//! sequences it hands back are derived purely from its own state.

use tracing::debug;

use crate::keys::KeyKind;

const LINE_CAPACITY: usize = 1024;

const BACKSPACE: &[u32] = &[0x08];
const CURSOR_FORWARD: &[u32] = &[0x1b, b'[' as u32, b'C' as u32];
const DELETE_CHAR: &[u32] = &[0x1b, b'[' as u32, b'P' as u32];
const ERASE_LINE_TAIL: &[u32] = &[0x1b, b'[' as u32, b'K' as u32];
const ERASE_SCREEN_TAIL: &[u32] = &[0x1b, b'[' as u32, b'J' as u32];

/// What one key did: echo codes to replay on the emulator (when ECHO
/// is set) and whether a line was committed.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct KeyAction {
    pub echo: Vec<u32>,
    pub committed: bool,
}

impl KeyAction {
    fn echoing(echo: Vec<u32>) -> Self {
        Self {
            echo,
            committed: false,
        }
    }

    fn commit() -> Self {
        Self {
            echo: Vec::new(),
            committed: true,
        }
    }
}

#[derive(Debug)]
pub(crate) struct Canonical {
    buf: Vec<char>,
    cursor: usize,
    tail: usize,
    avail: Vec<u8>,
}

impl Canonical {
    pub fn new() -> Self {
        Self {
            buf: vec!['\0'; LINE_CAPACITY],
            cursor: 0,
            tail: 0,
            avail: Vec::new(),
        }
    }

    pub fn available(&self) -> &[u8] {
        &self.avail
    }

    /// Move committed bytes out to the reader, up to `buf.len()`.
    pub fn drain_available(&mut self, buf: &mut [u8]) -> usize {
        let n = self.avail.len().min(buf.len());
        buf[..n].copy_from_slice(&self.avail[..n]);
        self.avail.drain(..n);
        n
    }

    pub fn input(&mut self, kind: KeyKind, code: char) -> KeyAction {
        match kind {
            KeyKind::Code => self.input_code(code),
            KeyKind::Enter => {
                self.commit_line();
                KeyAction::commit()
            }
            KeyKind::CursorLeft => self.cursor_left(),
            KeyKind::CursorRight => self.cursor_right(),
            other => {
                debug!(target: "tty.key", kind = ?other, "canonical_key_ignored");
                KeyAction::default()
            }
        }
    }

    fn input_code(&mut self, code: char) -> KeyAction {
        match code as u32 {
            // C-a: to line start
            0x01 => {
                let mut echo = Vec::new();
                while self.cursor > 0 {
                    echo.extend_from_slice(BACKSPACE);
                    self.cursor -= 1;
                }
                KeyAction::echoing(echo)
            }
            // C-b
            0x02 => self.cursor_left(),
            // C-d: delete under cursor
            0x04 => {
                if self.cursor == self.tail {
                    return KeyAction::default();
                }
                self.cursor += 1;
                self.delete();
                KeyAction::echoing(DELETE_CHAR.to_vec())
            }
            // C-e: to line end
            0x05 => {
                let mut echo = Vec::new();
                while self.cursor < self.tail {
                    echo.extend_from_slice(CURSOR_FORWARD);
                    self.cursor += 1;
                }
                KeyAction::echoing(echo)
            }
            // C-f
            0x06 => self.cursor_right(),
            // C-k: truncate at cursor
            0x0b => {
                self.tail = self.cursor;
                KeyAction::echoing(ERASE_LINE_TAIL.to_vec())
            }
            // C-l: clear below
            0x0c => KeyAction::echoing(ERASE_SCREEN_TAIL.to_vec()),
            // DEL: backspace
            0x7f => {
                if self.cursor == 0 {
                    return KeyAction::default();
                }
                let mut echo = BACKSPACE.to_vec();
                if self.cursor == self.tail {
                    echo.extend_from_slice(ERASE_LINE_TAIL);
                } else {
                    echo.extend_from_slice(DELETE_CHAR);
                }
                self.delete();
                KeyAction::echoing(echo)
            }
            0x0a => {
                self.commit_line();
                KeyAction::commit()
            }
            _ if !code.is_control() => self.insert(code),
            other => {
                debug!(target: "tty.key", code = other, "non_printable_dropped");
                KeyAction::default()
            }
        }
    }

    fn commit_line(&mut self) {
        let line: String = self.buf[..self.tail].iter().collect();
        self.avail.extend_from_slice(line.as_bytes());
        self.avail.push(b'\n');
        self.cursor = 0;
        self.tail = 0;
    }

    fn cursor_left(&mut self) -> KeyAction {
        if self.cursor == 0 {
            return KeyAction::default();
        }
        self.cursor -= 1;
        KeyAction::echoing(BACKSPACE.to_vec())
    }

    fn cursor_right(&mut self) -> KeyAction {
        if self.cursor == self.tail {
            return KeyAction::default();
        }
        self.cursor += 1;
        KeyAction::echoing(CURSOR_FORWARD.to_vec())
    }

    fn insert(&mut self, ch: char) -> KeyAction {
        if self.tail >= self.buf.len() {
            return KeyAction::default();
        }
        if self.cursor < self.tail {
            self.buf.copy_within(self.cursor..self.tail, self.cursor + 1);
        }
        self.buf[self.cursor] = ch;
        self.cursor += 1;
        self.tail += 1;

        // Replay from the inserted character to the tail, then walk
        // the cursor back to its place.
        let mut echo = Vec::new();
        for &c in &self.buf[self.cursor - 1..self.tail] {
            echo.push(c as u32);
        }
        for _ in self.cursor..self.tail {
            echo.extend_from_slice(BACKSPACE);
        }
        KeyAction::echoing(echo)
    }

    /// Remove the character before the cursor (callers position the
    /// cursor one past the victim first).
    fn delete(&mut self) {
        if self.cursor == self.tail {
            self.cursor -= 1;
            self.tail -= 1;
        } else {
            self.cursor -= 1;
            self.buf.copy_within(self.cursor + 1..self.tail, self.cursor);
            self.tail -= 1;
        }
    }

    #[cfg(test)]
    fn line(&self) -> String {
        self.buf[..self.tail].iter().collect()
    }

    #[cfg(test)]
    fn invariant_ok(&self) -> bool {
        self.cursor <= self.tail && self.tail <= self.buf.len()
    }
}
