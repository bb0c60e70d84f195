//! Userland line editing over the syscall client.
//!
//! The kernel's canonical editor serves plain line input; programs
//! that want tab completion (the shell, mainly) switch the TTY to raw
//! mode and run this editor instead. It mirrors the same Emacs subset
//! and echoes by writing VT100 sequences to stdout, with the TTY
//! flags restored when the read returns.

mod tabulate;

pub use tabulate::{common_prefix, tabulate};

use std::future::Future;
use std::pin::Pin;

use core_sys::{Sys, SysError, tty};
use tracing::debug;

const STDIN: i32 = 0;
const STDOUT: i32 = 1;
const LINE_CAPACITY: usize = 1024;

const BACKSPACE: &[u8] = b"\x08";
const CURSOR_FORWARD: &[u8] = b"\x1b[C";
const DELETE_CHAR: &[u8] = b"\x1b[P";
const ERASE_LINE_TAIL: &[u8] = b"\x1b[K";

/// Completion hook: takes the current line, returns the (possibly
/// extended) line plus candidates to list when the extension is
/// ambiguous.
pub type TabHook =
    Box<dyn Fn(String) -> Pin<Box<dyn Future<Output = (String, Vec<String>)> + Send>> + Send + Sync>;

/// Raw mode hands cursor keys through as their VT100 sequences; this
/// tracks a partially-read one between input bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EscState {
    Idle,
    Esc,
    Csi,
}

pub struct Readline {
    sys: Sys,
    prompt: String,
    buf: Vec<u8>,
    cursor: usize,
    tail: usize,
    esc: EscState,
    pub tab: Option<TabHook>,
}

impl std::fmt::Debug for Readline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Readline")
            .field("cursor", &self.cursor)
            .field("tail", &self.tail)
            .finish_non_exhaustive()
    }
}

impl Readline {
    pub fn new(sys: Sys) -> Self {
        Self {
            sys,
            prompt: String::new(),
            buf: vec![0; LINE_CAPACITY],
            cursor: 0,
            tail: 0,
            esc: EscState::Idle,
            tab: None,
        }
    }

    /// Print the prompt and edit one line in raw mode. The previous
    /// TTY flags are restored before returning, success or not.
    pub async fn read(&mut self, prompt: &str) -> Result<String, SysError> {
        let saved = self.sys.get_flags(STDIN).await?;
        self.sys
            .set_flags(STDIN, saved & !(tty::ICANON | tty::ECHO))
            .await?;
        let result = self.edit(prompt).await;
        let restored = self.sys.set_flags(STDIN, saved).await;
        match result {
            Ok(line) => {
                restored?;
                Ok(line)
            }
            Err(e) => Err(e),
        }
    }

    /// Prompt for a secret: raw mode, nothing echoed, committed on
    /// CR/LF. Flags are restored like `read`.
    pub async fn read_password(&mut self, prompt: &str) -> Result<String, SysError> {
        let saved = self.sys.get_flags(STDIN).await?;
        self.sys
            .set_flags(STDIN, saved & !(tty::ICANON | tty::ECHO))
            .await?;
        let result = self.edit_password(prompt).await;
        let restored = self.sys.set_flags(STDIN, saved).await;
        match result {
            Ok(secret) => {
                restored?;
                Ok(secret)
            }
            Err(e) => Err(e),
        }
    }

    async fn edit_password(&mut self, prompt: &str) -> Result<String, SysError> {
        self.sys.write_all(STDOUT, prompt.as_bytes()).await?;
        let mut secret = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            if self.sys.read(STDIN, &mut byte).await? == 0 {
                break;
            }
            match byte[0] {
                b'\r' | b'\n' => break,
                0x7f => {
                    secret.pop();
                }
                b if b >= 0x20 => secret.push(b),
                _ => {}
            }
        }
        self.sys.write_all(STDOUT, b"\n").await?;
        Ok(String::from_utf8_lossy(&secret).into_owned())
    }

    fn line(&self) -> String {
        String::from_utf8_lossy(&self.buf[..self.tail]).into_owned()
    }

    async fn edit(&mut self, prompt: &str) -> Result<String, SysError> {
        self.cursor = 0;
        self.tail = 0;
        self.prompt = prompt.to_string();
        self.sys.write_all(STDOUT, prompt.as_bytes()).await?;

        let mut byte = [0u8; 1];
        loop {
            if self.sys.read(STDIN, &mut byte).await? == 0 {
                // Closed stream: commit what was typed, or report the
                // end so the caller can wind down.
                if self.tail == 0 {
                    return Err(SysError::Disconnected);
                }
                return Ok(self.line());
            }
            if self.input(byte[0]).await? {
                return Ok(self.line());
            }
        }
    }

    async fn input(&mut self, byte: u8) -> Result<bool, SysError> {
        match self.esc {
            EscState::Esc => {
                self.esc = if byte == b'[' {
                    EscState::Csi
                } else {
                    debug!(target: "readline", code = byte, "escape_dropped");
                    EscState::Idle
                };
                return Ok(false);
            }
            EscState::Csi => {
                // Parameter bytes accumulate silently; the final byte
                // decides. Only the cursor moves do anything.
                if (0x30..=0x3f).contains(&byte) {
                    return Ok(false);
                }
                self.esc = EscState::Idle;
                match byte {
                    b'C' => self.cursor_right().await?,
                    b'D' => self.cursor_left().await?,
                    other => {
                        debug!(target: "readline", code = other, "csi_dropped");
                    }
                }
                return Ok(false);
            }
            EscState::Idle => {}
        }

        match byte {
            0x1b => {
                self.esc = EscState::Esc;
            }
            // C-a: to line start
            0x01 => {
                let back = BACKSPACE.repeat(self.cursor);
                self.cursor = 0;
                self.sys.write_all(STDOUT, &back).await?;
            }
            // C-b
            0x02 => self.cursor_left().await?,
            // C-d: delete under cursor
            0x04 => {
                if self.cursor < self.tail {
                    self.sys.write_all(STDOUT, DELETE_CHAR).await?;
                    self.cursor += 1;
                    self.delete();
                }
            }
            // C-e: to line end
            0x05 => {
                let forward = CURSOR_FORWARD.repeat(self.tail - self.cursor);
                self.cursor = self.tail;
                self.sys.write_all(STDOUT, &forward).await?;
            }
            // C-f
            0x06 => self.cursor_right().await?,
            // Tab: completion
            0x09 => self.complete().await?,
            // C-k: truncate at cursor
            0x0b => {
                self.tail = self.cursor;
                self.sys.write_all(STDOUT, ERASE_LINE_TAIL).await?;
            }
            // Commit. Raw-mode Enter arrives as CR.
            b'\r' | b'\n' => return Ok(true),
            // DEL: backspace
            0x7f => {
                if self.cursor > 0 {
                    self.sys.write_all(STDOUT, BACKSPACE).await?;
                    if self.cursor == self.tail {
                        self.sys.write_all(STDOUT, ERASE_LINE_TAIL).await?;
                    } else {
                        self.sys.write_all(STDOUT, DELETE_CHAR).await?;
                    }
                    self.delete();
                }
            }
            b if b >= 0x20 && b != 0x7f => {
                if self.insert(b) {
                    // Replay from the new character to the tail, then
                    // step the cursor back into place.
                    let mut echo = self.buf[self.cursor - 1..self.tail].to_vec();
                    echo.extend(BACKSPACE.repeat(self.tail - self.cursor));
                    self.sys.write_all(STDOUT, &echo).await?;
                }
            }
            other => {
                debug!(target: "readline", code = other, "non_printable_dropped");
            }
        }
        Ok(false)
    }

    async fn cursor_left(&mut self) -> Result<(), SysError> {
        if self.cursor > 0 {
            self.cursor -= 1;
            self.sys.write_all(STDOUT, BACKSPACE).await?;
        }
        Ok(())
    }

    async fn cursor_right(&mut self) -> Result<(), SysError> {
        if self.cursor < self.tail {
            self.cursor += 1;
            self.sys.write_all(STDOUT, CURSOR_FORWARD).await?;
        }
        Ok(())
    }

    fn insert(&mut self, byte: u8) -> bool {
        if self.tail >= self.buf.len() {
            return false;
        }
        if self.cursor < self.tail {
            self.buf.copy_within(self.cursor..self.tail, self.cursor + 1);
        }
        self.buf[self.cursor] = byte;
        self.cursor += 1;
        self.tail += 1;
        true
    }

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

    async fn complete(&mut self) -> Result<(), SysError> {
        let line = self.line();
        let future = match &self.tab {
            Some(hook) => hook(line.clone()),
            None => return Ok(()),
        };
        let (completed, candidates) = future.await;

        if candidates.len() > 1 {
            let listing = tabulate(&candidates);
            self.sys.write_all(STDOUT, b"\r\n").await?;
            self.sys.write_all(STDOUT, listing.as_bytes()).await?;
        }
        if completed != line {
            let bytes = completed.as_bytes();
            let n = bytes.len().min(self.buf.len());
            self.buf[..n].copy_from_slice(&bytes[..n]);
            self.cursor = n;
            self.tail = n;
        }
        if candidates.len() > 1 || completed != line {
            self.redraw().await?;
        }
        Ok(())
    }

    /// Repaint the prompt and line on a fresh row start.
    async fn redraw(&mut self) -> Result<(), SysError> {
        let mut out = b"\r\x1b[K".to_vec();
        out.extend_from_slice(self.prompt.as_bytes());
        out.extend_from_slice(&self.buf[..self.tail]);
        self.cursor = self.tail;
        self.sys.write_all(STDOUT, &out).await
    }
}
