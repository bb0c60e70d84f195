//! The console: an emulator over a display plus the line discipline.
//!
//! Keyboard ingest (`on_key`) runs on the host event task while
//! readers block in `read` on another; a notify primitive plays the
//! condition variable. All mutable state sits behind one mutex and no
//! lock is held across an await.

use std::sync::Mutex;

use core_display::{CellSink, Point, RenderCell};
use core_vt100::Emulator;
use tokio::sync::Notify;
use tracing::{debug, trace};

use crate::canon::Canonical;
use crate::keys::{KeyKind, raw_sequence, translate_host_key};
use crate::TtyFlags;

pub struct Console {
    state: Mutex<ConsoleState>,
    readable: Notify,
}

struct ConsoleState {
    flags: TtyFlags,
    emulator: Emulator,
    canon: Canonical,
    raw: Vec<u8>,
    /// Partial UTF-8 sequence carried between writes.
    decode: Vec<u8>,
    last_char: char,
    closed: bool,
    sink: Box<dyn CellSink + Send>,
}

impl std::fmt::Debug for Console {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Console").finish_non_exhaustive()
    }
}

impl Console {
    pub fn new(width: usize, height: usize, sink: Box<dyn CellSink + Send>) -> Self {
        Self {
            state: Mutex::new(ConsoleState {
                flags: TtyFlags::ICANON | TtyFlags::ECHO,
                emulator: Emulator::new(width, height),
                canon: Canonical::new(),
                raw: Vec::new(),
                decode: Vec::new(),
                last_char: '\0',
                closed: false,
                sink,
            }),
            readable: Notify::new(),
        }
    }

    pub fn flags(&self) -> TtyFlags {
        self.state.lock().unwrap().flags
    }

    /// Unrecognised bits are dropped. Switching modes wakes readers so
    /// they re-check the queue their new mode drains.
    pub fn set_flags(&self, flags: TtyFlags) {
        self.state.lock().unwrap().flags = flags;
        self.readable.notify_waiters();
    }

    pub fn cursor(&self) -> Point {
        self.state.lock().unwrap().emulator.cursor()
    }

    pub fn size(&self) -> Point {
        self.state.lock().unwrap().emulator.size()
    }

    pub fn window_title(&self) -> String {
        self.state.lock().unwrap().emulator.window_title().to_string()
    }

    pub fn resize(&self, width: usize, height: usize) {
        let mut st = self.state.lock().unwrap();
        st.emulator.resize(width, height);
        st.render();
    }

    /// Write bytes to the display. Partial trailing sequences persist
    /// across calls; invalid sequences are skipped one byte at a time;
    /// a bare LF gets an implicit CR first.
    pub fn write(&self, bytes: &[u8]) -> usize {
        let mut st = self.state.lock().unwrap();
        st.decode.extend_from_slice(bytes);

        let data = std::mem::take(&mut st.decode);
        let mut idx = 0;
        while idx < data.len() {
            match std::str::from_utf8(&data[idx..]) {
                Ok(s) => {
                    for ch in s.chars() {
                        st.feed(ch);
                    }
                    idx = data.len();
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    if let Ok(s) = std::str::from_utf8(&data[idx..idx + valid]) {
                        for ch in s.chars() {
                            st.feed(ch);
                        }
                    }
                    match err.error_len() {
                        Some(bad) => idx += valid + bad,
                        None => {
                            // Incomplete tail: keep it for the next write.
                            st.decode = data[idx + valid..].to_vec();
                            idx = data.len();
                        }
                    }
                }
            }
        }

        let committed = st.route_replies();
        st.render();
        drop(st);
        if committed {
            self.readable.notify_waiters();
        }
        bytes.len()
    }

    /// Read input. Canonical mode hands out committed lines; raw mode
    /// drains whatever bytes are queued. Blocks until data or close;
    /// returns 0 only on close (or an empty buffer).
    pub async fn read(&self, buf: &mut [u8]) -> usize {
        if buf.is_empty() {
            return 0;
        }
        loop {
            let notified = self.readable.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut st = self.state.lock().unwrap();
                let n = if st.flags.contains(TtyFlags::ICANON) {
                    st.canon.drain_available(buf)
                } else {
                    let n = st.raw.len().min(buf.len());
                    buf[..n].copy_from_slice(&st.raw[..n]);
                    st.raw.drain(..n);
                    n
                };
                if n > 0 {
                    return n;
                }
                if st.closed {
                    return 0;
                }
            }
            notified.await;
        }
    }

    /// Keyboard ingest from the host event delivery.
    pub fn on_key(&self, kind: KeyKind, code: char) {
        let mut st = self.state.lock().unwrap();
        let mut wake = false;

        if st.flags.contains(TtyFlags::ICANON) {
            if st.handle_canonical_key(kind, code) {
                wake = true;
            }
            st.render();
        } else {
            match kind {
                KeyKind::Code => {
                    let mut utf8 = [0u8; 4];
                    let encoded = code.encode_utf8(&mut utf8);
                    st.raw.extend_from_slice(encoded.as_bytes());
                }
                named => st.raw.extend_from_slice(raw_sequence(named)),
            }
            wake = true;
        }

        drop(st);
        if wake {
            self.readable.notify_waiters();
        }
    }

    /// Host keyboard event: a key name plus the ctrl modifier, as
    /// delivered by `keydown`.
    pub fn on_key_event(&self, key: &str, ctrl: bool) {
        if let Some((kind, code)) = translate_host_key(key, ctrl) {
            self.on_key(kind, code);
        }
    }

    /// Render the grid to the host sink.
    pub fn flush(&self) {
        self.state.lock().unwrap().render();
    }

    /// Text of one display row, trailing blanks included.
    pub fn row_text(&self, y: usize) -> String {
        self.state.lock().unwrap().emulator.display().row_text(y)
    }

    /// Shut the console down: readers wake and see EOF.
    pub fn close(&self) {
        self.state.lock().unwrap().closed = true;
        self.readable.notify_waiters();
    }
}

impl ConsoleState {
    /// One decoded scalar from the write path.
    fn feed(&mut self, ch: char) {
        if ch == '\n' && self.last_char != '\r' {
            self.emulator.input('\r');
        }
        self.emulator.input(ch);
        self.last_char = ch;
    }

    /// Echo codes through the emulator, ECHO permitting.
    fn echo(&mut self, codes: &[u32]) {
        if !self.flags.contains(TtyFlags::ECHO) {
            return;
        }
        for &code in codes {
            if let Some(ch) = char::from_u32(code) {
                self.emulator.input(ch);
            }
        }
    }

    fn handle_canonical_key(&mut self, kind: KeyKind, code: char) -> bool {
        let action = self.canon.input(kind, code);
        trace!(target: "tty.key", ?kind, committed = action.committed, "canonical_key");
        self.echo(&action.echo);
        if action.committed {
            // The committed line's newline renders regardless of ECHO.
            self.emulator.input('\r');
            self.emulator.input('\n');
        }
        let fed_back = self.route_replies();
        action.committed || fed_back
    }

    /// Device-attribute replies the emulator produced flow back into
    /// the input path, as if typed.
    fn route_replies(&mut self) -> bool {
        let mut committed = false;
        while self.emulator.has_replies() {
            let replies = self.emulator.take_replies();
            debug!(target: "tty.key", len = replies.len(), "terminal_reply");
            if self.flags.contains(TtyFlags::ICANON) {
                for byte in replies {
                    let action = self.canon.input(KeyKind::Code, byte as char);
                    self.echo(&action.echo);
                    committed |= action.committed;
                }
            } else {
                self.raw.extend_from_slice(&replies);
                committed = true;
            }
        }
        committed
    }

    fn render(&mut self) {
        let cursor = self.emulator.cursor();
        let size = self.emulator.size();
        self.sink.clear();
        let mut line = Vec::with_capacity(size.x);
        for y in 0..size.y {
            line.clear();
            for (x, cell) in self.emulator.display().row(y).iter().enumerate() {
                line.push(RenderCell {
                    code: cell.code,
                    fg: cell.fg,
                    bg: cell.bg,
                    cursor: x == cursor.x && y == cursor.y,
                });
            }
            self.sink.add_line(&line);
        }
    }
}
