//! VT100 terminal emulator.
//!
//! A deterministic state machine fed one Unicode scalar at a time.
//! Control sequences mutate a [`Display`] grid; replies the terminal
//! is expected to send back (device attributes) accumulate in a
//! buffer the owner drains after each feed. Malformed input logs and
//! resets the parser; it never corrupts the display.

mod actions;
mod table;

use core_display::{Char, Display, Point};
use tracing::debug;

pub use table::StateId;

/// Reply to `CSI c` (primary device attributes).
pub const DEVICE_ATTRIBUTES: &[u8] = b"\x1b[?62;1;2;7;8;9;15;18;21;44;45;46c";

#[derive(Debug)]
pub struct Emulator {
    pub(crate) display: Display,
    pub(crate) size: Point,
    cursor: Point,
    /// Set when a printable lands in the last column; the *next*
    /// printable wraps. Explicit cursor motion clears it.
    wrap_pending: bool,
    pub(crate) state: StateId,
    pub(crate) params: Vec<char>,
    replies: Vec<u8>,
    window_title: String,
    icon_name: String,
}

impl Emulator {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            display: Display::new(width, height),
            size: Point::new(width, height),
            cursor: Point::new(0, 0),
            wrap_pending: false,
            state: StateId::Start,
            params: Vec::new(),
            replies: Vec::new(),
            window_title: String::new(),
            icon_name: String::new(),
        }
    }

    /// Feed one input code through the state machine.
    pub fn input(&mut self, code: char) {
        let state = table::table().state(self.state);
        match state.lookup(code as u32) {
            Some(transition) => {
                if let Some(action) = transition.action {
                    action(self, code);
                }
                if let Some(next) = transition.next {
                    self.set_state(next);
                }
            }
            None => {
                if let Some(action) = state.default {
                    action(self, code);
                }
            }
        }
    }

    pub fn cursor(&self) -> Point {
        self.cursor
    }

    pub fn size(&self) -> Point {
        self.size
    }

    pub fn display(&self) -> &Display {
        &self.display
    }

    pub fn window_title(&self) -> &str {
        &self.window_title
    }

    pub fn icon_name(&self) -> &str {
        &self.icon_name
    }

    /// Drain pending terminal replies (device-attribute responses).
    pub fn take_replies(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.replies)
    }

    pub fn has_replies(&self) -> bool {
        !self.replies.is_empty()
    }

    /// Resize display and logical size together, clamping the cursor
    /// into the new bounds.
    pub fn resize(&mut self, width: usize, height: usize) {
        self.display.resize(width, height);
        self.size = Point::new(width, height);
        self.cursor.x = self.cursor.x.min(width.saturating_sub(1));
        self.cursor.y = self.cursor.y.min(height.saturating_sub(1));
        self.wrap_pending = false;
    }

    /// RIS: back to the power-on state. The size is kept.
    pub fn reset(&mut self) {
        self.display.clear_all();
        self.cursor = Point::new(0, 0);
        self.wrap_pending = false;
        self.state = StateId::Start;
        self.params.clear();
        self.replies.clear();
        self.window_title.clear();
        self.icon_name.clear();
    }

    pub(crate) fn set_state(&mut self, state: StateId) {
        self.state = state;
        self.params.clear();
    }

    pub(crate) fn reply(&mut self, bytes: &[u8]) {
        self.replies.extend_from_slice(bytes);
    }

    pub(crate) fn set_window_title(&mut self, title: &str) {
        debug!(target: "vt.osc", title, "window_title");
        self.window_title = title.to_string();
    }

    pub(crate) fn set_icon_name(&mut self, name: &str) {
        debug!(target: "vt.osc", name, "icon_name");
        self.icon_name = name.to_string();
    }

    pub(crate) fn cursor_signed(&self) -> (i64, i64) {
        (self.cursor.y as i64, self.cursor.x as i64)
    }

    /// Move the cursor. Columns clamp to the line; rows below the
    /// bottom scroll the display up and land on the last row. Any
    /// explicit motion cancels a pending wrap.
    pub(crate) fn move_to(&mut self, row: i64, col: i64) {
        self.wrap_pending = false;

        let max_x = self.size.x.saturating_sub(1) as i64;
        self.cursor.x = col.clamp(0, max_x) as usize;

        let height = self.size.y as i64;
        let row = row.max(0);
        if row >= height {
            self.scroll_up((row - height + 1) as usize);
            self.cursor.y = (height - 1).max(0) as usize;
        } else {
            self.cursor.y = row as usize;
        }
    }

    pub(crate) fn scroll_up(&mut self, count: usize) {
        self.display.scroll_up(count);
    }

    /// Place a printable at the cursor, honoring deferred wrap.
    pub(crate) fn insert_char(&mut self, ch: char) {
        if self.wrap_pending {
            // The previous printable filled the last column; wrap
            // now, scrolling if we are already on the bottom row.
            let row = self.cursor.y as i64 + 1;
            self.move_to(row, 0);
        }
        self.display.set(self.cursor, Char::new(ch));
        if self.cursor.x + 1 >= self.size.x {
            self.wrap_pending = true;
        } else {
            self.cursor.x += 1;
        }
    }

    /// ICH: shift the tail of `row` right by `count`, exposing blanks
    /// at the insertion point.
    pub(crate) fn insert_cells(&mut self, row: usize, col: usize, count: usize) {
        let width = self.size.x;
        if row >= self.size.y || col >= width || count == 0 {
            return;
        }
        if col + count >= width {
            self.display.clear_row(row, col, width);
            return;
        }
        for x in (col..width).rev() {
            let cell = if x >= col + count {
                self.display.get(Point::new(x - count, row))
            } else {
                Char::blank()
            };
            self.display.set(Point::new(x, row), cell);
        }
    }

    /// DCH: shift the tail of `row` left by `count`, blanking the end.
    pub(crate) fn delete_cells(&mut self, row: usize, col: usize, count: usize) {
        let width = self.size.x;
        if row >= self.size.y || col >= width || count == 0 {
            return;
        }
        for x in col..width {
            let cell = if x + count < width {
                self.display.get(Point::new(x + count, row))
            } else {
                Char::blank()
            };
            self.display.set(Point::new(x, row), cell);
        }
    }

    /// ED. `from_start` erases rows above plus the line head through
    /// the cursor; `to_end` erases from the cursor through the bottom.
    /// Both together erase everything. The cursor cell is included in
    /// either direction.
    pub(crate) fn clear_display(&mut self, from_start: bool, to_end: bool) {
        let Point { x, y } = self.cursor;
        if from_start {
            for row in 0..y {
                self.display.clear_row(row, 0, self.size.x);
            }
            self.display.clear_row(y, 0, x + 1);
        }
        if to_end {
            self.display.clear_row(y, x, self.size.x);
            for row in y + 1..self.size.y {
                self.display.clear_row(row, 0, self.size.x);
            }
        }
    }

    /// Leading non-numeric prefix plus `;`-separated numeric fields.
    /// A field that is empty, unparsable, or zero takes its default.
    fn parse_csi_params(&self, defaults: &[i64]) -> (String, Vec<i64>) {
        let raw: String = self.params.iter().collect();
        let numeric = |c: char| c.is_ascii_digit() || c == ';' || c == ':';

        let at = raw.find(numeric).unwrap_or(raw.len());
        let (prefix, rest) = raw.split_at(at);
        if rest.chars().any(|c| !numeric(c)) {
            // Not of the form prefix + digits: fall back entirely.
            return (String::new(), defaults.to_vec());
        }

        let mut values = defaults.to_vec();
        for (idx, field) in rest.split(';').enumerate() {
            let parsed = field.parse::<i64>().unwrap_or(0);
            let value = if parsed == 0 && idx < defaults.len() {
                defaults[idx]
            } else {
                parsed
            };
            if idx < values.len() {
                values[idx] = value;
            } else {
                values.push(value);
            }
        }
        (prefix.to_string(), values)
    }

    pub(crate) fn csi_param(&self, default: i64) -> i64 {
        self.parse_csi_params(&[default]).1[0]
    }

    pub(crate) fn csi_prefix_param(&self, default: i64) -> (String, i64) {
        let (prefix, values) = self.parse_csi_params(&[default]);
        (prefix, values[0])
    }

    pub(crate) fn csi_params2(&self, a: i64, b: i64) -> (i64, i64) {
        let (_, values) = self.parse_csi_params(&[a, b]);
        (values[0], values[1])
    }
}
