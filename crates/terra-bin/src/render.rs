//! Crossterm rendering of the console's cell grid, plus the RAII
//! guard that gets the terminal back on exit or panic.

use std::io::{Stdout, Write, stdout};

use core_display::{CellSink, RenderCell, Rgba};
use crossterm::style::{Attribute, Color, SetAttribute, SetBackgroundColor, SetForegroundColor};
use crossterm::terminal::{
    Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode,
    enable_raw_mode,
};
use crossterm::{cursor, execute, queue};
use tracing::warn;

/// Raw mode + alternate screen for the duration of the run.
#[derive(Debug)]
pub struct TerminalGuard {
    active: bool,
}

impl TerminalGuard {
    pub fn enter() -> anyhow::Result<Self> {
        enable_raw_mode()?;
        execute!(stdout(), EnterAlternateScreen, cursor::Hide)?;
        Ok(Self { active: true })
    }

    pub fn restore() {
        let _ = execute!(stdout(), LeaveAlternateScreen, cursor::Show);
        let _ = disable_raw_mode();
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        if self.active {
            Self::restore();
        }
    }
}

/// Draws each frame in full: the console hands rows top to bottom
/// after every flush and the grid is small, so there is no dirty
/// tracking here.
#[derive(Debug)]
pub struct CrosstermRenderer {
    out: Stdout,
    row: u16,
}

impl CrosstermRenderer {
    pub fn new() -> Self {
        Self {
            out: stdout(),
            row: 0,
        }
    }
}

impl Default for CrosstermRenderer {
    fn default() -> Self {
        Self::new()
    }
}

fn color(rgba: Rgba) -> Color {
    Color::Rgb {
        r: (rgba >> 24) as u8,
        g: (rgba >> 16) as u8,
        b: (rgba >> 8) as u8,
    }
}

impl CellSink for CrosstermRenderer {
    fn clear(&mut self) {
        self.row = 0;
        if let Err(e) = queue!(self.out, cursor::MoveTo(0, 0), Clear(ClearType::All)) {
            warn!(target: "render", error = %e, "clear_failed");
        }
    }

    fn add_line(&mut self, cells: &[RenderCell]) {
        let result = (|| -> std::io::Result<()> {
            queue!(self.out, cursor::MoveTo(0, self.row))?;
            for cell in cells {
                if cell.cursor {
                    queue!(self.out, SetAttribute(Attribute::Reverse))?;
                }
                queue!(
                    self.out,
                    SetForegroundColor(color(cell.fg)),
                    SetBackgroundColor(color(cell.bg)),
                    crossterm::style::Print(cell.code)
                )?;
                if cell.cursor {
                    queue!(self.out, SetAttribute(Attribute::NoReverse))?;
                }
            }
            self.out.flush()
        })();
        if let Err(e) = result {
            warn!(target: "render", error = %e, "draw_failed");
        }
        self.row = self.row.saturating_add(1);
    }
}
