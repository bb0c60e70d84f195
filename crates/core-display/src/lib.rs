//! Character-cell display buffer.
//!
//! The display is a fixed grid of [`Char`] cells addressed by
//! [`Point`]. Every row holds exactly `width` cells after any
//! operation; the emulator relies on that to rotate rows on scroll.
//! Pixel rendering is the host's problem: [`CellSink`] receives the
//! grid one row of cell tuples at a time.

/// 32-bit RGBA colour, `0xRRGGBBAA`.
pub type Rgba = u32;

pub const BLACK: Rgba = 0x0000_00ff;
pub const WHITE: Rgba = 0xffff_ffff;

/// Default foreground/background of freshly exposed cells.
pub const DEFAULT_FG: Rgba = BLACK;
pub const DEFAULT_BG: Rgba = WHITE;

/// One display cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Char {
    pub code: char,
    pub fg: Rgba,
    pub bg: Rgba,
}

impl Char {
    pub const fn new(code: char) -> Self {
        Self {
            code,
            fg: DEFAULT_FG,
            bg: DEFAULT_BG,
        }
    }

    /// The blank cell used for clears and newly exposed area.
    pub const fn blank() -> Self {
        Self::new(' ')
    }
}

impl Default for Char {
    fn default() -> Self {
        Self::blank()
    }
}

/// Grid coordinate, origin (0, 0) top-left.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Point {
    pub x: usize,
    pub y: usize,
}

impl Point {
    pub const fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }
}

/// A cell handed to the host renderer; `cursor` marks the cell under
/// the display cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderCell {
    pub code: char,
    pub fg: Rgba,
    pub bg: Rgba,
    pub cursor: bool,
}

/// Host drawing primitive: a cleared frame followed by one call per
/// row, top to bottom.
pub trait CellSink {
    fn clear(&mut self);
    fn add_line(&mut self, cells: &[RenderCell]);
}

/// Discards every frame. Useful for tests and detached consoles.
#[derive(Debug, Default)]
pub struct NullSink;

impl CellSink for NullSink {
    fn clear(&mut self) {}
    fn add_line(&mut self, _cells: &[RenderCell]) {}
}

#[derive(Debug, Clone)]
pub struct Display {
    size: Point,
    rows: Vec<Vec<Char>>,
}

impl Display {
    pub fn new(width: usize, height: usize) -> Self {
        let mut d = Self {
            size: Point::new(0, 0),
            rows: Vec::new(),
        };
        d.resize(width, height);
        d
    }

    pub fn size(&self) -> Point {
        self.size
    }

    pub fn width(&self) -> usize {
        self.size.x
    }

    pub fn height(&self) -> usize {
        self.size.y
    }

    /// Resize the grid, preserving cells inside the common rectangle
    /// and filling everything newly exposed with blank.
    pub fn resize(&mut self, width: usize, height: usize) {
        self.size = Point::new(width, height);
        self.rows.truncate(height);
        for row in &mut self.rows {
            row.resize(width, Char::blank());
        }
        while self.rows.len() < height {
            self.rows.push(vec![Char::blank(); width]);
        }
    }

    pub fn get(&self, p: Point) -> Char {
        self.rows[p.y][p.x]
    }

    pub fn set(&mut self, p: Point, ch: Char) {
        self.rows[p.y][p.x] = ch;
    }

    pub fn row(&self, y: usize) -> &[Char] {
        &self.rows[y]
    }

    /// Rotate the top `count` rows to the bottom and blank them.
    /// Rotating `height` or more rows clears the whole display.
    pub fn scroll_up(&mut self, count: usize) {
        let height = self.size.y;
        if height == 0 {
            return;
        }
        if count >= height {
            self.clear_all();
            return;
        }
        self.rows.rotate_left(count);
        for row in &mut self.rows[height - count..] {
            row.fill(Char::blank());
        }
    }

    /// Blank columns `[from, to)` of one row; out-of-range rows are
    /// ignored, `to` is capped at the width.
    pub fn clear_row(&mut self, y: usize, from: usize, to: usize) {
        if y >= self.size.y {
            return;
        }
        let to = to.min(self.size.x);
        for x in from..to {
            self.rows[y][x] = Char::blank();
        }
    }

    pub fn clear_all(&mut self) {
        for row in &mut self.rows {
            row.fill(Char::blank());
        }
    }

    /// DECALN diagnostic pattern: fill every cell with `E`.
    pub fn fill_test_pattern(&mut self) {
        for row in &mut self.rows {
            row.fill(Char::new('E'));
        }
    }

    /// Extract one row's text. Trailing blanks are kept; callers trim.
    pub fn row_text(&self, y: usize) -> String {
        self.rows[y].iter().map(|c| c.code).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape_ok(d: &Display, w: usize, h: usize) {
        assert_eq!(d.rows.len(), h);
        for row in &d.rows {
            assert_eq!(row.len(), w);
        }
    }

    #[test]
    fn new_display_is_blank() {
        let d = Display::new(4, 3);
        shape_ok(&d, 4, 3);
        for y in 0..3 {
            for x in 0..4 {
                assert_eq!(d.get(Point::new(x, y)), Char::blank());
            }
        }
    }

    #[test]
    fn resize_preserves_common_rectangle() {
        let mut d = Display::new(4, 3);
        d.set(Point::new(1, 1), Char::new('x'));
        d.resize(8, 5);
        shape_ok(&d, 8, 5);
        assert_eq!(d.get(Point::new(1, 1)).code, 'x');
        assert_eq!(d.get(Point::new(7, 4)), Char::blank());

        d.resize(2, 2);
        shape_ok(&d, 2, 2);
        assert_eq!(d.get(Point::new(1, 1)).code, 'x');
    }

    #[test]
    fn scroll_up_rotates_and_blanks() {
        let mut d = Display::new(3, 3);
        d.set(Point::new(0, 0), Char::new('a'));
        d.set(Point::new(0, 1), Char::new('b'));
        d.set(Point::new(0, 2), Char::new('c'));
        d.scroll_up(1);
        shape_ok(&d, 3, 3);
        assert_eq!(d.get(Point::new(0, 0)).code, 'b');
        assert_eq!(d.get(Point::new(0, 1)).code, 'c');
        assert_eq!(d.get(Point::new(0, 2)), Char::blank());
    }

    #[test]
    fn scroll_up_full_height_clears() {
        let mut d = Display::new(2, 2);
        d.set(Point::new(0, 0), Char::new('a'));
        d.set(Point::new(1, 1), Char::new('b'));
        d.scroll_up(2);
        assert_eq!(d.get(Point::new(0, 0)), Char::blank());
        assert_eq!(d.get(Point::new(1, 1)), Char::blank());

        let mut e = Display::new(2, 2);
        e.set(Point::new(0, 0), Char::new('a'));
        e.scroll_up(7);
        assert_eq!(e.get(Point::new(0, 0)), Char::blank());
    }

    #[test]
    fn clear_row_caps_range() {
        let mut d = Display::new(3, 2);
        d.set(Point::new(2, 0), Char::new('z'));
        d.clear_row(0, 1, 99);
        assert_eq!(d.get(Point::new(2, 0)), Char::blank());
        // Out-of-range row is a no-op.
        d.clear_row(9, 0, 3);
        shape_ok(&d, 3, 2);
    }

    #[test]
    fn test_pattern_fills_screen() {
        let mut d = Display::new(3, 2);
        d.fill_test_pattern();
        assert_eq!(d.row_text(0), "EEE");
        assert_eq!(d.row_text(1), "EEE");
    }
}
