//! Parser actions: one function per class of input, dispatched by the
//! transition table. Unsupported sequences log under `vt.parse` and
//! leave the display untouched.

use tracing::debug;

use crate::Emulator;
use crate::table::StateId;

pub(crate) fn error(e: &mut Emulator, ch: char) {
    debug!(target: "vt.parse", state = ?e.state, code = ch as u32, "parse_error");
    e.set_state(StateId::Start);
}

pub(crate) fn insert_char(e: &mut Emulator, ch: char) {
    e.insert_char(ch);
}

pub(crate) fn insert_space(e: &mut Emulator, _ch: char) {
    e.insert_char(' ');
}

pub(crate) fn append_param(e: &mut Emulator, ch: char) {
    e.params.push(ch);
}

pub(crate) fn c0_control(e: &mut Emulator, ch: char) {
    match ch as u32 {
        0x08 => {
            // BS
            let (row, col) = e.cursor_signed();
            e.move_to(row, col - 1);
        }
        0x09 => {
            // HT: next 8-column stop
            let (row, col) = e.cursor_signed();
            let mut x = col + 1;
            while x % 8 != 0 {
                x += 1;
            }
            e.move_to(row, x);
        }
        0x0a => {
            // LF
            let (row, col) = e.cursor_signed();
            e.move_to(row + 1, col);
        }
        0x0d => {
            // CR
            let (row, _) = e.cursor_signed();
            e.move_to(row, 0);
        }
        code => {
            debug!(target: "vt.parse", code, "c0_unsupported");
        }
    }
}

pub(crate) fn c1_control(e: &mut Emulator, ch: char) {
    let (row, col) = e.cursor_signed();
    match ch {
        // IND: down one line, same column
        'D' => e.move_to(row + 1, col),
        // NEL: down one line, first column
        'E' => e.move_to(row + 1, 0),
        // RI: up one line
        'M' => e.move_to(row - 1, col),
        other => {
            debug!(target: "vt.parse", code = other as u32, "c1_unsupported");
        }
    }
}

pub(crate) fn two_char_escape(e: &mut Emulator, ch: char) {
    match ch {
        // RIS: power-on reset
        'c' => e.reset(),
        other => {
            debug!(target: "vt.parse", code = other as u32, "two_char_unsupported");
        }
    }
}

pub(crate) fn private_function(e: &mut Emulator, ch: char) {
    let params: String = e.params.iter().collect();
    match (params.as_str(), ch) {
        // DECALN: fill the screen with E
        ("#", '8') => e.display.fill_test_pattern(),
        _ => {
            debug!(target: "vt.parse", params = %params, code = ch as u32, "private_unsupported");
        }
    }
}

pub(crate) fn osc_dispatch(e: &mut Emulator, _ch: char) {
    let params: String = e.params.iter().collect();
    let fields: Vec<&str> = params.split(';').collect();
    if fields.len() != 2 {
        debug!(target: "vt.parse", params = %params, "osc_invalid");
        return;
    }
    match fields[0] {
        "0" => {
            e.set_icon_name(fields[1]);
            e.set_window_title(fields[1]);
        }
        "1" => e.set_icon_name(fields[1]),
        "2" => e.set_window_title(fields[1]),
        other => {
            debug!(target: "vt.parse", command = other, "osc_unsupported");
        }
    }
}

pub(crate) fn csi_dispatch(e: &mut Emulator, ch: char) {
    let (row, col) = e.cursor_signed();
    match ch {
        // ICH: insert blanks at the cursor
        '@' => {
            let n = e.csi_param(1);
            e.insert_cells(row as usize, col as usize, n.max(0) as usize);
        }
        // CUU
        'A' => {
            let n = e.csi_param(1);
            e.move_to(row - n, col);
        }
        // CUD
        'B' => {
            // Clamped here so the move does not scroll.
            let n = e.csi_param(1);
            let target = (row + n).min(e.size.y as i64 - 1);
            e.move_to(target, col);
        }
        // CUF
        'C' => {
            let n = e.csi_param(1);
            e.move_to(row, col + n);
        }
        // CUB
        'D' => {
            let n = e.csi_param(1);
            e.move_to(row, col - n);
        }
        // CHA: absolute column, 1-based
        'G' => {
            let n = e.csi_param(1);
            e.move_to(row, n - 1);
        }
        // CUP / HVP: absolute position, 1-based
        'H' | 'f' => {
            let (r, c) = e.csi_params2(1, 1);
            e.move_to(r - 1, c - 1);
        }
        // ED: erase in display
        'J' => match e.csi_param(0) {
            0 => e.clear_display(false, true),
            1 => e.clear_display(true, false),
            2 => e.clear_display(true, true),
            n => debug!(target: "vt.parse", param = n, "ed_unsupported"),
        },
        // EL: erase in line
        'K' => match e.csi_param(0) {
            0 => e.display.clear_row(row as usize, col as usize, e.size.x),
            1 => e.display.clear_row(row as usize, 0, col as usize + 1),
            2 => e.display.clear_row(row as usize, 0, e.size.x),
            n => debug!(target: "vt.parse", param = n, "el_unsupported"),
        },
        // DCH: delete characters
        'P' => {
            let n = e.csi_param(1);
            e.delete_cells(row as usize, col as usize, n.max(0) as usize);
        }
        // DA: device attributes
        'c' => e.reply(crate::DEVICE_ATTRIBUTES),
        // VPA: absolute row, 1-based
        'd' => {
            let n = e.csi_param(1);
            e.move_to(n - 1, col);
        }
        'h' => set_mode(e, true),
        'l' => set_mode(e, false),
        other => {
            let params: String = e.params.iter().collect();
            debug!(
                target: "vt.parse",
                params = %params,
                code = other as u32,
                "csi_unsupported"
            );
        }
    }
}

/// SM / RM. The recognised modes are accepted; only DECCOLM changes
/// observable state.
fn set_mode(e: &mut Emulator, set: bool) {
    let (prefix, mode) = e.csi_prefix_param(0);
    match prefix.as_str() {
        "" => match mode {
            // AM, IRM, SRM, LNM
            2 | 4 | 12 | 20 => {}
            other => {
                debug!(target: "vt.parse", mode = other, set, "ansi_mode_unknown");
            }
        },
        "?" => match mode {
            // DECCOLM: 132 columns on set, 80 on reset; erases the
            // screen and homes the cursor either way.
            3 => {
                let cols = if set { 132 } else { 80 };
                e.clear_display(true, true);
                e.resize(cols, e.size.y);
                e.move_to(0, 0);
            }
            // Eight-bit meta input
            1034 => {}
            other => {
                debug!(target: "vt.parse", mode = other, set, "dec_mode_unknown");
            }
        },
        other => {
            debug!(target: "vt.parse", prefix = other, mode, set, "mode_prefix_unknown");
        }
    }
}
