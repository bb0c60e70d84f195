//! TTY line discipline over the VT100 emulator.
//!
//! [`Console`] is the kernel's character device: programs `write`
//! display bytes and `read` keyboard input, while the host feeds key
//! events in via [`Console::on_key`]. Canonical mode buffers and edits
//! whole lines; raw mode hands keystrokes (cursor keys included, as
//! their VT100 sequences) straight through.

mod canon;
mod console;
mod keys;

pub use console::Console;
pub use keys::{KeyKind, translate_host_key};

bitflags::bitflags! {
    /// TTY mode bits. Only these two are recognised.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct TtyFlags: u32 {
        /// Canonical (line-edited) input.
        const ICANON = 1;
        /// Echo typed characters to the display.
        const ECHO = 2;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_display::NullSink;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    fn console() -> Arc<Console> {
        Arc::new(Console::new(80, 24, Box::new(NullSink)))
    }

    fn row(c: &Console, y: usize) -> String {
        c.row_text(y).trim_end().to_string()
    }

    fn type_str(c: &Console, s: &str) {
        for ch in s.chars() {
            c.on_key(KeyKind::Code, ch);
        }
    }

    #[tokio::test]
    async fn canonical_line_editing_end_to_end() {
        let c = console();
        let reader = {
            let c = c.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 16];
                let n = c.read(&mut buf).await;
                buf[..n].to_vec()
            })
        };

        type_str(&c, "help");
        c.on_key(KeyKind::Code, '\n');

        let got = timeout(Duration::from_secs(1), reader)
            .await
            .expect("reader timed out")
            .unwrap();
        assert_eq!(got, b"help\n");
        assert_eq!(row(&c, 0), "help");
        assert_eq!(c.cursor(), core_display::Point::new(0, 1));
    }

    #[tokio::test]
    async fn read_returns_only_whats_queued() {
        let c = console();
        type_str(&c, "hey");
        c.on_key(KeyKind::Enter, '\0');
        type_str(&c, "x");

        let mut buf = [0u8; 1024];
        let n = c.read(&mut buf).await;
        // The pending, uncommitted "x" is not readable.
        assert_eq!(&buf[..n], b"hey\n");
    }

    #[tokio::test]
    async fn echo_renders_edits() {
        let c = console();
        type_str(&c, "cot");
        c.on_key(KeyKind::CursorLeft, '\0');
        c.on_key(KeyKind::CursorLeft, '\0');
        type_str(&c, "a");
        assert_eq!(row(&c, 0), "caot");
        c.on_key(KeyKind::Code, '\u{7f}');
        assert_eq!(row(&c, 0), "cot");
    }

    #[tokio::test]
    async fn echo_off_keeps_display_clean() {
        let c = console();
        c.set_flags(TtyFlags::ICANON);
        type_str(&c, "secret");
        assert_eq!(row(&c, 0), "");

        c.on_key(KeyKind::Enter, '\0');
        let mut buf = [0u8; 32];
        let n = c.read(&mut buf).await;
        assert_eq!(&buf[..n], b"secret\n");
    }

    #[tokio::test]
    async fn raw_mode_translates_named_keys() {
        let c = console();
        c.set_flags(TtyFlags::empty());
        c.on_key(KeyKind::Code, 'a');
        c.on_key(KeyKind::CursorUp, '\0');
        c.on_key(KeyKind::CursorRight, '\0');
        c.on_key(KeyKind::Enter, '\0');

        let mut buf = [0u8; 32];
        let n = c.read(&mut buf).await;
        assert_eq!(&buf[..n], b"a\x1b[A\x1b[C\r");
    }

    #[tokio::test]
    async fn raw_mode_read_drains_partially() {
        let c = console();
        c.set_flags(TtyFlags::empty());
        type_str(&c, "hello");

        let mut small = [0u8; 2];
        assert_eq!(c.read(&mut small).await, 2);
        assert_eq!(&small, b"he");
        let mut rest = [0u8; 1024];
        let n = c.read(&mut rest).await;
        assert_eq!(&rest[..n], b"llo");
    }

    #[tokio::test]
    async fn write_inserts_cr_before_bare_lf() {
        let c = console();
        c.write(b"one\ntwo\r\nthree");
        assert_eq!(row(&c, 0), "one");
        assert_eq!(row(&c, 1), "two");
        assert_eq!(row(&c, 2), "three");
    }

    #[tokio::test]
    async fn write_buffers_partial_utf8() {
        let c = console();
        let bytes = "é".as_bytes();
        c.write(&bytes[..1]);
        assert_eq!(row(&c, 0), "");
        c.write(&bytes[1..]);
        assert_eq!(row(&c, 0), "é");
    }

    #[tokio::test]
    async fn write_skips_invalid_bytes() {
        let c = console();
        c.write(b"a\xffb");
        assert_eq!(row(&c, 0), "ab");
    }

    #[tokio::test]
    async fn write_ascii_reproduces_row() {
        let c = console();
        c.write(b"The quick brown fox");
        assert_eq!(row(&c, 0), "The quick brown fox");
    }

    #[tokio::test]
    async fn device_attribute_query_feeds_raw_queue() {
        let c = console();
        c.set_flags(TtyFlags::empty());
        c.write(b"\x1b[c");

        let mut buf = [0u8; 64];
        let n = c.read(&mut buf).await;
        assert_eq!(&buf[..n], core_vt100::DEVICE_ATTRIBUTES);
    }

    #[tokio::test]
    async fn close_wakes_blocked_reader_with_eof() {
        let c = console();
        let reader = {
            let c = c.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 8];
                c.read(&mut buf).await
            })
        };
        tokio::task::yield_now().await;
        c.close();
        let n = timeout(Duration::from_secs(1), reader)
            .await
            .expect("close did not wake reader")
            .unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn reader_wakes_on_commit_from_other_task() {
        let c = console();
        let reader = {
            let c = c.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 8];
                let n = c.read(&mut buf).await;
                buf[..n].to_vec()
            })
        };
        // Give the reader a chance to park first.
        tokio::task::yield_now().await;
        type_str(&c, "ok");
        c.on_key(KeyKind::Enter, '\0');

        let got = timeout(Duration::from_secs(1), reader)
            .await
            .expect("reader never woke")
            .unwrap();
        assert_eq!(got, b"ok\n");
    }

    #[tokio::test]
    async fn host_key_events_translate() {
        let c = console();
        c.on_key_event("h", false);
        c.on_key_event("i", false);
        c.on_key_event("Enter", false);
        let mut buf = [0u8; 8];
        let n = c.read(&mut buf).await;
        assert_eq!(&buf[..n], b"hi\n");
    }

    #[tokio::test]
    async fn ctrl_l_clears_below() {
        let c = console();
        c.write(b"scroll\r\n");
        type_str(&c, "ab");
        c.on_key_event("l", true);
        // ESC[J erased from the cursor down; the line above stays.
        assert_eq!(row(&c, 0), "scroll");
    }
}
