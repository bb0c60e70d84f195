//! Column layout for name lists: 8-column tab stops folded at 80
//! columns, the way `ls` and completion candidates print.

use unicode_width::UnicodeWidthStr;

const TAB: usize = 8;
const LINE: usize = 80;

/// Lay `items` out in columns. The result ends with a newline when
/// there is anything to print.
pub fn tabulate(items: &[String]) -> String {
    let max = items.iter().map(|i| i.width()).max().unwrap_or(0);
    let column = (max / TAB + 1) * TAB;
    let per_line = (LINE / column).max(1);

    let mut out = String::new();
    let mut on_line = 0;
    for item in items {
        out.push_str(item);
        on_line += 1;
        if on_line >= per_line {
            out.push('\n');
            on_line = 0;
        } else {
            let mut used = (item.width() / TAB + 1) * TAB;
            out.push('\t');
            while used < column {
                out.push('\t');
                used += TAB;
            }
        }
    }
    if on_line > 0 {
        out.push('\n');
    }
    out
}

/// The longest prefix shared by every candidate.
pub fn common_prefix(items: &[String]) -> String {
    let Some(first) = items.first() else {
        return String::new();
    };
    let mut prefix = first.clone();
    for item in &items[1..] {
        let shared = prefix
            .char_indices()
            .zip(item.chars())
            .take_while(|((_, a), b)| a == b)
            .count();
        let end = prefix
            .char_indices()
            .nth(shared)
            .map_or(prefix.len(), |(idx, _)| idx);
        prefix.truncate(end);
        if prefix.is_empty() {
            break;
        }
    }
    prefix
}
