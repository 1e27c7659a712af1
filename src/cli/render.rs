use std::fmt::Write as _;

use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use time::format_description::{self, FormatItem};
use time::OffsetDateTime;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

const MAX_CELL_WIDTH: usize = 48;

static TIMESTAMP_FORMAT: Lazy<Vec<FormatItem<'static>>> = Lazy::new(|| {
    format_description::parse("[year]-[month]-[day] [hour]:[minute]")
        .expect("valid display timestamp format")
});

/// Plain-text table with columns padded to their widest cell.
#[derive(Debug, Default)]
pub struct TextTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl TextTable {
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn row<I, S>(&mut self, cells: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut cells: Vec<String> = cells
            .into_iter()
            .map(|cell| truncate(&cell.into().replace('\n', " "), MAX_CELL_WIDTH))
            .collect();
        cells.resize(self.headers.len(), String::new());
        self.rows.push(cells);
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn render(&self) -> String {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.width()).collect();
        for row in &self.rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.width());
            }
        }

        let mut out = String::new();
        write_line(&mut out, &self.headers, &widths);
        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        write_line(&mut out, &rule, &widths);
        for row in &self.rows {
            write_line(&mut out, row, &widths);
        }
        out
    }
}

fn write_line(out: &mut String, cells: &[String], widths: &[usize]) {
    let mut line = String::new();
    for (idx, (cell, width)) in cells.iter().zip(widths).enumerate() {
        if idx > 0 {
            line.push_str("  ");
        }
        line.push_str(cell);
        line.push_str(&" ".repeat(width.saturating_sub(cell.width())));
    }
    let _ = writeln!(out, "{}", line.trim_end());
}

/// Shortens `text` to at most `max` display columns, marking the cut.
pub fn truncate(text: &str, max: usize) -> String {
    if text.width() <= max {
        return text.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let w = ch.width().unwrap_or(0);
        if used + w + 1 > max {
            break;
        }
        out.push(ch);
        used += w;
    }
    out.push('…');
    out
}

pub fn money(amount: Decimal) -> String {
    format!("{:.2}", amount.round_dp(2))
}

pub fn timestamp(at: OffsetDateTime) -> String {
    at.format(&*TIMESTAMP_FORMAT)
        .unwrap_or_else(|_| at.to_string())
}

pub fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn pads_wide_glyphs_by_display_width() {
        let mut table = TextTable::new(["ID", "TITLE", "AMOUNT"]);
        table.row(["1a2b3c4d", "Café ☕", "12.50"]);
        table.row(["9f8e7d6c", "東京 trip", "1200.00"]);
        insta::assert_snapshot!(table.render(), @r###"
        ID        TITLE      AMOUNT
        --------  ---------  -------
        1a2b3c4d  Café ☕    12.50
        9f8e7d6c  東京 trip  1200.00
        "###);
    }

    #[test]
    fn long_cells_are_truncated() {
        let long = "x".repeat(80);
        let cut = truncate(&long, 10);
        assert_eq!(cut.width(), 10);
        assert!(cut.ends_with('…'));
        assert_eq!(truncate("short", 10), "short");
    }

    #[test]
    fn formats_money_and_timestamps() {
        assert_eq!(money(Decimal::new(12346, 3)), "12.35");
        assert_eq!(money(Decimal::from(7)), "7.00");
        assert_eq!(timestamp(datetime!(2024-03-05 09:07 UTC)), "2024-03-05 09:07");
        assert_eq!(short_id("0123456789abcdef"), "01234567");
    }
}
